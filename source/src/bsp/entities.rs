// The entity lump is a text block: one `{ ... }` body per entity holding
// newline-separated `"key" "value"` pairs. Keys repeat (outputs do this a
// lot), order matters, and unknown keys must survive untouched, so the raw
// pair list is the canonical form.

use crate::error::SourceError;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawEntity {
    pub pairs: Vec<(String, String)>,
}

impl RawEntity {
    /// Last value for `key`; the engine reads entity keys case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn classname(&self) -> Option<&str> {
        self.get("classname")
    }
}

/// Parse the lump text into raw entities. A malformed pair poisons only the
/// entity that contains it: the error is recorded and the scan resyncs at
/// the next block.
pub fn parse_entity_lump(text: &str, diagnostics: &mut Vec<SourceError>) -> Vec<RawEntity> {
    let mut entities = Vec::new();
    let text = text.trim_end_matches('\0');
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        rest = &rest[open + 1..];
        let Some(close) = rest.find('}') else {
            diagnostics.push(SourceError::InvalidEncoding {
                file: "bsp",
                what: "unterminated entity block".to_owned(),
            });
            break;
        };
        let body = &rest[..close];
        rest = &rest[close + 1..];

        match parse_entity_body(body) {
            Ok(entity) => entities.push(entity),
            Err(err) => diagnostics.push(err),
        }
    }
    entities
}

fn parse_entity_body(body: &str) -> Result<RawEntity, SourceError> {
    let mut entity = RawEntity::default();
    let mut rest = body;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let (key, after_key) = take_quoted(rest)?;
        let (value, after_value) = take_quoted(after_key.trim_start())?;
        entity.pairs.push((key.to_owned(), value.to_owned()));
        rest = after_value;
    }
    if entity.pairs.is_empty() {
        return Err(SourceError::InvalidEncoding {
            file: "bsp",
            what: "entity block with no key-value pairs".to_owned(),
        });
    }
    Ok(entity)
}

fn take_quoted(text: &str) -> Result<(&str, &str), SourceError> {
    let Some(body) = text.strip_prefix('"') else {
        return Err(SourceError::InvalidEncoding {
            file: "bsp",
            what: format!("expected a quoted token at \"{}\"", text.chars().take(24).collect::<String>()),
        });
    };
    let Some(end) = body.find('"') else {
        return Err(SourceError::InvalidEncoding {
            file: "bsp",
            what: "unterminated quoted token in entity block".to_owned(),
        });
    };
    Ok((&body[..end], &body[end + 1..]))
}

#[cfg(test)]
mod entities_tests {
    use super::*;

    #[test]
    fn parses_blocks_in_order() {
        let text = "{\n\"classname\" \"worldspawn\"\n\"skyname\" \"sky_day01_01\"\n}\n{\n\"classname\" \"light\"\n\"origin\" \"1 2 3\"\n}\n\0";
        let mut diagnostics = Vec::new();
        let entities = parse_entity_lump(text, &mut diagnostics);
        assert!(diagnostics.is_empty());
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].classname(), Some("worldspawn"));
        assert_eq!(entities[1].get("origin"), Some("1 2 3"));
    }

    #[test]
    fn duplicate_keys_keep_every_pair_but_read_the_last() {
        let text = "{\"classname\" \"logic_relay\" \"ontrigger\" \"a\" \"ontrigger\" \"b\"}";
        let mut diagnostics = Vec::new();
        let entities = parse_entity_lump(text, &mut diagnostics);
        assert_eq!(entities[0].pairs.len(), 3);
        assert_eq!(entities[0].get("ontrigger"), Some("b"));
    }

    #[test]
    fn a_malformed_entity_is_isolated() {
        let text = "{\"classname\" \"light\"}\n{\"classname\" broken}\n{\"classname\" \"info_target\"}";
        let mut diagnostics = Vec::new();
        let entities = parse_entity_lump(text, &mut diagnostics);
        assert_eq!(entities.len(), 2);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(entities[1].classname(), Some("info_target"));
    }
}
