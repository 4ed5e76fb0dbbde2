// Valve's KeyValues text convention: a named block of `"key" "value"` pairs
// and nested `key { ... }` blocks. Quotes are optional on both sides, `//`
// starts a line comment, keys are case-insensitive. Compiled materials are
// one root block named after the shader.

use crate::error::{Result, SourceError};

#[derive(Debug, Clone, PartialEq)]
pub struct KvBlock {
    pub name: String,
    pub entries: Vec<(String, KvEntry)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KvEntry {
    Value(String),
    Block(KvBlock),
}

impl KvBlock {
    /// Last value written for `key`, case-insensitive. Nested blocks are
    /// not searched.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find_map(|(k, entry)| match entry {
                KvEntry::Value(v) if k.eq_ignore_ascii_case(key) => Some(v.as_str()),
                _ => None,
            })
    }

    pub fn get_block(&self, key: &str) -> Option<&KvBlock> {
        self.entries
            .iter()
            .rev()
            .find_map(|(k, entry)| match entry {
                KvEntry::Block(b) if k.eq_ignore_ascii_case(key) => Some(b),
                _ => None,
            })
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Text(String),
    Open,
    Close,
}

struct Tokenizer<'a> {
    rest: &'a str,
    file: &'static str,
}

impl<'a> Tokenizer<'a> {
    fn new(text: &'a str, file: &'static str) -> Self {
        Self { rest: text, file }
    }

    fn next(&mut self) -> Result<Option<Token>> {
        loop {
            self.rest = self.rest.trim_start();
            if let Some(stripped) = self.rest.strip_prefix("//") {
                self.rest = stripped.split_once('\n').map_or("", |(_, r)| r);
                continue;
            }
            break;
        }
        let mut chars = self.rest.chars();
        let Some(c) = chars.next() else {
            return Ok(None);
        };
        match c {
            '{' => {
                self.rest = chars.as_str();
                Ok(Some(Token::Open))
            }
            '}' => {
                self.rest = chars.as_str();
                Ok(Some(Token::Close))
            }
            '"' => {
                let body = chars.as_str();
                let Some(end) = body.find('"') else {
                    return Err(SourceError::InvalidEncoding {
                        file: self.file,
                        what: "unterminated quoted token".to_owned(),
                    });
                };
                self.rest = &body[end + 1..];
                Ok(Some(Token::Text(body[..end].to_owned())))
            }
            _ => {
                let end = self
                    .rest
                    .find(|c: char| c.is_whitespace() || c == '{' || c == '}' || c == '"')
                    .unwrap_or(self.rest.len());
                let (word, rest) = self.rest.split_at(end);
                self.rest = rest;
                Ok(Some(Token::Text(word.to_owned())))
            }
        }
    }
}

/// Parse a single root block, e.g. a compiled material.
pub fn parse_block(text: &str, file: &'static str) -> Result<KvBlock> {
    let mut tokens = Tokenizer::new(text, file);
    let Some(Token::Text(name)) = tokens.next()? else {
        return Err(SourceError::InvalidEncoding {
            file,
            what: "expected a root block name".to_owned(),
        });
    };
    if tokens.next()? != Some(Token::Open) {
        return Err(SourceError::InvalidEncoding {
            file,
            what: format!("expected {{ after \"{}\"", name),
        });
    }
    let block = parse_body(&mut tokens, name)?;
    Ok(block)
}

fn parse_body(tokens: &mut Tokenizer, name: String) -> Result<KvBlock> {
    let mut entries = Vec::new();
    loop {
        match tokens.next()? {
            Some(Token::Close) | None => break,
            Some(Token::Open) => {
                return Err(SourceError::InvalidEncoding {
                    file: tokens.file,
                    what: "unexpected { without a key".to_owned(),
                })
            }
            Some(Token::Text(key)) => match tokens.next()? {
                Some(Token::Text(value)) => entries.push((key, KvEntry::Value(value))),
                Some(Token::Open) => {
                    let inner = parse_body(tokens, key.clone())?;
                    entries.push((key, KvEntry::Block(inner)));
                }
                _ => {
                    return Err(SourceError::InvalidEncoding {
                        file: tokens.file,
                        what: format!("key \"{}\" has no value", key),
                    })
                }
            },
        }
    }
    Ok(KvBlock { name, entries })
}

#[cfg(test)]
mod keyvalues_tests {
    use super::*;

    #[test]
    fn parses_a_material_block() {
        let text = r#"
            // comment
            "LightmappedGeneric"
            {
                "$basetexture" "metal/metalfence001a"
                $surfaceprop metal // trailing comment
                "%keywords" "industrial"
            }
        "#;
        let block = parse_block(text, "vmt").unwrap();
        assert_eq!(block.name, "LightmappedGeneric");
        assert_eq!(block.get("$basetexture"), Some("metal/metalfence001a"));
        assert_eq!(block.get("$SurfaceProp"), Some("metal"));
        assert_eq!(block.entries.len(), 3);
    }

    #[test]
    fn nested_blocks_are_kept() {
        let text = r#"
            "UnlitGeneric"
            {
                "$basetexture" "glass/window01"
                Proxies
                {
                    AnimatedTexture
                    {
                        animatedtexturevar $basetexture
                    }
                }
            }
        "#;
        let block = parse_block(text, "vmt").unwrap();
        let proxies = block.get_block("proxies").unwrap();
        assert!(proxies.get_block("AnimatedTexture").is_some());
    }

    #[test]
    fn duplicate_keys_resolve_to_the_last_writer() {
        let text = "\"x\" { \"$color\" \"a\" \"$color\" \"b\" }";
        let block = parse_block(text, "vmt").unwrap();
        assert_eq!(block.get("$color"), Some("b"));
    }

    #[test]
    fn missing_value_is_an_error() {
        let err = parse_block("\"x\" { \"$orphan\" }", "vmt").unwrap_err();
        assert!(matches!(err, SourceError::InvalidEncoding { .. }));
    }
}
