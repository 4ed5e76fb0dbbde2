// The keyvalues2 text encoding of the element graph. Each element is
// `"TypeName" { ... }`; attribute lines are `"name" "type" "value"`,
// nested elements appear inline with their type as the second token, and
// cross-references (including cycles) are `"name" "element" "<guid>"`
// resolved against each element's `"id" "elementid"` line.

use ahash::AHashMap;

use crate::dmx::{DmxAttr, DmxDocument, DmxElement, DmxHandle, DmxPrologue};
use crate::error::{Result, SourceError};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Str(String),
    Open,
    Close,
    OpenBracket,
    CloseBracket,
}

#[derive(Clone)]
struct Lexer<'a> {
    rest: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    fn next(&mut self) -> Result<Option<Tok>> {
        loop {
            self.rest = self.rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
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
        let tok = match c {
            '{' => Tok::Open,
            '}' => Tok::Close,
            '[' => Tok::OpenBracket,
            ']' => Tok::CloseBracket,
            '"' => {
                let body = chars.as_str();
                let Some(end) = body.find('"') else {
                    return Err(SourceError::InvalidEncoding {
                        file: "dmx",
                        what: "unterminated quoted token".to_owned(),
                    });
                };
                self.rest = &body[end + 1..];
                return Ok(Some(Tok::Str(body[..end].to_owned())));
            }
            _ => {
                let end = self
                    .rest
                    .find(|c: char| {
                        c.is_whitespace() || matches!(c, '{' | '}' | '[' | ']' | '"' | ',')
                    })
                    .unwrap_or(self.rest.len());
                let (word, rest) = self.rest.split_at(end);
                self.rest = rest;
                return Ok(Some(Tok::Str(word.to_owned())));
            }
        };
        self.rest = chars.as_str();
        Ok(Some(tok))
    }

    fn peek(&self) -> Result<Option<Tok>> {
        self.clone().next()
    }
}

struct PendingRef {
    element: usize,
    attribute: usize,
    slot: Option<usize>,
    guid: String,
}

struct Parser<'a> {
    lex: Lexer<'a>,
    elements: Vec<DmxElement>,
    by_guid: AHashMap<String, DmxHandle>,
    pending: Vec<PendingRef>,
}

pub fn read_body(text: &str, prologue: DmxPrologue) -> Result<DmxDocument> {
    let mut parser = Parser {
        lex: Lexer::new(text),
        elements: Vec::new(),
        by_guid: AHashMap::new(),
        pending: Vec::new(),
    };

    while let Some(tok) = parser.lex.next()? {
        match tok {
            Tok::Str(type_name) => {
                parser.expect(Tok::Open)?;
                parser.parse_element_body(type_name)?;
            }
            other => return Err(unexpected(&other)),
        }
    }

    // second pass: wire the guid references, cycles included
    for p in std::mem::take(&mut parser.pending) {
        let target = parser.by_guid.get(&p.guid).copied();
        if target.is_none() {
            log::warn!("unresolved element reference {}", p.guid);
        }
        let attr = &mut parser.elements[p.element].attributes[p.attribute].1;
        match (attr, p.slot) {
            (DmxAttr::Element(slot), None) => *slot = target,
            (DmxAttr::ElementArray(slots), Some(i)) => slots[i] = target,
            _ => {}
        }
    }

    Ok(DmxDocument {
        prologue,
        root: if parser.elements.is_empty() {
            None
        } else {
            Some(DmxHandle(0))
        },
        elements: parser.elements,
    })
}

fn unexpected(tok: &Tok) -> SourceError {
    SourceError::InvalidEncoding {
        file: "dmx",
        what: format!("unexpected token {:?}", tok),
    }
}

impl<'a> Parser<'a> {
    fn expect(&mut self, want: Tok) -> Result<()> {
        match self.lex.next()? {
            Some(tok) if tok == want => Ok(()),
            Some(other) => Err(unexpected(&other)),
            None => Err(SourceError::InvalidEncoding {
                file: "dmx",
                what: "unexpected end of document".to_owned(),
            }),
        }
    }

    fn next_str(&mut self) -> Result<String> {
        match self.lex.next()? {
            Some(Tok::Str(s)) => Ok(s),
            Some(other) => Err(unexpected(&other)),
            None => Err(SourceError::InvalidEncoding {
                file: "dmx",
                what: "unexpected end of document".to_owned(),
            }),
        }
    }

    /// Opening brace already consumed; parses to the matching close and
    /// returns the new element's handle.
    fn parse_element_body(&mut self, type_name: String) -> Result<DmxHandle> {
        let index = self.elements.len();
        self.elements.push(DmxElement {
            type_name,
            ..Default::default()
        });

        loop {
            match self.lex.next()? {
                Some(Tok::Close) => break,
                Some(Tok::Str(name)) => self.parse_attribute(index, name)?,
                Some(other) => return Err(unexpected(&other)),
                None => {
                    return Err(SourceError::InvalidEncoding {
                        file: "dmx",
                        what: "unterminated element body".to_owned(),
                    })
                }
            }
        }
        Ok(DmxHandle(index as u32))
    }

    fn parse_attribute(&mut self, element: usize, name: String) -> Result<()> {
        let type_word = self.next_str()?;

        // a `{` after the type word means an inline child element
        if self.lex.peek()? == Some(Tok::Open) {
            self.expect(Tok::Open)?;
            let child = self.parse_element_body(type_word)?;
            self.elements[element]
                .attributes
                .push((name, DmxAttr::Element(Some(child))));
            return Ok(());
        }

        if let Some(base) = type_word.strip_suffix("_array") {
            let base = base.to_owned();
            return self.parse_array(element, name, &base);
        }

        match type_word.as_str() {
            "elementid" => {
                let guid = self.next_str()?;
                if name == "id" {
                    self.elements[element].guid = parse_guid(&guid);
                    self.by_guid.insert(guid, DmxHandle(element as u32));
                } else {
                    self.elements[element]
                        .attributes
                        .push((name, DmxAttr::Binary(parse_guid(&guid).to_vec())));
                }
                Ok(())
            }
            "element" => {
                let guid = self.next_str()?;
                let attribute = self.elements[element].attributes.len();
                self.elements[element]
                    .attributes
                    .push((name, DmxAttr::Element(None)));
                if !guid.is_empty() {
                    self.pending.push(PendingRef {
                        element,
                        attribute,
                        slot: None,
                        guid,
                    });
                }
                Ok(())
            }
            "string" if name == "name" => {
                self.elements[element].name = self.next_str()?;
                Ok(())
            }
            _ => {
                let value = self.next_str()?;
                let parsed = parse_scalar(&type_word, &value)?;
                self.elements[element].attributes.push((name, parsed));
                Ok(())
            }
        }
    }

    fn parse_array(&mut self, element: usize, name: String, base: &str) -> Result<()> {
        self.expect(Tok::OpenBracket)?;

        if base == "element" {
            let attribute = self.elements[element].attributes.len();
            self.elements[element]
                .attributes
                .push((name, DmxAttr::ElementArray(Vec::new())));
            loop {
                match self.lex.next()? {
                    Some(Tok::CloseBracket) => break,
                    Some(Tok::Str(word)) => {
                        if self.lex.peek()? == Some(Tok::Open) {
                            self.expect(Tok::Open)?;
                            let child = self.parse_element_body(word)?;
                            let DmxAttr::ElementArray(slots) =
                                &mut self.elements[element].attributes[attribute].1
                            else {
                                unreachable!()
                            };
                            slots.push(Some(child));
                        } else {
                            // "element" "<guid>" reference entry
                            let guid = self.next_str()?;
                            let DmxAttr::ElementArray(slots) =
                                &mut self.elements[element].attributes[attribute].1
                            else {
                                unreachable!()
                            };
                            let slot = slots.len();
                            slots.push(None);
                            if !guid.is_empty() {
                                self.pending.push(PendingRef {
                                    element,
                                    attribute,
                                    slot: Some(slot),
                                    guid,
                                });
                            }
                        }
                    }
                    Some(other) => return Err(unexpected(&other)),
                    None => {
                        return Err(SourceError::InvalidEncoding {
                            file: "dmx",
                            what: "unterminated element array".to_owned(),
                        })
                    }
                }
            }
            return Ok(());
        }

        let mut values = Vec::new();
        loop {
            match self.lex.next()? {
                Some(Tok::CloseBracket) => break,
                Some(Tok::Str(value)) => values.push(parse_scalar(base, &value)?),
                Some(other) => return Err(unexpected(&other)),
                None => {
                    return Err(SourceError::InvalidEncoding {
                        file: "dmx",
                        what: "unterminated attribute array".to_owned(),
                    })
                }
            }
        }
        let attr = collect_array(base, values)?;
        self.elements[element].attributes.push((name, attr));
        Ok(())
    }
}

fn bad_value(type_word: &str, value: &str) -> SourceError {
    SourceError::InvalidEncoding {
        file: "dmx",
        what: format!("{} value \"{}\"", type_word, value),
    }
}

fn parse_scalar(type_word: &str, value: &str) -> Result<DmxAttr> {
    let floats = |n: usize| -> Result<Vec<f32>> {
        let parts: Vec<f32> = value
            .split_whitespace()
            .map(|p| p.parse::<f32>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| bad_value(type_word, value))?;
        if parts.len() != n {
            return Err(bad_value(type_word, value));
        }
        Ok(parts)
    };

    Ok(match type_word {
        "int" => DmxAttr::Int(value.parse().map_err(|_| bad_value(type_word, value))?),
        "float" => DmxAttr::Float(value.parse().map_err(|_| bad_value(type_word, value))?),
        "time" => DmxAttr::Time(value.parse().map_err(|_| bad_value(type_word, value))?),
        "bool" => DmxAttr::Bool(value == "1"),
        "string" => DmxAttr::Str(value.to_owned()),
        "binary" => DmxAttr::Binary(parse_hex(value)?),
        "color" => {
            let parts: Vec<u8> = value
                .split_whitespace()
                .map(|p| p.parse::<u8>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|_| bad_value(type_word, value))?;
            if parts.len() != 4 {
                return Err(bad_value(type_word, value));
            }
            DmxAttr::Color([parts[0], parts[1], parts[2], parts[3]])
        }
        "vector2" => {
            let v = floats(2)?;
            DmxAttr::Vec2([v[0], v[1]])
        }
        "vector3" => {
            let v = floats(3)?;
            DmxAttr::Vec3([v[0], v[1], v[2]])
        }
        "vector4" => {
            let v = floats(4)?;
            DmxAttr::Vec4([v[0], v[1], v[2], v[3]])
        }
        "qangle" => {
            let v = floats(3)?;
            DmxAttr::QAngle([v[0], v[1], v[2]])
        }
        "quaternion" => {
            let v = floats(4)?;
            DmxAttr::Quat([v[0], v[1], v[2], v[3]])
        }
        "matrix" => {
            let v = floats(16)?;
            let mut m = [0.0f32; 16];
            m.copy_from_slice(&v);
            DmxAttr::Matrix(m)
        }
        other => {
            return Err(SourceError::UnsupportedFeature {
                file: "dmx",
                what: format!("attribute type \"{}\"", other),
            })
        }
    })
}

fn collect_array(base: &str, values: Vec<DmxAttr>) -> Result<DmxAttr> {
    macro_rules! gather {
        ($variant:ident, $array:ident) => {{
            let mut out = Vec::with_capacity(values.len());
            for v in values {
                let DmxAttr::$variant(x) = v else {
                    unreachable!("parse_scalar returned a foreign variant")
                };
                out.push(x);
            }
            Ok(DmxAttr::$array(out))
        }};
    }
    match base {
        "int" => gather!(Int, IntArray),
        "float" => gather!(Float, FloatArray),
        "time" => gather!(Time, TimeArray),
        "bool" => gather!(Bool, BoolArray),
        "string" => gather!(Str, StrArray),
        "binary" => gather!(Binary, BinaryArray),
        "color" => gather!(Color, ColorArray),
        "vector2" => gather!(Vec2, Vec2Array),
        "vector3" => gather!(Vec3, Vec3Array),
        "vector4" => gather!(Vec4, Vec4Array),
        "qangle" => gather!(QAngle, QAngleArray),
        "quaternion" => gather!(Quat, QuatArray),
        "matrix" => gather!(Matrix, MatrixArray),
        other => Err(SourceError::UnsupportedFeature {
            file: "dmx",
            what: format!("attribute type \"{}_array\"", other),
        }),
    }
}

fn parse_hex(value: &str) -> Result<Vec<u8>> {
    let clean: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if clean.len() % 2 != 0 {
        return Err(bad_value("binary", value));
    }
    (0..clean.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&clean[i..i + 2], 16).map_err(|_| bad_value("binary", value)))
        .collect()
}

/// `aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee` to raw bytes; malformed ids keep
/// their zeroed form (the string is still usable as a reference key).
fn parse_guid(text: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    let hex: String = text.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if hex.len() == 32 {
        for (i, chunk) in out.iter_mut().enumerate() {
            if let Ok(b) = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16) {
                *chunk = b;
            }
        }
    }
    out
}
