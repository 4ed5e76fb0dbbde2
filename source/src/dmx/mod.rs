// Datamodel Exchange: a generically-typed attributed element graph.
//
// Elements live in one arena owned by the document; attributes that point
// at other elements hold arena handles, so shared children and reference
// cycles are representable without ownership games. Two encodings share
// the data model: a binary stream and the keyvalues2 text form, announced
// by the prologue comment on the first line.

pub mod binary;
pub mod kv2;
pub mod session;

use crate::error::{Result, SourceError};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DmxHandle(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum DmxAttr {
    Element(Option<DmxHandle>),
    Int(i32),
    Float(f32),
    Bool(bool),
    Str(String),
    Binary(Vec<u8>),
    Time(f32),
    Color([u8; 4]),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    QAngle([f32; 3]),
    Quat([f32; 4]), // x y z w
    Matrix([f32; 16]),
    ElementArray(Vec<Option<DmxHandle>>),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    BoolArray(Vec<bool>),
    StrArray(Vec<String>),
    BinaryArray(Vec<Vec<u8>>),
    TimeArray(Vec<f32>),
    ColorArray(Vec<[u8; 4]>),
    Vec2Array(Vec<[f32; 2]>),
    Vec3Array(Vec<[f32; 3]>),
    Vec4Array(Vec<[f32; 4]>),
    QAngleArray(Vec<[f32; 3]>),
    QuatArray(Vec<[f32; 4]>),
    MatrixArray(Vec<[f32; 16]>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DmxElement {
    pub type_name: String,
    pub name: String,
    pub guid: [u8; 16],
    pub attributes: Vec<(String, DmxAttr)>,
}

impl DmxElement {
    pub fn attr(&self, name: &str) -> Option<&DmxAttr> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn has(&self, name: &str) -> bool {
        match self.attr(name) {
            None | Some(DmxAttr::Element(None)) => false,
            Some(DmxAttr::Bool(b)) => *b,
            Some(_) => true,
        }
    }

    pub fn element(&self, name: &str) -> Option<DmxHandle> {
        match self.attr(name)? {
            DmxAttr::Element(h) => *h,
            _ => None,
        }
    }

    pub fn elements(&self, name: &str) -> &[Option<DmxHandle>] {
        match self.attr(name) {
            Some(DmxAttr::ElementArray(v)) => v,
            _ => &[],
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.attr(name)? {
            DmxAttr::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.attr(name)? {
            DmxAttr::Float(f) | DmxAttr::Time(f) => Some(*f),
            DmxAttr::Int(i) => Some(*i as f32),
            _ => None,
        }
    }

    pub fn vec3(&self, name: &str) -> Option<[f32; 3]> {
        match self.attr(name)? {
            DmxAttr::Vec3(v) | DmxAttr::QAngle(v) => Some(*v),
            _ => None,
        }
    }

    pub fn quat(&self, name: &str) -> Option<[f32; 4]> {
        match self.attr(name)? {
            DmxAttr::Quat(q) => Some(*q),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DmxPrologue {
    pub encoding: String,
    pub encoding_version: i32,
    pub format: String,
    pub format_version: i32,
}

pub struct DmxDocument {
    pub prologue: DmxPrologue,
    pub elements: Vec<DmxElement>,
    pub root: Option<DmxHandle>,
}

impl DmxDocument {
    /// Decode either encoding, dispatching on the prologue line.
    pub fn read(data: &[u8]) -> Result<DmxDocument> {
        let (prologue, body_offset) = parse_prologue(data)?;
        match prologue.encoding.as_str() {
            "binary" => binary::read_body(data, body_offset, prologue),
            "keyvalues2" => {
                let text = std::str::from_utf8(&data[body_offset..]).map_err(|_| {
                    SourceError::InvalidEncoding {
                        file: "dmx",
                        what: "keyvalues2 body is not valid utf-8".to_owned(),
                    }
                })?;
                kv2::read_body(text, prologue)
            }
            other => Err(SourceError::UnsupportedFeature {
                file: "dmx",
                what: format!("encoding \"{}\"", other),
            }),
        }
    }

    pub fn get(&self, handle: DmxHandle) -> Option<&DmxElement> {
        self.elements.get(handle.0 as usize)
    }

    /// Linear scan matching the loosely-keyed lookups the session layer
    /// performs (names are not unique in these documents).
    pub fn find_elements(&self, name: &str, type_name: &str) -> Vec<DmxHandle> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.name == name && e.type_name == type_name)
            .map(|(i, _)| DmxHandle(i as u32))
            .collect()
    }
}

/// `<!-- dmx encoding binary 2 format dmx 1 -->` terminated by a newline.
fn parse_prologue(data: &[u8]) -> Result<(DmxPrologue, usize)> {
    let line_end = data
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| SourceError::InvalidEncoding {
            file: "dmx",
            what: "missing prologue line".to_owned(),
        })?;
    let line = std::str::from_utf8(&data[..line_end]).map_err(|_| {
        SourceError::InvalidEncoding {
            file: "dmx",
            what: "prologue is not valid utf-8".to_owned(),
        }
    })?;

    let words: Vec<&str> = line.split_whitespace().collect();
    // <!-- dmx encoding <enc> <ver> format <fmt> <ver> -->
    if words.len() < 9 || words[0] != "<!--" || words[1] != "dmx" || words[2] != "encoding" {
        return Err(SourceError::InvalidEncoding {
            file: "dmx",
            what: format!("unrecognized prologue \"{}\"", line.trim()),
        });
    }
    let parse_ver = |s: &str| {
        s.parse::<i32>().map_err(|_| SourceError::InvalidEncoding {
            file: "dmx",
            what: format!("bad version number \"{}\"", s),
        })
    };
    let prologue = DmxPrologue {
        encoding: words[3].to_owned(),
        encoding_version: parse_ver(words[4])?,
        format: words[6].to_owned(),
        format_version: parse_ver(words[7])?,
    };
    Ok((prologue, line_end + 1))
}
