// Binary DMX body: an optional string dictionary, an element table of
// (type, name, GUID), then per-element attribute lists. What moved into
// the dictionary grew over encoding versions: v2 has none, v3 interns
// type and attribute names, v4 adds element names, v5 widens the indices
// and interns string values too.

use common::vcursor::VCursor;

use crate::dmx::{DmxAttr, DmxDocument, DmxElement, DmxHandle, DmxPrologue};
use crate::error::{Result, SourceError};

struct StringDict {
    strings: Option<Vec<String>>,
    wide: bool,
}

impl StringDict {
    fn read(cursor: &mut VCursor, version: i32) -> Result<StringDict> {
        if version <= 2 {
            return Ok(StringDict {
                strings: None,
                wide: false,
            });
        }
        let wide = version >= 5;
        let count = if wide {
            cursor.read_u32()? as usize
        } else {
            cursor.read_u16()? as usize
        };
        let mut strings = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            strings.push(cursor.read_cstr()?);
        }
        Ok(StringDict {
            strings: Some(strings),
            wide,
        })
    }

    fn get(&self, cursor: &mut VCursor) -> Result<String> {
        let Some(strings) = &self.strings else {
            return Ok(cursor.read_cstr()?);
        };
        let index = if self.wide {
            cursor.read_u32()? as usize
        } else {
            cursor.read_u16()? as usize
        };
        strings
            .get(index)
            .cloned()
            .ok_or_else(|| SourceError::InvalidEncoding {
                file: "dmx",
                what: format!("string index {} of {}", index, strings.len()),
            })
    }
}

pub fn read_body(data: &[u8], offset: usize, prologue: DmxPrologue) -> Result<DmxDocument> {
    let version = prologue.encoding_version;
    if !(2..=5).contains(&version) {
        return Err(SourceError::UnsupportedFeature {
            file: "dmx",
            what: format!("binary encoding version {}", version),
        });
    }

    let mut cursor = VCursor::new(data);
    cursor.seek(offset)?;

    let dict = StringDict::read(&mut cursor, version)?;

    let n_elements = cursor.read_i32()?;
    if n_elements < 0 || n_elements as usize > data.len() {
        return Err(SourceError::InvalidEncoding {
            file: "dmx",
            what: format!("element count {}", n_elements),
        });
    }
    let n_elements = n_elements as usize;

    let mut elements = Vec::with_capacity(n_elements);
    for _ in 0..n_elements {
        let type_name = dict.get(&mut cursor)?;
        let name = if version >= 4 {
            dict.get(&mut cursor)?
        } else {
            cursor.read_cstr()?
        };
        let guid: [u8; 16] = cursor.take(16)?.try_into().unwrap();
        elements.push(DmxElement {
            type_name,
            name,
            guid,
            attributes: Vec::new(),
        });
    }

    for i in 0..n_elements {
        let count = cursor.read_i32()?;
        let mut attributes = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count.max(0) {
            let name = dict.get(&mut cursor)?;
            let type_id = cursor.read_u8()?;
            let value = read_attr(&mut cursor, type_id, version, &dict, n_elements)?;
            attributes.push((name, value));
        }
        elements[i].attributes = attributes;
    }

    Ok(DmxDocument {
        prologue,
        root: if elements.is_empty() {
            None
        } else {
            Some(DmxHandle(0))
        },
        elements,
    })
}

fn read_element_ref(cursor: &mut VCursor, n_elements: usize) -> Result<Option<DmxHandle>> {
    let index = cursor.read_i32()?;
    match index {
        -1 => Ok(None),
        // external reference by GUID string; nothing to attach it to here
        -2 => {
            let guid = cursor.read_cstr()?;
            log::warn!("unresolved external element reference {}", guid);
            Ok(None)
        }
        i if i >= 0 && (i as usize) < n_elements => Ok(Some(DmxHandle(i as u32))),
        other => Err(SourceError::InvalidEncoding {
            file: "dmx",
            what: format!("element reference {} of {}", other, n_elements),
        }),
    }
}

fn read_attr(
    cursor: &mut VCursor,
    type_id: u8,
    version: i32,
    dict: &StringDict,
    n_elements: usize,
) -> Result<DmxAttr> {
    let array = type_id > 14;
    let scalar_id = if array { type_id - 14 } else { type_id };

    if array {
        let count = cursor.read_i32()?;
        if count < 0 || count as usize > cursor.remaining() {
            return Err(SourceError::InvalidEncoding {
                file: "dmx",
                what: format!("attribute array of {} entries", count),
            });
        }
        let count = count as usize;
        macro_rules! collect {
            ($variant:ident, $read:expr) => {{
                let mut v = Vec::with_capacity(count);
                for _ in 0..count {
                    v.push($read?);
                }
                Ok(DmxAttr::$variant(v))
            }};
        }
        return match scalar_id {
            1 => collect!(ElementArray, read_element_ref(cursor, n_elements)),
            2 => collect!(IntArray, cursor.read_i32()),
            3 => collect!(FloatArray, cursor.read_f32()),
            4 => collect!(BoolArray, cursor.read_u8().map(|b| b != 0)),
            // array-valued strings stay inline in every version
            5 => collect!(StrArray, cursor.read_cstr()),
            6 => collect!(BinaryArray, read_binary(cursor)),
            7 => collect!(TimeArray, read_time(cursor)),
            8 => collect!(ColorArray, read_bytes4(cursor)),
            9 => collect!(Vec2Array, read_f32s::<2>(cursor)),
            10 => collect!(Vec3Array, read_f32s::<3>(cursor)),
            11 => collect!(Vec4Array, read_f32s::<4>(cursor)),
            12 => collect!(QAngleArray, read_f32s::<3>(cursor)),
            13 => collect!(QuatArray, read_f32s::<4>(cursor)),
            14 => collect!(MatrixArray, read_f32s::<16>(cursor)),
            other => Err(unknown_type(other)),
        };
    }

    match scalar_id {
        1 => Ok(DmxAttr::Element(read_element_ref(cursor, n_elements)?)),
        2 => Ok(DmxAttr::Int(cursor.read_i32()?)),
        3 => Ok(DmxAttr::Float(cursor.read_f32()?)),
        4 => Ok(DmxAttr::Bool(cursor.read_u8()? != 0)),
        5 => {
            if version >= 4 {
                Ok(DmxAttr::Str(dict.get(cursor)?))
            } else {
                Ok(DmxAttr::Str(cursor.read_cstr()?))
            }
        }
        6 => Ok(DmxAttr::Binary(read_binary(cursor)?)),
        7 if version < 3 => {
            // ObjectId slot before time values replaced it
            Ok(DmxAttr::Binary(cursor.take(16)?.to_vec()))
        }
        7 => Ok(DmxAttr::Time(read_time(cursor)?)),
        8 => Ok(DmxAttr::Color(read_bytes4(cursor)?)),
        9 => Ok(DmxAttr::Vec2(read_f32s::<2>(cursor)?)),
        10 => Ok(DmxAttr::Vec3(read_f32s::<3>(cursor)?)),
        11 => Ok(DmxAttr::Vec4(read_f32s::<4>(cursor)?)),
        12 => Ok(DmxAttr::QAngle(read_f32s::<3>(cursor)?)),
        13 => Ok(DmxAttr::Quat(read_f32s::<4>(cursor)?)),
        14 => Ok(DmxAttr::Matrix(read_f32s::<16>(cursor)?)),
        other => Err(unknown_type(other)),
    }
}

fn unknown_type(id: u8) -> SourceError {
    SourceError::InvalidEncoding {
        file: "dmx",
        what: format!("attribute type {}", id),
    }
}

fn read_binary(cursor: &mut VCursor) -> Result<Vec<u8>> {
    let len = cursor.read_u32()? as usize;
    Ok(cursor.take(len)?.to_vec())
}

// stored as integer ten-thousandths of a second
fn read_time(cursor: &mut VCursor) -> Result<f32> {
    Ok(cursor.read_i32()? as f32 / 10_000.0)
}

fn read_bytes4(cursor: &mut VCursor) -> Result<[u8; 4]> {
    Ok(cursor.take(4)?.try_into().unwrap())
}

fn read_f32s<const N: usize>(cursor: &mut VCursor) -> Result<[f32; N]> {
    let mut out = [0.0f32; N];
    for v in &mut out {
        *v = cursor.read_f32()?;
    }
    Ok(out)
}
