// The game lump is a directory of engine-specific sub-lumps; the one this
// layer decodes is `prps`, the static prop lump: a model name dictionary,
// a leaf table, and fixed-size prop records whose size depends on the
// sub-lump version.

use fixedstr::zstr;
use glam::Vec3;

use common::vcursor::VCursor;

use crate::binaries::BinaryData;
use crate::error::{Result, SourceError};

const STATIC_PROP_ID: [u8; 4] = *b"prps";

#[repr(C, packed)]
#[derive(Debug, Copy, Clone)]
struct GameLumpEntry {
    id: [u8; 4],  // gamelump ID
    flags: u16,   // flags
    version: u16, // gamelump version
    file_ofs: i32, // offset to this gamelump, from the file start
    file_len: i32, // length
}

impl BinaryData for GameLumpEntry {}

#[repr(C, packed)]
#[derive(Debug, Copy, Clone)]
struct PropDictEntry {
    name: zstr<128>, // model name
}

impl BinaryData for PropDictEntry {}

// common to every static prop version this layer handles
#[repr(C, packed)]
#[derive(Debug, Copy, Clone)]
struct StaticPropV4 {
    origin: Vec3,
    angles: Vec3, // pitch yaw roll, degrees
    prop_type: u16,
    first_leaf: u16,
    leaf_count: u16,
    solid: u8,
    flags: u8,
    skin: i32,
    fade_min_dist: f32,
    fade_max_dist: f32,
    lighting_origin: Vec3,
}

impl BinaryData for StaticPropV4 {}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticProp {
    pub model: String,
    pub origin: Vec3,
    pub angles: Vec3,
    pub skin: i32,
    pub solid: u8,
    pub flags: u8,
}

/// Decode the static prop sub-lump out of the game lump bytes.
///
/// `lump_base` is the game lump's offset in the whole file: sub-lump
/// offsets are file-absolute, so the cursor must be over the whole file
/// and the caller passes where the game lump starts.
pub fn read_static_props(
    cursor: &mut VCursor,
    lump_base: usize,
    diagnostics: &mut Vec<SourceError>,
) -> Result<Vec<StaticProp>> {
    cursor.seek(lump_base)?;
    let count = cursor.read_i32()?;
    let mut entry = None;
    for _ in 0..count.max(0) {
        let e = GameLumpEntry::read(cursor)?;
        let id = e.id;
        if id == STATIC_PROP_ID {
            entry = Some(e);
        }
    }
    let Some(entry) = entry else {
        return Ok(Vec::new()); // maps without props are common
    };

    let version = entry.version;
    let record_size = match version {
        4 => 56,
        5 => 60,
        6 => 64,
        other => {
            diagnostics.push(SourceError::UnsupportedFeature {
                file: "bsp",
                what: format!("static prop lump version {}", other),
            });
            return Ok(Vec::new());
        }
    };

    let file_ofs = entry.file_ofs;
    cursor.seek(file_ofs.max(0) as usize)?;

    let dict_count = cursor.read_i32()?;
    let mut names = Vec::with_capacity(dict_count.max(0) as usize);
    for _ in 0..dict_count.max(0) {
        let e = PropDictEntry::read(cursor)?;
        names.push(e.name.to_str().to_ascii_lowercase().replace('\\', "/"));
    }

    let leaf_count = cursor.read_i32()?;
    cursor.skip(leaf_count.max(0) as usize * 2)?;

    let prop_count = cursor.read_i32()?;
    let mut props = Vec::with_capacity(prop_count.max(0) as usize);
    for i in 0..prop_count.max(0) {
        let at = cursor.tell();
        let raw = StaticPropV4::read(cursor)?;
        // later versions append fields this layer does not read
        cursor.seek(at + record_size)?;

        let prop_type = raw.prop_type;
        let Some(model) = names.get(prop_type as usize) else {
            diagnostics.push(SourceError::InvalidEncoding {
                file: "bsp",
                what: format!(
                    "static prop {} references model {} of {}",
                    i,
                    prop_type,
                    names.len()
                ),
            });
            continue;
        };
        props.push(StaticProp {
            model: model.clone(),
            origin: raw.origin,
            angles: raw.angles,
            skin: raw.skin,
            solid: raw.solid,
            flags: raw.flags,
        });
    }
    Ok(props)
}
