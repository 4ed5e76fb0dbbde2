use common::vcursor::VCursor;

use crate::binaries::BinaryData;
use crate::bsp::consts::{LumpType, HEADER_LUMPS};
use crate::error::{Result, SourceError};

pub const BSP_MAGIC: [u8; 4] = *b"VBSP";

// https://developer.valvesoftware.com/wiki/BSP_(Source)
#[repr(C, packed)]
#[derive(Debug, Default, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BspLump {
    pub file_ofs: i32,    // offset into file (bytes)
    pub file_len: i32,    // length of lump (bytes)
    pub version: i32,     // lump format version
    pub four_cc: [u8; 4], // lump ident code
}

#[repr(C, packed)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BspHeader {
    pub ident: [u8; 4],                 // BSP file identifier
    pub version: i32,                   // BSP file version
    pub lumps: [BspLump; HEADER_LUMPS], // lump directory array
    pub map_revision: i32,              // the map's revision number
}

impl BinaryData for BspHeader {}

impl BspHeader {
    pub fn read(cursor: &mut VCursor) -> Result<BspHeader> {
        let header = <Self as BinaryData>::read(cursor)?;
        let ident = header.ident;
        if ident != BSP_MAGIC {
            return Err(SourceError::InvalidEncoding {
                file: "bsp",
                what: format!("magic {:?}, expected {:?}", ident, BSP_MAGIC),
            });
        }
        let version = header.version;
        if !(17..=29).contains(&version) {
            return Err(SourceError::UnsupportedFeature {
                file: "bsp",
                what: format!("map version {}", version),
            });
        }
        Ok(header)
    }

    pub fn lump(&self, lump: LumpType) -> BspLump {
        self.lumps[lump as usize]
    }

    /// The lump's byte range out of the whole-file buffer.
    pub fn lump_bytes<'a>(&self, lump: LumpType, data: &'a [u8]) -> Result<&'a [u8]> {
        let entry = self.lump(lump);
        let ofs = entry.file_ofs.max(0) as usize;
        let len = entry.file_len.max(0) as usize;
        if ofs + len > data.len() {
            return Err(SourceError::InvalidEncoding {
                file: "bsp",
                what: format!(
                    "lump {:?} spans {}..{} of a {} byte file",
                    lump,
                    ofs,
                    ofs + len,
                    data.len()
                ),
            });
        }
        Ok(&data[ofs..ofs + len])
    }
}

#[cfg(test)]
mod header_tests {
    use super::*;

    #[test]
    fn layout_matches_the_format() {
        assert_eq!(std::mem::size_of::<BspLump>(), 16);
        assert_eq!(std::mem::size_of::<BspHeader>(), 8 + 64 * 16 + 4);
    }
}
