// Valve Texture File: a mip-mapped, optionally block-compressed image
// container. Versions 7.0 through 7.2 lay the thumbnail and mip chain out
// directly after the header; 7.3+ adds a resource dictionary that locates
// them instead. Mipmaps are stored smallest to largest.

pub mod consts;
pub mod decode;
mod header;

use num_traits::FromPrimitive;

use common::vcursor::VCursor;

use crate::binaries::BinaryData;
use crate::error::{Result, SourceError};

pub use self::consts::{CompiledVtfFlags, ImageFormat};
pub use self::header::{ResourceEntryInfo, VtfHeader, VtfHeader73};
use self::header::{RSRC_NO_DATA_CHUNK, TAG_HIGH_RES};

pub const VTF_SIGNATURE: [u8; 4] = *b"VTF\0";

/// A parsed texture container. Pixel data is kept as the raw mip chain;
/// [`Vtf::decode`] converts the largest mip to RGBA8.
pub struct Vtf {
    pub header: VtfHeader,
    pub header_7_3: Option<VtfHeader73>,
    pub resources: Vec<ResourceEntryInfo>,
    high_res_data: Vec<u8>,
}

/// RGBA8 pixels of the highest-detail mip, rows bottom-up.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTexture {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub rgba: Vec<u8>,
}

impl Vtf {
    pub fn read(data: &[u8]) -> Result<Vtf> {
        let mut cursor = VCursor::new(data);
        let header = VtfHeader::read(&mut cursor)?;

        let signature = header.signature;
        if signature != VTF_SIGNATURE {
            return Err(SourceError::InvalidEncoding {
                file: "vtf",
                what: format!("signature {:?}, expected {:?}", signature, VTF_SIGNATURE),
            });
        }
        let version = header.version;
        if version[0] != 7 || version[1] > 5 {
            return Err(SourceError::UnsupportedFeature {
                file: "vtf",
                what: format!("container version {}.{}", version[0], version[1]),
            });
        }
        let width = header.width;
        let height = header.height;
        if width == 0 || height == 0 || width > 8192 || height > 8192 {
            return Err(SourceError::InvalidEncoding {
                file: "vtf",
                what: format!("{}x{} image dimensions", width, height),
            });
        }

        let format = Self::image_format(&header)?;
        let header_size = header.header_size as usize;

        let mut header_7_3 = None;
        let mut resources = Vec::new();
        if version[1] >= 3 {
            let h73 = VtfHeader73::read(&mut cursor)?;
            let num_resources = h73.num_resources;
            for _ in 0..num_resources {
                // tag and flags are one big-endian word, the offset is
                // little-endian like everything else
                let word = cursor.read_u32_be()?;
                resources.push(ResourceEntryInfo {
                    tag: [(word >> 24) as u8, (word >> 16) as u8, (word >> 8) as u8],
                    flags: word as u8,
                    offset: cursor.read_u32()?,
                });
            }
            header_7_3 = Some(h73);
        }

        let high_res_offset = if version[1] >= 3 {
            let Some(entry) = resources
                .iter()
                .find(|e| e.tag == TAG_HIGH_RES && e.flags & RSRC_NO_DATA_CHUNK == 0)
            else {
                return Err(SourceError::InvalidEncoding {
                    file: "vtf",
                    what: "missing high-res image resource".to_owned(),
                });
            };
            entry.offset as usize
        } else {
            // thumbnail sits between the header and the mip chain
            let low_res = Self::low_res_size(&header);
            header_size + low_res
        };

        let mip_chain_len = Self::mip_chain_len(&header, format);
        if high_res_offset + mip_chain_len > data.len() {
            return Err(SourceError::InvalidEncoding {
                file: "vtf",
                what: format!(
                    "mip chain of {} bytes at offset {} exceeds {} byte file",
                    mip_chain_len,
                    high_res_offset,
                    data.len()
                ),
            });
        }

        Ok(Vtf {
            header,
            header_7_3,
            resources,
            high_res_data: data[high_res_offset..high_res_offset + mip_chain_len].to_vec(),
        })
    }

    pub fn width(&self) -> u32 {
        let width = self.header.width;
        width as u32
    }

    pub fn height(&self) -> u32 {
        let height = self.header.height;
        height as u32
    }

    pub fn format(&self) -> Result<ImageFormat> {
        Self::image_format(&self.header)
    }

    fn image_format(header: &VtfHeader) -> Result<ImageFormat> {
        let tag = header.high_res_image_format;
        ImageFormat::from_i32(tag).ok_or(SourceError::UnsupportedFeature {
            file: "vtf",
            what: format!("image format tag {}", tag),
        })
    }

    fn low_res_size(header: &VtfHeader) -> usize {
        let format = header.low_res_image_format;
        match ImageFormat::from_i32(format) {
            Some(f) => f.bytes_for_size(
                header.low_res_image_width as usize,
                header.low_res_image_height as usize,
                0,
            ),
            None => 0,
        }
    }

    fn mip_chain_len(header: &VtfHeader, format: ImageFormat) -> usize {
        let width = header.width as usize;
        let height = header.height as usize;
        let frames = header.frames;
        let frames = (frames as usize).max(1);
        let mut len = 0;
        for mip in 0..header.mipmap_count as usize {
            len += format.bytes_for_size(width, height, mip) * frames;
        }
        len
    }

    /// Decode frame 0 of the largest mip to an RGBA8 buffer, flipped to
    /// bottom-up row order.
    pub fn decode(&self) -> Result<DecodedTexture> {
        let format = Self::image_format(&self.header)?;
        let width = self.width() as usize;
        let height = self.height() as usize;
        let frames = self.header.frames;
        let frames = (frames as usize).max(1);

        // skip the smaller mips stored in front of the largest one
        let mut offset = 0;
        for mip in (1..self.header.mipmap_count as usize).rev() {
            offset += format.bytes_for_size(width, height, mip) * frames;
        }

        let top_len = format.bytes_for_size(width, height, 0);
        if offset + top_len > self.high_res_data.len() {
            return Err(SourceError::InvalidEncoding {
                file: "vtf",
                what: "mip chain shorter than its header claims".to_owned(),
            });
        }

        let mut rgba = decode::decode_rgba(
            format,
            width,
            height,
            &self.high_res_data[offset..offset + top_len],
        )?;
        decode::flip_vertical(&mut rgba, width, height);

        Ok(DecodedTexture {
            width: width as u32,
            height: height as u32,
            format,
            rgba,
        })
    }
}

#[cfg(test)]
mod vtf_tests {
    use super::*;
    use crate::studio::test_fixtures::as_bytes;
    use std::mem;

    /// Build a 7.1 or 7.3 container around the given mip chain (smallest
    /// mip first).
    fn vtf_fixture(
        minor: u32,
        format: ImageFormat,
        width: u16,
        height: u16,
        mips: u8,
        chain: &[u8],
    ) -> Vec<u8> {
        let mut header: VtfHeader = unsafe { mem::zeroed() };
        header.signature = VTF_SIGNATURE;
        header.version = [7, minor];
        header.width = width;
        header.height = height;
        header.frames = 1;
        header.high_res_image_format = format as i32;
        header.mipmap_count = mips;
        header.low_res_image_format = ImageFormat::None as i32;

        if minor >= 3 {
            let mut h73: VtfHeader73 = unsafe { mem::zeroed() };
            h73.depth = 1;
            h73.num_resources = 2;
            let header_size = 63 + 17 + 2 * 8;
            header.header_size = header_size as u32;

            let mut buf = Vec::new();
            buf.extend_from_slice(as_bytes(&header));
            buf.extend_from_slice(as_bytes(&h73));
            // CRC entry, value carried inline
            buf.extend_from_slice(&[b'C', b'R', b'C', 0x02]);
            buf.extend_from_slice(&0xdead_beefu32.to_le_bytes());
            // high-res entry
            buf.extend_from_slice(&[0x30, 0, 0, 0]);
            buf.extend_from_slice(&(header_size as u32).to_le_bytes());
            buf.extend_from_slice(chain);
            buf
        } else {
            header.header_size = 64;
            let mut buf = Vec::new();
            buf.extend_from_slice(as_bytes(&header));
            buf.push(0); // header padding up to header_size
            buf.extend_from_slice(chain);
            buf
        }
    }

    fn two_mip_rgba_chain() -> Vec<u8> {
        // 2x2 mip of grey, then a 4x4 top mip with row-tagged pixels
        let mut chain = Vec::new();
        chain.extend(std::iter::repeat(128u8).take(2 * 2 * 4));
        for row in 0..4u8 {
            for _col in 0..4 {
                chain.extend_from_slice(&[row, 0, 0, 255]);
            }
        }
        chain
    }

    #[test]
    fn decodes_dimensions_exactly() {
        let data = vtf_fixture(1, ImageFormat::Rgba8888, 4, 4, 2, &two_mip_rgba_chain());
        let vtf = Vtf::read(&data).unwrap();
        let tex = vtf.decode().unwrap();
        assert_eq!((tex.width, tex.height), (4, 4));
        assert_eq!(tex.rgba.len(), 4 * 4 * 4);
    }

    #[test]
    fn picks_the_largest_mip_and_flips_it() {
        let data = vtf_fixture(1, ImageFormat::Rgba8888, 4, 4, 2, &two_mip_rgba_chain());
        let tex = Vtf::read(&data).unwrap().decode().unwrap();
        // source row 3 (bottom) must now be row 0
        assert_eq!(tex.rgba[0], 3);
        assert_eq!(tex.rgba[(3 * 4) * 4], 0);
        // and nothing from the 2x2 grey mip leaked in
        assert!(tex.rgba.iter().all(|&b| b != 128));
    }

    #[test]
    fn reads_a_7_3_resource_dictionary() {
        let data = vtf_fixture(3, ImageFormat::Rgba8888, 4, 4, 2, &two_mip_rgba_chain());
        let vtf = Vtf::read(&data).unwrap();
        assert_eq!(vtf.resources.len(), 2);
        assert_eq!(vtf.resources[0].tag, *b"CRC");
        let tex = vtf.decode().unwrap();
        assert_eq!(tex.rgba[0], 3);
    }

    #[test]
    fn truncated_mip_chain_is_rejected() {
        let chain = two_mip_rgba_chain();
        let data = vtf_fixture(1, ImageFormat::Rgba8888, 4, 4, 2, &chain[..chain.len() - 8]);
        assert!(matches!(
            Vtf::read(&data),
            Err(SourceError::InvalidEncoding { file: "vtf", .. })
        ));
    }

    #[test]
    fn bad_signature_is_rejected() {
        let mut data = vtf_fixture(1, ImageFormat::Rgba8888, 4, 4, 2, &two_mip_rgba_chain());
        data[0] = b'D';
        assert!(matches!(
            Vtf::read(&data),
            Err(SourceError::InvalidEncoding { file: "vtf", .. })
        ));
    }
}
