use crate::binaries::BinaryData;

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct VtfHeader {
    pub signature: [u8; 4], // File signature ("VTF\0")
    pub version: [u32; 2],  // version[0].version[1]
    pub header_size: u32, // Size of the header struct (16 byte aligned) + resource dictionary (7.3+)
    pub width: u16,       // Width of the largest mipmap in pixels. Must be a power of 2.
    pub height: u16,      // Height of the largest mipmap in pixels. Must be a power of 2.
    pub flags: u32,
    pub frames: u16,      // Number of frames, if animated (1 for no animation).
    pub first_frame: u16, // First frame in animation (0 based).
    padding0: [u8; 4],    // reflectivity padding (16 byte alignment)
    pub reflectivity: [f32; 3],
    padding1: [u8; 4], // reflectivity padding (8 byte packing)
    pub bumpmap_scale: f32,
    pub high_res_image_format: i32,
    pub mipmap_count: u8,
    pub low_res_image_format: i32, // always DXT1 when present, -1 when absent
    pub low_res_image_width: u8,
    pub low_res_image_height: u8,
}

impl BinaryData for VtfHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct VtfHeader73 {
    // 7.2+
    pub depth: i16, // Depth of the largest mipmap. 1 for a 2D texture.

    // 7.3+
    padding2: [u8; 3],      // depth padding (4 byte alignment)
    pub num_resources: u32, // Number of resources this vtf has (max 32)

    padding3: [u8; 8],
}

impl BinaryData for VtfHeader73 {}

/// Resource tags
///    { 0x01, 0, 0 } - Low-res (thumbnail) image data.
///    { 0x30, 0, 0 } - High-res image data.
///    { 0x10, 0, 0 } - Animated particle sheet data.
///    { 'C', 'R', 'C' } - CRC data.
///    { 'L', 'O', 'D' } - Texture LOD control information.
///    { 'T', 'S', 'O' } - Game-defined "extended" flags.
///    { 'K', 'V', 'D' } - Arbitrary KeyValues data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResourceEntryInfo {
    pub tag: [u8; 3],
    /// 0x2 marks an entry with no data chunk (the offset field holds the
    /// value itself).
    pub flags: u8,
    pub offset: u32,
}

pub const RSRC_NO_DATA_CHUNK: u8 = 0x02;
pub const TAG_LOW_RES: [u8; 3] = [0x01, 0, 0];
pub const TAG_HIGH_RES: [u8; 3] = [0x30, 0, 0];
