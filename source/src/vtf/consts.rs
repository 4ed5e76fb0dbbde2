use flagset::flags;
use num_derive::FromPrimitive;

#[derive(Copy, Clone, FromPrimitive, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ImageFormat {
    None = -1,
    Rgba8888 = 0,
    Abgr8888,
    Rgb888,
    Bgr888,
    Rgb565,
    I8,
    Ia88,
    P8,
    A8,
    Rgb888Bluescreen,
    Bgr888Bluescreen,
    Argb8888,
    Bgra8888,
    Dxt1,
    Dxt3,
    Dxt5,
    Bgrx8888,
    Bgr565,
    Bgrx5551,
    Bgra4444,
    Dxt1OneBitAlpha,
    Bgra5551,
    Uv88,
    Uvwq8888,
    Rgba16161616F,
    Rgba16161616,
    Uvlx8888,
}

impl ImageFormat {
    pub fn is_block_compressed(&self) -> bool {
        matches!(
            self,
            ImageFormat::Dxt1 | ImageFormat::Dxt1OneBitAlpha | ImageFormat::Dxt3 | ImageFormat::Dxt5
        )
    }

    /// Size in bytes of one image of `width` x `height` at `mip_level`.
    pub fn bytes_for_size(&self, width: usize, height: usize, mip_level: usize) -> usize {
        let width = (width >> mip_level).max(1);
        let height = (height >> mip_level).max(1);

        // block formats round up to whole 4x4 blocks
        let block_width = width.max(4).div_ceil(4);
        let block_height = height.max(4).div_ceil(4);
        let block_count = block_width * block_height;

        match self {
            ImageFormat::None => 0,
            ImageFormat::Uvlx8888
            | ImageFormat::Uvwq8888
            | ImageFormat::Bgra8888
            | ImageFormat::Argb8888
            | ImageFormat::Rgba8888
            | ImageFormat::Abgr8888
            | ImageFormat::Bgrx8888 => width * height * 4,
            ImageFormat::Rgb888Bluescreen
            | ImageFormat::Bgr888Bluescreen
            | ImageFormat::Rgb888
            | ImageFormat::Bgr888 => width * height * 3,
            ImageFormat::I8 | ImageFormat::P8 | ImageFormat::A8 => width * height,
            // 4x4 block holds 64 bits of color
            ImageFormat::Dxt1 | ImageFormat::Dxt1OneBitAlpha => block_count * 8,
            // 4x4 block holds 64 bits of color and 64 bits of alpha
            ImageFormat::Dxt3 | ImageFormat::Dxt5 => block_count * 16,
            ImageFormat::Ia88
            | ImageFormat::Rgb565
            | ImageFormat::Uv88
            | ImageFormat::Bgra5551
            | ImageFormat::Bgrx5551
            | ImageFormat::Bgr565
            | ImageFormat::Bgra4444 => width * height * 2,
            ImageFormat::Rgba16161616F | ImageFormat::Rgba16161616 => width * height * 8,
        }
    }
}

flags! {
    #[repr(u32)]
    pub enum CompiledVtfFlags: u32 {
        // Flags from the *.txt config file
        POINTSAMPLE = 0x00000001,
        TRILINEAR = 0x00000002,
        CLAMPS = 0x00000004,
        CLAMPT = 0x00000008,
        ANISOTROPIC = 0x00000010,
        HINTDXT5 = 0x00000020,
        PWLCORRECTED = 0x00000040,
        NORMAL = 0x00000080,
        NOMIP = 0x00000100,
        NOLOD = 0x00000200,
        ALLMIPS = 0x00000400,
        PROCEDURAL = 0x00000800,

        // These are automatically generated by vtex from the texture data.
        ONEBITALPHA = 0x00001000,
        EIGHTBITALPHA = 0x00002000,

        // Newer flags from the *.txt config file
        ENVMAP = 0x00004000,
        RENDERTARGET = 0x00008000,
        DEPTHRENDERTARGET = 0x00010000,
        NODEBUGOVERRIDE = 0x00020000,
        SINGLECOPY = 0x00040000,
        PRESRGB = 0x00080000,

        NODEPTHBUFFER = 0x00800000,

        CLAMPU = 0x02000000,
        VERTEXTEXTURE = 0x04000000,
        SSBUMP = 0x08000000,

        BORDER = 0x20000000,
    }
}

#[cfg(test)]
mod consts_tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn formats_roundtrip_their_tags() {
        assert_eq!(ImageFormat::from_i32(0), Some(ImageFormat::Rgba8888));
        assert_eq!(ImageFormat::from_i32(13), Some(ImageFormat::Dxt1));
        assert_eq!(ImageFormat::from_i32(15), Some(ImageFormat::Dxt5));
        assert_eq!(ImageFormat::from_i32(-1), Some(ImageFormat::None));
        assert_eq!(ImageFormat::from_i32(900), None);
    }

    #[test]
    fn mip_sizes() {
        assert_eq!(ImageFormat::Rgba8888.bytes_for_size(16, 16, 0), 1024);
        assert_eq!(ImageFormat::Rgba8888.bytes_for_size(16, 16, 2), 64);
        assert_eq!(ImageFormat::Dxt1.bytes_for_size(16, 16, 0), 128);
        assert_eq!(ImageFormat::Dxt5.bytes_for_size(16, 16, 0), 256);
        // block formats never shrink below one block
        assert_eq!(ImageFormat::Dxt1.bytes_for_size(16, 16, 4), 8);
        assert_eq!(ImageFormat::Bgr888.bytes_for_size(8, 4, 0), 96);
    }
}
