// Pixel format conversion to RGBA8.
//
// Block compressed data is decompressed strictly per 4x4 block; there is no
// state shared between blocks, so block rows are handed to rayon. The
// parallel and serial paths share the same per-block code and produce
// identical bytes.

use rayon::prelude::*;

use common::vcursor::BitCursor;

use crate::error::{Result, SourceError};
use crate::vtf::consts::ImageFormat;

pub fn decode_rgba(
    format: ImageFormat,
    width: usize,
    height: usize,
    data: &[u8],
) -> Result<Vec<u8>> {
    let need = format.bytes_for_size(width, height, 0);
    if data.len() < need {
        return Err(SourceError::InvalidEncoding {
            file: "vtf",
            what: format!(
                "{}x{} {:?} image needs {} bytes, only {} present",
                width,
                height,
                format,
                need,
                data.len()
            ),
        });
    }
    let data = &data[..need];

    if format.is_block_compressed() {
        return Ok(decode_blocks(format, width, height, data, true));
    }

    let n = width * height;
    let mut out = vec![0u8; n * 4];
    match format {
        ImageFormat::Rgba8888 => out.copy_from_slice(data),
        ImageFormat::Abgr8888 => {
            for i in 0..n {
                out[i * 4] = data[i * 4 + 3];
                out[i * 4 + 1] = data[i * 4 + 2];
                out[i * 4 + 2] = data[i * 4 + 1];
                out[i * 4 + 3] = data[i * 4];
            }
        }
        ImageFormat::Argb8888 => {
            for i in 0..n {
                out[i * 4] = data[i * 4 + 1];
                out[i * 4 + 1] = data[i * 4 + 2];
                out[i * 4 + 2] = data[i * 4 + 3];
                out[i * 4 + 3] = data[i * 4];
            }
        }
        ImageFormat::Bgra8888 => {
            for i in 0..n {
                out[i * 4] = data[i * 4 + 2];
                out[i * 4 + 1] = data[i * 4 + 1];
                out[i * 4 + 2] = data[i * 4];
                out[i * 4 + 3] = data[i * 4 + 3];
            }
        }
        ImageFormat::Bgrx8888 => {
            for i in 0..n {
                out[i * 4] = data[i * 4 + 2];
                out[i * 4 + 1] = data[i * 4 + 1];
                out[i * 4 + 2] = data[i * 4];
                out[i * 4 + 3] = 0xff;
            }
        }
        ImageFormat::Rgb888 | ImageFormat::Rgb888Bluescreen => {
            for i in 0..n {
                out[i * 4] = data[i * 3];
                out[i * 4 + 1] = data[i * 3 + 1];
                out[i * 4 + 2] = data[i * 3 + 2];
                out[i * 4 + 3] = 0xff;
            }
        }
        ImageFormat::Bgr888 | ImageFormat::Bgr888Bluescreen => {
            for i in 0..n {
                out[i * 4] = data[i * 3 + 2];
                out[i * 4 + 1] = data[i * 3 + 1];
                out[i * 4 + 2] = data[i * 3];
                out[i * 4 + 3] = 0xff;
            }
        }
        ImageFormat::I8 => {
            for i in 0..n {
                let v = data[i];
                out[i * 4..i * 4 + 4].copy_from_slice(&[v, v, v, 0xff]);
            }
        }
        ImageFormat::Ia88 => {
            for i in 0..n {
                let v = data[i * 2];
                out[i * 4..i * 4 + 4].copy_from_slice(&[v, v, v, data[i * 2 + 1]]);
            }
        }
        ImageFormat::A8 => {
            for i in 0..n {
                out[i * 4..i * 4 + 4].copy_from_slice(&[0, 0, 0, data[i]]);
            }
        }
        ImageFormat::Uv88 => {
            for i in 0..n {
                out[i * 4..i * 4 + 4].copy_from_slice(&[data[i * 2], data[i * 2 + 1], 0, 0xff]);
            }
        }
        ImageFormat::Rgb565 => {
            for i in 0..n {
                let v = u16::from_le_bytes([data[i * 2], data[i * 2 + 1]]);
                let (r, g, b) = rgb565(v);
                out[i * 4..i * 4 + 4].copy_from_slice(&[r, g, b, 0xff]);
            }
        }
        ImageFormat::Bgr565 => {
            for i in 0..n {
                let v = u16::from_le_bytes([data[i * 2], data[i * 2 + 1]]);
                let (b, g, r) = rgb565(v);
                out[i * 4..i * 4 + 4].copy_from_slice(&[r, g, b, 0xff]);
            }
        }
        ImageFormat::Bgra5551 | ImageFormat::Bgrx5551 => {
            for i in 0..n {
                let v = u16::from_le_bytes([data[i * 2], data[i * 2 + 1]]);
                let b = expand5((v & 0x1f) as u8);
                let g = expand5(((v >> 5) & 0x1f) as u8);
                let r = expand5(((v >> 10) & 0x1f) as u8);
                let a = if format == ImageFormat::Bgrx5551 || v & 0x8000 != 0 {
                    0xff
                } else {
                    0
                };
                out[i * 4..i * 4 + 4].copy_from_slice(&[r, g, b, a]);
            }
        }
        ImageFormat::Bgra4444 => {
            for i in 0..n {
                let v = u16::from_le_bytes([data[i * 2], data[i * 2 + 1]]);
                let b = expand4((v & 0xf) as u8);
                let g = expand4(((v >> 4) & 0xf) as u8);
                let r = expand4(((v >> 8) & 0xf) as u8);
                let a = expand4(((v >> 12) & 0xf) as u8);
                out[i * 4..i * 4 + 4].copy_from_slice(&[r, g, b, a]);
            }
        }
        other => {
            return Err(SourceError::UnsupportedFeature {
                file: "vtf",
                what: format!("image format {:?}", other),
            })
        }
    }
    Ok(out)
}

/// Top-down to bottom-up row order. The container stores rows inverted
/// relative to what scene builders consume; the flip is part of the decode
/// contract, not an optional post-process.
pub fn flip_vertical(rgba: &mut [u8], width: usize, height: usize) {
    let stride = width * 4;
    for y in 0..height / 2 {
        let (top, rest) = rgba.split_at_mut((height - 1 - y) * stride);
        let a = &mut top[y * stride..y * stride + stride];
        let b = &mut rest[..stride];
        a.swap_with_slice(b);
    }
}

fn expand5(v: u8) -> u8 {
    (v << 3) | (v >> 2)
}

fn expand4(v: u8) -> u8 {
    (v << 4) | v
}

fn rgb565(v: u16) -> (u8, u8, u8) {
    let r = ((v >> 11) & 0x1f) as u8;
    let g = ((v >> 5) & 0x3f) as u8;
    let b = (v & 0x1f) as u8;
    (expand5(r), (g << 2) | (g >> 4), expand5(b))
}

pub(crate) fn decode_blocks(
    format: ImageFormat,
    width: usize,
    height: usize,
    data: &[u8],
    parallel: bool,
) -> Vec<u8> {
    let block_size = format.bytes_for_size(4, 4, 0);
    let blocks_x = width.max(4).div_ceil(4);
    let band_stride = width * 4 * 4; // four output rows per block row

    let mut out = vec![0u8; width * height * 4];
    let decode_band = |(by, band): (usize, &mut [u8])| {
        for bx in 0..blocks_x {
            let block = &data[(by * blocks_x + bx) * block_size..][..block_size];
            let mut pixels = [0u8; 64];
            match format {
                ImageFormat::Dxt1 | ImageFormat::Dxt1OneBitAlpha => {
                    decode_dxt1_block(block, &mut pixels)
                }
                ImageFormat::Dxt3 => decode_dxt3_block(block, &mut pixels),
                ImageFormat::Dxt5 => decode_dxt5_block(block, &mut pixels),
                _ => unreachable!("not a block format"),
            }
            // clip the 4x4 block against the image edge
            let rows = (height - by * 4).min(4);
            let cols = (width - bx * 4).min(4);
            for row in 0..rows.min(band.len() / (width * 4)) {
                for col in 0..cols {
                    let src = (row * 4 + col) * 4;
                    let dst = row * width * 4 + (bx * 4 + col) * 4;
                    band[dst..dst + 4].copy_from_slice(&pixels[src..src + 4]);
                }
            }
        }
    };

    if parallel {
        out.par_chunks_mut(band_stride).enumerate().for_each(decode_band);
    } else {
        out.chunks_mut(band_stride).enumerate().for_each(decode_band);
    }
    out
}

fn dxt_color_palette(c0: u16, c1: u16, opaque: bool) -> [[u8; 4]; 4] {
    let (r0, g0, b0) = rgb565(c0);
    let (r1, g1, b1) = rgb565(c1);
    let mut palette = [[0u8; 4]; 4];
    palette[0] = [r0, g0, b0, 0xff];
    palette[1] = [r1, g1, b1, 0xff];
    if c0 > c1 || opaque {
        palette[2] = [
            ((2 * r0 as u16 + r1 as u16) / 3) as u8,
            ((2 * g0 as u16 + g1 as u16) / 3) as u8,
            ((2 * b0 as u16 + b1 as u16) / 3) as u8,
            0xff,
        ];
        palette[3] = [
            ((r0 as u16 + 2 * r1 as u16) / 3) as u8,
            ((g0 as u16 + 2 * g1 as u16) / 3) as u8,
            ((b0 as u16 + 2 * b1 as u16) / 3) as u8,
            0xff,
        ];
    } else {
        palette[2] = [
            ((r0 as u16 + r1 as u16) / 2) as u8,
            ((g0 as u16 + g1 as u16) / 2) as u8,
            ((b0 as u16 + b1 as u16) / 2) as u8,
            0xff,
        ];
        palette[3] = [0, 0, 0, 0];
    }
    palette
}

fn decode_color_block(block: &[u8], opaque: bool, pixels: &mut [u8; 64]) {
    let c0 = u16::from_le_bytes([block[0], block[1]]);
    let c1 = u16::from_le_bytes([block[2], block[3]]);
    let palette = dxt_color_palette(c0, c1, opaque);
    let bits = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    for i in 0..16 {
        let sel = ((bits >> (i * 2)) & 0x3) as usize;
        pixels[i * 4..i * 4 + 4].copy_from_slice(&palette[sel]);
    }
}

fn decode_dxt1_block(block: &[u8], pixels: &mut [u8; 64]) {
    decode_color_block(block, false, pixels);
}

fn decode_dxt3_block(block: &[u8], pixels: &mut [u8; 64]) {
    decode_color_block(&block[8..], true, pixels);
    // 4 bits of explicit alpha per pixel
    for i in 0..16 {
        let nibble = (block[i / 2] >> ((i % 2) * 4)) & 0xf;
        pixels[i * 4 + 3] = expand4(nibble);
    }
}

fn decode_dxt5_block(block: &[u8], pixels: &mut [u8; 64]) {
    decode_color_block(&block[8..], true, pixels);

    let a0 = block[0];
    let a1 = block[1];
    let mut alpha = [0u8; 8];
    alpha[0] = a0;
    alpha[1] = a1;
    if a0 > a1 {
        for i in 1..7 {
            alpha[i + 1] = (((7 - i) as u16 * a0 as u16 + i as u16 * a1 as u16) / 7) as u8;
        }
    } else {
        for i in 1..5 {
            alpha[i + 1] = (((5 - i) as u16 * a0 as u16 + i as u16 * a1 as u16) / 5) as u8;
        }
        alpha[6] = 0;
        alpha[7] = 0xff;
    }

    // 16 selectors of 3 bits each, packed LSB first across 6 bytes
    let mut bits = BitCursor::new(&block[2..8]);
    for i in 0..16 {
        let sel = bits.read_bits(3).expect("48 selector bits") as usize;
        pixels[i * 4 + 3] = alpha[sel];
    }
}

#[cfg(test)]
mod decode_tests {
    use super::*;

    #[test]
    fn bgr_gets_an_alpha_channel() {
        // one blue-ish pixel stored BGR
        let out = decode_rgba(ImageFormat::Bgr888, 1, 1, &[200, 100, 50]).unwrap();
        assert_eq!(out, vec![50, 100, 200, 255]);
    }

    #[test]
    fn dxt1_solid_block() {
        // c0 = c1 = pure red in 565, all selectors 0
        let red = 0xf800u16.to_le_bytes();
        let block = [red[0], red[1], red[0], red[1], 0, 0, 0, 0];
        let out = decode_rgba(ImageFormat::Dxt1, 4, 4, &block).unwrap();
        for px in out.chunks(4) {
            assert_eq!(px, &[255, 0, 0, 255]);
        }
    }

    #[test]
    fn dxt5_alpha_selectors() {
        // alpha0 = 255, alpha1 = 0, selectors all 1 -> alpha 0 everywhere;
        // color block transparent-capable but forced opaque palette
        let mut block = [0u8; 16];
        block[0] = 255;
        block[1] = 0;
        // selector value 1 for every pixel: bits 001 repeated
        let mut bits = 0u64;
        for i in 0..16 {
            bits |= 1 << (i * 3);
        }
        block[2..8].copy_from_slice(&bits.to_le_bytes()[..6]);
        let out = decode_rgba(ImageFormat::Dxt5, 4, 4, &block).unwrap();
        for px in out.chunks(4) {
            assert_eq!(px[3], 0);
        }
    }

    #[test]
    fn block_decode_is_parallelism_safe() {
        // 16x8: eight blocks with varied contents
        let mut data = Vec::new();
        for b in 0..8u16 {
            data.extend_from_slice(&(0xf800 | b * 37).to_le_bytes());
            data.extend_from_slice(&(0x001f | b * 11).to_le_bytes());
            data.extend_from_slice(&(0x1234_5678u32 ^ (b as u32) * 0x1111).to_le_bytes());
        }
        let serial = decode_blocks(ImageFormat::Dxt1, 16, 8, &data, false);
        let parallel = decode_blocks(ImageFormat::Dxt1, 16, 8, &data, true);
        assert_eq!(serial, parallel);
    }

    #[test]
    fn flip_inverts_row_order() {
        // 2x2, each pixel tagged by row
        let mut rgba = vec![
            1, 1, 1, 1, 1, 1, 1, 1, //
            2, 2, 2, 2, 2, 2, 2, 2,
        ];
        flip_vertical(&mut rgba, 2, 2);
        assert_eq!(
            rgba,
            vec![
                2, 2, 2, 2, 2, 2, 2, 2, //
                1, 1, 1, 1, 1, 1, 1, 1,
            ]
        );
    }

    #[test]
    fn float_formats_are_refused() {
        let err = decode_rgba(ImageFormat::Rgba16161616F, 1, 1, &[0u8; 8]).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedFeature { .. }));
    }
}
