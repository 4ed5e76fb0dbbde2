// Bone animation data referenced by the model's animation descriptors.
//
// Each descriptor points at a chain of per-bone records. A record either
// carries a single packed transform (the bone never moves during the
// sequence) or per-axis RLE value tracks that expand to one value per frame.
// Rotation tracks are stored as scaled radian eulers on top of the bone's
// bind rotation; raw rotations are packed 48- or 64-bit quaternions.

use glam::{EulerRot, Quat, Vec3};
use half::f16;

use common::vcursor::{BitCursor, CursorError, VCursor};

use crate::error::{Result, SourceError};
use crate::studio::mdl::{Bone, RawAnimDesc};

const ANIM_RAWPOS: u8 = 0x01;
const ANIM_RAWROT: u8 = 0x02;
const ANIM_ANIMPOS: u8 = 0x04;
const ANIM_ANIMROT: u8 = 0x08;
const ANIM_DELTA: u8 = 0x10;
const ANIM_RAWROT2: u8 = 0x20;

const LAST_BONE: u8 = 255;

#[derive(Debug, Clone, PartialEq)]
pub enum AnimData {
    /// Frame data decoded in place, one entry per frame section.
    Inline(Vec<AnimSection>),
    /// Frame data lives in an external animation block file; kept as a
    /// reference, never decoded here.
    BlockRef { block: i32, offset: i32 },
    /// Descriptor carries no frame data (all-zero sequences).
    Empty,
    /// Known variant with no decoder; the model's diagnostics name it.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimSection {
    pub first_frame: i32,
    pub frame_count: i32,
    pub data: SectionData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionData {
    Tracks(Vec<BoneTrack>),
    BlockRef { block: i32, offset: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Track<T> {
    /// One value for the whole sequence.
    Constant(T),
    /// One value per frame.
    PerFrame(Vec<T>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoneTrack {
    pub bone: u8,
    /// Delta tracks layer on top of another sequence instead of replacing
    /// the bind pose.
    pub delta: bool,
    pub pos: Option<Track<Vec3>>,
    pub rot: Option<Track<Quat>>,
}

pub fn read_anim_data(
    cursor: &mut VCursor,
    desc_pos: usize,
    raw: &RawAnimDesc,
    bones: &[Bone],
) -> Result<AnimData> {
    let frame_count = raw.frame_count;
    let anim_block = raw.anim_block;
    let anim_index = raw.anim_index;
    let section_index = raw.section_index;
    let section_frame_count = raw.section_frame_count;

    if anim_block == 0 && anim_index == 0 {
        return Ok(AnimData::Empty);
    }

    if section_index != 0 && section_frame_count > 0 {
        // Long sequences are split into fixed-size frame sections, each with
        // its own (block, offset) entry.
        let entries = (frame_count / section_frame_count) as usize + 2;
        let mut sections = Vec::new();
        for i in 0..entries {
            let entry_at = desc_pos + section_index as usize + i * 8;
            let (block, index) = cursor
                .with_absolute(entry_at, |c| Ok::<_, CursorError>((c.read_i32()?, c.read_i32()?)))?;
            let first_frame = i as i32 * section_frame_count;
            let frames = (frame_count - first_frame).min(section_frame_count);
            if frames <= 0 || (block == 0 && index == 0) {
                continue;
            }
            let data = if block != 0 {
                SectionData::BlockRef {
                    block,
                    offset: index,
                }
            } else {
                SectionData::Tracks(decode_tracks(
                    cursor,
                    desc_pos + index as usize,
                    frames as usize,
                    bones,
                )?)
            };
            sections.push(AnimSection {
                first_frame,
                frame_count: frames,
                data,
            });
        }
        return Ok(AnimData::Inline(sections));
    }

    if anim_block != 0 {
        return Ok(AnimData::BlockRef {
            block: anim_block,
            offset: anim_index,
        });
    }

    let frames = frame_count.max(1) as usize;
    let tracks = decode_tracks(cursor, desc_pos + anim_index as usize, frames, bones)?;
    Ok(AnimData::Inline(vec![AnimSection {
        first_frame: 0,
        frame_count: frame_count.max(1),
        data: SectionData::Tracks(tracks),
    }]))
}

fn decode_tracks(
    cursor: &mut VCursor,
    start: usize,
    frames: usize,
    bones: &[Bone],
) -> Result<Vec<BoneTrack>> {
    let mut tracks = Vec::new();
    let mut p = start;
    loop {
        cursor.seek(p)?;
        let bone = cursor.read_u8()?;
        let flags = cursor.read_u8()?;
        let next = cursor.read_i16()?;
        if bone == LAST_BONE {
            break;
        }
        if bone as usize >= bones.len() {
            return Err(SourceError::InvalidEncoding {
                file: "mdl",
                what: format!("animation record references bone {}", bone),
            });
        }
        tracks.push(decode_bone_track(cursor, p, bone, flags, frames, &bones[bone as usize])?);
        if next <= 0 {
            break;
        }
        p += next as usize;
    }
    Ok(tracks)
}

fn decode_bone_track(
    cursor: &mut VCursor,
    record: usize,
    bone: u8,
    flags: u8,
    frames: usize,
    bind: &Bone,
) -> Result<BoneTrack> {
    let delta = flags & ANIM_DELTA != 0;
    // payload starts right after the 4-byte record header
    let q = record + 4;

    let rot = if flags & ANIM_ANIMROT != 0 {
        let x = read_rle_values(cursor, q, 0, frames)?;
        let y = read_rle_values(cursor, q, 1, frames)?;
        let z = read_rle_values(cursor, q, 2, frames)?;
        let mut quats = Vec::with_capacity(frames);
        for f in 0..frames {
            let mut e = Vec3::new(
                x[f] * bind.rot_scale.x,
                y[f] * bind.rot_scale.y,
                z[f] * bind.rot_scale.z,
            );
            if !delta {
                e += bind.rot;
            }
            quats.push(quat_from_radian_euler(e));
        }
        Some(Track::PerFrame(quats))
    } else if flags & ANIM_RAWROT != 0 {
        Some(Track::Constant(cursor.with_absolute(q, read_quat48)?))
    } else if flags & ANIM_RAWROT2 != 0 {
        Some(Track::Constant(cursor.with_absolute(q, read_quat64)?))
    } else {
        None
    };

    let pos = if flags & ANIM_ANIMPOS != 0 {
        // the position value pointer sits after the rotation one when both
        // are RLE tracks
        let vp = q + if flags & ANIM_ANIMROT != 0 { 6 } else { 0 };
        let x = read_rle_values(cursor, vp, 0, frames)?;
        let y = read_rle_values(cursor, vp, 1, frames)?;
        let z = read_rle_values(cursor, vp, 2, frames)?;
        let mut out = Vec::with_capacity(frames);
        for f in 0..frames {
            let mut v = Vec3::new(
                x[f] * bind.pos_scale.x,
                y[f] * bind.pos_scale.y,
                z[f] * bind.pos_scale.z,
            );
            if !delta {
                v += bind.pos;
            }
            out.push(v);
        }
        Some(Track::PerFrame(out))
    } else if flags & ANIM_RAWPOS != 0 {
        let at = q
            + if flags & ANIM_RAWROT != 0 { 6 } else { 0 }
            + if flags & ANIM_RAWROT2 != 0 { 8 } else { 0 };
        Some(Track::Constant(cursor.with_absolute(at, read_vec48)?))
    } else {
        None
    };

    Ok(BoneTrack {
        bone,
        delta,
        pos,
        rot,
    })
}

/// Expand one axis of an RLE value stream to a value per frame.
///
/// The stream is a chain of (valid, total) spans: `valid` stored values,
/// held for `total` frames (the last stored value repeats for the tail of
/// the span). A zero axis offset means the axis never moves.
fn read_rle_values(
    cursor: &mut VCursor,
    valueptr: usize,
    axis: usize,
    frames: usize,
) -> Result<Vec<f32>> {
    let offset = cursor.with_absolute(valueptr + axis * 2, |c| c.read_i16())?;
    if offset == 0 {
        return Ok(vec![0.0; frames]);
    }
    if offset < 0 {
        return Err(SourceError::InvalidEncoding {
            file: "mdl",
            what: format!("negative animation value offset {}", offset),
        });
    }

    let mut spans: Vec<(usize, usize, Vec<i16>)> = Vec::new();
    cursor.with_absolute(valueptr + offset as usize, |c| {
        let mut covered = 0usize;
        while covered < frames {
            let valid = c.read_u8()? as usize;
            let total = c.read_u8()? as usize;
            if total == 0 {
                return Err(SourceError::InvalidEncoding {
                    file: "mdl",
                    what: "zero-length animation value span".to_owned(),
                });
            }
            let mut values = Vec::with_capacity(valid);
            for _ in 0..valid {
                values.push(c.read_i16()?);
            }
            covered += total;
            spans.push((valid, total, values));
        }
        Ok(())
    })?;

    let mut out = Vec::with_capacity(frames);
    for frame in 0..frames {
        let mut k = frame;
        let mut value = 0i16;
        for (valid, total, values) in &spans {
            if k < *total {
                value = if k < *valid {
                    values[k]
                } else {
                    values.last().copied().unwrap_or(0)
                };
                break;
            }
            k -= total;
        }
        out.push(value as f32);
    }
    Ok(out)
}

/// Roll/pitch/yaw radians composed yaw-first, matching how the compiler
/// built the stored quaternions.
pub fn quat_from_radian_euler(e: Vec3) -> Quat {
    Quat::from_euler(EulerRot::ZYX, e.z, e.y, e.x)
}

fn read_quat48(c: &mut VCursor) -> std::result::Result<Quat, CursorError> {
    let xs = c.read_u16()?;
    let ys = c.read_u16()?;
    let zs = c.read_u16()?;
    let x = (xs as i32 - 32768) as f32 / 32768.0;
    let y = (ys as i32 - 32768) as f32 / 32768.0;
    let z = ((zs & 0x7fff) as i32 - 16384) as f32 / 16384.0;
    let w = (1.0 - x * x - y * y - z * z).max(0.0).sqrt();
    let w = if zs & 0x8000 != 0 { -w } else { w };
    Ok(Quat::from_xyzw(x, y, z, w))
}

fn read_quat64(c: &mut VCursor) -> std::result::Result<Quat, CursorError> {
    let bytes = c.take(8)?;
    let mut bits = BitCursor::new(bytes);
    let xv = bits.read_bits(21)? as i64;
    let yv = bits.read_bits(21)? as i64;
    let zv = bits.read_bits(21)? as i64;
    let wneg = bits.read_bits(1)? != 0;
    let x = (xv - 1048576) as f32 * (1.0 / 1048576.5);
    let y = (yv - 1048576) as f32 * (1.0 / 1048576.5);
    let z = (zv - 1048576) as f32 * (1.0 / 1048576.5);
    let w = (1.0 - x * x - y * y - z * z).max(0.0).sqrt();
    Ok(Quat::from_xyzw(x, y, z, if wneg { -w } else { w }))
}

fn read_vec48(c: &mut VCursor) -> std::result::Result<Vec3, CursorError> {
    let x = f16::from_bits(c.read_u16()?).to_f32();
    let y = f16::from_bits(c.read_u16()?).to_f32();
    let z = f16::from_bits(c.read_u16()?).to_f32();
    Ok(Vec3::new(x, y, z))
}

#[cfg(test)]
mod anim_tests {
    use super::*;

    fn test_bone() -> Bone {
        Bone {
            name: "root".to_owned(),
            parent: -1,
            pos: Vec3::new(1.0, 2.0, 3.0),
            quat: Quat::IDENTITY,
            rot: Vec3::ZERO,
            pos_scale: Vec3::splat(0.5),
            rot_scale: Vec3::splat(0.25),
            flags: 0,
        }
    }

    #[test]
    fn quat48_identity() {
        let data = [
            0x00u8, 0x80, // x = 32768
            0x00, 0x80, // y = 32768
            0x00, 0x40, // z = 16384, w positive
        ];
        let mut c = VCursor::new(&data);
        let q = read_quat48(&mut c).unwrap();
        assert_eq!(q, Quat::from_xyzw(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn quat64_identity() {
        // x = y = z = 1048576, w sign clear
        let mut v: u64 = 0;
        v |= 1048576;
        v |= 1048576 << 21;
        v |= 1048576 << 42;
        let data = v.to_le_bytes();
        let mut c = VCursor::new(&data);
        let q = read_quat64(&mut c).unwrap();
        assert_eq!(q, Quat::from_xyzw(0.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn vec48_roundtrip() {
        let mut data = Vec::new();
        for v in [1.0f32, -2.5, 0.25] {
            data.extend_from_slice(&f16::from_f32(v).to_bits().to_le_bytes());
        }
        let mut c = VCursor::new(&data);
        assert_eq!(read_vec48(&mut c).unwrap(), Vec3::new(1.0, -2.5, 0.25));
    }

    #[test]
    fn rle_track_expands_spans() {
        // valueptr at 0: x axis stream at +6, y and z static
        let mut data = Vec::new();
        data.extend_from_slice(&6i16.to_le_bytes()); // x offset
        data.extend_from_slice(&0i16.to_le_bytes()); // y offset
        data.extend_from_slice(&0i16.to_le_bytes()); // z offset
        // span: 2 valid of 4 total, values 10, 20
        data.push(2);
        data.push(4);
        data.extend_from_slice(&10i16.to_le_bytes());
        data.extend_from_slice(&20i16.to_le_bytes());

        let mut c = VCursor::new(&data);
        let x = read_rle_values(&mut c, 0, 0, 4).unwrap();
        assert_eq!(x, vec![10.0, 20.0, 20.0, 20.0]);
        let y = read_rle_values(&mut c, 0, 1, 4).unwrap();
        assert_eq!(y, vec![0.0; 4]);
    }

    #[test]
    fn raw_transform_record() {
        // one record: bone 0, RAWROT | RAWPOS, then quat48 identity + vec48
        let mut data = Vec::new();
        data.push(0); // bone
        data.push(ANIM_RAWROT | ANIM_RAWPOS);
        data.extend_from_slice(&0i16.to_le_bytes()); // no next record
        data.extend_from_slice(&[0x00, 0x80, 0x00, 0x80, 0x00, 0x40]); // quat48
        for v in [4.0f32, 5.0, 6.0] {
            data.extend_from_slice(&f16::from_f32(v).to_bits().to_le_bytes());
        }

        let bones = vec![test_bone()];
        let mut c = VCursor::new(&data);
        let tracks = decode_tracks(&mut c, 0, 3, &bones).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].rot, Some(Track::Constant(Quat::IDENTITY)));
        assert_eq!(
            tracks[0].pos,
            Some(Track::Constant(Vec3::new(4.0, 5.0, 6.0)))
        );
    }

    #[test]
    fn rle_rotation_applies_scale_and_bind() {
        // record: bone 0, ANIMROT; valueptr with x stream, 2 frames
        let mut data = Vec::new();
        data.push(0);
        data.push(ANIM_ANIMROT);
        data.extend_from_slice(&0i16.to_le_bytes());
        // valueptr at 4: x at +6, y/z static
        data.extend_from_slice(&6i16.to_le_bytes());
        data.extend_from_slice(&0i16.to_le_bytes());
        data.extend_from_slice(&0i16.to_le_bytes());
        data.push(2);
        data.push(2);
        data.extend_from_slice(&0i16.to_le_bytes());
        data.extend_from_slice(&2i16.to_le_bytes());

        let bones = vec![test_bone()];
        let mut c = VCursor::new(&data);
        let tracks = decode_tracks(&mut c, 0, 2, &bones).unwrap();
        let Some(Track::PerFrame(quats)) = &tracks[0].rot else {
            panic!("expected per-frame rotation");
        };
        assert_eq!(quats[0], Quat::IDENTITY);
        // frame 1: roll of 2 * 0.25 radians
        let expected = quat_from_radian_euler(Vec3::new(0.5, 0.0, 0.0));
        assert!((quats[1].dot(expected) - 1.0).abs() < 1e-6);
    }
}
