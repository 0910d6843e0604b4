//! Per-bone animation streams. A stream is a walk of 4-byte bone headers
//! (`bone, flags, next_offset`), each followed by a union shaped by the
//! flag byte. Streams live embedded in the mdl or in the external ANI blob.

use bitflags::bitflags;
use glam::{EulerRot, Quat, Vec3};
use half::f16;

use crate::error::{Error, FileType, Result};
use crate::studio::mdl::{MDL, MDLAnimDesc, ANIM_BLOCK_EMBEDDED};

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct BoneAnimFlags: u8 {
        /// Position inline, 3 x float16 per frame.
        const RAW_POS = 0x01;
        /// Rotation inline as 48-bit packed data; decoding it is still a
        /// TODO upstream, the bone keeps its rest rotation.
        const RAW_ROT = 0x02;
        /// Position as three RLE channels.
        const ANIM_POS = 0x04;
        /// Rotation (euler) as three RLE channels.
        const ANIM_ROT = 0x08;
        /// Stream is a delta from the rest pose.
        const DELTA = 0x10;
        /// Rotation inline, 64-bit packed quaternion per frame.
        const RAW_ROT2 = 0x20;
    }
}

/// Parent-local bone transform for one frame.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BonePose {
    pub position: Vec3,
    pub rotation: Quat,
}

fn u8_at(data: &[u8], pos: usize) -> Result<u8> {
    data.get(pos)
        .copied()
        .ok_or(Error::malformed(FileType::Ani, "stream truncated"))
}

fn i16_at(data: &[u8], pos: usize) -> Result<i16> {
    Ok(i16::from_le_bytes([
        u8_at(data, pos)?,
        u8_at(data, pos + 1)?,
    ]))
}

fn f32_at(data: &[u8], pos: usize) -> Result<f32> {
    let mut b = [0u8; 4];
    for (i, out) in b.iter_mut().enumerate() {
        *out = u8_at(data, pos + i)?;
    }
    Ok(f32::from_le_bytes(b))
}

/// IEEE half to f32; NaN collapses to 0 and infinities saturate to the
/// largest finite half value.
fn f16_at(data: &[u8], pos: usize) -> Result<f32> {
    let bits = u16::from_le_bytes([u8_at(data, pos)?, u8_at(data, pos + 1)?]);
    let v = f16::from_bits(bits).to_f32();
    if v.is_nan() {
        return Ok(0.0);
    }
    Ok(v.clamp(-65504.0, 65504.0))
}

/// 21:21:21:1 packed quaternion: w is reconstructed from the unit norm,
/// negated when the top bit of byte 7 is set.
fn quat64_at(data: &[u8], pos: usize) -> Result<Quat> {
    let mut b = [0u8; 8];
    for (i, out) in b.iter_mut().enumerate() {
        *out = u8_at(data, pos + i)?;
    }
    let raw = u64::from_le_bytes(b);

    let unpack = |v: u64| (v as f32 - 1048576.0) / 1048576.5;
    let x = unpack(raw & 0x1f_ffff);
    let y = unpack((raw >> 21) & 0x1f_ffff);
    let z = unpack((raw >> 42) & 0x1f_ffff);

    let mut w = (1.0 - x * x - y * y - z * z).max(0.0).sqrt();
    if raw >> 63 != 0 {
        w = -w;
    }
    Ok(Quat::from_xyzw(x, y, z, w))
}

/// Decode one RLE value channel: `(valid, total)` span headers, `valid`
/// scaled 16-bit values, then the last value held for `total - valid`
/// frames, repeated until `frame_count` values exist.
fn extract_anim_values(
    data: &[u8],
    mut pos: usize,
    frame_count: usize,
    scale: f32,
) -> Result<Vec<f32>> {
    let mut out = Vec::with_capacity(frame_count);

    while out.len() < frame_count {
        let valid = u8_at(data, pos)?;
        let total = u8_at(data, pos + 1)?;
        pos += 2;
        if total == 0 {
            return Err(Error::malformed(FileType::Ani, "empty rle span"));
        }

        let mut last = out.last().copied().unwrap_or(0.0);
        for _ in 0..valid {
            last = i16_at(data, pos)? as f32 * scale;
            pos += 2;
            if out.len() < frame_count {
                out.push(last);
            }
        }
        for _ in valid..total {
            if out.len() < frame_count {
                out.push(last);
            }
        }
    }

    Ok(out)
}

/// Decode every frame of an anim descriptor into parent-local bone poses,
/// `frames[frame][bone]`. Bones the stream does not touch keep their rest
/// transform.
pub fn decode_frames(
    mdl: &MDL,
    mdl_bytes: &[u8],
    ani_bytes: Option<&[u8]>,
    desc_index: usize,
) -> Result<Vec<Vec<BonePose>>> {
    let desc = mdl
        .anim_descs
        .get(desc_index)
        .ok_or(Error::malformed(FileType::Mdl, "anim desc out of range"))?;

    let (data, start) = locate_stream(mdl, mdl_bytes, ani_bytes, desc)?;

    let frame_count = desc.frame_count.max(1) as usize;
    let rest: Vec<BonePose> = mdl
        .bones
        .iter()
        .map(|b| BonePose {
            position: b.position,
            rotation: b.quat,
        })
        .collect();
    let mut frames = vec![rest; frame_count];

    let mut seen = vec![false; mdl.bones.len()];
    let mut pos = start;

    loop {
        let bone_index = u8_at(data, pos)? as usize;
        if bone_index == 255 {
            break;
        }
        if bone_index >= mdl.bones.len() {
            return Err(Error::malformed(FileType::Ani, "bone index out of range"));
        }
        // A repeated bone means the walk ran off the table; stop with what
        // was decoded so far.
        if seen[bone_index] {
            break;
        }
        seen[bone_index] = true;

        let flags = BoneAnimFlags::from_bits_truncate(u8_at(data, pos + 1)?);
        let next_offset = i16_at(data, pos + 2)?;

        decode_bone(mdl, data, pos, flags, bone_index, frame_count, &mut frames)?;

        if next_offset == 0 {
            break;
        }
        pos = (pos as i64 + next_offset as i64) as usize;
    }

    Ok(frames)
}

fn locate_stream<'a>(
    mdl: &MDL,
    mdl_bytes: &'a [u8],
    ani_bytes: Option<&'a [u8]>,
    desc: &MDLAnimDesc,
) -> Result<(&'a [u8], usize)> {
    if desc.anim_block == ANIM_BLOCK_EMBEDDED {
        Ok((mdl_bytes, (desc.pos + desc.anim_offset as i64) as usize))
    } else {
        let (data_start, _data_end) = *mdl
            .anim_blocks
            .get(desc.anim_block as usize)
            .ok_or(Error::malformed(FileType::Mdl, "anim block out of range"))?;
        let ani = ani_bytes.ok_or(Error::malformed(FileType::Ani, "external block missing"))?;
        Ok((ani, (data_start + desc.anim_offset) as usize))
    }
}

fn decode_bone(
    mdl: &MDL,
    data: &[u8],
    header_pos: usize,
    flags: BoneAnimFlags,
    bone_index: usize,
    frame_count: usize,
    frames: &mut [Vec<BonePose>],
) -> Result<()> {
    let bone = &mdl.bones[bone_index];
    let base = header_pos + 4;

    if flags.intersects(BoneAnimFlags::ANIM_POS | BoneAnimFlags::ANIM_ROT) {
        // Union: six i16 channel offsets (pos xyz, euler xyz) relative to
        // `base`, then 16 bytes of padding. Offset zero means the channel
        // is absent and contributes no delta.
        let mut offsets = [0i16; 6];
        for (i, off) in offsets.iter_mut().enumerate() {
            *off = i16_at(data, base + 2 * i)?;
        }

        let mut channels: [Option<Vec<f32>>; 6] = Default::default();
        if flags.contains(BoneAnimFlags::ANIM_POS) {
            for axis in 0..3 {
                if offsets[axis] != 0 {
                    channels[axis] = Some(extract_anim_values(
                        data,
                        (base as i64 + offsets[axis] as i64) as usize,
                        frame_count,
                        bone.position_scale[axis],
                    )?);
                }
            }
        }
        if flags.contains(BoneAnimFlags::ANIM_ROT) {
            for axis in 0..3 {
                if offsets[3 + axis] != 0 {
                    channels[3 + axis] = Some(extract_anim_values(
                        data,
                        (base as i64 + offsets[3 + axis] as i64) as usize,
                        frame_count,
                        bone.rotation_scale[axis],
                    )?);
                }
            }
        }

        let delta = |channels: &[Option<Vec<f32>>; 6], slot: usize, frame: usize| {
            channels[slot].as_ref().map_or(0.0, |v| v[frame])
        };

        for frame in 0..frame_count {
            let pose = &mut frames[frame][bone_index];
            if flags.contains(BoneAnimFlags::ANIM_POS) {
                pose.position = bone.position
                    + Vec3::new(
                        delta(&channels, 0, frame),
                        delta(&channels, 1, frame),
                        delta(&channels, 2, frame),
                    );
            }
            if flags.contains(BoneAnimFlags::ANIM_ROT) {
                let e = bone.rotation
                    + Vec3::new(
                        delta(&channels, 3, frame),
                        delta(&channels, 4, frame),
                        delta(&channels, 5, frame),
                    );
                pose.rotation = Quat::from_euler(EulerRot::ZYX, e.z, e.y, e.x);
            }
        }
    } else if flags
        .intersects(BoneAnimFlags::RAW_POS | BoneAnimFlags::RAW_ROT | BoneAnimFlags::RAW_ROT2)
    {
        // Inline per-frame data, rotation stream first.
        let mut cursor = base;

        if flags.contains(BoneAnimFlags::RAW_ROT2) {
            for frame in 0..frame_count {
                frames[frame][bone_index].rotation = quat64_at(data, cursor)?;
                cursor += 8;
            }
        } else if flags.contains(BoneAnimFlags::RAW_ROT) {
            // Quaternion48 decode is still unresolved upstream; advance
            // past the data and keep the rest rotation.
            cursor += 6 * frame_count;
        }

        if flags.contains(BoneAnimFlags::RAW_POS) {
            for frame in 0..frame_count {
                let x = f16_at(data, cursor)?;
                let y = f16_at(data, cursor + 2)?;
                let z = f16_at(data, cursor + 4)?;
                frames[frame][bone_index].position = Vec3::new(x, y, z);
                cursor += 6;
            }
        }
    } else {
        // 28-byte static pose, replicated over every frame.
        let position = Vec3::new(f32_at(data, base)?, f32_at(data, base + 4)?, f32_at(data, base + 8)?);
        let rotation = Quat::from_xyzw(
            f32_at(data, base + 12)?,
            f32_at(data, base + 16)?,
            f32_at(data, base + 20)?,
            f32_at(data, base + 24)?,
        );
        for frame in frames.iter_mut() {
            frame[bone_index] = BonePose { position, rotation };
        }
    }

    Ok(())
}
