use std::io::{BufReader, Read, Seek};
use std::mem;

use glam::{Vec2, Vec3};

use crate::binaries::{BinOffset, BinaryData};
use crate::error::{Error, FileType, Result};

pub const VVD_VERSION: i32 = 4;

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct VertexFileHeader {
    pub id: i32,      // MODEL_VERTEX_FILE_ID
    pub version: i32, // MODEL_VERTEX_FILE_VERSION
    pub checksum: i32, // same as the mdl header, ensures sync
    pub num_lods: u32,
    pub num_lod_vertexes: [u32; 8],
    pub num_fixups: u32,
    pub fixup_table_start: BinOffset,
    pub vertex_data_start: BinOffset,
    pub tangent_data_start: BinOffset,
}

impl BinaryData for VertexFileHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Zeroable, bytemuck::Pod)]
pub struct ModelVertex {
    pub bone_weight: [f32; 3],
    pub bone_id: [u8; 3],
    pub num_bones: u8,
    pub pos: Vec3,
    pub norm: Vec3,
    pub uv: Vec2,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Zeroable, bytemuck::Pod)]
pub struct VVDFixup {
    pub lod: i32,
    pub src: i32,
    pub count: i32,
}

pub struct VVD {
    pub header: VertexFileHeader,
    /// Canonical highest-detail vertex array: the fix-up table has already
    /// been applied, so strip-group indices address this directly.
    pub verts: Box<[ModelVertex]>,
}

impl VVD {
    pub fn read<R: Read + Seek>(buffer: &mut BufReader<R>) -> Result<Self> {
        let header = VertexFileHeader::read(buffer, None)?;
        if { header.version } != VVD_VERSION {
            return Err(Error::malformed(FileType::Vvd, "unsupported version"));
        }

        let mut pos = mem::size_of::<VertexFileHeader>() as i64;

        // The raw pool spans vertex_data_start..tangent_data_start and holds
        // every LOD's vertices; without fix-ups only the first
        // num_lod_vertexes[0] records belong to LOD 0.
        let v = { header.vertex_data_start }.index;
        let t = { header.tangent_data_start }.index;
        if t < v || (t - v) % mem::size_of::<ModelVertex>() as i32 != 0 {
            return Err(Error::malformed(FileType::Vvd, "bad vertex pool bounds"));
        }
        let pool_count = (t - v) as usize / mem::size_of::<ModelVertex>();

        let fixups: Box<[VVDFixup]> = { header.fixup_table_start }.read_array_f(
            buffer,
            0,
            &mut pos,
            { header.num_fixups } as usize,
        )?;

        let pool: Box<[ModelVertex]> =
            { header.vertex_data_start }.read_array_f(buffer, 0, &mut pos, pool_count)?;

        let lod_counts = { header.num_lod_vertexes };
        let verts = if fixups.is_empty() {
            let count = lod_counts[0] as usize;
            if count > pool.len() {
                return Err(Error::malformed(FileType::Vvd, "vertex pool truncated"));
            }
            pool[..count].to_vec().into_boxed_slice()
        } else {
            // Fix-ups splice the raw pool into the final LOD 0 order.
            let mut out = Vec::new();
            for fixup in fixups.iter() {
                if { fixup.lod } < 0 {
                    continue;
                }
                let src = { fixup.src };
                let count = { fixup.count };
                if src < 0 || count < 0 || (src + count) as usize > pool.len() {
                    return Err(Error::malformed(FileType::Vvd, "fixup out of range"));
                }
                out.extend_from_slice(&pool[src as usize..(src + count) as usize]);
            }
            out.into_boxed_slice()
        };

        Ok(Self { header, verts })
    }
}
