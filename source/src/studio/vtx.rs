//! Optimized strip tree. Every table is addressed by a `(count, offset)`
//! pair whose offset is relative to the record holding it, so each level of
//! the walk passes its own file position down.

use std::io::{BufReader, Read, Seek};
use std::mem;

use crate::binaries::{BinArray, BinaryData};
use crate::error::{Error, FileType, Result};

pub struct VTX {
    pub version: i32,
    pub checksum: i32,
    pub num_lods: i32,
    pub body: Vec<VTXBodyPart>,
}

pub struct VTXBodyPart {
    pub models: Vec<VTXModel>,
}

pub struct VTXModel {
    /// Highest-detail LOD only; the rest of the LOD table is skipped.
    pub lod0: VTXModelLOD,
}

pub struct VTXModelLOD {
    pub switch_point: f32,
    pub meshes: Vec<VTXMesh>,
}

pub struct VTXMesh {
    pub flags: u8,
    pub strip_groups: Vec<VTXStripGroup>,
}

pub struct VTXStripGroup {
    /// Mesh-relative VVD indices, one per strip-group vertex.
    pub verts: Box<[VTXVertex]>,
    /// Indices into `verts`.
    pub indices: Box<[u16]>,
}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct VTXFileHeader {
    // file version as defined by OPTIMIZED_MODEL_FILE_VERSION (currently 7)
    pub version: i32,

    // hardware params that affect how the model is to be optimized
    pub vert_cache_size: i32,
    pub max_bones_per_strip: u16,
    pub max_bones_per_tri: u16,
    pub max_bones_per_vert: i32,

    // must match the checksum in the .mdl
    pub check_sum: i32,

    pub num_lods: i32,

    pub material_replacement_list_offset: i32,

    pub body_parts: BinArray<BodyPartHeader>,
}

impl BinaryData for VTXFileHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct BodyPartHeader {
    pub models: BinArray<ModelHeader>,
}

impl BinaryData for BodyPartHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct ModelHeader {
    pub lods: BinArray<ModelLODHeader>,
}

impl BinaryData for ModelHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct ModelLODHeader {
    pub meshes: BinArray<VTXMeshHeader>,
    pub switch_point: f32,
}

impl BinaryData for ModelLODHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct VTXMeshHeader {
    pub strip_groups: BinArray<StripGroupHeader>,
    pub flags: u8,
}

impl BinaryData for VTXMeshHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct StripGroupHeader {
    // These are the arrays of all verts and indices for this mesh.
    pub verts: BinArray<VTXVertex>,
    pub indices: BinArray<u16>,
    pub strips: BinArray<StripHeader>,
    pub flags: u8,
}

impl BinaryData for StripGroupHeader {}

/// A strip is a piece of a strip group which is divided by bones.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct StripHeader {
    pub num_indices: i32,
    pub index_offset: i32,

    pub num_verts: i32,
    pub vert_offset: i32,

    pub num_bones: i8,
    pub flags: u8,

    pub num_bone_state_changes: i32,
    pub bone_state_change_offset: i32,
}

impl BinaryData for StripHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug, bytemuck::Zeroable, bytemuck::Pod)]
pub struct VTXVertex {
    // these index into the mesh's vertex bone table
    pub bone_weight_index: [u8; 3],
    pub num_bones: u8,

    /// Mesh-relative index into the VVD vertex array; the only field the
    /// decoder consumes.
    pub orig_mesh_vert_id: u16,

    pub bone_id: [i8; 3],
}

impl VTX {
    pub fn read<R: Read + Seek>(buffer: &mut BufReader<R>) -> Result<Self> {
        let header = VTXFileHeader::read(buffer, None)?;

        let mut pos = mem::size_of::<VTXFileHeader>() as i64;

        let mut body = Vec::<VTXBodyPart>::new();
        let body_part_headers = { header.body_parts }.read(buffer, 0, &mut pos)?;

        for (bp_pos, bp) in body_part_headers {
            let model_headers = { bp.models }.read(buffer, bp_pos, &mut pos)?;

            let mut body_part = VTXBodyPart {
                models: Vec::default(),
            };

            for (model_pos, model_header) in model_headers {
                let lod_headers = { model_header.lods }.read(buffer, model_pos, &mut pos)?;
                let Some(&(lod_pos, lod_header)) = lod_headers.first() else {
                    return Err(Error::malformed(FileType::Vtx, "model has no lods"));
                };

                let mut lod0 = VTXModelLOD {
                    switch_point: { lod_header.switch_point },
                    meshes: Vec::default(),
                };

                let mesh_headers = { lod_header.meshes }.read(buffer, lod_pos, &mut pos)?;
                for (mesh_pos, mesh_header) in mesh_headers {
                    let strip_group_headers =
                        { mesh_header.strip_groups }.read(buffer, mesh_pos, &mut pos)?;

                    let mut mesh = VTXMesh {
                        flags: mesh_header.flags,
                        strip_groups: Vec::default(),
                    };

                    for (sg_pos, sg_header) in strip_group_headers {
                        let verts = { sg_header.verts }.read_f(buffer, sg_pos, &mut pos)?;
                        let indices = { sg_header.indices }.read_f(buffer, sg_pos, &mut pos)?;

                        for &index in indices.iter() {
                            if index as usize >= verts.len() {
                                return Err(Error::malformed(
                                    FileType::Vtx,
                                    "strip group index out of range",
                                ));
                            }
                        }

                        mesh.strip_groups.push(VTXStripGroup { verts, indices });
                    }

                    lod0.meshes.push(mesh);
                }

                body_part.models.push(VTXModel { lod0 });
            }

            body.push(body_part);
        }

        Ok(Self {
            version: { header.version },
            checksum: { header.check_sum },
            num_lods: { header.num_lods },
            body,
        })
    }
}
