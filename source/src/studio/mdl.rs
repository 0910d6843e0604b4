//! The model metadata file. A fixed 408-byte header points at a few dozen
//! tables; string fields are offsets, file-relative in the header and
//! record-relative inside bone/texture/include-model/sequence records.

use std::io::{BufReader, Read, Seek};
use std::mem;

use fixedstr::zstr;
use glam::{Quat, Vec3};

use crate::binaries::{read_i16, BinArray, BinOffset, BinaryData};
use crate::error::{Error, FileType, Result};

pub const MDL_SIGNATURE: [u8; 4] = *b"IDST";

/// Sequence flag: the animation wraps around.
pub const STUDIO_LOOPING: i32 = 0x0001;

/// Anim descriptors with this block id have their stream embedded in the
/// mdl itself; anything else indexes the external ANI blob.
pub const ANIM_BLOCK_EMBEDDED: i32 = 0;

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct Nil;
impl BinaryData for Nil {}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct MDLHeader {
    pub id: [u8; 4],   // "IDST"
    pub version: i32,  // 44..=49 supported
    pub checksum: i32, // must match vvd/vtx/phy to load
    pub name: zstr<64>,
    pub data_length: i32,

    pub eye_position: Vec3,
    pub illum_position: Vec3,
    pub hull_min: Vec3,
    pub hull_max: Vec3,
    pub view_bb_min: Vec3,
    pub view_bb_max: Vec3,

    pub flags: i32,

    pub bone: BinArray<StudioBone>,
    pub bone_controller: BinArray<Nil>,
    pub hitbox_set: BinArray<Nil>,
    pub local_anim: BinArray<AnimationDesc>,
    pub local_seq: BinArray<SequenceDesc>,

    pub activity_list_version: i32,
    pub events_indexed: i32,

    pub texture: BinArray<StudioTexture>,
    /// Array of file-relative string offsets, one per search path.
    pub texture_dir: BinArray<i32>,

    pub skin_reference_count: i32,
    pub skin_family_count: i32,
    pub skin_reference_index: i32,

    pub body_part: BinArray<StudioBodyPart>,

    pub attachment: BinArray<Nil>,

    pub local_node: BinArray<Nil>,
    pub local_node_name_index: i32,

    pub flex_desc: BinArray<Nil>,
    pub flex_controller: BinArray<Nil>,
    pub flex_rules: BinArray<Nil>,

    pub ik_chain: BinArray<Nil>,
    pub mouths: BinArray<Nil>,
    pub local_pose_param: BinArray<Nil>,

    pub surface_prop_index: i32,

    // Unusual: index first, then count.
    pub key_value_index: i32,
    pub key_value_count: i32,

    pub ik_lock: BinArray<Nil>,

    pub mass: f32,
    pub contents: i32,

    pub include_model: BinArray<ModelGroup>,

    pub virtual_model: i32, // placeholder for a runtime pointer

    pub anim_block_name_index: i32,
    pub anim_block: BinArray<AnimationBlock>,
    pub anim_block_model: i32, // placeholder for a runtime pointer

    pub bone_table_name_index: i32,

    pub vertex_base: i32, // placeholder for a runtime pointer
    pub offset_base: i32, // placeholder for a runtime pointer

    pub directional_dot_product: i8,
    pub root_lod: i8,
    /// 0 means any allowed, N means lods 0..N-1.
    pub num_allowed_root_lods: i8,
    unused0: i8,

    pub zero_frame_cache_index: i32,

    pub flex_controller_ui: BinArray<Nil>,

    pub vert_anim_fixed_point_scale: f32,
    unused1: i32,

    /// Offset of the secondary header; zero when absent.
    pub header_2_offset: i32,

    unused2: i32,
}

impl BinaryData for MDLHeader {}
unsafe impl bytemuck::Zeroable for MDLHeader {}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct StudioBone {
    pub name_offset: i32, // relative to this record
    pub parent_bone_index: i32,
    pub bone_controller_indexes: [i32; 6],

    pub position: Vec3,
    pub quat: [f32; 4],
    /// Euler rest rotation, radians.
    pub rotation: Vec3,
    pub position_scale: Vec3,
    pub rotation_scale: Vec3,

    pub pose_to_bone: [f32; 12],

    pub q_alignment: [f32; 4],

    pub flags: i32,

    pub procedural_rule_type: i32,
    pub procedural_rule_offset: i32,
    pub physics_bone_index: i32,
    pub surface_prop_name_offset: i32,
    pub contents: i32,

    unused: [i32; 8],
}

impl BinaryData for StudioBone {}
unsafe impl bytemuck::Zeroable for StudioBone {}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct StudioTexture {
    pub name_offset: i32, // relative to this record
    pub flags: i32,

    pub used: i32,
    unused_1: i32,

    pub material_p: i32,        // placeholder for a runtime pointer
    pub client_material_p: i32, // placeholder for a runtime pointer

    unused: [i32; 10],
}

impl BinaryData for StudioTexture {}
unsafe impl bytemuck::Zeroable for StudioTexture {}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct StudioBodyPart {
    pub name_offset: i32, // relative to this record
    pub model_count: i32,
    pub base: i32,
    pub model_offset: i32, // relative to this record
}

impl BinaryData for StudioBodyPart {}
unsafe impl bytemuck::Zeroable for StudioBodyPart {}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct StudioModel {
    pub name: zstr<64>,
    pub kind: i32,
    pub bounding_radius: f32,

    pub mesh_count: i32,
    pub mesh_offset: i32, // relative to this record

    /// Number of unique vertices/normals/texcoords.
    pub vertex_count: i32,
    /// Byte offset into the vvd vertex pool, always vertex aligned.
    pub vertex_offset: i32,
    pub tangent_offset: i32,

    pub attachment_count: i32,
    pub attachment_offset: i32,

    pub eye_ball_count: i32,
    pub eye_ball_offset: i32,

    pub vertex_data_p: i32,
    pub tangent_data_p: i32,

    unused: [i32; 8],
}

impl BinaryData for StudioModel {}
unsafe impl bytemuck::Zeroable for StudioModel {}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct StudioMesh {
    pub material_index: i32,
    pub model_offset: i32,

    pub vertex_count: i32,
    /// Start of this mesh inside its owning model's vertex slice.
    pub vertex_index_start: i32,

    pub flex_count: i32,
    pub flex_offset: i32,

    pub material_type: i32,
    pub material_param: i32,

    pub id: i32,
    pub center: Vec3,

    pub vertex_data_p: i32,

    pub lod_vertex_counts: [i32; 8],

    unused: [i32; 8],
}

impl BinaryData for StudioMesh {}
unsafe impl bytemuck::Zeroable for StudioMesh {}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct AnimationDesc {
    pub base_header_offset: i32,
    pub name_offset: i32, // relative to this record

    pub fps: f32,
    pub flags: i32,
    pub frame_count: i32,

    pub movement_count: i32,
    pub movement_offset: i32,

    pub ik_rule_zero_frame_offset: i32,
    unused: [i32; 5],

    /// [`ANIM_BLOCK_EMBEDDED`] or an index into the anim block table.
    pub anim_block: i32,
    /// Stream offset: relative to this record when embedded, else to the
    /// block's data start in the ANI blob.
    pub anim_offset: i32,

    pub ik_rule_count: i32,
    pub ik_rule_offset: i32,
    pub anim_block_ik_rule_offset: i32,

    pub local_hierarchy_count: i32,
    pub local_hierarchy_offset: i32,

    pub section_offset: i32,
    pub section_frame_count: i32,

    unused_2: [i32; 3],
}

impl BinaryData for AnimationDesc {}
unsafe impl bytemuck::Zeroable for AnimationDesc {}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct AnimationBlock {
    pub data_start: i32,
    pub data_end: i32,
}

impl BinaryData for AnimationBlock {}
unsafe impl bytemuck::Zeroable for AnimationBlock {}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct SequenceDesc {
    pub base_header_offset: i32,
    pub label_offset: i32, // relative to this record
    pub activity_name_offset: i32,

    pub flags: i32,

    pub activity: i32,
    pub activity_weight: i32,

    pub event_count: i32,
    pub event_offset: i32,

    pub bb_min: Vec3,
    pub bb_max: Vec3,

    pub blend_count: i32,
    /// Offset (relative to this record) of the blend table of 16-bit
    /// animation indices; single-anim sequences read entry zero.
    pub anim_index_offset: i32,

    pub movement_index: i32,
    pub group_size: [i32; 2],
    pub param_index: [i32; 2],
    pub param_start: [f32; 2],
    pub param_end: [f32; 2],
    pub param_parent: i32,

    pub fade_in_time: f32,
    pub fade_out_time: f32,

    pub local_entry_node_index: i32,
    pub local_exit_node_index: i32,
    pub node_flags: i32,

    pub entry_phase: f32,
    pub exit_phase: f32,
    pub last_frame: f32,

    pub next_seq: i32,
    pub pose: i32,

    pub ik_rule_count: i32,
    pub auto_layer_count: i32,
    pub auto_layer_offset: i32,
    pub weight_offset: i32,
    pub pose_key_offset: i32,

    pub ik_lock_count: i32,
    pub ik_lock_offset: i32,
    pub key_value_offset: i32,
    pub key_value_size: i32,
    pub cycle_pose_index: i32,

    pub activity_modifier_offset: i32,
    pub activity_modifier_count: i32,

    unused: [i32; 5],
}

impl BinaryData for SequenceDesc {}
unsafe impl bytemuck::Zeroable for SequenceDesc {}

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct ModelGroup {
    pub label_offset: i32,     // relative to this record
    pub file_name_offset: i32, // relative to this record
}

impl BinaryData for ModelGroup {}
unsafe impl bytemuck::Zeroable for ModelGroup {}

pub struct MDLBone {
    pub name: String,
    /// Always strictly less than this bone's own index; -1 for roots.
    pub parent: i32,
    pub position: Vec3,
    pub quat: Quat,
    /// Euler rest rotation, radians; the base the RLE rotation channels add to.
    pub rotation: Vec3,
    pub position_scale: Vec3,
    pub rotation_scale: Vec3,
    pub pose_to_bone: [f32; 12],
}

#[derive(Debug)]
pub struct MDLTexture {
    pub name: String,
}

pub struct MDLBodyPart {
    pub name: String,
    pub models: Vec<MDLModel>,
}

pub struct MDLModel {
    pub name: String,
    pub vertex_count: i32,
    pub meshes: Vec<MDLMesh>,
}

pub struct MDLMesh {
    pub material_index: i32,
    pub vertex_count: i32,
    pub vertex_index_start: i32,
}

pub struct MDLAnimDesc {
    /// File position of the descriptor record; embedded streams are
    /// addressed relative to it.
    pub pos: i64,
    pub name: String,
    pub fps: f32,
    pub flags: i32,
    pub frame_count: i32,
    pub anim_block: i32,
    pub anim_offset: i32,
}

pub struct MDLSequence {
    pub label: String,
    pub flags: i32,
    pub anim_desc_index: i32,
    pub group_size: [i32; 2],
}

impl MDLSequence {
    pub fn looping(&self) -> bool {
        self.flags & STUDIO_LOOPING != 0
    }
}

#[derive(Debug)]
pub struct MDLIncludeModel {
    pub label: String,
    /// Already fully qualified, e.g. `models/humans/male_shared.mdl`.
    pub filename: String,
}

pub struct MDL {
    pub name: String,
    pub version: i32,
    pub checksum: i32,
    pub flags: i32,
    pub bones: Vec<MDLBone>,
    pub textures: Vec<MDLTexture>,
    pub texture_paths: Vec<String>,
    pub body: Vec<MDLBodyPart>,
    pub anim_descs: Vec<MDLAnimDesc>,
    pub sequences: Vec<MDLSequence>,
    pub include_models: Vec<MDLIncludeModel>,
    pub anim_blocks: Vec<(i32, i32)>,
}

impl MDL {
    pub fn read<R: Read + Seek>(buffer: &mut BufReader<R>) -> Result<Self> {
        let header = MDLHeader::read(buffer, None)?;

        if header.id != MDL_SIGNATURE {
            return Err(Error::InvalidModel("bad signature".to_owned()));
        }
        let version = { header.version };
        if !(44..=49).contains(&version) {
            return Err(Error::InvalidModel(format!("unsupported version {version}")));
        }

        let mut pos = mem::size_of::<MDLHeader>() as i64;

        let mut bones = Vec::new();
        for (i, (bone_pos, bone)) in { header.bone }.read(buffer, 0, &mut pos)?.into_iter().enumerate() {
            let parent = { bone.parent_bone_index };
            if parent < -1 || parent >= i as i32 {
                return Err(Error::malformed(FileType::Mdl, "bone parent out of order"));
            }

            let q = { bone.quat };
            bones.push(MDLBone {
                name: BinOffset { index: { bone.name_offset } }.read_str(buffer, bone_pos, &mut pos)?,
                parent,
                position: { bone.position },
                quat: Quat::from_xyzw(q[0], q[1], q[2], q[3]),
                rotation: { bone.rotation },
                position_scale: { bone.position_scale },
                rotation_scale: { bone.rotation_scale },
                pose_to_bone: { bone.pose_to_bone },
            });
        }

        let mut textures = Vec::new();
        for (tex_pos, tex) in { header.texture }.read(buffer, 0, &mut pos)? {
            textures.push(MDLTexture {
                name: BinOffset { index: { tex.name_offset } }
                    .read_str(buffer, tex_pos, &mut pos)?
                    .to_ascii_lowercase(),
            });
        }

        let mut texture_paths = Vec::new();
        for offset in { header.texture_dir }.read_f(buffer, 0, &mut pos)?.iter() {
            texture_paths.push(
                BinOffset { index: *offset }
                    .read_str(buffer, 0, &mut pos)?
                    .to_ascii_lowercase(),
            );
        }

        let mut body = Vec::new();
        for (bp_pos, bp) in { header.body_part }.read(buffer, 0, &mut pos)? {
            let model_heads: Vec<(i64, StudioModel)> = BinOffset { index: { bp.model_offset } }
                .read_array(buffer, bp_pos, &mut pos, { bp.model_count }.max(0) as usize)?;

            let mut models = Vec::new();
            for (model_pos, model) in model_heads {
                let mesh_heads: Vec<(i64, StudioMesh)> = BinOffset { index: { model.mesh_offset } }
                    .read_array(buffer, model_pos, &mut pos, { model.mesh_count }.max(0) as usize)?;

                let meshes = mesh_heads
                    .into_iter()
                    .map(|(_, mesh)| MDLMesh {
                        material_index: { mesh.material_index },
                        vertex_count: { mesh.vertex_count },
                        vertex_index_start: { mesh.vertex_index_start },
                    })
                    .collect();

                models.push(MDLModel {
                    name: { model.name }.to_str().to_owned(),
                    vertex_count: { model.vertex_count },
                    meshes,
                });
            }

            body.push(MDLBodyPart {
                name: BinOffset { index: { bp.name_offset } }.read_str(buffer, bp_pos, &mut pos)?,
                models,
            });
        }

        let mut anim_descs = Vec::new();
        for (desc_pos, desc) in { header.local_anim }.read(buffer, 0, &mut pos)? {
            anim_descs.push(MDLAnimDesc {
                pos: desc_pos,
                name: BinOffset { index: { desc.name_offset } }.read_str(buffer, desc_pos, &mut pos)?,
                fps: { desc.fps },
                flags: { desc.flags },
                frame_count: { desc.frame_count },
                anim_block: { desc.anim_block },
                anim_offset: { desc.anim_offset },
            });
        }

        let mut sequences = Vec::new();
        for (seq_pos, seq) in { header.local_seq }.read(buffer, 0, &mut pos)? {
            // Blend tables are laid out group_size[0] x group_size[1]; a
            // plain sequence is a 1x1 table, and only blend[0] is decoded.
            BinOffset { index: { seq.anim_index_offset } }.seek_start(buffer, seq_pos, &mut pos)?;
            let anim_desc_index = read_i16(buffer)? as i32;
            pos += 2;

            sequences.push(MDLSequence {
                label: BinOffset { index: { seq.label_offset } }.read_str(buffer, seq_pos, &mut pos)?,
                flags: { seq.flags },
                anim_desc_index,
                group_size: { seq.group_size },
            });
        }

        let mut include_models = Vec::new();
        for (group_pos, group) in { header.include_model }.read(buffer, 0, &mut pos)? {
            include_models.push(MDLIncludeModel {
                label: BinOffset { index: { group.label_offset } }.read_str(buffer, group_pos, &mut pos)?,
                filename: BinOffset { index: { group.file_name_offset } }
                    .read_str(buffer, group_pos, &mut pos)?,
            });
        }

        let anim_blocks = { header.anim_block }
            .read(buffer, 0, &mut pos)?
            .into_iter()
            .map(|(_, block)| ({ block.data_start }, { block.data_end }))
            .collect();

        Ok(Self {
            name: { header.name }.to_str().to_owned(),
            version,
            checksum: { header.checksum },
            flags: { header.flags },
            bones,
            textures,
            texture_paths,
            body,
            anim_descs,
            sequences,
            include_models,
            anim_blocks,
        })
    }
}
