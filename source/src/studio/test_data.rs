//! Byte-level builders for synthetic studio files, shared by the parser and
//! assembler tests.

use std::mem;
use std::slice;

use bytemuck::Zeroable;
use fixedstr::zstr;
use glam::{Vec2, Vec3};

use crate::binaries::BinArray;

use super::mdl::{
    AnimationBlock, AnimationDesc, MDLHeader, ModelGroup, SequenceDesc, StudioBodyPart, StudioBone,
    StudioMesh, StudioModel, StudioTexture,
};
use super::vvd::{ModelVertex, VVDFixup, VVD_VERSION};

fn raw<T: Copy>(v: &T) -> &[u8] {
    unsafe { slice::from_raw_parts(v as *const T as *const u8, mem::size_of::<T>()) }
}

fn put(data: &mut [u8], pos: usize, bytes: &[u8]) {
    data[pos..pos + bytes.len()].copy_from_slice(bytes);
}

pub struct TestBone {
    pub name: String,
    pub parent: i32,
    pub position: Vec3,
    pub quat: [f32; 4],
    pub rotation: Vec3,
    pub position_scale: Vec3,
    pub rotation_scale: Vec3,
}

impl TestBone {
    pub fn root(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            parent: -1,
            position: Vec3::ZERO,
            quat: [0.0, 0.0, 0.0, 1.0],
            rotation: Vec3::ZERO,
            position_scale: Vec3::ONE,
            rotation_scale: Vec3::ONE,
        }
    }

    pub fn child(name: &str, parent: i32, position: Vec3) -> Self {
        Self {
            name: name.to_owned(),
            parent,
            position,
            quat: [0.0, 0.0, 0.0, 1.0],
            rotation: Vec3::ZERO,
            position_scale: Vec3::ONE,
            rotation_scale: Vec3::ONE,
        }
    }
}

pub struct TestMesh {
    pub material: i32,
    pub vertex_count: i32,
    pub vertex_index_start: i32,
}

pub struct TestModel {
    pub name: String,
    pub vertex_count: i32,
    pub meshes: Vec<TestMesh>,
}

pub struct TestBodyPart {
    pub name: String,
    pub models: Vec<TestModel>,
}

pub struct TestAnim {
    pub name: String,
    pub fps: f32,
    pub frame_count: i32,
    pub anim_block: i32,
    /// Embedded stream bytes (anim_block == 0); ignored otherwise.
    pub data: Vec<u8>,
    /// Offset into the block for external streams (anim_block != 0).
    pub ext_offset: i32,
}

pub struct TestSeq {
    pub label: String,
    pub flags: i32,
    pub anim_index: i16,
}

pub struct TestMdl {
    pub name: String,
    pub version: i32,
    pub checksum: i32,
    pub bones: Vec<TestBone>,
    pub textures: Vec<String>,
    pub texture_paths: Vec<String>,
    pub body_parts: Vec<TestBodyPart>,
    pub anims: Vec<TestAnim>,
    pub sequences: Vec<TestSeq>,
    pub include_models: Vec<(String, String)>,
    pub anim_blocks: Vec<(i32, i32)>,
}

impl TestMdl {
    /// One static bone, one material, one 8-vertex one-mesh body part.
    pub fn cube() -> Self {
        Self {
            name: "cube".to_owned(),
            version: 44,
            checksum: 0x600DCAFE_u32 as i32,
            bones: vec![TestBone::root("static_prop")],
            textures: vec!["cube_sheet".to_owned()],
            texture_paths: vec!["props/".to_owned()],
            body_parts: vec![TestBodyPart {
                name: "body".to_owned(),
                models: vec![TestModel {
                    name: "cube_model".to_owned(),
                    vertex_count: 8,
                    meshes: vec![TestMesh {
                        material: 0,
                        vertex_count: 8,
                        vertex_index_start: 0,
                    }],
                }],
            }],
            anims: Vec::new(),
            sequences: Vec::new(),
            include_models: Vec::new(),
            anim_blocks: Vec::new(),
        }
    }

    pub fn build(&self) -> Vec<u8> {
        // Pass 1: lay out section positions with a running cursor.
        let mut cur = mem::size_of::<MDLHeader>();

        let bones_off = cur;
        cur += self.bones.len() * mem::size_of::<StudioBone>();
        let bone_name_offs: Vec<usize> = self
            .bones
            .iter()
            .map(|b| {
                let p = cur;
                cur += b.name.len() + 1;
                p
            })
            .collect();

        let tex_off = cur;
        cur += self.textures.len() * mem::size_of::<StudioTexture>();
        let tex_name_offs: Vec<usize> = self
            .textures
            .iter()
            .map(|t| {
                let p = cur;
                cur += t.len() + 1;
                p
            })
            .collect();

        let texdir_off = cur;
        cur += self.texture_paths.len() * 4;
        let texdir_name_offs: Vec<usize> = self
            .texture_paths
            .iter()
            .map(|t| {
                let p = cur;
                cur += t.len() + 1;
                p
            })
            .collect();

        let bp_off = cur;
        cur += self.body_parts.len() * mem::size_of::<StudioBodyPart>();
        let model_offs: Vec<usize> = self
            .body_parts
            .iter()
            .map(|bp| {
                let p = cur;
                cur += bp.models.len() * mem::size_of::<StudioModel>();
                p
            })
            .collect();
        let mesh_offs: Vec<Vec<usize>> = self
            .body_parts
            .iter()
            .map(|bp| {
                bp.models
                    .iter()
                    .map(|m| {
                        let p = cur;
                        cur += m.meshes.len() * mem::size_of::<StudioMesh>();
                        p
                    })
                    .collect()
            })
            .collect();
        let bp_name_offs: Vec<usize> = self
            .body_parts
            .iter()
            .map(|bp| {
                let p = cur;
                cur += bp.name.len() + 1;
                p
            })
            .collect();

        let anim_off = cur;
        cur += self.anims.len() * mem::size_of::<AnimationDesc>();
        let anim_name_offs: Vec<usize> = self
            .anims
            .iter()
            .map(|a| {
                let p = cur;
                cur += a.name.len() + 1;
                p
            })
            .collect();
        let anim_data_offs: Vec<usize> = self
            .anims
            .iter()
            .map(|a| {
                let p = cur;
                if a.anim_block == 0 {
                    cur += a.data.len();
                }
                p
            })
            .collect();

        let seq_off = cur;
        cur += self.sequences.len() * mem::size_of::<SequenceDesc>();
        let seq_blend_offs: Vec<usize> = self
            .sequences
            .iter()
            .map(|_| {
                let p = cur;
                cur += 2;
                p
            })
            .collect();
        let seq_label_offs: Vec<usize> = self
            .sequences
            .iter()
            .map(|s| {
                let p = cur;
                cur += s.label.len() + 1;
                p
            })
            .collect();

        let include_off = cur;
        cur += self.include_models.len() * mem::size_of::<ModelGroup>();
        let include_str_offs: Vec<(usize, usize)> = self
            .include_models
            .iter()
            .map(|(label, file)| {
                let l = cur;
                cur += label.len() + 1;
                let f = cur;
                cur += file.len() + 1;
                (l, f)
            })
            .collect();

        let block_off = cur;
        cur += self.anim_blocks.len() * mem::size_of::<AnimationBlock>();

        // Pass 2: fill the buffer.
        let mut data = vec![0u8; cur];

        let mut header: MDLHeader = Zeroable::zeroed();
        header.id = *b"IDST";
        header.version = self.version;
        header.checksum = self.checksum;
        header.name = zstr::make(&self.name);
        header.data_length = cur as i32;
        header.bone = BinArray::new(self.bones.len() as i32, bones_off as i32);
        header.texture = BinArray::new(self.textures.len() as i32, tex_off as i32);
        header.texture_dir = BinArray::new(self.texture_paths.len() as i32, texdir_off as i32);
        header.body_part = BinArray::new(self.body_parts.len() as i32, bp_off as i32);
        header.local_anim = BinArray::new(self.anims.len() as i32, anim_off as i32);
        header.local_seq = BinArray::new(self.sequences.len() as i32, seq_off as i32);
        header.include_model = BinArray::new(self.include_models.len() as i32, include_off as i32);
        header.anim_block = BinArray::new(self.anim_blocks.len() as i32, block_off as i32);
        put(&mut data, 0, raw(&header));

        for (i, bone) in self.bones.iter().enumerate() {
            let pos = bones_off + i * mem::size_of::<StudioBone>();
            let mut b: StudioBone = Zeroable::zeroed();
            b.name_offset = (bone_name_offs[i] - pos) as i32;
            b.parent_bone_index = bone.parent;
            b.position = bone.position;
            b.quat = bone.quat;
            b.rotation = bone.rotation;
            b.position_scale = bone.position_scale;
            b.rotation_scale = bone.rotation_scale;
            put(&mut data, pos, raw(&b));
            put(&mut data, bone_name_offs[i], bone.name.as_bytes());
        }

        for (i, tex) in self.textures.iter().enumerate() {
            let pos = tex_off + i * mem::size_of::<StudioTexture>();
            let mut t: StudioTexture = Zeroable::zeroed();
            t.name_offset = (tex_name_offs[i] - pos) as i32;
            put(&mut data, pos, raw(&t));
            put(&mut data, tex_name_offs[i], tex.as_bytes());
        }

        for (i, path) in self.texture_paths.iter().enumerate() {
            put(
                &mut data,
                texdir_off + i * 4,
                &(texdir_name_offs[i] as i32).to_le_bytes(),
            );
            put(&mut data, texdir_name_offs[i], path.as_bytes());
        }

        for (i, bp) in self.body_parts.iter().enumerate() {
            let pos = bp_off + i * mem::size_of::<StudioBodyPart>();
            let mut b: StudioBodyPart = Zeroable::zeroed();
            b.name_offset = (bp_name_offs[i] - pos) as i32;
            b.model_count = bp.models.len() as i32;
            b.model_offset = (model_offs[i] - pos) as i32;
            put(&mut data, pos, raw(&b));
            put(&mut data, bp_name_offs[i], bp.name.as_bytes());

            for (j, model) in bp.models.iter().enumerate() {
                let mpos = model_offs[i] + j * mem::size_of::<StudioModel>();
                let mut m: StudioModel = Zeroable::zeroed();
                m.name = zstr::make(&model.name);
                m.mesh_count = model.meshes.len() as i32;
                m.mesh_offset = (mesh_offs[i][j] - mpos) as i32;
                m.vertex_count = model.vertex_count;
                put(&mut data, mpos, raw(&m));

                for (k, mesh) in model.meshes.iter().enumerate() {
                    let kpos = mesh_offs[i][j] + k * mem::size_of::<StudioMesh>();
                    let mut me: StudioMesh = Zeroable::zeroed();
                    me.material_index = mesh.material;
                    me.vertex_count = mesh.vertex_count;
                    me.vertex_index_start = mesh.vertex_index_start;
                    put(&mut data, kpos, raw(&me));
                }
            }
        }

        for (i, anim) in self.anims.iter().enumerate() {
            let pos = anim_off + i * mem::size_of::<AnimationDesc>();
            let mut a: AnimationDesc = Zeroable::zeroed();
            a.name_offset = (anim_name_offs[i] - pos) as i32;
            a.fps = anim.fps;
            a.frame_count = anim.frame_count;
            a.anim_block = anim.anim_block;
            a.anim_offset = if anim.anim_block == 0 {
                (anim_data_offs[i] - pos) as i32
            } else {
                anim.ext_offset
            };
            put(&mut data, pos, raw(&a));
            put(&mut data, anim_name_offs[i], anim.name.as_bytes());
            if anim.anim_block == 0 {
                put(&mut data, anim_data_offs[i], &anim.data);
            }
        }

        for (i, seq) in self.sequences.iter().enumerate() {
            let pos = seq_off + i * mem::size_of::<SequenceDesc>();
            let mut s: SequenceDesc = Zeroable::zeroed();
            s.label_offset = (seq_label_offs[i] - pos) as i32;
            s.flags = seq.flags;
            s.blend_count = 1;
            s.anim_index_offset = (seq_blend_offs[i] - pos) as i32;
            s.group_size = [1, 1];
            put(&mut data, pos, raw(&s));
            put(&mut data, seq_blend_offs[i], &seq.anim_index.to_le_bytes());
            put(&mut data, seq_label_offs[i], seq.label.as_bytes());
        }

        for (i, (label, file)) in self.include_models.iter().enumerate() {
            let pos = include_off + i * mem::size_of::<ModelGroup>();
            let mut g: ModelGroup = Zeroable::zeroed();
            g.label_offset = (include_str_offs[i].0 - pos) as i32;
            g.file_name_offset = (include_str_offs[i].1 - pos) as i32;
            put(&mut data, pos, raw(&g));
            put(&mut data, include_str_offs[i].0, label.as_bytes());
            put(&mut data, include_str_offs[i].1, file.as_bytes());
        }

        for (i, (start, end)) in self.anim_blocks.iter().enumerate() {
            let pos = block_off + i * mem::size_of::<AnimationBlock>();
            let mut blk: AnimationBlock = Zeroable::zeroed();
            blk.data_start = *start;
            blk.data_end = *end;
            put(&mut data, pos, raw(&blk));
        }

        data
    }
}

/// Serialize a VVD with the given raw pool and fix-up table.
pub fn build_vvd(pool: &[ModelVertex], lod0_count: u32, fixups: &[VVDFixup]) -> Vec<u8> {
    let fixup_start = 64u32;
    let vertex_start = fixup_start + (fixups.len() * 12) as u32;
    let tangent_start = vertex_start + (pool.len() * 48) as u32;

    let mut data = Vec::new();
    data.extend_from_slice(&0x56534449u32.to_le_bytes()); // IDSV
    data.extend_from_slice(&VVD_VERSION.to_le_bytes());
    data.extend_from_slice(&0i32.to_le_bytes()); // checksum
    data.extend_from_slice(&1u32.to_le_bytes()); // num_lods
    data.extend_from_slice(&lod0_count.to_le_bytes());
    data.extend_from_slice(&[0u8; 28]); // lods 1..8
    data.extend_from_slice(&(fixups.len() as u32).to_le_bytes());
    data.extend_from_slice(&fixup_start.to_le_bytes());
    data.extend_from_slice(&vertex_start.to_le_bytes());
    data.extend_from_slice(&tangent_start.to_le_bytes());
    data.extend_from_slice(bytemuck::cast_slice(fixups));
    data.extend_from_slice(bytemuck::cast_slice(pool));
    data
}

pub fn skinned_vert(x: f32, weights: [f32; 3], bones: [u8; 3], num_bones: u8) -> ModelVertex {
    ModelVertex {
        bone_weight: weights,
        bone_id: bones,
        num_bones,
        pos: Vec3::new(x, 0.0, 0.0),
        norm: Vec3::Z,
        uv: Vec2::new(x, 0.0),
    }
}

/// One body part, one model, one LOD; each entry is a mesh given as
/// `(strip group vertex count, indices into that strip group)`. Strip-group
/// vertex `i` maps straight through to mesh-relative VVD index `i`.
pub fn build_vtx(meshes: &[(u16, Vec<u16>)]) -> Vec<u8> {
    let mut data = Vec::new();
    let put_i32 = |data: &mut Vec<u8>, v: i32| data.extend_from_slice(&v.to_le_bytes());

    // header (36 bytes): body part array at 36
    put_i32(&mut data, 7); // version
    put_i32(&mut data, 24); // vert cache size
    data.extend_from_slice(&53u16.to_le_bytes());
    data.extend_from_slice(&3u16.to_le_bytes());
    put_i32(&mut data, 3); // max bones per vert
    put_i32(&mut data, 0); // checksum
    put_i32(&mut data, 1); // num lods
    put_i32(&mut data, 0); // material replacements
    put_i32(&mut data, 1); // body part count
    put_i32(&mut data, 36);

    // body part @36: 1 model @ +8
    put_i32(&mut data, 1);
    put_i32(&mut data, 8);
    // model @44: 1 lod @ +8
    put_i32(&mut data, 1);
    put_i32(&mut data, 8);
    // lod @52: meshes @ +12
    put_i32(&mut data, meshes.len() as i32);
    put_i32(&mut data, 12);
    data.extend_from_slice(&0.0f32.to_le_bytes());

    // mesh headers @64, 9 bytes each, strip group blocks appended after
    let mesh_base = 64usize;
    let mut sg_base = mesh_base + meshes.len() * 9;
    let mut sg_blocks = Vec::new();
    for (i, (nverts, indices)) in meshes.iter().enumerate() {
        let mesh_pos = mesh_base + i * 9;
        put_i32(&mut data, 1); // one strip group
        put_i32(&mut data, (sg_base - mesh_pos) as i32);
        data.push(0); // mesh flags

        let mut sg = Vec::new();
        let vert_bytes = *nverts as i32 * 9;
        put_i32(&mut sg, *nverts as i32);
        put_i32(&mut sg, 25);
        put_i32(&mut sg, indices.len() as i32);
        put_i32(&mut sg, 25 + vert_bytes);
        put_i32(&mut sg, 0); // strip count
        put_i32(&mut sg, 25 + vert_bytes + indices.len() as i32 * 2);
        sg.push(2); // STRIPGROUP_IS_HWSKINNED
        for v in 0..*nverts {
            sg.extend_from_slice(&[0, 0, 0, 1]);
            sg.extend_from_slice(&v.to_le_bytes());
            sg.extend_from_slice(&[0, 0, 0]);
        }
        for index in indices {
            sg.extend_from_slice(&index.to_le_bytes());
        }

        sg_base += sg.len();
        sg_blocks.push(sg);
    }
    for sg in sg_blocks {
        data.extend_from_slice(&sg);
    }
    data
}
