//! The neutral output record. Hosts adapt this to their own mesh, texture,
//! skeleton and physics types; nothing here references a renderer.

use glam::{Quat, Vec2, Vec3};

use crate::studio::anim::BonePose;

pub struct Asset {
    pub name: String,
    pub skeleton: Vec<RestBone>,
    pub meshes: Vec<AssetMesh>,
    pub materials: Vec<Material>,
    pub animations: Vec<AnimationTrack>,
    pub bodies: Vec<PhysBody>,
    pub joints: Vec<PhysJoint>,
    /// True when decoding failed and the magenta stand-in was emitted.
    pub placeholder: bool,
}

pub struct RestBone {
    pub name: String,
    /// -1 for roots, otherwise an earlier bone's index.
    pub parent: i32,
    pub local_position: Vec3,
    pub local_rotation: Quat,
    /// Rest pose composed down from the root; skeleton builders consume
    /// world space.
    pub world_position: Vec3,
    pub world_rotation: Quat,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SkinnedVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub bones: [u8; 4],
    /// Quantized so the four bytes sum to exactly 255 on skinned meshes.
    pub weights: [u8; 4],
}

pub struct AssetMesh {
    pub material_index: usize,
    pub vertices: Vec<SkinnedVertex>,
    pub indices: Vec<u32>,
    pub skinned: bool,
}

impl AssetMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

pub struct DecodedTexture {
    pub width: u32,
    pub height: u32,
    /// RGBA8888 scanlines, `4 * width * height` bytes.
    pub rgba: Vec<u8>,
}

pub struct Material {
    pub name: String,
    /// `None` when no texture resolved; the host substitutes its default.
    pub texture: Option<DecodedTexture>,
}

pub struct AnimationTrack {
    pub name: String,
    pub fps: f32,
    pub looping: bool,
    /// Parent-local transforms, `frames[frame][bone]`.
    pub frames: Vec<Vec<BonePose>>,
}

pub struct PhysBody {
    pub bone_index: i32,
    pub bone_name: String,
    /// Convex hull corners in inches; capped hulls fall back to their
    /// bounding box.
    pub vertices: Vec<Vec3>,
}

pub struct PhysJoint {
    pub parent_body: usize,
    pub child_body: usize,
    /// Attachment frame on the parent body.
    pub frame1_position: Vec3,
    pub frame1_rotation: Quat,
    /// Attachment frame on the child body, identity by construction.
    pub frame2_position: Vec3,
    pub frame2_rotation: Quat,
    /// Cone half-angle in degrees.
    pub swing_limit: f32,
    /// Twist range in degrees.
    pub twist_min: f32,
    pub twist_max: f32,
}
