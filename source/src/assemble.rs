//! Joins the parsed companions into the neutral [`Asset`] record. The
//! pipeline is staged (header, skeleton, meshes, materials, animations,
//! physics) with a cooperative abort check between stages; a fatal stage
//! failure downgrades the asset to the magenta placeholder cube.

use std::collections::HashMap;
use std::io::{BufReader, Cursor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::{Quat, Vec2, Vec3};

use common::prelude::{BlobStore, VLocalPath, VPath, VSplitPath};

use crate::asset::{
    AnimationTrack, Asset, AssetMesh, DecodedTexture, Material, PhysBody, PhysJoint, RestBone,
    SkinnedVertex,
};
use crate::error::{Error, Result};
use crate::studio::anim;
use crate::studio::mdl::{MDLMesh, MDL};
use crate::studio::phy::PHY;
use crate::studio::vtx::{VTXMesh, VTX};
use crate::studio::vvd::{ModelVertex, VVD};
use crate::vtf::VTF;

/// Hulls beyond this many corners collapse to their bounding box.
const HULL_VERTEX_CAP: usize = 64;

/// VTX variants in preference order.
const VTX_VARIANTS: [&str; 3] = ["dx90", "dx80", "sw"];

#[derive(Default, Clone)]
pub struct DecodeOptions {
    /// Checked between stages; a set flag abandons the decode with
    /// [`Error::DecodeAborted`] and no asset.
    pub abort: Option<Arc<AtomicBool>>,
}

impl DecodeOptions {
    fn check_abort(&self) -> Result<()> {
        match &self.abort {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::DecodeAborted),
            _ => Ok(()),
        }
    }
}

pub fn decode(store: &dyn BlobStore, mdl_path: &dyn VPath) -> Result<Asset> {
    decode_with(store, mdl_path, &DecodeOptions::default())
}

/// Decode one model into an [`Asset`]. Failures other than cancellation
/// yield the placeholder so callers always have something to show.
pub fn decode_with(
    store: &dyn BlobStore,
    mdl_path: &dyn VPath,
    options: &DecodeOptions,
) -> Result<Asset> {
    match decode_inner(store, mdl_path, options) {
        Ok(asset) => Ok(asset),
        Err(Error::DecodeAborted) => Err(Error::DecodeAborted),
        Err(e) => {
            log::warn!("{}: emitting placeholder: {}", mdl_path.full(), e);
            Ok(placeholder(mdl_path.filename()))
        }
    }
}

fn decode_inner(
    store: &dyn BlobStore,
    mdl_path: &dyn VPath,
    options: &DecodeOptions,
) -> Result<Asset> {
    let dir = mdl_path.dir().to_owned();
    let stem = mdl_path.filename().to_owned();

    options.check_abort()?;
    let mdl_blob = store
        .read_blob(mdl_path)
        .ok_or_else(|| Error::MissingCompanion(mdl_path.full()))?;
    let mdl = MDL::read(&mut BufReader::new(Cursor::new(&mdl_blob[..])))?;

    options.check_abort()?;
    let skeleton = build_skeleton(&mdl);

    let vvd_path = VSplitPath::new(&dir, &stem, "vvd");
    let vvd_blob = store
        .read_blob(&vvd_path)
        .ok_or_else(|| Error::MissingCompanion(vvd_path.full()))?;
    let vvd = VVD::read(&mut BufReader::new(Cursor::new(&vvd_blob[..])))?;

    let vtx_blob = VTX_VARIANTS
        .iter()
        .find_map(|variant| {
            store.read_blob(&VSplitPath::new(&dir, &format!("{stem}.{variant}"), "vtx"))
        })
        .ok_or_else(|| Error::MissingCompanion(format!("{stem}.dx90.vtx")))?;
    let vtx = VTX::read(&mut BufReader::new(Cursor::new(&vtx_blob[..])))?;

    if { vvd.header.checksum } != mdl.checksum || vtx.checksum != mdl.checksum {
        log::warn!("{}: companion checksum mismatch", mdl_path.full());
    }

    options.check_abort()?;
    let skinned = !skeleton.is_empty();
    let materials = build_materials(store, &mdl);
    let meshes = build_meshes(&mdl, &vvd, &vtx, skinned, materials.len());

    options.check_abort()?;
    let ani_blob = store.read_blob(&VSplitPath::new(&dir, &stem, "ani"));
    let animations = build_animations(&mdl, &mdl_blob, ani_blob.as_ref().map(|b| b.as_slice()));

    options.check_abort()?;
    let (bodies, joints) = match store.read_blob(&VSplitPath::new(&dir, &stem, "phy")) {
        Some(phy_blob) => match PHY::read(&phy_blob) {
            Ok(phy) => build_physics(&skeleton, &phy),
            Err(e) => {
                log::warn!("{}: phy skipped: {}", mdl_path.full(), e);
                (Vec::new(), Vec::new())
            }
        },
        None => (Vec::new(), Vec::new()),
    };

    Ok(Asset {
        name: stem,
        skeleton,
        meshes,
        materials,
        animations,
        bodies,
        joints,
        placeholder: false,
    })
}

/// World rest transforms composed root-down; bones arrive in topological
/// order so a single pass suffices.
fn build_skeleton(mdl: &MDL) -> Vec<RestBone> {
    let mut out: Vec<RestBone> = Vec::with_capacity(mdl.bones.len());
    for bone in &mdl.bones {
        let (world_position, world_rotation) = if bone.parent < 0 {
            (bone.position, bone.quat)
        } else {
            let parent = &out[bone.parent as usize];
            (
                parent.world_position + parent.world_rotation * bone.position,
                (parent.world_rotation * bone.quat).normalize(),
            )
        };
        out.push(RestBone {
            name: bone.name.clone(),
            parent: bone.parent,
            local_position: bone.position,
            local_rotation: bone.quat,
            world_position,
            world_rotation,
        });
    }
    out
}

fn build_meshes(
    mdl: &MDL,
    vvd: &VVD,
    vtx: &VTX,
    skinned: bool,
    material_count: usize,
) -> Vec<AssetMesh> {
    let mut out = Vec::new();

    let mut body_part_start: i32 = 0;
    for (bp_index, bp) in mdl.body.iter().enumerate() {
        let vtx_bp = vtx.body.get(bp_index);
        if vtx_bp.is_none() {
            log::warn!("body part {bp_index} missing from vtx, skipped");
        }

        let mut model_start: i32 = 0;
        for (model_index, model) in bp.models.iter().enumerate() {
            if let Some(vtx_model) = vtx_bp.and_then(|b| b.models.get(model_index)) {
                for (mesh_index, mesh) in model.meshes.iter().enumerate() {
                    let Some(vtx_mesh) = vtx_model.lod0.meshes.get(mesh_index) else {
                        log::warn!("mesh {bp_index}/{model_index}/{mesh_index} missing from vtx");
                        continue;
                    };
                    let base = body_part_start + model_start + mesh.vertex_index_start;
                    if let Some(built) =
                        build_mesh(mesh, vtx_mesh, vvd, base, skinned, material_count)
                    {
                        out.push(built);
                    }
                }
            } else {
                log::warn!("model {bp_index}/{model_index} missing from vtx, skipped");
            }
            model_start += model.vertex_count;
        }
        body_part_start += bp.models.iter().map(|m| m.vertex_count).sum::<i32>();
    }

    out
}

/// Merge a mesh's strip groups into one deduplicated buffer. `base` is the
/// running body-part + model + mesh vertex start; adding a strip-group
/// vertex's mesh-relative id to it yields the absolute VVD index.
fn build_mesh(
    mesh: &MDLMesh,
    vtx_mesh: &VTXMesh,
    vvd: &VVD,
    base: i32,
    skinned: bool,
    material_count: usize,
) -> Option<AssetMesh> {
    if mesh.material_index < 0 || mesh.material_index as usize >= material_count {
        log::warn!("mesh references material {} out of range", mesh.material_index);
        return None;
    }

    let mut remap: HashMap<u32, u32> = HashMap::new();
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for sg in &vtx_mesh.strip_groups {
        for tri in sg.indices.chunks_exact(3) {
            let mut corners = [0u32; 3];
            for (slot, &sg_index) in tri.iter().enumerate() {
                let vvd_index = base as i64 + { sg.verts[sg_index as usize].orig_mesh_vert_id } as i64;
                if vvd_index < 0 || vvd_index as usize >= vvd.verts.len() {
                    log::warn!("vertex index {vvd_index} outside the vvd pool, mesh skipped");
                    return None;
                }
                let next_index = vertices.len() as u32;
                corners[slot] = *remap.entry(vvd_index as u32).or_insert_with(|| {
                    vertices.push(convert_vertex(&vvd.verts[vvd_index as usize], skinned));
                    next_index
                });
            }
            // The source winding is right-handed the wrong way round for
            // the output; swap the last two corners of every triangle.
            indices.extend_from_slice(&[corners[0], corners[2], corners[1]]);
        }
    }

    Some(AssetMesh {
        material_index: mesh.material_index as usize,
        vertices,
        indices,
        skinned,
    })
}

/// Quantize up to three bone weights to bytes totalling exactly 255; the
/// rounding error lands on the largest nonzero weight.
fn convert_vertex(v: &ModelVertex, skinned: bool) -> SkinnedVertex {
    let position = { v.pos };
    let normal = { v.norm };
    let uv: Vec2 = { v.uv };

    let mut bones = [0u8; 4];
    let mut weights = [0u8; 4];

    if skinned {
        let count = (v.num_bones as usize).min(3);
        let src_weights = { v.bone_weight };
        let src_bones = { v.bone_id };

        for i in 0..count {
            bones[i] = src_bones[i];
            weights[i] = (src_weights[i] * 255.0).round().clamp(0.0, 255.0) as u8;
        }

        let sum: i32 = weights.iter().map(|&w| w as i32).sum();
        let diff = 255 - sum;
        if diff != 0 {
            let largest = (0..count.max(1))
                .filter(|&i| weights[i] > 0)
                .max_by_key(|&i| weights[i])
                .unwrap_or(0);
            weights[largest] = (weights[largest] as i32 + diff).clamp(0, 255) as u8;
        }
    }

    SkinnedVertex {
        position,
        normal,
        uv,
        bones,
        weights,
    }
}

/// Resolve each mdl texture against the search paths, then the bare
/// `materials/<name>` fallback; unresolved entries keep `texture: None`.
fn build_materials(store: &dyn BlobStore, mdl: &MDL) -> Vec<Material> {
    let bare = String::new();

    mdl.textures
        .iter()
        .map(|tex| {
            let mut texture = None;
            for prefix in mdl.texture_paths.iter().chain(std::iter::once(&bare)) {
                let path = VLocalPath::new("materials", &format!("{prefix}{}", tex.name), "vtf");
                let Some(blob) = store.read_blob(&path) else {
                    continue;
                };
                match VTF::read_inner(&mut BufReader::new(Cursor::new(&blob[..]))) {
                    Ok(vtf) => match vtf.decode_rgba() {
                        Some(rgba) => {
                            texture = Some(DecodedTexture {
                                width: vtf.width(),
                                height: vtf.height(),
                                rgba,
                            });
                            break;
                        }
                        None => log::warn!("{}: undecodable pixel format", path.full()),
                    },
                    Err(e) => log::warn!("{}: {}", path.full(), e),
                }
            }
            Material {
                name: tex.name.clone(),
                texture,
            }
        })
        .collect()
}

fn build_animations(mdl: &MDL, mdl_bytes: &[u8], ani_bytes: Option<&[u8]>) -> Vec<AnimationTrack> {
    let mut out = Vec::new();

    for seq in &mdl.sequences {
        let index = seq.anim_desc_index;
        if index < 0 || index as usize >= mdl.anim_descs.len() {
            log::warn!("sequence '{}' references a bad animation, skipped", seq.label);
            continue;
        }
        match anim::decode_frames(mdl, mdl_bytes, ani_bytes, index as usize) {
            Ok(frames) => {
                let desc = &mdl.anim_descs[index as usize];
                out.push(AnimationTrack {
                    name: seq.label.clone(),
                    fps: desc.fps,
                    looping: seq.looping(),
                    frames,
                });
            }
            Err(e) => log::warn!("sequence '{}' skipped: {}", seq.label, e),
        }
    }

    out
}

fn build_physics(skeleton: &[RestBone], phy: &PHY) -> (Vec<PhysBody>, Vec<PhysJoint>) {
    let mut bodies = Vec::new();
    let mut solid_to_body: Vec<Option<usize>> = vec![None; phy.solids.len()];
    let mut bone_to_solid: HashMap<i32, usize> = HashMap::new();

    for (solid_index, solid) in phy.solids.iter().enumerate() {
        // Solids store bone + 1; a static prop solid lands on the root.
        let bone_index = solid.bone_index().unwrap_or(-1).max(0);
        if bone_index as usize >= skeleton.len() {
            log::warn!("solid {solid_index} references bone {bone_index} out of range, skipped");
            continue;
        }

        let mut hull: Vec<Vec3> = solid
            .meshes
            .iter()
            .flat_map(|m| m.vertices.iter().copied())
            .collect();
        if hull.is_empty() {
            hull = box_corners(Vec3::splat(-1.0), Vec3::splat(1.0));
        } else if hull.len() > HULL_VERTEX_CAP {
            let (min, max) = bounds(&hull);
            hull = box_corners(min, max);
        }

        solid_to_body[solid_index] = Some(bodies.len());
        bone_to_solid.entry(bone_index).or_insert(solid_index);
        bodies.push(PhysBody {
            bone_index,
            bone_name: skeleton[bone_index as usize].name.clone(),
            vertices: hull,
        });
    }

    let mut joints = Vec::new();
    for (solid_index, _solid) in phy.solids.iter().enumerate() {
        let Some(child_body) = solid_to_body[solid_index] else {
            continue;
        };
        let child_bone = bodies[child_body].bone_index;

        // Nearest ancestor bone that also carries a solid becomes the
        // joint's parent body.
        let mut cursor = skeleton[child_bone as usize].parent;
        let parent_solid = loop {
            if cursor < 0 {
                break None;
            }
            if let Some(&candidate) = bone_to_solid.get(&cursor) {
                if candidate != solid_index && solid_to_body[candidate].is_some() {
                    break Some(candidate);
                }
            }
            cursor = skeleton[cursor as usize].parent;
        };
        let Some(parent_solid) = parent_solid else {
            continue;
        };
        let parent_body = solid_to_body[parent_solid].unwrap();
        let parent_bone = bodies[parent_body].bone_index;

        let parent_rest = &skeleton[parent_bone as usize];
        let child_rest = &skeleton[child_bone as usize];
        let inv = parent_rest.world_rotation.inverse();

        // Matched first by solid indices, then by bone indices.
        let constraint = phy
            .constraints
            .iter()
            .find(|c| c.parent == parent_solid as i32 && c.child == solid_index as i32)
            .or_else(|| {
                phy.constraints
                    .iter()
                    .find(|c| c.parent == parent_bone && c.child == child_bone)
            });
        let (swing_limit, twist_min, twist_max) = match constraint {
            Some(c) => (c.x_max.abs().max(c.y_max.abs()), c.z_min, c.z_max),
            None => (180.0, -180.0, 180.0),
        };

        joints.push(PhysJoint {
            parent_body,
            child_body,
            frame1_position: inv * (child_rest.world_position - parent_rest.world_position),
            frame1_rotation: (inv * child_rest.world_rotation).normalize(),
            frame2_position: Vec3::ZERO,
            frame2_rotation: Quat::IDENTITY,
            swing_limit,
            twist_min,
            twist_max,
        });
    }

    (bodies, joints)
}

fn bounds(points: &[Vec3]) -> (Vec3, Vec3) {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for p in points {
        min = min.min(*p);
        max = max.max(*p);
    }
    (min, max)
}

fn box_corners(min: Vec3, max: Vec3) -> Vec<Vec3> {
    vec![
        Vec3::new(min.x, min.y, min.z),
        Vec3::new(max.x, min.y, min.z),
        Vec3::new(min.x, max.y, min.z),
        Vec3::new(max.x, max.y, min.z),
        Vec3::new(min.x, min.y, max.z),
        Vec3::new(max.x, min.y, max.z),
        Vec3::new(min.x, max.y, max.z),
        Vec3::new(max.x, max.y, max.z),
    ]
}

/// The stand-in emitted when a decode fails: a small magenta cube.
fn placeholder(name: &str) -> Asset {
    let half = 8.0;
    let corners = box_corners(Vec3::splat(-half), Vec3::splat(half));

    let vertices = corners
        .iter()
        .map(|&position| SkinnedVertex {
            position,
            normal: position.normalize_or_zero(),
            uv: Vec2::ZERO,
            bones: [0; 4],
            weights: [0; 4],
        })
        .collect();

    #[rustfmt::skip]
    let indices: Vec<u32> = vec![
        0, 2, 1, 1, 2, 3, // -z
        4, 5, 6, 5, 7, 6, // +z
        0, 1, 4, 1, 5, 4, // -y
        2, 6, 3, 3, 6, 7, // +y
        0, 4, 2, 2, 4, 6, // -x
        1, 3, 5, 3, 7, 5, // +x
    ];

    Asset {
        name: name.to_owned(),
        skeleton: Vec::new(),
        meshes: vec![AssetMesh {
            material_index: 0,
            vertices,
            indices,
            skinned: false,
        }],
        materials: vec![Material {
            name: "placeholder".to_owned(),
            texture: Some(DecodedTexture {
                width: 1,
                height: 1,
                rgba: vec![255, 0, 255, 255],
            }),
        }],
        animations: Vec::new(),
        bodies: Vec::new(),
        joints: Vec::new(),
        placeholder: true,
    }
}
