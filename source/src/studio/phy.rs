//! Collision companion. The front of the file is binary: a solid table of
//! convex meshes whose vertices sit behind a pivot computed from the first
//! mesh header. The back is key/value text carrying ragdoll constraints.

use glam::Vec3;

use crate::error::{Error, FileType, Result};

/// Stored in meters; the rest of the pipeline works in inches.
pub const METERS_TO_INCHES: f32 = 39.37;

/// Surface header bytes preceding the (optional) IVPS sentinel.
const SURFACE_PROLOGUE: usize = 44;
/// Extra prologue carried by "VPHY" tagged (v48+) solids.
const VPHY_EXTRA: usize = 28;

#[derive(Copy, Clone, Debug)]
pub struct PHYHeader {
    pub size: i32,
    pub id: i32,
    pub solid_count: i32,
    pub checksum: i32,
}

pub struct PhyConvexMesh {
    pub bone_index: i32,
    pub flags: i32,
    /// Corner values are solid-wide vertex indices.
    pub triangles: Vec<[u16; 3]>,
    /// Referenced vertices in index order, already converted to inches.
    pub vertices: Vec<Vec3>,
}

pub struct PhySolid {
    pub meshes: Vec<PhyConvexMesh>,
}

impl PhySolid {
    /// The bone this solid hangs off: its first convex mesh's bone.
    pub fn bone_index(&self) -> Option<i32> {
        self.meshes.first().map(|m| m.bone_index)
    }
}

/// Joint limits block from the text section, angles in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RagdollConstraint {
    pub parent: i32,
    pub child: i32,
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
    pub z_min: f32,
    pub z_max: f32,
}

pub struct PHY {
    pub header: PHYHeader,
    pub solids: Vec<PhySolid>,
    pub constraints: Vec<RagdollConstraint>,
}

fn u8_at(data: &[u8], pos: usize) -> Result<u8> {
    data.get(pos)
        .copied()
        .ok_or(Error::malformed(FileType::Phy, "file truncated"))
}

fn i32_at(data: &[u8], pos: usize) -> Result<i32> {
    let mut b = [0u8; 4];
    for (i, out) in b.iter_mut().enumerate() {
        *out = u8_at(data, pos + i)?;
    }
    Ok(i32::from_le_bytes(b))
}

fn u16_at(data: &[u8], pos: usize) -> Result<u16> {
    Ok(u16::from_le_bytes([u8_at(data, pos)?, u8_at(data, pos + 1)?]))
}

fn f32_at(data: &[u8], pos: usize) -> Result<f32> {
    Ok(f32::from_bits(i32_at(data, pos)? as u32))
}

impl PHY {
    pub fn read(bytes: &[u8]) -> Result<Self> {
        let header = PHYHeader {
            size: i32_at(bytes, 0)?,
            id: i32_at(bytes, 4)?,
            solid_count: i32_at(bytes, 8)?,
            checksum: i32_at(bytes, 12)?,
        };
        if header.size < 16 || header.solid_count < 0 {
            return Err(Error::malformed(FileType::Phy, "bad header"));
        }

        let mut pos = header.size as usize;
        let mut solids = Vec::new();
        for _ in 0..header.solid_count {
            let data_size = i32_at(bytes, pos)?;
            pos += 4;
            if data_size < 0 || pos + data_size as usize > bytes.len() {
                return Err(Error::malformed(FileType::Phy, "solid size out of range"));
            }
            let solid_end = pos + data_size as usize;

            // A bad solid only loses itself; the table gives us the next one.
            match read_solid(bytes, pos, solid_end) {
                Ok(solid) => solids.push(solid),
                Err(e) => {
                    log::warn!("collision solid {} skipped: {}", solids.len(), e);
                    solids.push(PhySolid { meshes: Vec::new() });
                }
            }
            pos = solid_end;
        }

        // Everything after the last solid is key/value text.
        let text = String::from_utf8_lossy(&bytes[pos.min(bytes.len())..]);
        let constraints = parse_constraints(&text);

        Ok(Self {
            header,
            solids,
            constraints,
        })
    }
}

fn read_solid(bytes: &[u8], start: usize, solid_end: usize) -> Result<PhySolid> {
    let mut pos = start;

    // v48+ solids are tagged "VPHY" and carry a longer prologue.
    if bytes.get(pos..pos + 4) == Some(&b"VPHY"[..]) {
        pos += VPHY_EXTRA;
    }
    pos += SURFACE_PROLOGUE;

    if bytes.get(pos..pos + 4) == Some(&b"IVPS"[..]) {
        pos += 4;
    }

    struct RawMesh {
        bone_index: i32,
        flags: i32,
        triangles: Vec<[u16; 3]>,
        referenced: Vec<u16>,
    }

    let mut raw_meshes: Vec<RawMesh> = Vec::new();
    let mut vertex_pivot = None;
    let mut max_index = 0u16;

    // Convex mesh headers and triangles run up to the vertex section, whose
    // position the first mesh encodes relative to its own header.
    while pos < vertex_pivot.unwrap_or(solid_end) {
        let mesh_start = pos;
        let vertex_data_offset = i32_at(bytes, pos)?;
        let bone_index = i32_at(bytes, pos + 4)? - 1;
        let flags = i32_at(bytes, pos + 8)?;
        let triangle_count = i32_at(bytes, pos + 12)?;
        pos += 16;

        if vertex_pivot.is_none() {
            let pivot = mesh_start as i64 + vertex_data_offset as i64;
            if pivot <= pos as i64 || pivot as usize > solid_end {
                return Err(Error::malformed(FileType::Phy, "vertex pivot out of range"));
            }
            vertex_pivot = Some(pivot as usize);
        }

        if triangle_count < 0 {
            return Err(Error::malformed(FileType::Phy, "negative triangle count"));
        }

        let mut triangles = Vec::with_capacity(triangle_count as usize);
        let mut referenced = Vec::new();
        for _ in 0..triangle_count {
            pos += 4; // triangle index byte + padding
            let mut tri = [0u16; 3];
            for corner in tri.iter_mut() {
                // Only the first two bytes of the corner record matter.
                *corner = u16_at(bytes, pos)?;
                pos += 4;
                max_index = max_index.max(*corner);
                referenced.push(*corner);
            }
            triangles.push(tri);
        }

        raw_meshes.push(RawMesh {
            bone_index,
            flags,
            triangles,
            referenced,
        });
    }

    let Some(pivot) = vertex_pivot else {
        return Ok(PhySolid { meshes: Vec::new() });
    };

    // The vertex count is implicit: one past the highest referenced index.
    let vertex_count = max_index as usize + 1;
    let mut vertices = Vec::with_capacity(vertex_count);
    for i in 0..vertex_count {
        let p = pivot + i * 16;
        vertices.push(
            Vec3::new(f32_at(bytes, p)?, f32_at(bytes, p + 4)?, f32_at(bytes, p + 8)?)
                * METERS_TO_INCHES,
        );
    }

    let meshes = raw_meshes
        .into_iter()
        .map(|raw| {
            let vertices = (0..vertex_count as u16)
                .filter(|v| raw.referenced.contains(v))
                .map(|v| vertices[v as usize])
                .collect();
            PhyConvexMesh {
                bone_index: raw.bone_index,
                flags: raw.flags,
                triangles: raw.triangles,
                vertices,
            }
        })
        .collect();

    Ok(PhySolid { meshes })
}

/// Line-based quote-split parser for the trailing text section. A line of
/// `"key" "value"` splits on `"` into `[_, key, _, value, ..]`.
fn parse_constraints(text: &str) -> Vec<RagdollConstraint> {
    let mut constraints = Vec::new();
    let mut current: Option<RagdollConstraint> = None;
    let mut in_block = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.contains("ragdollconstraint") {
            current = Some(RagdollConstraint::default());
            continue;
        }
        if current.is_some() && trimmed.starts_with('{') {
            in_block = true;
            continue;
        }
        if in_block && trimmed.starts_with('}') {
            if let Some(done) = current.take() {
                constraints.push(done);
            }
            in_block = false;
            continue;
        }

        let Some(constraint) = current.as_mut() else {
            continue;
        };
        if !in_block || !trimmed.contains('"') {
            continue;
        }

        let parts: Vec<&str> = trimmed.split('"').collect();
        if parts.len() < 4 {
            continue;
        }
        let key = parts[1];
        let value = parts[3];

        let float = || value.parse::<f32>().unwrap_or(0.0);
        match key {
            "parent" => constraint.parent = value.parse().unwrap_or(-1),
            "child" => constraint.child = value.parse().unwrap_or(-1),
            "xmin" => constraint.x_min = float(),
            "xmax" => constraint.x_max = float(),
            "ymin" => constraint.y_min = float(),
            "ymax" => constraint.y_max = float(),
            "zmin" => constraint.z_min = float(),
            "zmax" => constraint.z_max = float(),
            // friction keys are recognized but unused
            "xfriction" | "yfriction" | "zfriction" => {}
            _ => {}
        }
    }

    constraints
}
