//! Mounts the archives named in a conf.ini, decodes one model and prints
//! what came out. Handy for eyeballing an asset without a host attached.

use std::env;
use std::process::ExitCode;

use common::prelude::VGlobalPath;
use ini::Ini;
use source::prelude::{decode, GameData};

fn main() -> ExitCode {
    let mut args = env::args().skip(1);
    let Some(model) = args.next() else {
        eprintln!("usage: source-explorer <model path> [conf.ini]");
        return ExitCode::from(2);
    };
    let conf = args.next().unwrap_or_else(|| "conf.ini".to_owned());

    let ini = match Ini::load_from_file(&conf) {
        Ok(ini) => ini,
        Err(e) => {
            eprintln!("{conf}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let game_data = match GameData::from_ini(&ini) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("failed to mount archives: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("Mounted {} archives", game_data.mounts());

    let asset = match decode(&game_data, &VGlobalPath::from(model.as_str())) {
        Ok(asset) => asset,
        Err(e) => {
            eprintln!("{model}: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("asset: {}{}", asset.name, if asset.placeholder { " (placeholder)" } else { "" });

    println!("bones: {}", asset.skeleton.len());
    for (i, bone) in asset.skeleton.iter().enumerate() {
        println!(
            "  [{i}] {} parent={} world={:.2?}",
            bone.name, bone.parent, bone.world_position
        );
    }

    println!("meshes: {}", asset.meshes.len());
    for (i, mesh) in asset.meshes.iter().enumerate() {
        println!(
            "  [{i}] {} verts, {} tris, material {}{}",
            mesh.vertices.len(),
            mesh.triangle_count(),
            mesh.material_index,
            if mesh.skinned { ", skinned" } else { "" }
        );
    }

    println!("materials: {}", asset.materials.len());
    for (i, material) in asset.materials.iter().enumerate() {
        match &material.texture {
            Some(tex) => println!("  [{i}] {} {}x{}", material.name, tex.width, tex.height),
            None => println!("  [{i}] {} (default)", material.name),
        }
    }

    println!("animations: {}", asset.animations.len());
    for (i, track) in asset.animations.iter().enumerate() {
        println!(
            "  [{i}] {} {} frames @ {} fps{}",
            track.name,
            track.frames.len(),
            track.fps,
            if track.looping { ", looping" } else { "" }
        );
    }

    println!("bodies: {}", asset.bodies.len());
    for (i, body) in asset.bodies.iter().enumerate() {
        println!("  [{i}] bone '{}', {} hull verts", body.bone_name, body.vertices.len());
    }

    println!("joints: {}", asset.joints.len());
    for (i, joint) in asset.joints.iter().enumerate() {
        println!(
            "  [{i}] {} -> {} swing {:.1} twist {:.1}..{:.1}",
            joint.parent_body, joint.child_body, joint.swing_limit, joint.twist_min, joint.twist_max
        );
    }

    ExitCode::SUCCESS
}
