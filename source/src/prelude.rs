pub use crate::asset::{Asset, AssetMesh, Material, PhysBody, PhysJoint, RestBone};
pub use crate::assemble::{decode, decode_with, DecodeOptions};
pub use crate::error::{Error, FileType, Result};
pub use crate::game_data::GameData;
pub use crate::studio::{MDL, PHY, VTX, VVD};
pub use crate::vpk::VPKDirectory;
pub use crate::vtf::VTF;
