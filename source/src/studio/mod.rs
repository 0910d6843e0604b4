//! Studio model companions: the MDL metadata file plus the VVD vertex pool,
//! VTX strip tree, PHY collision blob and optional external ANI stream.

pub mod anim;
pub mod mdl;
pub mod phy;
pub mod vtx;
pub mod vvd;

#[cfg(test)]
pub(crate) mod test_data;

pub use mdl::MDL;
pub use phy::PHY;
pub use vtx::VTX;
pub use vvd::VVD;
