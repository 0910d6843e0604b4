//! An ordered set of mounted package directories. Lookups walk the mounts
//! in order and the first hit wins, which matches how the engine layers its
//! content archives.

use std::path::PathBuf;
use std::sync::Arc;

use common::prelude::{Blob, BlobStore, VPath};
use ini::Ini;

use crate::error::{Error, Result};
use crate::vpk::VPKDirectory;

#[derive(Default)]
pub struct GameData {
    dirs: Vec<Arc<VPKDirectory>>,
}

impl GameData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&mut self, dir: VPKDirectory) {
        self.dirs.push(Arc::new(dir));
    }

    pub fn mounts(&self) -> usize {
        self.dirs.len()
    }

    pub fn read(&self, path: &dyn VPath) -> Option<Blob> {
        for dir in &self.dirs {
            if let Some(blob) = dir.read_blob(path) {
                return Some(blob);
            }
        }
        None
    }

    /// Mount every `vpk` listed under the game section of a config like:
    ///
    /// ```ini
    /// [launch]
    /// root = /data/steam
    /// game = hl2
    ///
    /// [hl2]
    /// name = hl2
    /// vpk = hl2_textures_dir.vpk
    /// vpk = hl2_misc_dir.vpk
    /// ```
    pub fn from_ini(ini: &Ini) -> Result<Self> {
        let launch = ini
            .section(Some("launch"))
            .ok_or(Error::InvalidPackage("config missing [launch]"))?;
        let game_key = launch
            .get("game")
            .ok_or(Error::InvalidPackage("config missing launch.game"))?;
        let game = ini
            .section(Some(game_key))
            .ok_or(Error::InvalidPackage("config missing game section"))?;

        let mut path = PathBuf::new();
        if let Some(root) = launch.get("root") {
            path.push(root);
        }
        if let Some(name) = game.get("name") {
            path.push(name);
        }

        let mut data = Self::new();
        for vpk in game.get_all("vpk") {
            data.mount(VPKDirectory::load(path.join(vpk))?);
        }
        Ok(data)
    }
}

impl BlobStore for GameData {
    fn read_blob(&self, path: &dyn VPath) -> Option<Blob> {
        self.read(path)
    }
}
