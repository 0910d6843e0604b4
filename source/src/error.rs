use std::io;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Vpk,
    Mdl,
    Vvd,
    Vtx,
    Phy,
    Ani,
    Vtf,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Package signature mismatch. Fatal to the whole package.
    #[error("invalid package: {0}")]
    InvalidPackage(&'static str),

    /// MDL signature or version out of range. The asset becomes a placeholder.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// Required companion (VVD or any VTX variant) is absent.
    #[error("missing companion file: {0}")]
    MissingCompanion(String),

    /// Out-of-range index or truncated stream; the smallest containing unit
    /// (mesh, animation, solid) is skipped.
    #[error("malformed {ty:?} data: {error}")]
    MalformedTable { ty: FileType, error: &'static str },

    /// Texture format outside the supported set.
    #[error("unsupported texture format {0}")]
    UnsupportedFormat(i32),

    /// Cooperative cancellation; no asset is emitted.
    #[error("decode aborted")]
    DecodeAborted,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub fn malformed(ty: FileType, error: &'static str) -> Self {
        Error::MalformedTable { ty, error }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
