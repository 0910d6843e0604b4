pub use crate::vfile::{Blob, BlobStore, VFile, VFileSystem};
pub use crate::vpath::{VGlobalPath, VLocalPath, VPath, VSplitPath};
