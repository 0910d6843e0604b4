use std::collections::HashMap;
use std::sync::Arc;

use crate::vpath::{normalize, VPath};

/// An immutable blob of file data, shared between whoever asked for it.
pub type Blob = Arc<Vec<u8>>;

/// Named-blob fetcher. Implemented by archive mounts and by [`VFileSystem`];
/// a miss is not an error, callers decide whether the file was required.
pub trait BlobStore {
    fn read_blob(&self, path: &dyn VPath) -> Option<Blob>;
}

#[derive(Default)]
pub struct VFile {
    pub data: Blob,
}

/// In-memory file map keyed by normalized path. Used by tests and by hosts
/// that already hold their data outside an archive.
#[derive(Default, Clone)]
pub struct VFileSystem {
    pub files: Arc<HashMap<String, VFile>>,
}

impl VFileSystem {
    pub fn new(files: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        Self {
            files: Arc::new(
                files
                    .into_iter()
                    .map(|(path, data)| {
                        (
                            normalize(&path),
                            VFile {
                                data: Arc::new(data),
                            },
                        )
                    })
                    .collect(),
            ),
        }
    }

    pub fn get_str(&self, path: &str) -> Option<Blob> {
        match self.files.get(&normalize(path)) {
            Some(file) => Some(file.data.clone()),
            None => {
                log::debug!("{:?} file not found", path);
                None
            }
        }
    }
}

impl BlobStore for VFileSystem {
    fn read_blob(&self, path: &dyn VPath) -> Option<Blob> {
        self.get_str(&path.full())
    }
}

#[cfg(test)]
mod vfile_tests {
    use super::*;
    use crate::vpath::VGlobalPath;

    #[test]
    fn test_case_insensitive_get() {
        let fs = VFileSystem::new([("Models/Foo.MDL".to_owned(), vec![1, 2, 3])]);
        let a = fs.read_blob(&VGlobalPath::from("Models/Foo.MDL")).unwrap();
        let b = fs.read_blob(&VGlobalPath::from("models/foo.mdl")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }
}
