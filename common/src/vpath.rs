//! Logical paths into mounted game data.
//!
//! Archive directories key their entries by lowercase forward-slash paths, so
//! every path type here normalizes on construction.

/// Lowercase, forward slashes, no leading slash.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
        .trim_start_matches('/')
        .to_ascii_lowercase()
}

pub trait VPath {
    /// Directory part, no trailing slash. Empty for root-level files.
    fn dir(&self) -> &str;
    /// File stem, without the extension.
    fn filename(&self) -> &str;
    fn ext(&self) -> &str;

    /// The full normalized path, e.g. `models/props/barrel.mdl`.
    fn full(&self) -> String {
        let dir = self.dir();
        if dir.is_empty() {
            format!("{}.{}", self.filename(), self.ext())
        } else {
            format!("{}/{}.{}", dir, self.filename(), self.ext())
        }
    }
}

/// A complete path given as one string.
#[derive(Debug, Clone)]
pub struct VGlobalPath {
    dir: String,
    filename: String,
    ext: String,
}

impl From<&str> for VGlobalPath {
    fn from(path: &str) -> Self {
        let norm = normalize(path);
        let (dir, file) = match norm.rfind('/') {
            Some(pos) => (norm[..pos].to_owned(), &norm[pos + 1..]),
            None => (String::new(), norm.as_str()),
        };
        let (filename, ext) = match file.find('.') {
            Some(pos) => (file[..pos].to_owned(), file[pos + 1..].to_owned()),
            None => (file.to_owned(), String::new()),
        };
        Self { dir, filename, ext }
    }
}

impl VPath for VGlobalPath {
    fn dir(&self) -> &str {
        &self.dir
    }
    fn filename(&self) -> &str {
        &self.filename
    }
    fn ext(&self) -> &str {
        &self.ext
    }
}

/// Directory, stem and extension supplied separately.
#[derive(Debug, Clone)]
pub struct VSplitPath {
    dir: String,
    filename: String,
    ext: String,
}

impl VSplitPath {
    pub fn new(dir: &str, filename: &str, ext: &str) -> Self {
        Self {
            dir: normalize(dir).trim_end_matches('/').to_owned(),
            filename: normalize(filename),
            ext: normalize(ext),
        }
    }
}

impl VPath for VSplitPath {
    fn dir(&self) -> &str {
        &self.dir
    }
    fn filename(&self) -> &str {
        &self.filename
    }
    fn ext(&self) -> &str {
        &self.ext
    }
}

/// A path relative to a mount root, e.g. `materials/` + a texture path.
#[derive(Debug, Clone)]
pub struct VLocalPath {
    split: VSplitPath,
}

impl VLocalPath {
    pub fn new(root: &str, local_path: &str, ext: &str) -> Self {
        let norm = normalize(local_path);
        let (local_dir, filename) = match norm.rfind('/') {
            Some(pos) => (&norm[..pos], &norm[pos + 1..]),
            None => ("", norm.as_str()),
        };
        let root = normalize(root);
        let root = root.trim_end_matches('/');
        let dir = if local_dir.is_empty() {
            root.to_owned()
        } else {
            format!("{}/{}", root, local_dir)
        };
        Self {
            split: VSplitPath {
                dir,
                filename: filename.to_owned(),
                ext: normalize(ext),
            },
        }
    }
}

impl VPath for VLocalPath {
    fn dir(&self) -> &str {
        self.split.dir()
    }
    fn filename(&self) -> &str {
        self.split.filename()
    }
    fn ext(&self) -> &str {
        self.split.ext()
    }
}

#[cfg(test)]
mod vpath_tests {
    use super::*;

    #[test]
    fn test_global() {
        let p = VGlobalPath::from("Models\\Props_C17\\Bench01a.MDL");
        assert_eq!(p.dir(), "models/props_c17");
        assert_eq!(p.filename(), "bench01a");
        assert_eq!(p.ext(), "mdl");
        assert_eq!(p.full(), "models/props_c17/bench01a.mdl");
    }

    #[test]
    fn test_global_root_level() {
        let p = VGlobalPath::from("readme.txt");
        assert_eq!(p.dir(), "");
        assert_eq!(p.full(), "readme.txt");
    }

    #[test]
    fn test_split() {
        let p = VSplitPath::new("models/props_c17", "bench01a.dx90", "vtx");
        assert_eq!(p.full(), "models/props_c17/bench01a.dx90.vtx");
    }

    #[test]
    fn test_local() {
        let p = VLocalPath::new("materials", "Metal\\MetalFence001a", "vtf");
        assert_eq!(p.full(), "materials/metal/metalfence001a.vtf");
    }
}
