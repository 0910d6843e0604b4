//! Valve packfile directories. Handles v1 and v2 directory files plus the
//! numbered body archives that sit next to them.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::PathBuf,
    sync::{Arc, Mutex, OnceLock},
};

use common::prelude::{Blob, BlobStore, VPath};
use common::vpath::normalize;

use crate::binaries::{read_string, BinaryData};
use crate::error::{Error, Result};

pub const VPK_SIGNATURE: u32 = 0x55aa1234;

/// Archive index meaning "the body follows the directory tree in this file".
pub const VPK_SELF_ARCHIVE: u16 = 0x7fff;

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct VPKHeaderV1 {
    pub signature: u32,
    pub version: u32,

    /// The size, in bytes, of the directory tree.
    pub tree_size: u32,
}

impl BinaryData for VPKHeaderV1 {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct VPKHeaderV2 {
    pub file_data_section_size: u32,
    pub archive_md5_section_size: u32,
    pub other_md5_section_size: u32,
    pub signature_section_size: u32,
}

impl BinaryData for VPKHeaderV2 {}

#[repr(C, packed)]
#[derive(Copy, Clone, Debug)]
pub struct VPKDirectoryEntry {
    pub crc: u32,
    pub preload_bytes: u16,

    /// Zero based archive holding this file's body; [`VPK_SELF_ARCHIVE`]
    /// means the body lives after the directory in the directory file.
    pub archive_index: u16,

    /// Offset of the body, relative to the end of the directory for
    /// [`VPK_SELF_ARCHIVE`], else from the start of the numbered archive.
    pub entry_offset: u32,
    pub entry_length: u32,

    pub terminator: u16,
}

impl BinaryData for VPKDirectoryEntry {}

pub struct VPKFile {
    pub entry: VPKDirectoryEntry,
    preload: Option<Vec<u8>>,
    blob: OnceLock<Blob>,
}

pub struct VPKDirectory {
    dir_path: PathBuf,
    /// Absolute file position where the directory tree ends; self-archived
    /// entry offsets are relative to this.
    directory_end: u64,
    max_pack_file: u16,
    files: HashMap<String, VPKFile>,
    /// Lazily opened body archives, one lock per archive so concurrent
    /// decodes on separate threads never share a seek position.
    archives: Mutex<HashMap<u16, Arc<Mutex<File>>>>,
}

impl VPKDirectory {
    pub fn load(dir_path: PathBuf) -> Result<Self> {
        let file = File::open(&dir_path)?;
        let mut buffer = BufReader::new(file);

        let header = VPKHeaderV1::read(&mut buffer, None)?;
        if { header.signature } != VPK_SIGNATURE {
            return Err(Error::InvalidPackage("bad signature"));
        }
        let header_size = match { header.version } {
            1 => 12u64,
            2 => {
                let _v2 = VPKHeaderV2::read(&mut buffer, None)?;
                28u64
            }
            _ => return Err(Error::InvalidPackage("unknown version")),
        };
        let directory_end = header_size + header.tree_size as u64;

        let mut max_pack_file = 0;
        let mut files = HashMap::<String, VPKFile>::new();

        loop {
            let ext = read_string(&mut buffer)?;
            if ext.is_empty() {
                break;
            }
            loop {
                let dir = read_string(&mut buffer)?;
                if dir.is_empty() {
                    break;
                }
                loop {
                    let filename = read_string(&mut buffer)?;
                    if filename.is_empty() {
                        break;
                    }

                    let dir_prefix = if dir == "" || dir == " " {
                        "".to_owned()
                    } else {
                        format!("{dir}/")
                    };
                    let path = normalize(&format!("{dir_prefix}{filename}.{ext}"));

                    let entry = VPKDirectoryEntry::read(&mut buffer, None)?;
                    if { entry.terminator } != 0xffff {
                        return Err(Error::InvalidPackage("entry missing terminator"));
                    }

                    if { entry.archive_index } != VPK_SELF_ARCHIVE {
                        max_pack_file = u16::max(entry.archive_index, max_pack_file);
                    }

                    // Preload bytes sit inline after the entry record.
                    let preload = if { entry.preload_bytes } != 0 {
                        let mut buf = vec![0; entry.preload_bytes as usize];
                        buffer.read_exact(&mut buf[..])?;
                        Some(buf)
                    } else {
                        None
                    };

                    files.insert(
                        path,
                        VPKFile {
                            entry,
                            preload,
                            blob: OnceLock::new(),
                        },
                    );
                }
            }
        }

        Ok(Self {
            dir_path,
            directory_end,
            max_pack_file,
            files,
            archives: Mutex::new(HashMap::new()),
        })
    }

    pub fn max_pack_file(&self) -> u16 {
        self.max_pack_file
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Fetch a file's bytes, preload first then body, cached after the first
    /// request. `None` when the path is not in the directory or its archive
    /// is missing on disk.
    pub fn read_file(&self, path: &str) -> Option<Blob> {
        let file_data = self.files.get(&normalize(path))?;

        if let Some(blob) = file_data.blob.get() {
            return Some(blob.clone());
        }

        match self.concat_entry(file_data) {
            Ok(bytes) => {
                let _ = file_data.blob.set(Arc::new(bytes));
                file_data.blob.get().cloned()
            }
            Err(e) => {
                log::warn!("{}: failed to read {}: {}", self.dir_path.display(), path, e);
                None
            }
        }
    }

    fn concat_entry(&self, file_data: &VPKFile) -> Result<Vec<u8>> {
        let entry = &file_data.entry;

        let mut bytes =
            Vec::with_capacity(entry.preload_bytes as usize + { entry.entry_length } as usize);
        if let Some(preload) = &file_data.preload {
            bytes.extend_from_slice(preload);
        }

        if { entry.entry_length } > 0 {
            let index = { entry.archive_index };
            let offset = if index == VPK_SELF_ARCHIVE {
                self.directory_end + { entry.entry_offset } as u64
            } else {
                ({ entry.entry_offset }) as u64
            };

            let archive = self.archive_handle(index)?;
            let mut archive = archive.lock().unwrap();
            archive.seek(SeekFrom::Start(offset))?;

            let mut body = vec![0; { entry.entry_length } as usize];
            archive.read_exact(&mut body)?;
            bytes.extend_from_slice(&body);
        }

        Ok(bytes)
    }

    fn archive_handle(&self, index: u16) -> Result<Arc<Mutex<File>>> {
        let mut archives = self.archives.lock().unwrap();
        if let Some(handle) = archives.get(&index) {
            return Ok(handle.clone());
        }

        let path = if index == VPK_SELF_ARCHIVE {
            self.dir_path.clone()
        } else {
            // hl2_misc_dir.vpk -> hl2_misc_000.vpk
            let mut pak_path = self.dir_path.clone();
            let dir_file = self
                .dir_path
                .file_name()
                .ok_or(Error::InvalidPackage("directory has no file name"))?
                .to_string_lossy()
                .into_owned();
            pak_path.set_file_name(dir_file.replace("_dir", &format!("_{index:0>3}")));
            pak_path
        };

        let handle = Arc::new(Mutex::new(File::open(path)?));
        archives.insert(index, handle.clone());
        Ok(handle)
    }
}

impl BlobStore for VPKDirectory {
    fn read_blob(&self, path: &dyn VPath) -> Option<Blob> {
        self.read_file(&path.full())
    }
}

#[cfg(test)]
mod vpk_tests {
    use super::*;
    use std::io::Write;

    fn push_entry(
        tree: &mut Vec<u8>,
        entry: &VPKDirectoryEntry,
        preload: &[u8],
    ) {
        tree.extend_from_slice(&{ entry.crc }.to_le_bytes());
        tree.extend_from_slice(&{ entry.preload_bytes }.to_le_bytes());
        tree.extend_from_slice(&{ entry.archive_index }.to_le_bytes());
        tree.extend_from_slice(&{ entry.entry_offset }.to_le_bytes());
        tree.extend_from_slice(&{ entry.entry_length }.to_le_bytes());
        tree.extend_from_slice(&{ entry.terminator }.to_le_bytes());
        tree.extend_from_slice(preload);
    }

    fn push_str(tree: &mut Vec<u8>, s: &str) {
        tree.extend_from_slice(s.as_bytes());
        tree.push(0);
    }

    /// One "models/cube.mdl" entry with 2 preload bytes and a 4 byte body
    /// stored after the directory, plus "models/cube.vvd" in archive 000.
    fn write_test_vpk(dir: &std::path::Path) -> PathBuf {
        let mut tree = Vec::new();

        push_str(&mut tree, "mdl");
        push_str(&mut tree, "models");
        push_str(&mut tree, "cube");
        push_entry(
            &mut tree,
            &VPKDirectoryEntry {
                crc: 0,
                preload_bytes: 2,
                archive_index: VPK_SELF_ARCHIVE,
                entry_offset: 0,
                entry_length: 4,
                terminator: 0xffff,
            },
            &[0xAA, 0xBB],
        );
        push_str(&mut tree, ""); // end files
        push_str(&mut tree, ""); // end dirs
        push_str(&mut tree, "vvd");
        push_str(&mut tree, "models");
        push_str(&mut tree, "cube");
        push_entry(
            &mut tree,
            &VPKDirectoryEntry {
                crc: 0,
                preload_bytes: 0,
                archive_index: 0,
                entry_offset: 0,
                entry_length: 3,
                terminator: 0xffff,
            },
            &[],
        );
        push_str(&mut tree, "");
        push_str(&mut tree, "");
        push_str(&mut tree, ""); // end extensions

        let mut data = Vec::new();
        data.extend_from_slice(&VPK_SIGNATURE.to_le_bytes());
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&(tree.len() as u32).to_le_bytes());
        data.extend_from_slice(&[0u8; 16]); // v2 section sizes
        data.extend_from_slice(&tree);
        data.extend_from_slice(&[1, 2, 3, 4]); // cube.mdl body

        let dir_path = dir.join("test_pak_dir.vpk");
        File::create(&dir_path).unwrap().write_all(&data).unwrap();
        File::create(dir.join("test_pak_000.vpk"))
            .unwrap()
            .write_all(&[9, 8, 7])
            .unwrap();
        dir_path
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vpk_tests_{tag}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_round_trip_lengths() {
        let dir = temp_dir("round_trip");
        let pak = VPKDirectory::load(write_test_vpk(&dir)).unwrap();

        for name in pak.file_names().map(str::to_owned).collect::<Vec<_>>() {
            let entry = pak.files[&name].entry;
            let blob = pak.read_file(&name).unwrap();
            assert_eq!(
                blob.len(),
                entry.preload_bytes as usize + { entry.entry_length } as usize
            );
        }
    }

    #[test]
    fn test_preload_body_concat() {
        let dir = temp_dir("concat");
        let pak = VPKDirectory::load(write_test_vpk(&dir)).unwrap();

        let blob = pak.read_file("models/cube.mdl").unwrap();
        assert_eq!(&blob[..], &[0xAA, 0xBB, 1, 2, 3, 4]);

        let blob = pak.read_file("models/cube.vvd").unwrap();
        assert_eq!(&blob[..], &[9, 8, 7]);
    }

    #[test]
    fn test_case_insensitive() {
        let dir = temp_dir("case");
        let pak = VPKDirectory::load(write_test_vpk(&dir)).unwrap();

        let a = pak.read_file("Models/Cube.MDL").unwrap();
        let b = pak.read_file("models/cube.mdl").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_is_not_fatal() {
        let dir = temp_dir("missing");
        let pak = VPKDirectory::load(write_test_vpk(&dir)).unwrap();
        assert!(pak.read_file("models/absent.mdl").is_none());
    }

    #[test]
    fn test_bad_signature() {
        let dir = temp_dir("bad_sig");
        let path = dir.join("junk_dir.vpk");
        File::create(&path).unwrap().write_all(&[0; 64]).unwrap();
        assert!(matches!(
            VPKDirectory::load(path),
            Err(Error::InvalidPackage(_))
        ));
    }
}
