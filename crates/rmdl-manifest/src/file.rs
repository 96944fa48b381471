use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use rmdl_verify::HashKind;
use serde::{Deserialize, Serialize};

use crate::chunk::FileChunk;
use crate::error::{ManifestError, Result};
use crate::ids::FileId;

/// Per-file parameters selected by the manifest.
///
/// Serialized flattened into the file record. The `unk*` fields are opaque
/// pass-through bytes kept for wire fidelity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileParams {
    #[serde(default)]
    pub unk0: u8,
    #[serde(rename = "hash_type", with = "hash_kind_wire")]
    pub hash_kind: HashKind,
    #[serde(default)]
    pub unk2: u8,
    #[serde(default)]
    pub unk3: u8,
    pub max_uncompressed: u32,
}

mod hash_kind_wire {
    use rmdl_verify::HashKind;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(kind: &HashKind, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*kind))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<HashKind, D::Error> {
        let value = u8::deserialize(deserializer)?;
        HashKind::try_from(value)
            .map_err(|v| serde::de::Error::custom(format_args!("unknown hash_type {v}")))
    }
}

/// One file entry of a manifest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: FileId,
    pub path: String,
    pub size: u32,
    pub langs: BTreeSet<String>,
    pub chunks: Vec<FileChunk>,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub permissions: u8,
    #[serde(flatten)]
    pub params: FileParams,
    #[serde(default)]
    pub unk5: u8,
    #[serde(default)]
    pub unk6: u8,
    #[serde(default)]
    pub unk8: u8,
    #[serde(default)]
    pub unk10: u8,
}

impl FileInfo {
    /// CSV line used by the `list` action: `path,size,id,lang;lang`.
    pub fn to_csv(&self) -> String {
        let langs: Vec<&str> = self.langs.iter().map(String::as_str).collect();
        format!("{},{},{},{}", self.path, self.size, self.id, langs.join(";"))
    }

    /// Destination path of this file under an output directory.
    pub fn target_path(&self, out_dir: &Path) -> PathBuf {
        out_dir.join(&self.path)
    }

    pub fn is_symlink(&self) -> bool {
        !self.link.is_empty()
    }

    /// True when the file is already present on disk as a regular file.
    pub fn exists_at(&self, out_dir: &Path) -> bool {
        self.target_path(out_dir).is_file()
    }

    /// Create (or resize) the destination file and return it opened for
    /// positioned writes. Parent directories are created as needed; a nonzero
    /// `permissions` byte marks the file executable.
    pub fn create_file(&self, out_dir: &Path) -> Result<File> {
        let dest = self.target_path(out_dir);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| ManifestError::Create {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&dest)
            .map_err(|e| ManifestError::Create {
                path: dest.clone(),
                source: e,
            })?;
        let current = file
            .metadata()
            .map_err(|e| ManifestError::Create {
                path: dest.clone(),
                source: e,
            })?
            .len();
        if current != u64::from(self.size) {
            file.set_len(u64::from(self.size))
                .map_err(|e| ManifestError::Create {
                    path: dest.clone(),
                    source: e,
                })?;
        }
        #[cfg(unix)]
        if self.permissions != 0 {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dest, fs::Permissions::from_mode(0o755)).map_err(|e| {
                ManifestError::Create {
                    path: dest.clone(),
                    source: e,
                }
            })?;
        }
        Ok(file)
    }

    /// Materialize a link entry as a symlink to its verbatim target.
    ///
    /// An existing link at the destination is replaced; an existing regular
    /// file is left alone and reported as an error by the create call.
    pub fn create_symlink(&self, out_dir: &Path) -> Result<()> {
        let dest = self.target_path(out_dir);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| ManifestError::Create {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        if dest.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink()) {
            let _ = fs::remove_file(&dest);
        }
        symlink(&self.link, &dest).map_err(|e| ManifestError::Symlink {
            link: dest,
            target: self.link.clone(),
            source: e,
        })
    }

    /// Drop every chunk whose span of the existing output file already
    /// matches its content tag, keeping only the chunks that still need to be
    /// downloaded.
    ///
    /// Returns true when the file is fully up to date: the on-disk size
    /// matches and no chunk survived. A missing or unverifiable file
    /// (`hash_type` none) keeps all its chunks and returns false.
    pub fn retain_unverified(&mut self, out_dir: &Path) -> bool {
        if self.params.hash_kind.is_none() {
            return false;
        }
        let dest = self.target_path(out_dir);
        let Ok(mut file) = File::open(&dest) else {
            return false;
        };
        let Ok(meta) = file.metadata() else {
            return false;
        };
        let file_size = meta.len();

        let kind = self.params.hash_kind;
        let mut buffer = vec![0u8; self.params.max_uncompressed as usize];
        self.chunks.retain(|chunk| {
            let end = u64::from(chunk.uncompressed_offset) + u64::from(chunk.uncompressed_size);
            if end > file_size {
                return true;
            }
            let span = &mut buffer[..chunk.uncompressed_size as usize];
            if file
                .seek(SeekFrom::Start(u64::from(chunk.uncompressed_offset)))
                .is_err()
                || file.read_exact(span).is_err()
            {
                return true;
            }
            !chunk.verify(span, kind)
        });
        file_size == u64::from(self.size) && self.chunks.is_empty()
    }

    /// A file needs no update when the old manifest carries the same entry.
    pub fn is_uptodate(&self, old: &FileInfo) -> bool {
        self.id == old.id
    }
}

#[cfg(unix)]
fn symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{BundleId, ChunkId};
    use rmdl_verify::content_id;
    use tempfile::tempdir;

    fn file_of(payloads: &[&[u8]]) -> FileInfo {
        let mut chunks = Vec::new();
        let mut offset = 0u32;
        for payload in payloads {
            chunks.push(FileChunk {
                id: ChunkId(content_id(HashKind::Sha256, payload).unwrap()),
                compressed_size: payload.len() as u32,
                uncompressed_size: payload.len() as u32,
                bundle_id: BundleId(0xB),
                compressed_offset: 0,
                uncompressed_offset: offset,
            });
            offset += payload.len() as u32;
        }
        FileInfo {
            id: FileId(1),
            path: "dir/data.bin".into(),
            size: offset,
            langs: BTreeSet::new(),
            chunks,
            link: String::new(),
            permissions: 0,
            params: FileParams {
                hash_kind: HashKind::Sha256,
                max_uncompressed: 64,
                ..Default::default()
            },
            unk5: 0,
            unk6: 0,
            unk8: 0,
            unk10: 0,
        }
    }

    #[test]
    fn csv_shape() {
        let mut info = file_of(&[b"abcd"]);
        info.langs.insert("en_us".into());
        info.langs.insert("none".into());
        assert_eq!(info.to_csv(), "dir/data.bin,4,0000000000000001,en_us;none");
    }

    #[test]
    fn create_file_sizes_destination() {
        let dir = tempdir().unwrap();
        let info = file_of(&[b"abcd", b"efgh"]);
        let file = info.create_file(dir.path()).unwrap();
        assert_eq!(file.metadata().unwrap().len(), 8);
        assert!(info.exists_at(dir.path()));
    }

    #[test]
    fn retain_unverified_keeps_only_mismatches() {
        let dir = tempdir().unwrap();
        let mut info = file_of(&[b"abcd", b"efgh"]);
        std::fs::create_dir_all(dir.path().join("dir")).unwrap();
        std::fs::write(dir.path().join("dir/data.bin"), b"abcdXXXX").unwrap();

        assert!(!info.retain_unverified(dir.path()));
        assert_eq!(info.chunks.len(), 1);
        assert_eq!(info.chunks[0].uncompressed_offset, 4);
    }

    #[test]
    fn retain_unverified_accepts_intact_file() {
        let dir = tempdir().unwrap();
        let mut info = file_of(&[b"abcd", b"efgh"]);
        std::fs::create_dir_all(dir.path().join("dir")).unwrap();
        std::fs::write(dir.path().join("dir/data.bin"), b"abcdefgh").unwrap();

        assert!(info.retain_unverified(dir.path()));
        assert!(info.chunks.is_empty());
    }

    #[test]
    fn retain_unverified_without_hash_kind_keeps_all() {
        let dir = tempdir().unwrap();
        let mut info = file_of(&[b"abcd"]);
        info.params.hash_kind = HashKind::None;
        assert!(!info.retain_unverified(dir.path()));
        assert_eq!(info.chunks.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn create_symlink_points_at_verbatim_target() {
        let dir = tempdir().unwrap();
        let mut info = file_of(&[]);
        info.link = "../data.bin".into();
        info.create_symlink(dir.path()).unwrap();
        let made = std::fs::read_link(dir.path().join("dir/data.bin")).unwrap();
        assert_eq!(made, PathBuf::from("../data.bin"));
    }
}
