use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ManifestError, Result};
use crate::file::FileInfo;
use crate::ids::BundleId;

/// Largest decompressed chunk a manifest may declare.
const CHUNK_LIMIT: u32 = 16 * 1024 * 1024;

static LANG_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.\-_]+$").unwrap());

/// The files of a manifest after conversion, plus bundles the manifest
/// records but no file references.
#[derive(Clone, Debug, Default)]
pub struct FileList {
    pub files: Vec<FileInfo>,
    pub unreferenced: BTreeSet<BundleId>,
}

impl FileList {
    /// Parse a manifest document.
    ///
    /// Dispatches on the leading byte: `[` is the JSON array form. The binary
    /// container (leading `R`) is recognized but not supported.
    pub fn read(data: &[u8]) -> Result<FileList> {
        match data.first() {
            None => Err(ManifestError::Empty),
            Some(b'[') => Ok(FileList {
                files: serde_json::from_slice(data)?,
                unreferenced: BTreeSet::new(),
            }),
            Some(b'R') => Err(ManifestError::BinaryContainer),
            Some(_) => Err(ManifestError::UnrecognizedFormat),
        }
    }

    /// Re-emit the list as the JSON array form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.files)?)
    }

    /// Keep only files whose path matches the pattern. `None` keeps all.
    pub fn filter_path(&mut self, pattern: Option<&Regex>) {
        if let Some(pattern) = pattern {
            self.files.retain(|file| pattern.is_match(&file.path));
        }
    }

    /// Keep only files tagged with at least one of the given languages.
    /// An empty filter keeps all.
    pub fn filter_langs(&mut self, langs: &[String]) {
        if langs.is_empty() {
            return;
        }
        self.files
            .retain(|file| langs.iter().any(|lang| file.langs.contains(lang)));
    }

    /// Drop files an older release already provides unchanged.
    pub fn remove_uptodate(&mut self, old: &FileList) {
        let old_by_path: HashMap<&str, &FileInfo> = old
            .files
            .iter()
            .map(|file| (file.path.as_str(), file))
            .collect();
        self.files.retain(|file| {
            old_by_path
                .get(file.path.as_str())
                .map_or(true, |previous| !file.is_uptodate(previous))
        });
    }

    /// Validate every file entry before acting on the manifest.
    pub fn sanitize(&self) -> Result<()> {
        for file in &self.files {
            sanitize_file(file)?;
        }
        Ok(())
    }
}

fn invalid(file: &FileInfo, reason: impl Into<String>) -> ManifestError {
    ManifestError::Invalid {
        path: file.path.clone(),
        reason: reason.into(),
    }
}

fn sanitize_file(file: &FileInfo) -> Result<()> {
    if file.id.is_none() {
        return Err(invalid(file, "nil file id"));
    }
    if file.path.is_empty() || file.path.len() >= 256 {
        return Err(invalid(file, "path empty or too long"));
    }
    if file.path.contains('\\') {
        return Err(invalid(file, "path uses backslash separators"));
    }
    let path = Path::new(&file.path);
    if !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(invalid(file, "path must be relative without . or .."));
    }
    for lang in &file.langs {
        if !LANG_TAG.is_match(lang) {
            return Err(invalid(file, format!("bad language tag {lang:?}")));
        }
    }
    if file.is_symlink() {
        if !file.chunks.is_empty() {
            return Err(invalid(file, "link entries must not carry chunks"));
        }
        return Ok(());
    }

    let max_uncompressed = file.params.max_uncompressed;
    if max_uncompressed == 0 || max_uncompressed > CHUNK_LIMIT {
        return Err(invalid(file, "max_uncompressed out of range"));
    }
    if file.size > u32::MAX - max_uncompressed {
        return Err(invalid(file, "file size too large"));
    }
    let max_compressed = zstd_bound(max_uncompressed);
    let mut next_offset = 0u32;
    for chunk in &file.chunks {
        if chunk.id.is_none() {
            return Err(invalid(file, "nil chunk id"));
        }
        if chunk.bundle_id.is_none() {
            return Err(invalid(file, format!("chunk {} lacks a bundle", chunk.id)));
        }
        if chunk.compressed_size < 4 || chunk.compressed_size > max_compressed {
            return Err(invalid(file, format!("chunk {} compressed size", chunk.id)));
        }
        if chunk.uncompressed_size == 0 || chunk.uncompressed_size > max_uncompressed {
            return Err(invalid(
                file,
                format!("chunk {} uncompressed size", chunk.id),
            ));
        }
        if chunk.uncompressed_offset < next_offset {
            return Err(invalid(file, format!("chunk {} overlaps", chunk.id)));
        }
        let end = u64::from(chunk.uncompressed_offset) + u64::from(chunk.uncompressed_size);
        if end > u64::from(file.size) {
            return Err(invalid(file, format!("chunk {} past end of file", chunk.id)));
        }
        next_offset = end as u32;
    }
    Ok(())
}

/// Worst-case zstd frame size for a given input size.
fn zstd_bound(src: u32) -> u32 {
    let src = src as u64;
    let mut out = src + (src >> 8);
    if src < 128 << 10 {
        out += ((128 << 10) - src) >> 11;
    }
    out as u32
}
