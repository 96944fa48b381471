//! Per-chunk decompression, verification and write-back.

use std::sync::Arc;

use zstd::bulk::Decompressor;

use crate::core::parser::ChunkSink;
use crate::core::plan::ChunkDownload;
use crate::effects::file::FileDownload;
use crate::error::FetchError;

/// Materializes completed chunks: inflates the compressed payload into a
/// reused scratch buffer, checks the content tag, and writes the result at
/// every destination offset of the owning file.
pub struct ChunkWriter {
    file: Arc<FileDownload>,
    ctx: Decompressor<'static>,
    scratch: Vec<u8>,
}

impl ChunkWriter {
    /// `max_uncompressed` sizes the scratch buffer once for the whole
    /// transfer (the planner's per-bundle maximum).
    pub fn new(file: Arc<FileDownload>, max_uncompressed: u32) -> Result<Self, FetchError> {
        let ctx = Decompressor::new().map_err(FetchError::Codec)?;
        Ok(Self {
            file,
            ctx,
            scratch: Vec::with_capacity(max_uncompressed as usize),
        })
    }
}

impl ChunkSink for ChunkWriter {
    fn deliver(&mut self, chunk: &ChunkDownload, compressed: &[u8]) -> Result<(), FetchError> {
        let expected = chunk.chunk.uncompressed_size as usize;
        self.scratch.clear();
        self.scratch.reserve(expected);
        let written = self
            .ctx
            .decompress_to_buffer(compressed, &mut self.scratch)
            .map_err(|e| FetchError::Inflate {
                chunk: chunk.chunk.id,
                reason: e.to_string(),
            })?;
        if written != expected {
            return Err(FetchError::Inflate {
                chunk: chunk.chunk.id,
                reason: format!("produced {written} B, expected {expected} B"),
            });
        }
        let kind = self.file.hash_kind;
        if !kind.is_none() && !chunk.chunk.verify(&self.scratch, kind) {
            tracing::warn!(chunk = %chunk.chunk.id, "content hash mismatch");
            return Err(FetchError::ChunkHash {
                chunk: chunk.chunk.id,
            });
        }
        self.file.write_chunk(chunk, &self.scratch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DownloadOpts;
    use rmdl_manifest::{BundleId, ChunkId, FileChunk, FileId, FileInfo, FileParams};
    use rmdl_verify::{content_id, HashKind};
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn fixture(payload: &[u8], kind: HashKind) -> (FileInfo, Vec<u8>) {
        let compressed = zstd::bulk::compress(payload, 3).unwrap();
        let info = FileInfo {
            id: FileId(1),
            path: "x.bin".into(),
            size: payload.len() as u32,
            langs: BTreeSet::new(),
            chunks: vec![FileChunk {
                id: ChunkId(content_id(kind, payload).unwrap_or(0x42)),
                compressed_size: compressed.len() as u32,
                uncompressed_size: payload.len() as u32,
                bundle_id: BundleId(0xB1),
                compressed_offset: 0,
                uncompressed_offset: 0,
            }],
            link: String::new(),
            permissions: 0,
            params: FileParams {
                hash_kind: kind,
                max_uncompressed: 1024,
                ..Default::default()
            },
            unk5: 0,
            unk6: 0,
            unk8: 0,
            unk10: 0,
        };
        (info, compressed)
    }

    #[test]
    fn inflates_verifies_and_writes() {
        let dir = tempdir().unwrap();
        let (info, compressed) = fixture(b"HELLO WORLD", HashKind::Sha256);
        let (file, queue) =
            FileDownload::plan(&info, &DownloadOpts::default(), Some(dir.path())).unwrap();
        let mut writer = ChunkWriter::new(Arc::clone(&file), 1024).unwrap();
        writer
            .deliver(&queue[0].req.chunks[0], &compressed)
            .unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("x.bin")).unwrap(),
            b"HELLO WORLD"
        );
    }

    #[test]
    fn corrupt_payload_fails_integrity() {
        let (info, mut compressed) = fixture(b"HELLO WORLD", HashKind::Sha256);
        let (file, queue) = FileDownload::plan(&info, &DownloadOpts::default(), None).unwrap();
        let mut writer = ChunkWriter::new(file, 1024).unwrap();
        if let Some(last) = compressed.last_mut() {
            *last ^= 0xFF;
        }
        let err = writer
            .deliver(&queue[0].req.chunks[0], &compressed)
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Inflate { .. } | FetchError::ChunkHash { .. }
        ));
    }

    #[test]
    fn wrong_tag_fails_hash_check() {
        let dir = tempdir().unwrap();
        let (mut info, compressed) = fixture(b"HELLO WORLD", HashKind::Sha256);
        info.chunks[0].id = ChunkId(0xDEAD);
        let (file, queue) =
            FileDownload::plan(&info, &DownloadOpts::default(), Some(dir.path())).unwrap();
        let mut writer = ChunkWriter::new(file, 1024).unwrap();
        let err = writer
            .deliver(&queue[0].req.chunks[0], &compressed)
            .unwrap_err();
        assert!(matches!(err, FetchError::ChunkHash { .. }));
    }

    #[test]
    fn unverifiable_kind_skips_hash_check() {
        let dir = tempdir().unwrap();
        let (mut info, compressed) = fixture(b"HELLO WORLD", HashKind::None);
        info.chunks[0].id = ChunkId(0x42);
        let (file, queue) =
            FileDownload::plan(&info, &DownloadOpts::default(), Some(dir.path())).unwrap();
        let mut writer = ChunkWriter::new(file, 1024).unwrap();
        writer
            .deliver(&queue[0].req.chunks[0], &compressed)
            .unwrap();
    }
}
