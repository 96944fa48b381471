use rmdl_verify::{content_id, HashKind};
use serde::{Deserialize, Serialize};

use crate::ids::{BundleId, ChunkId};

/// One chunk of a file: a compressed span inside a bundle, placed at a fixed
/// offset of the decompressed output.
///
/// On the wire a chunk is fully described by
/// `(bundle_id, compressed_offset, compressed_size)`; on disk by
/// `(uncompressed_offset, uncompressed_size)` plus the content tag encoded in
/// its [`ChunkId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunk {
    pub id: ChunkId,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub bundle_id: BundleId,
    pub compressed_offset: u32,
    pub uncompressed_offset: u32,
}

impl FileChunk {
    /// Check a decompressed payload against this chunk's content tag.
    ///
    /// [`HashKind::None`] admits no verification and always fails, matching
    /// the behavior of the on-disk verify pass (an unverifiable file is never
    /// "already up to date").
    pub fn verify(&self, payload: &[u8], kind: HashKind) -> bool {
        content_id(kind, payload) == Some(self.id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged_chunk(payload: &[u8], kind: HashKind) -> FileChunk {
        FileChunk {
            id: ChunkId(content_id(kind, payload).unwrap_or(0)),
            compressed_size: payload.len() as u32,
            uncompressed_size: payload.len() as u32,
            bundle_id: BundleId(1),
            compressed_offset: 0,
            uncompressed_offset: 0,
        }
    }

    #[test]
    fn verify_accepts_matching_payload() {
        let chunk = tagged_chunk(b"payload", HashKind::Sha256);
        assert!(chunk.verify(b"payload", HashKind::Sha256));
    }

    #[test]
    fn verify_rejects_flipped_bit() {
        let chunk = tagged_chunk(b"payload", HashKind::HkdfSha256);
        assert!(!chunk.verify(b"paxload", HashKind::HkdfSha256));
    }

    #[test]
    fn verify_rejects_unverifiable_kind() {
        let chunk = tagged_chunk(b"payload", HashKind::Sha256);
        assert!(!chunk.verify(b"payload", HashKind::None));
    }
}
