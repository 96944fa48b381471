use std::io;
use std::path::PathBuf;

use rmdl_manifest::{BundleId, ChunkId, ManifestError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// A chunk is not bound to any bundle. Fatal for the file.
    #[error("chunk {chunk} lacks a bundle")]
    UnboundChunk { chunk: ChunkId },

    /// A chunk cannot fit into a single request buffer. Fatal for the file.
    #[error("chunk {chunk} ({size} B compressed) exceeds the {limit} B request buffer")]
    ChunkTooLarge {
        chunk: ChunkId,
        size: u32,
        limit: usize,
    },

    /// Full-archive mode asked for more than the request buffer admits.
    #[error("bundle {bundle} spans {span} B, beyond the {limit} B full-mode limit")]
    ArchiveTooLarge {
        bundle: BundleId,
        span: u64,
        limit: usize,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{url}: unexpected HTTP status {status}")]
    Status { url: String, status: u16 },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("chunk {chunk}: decompression failed: {reason}")]
    Inflate { chunk: ChunkId, reason: String },

    #[error("chunk {chunk}: content hash mismatch")]
    ChunkHash { chunk: ChunkId },

    #[error("failed to initialize decompressor: {0}")]
    Codec(io::Error),

    #[error("write to {path} failed: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Residual bundle failures after the retry budget. Bundle-local errors
    /// never surface individually; they aggregate here per file.
    #[error("{failed} of {total} bundles failed for {path}")]
    BundlesFailed {
        path: String,
        failed: usize,
        total: usize,
    },
}

impl FetchError {
    /// Bundle-local errors are retried; everything else is fatal for the
    /// file (see the error policy in the crate docs).
    pub fn is_bundle_local(&self) -> bool {
        matches!(
            self,
            FetchError::Transport(_)
                | FetchError::Status { .. }
                | FetchError::Protocol(_)
                | FetchError::Inflate { .. }
                | FetchError::ChunkHash { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_protocol_and_integrity_are_bundle_local() {
        assert!(FetchError::Transport("reset".into()).is_bundle_local());
        assert!(FetchError::Status {
            url: "u".into(),
            status: 503
        }
        .is_bundle_local());
        assert!(FetchError::Protocol("short body".into()).is_bundle_local());
        assert!(FetchError::Inflate {
            chunk: ChunkId(1),
            reason: "bad frame".into()
        }
        .is_bundle_local());
        assert!(FetchError::ChunkHash { chunk: ChunkId(1) }.is_bundle_local());
    }

    #[test]
    fn io_and_planning_errors_are_fatal() {
        assert!(!FetchError::Write {
            path: "x.bin".into(),
            source: io::Error::other("full")
        }
        .is_bundle_local());
        assert!(!FetchError::Codec(io::Error::other("init")).is_bundle_local());
        assert!(!FetchError::ChunkTooLarge {
            chunk: ChunkId(1),
            size: 9,
            limit: 8
        }
        .is_bundle_local());
        assert!(!FetchError::UnboundChunk { chunk: ChunkId(1) }.is_bundle_local());
    }
}
