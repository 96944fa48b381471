use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest is empty")]
    Empty,

    #[error("unrecognized manifest format (expected a JSON array)")]
    UnrecognizedFormat,

    #[error("binary manifest container is not supported; convert it to JSON first")]
    BinaryContainer,

    #[error("malformed manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid file entry '{path}': {reason}")]
    Invalid { path: String, reason: String },

    #[error("failed to create {path}: {source}")]
    Create { path: PathBuf, source: io::Error },

    #[error("failed to create symlink {link} -> {target}: {source}")]
    Symlink {
        link: PathBuf,
        target: String,
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ManifestError>;
