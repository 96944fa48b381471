//! Data model for chunk-bundled release manifests.
//!
//! A manifest describes a set of files assembled from compressed chunks that
//! live inside server-side bundle objects. This crate owns the JSON form of
//! that description and everything that can be answered without touching the
//! network: filtering, sanitization, up-to-date elision against an older
//! manifest, on-disk existence and verification checks, and placement of the
//! output files (sizing, permissions, symlinks).
//!
//! Downloading is out of scope; see the `rmdl-fetch` crate.

mod chunk;
mod error;
mod file;
mod ids;
mod list;

pub use chunk::FileChunk;
pub use error::{ManifestError, Result};
pub use file::{FileInfo, FileParams};
pub use ids::{BundleId, ChunkId, FileId};
pub use list::FileList;
