//! HTTP download pipeline for chunk-bundled release manifests.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Immutable configuration and types
//! - [`core`] - Pure transformations (request planning, range-response parsing)
//! - [`effects`] - I/O operations with trait abstraction
//!
//! A file's chunks are grouped into per-bundle byte-range requests by the
//! planner, issued over a bounded pool of concurrent transfers, parsed
//! incrementally out of single-range or `multipart/byteranges` bodies,
//! decompressed and verified chunk by chunk, and written at their target
//! offsets of the output file. Failures are bundle-granular: a broken
//! transfer returns its whole bundle request to the caller.

pub mod core;
pub mod data;
pub mod effects;
mod error;

pub use crate::core::parser::{ChunkSink, RangeParser, ResponseLayout};
pub use crate::core::plan::{plan_bundles, BundlePlan, ChunkDownload};
pub use data::{DownloadEvent, DownloadOpts, EventSink, RangeMode};
pub use effects::chunk::ChunkWriter;
pub use effects::driver::{DownloadSummary, Downloader};
pub use effects::file::{BundleDownload, FileDownload};
pub use effects::origin::{BoxByteStream, HttpOrigin, Origin, OriginResponse};
pub use effects::pool::TransferPool;
pub use error::FetchError;
