use std::sync::Arc;

use rmdl_manifest::BundleId;

/// Progress notifications emitted while downloading.
///
/// The sink runs on whichever task resolves the transfer; implementations
/// must be cheap and must not block.
#[derive(Clone, Debug)]
pub enum DownloadEvent {
    /// A file's bundle requests entered the queue.
    FileStarted { path: String, bundles: usize },

    /// A retry pass over a file's failed bundles began (synchronous mode).
    AttemptStarted { path: String, attempt: u32 },

    /// One bundle request finished, successfully or not.
    BundleFinished {
        path: String,
        bundle: BundleId,
        good: bool,
    },

    /// The last bundle of a file resolved.
    FileFinished { path: String, good: bool },
}

pub type EventSink = Arc<dyn Fn(&DownloadEvent) + Send + Sync>;
