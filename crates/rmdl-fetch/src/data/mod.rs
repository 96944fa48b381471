//! Immutable configuration and event types.

mod events;
mod options;

pub use events::{DownloadEvent, EventSink};
pub use options::{DownloadOpts, RangeMode};
