//! Bounded pool of concurrent bundle transfers.
//!
//! The pool owns up to `connections` in-flight transfers in a `JoinSet`.
//! `push` moves queued bundle requests into free slots; `next_event` drains
//! one finished transfer, waiting at most the given poll timeout. Failure is
//! bundle-granular: a transfer that errors anywhere (transport, protocol,
//! integrity) returns its whole bundle with `good = false`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::task::JoinSet;

use crate::core::parser::{multipart_boundary, RangeParser, ResponseLayout};
use crate::data::{DownloadOpts, RangeMode};
use crate::effects::chunk::ChunkWriter;
use crate::effects::file::BundleDownload;
use crate::effects::origin::{Origin, OriginResponse};
use crate::error::FetchError;

/// A resolved transfer, successful or not, with its bundle handed back.
pub struct TransferOutcome {
    pub good: bool,
    pub bundle: BundleDownload,
    pub error: Option<FetchError>,
}

pub struct TransferPool<O> {
    origin: O,
    prefix: Arc<str>,
    slots: usize,
    inflight: JoinSet<TransferOutcome>,
}

impl<O: Origin + Clone + Send + Sync + 'static> TransferPool<O> {
    pub fn new(origin: O, opts: &DownloadOpts) -> Self {
        Self {
            origin,
            prefix: Arc::from(opts.prefix.as_str()),
            slots: opts.connections,
            inflight: JoinSet::new(),
        }
    }

    /// Free transfer slots.
    pub fn canpush(&self) -> usize {
        self.slots.saturating_sub(self.inflight.len())
    }

    /// No transfers in flight.
    pub fn finished(&self) -> bool {
        self.inflight.is_empty()
    }

    /// Move bundles from the queue front into free slots.
    pub fn push(&mut self, queued: &mut VecDeque<BundleDownload>) {
        while self.inflight.len() < self.slots {
            let Some(bundle) = queued.pop_front() else {
                break;
            };
            let origin = self.origin.clone();
            let prefix = Arc::clone(&self.prefix);
            self.inflight
                .spawn(async move { run_transfer(origin, prefix, bundle).await });
        }
    }

    /// Wait up to `timeout` for one transfer to resolve.
    pub async fn next_event(&mut self, timeout: Duration) -> Option<TransferOutcome> {
        if self.inflight.is_empty() {
            return None;
        }
        match tokio::time::timeout(timeout, self.inflight.join_next()).await {
            Ok(Some(Ok(outcome))) => Some(outcome),
            Ok(Some(Err(err))) if err.is_panic() => {
                std::panic::resume_unwind(err.into_panic())
            }
            Ok(Some(Err(_))) | Ok(None) | Err(_) => None,
        }
    }
}

async fn run_transfer<O: Origin>(
    origin: O,
    prefix: Arc<str>,
    bundle: BundleDownload,
) -> TransferOutcome {
    match drive(&origin, &prefix, &bundle).await {
        Ok(()) => {
            tracing::debug!(bundle = %bundle.req.id, chunks = bundle.req.chunks.len(), "bundle complete");
            TransferOutcome {
                good: true,
                bundle,
                error: None,
            }
        }
        Err(error) => {
            tracing::warn!(bundle = %bundle.req.id, %error, "bundle failed");
            TransferOutcome {
                good: false,
                bundle,
                error: Some(error),
            }
        }
    }
}

/// Issue the request and stream the body through parser and chunk writer.
async fn drive<O: Origin>(
    origin: &O,
    prefix: &str,
    bundle: &BundleDownload,
) -> Result<(), FetchError> {
    let req = &bundle.req;
    let url = format!("{prefix}{}", req.path);
    let range = match req.range_mode {
        RangeMode::Multi => Some(req.range_multi.as_str()),
        RangeMode::One => Some(req.range_one.as_str()),
        RangeMode::Full => None,
    };

    let OriginResponse {
        status,
        content_type,
        mut body,
    } = origin.fetch(&url, range).await?;
    let layout = response_layout(status, content_type.as_deref(), &url)?;

    let mut writer = ChunkWriter::new(Arc::clone(&bundle.file), req.max_uncompressed)?;
    let mut parser = RangeParser::new(layout, &req.chunks);
    while let Some(item) = body.next().await {
        let bytes = item?;
        parser.feed(&req.chunks, &bytes, &mut writer)?;
        if parser.is_done(&req.chunks) {
            break;
        }
    }
    if parser.is_done(&req.chunks) {
        Ok(())
    } else {
        Err(FetchError::Protocol(
            "response ended before all chunks arrived".into(),
        ))
    }
}

/// Decide the body layout from status and content type.
///
/// A `200` means the server ignored the range and sent the whole archive;
/// offsets are absolute from zero regardless of the requested mode.
fn response_layout(
    status: u16,
    content_type: Option<&str>,
    url: &str,
) -> Result<ResponseLayout, FetchError> {
    match status {
        200 => Ok(ResponseLayout::Archive),
        206 => {
            let content_type = content_type.unwrap_or("");
            let is_multipart = content_type
                .trim_start()
                .to_ascii_lowercase()
                .starts_with("multipart/byteranges");
            if !is_multipart {
                return Ok(ResponseLayout::Span);
            }
            if multipart_boundary(content_type).is_none() {
                return Err(FetchError::Protocol(
                    "multipart response without a boundary".into(),
                ));
            }
            Ok(ResponseLayout::Parts)
        }
        status => Err(FetchError::Status {
            url: url.to_string(),
            status,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_follows_status_and_content_type() {
        assert!(matches!(
            response_layout(200, None, "u"),
            Ok(ResponseLayout::Archive)
        ));
        assert!(matches!(
            response_layout(206, Some("application/octet-stream"), "u"),
            Ok(ResponseLayout::Span)
        ));
        assert!(matches!(
            response_layout(206, Some("multipart/byteranges; boundary=x"), "u"),
            Ok(ResponseLayout::Parts)
        ));
        assert!(matches!(
            response_layout(206, Some("multipart/byteranges"), "u"),
            Err(FetchError::Protocol(_))
        ));
        assert!(matches!(
            response_layout(503, None, "u"),
            Err(FetchError::Status { status: 503, .. })
        ));
    }
}
