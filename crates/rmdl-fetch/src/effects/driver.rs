//! Download orchestration.
//!
//! Two modes drive the transfer pool:
//!
//! - **Synchronous** ([`Downloader::download_file`]): one file at a time;
//!   failed bundles are re-queued for up to `retry` further passes.
//! - **Overlapped** ([`Downloader::download_pipelined`]): the caller's task
//!   plans files and hands each bundle list to a single worker task through
//!   a rendezvous channel, so the pool never drains between files. Failures
//!   are latched per file and not retried.
//!
//! Only bundle-local failures (transport, protocol, integrity) are handled
//! that way; planning, output I/O and codec errors are fatal and unwind out
//! of the run immediately.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use rmdl_manifest::FileInfo;
use tokio::sync::mpsc;

use crate::data::{DownloadEvent, DownloadOpts, EventSink};
use crate::effects::file::{BundleDownload, FileDownload};
use crate::effects::origin::{HttpOrigin, Origin};
use crate::effects::pool::TransferPool;
use crate::error::FetchError;

/// Poll timeout while a single file drains (synchronous mode).
const SYNC_POLL: Duration = Duration::from_millis(100);
/// Poll timeout of the overlapped worker; short to stay responsive to
/// incoming work while transfers are in flight.
const WORKER_POLL: Duration = Duration::from_millis(1);
/// How long the worker waits for new work when its queue is nearly drained.
const WORKER_RECV: Duration = Duration::from_millis(10);

/// Result of an overlapped run.
#[derive(Debug, Default)]
pub struct DownloadSummary {
    /// Paths of files with at least one failed bundle.
    pub failed_files: Vec<String>,
}

pub struct Downloader<O = HttpOrigin> {
    opts: DownloadOpts,
    origin: O,
    events: Option<EventSink>,
}

impl Downloader<HttpOrigin> {
    pub fn new(opts: DownloadOpts) -> Result<Self, FetchError> {
        let origin = HttpOrigin::new(&opts)?;
        Ok(Self::with_origin(opts, origin))
    }
}

impl<O: Origin + Clone + Send + Sync + 'static> Downloader<O> {
    pub fn with_origin(opts: DownloadOpts, origin: O) -> Self {
        Self {
            opts,
            origin,
            events: None,
        }
    }

    /// Install a progress sink. Events fire from whichever task resolves a
    /// transfer; the sink must not block.
    #[must_use]
    pub fn on_event(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn opts(&self) -> &DownloadOpts {
        &self.opts
    }

    fn emit(&self, event: DownloadEvent) {
        emit(&self.events, event);
    }

    /// Download one file, retrying failed bundles up to `opts.retry` extra
    /// passes. Bundle-local errors (transport, protocol, integrity)
    /// aggregate into [`FetchError::BundlesFailed`]; planning and I/O
    /// errors are fatal for the file and surface directly without retry.
    pub async fn download_file(
        &self,
        info: &FileInfo,
        out_dir: Option<&std::path::Path>,
    ) -> Result<(), FetchError> {
        let (file, mut queued) = FileDownload::plan(info, &self.opts, out_dir)?;
        let total = queued.len();
        self.emit(DownloadEvent::FileStarted {
            path: file.path.clone(),
            bundles: total,
        });

        let mut pool = TransferPool::new(self.origin.clone(), &self.opts);
        let mut failed: Vec<BundleDownload> = Vec::new();
        let mut attempt = 0u32;
        loop {
            if !queued.is_empty() {
                self.emit(DownloadEvent::AttemptStarted {
                    path: file.path.clone(),
                    attempt,
                });
            }
            while !queued.is_empty() || !pool.finished() {
                pool.push(&mut queued);
                if let Some(outcome) = pool.next_event(SYNC_POLL).await {
                    let fatal = match outcome.error {
                        Some(error) if !error.is_bundle_local() => Some(error),
                        _ => None,
                    };
                    outcome.bundle.file.settle(outcome.good);
                    self.emit(DownloadEvent::BundleFinished {
                        path: file.path.clone(),
                        bundle: outcome.bundle.req.id,
                        good: outcome.good,
                    });
                    if let Some(error) = fatal {
                        self.emit(DownloadEvent::FileFinished {
                            path: file.path.clone(),
                            good: false,
                        });
                        return Err(error);
                    }
                    if !outcome.good {
                        failed.push(outcome.bundle);
                    }
                }
            }
            if failed.is_empty() || attempt >= self.opts.retry {
                break;
            }
            attempt += 1;
            file.requeue(failed.len());
            queued.extend(failed.drain(..));
        }

        let good = failed.is_empty();
        self.emit(DownloadEvent::FileFinished {
            path: file.path.clone(),
            good,
        });
        if good {
            Ok(())
        } else {
            Err(FetchError::BundlesFailed {
                path: file.path.clone(),
                failed: failed.len(),
                total,
            })
        }
    }

    /// Download files with cross-file pipelining.
    ///
    /// Planning happens here while a single worker task owns the pool and
    /// performs all transfers; the rendezvous channel keeps at most one
    /// planned file in hand-off, and the worker only takes it when its queue
    /// is close to drained. Per-file completion is detected by the file's
    /// pending-bundle counter. Bundle-local failures latch per file without
    /// retry; planning and I/O errors abort the whole run.
    pub async fn download_pipelined(
        &self,
        files: &[FileInfo],
        out_dir: Option<PathBuf>,
    ) -> Result<DownloadSummary, FetchError> {
        let (tx, rx) = mpsc::channel::<VecDeque<BundleDownload>>(1);
        let worker = tokio::spawn(worker_loop(
            self.origin.clone(),
            self.opts.clone(),
            rx,
            self.events.clone(),
        ));

        let mut fatal: Option<FetchError> = None;
        let mut send_failed = false;
        for info in files {
            match FileDownload::plan(info, &self.opts, out_dir.as_deref()) {
                Ok((file, queued)) => {
                    self.emit(DownloadEvent::FileStarted {
                        path: file.path.clone(),
                        bundles: queued.len(),
                    });
                    if queued.is_empty() {
                        self.emit(DownloadEvent::FileFinished {
                            path: file.path.clone(),
                            good: true,
                        });
                        continue;
                    }
                    // A closed channel means the worker bailed out; its
                    // error is picked up below.
                    if tx.send(queued).await.is_err() {
                        send_failed = true;
                        break;
                    }
                }
                Err(err) => {
                    fatal = Some(err);
                    break;
                }
            }
        }
        drop(tx);

        let worker_result = match worker.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Ok(DownloadSummary::default()),
        };
        if let Some(err) = fatal {
            return Err(err);
        }
        match worker_result {
            Err(err) => Err(err),
            Ok(_) if send_failed => Err(FetchError::Transport(
                "download worker terminated unexpectedly".into(),
            )),
            Ok(summary) => Ok(summary),
        }
    }
}

fn emit(events: &Option<EventSink>, event: DownloadEvent) {
    if let Some(sink) = events {
        sink(&event);
    }
}

/// The single task owning the pool in overlapped mode.
///
/// Bails out with the first non-bundle-local error; in-flight transfers are
/// dropped with the pool.
async fn worker_loop<O: Origin + Clone + Send + Sync + 'static>(
    origin: O,
    opts: DownloadOpts,
    mut rx: mpsc::Receiver<VecDeque<BundleDownload>>,
    events: Option<EventSink>,
) -> Result<DownloadSummary, FetchError> {
    let mut pool = TransferPool::new(origin, &opts);
    let mut queue: VecDeque<BundleDownload> = VecDeque::new();
    let mut open = true;
    let mut summary = DownloadSummary::default();

    while open || !queue.is_empty() || !pool.finished() {
        // Only reach for new work once the local queue is within a push of
        // drained; anything earlier would stall the transfers in flight.
        if open && queue.len() <= pool.canpush() {
            match tokio::time::timeout(WORKER_RECV, rx.recv()).await {
                Ok(Some(batch)) => queue.extend(batch),
                Ok(None) => open = false,
                Err(_) => {}
            }
        }
        pool.push(&mut queue);
        if let Some(outcome) = pool.next_event(WORKER_POLL).await {
            let fatal = match outcome.error {
                Some(error) if !error.is_bundle_local() => Some(error),
                _ => None,
            };
            let status = outcome.bundle.file.settle(outcome.good);
            let path = outcome.bundle.file.path.clone();
            emit(
                &events,
                DownloadEvent::BundleFinished {
                    path: path.clone(),
                    bundle: outcome.bundle.req.id,
                    good: outcome.good,
                },
            );
            if let Some(error) = fatal {
                emit(&events, DownloadEvent::FileFinished { path, good: false });
                return Err(error);
            }
            if status.remaining == 0 {
                emit(
                    &events,
                    DownloadEvent::FileFinished {
                        path: path.clone(),
                        good: !status.any_failed,
                    },
                );
                if status.any_failed {
                    summary.failed_files.push(path);
                }
            }
        }
    }
    Ok(summary)
}
