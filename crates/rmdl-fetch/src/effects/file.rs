//! Shared per-file download state and bundle request binding.

use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rmdl_manifest::FileInfo;
use rmdl_verify::HashKind;

use crate::core::plan::{plan_bundles, BundlePlan, ChunkDownload};
use crate::data::DownloadOpts;
use crate::error::FetchError;

/// State shared by every bundle request of one file: the output handle and
/// the completion accounting. The file is done when its pending counter
/// reaches zero; any bad bundle latches the failure flag.
pub struct FileDownload {
    /// Manifest-relative path, used for reporting.
    pub path: String,
    pub hash_kind: HashKind,
    target: Option<PathBuf>,
    out: Option<File>,
    pending: AtomicUsize,
    failed: AtomicBool,
}

/// One planned bundle request bound to its owning file.
pub struct BundleDownload {
    pub req: BundlePlan,
    pub file: Arc<FileDownload>,
}

/// Result of resolving one bundle against its file's accounting.
#[derive(Clone, Copy, Debug)]
pub struct FileStatus {
    /// Bundles of this file still unresolved.
    pub remaining: usize,
    /// Some bundle of this file has failed.
    pub any_failed: bool,
}

impl FileDownload {
    /// Plan a file's bundle requests and open its destination.
    ///
    /// With `out_dir` set to `None` the download runs write-suppressed:
    /// chunks are fetched, decompressed and verified, then discarded.
    pub fn plan(
        info: &FileInfo,
        opts: &DownloadOpts,
        out_dir: Option<&Path>,
    ) -> Result<(Arc<FileDownload>, VecDeque<BundleDownload>), FetchError> {
        let plans = plan_bundles(info, opts)?;
        let (target, out) = match out_dir {
            Some(dir) if !info.chunks.is_empty() => {
                (Some(info.target_path(dir)), Some(info.create_file(dir)?))
            }
            _ => (None, None),
        };
        let file = Arc::new(FileDownload {
            path: info.path.clone(),
            hash_kind: info.params.hash_kind,
            target,
            out,
            pending: AtomicUsize::new(plans.len()),
            failed: AtomicBool::new(false),
        });
        let queue = plans
            .into_iter()
            .map(|req| BundleDownload {
                req,
                file: Arc::clone(&file),
            })
            .collect();
        Ok((file, queue))
    }

    /// Write one decompressed chunk at every destination offset.
    pub fn write_chunk(&self, chunk: &ChunkDownload, payload: &[u8]) -> Result<(), FetchError> {
        let Some(out) = &self.out else {
            return Ok(());
        };
        for offset in chunk.destinations() {
            write_full_at(out, payload, u64::from(offset)).map_err(|source| {
                FetchError::Write {
                    path: self.target.clone().unwrap_or_default(),
                    source,
                }
            })?;
        }
        Ok(())
    }

    /// Account for one resolved bundle.
    pub fn settle(&self, good: bool) -> FileStatus {
        if !good {
            self.failed.store(true, Ordering::Relaxed);
        }
        let remaining = self.pending.fetch_sub(1, Ordering::AcqRel) - 1;
        FileStatus {
            remaining,
            any_failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Put bundles back into the pending count before a retry pass.
    pub fn requeue(&self, count: usize) {
        self.pending.fetch_add(count, Ordering::AcqRel);
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

#[cfg(unix)]
fn write_full_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn write_full_at(file: &File, mut buf: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        let written = file.seek_write(buf, offset)?;
        if written == 0 {
            return Err(std::io::ErrorKind::WriteZero.into());
        }
        buf = &buf[written..];
        offset += written as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmdl_manifest::{BundleId, ChunkId, FileChunk, FileId, FileParams};
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn info() -> FileInfo {
        FileInfo {
            id: FileId(1),
            path: "out/x.bin".into(),
            size: 10,
            langs: BTreeSet::new(),
            chunks: vec![FileChunk {
                id: ChunkId(0xA1),
                compressed_size: 8,
                uncompressed_size: 10,
                bundle_id: BundleId(0xB1),
                compressed_offset: 0,
                uncompressed_offset: 0,
            }],
            link: String::new(),
            permissions: 0,
            params: FileParams {
                hash_kind: HashKind::None,
                max_uncompressed: 16,
                ..Default::default()
            },
            unk5: 0,
            unk6: 0,
            unk8: 0,
            unk10: 0,
        }
    }

    #[test]
    fn plan_binds_bundles_to_the_file() {
        let dir = tempdir().unwrap();
        let (file, queue) =
            FileDownload::plan(&info(), &DownloadOpts::default(), Some(dir.path())).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(file.pending(), 1);
        assert!(Arc::ptr_eq(&queue[0].file, &file));
        assert!(dir.path().join("out/x.bin").is_file());
    }

    #[test]
    fn nowrite_suppresses_output() {
        let (file, _queue) = FileDownload::plan(&info(), &DownloadOpts::default(), None).unwrap();
        assert!(file.out.is_none());
        // Writing is a no-op but must not fail.
        let chunk = ChunkDownload {
            chunk: info().chunks[0],
            offsets: vec![],
        };
        file.write_chunk(&chunk, b"0123456789").unwrap();
    }

    #[test]
    fn write_chunk_fans_out_to_offsets() {
        let dir = tempdir().unwrap();
        let (file, queue) =
            FileDownload::plan(&info(), &DownloadOpts::default(), Some(dir.path())).unwrap();
        let mut chunk = queue[0].req.chunks[0].clone();
        chunk.chunk.uncompressed_size = 5;
        chunk.offsets.push(5);
        file.write_chunk(&chunk, b"HELLO").unwrap();
        let written = std::fs::read(dir.path().join("out/x.bin")).unwrap();
        assert_eq!(&written, b"HELLOHELLO");
    }

    #[test]
    fn settle_counts_down_and_latches_failure() {
        let (file, _) = FileDownload::plan(&info(), &DownloadOpts::default(), None).unwrap();
        file.requeue(1); // pretend a second bundle
        let first = file.settle(true);
        assert_eq!(first.remaining, 1);
        assert!(!first.any_failed);
        let second = file.settle(false);
        assert_eq!(second.remaining, 0);
        assert!(second.any_failed);
    }
}
