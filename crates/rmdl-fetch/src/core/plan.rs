//! Chunk-to-bundle request planner.
//!
//! Groups a file's chunks by bundle, collapses duplicate chunks into extra
//! destination offsets, and greedily splits each group into requests whose
//! compressed payload fits the assembly buffer and whose `Range` header
//! stays under the origin's length limit. Splits happen only at chunk
//! boundaries.

use rmdl_manifest::{BundleId, FileChunk, FileInfo};

use crate::data::{DownloadOpts, RangeMode};
use crate::error::FetchError;

/// One chunk to download, with every uncompressed offset it lands at.
///
/// `offsets` carries only the *extra* destinations; the primary one is the
/// chunk's own `uncompressed_offset`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkDownload {
    pub chunk: FileChunk,
    pub offsets: Vec<u32>,
}

impl ChunkDownload {
    /// Every destination offset of this chunk, primary first.
    pub fn destinations(&self) -> impl Iterator<Item = u32> + '_ {
        std::iter::once(self.chunk.uncompressed_offset).chain(self.offsets.iter().copied())
    }
}

/// One planned HTTP request against one bundle.
#[derive(Clone, Debug)]
pub struct BundlePlan {
    pub id: BundleId,
    /// Request path under the origin prefix.
    pub path: String,
    /// Ascending by `compressed_offset`, no overlaps, one entry per distinct
    /// chunk.
    pub chunks: Vec<ChunkDownload>,
    /// Merged spans over the compressed archive, inclusive bounds.
    spans: Vec<(u64, u64)>,
    /// `bytes=a-b,c-d` over the merged spans.
    pub range_multi: String,
    /// `bytes=a-b` covering first to last requested byte.
    pub range_one: String,
    /// Sum of compressed sizes.
    pub total_size: u64,
    /// Total writes this request will produce.
    pub offset_count: usize,
    /// Largest decompressed chunk, for scratch sizing.
    pub max_uncompressed: u32,
    pub range_mode: RangeMode,
}

impl BundlePlan {
    fn start(id: BundleId, range_mode: RangeMode) -> Self {
        Self {
            id,
            path: format!("/bundles/{id}.bundle"),
            chunks: Vec::new(),
            spans: Vec::new(),
            range_multi: String::new(),
            range_one: String::new(),
            total_size: 0,
            offset_count: 0,
            max_uncompressed: 0,
            range_mode,
        }
    }

    fn push(&mut self, chunk: FileChunk) {
        let start = u64::from(chunk.compressed_offset);
        let end = start + u64::from(chunk.compressed_size) - 1;
        match self.spans.last_mut() {
            Some((_, span_end)) if *span_end + 1 >= start => *span_end = end.max(*span_end),
            _ => self.spans.push((start, end)),
        }
        self.range_multi = render_spans(&self.spans);
        self.total_size += u64::from(chunk.compressed_size);
        self.offset_count += 1;
        self.max_uncompressed = self.max_uncompressed.max(chunk.uncompressed_size);
        self.chunks.push(ChunkDownload {
            chunk,
            offsets: Vec::new(),
        });
    }

    /// Would appending this chunk overflow the request limits?
    fn would_overflow(&self, chunk: &FileChunk, opts: &DownloadOpts) -> bool {
        match self.range_mode {
            // Full mode issues one request per bundle; limits apply later.
            RangeMode::Full => false,
            RangeMode::One => {
                self.total_size + u64::from(chunk.compressed_size) > opts.buffer_size as u64
            }
            RangeMode::Multi => {
                if self.total_size + u64::from(chunk.compressed_size) > opts.buffer_size as u64 {
                    return true;
                }
                if self.max_range(opts) {
                    return true;
                }
                // Header still under the limit; check the length it would
                // reach with this chunk's span merged in.
                let mut spans = self.spans.clone();
                let start = u64::from(chunk.compressed_offset);
                let end = start + u64::from(chunk.compressed_size) - 1;
                match spans.last_mut() {
                    Some((_, span_end)) if *span_end + 1 >= start => {
                        *span_end = end.max(*span_end)
                    }
                    _ => spans.push((start, end)),
                }
                render_spans(&spans).len() > opts.max_range_len
            }
        }
    }

    fn finalize(&mut self, opts: &DownloadOpts) -> Result<(), FetchError> {
        if let (Some((start, _)), Some((_, end))) = (self.spans.first(), self.spans.last()) {
            self.range_one = format!("bytes={start}-{end}");
        }
        if self.range_mode == RangeMode::Multi && self.can_simplify() {
            self.range_mode = RangeMode::One;
        }
        if self.range_mode == RangeMode::Full {
            let span = self.spans.last().map_or(0, |(_, end)| end + 1);
            if span > opts.buffer_size as u64 {
                return Err(FetchError::ArchiveTooLarge {
                    bundle: self.id,
                    span,
                    limit: opts.buffer_size,
                });
            }
        }
        Ok(())
    }

    /// A multi-range request whose spans merged into one contiguous range
    /// may be served as a plain single-range request.
    pub fn can_simplify(&self) -> bool {
        self.range_mode == RangeMode::Multi && self.spans.len() == 1
    }

    /// The `Range` header value has reached the origin's stated limit;
    /// the planner starts a new request rather than grow it further.
    pub fn max_range(&self, opts: &DownloadOpts) -> bool {
        self.range_mode == RangeMode::Multi && self.range_multi.len() >= opts.max_range_len
    }
}

fn render_spans(spans: &[(u64, u64)]) -> String {
    let mut header = String::from("bytes=");
    for (i, (start, end)) in spans.iter().enumerate() {
        if i > 0 {
            header.push(',');
        }
        header.push_str(&format!("{start}-{end}"));
    }
    header
}

/// Plan the bundle requests covering one file's chunks.
///
/// Every source chunk lands in exactly one request; a chunk contributing to
/// several file positions is downloaded once and fanned out through its
/// [`ChunkDownload::offsets`].
pub fn plan_bundles(info: &FileInfo, opts: &DownloadOpts) -> Result<Vec<BundlePlan>, FetchError> {
    let mut chunks = info.chunks.clone();
    chunks.sort_by_key(|c| (c.bundle_id, c.compressed_offset, c.uncompressed_offset));

    let mut plans: Vec<BundlePlan> = Vec::new();
    let mut current: Option<BundlePlan> = None;
    for chunk in chunks {
        if chunk.bundle_id.is_none() {
            return Err(FetchError::UnboundChunk { chunk: chunk.id });
        }
        if chunk.compressed_size as usize > opts.buffer_size {
            return Err(FetchError::ChunkTooLarge {
                chunk: chunk.id,
                size: chunk.compressed_size,
                limit: opts.buffer_size,
            });
        }

        if let Some(plan) = current.as_mut() {
            if plan.id == chunk.bundle_id {
                // Duplicate chunks are adjacent after the sort; fold them
                // into extra destination offsets.
                if let Some(last) = plan.chunks.last_mut() {
                    if last.chunk.id == chunk.id
                        && last.chunk.compressed_offset == chunk.compressed_offset
                        && last.chunk.compressed_size == chunk.compressed_size
                    {
                        last.offsets.push(chunk.uncompressed_offset);
                        plan.offset_count += 1;
                        continue;
                    }
                }
            }
        }

        let needs_new = match current.as_ref() {
            Some(plan) => plan.id != chunk.bundle_id || plan.would_overflow(&chunk, opts),
            None => true,
        };
        if needs_new {
            if let Some(done) = current.take() {
                plans.push(done);
            }
            current = Some(BundlePlan::start(chunk.bundle_id, opts.range_mode));
        }
        if let Some(plan) = current.as_mut() {
            plan.push(chunk);
        }
    }
    if let Some(done) = current.take() {
        plans.push(done);
    }

    for plan in &mut plans {
        plan.finalize(opts)?;
    }
    Ok(plans)
}
