//! Incremental range-response parser.
//!
//! The transport delivers arbitrary byte slices; this state machine extracts
//! each chunk's compressed payload without ever buffering a whole response.
//! Three body layouts exist:
//!
//! - `Archive`: the raw bundle from offset zero (`200`, or full-mode).
//! - `Span`: the bytes of a single requested range (`206` single-range);
//!   positions are absolute archive offsets starting at the first chunk.
//! - `Parts`: `multipart/byteranges` (`206` multi-range); each part's
//!   `Content-Range` announces the absolute offset of its payload.
//!
//! In `Data` the parser consumes at most one chunk's compressed size into a
//! bounded assembly buffer, with a zero-copy fast path when a whole chunk
//! arrives in one slice. Bytes between spans (`Archive`/`Span` layouts, and
//! parts a server coalesced across a gap) are streamed and discarded.

use crate::core::plan::ChunkDownload;
use crate::error::FetchError;

/// Receives each chunk's compressed payload as it completes.
pub trait ChunkSink {
    fn deliver(&mut self, chunk: &ChunkDownload, compressed: &[u8]) -> Result<(), FetchError>;
}

/// Body shape of a bundle response, decided from status and content type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseLayout {
    Archive,
    Span,
    Parts,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Scanning for the `\r` of a line terminator between parts.
    SeekCr,
    /// Saw `\r`, expecting `\n`.
    SeekLf,
    /// Accumulating a part header line.
    Header,
    /// Saw the header line's `\r`, expecting `\n`.
    HeaderLf,
    /// Streaming chunk payload (and gap bytes) at `range_pos`.
    Data,
    Done,
}

/// Longest part header line the parser will accumulate.
const HEADER_LIMIT: usize = 1024;

pub struct RangeParser {
    layout: ResponseLayout,
    state: State,
    /// Index of the next chunk awaiting payload.
    chunk_idx: usize,
    /// Absolute compressed offset of the next body byte.
    range_pos: u64,
    /// Partial chunk bytes carried across `feed` calls.
    assembly: Vec<u8>,
    /// Current part header line.
    header: Vec<u8>,
    /// `Content-Range` bounds parsed from the current part's headers.
    part_range: Option<(u64, u64)>,
    /// Last byte the current part covers; chunks past it wait for the next
    /// part boundary.
    part_end: u64,
}

impl RangeParser {
    pub fn new(layout: ResponseLayout, chunks: &[ChunkDownload]) -> Self {
        let state = if chunks.is_empty() {
            State::Done
        } else {
            match layout {
                ResponseLayout::Parts => State::SeekCr,
                ResponseLayout::Archive | ResponseLayout::Span => State::Data,
            }
        };
        let range_pos = match layout {
            ResponseLayout::Span => chunks
                .first()
                .map_or(0, |c| u64::from(c.chunk.compressed_offset)),
            _ => 0,
        };
        Self {
            layout,
            state,
            chunk_idx: 0,
            range_pos,
            assembly: Vec::new(),
            header: Vec::new(),
            part_range: None,
            part_end: u64::MAX,
        }
    }

    /// All chunks delivered and the body reached its terminal state.
    pub fn is_done(&self, chunks: &[ChunkDownload]) -> bool {
        self.state == State::Done && self.chunk_idx == chunks.len()
    }

    /// Consume one slice of body bytes, handing completed chunks to `sink`.
    pub fn feed(
        &mut self,
        chunks: &[ChunkDownload],
        mut data: &[u8],
        sink: &mut dyn ChunkSink,
    ) -> Result<(), FetchError> {
        while !data.is_empty() {
            match self.state {
                State::Done => return Ok(()),
                State::SeekCr => match data.iter().position(|&b| b == b'\r') {
                    Some(pos) => {
                        data = &data[pos + 1..];
                        self.state = State::SeekLf;
                    }
                    None => data = &[],
                },
                State::SeekLf => {
                    if data[0] == b'\n' {
                        self.header.clear();
                        self.state = State::Header;
                    } else {
                        self.state = State::SeekCr;
                    }
                    data = &data[1..];
                }
                State::Header => {
                    let pos = data.iter().position(|&b| b == b'\r');
                    let line = &data[..pos.unwrap_or(data.len())];
                    if self.header.len() + line.len() > HEADER_LIMIT {
                        return Err(FetchError::Protocol("oversized part header".into()));
                    }
                    self.header.extend_from_slice(line);
                    match pos {
                        Some(pos) => {
                            data = &data[pos + 1..];
                            self.state = State::HeaderLf;
                        }
                        None => data = &[],
                    }
                }
                State::HeaderLf => {
                    if data[0] != b'\n' {
                        self.state = State::SeekCr;
                        data = &data[1..];
                        continue;
                    }
                    data = &data[1..];
                    if self.header.is_empty() {
                        self.begin_part(chunks)?;
                    } else {
                        if let Some(range) = parse_content_range(&self.header) {
                            self.part_range = Some(range);
                        }
                        self.header.clear();
                        self.state = State::Header;
                    }
                }
                State::Data => data = self.consume(chunks, data, sink)?,
            }
        }
        Ok(())
    }

    /// Blank line reached: align the chunk cursor to the part's payload.
    fn begin_part(&mut self, chunks: &[ChunkDownload]) -> Result<(), FetchError> {
        let (start, end) = self
            .part_range
            .take()
            .ok_or_else(|| FetchError::Protocol("part carries no Content-Range".into()))?;
        let expected = u64::from(chunks[self.chunk_idx].chunk.compressed_offset);
        if start != expected {
            return Err(FetchError::Protocol(format!(
                "part starts at {start}, expected offset {expected}"
            )));
        }
        self.range_pos = start;
        self.part_end = end;
        self.state = State::Data;
        Ok(())
    }

    fn consume<'d>(
        &mut self,
        chunks: &[ChunkDownload],
        data: &'d [u8],
        sink: &mut dyn ChunkSink,
    ) -> Result<&'d [u8], FetchError> {
        let chunk = &chunks[self.chunk_idx];
        let offset = u64::from(chunk.chunk.compressed_offset);
        if offset > self.range_pos {
            // Gap before the next chunk; stream and discard.
            let skip = ((offset - self.range_pos) as usize).min(data.len());
            self.range_pos += skip as u64;
            return Ok(&data[skip..]);
        }

        let size = chunk.chunk.compressed_size as usize;
        if self.assembly.is_empty() && data.len() >= size {
            // Whole chunk in one slice; skip the copy.
            sink.deliver(chunk, &data[..size])?;
            self.range_pos += size as u64;
            self.advance(chunks);
            return Ok(&data[size..]);
        }

        let take = (size - self.assembly.len()).min(data.len());
        self.assembly.extend_from_slice(&data[..take]);
        self.range_pos += take as u64;
        if self.assembly.len() == size {
            let payload = std::mem::take(&mut self.assembly);
            sink.deliver(chunk, &payload)?;
            self.assembly = payload;
            self.assembly.clear();
            self.advance(chunks);
        }
        Ok(&data[take..])
    }

    fn advance(&mut self, chunks: &[ChunkDownload]) {
        self.chunk_idx += 1;
        if self.chunk_idx == chunks.len() {
            self.state = State::Done;
            return;
        }
        if self.layout == ResponseLayout::Parts {
            let next = u64::from(chunks[self.chunk_idx].chunk.compressed_offset);
            // The next chunk keeps streaming out of the current part when the
            // part still covers it (merged spans, or ranges the server
            // coalesced); anything else resumes at the next part boundary.
            if next > self.part_end {
                self.state = State::SeekCr;
            }
        }
    }
}

/// Extract the bounds from a `Content-Range: bytes a-b/total` line.
fn parse_content_range(line: &[u8]) -> Option<(u64, u64)> {
    let line = std::str::from_utf8(line).ok()?;
    let (name, value) = line.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("content-range") {
        return None;
    }
    let spec = value.trim().strip_prefix("bytes")?.trim_start();
    let (bounds, _total) = spec.split_once('/')?;
    let (start, end) = bounds.split_once('-')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}

/// Extract the boundary parameter of a `multipart/byteranges` content type.
pub fn multipart_boundary(content_type: &str) -> Option<&str> {
    let (kind, params) = content_type.split_once(';')?;
    if !kind.trim().eq_ignore_ascii_case("multipart/byteranges") {
        return None;
    }
    params.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmdl_manifest::{BundleId, ChunkId, FileChunk};

    struct Collect(Vec<(u64, Vec<u8>)>);

    impl ChunkSink for Collect {
        fn deliver(&mut self, chunk: &ChunkDownload, compressed: &[u8]) -> Result<(), FetchError> {
            self.0.push((chunk.chunk.id.0, compressed.to_vec()));
            Ok(())
        }
    }

    fn chunk(id: u64, co: u32, cs: u32) -> ChunkDownload {
        ChunkDownload {
            chunk: FileChunk {
                id: ChunkId(id),
                compressed_size: cs,
                uncompressed_size: cs,
                bundle_id: BundleId(0xB1),
                compressed_offset: co,
                uncompressed_offset: 0,
            },
            offsets: Vec::new(),
        }
    }

    fn multipart_body(parts: &[(u32, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (offset, payload) in parts {
            body.extend_from_slice(b"\r\n--boundary\r\n");
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n");
            let end = offset + payload.len() as u32 - 1;
            body.extend_from_slice(format!("Content-Range: bytes {offset}-{end}/1000\r\n").as_bytes());
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(payload);
        }
        body.extend_from_slice(b"\r\n--boundary--\r\n");
        body
    }

    fn feed_fragmented(
        parser: &mut RangeParser,
        chunks: &[ChunkDownload],
        body: &[u8],
        step: usize,
        sink: &mut Collect,
    ) {
        for piece in body.chunks(step) {
            parser.feed(chunks, piece, sink).unwrap();
        }
    }

    #[test]
    fn span_layout_single_chunk() {
        let chunks = vec![chunk(0xA1, 0, 5)];
        let mut parser = RangeParser::new(ResponseLayout::Span, &chunks);
        let mut sink = Collect(Vec::new());
        parser.feed(&chunks, b"HELLO", &mut sink).unwrap();
        assert!(parser.is_done(&chunks));
        assert_eq!(sink.0, vec![(0xA1, b"HELLO".to_vec())]);
    }

    #[test]
    fn span_layout_skips_gap_bytes() {
        // One span 0-19 covering chunks at 0..4 and 16..20.
        let chunks = vec![chunk(0xA1, 0, 4), chunk(0xA2, 16, 4)];
        let mut body = b"AAAA".to_vec();
        body.extend_from_slice(&[0u8; 12]);
        body.extend_from_slice(b"BBBB");

        for step in [1, 3, body.len()] {
            let mut parser = RangeParser::new(ResponseLayout::Span, &chunks);
            let mut sink = Collect(Vec::new());
            feed_fragmented(&mut parser, &chunks, &body, step, &mut sink);
            assert!(parser.is_done(&chunks), "step {step}");
            assert_eq!(
                sink.0,
                vec![(0xA1, b"AAAA".to_vec()), (0xA2, b"BBBB".to_vec())]
            );
        }
    }

    #[test]
    fn archive_layout_starts_at_zero() {
        let chunks = vec![chunk(0xA2, 16, 4)];
        let mut body = vec![0u8; 16];
        body.extend_from_slice(b"BBBB");
        body.extend_from_slice(b"trailing ignored");

        let mut parser = RangeParser::new(ResponseLayout::Archive, &chunks);
        let mut sink = Collect(Vec::new());
        parser.feed(&chunks, &body, &mut sink).unwrap();
        assert!(parser.is_done(&chunks));
        assert_eq!(sink.0, vec![(0xA2, b"BBBB".to_vec())]);
    }

    #[test]
    fn multipart_two_parts() {
        let chunks = vec![chunk(0xA1, 0, 4), chunk(0xA2, 16, 4)];
        let body = multipart_body(&[(0, b"AAAA"), (16, b"BBBB")]);

        for step in [1, 7, body.len()] {
            let mut parser = RangeParser::new(ResponseLayout::Parts, &chunks);
            let mut sink = Collect(Vec::new());
            feed_fragmented(&mut parser, &chunks, &body, step, &mut sink);
            assert!(parser.is_done(&chunks), "step {step}");
            assert_eq!(
                sink.0,
                vec![(0xA1, b"AAAA".to_vec()), (0xA2, b"BBBB".to_vec())]
            );
        }
    }

    #[test]
    fn multipart_part_with_merged_chunks() {
        // One part serves two adjacent chunks of a merged span.
        let chunks = vec![chunk(0xA1, 0, 4), chunk(0xA2, 4, 4)];
        let body = multipart_body(&[(0, b"AAAABBBB")]);

        let mut parser = RangeParser::new(ResponseLayout::Parts, &chunks);
        let mut sink = Collect(Vec::new());
        parser.feed(&chunks, &body, &mut sink).unwrap();
        assert!(parser.is_done(&chunks));
        assert_eq!(sink.0.len(), 2);
    }

    #[test]
    fn multipart_part_coalesced_across_gap() {
        // A server may coalesce nearby ranges into one part spanning the gap.
        let chunks = vec![chunk(0xA1, 0, 4), chunk(0xA2, 8, 4)];
        let body = multipart_body(&[(0, b"AAAAxxxxBBBB")]);

        let mut parser = RangeParser::new(ResponseLayout::Parts, &chunks);
        let mut sink = Collect(Vec::new());
        parser.feed(&chunks, &body, &mut sink).unwrap();
        assert!(parser.is_done(&chunks));
        assert_eq!(
            sink.0,
            vec![(0xA1, b"AAAA".to_vec()), (0xA2, b"BBBB".to_vec())]
        );
    }

    #[test]
    fn missing_content_range_is_protocol_error() {
        let chunks = vec![chunk(0xA1, 0, 4)];
        let body = b"\r\n--boundary\r\nContent-Type: text/plain\r\n\r\nAAAA";
        let mut parser = RangeParser::new(ResponseLayout::Parts, &chunks);
        let mut sink = Collect(Vec::new());
        let err = parser.feed(&chunks, body, &mut sink).unwrap_err();
        assert!(matches!(err, FetchError::Protocol(_)));
    }

    #[test]
    fn out_of_order_part_is_protocol_error() {
        let chunks = vec![chunk(0xA1, 0, 4), chunk(0xA2, 16, 4)];
        let body = multipart_body(&[(16, b"BBBB"), (0, b"AAAA")]);
        let mut parser = RangeParser::new(ResponseLayout::Parts, &chunks);
        let mut sink = Collect(Vec::new());
        assert!(parser.feed(&chunks, &body, &mut sink).is_err());
    }

    #[test]
    fn short_body_is_not_done() {
        let chunks = vec![chunk(0xA1, 0, 8)];
        let mut parser = RangeParser::new(ResponseLayout::Span, &chunks);
        let mut sink = Collect(Vec::new());
        parser.feed(&chunks, b"ABC", &mut sink).unwrap();
        assert!(!parser.is_done(&chunks));
        assert!(sink.0.is_empty());
    }

    #[test]
    fn content_range_line_parses() {
        assert_eq!(
            parse_content_range(b"Content-Range: bytes 16-19/1000"),
            Some((16, 19))
        );
        assert_eq!(
            parse_content_range(b"content-range:bytes 0-4/10"),
            Some((0, 4))
        );
        assert_eq!(parse_content_range(b"Content-Type: text/plain"), None);
        assert_eq!(parse_content_range(b"Content-Range: bytes 0-4"), None);
    }

    #[test]
    fn boundary_extraction() {
        assert_eq!(
            multipart_boundary("multipart/byteranges; boundary=xyz"),
            Some("xyz")
        );
        assert_eq!(
            multipart_boundary("multipart/byteranges; charset=x; boundary=\"q\""),
            Some("q")
        );
        assert_eq!(multipart_boundary("application/octet-stream"), None);
    }
}
