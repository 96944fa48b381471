use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How the planner shapes the `Range` header of a bundle request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RangeMode {
    /// No `Range` header; the whole archive is streamed and chunks are
    /// picked out at their offsets.
    Full,
    /// One span from the first to the last requested byte; gap bytes are
    /// streamed and discarded.
    One,
    /// One span per run of adjacent chunks, served as
    /// `multipart/byteranges`.
    #[default]
    Multi,
}

impl FromStr for RangeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(RangeMode::Full),
            "one" => Ok(RangeMode::One),
            "multi" => Ok(RangeMode::Multi),
            other => Err(format!("unknown range mode {other:?}")),
        }
    }
}

impl fmt::Display for RangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RangeMode::Full => "full",
            RangeMode::One => "one",
            RangeMode::Multi => "multi",
        })
    }
}

/// Configuration for bundle downloading.
///
/// # Examples
///
/// ```
/// use rmdl_fetch::{DownloadOpts, RangeMode};
///
/// let opts = DownloadOpts::new("https://cdn.example.com/channels/public")
///     .connections(16)
///     .retry(2)
///     .range_mode(RangeMode::One);
/// ```
#[derive(Clone, Debug)]
pub struct DownloadOpts {
    /// URL stem bundle paths are appended to.
    pub prefix: String,

    /// Number of concurrent transfer slots.
    ///
    /// Default: 64
    pub connections: usize,

    /// Per-request cap on compressed payload bytes. Bounds both the
    /// planner's request grouping and the parser's assembly buffer.
    ///
    /// Default: 32 MiB
    pub buffer_size: usize,

    /// Extra attempts for failed bundles of a file (synchronous mode only;
    /// total attempts = 1 + retry).
    ///
    /// Default: 0
    pub retry: u32,

    /// Preferred request shape. `Multi` degrades to `One` per bundle when
    /// the requested spans merge into a single contiguous range.
    ///
    /// Default: `Multi`
    pub range_mode: RangeMode,

    /// Longest `Range` header value the planner may emit before splitting
    /// the bundle request.
    ///
    /// Default: 4000
    pub max_range_len: usize,

    /// Per-transfer timeout.
    ///
    /// Default: 300 s
    pub timeout: Duration,

    /// Verify the origin's TLS certificate.
    ///
    /// Default: true
    pub verify_peer: bool,

    /// Extra root certificate bundle (PEM) for the origin.
    pub ca_path: Option<PathBuf>,

    /// Proxy URL for all transfers.
    pub proxy: Option<String>,

    /// `User-Agent` header override.
    pub user_agent: Option<String>,
}

impl Default for DownloadOpts {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            connections: 64,
            buffer_size: 32 * 1024 * 1024,
            retry: 0,
            range_mode: RangeMode::Multi,
            max_range_len: 4000,
            timeout: Duration::from_secs(300),
            verify_peer: true,
            ca_path: None,
            proxy: None,
            user_agent: None,
        }
    }
}

impl DownloadOpts {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn connections(mut self, connections: usize) -> Self {
        self.connections = connections.max(1);
        self
    }

    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn range_mode(mut self, range_mode: RangeMode) -> Self {
        self.range_mode = range_mode;
        self
    }

    #[must_use]
    pub fn max_range_len(mut self, max_range_len: usize) -> Self {
        self.max_range_len = max_range_len;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn verify_peer(mut self, verify_peer: bool) -> Self {
        self.verify_peer = verify_peer;
        self
    }

    #[must_use]
    pub fn ca_path(mut self, ca_path: Option<PathBuf>) -> Self {
        self.ca_path = ca_path;
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }
}
