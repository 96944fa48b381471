use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rmdl_fetch::RangeMode;

use super::{download, list};

pub const DEFAULT_URL: &str = "http://lol.secure.dyn.riotcdn.net/channels/public";

#[derive(Debug, Parser)]
#[command(
    name = "rmdl",
    version,
    about = "Downloader and materializer for chunk-bundled release manifests",
    propagate_version = true
)]
pub struct App {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(alias = "ls", about = "List files as CSV")]
    List(FilterArgs),
    #[command(aliases = ["bl", "list-bundles"], about = "List referenced bundle URLs")]
    Bundles(BundlesArgs),
    #[command(aliases = ["ch", "list-chunks"], about = "List unique chunks")]
    Chunks(FilterArgs),
    #[command(alias = "js", about = "Re-emit the filtered manifest as JSON")]
    Json(FilterArgs),
    #[command(alias = "dl", about = "Download files")]
    Download(DownloadArgs),
    #[command(alias = "dl2", about = "Download with cross-file pipelining")]
    Download2(DownloadArgs),
}

#[derive(Debug, Args)]
pub struct FilterArgs {
    /// Manifest file (JSON array form)
    pub manifest: PathBuf,

    /// Skip: files already present on disk
    #[arg(short, long)]
    pub exist: bool,

    /// Skip: files whose chunks already verify against the output directory
    #[arg(short, long)]
    pub verify: bool,

    /// Filter: case-insensitive regex the whole path must match
    #[arg(short, long)]
    pub path: Option<String>,

    /// Filter: language tags ("none" selects international files)
    #[arg(short, long, value_delimiter = ',')]
    pub lang: Vec<String>,

    /// Filter: drop files an old manifest provides unchanged
    #[arg(short, long, alias = "update")]
    pub upgrade: Option<PathBuf>,

    /// Directory files are stored in and verified against
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct BundlesArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Url bundle paths are resolved against
    #[arg(short = 'd', long = "download", default_value = DEFAULT_URL)]
    pub prefix: String,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Url bundle paths are resolved against
    #[arg(short = 'd', long = "download", default_value = DEFAULT_URL)]
    pub prefix: String,

    /// Fetch and verify without writing files to disk
    #[arg(short, long)]
    pub nowrite: bool,

    /// Range request shape: full, one, multi
    #[arg(short, long, default_value = "multi")]
    pub mode: RangeMode,

    /// Extra attempts for failed bundles of a file
    #[arg(short, long, default_value_t = 0)]
    pub retry: u32,

    /// Concurrent connections
    #[arg(short, long, default_value_t = 64)]
    pub connections: usize,

    /// Per-request compressed payload cap in bytes
    #[arg(long, default_value_t = 32 * 1024 * 1024)]
    pub buffer_size: usize,

    /// Longest Range header value before a bundle request splits
    #[arg(long, default_value_t = 4000)]
    pub max_range: usize,

    /// Per-transfer timeout in seconds
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,

    /// Skip TLS peer verification
    #[arg(long)]
    pub insecure: bool,

    /// Extra root certificate bundle (PEM)
    #[arg(long)]
    pub ca_path: Option<PathBuf>,

    /// Proxy URL for all transfers
    #[arg(long)]
    pub proxy: Option<String>,

    /// User-Agent header override
    #[arg(long)]
    pub user_agent: Option<String>,
}

impl App {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.cmd {
            Command::List(args) => list::files(args),
            Command::Bundles(args) => list::bundles(args),
            Command::Chunks(args) => list::chunks(args),
            Command::Json(args) => list::json(args),
            Command::Download(args) => download::run(args, false).await,
            Command::Download2(args) => download::run(args, true).await,
        }
    }
}
