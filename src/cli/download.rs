use std::time::Duration;

use anyhow::bail;
use rmdl_fetch::{DownloadOpts, Downloader, FetchError};
use tracing::warn;

use super::app::DownloadArgs;
use super::common::{load_manifest, skip_reason, Skip};
use crate::ui::Bars;

pub async fn run(args: DownloadArgs, overlapped: bool) -> anyhow::Result<()> {
    if !args.prefix.starts_with("http://") && !args.prefix.starts_with("https://") {
        bail!("only http(s) origins are supported, got {:?}", args.prefix);
    }
    let mut list = load_manifest(&args.filter)?;
    let opts = DownloadOpts::new(args.prefix.trim_end_matches('/'))
        .connections(args.connections)
        .buffer_size(args.buffer_size)
        .retry(args.retry)
        .range_mode(args.mode)
        .max_range_len(args.max_range)
        .timeout(Duration::from_secs(args.timeout))
        .verify_peer(!args.insecure)
        .ca_path(args.ca_path.clone())
        .proxy(args.proxy.clone())
        .user_agent(args.user_agent.clone());

    let bars = Bars::new();
    let downloader = Downloader::new(opts)?.on_event(bars.sink());
    let out_dir = (!args.nowrite).then(|| args.filter.output.clone());

    // Symlinks and skip checks are handled here; only files that still need
    // bytes reach the downloader.
    let mut queue = Vec::new();
    for mut file in std::mem::take(&mut list.files) {
        if file.is_symlink() {
            if out_dir.is_some() {
                file.create_symlink(&args.filter.output)?;
            }
            bars.note(&file.path, "LINK  ");
            continue;
        }
        match skip_reason(&mut file, &args.filter) {
            Some(Skip::Exists) => bars.note(&file.path, "SKIP  "),
            Some(Skip::Verified) => bars.note(&file.path, "OK    "),
            None => queue.push(file),
        }
    }

    let failed = if overlapped {
        downloader
            .download_pipelined(&queue, out_dir)
            .await?
            .failed_files
    } else {
        let mut failed = Vec::new();
        for file in &queue {
            match downloader.download_file(file, out_dir.as_deref()).await {
                Ok(()) => {}
                Err(err @ FetchError::BundlesFailed { .. }) => {
                    warn!(path = %file.path, %err, "file incomplete");
                    failed.push(file.path.clone());
                }
                Err(err) => return Err(err.into()),
            }
        }
        failed
    };

    if !failed.is_empty() {
        bail!(
            "{} file(s) failed to download: {}",
            failed.len(),
            failed.join(", ")
        );
    }
    Ok(())
}
