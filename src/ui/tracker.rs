use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use rmdl_fetch::{DownloadEvent, EventSink};

const PB_STYLE: &str = "{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

const PB_CHARS: &str = "█▓▒░  ";

static PB_TEMPLATE: Lazy<ProgressStyle> = Lazy::new(|| {
    match ProgressStyle::with_template(PB_STYLE) {
        Ok(style) => style.progress_chars(PB_CHARS),
        Err(_) => ProgressStyle::default_bar(),
    }
});

/// One progress bar per in-flight file, keyed by manifest path.
///
/// Works for both orchestration modes: the synchronous driver shows one bar
/// at a time, the overlapped driver keeps several alive at once.
pub struct Bars {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl Bars {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        })
    }

    /// Event sink wired into the downloader.
    pub fn sink(self: &Arc<Self>) -> EventSink {
        let bars = Arc::clone(self);
        Arc::new(move |event| bars.apply(event))
    }

    /// Show a completed one-line entry for a file that needs no download.
    pub fn note(&self, path: &str, prefix: &'static str) {
        let bar = self.multi.add(ProgressBar::new(1));
        bar.set_style(PB_TEMPLATE.clone());
        bar.set_prefix(prefix);
        bar.set_message(path.to_string());
        bar.finish();
    }

    fn apply(&self, event: &DownloadEvent) {
        match event {
            DownloadEvent::FileStarted { path, bundles } => {
                let bar = self.multi.add(ProgressBar::new(*bundles as u64));
                bar.set_style(PB_TEMPLATE.clone());
                bar.set_prefix("DL    ");
                bar.set_message(path.clone());
                self.bars.lock().unwrap().insert(path.clone(), bar);
            }
            DownloadEvent::AttemptStarted { path, attempt } => {
                if *attempt > 0 {
                    if let Some(bar) = self.bars.lock().unwrap().get(path) {
                        bar.set_prefix(format!("TRY #{attempt}"));
                    }
                }
            }
            DownloadEvent::BundleFinished { path, good, .. } => {
                if *good {
                    if let Some(bar) = self.bars.lock().unwrap().get(path) {
                        bar.inc(1);
                    }
                }
            }
            DownloadEvent::FileFinished { path, good } => {
                if let Some(bar) = self.bars.lock().unwrap().remove(path) {
                    bar.set_prefix(if *good { "OK    " } else { "ERROR " });
                    bar.finish();
                }
            }
        }
    }
}
