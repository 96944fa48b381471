use std::fs;

use anyhow::Context;
use regex::{Regex, RegexBuilder};
use rmdl_manifest::{FileInfo, FileList};

use super::app::FilterArgs;

/// Load, filter and sanitize the manifest, applying upgrade elision when an
/// old manifest is given.
pub fn load_manifest(args: &FilterArgs) -> anyhow::Result<FileList> {
    let pattern = args.path.as_deref().map(build_pattern).transpose()?;
    let mut list = read_list(args, pattern.as_ref(), &args.manifest)?;
    if let Some(upgrade) = &args.upgrade {
        let old = read_list(args, pattern.as_ref(), upgrade)?;
        list.remove_uptodate(&old);
    }
    Ok(list)
}

fn read_list(
    args: &FilterArgs,
    pattern: Option<&Regex>,
    path: &std::path::Path,
) -> anyhow::Result<FileList> {
    let data = fs::read(path).with_context(|| format!("reading manifest {}", path.display()))?;
    let mut list = FileList::read(&data).with_context(|| format!("parsing {}", path.display()))?;
    list.filter_langs(&args.lang);
    list.filter_path(pattern);
    list.sanitize()
        .with_context(|| format!("sanitizing {}", path.display()))?;
    Ok(list)
}

fn build_pattern(pattern: &str) -> anyhow::Result<Regex> {
    RegexBuilder::new(&format!("^(?:{pattern})$"))
        .case_insensitive(true)
        .build()
        .context("invalid --path pattern")
}

/// Why a file needs no download.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Skip {
    Exists,
    Verified,
}

/// Apply the --exist / --verify checks. A `--verify` pass may also shrink
/// the file's chunk list to the spans that still mismatch on disk.
pub fn skip_reason(file: &mut FileInfo, args: &FilterArgs) -> Option<Skip> {
    if args.exist && file.exists_at(&args.output) {
        return Some(Skip::Exists);
    }
    if args.verify && file.retain_unverified(&args.output) {
        return Some(Skip::Verified);
    }
    None
}
