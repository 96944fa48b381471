use std::collections::BTreeSet;

use rmdl_manifest::{BundleId, ChunkId};

use super::app::{BundlesArgs, FilterArgs};
use super::common::{load_manifest, skip_reason};

pub fn files(args: FilterArgs) -> anyhow::Result<()> {
    let mut list = load_manifest(&args)?;
    for file in &mut list.files {
        if skip_reason(file, &args).is_some() {
            continue;
        }
        println!("{}", file.to_csv());
    }
    Ok(())
}

pub fn bundles(args: BundlesArgs) -> anyhow::Result<()> {
    let mut list = load_manifest(&args.filter)?;
    let mut visited: BTreeSet<BundleId> = BTreeSet::new();
    for file in &mut list.files {
        if skip_reason(file, &args.filter).is_some() {
            continue;
        }
        for chunk in &file.chunks {
            if visited.insert(chunk.bundle_id) {
                println!("{}/bundles/{}.bundle", args.prefix, chunk.bundle_id);
            }
        }
    }
    for id in &list.unreferenced {
        if visited.insert(*id) {
            println!("{}/bundles/{}.bundle", args.prefix, id);
        }
    }
    Ok(())
}

pub fn chunks(args: FilterArgs) -> anyhow::Result<()> {
    let mut list = load_manifest(&args)?;
    let mut visited: BTreeSet<(BundleId, ChunkId)> = BTreeSet::new();
    for file in &mut list.files {
        if skip_reason(file, &args).is_some() {
            continue;
        }
        for chunk in &file.chunks {
            if visited.insert((chunk.bundle_id, chunk.id)) {
                println!(
                    "{}\t{}\t{:08X}\t{:08X}\t{:08X}",
                    chunk.bundle_id,
                    chunk.id,
                    chunk.compressed_offset,
                    chunk.compressed_size,
                    chunk.uncompressed_size
                );
            }
        }
    }
    Ok(())
}

pub fn json(args: FilterArgs) -> anyhow::Result<()> {
    let mut list = load_manifest(&args)?;
    list.files
        .retain_mut(|file| skip_reason(file, &args).is_none());
    println!("{}", list.to_json()?);
    Ok(())
}
