// src/bin/mkfs_xv6.rs
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use xv6fsck::mkfs::ImageBuilder;
use xv6fsck::ROOTINO;

const FS_SIZE: u32 = 1024;
const NINODES: u32 = 200;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // mkfs.xv6 fs.img [files...]
    let mut args = env::args().skip(1);
    let image_path = args
        .next()
        .map(PathBuf::from)
        .context("Usage: mkfs.xv6 fs.img [files...]")?;
    let files: Vec<PathBuf> = args.map(PathBuf::from).collect();

    let mut builder = ImageBuilder::new(FS_SIZE, NINODES)?;

    for path in &files {
        let name = entry_name(path)?;
        let data = fs::read(path).with_context(|| format!("could not read {:?}", path))?;
        let inum = builder
            .add_file(ROOTINO, &name, &data)
            .with_context(|| format!("could not add {:?}", path))?;
        info!(inum, name = %name, bytes = data.len(), "added file");
    }

    let sb = *builder.superblock();
    let bytes = builder.finish();
    fs::write(&image_path, &bytes)
        .with_context(|| format!("could not write {:?}", image_path))?;

    println!(
        "mkfs.xv6: {} blocks, {} inodes, {} data blocks, {} files.",
        sb.size,
        sb.ninodes,
        sb.nblocks,
        files.len()
    );
    Ok(())
}

/// Nombre base de `path`, sin el guión bajo inicial que xv6 usa para los
/// programas de usuario.
fn entry_name(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("{:?} has no usable file name", path))?;
    Ok(name.strip_prefix('_').unwrap_or(name).to_string())
}
