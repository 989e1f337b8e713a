// src/bin/fsck_xv6.rs
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use colored::*;
use tracing_subscriber::EnvFilter;
use xv6fsck::fsck::{self, Listing, Summary, Verdict};
use xv6fsck::{Image, InodeType, ROOTINO};

const USAGE: &str = "Usage: fsck.xv6 [-v] fs.img";

struct Options {
    image: PathBuf,
    verbose: bool,
}

fn parse_args() -> Result<Options> {
    let mut verbose = false;
    let mut image = None;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "-v" | "--verbose" => verbose = true,
            _ if image.is_none() => image = Some(PathBuf::from(arg)),
            _ => bail!("{USAGE}"),
        }
    }
    let image = image.context(USAGE)?;
    Ok(Options { image, verbose })
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{} {err:#}", "ERROR:".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// `Ok(true)` si la imagen es consistente.
fn run() -> Result<bool> {
    let opts = parse_args()?;
    init_tracing(opts.verbose);

    let bytes = fs::read(&opts.image).context("image not found.")?;
    let image = Image::new(&bytes)
        .with_context(|| format!("{} is not a usable image", opts.image.display()))?;

    if opts.verbose {
        print_root(&image);
    }

    let verdict = fsck::check_image(&image).context("fsck aborted")?;
    match &verdict {
        Verdict::Consistent(summary) => {
            if opts.verbose {
                print_summary(summary);
            }
            println!("{} {}", "✓".green(), "file system is consistent".green().bold());
        }
        Verdict::Inconsistent(violation) => {
            eprintln!("ERROR: {violation}");
            if opts.verbose {
                eprintln!(
                    "  {} {} ({})",
                    "•".red(),
                    violation.detail().red(),
                    violation.check().to_string().yellow()
                );
            }
        }
    }
    Ok(verdict.is_consistent())
}

fn kind_label(kind: Option<InodeType>) -> ColoredString {
    match kind {
        Some(InodeType::Directory) => "dir".blue(),
        Some(InodeType::File) => "file".normal(),
        Some(InodeType::Device) => "dev".yellow(),
        Some(InodeType::Unallocated) => "free".red(),
        None => "????".red(),
    }
}

fn print_root(image: &Image<'_>) {
    let sb = image.superblock();
    let layout = image.layout();
    println!("\n{}", " XV6 FILESYSTEM CHECK ".on_blue().bold());
    println!("{}", "──────────────────────────────────────────".blue());
    println!(
        "fs size {}, no. of blocks {}, no. of inodes {}",
        sb.size, sb.nblocks, sb.ninodes
    );
    println!(
        "bitmap at block {} ({} blocks), data from block {}",
        layout.bitmap_start, layout.bitmap_blocks, layout.data_start
    );

    println!("\n{}", "Root directory".bold().underline());
    let entries: Vec<Listing> = match fsck::list_directory(image, ROOTINO) {
        Ok(entries) => entries,
        Err(err) => {
            println!("  {} cannot list root: {err}", "✗".red());
            return;
        }
    };
    for entry in &entries {
        println!(
            "  {:>4}  {:<14}  {}  size {:>7}  links {}",
            entry.inum,
            entry.name,
            kind_label(entry.kind),
            entry.size,
            entry.nlink
        );
    }
    println!();
}

fn print_summary(summary: &Summary) {
    println!("{}", "Summary".bold().underline());
    println!(
        "  inodes in use  {} / {} ({} dirs, {} files, {} devices)",
        summary.inodes_used(),
        summary.ninodes,
        summary.directories,
        summary.files,
        summary.devices
    );
    println!(
        "  data blocks    {} / {}",
        summary.data_blocks_used,
        summary.size - summary.data_start
    );
    println!("  dir entries    {}", summary.dir_entries);
}
