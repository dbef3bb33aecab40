use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use dirmirror_core::{DirMirror, EventKind, MirrorEvent, MirrorOptions, NameFilter};

#[derive(Parser, Debug)]
#[command(
    name = "dirmirror",
    version,
    about = "Mirror a directory's files into memory and log changes"
)]
pub struct Cli {
    /// Directory to mirror
    pub directory: PathBuf,

    /// Only track filenames matching this glob pattern
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Keep raw text instead of decoding JSON files
    #[arg(long)]
    pub raw: bool,

    /// Filename suffix treated as JSON (case-insensitive)
    #[arg(long, default_value = ".json")]
    pub json_suffix: String,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut options = MirrorOptions::new(cli.directory.clone());
    if let Some(pattern) = &cli.pattern {
        options.filter = NameFilter::pattern(pattern)?;
    }
    options.json.enabled = !cli.raw;
    options.json.suffix = cli.json_suffix.clone();

    let mirror = DirMirror::new(options);
    for kind in [EventKind::Added, EventKind::Updated, EventKind::Deleted, EventKind::Error] {
        mirror.on(kind, log_event);
    }

    mirror.init().await?;
    info!("Mirroring {} entries from {:?}", mirror.len(), cli.directory);
    for name in mirror.filenames().iter() {
        info!("  {}", name);
    }

    tokio::signal::ctrl_c().await?;
    mirror.stop();
    info!("Stopped");
    Ok(())
}

fn log_event(event: &MirrorEvent) {
    match event {
        MirrorEvent::Added { name, content } => info!("Added {:?} ({:?})", name, content),
        MirrorEvent::Updated { name, content } => info!("Updated {:?} ({:?})", name, content),
        MirrorEvent::Deleted { name, .. } => info!("Deleted {:?}", name),
        MirrorEvent::Error { error } => warn!("{}", error),
    }
}
