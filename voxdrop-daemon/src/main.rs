//! voxdrop: watch TTS output folders and hand finished pairs to the editor.

mod probe;
mod sink;
mod supervisor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxdrop_config::ConfigLoader;

use crate::probe::SnapshotFileProbe;
use crate::sink::SpoolSink;
use crate::supervisor::Supervisor;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "voxdrop", version)]
#[command(about = "Deliver freshly exported TTS audio and text pairs to the video editor")]
struct Cli {
    /// Settings file (defaults to setting.toml next to the executable)
    settings: Option<PathBuf>,

    /// Log per-file diagnostics
    #[arg(short, long)]
    verbose: bool,

    /// Disable coloured output
    #[arg(short, long)]
    mono: bool,

    /// Directory substituted for %TEMPDIR% (defaults to tmp/ next to the executable)
    #[arg(long, env = "VOXDROP_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// JSON document describing the editing host's current project
    #[arg(long, env = "VOXDROP_HOST_SNAPSHOT")]
    host_snapshot: Option<PathBuf>,

    /// Directory receiving one JSON manifest per delivered batch
    #[arg(long, env = "VOXDROP_OUTBOX")]
    outbox: Option<PathBuf>,
}

fn init_tracing(verbose: bool, mono: bool) {
    let default_filter = if verbose {
        "info,voxdrop_core=debug,voxdrop_config=debug,voxdrop=debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_ansi(!mono))
        .init();
}

fn absolute(path: PathBuf) -> anyhow::Result<PathBuf> {
    std::path::absolute(&path).with_context(|| format!("cannot resolve {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.mono);

    let exe = std::env::current_exe().context("cannot locate the executable")?;
    let exe_dir = exe.parent().unwrap_or_else(|| Path::new("."));

    let settings = absolute(cli.settings.unwrap_or_else(|| exe_dir.join("setting.toml")))?;
    let temp_dir = absolute(cli.temp_dir.unwrap_or_else(|| exe_dir.join("tmp")))?;
    let host_snapshot = absolute(cli.host_snapshot.unwrap_or_else(|| exe_dir.join("host.json")))?;
    let outbox = absolute(cli.outbox.unwrap_or_else(|| exe_dir.join("outbox")))?;

    std::fs::create_dir_all(&temp_dir)
        .with_context(|| format!("failed to create {}", temp_dir.display()))?;

    info!(version = env!("CARGO_PKG_VERSION"), "voxdrop starting");
    if cli.verbose {
        warn!("verbose logging enabled");
    }
    info!(
        settings = %settings.display(),
        temp_dir = %temp_dir.display(),
        host_snapshot = %host_snapshot.display(),
        outbox = %outbox.display(),
        "paths"
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
        }
        on_signal.cancel();
    });

    let supervisor = Supervisor::new(
        ConfigLoader::new(settings, temp_dir),
        Arc::new(SnapshotFileProbe::new(host_snapshot)),
        Arc::new(SpoolSink::new(outbox)),
    );
    supervisor.run(cancel).await;
    Ok(())
}
