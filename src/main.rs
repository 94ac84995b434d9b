use std::fs::File;
use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use podscope::agent;
use podscope::config::Config;
use podscope::diagnose::export::{export_csv, export_structured};

/// Per-pod eBPF diagnostics agent.
#[derive(Parser)]
#[command(name = "podscope", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Container reference to trace, e.g. containerd://<hex-id>.
    #[arg(long)]
    container_id: Option<String>,

    /// Trace an explicit cgroup path instead of resolving a container.
    #[arg(long)]
    cgroup_path: Option<String>,

    /// Capture duration, e.g. 30s or 5m. 0 runs until interrupted.
    #[arg(long)]
    duration: Option<humantime::Duration>,

    /// Write the structured dump to this file.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write the tabular dump to this file.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Version) = &cli.command {
        println!(
            "podscope {} ({}/{})",
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH,
        );
        return Ok(());
    }

    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;
    fmt().with_env_filter(filter).with_target(true).init();

    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(duration) = cli.duration {
        cfg.capture_duration = duration.into();
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting podscope");

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(run(cfg, cli))
}

async fn run(cfg: Config, cli: Cli) -> Result<()> {
    let target = agent::resolve_target(
        &cfg,
        cli.container_id.as_deref(),
        cli.cgroup_path.as_deref(),
    )?;

    // Cancel the capture on SIGINT/SIGTERM.
    let cancel = tokio_util::sync::CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to register SIGTERM handler");
                let _ = ctrl_c.await;
                signal_cancel.cancel();
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT, stopping capture"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, stopping capture"),
        }
        signal_cancel.cancel();
    });

    let session = agent::run_capture(cfg, target, cancel).await?;

    print!("{}", session.generate_report());

    if let Some(path) = &cli.json {
        let data = export_structured(&session);
        let mut file = File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(&mut file, &data)
            .with_context(|| format!("writing {}", path.display()))?;
        file.write_all(b"\n")?;
        tracing::info!(path = %path.display(), "wrote structured dump");
    }

    if let Some(path) = &cli.csv {
        let mut file = File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        export_csv(&session, &mut file)
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote tabular dump");
    }

    tracing::info!("podscope stopped");
    Ok(())
}
