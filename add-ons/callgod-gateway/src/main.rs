//! Callgod gateway: telephony webhook in front of the callgod turn pipeline.
//!
//! Startup order: `.env` → logging → config → credentials (missing keys abort) → pipeline →
//! background preload → idle watcher → HTTP server. Ctrl-C stops the idle watcher and
//! drains the server.

mod logging;
mod routes;
mod twiml;

use anyhow::Context;
use callgod_voice::{spawn_idle_watch, Credentials, Pipeline, SilentSource, VoiceConfig};
use clap::Parser;
use routes::{build_app, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "callgod-gateway")]
#[command(about = "Voice line webhook: routes each call turn and serves the spoken reply")]
#[command(version)]
struct Cli {
    /// TOML config file (defaults to $CALLGOD_CONFIG, then config/callgod.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "CALLGOD_HOST")]
    host: String,

    #[arg(short, long, default_value_t = 5001, env = "CALLGOD_PORT")]
    port: u16,

    /// Also write a daily rolling log file here
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Do not synthesize reserved and canned artifacts at startup
    #[arg(long)]
    skip_preload: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[callgod-gateway] .env not loaded: {} (using system environment)", e);
    }
    let cli = Cli::parse();
    logging::init_logging(cli.log_dir.as_deref())?;

    let config = match &cli.config {
        Some(path) => VoiceConfig::load_from(path),
        None => VoiceConfig::load(),
    }
    .context("failed to load configuration")?;
    let credentials = Credentials::from_env()?;
    let pipeline = Arc::new(Pipeline::connect(config, &credentials)?);

    if cli.skip_preload {
        tracing::info!(target: "callgod::gateway", "preload skipped");
    } else {
        let preload = Arc::clone(&pipeline);
        tokio::spawn(async move {
            let report = preload.preloader().run().await;
            if !report.is_complete() {
                tracing::warn!(target: "callgod::gateway", failed = ?report.failed, "some artifacts were not preloaded");
            }
        });
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let idle_watch = spawn_idle_watch(Arc::clone(pipeline.attention()), Arc::new(SilentSource), stop_rx);

    let app = build_app(AppState::new(Arc::clone(&pipeline)));
    let listener = tokio::net::TcpListener::bind((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", cli.host, cli.port))?;
    tracing::info!(target: "callgod::gateway", "callgod gateway listening on {}:{}", cli.host, cli.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(target: "callgod::gateway", "failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!(target: "callgod::gateway", "shutting down gracefully...");
        })
        .await
        .context("server error")?;

    let _ = stop_tx.send(true);
    if let Err(e) = idle_watch.await {
        tracing::warn!(target: "callgod::gateway", "idle watcher ended abnormally: {}", e);
    }
    tracing::info!(target: "callgod::gateway", "idle watcher stopped. Goodbye!");
    Ok(())
}
