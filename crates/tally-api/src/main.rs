//! tally-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), registers a
//! manual-attestation adapter per configured target, optionally restores
//! records from SQLite, runs the background sweep and serves the JSON API.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use tally_api::{AppState, ServerConfig};
use tally_store_sqlite::SqliteStore;
use tally_tracker::{Tracker, manual::AttestationDesk};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "tally submission tracker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TALLY"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let desk = AttestationDesk::new();
  let registry = server_cfg
    .registry(&desk)
    .context("invalid target configuration")?;
  tracing::info!(targets = ?registry, "registered adapters");

  match &server_cfg.store_path {
    Some(path) => {
      let store = SqliteStore::open(path)
        .await
        .with_context(|| format!("failed to open store at {path:?}"))?;
      let tracker = Tracker::restore(registry, server_cfg.tracker_config(), store)
        .await
        .context("failed to restore records")?;
      serve(&server_cfg, tracker, desk).await
    }
    None => {
      tracing::warn!("no store_path configured; records will not survive a restart");
      let tracker = Tracker::new(registry, server_cfg.tracker_config());
      serve(&server_cfg, tracker, desk).await
    }
  }
}

async fn serve<S>(
  cfg: &ServerConfig,
  tracker: Tracker<S>,
  desk: Arc<AttestationDesk>,
) -> anyhow::Result<()>
where
  S: tally_core::store::RecordStore + 'static,
{
  let state = AppState::new(tracker, desk, cfg.manual_kinds());
  let shutdown = CancellationToken::new();

  let sweep = cfg
    .sweep_interval()
    .map(|every| state.tracker.clone().spawn_sweep(every, shutdown.clone()));

  let app = tally_api::router(state);
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown({
      let shutdown = shutdown.clone();
      async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
          tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
        tracing::info!("shutting down");
        shutdown.cancel();
      }
    })
    .await
    .context("server error")?;

  if let Some(sweep) = sweep {
    sweep.await.context("sweep task panicked")?;
  }
  Ok(())
}
