//! Server configuration, deserialised from `config.toml` and `TALLY_*`
//! environment variables.

use std::{path::PathBuf, sync::Arc, time::Duration};

use serde::Deserialize;
use strum::IntoEnumIterator as _;
use tally_core::target::TargetKind;
use tally_tracker::{
  AdapterRegistry, TrackerConfig,
  config::DEFAULT_MAX_RETRIES,
  manual::{AttestationDesk, ManualAdapter},
};

/// One target kind the server accepts records for.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
  pub kind:        TargetKind,
  /// Overrides `default_max_retries` for this kind.
  pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  /// SQLite file holding records across restarts. Records live in memory
  /// only when unset.
  pub store_path:          Option<PathBuf>,
  #[serde(default = "default_call_timeout_ms")]
  pub call_timeout_ms:     u64,
  /// Seconds between background sweeps; `0` disables the sweep.
  #[serde(default = "default_sweep_interval_secs")]
  pub sweep_interval_secs: u64,
  #[serde(default = "default_max_retries")]
  pub default_max_retries: u32,
  /// Every kind, with default budgets, when empty.
  #[serde(default)]
  pub targets:             Vec<TargetConfig>,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

fn default_call_timeout_ms() -> u64 { 10_000 }

fn default_sweep_interval_secs() -> u64 { 30 }

fn default_max_retries() -> u32 { DEFAULT_MAX_RETRIES }

impl ServerConfig {
  /// The configured targets, or every kind when none are listed.
  pub fn targets(&self) -> Vec<TargetConfig> {
    if self.targets.is_empty() {
      TargetKind::iter()
        .map(|kind| TargetConfig { kind, max_retries: None })
        .collect()
    } else {
      self.targets.clone()
    }
  }

  pub fn tracker_config(&self) -> TrackerConfig {
    let base = TrackerConfig {
      default_max_retries: self.default_max_retries,
      ..TrackerConfig::default()
    }
    .with_call_timeout(Duration::from_millis(self.call_timeout_ms));

    self
      .targets()
      .into_iter()
      .filter_map(|t| t.max_retries.map(|n| (t.kind, n)))
      .fold(base, |cfg, (kind, n)| cfg.with_max_retries(kind, n))
  }

  /// Kinds served by [`Self::registry`]'s manual adapters.
  pub fn manual_kinds(&self) -> Vec<TargetKind> {
    self.targets().into_iter().map(|t| t.kind).collect()
  }

  /// A manual-attestation adapter for every configured kind, all sharing
  /// `desk`. Fails if a kind is listed twice.
  pub fn registry(&self, desk: &Arc<AttestationDesk>) -> tally_core::Result<AdapterRegistry> {
    self
      .targets()
      .into_iter()
      .try_fold(AdapterRegistry::new(), |registry, t| {
        registry.register(Arc::new(ManualAdapter::new(t.kind, desk.clone())))
      })
  }

  /// `None` when the sweep is disabled.
  pub fn sweep_interval(&self) -> Option<Duration> {
    (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
  }
}
