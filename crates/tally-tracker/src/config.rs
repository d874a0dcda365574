//! Tracker configuration.

use std::{collections::HashMap, time::Duration};

use tally_core::target::TargetKind;

/// Retry budget used for kinds without an explicit override.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Time allowed for any single adapter call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct TrackerConfig {
  /// Per-call timeout for `submit`, `poll_status` and `cancel`. An elapsed
  /// timeout counts as a transient adapter error.
  pub call_timeout:        Duration,
  pub default_max_retries: u32,
  /// Per-kind retry budgets; kinds not listed use `default_max_retries`.
  pub max_retries:         HashMap<TargetKind, u32>,
}

impl Default for TrackerConfig {
  fn default() -> Self {
    Self {
      call_timeout:        DEFAULT_CALL_TIMEOUT,
      default_max_retries: DEFAULT_MAX_RETRIES,
      max_retries:         HashMap::new(),
    }
  }
}

impl TrackerConfig {
  pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
    self.call_timeout = timeout;
    self
  }

  pub fn with_max_retries(mut self, kind: TargetKind, max_retries: u32) -> Self {
    self.max_retries.insert(kind, max_retries);
    self
  }

  /// The retry budget for `kind`.
  pub fn max_retries_for(&self, kind: TargetKind) -> u32 {
    self
      .max_retries
      .get(&kind)
      .copied()
      .unwrap_or(self.default_max_retries)
  }
}
