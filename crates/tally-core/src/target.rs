//! Target kinds: the external registrars an item is submitted to.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// One category of external registrar or collector.
///
/// The set is closed: a deployment picks which of these it has adapters for,
/// but it cannot invent new kinds at runtime.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TargetKind {
  /// Mechanical licensing collective.
  MechanicalLicensing,
  /// Performance-rights organisation.
  PerformanceRights,
  /// Digital performance royalty collector.
  RoyaltyCollection,
}
