//! Appmarket Deployer
//!
//! The provisioning backend that turns a chart package and a merged values
//! tree into a running release. The core only sees the [`Deployer`] trait;
//! [`HelmDeployer`] drives the `helm` CLI and [`RecordingDeployer`] keeps
//! releases in memory for tests and dry runs.

mod helm;
mod recording;

pub use helm::{HelmConfig, HelmDeployer};
pub use recording::{RecordedRelease, RecordingDeployer};

use std::path::Path;

use appmarket_values::Values;
use async_trait::async_trait;

/// Error type for deployer operations.
#[derive(Debug, thiserror::Error)]
pub enum DeployerError {
  /// The backend refused or failed the operation.
  #[error("{operation} of release {release} failed: {message}")]
  Backend {
    operation: &'static str,
    release: String,
    message: String,
  },

  /// A release or namespace name the backend must not be handed.
  #[error("invalid {kind} name {name:?}: {reason}")]
  InvalidName {
    kind: &'static str,
    name: String,
    reason: &'static str,
  },

  /// The release does not exist.
  #[error("release not found: {namespace}/{release}")]
  ReleaseNotFound { release: String, namespace: String },

  /// Serializing the values file failed.
  #[error("failed to encode values: {0}")]
  Encode(#[from] serde_json::Error),

  /// Spawning the backend process or writing its inputs failed.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// In-process backend failure.
  #[error("internal error: {0}")]
  Internal(String),
}

/// Installs and removes named releases.
///
/// Collisions on release name are whatever the backend does with them; no
/// pre-check happens at this layer.
#[async_trait]
pub trait Deployer: Send + Sync {
  /// Install `artifact` as `release` in `namespace` with the given values.
  async fn install(
    &self,
    release: &str,
    namespace: &str,
    artifact: &Path,
    values: &Values,
  ) -> Result<(), DeployerError>;

  /// Remove `release` from `namespace`.
  async fn uninstall(&self, release: &str, namespace: &str) -> Result<(), DeployerError>;
}
