//! Error types for the deployment pipeline.

use std::time::Duration;

use appmarket_artifact::ResolveError;
use appmarket_deployer::DeployerError;
use appmarket_store::StoreError;
use appmarket_values::MergeError;
use thiserror::Error;

/// Errors that can occur while deploying or removing a release.
#[derive(Debug, Error)]
pub enum PipelineError {
  /// A chart version or instance does not exist.
  #[error("not found: {0}")]
  NotFound(String),

  /// The request is missing values the chart policy requires.
  #[error("validation failed: missing required keys: {}", .missing.join(", "))]
  ValidationFailed { missing: Vec<String> },

  /// Merging the values layers failed.
  #[error("merge failed: {0}")]
  MergeFailed(#[from] MergeError),

  /// The chart package could not be located or fetched.
  #[error("resolution failed: {0}")]
  ResolutionFailed(#[from] ResolveError),

  /// The deployer rejected the install.
  #[error("install failed: {0}")]
  InstallFailed(#[source] DeployerError),

  /// The deployer rejected the uninstall. The instance record is kept.
  #[error("uninstall failed: {0}")]
  UninstallFailed(#[source] DeployerError),

  /// The deployment did not finish in time and was abandoned.
  #[error("deployment timed out after {}s", .0.as_secs())]
  Timeout(Duration),

  /// Reading or writing records failed.
  #[error("store error: {0}")]
  Store(StoreError),
}

impl From<StoreError> for PipelineError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::NotFound(what) => PipelineError::NotFound(what),
      other => PipelineError::Store(other),
    }
  }
}
