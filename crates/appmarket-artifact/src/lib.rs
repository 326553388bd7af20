//! Appmarket Artifact
//!
//! This crate turns a chart version record into a chart package on the local
//! filesystem that the deployer can install.
//!
//! A chart version either points at a package that already lives on disk
//! (uploaded charts, see [`FsPackageStore`]) or lists download URLs (charts
//! synced from a repository index). [`HttpResolver`] handles both: local
//! packages are used in place, remote ones are streamed into a temporary file
//! owned by the returned [`ResolvedArtifact`] and removed when it is dropped.

mod fs;
mod resolver;

pub use fs::FsPackageStore;
pub use resolver::{ArtifactResolver, ArtifactSource, HttpResolver, ResolvedArtifact};

/// Error type for artifact operations.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
  /// The chart version has neither a local path nor a download URL.
  #[error("no chart source available for {chart_id}@{version} (neither local path nor URLs)")]
  NoSource { chart_id: String, version: String },

  /// The download returned a non-success status.
  #[error("failed to download chart from {url}: HTTP {status}")]
  Status { url: String, status: u16 },

  /// The download failed in transport.
  #[error("failed to download chart: {0}")]
  Http(#[from] reqwest::Error),

  /// A chart id or version that is not a single path component.
  #[error("invalid {kind} for a package path: {value:?}")]
  InvalidName { kind: &'static str, value: String },

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
