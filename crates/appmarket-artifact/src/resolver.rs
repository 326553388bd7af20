use std::path::{Path, PathBuf};

use appmarket_store::ChartVersionRecord;
use async_trait::async_trait;
use reqwest::Client;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::ResolveError;

/// Where a chart version's package comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
  /// A package already on disk. Not owned by the resolver.
  Local(PathBuf),
  /// A package to download. Only the first listed URL is used.
  Remote(String),
}

impl ArtifactSource {
  /// Pick the source for a record, preferring a local package.
  ///
  /// A record with neither is a data-integrity violation and fails with
  /// [`ResolveError::NoSource`].
  pub fn for_record(record: &ChartVersionRecord) -> Result<Self, ResolveError> {
    if let Some(path) = record.local_path.as_deref().filter(|p| !p.is_empty()) {
      return Ok(ArtifactSource::Local(PathBuf::from(path)));
    }

    match record.urls.0.iter().find(|u| !u.is_empty()) {
      Some(url) => Ok(ArtifactSource::Remote(url.clone())),
      None => Err(ResolveError::NoSource {
        chart_id: record.chart_id.clone(),
        version: record.version.clone(),
      }),
    }
  }
}

/// A chart package ready to install.
///
/// Downloaded packages live in a temporary file that is deleted exactly once:
/// either by [`ResolvedArtifact::cleanup`] or when the value is dropped.
/// Local packages are never touched.
#[derive(Debug)]
pub struct ResolvedArtifact {
  path: PathBuf,
  temp: Option<TempPath>,
}

impl ResolvedArtifact {
  /// Wrap a package the caller does not own.
  pub fn local(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      temp: None,
    }
  }

  fn temporary(temp: TempPath) -> Self {
    Self {
      path: temp.to_path_buf(),
      temp: Some(temp),
    }
  }

  /// Path to the package on disk.
  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Whether the package is a temporary download.
  pub fn is_temporary(&self) -> bool {
    self.temp.is_some()
  }

  /// Delete the temporary download now, reporting any I/O failure.
  ///
  /// A no-op for local packages.
  pub fn cleanup(mut self) -> Result<(), ResolveError> {
    if let Some(temp) = self.temp.take() {
      debug!(path = %self.path.display(), "removing downloaded chart");
      temp.close()?;
    }
    Ok(())
  }
}

/// Resolves chart version records to installable packages.
#[async_trait]
pub trait ArtifactResolver: Send + Sync {
  /// Produce a local package for the record, downloading it if needed.
  async fn resolve(&self, record: &ChartVersionRecord) -> Result<ResolvedArtifact, ResolveError>;
}

/// Resolver that downloads remote packages over plain HTTP(S) GET.
#[derive(Debug, Clone)]
pub struct HttpResolver {
  client: Client,
  temp_dir: PathBuf,
}

impl HttpResolver {
  /// Create a resolver that downloads into the system temp directory.
  pub fn new() -> Self {
    Self::with_temp_dir(std::env::temp_dir())
  }

  /// Create a resolver that downloads into `temp_dir`.
  pub fn with_temp_dir(temp_dir: impl Into<PathBuf>) -> Self {
    Self {
      client: Client::new(),
      temp_dir: temp_dir.into(),
    }
  }

  async fn download(&self, url: &str) -> Result<ResolvedArtifact, ResolveError> {
    info!(url = %url, "downloading chart");

    let mut response = self.client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(ResolveError::Status {
        url: url.to_string(),
        status: status.as_u16(),
      });
    }

    tokio::fs::create_dir_all(&self.temp_dir).await?;
    let (file, temp) = tempfile::Builder::new()
      .prefix("chart-")
      .suffix(".tgz")
      .tempfile_in(&self.temp_dir)?
      .into_parts();

    // `temp` deletes the file if any of the writes below fail.
    let mut file = tokio::fs::File::from_std(file);
    let mut size = 0usize;
    while let Some(chunk) = response.chunk().await? {
      size += chunk.len();
      file.write_all(&chunk).await?;
    }
    file.flush().await?;

    debug!(url = %url, path = %temp.display(), size, "chart downloaded");
    Ok(ResolvedArtifact::temporary(temp))
  }
}

impl Default for HttpResolver {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl ArtifactResolver for HttpResolver {
  async fn resolve(&self, record: &ChartVersionRecord) -> Result<ResolvedArtifact, ResolveError> {
    match ArtifactSource::for_record(record)? {
      ArtifactSource::Local(path) => {
        debug!(path = %path.display(), "using local chart package");
        Ok(ResolvedArtifact::local(path))
      }
      ArtifactSource::Remote(url) => self.download(&url).await,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use sqlx::types::Json;

  #[test]
  fn test_local_path_wins_over_urls() {
    let mut record = ChartVersionRecord::new("nginx", "1.0.0");
    record.local_path = Some("/charts/nginx/1.0.0.tgz".to_string());
    record.urls = Json(vec!["https://example.com/nginx.tgz".to_string()]);

    assert_eq!(
      ArtifactSource::for_record(&record).unwrap(),
      ArtifactSource::Local(PathBuf::from("/charts/nginx/1.0.0.tgz"))
    );
  }

  #[test]
  fn test_first_url_is_used() {
    let mut record = ChartVersionRecord::new("nginx", "1.0.0");
    record.local_path = Some(String::new());
    record.urls = Json(vec![
      "https://a.example.com/nginx.tgz".to_string(),
      "https://b.example.com/nginx.tgz".to_string(),
    ]);

    assert_eq!(
      ArtifactSource::for_record(&record).unwrap(),
      ArtifactSource::Remote("https://a.example.com/nginx.tgz".to_string())
    );
  }

  #[test]
  fn test_no_source_is_an_error() {
    let record = ChartVersionRecord::new("nginx", "1.0.0");
    let err = ArtifactSource::for_record(&record).unwrap_err();
    assert!(matches!(err, ResolveError::NoSource { .. }));
    assert!(err.to_string().contains("nginx@1.0.0"));
  }

  #[test]
  fn test_local_cleanup_leaves_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chart.tgz");
    std::fs::write(&path, b"package").unwrap();

    let artifact = ResolvedArtifact::local(&path);
    assert!(!artifact.is_temporary());
    artifact.cleanup().unwrap();
    assert!(path.exists());
  }
}
