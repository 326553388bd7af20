//! In-memory deployer that records what it was asked to do.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use appmarket_values::Values;
use async_trait::async_trait;

use crate::{Deployer, DeployerError};

/// A release held by [`RecordingDeployer`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRelease {
  pub release: String,
  pub namespace: String,
  pub artifact: PathBuf,
  pub values: Values,
  /// Whether the artifact existed on disk at install time.
  pub artifact_existed: bool,
}

/// Deployer that keeps releases in memory.
///
/// Installing a name that is already present in the namespace fails, the way
/// helm refuses to reuse a release name.
#[derive(Debug, Default)]
pub struct RecordingDeployer {
  releases: RwLock<HashMap<(String, String), RecordedRelease>>,
  install_error: Option<String>,
  uninstall_error: Option<String>,
  delay: Option<Duration>,
  installs: AtomicUsize,
}

impl RecordingDeployer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fail every install with `message`.
  pub fn failing_install(message: impl Into<String>) -> Self {
    Self {
      install_error: Some(message.into()),
      ..Self::default()
    }
  }

  /// Fail every uninstall with `message`.
  pub fn failing_uninstall(message: impl Into<String>) -> Self {
    Self {
      uninstall_error: Some(message.into()),
      ..Self::default()
    }
  }

  /// Sleep for `delay` before each install.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  /// Number of install calls, successful or not.
  pub fn install_count(&self) -> usize {
    self.installs.load(Ordering::SeqCst)
  }

  pub fn release(&self, release: &str, namespace: &str) -> Option<RecordedRelease> {
    self
      .releases
      .read()
      .ok()?
      .get(&(namespace.to_string(), release.to_string()))
      .cloned()
  }

  pub fn releases(&self) -> Vec<RecordedRelease> {
    self
      .releases
      .read()
      .map(|r| r.values().cloned().collect())
      .unwrap_or_default()
  }
}

fn poisoned() -> DeployerError {
  DeployerError::Internal("lock poisoned".to_string())
}

#[async_trait]
impl Deployer for RecordingDeployer {
  async fn install(
    &self,
    release: &str,
    namespace: &str,
    artifact: &Path,
    values: &Values,
  ) -> Result<(), DeployerError> {
    self.installs.fetch_add(1, Ordering::SeqCst);

    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    if let Some(message) = &self.install_error {
      return Err(DeployerError::Backend {
        operation: "install",
        release: release.to_string(),
        message: message.clone(),
      });
    }

    let artifact_existed = artifact.exists();
    let mut releases = self.releases.write().map_err(|_| poisoned())?;
    let key = (namespace.to_string(), release.to_string());
    if releases.contains_key(&key) {
      return Err(DeployerError::Backend {
        operation: "install",
        release: release.to_string(),
        message: "cannot re-use a name that is still in use".to_string(),
      });
    }

    releases.insert(
      key,
      RecordedRelease {
        release: release.to_string(),
        namespace: namespace.to_string(),
        artifact: artifact.to_path_buf(),
        values: values.clone(),
        artifact_existed,
      },
    );
    Ok(())
  }

  async fn uninstall(&self, release: &str, namespace: &str) -> Result<(), DeployerError> {
    if let Some(message) = &self.uninstall_error {
      return Err(DeployerError::Backend {
        operation: "uninstall",
        release: release.to_string(),
        message: message.clone(),
      });
    }

    let mut releases = self.releases.write().map_err(|_| poisoned())?;
    match releases.remove(&(namespace.to_string(), release.to_string())) {
      Some(_) => Ok(()),
      None => Err(DeployerError::ReleaseNotFound {
        release: release.to_string(),
        namespace: namespace.to_string(),
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_install_then_uninstall() {
    let deployer = RecordingDeployer::new();
    let mut values = Values::new();
    values.insert("replicaCount".into(), serde_json::json!(1));

    deployer
      .install("web", "default", Path::new("/charts/web.tgz"), &values)
      .await
      .unwrap();

    let recorded = deployer.release("web", "default").unwrap();
    assert_eq!(recorded.values, values);
    assert!(!recorded.artifact_existed);
    assert_eq!(deployer.install_count(), 1);

    deployer.uninstall("web", "default").await.unwrap();
    assert!(deployer.releases().is_empty());
  }

  #[tokio::test]
  async fn test_duplicate_release_name_fails() {
    let deployer = RecordingDeployer::new();
    let path = Path::new("/charts/web.tgz");
    deployer.install("web", "default", path, &Values::new()).await.unwrap();

    let err = deployer
      .install("web", "default", path, &Values::new())
      .await
      .unwrap_err();
    assert!(matches!(err, DeployerError::Backend { .. }));

    // Same name in another namespace is a different release.
    deployer.install("web", "staging", path, &Values::new()).await.unwrap();
    assert_eq!(deployer.releases().len(), 2);
  }

  #[tokio::test]
  async fn test_uninstall_unknown_release() {
    let deployer = RecordingDeployer::new();
    let err = deployer.uninstall("web", "default").await.unwrap_err();
    assert!(matches!(err, DeployerError::ReleaseNotFound { .. }));
  }

  #[tokio::test]
  async fn test_failing_install_records_nothing() {
    let deployer = RecordingDeployer::failing_install("boom");
    let err = deployer
      .install("web", "default", Path::new("/x.tgz"), &Values::new())
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "install of release web failed: boom");
    assert!(deployer.releases().is_empty());
    assert_eq!(deployer.install_count(), 1);
  }
}
