//! Deployer backed by the `helm` command line.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use appmarket_values::Values;
use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::{Deployer, DeployerError};

/// Longest release name helm accepts.
const MAX_RELEASE_LEN: usize = 53;

/// Longest namespace name Kubernetes accepts.
const MAX_NAMESPACE_LEN: usize = 63;

/// Settings for [`HelmDeployer`].
#[derive(Debug, Clone)]
pub struct HelmConfig {
  /// Program to run, looked up on `PATH` when not absolute.
  pub binary: PathBuf,
  /// Pass `--create-namespace` on install.
  pub create_namespace: bool,
}

impl Default for HelmConfig {
  fn default() -> Self {
    Self {
      binary: PathBuf::from("helm"),
      create_namespace: true,
    }
  }
}

/// Runs `helm install` / `helm uninstall` as child processes.
///
/// Merged values are handed over as a JSON values file, which helm reads as
/// YAML. The child is killed if the returned future is dropped, so an
/// abandoned install does not keep running in the background.
#[derive(Debug, Clone, Default)]
pub struct HelmDeployer {
  config: HelmConfig,
}

impl HelmDeployer {
  pub fn new(config: HelmConfig) -> Self {
    Self { config }
  }

  fn command(&self) -> Command {
    let mut cmd = Command::new(&self.config.binary);
    cmd
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    cmd
  }

  fn write_values(values: &Values) -> Result<NamedTempFile, DeployerError> {
    let mut file = tempfile::Builder::new()
      .prefix("values-")
      .suffix(".json")
      .tempfile()?;
    serde_json::to_writer(&mut file, values)?;
    file.flush()?;
    Ok(file)
  }

  async fn run(
    &self,
    mut cmd: Command,
    operation: &'static str,
    release: &str,
  ) -> Result<String, DeployerError> {
    let output = cmd.output().await?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

    if output.status.success() {
      return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = match stderr.trim() {
      "" => format!("exit code {:?}", output.status.code()),
      text => text.to_string(),
    };
    warn!(operation, release, code = ?output.status.code(), error = %message, "helm command failed");

    Err(DeployerError::Backend {
      operation,
      release: release.to_string(),
      message,
    })
  }
}

#[async_trait]
impl Deployer for HelmDeployer {
  async fn install(
    &self,
    release: &str,
    namespace: &str,
    artifact: &Path,
    values: &Values,
  ) -> Result<(), DeployerError> {
    check_name("release", release, MAX_RELEASE_LEN)?;
    check_name("namespace", namespace, MAX_NAMESPACE_LEN)?;
    let values_file = Self::write_values(values)?;

    let mut cmd = self.command();
    cmd.arg("install").arg("--namespace").arg(namespace);
    if self.config.create_namespace {
      cmd.arg("--create-namespace");
    }
    cmd
      .arg("--values")
      .arg(values_file.path())
      .arg("--")
      .arg(release)
      .arg(artifact);

    info!(release, namespace, artifact = %artifact.display(), "helm install");
    let stdout = self.run(cmd, "install", release).await?;
    debug!(release, output = %stdout.trim(), "helm install finished");

    Ok(())
  }

  async fn uninstall(&self, release: &str, namespace: &str) -> Result<(), DeployerError> {
    check_name("release", release, MAX_RELEASE_LEN)?;
    check_name("namespace", namespace, MAX_NAMESPACE_LEN)?;

    let mut cmd = self.command();
    cmd
      .arg("uninstall")
      .arg("--namespace")
      .arg(namespace)
      .arg("--")
      .arg(release);

    info!(release, namespace, "helm uninstall");
    match self.run(cmd, "uninstall", release).await {
      Err(DeployerError::Backend { message, .. }) if message.contains("not found") => {
        Err(DeployerError::ReleaseNotFound {
          release: release.to_string(),
          namespace: namespace.to_string(),
        })
      }
      other => other.map(|_| ()),
    }
  }
}

/// Reject anything that is not a DNS-1123 label: lowercase alphanumerics and
/// `-`, starting and ending with an alphanumeric.
fn check_name(kind: &'static str, name: &str, max_len: usize) -> Result<(), DeployerError> {
  let reason = if name.is_empty() {
    Some("must not be empty")
  } else if name.len() > max_len {
    Some("too long")
  } else if !name
    .bytes()
    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
  {
    Some("only lowercase letters, digits and '-' are allowed")
  } else if name.starts_with('-') || name.ends_with('-') {
    Some("must start and end with a letter or digit")
  } else {
    None
  };

  match reason {
    Some(reason) => Err(DeployerError::InvalidName {
      kind,
      name: name.to_string(),
      reason,
    }),
    None => Ok(()),
  }
}
