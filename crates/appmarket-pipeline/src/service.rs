//! Synchronous operations on deployed instances.

use std::sync::Arc;

use appmarket_deployer::Deployer;
use appmarket_store::{AppInstance, InstanceStore};
use tracing::info;

use crate::PipelineError;

/// Lists and removes a user's releases.
#[derive(Clone)]
pub struct DeploymentService {
  instances: Arc<dyn InstanceStore>,
  deployer: Arc<dyn Deployer>,
}

impl DeploymentService {
  pub fn new(instances: Arc<dyn InstanceStore>, deployer: Arc<dyn Deployer>) -> Self {
    Self {
      instances,
      deployer,
    }
  }

  /// Instances owned by `user_id`, newest first.
  pub async fn list_instances(&self, user_id: &str) -> Result<Vec<AppInstance>, PipelineError> {
    Ok(self.instances.list_instances(user_id).await?)
  }

  /// Uninstall an instance's release and then forget the instance.
  ///
  /// Another user's instance is reported as not found. When the uninstall
  /// fails the record is kept so the removal can be retried.
  pub async fn delete_instance(&self, instance_id: &str, user_id: &str) -> Result<(), PipelineError> {
    let instance = self.instances.get_instance(instance_id, user_id).await?;

    self
      .deployer
      .uninstall(&instance.name, &instance.namespace)
      .await
      .map_err(PipelineError::UninstallFailed)?;

    self.instances.delete_instance(instance_id, user_id).await?;

    info!(
      instance_id,
      release = %instance.name,
      namespace = %instance.namespace,
      "release removed"
    );
    Ok(())
  }
}
