//! Task handlers, keyed by task type.

use std::time::Duration;

use appmarket_pipeline::{DeploymentPipeline, DeploymentRequest, PipelineError};
use appmarket_store::{DEPLOY_TASK, Task};
use async_trait::async_trait;
use tracing::debug;

use crate::TaskError;

/// Runs tasks of one type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
  /// The `task_type` this handler accepts.
  fn task_type(&self) -> &str;

  async fn handle(&self, task: &Task) -> Result<(), TaskError>;
}

/// Runs `deploy` tasks through the deployment pipeline.
///
/// A run that exceeds the timeout is dropped mid-flight, which also kills a
/// helm child process and removes any downloaded package.
pub struct DeployHandler {
  pipeline: DeploymentPipeline,
  timeout: Duration,
}

impl DeployHandler {
  pub fn new(pipeline: DeploymentPipeline, timeout: Duration) -> Self {
    Self { pipeline, timeout }
  }
}

#[async_trait]
impl TaskHandler for DeployHandler {
  fn task_type(&self) -> &str {
    DEPLOY_TASK
  }

  async fn handle(&self, task: &Task) -> Result<(), TaskError> {
    let request: DeploymentRequest =
      serde_json::from_value(task.payload.0.clone()).map_err(TaskError::InvalidPayload)?;

    let instance = tokio::time::timeout(self.timeout, self.pipeline.execute(&request))
      .await
      .map_err(|_| PipelineError::Timeout(self.timeout))??;

    debug!(
      task_id = %task.task_id,
      instance_id = %instance.instance_id,
      "deploy task produced instance"
    );
    Ok(())
  }
}
