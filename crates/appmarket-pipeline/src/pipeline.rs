//! The deployment sequence.

use std::sync::Arc;

use appmarket_artifact::ArtifactResolver;
use appmarket_deployer::Deployer;
use appmarket_store::{AppInstance, ChartCatalog, InstanceStore};
use appmarket_values::{ValidationError, merge, pin_paths, validate_required};
use tracing::{debug, info, warn};

use crate::{DeploymentRequest, PipelineError};

/// Deploys one chart version per call.
///
/// Every collaborator sits behind a trait object so the pipeline can run
/// against SQLite and helm in production and in-memory doubles in tests.
#[derive(Clone)]
pub struct DeploymentPipeline {
  catalog: Arc<dyn ChartCatalog>,
  instances: Arc<dyn InstanceStore>,
  resolver: Arc<dyn ArtifactResolver>,
  deployer: Arc<dyn Deployer>,
}

impl DeploymentPipeline {
  pub fn new(
    catalog: Arc<dyn ChartCatalog>,
    instances: Arc<dyn InstanceStore>,
    resolver: Arc<dyn ArtifactResolver>,
    deployer: Arc<dyn Deployer>,
  ) -> Self {
    Self {
      catalog,
      instances,
      resolver,
      deployer,
    }
  }

  /// Deploy `request` and record the resulting instance.
  ///
  /// Steps run in order and the first failure ends the run:
  /// 1. load the chart version (missing is [`PipelineError::NotFound`])
  /// 2. load the admin policy, empty when none is configured
  /// 3. check the policy's required keys against the user values only
  /// 4. merge chart defaults, admin defaults and user values
  /// 5. resolve the chart package
  /// 6. install
  /// 7. persist the instance with the merged values
  ///
  /// A downloaded package is deleted before this returns, on success and on
  /// every failure after step 5. If the returned future is dropped mid-run the
  /// package is deleted with it.
  pub async fn execute(&self, request: &DeploymentRequest) -> Result<AppInstance, PipelineError> {
    let record = self
      .catalog
      .get_version(&request.chart_id, &request.version)
      .await?;
    let policy = self
      .catalog
      .get_policy(&request.chart_id, &request.version)
      .await?;

    if !policy.required_keys.is_empty() {
      validate_required(&request.user_values, &policy.required_keys).map_err(
        |ValidationError::MissingKeys { missing }| PipelineError::ValidationFailed { missing },
      )?;
    }

    let mut values = merge(
      &record.default_values,
      &policy.default_values,
      &request.user_values,
    )?;
    if request.quick_mode {
      pin_paths(&mut values, &policy.default_values, &policy.fixed_keys);
    }

    debug!(
      chart_id = %request.chart_id,
      version = %request.version,
      "resolving chart package"
    );
    let artifact = self.resolver.resolve(&record).await?;

    info!(
      chart_id = %request.chart_id,
      version = %request.version,
      release = %request.release_name,
      namespace = %request.namespace,
      "installing release"
    );
    let installed = self
      .deployer
      .install(
        &request.release_name,
        &request.namespace,
        artifact.path(),
        &values,
      )
      .await;

    if let Err(e) = artifact.cleanup() {
      warn!(release = %request.release_name, error = %e, "failed to remove downloaded chart package");
    }
    installed.map_err(PipelineError::InstallFailed)?;

    let instance = AppInstance::deployed(
      &request.release_name,
      &request.namespace,
      &request.user_id,
      &request.chart_id,
      &request.version,
      values,
    );
    self.instances.create_instance(&instance).await?;

    info!(
      instance_id = %instance.instance_id,
      release = %instance.name,
      namespace = %instance.namespace,
      "release deployed"
    );
    Ok(instance)
  }
}
