//! Appmarket Pipeline
//!
//! Turns a [`DeploymentRequest`] into an installed release and a persisted
//! [`AppInstance`](appmarket_store::AppInstance).
//!
//! ```text
//! ChartCatalog ──► validate ──► merge ──► ArtifactResolver ──► Deployer ──► InstanceStore
//!  version+policy  user values  chart<admin<user   local | download   install     applied values
//! ```
//!
//! [`DeploymentPipeline`] runs that sequence once per request and stops at the
//! first failure. [`DeploymentService`] covers the synchronous instance
//! operations: listing a user's releases and uninstalling one.

mod error;
mod pipeline;
mod request;
mod service;

pub use error::PipelineError;
pub use pipeline::DeploymentPipeline;
pub use request::DeploymentRequest;
pub use service::DeploymentService;
