//! Appmarket Store
//!
//! This crate provides the storage traits and implementations for appmarket.
//! Data is persisted to SQLite; an in-memory implementation backs the tests.
//!
//! Three traits split the storage by concern:
//! - [`TaskStore`]: durable records of asynchronous deployment tasks
//! - [`InstanceStore`]: releases that were installed successfully
//! - [`ChartCatalog`]: chart versions and their administrator policies
//!
//! Every method is individually atomic. In particular [`TaskStore::save_task`]
//! writes status and result in one statement and refuses any transition that
//! does not move the task forward.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use sqlx::types::Json;
pub use types::{
  AppInstance, ChartPolicy, ChartVersionRecord, DEPLOY_TASK, InstanceStatus, Task, TaskStatus,
};

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A task update tried to move the status backwards or skip a step.
  #[error("invalid task transition for {task_id}: {from} -> {to}")]
  InvalidTransition {
    task_id: String,
    from: TaskStatus,
    to: TaskStatus,
  },

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Applying migrations failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  /// In-process store failure.
  #[error("internal error: {0}")]
  Internal(String),
}

/// Storage for task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
  /// Persist a newly created task.
  async fn create_task(&self, task: &Task) -> Result<(), StoreError>;

  /// Get a task by ID.
  async fn get_task(&self, task_id: &str) -> Result<Task, StoreError>;

  /// Persist the task's status, result and update time.
  ///
  /// The stored status must be the predecessor of `task.status`, otherwise
  /// [`StoreError::InvalidTransition`] is returned and nothing is written.
  async fn save_task(&self, task: &Task) -> Result<(), StoreError>;

  /// List a user's tasks, newest first.
  async fn list_tasks_for_user(&self, user_id: &str) -> Result<Vec<Task>, StoreError>;

  /// List all tasks currently in `status`, oldest first.
  async fn list_tasks_with_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError>;
}

/// Storage for deployed application instances.
#[async_trait]
pub trait InstanceStore: Send + Sync {
  /// Persist a new instance.
  async fn create_instance(&self, instance: &AppInstance) -> Result<(), StoreError>;

  /// Get an instance, scoped to its owner.
  async fn get_instance(&self, instance_id: &str, user_id: &str)
  -> Result<AppInstance, StoreError>;

  /// List a user's instances, newest first.
  async fn list_instances(&self, user_id: &str) -> Result<Vec<AppInstance>, StoreError>;

  /// Delete an instance, scoped to its owner.
  async fn delete_instance(&self, instance_id: &str, user_id: &str) -> Result<(), StoreError>;
}

/// Read access to published charts plus the writes used to seed them.
#[async_trait]
pub trait ChartCatalog: Send + Sync {
  /// Get a chart version.
  async fn get_version(&self, chart_id: &str, version: &str)
  -> Result<ChartVersionRecord, StoreError>;

  /// Get the admin policy for a chart version.
  ///
  /// A version without a configured policy yields [`ChartPolicy::empty`].
  async fn get_policy(&self, chart_id: &str, version: &str) -> Result<ChartPolicy, StoreError>;

  /// Insert or replace a chart version.
  async fn put_version(&self, record: &ChartVersionRecord) -> Result<(), StoreError>;

  /// Insert or replace the policy for a chart version.
  async fn put_policy(&self, policy: &ChartPolicy) -> Result<(), StoreError>;
}

pub(crate) fn task_not_found(task_id: &str) -> StoreError {
  StoreError::NotFound(format!("task {task_id}"))
}

pub(crate) fn instance_not_found(instance_id: &str) -> StoreError {
  StoreError::NotFound(format!("instance {instance_id}"))
}

pub(crate) fn version_not_found(chart_id: &str, version: &str) -> StoreError {
  StoreError::NotFound(format!("chart version {chart_id}@{version}"))
}
