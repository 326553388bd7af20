use appmarket_values::Values;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// Task type for chart deployments.
pub const DEPLOY_TASK: &str = "deploy";

/// Status of an asynchronous task.
///
/// Transitions only move forward: `pending → running → completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TaskStatus {
  Pending,
  Running,
  Completed,
  Failed,
}

impl TaskStatus {
  /// The only status a task may hold immediately before entering `self`.
  ///
  /// `Pending` has no predecessor: tasks are created pending and never
  /// return to it.
  pub fn predecessor(self) -> Option<TaskStatus> {
    match self {
      TaskStatus::Pending => None,
      TaskStatus::Running => Some(TaskStatus::Pending),
      TaskStatus::Completed | TaskStatus::Failed => Some(TaskStatus::Running),
    }
  }

  /// Whether this status is final.
  pub fn is_terminal(self) -> bool {
    matches!(self, TaskStatus::Completed | TaskStatus::Failed)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      TaskStatus::Pending => "pending",
      TaskStatus::Running => "running",
      TaskStatus::Completed => "completed",
      TaskStatus::Failed => "failed",
    }
  }
}

impl std::fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A unit of asynchronous work as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Task {
  pub task_id: String,
  pub task_type: String,
  pub status: TaskStatus,
  /// The request this task was created for. Never changes after creation.
  pub payload: Json<serde_json::Value>,
  /// Outcome text. Empty until the task reaches a terminal status.
  pub result: String,
  pub user_id: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Task {
  /// Create a new pending task with a fresh identifier.
  pub fn new(
    task_type: impl Into<String>,
    user_id: impl Into<String>,
    payload: serde_json::Value,
  ) -> Self {
    let now = Utc::now();
    Self {
      task_id: uuid::Uuid::new_v4().to_string(),
      task_type: task_type.into(),
      status: TaskStatus::Pending,
      payload: Json(payload),
      result: String::new(),
      user_id: user_id.into(),
      created_at: now,
      updated_at: now,
    }
  }

  /// Move to `status` with `result` and bump `updated_at`.
  ///
  /// Only the in-memory copy changes; persist it with
  /// [`TaskStore::save_task`](crate::TaskStore::save_task).
  pub fn transition(&mut self, status: TaskStatus, result: impl Into<String>) {
    self.status = status;
    self.result = result.into();
    self.updated_at = Utc::now();
  }
}

/// Status of a deployed application instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum InstanceStatus {
  Deployed,
}

/// A chart release that was installed successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AppInstance {
  pub instance_id: String,
  /// Release name.
  pub name: String,
  pub namespace: String,
  pub user_id: String,
  pub chart_id: String,
  pub chart_version: String,
  pub status: InstanceStatus,
  /// The fully merged values handed to the deployer.
  pub applied_values: Json<Values>,
  pub created_at: DateTime<Utc>,
}

impl AppInstance {
  /// Record a release that was just installed with `applied_values`.
  pub fn deployed(
    name: impl Into<String>,
    namespace: impl Into<String>,
    user_id: impl Into<String>,
    chart_id: impl Into<String>,
    chart_version: impl Into<String>,
    applied_values: Values,
  ) -> Self {
    Self {
      instance_id: uuid::Uuid::new_v4().to_string(),
      name: name.into(),
      namespace: namespace.into(),
      user_id: user_id.into(),
      chart_id: chart_id.into(),
      chart_version: chart_version.into(),
      status: InstanceStatus::Deployed,
      applied_values: Json(applied_values),
      created_at: Utc::now(),
    }
  }
}

/// One published version of a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ChartVersionRecord {
  pub chart_id: String,
  pub version: String,
  #[serde(default)]
  pub app_version: String,
  #[serde(default)]
  pub digest: String,
  /// Chart author defaults (the chart's own values file).
  #[serde(default)]
  pub default_values: Json<Values>,
  /// Path to a locally stored package, if the chart was uploaded.
  #[serde(default)]
  pub local_path: Option<String>,
  /// Download URLs for the package, if the chart came from a repository index.
  #[serde(default)]
  pub urls: Json<Vec<String>>,
}

impl ChartVersionRecord {
  pub fn new(chart_id: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      chart_id: chart_id.into(),
      version: version.into(),
      app_version: String::new(),
      digest: String::new(),
      default_values: Json(Values::new()),
      local_path: None,
      urls: Json(Vec::new()),
    }
  }
}

/// Administrator policy attached to a chart version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ChartPolicy {
  pub chart_id: String,
  pub version: String,
  #[serde(default)]
  pub description: String,
  /// Admin defaults, layered over the chart defaults.
  #[serde(default)]
  pub default_values: Json<Values>,
  /// Dotted paths the requester must supply.
  #[serde(default)]
  pub required_keys: Json<Vec<String>>,
  /// Dotted paths shown to end users.
  #[serde(default)]
  pub visible_keys: Json<Vec<String>>,
  /// Dotted paths end users may not override in quick mode.
  #[serde(default)]
  pub fixed_keys: Json<Vec<String>>,
}

impl ChartPolicy {
  /// The policy used when an administrator has not configured one.
  pub fn empty(chart_id: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      chart_id: chart_id.into(),
      version: version.into(),
      description: String::new(),
      default_values: Json(Values::new()),
      required_keys: Json(Vec::new()),
      visible_keys: Json(Vec::new()),
      fixed_keys: Json(Vec::new()),
    }
  }
}
