use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::{
  AppInstance, ChartCatalog, ChartPolicy, ChartVersionRecord, InstanceStore, StoreError, Task,
  TaskStatus, TaskStore, instance_not_found, task_not_found, version_not_found,
};

/// Timestamps are stored as fixed-width RFC 3339 text so that ordering by
/// the column is chronological.
fn timestamp(at: &DateTime<Utc>) -> String {
  at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// SQLite-based store implementation.
#[derive(Debug, Clone)]
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if needed) the database at `url` and run migrations.
  ///
  /// `sqlite::memory:` is pinned to a single connection so every query sees
  /// the same database.
  pub async fn connect(url: &str) -> Result<Self, StoreError> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
      .max_connections(max_connections)
      .connect_with(options)
      .await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }
}

#[async_trait]
impl TaskStore for SqliteStore {
  async fn create_task(&self, task: &Task) -> Result<(), StoreError> {
    sqlx::query(
      r#"
            INSERT INTO tasks (task_id, task_type, status, payload, result, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&task.task_id)
    .bind(&task.task_type)
    .bind(task.status)
    .bind(&task.payload)
    .bind(&task.result)
    .bind(&task.user_id)
    .bind(timestamp(&task.created_at))
    .bind(timestamp(&task.updated_at))
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_task(&self, task_id: &str) -> Result<Task, StoreError> {
    sqlx::query_as(
      r#"
            SELECT task_id, task_type, status, payload, result, user_id, created_at, updated_at
            FROM tasks
            WHERE task_id = ?
            "#,
    )
    .bind(task_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| task_not_found(task_id))
  }

  async fn save_task(&self, task: &Task) -> Result<(), StoreError> {
    let Some(expected) = task.status.predecessor() else {
      let current = self.get_task(&task.task_id).await?;
      return Err(StoreError::InvalidTransition {
        task_id: task.task_id.clone(),
        from: current.status,
        to: task.status,
      });
    };

    // Guarded on the current status so the transition is a single
    // compare-and-set.
    let updated = sqlx::query(
      r#"
            UPDATE tasks
            SET status = ?, result = ?, updated_at = ?
            WHERE task_id = ? AND status = ?
            "#,
    )
    .bind(task.status)
    .bind(&task.result)
    .bind(timestamp(&task.updated_at))
    .bind(&task.task_id)
    .bind(expected)
    .execute(&self.pool)
    .await?;

    if updated.rows_affected() == 0 {
      let current = self.get_task(&task.task_id).await?;
      return Err(StoreError::InvalidTransition {
        task_id: task.task_id.clone(),
        from: current.status,
        to: task.status,
      });
    }

    Ok(())
  }

  async fn list_tasks_for_user(&self, user_id: &str) -> Result<Vec<Task>, StoreError> {
    let tasks = sqlx::query_as(
      r#"
            SELECT task_id, task_type, status, payload, result, user_id, created_at, updated_at
            FROM tasks
            WHERE user_id = ?
            ORDER BY created_at DESC
            "#,
    )
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(tasks)
  }

  async fn list_tasks_with_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError> {
    let tasks = sqlx::query_as(
      r#"
            SELECT task_id, task_type, status, payload, result, user_id, created_at, updated_at
            FROM tasks
            WHERE status = ?
            ORDER BY created_at ASC
            "#,
    )
    .bind(status)
    .fetch_all(&self.pool)
    .await?;

    Ok(tasks)
  }
}

#[async_trait]
impl InstanceStore for SqliteStore {
  async fn create_instance(&self, instance: &AppInstance) -> Result<(), StoreError> {
    sqlx::query(
      r#"
            INSERT INTO app_instances (instance_id, name, namespace, user_id, chart_id, chart_version, status, applied_values, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&instance.instance_id)
    .bind(&instance.name)
    .bind(&instance.namespace)
    .bind(&instance.user_id)
    .bind(&instance.chart_id)
    .bind(&instance.chart_version)
    .bind(instance.status)
    .bind(&instance.applied_values)
    .bind(timestamp(&instance.created_at))
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn get_instance(
    &self,
    instance_id: &str,
    user_id: &str,
  ) -> Result<AppInstance, StoreError> {
    sqlx::query_as(
      r#"
            SELECT instance_id, name, namespace, user_id, chart_id, chart_version, status, applied_values, created_at
            FROM app_instances
            WHERE instance_id = ? AND user_id = ?
            "#,
    )
    .bind(instance_id)
    .bind(user_id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| instance_not_found(instance_id))
  }

  async fn list_instances(&self, user_id: &str) -> Result<Vec<AppInstance>, StoreError> {
    let instances = sqlx::query_as(
      r#"
            SELECT instance_id, name, namespace, user_id, chart_id, chart_version, status, applied_values, created_at
            FROM app_instances
            WHERE user_id = ?
            ORDER BY created_at DESC
            "#,
    )
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(instances)
  }

  async fn delete_instance(&self, instance_id: &str, user_id: &str) -> Result<(), StoreError> {
    let deleted = sqlx::query("DELETE FROM app_instances WHERE instance_id = ? AND user_id = ?")
      .bind(instance_id)
      .bind(user_id)
      .execute(&self.pool)
      .await?;

    if deleted.rows_affected() == 0 {
      return Err(instance_not_found(instance_id));
    }

    Ok(())
  }
}

#[async_trait]
impl ChartCatalog for SqliteStore {
  async fn get_version(
    &self,
    chart_id: &str,
    version: &str,
  ) -> Result<ChartVersionRecord, StoreError> {
    sqlx::query_as(
      r#"
            SELECT chart_id, version, app_version, digest, default_values, local_path, urls
            FROM chart_versions
            WHERE chart_id = ? AND version = ?
            "#,
    )
    .bind(chart_id)
    .bind(version)
    .fetch_optional(&self.pool)
    .await?
    .ok_or_else(|| version_not_found(chart_id, version))
  }

  async fn get_policy(&self, chart_id: &str, version: &str) -> Result<ChartPolicy, StoreError> {
    let policy: Option<ChartPolicy> = sqlx::query_as(
      r#"
            SELECT chart_id, version, description, default_values, required_keys, visible_keys, fixed_keys
            FROM chart_policies
            WHERE chart_id = ? AND version = ?
            "#,
    )
    .bind(chart_id)
    .bind(version)
    .fetch_optional(&self.pool)
    .await?;

    Ok(policy.unwrap_or_else(|| ChartPolicy::empty(chart_id, version)))
  }

  async fn put_version(&self, record: &ChartVersionRecord) -> Result<(), StoreError> {
    sqlx::query(
      r#"
            INSERT OR REPLACE INTO chart_versions (chart_id, version, app_version, digest, default_values, local_path, urls)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&record.chart_id)
    .bind(&record.version)
    .bind(&record.app_version)
    .bind(&record.digest)
    .bind(&record.default_values)
    .bind(&record.local_path)
    .bind(&record.urls)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn put_policy(&self, policy: &ChartPolicy) -> Result<(), StoreError> {
    sqlx::query(
      r#"
            INSERT OR REPLACE INTO chart_policies (chart_id, version, description, default_values, required_keys, visible_keys, fixed_keys)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&policy.chart_id)
    .bind(&policy.version)
    .bind(&policy.description)
    .bind(&policy.default_values)
    .bind(&policy.required_keys)
    .bind(&policy.visible_keys)
    .bind(&policy.fixed_keys)
    .execute(&self.pool)
    .await?;

    Ok(())
  }
}
