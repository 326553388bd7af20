//! In-memory store for testing.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::{
  AppInstance, ChartCatalog, ChartPolicy, ChartVersionRecord, InstanceStore, StoreError, Task,
  TaskStatus, TaskStore, instance_not_found, task_not_found, version_not_found,
};

type ChartKey = (String, String);

/// In-memory implementation of every store trait.
///
/// Data is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
  tasks: RwLock<HashMap<String, Task>>,
  instances: RwLock<HashMap<String, AppInstance>>,
  versions: RwLock<HashMap<ChartKey, ChartVersionRecord>>,
  policies: RwLock<HashMap<ChartKey, ChartPolicy>>,
}

impl MemoryStore {
  /// Create a new empty in-memory store.
  pub fn new() -> Self {
    Self::default()
  }
}

fn poisoned<T>(_: T) -> StoreError {
  StoreError::Internal("lock poisoned".to_string())
}

fn chart_key(chart_id: &str, version: &str) -> ChartKey {
  (chart_id.to_string(), version.to_string())
}

#[async_trait]
impl TaskStore for MemoryStore {
  async fn create_task(&self, task: &Task) -> Result<(), StoreError> {
    let mut tasks = self.tasks.write().map_err(poisoned)?;
    if tasks.contains_key(&task.task_id) {
      return Err(StoreError::Internal(format!(
        "task {} already exists",
        task.task_id
      )));
    }
    tasks.insert(task.task_id.clone(), task.clone());
    Ok(())
  }

  async fn get_task(&self, task_id: &str) -> Result<Task, StoreError> {
    let tasks = self.tasks.read().map_err(poisoned)?;
    tasks
      .get(task_id)
      .cloned()
      .ok_or_else(|| task_not_found(task_id))
  }

  async fn save_task(&self, task: &Task) -> Result<(), StoreError> {
    let mut tasks = self.tasks.write().map_err(poisoned)?;
    let stored = tasks
      .get_mut(&task.task_id)
      .ok_or_else(|| task_not_found(&task.task_id))?;

    if task.status.predecessor() != Some(stored.status) {
      return Err(StoreError::InvalidTransition {
        task_id: task.task_id.clone(),
        from: stored.status,
        to: task.status,
      });
    }

    stored.status = task.status;
    stored.result = task.result.clone();
    stored.updated_at = task.updated_at;
    Ok(())
  }

  async fn list_tasks_for_user(&self, user_id: &str) -> Result<Vec<Task>, StoreError> {
    let tasks = self.tasks.read().map_err(poisoned)?;
    let mut results: Vec<Task> = tasks
      .values()
      .filter(|t| t.user_id == user_id)
      .cloned()
      .collect();
    results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(results)
  }

  async fn list_tasks_with_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError> {
    let tasks = self.tasks.read().map_err(poisoned)?;
    let mut results: Vec<Task> = tasks
      .values()
      .filter(|t| t.status == status)
      .cloned()
      .collect();
    results.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(results)
  }
}

#[async_trait]
impl InstanceStore for MemoryStore {
  async fn create_instance(&self, instance: &AppInstance) -> Result<(), StoreError> {
    let mut instances = self.instances.write().map_err(poisoned)?;
    instances.insert(instance.instance_id.clone(), instance.clone());
    Ok(())
  }

  async fn get_instance(
    &self,
    instance_id: &str,
    user_id: &str,
  ) -> Result<AppInstance, StoreError> {
    let instances = self.instances.read().map_err(poisoned)?;
    instances
      .get(instance_id)
      .filter(|i| i.user_id == user_id)
      .cloned()
      .ok_or_else(|| instance_not_found(instance_id))
  }

  async fn list_instances(&self, user_id: &str) -> Result<Vec<AppInstance>, StoreError> {
    let instances = self.instances.read().map_err(poisoned)?;
    let mut results: Vec<AppInstance> = instances
      .values()
      .filter(|i| i.user_id == user_id)
      .cloned()
      .collect();
    results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(results)
  }

  async fn delete_instance(&self, instance_id: &str, user_id: &str) -> Result<(), StoreError> {
    let mut instances = self.instances.write().map_err(poisoned)?;
    let owned = instances
      .get(instance_id)
      .is_some_and(|i| i.user_id == user_id);
    if !owned {
      return Err(instance_not_found(instance_id));
    }
    instances.remove(instance_id);
    Ok(())
  }
}

#[async_trait]
impl ChartCatalog for MemoryStore {
  async fn get_version(
    &self,
    chart_id: &str,
    version: &str,
  ) -> Result<ChartVersionRecord, StoreError> {
    let versions = self.versions.read().map_err(poisoned)?;
    versions
      .get(&chart_key(chart_id, version))
      .cloned()
      .ok_or_else(|| version_not_found(chart_id, version))
  }

  async fn get_policy(&self, chart_id: &str, version: &str) -> Result<ChartPolicy, StoreError> {
    let policies = self.policies.read().map_err(poisoned)?;
    Ok(
      policies
        .get(&chart_key(chart_id, version))
        .cloned()
        .unwrap_or_else(|| ChartPolicy::empty(chart_id, version)),
    )
  }

  async fn put_version(&self, record: &ChartVersionRecord) -> Result<(), StoreError> {
    let mut versions = self.versions.write().map_err(poisoned)?;
    versions.insert(
      chart_key(&record.chart_id, &record.version),
      record.clone(),
    );
    Ok(())
  }

  async fn put_policy(&self, policy: &ChartPolicy) -> Result<(), StoreError> {
    let mut policies = self.policies.write().map_err(poisoned)?;
    policies.insert(
      chart_key(&policy.chart_id, &policy.version),
      policy.clone(),
    );
    Ok(())
  }
}
