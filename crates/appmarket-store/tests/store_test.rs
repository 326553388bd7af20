//! Behaviour shared by every store backend, run against both SQLite and memory.

use appmarket_store::{
  AppInstance, ChartCatalog, ChartPolicy, ChartVersionRecord, DEPLOY_TASK, InstanceStatus,
  InstanceStore, MemoryStore, SqliteStore, StoreError, Task, TaskStatus, TaskStore,
};
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use sqlx::types::Json;

async fn sqlite() -> SqliteStore {
  SqliteStore::connect("sqlite::memory:")
    .await
    .expect("failed to open in-memory sqlite")
}

fn instance(id: &str, user: &str) -> AppInstance {
  AppInstance {
    instance_id: id.to_string(),
    name: format!("release-{id}"),
    namespace: "default".to_string(),
    user_id: user.to_string(),
    chart_id: "nginx".to_string(),
    chart_version: "1.0.0".to_string(),
    status: InstanceStatus::Deployed,
    applied_values: Json(json!({"replicaCount": 2}).as_object().cloned().unwrap()),
    created_at: Utc::now(),
  }
}

async fn task_lifecycle(store: &dyn TaskStore) {
  let mut task = Task::new(DEPLOY_TASK, "alice", json!({"chart_id": "nginx"}));
  store.create_task(&task).await.unwrap();

  let loaded = store.get_task(&task.task_id).await.unwrap();
  assert_eq!(loaded.status, TaskStatus::Pending);
  assert_eq!(loaded.payload.0, json!({"chart_id": "nginx"}));
  assert!(loaded.result.is_empty());

  task.transition(TaskStatus::Running, "");
  store.save_task(&task).await.unwrap();

  task.transition(TaskStatus::Failed, "helm install failed");
  store.save_task(&task).await.unwrap();

  let loaded = store.get_task(&task.task_id).await.unwrap();
  assert_eq!(loaded.status, TaskStatus::Failed);
  assert_eq!(loaded.result, "helm install failed");
  assert_eq!(loaded.payload.0, json!({"chart_id": "nginx"}));

  // Terminal tasks never move again.
  task.status = TaskStatus::Running;
  let err = store.save_task(&task).await.unwrap_err();
  assert!(matches!(
    err,
    StoreError::InvalidTransition {
      from: TaskStatus::Failed,
      to: TaskStatus::Running,
      ..
    }
  ));

  task.status = TaskStatus::Pending;
  assert!(matches!(
    store.save_task(&task).await,
    Err(StoreError::InvalidTransition { .. })
  ));

  let loaded = store.get_task(&task.task_id).await.unwrap();
  assert_eq!(loaded.status, TaskStatus::Failed);
}

async fn task_cannot_skip_running(store: &dyn TaskStore) {
  let mut task = Task::new(DEPLOY_TASK, "alice", json!({}));
  store.create_task(&task).await.unwrap();

  task.status = TaskStatus::Completed;
  task.result = "Success".to_string();
  assert!(matches!(
    store.save_task(&task).await,
    Err(StoreError::InvalidTransition {
      from: TaskStatus::Pending,
      ..
    })
  ));
}

async fn task_queries(store: &dyn TaskStore) {
  let mut older = Task::new(DEPLOY_TASK, "bob", json!({}));
  older.created_at = Utc::now() - Duration::seconds(60);
  older.updated_at = older.created_at;
  let newer = Task::new(DEPLOY_TASK, "bob", json!({}));
  let other = Task::new(DEPLOY_TASK, "carol", json!({}));

  for t in [&older, &newer, &other] {
    store.create_task(t).await.unwrap();
  }

  let bobs = store.list_tasks_for_user("bob").await.unwrap();
  let ids: Vec<&str> = bobs.iter().map(|t| t.task_id.as_str()).collect();
  assert_eq!(ids, vec![newer.task_id.as_str(), older.task_id.as_str()]);

  let pending = store
    .list_tasks_with_status(TaskStatus::Pending)
    .await
    .unwrap();
  assert_eq!(pending.len(), 3);
  assert_eq!(pending[0].task_id, older.task_id);

  assert!(matches!(
    store.get_task("missing").await,
    Err(StoreError::NotFound(_))
  ));
}

async fn task_order_within_a_second(store: &dyn TaskStore) {
  let base = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
  // Whole second, then fractions with differing digit counts.
  let offsets = [
    Duration::zero(),
    Duration::milliseconds(450),
    Duration::milliseconds(500),
    Duration::milliseconds(500) + Duration::nanoseconds(7),
    Duration::seconds(1),
  ];

  let mut tasks: Vec<Task> = offsets
    .iter()
    .map(|offset| {
      let mut task = Task::new(DEPLOY_TASK, "dora", json!({}));
      task.created_at = base + *offset;
      task.updated_at = task.created_at;
      task
    })
    .collect();
  for i in [3, 0, 4, 2, 1] {
    store.create_task(&tasks[i]).await.unwrap();
  }

  let oldest_first: Vec<String> = store
    .list_tasks_with_status(TaskStatus::Pending)
    .await
    .unwrap()
    .into_iter()
    .map(|t| t.task_id)
    .collect();
  let expected: Vec<String> = tasks.iter().map(|t| t.task_id.clone()).collect();
  assert_eq!(oldest_first, expected);

  tasks.reverse();
  let newest_first: Vec<String> = store
    .list_tasks_for_user("dora")
    .await
    .unwrap()
    .into_iter()
    .map(|t| t.task_id)
    .collect();
  let expected: Vec<String> = tasks.iter().map(|t| t.task_id.clone()).collect();
  assert_eq!(newest_first, expected);

  // Stored timestamps keep full precision.
  let stored = store.get_task(&tasks[1].task_id).await.unwrap();
  assert_eq!(stored.created_at, tasks[1].created_at);
}

async fn instance_scoping(store: &dyn InstanceStore) {
  store.create_instance(&instance("i-1", "alice")).await.unwrap();
  store.create_instance(&instance("i-2", "bob")).await.unwrap();

  let alices = store.list_instances("alice").await.unwrap();
  assert_eq!(alices.len(), 1);
  assert_eq!(alices[0].applied_values.0["replicaCount"], 2);

  assert!(matches!(
    store.get_instance("i-2", "alice").await,
    Err(StoreError::NotFound(_))
  ));
  assert!(matches!(
    store.delete_instance("i-2", "alice").await,
    Err(StoreError::NotFound(_))
  ));

  store.delete_instance("i-2", "bob").await.unwrap();
  assert!(store.list_instances("bob").await.unwrap().is_empty());
}

async fn catalog_round_trip(store: &dyn ChartCatalog) {
  assert!(matches!(
    store.get_version("nginx", "1.0.0").await,
    Err(StoreError::NotFound(_))
  ));

  let policy = store.get_policy("nginx", "1.0.0").await.unwrap();
  assert_eq!(policy, ChartPolicy::empty("nginx", "1.0.0"));

  let mut record = ChartVersionRecord::new("nginx", "1.0.0");
  record.urls = Json(vec!["https://charts.example.com/nginx-1.0.0.tgz".to_string()]);
  record.default_values = Json(json!({"image": {"tag": "1.25"}}).as_object().cloned().unwrap());
  store.put_version(&record).await.unwrap();
  assert_eq!(store.get_version("nginx", "1.0.0").await.unwrap(), record);

  record.local_path = Some("/charts/nginx/1.0.0.tgz".to_string());
  store.put_version(&record).await.unwrap();
  assert_eq!(
    store
      .get_version("nginx", "1.0.0")
      .await
      .unwrap()
      .local_path
      .as_deref(),
    Some("/charts/nginx/1.0.0.tgz")
  );

  let mut policy = ChartPolicy::empty("nginx", "1.0.0");
  policy.required_keys = Json(vec!["image.repository".to_string()]);
  store.put_policy(&policy).await.unwrap();
  assert_eq!(store.get_policy("nginx", "1.0.0").await.unwrap(), policy);
}

#[tokio::test]
async fn test_sqlite_task_lifecycle() {
  task_lifecycle(&sqlite().await).await;
}

#[tokio::test]
async fn test_memory_task_lifecycle() {
  task_lifecycle(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_task_cannot_skip_running() {
  task_cannot_skip_running(&sqlite().await).await;
}

#[tokio::test]
async fn test_memory_task_cannot_skip_running() {
  task_cannot_skip_running(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_task_queries() {
  task_queries(&sqlite().await).await;
}

#[tokio::test]
async fn test_memory_task_queries() {
  task_queries(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_task_order_within_a_second() {
  task_order_within_a_second(&sqlite().await).await;
}

#[tokio::test]
async fn test_memory_task_order_within_a_second() {
  task_order_within_a_second(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_instance_scoping() {
  instance_scoping(&sqlite().await).await;
}

#[tokio::test]
async fn test_memory_instance_scoping() {
  instance_scoping(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_sqlite_catalog_round_trip() {
  catalog_round_trip(&sqlite().await).await;
}

#[tokio::test]
async fn test_memory_catalog_round_trip() {
  catalog_round_trip(&MemoryStore::new()).await;
}
