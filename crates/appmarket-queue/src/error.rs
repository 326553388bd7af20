//! Error types for the task queue.

use appmarket_pipeline::PipelineError;
use appmarket_store::StoreError;
use thiserror::Error;

/// Errors returned to callers of [`TaskQueue`](crate::TaskQueue).
#[derive(Debug, Error)]
pub enum QueueError {
  /// The queue is at capacity. The task was persisted and stays pending.
  #[error("task queue is full, task {task_id} was not scheduled")]
  QueueFull { task_id: String },

  /// The task does not exist.
  #[error("task not found: {0}")]
  NotFound(String),

  /// The task belongs to another user.
  #[error("task {task_id} belongs to another user")]
  Forbidden { task_id: String },

  /// The worker is gone and nothing will drain the queue.
  #[error("task queue is closed")]
  Closed,

  /// The request could not be encoded as a task payload.
  #[error("invalid request: {0}")]
  InvalidRequest(#[from] serde_json::Error),

  /// Reading or writing task records failed.
  #[error("store error: {0}")]
  Store(StoreError),
}

impl From<StoreError> for QueueError {
  fn from(err: StoreError) -> Self {
    match err {
      StoreError::NotFound(what) => QueueError::NotFound(what),
      other => QueueError::Store(other),
    }
  }
}

/// Why a task ended in `failed`. The display text becomes the task result.
#[derive(Debug, Error)]
pub enum TaskError {
  /// The deployment itself failed.
  #[error(transparent)]
  Pipeline(#[from] PipelineError),

  /// The payload does not decode into what the handler expects.
  #[error("invalid task payload: {0}")]
  InvalidPayload(#[source] serde_json::Error),

  /// No handler is registered for the task type.
  #[error("unsupported task type: {0}")]
  UnsupportedType(String),

  /// The handler panicked.
  #[error("task handler panicked: {0}")]
  Panicked(String),
}
