//! The caller-facing side of the task queue.

use std::sync::Arc;
use std::time::Duration;

use appmarket_pipeline::DeploymentRequest;
use appmarket_store::{DEPLOY_TASK, StoreError, Task, TaskStatus, TaskStore};
use chrono::{TimeDelta, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::{QueueError, Worker};

/// Result written to abandoned `running` tasks by [`TaskQueue::recover`].
pub const INTERRUPTED_RESULT: &str = "interrupted: worker restarted before completion";

/// Handle for submitting and looking up tasks.
///
/// Cheap to clone. Enqueue never waits on the worker: when the bounded
/// channel is full it fails immediately with [`QueueError::QueueFull`].
#[derive(Clone)]
pub struct TaskQueue {
  sender: mpsc::Sender<String>,
  tasks: Arc<dyn TaskStore>,
}

impl TaskQueue {
  /// Create a queue holding up to `capacity` task ids, and the worker that
  /// drains it.
  pub fn new(tasks: Arc<dyn TaskStore>, capacity: usize) -> (Self, Worker) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let worker = Worker::new(receiver, tasks.clone());
    (Self { sender, tasks }, worker)
  }

  /// Persist a pending deploy task for `user_id` and schedule it.
  ///
  /// The task is written before it is scheduled. On
  /// [`QueueError::QueueFull`] it stays in the store as `pending` and is never
  /// picked up.
  pub async fn enqueue(
    &self,
    user_id: &str,
    request: &DeploymentRequest,
  ) -> Result<Task, QueueError> {
    let payload = serde_json::to_value(request)?;
    self.submit(Task::new(DEPLOY_TASK, user_id, payload)).await
  }

  /// Persist and schedule an already built task of any type.
  pub async fn submit(&self, task: Task) -> Result<Task, QueueError> {
    self.tasks.create_task(&task).await?;

    match self.sender.try_send(task.task_id.clone()) {
      Ok(()) => {
        info!(
          task_id = %task.task_id,
          task_type = %task.task_type,
          user_id = %task.user_id,
          "task enqueued"
        );
        Ok(task)
      }
      Err(TrySendError::Full(_)) => {
        warn!(task_id = %task.task_id, "task queue full, task left pending");
        Err(QueueError::QueueFull {
          task_id: task.task_id,
        })
      }
      Err(TrySendError::Closed(_)) => {
        warn!(task_id = %task.task_id, "task queue closed, task left pending");
        Err(QueueError::Closed)
      }
    }
  }

  pub async fn get_task(&self, task_id: &str) -> Result<Task, QueueError> {
    Ok(self.tasks.get_task(task_id).await?)
  }

  /// Get a task, refusing tasks owned by another user.
  pub async fn get_task_for_user(&self, task_id: &str, user_id: &str) -> Result<Task, QueueError> {
    let task = self.get_task(task_id).await?;
    if task.user_id != user_id {
      return Err(QueueError::Forbidden {
        task_id: task.task_id,
      });
    }
    Ok(task)
  }

  /// A user's tasks, newest first.
  pub async fn list_tasks(&self, user_id: &str) -> Result<Vec<Task>, QueueError> {
    Ok(self.tasks.list_tasks_for_user(user_id).await?)
  }

  /// Fail tasks left `running` by a worker that is gone.
  ///
  /// Only tasks whose `updated_at` is older than `stale_after` are touched, so
  /// a task another live worker is still running on the same store is left
  /// alone. Pass [`QueueConfig::stale_after`](crate::QueueConfig::stale_after)
  /// so the cutoff outlasts any deployment. Pending tasks are never touched.
  /// Returns the number of tasks failed.
  pub async fn recover(&self, stale_after: Duration) -> Result<usize, QueueError> {
    let Some(cutoff) = TimeDelta::from_std(stale_after)
      .ok()
      .and_then(|age| Utc::now().checked_sub_signed(age))
    else {
      return Ok(0);
    };

    let running = self.tasks.list_tasks_with_status(TaskStatus::Running).await?;
    let mut count = 0;

    for mut task in running.into_iter().filter(|t| t.updated_at < cutoff) {
      task.transition(TaskStatus::Failed, INTERRUPTED_RESULT);
      match self.tasks.save_task(&task).await {
        Ok(()) => {
          warn!(task_id = %task.task_id, "failed task interrupted by restart");
          count += 1;
        }
        // Finished or recovered elsewhere since the listing.
        Err(StoreError::InvalidTransition { .. }) => {
          debug!(task_id = %task.task_id, "task moved on before recovery");
        }
        Err(e) => return Err(e.into()),
      }
    }

    if count > 0 {
      info!(count, "recovered interrupted tasks");
    }
    Ok(count)
  }

  /// Free slots in the queue.
  pub fn available(&self) -> usize {
    self.sender.capacity()
  }
}
