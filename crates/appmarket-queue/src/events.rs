//! Task lifecycle events for observers.
//!
//! The worker emits one event per state change so callers can wait on task
//! outcomes, stream progress, or log them, without polling the store.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskEvent {
  /// The task was marked running.
  Started { task_id: String },

  /// The task finished successfully.
  Completed { task_id: String },

  /// The task finished with an error, or its outcome could not be saved.
  Failed { task_id: String, error: String },

  /// The task could not be loaded or claimed and was not run.
  Skipped { task_id: String, error: String },
}

impl TaskEvent {
  pub fn task_id(&self) -> &str {
    match self {
      TaskEvent::Started { task_id }
      | TaskEvent::Completed { task_id }
      | TaskEvent::Failed { task_id, .. }
      | TaskEvent::Skipped { task_id, .. } => task_id,
    }
  }

  /// Whether the worker is done with the task.
  pub fn is_final(&self) -> bool {
    !matches!(self, TaskEvent::Started { .. })
  }
}

/// Receives task events from the worker.
pub trait TaskNotifier: Send + Sync {
  fn notify(&self, event: TaskEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl TaskNotifier for NoopNotifier {
  fn notify(&self, _event: TaskEvent) {}
}

/// Forwards events to an unbounded channel.
///
/// Unbounded so a slow consumer never stalls the worker; volume is a few
/// events per task.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<TaskEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<TaskEvent>) -> Self {
    Self { sender }
  }
}

impl TaskNotifier for ChannelNotifier {
  fn notify(&self, event: TaskEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

/// Wait for the event that ends `task_id`, discarding everything else.
///
/// Gives up after `limit`. Returns `None` on expiry or if the worker goes
/// away first.
pub async fn final_event(
  events: &mut mpsc::UnboundedReceiver<TaskEvent>,
  task_id: &str,
  limit: Duration,
) -> Option<TaskEvent> {
  let wait = async {
    while let Some(event) = events.recv().await {
      if event.task_id() == task_id && event.is_final() {
        return Some(event);
      }
    }
    None
  };
  tokio::time::timeout(limit, wait).await.ok().flatten()
}
