//! Background worker that drains the task queue.
//!
//! Tasks run one at a time in the order their ids were queued. A failing or
//! panicking handler fails its task and the loop moves on.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use appmarket_store::{TaskStatus, TaskStore};
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{NoopNotifier, TaskError, TaskEvent, TaskHandler, TaskNotifier};

/// Result written to tasks that complete.
pub const SUCCESS_RESULT: &str = "Success";

/// The single consumer of a [`TaskQueue`](crate::TaskQueue).
///
/// Generic over `N: TaskNotifier` so callers can observe task outcomes.
pub struct Worker<N: TaskNotifier = NoopNotifier> {
  receiver: mpsc::Receiver<String>,
  tasks: Arc<dyn TaskStore>,
  handlers: HashMap<String, Arc<dyn TaskHandler>>,
  notifier: N,
}

impl Worker<NoopNotifier> {
  pub(crate) fn new(receiver: mpsc::Receiver<String>, tasks: Arc<dyn TaskStore>) -> Self {
    Self {
      receiver,
      tasks,
      handlers: HashMap::new(),
      notifier: NoopNotifier,
    }
  }
}

impl<N: TaskNotifier> Worker<N> {
  /// Register a handler for its task type, replacing any previous one.
  pub fn with_handler(mut self, handler: impl TaskHandler + 'static) -> Self {
    self
      .handlers
      .insert(handler.task_type().to_string(), Arc::new(handler));
    self
  }

  /// Replace the notifier.
  pub fn with_notifier<M: TaskNotifier>(self, notifier: M) -> Worker<M> {
    Worker {
      receiver: self.receiver,
      tasks: self.tasks,
      handlers: self.handlers,
      notifier,
    }
  }

  /// Run until cancelled or until every [`TaskQueue`](crate::TaskQueue)
  /// handle is dropped.
  ///
  /// Cancellation is checked between tasks; a task already running is
  /// finished first.
  pub async fn start(mut self, cancel: CancellationToken) {
    info!(handlers = self.handlers.len(), "starting task worker");

    loop {
      tokio::select! {
          biased;
          _ = cancel.cancelled() => {
              info!("task worker cancelled");
              break;
          }
          task_id = self.receiver.recv() => {
              match task_id {
                  Some(task_id) => self.process(&task_id).await,
                  None => {
                      info!("task queue closed, worker stopping");
                      break;
                  }
              }
          }
      }
    }
  }

  /// Take one task from pending to a terminal state.
  async fn process(&self, task_id: &str) {
    let mut task = match self.tasks.get_task(task_id).await {
      Ok(task) => task,
      Err(e) => {
        error!(task_id, error = %e, "failed to load task, skipping");
        self.skip(task_id, e.to_string());
        return;
      }
    };

    task.transition(TaskStatus::Running, "");
    if let Err(e) = self.tasks.save_task(&task).await {
      error!(task_id, error = %e, "failed to mark task running, skipping");
      self.skip(task_id, e.to_string());
      return;
    }

    info!(task_id, task_type = %task.task_type, "task running");
    self.notifier.notify(TaskEvent::Started {
      task_id: task_id.to_string(),
    });

    let outcome = match self.handlers.get(&task.task_type) {
      Some(handler) => AssertUnwindSafe(handler.handle(&task))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(TaskError::Panicked(panic_message(panic)))),
      None => Err(TaskError::UnsupportedType(task.task_type.clone())),
    };

    let event = match outcome {
      Ok(()) => {
        task.transition(TaskStatus::Completed, SUCCESS_RESULT);
        info!(task_id, "task completed");
        TaskEvent::Completed {
          task_id: task_id.to_string(),
        }
      }
      Err(e) => {
        let message = e.to_string();
        warn!(task_id, error = %message, "task failed");
        task.transition(TaskStatus::Failed, message.clone());
        TaskEvent::Failed {
          task_id: task_id.to_string(),
          error: message,
        }
      }
    };

    // An outcome that did not reach the store is reported as a failure, never
    // as a completion. The task stays as the store has it.
    let event = match self.tasks.save_task(&task).await {
      Ok(()) => event,
      Err(e) => {
        error!(task_id, status = %task.status, error = %e, "failed to persist task outcome");
        TaskEvent::Failed {
          task_id: task_id.to_string(),
          error: format!("failed to save {} outcome: {e}", task.status),
        }
      }
    };
    self.notifier.notify(event);
  }

  fn skip(&self, task_id: &str, error: String) {
    self.notifier.notify(TaskEvent::Skipped {
      task_id: task_id.to_string(),
      error,
    });
  }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}
