//! Appmarket Queue
//!
//! Asynchronous deployment tasks backed by a durable task store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TaskQueue                            │
//! │  - enqueue(user, request) persists a pending task           │
//! │  - pushes the task id onto a bounded channel (fails fast)   │
//! │  - get_task / list_tasks / recover(stale_after)             │
//! └─────────────────────────────────────────────────────────────┘
//!                               │ task ids, FIFO
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Worker                              │
//! │  - one task at a time                                       │
//! │  - pending → running → completed | failed                   │
//! │  - dispatches by task type to a TaskHandler                 │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      DeployHandler                          │
//! │  - DeploymentPipeline::execute under a timeout              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let config = QueueConfig::default();
//! let (queue, worker) = TaskQueue::new(store.clone(), config.capacity);
//! let worker = worker.with_handler(DeployHandler::new(pipeline, config.deploy_timeout));
//!
//! let cancel = CancellationToken::new();
//! tokio::spawn(worker.start(cancel.clone()));
//!
//! let task = queue.enqueue("alice", &request).await?;
//! ```

mod config;
mod error;
mod events;
mod handler;
mod queue;
mod worker;

pub use config::{DEFAULT_CAPACITY, DEFAULT_DEPLOY_TIMEOUT, QueueConfig, RECOVERY_GRACE};
pub use error::{QueueError, TaskError};
pub use events::{ChannelNotifier, NoopNotifier, TaskEvent, TaskNotifier, final_event};
pub use handler::{DeployHandler, TaskHandler};
pub use queue::{INTERRUPTED_RESULT, TaskQueue};
pub use worker::{SUCCESS_RESULT, Worker};
