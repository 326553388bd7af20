use std::time::Duration;

/// Outstanding task ids the queue holds before enqueue fails.
pub const DEFAULT_CAPACITY: usize = 100;

/// Upper bound on one deployment.
pub const DEFAULT_DEPLOY_TIMEOUT: Duration = Duration::from_secs(600);

/// How long past the deploy timeout a `running` task must sit untouched
/// before [`TaskQueue::recover`](crate::TaskQueue::recover) treats it as
/// abandoned.
pub const RECOVERY_GRACE: Duration = Duration::from_secs(60);

/// Settings for the task queue and its worker.
#[derive(Debug, Clone)]
pub struct QueueConfig {
  pub capacity: usize,
  pub deploy_timeout: Duration,
}

impl QueueConfig {
  /// Age after which a `running` task cannot belong to a live worker: its
  /// handler would have timed out by then.
  pub fn stale_after(&self) -> Duration {
    self.deploy_timeout + RECOVERY_GRACE
  }
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      capacity: DEFAULT_CAPACITY,
      deploy_timeout: DEFAULT_DEPLOY_TIMEOUT,
    }
  }
}
