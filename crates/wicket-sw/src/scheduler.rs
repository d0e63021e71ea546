//! Deferred notifications with cancellable handles.
//!
//! Tasks live only in memory; if the worker process ends before a deadline
//! the notification is never shown.

use crate::error::{ServiceWorkerError, SwResult};
use crate::notification::{NotificationDescriptor, NotificationPort};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// Unique identifier for a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where a scheduled task is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Fired,
    Cancelled,
}

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Handle to a deferred notification.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    id: TaskId,
    delay: Duration,
    tag: String,
    state: Arc<AtomicU8>,
    abort: AbortHandle,
}

impl ScheduledTask {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Tag of the notification this task will show.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn state(&self) -> TaskState {
        match self.state.load(Ordering::Acquire) {
            PENDING => TaskState::Pending,
            FIRED => TaskState::Fired,
            _ => TaskState::Cancelled,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == TaskState::Pending
    }

    /// Cancel the task. Returns false if it already fired or was cancelled.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cancelled {
            self.abort.abort();
            debug!(task = ?self.id, tag = %self.tag, "Cancelled scheduled notification");
        }
        cancelled
    }
}

/// Runs deferred notifications on the current tokio runtime.
pub struct ReminderScheduler {
    notifications: Arc<dyn NotificationPort>,
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl ReminderScheduler {
    pub fn new(notifications: Arc<dyn NotificationPort>) -> Self {
        Self {
            notifications,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Show `notification` after `delay`.
    pub async fn schedule(
        &self,
        delay: Duration,
        notification: NotificationDescriptor,
    ) -> SwResult<ScheduledTask> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ServiceWorkerError::State(format!("no runtime for timer: {}", e)))?;

        let id = TaskId::new();
        let tag = notification.tag.clone();
        let state = Arc::new(AtomicU8::new(PENDING));
        let port = Arc::clone(&self.notifications);
        let task_state = Arc::clone(&state);

        let join = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if task_state
                .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }
            let tag = notification.tag.clone();
            match port.show(notification).await {
                Ok(()) => debug!(task = ?id, %tag, "Scheduled notification shown"),
                Err(err) => warn!(task = ?id, %tag, error = %err, "Scheduled notification failed"),
            }
        });

        let task = ScheduledTask {
            id,
            delay,
            tag,
            state,
            abort: join.abort_handle(),
        };
        debug!(task = ?id, ?delay, tag = %task.tag, "Scheduled notification");

        let mut tasks = self.tasks.lock().await;
        tasks.retain(ScheduledTask::is_pending);
        tasks.push(task.clone());
        Ok(task)
    }

    /// Tasks that have neither fired nor been cancelled.
    pub async fn pending(&self) -> Vec<ScheduledTask> {
        self.tasks
            .lock()
            .await
            .iter()
            .filter(|t| t.is_pending())
            .cloned()
            .collect()
    }

    /// Cancel every pending task. Returns how many were cancelled.
    pub async fn cancel_all(&self) -> usize {
        let mut tasks = self.tasks.lock().await;
        let cancelled = tasks.iter().filter(|t| t.cancel()).count();
        tasks.clear();
        cancelled
    }
}
