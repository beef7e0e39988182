//! Scheduled-callback collaborator.
//!
//! Loan deadlines are enforced by an external relay that calls the callback
//! endpoint back at the deadline. The engine only sees [`CallbackScheduler`];
//! registration failures degrade to a [`ScheduleHandle::Degraded`] handle
//! instead of failing the surrounding operation.

mod http;

pub use http::HttpCallbackScheduler;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::SchedulerError;

/// Handle to a scheduled deadline callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScheduleHandle {
    /// Registered with the relay under this message id
    Live { id: String },
    /// Registration failed; the deadline will not fire
    Degraded { reason: String },
}

impl ScheduleHandle {
    pub fn live(id: impl Into<String>) -> Self {
        ScheduleHandle::Live { id: id.into() }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ScheduleHandle::Live { .. })
    }
}

/// One-shot callback registration.
#[async_trait]
pub trait CallbackScheduler: Send + Sync {
    /// Ask the relay to call back for `task_id` at `fire_at`. Returns the
    /// relay's message id.
    async fn schedule(&self, task_id: &str, fire_at: DateTime<Utc>)
        -> Result<String, SchedulerError>;

    /// Cancel a previously returned message id.
    async fn cancel(&self, message_id: &str) -> Result<(), SchedulerError>;
}

/// Schedule a callback, degrading instead of failing.
///
/// The error, if any, is returned alongside the degraded handle so the
/// caller can surface it as a warning.
pub async fn schedule_or_degrade(
    scheduler: &dyn CallbackScheduler,
    task_id: &str,
    fire_at: DateTime<Utc>,
) -> (ScheduleHandle, Option<SchedulerError>) {
    match scheduler.schedule(task_id, fire_at).await {
        Ok(id) => {
            debug!(task_id, message_id = %id, %fire_at, "deadline callback scheduled");
            (ScheduleHandle::live(id), None)
        }
        Err(e) => {
            warn!(task_id, error = %e, "deadline callback not scheduled; deadline will not be enforced");
            (
                ScheduleHandle::Degraded {
                    reason: e.to_string(),
                },
                Some(e),
            )
        }
    }
}

/// Cancel a handle. Degraded handles are skipped and relay errors are
/// logged, never returned.
pub async fn cancel_best_effort(scheduler: &dyn CallbackScheduler, handle: &ScheduleHandle) {
    let ScheduleHandle::Live { id } = handle else {
        return;
    };
    if let Err(e) = scheduler.cancel(id).await {
        warn!(message_id = %id, error = %e, "failed to cancel deadline callback");
    }
}

/// Scheduler for deployments without a relay. Every handle comes back degraded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

#[async_trait]
impl CallbackScheduler for NoopScheduler {
    async fn schedule(&self, _task_id: &str, _fire_at: DateTime<Utc>) -> Result<String, SchedulerError> {
        Err(SchedulerError::NotConfigured)
    }

    async fn cancel(&self, _message_id: &str) -> Result<(), SchedulerError> {
        Ok(())
    }
}

/// A callback registered with [`InMemoryScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledCallback {
    pub message_id: String,
    pub task_id: String,
    pub fire_at: DateTime<Utc>,
}

/// Recording scheduler with switchable failures.
#[derive(Debug, Default)]
pub struct InMemoryScheduler {
    next_id: AtomicU64,
    fail_schedule: AtomicBool,
    fail_cancel: AtomicBool,
    scheduled: Mutex<Vec<ScheduledCallback>>,
    cancelled: Mutex<Vec<String>>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_schedule(&self, fail: bool) {
        self.fail_schedule.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_cancel(&self, fail: bool) {
        self.fail_cancel.store(fail, Ordering::SeqCst);
    }

    /// Every registration ever made.
    pub fn scheduled(&self) -> Vec<ScheduledCallback> {
        self.scheduled.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Message ids cancelled so far.
    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Registrations not yet cancelled.
    pub fn pending(&self) -> Vec<ScheduledCallback> {
        let cancelled = self.cancelled();
        self.scheduled()
            .into_iter()
            .filter(|cb| !cancelled.contains(&cb.message_id))
            .collect()
    }
}

#[async_trait]
impl CallbackScheduler for InMemoryScheduler {
    async fn schedule(&self, task_id: &str, fire_at: DateTime<Utc>) -> Result<String, SchedulerError> {
        if self.fail_schedule.load(Ordering::SeqCst) {
            return Err(SchedulerError::Rejected {
                status: 503,
                body: "relay unavailable".into(),
            });
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let message_id = format!("msg_{n}");
        self.scheduled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ScheduledCallback {
                message_id: message_id.clone(),
                task_id: task_id.to_string(),
                fire_at,
            });
        Ok(message_id)
    }

    async fn cancel(&self, message_id: &str) -> Result<(), SchedulerError> {
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(SchedulerError::Rejected {
                status: 500,
                body: "cancel failed".into(),
            });
        }
        self.cancelled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message_id.to_string());
        Ok(())
    }
}
