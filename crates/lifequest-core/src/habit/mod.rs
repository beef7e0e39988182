//! Recurring commitments: habits and daily quests.
//!
//! Two habit models coexist and are deliberately kept apart:
//! - [`HabitTrigger`]: polarity x outcome table with milestones
//! - [`HabitToggle`]: single-streak mark/undo keyed on calendar days
//!
//! Together with [`DailyToggle`](crate::daily::DailyToggle) they implement
//! [`RecurringCommitment`], which is all the engine needs to drive them.

mod toggle;
mod trigger;

pub use toggle::HabitToggle;
pub use trigger::{HabitTrigger, TriggerOutcome};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CoreError;
use crate::model::{AuditCategory, RecurringTask, TaskKind};
use crate::time::ReferenceZone;

/// "Now" plus the zone used to decide what "today" means.
#[derive(Debug, Clone, Copy)]
pub struct DayContext {
    pub now: DateTime<Utc>,
    pub zone: ReferenceZone,
}

impl DayContext {
    pub fn new(now: DateTime<Utc>, zone: ReferenceZone) -> Self {
        Self { now, zone }
    }
}

/// Effect of one transition on the owning character.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitmentTransition {
    pub experience_delta: i64,
    pub gold_delta: f64,
    /// Health the transition costs
    pub health_penalty: u32,
    /// Whether `health_penalty` is applied or only reported
    pub apply_health: bool,
    /// Label of a milestone unlocked by this transition
    pub milestone: Option<String>,
    pub category: AuditCategory,
    pub message: String,
}

impl CommitmentTransition {
    pub(crate) fn reward(
        experience_delta: i64,
        gold_delta: f64,
        category: AuditCategory,
        message: String,
    ) -> Self {
        Self {
            experience_delta,
            gold_delta,
            health_penalty: 0,
            apply_health: false,
            milestone: None,
            category,
            message,
        }
    }
}

/// A state machine over one [`RecurringTask`].
pub trait RecurringCommitment: Send + Sync {
    /// Caller-supplied input for one transition.
    type Action: Copy + Send + Sync;

    /// Task kind this machine accepts.
    const KIND: TaskKind;

    /// Mutate `task` and describe the effect on the character.
    fn apply(
        &self,
        task: &mut RecurringTask,
        action: Self::Action,
        day: &DayContext,
    ) -> CommitmentTransition;

    /// Reject tasks of the wrong kind.
    fn check_kind(&self, task: &RecurringTask) -> Result<(), CoreError> {
        if task.kind == Self::KIND {
            Ok(())
        } else {
            Err(CoreError::InvalidKind {
                expected: Self::KIND.as_str(),
                actual: task.kind.as_str(),
            })
        }
    }
}

/// `base * multiplier`, rounded half away from zero.
pub(crate) fn scaled(base: u64, multiplier: f64) -> i64 {
    (base as f64 * multiplier).round() as i64
}
