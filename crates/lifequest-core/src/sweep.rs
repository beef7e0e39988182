//! Daily reconciliation.
//!
//! Once per calendar day (reference zone) each user's habits are checked for
//! a missed yesterday, daily quests are reset and the watermark advances.
//! [`reconcile_user`] plans that work for one user without touching storage;
//! the engine commits the plan under the user's lock.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::GameConfig;
use crate::legacy;
use crate::model::{AuditCategory, Character, RecurringTask, TaskKind};
use crate::time::ReferenceZone;

/// Work for one user on rollover.
#[derive(Debug, Clone, PartialEq)]
pub struct UserReconciliation {
    pub character: Character,
    /// Only tasks whose stored state changes
    pub changed_tasks: Vec<RecurringTask>,
    pub health_penalty: u32,
    /// (category, message) per missed habit
    pub penalties: Vec<(AuditCategory, String)>,
}

/// Summary of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub users_seen: usize,
    pub users_reconciled: usize,
    pub habits_penalized: usize,
    pub dailies_reset: usize,
    pub health_lost: u64,
    /// (user id, error) for users that failed
    pub failures: Vec<(String, String)>,
}

/// True when the watermark is missing or falls on an earlier local day.
pub fn needs_rollover(character: &Character, zone: &ReferenceZone, now: DateTime<Utc>) -> bool {
    match character.reconciliation_watermark {
        Some(mark) => zone.date_of(mark) < zone.today(now),
        None => true,
    }
}

fn missed_yesterday(task: &RecurringTask, zone: &ReferenceZone, now: DateTime<Utc>) -> bool {
    match task.last_completed_at {
        // Activity today counts as engagement even if yesterday was skipped.
        Some(at) => !(zone.is_yesterday(at, now) || zone.is_today(at, now)),
        None => !legacy::sweep_assumes_kept(task),
    }
}

/// Plan the rollover for one user. `None` when the user was already
/// reconciled today.
pub fn reconcile_user(
    character: &Character,
    tasks: &[RecurringTask],
    config: &GameConfig,
    zone: &ReferenceZone,
    now: DateTime<Utc>,
) -> Option<UserReconciliation> {
    if !needs_rollover(character, zone, now) {
        return None;
    }

    let mut changed_tasks = Vec::new();
    let mut penalties = Vec::new();
    let mut health_penalty = 0u32;

    for task in tasks {
        let mut next = task.clone();
        match task.kind {
            TaskKind::Habit => {
                if task.streak > 0 && missed_yesterday(task, zone, now) {
                    next.set_streak(0);
                    let damage = config.sweep_health_penalty.get(task.difficulty);
                    health_penalty = health_penalty.saturating_add(damage);
                    penalties.push((
                        AuditCategory::Penalty,
                        format!("Missed Habit: {} (HP -{damage})", task.title),
                    ));
                }
                next.completed_today = task
                    .last_completed_at
                    .is_some_and(|at| zone.is_today(at, now));
            }
            TaskKind::Daily => {
                next.completed_today = false;
            }
        }
        if next != *task {
            changed_tasks.push(next);
        }
    }

    let mut character = character.clone();
    character.damage(health_penalty);
    character.reconciliation_watermark = Some(now);

    Some(UserReconciliation {
        character,
        changed_tasks,
        health_penalty,
        penalties,
    })
}
