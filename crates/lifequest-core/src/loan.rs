//! Loan task (todo) lifecycle.
//!
//! ```text
//!            complete
//!   active ------------> completed
//!    |  ^
//!    |  | renew (fee)
//!    v  |
//!   overdue   <- deadline callback, 2x loan penalty
//! ```
//!
//! A todo created with a future deadline pays its reward upfront as a loan.
//! Completing before the deadline pays the reward again; missing it costs
//! twice the loan; deleting an unfinished todo returns the loan.
//!
//! The functions here are pure. They mutate the task, and return a
//! [`LoanTransition`] that the engine turns into gold changes, scheduler
//! calls and audit entries.

use chrono::{DateTime, Utc};

use crate::config::TodoRules;
use crate::error::CoreError;
use crate::habit::scaled;
use crate::model::{AuditCategory, Difficulty, LoanStatus, LoanTask};
use crate::scheduler::ScheduleHandle;

/// Side effects of one loan transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoanTransition {
    /// Positive credits; negative debits floored at zero balance
    pub gold_delta: f64,
    pub experience_delta: i64,
    /// Callback to cancel
    pub cancel: Option<ScheduleHandle>,
    /// Deadline to schedule a new callback for
    pub schedule_at: Option<DateTime<Utc>>,
    pub audit: Option<(AuditCategory, String)>,
}

/// What a delivered deadline callback did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackVerdict {
    /// Task was active and is now overdue
    Penalized,
    AlreadyCompleted,
    /// Task was already overdue; repeated delivery
    AlreadyOverdue,
    /// Stale delivery for a deadline that was moved or removed
    NotDue,
}

impl CallbackVerdict {
    pub fn message(&self) -> &'static str {
        match self {
            CallbackVerdict::Penalized => "Checked",
            CallbackVerdict::AlreadyCompleted => "Already completed",
            CallbackVerdict::AlreadyOverdue | CallbackVerdict::NotDue => "Ignored",
        }
    }
}

pub fn potential_reward(rules: &TodoRules, difficulty: Difficulty) -> f64 {
    rules.reward_gold * rules.multipliers.get(difficulty)
}

pub fn completion_experience(rules: &TodoRules, difficulty: Difficulty) -> i64 {
    scaled(rules.experience, rules.multipliers.get(difficulty))
}

fn require_status(task: &LoanTask, status: LoanStatus, action: &str) -> Result<(), CoreError> {
    if task.status == status {
        Ok(())
    } else {
        Err(CoreError::InvalidState(format!(
            "cannot {action} a {} todo",
            task.status.as_str()
        )))
    }
}

fn require_future(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), CoreError> {
    if deadline > now {
        Ok(())
    } else {
        Err(CoreError::InvalidDeadline)
    }
}

fn loan_granted(task: &mut LoanTask, deadline: DateTime<Utc>) -> LoanTransition {
    task.upfront_gold_given = task.potential_reward;
    LoanTransition {
        gold_delta: task.potential_reward,
        schedule_at: Some(deadline),
        audit: Some((
            AuditCategory::TodoCreate,
            format!("Todo Bet Started: {}", task.title),
        )),
        ..Default::default()
    }
}

/// New active todo. A future deadline grants the loan; a past one is stored
/// but pays nothing and schedules nothing.
pub fn create(
    user_id: &str,
    title: &str,
    description: Option<String>,
    difficulty: Difficulty,
    deadline: Option<DateTime<Utc>>,
    rules: &TodoRules,
    now: DateTime<Utc>,
) -> (LoanTask, LoanTransition) {
    let mut task = LoanTask {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        title: title.to_string(),
        description,
        difficulty,
        deadline,
        status: LoanStatus::Active,
        potential_reward: potential_reward(rules, difficulty),
        upfront_gold_given: 0.0,
        callback: None,
        completed_at: None,
        created_at: now,
        version: 0,
    };
    let transition = match deadline {
        Some(at) if at > now => loan_granted(&mut task, at),
        _ => LoanTransition::default(),
    };
    (task, transition)
}

/// Deadline callback. Only an active task whose current deadline has passed
/// is penalized, so repeated or stale deliveries are harmless.
///
/// The relay schedules at whole-second precision, so the deadline is compared
/// in seconds.
pub fn expire(
    task: &mut LoanTask,
    rules: &TodoRules,
    now: DateTime<Utc>,
) -> (CallbackVerdict, LoanTransition) {
    match task.status {
        LoanStatus::Completed => (CallbackVerdict::AlreadyCompleted, LoanTransition::default()),
        LoanStatus::Overdue => (CallbackVerdict::AlreadyOverdue, LoanTransition::default()),
        LoanStatus::Active if !is_due(task, now) => {
            (CallbackVerdict::NotDue, LoanTransition::default())
        }
        LoanStatus::Active => {
            task.status = LoanStatus::Overdue;
            // The relay already fired this one.
            task.callback = None;
            let penalty = rules.overdue_penalty_factor * task.upfront_gold_given;
            (
                CallbackVerdict::Penalized,
                LoanTransition {
                    gold_delta: -penalty,
                    audit: Some((
                        AuditCategory::TodoOverdue,
                        format!("Todo Overdue: {}", task.title),
                    )),
                    ..Default::default()
                },
            )
        }
    }
}

fn is_due(task: &LoanTask, now: DateTime<Utc>) -> bool {
    task.deadline.is_some_and(|at| now.timestamp() >= at.timestamp())
}

/// User completion, only from active.
pub fn complete(
    task: &mut LoanTask,
    rules: &TodoRules,
    now: DateTime<Utc>,
) -> Result<LoanTransition, CoreError> {
    require_status(task, LoanStatus::Active, "complete")?;
    task.status = LoanStatus::Completed;
    task.completed_at = Some(now);
    Ok(LoanTransition {
        gold_delta: task.potential_reward,
        experience_delta: completion_experience(rules, task.difficulty),
        cancel: task.callback.take(),
        audit: Some((
            AuditCategory::TodoComplete,
            format!("Completed todo: {}", task.title),
        )),
        ..Default::default()
    })
}

/// Deletion. Unfinished todos return exactly the loan.
pub fn delete(task: &mut LoanTask) -> LoanTransition {
    let mut transition = LoanTransition {
        cancel: task.callback.take(),
        ..Default::default()
    };
    if task.status != LoanStatus::Completed && task.upfront_gold_given > 0.0 {
        transition.gold_delta = -task.upfront_gold_given;
        transition.audit = Some((
            AuditCategory::TodoClawback,
            format!("Todo Deleted: {} (loan returned)", task.title),
        ));
    }
    transition
}

/// Fee charged to renew an overdue todo.
pub fn renewal_fee(task: &LoanTask, rules: &TodoRules) -> f64 {
    rules.renewal_fee_fraction * task.potential_reward
}

/// Renew an overdue todo with a new future deadline. The loan amount is left
/// as is, so missing the new deadline costs the full penalty again.
pub fn renew(
    task: &mut LoanTask,
    new_deadline: DateTime<Utc>,
    available_gold: f64,
    rules: &TodoRules,
    now: DateTime<Utc>,
) -> Result<LoanTransition, CoreError> {
    require_status(task, LoanStatus::Overdue, "renew")?;
    require_future(new_deadline, now)?;
    let fee = renewal_fee(task, rules);
    if available_gold < fee {
        return Err(CoreError::InsufficientFunds {
            required: fee,
            available: available_gold,
        });
    }
    task.status = LoanStatus::Active;
    task.deadline = Some(new_deadline);
    Ok(LoanTransition {
        gold_delta: -fee,
        cancel: task.callback.take(),
        schedule_at: Some(new_deadline),
        audit: Some((
            AuditCategory::TodoRenew,
            format!("Todo Renewed: {} (fee {fee:.2})", task.title),
        )),
        ..Default::default()
    })
}

/// Change the deadline of an active todo.
///
/// - remove: cancel the callback and claw back the loan
/// - add: grant a fresh loan and schedule
/// - change: reschedule, loan untouched
/// - same value: nothing
pub fn edit_deadline(
    task: &mut LoanTask,
    new_deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<LoanTransition, CoreError> {
    require_status(task, LoanStatus::Active, "edit")?;
    if task.deadline == new_deadline {
        return Ok(LoanTransition::default());
    }
    if let Some(at) = new_deadline {
        require_future(at, now)?;
    }

    let old = task.deadline;
    task.deadline = new_deadline;
    let transition = match (old, new_deadline) {
        (Some(_), None) => {
            let clawback = task.upfront_gold_given;
            task.upfront_gold_given = 0.0;
            LoanTransition {
                gold_delta: -clawback,
                cancel: task.callback.take(),
                audit: (clawback > 0.0).then(|| {
                    (
                        AuditCategory::TodoClawback,
                        format!("Todo Deadline Removed: {} (loan returned)", task.title),
                    )
                }),
                ..Default::default()
            }
        }
        (None, Some(at)) => {
            let mut t = loan_granted(task, at);
            t.cancel = task.callback.take();
            t
        }
        (Some(_), Some(at)) => LoanTransition {
            cancel: task.callback.take(),
            schedule_at: Some(at),
            ..Default::default()
        },
        (None, None) => LoanTransition::default(),
    };
    Ok(transition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rules() -> TodoRules {
        TodoRules::default()
    }

    fn active_with_loan(now: DateTime<Utc>) -> LoanTask {
        let (mut task, _) = create(
            "u1",
            "Ship release",
            None,
            Difficulty::Hard,
            Some(now + Duration::days(2)),
            &rules(),
            now,
        );
        task.callback = Some(ScheduleHandle::live("msg_1"));
        task
    }

    #[test]
    fn create_with_future_deadline_grants_loan() {
        let now = Utc::now();
        let deadline = now + Duration::hours(3);
        let (task, t) = create("u1", "Taxes", None, Difficulty::Medium, Some(deadline), &rules(), now);
        assert_eq!(task.potential_reward, 20.0);
        assert_eq!(task.upfront_gold_given, 20.0);
        assert_eq!(t.gold_delta, 20.0);
        assert_eq!(t.schedule_at, Some(deadline));
        assert_eq!(t.audit.unwrap().0, AuditCategory::TodoCreate);
    }

    #[test]
    fn create_with_past_deadline_grants_nothing() {
        let now = Utc::now();
        let (task, t) = create(
            "u1",
            "Late",
            None,
            Difficulty::Easy,
            Some(now - Duration::hours(1)),
            &rules(),
            now,
        );
        assert_eq!(task.upfront_gold_given, 0.0);
        assert_eq!(t, LoanTransition::default());
    }

    #[test]
    fn expire_penalizes_twice_the_loan_once() {
        let now = Utc::now();
        let mut task = active_with_loan(now);
        let due = now + Duration::days(2);
        let (verdict, t) = expire(&mut task, &rules(), due);
        assert_eq!(verdict, CallbackVerdict::Penalized);
        assert_eq!(t.gold_delta, -80.0);
        assert_eq!(task.status, LoanStatus::Overdue);
        assert!(task.callback.is_none());

        let (again, t2) = expire(&mut task, &rules(), due);
        assert_eq!(again, CallbackVerdict::AlreadyOverdue);
        assert_eq!(t2.gold_delta, 0.0);
    }

    #[test]
    fn expire_ignores_delivery_before_live_deadline() {
        let now = Utc::now();
        let mut task = active_with_loan(now);
        let (verdict, t) = expire(&mut task, &rules(), now + Duration::days(1));
        assert_eq!(verdict, CallbackVerdict::NotDue);
        assert_eq!(verdict.message(), "Ignored");
        assert_eq!(t, LoanTransition::default());
        assert_eq!(task.status, LoanStatus::Active);
        assert_eq!(task.callback, Some(ScheduleHandle::live("msg_1")));

        edit_deadline(&mut task, None, now).unwrap();
        let (verdict, _) = expire(&mut task, &rules(), now + Duration::days(3));
        assert_eq!(verdict, CallbackVerdict::NotDue);
        assert_eq!(task.status, LoanStatus::Active);
    }

    #[test]
    fn complete_pays_reward_and_cancels() {
        let now = Utc::now();
        let mut task = active_with_loan(now);
        let t = complete(&mut task, &rules(), now).unwrap();
        assert_eq!(t.gold_delta, 40.0);
        assert_eq!(t.experience_delta, 80);
        assert_eq!(t.cancel, Some(ScheduleHandle::live("msg_1")));
        assert_eq!(task.status, LoanStatus::Completed);
        assert!(task.callback.is_none());
        assert!(matches!(complete(&mut task, &rules(), now), Err(CoreError::InvalidState(_))));
    }

    #[test]
    fn delete_claws_back_loan_not_penalty() {
        let now = Utc::now();
        let mut task = active_with_loan(now);
        expire(&mut task, &rules(), now + Duration::days(2));
        let t = delete(&mut task);
        assert_eq!(t.gold_delta, -40.0);
    }

    #[test]
    fn delete_completed_returns_nothing() {
        let now = Utc::now();
        let mut task = active_with_loan(now);
        complete(&mut task, &rules(), now).unwrap();
        assert_eq!(delete(&mut task).gold_delta, 0.0);
    }

    #[test]
    fn renew_requires_overdue_future_deadline_and_fee() {
        let now = Utc::now();
        let mut task = active_with_loan(now);
        let later = now + Duration::days(1);
        assert!(matches!(
            renew(&mut task, later, 100.0, &rules(), now),
            Err(CoreError::InvalidState(_))
        ));

        expire(&mut task, &rules(), now + Duration::days(2));
        assert!(matches!(
            renew(&mut task, now - Duration::minutes(1), 100.0, &rules(), now),
            Err(CoreError::InvalidDeadline)
        ));
        assert!(matches!(
            renew(&mut task, later, 3.0, &rules(), now),
            Err(CoreError::InsufficientFunds { .. })
        ));
        assert_eq!(task.status, LoanStatus::Overdue);

        let t = renew(&mut task, later, 4.0, &rules(), now).unwrap();
        assert_eq!(t.gold_delta, -4.0);
        assert_eq!(t.schedule_at, Some(later));
        assert_eq!(task.status, LoanStatus::Active);
        assert_eq!(task.upfront_gold_given, 40.0);
    }

    #[test]
    fn edit_deadline_cases() {
        let now = Utc::now();

        let mut removed = active_with_loan(now);
        let t = edit_deadline(&mut removed, None, now).unwrap();
        assert_eq!(t.gold_delta, -40.0);
        assert!(t.cancel.is_some());
        assert_eq!(removed.upfront_gold_given, 0.0);

        let (mut added, _) = create("u1", "Someday", None, Difficulty::Easy, None, &rules(), now);
        let at = now + Duration::days(1);
        let t = edit_deadline(&mut added, Some(at), now).unwrap();
        assert_eq!(t.gold_delta, 10.0);
        assert_eq!(t.schedule_at, Some(at));
        assert_eq!(added.upfront_gold_given, 10.0);

        let mut moved = active_with_loan(now);
        let at = now + Duration::days(5);
        let t = edit_deadline(&mut moved, Some(at), now).unwrap();
        assert_eq!(t.gold_delta, 0.0);
        assert!(t.cancel.is_some());
        assert_eq!(t.schedule_at, Some(at));
        assert_eq!(moved.upfront_gold_given, 40.0);

        let mut same = active_with_loan(now);
        let unchanged = same.deadline;
        assert_eq!(edit_deadline(&mut same, unchanged, now).unwrap(), LoanTransition::default());
    }

    #[test]
    fn edit_rejects_inactive_and_past() {
        let now = Utc::now();
        let mut task = active_with_loan(now);
        assert!(matches!(
            edit_deadline(&mut task, Some(now - Duration::hours(1)), now),
            Err(CoreError::InvalidDeadline)
        ));
        expire(&mut task, &rules(), now + Duration::days(2));
        assert!(matches!(
            edit_deadline(&mut task, None, now),
            Err(CoreError::InvalidState(_))
        ));
    }
}
