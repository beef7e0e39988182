//! Compatibility rules for rows written before `last_completed_at` existed.
//!
//! Such rows only carry the `completed_today` flag. Everything here can go
//! once every habit row has a completion timestamp.

use chrono::{DateTime, Utc};

use crate::model::RecurringTask;

/// Sweep: a habit with no timestamp but a set flag is taken as not missed.
pub fn sweep_assumes_kept(task: &RecurringTask) -> bool {
    task.last_completed_at.is_none() && task.completed_today
}

/// Toggle: a habit with no timestamp but a set flag is taken as done at `now`.
pub fn toggle_last_completion(task: &RecurringTask, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match task.last_completed_at {
        Some(at) => Some(at),
        None if task.completed_today => Some(now),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, Polarity};

    #[test]
    fn only_flagged_rows_without_timestamp_are_legacy() {
        let now = Utc::now();
        let mut task = RecurringTask::habit("u1", "Walk", Difficulty::Easy, Polarity::Positive, now);
        assert!(!sweep_assumes_kept(&task));
        assert_eq!(toggle_last_completion(&task, now), None);

        task.completed_today = true;
        assert!(sweep_assumes_kept(&task));
        assert_eq!(toggle_last_completion(&task, now), Some(now));

        task.last_completed_at = Some(now - chrono::Duration::days(4));
        assert!(!sweep_assumes_kept(&task));
    }
}
