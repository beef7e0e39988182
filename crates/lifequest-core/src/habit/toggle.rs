use chrono::Duration;

use super::{scaled, CommitmentTransition, DayContext, RecurringCommitment};
use crate::config::HabitToggleRules;
use crate::legacy;
use crate::model::{AuditCategory, RecurringTask, TaskKind};

/// Single-streak habit machine. "Done today" is derived from the last
/// completion date, not from the stored flag.
///
/// Undo is lossy: a streak above one is decremented and the last completion
/// moved back a day; a streak of one or less clears both.
#[derive(Debug, Clone, Copy)]
pub struct HabitToggle<'a> {
    rules: &'a HabitToggleRules,
}

impl<'a> HabitToggle<'a> {
    pub fn new(rules: &'a HabitToggleRules) -> Self {
        Self { rules }
    }
}

impl RecurringCommitment for HabitToggle<'_> {
    type Action = ();
    const KIND: TaskKind = TaskKind::Habit;

    fn apply(&self, task: &mut RecurringTask, _: (), day: &DayContext) -> CommitmentTransition {
        let mult = self.rules.multipliers.get(task.difficulty);
        let experience = scaled(self.rules.experience_base, mult);
        let gold = self.rules.gold_base * mult;

        let last = legacy::toggle_last_completion(task, day.now);
        let done_today = last.is_some_and(|at| day.zone.is_today(at, day.now));

        if done_today {
            if task.streak > 1 {
                task.set_streak(task.streak - 1);
                task.last_completed_at = Some(day.now - Duration::days(1));
            } else {
                task.set_streak(0);
                task.last_completed_at = None;
            }
            task.completed_today = false;
            CommitmentTransition::reward(
                -experience,
                -gold,
                AuditCategory::Habit,
                format!("Habit Undone: {}", task.title),
            )
        } else {
            let continues = last.is_some_and(|at| day.zone.is_yesterday(at, day.now));
            let streak = if continues { task.streak.saturating_add(1) } else { 1 };
            task.set_streak(streak);
            task.last_completed_at = Some(day.now);
            task.completed_today = true;
            CommitmentTransition::reward(
                experience,
                gold,
                AuditCategory::Habit,
                format!("Habit Done: {}", task.title),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, Polarity};
    use crate::time::ReferenceZone;
    use chrono::{TimeZone, Utc};

    fn day() -> DayContext {
        // 12:00 in Kolkata
        DayContext::new(
            Utc.with_ymd_and_hms(2026, 4, 10, 6, 30, 0).unwrap(),
            ReferenceZone::default(),
        )
    }

    fn habit() -> RecurringTask {
        RecurringTask::habit("u1", "Stretch", Difficulty::Hard, Polarity::Positive, day().now)
    }

    #[test]
    fn first_mark_starts_streak() {
        let rules = HabitToggleRules::default();
        let mut task = habit();
        let t = HabitToggle::new(&rules).apply(&mut task, (), &day());
        assert_eq!(task.streak, 1);
        assert!(task.completed_today);
        assert_eq!(t.experience_delta, 20);
        assert_eq!(t.gold_delta, 4.0);
    }

    #[test]
    fn mark_after_yesterday_continues_streak() {
        let rules = HabitToggleRules::default();
        let mut task = habit();
        task.set_streak(3);
        task.last_completed_at = Some(day().now - Duration::days(1));
        HabitToggle::new(&rules).apply(&mut task, (), &day());
        assert_eq!(task.streak, 4);
        assert_eq!(task.best_streak, 4);
    }

    #[test]
    fn mark_after_gap_restarts_streak() {
        let rules = HabitToggleRules::default();
        let mut task = habit();
        task.set_streak(9);
        task.last_completed_at = Some(day().now - Duration::days(3));
        HabitToggle::new(&rules).apply(&mut task, (), &day());
        assert_eq!(task.streak, 1);
        assert_eq!(task.best_streak, 9);
    }

    #[test]
    fn undo_of_first_day_clears_completion() {
        let rules = HabitToggleRules::default();
        let toggle = HabitToggle::new(&rules);
        let mut task = habit();
        let mark = toggle.apply(&mut task, (), &day());
        let undo = toggle.apply(&mut task, (), &day());
        assert_eq!(undo.experience_delta, -mark.experience_delta);
        assert_eq!(undo.gold_delta, -mark.gold_delta);
        assert_eq!(task.streak, 0);
        assert!(task.last_completed_at.is_none());
        assert!(!task.completed_today);
    }

    #[test]
    fn undo_of_long_streak_is_lossy() {
        let rules = HabitToggleRules::default();
        let toggle = HabitToggle::new(&rules);
        let mut task = habit();
        task.set_streak(5);
        task.last_completed_at = Some(day().now - Duration::days(1));
        toggle.apply(&mut task, (), &day());
        assert_eq!(task.streak, 6);
        toggle.apply(&mut task, (), &day());
        assert_eq!(task.streak, 5);
        let last = task.last_completed_at.unwrap();
        assert!(day().zone.is_yesterday(last, day().now));
    }

    #[test]
    fn legacy_flag_without_date_counts_as_done_today() {
        let rules = HabitToggleRules::default();
        let mut task = habit();
        task.set_streak(1);
        task.completed_today = true;
        let t = HabitToggle::new(&rules).apply(&mut task, (), &day());
        assert!(t.experience_delta < 0);
        assert_eq!(task.streak, 0);
    }
}
