//! Daily quests: a binary completed flag with a symmetric reward.

use crate::config::DailyRules;
use crate::habit::{CommitmentTransition, DayContext, RecurringCommitment};
use crate::model::{AuditCategory, RecurringTask, TaskKind};

/// Complete/undo toggle for daily quests. The sweep clears the flag on day
/// rollover.
#[derive(Debug, Clone, Copy)]
pub struct DailyToggle<'a> {
    rules: &'a DailyRules,
}

impl<'a> DailyToggle<'a> {
    pub fn new(rules: &'a DailyRules) -> Self {
        Self { rules }
    }
}

impl RecurringCommitment for DailyToggle<'_> {
    type Action = ();
    const KIND: TaskKind = TaskKind::Daily;

    fn apply(&self, task: &mut RecurringTask, _: (), _day: &DayContext) -> CommitmentTransition {
        let experience = self.rules.experience as i64;
        let gold = self.rules.reward_gold;

        if task.completed_today {
            task.completed_today = false;
            task.streak = task.streak.saturating_sub(1);
            CommitmentTransition::reward(
                -experience,
                -gold,
                AuditCategory::Daily,
                format!("Daily Undone: {}", task.title),
            )
        } else {
            task.completed_today = true;
            task.streak = task.streak.saturating_add(1);
            CommitmentTransition::reward(
                experience,
                gold,
                AuditCategory::Daily,
                format!("Daily Done: {}", task.title),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Difficulty;
    use crate::time::ReferenceZone;
    use chrono::Utc;

    #[test]
    fn toggle_twice_is_symmetric() {
        let rules = DailyRules::default();
        let toggle = DailyToggle::new(&rules);
        let day = DayContext::new(Utc::now(), ReferenceZone::default());
        let mut task = RecurringTask::daily("u1", "Inbox zero", Difficulty::Easy, day.now);
        task.streak = 2;

        let done = toggle.apply(&mut task, (), &day);
        assert_eq!((done.experience_delta, done.gold_delta), (20, 10.0));
        assert_eq!(task.streak, 3);
        assert!(task.completed_today);

        let undone = toggle.apply(&mut task, (), &day);
        assert_eq!((undone.experience_delta, undone.gold_delta), (-20, -10.0));
        assert_eq!(task.streak, 2);
        assert!(!task.completed_today);
    }

    #[test]
    fn undo_never_drops_streak_below_zero() {
        let rules = DailyRules::default();
        let day = DayContext::new(Utc::now(), ReferenceZone::default());
        let mut task = RecurringTask::daily("u1", "Water plants", Difficulty::Easy, day.now);
        task.completed_today = true;
        DailyToggle::new(&rules).apply(&mut task, (), &day);
        assert_eq!(task.streak, 0);
    }

    #[test]
    fn rejects_habits() {
        let rules = DailyRules::default();
        let task = RecurringTask::habit(
            "u1",
            "Run",
            Difficulty::Easy,
            crate::model::Polarity::Positive,
            Utc::now(),
        );
        assert!(DailyToggle::new(&rules).check_kind(&task).is_err());
    }
}
