use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{CommitmentTransition, DayContext, RecurringCommitment};
use crate::config::HabitTriggerRules;
use crate::model::{AuditCategory, Milestone, Polarity, RecurringTask, TaskKind};

/// Result the user reports for a habit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOutcome {
    /// Performed a positive habit or resisted a negative one
    Success,
    /// Skipped a positive habit or gave in to a negative one
    Failure,
}

impl TriggerOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerOutcome::Success => "success",
            TriggerOutcome::Failure => "failure",
        }
    }
}

impl FromStr for TriggerOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "success" => Ok(TriggerOutcome::Success),
            "failure" => Ok(TriggerOutcome::Failure),
            other => Err(format!("unknown outcome: {other}")),
        }
    }
}

/// Polarity x outcome habit machine.
///
/// | polarity | outcome | effect                                 |
/// |----------|---------|----------------------------------------|
/// | positive | success | reward, streak + 1, milestone check    |
/// | positive | failure | health penalty, streak reset           |
/// | negative | success | reward, streak + 1, milestone check    |
/// | negative | failure | larger health penalty, streak reset    |
///
/// Failures also cost a flat experience amount. The health penalty is
/// reported but only applied when `apply_health_penalty` is set.
#[derive(Debug, Clone, Copy)]
pub struct HabitTrigger<'a> {
    rules: &'a HabitTriggerRules,
}

impl<'a> HabitTrigger<'a> {
    pub fn new(rules: &'a HabitTriggerRules) -> Self {
        Self { rules }
    }
}

impl RecurringCommitment for HabitTrigger<'_> {
    type Action = TriggerOutcome;
    const KIND: TaskKind = TaskKind::Habit;

    fn apply(
        &self,
        task: &mut RecurringTask,
        outcome: TriggerOutcome,
        day: &DayContext,
    ) -> CommitmentTransition {
        let rules = self.rules;
        let mult = rules.multipliers.get(task.difficulty);
        let polarity = task.polarity.unwrap_or_default();

        let mut experience = 0.0;
        let mut gold = 0.0;
        let mut health = 0.0;
        let mut milestone = None;

        match outcome {
            TriggerOutcome::Success => {
                experience += rules.success_experience as f64 * mult;
                gold += rules.success_gold * mult;
                let streak = task.streak.saturating_add(1);
                task.set_streak(streak);

                let label = Milestone::label_for(streak);
                if rules.milestone_days.contains(&streak) && !task.has_milestone(&label) {
                    task.milestones.push(Milestone {
                        label: label.clone(),
                        day_count: streak,
                        unlocked_at: day.now,
                    });
                    experience += f64::from(streak) * rules.milestone_experience_per_day as f64 * mult;
                    gold += f64::from(streak) * rules.milestone_gold_per_day * mult;
                    milestone = Some(label);
                }
            }
            TriggerOutcome::Failure => {
                let base = match polarity {
                    Polarity::Positive => rules.positive_failure_health,
                    Polarity::Negative => rules.negative_failure_health,
                };
                health = f64::from(base) * mult;
                experience -= rules.failure_experience_penalty as f64;
                task.set_streak(0);
            }
        }
        task.last_completed_at = Some(day.now);

        let mut message = format!("Habit {}: {}", task.title, outcome.as_str().to_uppercase());
        if let Some(label) = &milestone {
            message.push_str(&format!(" (Badge: {label})"));
        }

        CommitmentTransition {
            experience_delta: experience.round() as i64,
            gold_delta: gold,
            health_penalty: health.round() as u32,
            apply_health: rules.apply_health_penalty,
            milestone,
            category: AuditCategory::HabitTrigger,
            message,
        }
    }
}
