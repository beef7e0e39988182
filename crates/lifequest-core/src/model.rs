//! Persisted entities: the character sheet, recurring tasks, loan tasks and
//! audit entries.
//!
//! Every entity that can be rewritten carries a `version` token. Stores bump
//! it on each successful write and refuse writes whose token is stale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::scheduler::ScheduleHandle;

/// Task difficulty, used to look up multipliers and penalties.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Medium
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of recurring task. Immutable after creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Habit,
    Daily,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Habit => "habit",
            TaskKind::Daily => "daily",
        }
    }
}

/// Habit direction: build a good habit or break a bad one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Positive => "positive",
            Polarity::Negative => "negative",
        }
    }
}

impl Default for Polarity {
    fn default() -> Self {
        Polarity::Positive
    }
}

impl FromStr for Polarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "positive" | "build" => Ok(Polarity::Positive),
            "negative" | "break" => Ok(Polarity::Negative),
            other => Err(format!("unknown polarity: {other}")),
        }
    }
}

/// Per-user character sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub user_id: String,
    /// Always >= 1
    pub level: u32,
    /// Progress inside the current level
    pub experience: u64,
    /// Requirement for the current level, as returned by the level curve
    pub max_experience: u64,
    pub gold: f64,
    /// 0..=health cap
    pub health: u32,
    /// Last instant the reconciliation sweep processed this user through
    pub reconciliation_watermark: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: u64,
}

impl Character {
    /// Fresh level-1 character.
    pub fn new(
        user_id: impl Into<String>,
        first_requirement: u64,
        max_health: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            level: 1,
            experience: 0,
            max_experience: first_requirement,
            gold: 0.0,
            health: max_health,
            reconciliation_watermark: Some(now),
            version: 0,
        }
    }

    /// Subtract gold, flooring at zero.
    pub fn debit_floored(&mut self, amount: f64) -> f64 {
        let before = self.gold;
        self.gold = (self.gold - amount).max(0.0);
        before - self.gold
    }

    /// Subtract health, flooring at zero.
    pub fn damage(&mut self, amount: u32) {
        self.health = self.health.saturating_sub(amount);
    }
}

/// A milestone badge, unlocked once and never revoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub label: String,
    pub day_count: u32,
    pub unlocked_at: DateTime<Utc>,
}

impl Milestone {
    pub fn label_for(day_count: u32) -> String {
        format!("{day_count}-Day Streak!")
    }
}

/// A habit or a daily quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringTask {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub kind: TaskKind,
    pub difficulty: Difficulty,
    /// Habits only
    pub polarity: Option<Polarity>,
    pub streak: u32,
    /// Habits only; kept >= streak
    pub best_streak: u32,
    /// For dailies this is the quest's completed flag
    pub completed_today: bool,
    pub last_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl RecurringTask {
    pub fn habit(
        user_id: impl Into<String>,
        title: impl Into<String>,
        difficulty: Difficulty,
        polarity: Polarity,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(user_id, title, TaskKind::Habit, difficulty, Some(polarity), now)
    }

    pub fn daily(
        user_id: impl Into<String>,
        title: impl Into<String>,
        difficulty: Difficulty,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(user_id, title, TaskKind::Daily, difficulty, None, now)
    }

    fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        kind: TaskKind,
        difficulty: Difficulty,
        polarity: Option<Polarity>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: title.into(),
            description: None,
            kind,
            difficulty,
            polarity,
            streak: 0,
            best_streak: 0,
            completed_today: false,
            last_completed_at: None,
            milestones: Vec::new(),
            created_at: now,
            version: 0,
        }
    }

    pub fn has_milestone(&self, label: &str) -> bool {
        self.milestones.iter().any(|m| m.label == label)
    }

    /// Set the streak and keep `best_streak` in step with it.
    pub fn set_streak(&mut self, streak: u32) {
        self.streak = streak;
        self.best_streak = self.best_streak.max(streak);
    }
}

/// Loan task lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Completed,
    Overdue,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Completed => "completed",
            LoanStatus::Overdue => "overdue",
        }
    }
}

impl FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LoanStatus::Active),
            "completed" => Ok(LoanStatus::Completed),
            "overdue" => Ok(LoanStatus::Overdue),
            other => Err(format!("unknown loan status: {other}")),
        }
    }
}

/// A deadline-bound todo that may pay gold upfront.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTask {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub difficulty: Difficulty,
    pub deadline: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    pub potential_reward: f64,
    /// Gold actually loaned; 0 when no future deadline was set
    pub upfront_gold_given: f64,
    pub callback: Option<ScheduleHandle>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

/// What an audit entry records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Habit,
    HabitTrigger,
    Daily,
    TodoCreate,
    TodoComplete,
    TodoOverdue,
    TodoRenew,
    TodoClawback,
    Penalty,
    LevelUp,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Habit => "habit",
            AuditCategory::HabitTrigger => "habit_trigger",
            AuditCategory::Daily => "daily",
            AuditCategory::TodoCreate => "todo_create",
            AuditCategory::TodoComplete => "todo_complete",
            AuditCategory::TodoOverdue => "todo_overdue",
            AuditCategory::TodoRenew => "todo_renew",
            AuditCategory::TodoClawback => "todo_clawback",
            AuditCategory::Penalty => "penalty",
            AuditCategory::LevelUp => "level_up",
        }
    }
}

impl FromStr for AuditCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let category = match s {
            "habit" => AuditCategory::Habit,
            "habit_trigger" => AuditCategory::HabitTrigger,
            "daily" => AuditCategory::Daily,
            "todo_create" => AuditCategory::TodoCreate,
            "todo_complete" => AuditCategory::TodoComplete,
            "todo_overdue" => AuditCategory::TodoOverdue,
            "todo_renew" => AuditCategory::TodoRenew,
            "todo_clawback" => AuditCategory::TodoClawback,
            "penalty" => AuditCategory::Penalty,
            "level_up" => AuditCategory::LevelUp,
            other => return Err(format!("unknown audit category: {other}")),
        };
        Ok(category)
    }
}

/// Immutable, append-only record of an economic event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub user_id: String,
    pub message: String,
    /// Signed
    pub experience_delta: i64,
    /// Signed
    pub gold_delta: f64,
    pub category: AuditCategory,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_parses_case_insensitively() {
        assert_eq!("HARD".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("legendary".parse::<Difficulty>().is_err());
    }

    #[test]
    fn set_streak_tracks_best() {
        let mut habit = RecurringTask::habit("u1", "Read", Difficulty::Easy, Polarity::Positive, Utc::now());
        habit.set_streak(5);
        habit.set_streak(0);
        assert_eq!(habit.streak, 0);
        assert_eq!(habit.best_streak, 5);
    }

    #[test]
    fn debit_floors_at_zero() {
        let mut character = Character::new("u1", 100, 100, Utc::now());
        character.gold = 30.0;
        let taken = character.debit_floored(80.0);
        assert_eq!(character.gold, 0.0);
        assert_eq!(taken, 30.0);
    }

    #[test]
    fn audit_category_string_roundtrip() {
        for category in [AuditCategory::TodoOverdue, AuditCategory::LevelUp, AuditCategory::Penalty] {
            assert_eq!(category.as_str().parse::<AuditCategory>().unwrap(), category);
        }
    }

    #[test]
    fn loan_task_serializes_status_lowercase() {
        let json = serde_json::to_value(LoanStatus::Overdue).unwrap();
        assert_eq!(json, serde_json::json!("overdue"));
    }
}
