//! The gamification engine.
//!
//! [`Engine`] owns the collaborators (store, scheduler, clock) and the game
//! rules, and exposes every user-facing operation. Each operation:
//!
//! 1. takes the user's lock from [`UserGate`]
//! 2. reads the character and the task
//! 3. runs the pure transition (`habit`, `daily`, `loan`, `sweep`)
//! 4. runs the result through the level curve and the audit batch
//! 5. commits everything as one versioned batch
//!
//! A version conflict (a writer outside this process) restarts the cycle, up
//! to [`MAX_ATTEMPTS`] times. Callbacks scheduled by a failed attempt are
//! cancelled; callbacks being replaced are only cancelled after a successful
//! commit.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit::AuditBatch;
use crate::clock::Clock;
use crate::config::GameConfig;
use crate::daily::DailyToggle;
use crate::error::{CoreError, Result, StoreError};
use crate::gate::UserGate;
use crate::habit::{
    CommitmentTransition, DayContext, HabitToggle, HabitTrigger, RecurringCommitment,
    TriggerOutcome,
};
use crate::leveling::LevelCurve;
use crate::loan::{self, CallbackVerdict, LoanTransition};
use crate::model::{AuditEntry, Character, Difficulty, LoanTask, Polarity, RecurringTask, TaskKind};
use crate::scheduler::{cancel_best_effort, schedule_or_degrade, CallbackScheduler, ScheduleHandle};
use crate::storage::{Store, Write};
use crate::sweep::{self, SweepReport};
use crate::time::ReferenceZone;

/// Commit attempts per operation before giving up with `Conflict`.
pub const MAX_ATTEMPTS: u32 = 3;

/// Result of a habit or daily transition.
#[derive(Debug, Clone, Serialize)]
pub struct CommitmentOutcome {
    pub task: RecurringTask,
    pub character: Character,
    pub transition: CommitmentTransition,
    pub leveled_up: bool,
}

/// Result of a loan task operation.
#[derive(Debug, Clone, Serialize)]
pub struct LoanOutcome {
    /// `None` after a delete
    pub task: Option<LoanTask>,
    pub character: Character,
    /// Gold actually moved (debits are floored at zero balance)
    pub gold_delta: f64,
    /// Non-fatal problems, e.g. a deadline that could not be scheduled
    pub warnings: Vec<String>,
}

/// Input for [`Engine::create_loan`].
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub title: String,
    pub description: Option<String>,
    pub difficulty: Difficulty,
    pub deadline: Option<DateTime<Utc>>,
}

pub struct Engine {
    config: Arc<GameConfig>,
    curve: LevelCurve,
    zone: ReferenceZone,
    store: Arc<dyn Store>,
    scheduler: Arc<dyn CallbackScheduler>,
    clock: Arc<dyn Clock>,
    gate: UserGate,
}

impl Engine {
    /// # Errors
    ///
    /// Returns `Config` if the rules fail validation.
    pub fn new(
        config: GameConfig,
        store: Arc<dyn Store>,
        scheduler: Arc<dyn CallbackScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let curve = LevelCurve::new(config.level_thresholds.clone())?;
        let zone = config.reference_zone()?;
        Ok(Self {
            config: Arc::new(config),
            curve,
            zone,
            store,
            scheduler,
            clock,
            gate: UserGate::new(),
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn zone(&self) -> ReferenceZone {
        self.zone
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn character(&self, user_id: &str) -> Result<Character> {
        self.store
            .character(user_id)?
            .ok_or_else(|| CoreError::not_found("character", user_id))
    }

    pub fn recurring_tasks(&self, user_id: &str) -> Result<Vec<RecurringTask>> {
        Ok(self.store.recurring_tasks(user_id)?)
    }

    pub fn loan_tasks(&self, user_id: &str) -> Result<Vec<LoanTask>> {
        Ok(self.store.loan_tasks(user_id)?)
    }

    /// Activity feed, newest first.
    pub fn recent_activity(&self, user_id: &str, limit: usize) -> Result<Vec<AuditEntry>> {
        Ok(self.store.recent_audit(user_id, limit)?)
    }

    fn recurring_owned(&self, user_id: &str, task_id: &str) -> Result<RecurringTask> {
        match self.store.recurring_task(task_id)? {
            Some(task) if task.user_id == user_id => Ok(task),
            _ => Err(CoreError::not_found("recurring task", task_id)),
        }
    }

    fn loan_owned(&self, user_id: &str, task_id: &str) -> Result<LoanTask> {
        match self.store.loan_task(task_id)? {
            Some(task) if task.user_id == user_id => Ok(task),
            _ => Err(CoreError::not_found("loan task", task_id)),
        }
    }

    // ── Shared plumbing ─────────────────────────────────────────────────

    /// Apply experience through the level curve and move gold. Returns the
    /// gold actually moved.
    fn settle(&self, character: &mut Character, experience_delta: i64, gold_delta: f64) -> f64 {
        let change = self
            .curve
            .apply_experience(character.level, character.experience, experience_delta);
        if change.level != character.level {
            info!(
                user_id = %character.user_id,
                from = character.level,
                to = change.level,
                "level changed"
            );
        }
        character.level = change.level;
        character.experience = change.experience;
        character.max_experience = change.requirement;

        if gold_delta >= 0.0 {
            character.gold += gold_delta;
            gold_delta
        } else {
            -character.debit_floored(-gold_delta)
        }
    }

    /// Commit a batch. `Ok(false)` means a version conflict; the caller
    /// should re-read and retry. Either way a failed commit cancels
    /// `scheduled`, the callback this attempt registered.
    async fn try_commit(&self, writes: Vec<Write>, scheduled: Option<&ScheduleHandle>) -> Result<bool> {
        match self.store.commit(writes) {
            Ok(()) => Ok(true),
            Err(err) => {
                if let Some(handle) = scheduled {
                    cancel_best_effort(self.scheduler.as_ref(), handle).await;
                }
                match err {
                    StoreError::Conflict { entity, id, .. } => {
                        warn!(entity, id = %id, "version conflict, retrying");
                        Ok(false)
                    }
                    other => Err(other.into()),
                }
            }
        }
    }

    fn exhausted(user_id: &str) -> CoreError {
        CoreError::Conflict {
            user_id: user_id.to_string(),
            attempts: MAX_ATTEMPTS,
        }
    }

    // ── Character provisioning ──────────────────────────────────────────

    /// Create the character if it does not exist yet.
    pub async fn register_character(&self, user_id: &str) -> Result<Character> {
        if user_id.trim().is_empty() {
            return Err(CoreError::InvalidState("user id must not be empty".into()));
        }
        let _guard = self.gate.enter(user_id).await;
        for _ in 0..MAX_ATTEMPTS {
            if let Some(existing) = self.store.character(user_id)? {
                return Ok(existing);
            }
            let character = Character::new(
                user_id,
                self.curve.requirement(1),
                self.config.max_health,
                self.clock.now(),
            );
            if self.try_commit(vec![Write::PutCharacter(character.clone())], None).await? {
                info!(user_id, "character created");
                return Ok(Character {
                    version: 1,
                    ..character
                });
            }
        }
        Err(Self::exhausted(user_id))
    }

    // ── Recurring tasks ─────────────────────────────────────────────────

    async fn insert_recurring(&self, user_id: &str, task: RecurringTask) -> Result<RecurringTask> {
        if task.title.trim().is_empty() {
            return Err(CoreError::InvalidState("title must not be empty".into()));
        }
        let _guard = self.gate.enter(user_id).await;
        self.character(user_id)?;
        self.store.commit(vec![Write::PutRecurring(task.clone())])?;
        debug!(user_id, task_id = %task.id, kind = task.kind.as_str(), "recurring task created");
        Ok(RecurringTask {
            version: 1,
            ..task
        })
    }

    pub async fn create_habit(
        &self,
        user_id: &str,
        title: &str,
        description: Option<String>,
        difficulty: Difficulty,
        polarity: Polarity,
    ) -> Result<RecurringTask> {
        let mut task = RecurringTask::habit(user_id, title, difficulty, polarity, self.clock.now());
        task.description = description;
        self.insert_recurring(user_id, task).await
    }

    pub async fn create_daily(
        &self,
        user_id: &str,
        title: &str,
        description: Option<String>,
        difficulty: Difficulty,
    ) -> Result<RecurringTask> {
        let mut task = RecurringTask::daily(user_id, title, difficulty, self.clock.now());
        task.description = description;
        self.insert_recurring(user_id, task).await
    }

    /// Hard delete. Milestones and streaks go with it; gold and experience
    /// already earned stay.
    pub async fn delete_recurring(&self, user_id: &str, task_id: &str) -> Result<()> {
        let _guard = self.gate.enter(user_id).await;
        for _ in 0..MAX_ATTEMPTS {
            let task = self.recurring_owned(user_id, task_id)?;
            let write = Write::DeleteRecurring {
                id: task.id,
                version: task.version,
            };
            if self.try_commit(vec![write], None).await? {
                debug!(user_id, task_id, "recurring task deleted");
                return Ok(());
            }
        }
        Err(Self::exhausted(user_id))
    }

    async fn run_commitment<C: RecurringCommitment>(
        &self,
        user_id: &str,
        task_id: &str,
        machine: C,
        action: C::Action,
    ) -> Result<CommitmentOutcome> {
        let _guard = self.gate.enter(user_id).await;
        for _ in 0..MAX_ATTEMPTS {
            let now = self.clock.now();
            let mut character = self.character(user_id)?;
            let mut task = self.recurring_owned(user_id, task_id)?;
            machine.check_kind(&task)?;

            let transition = machine.apply(&mut task, action, &DayContext::new(now, self.zone));
            let level_before = character.level;
            let gold = self.settle(&mut character, transition.experience_delta, transition.gold_delta);
            if transition.apply_health && transition.health_penalty > 0 {
                character.damage(transition.health_penalty);
            }

            let mut audit = AuditBatch::new(user_id, now);
            audit.record(
                transition.category,
                transition.message.clone(),
                transition.experience_delta,
                gold,
            );
            audit.record_level_change(level_before, character.level);

            let mut writes = vec![
                Write::PutCharacter(character.clone()),
                Write::PutRecurring(task.clone()),
            ];
            writes.extend(audit.into_entries().into_iter().map(Write::AppendAudit));

            if self.try_commit(writes, None).await? {
                if let Some(label) = &transition.milestone {
                    info!(user_id, task_id, milestone = %label, "milestone unlocked");
                }
                character.version += 1;
                task.version += 1;
                return Ok(CommitmentOutcome {
                    leveled_up: character.level > level_before,
                    task,
                    character,
                    transition,
                });
            }
        }
        Err(Self::exhausted(user_id))
    }

    /// Report a success or failure on a habit (polarity x outcome model).
    pub async fn trigger_habit(
        &self,
        user_id: &str,
        task_id: &str,
        outcome: TriggerOutcome,
    ) -> Result<CommitmentOutcome> {
        let machine = HabitTrigger::new(&self.config.habit_trigger);
        self.run_commitment(user_id, task_id, machine, outcome).await
    }

    /// Mark a habit done for today, or undo today's mark.
    pub async fn toggle_habit(&self, user_id: &str, task_id: &str) -> Result<CommitmentOutcome> {
        let machine = HabitToggle::new(&self.config.habit_toggle);
        self.run_commitment(user_id, task_id, machine, ()).await
    }

    /// Complete a daily quest, or undo the completion.
    pub async fn toggle_daily(&self, user_id: &str, task_id: &str) -> Result<CommitmentOutcome> {
        let machine = DailyToggle::new(&self.config.daily);
        self.run_commitment(user_id, task_id, machine, ()).await
    }

    // ── Loan tasks ──────────────────────────────────────────────────────

    /// Schedule if asked, commit, and on success cancel the replaced
    /// callback. `Ok(None)` on version conflict.
    async fn commit_loan(
        &self,
        mut character: Character,
        mut task: LoanTask,
        transition: LoanTransition,
        remove: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<LoanOutcome>> {
        let mut warnings = Vec::new();
        let mut scheduled = None;
        if let Some(at) = transition.schedule_at {
            let (handle, err) = schedule_or_degrade(self.scheduler.as_ref(), &task.id, at).await;
            if let Some(err) = err {
                warnings.push(CoreError::ExternalScheduling(err).to_string());
            }
            task.callback = Some(handle.clone());
            scheduled = Some(handle);
        }

        let level_before = character.level;
        let gold = self.settle(&mut character, transition.experience_delta, transition.gold_delta);

        let mut audit = AuditBatch::new(character.user_id.clone(), now);
        if let Some((category, message)) = &transition.audit {
            audit.record(*category, message.clone(), transition.experience_delta, gold);
        }
        audit.record_level_change(level_before, character.level);

        let mut writes = vec![Write::PutCharacter(character.clone())];
        if remove {
            writes.push(Write::DeleteLoan {
                id: task.id.clone(),
                version: task.version,
            });
        } else {
            writes.push(Write::PutLoan(task.clone()));
        }
        writes.extend(audit.into_entries().into_iter().map(Write::AppendAudit));

        if !self.try_commit(writes, scheduled.as_ref()).await? {
            return Ok(None);
        }
        if let Some(old) = &transition.cancel {
            cancel_best_effort(self.scheduler.as_ref(), old).await;
        }

        character.version += 1;
        task.version += 1;
        Ok(Some(LoanOutcome {
            task: (!remove).then_some(task),
            character,
            gold_delta: gold,
            warnings,
        }))
    }

    /// Create a todo. A future deadline pays the reward upfront and
    /// schedules the deadline callback; a scheduling failure is reported as
    /// a warning, not an error.
    pub async fn create_loan(&self, user_id: &str, new: NewLoan) -> Result<LoanOutcome> {
        if new.title.trim().is_empty() {
            return Err(CoreError::InvalidState("title must not be empty".into()));
        }
        let _guard = self.gate.enter(user_id).await;
        for _ in 0..MAX_ATTEMPTS {
            let now = self.clock.now();
            let character = self.character(user_id)?;
            let (task, transition) = loan::create(
                user_id,
                &new.title,
                new.description.clone(),
                new.difficulty,
                new.deadline,
                &self.config.todo,
                now,
            );
            if let Some(outcome) = self.commit_loan(character, task, transition, false, now).await? {
                debug!(user_id, gold = outcome.gold_delta, "loan task created");
                return Ok(outcome);
            }
        }
        Err(Self::exhausted(user_id))
    }

    async fn run_loan<F>(&self, user_id: &str, task_id: &str, remove: bool, op: F) -> Result<LoanOutcome>
    where
        F: Fn(&mut LoanTask, &Character, DateTime<Utc>) -> Result<LoanTransition> + Send + Sync,
    {
        let _guard = self.gate.enter(user_id).await;
        for _ in 0..MAX_ATTEMPTS {
            let now = self.clock.now();
            let character = self.character(user_id)?;
            let mut task = self.loan_owned(user_id, task_id)?;
            let transition = op(&mut task, &character, now)?;
            if let Some(outcome) = self.commit_loan(character, task, transition, remove, now).await? {
                return Ok(outcome);
            }
        }
        Err(Self::exhausted(user_id))
    }

    /// Complete an active todo: reward again plus experience.
    pub async fn complete_loan(&self, user_id: &str, task_id: &str) -> Result<LoanOutcome> {
        let rules = &self.config.todo;
        self.run_loan(user_id, task_id, false, |task, _, now| loan::complete(task, rules, now))
            .await
    }

    /// Delete a todo, returning an outstanding loan.
    pub async fn delete_loan(&self, user_id: &str, task_id: &str) -> Result<LoanOutcome> {
        self.run_loan(user_id, task_id, true, |task, _, _| Ok(loan::delete(task)))
            .await
    }

    /// Renew an overdue todo for a fee.
    pub async fn renew_loan(
        &self,
        user_id: &str,
        task_id: &str,
        deadline: DateTime<Utc>,
    ) -> Result<LoanOutcome> {
        let rules = &self.config.todo;
        self.run_loan(user_id, task_id, false, |task, character, now| {
            loan::renew(task, deadline, character.gold, rules, now)
        })
        .await
    }

    /// Add, move or remove the deadline of an active todo.
    pub async fn edit_loan_deadline(
        &self,
        user_id: &str,
        task_id: &str,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<LoanOutcome> {
        self.run_loan(user_id, task_id, false, |task, _, now| {
            loan::edit_deadline(task, deadline, now)
        })
        .await
    }

    /// Deadline callback from the relay. Idempotent: only an active task past
    /// its current deadline is penalized.
    pub async fn deadline_callback(&self, task_id: &str) -> Result<CallbackVerdict> {
        let owner = self
            .store
            .loan_task(task_id)?
            .ok_or_else(|| CoreError::not_found("loan task", task_id))?
            .user_id;

        let _guard = self.gate.enter(&owner).await;
        for _ in 0..MAX_ATTEMPTS {
            let now = self.clock.now();
            let mut task = self.loan_owned(&owner, task_id)?;
            let (verdict, transition) = loan::expire(&mut task, &self.config.todo, now);
            if verdict != CallbackVerdict::Penalized {
                debug!(task_id, ?verdict, "deadline callback ignored");
                return Ok(verdict);
            }
            let character = self.character(&owner)?;
            if let Some(outcome) = self.commit_loan(character, task, transition, false, now).await? {
                info!(
                    user_id = %owner,
                    task_id,
                    penalty = -outcome.gold_delta,
                    "todo overdue"
                );
                return Ok(verdict);
            }
        }
        Err(Self::exhausted(&owner))
    }

    // ── Reconciliation ──────────────────────────────────────────────────

    /// Roll one user over to today if needed. `Ok(None)` when the user was
    /// already reconciled today.
    pub async fn reconcile_user(&self, user_id: &str) -> Result<Option<sweep::UserReconciliation>> {
        let _guard = self.gate.enter(user_id).await;
        for _ in 0..MAX_ATTEMPTS {
            let now = self.clock.now();
            let character = self.character(user_id)?;
            let tasks = self.store.recurring_tasks(user_id)?;
            let Some(plan) = sweep::reconcile_user(&character, &tasks, &self.config, &self.zone, now)
            else {
                return Ok(None);
            };

            let mut audit = AuditBatch::new(user_id, now);
            for (category, message) in &plan.penalties {
                audit.record(*category, message.clone(), 0, 0.0);
            }
            let mut writes = vec![Write::PutCharacter(plan.character.clone())];
            writes.extend(plan.changed_tasks.iter().cloned().map(Write::PutRecurring));
            writes.extend(audit.into_entries().into_iter().map(Write::AppendAudit));

            if self.try_commit(writes, None).await? {
                return Ok(Some(plan));
            }
        }
        Err(Self::exhausted(user_id))
    }

    /// Reconcile every user. One user's failure is logged and recorded in
    /// the report; the rest still run.
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for user_id in self.store.user_ids()? {
            report.users_seen += 1;
            match self.reconcile_user(&user_id).await {
                Ok(Some(plan)) => {
                    report.users_reconciled += 1;
                    report.habits_penalized += plan.penalties.len();
                    report.dailies_reset += plan
                        .changed_tasks
                        .iter()
                        .filter(|t| t.kind == TaskKind::Daily)
                        .count();
                    report.health_lost += u64::from(plan.health_penalty);
                    if plan.health_penalty > 0 {
                        info!(user_id = %user_id, health = plan.health_penalty, "missed habits penalized");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "reconciliation failed for user");
                    report.failures.push((user_id, e.to_string()));
                }
            }
        }
        info!(
            users = report.users_seen,
            reconciled = report.users_reconciled,
            failures = report.failures.len(),
            "sweep finished"
        );
        Ok(report)
    }
}
