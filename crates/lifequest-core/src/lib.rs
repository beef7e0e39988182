//! # LifeQuest Core Library
//!
//! This library turns user actions on habits, daily quests and deadline-bound
//! todos into changes to a persistent character sheet (level, experience,
//! gold, health), and reconciles that sheet once per calendar day.
//!
//! ## Architecture
//!
//! - **Leveling**: a pure level curve used by every experience change,
//!   including negative ones from undo paths
//! - **State machines**: habit trigger, habit toggle, daily toggle and the
//!   loan todo lifecycle, all pure functions over the entities
//! - **Engine**: serializes each user's operations, applies the transitions
//!   and commits entities plus audit entries as one versioned batch
//! - **Sweep**: the daily rollover, run under the same per-user lock
//! - **Collaborators**: [`Store`] for persistence and [`CallbackScheduler`]
//!   for deadline callbacks, both swappable behind traits
//!
//! ## Key Components
//!
//! - [`Engine`]: every user-facing operation
//! - [`LevelCurve`]: level thresholds and `apply_experience`
//! - [`SqliteStore`]: on-disk persistence
//! - [`AppConfig`]: TOML configuration

pub mod audit;
pub mod clock;
pub mod config;
pub mod daily;
pub mod engine;
pub mod error;
pub mod gate;
pub mod habit;
mod legacy;
pub mod leveling;
pub mod loan;
pub mod model;
pub mod scheduler;
pub mod storage;
pub mod sweep;
pub mod time;
pub mod webhook;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, GameConfig};
pub use engine::{CommitmentOutcome, Engine, LoanOutcome, NewLoan};
pub use error::{ConfigError, CoreError, Result, SchedulerError, StoreError};
pub use habit::TriggerOutcome;
pub use leveling::{LevelChange, LevelCurve};
pub use loan::CallbackVerdict;
pub use model::{
    AuditCategory, AuditEntry, Character, Difficulty, LoanStatus, LoanTask, Polarity,
    RecurringTask, TaskKind,
};
pub use scheduler::{
    CallbackScheduler, HttpCallbackScheduler, InMemoryScheduler, NoopScheduler, ScheduleHandle,
};
pub use storage::{MemoryStore, SqliteStore, Store};
pub use sweep::SweepReport;
pub use time::ReferenceZone;
pub use webhook::CallbackAuth;
