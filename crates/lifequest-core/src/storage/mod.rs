//! Persistence.
//!
//! [`Store`] is the persisted-document collaborator: lookups by id or owner
//! plus one atomic, version-checked batch write. Every entity carries the
//! `version` it was read at; [`Store::commit`] refuses the whole batch if any
//! stored version moved in the meantime (`0` means "must not exist yet").

mod memory;
pub mod migrations;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::path::PathBuf;

use crate::error::{ConfigError, StoreError};
use crate::model::{AuditEntry, Character, LoanTask, RecurringTask};

/// One element of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    PutCharacter(Character),
    PutRecurring(RecurringTask),
    DeleteRecurring { id: String, version: u64 },
    PutLoan(LoanTask),
    DeleteLoan { id: String, version: u64 },
    AppendAudit(AuditEntry),
}

/// Storage backend shared by the engine and the sweep.
pub trait Store: Send + Sync {
    /// Every user that has a character.
    fn user_ids(&self) -> Result<Vec<String>, StoreError>;

    fn character(&self, user_id: &str) -> Result<Option<Character>, StoreError>;

    fn recurring_task(&self, id: &str) -> Result<Option<RecurringTask>, StoreError>;

    fn recurring_tasks(&self, user_id: &str) -> Result<Vec<RecurringTask>, StoreError>;

    fn loan_task(&self, id: &str) -> Result<Option<LoanTask>, StoreError>;

    fn loan_tasks(&self, user_id: &str) -> Result<Vec<LoanTask>, StoreError>;

    /// Newest first.
    fn recent_audit(&self, user_id: &str, limit: usize) -> Result<Vec<AuditEntry>, StoreError>;

    /// Apply all writes or none.
    ///
    /// # Errors
    ///
    /// `StoreError::Conflict` if any versioned write is stale.
    fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError>;
}

/// Returns the data directory: `$LIFEQUEST_DATA_DIR` or `~/.config/lifequest/`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("LIFEQUEST_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("lifequest"),
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}

pub(crate) fn conflict(entity: &'static str, id: &str, expected: u64, found: u64) -> StoreError {
    StoreError::Conflict {
        entity,
        id: id.to_string(),
        expected,
        found,
    }
}
