//! SQLite-backed [`Store`].
//!
//! Timestamps are stored as RFC 3339 text. Rows written without an offset
//! are read back as UTC.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use super::{conflict, migrations, Store, Write};
use crate::error::StoreError;
use crate::model::{AuditEntry, Character, LoanTask, Milestone, RecurringTask, TaskKind};
use crate::scheduler::ScheduleHandle;
use crate::time::parse_persisted_timestamp;

const CHARACTER_COLUMNS: &str = "user_id, level, experience, max_experience, gold, health,
     reconciliation_watermark, version";

const RECURRING_COLUMNS: &str = "id, user_id, title, description, kind, difficulty, polarity,
     streak, best_streak, completed_today, last_completed_at, milestones, created_at, version";

const LOAN_COLUMNS: &str = "id, user_id, title, description, difficulty, deadline, status,
     potential_reward, upfront_gold_given, callback, completed_at, created_at, version";

/// SQLite store. One connection behind a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) and migrate the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// Row decoding

fn bad_column(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_persisted_timestamp(&raw).ok_or_else(|| bad_column(idx, format!("bad timestamp '{raw}'")))
}

fn opt_timestamp(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => parse_persisted_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| bad_column(idx, format!("bad timestamp '{raw}'"))),
        None => Ok(None),
    }
}

fn parsed<T: FromStr<Err = String>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| bad_column(idx, e))
}

fn json<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| bad_column(idx, e.to_string()))
}

fn read_character(row: &Row) -> rusqlite::Result<Character> {
    Ok(Character {
        user_id: row.get(0)?,
        level: row.get(1)?,
        experience: row.get(2)?,
        max_experience: row.get(3)?,
        gold: row.get(4)?,
        health: row.get(5)?,
        reconciliation_watermark: opt_timestamp(row, 6)?,
        version: row.get(7)?,
    })
}

fn read_recurring(row: &Row) -> rusqlite::Result<RecurringTask> {
    let kind: String = row.get(4)?;
    let kind = match kind.as_str() {
        "habit" => TaskKind::Habit,
        "daily" => TaskKind::Daily,
        other => return Err(bad_column(4, format!("unknown kind '{other}'"))),
    };
    let polarity = match row.get::<_, Option<String>>(6)? {
        Some(raw) => Some(raw.parse().map_err(|e| bad_column(6, e))?),
        None => None,
    };
    let milestones: Vec<Milestone> = json(row, 11)?;
    Ok(RecurringTask {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        kind,
        difficulty: parsed(row, 5)?,
        polarity,
        streak: row.get(7)?,
        best_streak: row.get(8)?,
        completed_today: row.get(9)?,
        last_completed_at: opt_timestamp(row, 10)?,
        milestones,
        created_at: timestamp(row, 12)?,
        version: row.get(13)?,
    })
}

fn read_loan(row: &Row) -> rusqlite::Result<LoanTask> {
    let callback = match row.get::<_, Option<String>>(9)? {
        Some(raw) => Some(
            serde_json::from_str::<ScheduleHandle>(&raw).map_err(|e| bad_column(9, e.to_string()))?,
        ),
        None => None,
    };
    Ok(LoanTask {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        difficulty: parsed(row, 4)?,
        deadline: opt_timestamp(row, 5)?,
        status: parsed(row, 6)?,
        potential_reward: row.get(7)?,
        upfront_gold_given: row.get(8)?,
        callback,
        completed_at: opt_timestamp(row, 10)?,
        created_at: timestamp(row, 11)?,
        version: row.get(12)?,
    })
}

fn read_audit(row: &Row) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        user_id: row.get(0)?,
        message: row.get(1)?,
        experience_delta: row.get(2)?,
        gold_delta: row.get(3)?,
        category: parsed(row, 4)?,
        timestamp: timestamp(row, 5)?,
    })
}

/// Conversion failures become `Decode` so a malformed row names itself.
fn decode_err<'a>(entity: &'static str, id: &'a str) -> impl Fn(rusqlite::Error) -> StoreError + 'a {
    move |e| match e {
        rusqlite::Error::FromSqlConversionFailure(_, _, source) => StoreError::Decode {
            entity,
            id: id.to_string(),
            message: source.to_string(),
        },
        other => other.into(),
    }
}

fn rfc3339(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(|t| t.to_rfc3339())
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::QueryFailed(e.to_string()))
}

fn stored_version(
    conn: &Connection,
    table: &str,
    key_column: &str,
    key: &str,
) -> Result<u64, StoreError> {
    let sql = format!("SELECT version FROM {table} WHERE {key_column} = ?1");
    let found: Option<u64> = conn
        .query_row(&sql, params![key], |row| row.get(0))
        .optional()?;
    Ok(found.unwrap_or(0))
}

fn expect_version(
    conn: &Connection,
    entity: &'static str,
    table: &str,
    key_column: &str,
    key: &str,
    expected: u64,
) -> Result<(), StoreError> {
    let found = stored_version(conn, table, key_column, key)?;
    if found == expected {
        Ok(())
    } else {
        Err(conflict(entity, key, expected, found))
    }
}

fn apply(conn: &Connection, write: &Write) -> Result<(), StoreError> {
    match write {
        Write::PutCharacter(c) => {
            expect_version(conn, "character", "characters", "user_id", &c.user_id, c.version)?;
            conn.execute(
                &format!("INSERT OR REPLACE INTO characters ({CHARACTER_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    c.user_id,
                    c.level,
                    c.experience,
                    c.max_experience,
                    c.gold,
                    c.health,
                    rfc3339(c.reconciliation_watermark),
                    c.version + 1,
                ],
            )?;
        }
        Write::PutRecurring(t) => {
            expect_version(conn, "recurring task", "recurring_tasks", "id", &t.id, t.version)?;
            conn.execute(
                &format!("INSERT OR REPLACE INTO recurring_tasks ({RECURRING_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"),
                params![
                    t.id,
                    t.user_id,
                    t.title,
                    t.description,
                    t.kind.as_str(),
                    t.difficulty.as_str(),
                    t.polarity.map(|p| p.as_str()),
                    t.streak,
                    t.best_streak,
                    t.completed_today,
                    rfc3339(t.last_completed_at),
                    encode(&t.milestones)?,
                    t.created_at.to_rfc3339(),
                    t.version + 1,
                ],
            )?;
        }
        Write::DeleteRecurring { id, version } => {
            expect_version(conn, "recurring task", "recurring_tasks", "id", id, *version)?;
            conn.execute("DELETE FROM recurring_tasks WHERE id = ?1", params![id])?;
        }
        Write::PutLoan(t) => {
            expect_version(conn, "loan task", "loan_tasks", "id", &t.id, t.version)?;
            let callback = t.callback.as_ref().map(encode).transpose()?;
            conn.execute(
                &format!("INSERT OR REPLACE INTO loan_tasks ({LOAN_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"),
                params![
                    t.id,
                    t.user_id,
                    t.title,
                    t.description,
                    t.difficulty.as_str(),
                    rfc3339(t.deadline),
                    t.status.as_str(),
                    t.potential_reward,
                    t.upfront_gold_given,
                    callback,
                    rfc3339(t.completed_at),
                    t.created_at.to_rfc3339(),
                    t.version + 1,
                ],
            )?;
        }
        Write::DeleteLoan { id, version } => {
            expect_version(conn, "loan task", "loan_tasks", "id", id, *version)?;
            conn.execute("DELETE FROM loan_tasks WHERE id = ?1", params![id])?;
        }
        Write::AppendAudit(e) => {
            conn.execute(
                "INSERT INTO audit_log (user_id, message, experience_delta, gold_delta, category, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    e.user_id,
                    e.message,
                    e.experience_delta,
                    e.gold_delta,
                    e.category.as_str(),
                    e.timestamp.to_rfc3339(),
                ],
            )?;
        }
    }
    Ok(())
}

impl Store for SqliteStore {
    fn user_ids(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT user_id FROM characters ORDER BY user_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn character(&self, user_id: &str) -> Result<Option<Character>, StoreError> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {CHARACTER_COLUMNS} FROM characters WHERE user_id = ?1"),
            params![user_id],
            read_character,
        )
        .optional()
        .map_err(decode_err("character", user_id))
    }

    fn recurring_task(&self, id: &str) -> Result<Option<RecurringTask>, StoreError> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {RECURRING_COLUMNS} FROM recurring_tasks WHERE id = ?1"),
            params![id],
            read_recurring,
        )
        .optional()
        .map_err(decode_err("recurring task", id))
    }

    fn recurring_tasks(&self, user_id: &str) -> Result<Vec<RecurringTask>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECURRING_COLUMNS} FROM recurring_tasks
             WHERE user_id = ?1 ORDER BY created_at, id"
        ))?;
        let tasks = stmt
            .query_map(params![user_id], read_recurring)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_err("recurring tasks of", user_id))?;
        Ok(tasks)
    }

    fn loan_task(&self, id: &str) -> Result<Option<LoanTask>, StoreError> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {LOAN_COLUMNS} FROM loan_tasks WHERE id = ?1"),
            params![id],
            read_loan,
        )
        .optional()
        .map_err(decode_err("loan task", id))
    }

    fn loan_tasks(&self, user_id: &str) -> Result<Vec<LoanTask>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOAN_COLUMNS} FROM loan_tasks
             WHERE user_id = ?1 ORDER BY created_at, id"
        ))?;
        let tasks = stmt
            .query_map(params![user_id], read_loan)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_err("loan tasks of", user_id))?;
        Ok(tasks)
    }

    fn recent_audit(&self, user_id: &str, limit: usize) -> Result<Vec<AuditEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, message, experience_delta, gold_delta, category, timestamp
             FROM audit_log
             WHERE user_id = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![user_id, limit as i64], read_audit)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_err("audit entries of", user_id))?;
        Ok(entries)
    }

    fn commit(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for write in &writes {
            apply(&tx, write)?;
        }
        tx.commit()?;
        Ok(())
    }
}
