//! Database schema migrations for lifequest.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::warn;

/// Schema version after all migrations.
pub const CURRENT_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (fresh database).
pub(crate) fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: characters, recurring tasks, loan tasks and the audit log.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS characters (
            user_id                  TEXT PRIMARY KEY,
            level                    INTEGER NOT NULL DEFAULT 1,
            experience               INTEGER NOT NULL DEFAULT 0,
            max_experience           INTEGER NOT NULL,
            gold                     REAL NOT NULL DEFAULT 0,
            health                   INTEGER NOT NULL DEFAULT 100,
            reconciliation_watermark TEXT,
            version                  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS recurring_tasks (
            id                TEXT PRIMARY KEY,
            user_id           TEXT NOT NULL,
            title             TEXT NOT NULL,
            description       TEXT,
            kind              TEXT NOT NULL,
            difficulty        TEXT NOT NULL DEFAULT 'medium',
            polarity          TEXT,
            streak            INTEGER NOT NULL DEFAULT 0,
            best_streak       INTEGER NOT NULL DEFAULT 0,
            completed_today   INTEGER NOT NULL DEFAULT 0,
            last_completed_at TEXT,
            milestones        TEXT NOT NULL DEFAULT '[]',
            created_at        TEXT NOT NULL,
            version           INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS loan_tasks (
            id                 TEXT PRIMARY KEY,
            user_id            TEXT NOT NULL,
            title              TEXT NOT NULL,
            description        TEXT,
            difficulty         TEXT NOT NULL DEFAULT 'medium',
            deadline           TEXT,
            status             TEXT NOT NULL DEFAULT 'active',
            potential_reward   REAL NOT NULL,
            upfront_gold_given REAL NOT NULL DEFAULT 0,
            callback           TEXT,
            completed_at       TEXT,
            created_at         TEXT NOT NULL,
            version            INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id          TEXT NOT NULL,
            message          TEXT NOT NULL,
            experience_delta INTEGER NOT NULL DEFAULT 0,
            category         TEXT NOT NULL,
            timestamp        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_recurring_user ON recurring_tasks(user_id);
        CREATE INDEX IF NOT EXISTS idx_loan_user ON loan_tasks(user_id);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: signed gold change on audit entries, plus the feed index.
///
/// Existing entries predate gold tracking and get 0.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE audit_log ADD COLUMN gold_delta REAL NOT NULL DEFAULT 0;
         CREATE INDEX IF NOT EXISTS idx_audit_user_time ON audit_log(user_id, timestamp);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_from_scratch() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);

        conn.execute(
            "INSERT INTO audit_log (user_id, message, category, timestamp, gold_delta)
             VALUES ('u1', 'Todo Bet Started: X', 'todo_create', '2026-01-01T00:00:00Z', 20.0)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_migrate_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);
    }

    #[test]
    fn test_incremental_migration_backfills_gold_delta() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        conn.execute(
            "INSERT INTO audit_log (user_id, message, experience_delta, category, timestamp)
             VALUES ('u1', 'Habit Done: Read', 5, 'habit', '2025-12-31T10:00:00')",
            [],
        )
        .unwrap();

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 2);

        let gold: f64 = conn
            .query_row("SELECT gold_delta FROM audit_log WHERE user_id = 'u1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(gold, 0.0);
    }
}
