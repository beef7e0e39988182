//! Core error types for lifequest-core.
//!
//! Caller-facing rejections (`NotFound`, `InvalidState`, `InvalidKind`,
//! `InsufficientFunds`) never leave a partial mutation behind: every
//! operation commits its writes as one batch or not at all.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for lifequest-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Entity missing, or not owned by the caller
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Operation attempted from a state that forbids it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Operation applied to the wrong recurring task kind
    #[error("Invalid task kind: expected {expected}, got {actual}")]
    InvalidKind {
        expected: &'static str,
        actual: &'static str,
    },

    /// Gold below the required cost
    #[error("Insufficient funds: {required:.2} gold required, {available:.2} available")]
    InsufficientFunds { required: f64, available: f64 },

    /// The scheduled-callback collaborator is unreachable or errored
    #[error("External scheduling failure: {0}")]
    ExternalScheduling(#[from] SchedulerError),

    /// A supplied deadline is not in the future
    #[error("Deadline must be in the future")]
    InvalidDeadline,

    /// Concurrent writers kept winning the optimistic commit
    #[error("Concurrent modification of user {user_id} after {attempts} attempts")]
    Conflict { user_id: String, attempts: u32 },

    /// Callback credential missing or wrong
    #[error("Unauthorized callback")]
    Unauthorized,

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Persistence errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A versioned write found a different version than it expected
    #[error("Version conflict on {entity} {id}: expected {expected}, found {found}")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: u64,
        found: u64,
    },

    /// A persisted row could not be decoded
    #[error("Malformed {entity} row {id}: {message}")]
    Decode {
        entity: &'static str,
        id: String,
        message: String,
    },
}

/// Errors talking to the scheduled-callback collaborator.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Transport-level failure
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Relay answered with a non-success status
    #[error("Relay returned {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Relay answered without a usable message id
    #[error("Malformed relay response: {0}")]
    MalformedResponse(String),

    /// Callback URL could not be built
    #[error("Invalid callback URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// No relay configured
    #[error("Scheduler not configured")]
    NotConfigured,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    || err.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
