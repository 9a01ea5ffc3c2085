//! Core error types for studyplan-core.
//!
//! This module defines the error hierarchy using thiserror. The sync engine
//! maps these onto its per-pass error list; only source-level setup failures
//! surface as `Err` out of a pass.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for studyplan-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// OAuth-related errors
    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

    /// Feed fetch/parse errors
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    /// Sync pass setup errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
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

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// OAuth-specific errors.
///
/// The token manager converts all of these into "reconnect required"
/// (`None`) for callers; they never abort a pass on their own.
#[derive(Error, Debug)]
pub enum OAuthError {
    /// Token refresh failed
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// Access token expired
    #[error("Access token expired and no refresh token available")]
    TokenExpired,

    /// Credentials not configured
    #[error("OAuth client credentials not configured for {provider}")]
    CredentialsNotConfigured { provider: String },
}

/// Errors fetching or parsing an external calendar feed.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Network-level failure
    #[error("Request to {url} failed: {message}")]
    Http { url: String, message: String },

    /// Non-success HTTP status
    #[error("{context} returned HTTP {status}")]
    Status { context: String, status: u16 },

    /// Malformed calendar data
    #[error("Failed to parse calendar data: {0}")]
    Parse(String),
}

/// Source-level setup failures that short-circuit a sync pass.
///
/// Everything below the per-event and per-calendar loops is recorded in the
/// pass's error list instead of being raised.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Unknown source id
    #[error("Calendar source not found: {0}")]
    SourceNotFound(String),

    /// Source paused via is_active
    #[error("Calendar source '{0}' is paused")]
    SourcePaused(String),

    /// Advisory syncing flag already set
    #[error("A sync pass is already running for source '{0}'")]
    AlreadySyncing(String),

    /// Feed source without a URL
    #[error("Calendar source '{0}' has no feed URL")]
    MissingFeedUrl(String),

    /// Upload source without stored ICS text
    #[error("Calendar source '{0}' has no stored ICS payload")]
    MissingPayload(String),

    /// Remote source without a provider connection
    #[error("Calendar source '{0}' has no provider connection; reconnect required")]
    NotConnected(String),

    /// Token could not be refreshed
    #[error("Provider token could not be refreshed; reconnect required")]
    ReconnectRequired,

    /// Remote source with an empty calendar selection
    #[error("Calendar source '{0}' has no calendars selected")]
    NoCalendarsSelected(String),
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(DatabaseError::from(err))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
