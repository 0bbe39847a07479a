//! Error types for frontdesk.
//!
//! This module defines all error types used throughout the frontdesk crate.
//! Most of them never reach the operator: the queue degrades silently and
//! logs instead. They exist so every layer can propagate with `?` and decide
//! at the edge what to swallow.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for frontdesk operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Failed to write configuration.
    #[error("failed to save configuration to {path}: {message}")]
    ConfigSave {
        /// Destination file.
        path: PathBuf,
        /// Description of what went wrong.
        message: String,
    },

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// A `config set` key that does not exist.
    #[error("unknown configuration key: {0}")]
    UnknownKey(String),

    // === Remote Errors ===
    /// The remote credentials could not produce a client.
    #[error("cannot connect to remote store: {0}")]
    RemoteConnect(String),

    /// A remote request completed with a failure status.
    #[error("remote request failed: {0}")]
    RemoteRequest(String),

    /// The realtime change feed failed.
    #[error("realtime channel error: {0}")]
    Realtime(String),

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // === Parser Errors ===
    /// The text parser produced no usable result.
    #[error("text parse failed: {0}")]
    Parse(String),

    // === Queue Errors ===
    /// No entry with the given id (or id prefix).
    #[error("no entry matches id '{0}'")]
    EntryNotFound(String),

    /// An id prefix matched more than one entry.
    #[error("id prefix '{prefix}' is ambiguous ({count} matches)")]
    AmbiguousId {
        /// The prefix that was looked up.
        prefix: String,
        /// How many entries matched.
        count: usize,
    },

    /// A status string that is not one of the three queue states.
    #[error("invalid status '{0}' (expected waiting, in-progress or done)")]
    InvalidStatus(String),

    /// Required input was blank.
    #[error("{0} must not be empty")]
    EmptyInput(&'static str),

    // === Notification Errors ===
    /// The OS refused notification permission.
    #[error("notification permission denied: {0}")]
    PermissionDenied(String),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for frontdesk operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a remote connection error.
    #[must_use]
    pub fn remote_connect(message: impl Into<String>) -> Self {
        Self::RemoteConnect(message.into())
    }

    /// Create a remote request error.
    #[must_use]
    pub fn remote_request(message: impl Into<String>) -> Self {
        Self::RemoteRequest(message.into())
    }

    /// Create a realtime channel error.
    #[must_use]
    pub fn realtime(message: impl Into<String>) -> Self {
        Self::Realtime(message.into())
    }

    /// Create a parse error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Create an entry-not-found error.
    #[must_use]
    pub fn entry_not_found(id: impl Into<String>) -> Self {
        Self::EntryNotFound(id.into())
    }

    /// Check if this error means the entry does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EntryNotFound(_))
    }
}
