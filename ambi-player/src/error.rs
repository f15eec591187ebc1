//! Error types for ambi-player
//!
//! Mirrors the failure taxonomy of the controller: media load, storage quota
//! and persistence failures are all recoverable and are logged by the caller
//! rather than propagated to staff.

use thiserror::Error;

/// Main error type for ambi-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared model layer (keys, config parsing)
    #[error(transparent)]
    Common(#[from] ambi_common::Error),

    /// Source unreachable or corrupt; treated as end of track
    #[error("Media load error: {0}")]
    MediaLoad(String),

    /// Not enough cache space could be freed, or the cache write failed
    #[error("Storage quota error: {0}")]
    StorageQuota(String),

    /// Queue or cache store read/write failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Queue management errors
    #[error("Queue error: {0}")]
    Queue(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Another transition holds the playback guard
    #[error("Transition already in flight")]
    TransitionInFlight,
}

/// Convenience Result type using ambi-player Error
pub type Result<T> = std::result::Result<T, Error>;
