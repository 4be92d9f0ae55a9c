//! Application-wide error types.

use thiserror::Error;

use crate::bus::SendError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Bencode error: {0}")]
    Bencode(#[from] serde_bencode::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Tracker {tracker} failed: {message}")]
    Tracker { tracker: String, message: String },

    #[error("Torrent client {client} failed: {message}")]
    TorrentClient { client: String, message: String },

    #[error("Bus send failed: {0}")]
    Send(#[from] SendError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn tracker(tracker: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tracker {
            tracker: tracker.into(),
            message: message.into(),
        }
    }

    pub fn torrent_client(client: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TorrentClient {
            client: client.into(),
            message: message.into(),
        }
    }
}
