use std::path::PathBuf;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::source::SourceError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    #[error("No credentials available for repository '{repo}'")]
    MissingCredentials { repo: String },

    #[error("Sync job not found: {0}")]
    JobNotFound(String),

    #[error("Source provider error: {0}")]
    Source(#[from] SourceError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Embedding trigger failed: {0}")]
    EmbeddingTrigger(String),
}

impl SyncError {
    /// Returns true for errors that prevent a job from ever starting.
    pub fn is_setup_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::RepoNotFound(_) | SyncError::MissingCredentials { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Dispatcher is closed")]
    Closed,

    #[error("Failed to encode dispatch payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode dispatch payload for '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, SyncError>;
