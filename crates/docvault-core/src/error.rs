use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Maximum number of characters of an offending line kept in a [`DecodeError`].
pub const DECODE_SNIPPET_LEN: usize = 120;

/// A single encoded document line failed to parse.
///
/// Always fatal for a restore: a corrupt line means a corrupt archive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", self.describe())]
pub struct DecodeError {
    /// The offending line, truncated to [`DECODE_SNIPPET_LEN`] characters
    pub snippet: String,

    /// Why the line could not be decoded
    pub reason: String,

    /// Archive entry the line came from, when known
    pub entry: Option<String>,

    /// 1-based line number inside the entry, when known
    pub line: Option<u64>,
}

impl DecodeError {
    pub fn new(line: &str, reason: impl Into<String>) -> Self {
        Self {
            snippet: truncate(line, DECODE_SNIPPET_LEN),
            reason: reason.into(),
            entry: None,
            line: None,
        }
    }

    /// Attach the archive position the line was read from.
    pub fn at(mut self, entry: impl Into<String>, line: u64) -> Self {
        self.entry = Some(entry.into());
        self.line = Some(line);
        self
    }

    fn describe(&self) -> String {
        match (&self.entry, self.line) {
            (Some(entry), Some(line)) => format!(
                "{} (entry {} line {}): {}",
                self.reason, entry, line, self.snippet
            ),
            _ => format!("{}: {}", self.reason, self.snippet),
        }
    }
}

fn truncate(line: &str, max_chars: usize) -> String {
    match line.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &line[..idx]),
        None => line.to_string(),
    }
}

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error on [{}]: {message}", keys.join(", "))]
    Storage { keys: Vec<String>, message: String },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl VaultError {
    pub fn storage(keys: impl IntoIterator<Item = impl Into<String>>, err: impl ToString) -> Self {
        Self::Storage {
            keys: keys.into_iter().map(Into::into).collect(),
            message: err.to_string(),
        }
    }

    /// Stable classification used in reports and alerts
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Archive(_) => ErrorKind::Archive,
            Self::Decode(_) => ErrorKind::Decode,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Database(_) => ErrorKind::Database,
            Self::Migration(_) => ErrorKind::Migration,
            Self::Verification(_) => ErrorKind::Verification,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Io(_) | Self::Serialization(_) | Self::InvalidState(_) | Self::Other(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error classification carried by reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Storage,
    Archive,
    Decode,
    NotFound,
    Database,
    Migration,
    Verification,
    Cancelled,
    Internal,
}

/// Serializable error detail for JSON reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&VaultError> for ErrorDetail {
    fn from(err: &VaultError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_truncates_long_lines() {
        let line = "x".repeat(500);
        let err = DecodeError::new(&line, "bad");
        assert_eq!(err.snippet.chars().count(), DECODE_SNIPPET_LEN + 1);
        assert!(err.snippet.ends_with('…'));
    }

    #[test]
    fn test_decode_error_position_in_message() {
        let err = DecodeError::new("{oops", "invalid JSON").at("users.jsonl", 7);
        let msg = err.to_string();
        assert!(msg.contains("users.jsonl"));
        assert!(msg.contains("line 7"));
    }

    #[test]
    fn test_storage_error_lists_keys() {
        let err = VaultError::storage(["a", "b"], "denied");
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(err.to_string(), "Storage error on [a, b]: denied");
    }
}
