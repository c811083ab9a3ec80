//! Error types for the client core.

use thiserror::Error;

/// Main error type for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection not established")]
    NotConnected,

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Address derivation failed: {0}")]
    Derivation(String),

    #[error("Failed to decode {account}: {reason}")]
    Decode { account: String, reason: String },

    #[error("Mutation failed: {0}")]
    Mutation(String),

    #[error("Duplicate subscription for key {0}")]
    DuplicateSubscription(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Missing prerequisite: {0}")]
    MissingPrerequisite(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Build a decode error for the named account type.
    pub fn decode(account: &str, reason: impl Into<String>) -> Self {
        ClientError::Decode {
            account: account.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Config(e.to_string())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
