//! Error types for the vokab_core library.

use crate::CardId;
use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for vokab_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad input data, e.g. a card with an empty front
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown card id
    #[error("Card not found: {0}")]
    NotFound(CardId),

    /// Nothing matched the study mode; the front end should say "nothing due"
    #[error("Nothing due for this session")]
    EmptySession,

    /// A grade was submitted for a card other than the one last presented
    #[error("Invalid submission: expected {expected}, got {got}")]
    InvalidSubmission {
        /// The card last returned by `next`, if any is awaiting a grade
        expected: String,
        got: CardId,
    },

    /// Loading or saving the deck failed; in-memory state is left intact
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
