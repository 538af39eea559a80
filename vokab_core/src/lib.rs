#![forbid(unsafe_code)]

//! Core domain model and business logic for the vokabulatr drill engine.
//!
//! This crate provides:
//! - Domain types (cards, review state, grades, attempt statistics)
//! - SM-2 derived scheduler
//! - Card store and study sessions
//! - Persistence (JSON deck file, review log, CSV import/export)
//! - Typed-answer matching

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod scheduler;
pub mod store;
pub mod session;
pub mod persistence;
pub mod review_log;
pub mod csv_io;
pub mod matcher;
pub mod engine;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::{Config, MatcherConfig, SchedulerConfig, SessionConfig};
pub use scheduler::{next_state, Scheduler};
pub use store::{CardPredicate, CardStore, StudyMode};
pub use session::{NextCard, Session, SessionStatus, SessionSummary, Submission};
pub use persistence::{JsonDeckFile, MemoryGateway, PersistenceGateway};
pub use review_log::{read_reviews, JsonlReviewLog, ReviewEvent, ReviewSink};
pub use matcher::AnswerMatcher;
pub use engine::Engine;
