//! Core domain types for the vocabulary engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Cards and their identifiers
//! - Per-card review (scheduling) state
//! - Grades submitted after a review
//! - Attempt statistics and persistence records

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Card Types
// ============================================================================

/// Stable identifier for a card
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(Uuid);

impl CardId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CardId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for CardId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CardId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| Error::Validation(format!("Invalid card id '{}': {}", s, e)))
    }
}

/// A single vocabulary entry
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Card {
    pub id: CardId,
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl Card {
    /// Build a validated card with a fresh id.
    ///
    /// Front and back are trimmed and must not be empty. Blank tags are dropped.
    pub fn new<I, S>(front: &str, back: &str, tags: I, now: DateTime<Utc>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let card = Card {
            id: CardId::new(),
            front: front.trim().to_string(),
            back: back.trim().to_string(),
            tags: normalize_tags(tags),
            created_at: now,
        };
        card.validate()?;
        Ok(card)
    }

    /// Check the invariants every stored card must satisfy
    pub fn validate(&self) -> Result<()> {
        if self.front.trim().is_empty() {
            return Err(Error::Validation(format!("Card {} has an empty front", self.id)));
        }
        if self.back.trim().is_empty() {
            return Err(Error::Validation(format!("Card {} has an empty back", self.id)));
        }
        Ok(())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag.trim())
    }
}

/// Trim tags and drop empty ones
pub(crate) fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

// ============================================================================
// Review State
// ============================================================================

/// Scheduling metadata for one card
///
/// Only the scheduler produces new values of this type; the session never
/// edits `due_at` directly.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReviewState {
    pub due_at: DateTime<Utc>,
    pub interval_days: f64,
    pub ease_factor: f64,
    pub repetition_count: u32,
    pub lapse_count: u32,
    #[serde(default)]
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl ReviewState {
    /// State of a card that has never been reviewed
    pub fn initial(now: DateTime<Utc>, initial_ease: f64) -> Self {
        Self {
            due_at: now,
            interval_days: 0.0,
            ease_factor: initial_ease,
            repetition_count: 0,
            lapse_count: 0,
            last_reviewed_at: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

// ============================================================================
// Grades
// ============================================================================

/// Outcome of a single review
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Fail,
    Hard,
    Good,
    Easy,
}

impl Grade {
    pub const ALL: [Grade; 4] = [Grade::Fail, Grade::Hard, Grade::Good, Grade::Easy];

    /// Anything but `Fail` counts as a correct recall
    pub fn is_success(self) -> bool {
        self != Grade::Fail
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::Fail => "fail",
            Grade::Hard => "hard",
            Grade::Good => "good",
            Grade::Easy => "easy",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fail" | "f" | "again" | "a" | "0" => Ok(Grade::Fail),
            "hard" | "h" | "1" => Ok(Grade::Hard),
            "good" | "g" | "2" => Ok(Grade::Good),
            "easy" | "e" | "3" => Ok(Grade::Easy),
            other => Err(Error::Validation(format!("Unknown grade: '{}'", other))),
        }
    }
}

// ============================================================================
// Attempt Statistics
// ============================================================================

/// Number of attempts the rolling history keeps
pub const HISTORY_LEN: u32 = 64;

/// Running tally of attempts for a card (or a whole deck)
///
/// `history` stores one bit per attempt for the last `min(64, attempts)`
/// attempts, newest in the lowest bit, 1 meaning correct.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttemptStats {
    pub attempts: u32,
    pub correct: u32,
    pub history: u64,
}

impl AttemptStats {
    pub fn record_attempt(&mut self, correct: bool) {
        self.attempts = self.attempts.saturating_add(1);
        self.history <<= 1;
        if correct {
            self.correct = self.correct.saturating_add(1);
            self.history |= 1;
        }
    }

    /// How many attempts the rolling history covers
    pub fn recent_attempts(&self) -> u32 {
        self.attempts.min(HISTORY_LEN)
    }

    /// Correct attempts within the rolling history
    pub fn recently_correct(&self) -> u32 {
        self.history.count_ones()
    }

    /// Percentage of recent attempts that were correct (100 with no attempts)
    pub fn recent_accuracy(&self) -> f64 {
        match self.recent_attempts() {
            0 => 100.0,
            n => self.recently_correct() as f64 / n as f64 * 100.0,
        }
    }

    /// Render the rolling history oldest-first
    pub fn history_string(&self, correct: &str, incorrect: &str) -> String {
        let oldest = self.recent_attempts();
        (0..oldest)
            .rev()
            .map(|i| {
                if (self.history >> i) & 1 == 1 {
                    correct
                } else {
                    incorrect
                }
            })
            .collect()
    }
}

// ============================================================================
// Persistence Record
// ============================================================================

/// One card with everything the store keeps about it
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CardRecord {
    pub card: Card,
    /// `None` until the card has been reviewed once
    #[serde(default)]
    pub state: Option<ReviewState>,
    #[serde(default)]
    pub stats: AttemptStats,
}

/// Everything saved for a deck: its cards and the deck-wide tally
///
/// The deck tally keeps its own rolling history, so it cannot be rebuilt
/// from the per-card tallies.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DeckSnapshot {
    pub cards: Vec<CardRecord>,
    #[serde(default)]
    pub stats: AttemptStats,
}
