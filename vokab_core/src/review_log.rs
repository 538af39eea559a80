//! Append-only review log.
//!
//! Every graded review is appended to a JSONL (JSON Lines) file with file
//! locking so that concurrent `vokab` processes never interleave lines.

use crate::{CardId, Error, Grade, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One graded review
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReviewEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub card_id: CardId,
    pub grade: Grade,
    pub reviewed_at: DateTime<Utc>,
    pub interval_days: f64,
    pub ease_factor: f64,
    pub due_at: DateTime<Utc>,
}

/// Review sink trait for recording reviews
pub trait ReviewSink {
    fn append(&mut self, event: &ReviewEvent) -> Result<()>;
}

/// JSONL-based review log with file locking
pub struct JsonlReviewLog {
    path: PathBuf,
}

impl JsonlReviewLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn write_line(&self, event: &ReviewEvent) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(event)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;
        Ok(())
    }
}

impl ReviewSink for JsonlReviewLog {
    fn append(&mut self, event: &ReviewEvent) -> Result<()> {
        self.write_line(event).map_err(|e| {
            Error::Persistence(format!("failed to append to review log {:?}: {}", self.path, e))
        })?;
        tracing::debug!("Appended review of card {} to log", event.card_id);
        Ok(())
    }
}

/// Read all reviews from a log file
///
/// Lines that fail to parse (e.g. a torn final write) are skipped with a warning.
pub fn read_reviews(path: &Path) -> Result<Vec<ReviewEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut events = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<ReviewEvent>(&line) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!("Failed to parse review at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} reviews from log", events.len());
    Ok(events)
}
