//! CSV deck import/export and review-log rollup.
//!
//! Decks are headerless `front,back[,tags]` rows, tags separated by `;`.
//! The review log can be rolled up into a CSV archive the same way the
//! session WAL is archived: append, fsync, then rename the log aside.

use crate::review_log::read_reviews;
use crate::{CardStore, ReviewEvent, Result};
use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;

/// Tag separator inside the third CSV column
const TAG_SEPARATOR: &str = ";";

/// Outcome of a deck import
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub added: usize,
    /// Rows whose front and back already exist in the deck
    pub duplicates: usize,
    /// Rows that could not be read or had an empty side
    pub invalid: usize,
}

/// Add every valid row of `input` to the store
///
/// Bad rows are logged and counted, never fatal.
pub fn import_deck(store: &mut CardStore, input: impl Read, now: DateTime<Utc>) -> Result<ImportReport> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut report = ImportReport::default();
    for (row, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Skipping unreadable CSV row {}: {}", row + 1, e);
                report.invalid += 1;
                continue;
            }
        };

        let front = record.get(0).unwrap_or_default();
        let back = record.get(1).unwrap_or_default();
        let tags = record
            .get(2)
            .map(|t| t.split(TAG_SEPARATOR).collect::<Vec<_>>())
            .unwrap_or_default();

        if store.find(front, back).is_some() {
            report.duplicates += 1;
            continue;
        }

        match store.add_card(front, back, tags, now) {
            Ok(_) => report.added += 1,
            Err(e) => {
                tracing::warn!("Skipping CSV row {}: {}", row + 1, e);
                report.invalid += 1;
            }
        }
    }

    tracing::info!(
        "Imported {} cards ({} duplicates, {} invalid)",
        report.added,
        report.duplicates,
        report.invalid
    );
    Ok(report)
}

/// Write every card as a `front,back,tags` row, in insertion order
pub fn export_deck(store: &CardStore, output: impl Write) -> Result<usize> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(output);

    let mut count = 0;
    for card in store.all_cards() {
        let tags = card
            .tags
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(TAG_SEPARATOR);
        writer.write_record([card.front.as_str(), card.back.as_str(), tags.as_str()])?;
        count += 1;
    }
    writer.flush()?;

    tracing::info!("Exported {} cards", count);
    Ok(count)
}

/// A row in the review archive
#[derive(Debug, serde::Serialize)]
struct ArchiveRow {
    id: String,
    session_id: String,
    card_id: String,
    grade: String,
    reviewed_at: String,
    interval_days: f64,
    ease_factor: f64,
    due_at: String,
}

impl From<&ReviewEvent> for ArchiveRow {
    fn from(event: &ReviewEvent) -> Self {
        ArchiveRow {
            id: event.id.to_string(),
            session_id: event.session_id.to_string(),
            card_id: event.card_id.to_string(),
            grade: event.grade.to_string(),
            reviewed_at: event.reviewed_at.to_rfc3339(),
            interval_days: event.interval_days,
            ease_factor: event.ease_factor,
            due_at: event.due_at.to_rfc3339(),
        }
    }
}

/// Roll up the review log into the CSV archive and set the log aside
///
/// - The archive is fsynced before the log is renamed
/// - The log is renamed to `*.processed`, not deleted, so it can be recovered
pub fn rollup_review_log(log_path: &Path, csv_path: &Path) -> Result<usize> {
    let events = read_reviews(log_path)?;

    if events.is_empty() {
        tracing::info!("No reviews in log to roll up");
        return Ok(0);
    }

    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;

    // Only a brand new archive gets a header row
    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for event in &events {
        writer.serialize(ArchiveRow::from(event))?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Wrote {} reviews to CSV archive", events.len());

    let processed_path = log_path.with_extension("wal.processed");
    std::fs::rename(log_path, &processed_path)?;

    tracing::info!("Archived review log to {:?}", processed_path);

    Ok(events.len())
}

/// Remove every `*.processed` log in `dir`
pub fn cleanup_processed_logs(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.extension().is_some_and(|ext| ext == "processed") {
            std::fs::remove_file(&path)?;
            tracing::debug!("Removed processed log: {:?}", path);
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Cleaned up {} processed review logs", count);
    }

    Ok(count)
}
