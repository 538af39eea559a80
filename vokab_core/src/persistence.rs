//! Deck persistence with file locking.
//!
//! The engine only depends on the `PersistenceGateway` trait. The default
//! implementation keeps the whole deck in one JSON document and replaces it
//! atomically on every save.

use crate::{AttemptStats, CardRecord, DeckSnapshot, Error, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current on-disk deck format
pub const DECK_FORMAT_VERSION: u32 = 1;

/// Load and save a whole deck
pub trait PersistenceGateway {
    /// The deck as last saved, cards in their saved order
    fn load(&self) -> Result<DeckSnapshot>;

    /// Replace everything stored with `deck`
    fn save(&mut self, deck: &DeckSnapshot) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct DeckDocument {
    version: u32,
    cards: Vec<CardRecord>,
    /// Absent in decks written before the deck-wide tally existed
    #[serde(default)]
    stats: AttemptStats,
}

/// JSON deck file guarded by `fs2` locks
#[derive(Clone, Debug)]
pub struct JsonDeckFile {
    path: PathBuf,
}

impl JsonDeckFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<DeckDocument> {
        let file = File::open(&self.path)?;

        // Acquire shared lock for reading
        file.lock_shared()?;

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        file.unlock()?;
        read?;

        let document: DeckDocument = serde_json::from_str(&contents)?;
        if document.version > DECK_FORMAT_VERSION {
            return Err(Error::Persistence(format!(
                "deck format version {} is newer than supported version {}",
                document.version, DECK_FORMAT_VERSION
            )));
        }
        Ok(document)
    }

    /// Atomically writes the deck by:
    /// 1. Writing to a temp file in the same directory
    /// 2. Syncing to disk
    /// 3. Renaming over the existing deck
    fn write_document(&self, deck: &DeckSnapshot) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;

        // Acquire exclusive lock on the temp file to serialize concurrent writers
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let document = DeckDocument {
                version: DECK_FORMAT_VERSION,
                cards: deck.cards.clone(),
                stats: deck.stats,
            };
            serde_json::to_writer_pretty(&mut writer, &document)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        // Atomically replace old deck file
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

impl PersistenceGateway for JsonDeckFile {
    /// A missing file is an empty deck; anything unreadable is an error
    fn load(&self) -> Result<DeckSnapshot> {
        if !self.path.exists() {
            tracing::info!("No deck file at {:?}, starting with an empty deck", self.path);
            return Ok(DeckSnapshot::default());
        }

        let document = self.read_document().map_err(|e| {
            Error::Persistence(format!("failed to load deck {:?}: {}", self.path, e))
        })?;
        tracing::debug!("Loaded {} cards from {:?}", document.cards.len(), self.path);
        Ok(DeckSnapshot {
            cards: document.cards,
            stats: document.stats,
        })
    }

    fn save(&mut self, deck: &DeckSnapshot) -> Result<()> {
        self.write_document(deck).map_err(|e| {
            Error::Persistence(format!("failed to save deck {:?}: {}", self.path, e))
        })?;
        tracing::debug!("Saved {} cards to {:?}", deck.cards.len(), self.path);
        Ok(())
    }
}

/// Gateway that keeps records in memory, for tests and embedding
#[derive(Clone, Debug, Default)]
pub struct MemoryGateway {
    deck: DeckSnapshot,
    /// When set, every `save` fails
    pub fail_saves: bool,
    saves: usize,
}

impl MemoryGateway {
    pub fn with_deck(deck: DeckSnapshot) -> Self {
        Self {
            deck,
            ..Self::default()
        }
    }

    /// The deck as of the last successful save
    pub fn deck(&self) -> &DeckSnapshot {
        &self.deck
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl PersistenceGateway for MemoryGateway {
    fn load(&self) -> Result<DeckSnapshot> {
        Ok(self.deck.clone())
    }

    fn save(&mut self, deck: &DeckSnapshot) -> Result<()> {
        if self.fail_saves {
            return Err(Error::Persistence("memory gateway configured to fail".into()));
        }
        self.deck = deck.clone();
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CardStore, Grade, Scheduler};
    use chrono::Utc;

    fn sample_deck() -> DeckSnapshot {
        let mut store = CardStore::default();
        let id = store.add_card("el perro", "the dog", ["noun"], Utc::now()).unwrap();
        store.add_card("correr", "to run", ["verb"], Utc::now()).unwrap();

        let scheduler = Scheduler::default();
        let state = store.get_review_state(id, Utc::now()).unwrap();
        store
            .set_review_state(id, scheduler.next_state(&state, Grade::Good, Utc::now()))
            .unwrap();
        store.record_attempt(id, true).unwrap();
        store.snapshot()
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let deck_path = temp_dir.path().join("deck.json");

        let deck = sample_deck();
        let mut gateway = JsonDeckFile::new(&deck_path);
        gateway.save(&deck).unwrap();

        let loaded = gateway.load().unwrap();
        assert_eq!(loaded, deck);
        assert_eq!(loaded.stats.attempts, 1);
    }

    #[test]
    fn test_deck_without_stats_loads() {
        let temp_dir = tempfile::tempdir().unwrap();
        let deck_path = temp_dir.path().join("deck.json");
        std::fs::write(&deck_path, r#"{"version": 1, "cards": []}"#).unwrap();

        let loaded = JsonDeckFile::new(&deck_path).load().unwrap();
        assert_eq!(loaded, DeckSnapshot::default());
    }

    #[test]
    fn test_load_nonexistent_returns_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let gateway = JsonDeckFile::new(temp_dir.path().join("nonexistent.json"));
        assert!(gateway.load().unwrap().cards.is_empty());
    }

    #[test]
    fn test_corrupted_deck_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let deck_path = temp_dir.path().join("deck.json");
        std::fs::write(&deck_path, "{ invalid json }").unwrap();

        let result = JsonDeckFile::new(&deck_path).load();
        assert!(matches!(result, Err(Error::Persistence(_))));
    }

    #[test]
    fn test_newer_format_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let deck_path = temp_dir.path().join("deck.json");
        std::fs::write(&deck_path, r#"{"version": 99, "cards": []}"#).unwrap();

        let result = JsonDeckFile::new(&deck_path).load();
        assert!(matches!(result, Err(Error::Persistence(_))));
    }

    #[test]
    fn test_atomic_save() {
        let temp_dir = tempfile::tempdir().unwrap();
        let deck_path = temp_dir.path().join("deck.json");

        let mut gateway = JsonDeckFile::new(&deck_path);
        gateway.save(&sample_deck()).unwrap();
        gateway.save(&sample_deck()).unwrap();

        // Verify deck file exists and no stray temp files remain
        assert!(deck_path.exists());
        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "deck.json")
            .collect();
        assert!(
            extras.is_empty(),
            "Expected only deck.json, found extras: {:?}",
            extras
        );
    }

    #[test]
    fn test_save_into_missing_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let deck_path = temp_dir.path().join("nested/dir/deck.json");

        let mut gateway = JsonDeckFile::new(&deck_path);
        gateway.save(&sample_deck()).unwrap();
        assert_eq!(gateway.load().unwrap().cards.len(), 2);
    }

    #[test]
    fn test_save_failure_is_reported() {
        let temp_dir = tempfile::tempdir().unwrap();
        // A regular file where the parent directory should be
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut gateway = JsonDeckFile::new(blocker.join("deck.json"));
        let result = gateway.save(&sample_deck());
        assert!(matches!(result, Err(Error::Persistence(_))));
    }

    #[test]
    fn test_memory_gateway() {
        let mut gateway = MemoryGateway::default();
        gateway.save(&sample_deck()).unwrap();
        assert_eq!(gateway.load().unwrap().cards.len(), 2);
        assert_eq!(gateway.save_count(), 1);

        gateway.fail_saves = true;
        let result = gateway.save(&DeckSnapshot::default());
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(gateway.deck().cards.len(), 2);
    }
}
