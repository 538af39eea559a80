//! In-memory card store.
//!
//! The store owns every card, its review state and its attempt statistics.
//! Sessions only ever hold card ids; all state changes go through
//! `set_review_state`.

use crate::{AttemptStats, Card, CardId, CardRecord, DeckSnapshot, Error, Result, ReviewState};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Filter used by `StudyMode::Custom`
#[derive(Clone)]
pub struct CardPredicate(Arc<dyn Fn(&Card) -> bool + Send + Sync>);

impl CardPredicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Card) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Cards carrying `tag`
    pub fn has_tag(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        Self::new(move |card| card.has_tag(&tag))
    }

    /// Cards carrying at least one of `tags`
    pub fn any_tag<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        Self::new(move |card| tags.iter().any(|t| card.has_tag(t)))
    }

    /// Cards whose front or back contains `needle`, ignoring case
    pub fn matching_text(needle: impl AsRef<str>) -> Self {
        let needle = needle.as_ref().to_lowercase();
        Self::new(move |card| {
            card.front.to_lowercase().contains(&needle) || card.back.to_lowercase().contains(&needle)
        })
    }

    /// Both predicates must hold
    pub fn and(self, other: CardPredicate) -> Self {
        Self::new(move |card| self.matches(card) && other.matches(card))
    }

    pub fn matches(&self, card: &Card) -> bool {
        (self.0)(card)
    }
}

impl fmt::Debug for CardPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CardPredicate(..)")
    }
}

/// Which due cards a session studies, and in what order
#[derive(Clone, Debug)]
pub enum StudyMode {
    /// Every due card, earliest due first
    All,
    /// Most lapses first, then lowest ease
    Hardest,
    /// Cards matching the predicate, earliest due first
    Custom(CardPredicate),
}

impl StudyMode {
    pub fn label(&self) -> &'static str {
        match self {
            StudyMode::All => "all",
            StudyMode::Hardest => "hardest",
            StudyMode::Custom(_) => "custom",
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    card: Card,
    state: Option<ReviewState>,
    stats: AttemptStats,
}

/// All cards and their review state, in insertion order
#[derive(Clone, Debug)]
pub struct CardStore {
    entries: Vec<Entry>,
    index: HashMap<CardId, usize>,
    totals: AttemptStats,
    initial_ease: f64,
}

impl Default for CardStore {
    fn default() -> Self {
        Self::new(crate::SchedulerConfig::default().initial_ease)
    }
}

impl CardStore {
    /// Empty store; never-reviewed cards report `initial_ease`
    pub fn new(initial_ease: f64) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            totals: AttemptStats::default(),
            initial_ease,
        }
    }

    /// Rebuild a store from a saved deck
    pub fn from_snapshot(deck: DeckSnapshot, initial_ease: f64) -> Result<Self> {
        let mut store = Self::new(initial_ease);
        for record in deck.cards {
            store.insert_record(record)?;
        }
        store.totals = deck.stats;
        tracing::debug!("Built card store with {} cards", store.len());
        Ok(store)
    }

    /// Create a card and return its id
    pub fn add_card<I, S>(&mut self, front: &str, back: &str, tags: I, now: DateTime<Utc>) -> Result<CardId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let card = Card::new(front, back, tags, now)?;
        let id = card.id;
        self.push(Entry {
            card,
            state: None,
            stats: AttemptStats::default(),
        });
        tracing::debug!("Added card {}", id);
        Ok(id)
    }

    /// Insert a previously persisted record, keeping its id
    pub fn insert_record(&mut self, record: CardRecord) -> Result<()> {
        record.card.validate()?;
        if self.index.contains_key(&record.card.id) {
            return Err(Error::Validation(format!(
                "Duplicate card id {}",
                record.card.id
            )));
        }
        self.push(Entry {
            card: record.card,
            state: record.state,
            stats: record.stats,
        });
        Ok(())
    }

    fn push(&mut self, entry: Entry) {
        self.index.insert(entry.card.id, self.entries.len());
        self.entries.push(entry);
    }

    fn entry(&self, id: CardId) -> Result<&Entry> {
        self.index
            .get(&id)
            .map(|&i| &self.entries[i])
            .ok_or(Error::NotFound(id))
    }

    fn entry_mut(&mut self, id: CardId) -> Result<&mut Entry> {
        match self.index.get(&id) {
            Some(&i) => Ok(&mut self.entries[i]),
            None => Err(Error::NotFound(id)),
        }
    }

    pub fn get_card(&self, id: CardId) -> Result<&Card> {
        self.entry(id).map(|e| &e.card)
    }

    /// Current review state, or the initial state due at `now` if never reviewed
    pub fn get_review_state(&self, id: CardId, now: DateTime<Utc>) -> Result<ReviewState> {
        let entry = self.entry(id)?;
        Ok(entry
            .state
            .clone()
            .unwrap_or_else(|| ReviewState::initial(now, self.initial_ease)))
    }

    /// Replace a card's review state as a whole
    pub fn set_review_state(&mut self, id: CardId, state: ReviewState) -> Result<()> {
        self.entry_mut(id)?.state = Some(state);
        Ok(())
    }

    pub fn has_been_reviewed(&self, id: CardId) -> Result<bool> {
        self.entry(id).map(|e| e.state.is_some())
    }

    /// Count an attempt for the card and for the deck as a whole
    pub fn record_attempt(&mut self, id: CardId, correct: bool) -> Result<()> {
        self.entry_mut(id)?.stats.record_attempt(correct);
        self.totals.record_attempt(correct);
        Ok(())
    }

    pub fn stats(&self, id: CardId) -> Result<AttemptStats> {
        self.entry(id).map(|e| e.stats)
    }

    /// Deck-wide tally, with its own rolling history across all cards
    pub fn aggregate_stats(&self) -> AttemptStats {
        self.totals
    }

    /// Cards in insertion order
    pub fn all_cards(&self) -> impl Iterator<Item = &Card> {
        self.entries.iter().map(|e| &e.card)
    }

    pub fn contains(&self, id: CardId) -> bool {
        self.index.contains_key(&id)
    }

    /// Find a card by its exact front and back text
    pub fn find(&self, front: &str, back: &str) -> Option<CardId> {
        self.entries
            .iter()
            .find(|e| e.card.front == front.trim() && e.card.back == back.trim())
            .map(|e| e.card.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids of cards due at `now`, filtered and ordered for `mode`
    ///
    /// - `All` and `Custom`: due date ascending
    /// - `Hardest`: lapses descending, then ease ascending, then due date
    ///
    /// Remaining ties keep insertion order.
    pub fn due_cards(&self, now: DateTime<Utc>, mode: &StudyMode) -> Vec<CardId> {
        let mut due: Vec<(CardId, ReviewState)> = self
            .entries
            .iter()
            .filter(|e| match mode {
                StudyMode::Custom(predicate) => predicate.matches(&e.card),
                _ => true,
            })
            .map(|e| {
                let state = e
                    .state
                    .clone()
                    .unwrap_or_else(|| ReviewState::initial(now, self.initial_ease));
                (e.card.id, state)
            })
            .filter(|(_, state)| state.is_due(now))
            .collect();

        match mode {
            StudyMode::Hardest => due.sort_by(|(_, a), (_, b)| {
                b.lapse_count
                    .cmp(&a.lapse_count)
                    .then_with(|| a.ease_factor.total_cmp(&b.ease_factor))
                    .then_with(|| a.due_at.cmp(&b.due_at))
            }),
            StudyMode::All | StudyMode::Custom(_) => {
                due.sort_by(|(_, a), (_, b)| a.due_at.cmp(&b.due_at))
            }
        }

        due.into_iter().map(|(id, _)| id).collect()
    }

    /// Detached copy of the whole deck, for saving
    pub fn snapshot(&self) -> DeckSnapshot {
        let cards = self
            .entries
            .iter()
            .map(|e| CardRecord {
                card: e.card.clone(),
                state: e.state.clone(),
                stats: e.stats,
            })
            .collect();
        DeckSnapshot {
            cards,
            stats: self.totals,
        }
    }
}
