//! Study sessions.
//!
//! A session is a queue of card ids picked at `start`, consumed front to
//! back by `next`. Grades go through `submit`, which runs the scheduler and
//! writes the new state back into the store. Sessions are never persisted;
//! dropping one mid-way keeps every review already submitted.

use crate::scheduler::Scheduler;
use crate::{Card, CardId, CardStore, Error, Grade, Result, ReviewState, SessionConfig, StudyMode};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// Lifecycle of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    /// Queue built, no card handed out yet
    NotStarted,
    InProgress,
    /// Queue exhausted
    Completed,
}

/// What `next` hands back
#[derive(Clone, Debug)]
pub enum NextCard {
    Card(Card),
    Complete(SessionSummary),
}

/// Running tally for one session
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub reviewed: usize,
    pub failed: usize,
    /// Cards handed out and then passed over without a grade
    pub skipped: usize,
    pub requeued: usize,
    pub grades: HashMap<Grade, usize>,
}

impl SessionSummary {
    pub fn count(&self, grade: Grade) -> usize {
        self.grades.get(&grade).copied().unwrap_or(0)
    }
}

/// Result of grading one card
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    pub card_id: CardId,
    pub grade: Grade,
    pub previous: ReviewState,
    pub updated: ReviewState,
    /// The card went back to the end of this session's queue
    pub requeued: bool,
}

/// One study run over a fixed queue of due cards
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    mode: StudyMode,
    status: SessionStatus,
    queue: VecDeque<CardId>,
    current: Option<CardId>,
    requeue_on_fail: bool,
    summary: SessionSummary,
}

impl Session {
    /// Build the queue for `mode` from the cards due at `now`
    ///
    /// Fails with `Error::EmptySession` when nothing qualifies.
    pub fn start(
        store: &CardStore,
        mode: StudyMode,
        now: DateTime<Utc>,
        config: &SessionConfig,
    ) -> Result<Self> {
        let mut due = store.due_cards(now, &mode);

        if let (StudyMode::Hardest, Some(limit)) = (&mode, config.hardest_batch_size) {
            due.truncate(limit);
        }

        let mut seen = HashSet::new();
        let queue: VecDeque<CardId> = due.into_iter().filter(|id| seen.insert(*id)).collect();

        if queue.is_empty() {
            tracing::info!("No cards due for {} session", mode.label());
            return Err(Error::EmptySession);
        }

        let id = Uuid::new_v4();
        tracing::info!(
            "Started {} session {} with {} cards",
            mode.label(),
            id,
            queue.len()
        );

        Ok(Self {
            id,
            mode,
            status: SessionStatus::NotStarted,
            queue,
            current: None,
            requeue_on_fail: config.requeue_on_fail,
            summary: SessionSummary {
                started_at: Some(now),
                ..SessionSummary::default()
            },
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> &StudyMode {
        &self.mode
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Card awaiting a grade, if any
    pub fn current(&self) -> Option<CardId> {
        self.current
    }

    /// Ids still queued, in order
    pub fn remaining(&self) -> impl Iterator<Item = &CardId> {
        self.queue.iter()
    }

    pub fn remaining_len(&self) -> usize {
        self.queue.len()
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    /// Shuffle the cards not yet handed out
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.queue.make_contiguous().shuffle(rng);
        tracing::debug!("Shuffled {} remaining cards", self.queue.len());
    }

    /// Hand out the next card, or report completion
    ///
    /// A card handed out earlier and not graded counts as skipped.
    pub fn next(&mut self, store: &CardStore) -> Result<NextCard> {
        if let Some(skipped) = self.current.take() {
            tracing::debug!("Card {} skipped without a grade", skipped);
            self.summary.skipped += 1;
        }

        while let Some(id) = self.queue.pop_front() {
            match store.get_card(id) {
                Ok(card) => {
                    self.status = SessionStatus::InProgress;
                    self.current = Some(id);
                    return Ok(NextCard::Card(card.clone()));
                }
                Err(Error::NotFound(_)) => {
                    tracing::warn!("Queued card {} is no longer in the store, skipping", id);
                }
                Err(e) => return Err(e),
            }
        }

        if self.status != SessionStatus::Completed {
            tracing::info!(
                "Session {} complete: {} reviewed, {} failed",
                self.id,
                self.summary.reviewed,
                self.summary.failed
            );
        }
        self.status = SessionStatus::Completed;
        Ok(NextCard::Complete(self.summary.clone()))
    }

    /// Grade the card last returned by `next`
    ///
    /// Any other id is rejected with `Error::InvalidSubmission` and leaves
    /// the store untouched.
    pub fn submit(
        &mut self,
        store: &mut CardStore,
        scheduler: &Scheduler,
        card_id: CardId,
        grade: Grade,
        now: DateTime<Utc>,
    ) -> Result<Submission> {
        if self.current != Some(card_id) {
            let expected = self
                .current
                .map(|id| id.to_string())
                .unwrap_or_else(|| "no card awaiting a grade".to_string());
            tracing::error!("Out-of-order submission for {} (expected {})", card_id, expected);
            return Err(Error::InvalidSubmission {
                expected,
                got: card_id,
            });
        }

        let previous = store.get_review_state(card_id, now)?;
        let updated = scheduler.next_state(&previous, grade, now);
        store.set_review_state(card_id, updated.clone())?;
        store.record_attempt(card_id, grade.is_success())?;
        self.current = None;

        self.summary.reviewed += 1;
        *self.summary.grades.entry(grade).or_insert(0) += 1;
        if grade == Grade::Fail {
            self.summary.failed += 1;
        }

        let requeued = self.requeue_on_fail && grade == Grade::Fail && !self.queue.contains(&card_id);
        if requeued {
            self.queue.push_back(card_id);
            self.summary.requeued += 1;
        }

        tracing::debug!(
            "Card {} graded {}, next due {}{}",
            card_id,
            grade,
            updated.due_at,
            if requeued { " (requeued)" } else { "" }
        );

        Ok(Submission {
            card_id,
            grade,
            previous,
            updated,
            requeued,
        })
    }
}
