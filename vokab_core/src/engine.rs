//! Engine facade: the calls a front end makes.
//!
//! The engine owns the card store, the scheduler and the persistence
//! gateway. Sessions are separate values handed back to the caller, so the
//! front end decides how long a session lives. Every call returns the state
//! it produced instead of leaving it in ambient fields.
//!
//! Studying never touches disk. Graded reviews are applied in memory and
//! queued for the review log; only `save` and `finish` write anything.

use crate::matcher::AnswerMatcher;
use crate::persistence::PersistenceGateway;
use crate::review_log::{ReviewEvent, ReviewSink};
use crate::scheduler::Scheduler;
use crate::session::{NextCard, Session, SessionSummary, Submission};
use crate::{
    AttemptStats, Card, CardId, CardStore, Config, DeckSnapshot, Error, Grade, Result,
    ReviewState, StudyMode,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A vocabulary deck with everything needed to study it
pub struct Engine<G: PersistenceGateway> {
    store: CardStore,
    scheduler: Scheduler,
    matcher: AnswerMatcher,
    config: Config,
    gateway: G,
    review_log: Option<Box<dyn ReviewSink>>,
    /// Reviews graded since the review log last accepted a write
    pending_reviews: Vec<ReviewEvent>,
}

impl<G: PersistenceGateway> Engine<G> {
    /// Load the deck through `gateway`
    pub fn open(gateway: G, config: Config) -> Result<Self> {
        config.validate()?;
        let deck = gateway.load()?;
        let store = CardStore::from_snapshot(deck, config.scheduler.initial_ease)?;
        tracing::info!("Opened deck with {} cards", store.len());

        Ok(Self {
            store,
            scheduler: Scheduler::new(config.scheduler.clone()),
            matcher: AnswerMatcher::from(&config.matching),
            config,
            gateway,
            review_log: None,
            pending_reviews: Vec::new(),
        })
    }

    /// Record every graded review in `sink`
    pub fn with_review_log(mut self, sink: impl ReviewSink + 'static) -> Self {
        self.review_log = Some(Box::new(sink));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &CardStore {
        &self.store
    }

    /// Mutable access for bulk operations such as CSV import
    pub fn store_mut(&mut self) -> &mut CardStore {
        &mut self.store
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// Reviews graded but not yet written to the review log
    pub fn pending_reviews(&self) -> usize {
        self.pending_reviews.len()
    }

    pub fn add_card<I, S>(&mut self, front: &str, back: &str, tags: I, now: DateTime<Utc>) -> Result<CardId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.store.add_card(front, back, tags, now)
    }

    pub fn get_card(&self, id: CardId) -> Result<&Card> {
        self.store.get_card(id)
    }

    pub fn get_review_state(&self, id: CardId, now: DateTime<Utc>) -> Result<ReviewState> {
        self.store.get_review_state(id, now)
    }

    pub fn stats(&self, id: CardId) -> Result<AttemptStats> {
        self.store.stats(id)
    }

    pub fn all_cards(&self) -> impl Iterator<Item = &Card> {
        self.store.all_cards()
    }

    pub fn due_cards(&self, now: DateTime<Utc>, mode: &StudyMode) -> Vec<CardId> {
        self.store.due_cards(now, mode)
    }

    /// Begin a session over the cards due at `now`
    pub fn start(&self, mode: StudyMode, now: DateTime<Utc>) -> Result<Session> {
        Session::start(&self.store, mode, now, &self.config.session)
    }

    pub fn next(&self, session: &mut Session) -> Result<NextCard> {
        session.next(&self.store)
    }

    /// Compare a typed answer with the card's back: match is `Good`, else `Fail`
    pub fn grade_answer(&self, id: CardId, answer: &str) -> Result<Grade> {
        let card = self.store.get_card(id)?;
        Ok(if self.matcher.matches(&card.back, answer) {
            Grade::Good
        } else {
            Grade::Fail
        })
    }

    /// Grade the card last returned by `next`
    ///
    /// Only memory changes: the review is applied to the store and queued
    /// for the review log. Call `save` to make it durable.
    pub fn submit(
        &mut self,
        session: &mut Session,
        card_id: CardId,
        grade: Grade,
        now: DateTime<Utc>,
    ) -> Result<Submission> {
        let submission = session.submit(&mut self.store, &self.scheduler, card_id, grade, now)?;

        if self.review_log.is_some() {
            self.pending_reviews.push(ReviewEvent {
                id: Uuid::new_v4(),
                session_id: session.id(),
                card_id,
                grade,
                reviewed_at: now,
                interval_days: submission.updated.interval_days,
                ease_factor: submission.updated.ease_factor,
                due_at: submission.updated.due_at,
            });
        }

        Ok(submission)
    }

    /// Detached copy of the deck, safe to hand to another thread
    pub fn snapshot(&self) -> DeckSnapshot {
        self.store.snapshot()
    }

    /// Write queued reviews to the log, then the whole deck through the gateway
    ///
    /// The deck is saved even when the log write fails. Reviews the log did
    /// not accept stay queued and the in-memory store is never rolled back,
    /// so a failed save can be retried. A deck failure is reported ahead of
    /// a log failure.
    pub fn save(&mut self) -> Result<()> {
        let log_result = self.flush_review_log();

        let deck = self.store.snapshot();
        let deck_result = self.gateway.save(&deck);
        match &deck_result {
            Ok(()) => tracing::debug!("Saved {} cards", deck.cards.len()),
            Err(e) => tracing::error!("Saving deck failed, keeping in-memory state: {}", e),
        }

        deck_result.and(log_result)
    }

    fn flush_review_log(&mut self) -> Result<()> {
        let Some(sink) = self.review_log.as_mut() else {
            return Ok(());
        };

        let mut written = 0;
        let mut result = Ok(());
        for event in &self.pending_reviews {
            if let Err(e) = sink.append(event) {
                result = Err(match e {
                    Error::Persistence(_) => e,
                    other => Error::Persistence(format!("failed to write review log: {}", other)),
                });
                break;
            }
            written += 1;
        }
        self.pending_reviews.drain(..written);

        if let Err(e) = &result {
            tracing::error!(
                "Review log write failed, {} reviews still queued: {}",
                self.pending_reviews.len(),
                e
            );
        }
        result
    }

    /// End a session: save everything and return the session's summary
    ///
    /// The session is only borrowed, so a failed save can be retried with
    /// another call.
    pub fn finish(&mut self, session: &Session) -> Result<SessionSummary> {
        self.save()?;
        let summary = session.summary().clone();
        tracing::info!(
            "Finished session {}: {} reviewed, {} failed",
            session.id(),
            summary.reviewed,
            summary.failed
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryGateway;
    use crate::review_log::{read_reviews, JsonlReviewLog};
    use crate::{CardPredicate, JsonDeckFile};
    use chrono::{Duration, TimeZone};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn day0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap()
    }

    fn engine() -> Engine<MemoryGateway> {
        let mut engine = Engine::open(MemoryGateway::default(), Config::default()).unwrap();
        engine.add_card("der Hund", "the dog", ["noun"], day0()).unwrap();
        engine.add_card("gehen", "to go", ["verb"], day0()).unwrap();
        engine
    }

    fn next_card<G: PersistenceGateway>(engine: &Engine<G>, session: &mut Session) -> Card {
        match engine.next(session).unwrap() {
            NextCard::Card(card) => card,
            NextCard::Complete(_) => panic!("expected a card"),
        }
    }

    /// Review sink that can be switched off, keeping what it accepted
    #[derive(Clone, Default)]
    struct SwitchableSink {
        down: Rc<Cell<bool>>,
        events: Rc<RefCell<Vec<ReviewEvent>>>,
    }

    impl ReviewSink for SwitchableSink {
        fn append(&mut self, event: &ReviewEvent) -> Result<()> {
            if self.down.get() {
                return Err(Error::Io(std::io::Error::other("log down")));
            }
            self.events.borrow_mut().push(event.clone());
            Ok(())
        }
    }

    #[test]
    fn test_study_loop_with_typed_answers() {
        let mut engine = engine();
        let mut session = engine.start(StudyMode::All, day0()).unwrap();

        let card = next_card(&engine, &mut session);
        let grade = engine.grade_answer(card.id, "The Dog").unwrap();
        assert_eq!(grade, Grade::Good);
        engine.submit(&mut session, card.id, grade, day0()).unwrap();

        let card = next_card(&engine, &mut session);
        let grade = engine.grade_answer(card.id, "to walk").unwrap();
        assert_eq!(grade, Grade::Fail);
        let submission = engine.submit(&mut session, card.id, grade, day0()).unwrap();
        assert_eq!(submission.updated.lapse_count, 1);

        assert!(matches!(engine.next(&mut session).unwrap(), NextCard::Complete(_)));
        let summary = engine.finish(&session).unwrap();
        assert_eq!(summary.reviewed, 2);

        // Nothing is due until tomorrow
        assert!(matches!(engine.start(StudyMode::All, day0()), Err(Error::EmptySession)));
        let tomorrow = day0() + Duration::days(1);
        assert_eq!(engine.due_cards(tomorrow, &StudyMode::All).len(), 2);
    }

    #[test]
    fn test_submit_leaves_persistence_to_save() {
        let mut engine = engine().with_review_log(SwitchableSink::default());
        let mut session = engine.start(StudyMode::All, day0()).unwrap();

        let card = next_card(&engine, &mut session);
        engine.submit(&mut session, card.id, Grade::Easy, day0()).unwrap();
        assert_eq!(engine.gateway().save_count(), 0);
        assert_eq!(engine.pending_reviews(), 1);

        engine.save().unwrap();
        assert_eq!(engine.gateway().save_count(), 1);
        assert_eq!(engine.pending_reviews(), 0);
        let saved = engine.gateway().deck();
        assert!(saved.cards.iter().any(|r| r.card.id == card.id && r.state.is_some()));
        assert_eq!(saved.stats.attempts, 1);
    }

    #[test]
    fn test_save_failure_keeps_memory_state() {
        let mut gateway = MemoryGateway::default();
        gateway.fail_saves = true;
        let mut engine = Engine::open(gateway, Config::default()).unwrap();
        let id = engine.add_card("a", "b", ["x"], day0()).unwrap();

        let mut session = engine.start(StudyMode::All, day0()).unwrap();
        let card = next_card(&engine, &mut session);
        let submission = engine.submit(&mut session, card.id, Grade::Good, day0()).unwrap();
        assert_eq!(submission.updated.repetition_count, 1);
        assert!(matches!(engine.finish(&session), Err(Error::Persistence(_))));

        // The review was applied regardless and a later save persists it
        let state = engine.get_review_state(id, day0()).unwrap();
        assert_eq!(state.repetition_count, 1);
        engine.gateway_mut().fail_saves = false;
        engine.finish(&session).unwrap();
        assert_eq!(engine.gateway().deck().cards[0].state.as_ref().unwrap().repetition_count, 1);
    }

    #[test]
    fn test_log_failure_still_saves_deck() {
        let sink = SwitchableSink::default();
        sink.down.set(true);
        let mut engine = engine().with_review_log(sink.clone());
        let mut session = engine.start(StudyMode::All, day0()).unwrap();

        let card = next_card(&engine, &mut session);
        let submission = engine.submit(&mut session, card.id, Grade::Good, day0()).unwrap();
        assert_eq!(submission.card_id, card.id);

        let result = engine.save();
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(engine.gateway().save_count(), 1);
        assert_eq!(engine.pending_reviews(), 1);

        // The queued review is written once the log recovers
        sink.down.set(false);
        engine.save().unwrap();
        assert_eq!(engine.pending_reviews(), 0);
        assert_eq!(sink.events.borrow().len(), 1);
        assert_eq!(sink.events.borrow()[0].card_id, card.id);

        // The session carries on normally
        let card = next_card(&engine, &mut session);
        engine.submit(&mut session, card.id, Grade::Hard, day0()).unwrap();
        assert_eq!(engine.finish(&session).unwrap().reviewed, 2);
        assert_eq!(sink.events.borrow().len(), 2);
    }

    #[test]
    fn test_invalid_submission_leaves_deck_untouched() {
        let mut engine = engine().with_review_log(SwitchableSink::default());
        let mut session = engine.start(StudyMode::All, day0()).unwrap();
        let first = next_card(&engine, &mut session);
        let other = engine
            .all_cards()
            .map(|c| c.id)
            .find(|id| *id != first.id)
            .unwrap();
        let before = engine.snapshot();

        let result = engine.submit(&mut session, other, Grade::Good, day0());
        assert!(matches!(result, Err(Error::InvalidSubmission { .. })));
        assert_eq!(engine.snapshot(), before);
        assert_eq!(engine.pending_reviews(), 0);
    }

    #[test]
    fn test_review_log_records_submissions() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("reviews.wal");

        let mut engine = engine().with_review_log(JsonlReviewLog::new(&log_path));
        let mode = StudyMode::Custom(CardPredicate::has_tag("verb"));
        let mut session = engine.start(mode, day0()).unwrap();
        let card = next_card(&engine, &mut session);
        engine.submit(&mut session, card.id, Grade::Hard, day0()).unwrap();
        assert!(read_reviews(&log_path).unwrap().is_empty());

        engine.save().unwrap();
        let events = read_reviews(&log_path).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].card_id, card.id);
        assert_eq!(events[0].grade, Grade::Hard);
        assert_eq!(events[0].session_id, session.id());
    }

    #[test]
    fn test_reopen_from_deck_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let deck_path = temp_dir.path().join("deck.json");

        let id = {
            let mut engine = Engine::open(JsonDeckFile::new(&deck_path), Config::default()).unwrap();
            let id = engine.add_card("la mesa", "the table", ["noun"], day0()).unwrap();
            let mut session = engine.start(StudyMode::All, day0()).unwrap();
            next_card(&engine, &mut session);
            engine.submit(&mut session, id, Grade::Good, day0()).unwrap();
            engine.finish(&session).unwrap();
            id
        };

        let engine = Engine::open(JsonDeckFile::new(&deck_path), Config::default()).unwrap();
        let state = engine.get_review_state(id, day0()).unwrap();
        assert_eq!(state.repetition_count, 1);
        assert_eq!(state.due_at, day0() + Duration::days(1));
        assert_eq!(engine.stats(id).unwrap().attempts, 1);
        assert_eq!(engine.store().aggregate_stats().history_string("+", "-"), "+");
    }

    #[test]
    fn test_open_from_saved_deck() {
        let saved = engine().snapshot();
        let engine = Engine::open(MemoryGateway::with_deck(saved.clone()), Config::default()).unwrap();
        assert_eq!(engine.snapshot(), saved);
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let mut config = Config::default();
        config.scheduler.min_ease = -1.0;
        let result = Engine::open(MemoryGateway::default(), config);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
