use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use vokab_core::*;

#[derive(Parser)]
#[command(name = "vokab")]
#[command(about = "Spaced-repetition vocabulary trainer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Evaluate as if the current time were this RFC 3339 timestamp
    #[arg(long, global = true, value_parser = parse_timestamp)]
    now: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Study the cards that are due (default)
    Study {
        #[command(flatten)]
        selection: Selection,

        /// Cap on the number of cards in a hardest-first session
        #[arg(long)]
        limit: Option<usize>,

        /// Put failed cards back at the end of the session
        #[arg(long)]
        requeue: bool,

        /// Shuffle the session queue
        #[arg(long)]
        shuffle: bool,

        /// Grade every card with this grade without prompting (fail, hard, good, easy)
        #[arg(long, value_parser = parse_grade)]
        auto_grade: Option<Grade>,
    },

    /// Add a single card
    Add {
        #[arg(long)]
        front: String,

        #[arg(long)]
        back: String,

        /// Tag for the card (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Import cards from a headerless CSV file (front,back[,tag;tag])
    Import { file: PathBuf },

    /// Export all cards to a CSV file
    Export { file: PathBuf },

    /// List all cards with their schedule
    List,

    /// Show the cards due now, in study order
    Due {
        #[command(flatten)]
        selection: Selection,
    },

    /// Show deck statistics
    Stats,

    /// Show recent reviews from the review log
    History {
        /// Number of reviews to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Roll up the review log to CSV
    Rollup {
        /// Clean up processed review logs after rollup
        #[arg(long)]
        cleanup: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    All,
    Hardest,
    Custom,
}

#[derive(clap::Args)]
struct Selection {
    /// Study mode
    #[arg(long, value_enum, default_value_t = ModeArg::All)]
    mode: ModeArg,

    /// Custom mode: only cards with one of these tags (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Custom mode: only cards whose front or back contains this text
    #[arg(long)]
    search: Option<String>,
}

impl Selection {
    fn study_mode(&self) -> Result<StudyMode> {
        match self.mode {
            ModeArg::All => Ok(StudyMode::All),
            ModeArg::Hardest => Ok(StudyMode::Hardest),
            ModeArg::Custom => {
                let by_tag = (!self.tags.is_empty()).then(|| CardPredicate::any_tag(self.tags.clone()));
                let by_text = self.search.as_ref().map(|text| CardPredicate::matching_text(text));
                match (by_tag, by_text) {
                    (Some(tag), Some(text)) => Ok(StudyMode::Custom(tag.and(text))),
                    (Some(p), None) | (None, Some(p)) => Ok(StudyMode::Custom(p)),
                    (None, None) => Err(Error::Validation(
                        "custom mode needs --tag or --search".into(),
                    )),
                }
            }
        }
    }
}

fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{}': {}", s, e))
}

fn parse_grade(s: &str) -> std::result::Result<Grade, String> {
    s.parse::<Grade>().map_err(|e| e.to_string())
}

type DeckEngine = Engine<JsonDeckFile>;

fn main() -> Result<()> {
    // Initialize logging
    vokab_core::logging::init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(data_dir) = cli.data_dir {
        config.data.data_dir = data_dir;
    }
    let now = cli.now.unwrap_or_else(Utc::now);
    tracing::debug!("Using data directory {:?}", config.data.data_dir);

    match cli.command {
        Some(Commands::Study {
            selection,
            limit,
            requeue,
            shuffle,
            auto_grade,
        }) => {
            if limit.is_some() {
                config.session.hardest_batch_size = limit;
            }
            config.session.requeue_on_fail |= requeue;
            cmd_study(config, &selection, shuffle, auto_grade, now)
        }
        Some(Commands::Add { front, back, tags }) => cmd_add(config, &front, &back, &tags, now),
        Some(Commands::Import { file }) => cmd_import(config, &file, now),
        Some(Commands::Export { file }) => cmd_export(config, &file),
        Some(Commands::List) => cmd_list(config, now),
        Some(Commands::Due { selection }) => cmd_due(config, &selection, now),
        Some(Commands::Stats) => cmd_stats(config, now),
        Some(Commands::History { limit }) => cmd_history(config, limit),
        Some(Commands::Rollup { cleanup }) => cmd_rollup(config, cleanup),
        None => {
            // Default to "study" over everything due
            let selection = Selection {
                mode: ModeArg::All,
                tags: Vec::new(),
                search: None,
            };
            cmd_study(config, &selection, false, None, now)
        }
    }
}

fn open_engine(config: Config) -> Result<DeckEngine> {
    let deck_path = config.data.deck_path();
    let log_path = config.data.review_log_path();
    Ok(Engine::open(JsonDeckFile::new(deck_path), config)?.with_review_log(JsonlReviewLog::new(log_path)))
}

fn cmd_study(
    mut config: Config,
    selection: &Selection,
    shuffle: bool,
    auto_grade: Option<Grade>,
    now: DateTime<Utc>,
) -> Result<()> {
    let mode = selection.study_mode()?;

    if auto_grade == Some(Grade::Fail) && config.session.requeue_on_fail {
        return Err(Error::Validation(
            "--auto-grade fail with requeueing would never finish".into(),
        ));
    }
    // Unattended runs save once at the end
    if auto_grade.is_some() {
        config.session.autosave = false;
    }

    let mut engine = open_engine(config)?;

    let mut session = match engine.start(mode, now) {
        Ok(session) => session,
        Err(Error::EmptySession) => {
            println!("Nothing due - come back later!");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if shuffle {
        session.shuffle(&mut rand::rng());
    }

    let autosave = engine.config().session.autosave;
    let mut position = 0;

    loop {
        let card = match engine.next(&mut session)? {
            NextCard::Card(card) => card,
            NextCard::Complete(_) => break,
        };
        position += 1;

        let grade = match auto_grade {
            Some(grade) => {
                println!("{} → {} [{}]", card.front, card.back, grade);
                grade
            }
            None => {
                // Requeued cards grow the session, so count what is left now
                let total = position + session.remaining_len();
                display_card(&engine, &card, position, total)?;
                match prompt_grade(&engine, &card)? {
                    Some(grade) => grade,
                    None => break,
                }
            }
        };

        let submission = engine.submit(&mut session, card.id, grade, now)?;
        if submission.requeued {
            println!("  ↻ Back in the queue");
        }

        // Progress stays in memory; finishing the session tries again
        if autosave {
            if let Err(e) = engine.save() {
                eprintln!("Could not save progress, will retry at the end: {}", e);
            }
        }
    }

    let saved = engine.finish(&session);
    display_summary(session.summary(), &engine.store().aggregate_stats());
    saved.map(|_| ())
}

fn display_card(engine: &DeckEngine, card: &Card, position: usize, total: usize) -> Result<()> {
    let stats = engine.stats(card.id)?;
    let deck = engine.store().aggregate_stats();
    println!();
    println!(
        "-{:->3}/{:-<3}--{:-<48}-{:->3.0}%-",
        position,
        total,
        stats.history_string("✔", "✗"),
        stats.recent_accuracy()
    );
    println!("│  {}", card.front);
    if !card.tags.is_empty() {
        let tags: Vec<_> = card.tags.iter().map(String::as_str).collect();
        println!("│  [{}]", tags.join(", "));
    }
    println!("--{:->60}", deck.history_string("✔", "✗"));
    Ok(())
}

/// Ask for an answer and turn it into a grade; `None` ends the session
fn prompt_grade(engine: &DeckEngine, card: &Card) -> Result<Option<Grade>> {
    println!("(Type answer, press Enter to end the session)");
    let answer = match read_line()? {
        Some(line) if !line.trim().is_empty() => line,
        _ => return Ok(None),
    };

    let grade = engine.grade_answer(card.id, &answer)?;
    if grade == Grade::Fail {
        println!("✗ Correct answer: {}", card.back);
        return Ok(Some(grade));
    }

    println!("✔ Correct!");
    println!("  'h' + Enter if it was hard, 'e' + Enter if easy, Enter otherwise");
    let refined = match read_line()?.as_deref().map(str::trim) {
        Some("h") | Some("hard") => Grade::Hard,
        Some("e") | Some("easy") => Grade::Easy,
        _ => Grade::Good,
    };
    Ok(Some(refined))
}

/// One line from stdin without the newline; `None` at end of input
fn read_line() -> Result<Option<String>> {
    print!("> ");
    io::stdout().flush()?;

    let mut input = String::new();
    let read = io::stdin().lock().read_line(&mut input)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim_end_matches(['\r', '\n']).to_string()))
}

fn display_summary(summary: &SessionSummary, deck: &AttemptStats) {
    println!();
    println!("╭─────────────────────────────────────────╮");
    println!("│  SESSION COMPLETE");
    println!("╰─────────────────────────────────────────╯");
    println!("  Reviewed: {:5}", summary.reviewed);
    println!("  Failed:   {:5}", summary.failed);
    for grade in [Grade::Hard, Grade::Good, Grade::Easy] {
        let count = summary.count(grade);
        if count > 0 {
            println!("  {:<9} {:5}", format!("{}:", grade), count);
        }
    }
    if summary.skipped > 0 {
        println!("  Skipped:  {:5}", summary.skipped);
    }
    if deck.attempts > 0 {
        println!("  Deck:     {}", deck.history_string("✔", "✗"));
    }
}

fn cmd_add(config: Config, front: &str, back: &str, tags: &[String], now: DateTime<Utc>) -> Result<()> {
    let mut engine = open_engine(config)?;
    let id = engine.add_card(front, back, tags, now)?;
    engine.save()?;

    println!("✓ Added card {}", id);
    Ok(())
}

fn cmd_import(config: Config, file: &Path, now: DateTime<Utc>) -> Result<()> {
    let mut engine = open_engine(config)?;
    let input = std::fs::File::open(file)?;
    let report = vokab_core::csv_io::import_deck(engine.store_mut(), input, now)?;
    engine.save()?;

    println!("✓ Imported {} cards from {}", report.added, file.display());
    if report.duplicates > 0 {
        println!("  Skipped {} duplicates", report.duplicates);
    }
    if report.invalid > 0 {
        println!("  Skipped {} invalid rows", report.invalid);
    }
    Ok(())
}

fn cmd_export(config: Config, file: &Path) -> Result<()> {
    let engine = open_engine(config)?;
    let output = std::fs::File::create(file)?;
    let count = vokab_core::csv_io::export_deck(engine.store(), output)?;

    println!("✓ Exported {} cards to {}", count, file.display());
    Ok(())
}

fn cmd_list(config: Config, now: DateTime<Utc>) -> Result<()> {
    let engine = open_engine(config)?;
    if engine.store().is_empty() {
        println!("No cards yet. Add some with 'vokab add' or 'vokab import'.");
        return Ok(());
    }

    for card in engine.all_cards() {
        print_card_line(&engine, card, now)?;
    }
    Ok(())
}

fn print_card_line(engine: &DeckEngine, card: &Card, now: DateTime<Utc>) -> Result<()> {
    let state = engine.get_review_state(card.id, now)?;
    let schedule = if engine.store().has_been_reviewed(card.id)? {
        format!(
            "due {}  interval {}d  ease {:.2}  lapses {}",
            state.due_at.format("%Y-%m-%d %H:%M"),
            state.interval_days,
            state.ease_factor,
            state.lapse_count
        )
    } else {
        "new".to_string()
    };
    let tags = if card.tags.is_empty() {
        String::new()
    } else {
        let tags: Vec<_> = card.tags.iter().map(String::as_str).collect();
        format!(" [{}]", tags.join(", "))
    };
    println!("{}  {} → {}{}  ({})", card.id, card.front, card.back, tags, schedule);
    Ok(())
}

fn cmd_due(config: Config, selection: &Selection, now: DateTime<Utc>) -> Result<()> {
    let mode = selection.study_mode()?;
    let engine = open_engine(config)?;
    let due = engine.due_cards(now, &mode);

    if due.is_empty() {
        println!("Nothing due - come back later!");
        return Ok(());
    }

    println!("{} cards due:", due.len());
    for id in due {
        let card = engine.get_card(id)?;
        print_card_line(&engine, card, now)?;
    }
    Ok(())
}

fn cmd_stats(config: Config, now: DateTime<Utc>) -> Result<()> {
    let engine = open_engine(config)?;
    let store = engine.store();
    let total = store.aggregate_stats();
    let due = engine.due_cards(now, &StudyMode::All).len();
    let mut reviewed = 0;
    for card in store.all_cards() {
        if store.has_been_reviewed(card.id)? {
            reviewed += 1;
        }
    }
    let accuracy = if total.attempts == 0 {
        100.0
    } else {
        total.correct as f64 / total.attempts as f64 * 100.0
    };

    println!("Cards:    {:5}", store.len());
    println!("Reviewed: {:5}", reviewed);
    println!("Due now:  {:5}", due);
    println!("Attempts: {:5}", total.attempts);
    println!("Correct:  {:5}, {:3.0}%", total.correct, accuracy);
    if total.attempts > 0 {
        println!(
            "Recent:   {} {:3.0}%",
            total.history_string("✔", "✗"),
            total.recent_accuracy()
        );
    }

    let hardest: Vec<_> = engine
        .due_cards(DateTime::<Utc>::MAX_UTC, &StudyMode::Hardest)
        .into_iter()
        .take(5)
        .filter_map(|id| {
            let state = store.get_review_state(id, now).ok()?;
            (state.lapse_count > 0).then_some((id, state.lapse_count))
        })
        .collect();
    if !hardest.is_empty() {
        println!();
        println!("Hardest cards:");
        for (id, lapses) in hardest {
            let card = engine.get_card(id)?;
            println!("  {:<30} {} lapses", card.front, lapses);
        }
    }
    Ok(())
}

fn cmd_history(config: Config, limit: usize) -> Result<()> {
    let log_path = config.data.review_log_path();
    let engine = open_engine(config)?;
    let events = read_reviews(&log_path)?;

    if events.is_empty() {
        println!("No reviews logged yet.");
        return Ok(());
    }

    let skip = events.len().saturating_sub(limit);
    for event in events.iter().skip(skip) {
        let front = engine
            .get_card(event.card_id)
            .map(|c| c.front.as_str())
            .unwrap_or("(deleted card)");
        println!(
            "{}  {:<5} {:<30} next in {}d",
            event.reviewed_at.format("%Y-%m-%d %H:%M"),
            event.grade,
            front,
            event.interval_days
        );
    }
    Ok(())
}

fn cmd_rollup(config: Config, cleanup: bool) -> Result<()> {
    let log_path = config.data.review_log_path();
    let csv_path = config.data.review_archive_path();

    if !log_path.exists() {
        println!("No review log found - nothing to roll up.");
        return Ok(());
    }

    let count = vokab_core::csv_io::rollup_review_log(&log_path, &csv_path)?;

    println!("✓ Rolled up {} reviews to CSV", count);
    println!("  CSV: {}", csv_path.display());

    if cleanup {
        let cleaned = vokab_core::csv_io::cleanup_processed_logs(&config.data.data_dir)?;
        if cleaned > 0 {
            println!("✓ Cleaned up {} processed review logs", cleaned);
        }
    }

    Ok(())
}
