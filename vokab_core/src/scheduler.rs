//! SM-2 derived review scheduling.
//!
//! `next_state` is a pure function of `(state, grade, now, config)`:
//! - Fail resets the repetition streak, counts a lapse and relearns after
//!   the minimum relapse interval
//! - Hard/Good/Easy grow the interval 1 → 6 → interval × ease
//! - Ease moves by a fixed delta per grade and never drops below the floor
//!
//! Nothing here reads the clock or draws random numbers.

use crate::{Grade, ReviewState, SchedulerConfig};
use chrono::{DateTime, Duration, Utc};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Scheduler bound to a set of constants
#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// State of a card that has never been reviewed
    pub fn initial_state(&self, now: DateTime<Utc>) -> ReviewState {
        ReviewState::initial(now, self.config.initial_ease)
    }

    pub fn next_state(&self, current: &ReviewState, grade: Grade, now: DateTime<Utc>) -> ReviewState {
        next_state(current, grade, now, &self.config)
    }
}

/// Compute the review state that follows grading `current` at `now`
pub fn next_state(
    current: &ReviewState,
    grade: Grade,
    now: DateTime<Utc>,
    config: &SchedulerConfig,
) -> ReviewState {
    let ease = clamp_ease(current.ease_factor, config);
    let interval = sanitize_interval(current.interval_days);

    let (interval_days, ease_factor, repetition_count, lapse_count) = match grade {
        Grade::Fail => (
            config.min_relapse_interval_days.min(config.max_interval_days),
            clamp_ease(ease - config.fail_ease_penalty, config),
            0,
            current.lapse_count.saturating_add(1),
        ),
        Grade::Hard | Grade::Good | Grade::Easy => {
            let repetitions = current.repetition_count.saturating_add(1);
            let grown = match repetitions {
                1 => config.first_interval_days,
                2 => config.second_interval_days,
                _ => (interval * ease).round(),
            };
            let delta = match grade {
                Grade::Hard => -config.hard_ease_penalty,
                Grade::Easy => config.easy_ease_bonus,
                _ => 0.0,
            };
            (
                grown.max(1.0).min(config.max_interval_days),
                clamp_ease(ease + delta, config),
                repetitions,
                current.lapse_count,
            )
        }
    };

    let due_at = add_days(now, interval_days);

    tracing::debug!(
        "Scheduled {:?}: interval {} days, ease {:.2}, due {}",
        grade,
        interval_days,
        ease_factor,
        due_at
    );

    ReviewState {
        due_at,
        interval_days,
        ease_factor,
        repetition_count,
        lapse_count,
        last_reviewed_at: Some(now),
    }
}

/// Clamp into `[min_ease, max_ease]`; NaN lands on the floor
fn clamp_ease(ease: f64, config: &SchedulerConfig) -> f64 {
    if ease.is_nan() {
        return config.min_ease;
    }
    ease.max(config.min_ease).min(config.max_ease.max(config.min_ease))
}

fn sanitize_interval(interval: f64) -> f64 {
    if interval.is_finite() && interval > 0.0 {
        interval
    } else {
        0.0
    }
}

/// `now + days`, at millisecond precision
fn add_days(now: DateTime<Utc>, days: f64) -> DateTime<Utc> {
    let millis = (days * MILLIS_PER_DAY).round() as i64;
    now.checked_add_signed(Duration::milliseconds(millis))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn mature_state() -> ReviewState {
        ReviewState {
            due_at: day0(),
            interval_days: 6.0,
            ease_factor: 2.5,
            repetition_count: 2,
            lapse_count: 0,
            last_reviewed_at: None,
        }
    }

    #[test]
    fn test_good_grows_interval_by_ease() {
        let scheduler = Scheduler::default();
        let next = scheduler.next_state(&mature_state(), Grade::Good, day0());

        assert_eq!(next.interval_days, 15.0);
        assert_eq!(next.due_at, day0() + Duration::days(15));
        assert_eq!(next.repetition_count, 3);
        assert_eq!(next.ease_factor, 2.5);
        assert_eq!(next.last_reviewed_at, Some(day0()));
    }

    #[test]
    fn test_fail_resets_streak() {
        let scheduler = Scheduler::default();
        let next = scheduler.next_state(&mature_state(), Grade::Fail, day0());

        assert_eq!(next.repetition_count, 0);
        assert_eq!(next.lapse_count, 1);
        assert_eq!(next.interval_days, 1.0);
        assert!((next.ease_factor - 2.3).abs() < 1e-9);
        assert_eq!(next.due_at, day0() + Duration::days(1));
    }

    #[test]
    fn test_fail_uses_configured_relapse_interval() {
        let config = SchedulerConfig {
            min_relapse_interval_days: 0.5,
            ..SchedulerConfig::default()
        };
        let next = next_state(&mature_state(), Grade::Fail, day0(), &config);

        assert_eq!(next.interval_days, 0.5);
        assert_eq!(next.due_at, day0() + Duration::hours(12));
    }

    #[test]
    fn test_first_and_second_repetitions() {
        let scheduler = Scheduler::default();
        let fresh = scheduler.initial_state(day0());

        let first = scheduler.next_state(&fresh, Grade::Good, day0());
        assert_eq!(first.repetition_count, 1);
        assert_eq!(first.interval_days, 1.0);

        let second = scheduler.next_state(&first, Grade::Good, first.due_at);
        assert_eq!(second.repetition_count, 2);
        assert_eq!(second.interval_days, 6.0);
        assert_eq!(second.due_at, first.due_at + Duration::days(6));
    }

    #[test]
    fn test_ease_deltas_per_grade() {
        let scheduler = Scheduler::default();
        let hard = scheduler.next_state(&mature_state(), Grade::Hard, day0());
        let easy = scheduler.next_state(&mature_state(), Grade::Easy, day0());

        assert!((hard.ease_factor - 2.35).abs() < 1e-9);
        assert!((easy.ease_factor - 2.65).abs() < 1e-9);
        // Interval growth uses the ease from before the adjustment
        assert_eq!(hard.interval_days, 15.0);
        assert_eq!(easy.interval_days, 15.0);
    }

    #[test]
    fn test_ease_floor_holds_for_extreme_inputs() {
        let scheduler = Scheduler::default();
        let inputs = [-100.0, 0.0, 1.0, 1.3, 1.35, f64::NAN, f64::NEG_INFINITY];

        for ease in inputs {
            for grade in Grade::ALL {
                let state = ReviewState {
                    ease_factor: ease,
                    ..mature_state()
                };
                let next = scheduler.next_state(&state, grade, day0());
                assert!(
                    next.ease_factor >= 1.3,
                    "ease {} with {:?} fell to {}",
                    ease,
                    grade,
                    next.ease_factor
                );
            }
        }
    }

    #[test]
    fn test_interval_never_below_one_after_success() {
        let scheduler = Scheduler::default();
        let state = ReviewState {
            interval_days: 0.0,
            repetition_count: 7,
            ..mature_state()
        };
        let next = scheduler.next_state(&state, Grade::Hard, day0());
        assert_eq!(next.interval_days, 1.0);

        let state = ReviewState {
            interval_days: f64::NAN,
            ..state
        };
        let next = scheduler.next_state(&state, Grade::Good, day0());
        assert_eq!(next.interval_days, 1.0);
    }

    #[test]
    fn test_interval_is_capped() {
        let scheduler = Scheduler::default();
        let state = ReviewState {
            interval_days: 1.0e12,
            repetition_count: 10,
            ..mature_state()
        };
        let next = scheduler.next_state(&state, Grade::Easy, day0());
        assert_eq!(next.interval_days, 36500.0);
        assert_eq!(next.due_at, day0() + Duration::days(36500));
    }

    #[test]
    fn test_due_is_now_plus_interval() {
        let scheduler = Scheduler::default();
        let mut state = scheduler.initial_state(day0());
        let mut now = day0();

        for grade in [Grade::Good, Grade::Easy, Grade::Hard, Grade::Good] {
            state = scheduler.next_state(&state, grade, now);
            let expected = now + Duration::milliseconds((state.interval_days * MILLIS_PER_DAY) as i64);
            assert_eq!(state.due_at, expected);
            now = state.due_at;
        }
    }

    #[test]
    fn test_deterministic() {
        let scheduler = Scheduler::default();
        for grade in Grade::ALL {
            let a = scheduler.next_state(&mature_state(), grade, day0());
            let b = scheduler.next_state(&mature_state(), grade, day0());
            assert_eq!(a, b);
            assert_eq!(a.ease_factor.to_bits(), b.ease_factor.to_bits());
            assert_eq!(a.interval_days.to_bits(), b.interval_days.to_bits());
        }
    }

    #[test]
    fn test_lapse_count_saturates() {
        let scheduler = Scheduler::default();
        let state = ReviewState {
            lapse_count: u32::MAX,
            ..mature_state()
        };
        let next = scheduler.next_state(&state, Grade::Fail, day0());
        assert_eq!(next.lapse_count, u32::MAX);
    }
}
