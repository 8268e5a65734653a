//! SM-2 spaced repetition.
//!
//! Quality ratings (0-5):
//! - 0-2: recall failed, the card starts over
//! - 3: recalled with serious difficulty
//! - 4: recalled after hesitation
//! - 5: perfect recall

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{ReviewState, MIN_EASE};

const PASSING_QUALITY: u8 = 3;
const FIRST_INTERVAL: u32 = 1;
const SECOND_INTERVAL: u32 = 6;

/// Longest interval the scheduler hands out, in days (100 years). Keeps
/// `next_review` well inside the range `DateTime<Utc>` can represent.
pub const MAX_INTERVAL: u32 = 36_500;

/// A recall quality rating, guaranteed to lie in 0..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Quality(u8);

impl Quality {
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self> {
        if (0..=Self::MAX as i64).contains(&value) {
            Ok(Quality(value as u8))
        } else {
            Err(Error::InvalidQuality(value.to_string()))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn passed(self) -> bool {
        self.0 >= PASSING_QUALITY
    }
}

impl TryFrom<i64> for Quality {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        Quality::new(value)
    }
}

impl From<Quality> for u8 {
    fn from(q: Quality) -> u8 {
        q.0
    }
}

impl From<Rating> for Quality {
    fn from(rating: Rating) -> Self {
        rating.quality()
    }
}

impl FromStr for Quality {
    type Err = Error;

    /// Accepts an integer in 0..=5 or a rating name.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Some(rating) = Rating::from_str(trimmed) {
            return Ok(rating.quality());
        }
        trimmed
            .parse::<i64>()
            .map_err(|_| Error::InvalidQuality(s.to_string()))
            .and_then(Quality::new)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four answer buttons offered after a card is flipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    pub fn quality(self) -> Quality {
        match self {
            Rating::Again => Quality(0),
            Rating::Hard => Quality(3),
            Rating::Good => Quality(4),
            Rating::Easy => Quality(5),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Rating::Again => "Again",
            Rating::Hard => "Hard",
            Rating::Good => "Good",
            Rating::Easy => "Easy",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "again" | "a" => Some(Rating::Again),
            "hard" | "h" => Some(Rating::Hard),
            "good" | "g" => Some(Rating::Good),
            "easy" | "e" => Some(Rating::Easy),
            _ => None,
        }
    }
}

/// `EF' = EF + (0.1 - (5-q) * (0.08 + (5-q) * 0.02))`, floored at 1.3.
pub fn ease_after(ease: f64, quality: Quality) -> f64 {
    let miss = (Quality::MAX - quality.value()) as f64;
    (ease + (0.1 - miss * (0.08 + miss * 0.02))).max(MIN_EASE)
}

/// Computes the state that follows a review of `quality` taken at `now`.
pub fn schedule(state: &ReviewState, quality: Quality, now: DateTime<Utc>) -> ReviewState {
    let ease = ease_after(state.ease, quality);

    let (interval, repetitions) = if quality.passed() {
        let interval = match state.repetitions {
            0 => FIRST_INTERVAL,
            1 => SECOND_INTERVAL,
            _ => (state.interval as f64 * ease).round().min(MAX_INTERVAL as f64) as u32,
        };
        (interval, state.repetitions.saturating_add(1))
    } else {
        (FIRST_INTERVAL, 0)
    };

    ReviewState {
        ease,
        interval,
        repetitions,
        next_review: Some(
            now.checked_add_signed(Duration::days(interval as i64))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        ),
    }
}

/// Interval in days each rating would produce from `state`.
pub fn preview(state: &ReviewState, now: DateTime<Utc>) -> [(Rating, u32); 4] {
    Rating::ALL.map(|r| (r, schedule(state, r.quality(), now).interval))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
    }

    fn q(v: i64) -> Quality {
        Quality::new(v).unwrap()
    }

    fn state(ease: f64, interval: u32, repetitions: u32) -> ReviewState {
        ReviewState {
            ease,
            interval,
            repetitions,
            next_review: None,
        }
    }

    mod quality_tests {
        use super::*;

        #[test]
        fn accepts_zero_through_five() {
            for v in 0..=5 {
                assert_eq!(q(v).value(), v as u8);
            }
        }

        #[test]
        fn rejects_out_of_range() {
            for v in [-5, -1, 6, 10, i64::MAX] {
                assert!(
                    matches!(Quality::new(v), Err(Error::InvalidQuality(_))),
                    "Expected rejection for {}",
                    v
                );
            }
        }

        #[test]
        fn passed_from_three() {
            assert!(!q(2).passed());
            assert!(q(3).passed());
            assert!(q(5).passed());
        }

        #[test]
        fn parses_numbers_and_rating_names() {
            assert_eq!("4".parse::<Quality>().unwrap(), q(4));
            assert_eq!(" 0 ".parse::<Quality>().unwrap(), q(0));
            assert_eq!("Again".parse::<Quality>().unwrap(), q(0));
            assert_eq!("hard".parse::<Quality>().unwrap(), q(3));
            assert_eq!("g".parse::<Quality>().unwrap(), q(4));
            assert_eq!("EASY".parse::<Quality>().unwrap(), q(5));
        }

        #[test]
        fn parse_rejects_garbage() {
            for s in ["", "2.5", "six", "-1", "7"] {
                assert!(s.parse::<Quality>().is_err(), "Expected rejection for '{}'", s);
            }
        }

        #[test]
        fn deserialize_validates_range() {
            assert_eq!(serde_json::from_str::<Quality>("3").unwrap(), q(3));
            assert!(serde_json::from_str::<Quality>("9").is_err());
            assert_eq!(serde_json::to_string(&q(5)).unwrap(), "5");
        }
    }

    mod rating_tests {
        use super::*;

        #[test]
        fn button_qualities() {
            assert_eq!(Rating::Again.quality(), q(0));
            assert_eq!(Rating::Hard.quality(), q(3));
            assert_eq!(Rating::Good.quality(), q(4));
            assert_eq!(Rating::Easy.quality(), q(5));
        }

        #[test]
        fn from_str_invalid() {
            assert!(Rating::from_str("meh").is_none());
            assert!(Rating::from_str("").is_none());
        }
    }

    mod schedule_tests {
        use super::*;

        #[test]
        fn first_pass_schedules_one_day() {
            let next = schedule(&ReviewState::default(), q(4), now());
            assert_eq!(next.interval, 1);
            assert_eq!(next.repetitions, 1);
            // quality 4 leaves ease unchanged: 0.1 - 1 * (0.08 + 0.02) = 0
            assert!((next.ease - 2.5).abs() < 1e-9);
        }

        #[test]
        fn second_pass_schedules_six_days() {
            let next = schedule(&state(2.5, 1, 1), q(5), now());
            assert_eq!(next.interval, 6);
            assert_eq!(next.repetitions, 2);
            assert!((next.ease - 2.6).abs() < 1e-9);
        }

        #[test]
        fn later_passes_grow_by_new_ease() {
            let next = schedule(&state(2.6, 6, 2), q(5), now());
            assert!((next.ease - 2.7).abs() < 1e-9);
            // 6 * 2.7 = 16.2
            assert_eq!(next.interval, 16);
            assert_eq!(next.repetitions, 3);
        }

        #[test]
        fn hard_pass_shrinks_ease_but_still_grows() {
            let next = schedule(&state(2.5, 10, 4), q(3), now());
            // 2.5 + (0.1 - 2 * (0.08 + 0.04)) = 2.36
            assert!((next.ease - 2.36).abs() < 1e-9);
            assert_eq!(next.interval, 24);
        }

        #[test]
        fn failure_resets_progress() {
            let next = schedule(&state(2.5, 6, 2), q(1), now());
            assert_eq!(next.repetitions, 0);
            assert_eq!(next.interval, 1);
            // 2.5 + (0.1 - 4 * (0.08 + 0.08)) = 1.96
            assert!((next.ease - 1.96).abs() < 1e-9);
        }

        #[test]
        fn ease_floor_holds_on_blackout() {
            let next = schedule(&state(1.4, 30, 5), q(0), now());
            assert_eq!(next.ease, MIN_EASE);
            assert_eq!(next.interval, 1);
        }

        #[test]
        fn next_review_is_now_plus_interval() {
            let next = schedule(&state(2.5, 6, 2), q(4), now());
            assert_eq!(next.interval, 15);
            assert_eq!(next.next_review, Some(now() + Duration::days(15)));
        }

        #[test]
        fn input_is_not_mutated() {
            let before = state(2.5, 6, 2);
            let copy = before;
            let _ = schedule(&before, q(0), now());
            assert_eq!(before, copy);
        }

        #[test]
        fn repeated_runs_are_deterministic() {
            let a = schedule(&schedule(&ReviewState::default(), q(5), now()), q(5), now());
            let b = schedule(&schedule(&ReviewState::default(), q(5), now()), q(5), now());
            assert_eq!(a, b);
            assert_eq!(a.interval, 6);
        }

        #[test]
        fn easy_streak_caps_interval() {
            let mut s = ReviewState::default();
            for _ in 0..40 {
                let next = schedule(&s, Rating::Easy.quality(), now());
                assert!(next.interval >= s.interval);
                assert!(next.interval <= MAX_INTERVAL);
                assert!(next.next_review.is_some());
                let _ = preview(&next, now());
                s = next;
            }
            assert_eq!(s.interval, MAX_INTERVAL);
            assert_eq!(s.repetitions, 40);
            assert_eq!(s.next_review, Some(now() + Duration::days(MAX_INTERVAL as i64)));
        }

        #[test]
        fn oversized_stored_state_is_clamped() {
            let next = schedule(&state(2.5, u32::MAX, u32::MAX), q(5), now());
            assert_eq!(next.repetitions, u32::MAX);
            assert_eq!(next.interval, MAX_INTERVAL);
        }

        #[test]
        fn next_review_saturates_at_latest_date() {
            let late = DateTime::<Utc>::MAX_UTC - Duration::days(2);
            let next = schedule(&state(2.5, 6, 2), q(5), late);
            assert_eq!(next.next_review, Some(DateTime::<Utc>::MAX_UTC));
        }

        #[test]
        fn preview_lists_every_rating() {
            let p = preview(&state(2.5, 6, 2), now());
            assert_eq!(p[0], (Rating::Again, 1));
            assert_eq!(p[1], (Rating::Hard, 14));
            assert_eq!(p[2], (Rating::Good, 15));
            assert_eq!(p[3], (Rating::Easy, 16));
        }
    }

    proptest! {
        #[test]
        fn pt_ease_never_below_floor(
            ease in 1.3_f64..4.0,
            interval in 0_u32..400,
            repetitions in 0_u32..20,
            quality in 0_i64..=5,
        ) {
            let next = schedule(&state(ease, interval, repetitions), q(quality), now());
            prop_assert!(next.ease >= MIN_EASE);
        }

        #[test]
        fn pt_ease_monotonic_in_quality(ease in 1.3_f64..4.0, lower in 0_i64..5) {
            let a = ease_after(ease, q(lower));
            let b = ease_after(ease, q(lower + 1));
            prop_assert!(b >= a);
        }

        #[test]
        fn pt_failure_always_resets(
            ease in 1.3_f64..4.0,
            interval in 0_u32..400,
            repetitions in 0_u32..20,
            quality in 0_i64..3,
        ) {
            let next = schedule(&state(ease, interval, repetitions), q(quality), now());
            prop_assert_eq!(next.repetitions, 0);
            prop_assert_eq!(next.interval, 1);
        }

        #[test]
        fn pt_pass_follows_ladder(
            ease in 1.3_f64..4.0,
            interval in 0_u32..400,
            repetitions in 0_u32..20,
            quality in 3_i64..=5,
        ) {
            let prior = state(ease, interval, repetitions);
            let next = schedule(&prior, q(quality), now());
            prop_assert_eq!(next.repetitions, repetitions + 1);
            let expected = match repetitions {
                0 => 1,
                1 => 6,
                _ => (interval as f64 * next.ease).round() as u32,
            };
            prop_assert_eq!(next.interval, expected);
            prop_assert_eq!(next.next_review, Some(now() + Duration::days(expected as i64)));
        }
    }
}
