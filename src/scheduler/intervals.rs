//! Interval arithmetic: fuzzing, growth on review, lapses, graduation,
//! learning-step delays. Everything here is pure over its inputs; the
//! answer engine supplies today's index and the RNG.

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{Result, SchedulerError};
use crate::models::{Card, CardType, LapseConfig, NewConfig, RevConfig};

use super::Rating;

/// Inclusive range an interval may fuzz into. Small intervals stay
/// tight; long ones wander a few percent.
pub(crate) fn fuzz_range(ivl: i32) -> (i32, i32) {
    if ivl < 2 {
        return (1, 1);
    }
    if ivl == 2 {
        return (2, 3);
    }
    let fuzz = if ivl < 7 {
        (ivl as f64 * 0.25) as i32
    } else if ivl < 30 {
        ((ivl as f64 * 0.15) as i32).max(2)
    } else {
        ((ivl as f64 * 0.05) as i32).max(4)
    };
    let fuzz = fuzz.max(1);
    (ivl - fuzz, ivl + fuzz)
}

pub(crate) fn fuzzed_ivl(rng: &mut StdRng, ivl: i32) -> i32 {
    let (min, max) = fuzz_range(ivl);
    rng.gen_range(min..=max)
}

/// Scale by the deck's interval modifier, optionally fuzz, then clamp
/// above the previous interval and below the ceiling.
pub(crate) fn constrained_ivl(
    ivl: f64,
    conf: &RevConfig,
    prev: i32,
    rng: Option<&mut StdRng>,
) -> i32 {
    let mut new_ivl = (ivl * conf.ivl_fct) as i32;
    if let Some(rng) = rng {
        new_ivl = fuzzed_ivl(rng, new_ivl);
    }
    new_ivl = new_ivl.max(prev + 1).max(1);
    new_ivl.min(conf.max_ivl)
}

/// Next interval for Hard/Good/Easy on a review card. Overdue days
/// count half for Good and in full for Easy.
pub(crate) fn next_rev_ivl(
    card: &Card,
    conf: &RevConfig,
    today: i32,
    rating: Rating,
    mut rng: Option<&mut StdRng>,
) -> i32 {
    let due = if card.in_filtered_deck() {
        card.odue
    } else {
        card.due
    };
    let delay = (i64::from(today) - due).max(0) as i32;
    let fct = f64::from(card.factor) / 1000.0;
    let hard_min = if conf.hard_factor > 1.0 { card.ivl } else { 0 };

    let ivl2 = constrained_ivl(
        f64::from(card.ivl) * conf.hard_factor,
        conf,
        hard_min,
        rng.as_deref_mut(),
    );
    if rating == Rating::Hard {
        return ivl2;
    }
    let ivl3 = constrained_ivl(
        f64::from(card.ivl + delay / 2) * fct,
        conf,
        ivl2,
        rng.as_deref_mut(),
    );
    if rating == Rating::Good {
        return ivl3;
    }
    constrained_ivl(
        f64::from(card.ivl + delay) * fct * conf.ease4,
        conf,
        ivl3,
        rng,
    )
}

/// Post-lapse interval: the old one multiplied down, floored by the
/// configured minimum and one day.
pub(crate) fn lapse_ivl(card: &Card, conf: &LapseConfig) -> i32 {
    let scaled = (f64::from(card.ivl) * conf.mult) as i32;
    scaled.max(conf.min_int).max(1)
}

/// Interval granted on graduating out of the learning steps.
pub(crate) fn graduating_ivl(
    card: &Card,
    conf: &NewConfig,
    early: bool,
    rng: Option<&mut StdRng>,
) -> i32 {
    if matches!(card.ctype, CardType::Review | CardType::Relearning) {
        // lapsed card graduating from relearning keeps its interval
        return card.ivl + if early { 1 } else { 0 };
    }
    let ideal = if early { conf.ints[1] } else { conf.ints[0] };
    match rng {
        Some(rng) => fuzzed_ivl(rng, ideal),
        None => ideal,
    }
}

/// Interval for reviewing ahead of schedule inside a filtered deck.
pub(crate) fn early_review_ivl(
    card: &Card,
    conf: &RevConfig,
    today: i32,
    rating: Rating,
) -> Result<i32> {
    if !card.in_filtered_deck()
        || card.ctype != CardType::Review
        || card.factor == 0
        || rating == Rating::Again
    {
        return Err(SchedulerError::InvalidEarlyReview);
    }
    let elapsed = i64::from(card.ivl) - (card.odue - i64::from(today));

    let mut easy_bonus = 1.0;
    // early reviews shouldn't decrease the interval
    let min_new_ivl;
    let factor;
    match rating {
        Rating::Hard => {
            factor = conf.hard_factor;
            min_new_ivl = factor / 2.0;
        }
        Rating::Good => {
            factor = f64::from(card.factor) / 1000.0;
            min_new_ivl = 1.0;
        }
        _ => {
            factor = f64::from(card.factor) / 1000.0;
            min_new_ivl = 1.0;
            // half the usual easy multiplier
            easy_bonus = conf.ease4 - (conf.ease4 - 1.0) / 2.0;
        }
    }

    let mut ivl = (elapsed as f64 * factor).max(1.0);
    ivl = (f64::from(card.ivl) * min_new_ivl).max(ivl) * easy_bonus;
    Ok(constrained_ivl(ivl, conf, 0, None))
}

/// How many of the remaining steps fit before the day cutoff, at least
/// one.
pub(crate) fn left_today(delays: &[f64], left: i32, mut now: i64, day_cutoff: i64) -> i32 {
    let offset = (left.max(0) as usize).min(delays.len());
    let mut ok = 0;
    for i in 0..offset {
        now += (delays[delays.len() - offset + i] * 60.0) as i64;
        if now > day_cutoff {
            break;
        }
        ok = i;
    }
    (ok + 1) as i32
}

/// Delay in seconds for the current learning step. Out-of-range step
/// counts (after a config change) fall back to the first step, then to
/// one minute.
pub(crate) fn delay_for_grade(delays: &[f64], left: i32) -> i64 {
    let remaining = (left % 1000).max(0) as usize;
    let minutes = if remaining == 0 || remaining > delays.len() {
        if remaining > delays.len() {
            log::warn!(
                "step count {} does not fit {} configured delays, using first step",
                remaining,
                delays.len()
            );
        }
        match delays.first() {
            Some(&first) => first,
            None => {
                log::warn!("deck has no learning steps configured, using one minute");
                1.0
            }
        }
    } else {
        delays[delays.len() - remaining]
    };
    (minutes * 60.0) as i64
}

/// Delay for repeating the current step with Hard: halfway between the
/// current step and the next one.
pub(crate) fn delay_for_repeating_grade(delays: &[f64], left: i32) -> i64 {
    let delay1 = delay_for_grade(delays, left);
    let delay2 = if delays.len() > 1 {
        delay_for_grade(delays, left - 1)
    } else {
        delay1 * 2
    };
    (delay1 + delay1.max(delay2)) / 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn review_card(ivl: i32, factor: i32) -> Card {
        let mut card = Card::new(1, 1, 1);
        card.ctype = CardType::Review;
        card.queue = crate::models::CardQueue::Review;
        card.ivl = ivl;
        card.factor = factor;
        card.due = 10;
        card
    }

    #[test]
    fn test_fuzz_range_bounds() {
        assert_eq!(fuzz_range(0), (1, 1));
        assert_eq!(fuzz_range(1), (1, 1));
        assert_eq!(fuzz_range(2), (2, 3));
        for ivl in 3..200 {
            let (lo, hi) = fuzz_range(ivl);
            assert!(lo <= ivl && ivl <= hi, "ivl {} not in [{}, {}]", ivl, lo, hi);
            assert!(lo >= 1);
        }
    }

    #[test]
    fn test_constrained_respects_prev_and_cap() {
        let conf = RevConfig::default();
        assert_eq!(constrained_ivl(3.0, &conf, 10, None), 11);
        assert_eq!(constrained_ivl(0.0, &conf, 0, None), 1);

        let mut small = RevConfig::default();
        small.max_ivl = 5;
        assert_eq!(constrained_ivl(30.0, &small, 0, None), 5);
    }

    #[test]
    fn test_next_rev_ivl_monotonic_in_ease() {
        let conf = RevConfig::default();
        let card = review_card(10, 2500);
        let hard = next_rev_ivl(&card, &conf, 12, Rating::Hard, None);
        let good = next_rev_ivl(&card, &conf, 12, Rating::Good, None);
        let easy = next_rev_ivl(&card, &conf, 12, Rating::Easy, None);
        assert!(hard < good, "{} < {}", hard, good);
        assert!(good < easy, "{} < {}", good, easy);
        // hard keeps at least the current interval growing by one
        assert!(hard > card.ivl);
    }

    #[test]
    fn test_next_rev_ivl_counts_overdue_days() {
        let conf = RevConfig::default();
        let card = review_card(10, 2500);
        // due day 10, answered day 20: ten days late
        let on_time = next_rev_ivl(&card, &conf, 10, Rating::Good, None);
        let late = next_rev_ivl(&card, &conf, 20, Rating::Good, None);
        assert!(late > on_time);
    }

    #[test]
    fn test_lapse_ivl_floors() {
        let mut card = review_card(30, 2500);
        let mut conf = LapseConfig::default();
        conf.mult = 0.5;
        conf.min_int = 1;
        assert_eq!(lapse_ivl(&card, &conf), 15);

        card.ivl = 1;
        assert_eq!(lapse_ivl(&card, &conf), 1);

        conf.min_int = 3;
        assert_eq!(lapse_ivl(&card, &conf), 3);
    }

    #[test]
    fn test_early_review_ivl_example() {
        // review card five days early with ivl 10, factor 2.5, ease4 1.3
        let mut card = review_card(10, 2500);
        card.odid = 5;
        card.odue = 15;
        let conf = RevConfig::default();
        let ivl = early_review_ivl(&card, &conf, 10, Rating::Easy).unwrap();
        // max(5 * 2.5, 1) = 12.5, then * (1.3 - 0.15) = 14.375
        assert_eq!(ivl, 14);
    }

    #[test]
    fn test_early_review_rejects_wrong_state() {
        let card = review_card(10, 2500);
        let conf = RevConfig::default();
        assert!(early_review_ivl(&card, &conf, 10, Rating::Easy).is_err());

        let mut filtered = review_card(10, 2500);
        filtered.odid = 5;
        filtered.odue = 15;
        assert!(early_review_ivl(&filtered, &conf, 10, Rating::Again).is_err());
    }

    #[test]
    fn test_graduating_ivl() {
        let mut conf = NewConfig::default();
        conf.ints = [1, 4];
        let card = Card::new(1, 1, 1);
        assert_eq!(graduating_ivl(&card, &conf, false, None), 1);
        assert_eq!(graduating_ivl(&card, &conf, true, None), 4);

        let mut relearning = review_card(7, 2500);
        relearning.ctype = CardType::Relearning;
        assert_eq!(graduating_ivl(&relearning, &conf, false, None), 7);
        assert_eq!(graduating_ivl(&relearning, &conf, true, None), 8);
    }

    #[test]
    fn test_left_today_at_least_one() {
        // cutoff already passed: still one step credited
        assert_eq!(left_today(&[1.0, 10.0], 2, 1_000, 900), 1);
        // both steps fit comfortably
        assert_eq!(left_today(&[1.0, 10.0], 2, 0, 86_400), 2);
        assert_eq!(left_today(&[], 0, 0, 86_400), 1);
    }

    #[test]
    fn test_delay_for_grade_indexes_from_the_tail() {
        let delays = [1.0, 10.0];
        // two steps left: first delay; one left: second delay
        assert_eq!(delay_for_grade(&delays, 2), 60);
        assert_eq!(delay_for_grade(&delays, 1), 600);
        // packed encoding ignores the day component
        assert_eq!(delay_for_grade(&delays, 2002), 60);
    }

    #[test]
    fn test_delay_for_grade_fallbacks() {
        assert_eq!(delay_for_grade(&[5.0], 3), 300);
        assert_eq!(delay_for_grade(&[], 1), 60);
    }

    #[test]
    fn test_delay_for_repeating_grade() {
        let delays = [1.0, 10.0];
        // repeating the first step: between 60s and 600s
        assert_eq!(delay_for_repeating_grade(&delays, 2), 330);
        // single step: average with its double
        assert_eq!(delay_for_repeating_grade(&[10.0], 1), 900);
    }

    #[test]
    fn test_fuzzed_ivl_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let ivl = fuzzed_ivl(&mut rng, 20);
            let (lo, hi) = fuzz_range(20);
            assert!(ivl >= lo && ivl <= hi);
        }
    }
}
