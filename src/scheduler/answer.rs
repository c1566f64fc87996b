//! The answer engine: applies a rating to a card and transitions its
//! state, consulting the interval math, sibling coordination, and leech
//! detection. Each answer flushes the card and appends a review-log
//! row inside one transaction.

use rand::Rng;

use crate::error::{Result, SchedulerError};
use crate::models::{Card, CardQueue, CardType, LapseConfig, LeechAction, LeftState, RevlogKind};

use super::intervals::{
    delay_for_grade, delay_for_repeating_grade, early_review_ivl, graduating_ivl, lapse_ivl,
    left_today, next_rev_ivl,
};
use super::timing::SECONDS_PER_DAY;
use super::{Rating, Scheduler, StatKind, FACTOR_ADDITION};

/// Restore a card's home deck when it leaves a filtered deck.
pub(super) fn remove_from_filtered(card: &mut Card) {
    card.did = card.odid;
    card.odue = 0;
    card.odid = 0;
}

impl Scheduler {
    /// Apply a rating to the card that was just shown.
    pub fn answer_card(&mut self, card: &mut Card, rating: Rating) -> Result<()> {
        self.discard_current_card();
        self.bury_siblings(card)?;

        self.col.store().begin()?;
        match self.answer_card_inner(card, rating) {
            Ok(()) => {
                let taken = self.time_taken_ms(card)?;
                self.update_stats(card.did, StatKind::Time, taken)?;
                card.mtime = self.col.clock().now_secs();
                card.usn = self.col.usn();
                self.col.store().flush_card(card)?;
                self.col.store().commit()?;
                Ok(())
            }
            Err(e) => {
                let _ = self.col.store().rollback();
                Err(e)
            }
        }
    }

    fn answer_card_inner(&mut self, card: &mut Card, rating: Rating) -> Result<()> {
        if self.col.previewing(card)? {
            return self.answer_card_preview(card, rating);
        }

        card.reps += 1;
        if card.queue == CardQueue::New {
            // first exposure moves the card into learning
            card.queue = CardQueue::Learning;
            card.ctype = CardType::Learning;
            card.left = self.starting_left(card)?;
            self.update_stats(card.did, StatKind::New, 1)?;
        }

        match card.queue {
            CardQueue::Learning | CardQueue::DayLearn => self.answer_lrn_card(card, rating)?,
            CardQueue::Review => {
                self.answer_rev_card(card, rating)?;
                self.update_stats(card.did, StatKind::Rev, 1)?;
            }
            queue => return Err(SchedulerError::InvalidTransition { queue }),
        }

        // once answered, the stashed original due no longer applies
        if card.odue > 0 {
            card.odue = 0;
        }
        Ok(())
    }

    // ==================== Previewing ====================

    fn answer_card_preview(&mut self, card: &mut Card, rating: Rating) -> Result<()> {
        match rating {
            Rating::Again => {
                card.queue = CardQueue::Preview;
                card.due = self.col.clock().now_secs() + self.col.preview_delay_secs(card)?;
                self.lrn_count += 1;
            }
            Rating::Hard => {
                self.restore_preview_card(card)?;
                remove_from_filtered(card);
            }
            _ => return Err(SchedulerError::InvalidTransition { queue: card.queue }),
        }
        Ok(())
    }

    /// Put a previewed card back in the state it was gathered from.
    pub(super) fn restore_preview_card(&self, card: &mut Card) -> Result<()> {
        if !card.in_filtered_deck() {
            return Err(SchedulerError::InvalidPreviewState);
        }
        card.due = card.odue;
        card.queue = match card.ctype {
            // learning dues may be in seconds or days
            CardType::Learning | CardType::Relearning => {
                if card.odue > 1_000_000_000 {
                    CardQueue::Learning
                } else {
                    CardQueue::DayLearn
                }
            }
            CardType::New => CardQueue::New,
            CardType::Review => CardQueue::Review,
        };
        Ok(())
    }

    // ==================== Learning ====================

    /// Packed step count for a card entering (re)learning.
    pub(super) fn starting_left(&self, card: &Card) -> Result<i32> {
        let delays = self.col.lrn_delays(card)?;
        let remaining = delays.len() as i32;
        let today_count = left_today(
            &delays,
            remaining,
            self.col.clock().now_secs(),
            self.day_cutoff,
        );
        Ok(LeftState {
            today_count,
            remaining,
        }
        .pack())
    }

    fn answer_lrn_card(&mut self, card: &mut Card, rating: Rating) -> Result<()> {
        let delays = self.col.lrn_delays(card)?;
        let kind = if matches!(card.ctype, CardType::Review | CardType::Relearning) {
            RevlogKind::Relearn
        } else {
            RevlogKind::Learn
        };
        let last_left = card.left;
        let mut leaving = false;

        match rating {
            Rating::Easy => {
                self.reschedule_as_rev(card, true)?;
                leaving = true;
            }
            Rating::Good => {
                if LeftState::unpack(card.left).remaining <= 1 {
                    // last step done; graduate
                    self.reschedule_as_rev(card, false)?;
                    leaving = true;
                } else {
                    self.move_to_next_step(card, &delays)?;
                }
            }
            Rating::Hard => {
                let delay = delay_for_repeating_grade(&delays, card.left);
                self.reschedule_lrn_card(card, Some(delay))?;
            }
            Rating::Again => {
                self.move_to_first_step(card)?;
            }
        }
        self.log_lrn(card, rating, &delays, leaving, kind, last_left)
    }

    fn move_to_next_step(&mut self, card: &mut Card, delays: &[f64]) -> Result<()> {
        let remaining = LeftState::unpack(card.left).remaining - 1;
        let today_count = left_today(
            delays,
            remaining,
            self.col.clock().now_secs(),
            self.day_cutoff,
        );
        card.left = LeftState {
            today_count,
            remaining,
        }
        .pack();
        self.reschedule_lrn_card(card, None)?;
        Ok(())
    }

    /// Back to the first step; relearning cards also take their lapse
    /// interval now. Returns the applied delay in seconds.
    fn move_to_first_step(&mut self, card: &mut Card) -> Result<i64> {
        card.left = self.starting_left(card)?;
        if card.ctype == CardType::Relearning {
            self.update_rev_ivl_on_fail(card)?;
        }
        self.reschedule_lrn_card(card, None)
    }

    fn update_rev_ivl_on_fail(&self, card: &mut Card) -> Result<()> {
        let conf = self.col.lapse_conf(card)?;
        card.last_ivl = card.ivl;
        card.ivl = lapse_ivl(card, &conf);
        Ok(())
    }

    fn reschedule_lrn_card(&mut self, card: &mut Card, delay: Option<i64>) -> Result<i64> {
        let delays = self.col.lrn_delays(card)?;
        let delay = delay.unwrap_or_else(|| delay_for_grade(&delays, card.left));
        let now = self.col.clock().now_secs();
        card.due = now + delay;

        if card.due < self.day_cutoff {
            // a little spread, up to five minutes or a quarter step
            let max_extra = (delay / 4).min(300);
            let fuzz = self.rng.gen_range(0..max_extra.max(1));
            card.due = (card.due + fuzz).min(self.day_cutoff - 1);
            card.queue = CardQueue::Learning;
            if card.due < now + self.col.options().collapse_time_secs {
                self.lrn_count += 1;
                // if nothing else is waiting, don't let the card land at
                // the head of the queue and show twice in a row
                if !self.lrn_queue.is_empty() && self.rev_count == 0 && self.new_count == 0 {
                    if let Some(smallest_due) = self.lrn_queue.first_due() {
                        card.due = card.due.max(smallest_due + 1);
                    }
                }
                self.lrn_queue.sort_insert(card.due, card.id);
            }
        } else {
            let ahead = (card.due - self.day_cutoff) / SECONDS_PER_DAY + 1;
            card.due = i64::from(self.today) + ahead;
            card.queue = CardQueue::DayLearn;
        }
        Ok(delay)
    }

    // ==================== Graduation ====================

    fn reschedule_as_rev(&mut self, card: &mut Card, early: bool) -> Result<()> {
        let lapse = matches!(card.ctype, CardType::Review | CardType::Relearning);
        if lapse {
            // relearning done; the interval was set at lapse time
            if early {
                card.ivl += 1;
            }
            card.due = i64::from(self.today) + i64::from(card.ivl);
            card.queue = CardQueue::Review;
            card.ctype = CardType::Review;
        } else {
            let conf = self.col.new_conf(card)?;
            card.ivl = graduating_ivl(card, &conf, early, Some(&mut self.rng));
            card.due = i64::from(self.today) + i64::from(card.ivl);
            card.factor = conf.initial_factor;
            card.ctype = CardType::Review;
            card.queue = CardQueue::Review;
        }
        if card.in_filtered_deck() {
            remove_from_filtered(card);
        }
        Ok(())
    }

    // ==================== Reviews ====================

    fn answer_rev_card(&mut self, card: &mut Card, rating: Rating) -> Result<()> {
        let early = card.in_filtered_deck() && card.odue > i64::from(self.today);
        let kind = if early {
            RevlogKind::EarlyReview
        } else {
            RevlogKind::Review
        };
        let delay = if rating == Rating::Again {
            self.reschedule_lapse(card)?
        } else {
            self.reschedule_rev(card, rating, early)?;
            0
        };
        self.log_rev(card, rating, delay, kind)
    }

    fn reschedule_lapse(&mut self, card: &mut Card) -> Result<i64> {
        let conf = self.col.lapse_conf(card)?;
        card.lapses += 1;
        card.factor = (card.factor - 200).max(1300);

        let suspended = self.check_leech(card, &conf)? && card.queue == CardQueue::Suspended;

        if !conf.delays.is_empty() && !suspended {
            card.ctype = CardType::Relearning;
            self.move_to_first_step(card)
        } else {
            // no relearning steps: straight back to review
            self.update_rev_ivl_on_fail(card)?;
            self.reschedule_as_rev(card, false)?;
            if suspended {
                card.queue = CardQueue::Suspended;
            }
            Ok(0)
        }
    }

    fn reschedule_rev(&mut self, card: &mut Card, rating: Rating, early: bool) -> Result<()> {
        card.last_ivl = card.ivl;
        let conf = self.col.rev_conf(card)?;
        card.ivl = if early {
            early_review_ivl(card, &conf, self.today, rating)?
        } else {
            next_rev_ivl(card, &conf, self.today, rating, Some(&mut self.rng))
        };
        card.factor = (card.factor + FACTOR_ADDITION[(rating.ease() - 2) as usize]).max(1300);
        card.due = i64::from(self.today) + i64::from(card.ivl);
        if card.in_filtered_deck() {
            remove_from_filtered(card);
        }
        Ok(())
    }

    // ==================== Leeches ====================

    /// Tag (and maybe suspend) a card that keeps lapsing. Triggers at
    /// the threshold and every half-threshold after.
    fn check_leech(&mut self, card: &mut Card, conf: &LapseConfig) -> Result<bool> {
        let threshold = conf.leech_fails;
        if threshold == 0 {
            return Ok(false);
        }
        if card.lapses >= threshold && (card.lapses - threshold) % (threshold / 2).max(1) == 0 {
            let now = self.col.clock().now_secs();
            self.col
                .store()
                .note_add_tag(card.nid, "leech", now, self.col.usn())?;
            if conf.leech_action == LeechAction::Suspend {
                card.queue = CardQueue::Suspended;
            }
            log::info!("card {} is a leech after {} lapses", card.id, card.lapses);
            if let Some(hook) = &mut self.leech_hook {
                hook(card);
            }
            return Ok(true);
        }
        Ok(false)
    }

    // ==================== Sibling spacing ====================

    /// Pull same-note cards out of today's queues; bury those whose
    /// config asks for it. Spacing applies either way.
    pub(super) fn bury_siblings(&mut self, card: &Card) -> Result<()> {
        let bury_new = self.col.new_conf(card)?.bury;
        let bury_rev = self.col.rev_conf(card)?.bury;
        let mut to_bury = Vec::new();
        let siblings = self
            .col
            .store()
            .siblings_for_spacing(card.nid, card.id, self.today)?;
        for (cid, queue) in siblings {
            if queue == CardQueue::Review {
                self.remove_from_rev_queue(cid);
                if bury_rev {
                    to_bury.push(cid);
                }
            } else {
                self.remove_from_new_queue(cid);
                if bury_new {
                    to_bury.push(cid);
                }
            }
        }
        if !to_bury.is_empty() {
            self.bury_cards(&to_bury, false)?;
        }
        Ok(())
    }

    // ==================== Logging ====================

    fn time_taken_ms(&self, card: &Card) -> Result<i64> {
        let max_taken = self.col.max_taken_secs(card)?;
        Ok(card.time_taken_ms(self.col.clock().now_ms(), max_taken))
    }

    fn log_lrn(
        &self,
        card: &Card,
        rating: Rating,
        delays: &[f64],
        leaving: bool,
        kind: RevlogKind,
        last_left: i32,
    ) -> Result<()> {
        // in-learning intervals are logged as negative seconds
        let last_ivl = -delay_for_grade(delays, last_left);
        let ivl = if leaving {
            i64::from(card.ivl)
        } else {
            -delay_for_grade(delays, card.left)
        };
        self.log_review(
            card.id,
            rating.ease(),
            ivl,
            last_ivl,
            card.factor,
            self.time_taken_ms(card)?,
            kind,
        )
    }

    fn log_rev(&self, card: &Card, rating: Rating, delay: i64, kind: RevlogKind) -> Result<()> {
        let ivl = if delay != 0 {
            -delay
        } else {
            i64::from(card.ivl)
        };
        self.log_review(
            card.id,
            rating.ease(),
            ivl,
            i64::from(card.last_ivl),
            card.factor,
            self.time_taken_ms(card)?,
            kind,
        )
    }
}
