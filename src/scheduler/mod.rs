//! The scheduling core.
//!
//! `Scheduler` owns the collection and decides which card to show next
//! and how a card's state changes after a rating. Submodules hold the
//! queue buffers, limit computation, the answer state machine, filtered
//! deck handling, bulk queue operations, maintenance tools, and the
//! version migration.

mod answer;
mod bury;
mod convert;
mod filtered;
mod intervals;
mod limits;
mod queues;
pub mod timing;
mod tools;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::collection::{Collection, SchedulerVersion};
use crate::error::Result;
use crate::models::{Card, CardQueue, NewSpread, RevlogEntry, RevlogKind};

pub use bury::UnburyKind;
pub use limits::DeckDueCounts;

use intervals::{
    delay_for_grade, delay_for_repeating_grade, early_review_ivl, graduating_ivl, lapse_ivl,
    next_rev_ivl,
};
use queues::LrnQueue;
use timing::SECONDS_PER_DAY;

/// Cards fetched per deck per queue fill.
pub(crate) const QUEUE_LIMIT: i32 = 50;
/// Effectively-unbounded limit used where no real cap applies.
pub(crate) const REPORT_LIMIT: i32 = 99_999;
/// Per-deck limit applied to filtered decks.
pub(crate) const DYN_REPORT_LIMIT: i32 = 99_999;

/// Ease factor adjustment per answer, indexed by Hard/Good/Easy.
pub(crate) const FACTOR_ADDITION: [i32; 3] = [-150, 0, 150];

/// User rating of a recall attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    /// Ease value recorded in the review log.
    pub fn ease(self) -> i32 {
        match self {
            Self::Again => 1,
            Self::Hard => 2,
            Self::Good => 3,
            Self::Easy => 4,
        }
    }
}

/// The (new, learning, review) triple shown in a session header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counts {
    pub new: i32,
    pub lrn: i32,
    pub rev: i32,
}

impl Counts {
    pub fn total(self) -> i32 {
        self.new + self.lrn + self.rev
    }
}

/// Which count bucket a card belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    New,
    Lrn,
    Rev,
}

/// Cooperative cancellation for count recomputation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deck counters a stat update touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatKind {
    New,
    Rev,
    Time,
}

/// The card currently on screen, tracked so queue fills skip it and
/// its siblings.
struct CurrentCard {
    id: i64,
    nid: i64,
    queue: CardQueue,
    /// The card's deck and every ancestor.
    lineage: Vec<i64>,
}

pub struct Scheduler {
    col: Collection,
    version: SchedulerVersion,

    today: i32,
    day_cutoff: i64,
    lrn_cutoff: i64,

    have_queues: bool,
    have_counts: bool,
    new_count: i32,
    lrn_count: i32,
    rev_count: i32,

    new_queue: VecDeque<i64>,
    new_dids: VecDeque<i64>,
    lrn_queue: LrnQueue,
    lrn_day_queue: VecDeque<i64>,
    lrn_dids: VecDeque<i64>,
    rev_queue: VecDeque<i64>,

    reps: i32,
    new_card_modulus: i32,
    current: Option<CurrentCard>,

    rng: StdRng,
    leech_hook: Option<Box<dyn FnMut(&Card) + Send>>,
    reset_hook: Option<Box<dyn FnMut() + Send>>,
}

impl Scheduler {
    pub fn new(col: Collection) -> Result<Self> {
        let version = col.options().scheduler_version;
        let mut sched = Self {
            col,
            version,
            today: 0,
            day_cutoff: 0,
            lrn_cutoff: 0,
            have_queues: false,
            have_counts: false,
            new_count: 0,
            lrn_count: 0,
            rev_count: 0,
            new_queue: VecDeque::new(),
            new_dids: VecDeque::new(),
            lrn_queue: LrnQueue::new(),
            lrn_day_queue: VecDeque::new(),
            lrn_dids: VecDeque::new(),
            rev_queue: VecDeque::new(),
            reps: 0,
            new_card_modulus: 0,
            current: None,
            rng: StdRng::from_entropy(),
            leech_hook: None,
            reset_hook: None,
        };
        sched.update_cutoff()?;
        Ok(sched)
    }

    pub fn name(&self) -> &'static str {
        match self.version {
            SchedulerVersion::V1 => "std",
            SchedulerVersion::V2 => "std2",
        }
    }

    pub fn version(&self) -> SchedulerVersion {
        self.version
    }

    pub fn col(&self) -> &Collection {
        &self.col
    }

    pub fn col_mut(&mut self) -> &mut Collection {
        &mut self.col
    }

    pub fn today(&self) -> i32 {
        self.today
    }

    pub fn day_cutoff(&self) -> i64 {
        self.day_cutoff
    }

    /// Seed the fuzz/reschedule RNG, for reproducible runs.
    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Called with each card that crosses the leech threshold.
    pub fn set_leech_hook(&mut self, hook: Box<dyn FnMut(&Card) + Send>) {
        self.leech_hook = Some(hook);
    }

    /// Called when a fetch came up empty with stale counts; the
    /// embedding application should schedule a `reset` soon.
    pub fn set_reset_hook(&mut self, hook: Box<dyn FnMut() + Send>) {
        self.reset_hook = Some(hook);
    }

    // ==================== Day cutoff ====================

    /// Recompute today's index and cutoff. On rollover, deck counters
    /// reset and sibling-buried cards return to their queues.
    pub(crate) fn update_cutoff(&mut self) -> Result<()> {
        let timing = self.col.timing_today();
        if timing.days_elapsed != self.today {
            log::info!(
                "day rolled over to {} (cutoff {})",
                timing.days_elapsed,
                timing.next_day_at
            );
        }
        self.today = timing.days_elapsed;
        self.day_cutoff = timing.next_day_at;

        let today = i64::from(self.today);
        for deck in self.col.decks_mut().all_mut() {
            deck.roll_counters(today);
        }

        if self.col.options().last_unburied < self.today {
            self.col.store().unbury_sibling_buried()?;
            self.col.options_mut().last_unburied = self.today;
        }
        Ok(())
    }

    /// Full reset if the day has rolled over since the last one.
    pub(crate) fn check_day(&mut self) -> Result<()> {
        if self.col.clock().now_secs() > self.day_cutoff {
            self.reset(None)?;
        }
        Ok(())
    }

    // ==================== Reset machinery ====================

    /// Recompute counts and rebuild queues.
    pub fn reset(&mut self, cancel: Option<&CancelToken>) -> Result<()> {
        self.update_cutoff()?;
        self.reset_counts_inner(cancel)?;
        if self.have_counts {
            self.reset_queues_inner()?;
        }
        Ok(())
    }

    /// Recompute the three counts, checking for cancellation between
    /// phases. Leaves `have_counts` unset when cancelled.
    pub fn reset_counts(&mut self, cancel: Option<&CancelToken>) -> Result<()> {
        self.update_cutoff()?;
        self.reset_counts_inner(cancel)
    }

    fn reset_counts_inner(&mut self, cancel: Option<&CancelToken>) -> Result<()> {
        self.have_counts = false;
        if !self.reset_lrn_count(cancel)? {
            return Ok(());
        }
        if !self.reset_rev_count(cancel)? {
            return Ok(());
        }
        if !self.reset_new_count(cancel)? {
            return Ok(());
        }
        self.have_counts = true;
        Ok(())
    }

    /// Rebuild the in-memory queues without touching counts.
    pub fn reset_queues(&mut self) -> Result<()> {
        self.update_cutoff()?;
        self.reset_queues_inner()
    }

    fn reset_queues_inner(&mut self) -> Result<()> {
        self.reset_lrn_queue();
        self.reset_rev_queue();
        self.reset_new_queue();
        self.have_queues = true;
        Ok(())
    }

    /// Invalidate queues and counts until the next fetch; used after
    /// bulk state edits.
    pub fn defer_reset(&mut self, current: Option<&Card>) {
        self.have_queues = false;
        self.have_counts = false;
        match current {
            Some(card) => {
                // best effort; a missing deck resolves at the next reset
                let _ = self.set_current(card);
            }
            None => self.discard_current_card(),
        }
    }

    pub fn discard_current_card(&mut self) {
        self.current = None;
    }

    fn set_current(&mut self, card: &Card) -> Result<()> {
        let mut lineage = self.col.decks().parents(card.did)?;
        lineage.push(card.did);
        self.current = Some(CurrentCard {
            id: card.id,
            nid: card.nid,
            queue: card.queue,
            lineage,
        });
        Ok(())
    }

    pub(crate) fn current_card_id(&self) -> i64 {
        self.current.as_ref().map_or(0, |c| c.id)
    }

    pub(crate) fn current_card_nid(&self) -> i64 {
        self.current.as_ref().map_or(0, |c| c.nid)
    }

    /// Is the on-screen card in the given queue, in `did` or one of its
    /// subdecks?
    pub(crate) fn current_card_in_queue_under(&self, queue: CardQueue, did: i64) -> bool {
        self.current
            .as_ref()
            .map_or(false, |c| c.queue == queue && c.lineage.contains(&did))
    }

    fn decrement_counts(&mut self, card: &Card) {
        match card.queue {
            CardQueue::New => self.new_count -= 1,
            CardQueue::Learning | CardQueue::DayLearn | CardQueue::Preview => self.lrn_count -= 1,
            CardQueue::Review => self.rev_count -= 1,
            _ => {}
        }
    }

    // ==================== Selection ====================

    /// The next card to show, or `None` when the session is done.
    pub fn get_card(&mut self) -> Result<Option<Card>> {
        self.check_day()?;
        if !self.have_queues {
            self.reset_queues()?;
        }
        let mut card = self.next_card()?;
        if card.is_none() && !self.have_counts {
            // counts were stale; rebuild everything and retry once
            self.reset(None)?;
            card = self.next_card()?;
        }
        let fetched = match card {
            Some(mut card) => {
                self.reps += 1;
                self.set_current(&card)?;
                self.decrement_counts(&card);
                card.start_timer(self.col.clock().now_ms());
                Some(card)
            }
            None => {
                self.discard_current_card();
                None
            }
        };
        if !self.have_counts {
            if let Some(hook) = &mut self.reset_hook {
                hook();
            }
        }
        Ok(fetched)
    }

    fn next_card(&mut self) -> Result<Option<Card>> {
        if let Some(card) = self.get_lrn_card(false)? {
            return Ok(Some(card));
        }
        if self.time_for_new_card() {
            if let Some(card) = self.get_new_card()? {
                return Ok(Some(card));
            }
        }
        let day_learn_first = self.col.options().day_learn_first;
        if day_learn_first {
            if let Some(card) = self.get_lrn_day_card()? {
                return Ok(Some(card));
            }
        }
        if let Some(card) = self.get_rev_card()? {
            return Ok(Some(card));
        }
        if !day_learn_first {
            if let Some(card) = self.get_lrn_day_card()? {
                return Ok(Some(card));
            }
        }
        if let Some(card) = self.get_new_card()? {
            return Ok(Some(card));
        }
        self.get_lrn_card(true)
    }

    fn time_for_new_card(&self) -> bool {
        if self.have_counts && self.new_count == 0 {
            return false;
        }
        match self.col.options().new_spread {
            NewSpread::Last => false,
            NewSpread::First => true,
            NewSpread::Distribute => {
                self.new_card_modulus != 0 && self.reps != 0 && self.reps % self.new_card_modulus == 0
            }
        }
    }

    pub(crate) fn update_new_card_ratio(&mut self) {
        self.new_card_modulus = 0;
        if self.col.options().new_spread == NewSpread::Distribute && self.new_count != 0 {
            let modulus = (self.new_count + self.rev_count) / self.new_count;
            self.new_card_modulus = if self.rev_count != 0 {
                modulus.max(2)
            } else {
                modulus
            };
        }
    }

    // ==================== Counts for display ====================

    pub fn counts(&mut self) -> Result<Counts> {
        if !self.have_counts {
            self.reset_counts(None)?;
        }
        Ok(Counts {
            new: self.new_count,
            lrn: self.lrn_count,
            rev: self.rev_count,
        })
    }

    /// Counts with the on-screen card added back to its bucket.
    pub fn counts_with_card(&mut self, card: &Card) -> Result<Counts> {
        let mut counts = self.counts()?;
        match self.count_idx(card)? {
            CountKind::New => counts.new += 1,
            CountKind::Lrn => counts.lrn += 1,
            CountKind::Rev => counts.rev += 1,
        }
        Ok(counts)
    }

    pub fn count_idx(&self, card: &Card) -> Result<CountKind> {
        match card.queue {
            CardQueue::New => Ok(CountKind::New),
            CardQueue::Learning | CardQueue::DayLearn | CardQueue::Preview => Ok(CountKind::Lrn),
            CardQueue::Review => Ok(CountKind::Rev),
            queue => Err(crate::error::SchedulerError::InvalidTransition { queue }),
        }
    }

    /// Two buttons while previewing, four otherwise.
    pub fn answer_buttons(&self, card: &Card) -> Result<u8> {
        if self.col.previewing(card)? {
            Ok(2)
        } else {
            Ok(4)
        }
    }

    // ==================== Interval preview ====================

    /// Seconds until the card would come back if answered with
    /// `rating`; what a UI prints on the answer buttons.
    pub fn next_ivl(&self, card: &Card, rating: Rating) -> Result<i64> {
        if self.col.previewing(card)? {
            return Ok(match rating {
                Rating::Again => self.col.preview_delay_secs(card)?,
                _ => 0,
            });
        }
        match card.queue {
            CardQueue::New | CardQueue::Learning | CardQueue::DayLearn => {
                self.next_lrn_ivl(card, rating)
            }
            _ if rating == Rating::Again => {
                let conf = self.col.lapse_conf(card)?;
                if let Some(&first) = conf.delays.first() {
                    Ok((first * 60.0) as i64)
                } else {
                    Ok(i64::from(lapse_ivl(card, &conf)) * SECONDS_PER_DAY)
                }
            }
            _ => {
                let early = card.in_filtered_deck() && card.odue > i64::from(self.today);
                let conf = self.col.rev_conf(card)?;
                let days = if early {
                    early_review_ivl(card, &conf, self.today, rating)?
                } else {
                    next_rev_ivl(card, &conf, self.today, rating, None)
                };
                Ok(i64::from(days) * SECONDS_PER_DAY)
            }
        }
    }

    fn next_lrn_ivl(&self, card: &Card, rating: Rating) -> Result<i64> {
        let left = if card.queue == CardQueue::New {
            self.starting_left(card)?
        } else {
            card.left
        };
        let delays = self.col.lrn_delays(card)?;
        match rating {
            Rating::Again => Ok(delay_for_grade(&delays, delays.len() as i32)),
            Rating::Hard => Ok(delay_for_repeating_grade(&delays, left)),
            Rating::Easy => {
                let conf = self.col.new_conf(card)?;
                Ok(i64::from(graduating_ivl(card, &conf, true, None)) * SECONDS_PER_DAY)
            }
            Rating::Good => {
                let remaining = left % 1000 - 1;
                if remaining <= 0 {
                    let conf = self.col.new_conf(card)?;
                    Ok(i64::from(graduating_ivl(card, &conf, false, None)) * SECONDS_PER_DAY)
                } else {
                    Ok(delay_for_grade(&delays, remaining))
                }
            }
        }
    }

    // ==================== Buried state ====================

    pub fn have_buried_siblings(&self) -> Result<bool> {
        let active = self.col.decks().active();
        Ok(self
            .col
            .store()
            .have_cards_in_queue(&active, CardQueue::SiblingBuried)?)
    }

    pub fn have_manually_buried(&self) -> Result<bool> {
        let active = self.col.decks().active();
        Ok(self
            .col
            .store()
            .have_cards_in_queue(&active, CardQueue::ManuallyBuried)?)
    }

    pub fn have_buried(&self) -> Result<bool> {
        Ok(self.have_buried_siblings()? || self.have_manually_buried()?)
    }

    // ==================== Daily limit adjustments ====================

    /// Widen today's limits on the selected deck, its ancestors and its
    /// subdecks (custom study).
    pub fn extend_limits(&mut self, extra_new: i64, extra_rev: i64) -> Result<()> {
        let selected = self.col.decks().selected();
        let mut dids = self.col.decks().parents(selected)?;
        dids.push(selected);
        dids.extend(self.col.decks().children(selected)?);
        for did in dids {
            let deck = self.col.decks_mut().get_mut(did)?;
            deck.new_today[1] -= extra_new;
            deck.rev_today[1] -= extra_rev;
        }
        Ok(())
    }

    pub(crate) fn update_stats(&mut self, did: i64, kind: StatKind, cnt: i64) -> Result<()> {
        let mut dids = self.col.decks().parents(did)?;
        dids.push(did);
        for id in dids {
            let deck = self.col.decks_mut().get_mut(id)?;
            match kind {
                StatKind::New => deck.new_today[1] += cnt,
                StatKind::Rev => deck.rev_today[1] += cnt,
                StatKind::Time => deck.time_today[1] += cnt,
            }
        }
        Ok(())
    }

    // ==================== Review log ====================

    /// Append a review-log row. A timestamp collision (two answers in
    /// the same millisecond) backs off briefly and retries once.
    pub(crate) fn log_review(
        &self,
        cid: i64,
        ease: i32,
        ivl: i64,
        last_ivl: i64,
        factor: i32,
        time_taken_ms: i64,
        kind: RevlogKind,
    ) -> Result<()> {
        let entry = RevlogEntry {
            id: self.col.clock().now_ms(),
            cid,
            usn: self.col.usn(),
            ease,
            ivl,
            last_ivl,
            factor,
            time_taken_ms,
            kind,
        };
        match self.col.store().add_revlog(&entry) {
            Err(crate::storage::StorageError::RevlogIdClash) => {
                log::debug!("revlog timestamp {} taken, retrying", entry.id);
                std::thread::sleep(Duration::from_millis(10));
                let entry = RevlogEntry {
                    id: self.col.clock().now_ms(),
                    ..entry
                };
                Ok(self.col.store().add_revlog(&entry)?)
            }
            other => Ok(other?),
        }
    }
}
