//! The collection: card store, deck registry, options, and clock.
//!
//! The scheduler owns a `Collection` and goes through it for every
//! piece of shared state. Effective per-card configuration (including
//! the filtered-deck overlay) is resolved here.

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{Card, DeckConfig, LapseConfig, NewCardOrder, NewConfig, NewSpread, RevConfig};
use crate::scheduler::timing::{local_day_anchor, SchedTiming, SystemClock, TimeSource};
use crate::scheduler::REPORT_LIMIT;
use crate::storage::{DeckRegistry, Store};

/// Which scheduling variant the collection runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerVersion {
    V1,
    V2,
}

/// Collection-wide options the scheduler consults.
#[derive(Debug, Clone)]
pub struct CollectionOptions {
    /// Show day-learning cards before reviews.
    pub day_learn_first: bool,
    /// How new cards mix with reviews.
    pub new_spread: NewSpread,
    /// End-of-queue window in which learning cards show early, seconds.
    pub collapse_time_secs: i64,
    /// Day index of the last automatic unbury.
    pub last_unburied: i32,
    pub scheduler_version: SchedulerVersion,
    /// Local hour at which the day rolls over.
    pub rollover_hour: u32,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            day_learn_first: false,
            new_spread: NewSpread::Distribute,
            collapse_time_secs: 1200,
            last_unburied: 0,
            scheduler_version: SchedulerVersion::V2,
            rollover_hour: 4,
        }
    }
}

pub struct Collection {
    store: Store,
    decks: DeckRegistry,
    options: CollectionOptions,
    /// Epoch seconds of the first day's rollover; day indexes count
    /// from here.
    crt: i64,
    usn: i32,
    clock: Arc<dyn TimeSource>,
}

impl Collection {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::with_parts(
            Store::open(path)?,
            Arc::new(SystemClock),
            local_day_anchor(CollectionOptions::default().rollover_hour),
        ))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::with_parts(
            Store::open_in_memory()?,
            Arc::new(SystemClock),
            local_day_anchor(CollectionOptions::default().rollover_hour),
        ))
    }

    /// Build a collection on an explicit clock and creation anchor;
    /// the entry point tests and simulations use.
    pub fn open_in_memory_at(clock: Arc<dyn TimeSource>, creation_anchor: i64) -> Result<Self> {
        Ok(Self::with_parts(Store::open_in_memory()?, clock, creation_anchor))
    }

    fn with_parts(store: Store, clock: Arc<dyn TimeSource>, crt: i64) -> Self {
        Self {
            store,
            decks: DeckRegistry::new(),
            options: CollectionOptions::default(),
            crt,
            usn: -1,
            clock,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn decks(&self) -> &DeckRegistry {
        &self.decks
    }

    pub fn decks_mut(&mut self) -> &mut DeckRegistry {
        &mut self.decks
    }

    pub fn options(&self) -> &CollectionOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut CollectionOptions {
        &mut self.options
    }

    pub fn clock(&self) -> &dyn TimeSource {
        self.clock.as_ref()
    }

    pub fn usn(&self) -> i32 {
        self.usn
    }

    pub fn timing_today(&self) -> SchedTiming {
        SchedTiming::compute(self.crt, self.clock.now_secs())
    }

    // ==================== Config view ====================

    /// Raw config group of the card's current deck.
    pub fn card_conf(&self, card: &Card) -> Result<&DeckConfig> {
        Ok(self.decks.config_for_deck(card.did)?)
    }

    /// Effective new-card settings. In a filtered deck, step delays and
    /// graduation come from the original deck; ordering and the daily
    /// limit come from the filtered deck.
    pub fn new_conf(&self, card: &Card) -> Result<NewConfig> {
        if !card.in_filtered_deck() {
            return Ok(self.decks.config_for_deck(card.did)?.new.clone());
        }
        let home = &self.decks.config_for_deck(card.odid)?.new;
        let deck = self.decks.get(card.did)?;
        let mut conf = home.clone();
        conf.order = NewCardOrder::Due;
        conf.per_day = REPORT_LIMIT;
        conf.separate = deck.separate;
        Ok(conf)
    }

    /// Effective lapse settings; always the original deck's.
    pub fn lapse_conf(&self, card: &Card) -> Result<LapseConfig> {
        let did = if card.in_filtered_deck() {
            card.odid
        } else {
            card.did
        };
        Ok(self.decks.config_for_deck(did)?.lapse.clone())
    }

    /// Effective review settings; always the original deck's.
    pub fn rev_conf(&self, card: &Card) -> Result<RevConfig> {
        let did = if card.in_filtered_deck() {
            card.odid
        } else {
            card.did
        };
        Ok(self.decks.config_for_deck(did)?.rev.clone())
    }

    /// Step delays in effect for a card in (re)learning.
    pub fn lrn_delays(&self, card: &Card) -> Result<Vec<f64>> {
        use crate::models::CardType;
        if matches!(card.ctype, CardType::Review | CardType::Relearning) {
            Ok(self.lapse_conf(card)?.delays)
        } else {
            Ok(self.new_conf(card)?.delays)
        }
    }

    /// True while the card sits in a filtered deck that does not
    /// reschedule: answers only cycle it for preview.
    pub fn previewing(&self, card: &Card) -> Result<bool> {
        let deck = self.decks.get(card.did)?;
        Ok(deck.dynamic && !deck.resched)
    }

    pub fn preview_delay_secs(&self, card: &Card) -> Result<i64> {
        let deck = self.decks.get(card.did)?;
        Ok(i64::from(deck.preview_delay) * 60)
    }

    pub fn max_taken_secs(&self, card: &Card) -> Result<i32> {
        Ok(self.card_conf(card)?.max_taken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::timing::ManualClock;

    fn filtered_card_setup() -> (Collection, Card) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let mut col = Collection::open_in_memory_at(clock, 1_699_999_000).unwrap();
        let home = col.decks_mut().add_deck("history");
        let dyn_id = col.decks_mut().add_filtered_deck("cram");
        let mut card = Card::new(1, 1, dyn_id);
        card.odid = home;
        card.odue = 12;
        (col, card)
    }

    #[test]
    fn test_new_conf_overlay() {
        let (mut col, card) = filtered_card_setup();
        {
            let conf_id = col.decks().get(card.odid).unwrap().conf_id;
            let mut config = col.decks().config(conf_id).unwrap().clone();
            config.new.delays = vec![2.0, 20.0];
            config.new.per_day = 5;
            col.decks_mut().add_config(config);
        }
        let conf = col.new_conf(&card).unwrap();
        // delays from the home deck, limit from the filtered deck
        assert_eq!(conf.delays, vec![2.0, 20.0]);
        assert_eq!(conf.per_day, REPORT_LIMIT);
        assert_eq!(conf.order, NewCardOrder::Due);
    }

    #[test]
    fn test_previewing_depends_on_resched() {
        let (mut col, card) = filtered_card_setup();
        assert!(!col.previewing(&card).unwrap());
        col.decks_mut().get_mut(card.did).unwrap().resched = false;
        assert!(col.previewing(&card).unwrap());
    }
}
