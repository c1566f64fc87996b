//! Shared test harness: in-memory collection on a manual clock.

use std::sync::Arc;

use mneme::{Card, CardQueue, CardType, Collection, ManualClock, Scheduler, TimeSource};

/// Day anchor well past the seconds/days due boundary.
pub const ANCHOR: i64 = 1_600_000_000;

pub struct Harness {
    pub sched: Scheduler,
    pub clock: Arc<ManualClock>,
}

/// Collection created "this morning", clock sitting at 8h past the
/// rollover.
pub fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(ANCHOR + 8 * 3600));
    let col = Collection::open_in_memory_at(clock.clone(), ANCHOR).unwrap();
    let mut sched = Scheduler::new(col).unwrap();
    sched.seed_rng(7);
    Harness { sched, clock }
}

impl Harness {
    pub fn now(&self) -> i64 {
        self.clock.now_secs()
    }

    pub fn tick(&self, secs: i64) {
        self.clock.advance_secs(secs);
    }

    pub fn add_note(&self) -> i64 {
        self.sched
            .col()
            .store()
            .add_note(&[], self.clock.now_ms())
            .unwrap()
    }

    pub fn add_new_card(&self, did: i64, nid: i64, due: i64) -> Card {
        let mut card = Card::new(0, nid, did);
        card.due = due;
        self.sched
            .col()
            .store()
            .add_card(&mut card, self.clock.now_ms())
            .unwrap();
        card
    }

    pub fn add_review_card(&self, did: i64, nid: i64, due_day: i64, ivl: i32, factor: i32) -> Card {
        let mut card = Card::new(0, nid, did);
        card.ctype = CardType::Review;
        card.queue = CardQueue::Review;
        card.due = due_day;
        card.ivl = ivl;
        card.factor = factor;
        self.sched
            .col()
            .store()
            .add_card(&mut card, self.clock.now_ms())
            .unwrap();
        card
    }

    pub fn stored(&self, id: i64) -> Card {
        self.sched.col().store().get_card(id).unwrap()
    }
}
