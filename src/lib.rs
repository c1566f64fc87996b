//! Mneme: a spaced-repetition scheduling engine.
//!
//! This crate provides:
//! - Card selection across four queues (new, sub-day learning, day
//!   learning, review) with per-deck hierarchical daily limits
//! - An answer engine with learning steps, graduated reviews, lapses
//!   with relearning, and leech detection
//! - Filtered decks gathered by search, with early review and preview
//! - Burying, suspension, and day-rollover unburying
//! - A review log and conversion between the two scheduler variants
//!
//! The [`Scheduler`] owns a [`Collection`] (SQLite card store, deck
//! registry, options, clock) and is driven with [`Scheduler::get_card`]
//! and [`Scheduler::answer_card`]:
//!
//! ```no_run
//! use mneme::{Collection, Rating, Scheduler};
//!
//! # fn main() -> mneme::Result<()> {
//! let col = Collection::open_in_memory()?;
//! let mut sched = Scheduler::new(col)?;
//! while let Some(mut card) = sched.get_card()? {
//!     // show the card, collect a rating
//!     sched.answer_card(&mut card, Rating::Good)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod search;
pub mod storage;

pub use collection::{Collection, CollectionOptions, SchedulerVersion};
pub use error::{Result, SchedulerError};
pub use models::{
    Card, CardQueue, CardType, Deck, DeckConfig, FilteredOrder, FilteredSearchTerm, LapseConfig,
    LeechAction, LeftState, NewCardOrder, NewConfig, NewSpread, RevConfig, RevlogEntry, RevlogKind,
    STARTING_FACTOR,
};
pub use scheduler::timing::{ManualClock, SchedTiming, SystemClock, TimeSource};
pub use scheduler::{
    CancelToken, CountKind, Counts, DeckDueCounts, Rating, Scheduler, UnburyKind,
};
pub use search::SearchError;
pub use storage::{DeckRegistry, StorageError, Store};
