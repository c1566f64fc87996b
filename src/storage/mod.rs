//! Persistence layer: the SQLite card store and the deck registry.

pub mod decks;
pub mod store;

pub use decks::{DeckError, DeckRegistry, DEFAULT_CONFIG_ID, DEFAULT_DECK_ID};
pub use store::{Exclusion, StorageError, Store};
