//! Crate-level error type for scheduling operations.

use thiserror::Error;

use crate::models::CardQueue;
use crate::search::SearchError;
use crate::storage::{DeckError, StorageError};

#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The card's queue does not admit the attempted answer.
    #[error("cannot answer a card in queue {queue:?}")]
    InvalidTransition { queue: CardQueue },

    /// Restoring preview state on a card outside a filtered deck.
    #[error("card is not in a filtered deck")]
    InvalidPreviewState,

    /// Early-review interval requested for an ineligible card.
    #[error("card is not eligible for an early review interval")]
    InvalidEarlyReview,

    #[error("invalid search: {0}")]
    Search(#[from] SearchError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Deck(#[from] DeckError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
