//! Card state as the scheduler sees it.

use serde::{Deserialize, Serialize};

/// Where a card is in its lifecycle.
///
/// `Review`-typed cards may temporarily sit in a learning queue while
/// relearning after a lapse, so the queue is tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardType {
    New,
    Learning,
    Review,
    Relearning,
}

impl CardType {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::New => 0,
            Self::Learning => 1,
            Self::Review => 2,
            Self::Relearning => 3,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(Self::New),
            1 => Some(Self::Learning),
            2 => Some(Self::Review),
            3 => Some(Self::Relearning),
            _ => None,
        }
    }
}

/// The queue a card is currently fetched from.
///
/// Negative values are the non-selectable queues. `due` semantics depend
/// on the queue: position for `New`, epoch seconds for `Learning` and
/// `Preview`, day index for `Review` and `DayLearn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardQueue {
    New,
    Learning,
    Review,
    DayLearn,
    Preview,
    Suspended,
    SiblingBuried,
    ManuallyBuried,
}

impl CardQueue {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::New => 0,
            Self::Learning => 1,
            Self::Review => 2,
            Self::DayLearn => 3,
            Self::Preview => 4,
            Self::Suspended => -1,
            Self::SiblingBuried => -2,
            Self::ManuallyBuried => -3,
        }
    }

    pub fn from_i64(v: i64) -> Option<Self> {
        match v {
            0 => Some(Self::New),
            1 => Some(Self::Learning),
            2 => Some(Self::Review),
            3 => Some(Self::DayLearn),
            4 => Some(Self::Preview),
            -1 => Some(Self::Suspended),
            -2 => Some(Self::SiblingBuried),
            -3 => Some(Self::ManuallyBuried),
            _ => None,
        }
    }

    /// True for the buried queues (either kind).
    pub fn is_buried(self) -> bool {
        matches!(self, Self::SiblingBuried | Self::ManuallyBuried)
    }
}

/// Learning progress, stored packed as `today_count * 1000 + remaining`.
///
/// `remaining` counts the steps left until graduation; `today_count` is
/// how many of those are expected to complete before the day cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeftState {
    pub today_count: i32,
    pub remaining: i32,
}

impl LeftState {
    pub fn unpack(left: i32) -> Self {
        Self {
            today_count: left / 1000,
            remaining: left % 1000,
        }
    }

    pub fn pack(self) -> i32 {
        self.today_count * 1000 + self.remaining
    }
}

/// A single card's scheduling state.
///
/// Mirrors a row of the `cards` table plus two transient fields
/// (`last_ivl`, `timer_started_ms`) that only live for the duration of
/// an answer.
#[derive(Debug, Clone)]
pub struct Card {
    pub id: i64,
    /// Owning note; siblings share this.
    pub nid: i64,
    /// Current deck (the filtered deck while a card is gathered).
    pub did: i64,
    /// Template ordinal within the note.
    pub ord: i32,
    pub mtime: i64,
    pub usn: i32,
    pub ctype: CardType,
    pub queue: CardQueue,
    pub due: i64,
    /// Current interval in days (review cards).
    pub ivl: i32,
    /// Ease factor in per-mille; 2500 means 2.5x.
    pub factor: i32,
    pub reps: i32,
    pub lapses: i32,
    /// Packed learning progress, see [`LeftState`].
    pub left: i32,
    /// Original due while in a filtered deck, else 0.
    pub odue: i64,
    /// Original deck while in a filtered deck, else 0.
    pub odid: i64,

    /// Interval before the current answer; written to the review log.
    pub last_ivl: i32,
    /// Millisecond timestamp set when the card was shown.
    pub timer_started_ms: Option<i64>,
}

impl Card {
    pub fn new(id: i64, nid: i64, did: i64) -> Self {
        Self {
            id,
            nid,
            did,
            ord: 0,
            mtime: 0,
            usn: -1,
            ctype: CardType::New,
            queue: CardQueue::New,
            due: 0,
            ivl: 0,
            factor: 0,
            reps: 0,
            lapses: 0,
            left: 0,
            odue: 0,
            odid: 0,
            last_ivl: 0,
            timer_started_ms: None,
        }
    }

    /// True while the card has been gathered into a filtered deck.
    pub fn in_filtered_deck(&self) -> bool {
        self.odid != 0
    }

    pub fn start_timer(&mut self, now_ms: i64) {
        self.timer_started_ms = Some(now_ms);
    }

    /// Milliseconds spent on the card, capped at `max_taken_secs`.
    pub fn time_taken_ms(&self, now_ms: i64, max_taken_secs: i32) -> i64 {
        let elapsed = self
            .timer_started_ms
            .map(|start| now_ms - start)
            .unwrap_or(0)
            .max(0);
        elapsed.min(i64::from(max_taken_secs) * 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_int_roundtrip() {
        for queue in [
            CardQueue::New,
            CardQueue::Learning,
            CardQueue::Review,
            CardQueue::DayLearn,
            CardQueue::Preview,
            CardQueue::Suspended,
            CardQueue::SiblingBuried,
            CardQueue::ManuallyBuried,
        ] {
            assert_eq!(CardQueue::from_i64(queue.as_i64()), Some(queue));
        }
        assert_eq!(CardQueue::from_i64(7), None);
    }

    #[test]
    fn test_left_state_packing() {
        let left = LeftState {
            today_count: 2,
            remaining: 3,
        };
        assert_eq!(left.pack(), 2003);
        assert_eq!(LeftState::unpack(2003), left);
    }

    #[test]
    fn test_time_taken_capped() {
        let mut card = Card::new(1, 1, 1);
        card.start_timer(1_000);
        assert_eq!(card.time_taken_ms(5_000, 60), 4_000);
        assert_eq!(card.time_taken_ms(120_000, 60), 60_000);
    }
}
