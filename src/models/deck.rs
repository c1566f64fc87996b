//! Decks and filtered-deck search terms.

use serde::{Deserialize, Serialize};

/// Ordering applied when gathering cards into a filtered deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilteredOrder {
    OldestSeen,
    Random,
    IntervalsAscending,
    IntervalsDescending,
    Lapses,
    Added,
    Due,
    ReverseAdded,
    DuePriority,
}

/// One gathering rule of a filtered deck.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredSearchTerm {
    pub search: String,
    pub limit: i32,
    pub order: FilteredOrder,
}

impl FilteredSearchTerm {
    pub fn new(search: impl Into<String>, limit: i32, order: FilteredOrder) -> Self {
        Self {
            search: search.into(),
            limit,
            order,
        }
    }
}

/// A deck. Names are dotted paths; "language.verbs" is a child of
/// "language". Daily counters are `[day_index, count]` pairs rolled at
/// the day cutoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: i64,
    pub name: String,
    /// True for filtered ("dynamic") decks.
    #[serde(rename = "dyn", default)]
    pub dynamic: bool,
    /// Referenced [`super::DeckConfig`]; ignored for filtered decks.
    #[serde(default = "default_conf_id")]
    pub conf_id: i64,
    #[serde(default)]
    pub new_today: [i64; 2],
    #[serde(default)]
    pub rev_today: [i64; 2],
    #[serde(default)]
    pub lrn_today: [i64; 2],
    /// Answer time accumulated today, milliseconds.
    #[serde(default)]
    pub time_today: [i64; 2],

    // Filtered-deck attributes; untouched for normal decks.
    /// When false the deck previews without touching scheduling state.
    #[serde(default = "default_true")]
    pub resched: bool,
    /// Minutes before a previewed card comes back.
    #[serde(default = "default_preview_delay")]
    pub preview_delay: i32,
    /// Keep gathered new cards apart from their review siblings.
    #[serde(default = "default_true")]
    pub separate: bool,
    #[serde(default)]
    pub terms: Vec<FilteredSearchTerm>,
}

impl Deck {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            dynamic: false,
            conf_id: default_conf_id(),
            new_today: [0, 0],
            rev_today: [0, 0],
            lrn_today: [0, 0],
            time_today: [0, 0],
            resched: true,
            preview_delay: default_preview_delay(),
            separate: true,
            terms: Vec::new(),
        }
    }

    pub fn new_filtered(id: i64, name: impl Into<String>) -> Self {
        let mut deck = Self::new(id, name);
        deck.dynamic = true;
        deck.terms = vec![FilteredSearchTerm::new("", 100, FilteredOrder::Due)];
        deck
    }

    /// Roll any counter whose stored day is not `today`.
    pub fn roll_counters(&mut self, today: i64) {
        for counter in [
            &mut self.new_today,
            &mut self.rev_today,
            &mut self.lrn_today,
            &mut self.time_today,
        ] {
            if counter[0] != today {
                *counter = [today, 0];
            }
        }
    }

    /// Name of the immediate parent, if any.
    pub fn parent_name(&self) -> Option<&str> {
        self.name.rsplit_once('.').map(|(parent, _)| parent)
    }
}

fn default_conf_id() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

fn default_preview_delay() -> i32 {
    10
}

/// True when `parent` is a strict ancestor of `child` by name.
pub fn is_ancestor_name(parent: &str, child: &str) -> bool {
    child.len() > parent.len() + 1
        && child.starts_with(parent)
        && child.as_bytes()[parent.len()] == b'.'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_name() {
        let deck = Deck::new(2, "language.verbs.irregular");
        assert_eq!(deck.parent_name(), Some("language.verbs"));
        assert_eq!(Deck::new(3, "language").parent_name(), None);
    }

    #[test]
    fn test_is_ancestor_name() {
        assert!(is_ancestor_name("language", "language.verbs"));
        assert!(is_ancestor_name("language", "language.verbs.irregular"));
        assert!(!is_ancestor_name("language", "language"));
        assert!(!is_ancestor_name("language", "languages"));
        assert!(!is_ancestor_name("language.verbs", "language"));
    }

    #[test]
    fn test_roll_counters() {
        let mut deck = Deck::new(1, "Default");
        deck.new_today = [4, 7];
        deck.rev_today = [5, 3];
        deck.roll_counters(5);
        assert_eq!(deck.new_today, [5, 0]);
        assert_eq!(deck.rev_today, [5, 3]);
    }
}
