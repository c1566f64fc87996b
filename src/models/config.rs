//! Per-deck scheduling configuration.
//!
//! Decks reference a shared [`DeckConfig`]. Cards sitting in a filtered
//! deck see an overlay: step delays and lapse handling come from the
//! card's original deck, while ordering and daily limits come from the
//! filtered deck itself (resolved in `Collection`).

use serde::{Deserialize, Serialize};

/// Ease factor assigned to cards graduating from learning, per-mille.
pub const STARTING_FACTOR: i32 = 2500;

/// Order new cards are introduced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NewCardOrder {
    Random,
    Due,
}

impl Default for NewCardOrder {
    fn default() -> Self {
        Self::Due
    }
}

/// What happens to a card once it crosses the leech threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeechAction {
    Suspend,
    TagOnly,
}

impl Default for LeechAction {
    fn default() -> Self {
        Self::Suspend
    }
}

/// How new cards are interleaved with reviews in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NewSpread {
    Distribute,
    Last,
    First,
}

impl Default for NewSpread {
    fn default() -> Self {
        Self::Distribute
    }
}

/// Settings for cards in initial learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConfig {
    /// Daily introduction limit.
    #[serde(default = "default_new_per_day")]
    pub per_day: i32,
    /// Learning step delays in minutes.
    #[serde(default = "default_new_delays")]
    pub delays: Vec<f64>,
    /// Graduating and easy intervals in days.
    #[serde(default = "default_new_ints")]
    pub ints: [i32; 2],
    #[serde(default = "default_initial_factor")]
    pub initial_factor: i32,
    #[serde(default = "default_true")]
    pub bury: bool,
    #[serde(default)]
    pub order: NewCardOrder,
    #[serde(default = "default_true")]
    pub separate: bool,
}

impl Default for NewConfig {
    fn default() -> Self {
        Self {
            per_day: default_new_per_day(),
            delays: default_new_delays(),
            ints: default_new_ints(),
            initial_factor: default_initial_factor(),
            bury: true,
            order: NewCardOrder::default(),
            separate: true,
        }
    }
}

/// Settings applied when a review card is rated Again.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapseConfig {
    /// Relearning step delays in minutes; empty means no relearning.
    #[serde(default = "default_lapse_delays")]
    pub delays: Vec<f64>,
    /// Multiplier applied to the old interval.
    #[serde(default)]
    pub mult: f64,
    /// Floor for the post-lapse interval in days.
    #[serde(default = "default_min_int")]
    pub min_int: i32,
    /// Lapses before the card counts as a leech; 0 disables detection.
    #[serde(default = "default_leech_fails")]
    pub leech_fails: i32,
    #[serde(default)]
    pub leech_action: LeechAction,
}

impl Default for LapseConfig {
    fn default() -> Self {
        Self {
            delays: default_lapse_delays(),
            mult: 0.0,
            min_int: default_min_int(),
            leech_fails: default_leech_fails(),
            leech_action: LeechAction::default(),
        }
    }
}

/// Settings for graduated review cards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevConfig {
    #[serde(default = "default_rev_per_day")]
    pub per_day: i32,
    /// Interval multiplier for a Hard answer.
    #[serde(default = "default_hard_factor")]
    pub hard_factor: f64,
    /// Extra multiplier for an Easy answer.
    #[serde(default = "default_ease4")]
    pub ease4: f64,
    /// Global interval modifier.
    #[serde(default = "default_ivl_fct")]
    pub ivl_fct: f64,
    /// Interval ceiling in days.
    #[serde(default = "default_max_ivl")]
    pub max_ivl: i32,
    #[serde(default = "default_true")]
    pub bury: bool,
}

impl Default for RevConfig {
    fn default() -> Self {
        Self {
            per_day: default_rev_per_day(),
            hard_factor: default_hard_factor(),
            ease4: default_ease4(),
            ivl_fct: default_ivl_fct(),
            max_ivl: default_max_ivl(),
            bury: true,
        }
    }
}

/// A configuration group shared by one or more decks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckConfig {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub new: NewConfig,
    #[serde(default)]
    pub lapse: LapseConfig,
    #[serde(default)]
    pub rev: RevConfig,
    /// Cap on answer time credited to a card, in seconds.
    #[serde(default = "default_max_taken")]
    pub max_taken: i32,
}

impl DeckConfig {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            new: NewConfig::default(),
            lapse: LapseConfig::default(),
            rev: RevConfig::default(),
            max_taken: default_max_taken(),
        }
    }
}

fn default_new_per_day() -> i32 {
    20
}

fn default_new_delays() -> Vec<f64> {
    vec![1.0, 10.0]
}

fn default_new_ints() -> [i32; 2] {
    [1, 4]
}

fn default_initial_factor() -> i32 {
    STARTING_FACTOR
}

fn default_lapse_delays() -> Vec<f64> {
    vec![10.0]
}

fn default_min_int() -> i32 {
    1
}

fn default_leech_fails() -> i32 {
    8
}

fn default_rev_per_day() -> i32 {
    100
}

fn default_hard_factor() -> f64 {
    1.2
}

fn default_ease4() -> f64 {
    1.3
}

fn default_ivl_fct() -> f64 {
    1.0
}

fn default_max_ivl() -> i32 {
    36500
}

fn default_max_taken() -> i32 {
    60
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_roundtrip() {
        let conf = DeckConfig::new(1, "Default");
        let json = serde_json::to_string(&conf).unwrap();
        let back: DeckConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.new.per_day, 20);
        assert_eq!(back.new.delays, vec![1.0, 10.0]);
        assert_eq!(back.lapse.leech_fails, 8);
        assert_eq!(back.rev.max_ivl, 36500);
    }

    #[test]
    fn test_partial_json_gets_defaults() {
        let conf: DeckConfig =
            serde_json::from_str(r#"{"id": 5, "name": "sparse", "new": {"perDay": 3}}"#).unwrap();
        assert_eq!(conf.new.per_day, 3);
        assert_eq!(conf.new.initial_factor, STARTING_FACTOR);
        assert_eq!(conf.rev.hard_factor, 1.2);
        assert_eq!(conf.max_taken, 60);
    }
}
