//! In-memory deck registry.
//!
//! Decks form a tree through their dotted names. The registry tracks the
//! selected deck and the active set (selected deck plus descendants) the
//! scheduler draws from. The whole registry serialises to JSON so the
//! embedding application can persist it alongside the card store.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{is_ancestor_name, Deck, DeckConfig};

#[derive(Error, Debug)]
pub enum DeckError {
    #[error("Deck not found: {0}")]
    NotFound(i64),

    #[error("Deck config not found: {0}")]
    ConfigNotFound(i64),

    #[error("Deck is not a filtered deck: {0}")]
    NotFiltered(i64),
}

pub type Result<T> = std::result::Result<T, DeckError>;

pub const DEFAULT_DECK_ID: i64 = 1;
pub const DEFAULT_CONFIG_ID: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckRegistry {
    decks: HashMap<i64, Deck>,
    configs: HashMap<i64, DeckConfig>,
    selected: i64,
    next_id: i64,
}

impl Default for DeckRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeckRegistry {
    pub fn new() -> Self {
        let mut decks = HashMap::new();
        decks.insert(DEFAULT_DECK_ID, Deck::new(DEFAULT_DECK_ID, "Default"));
        let mut configs = HashMap::new();
        configs.insert(DEFAULT_CONFIG_ID, DeckConfig::new(DEFAULT_CONFIG_ID, "Default"));
        Self {
            decks,
            configs,
            selected: DEFAULT_DECK_ID,
            next_id: 2,
        }
    }

    fn alloc_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ==================== Lookup ====================

    pub fn get(&self, did: i64) -> Result<&Deck> {
        self.decks.get(&did).ok_or(DeckError::NotFound(did))
    }

    pub fn get_mut(&mut self, did: i64) -> Result<&mut Deck> {
        self.decks.get_mut(&did).ok_or(DeckError::NotFound(did))
    }

    pub fn by_name(&self, name: &str) -> Option<&Deck> {
        self.decks.values().find(|d| d.name.eq_ignore_ascii_case(name))
    }

    pub fn all_ids_sorted(&self) -> Vec<i64> {
        let mut decks: Vec<&Deck> = self.decks.values().collect();
        decks.sort_by(|a, b| a.name.cmp(&b.name));
        decks.iter().map(|d| d.id).collect()
    }

    pub fn all_mut(&mut self) -> impl Iterator<Item = &mut Deck> {
        self.decks.values_mut()
    }

    pub fn config(&self, conf_id: i64) -> Result<&DeckConfig> {
        self.configs
            .get(&conf_id)
            .ok_or(DeckError::ConfigNotFound(conf_id))
    }

    /// Effective config for a deck. Filtered decks carry their own
    /// behaviour flags instead of a config group, so they resolve to
    /// the default group for the remaining settings.
    pub fn config_for_deck(&self, did: i64) -> Result<&DeckConfig> {
        let deck = self.get(did)?;
        let conf_id = if deck.dynamic {
            DEFAULT_CONFIG_ID
        } else {
            deck.conf_id
        };
        self.config(conf_id)
    }

    // ==================== Mutation ====================

    /// Add (or fetch) a deck by name, creating missing ancestors.
    pub fn add_deck(&mut self, name: &str) -> i64 {
        if let Some(deck) = self.by_name(name) {
            return deck.id;
        }
        if let Some((parent, _)) = name.rsplit_once('.') {
            self.add_deck(parent);
        }
        let id = self.alloc_id();
        self.decks.insert(id, Deck::new(id, name));
        id
    }

    pub fn add_filtered_deck(&mut self, name: &str) -> i64 {
        if let Some(deck) = self.by_name(name) {
            return deck.id;
        }
        let id = self.alloc_id();
        self.decks.insert(id, Deck::new_filtered(id, name));
        id
    }

    pub fn add_config(&mut self, config: DeckConfig) {
        self.configs.insert(config.id, config);
    }

    pub fn save(&mut self, deck: Deck) {
        self.next_id = self.next_id.max(deck.id + 1);
        self.decks.insert(deck.id, deck);
    }

    pub fn remove(&mut self, did: i64) {
        self.decks.remove(&did);
        if self.selected == did {
            self.selected = DEFAULT_DECK_ID;
        }
    }

    // ==================== Tree traversal ====================

    /// Ancestors of a deck, root first, excluding the deck itself.
    pub fn parents(&self, did: i64) -> Result<Vec<i64>> {
        let name = &self.get(did)?.name;
        let mut out = Vec::new();
        let mut prefix = String::new();
        for part in name.split('.') {
            if !prefix.is_empty() {
                if let Some(parent) = self.by_name(&prefix) {
                    out.push(parent.id);
                }
            }
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(part);
        }
        Ok(out)
    }

    /// All descendants of a deck, sorted by name.
    pub fn children(&self, did: i64) -> Result<Vec<i64>> {
        let name = self.get(did)?.name.clone();
        let mut kids: Vec<&Deck> = self
            .decks
            .values()
            .filter(|d| is_ancestor_name(&name, &d.name))
            .collect();
        kids.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(kids.iter().map(|d| d.id).collect())
    }

    // ==================== Selection ====================

    pub fn select(&mut self, did: i64) -> Result<()> {
        self.get(did)?;
        self.selected = did;
        Ok(())
    }

    pub fn selected(&self) -> i64 {
        self.selected
    }

    /// Selected deck plus its descendants, minus filtered subtrees of
    /// normal decks (a filtered deck is only active when selected
    /// directly).
    pub fn active(&self) -> Vec<i64> {
        let mut out = vec![self.selected];
        if let Ok(children) = self.children(self.selected) {
            for did in children {
                if let Ok(deck) = self.get(did) {
                    if !deck.dynamic {
                        out.push(did);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_deck_creates_parents() {
        let mut reg = DeckRegistry::new();
        let did = reg.add_deck("language.verbs.irregular");
        assert!(reg.by_name("language").is_some());
        assert!(reg.by_name("language.verbs").is_some());

        let parents = reg.parents(did).unwrap();
        assert_eq!(parents.len(), 2);
        assert_eq!(reg.get(parents[0]).unwrap().name, "language");
        assert_eq!(reg.get(parents[1]).unwrap().name, "language.verbs");
    }

    #[test]
    fn test_active_covers_subtree() {
        let mut reg = DeckRegistry::new();
        let top = reg.add_deck("language");
        let child = reg.add_deck("language.verbs");
        reg.add_deck("music");
        reg.select(top).unwrap();

        let active = reg.active();
        assert!(active.contains(&top));
        assert!(active.contains(&child));
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn test_active_skips_filtered_children() {
        let mut reg = DeckRegistry::new();
        let top = reg.add_deck("language");
        reg.add_filtered_deck("language.cram");
        reg.select(top).unwrap();
        assert_eq!(reg.active(), vec![top]);
    }

    #[test]
    fn test_filtered_deck_resolves_default_config() {
        let mut reg = DeckRegistry::new();
        let dyn_id = reg.add_filtered_deck("cram");
        assert_eq!(reg.config_for_deck(dyn_id).unwrap().id, DEFAULT_CONFIG_ID);
    }
}
