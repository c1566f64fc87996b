//! Filtered-deck engine: gathering cards by search term and returning
//! them home.
//!
//! Gathered cards remember their origin in `odid`/`odue`; the due
//! column doubles as the gathering order (counting up from -100000 so
//! gathered cards always sort ahead of day indexes).

use crate::error::Result;
use crate::models::FilteredOrder;
use crate::search::{compile_search, SearchContext};
use crate::storage::store::ids_to_sql;
use crate::storage::DeckError;

use super::Scheduler;

/// ORDER BY clause for a gathering pass.
fn order_clause(order: FilteredOrder, today: i32) -> String {
    match order {
        FilteredOrder::OldestSeen => "(SELECT MAX(id) FROM revlog WHERE cid = c.id)".to_string(),
        FilteredOrder::Random => "random()".to_string(),
        FilteredOrder::IntervalsAscending => "c.ivl".to_string(),
        FilteredOrder::IntervalsDescending => "c.ivl DESC".to_string(),
        FilteredOrder::Lapses => "c.lapses DESC".to_string(),
        FilteredOrder::Added => "n.id".to_string(),
        FilteredOrder::ReverseAdded => "n.id DESC".to_string(),
        // most overdue relative to interval first; everything not yet
        // due sorts after by plain due
        FilteredOrder::DuePriority => format!(
            "(CASE WHEN c.queue = 2 AND c.due <= {today} \
             THEN (c.ivl / CAST({today} - c.due + 0.001 AS REAL)) \
             ELSE 100000 + c.due END)",
            today = today
        ),
        FilteredOrder::Due => "c.due, c.ord".to_string(),
    }
}

impl Scheduler {
    /// Empty and regather a filtered deck. Returns how many cards were
    /// gathered; the deck becomes the selected deck when non-empty.
    pub fn rebuild_filtered_deck(&mut self, did: i64) -> Result<usize> {
        let deck = self.col.decks().get(did)?;
        if !deck.dynamic {
            return Err(DeckError::NotFiltered(did).into());
        }
        let terms = deck.terms.clone();
        let resched = deck.resched;

        self.empty_filtered_deck(did)?;

        let start = -100_000i64;
        let mut total = 0usize;
        for term in &terms {
            let search = if term.search.trim().is_empty() {
                "-is:suspended -is:buried -deck:filtered".to_string()
            } else {
                format!(
                    "({}) -is:suspended -is:buried -deck:filtered",
                    term.search.trim()
                )
            };
            let where_sql = compile_search(&search, &self.search_context())?;
            let order_by = order_clause(term.order, self.today);
            let ids = self
                .col
                .store()
                .find_cards(&where_sql, &order_by, term.limit)?;
            if ids.is_empty() {
                break;
            }
            log::info!("gathered {} cards into filtered deck {}", ids.len(), did);
            let rows: Vec<(i64, i64)> = ids
                .iter()
                .enumerate()
                .map(|(i, &id)| (id, start + (total + i) as i64))
                .collect();
            self.col
                .store()
                .move_to_filtered(did, &rows, self.col.usn(), !resched)?;
            total += ids.len();
        }

        if total > 0 {
            self.col.decks_mut().select(did)?;
        }
        Ok(total)
    }

    /// Move every resident of a filtered deck back home.
    pub fn empty_filtered_deck(&mut self, did: i64) -> Result<()> {
        if !self.col.decks().get(did)?.dynamic {
            return Err(DeckError::NotFiltered(did).into());
        }
        self.col
            .store()
            .empty_filtered_where(&format!("did = {}", did), self.col.usn())?;
        Ok(())
    }

    /// Return specific cards home, wherever they were gathered.
    pub(super) fn remove_from_filtered_bulk(&mut self, cids: &[i64]) -> Result<()> {
        self.col.store().empty_filtered_where(
            &format!("id IN {} AND odid != 0", ids_to_sql(cids)),
            self.col.usn(),
        )?;
        Ok(())
    }

    fn search_context(&self) -> SearchContext {
        let decks = self.col.decks();
        let mut deck_names = Vec::new();
        let mut dynamic_dids = Vec::new();
        for did in decks.all_ids_sorted() {
            if let Ok(deck) = decks.get(did) {
                deck_names.push((did, deck.name.to_ascii_lowercase()));
                if deck.dynamic {
                    dynamic_dids.push(did);
                }
            }
        }
        SearchContext {
            deck_names,
            dynamic_dids,
            current_dids: decks.active(),
            today: self.today,
            learn_cutoff: self.col.clock().now_secs() + self.col.options().collapse_time_secs,
        }
    }
}
