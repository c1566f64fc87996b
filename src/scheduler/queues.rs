//! In-memory card queues and their fill rules.
//!
//! Four buffers: new cards (per-deck FIFO), sub-day learning (sorted by
//! due second), day learning (shuffled per day), and reviews (due then
//! random). Fills exclude the on-screen card by note id so a sibling is
//! never prefetched behind it; if that empties a fill that the counts
//! say should have cards, the fill retries excluding by card id only.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::Result;
use crate::models::Card;
use crate::storage::Exclusion;

use super::{Scheduler, QUEUE_LIMIT, REPORT_LIMIT};

/// Sub-day learning queue: `(due, id)` ordered by due.
pub(super) struct LrnQueue {
    entries: Vec<(i64, i64)>,
    filled: bool,
}

impl LrnQueue {
    pub(super) fn new() -> Self {
        Self {
            entries: Vec::new(),
            filled: false,
        }
    }

    pub(super) fn clear(&mut self) {
        self.entries.clear();
        self.filled = false;
    }

    pub(super) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(super) fn fill(&mut self, mut entries: Vec<(i64, i64)>) {
        entries.sort_by_key(|&(due, _)| due);
        self.entries = entries;
        self.filled = true;
    }

    pub(super) fn first_due(&self) -> Option<i64> {
        self.entries.first().map(|&(due, _)| due)
    }

    pub(super) fn pop_first(&mut self) -> Option<(i64, i64)> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    /// Insert in due order, after existing entries with the same due.
    /// A queue that has not been filled yet is left alone; the next
    /// fill will pick the card up anyway.
    pub(super) fn sort_insert(&mut self, due: i64, id: i64) {
        if !self.filled {
            return;
        }
        let pos = self
            .entries
            .iter()
            .position(|&(d, _)| d > due)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, (due, id));
    }

    #[allow(dead_code)]
    pub(super) fn remove(&mut self, id: i64) {
        self.entries.retain(|&(_, entry_id)| entry_id != id);
    }
}

impl Scheduler {
    // ==================== Queue resets ====================

    pub(super) fn reset_lrn_queue(&mut self) {
        self.lrn_queue.clear();
        self.lrn_day_queue.clear();
        self.lrn_dids = self.col.decks().active().into();
    }

    pub(super) fn reset_rev_queue(&mut self) {
        self.rev_queue.clear();
    }

    pub(super) fn reset_new_queue(&mut self) {
        self.new_queue.clear();
        self.new_dids = self.col.decks().active().into();
        self.update_new_card_ratio();
    }

    pub(super) fn reset_lrn(&mut self) -> Result<()> {
        self.reset_lrn_count(None)?;
        self.reset_lrn_queue();
        Ok(())
    }

    pub(super) fn reset_rev(&mut self) -> Result<()> {
        self.reset_rev_count(None)?;
        self.reset_rev_queue();
        Ok(())
    }

    pub(super) fn reset_new(&mut self) -> Result<()> {
        self.reset_new_count(None)?;
        self.reset_new_queue();
        Ok(())
    }

    /// Refresh the learning horizon; when it has moved meaningfully,
    /// newly due learning cards are picked up mid-session.
    pub(super) fn update_lrn_cutoff(&mut self, force: bool) -> bool {
        let next = self.col.clock().now_secs() + self.col.options().collapse_time_secs;
        if next - self.lrn_cutoff > 60 || force {
            self.lrn_cutoff = next;
            true
        } else {
            false
        }
    }

    fn maybe_reset_lrn(&mut self, force: bool) -> Result<()> {
        if self.update_lrn_cutoff(force) {
            self.reset_lrn()?;
        }
        Ok(())
    }

    // ==================== Learning ====================

    pub(super) fn fill_lrn(&mut self) -> Result<bool> {
        if self.have_counts && self.lrn_count == 0 {
            return Ok(false);
        }
        if !self.lrn_queue.is_empty() {
            return Ok(true);
        }
        let cutoff = self.col.clock().now_secs() + self.col.options().collapse_time_secs;
        let active = self.col.decks().active();
        let entries = self.col.store().lrn_queue_entries(
            &active,
            cutoff,
            self.current_card_id(),
            REPORT_LIMIT,
        )?;
        self.lrn_queue.fill(entries);
        Ok(!self.lrn_queue.is_empty())
    }

    /// Pop a sub-day learning card if one is due; with `collapse`, the
    /// end-of-queue window counts as due.
    pub(super) fn get_lrn_card(&mut self, collapse: bool) -> Result<Option<Card>> {
        self.maybe_reset_lrn(collapse && self.lrn_count == 0)?;
        if self.fill_lrn()? {
            let mut cutoff = self.col.clock().now_secs();
            if collapse {
                cutoff += self.col.options().collapse_time_secs;
            }
            if self.lrn_queue.first_due().map_or(false, |due| due < cutoff) {
                if let Some((_, id)) = self.lrn_queue.pop_first() {
                    return Ok(Some(self.col.store().get_card(id)?));
                }
            }
        }
        Ok(None)
    }

    pub(super) fn fill_lrn_day(&mut self) -> Result<bool> {
        if self.have_counts && self.lrn_count == 0 {
            return Ok(false);
        }
        if !self.lrn_day_queue.is_empty() {
            return Ok(true);
        }
        while let Some(&did) = self.lrn_dids.front() {
            self.lrn_day_queue.clear();
            let mut ids = self.col.store().lrn_day_ids(
                did,
                self.today,
                self.current_card_id(),
                QUEUE_LIMIT,
            )?;
            if !ids.is_empty() {
                // a deterministic order per day, not per fill
                let mut rng = StdRng::seed_from_u64(self.today as u64);
                ids.shuffle(&mut rng);
                self.lrn_day_queue = ids.into();
                if self.lrn_day_queue.len() < QUEUE_LIMIT as usize {
                    // deck is exhausted; move on next fill
                    self.lrn_dids.pop_front();
                }
                return Ok(true);
            }
            self.lrn_dids.pop_front();
        }
        Ok(false)
    }

    pub(super) fn get_lrn_day_card(&mut self) -> Result<Option<Card>> {
        if self.fill_lrn_day()? {
            if let Some(id) = self.lrn_day_queue.pop_front() {
                return Ok(Some(self.col.store().get_card(id)?));
            }
        }
        Ok(None)
    }

    // ==================== New ====================

    pub(super) fn fill_new(&mut self, allow_sibling: bool) -> Result<bool> {
        if !self.new_queue.is_empty() {
            return Ok(true);
        }
        if self.have_counts && self.new_count == 0 {
            return Ok(false);
        }
        while let Some(&did) = self.new_dids.front() {
            let lim = QUEUE_LIMIT.min(self.deck_new_limit(did, true)?);
            if lim != 0 {
                self.new_queue.clear();
                let exclusion = if allow_sibling {
                    Exclusion::ById(self.current_card_id())
                } else {
                    Exclusion::ByNote(self.current_card_nid())
                };
                let ids = self.col.store().new_queue_ids(did, exclusion, lim)?;
                if !ids.is_empty() {
                    self.new_queue = ids.into();
                    return Ok(true);
                }
            }
            self.new_dids.pop_front();
        }
        if self.have_counts && self.new_count != 0 && !allow_sibling {
            // only the sibling exclusion can explain the empty fill
            self.reset_new()?;
            return self.fill_new(true);
        }
        Ok(false)
    }

    pub(super) fn get_new_card(&mut self) -> Result<Option<Card>> {
        if self.fill_new(false)? {
            if let Some(id) = self.new_queue.pop_front() {
                return Ok(Some(self.col.store().get_card(id)?));
            }
        }
        Ok(None)
    }

    // ==================== Review ====================

    pub(super) fn fill_rev(&mut self, allow_sibling: bool) -> Result<bool> {
        if !self.rev_queue.is_empty() {
            return Ok(true);
        }
        if self.have_counts && self.rev_count == 0 {
            return Ok(false);
        }
        let lim = QUEUE_LIMIT.min(self.current_rev_limit(true)?);
        if lim != 0 {
            self.rev_queue.clear();
            let exclusion = if allow_sibling {
                Exclusion::ById(self.current_card_id())
            } else {
                Exclusion::ByNote(self.current_card_nid())
            };
            let active = self.col.decks().active();
            let ids = self
                .col
                .store()
                .rev_queue_ids(&active, self.today, exclusion, lim)?;
            if !ids.is_empty() {
                self.rev_queue = ids.into();
                return Ok(true);
            }
        }
        if self.have_counts && self.rev_count != 0 && !allow_sibling {
            self.reset_rev()?;
            return self.fill_rev(true);
        }
        Ok(false)
    }

    pub(super) fn get_rev_card(&mut self) -> Result<Option<Card>> {
        if self.fill_rev(false)? {
            if let Some(id) = self.rev_queue.pop_front() {
                return Ok(Some(self.col.store().get_card(id)?));
            }
        }
        Ok(None)
    }

    // ==================== Sibling removal ====================

    pub(super) fn remove_from_new_queue(&mut self, id: i64) {
        self.new_queue.retain(|&queued| queued != id);
    }

    pub(super) fn remove_from_rev_queue(&mut self, id: i64) {
        self.rev_queue.retain(|&queued| queued != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lrn_queue_orders_by_due() {
        let mut queue = LrnQueue::new();
        queue.fill(vec![(300, 3), (100, 1), (200, 2)]);
        assert_eq!(queue.first_due(), Some(100));
        assert_eq!(queue.pop_first(), Some((100, 1)));
        assert_eq!(queue.pop_first(), Some((200, 2)));
    }

    #[test]
    fn test_lrn_queue_sort_insert_after_equal_due() {
        let mut queue = LrnQueue::new();
        queue.fill(vec![(100, 1), (200, 2)]);
        queue.sort_insert(100, 9);
        assert_eq!(queue.pop_first(), Some((100, 1)));
        assert_eq!(queue.pop_first(), Some((100, 9)));
    }

    #[test]
    fn test_lrn_queue_unfilled_ignores_insert() {
        let mut queue = LrnQueue::new();
        queue.sort_insert(100, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_lrn_queue_remove() {
        let mut queue = LrnQueue::new();
        queue.fill(vec![(100, 1), (200, 2)]);
        queue.remove(1);
        assert_eq!(queue.first_due(), Some(200));
    }
}
