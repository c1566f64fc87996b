//! Maintenance tools: forgetting, manual rescheduling, and new-card
//! ordering.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::Result;
use crate::models::STARTING_FACTOR;

use super::Scheduler;

impl Scheduler {
    /// Reset cards to new and append them after the existing new cards.
    pub fn forget_cards(&mut self, cids: &[i64]) -> Result<()> {
        self.remove_from_filtered_bulk(cids)?;
        let now = self.col.clock().now_secs();
        self.col
            .store()
            .forget_cards(cids, STARTING_FACTOR, now, self.col.usn())?;
        let next_due = self.col.store().max_new_due()? + 1;
        self.sort_cards(cids, next_due, 1, false, false)
    }

    /// Make cards due as reviews with a uniformly drawn interval in
    /// `[imin, imax]` days.
    pub fn resched_cards(&mut self, cids: &[i64], imin: i32, imax: i32) -> Result<()> {
        self.remove_from_filtered_bulk(cids)?;
        let today = i64::from(self.today);
        let rows: Vec<(i64, i64, i64)> = cids
            .iter()
            .map(|&id| {
                let r = i64::from(self.rng.gen_range(imin..=imax.max(imin)));
                (r.max(1), r + today, id)
            })
            .collect();
        let now = self.col.clock().now_secs();
        self.col
            .store()
            .reschedule_as_review(&rows, STARTING_FACTOR, now, self.col.usn())?;
        Ok(())
    }

    /// Assign new-card positions note by note from `start`, optionally
    /// shuffling notes and shifting existing positions out of the way.
    /// Siblings share a position so they are introduced together.
    pub fn sort_cards(
        &mut self,
        cids: &[i64],
        start: i64,
        step: i64,
        shuffle: bool,
        shift: bool,
    ) -> Result<()> {
        let nid_of = self.col.store().card_nids(cids)?;
        let mut nids: Vec<i64> = Vec::new();
        for id in cids {
            if let Some(&nid) = nid_of.get(id) {
                if !nids.contains(&nid) {
                    nids.push(nid);
                }
            }
        }
        if nids.is_empty() {
            return Ok(());
        }
        if shuffle {
            nids.shuffle(&mut self.rng);
        }

        let mut due_of: HashMap<i64, i64> = HashMap::new();
        for (i, &nid) in nids.iter().enumerate() {
            due_of.insert(nid, start + i as i64 * step);
        }
        let high = start + step * (nids.len() as i64 - 1);
        let now = self.col.clock().now_secs();
        let usn = self.col.usn();

        if shift {
            let low = self.col.store().min_new_due_from(start, cids)?;
            if low != 0 {
                let shift_by = high - low + 1;
                self.col
                    .store()
                    .shift_new_dues(cids, low, shift_by, now, usn)?;
            }
        }

        let rows: Vec<(i64, i64)> = self
            .col
            .store()
            .new_cards_of(cids)?
            .into_iter()
            .filter_map(|(id, nid)| due_of.get(&nid).map(|&due| (due, id)))
            .collect();
        self.col.store().set_due_bulk(&rows, now, usn)?;
        Ok(())
    }

    /// Shuffle the new-card order of a deck.
    pub fn randomize_cards(&mut self, did: i64) -> Result<()> {
        let cids = self.col.store().new_cids_in_deck(did)?;
        self.sort_cards(&cids, 1, 1, true, false)
    }

    /// Order a deck's new cards by creation.
    pub fn order_cards(&mut self, did: i64) -> Result<()> {
        let cids = self.col.store().new_cids_in_deck(did)?;
        self.sort_cards(&cids, 1, 1, false, false)
    }
}
