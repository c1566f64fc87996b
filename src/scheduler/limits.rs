//! Daily limits and due counts.
//!
//! New-card limits are hierarchical: a deck's remaining allowance is
//! clamped by every ancestor, and counting cards walks the active decks
//! while drawing down each parent's budget. Review limits follow the
//! selected deck, clamped by its ancestors.

use std::collections::HashMap;

use crate::collection::SchedulerVersion;
use crate::error::Result;
use crate::models::{CardQueue, Deck};

use super::{CancelToken, Scheduler, DYN_REPORT_LIMIT, REPORT_LIMIT};

/// Per-deck due summary row for a deck list display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckDueCounts {
    pub did: i64,
    pub name: String,
    pub new: i32,
    pub lrn: i32,
    pub rev: i32,
}

fn is_cancelled(cancel: Option<&CancelToken>) -> bool {
    cancel.map_or(false, CancelToken::is_cancelled)
}

impl Scheduler {
    // ==================== Single-deck limits ====================

    /// Today's remaining new-card allowance for one deck, ignoring
    /// ancestors.
    pub(super) fn deck_new_limit_single(&self, deck: &Deck, consider_current: bool) -> Result<i32> {
        if deck.dynamic {
            return Ok(DYN_REPORT_LIMIT);
        }
        let conf = self.col.decks().config_for_deck(deck.id)?;
        let mut lim = (i64::from(conf.new.per_day) - deck.new_today[1]).max(0) as i32;
        if consider_current && self.current_card_in_queue_under(CardQueue::New, deck.id) {
            lim = (lim - 1).max(0);
        }
        Ok(lim)
    }

    /// New-card allowance clamped by every ancestor.
    pub(super) fn deck_new_limit(&self, did: i64, consider_current: bool) -> Result<i32> {
        let mut dids = self.col.decks().parents(did)?;
        dids.push(did);
        let mut lim = -1;
        for id in dids {
            let deck = self.col.decks().get(id)?;
            let single = self.deck_new_limit_single(deck, consider_current)?;
            lim = if lim == -1 { single } else { lim.min(single) };
        }
        Ok(lim)
    }

    /// Today's remaining review allowance for one deck. Ancestors clamp
    /// it unless `parent_limit` was already resolved by the caller.
    pub(super) fn deck_rev_limit_single(
        &self,
        deck: &Deck,
        parent_limit: Option<i32>,
        consider_current: bool,
    ) -> Result<i32> {
        if deck.dynamic {
            return Ok(DYN_REPORT_LIMIT);
        }
        let conf = self.col.decks().config_for_deck(deck.id)?;
        let mut lim = (i64::from(conf.rev.per_day) - deck.rev_today[1]).max(0) as i32;
        if consider_current && self.current_card_in_queue_under(CardQueue::Review, deck.id) {
            lim = (lim - 1).max(0);
        }
        if let Some(parent) = parent_limit {
            return Ok(parent.min(lim));
        }
        // ancestors only cap reviews in the v2 scheme
        if self.version == SchedulerVersion::V2 && deck.name.contains('.') {
            for pid in self.col.decks().parents(deck.id)? {
                let parent_deck = self.col.decks().get(pid)?;
                lim = lim.min(self.deck_rev_limit_single(parent_deck, None, consider_current)?);
            }
        }
        Ok(lim)
    }

    /// Review limit for the selected deck.
    pub(super) fn current_rev_limit(&self, consider_current: bool) -> Result<i32> {
        let deck = self.col.decks().get(self.col.decks().selected())?;
        self.deck_rev_limit_single(deck, None, consider_current)
    }

    // ==================== Walking count ====================

    /// Sum a per-deck count across the active decks, drawing each
    /// deck's count against its ancestors' remaining budgets. Returns
    /// `None` when cancelled mid-walk.
    pub(super) fn walking_count(
        &self,
        lim_fn: impl Fn(&Scheduler, &Deck) -> Result<i32>,
        cnt_fn: impl Fn(&Scheduler, i64, i32) -> Result<i32>,
        cancel: Option<&CancelToken>,
    ) -> Result<Option<i32>> {
        let mut total = 0;
        let mut budgets: HashMap<i64, i32> = HashMap::new();
        for did in self.col.decks().active() {
            if is_cancelled(cancel) {
                return Ok(None);
            }
            let deck = self.col.decks().get(did)?;
            let mut lim = lim_fn(self, deck)?;
            if lim == 0 {
                continue;
            }
            let parents = self.col.decks().parents(did)?;
            for &pid in &parents {
                let parent_budget = match budgets.get(&pid) {
                    Some(&budget) => budget,
                    None => {
                        let parent = self.col.decks().get(pid)?;
                        let budget = lim_fn(self, parent)?;
                        budgets.insert(pid, budget);
                        budget
                    }
                };
                lim = lim.min(parent_budget);
            }
            let cnt = cnt_fn(self, did, lim)?;
            for &pid in &parents {
                if let Some(budget) = budgets.get_mut(&pid) {
                    *budget -= cnt;
                }
            }
            budgets.insert(did, lim - cnt);
            total += cnt;
        }
        Ok(Some(total))
    }

    // ==================== Count resets ====================

    /// Returns false when cancelled; `lrn_count` is then unusable.
    pub(super) fn reset_lrn_count(&mut self, cancel: Option<&CancelToken>) -> Result<bool> {
        self.update_lrn_cutoff(true);
        let cutoff = self.lrn_cutoff;
        let active = self.col.decks().active();
        let exclude = self.current_card_id();

        let mut count = self.col.store().lrn_subday_count(&active, cutoff, exclude)?;
        if is_cancelled(cancel) {
            return Ok(false);
        }
        count += self.col.store().lrn_day_count(&active, self.today, exclude)?;
        if is_cancelled(cancel) {
            return Ok(false);
        }
        count += self.col.store().preview_count(&active, exclude)?;
        self.lrn_count = count;
        Ok(true)
    }

    pub(super) fn reset_rev_count(&mut self, cancel: Option<&CancelToken>) -> Result<bool> {
        let lim = self.current_rev_limit(true)?;
        if is_cancelled(cancel) {
            return Ok(false);
        }
        let active = self.col.decks().active();
        self.rev_count =
            self.col
                .store()
                .rev_count(&active, self.today, self.current_card_id(), lim)?;
        Ok(true)
    }

    pub(super) fn reset_new_count(&mut self, cancel: Option<&CancelToken>) -> Result<bool> {
        let count = self.walking_count(
            |sched, deck| sched.deck_new_limit_single(deck, true),
            |sched, did, lim| {
                Ok(sched
                    .col
                    .store()
                    .new_count_for_deck(did, sched.current_card_id(), lim)?)
            },
            cancel,
        )?;
        match count {
            Some(count) => {
                self.new_count = count;
                Ok(true)
            }
            None => {
                log::debug!("new count reset cancelled");
                Ok(false)
            }
        }
    }

    // ==================== Deck list summary ====================

    /// (new, lrn, rev) per deck, honoring per-deck limits; review
    /// counts include subdecks.
    pub fn deck_due_counts(&mut self) -> Result<Vec<DeckDueCounts>> {
        self.check_day()?;
        let cutoff = self.col.clock().now_secs() + self.col.options().collapse_time_secs;
        let mut limits: HashMap<String, (i32, i32)> = HashMap::new();
        let mut out = Vec::new();
        for did in self.col.decks().all_ids_sorted() {
            let deck = self.col.decks().get(did)?.clone();
            let mut nlim = self.deck_new_limit_single(&deck, false)?;
            let parent_rlim = deck
                .parent_name()
                .and_then(|p| limits.get(p))
                .map(|&(_, rlim)| rlim);
            if let Some(&(parent_nlim, _)) = deck.parent_name().and_then(|p| limits.get(p)) {
                nlim = nlim.min(parent_nlim);
            }
            let rlim = self.deck_rev_limit_single(&deck, parent_rlim, false)?;

            let new = self.col.store().new_for_deck(did, nlim)?;
            let lrn = self
                .col
                .store()
                .lrn_for_deck(did, cutoff, self.today, REPORT_LIMIT)?;
            let mut rev_dids = vec![did];
            rev_dids.extend(self.col.decks().children(did)?);
            let rev = self
                .col
                .store()
                .rev_for_decks(&rev_dids, self.today, rlim.min(REPORT_LIMIT))?;

            limits.insert(deck.name.clone(), (nlim, rlim));
            out.push(DeckDueCounts {
                did,
                name: deck.name,
                new,
                lrn,
                rev,
            });
        }
        Ok(out)
    }
}
