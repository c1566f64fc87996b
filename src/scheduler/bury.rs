//! Burying and suspension.
//!
//! Buried cards sit in one of two non-selectable queues: sibling-buried
//! cards return at the next day rollover, manually buried ones wait for
//! an explicit unbury. The single-queue scheme keeps only the sibling
//! queue. Callers outside the answer path should `reset` (or
//! `defer_reset`) afterwards so the in-memory queues catch up.

use crate::collection::SchedulerVersion;
use crate::error::Result;
use crate::models::CardQueue;

use super::Scheduler;

/// Which buried cards an unbury touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnburyKind {
    All,
    Manual,
    Siblings,
}

impl Scheduler {
    pub fn bury_cards(&mut self, cids: &[i64], manual: bool) -> Result<()> {
        let queue = match self.version {
            // the single-queue scheme has no manual/sibling distinction
            SchedulerVersion::V1 => CardQueue::SiblingBuried,
            SchedulerVersion::V2 => {
                if manual {
                    CardQueue::ManuallyBuried
                } else {
                    CardQueue::SiblingBuried
                }
            }
        };
        let now = self.col.clock().now_secs();
        self.col
            .store()
            .set_queue_bulk(cids, queue, now, self.col.usn())?;
        Ok(())
    }

    /// Bury every buriable card of a note.
    pub fn bury_note(&mut self, nid: i64) -> Result<()> {
        let cids = self.col.store().buriable_cids_of_note(nid)?;
        if !cids.is_empty() {
            self.bury_cards(&cids, true)?;
        }
        Ok(())
    }

    pub fn suspend_cards(&mut self, cids: &[i64]) -> Result<()> {
        let now = self.col.clock().now_secs();
        self.col
            .store()
            .set_queue_bulk(cids, CardQueue::Suspended, now, self.col.usn())?;
        Ok(())
    }

    /// Return suspended cards to the queue their type and due imply.
    pub fn unsuspend_cards(&mut self, cids: &[i64]) -> Result<()> {
        let now = self.col.clock().now_secs();
        self.col
            .store()
            .unsuspend_cards(cids, now, self.col.usn())?;
        Ok(())
    }

    /// Unbury the given kind in a deck and its subdecks.
    pub fn unbury_cards_for_deck(&mut self, did: i64, kind: UnburyKind) -> Result<()> {
        let mut dids = vec![did];
        dids.extend(self.col.decks().children(did)?);
        let queue_where = match kind {
            UnburyKind::All => "queue IN (-2, -3)",
            UnburyKind::Manual => "queue = -3",
            UnburyKind::Siblings => "queue = -2",
        };
        let now = self.col.clock().now_secs();
        self.col
            .store()
            .unbury_for_decks(&dids, queue_where, now, self.col.usn())?;
        Ok(())
    }
}
