//! One-shot migration between the two scheduling variants.
//!
//! Both directions first drain filtered decks and pull cards out of
//! learning: review cards in relearning go back to the review queue
//! (with the due they would have under the target scheme) and new cards
//! in learning are forgotten. Learning answers in the review log shift
//! by one button between the three- and four-button schemes, so a
//! round trip without Hard ratings composes to the identity.

use crate::collection::SchedulerVersion;
use crate::error::Result;

use super::Scheduler;

impl Scheduler {
    /// Convert the collection to the single-queue (v1) variant.
    pub fn move_to_v1(&mut self) -> Result<()> {
        if self.version == SchedulerVersion::V1 {
            return Ok(());
        }
        let now = self.col.clock().now_secs();
        let usn = self.col.usn();

        self.col.store().empty_all_filtered(usn)?;
        // relearning due dates were day-based already
        self.col
            .store()
            .relearning_to_review_by_ivl(self.today, now, usn)?;
        let learning = self.col.store().learning_cids()?;
        if !learning.is_empty() {
            self.forget_cards(&learning)?;
        }
        self.col.store().manually_buried_to_sibling(now)?;
        self.col.store().reset_suspended_learning(now, usn)?;
        self.col.store().shift_learning_eases_down()?;

        self.version = SchedulerVersion::V1;
        self.col.options_mut().scheduler_version = SchedulerVersion::V1;
        log::info!("collection converted to the v1 scheduler");
        self.defer_reset(None);
        Ok(())
    }

    /// Convert the collection to the v2 variant this crate implements
    /// in full.
    pub fn move_to_v2(&mut self) -> Result<()> {
        if self.version == SchedulerVersion::V2 {
            return Ok(());
        }
        let now = self.col.clock().now_secs();
        let usn = self.col.usn();

        self.col.store().empty_all_filtered(usn)?;
        // v1 stashed the original review due in odue during relearning
        self.col.store().relearning_to_review_by_odue(now, usn)?;
        let learning = self.col.store().learning_cids()?;
        if !learning.is_empty() {
            self.forget_cards(&learning)?;
        }
        self.col.store().shift_learning_eases_up()?;

        self.version = SchedulerVersion::V2;
        self.col.options_mut().scheduler_version = SchedulerVersion::V2;
        log::info!("collection converted to the v2 scheduler");
        self.defer_reset(None);
        Ok(())
    }
}
