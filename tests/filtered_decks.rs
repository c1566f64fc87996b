//! Filtered decks, previewing, bulk queue operations, maintenance
//! tools, and scheduler-version conversion.

mod common;

use common::harness;
use mneme::{
    CardQueue, CardType, FilteredOrder, FilteredSearchTerm, Rating, RevlogKind, UnburyKind,
};

#[test]
fn early_review_in_filtered_deck() {
    let mut h = harness();
    let (home, dyn_id) = {
        let col = h.sched.col_mut();
        let home = col.decks_mut().add_deck("history");
        let dyn_id = col.decks_mut().add_filtered_deck("cram");
        (home, dyn_id)
    };
    let nid = h.add_note();
    let added = h.add_review_card(home, nid, 5, 10, 2500);

    let gathered = h.sched.rebuild_filtered_deck(dyn_id).unwrap();
    assert_eq!(gathered, 1);

    let mut card = h.sched.get_card().unwrap().unwrap();
    assert_eq!(card.id, added.id);
    assert_eq!(card.did, dyn_id);
    assert_eq!(card.odid, home);
    assert_eq!(card.odue, 5);

    h.sched.answer_card(&mut card, Rating::Easy).unwrap();

    // five days early: max(5 * 2.5, 1) * (1.3 - 0.15) = 14.375 -> 14
    assert_eq!(card.ivl, 14);
    assert_eq!(card.due, 14);
    assert_eq!(card.factor, 2650);
    assert_eq!(card.did, home, "graduating an early review leaves the deck");
    assert_eq!(card.odid, 0);
    assert_eq!(card.odue, 0);

    let log = h.sched.col().store().revlog_for_card(card.id).unwrap();
    assert_eq!(log.last().unwrap().kind, RevlogKind::EarlyReview);
}

#[test]
fn emptying_a_filtered_deck_restores_cards() {
    let mut h = harness();
    let (home, dyn_id) = {
        let col = h.sched.col_mut();
        let home = col.decks_mut().add_deck("history");
        let dyn_id = col.decks_mut().add_filtered_deck("cram");
        (home, dyn_id)
    };
    let nid = h.add_note();
    let added = h.add_review_card(home, nid, 5, 10, 2500);

    h.sched.rebuild_filtered_deck(dyn_id).unwrap();
    assert_eq!(h.stored(added.id).did, dyn_id);

    h.sched.empty_filtered_deck(dyn_id).unwrap();
    let card = h.stored(added.id);
    assert_eq!(card.did, home);
    assert_eq!(card.due, 5);
    assert_eq!(card.odid, 0);
    assert_eq!(card.odue, 0);
    assert_eq!(card.queue, CardQueue::Review);
}

#[test]
fn due_priority_gathers_most_overdue_relative_to_interval_first() {
    let mut h = harness();
    let (home, dyn_id) = {
        let col = h.sched.col_mut();
        let home = col.decks_mut().add_deck("history");
        let dyn_id = col.decks_mut().add_filtered_deck("cram");
        col.decks_mut().get_mut(dyn_id).unwrap().terms =
            vec![FilteredSearchTerm::new("is:due", 100, FilteredOrder::DuePriority)];
        (home, dyn_id)
    };
    let nid1 = h.add_note();
    let long_ivl = h.add_review_card(home, nid1, 1, 10, 2500);
    let nid2 = h.add_note();
    let short_ivl = h.add_review_card(home, nid2, 1, 2, 2500);

    // six days on, both are five days late
    h.tick(6 * 86_400);
    h.sched.reset(None).unwrap();
    h.sched.rebuild_filtered_deck(dyn_id).unwrap();

    // both five days late; the two-day card is far more overdue
    // relative to its interval and gathers first
    assert_eq!(h.stored(short_ivl.id).due, -100_000);
    assert_eq!(h.stored(long_ivl.id).due, -99_999);
}

#[test]
fn preview_deck_cycles_and_restores_cards() {
    let mut h = harness();
    let (home, dyn_id) = {
        let col = h.sched.col_mut();
        let home = col.decks_mut().add_deck("history");
        let dyn_id = col.decks_mut().add_filtered_deck("preview");
        col.decks_mut().get_mut(dyn_id).unwrap().resched = false;
        (home, dyn_id)
    };
    let nid = h.add_note();
    let added = h.add_new_card(home, nid, 0);

    h.sched.rebuild_filtered_deck(dyn_id).unwrap();

    let mut card = h.sched.get_card().unwrap().unwrap();
    assert_eq!(card.id, added.id);
    assert_eq!(h.sched.answer_buttons(&card).unwrap(), 2);
    assert_eq!(h.sched.next_ivl(&card, Rating::Again).unwrap(), 600);

    // Again cycles the card for another look
    let now = h.now();
    h.sched.answer_card(&mut card, Rating::Again).unwrap();
    assert_eq!(card.queue, CardQueue::Preview);
    assert_eq!(card.due, now + 600);
    assert_eq!(card.ctype, CardType::New, "previewing never changes type");

    // once it comes back, the second button releases it unchanged
    h.tick(700);
    let mut card = h.sched.get_card().unwrap().unwrap();
    assert_eq!(card.id, added.id);
    h.sched.answer_card(&mut card, Rating::Hard).unwrap();

    let restored = h.stored(added.id);
    assert_eq!(restored.did, home);
    assert_eq!(restored.queue, CardQueue::New);
    assert_eq!(restored.due, 0);
    assert_eq!(restored.odid, 0);
    assert_eq!(restored.reps, 0, "previewing is not an answer");
}

#[test]
fn preview_rejects_other_ratings() {
    let mut h = harness();
    let (home, dyn_id) = {
        let col = h.sched.col_mut();
        let home = col.decks_mut().add_deck("history");
        let dyn_id = col.decks_mut().add_filtered_deck("preview");
        col.decks_mut().get_mut(dyn_id).unwrap().resched = false;
        (home, dyn_id)
    };
    let nid = h.add_note();
    h.add_new_card(home, nid, 0);
    h.sched.rebuild_filtered_deck(dyn_id).unwrap();

    let mut card = h.sched.get_card().unwrap().unwrap();
    assert!(h.sched.answer_card(&mut card, Rating::Good).is_err());
}

#[test]
fn unbury_roundtrip_restores_type_derived_queues() {
    let mut h = harness();
    let nid1 = h.add_note();
    let nid2 = h.add_note();
    let review = h.add_review_card(1, nid1, 3, 5, 2500);
    let fresh = h.add_new_card(1, nid2, 0);

    h.sched.bury_cards(&[review.id], true).unwrap();
    h.sched.bury_cards(&[fresh.id], false).unwrap();

    h.sched.unbury_cards_for_deck(1, UnburyKind::All).unwrap();
    assert_eq!(h.stored(review.id).queue, CardQueue::Review);
    assert_eq!(h.stored(fresh.id).queue, CardQueue::New);
}

#[test]
fn bury_note_buries_all_its_cards() {
    let mut h = harness();
    let nid = h.add_note();
    let a = h.add_new_card(1, nid, 0);
    let b = h.add_review_card(1, nid, 0, 4, 2500);
    let suspended = h.add_new_card(1, nid, 1);
    h.sched.suspend_cards(&[suspended.id]).unwrap();

    h.sched.bury_note(nid).unwrap();
    assert_eq!(h.stored(a.id).queue, CardQueue::ManuallyBuried);
    assert_eq!(h.stored(b.id).queue, CardQueue::ManuallyBuried);
    assert_eq!(
        h.stored(suspended.id).queue,
        CardQueue::Suspended,
        "suspended cards stay suspended"
    );
}

#[test]
fn suspend_and_unsuspend_roundtrip() {
    let mut h = harness();
    let nid = h.add_note();
    let card = h.add_review_card(1, nid, 3, 5, 2500);

    h.sched.suspend_cards(&[card.id]).unwrap();
    assert_eq!(h.stored(card.id).queue, CardQueue::Suspended);

    h.sched.unsuspend_cards(&[card.id]).unwrap();
    assert_eq!(h.stored(card.id).queue, CardQueue::Review);
}

#[test]
fn forget_cards_resets_and_repositions() {
    let mut h = harness();
    let mut ids = Vec::new();
    for _ in 0..3 {
        let nid = h.add_note();
        ids.push(h.add_review_card(1, nid, 2, 7, 2400).id);
        h.tick(1);
    }

    h.sched.forget_cards(&ids).unwrap();

    for (i, &id) in ids.iter().enumerate() {
        let card = h.stored(id);
        assert_eq!(card.ctype, CardType::New);
        assert_eq!(card.queue, CardQueue::New);
        assert_eq!(card.ivl, 0);
        assert_eq!(card.factor, 2500);
        assert_eq!(card.due, 1 + i as i64, "contiguous new positions");
    }
}

#[test]
fn resched_cards_places_reviews_at_fixed_interval() {
    let mut h = harness();
    let nid = h.add_note();
    let card = h.add_new_card(1, nid, 0);

    h.sched.resched_cards(&[card.id], 5, 5).unwrap();

    let card = h.stored(card.id);
    assert_eq!(card.ctype, CardType::Review);
    assert_eq!(card.queue, CardQueue::Review);
    assert_eq!(card.ivl, 5);
    assert_eq!(card.due, 5);
    assert_eq!(card.factor, 2500);
}

#[test]
fn sort_cards_shifts_existing_positions() {
    let mut h = harness();
    let mut existing = Vec::new();
    for due in 1..=3 {
        let nid = h.add_note();
        existing.push(h.add_new_card(1, nid, due).id);
        h.tick(1);
    }
    let nid = h.add_note();
    let moved = h.add_new_card(1, nid, 0);

    h.sched.sort_cards(&[moved.id], 2, 1, false, true).unwrap();

    assert_eq!(h.stored(moved.id).due, 2);
    assert_eq!(h.stored(existing[0]).due, 1, "below start, untouched");
    assert_eq!(h.stored(existing[1]).due, 3, "shifted out of the way");
    assert_eq!(h.stored(existing[2]).due, 4);
}

#[test]
fn scheduler_conversion_roundtrips_revlog_eases() {
    let mut h = harness();
    let nid = h.add_note();
    h.add_new_card(1, nid, 0);

    let mut card = h.sched.get_card().unwrap().unwrap();
    h.sched.answer_card(&mut card, Rating::Good).unwrap();
    let cid = card.id;
    assert_eq!(
        h.sched.col().store().revlog_for_card(cid).unwrap()[0].ease,
        3
    );

    h.tick(1);
    h.sched.move_to_v1().unwrap();
    assert_eq!(h.sched.name(), "std");
    // learning answers drop a button in the three-button scheme
    assert_eq!(
        h.sched.col().store().revlog_for_card(cid).unwrap()[0].ease,
        2
    );
    // cards mid-learning went back to new
    let card = h.stored(cid);
    assert_eq!(card.ctype, CardType::New);
    assert_eq!(card.queue, CardQueue::New);

    h.tick(1);
    h.sched.move_to_v2().unwrap();
    assert_eq!(h.sched.name(), "std2");
    assert_eq!(
        h.sched.col().store().revlog_for_card(cid).unwrap()[0].ease,
        3
    );
}
