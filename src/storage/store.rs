//! SQLite persistence for cards, review log, and notes.
//!
//! The scheduler issues all of its queries through the typed methods
//! here; deck objects live in [`super::decks`] and are persisted by the
//! embedding application.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::models::{Card, CardQueue, CardType, RevlogEntry, RevlogKind};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Card not found: {0}")]
    CardNotFound(i64),

    #[error("Note not found: {0}")]
    NoteNotFound(i64),

    #[error("Card {0} has an invalid type/queue combination")]
    InvalidCardState(i64),

    #[error("Review log id already taken")]
    RevlogIdClash,
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Reconstructs `queue` from `type` and the stored due. Learning cards
/// with second-based dues go back to the sub-day queue, day-based ones
/// to the day-learning queue.
pub(crate) const RESTORE_QUEUE_SNIPPET: &str = "queue = (CASE WHEN type IN (1, 3) THEN \
    (CASE WHEN (CASE WHEN odue != 0 THEN odue ELSE due END) > 1000000000 THEN 1 ELSE 3 END) \
    ELSE type END)";

/// Like [`RESTORE_QUEUE_SNIPPET`] but leaves suspended/buried cards in
/// their non-selectable queues.
const RESTORE_QUEUE_WHEN_EMPTYING_SNIPPET: &str = "queue = (CASE WHEN queue < 0 THEN queue \
    WHEN type IN (1, 3) THEN \
    (CASE WHEN (CASE WHEN odue != 0 THEN odue ELSE due END) > 1000000000 THEN 1 ELSE 3 END) \
    ELSE type END)";

const CARD_COLUMNS: &str = "id, nid, did, ord, mod, usn, type, queue, due, ivl, factor, \
    reps, lapses, left, odue, odid";

/// Which identifier a queue fill excludes to avoid re-showing the card
/// on screen (or its siblings) from a prefetch.
#[derive(Debug, Clone, Copy)]
pub enum Exclusion {
    ById(i64),
    ByNote(i64),
}

impl Exclusion {
    fn column(self) -> &'static str {
        match self {
            Self::ById(_) => "id",
            Self::ByNote(_) => "nid",
        }
    }

    fn value(self) -> i64 {
        match self {
            Self::ById(v) | Self::ByNote(v) => v,
        }
    }
}

pub(crate) fn ids_to_sql(ids: &[i64]) -> String {
    if ids.is_empty() {
        // "IN ()" is a syntax error; no real id is ever 0
        return "(0)".to_string();
    }
    let mut out = String::with_capacity(ids.len() * 8 + 2);
    out.push('(');
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&id.to_string());
    }
    out.push(')');
    out
}

/// SQLite-backed card store.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cards (
                id INTEGER PRIMARY KEY,
                nid INTEGER NOT NULL,
                did INTEGER NOT NULL,
                ord INTEGER NOT NULL DEFAULT 0,
                mod INTEGER NOT NULL DEFAULT 0,
                usn INTEGER NOT NULL DEFAULT -1,
                type INTEGER NOT NULL DEFAULT 0,
                queue INTEGER NOT NULL DEFAULT 0,
                due INTEGER NOT NULL DEFAULT 0,
                ivl INTEGER NOT NULL DEFAULT 0,
                factor INTEGER NOT NULL DEFAULT 0,
                reps INTEGER NOT NULL DEFAULT 0,
                lapses INTEGER NOT NULL DEFAULT 0,
                left INTEGER NOT NULL DEFAULT 0,
                odue INTEGER NOT NULL DEFAULT 0,
                odid INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS revlog (
                id INTEGER PRIMARY KEY,
                cid INTEGER NOT NULL,
                usn INTEGER NOT NULL,
                ease INTEGER NOT NULL,
                ivl INTEGER NOT NULL,
                lastIvl INTEGER NOT NULL,
                factor INTEGER NOT NULL,
                time INTEGER NOT NULL,
                type INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY,
                tags TEXT NOT NULL DEFAULT '',
                mod INTEGER NOT NULL DEFAULT 0,
                usn INTEGER NOT NULL DEFAULT -1
            );

            CREATE INDEX IF NOT EXISTS idx_cards_nid ON cards(nid);
            CREATE INDEX IF NOT EXISTS idx_cards_sched ON cards(did, queue, due);
            CREATE INDEX IF NOT EXISTS idx_revlog_cid ON revlog(cid);
            "#,
        )?;
        Ok(Self { conn })
    }

    // ==================== Transactions ====================

    pub fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    // ==================== Cards ====================

    fn row_to_card(row: &rusqlite::Row) -> rusqlite::Result<(Card, i64, i64)> {
        let ctype_raw: i64 = row.get(6)?;
        let queue_raw: i64 = row.get(7)?;
        let card = Card {
            id: row.get(0)?,
            nid: row.get(1)?,
            did: row.get(2)?,
            ord: row.get(3)?,
            mtime: row.get(4)?,
            usn: row.get(5)?,
            // patched up by the caller after range checks
            ctype: CardType::New,
            queue: CardQueue::New,
            due: row.get(8)?,
            ivl: row.get(9)?,
            factor: row.get(10)?,
            reps: row.get(11)?,
            lapses: row.get(12)?,
            left: row.get(13)?,
            odue: row.get(14)?,
            odid: row.get(15)?,
            last_ivl: 0,
            timer_started_ms: None,
        };
        Ok((card, ctype_raw, queue_raw))
    }

    fn decode_card(raw: (Card, i64, i64)) -> Result<Card> {
        let (mut card, ctype_raw, queue_raw) = raw;
        card.ctype =
            CardType::from_i64(ctype_raw).ok_or(StorageError::InvalidCardState(card.id))?;
        card.queue =
            CardQueue::from_i64(queue_raw).ok_or(StorageError::InvalidCardState(card.id))?;
        Ok(card)
    }

    pub fn get_card(&self, id: i64) -> Result<Card> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {} FROM cards WHERE id = ?1", CARD_COLUMNS),
                params![id],
                Self::row_to_card,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StorageError::CardNotFound(id),
                other => StorageError::Sqlite(other),
            })?;
        Self::decode_card(raw)
    }

    /// Insert a card, assigning a unique millisecond-stamp id unless the
    /// card already carries one.
    pub fn add_card(&self, card: &mut Card, now_ms: i64) -> Result<()> {
        if card.id == 0 {
            let max_id: i64 = self
                .conn
                .query_row("SELECT COALESCE(MAX(id), 0) FROM cards", [], |row| {
                    row.get(0)
                })?;
            card.id = now_ms.max(max_id + 1);
        }
        self.conn.execute(
            "INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue, due, ivl, factor, \
             reps, lapses, left, odue, odid) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                card.id,
                card.nid,
                card.did,
                card.ord,
                card.mtime,
                card.usn,
                card.ctype.as_i64(),
                card.queue.as_i64(),
                card.due,
                card.ivl,
                card.factor,
                card.reps,
                card.lapses,
                card.left,
                card.odue,
                card.odid,
            ],
        )?;
        Ok(())
    }

    pub fn flush_card(&self, card: &Card) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE cards SET nid = ?2, did = ?3, ord = ?4, mod = ?5, usn = ?6, type = ?7, \
             queue = ?8, due = ?9, ivl = ?10, factor = ?11, reps = ?12, lapses = ?13, \
             left = ?14, odue = ?15, odid = ?16 WHERE id = ?1",
            params![
                card.id,
                card.nid,
                card.did,
                card.ord,
                card.mtime,
                card.usn,
                card.ctype.as_i64(),
                card.queue.as_i64(),
                card.due,
                card.ivl,
                card.factor,
                card.reps,
                card.lapses,
                card.left,
                card.odue,
                card.odid,
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::CardNotFound(card.id));
        }
        Ok(())
    }

    // ==================== Scheduler counts ====================

    pub fn new_count_for_deck(&self, did: i64, exclude_id: i64, limit: i32) -> Result<i32> {
        let cnt = self.conn.query_row(
            "SELECT count() FROM (SELECT 1 FROM cards WHERE did = ?1 AND queue = 0 \
             AND id != ?2 LIMIT ?3)",
            params![did, exclude_id, limit],
            |row| row.get(0),
        )?;
        Ok(cnt)
    }

    pub fn rev_count(&self, decks: &[i64], today: i32, exclude_id: i64, limit: i32) -> Result<i32> {
        let sql = format!(
            "SELECT count() FROM (SELECT id FROM cards WHERE did IN {} AND queue = 2 \
             AND due <= ?1 AND id != ?2 LIMIT ?3)",
            ids_to_sql(decks)
        );
        let cnt = self
            .conn
            .query_row(&sql, params![today, exclude_id, limit], |row| row.get(0))?;
        Ok(cnt)
    }

    pub fn lrn_subday_count(&self, decks: &[i64], cutoff: i64, exclude_id: i64) -> Result<i32> {
        let sql = format!(
            "SELECT count() FROM cards WHERE did IN {} AND queue = 1 AND due < ?1 AND id != ?2",
            ids_to_sql(decks)
        );
        let cnt = self
            .conn
            .query_row(&sql, params![cutoff, exclude_id], |row| row.get(0))?;
        Ok(cnt)
    }

    pub fn lrn_day_count(&self, decks: &[i64], today: i32, exclude_id: i64) -> Result<i32> {
        let sql = format!(
            "SELECT count() FROM cards WHERE did IN {} AND queue = 3 AND due <= ?1 AND id != ?2",
            ids_to_sql(decks)
        );
        let cnt = self
            .conn
            .query_row(&sql, params![today, exclude_id], |row| row.get(0))?;
        Ok(cnt)
    }

    pub fn preview_count(&self, decks: &[i64], exclude_id: i64) -> Result<i32> {
        let sql = format!(
            "SELECT count() FROM cards WHERE did IN {} AND queue = 4 AND id != ?1",
            ids_to_sql(decks)
        );
        let cnt = self
            .conn
            .query_row(&sql, params![exclude_id], |row| row.get(0))?;
        Ok(cnt)
    }

    // ==================== Queue fills ====================

    pub fn new_queue_ids(&self, did: i64, exclude: Exclusion, limit: i32) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT id FROM cards WHERE did = ?1 AND queue = 0 AND {} != ?2 \
             ORDER BY due, ord LIMIT ?3",
            exclude.column()
        );
        self.query_ids(&sql, params![did, exclude.value(), limit])
    }

    pub fn rev_queue_ids(
        &self,
        decks: &[i64],
        today: i32,
        exclude: Exclusion,
        limit: i32,
    ) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT id FROM cards WHERE did IN {} AND queue = 2 AND due <= ?1 AND {} != ?2 \
             ORDER BY due, random() LIMIT ?3",
            ids_to_sql(decks),
            exclude.column()
        );
        self.query_ids(&sql, params![today, exclude.value(), limit])
    }

    /// Sub-day learning plus preview cards, as `(due, id)` pairs.
    pub fn lrn_queue_entries(
        &self,
        decks: &[i64],
        cutoff: i64,
        exclude_id: i64,
        limit: i32,
    ) -> Result<Vec<(i64, i64)>> {
        let sql = format!(
            "SELECT due, id FROM cards WHERE did IN {} AND queue IN (1, 4) AND due < ?1 \
             AND id != ?2 LIMIT ?3",
            ids_to_sql(decks)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![cutoff, exclude_id, limit], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn lrn_day_ids(
        &self,
        did: i64,
        today: i32,
        exclude_id: i64,
        limit: i32,
    ) -> Result<Vec<i64>> {
        self.query_ids(
            "SELECT id FROM cards WHERE did = ?1 AND queue = 3 AND due <= ?2 AND id != ?3 \
             LIMIT ?4",
            params![did, today, exclude_id, limit],
        )
    }

    fn query_ids(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map(args, |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    // ==================== Siblings ====================

    /// Same-note cards that would collide with the one being answered:
    /// new siblings and review siblings due today.
    pub fn siblings_for_spacing(
        &self,
        nid: i64,
        card_id: i64,
        today: i32,
    ) -> Result<Vec<(i64, CardQueue)>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, queue FROM cards WHERE nid = ?1 AND id != ?2 \
             AND (queue = 0 OR (queue = 2 AND due <= ?3))",
        )?;
        let rows = stmt
            .query_map(params![nid, card_id, today], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(id, q)| {
                CardQueue::from_i64(q)
                    .map(|queue| (id, queue))
                    .ok_or(StorageError::InvalidCardState(id))
            })
            .collect()
    }

    // ==================== Bury / suspend ====================

    pub fn set_queue_bulk(
        &self,
        ids: &[i64],
        queue: CardQueue,
        mtime: i64,
        usn: i32,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE cards SET queue = ?1, mod = ?2, usn = ?3 WHERE id IN {}",
            ids_to_sql(ids)
        );
        self.conn.execute(&sql, params![queue.as_i64(), mtime, usn])?;
        Ok(())
    }

    pub fn unsuspend_cards(&self, ids: &[i64], mtime: i64, usn: i32) -> Result<()> {
        let sql = format!(
            "UPDATE cards SET {}, mod = ?1, usn = ?2 WHERE queue = -1 AND id IN {}",
            RESTORE_QUEUE_SNIPPET,
            ids_to_sql(ids)
        );
        self.conn.execute(&sql, params![mtime, usn])?;
        Ok(())
    }

    /// Restore buried cards in the given decks. `queue_where` selects
    /// which buried queues to touch.
    pub fn unbury_for_decks(
        &self,
        decks: &[i64],
        queue_where: &str,
        mtime: i64,
        usn: i32,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE cards SET {}, mod = ?1, usn = ?2 WHERE {} AND did IN {}",
            RESTORE_QUEUE_SNIPPET,
            queue_where,
            ids_to_sql(decks)
        );
        self.conn.execute(&sql, params![mtime, usn])?;
        Ok(())
    }

    /// Day-rollover unbury: only sibling-buried cards come back.
    pub fn unbury_sibling_buried(&self) -> Result<()> {
        let sql = format!(
            "UPDATE cards SET {} WHERE queue = -2",
            RESTORE_QUEUE_SNIPPET
        );
        self.conn.execute(&sql, [])?;
        Ok(())
    }

    pub fn have_cards_in_queue(&self, decks: &[i64], queue: CardQueue) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM cards WHERE queue = ?1 AND did IN {} LIMIT 1",
            ids_to_sql(decks)
        );
        let found = self
            .conn
            .query_row(&sql, params![queue.as_i64()], |_| Ok(()))
            .map(|_| true)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                other => Err(other),
            })?;
        Ok(found)
    }

    /// Cards of a note that are neither suspended nor already buried.
    pub fn buriable_cids_of_note(&self, nid: i64) -> Result<Vec<i64>> {
        self.query_ids(
            "SELECT id FROM cards WHERE nid = ?1 AND queue >= 0",
            params![nid],
        )
    }

    // ==================== Filtered decks ====================

    /// Return cards selected by `where_sql` to their original decks,
    /// preserving suspended/buried state.
    pub fn empty_filtered_where(&self, where_sql: &str, usn: i32) -> Result<()> {
        let sql = format!(
            "UPDATE cards SET did = odid, {}, \
             due = (CASE WHEN odue > 0 THEN odue ELSE due END), odue = 0, odid = 0, usn = ?1 \
             WHERE {}",
            RESTORE_QUEUE_WHEN_EMPTYING_SNIPPET, where_sql
        );
        self.conn.execute(&sql, params![usn])?;
        Ok(())
    }

    /// Move gathered cards into a filtered deck. Cards with
    /// non-positive dues (new cards given negative positions) keep
    /// their due; everyone else takes the assigned ordering value.
    pub fn move_to_filtered(
        &self,
        did: i64,
        ids_with_due: &[(i64, i64)],
        usn: i32,
        force_rev_queue: bool,
    ) -> Result<()> {
        let queue_clause = if force_rev_queue { ", queue = 2" } else { "" };
        let sql = format!(
            "UPDATE cards SET odid = did, odue = due, did = ?1, \
             due = (CASE WHEN due <= 0 THEN due ELSE ?2 END), usn = ?3{} WHERE id = ?4",
            queue_clause
        );
        let mut stmt = self.conn.prepare(&sql)?;
        for &(id, due) in ids_with_due {
            stmt.execute(params![did, due, usn, id])?;
        }
        Ok(())
    }

    /// Search over cards joined with their notes; `where_sql` and
    /// `order_by` are composed by the query compiler.
    pub fn find_cards(&self, where_sql: &str, order_by: &str, limit: i32) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT c.id FROM cards c JOIN notes n ON c.nid = n.id WHERE {} \
             ORDER BY {} LIMIT {}",
            where_sql, order_by, limit
        );
        self.query_ids(&sql, [])
    }

    // ==================== Reset / reschedule tools ====================

    pub fn forget_cards(&self, ids: &[i64], factor: i32, mtime: i64, usn: i32) -> Result<()> {
        let sql = format!(
            "UPDATE cards SET type = 0, queue = 0, ivl = 0, due = 0, odue = 0, factor = ?1, \
             mod = ?2, usn = ?3 WHERE id IN {}",
            ids_to_sql(ids)
        );
        self.conn.execute(&sql, params![factor, mtime, usn])?;
        Ok(())
    }

    pub fn max_new_due(&self) -> Result<i64> {
        let due = self.conn.query_row(
            "SELECT COALESCE(MAX(due), 0) FROM cards WHERE type = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(due)
    }

    pub fn reschedule_as_review(
        &self,
        rows: &[(i64, i64, i64)],
        factor: i32,
        mtime: i64,
        usn: i32,
    ) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "UPDATE cards SET type = 2, queue = 2, ivl = ?1, due = ?2, odue = 0, \
             factor = ?3, mod = ?4, usn = ?5 WHERE id = ?6",
        )?;
        for &(ivl, due, id) in rows {
            stmt.execute(params![ivl, due, factor, mtime, usn, id])?;
        }
        Ok(())
    }

    /// `(id, nid)` of the new-typed cards among `ids`.
    pub fn new_cards_of(&self, ids: &[i64]) -> Result<Vec<(i64, i64)>> {
        let sql = format!(
            "SELECT id, nid FROM cards WHERE type = 0 AND id IN {}",
            ids_to_sql(ids)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn card_nids(&self, ids: &[i64]) -> Result<HashMap<i64, i64>> {
        let sql = format!("SELECT id, nid FROM cards WHERE id IN {}", ids_to_sql(ids));
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<HashMap<i64, i64>>>()?;
        Ok(rows)
    }

    /// Smallest new-card due at or above `start`, ignoring the cards
    /// being repositioned. Zero when none.
    pub fn min_new_due_from(&self, start: i64, exclude: &[i64]) -> Result<i64> {
        let sql = format!(
            "SELECT COALESCE(MIN(due), 0) FROM cards WHERE due >= ?1 AND type = 0 \
             AND id NOT IN {}",
            ids_to_sql(exclude)
        );
        let due = self.conn.query_row(&sql, params![start], |row| row.get(0))?;
        Ok(due)
    }

    pub fn shift_new_dues(
        &self,
        exclude: &[i64],
        low: i64,
        shift_by: i64,
        mtime: i64,
        usn: i32,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE cards SET mod = ?1, usn = ?2, due = due + ?3 \
             WHERE id NOT IN {} AND due >= ?4 AND type = 0",
            ids_to_sql(exclude)
        );
        self.conn.execute(&sql, params![mtime, usn, shift_by, low])?;
        Ok(())
    }

    pub fn set_due_bulk(&self, rows: &[(i64, i64)], mtime: i64, usn: i32) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("UPDATE cards SET due = ?1, mod = ?2, usn = ?3 WHERE id = ?4")?;
        for &(due, id) in rows {
            stmt.execute(params![due, mtime, usn, id])?;
        }
        Ok(())
    }

    pub fn new_cids_in_deck(&self, did: i64) -> Result<Vec<i64>> {
        self.query_ids(
            "SELECT id FROM cards WHERE did = ?1 ORDER BY id",
            params![did],
        )
    }

    // ==================== Deck summary counts ====================

    pub fn new_for_deck(&self, did: i64, limit: i32) -> Result<i32> {
        let cnt = self.conn.query_row(
            "SELECT count() FROM (SELECT 1 FROM cards WHERE did = ?1 AND queue = 0 LIMIT ?2)",
            params![did, limit.max(0)],
            |row| row.get(0),
        )?;
        Ok(cnt)
    }

    pub fn lrn_for_deck(&self, did: i64, cutoff: i64, today: i32, limit: i32) -> Result<i32> {
        let sub: i32 = self.conn.query_row(
            "SELECT count() FROM (SELECT NULL FROM cards WHERE did = ?1 AND queue = 1 \
             AND due < ?2 LIMIT ?3)",
            params![did, cutoff, limit],
            |row| row.get(0),
        )?;
        let day: i32 = self.conn.query_row(
            "SELECT count() FROM (SELECT NULL FROM cards WHERE did = ?1 AND queue = 3 \
             AND due <= ?2 LIMIT ?3)",
            params![did, today, limit],
            |row| row.get(0),
        )?;
        Ok(sub + day)
    }

    pub fn rev_for_decks(&self, decks: &[i64], today: i32, limit: i32) -> Result<i32> {
        let sql = format!(
            "SELECT count() FROM (SELECT 1 FROM cards WHERE did IN {} AND queue = 2 \
             AND due <= ?1 LIMIT ?2)",
            ids_to_sql(decks)
        );
        let cnt = self
            .conn
            .query_row(&sql, params![today, limit.max(0)], |row| row.get(0))?;
        Ok(cnt)
    }

    // ==================== Review log ====================

    pub fn add_revlog(&self, entry: &RevlogEntry) -> Result<()> {
        let result = self.conn.execute(
            "INSERT INTO revlog (id, cid, usn, ease, ivl, lastIvl, factor, time, type) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id,
                entry.cid,
                entry.usn,
                entry.ease,
                entry.ivl,
                entry.last_ivl,
                entry.factor,
                entry.time_taken_ms,
                entry.kind.as_i64(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::RevlogIdClash)
            }
            Err(other) => Err(StorageError::Sqlite(other)),
        }
    }

    pub fn revlog_for_card(&self, cid: i64) -> Result<Vec<RevlogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, cid, usn, ease, ivl, lastIvl, factor, time, type FROM revlog \
             WHERE cid = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![cid], |row| {
                Ok((
                    RevlogEntry {
                        id: row.get(0)?,
                        cid: row.get(1)?,
                        usn: row.get(2)?,
                        ease: row.get(3)?,
                        ivl: row.get(4)?,
                        last_ivl: row.get(5)?,
                        factor: row.get(6)?,
                        time_taken_ms: row.get(7)?,
                        kind: RevlogKind::Learn,
                    },
                    row.get::<_, i64>(8)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(mut entry, kind)| {
                entry.kind =
                    RevlogKind::from_i64(kind).ok_or(StorageError::InvalidCardState(entry.cid))?;
                Ok(entry)
            })
            .collect()
    }

    // ==================== Scheduler version migration ====================

    /// Return every filtered-deck resident home, normalising learning
    /// types away in the process.
    pub fn empty_all_filtered(&self, usn: i32) -> Result<()> {
        self.conn.execute(
            "UPDATE cards SET did = odid, \
             queue = (CASE WHEN type = 1 THEN 0 WHEN type = 3 THEN 2 ELSE type END), \
             type = (CASE WHEN type = 1 THEN 0 WHEN type = 3 THEN 2 ELSE type END), \
             due = odue, odue = 0, odid = 0, usn = ?1 WHERE odid != 0",
            params![usn],
        )?;
        Ok(())
    }

    /// Push relearning reviews back to the review queue using the
    /// already-updated interval (leaving the current scheme).
    pub fn relearning_to_review_by_ivl(&self, today: i32, mtime: i64, usn: i32) -> Result<()> {
        self.conn.execute(
            "UPDATE cards SET due = ?1 + ivl, queue = 2, type = 2, mod = ?2, usn = ?3, \
             odue = 0 WHERE queue IN (1, 3) AND type IN (2, 3)",
            params![today, mtime, usn],
        )?;
        Ok(())
    }

    /// Push relearning reviews back to the review queue using the due
    /// stashed in `odue` (leaving the single-queue scheme).
    pub fn relearning_to_review_by_odue(&self, mtime: i64, usn: i32) -> Result<()> {
        self.conn.execute(
            "UPDATE cards SET due = odue, queue = 2, type = 2, mod = ?1, usn = ?2, odue = 0 \
             WHERE queue IN (1, 3) AND type IN (2, 3)",
            params![mtime, usn],
        )?;
        Ok(())
    }

    pub fn learning_cids(&self) -> Result<Vec<i64>> {
        self.query_ids("SELECT id FROM cards WHERE queue IN (1, 3)", [])
    }

    pub fn manually_buried_to_sibling(&self, mtime: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE cards SET queue = -2, mod = ?1 WHERE queue = -3",
            params![mtime],
        )?;
        Ok(())
    }

    /// Normalise type/due of suspended or buried cards that were mid
    /// learning when set aside.
    pub fn reset_suspended_learning(&self, mtime: i64, usn: i32) -> Result<()> {
        self.conn.execute(
            "UPDATE cards SET \
             type = (CASE WHEN type = 1 THEN 0 WHEN type IN (2, 3) THEN 2 ELSE type END), \
             due = (CASE WHEN odue != 0 THEN odue ELSE due END), odue = 0, \
             mod = ?1, usn = ?2 WHERE queue < 0",
            params![mtime, usn],
        )?;
        Ok(())
    }

    /// Learning answers gain a button when moving to the four-button
    /// scheme: Good/Easy shift from 2/3 up to 3/4.
    pub fn shift_learning_eases_up(&self) -> Result<()> {
        self.conn.execute(
            "UPDATE revlog SET ease = ease + 1 WHERE ease IN (2, 3) AND type IN (0, 2)",
            [],
        )?;
        Ok(())
    }

    /// Inverse of [`Self::shift_learning_eases_up`].
    pub fn shift_learning_eases_down(&self) -> Result<()> {
        self.conn.execute(
            "UPDATE revlog SET ease = ease - 1 WHERE ease IN (3, 4) AND type IN (0, 2)",
            [],
        )?;
        Ok(())
    }

    // ==================== Notes ====================

    pub fn add_note(&self, tags: &[&str], now_ms: i64) -> Result<i64> {
        let max_id: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(id), 0) FROM notes", [], |row| {
                row.get(0)
            })?;
        let id = now_ms.max(max_id + 1);
        self.conn.execute(
            "INSERT INTO notes (id, tags, mod, usn) VALUES (?1, ?2, ?3, ?4)",
            params![id, join_tags(tags), now_ms / 1000, -1],
        )?;
        Ok(id)
    }

    pub fn note_tags(&self, nid: i64) -> Result<Vec<String>> {
        let tags: String = self
            .conn
            .query_row(
                "SELECT tags FROM notes WHERE id = ?1",
                params![nid],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StorageError::NoteNotFound(nid),
                other => StorageError::Sqlite(other),
            })?;
        Ok(tags.split_whitespace().map(str::to_string).collect())
    }

    pub fn note_has_tag(&self, nid: i64, tag: &str) -> Result<bool> {
        Ok(self
            .note_tags(nid)?
            .iter()
            .any(|t| t.eq_ignore_ascii_case(tag)))
    }

    pub fn note_add_tag(&self, nid: i64, tag: &str, mtime: i64, usn: i32) -> Result<()> {
        let mut tags = self.note_tags(nid)?;
        if tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return Ok(());
        }
        tags.push(tag.to_string());
        let refs: Vec<&str> = tags.iter().map(String::as_str).collect();
        self.conn.execute(
            "UPDATE notes SET tags = ?1, mod = ?2, usn = ?3 WHERE id = ?4",
            params![join_tags(&refs), mtime, usn, nid],
        )?;
        Ok(())
    }
}

/// Tags are stored space-delimited with surrounding spaces so word
/// matches can use LIKE.
fn join_tags(tags: &[&str]) -> String {
    if tags.is_empty() {
        return String::new();
    }
    format!(" {} ", tags.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_card() -> (Store, Card) {
        let store = Store::open_in_memory().unwrap();
        let mut card = Card::new(0, 10, 1);
        store.add_card(&mut card, 1_700_000_000_000).unwrap();
        (store, card)
    }

    #[test]
    fn test_card_roundtrip() {
        let (store, mut card) = store_with_card();
        card.queue = CardQueue::Review;
        card.ctype = CardType::Review;
        card.ivl = 12;
        card.factor = 2450;
        store.flush_card(&card).unwrap();

        let back = store.get_card(card.id).unwrap();
        assert_eq!(back.queue, CardQueue::Review);
        assert_eq!(back.ivl, 12);
        assert_eq!(back.factor, 2450);
    }

    #[test]
    fn test_missing_card_is_an_error() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.get_card(42),
            Err(StorageError::CardNotFound(42))
        ));
    }

    #[test]
    fn test_revlog_id_clash_detected() {
        let (store, card) = store_with_card();
        let entry = RevlogEntry {
            id: 555,
            cid: card.id,
            usn: -1,
            ease: 3,
            ivl: 1,
            last_ivl: 0,
            factor: 2500,
            time_taken_ms: 4_000,
            kind: RevlogKind::Learn,
        };
        store.add_revlog(&entry).unwrap();
        assert!(matches!(
            store.add_revlog(&entry),
            Err(StorageError::RevlogIdClash)
        ));
    }

    #[test]
    fn test_note_tags() {
        let store = Store::open_in_memory().unwrap();
        let nid = store.add_note(&["grammar"], 1_700_000_000_000).unwrap();
        assert!(store.note_has_tag(nid, "grammar").unwrap());
        assert!(!store.note_has_tag(nid, "leech").unwrap());

        store.note_add_tag(nid, "leech", 100, -1).unwrap();
        assert!(store.note_has_tag(nid, "leech").unwrap());
        // adding again is a no-op
        store.note_add_tag(nid, "LEECH", 101, -1).unwrap();
        assert_eq!(store.note_tags(nid).unwrap().len(), 2);
    }

    #[test]
    fn test_unsuspend_restores_queue_from_type() {
        let (store, mut card) = store_with_card();
        card.ctype = CardType::Review;
        card.queue = CardQueue::Suspended;
        card.due = 55;
        store.flush_card(&card).unwrap();

        store.unsuspend_cards(&[card.id], 1, -1).unwrap();
        let back = store.get_card(card.id).unwrap();
        assert_eq!(back.queue, CardQueue::Review);
    }

    #[test]
    fn test_unsuspend_learning_uses_due_scale() {
        let (store, mut card) = store_with_card();
        card.ctype = CardType::Learning;
        card.queue = CardQueue::Suspended;
        card.due = 1_700_000_123; // epoch seconds: sub-day learning
        store.flush_card(&card).unwrap();
        store.unsuspend_cards(&[card.id], 1, -1).unwrap();
        assert_eq!(store.get_card(card.id).unwrap().queue, CardQueue::Learning);

        card.due = 12; // day index: day learning
        card.queue = CardQueue::Suspended;
        store.flush_card(&card).unwrap();
        store.unsuspend_cards(&[card.id], 1, -1).unwrap();
        assert_eq!(store.get_card(card.id).unwrap().queue, CardQueue::DayLearn);
    }
}
