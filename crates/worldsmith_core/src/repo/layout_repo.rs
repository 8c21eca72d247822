//! Card layout persistence.
//!
//! # Invariants
//! - One layout row per card, keyed by `card_id`.
//! - `layout_version` starts at 0 and increments on every write, including
//!   soft delete and revival.
//! - The owning card's `has_layout`, `layout_version` and
//!   `layout_updated_at` mirror the alive layout; the card's own version is
//!   not bumped by layout writes.

use super::row::{bool_to_int, now_ms, parse_bool, parse_uuid};
use super::{ensure_schema_ready, StoreError, StoreResult};
use crate::model::card::CardId;
use crate::model::cursor::FeedCursor;
use crate::model::layout::CardLayout;
use crate::model::EntityKind;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

const LAYOUT_COLUMNS: &str = "card_id, layout_version, updated_at, is_deleted, payload_json";

/// SQLite-backed layout store.
pub struct SqliteLayoutRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLayoutRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self::new(conn))
    }

    pub(crate) fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, card_id: CardId, include_deleted: bool) -> StoreResult<Option<CardLayout>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LAYOUT_COLUMNS}
             FROM card_layouts
             WHERE card_id = ?1
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;
        let mut rows = stmt.query(params![card_id.to_string(), bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_layout_row(row)?));
        }
        Ok(None)
    }

    /// Writes the payload, guarded by `expected_version` when given, and
    /// refreshes the card mirror.
    pub fn put(
        &self,
        card_id: CardId,
        payload: &Value,
        expected_version: Option<i64>,
    ) -> StoreResult<CardLayout> {
        let payload_json = serde_json::to_string(payload)
            .map_err(|err| StoreError::InvalidData(format!("layout payload: {err}")))?;
        let now = now_ms();
        let current = self.current_version(card_id)?;

        match (current, expected_version) {
            (None, Some(_)) => {
                return Err(StoreError::NotFound {
                    kind: EntityKind::CardLayout,
                    id: card_id,
                })
            }
            (None, None) => {
                self.conn.execute(
                    "INSERT INTO card_layouts (card_id, layout_version, updated_at, is_deleted, payload_json)
                     VALUES (?1, 0, ?2, 0, ?3);",
                    params![card_id.to_string(), now, payload_json],
                )?;
            }
            (Some(actual), expected) => {
                let changed = self.conn.execute(
                    "UPDATE card_layouts
                     SET payload_json = ?2,
                         is_deleted = 0,
                         layout_version = layout_version + 1,
                         updated_at = ?3
                     WHERE card_id = ?1
                       AND (?4 IS NULL OR layout_version = ?4);",
                    params![card_id.to_string(), payload_json, now, expected],
                )?;
                if changed == 0 {
                    return Err(StoreError::ConcurrencyConflict {
                        kind: EntityKind::CardLayout,
                        id: card_id,
                        expected: expected.unwrap_or(actual),
                        actual,
                    });
                }
            }
        }

        let layout = self.get(card_id, true)?.ok_or(StoreError::NotFound {
            kind: EntityKind::CardLayout,
            id: card_id,
        })?;
        self.write_card_mirror(card_id, Some(&layout))?;
        Ok(layout)
    }

    /// Soft-deletes the layout and clears the card mirror.
    ///
    /// Returns `false` when no alive layout exists.
    pub fn delete(&self, card_id: CardId, expected_version: Option<i64>) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE card_layouts
             SET is_deleted = 1,
                 layout_version = layout_version + 1,
                 updated_at = ?2
             WHERE card_id = ?1
               AND is_deleted = 0
               AND (?3 IS NULL OR layout_version = ?3);",
            params![card_id.to_string(), now_ms(), expected_version],
        )?;
        if changed == 0 {
            if let (Some(expected), Some(layout)) = (expected_version, self.get(card_id, false)?) {
                return Err(StoreError::ConcurrencyConflict {
                    kind: EntityKind::CardLayout,
                    id: card_id,
                    expected,
                    actual: layout.layout_version,
                });
            }
            return Ok(false);
        }
        self.write_card_mirror(card_id, None)?;
        Ok(true)
    }

    /// Physically removes the layout of one card. Returns removed row count.
    pub fn purge_for_card(&self, card_id: CardId) -> StoreResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM card_layouts WHERE card_id = ?1;",
            [card_id.to_string()],
        )?)
    }

    /// Keyset page of layouts changed after `cursor`, keyed by card id.
    pub fn list_updated_since(
        &self,
        cursor: &FeedCursor,
        limit: usize,
    ) -> StoreResult<Vec<CardLayout>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {LAYOUT_COLUMNS}
             FROM card_layouts
             WHERE updated_at > ?1
                OR (updated_at = ?1 AND card_id > ?2)
             ORDER BY updated_at ASC, card_id ASC
             LIMIT ?3;"
        ))?;
        let mut rows = stmt.query(params![
            cursor.updated_at,
            cursor.after_id_text(),
            limit as i64
        ])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_layout_row(row)?);
        }
        Ok(items)
    }

    fn current_version(&self, card_id: CardId) -> StoreResult<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT layout_version FROM card_layouts WHERE card_id = ?1;",
                [card_id.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn write_card_mirror(&self, card_id: CardId, layout: Option<&CardLayout>) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE cards
             SET has_layout = ?2,
                 layout_version = ?3,
                 layout_updated_at = ?4
             WHERE id = ?1;",
            params![
                card_id.to_string(),
                bool_to_int(layout.is_some()),
                layout.map(|value| value.layout_version),
                layout.map(|value| value.updated_at),
            ],
        )?;
        Ok(())
    }
}

fn parse_layout_row(row: &Row<'_>) -> StoreResult<CardLayout> {
    let card_text: String = row.get("card_id")?;
    let payload_text: String = row.get("payload_json")?;
    let payload = serde_json::from_str(&payload_text).map_err(|err| {
        StoreError::InvalidData(format!("invalid json in card_layouts.payload_json: {err}"))
    })?;
    Ok(CardLayout {
        card_id: parse_uuid(&card_text, "card_layouts.card_id")?,
        layout_version: row.get("layout_version")?,
        updated_at: row.get("updated_at")?,
        is_deleted: parse_bool(row.get("is_deleted")?, "card_layouts.is_deleted")?,
        payload,
    })
}
