//! Tag and card-tag link persistence.
//!
//! # Invariants
//! - `normalized_name` is rewritten from `name` on every upsert.
//! - Links are a set: `(card_id, tag_id)` is the primary key.
//! - Links to soft-deleted tags stay stored but are hidden from card reads.

use super::row::{
    bool_to_int, escape_like, now_ms, parse_bool, parse_uuid, soft_delete_row,
    stale_write_error,
};
use super::{ensure_schema_ready, Document, DocumentRepository, StoreError, StoreResult};
use crate::model::card::CardId;
use crate::model::cursor::FeedCursor;
use crate::model::name::name_key;
use crate::model::tag::{Tag, TagId};
use crate::model::EntityKind;
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;

const TAG_COLUMNS: &str = "id, name, normalized_name, color_argb, version, updated_at, is_deleted";

impl Document for Tag {
    const KIND: EntityKind = EntityKind::Tag;

    fn id(&self) -> TagId {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

/// SQLite-backed tag store.
pub struct SqliteTagRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTagRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self::new(conn))
    }

    pub(crate) fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Finds the alive tag whose normalized name equals `key`.
    pub fn find_alive_by_key(&self, key: &str) -> StoreResult<Option<Tag>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TAG_COLUMNS}
             FROM tags
             WHERE normalized_name = ?1
               AND is_deleted = 0;"
        ))?;
        let mut rows = stmt.query([key])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_tag_row(row)?));
        }
        Ok(None)
    }

    /// Searches alive tags by normalized name, exact or substring.
    pub fn search(&self, key: &str, exact: bool, skip: usize, take: usize) -> StoreResult<Vec<Tag>> {
        let pattern = if exact {
            key.to_string()
        } else {
            format!("%{}%", escape_like(key))
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TAG_COLUMNS}
             FROM tags
             WHERE is_deleted = 0
               AND ((?2 = 1 AND normalized_name = ?1)
                 OR (?2 = 0 AND normalized_name LIKE ?1 ESCAPE '\\'))
             ORDER BY normalized_name ASC, id ASC
             LIMIT ?3 OFFSET ?4;"
        ))?;
        let mut rows = stmt.query(params![pattern, bool_to_int(exact), take as i64, skip as i64])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_tag_row(row)?);
        }
        Ok(items)
    }

    /// Returns the subset of `ids` that are alive tags.
    pub fn alive_ids(&self, ids: &[TagId]) -> StoreResult<BTreeSet<TagId>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT EXISTS(SELECT 1 FROM tags WHERE id = ?1 AND is_deleted = 0);",
        )?;
        let mut alive = BTreeSet::new();
        for id in ids {
            let exists: i64 = stmt.query_row([id.to_string()], |row| row.get(0))?;
            if exists == 1 {
                alive.insert(*id);
            }
        }
        Ok(alive)
    }

    /// Replaces every link of one card with `tag_ids`.
    pub fn replace_card_tags(&self, card_id: CardId, tag_ids: &BTreeSet<TagId>) -> StoreResult<()> {
        self.conn.execute(
            "DELETE FROM card_tags WHERE card_id = ?1;",
            [card_id.to_string()],
        )?;
        let mut stmt = self
            .conn
            .prepare_cached("INSERT INTO card_tags (card_id, tag_id) VALUES (?1, ?2);")?;
        for tag_id in tag_ids {
            stmt.execute(params![card_id.to_string(), tag_id.to_string()])?;
        }
        Ok(())
    }

    /// Removes every link of one tag. Returns removed row count.
    pub fn delete_links_for_tag(&self, tag_id: TagId) -> StoreResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM card_tags WHERE tag_id = ?1;", [tag_id.to_string()])?)
    }

    /// Physically removes one tag row. Links must be removed first.
    pub fn purge(&self, tag_id: TagId) -> StoreResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM tags WHERE id = ?1;", [tag_id.to_string()])?)
    }

    /// Keyset page of tags changed after `cursor`, deleted rows included.
    pub fn list_updated_since(&self, cursor: &FeedCursor, limit: usize) -> StoreResult<Vec<Tag>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TAG_COLUMNS}
             FROM tags
             WHERE updated_at > ?1
                OR (updated_at = ?1 AND id > ?2)
             ORDER BY updated_at ASC, id ASC
             LIMIT ?3;"
        ))?;
        let mut rows = stmt.query(params![
            cursor.updated_at,
            cursor.after_id_text(),
            limit as i64
        ])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_tag_row(row)?);
        }
        Ok(items)
    }
}

impl DocumentRepository<Tag> for SqliteTagRepository<'_> {
    fn get(&self, id: TagId, include_deleted: bool) -> StoreResult<Option<Tag>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TAG_COLUMNS}
             FROM tags
             WHERE id = ?1
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;
        let mut rows = stmt.query(params![id.to_string(), bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_tag_row(row)?));
        }
        Ok(None)
    }

    fn upsert(&self, doc: &Tag, expected_version: Option<i64>) -> StoreResult<Tag> {
        let now = now_ms();
        let key = name_key(&doc.name);
        let color = i64::from(doc.color_argb);
        let changed = self.conn.execute(
            "UPDATE tags
             SET name = ?2,
                 normalized_name = ?3,
                 color_argb = ?4,
                 is_deleted = ?5,
                 version = version + 1,
                 updated_at = ?6
             WHERE id = ?1
               AND (?7 IS NULL OR version = ?7);",
            params![
                doc.id.to_string(),
                doc.name,
                key,
                color,
                bool_to_int(doc.is_deleted),
                now,
                expected_version,
            ],
        )?;

        if changed == 0 {
            if let Some(expected) = expected_version {
                return Err(stale_write_error(
                    self.conn,
                    "tags",
                    EntityKind::Tag,
                    doc.id,
                    expected,
                ));
            }
            self.conn.execute(
                "INSERT INTO tags (id, name, normalized_name, color_argb, version, updated_at, is_deleted)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6);",
                params![
                    doc.id.to_string(),
                    doc.name,
                    key,
                    color,
                    now,
                    bool_to_int(doc.is_deleted),
                ],
            )?;
        }

        self.get(doc.id, true)?.ok_or(StoreError::NotFound {
            kind: EntityKind::Tag,
            id: doc.id,
        })
    }

    fn delete(&self, id: TagId, expected_version: Option<i64>) -> StoreResult<bool> {
        soft_delete_row(self.conn, "tags", EntityKind::Tag, id, expected_version)
    }
}

fn parse_tag_row(row: &Row<'_>) -> StoreResult<Tag> {
    let id_text: String = row.get("id")?;
    let color: i64 = row.get("color_argb")?;
    let color_argb = u32::try_from(color).map_err(|_| {
        StoreError::InvalidData(format!("invalid colour `{color}` in tags.color_argb"))
    })?;
    Ok(Tag {
        id: parse_uuid(&id_text, "tags.id")?,
        name: row.get("name")?,
        normalized_name: row.get("normalized_name")?,
        color_argb,
        version: row.get("version")?,
        updated_at: row.get("updated_at")?,
        is_deleted: parse_bool(row.get("is_deleted")?, "tags.is_deleted")?,
    })
}
