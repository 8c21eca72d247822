//! Card persistence, including variant-group queries.
//!
//! # Invariants
//! - Card documents expose only links to alive tags, sorted by tag id.
//! - Upsert never touches tag links or layout mirror columns.
//! - Variant listing order: `variant_order ASC, id ASC`.

use super::row::{
    bool_to_int, now_ms, parse_bool, parse_optional_uuid, parse_uuid, soft_delete_row,
    stale_write_error,
};
use super::{ensure_schema_ready, Document, DocumentRepository, StoreError, StoreResult};
use crate::model::card::{Card, CardId};
use crate::model::container::ContainerId;
use crate::model::cursor::FeedCursor;
use crate::model::name::name_key;
use crate::model::tag::{TagId, TagMatch};
use crate::model::EntityKind;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const CARD_COLUMNS: &str = "id, parent_id, name, description, art_path, sort_order, \
     has_layout, layout_version, layout_updated_at, variant_of_id, variant_order, \
     version, updated_at, is_deleted";

impl Document for Card {
    const KIND: EntityKind = EntityKind::Card;

    fn id(&self) -> CardId {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

/// Optional tag filter for card listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    pub tag_ids: Vec<TagId>,
    pub mode: TagMatch,
}

/// SQLite-backed card store.
pub struct SqliteCardRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCardRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self::new(conn))
    }

    pub(crate) fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Lists alive cards of one container in sibling order.
    ///
    /// An empty filter tag list matches nothing in `Any` mode and everything
    /// in `All` mode.
    pub fn list_by_container(
        &self,
        parent_id: ContainerId,
        filter: Option<&TagFilter>,
        skip: usize,
        take: usize,
    ) -> StoreResult<Vec<Card>> {
        let mut values = vec![
            Value::Text(parent_id.to_string()),
            Value::Integer(take as i64),
            Value::Integer(skip as i64),
        ];
        let tag_clause = match filter {
            None => String::new(),
            Some(filter) if filter.tag_ids.is_empty() => match filter.mode {
                TagMatch::Any => "AND 0".to_string(),
                TagMatch::All => String::new(),
            },
            Some(filter) => {
                let mut placeholders = Vec::with_capacity(filter.tag_ids.len());
                for tag_id in &filter.tag_ids {
                    values.push(Value::Text(tag_id.to_string()));
                    placeholders.push(format!("?{}", values.len()));
                }
                let wanted = match filter.mode {
                    TagMatch::Any => "> 0".to_string(),
                    TagMatch::All => format!("= {}", distinct_count(&filter.tag_ids)),
                };
                format!(
                    "AND (
                        SELECT COUNT(DISTINCT ct.tag_id)
                        FROM card_tags ct
                        INNER JOIN tags t ON t.id = ct.tag_id AND t.is_deleted = 0
                        WHERE ct.card_id = cards.id
                          AND ct.tag_id IN ({})
                     ) {wanted}",
                    placeholders.join(", ")
                )
            }
        };

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CARD_COLUMNS}
             FROM cards
             WHERE parent_id = ?1
               AND is_deleted = 0
               {tag_clause}
             ORDER BY sort_order ASC, id ASC
             LIMIT ?2 OFFSET ?3;"
        ))?;
        let mut rows = stmt.query(params_from_iter(values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_card_row(row)?);
        }
        self.attach_tags(items)
    }

    /// Next free sibling order among alive cards of a container.
    pub fn next_sort_order(&self, parent_id: ContainerId) -> StoreResult<i64> {
        let next = self.conn.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1
             FROM cards
             WHERE parent_id = ?1
               AND is_deleted = 0;",
            [parent_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    /// Variants of `root_id` in group order.
    pub fn variants_of(&self, root_id: CardId, include_deleted: bool) -> StoreResult<Vec<Card>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CARD_COLUMNS}
             FROM cards
             WHERE variant_of_id = ?1
               AND (?2 = 1 OR is_deleted = 0)
             ORDER BY variant_order ASC, id ASC;"
        ))?;
        let mut rows = stmt.query(params![root_id.to_string(), bool_to_int(include_deleted)])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_card_row(row)?);
        }
        self.attach_tags(items)
    }

    /// `max(variant_order) + 1` over every variant row of the root, deleted
    /// ones included, or 0 for an empty group.
    pub fn next_variant_order(&self, root_id: CardId) -> StoreResult<i64> {
        let next = self.conn.query_row(
            "SELECT COALESCE(MAX(variant_order), -1) + 1
             FROM cards
             WHERE variant_of_id = ?1;",
            [root_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    /// Keyset page of cards changed after `cursor`, deleted rows included.
    pub fn list_updated_since(&self, cursor: &FeedCursor, limit: usize) -> StoreResult<Vec<Card>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CARD_COLUMNS}
             FROM cards
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
            items.push(parse_card_row(row)?);
        }
        self.attach_tags(items)
    }

    fn attach_tags(&self, mut cards: Vec<Card>) -> StoreResult<Vec<Card>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT ct.tag_id
             FROM card_tags ct
             INNER JOIN tags t ON t.id = ct.tag_id
             WHERE ct.card_id = ?1
               AND t.is_deleted = 0
             ORDER BY ct.tag_id ASC;",
        )?;
        for card in &mut cards {
            let mut rows = stmt.query([card.id.to_string()])?;
            while let Some(row) = rows.next()? {
                let tag_text: String = row.get(0)?;
                card.tag_ids.push(parse_uuid(&tag_text, "card_tags.tag_id")?);
            }
        }
        Ok(cards)
    }
}

impl DocumentRepository<Card> for SqliteCardRepository<'_> {
    fn get(&self, id: CardId, include_deleted: bool) -> StoreResult<Option<Card>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CARD_COLUMNS}
             FROM cards
             WHERE id = ?1
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;
        let mut rows = stmt.query(params![id.to_string(), bool_to_int(include_deleted)])?;
        let card = match rows.next()? {
            Some(row) => parse_card_row(row)?,
            None => return Ok(None),
        };
        Ok(self.attach_tags(vec![card])?.pop())
    }

    fn upsert(&self, doc: &Card, expected_version: Option<i64>) -> StoreResult<Card> {
        let now = now_ms();
        let key = name_key(&doc.name);
        let variant_of_id = doc.variant_of_id.map(|value| value.to_string());
        let changed = self.conn.execute(
            "UPDATE cards
             SET parent_id = ?2,
                 name = ?3,
                 name_key = ?4,
                 description = ?5,
                 art_path = ?6,
                 sort_order = ?7,
                 variant_of_id = ?8,
                 variant_order = ?9,
                 is_deleted = ?10,
                 version = version + 1,
                 updated_at = ?11
             WHERE id = ?1
               AND (?12 IS NULL OR version = ?12);",
            params![
                doc.id.to_string(),
                doc.parent_id.to_string(),
                doc.name,
                key,
                doc.description,
                doc.art_path,
                doc.sort_order,
                variant_of_id,
                doc.variant_order,
                bool_to_int(doc.is_deleted),
                now,
                expected_version,
            ],
        )?;

        if changed == 0 {
            if let Some(expected) = expected_version {
                return Err(stale_write_error(
                    self.conn,
                    "cards",
                    EntityKind::Card,
                    doc.id,
                    expected,
                ));
            }
            self.conn.execute(
                "INSERT INTO cards (
                    id,
                    parent_id,
                    name,
                    name_key,
                    description,
                    art_path,
                    sort_order,
                    variant_of_id,
                    variant_order,
                    version,
                    updated_at,
                    is_deleted
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?11);",
                params![
                    doc.id.to_string(),
                    doc.parent_id.to_string(),
                    doc.name,
                    key,
                    doc.description,
                    doc.art_path,
                    doc.sort_order,
                    variant_of_id,
                    doc.variant_order,
                    now,
                    bool_to_int(doc.is_deleted),
                ],
            )?;
        }

        self.get(doc.id, true)?.ok_or(StoreError::NotFound {
            kind: EntityKind::Card,
            id: doc.id,
        })
    }

    fn delete(&self, id: CardId, expected_version: Option<i64>) -> StoreResult<bool> {
        soft_delete_row(self.conn, "cards", EntityKind::Card, id, expected_version)
    }
}

fn distinct_count(ids: &[TagId]) -> usize {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len()
}

fn parse_card_row(row: &Row<'_>) -> StoreResult<Card> {
    let id_text: String = row.get("id")?;
    let parent_text: String = row.get("parent_id")?;
    Ok(Card {
        id: parse_uuid(&id_text, "cards.id")?,
        parent_id: parse_uuid(&parent_text, "cards.parent_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        art_path: row.get("art_path")?,
        sort_order: row.get("sort_order")?,
        tag_ids: Vec::new(),
        has_layout: parse_bool(row.get("has_layout")?, "cards.has_layout")?,
        layout_version: row.get("layout_version")?,
        layout_updated_at: row.get("layout_updated_at")?,
        variant_of_id: parse_optional_uuid(row.get("variant_of_id")?, "cards.variant_of_id")?,
        variant_order: row.get("variant_order")?,
        version: row.get("version")?,
        updated_at: row.get("updated_at")?,
        is_deleted: parse_bool(row.get("is_deleted")?, "cards.is_deleted")?,
    })
}
