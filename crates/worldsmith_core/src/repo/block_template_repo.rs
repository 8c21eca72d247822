//! Block template persistence.

use super::row::{
    bool_to_int, now_ms, parse_bool, parse_uuid, soft_delete_row, stale_write_error,
};
use super::{ensure_schema_ready, Document, DocumentRepository, StoreError, StoreResult};
use crate::model::block_template::{BlockTemplate, BlockTemplateId};
use crate::model::cursor::FeedCursor;
use crate::model::name::name_key;
use crate::model::EntityKind;
use rusqlite::{params, Connection, Row};

const TEMPLATE_COLUMNS: &str = "id, name, payload_json, version, updated_at, is_deleted";

impl Document for BlockTemplate {
    const KIND: EntityKind = EntityKind::BlockTemplate;

    fn id(&self) -> BlockTemplateId {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

/// SQLite-backed block template store.
pub struct SqliteBlockTemplateRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBlockTemplateRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self::new(conn))
    }

    pub(crate) fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Lists alive templates by name key.
    pub fn list_alive(&self, skip: usize, take: usize) -> StoreResult<Vec<BlockTemplate>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS}
             FROM block_templates
             WHERE is_deleted = 0
             ORDER BY name_key ASC, id ASC
             LIMIT ?1 OFFSET ?2;"
        ))?;
        let mut rows = stmt.query(params![take as i64, skip as i64])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_template_row(row)?);
        }
        Ok(items)
    }

    /// Physically removes one template row.
    pub fn purge(&self, id: BlockTemplateId) -> StoreResult<usize> {
        Ok(self.conn.execute(
            "DELETE FROM block_templates WHERE id = ?1;",
            [id.to_string()],
        )?)
    }

    /// Keyset page of templates changed after `cursor`, deleted rows included.
    pub fn list_updated_since(
        &self,
        cursor: &FeedCursor,
        limit: usize,
    ) -> StoreResult<Vec<BlockTemplate>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS}
             FROM block_templates
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
            items.push(parse_template_row(row)?);
        }
        Ok(items)
    }
}

impl DocumentRepository<BlockTemplate> for SqliteBlockTemplateRepository<'_> {
    fn get(&self, id: BlockTemplateId, include_deleted: bool) -> StoreResult<Option<BlockTemplate>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS}
             FROM block_templates
             WHERE id = ?1
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;
        let mut rows = stmt.query(params![id.to_string(), bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_template_row(row)?));
        }
        Ok(None)
    }

    fn upsert(
        &self,
        doc: &BlockTemplate,
        expected_version: Option<i64>,
    ) -> StoreResult<BlockTemplate> {
        let payload_json = serde_json::to_string(&doc.payload)
            .map_err(|err| StoreError::InvalidData(format!("template payload: {err}")))?;
        let now = now_ms();
        let key = name_key(&doc.name);
        let changed = self.conn.execute(
            "UPDATE block_templates
             SET name = ?2,
                 name_key = ?3,
                 payload_json = ?4,
                 is_deleted = ?5,
                 version = version + 1,
                 updated_at = ?6
             WHERE id = ?1
               AND (?7 IS NULL OR version = ?7);",
            params![
                doc.id.to_string(),
                doc.name,
                key,
                payload_json,
                bool_to_int(doc.is_deleted),
                now,
                expected_version,
            ],
        )?;

        if changed == 0 {
            if let Some(expected) = expected_version {
                return Err(stale_write_error(
                    self.conn,
                    "block_templates",
                    EntityKind::BlockTemplate,
                    doc.id,
                    expected,
                ));
            }
            self.conn.execute(
                "INSERT INTO block_templates (id, name, name_key, payload_json, version, updated_at, is_deleted)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6);",
                params![
                    doc.id.to_string(),
                    doc.name,
                    key,
                    payload_json,
                    now,
                    bool_to_int(doc.is_deleted),
                ],
            )?;
        }

        self.get(doc.id, true)?.ok_or(StoreError::NotFound {
            kind: EntityKind::BlockTemplate,
            id: doc.id,
        })
    }

    fn delete(&self, id: BlockTemplateId, expected_version: Option<i64>) -> StoreResult<bool> {
        soft_delete_row(
            self.conn,
            "block_templates",
            EntityKind::BlockTemplate,
            id,
            expected_version,
        )
    }
}

fn parse_template_row(row: &Row<'_>) -> StoreResult<BlockTemplate> {
    let id_text: String = row.get("id")?;
    let payload_text: String = row.get("payload_json")?;
    let payload = serde_json::from_str(&payload_text).map_err(|err| {
        StoreError::InvalidData(format!("invalid json in block_templates.payload_json: {err}"))
    })?;
    Ok(BlockTemplate {
        id: parse_uuid(&id_text, "block_templates.id")?,
        name: row.get("name")?,
        payload,
        version: row.get("version")?,
        updated_at: row.get("updated_at")?,
        is_deleted: parse_bool(row.get("is_deleted")?, "block_templates.is_deleted")?,
    })
}
