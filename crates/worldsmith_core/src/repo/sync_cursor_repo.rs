//! Persisted change-feed resume points.
//!
//! # Invariants
//! - At most one cursor per `(scope, entity)`.
//! - An empty `after_id` means "before every id at that timestamp".

use super::row::parse_uuid;
use super::{ensure_schema_ready, StoreError, StoreResult};
use crate::model::cursor::FeedCursor;
use crate::model::EntityKind;
use rusqlite::{params, Connection, OptionalExtension};

/// SQLite-backed sync cursor store.
pub struct SqliteSyncCursorRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSyncCursorRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }

    pub fn get_cursor(&self, scope: &str, entity: EntityKind) -> StoreResult<Option<FeedCursor>> {
        let stored: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT updated_at, after_id
                 FROM sync_cursors
                 WHERE scope = ?1
                   AND entity = ?2;",
                params![scope, entity.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((updated_at, after_text)) = stored else {
            return Ok(None);
        };
        let after_id = if after_text.is_empty() {
            None
        } else {
            Some(parse_uuid(&after_text, "sync_cursors.after_id")?)
        };
        Ok(Some(FeedCursor {
            updated_at,
            after_id,
        }))
    }

    pub fn set_cursor(&self, scope: &str, entity: EntityKind, cursor: &FeedCursor) -> StoreResult<()> {
        if scope.trim().is_empty() {
            return Err(StoreError::InvalidData(
                "sync cursor scope must not be blank".to_string(),
            ));
        }
        self.conn.execute(
            "INSERT INTO sync_cursors (scope, entity, updated_at, after_id)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(scope, entity) DO UPDATE SET
                updated_at = excluded.updated_at,
                after_id = excluded.after_id;",
            params![
                scope,
                entity.as_str(),
                cursor.updated_at,
                cursor.after_id_text()
            ],
        )?;
        Ok(())
    }

    /// Returns whether a cursor existed.
    pub fn clear_cursor(&self, scope: &str, entity: EntityKind) -> StoreResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM sync_cursors WHERE scope = ?1 AND entity = ?2;",
            params![scope, entity.as_str()],
        )?;
        Ok(removed > 0)
    }

    /// Lists every stored cursor of one scope.
    pub fn list_scope(&self, scope: &str) -> StoreResult<Vec<(EntityKind, FeedCursor)>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity, updated_at, after_id
             FROM sync_cursors
             WHERE scope = ?1
             ORDER BY entity ASC;",
        )?;
        let mut rows = stmt.query([scope])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let entity_text: String = row.get(0)?;
            let entity = EntityKind::parse(&entity_text).ok_or_else(|| {
                StoreError::InvalidData(format!(
                    "invalid entity `{entity_text}` in sync_cursors.entity"
                ))
            })?;
            let after_text: String = row.get(2)?;
            let after_id = if after_text.is_empty() {
                None
            } else {
                Some(parse_uuid(&after_text, "sync_cursors.after_id")?)
            };
            items.push((
                entity,
                FeedCursor {
                    updated_at: row.get(1)?,
                    after_id,
                },
            ));
        }
        Ok(items)
    }
}
