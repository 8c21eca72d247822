//! Card layout use-case service.
//!
//! # Invariants
//! - Layouts are read and written only through alive cards.
//! - Payloads are JSON objects; their content is opaque to the core.

use crate::cancel::CancelToken;
use crate::engine::in_transaction;
use crate::error::{EngineError, EngineResult};
use crate::model::card::CardId;
use crate::model::layout::CardLayout;
use crate::model::name::ValidationError;
use crate::model::EntityKind;
use crate::repo::card_repo::SqliteCardRepository;
use crate::repo::layout_repo::SqliteLayoutRepository;
use crate::repo::{ensure_schema_ready, DocumentRepository};
use rusqlite::Connection;
use serde_json::Value;

/// Layout service facade.
pub struct LayoutService<'conn> {
    conn: &'conn Connection,
    cancel: CancelToken,
}

impl<'conn> LayoutService<'conn> {
    /// Creates service from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> EngineResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self {
            conn,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Loads the alive layout of an alive card.
    pub fn get(&self, card_id: CardId) -> EngineResult<CardLayout> {
        SqliteCardRepository::new(self.conn).get_alive(card_id)?;
        SqliteLayoutRepository::new(self.conn)
            .get(card_id, false)?
            .ok_or(EngineError::not_found(EntityKind::CardLayout, card_id))
    }

    /// Stores a new payload; `expected_version` guards the layout version.
    pub fn set(
        &self,
        card_id: CardId,
        payload: Value,
        expected_version: Option<i64>,
    ) -> EngineResult<CardLayout> {
        if !payload.is_object() {
            return Err(ValidationError::InvalidInput(
                "layout payload must be a JSON object".to_string(),
            )
            .into());
        }
        in_transaction(self.conn, &self.cancel, |conn| {
            SqliteCardRepository::new(conn).get_alive(card_id)?;
            Ok(SqliteLayoutRepository::new(conn).put(card_id, &payload, expected_version)?)
        })
    }

    /// Soft-deletes the layout. Returns `false` when none was alive.
    pub fn delete(&self, card_id: CardId, expected_version: Option<i64>) -> EngineResult<bool> {
        in_transaction(self.conn, &self.cancel, |conn| {
            SqliteCardRepository::new(conn).get_alive(card_id)?;
            Ok(SqliteLayoutRepository::new(conn).delete(card_id, expected_version)?)
        })
    }
}
