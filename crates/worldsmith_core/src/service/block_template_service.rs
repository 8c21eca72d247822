//! Block template use-case service.

use super::guard_version;
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::engine::in_transaction;
use crate::engine::uniqueness::{ensure_unique, NameScope};
use crate::error::{EngineError, EngineResult};
use crate::model::block_template::{BlockTemplate, BlockTemplateId};
use crate::model::name::{validate_name, ValidationError};
use crate::model::EntityKind;
use crate::repo::block_template_repo::SqliteBlockTemplateRepository;
use crate::repo::{ensure_schema_ready, DocumentRepository};
use rusqlite::Connection;
use serde_json::Value;
use uuid::Uuid;

/// Block template service facade.
pub struct BlockTemplateService<'conn> {
    conn: &'conn Connection,
    config: EngineConfig,
    cancel: CancelToken,
}

impl<'conn> BlockTemplateService<'conn> {
    /// Creates service from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> EngineResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self {
            conn,
            config: EngineConfig::default(),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn create(&self, name: &str, payload: Value) -> EngineResult<BlockTemplate> {
        let name = validate_name(name, "name", self.config.max_name_chars)?;
        ensure_object(&payload)?;
        in_transaction(self.conn, &self.cancel, |conn| {
            ensure_unique(conn, &NameScope::BlockTemplate, &name, None)?;
            let template = BlockTemplate {
                id: Uuid::new_v4(),
                name,
                payload,
                version: 0,
                updated_at: 0,
                is_deleted: false,
            };
            Ok(SqliteBlockTemplateRepository::new(conn).upsert(&template, None)?)
        })
    }

    pub fn rename(
        &self,
        id: BlockTemplateId,
        name: &str,
        expected_version: Option<i64>,
    ) -> EngineResult<BlockTemplate> {
        let name = validate_name(name, "name", self.config.max_name_chars)?;
        self.update(id, expected_version, |conn, template| {
            ensure_unique(conn, &NameScope::BlockTemplate, &name, Some(template.id))?;
            template.name = name;
            Ok(())
        })
    }

    pub fn set_payload(
        &self,
        id: BlockTemplateId,
        payload: Value,
        expected_version: Option<i64>,
    ) -> EngineResult<BlockTemplate> {
        ensure_object(&payload)?;
        self.update(id, expected_version, |_, template| {
            template.payload = payload;
            Ok(())
        })
    }

    /// Loads one alive template.
    pub fn get(&self, id: BlockTemplateId) -> EngineResult<BlockTemplate> {
        Ok(SqliteBlockTemplateRepository::new(self.conn).get_alive(id)?)
    }

    pub fn list(&self, skip: usize, take: usize) -> EngineResult<Vec<BlockTemplate>> {
        let take = self.config.list_take(take);
        Ok(SqliteBlockTemplateRepository::new(self.conn).list_alive(skip, take)?)
    }

    pub fn soft_delete(
        &self,
        id: BlockTemplateId,
        expected_version: Option<i64>,
    ) -> EngineResult<bool> {
        in_transaction(self.conn, &self.cancel, |conn| {
            let repo = SqliteBlockTemplateRepository::new(conn);
            repo.get(id, true)?
                .ok_or(EngineError::not_found(EntityKind::BlockTemplate, id))?;
            Ok(repo.delete(id, expected_version)?)
        })
    }

    pub fn restore(&self, id: BlockTemplateId) -> EngineResult<bool> {
        in_transaction(self.conn, &self.cancel, |conn| {
            let repo = SqliteBlockTemplateRepository::new(conn);
            let mut template = repo
                .get(id, true)?
                .ok_or(EngineError::not_found(EntityKind::BlockTemplate, id))?;
            if !template.is_deleted {
                return Ok(false);
            }
            ensure_unique(conn, &NameScope::BlockTemplate, &template.name, Some(id))?;
            template.is_deleted = false;
            repo.upsert(&template, Some(template.version))?;
            Ok(true)
        })
    }

    pub fn purge(&self, id: BlockTemplateId) -> EngineResult<usize> {
        in_transaction(self.conn, &self.cancel, |conn| {
            Ok(SqliteBlockTemplateRepository::new(conn).purge(id)?)
        })
    }

    fn update(
        &self,
        id: BlockTemplateId,
        expected_version: Option<i64>,
        apply: impl FnOnce(&Connection, &mut BlockTemplate) -> EngineResult<()>,
    ) -> EngineResult<BlockTemplate> {
        in_transaction(self.conn, &self.cancel, |conn| {
            let repo = SqliteBlockTemplateRepository::new(conn);
            let mut template = repo.get_alive(id)?;
            let read_version = template.version;
            apply(conn, &mut template)?;
            Ok(repo.upsert(&template, guard_version(expected_version, read_version))?)
        })
    }
}

fn ensure_object(payload: &Value) -> EngineResult<()> {
    if !payload.is_object() {
        return Err(ValidationError::InvalidInput(
            "template payload must be a JSON object".to_string(),
        )
        .into());
    }
    Ok(())
}
