//! Tag use-case service.
//!
//! # Invariants
//! - Tag names are unique among alive tags by normalized name.
//! - Soft-deleting a tag keeps its links; cards stop exposing it until the
//!   tag is restored.
//! - Purge removes links before the tag row.

use super::guard_version;
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::engine::in_transaction;
use crate::engine::uniqueness::{ensure_unique, NameScope};
use crate::error::{EngineError, EngineResult};
use crate::model::name::{name_key, validate_name};
use crate::model::tag::{Tag, TagId};
use crate::model::EntityKind;
use crate::repo::tag_repo::SqliteTagRepository;
use crate::repo::{ensure_schema_ready, DocumentRepository};
use rusqlite::Connection;
use uuid::Uuid;

/// Tag service facade.
pub struct TagService<'conn> {
    conn: &'conn Connection,
    config: EngineConfig,
    cancel: CancelToken,
}

impl<'conn> TagService<'conn> {
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

    pub fn create(&self, name: &str, color_argb: u32) -> EngineResult<Tag> {
        let name = validate_name(name, "name", self.config.max_name_chars)?;
        in_transaction(self.conn, &self.cancel, |conn| {
            ensure_unique(conn, &NameScope::Tag, &name, None)?;
            let tag = Tag {
                id: Uuid::new_v4(),
                normalized_name: name_key(&name),
                name,
                color_argb,
                version: 0,
                updated_at: 0,
                is_deleted: false,
            };
            Ok(SqliteTagRepository::new(conn).upsert(&tag, None)?)
        })
    }

    pub fn rename(&self, id: TagId, name: &str, expected_version: Option<i64>) -> EngineResult<Tag> {
        let name = validate_name(name, "name", self.config.max_name_chars)?;
        self.update(id, expected_version, |conn, tag| {
            ensure_unique(conn, &NameScope::Tag, &name, Some(tag.id))?;
            tag.name = name;
            Ok(())
        })
    }

    pub fn set_color(
        &self,
        id: TagId,
        color_argb: u32,
        expected_version: Option<i64>,
    ) -> EngineResult<Tag> {
        self.update(id, expected_version, |_, tag| {
            tag.color_argb = color_argb;
            Ok(())
        })
    }

    /// Loads one alive tag.
    pub fn get(&self, id: TagId) -> EngineResult<Tag> {
        Ok(SqliteTagRepository::new(self.conn).get_alive(id)?)
    }

    /// Finds the alive tag whose normalized name equals `name`'s.
    pub fn find_by_name(&self, name: &str) -> EngineResult<Option<Tag>> {
        Ok(SqliteTagRepository::new(self.conn).find_alive_by_key(&name_key(name))?)
    }

    /// Searches alive tags by substring (or exact key) of the normalized name.
    pub fn search(&self, query: &str, exact: bool, skip: usize, take: usize) -> EngineResult<Vec<Tag>> {
        let take = self.config.list_take(take);
        Ok(SqliteTagRepository::new(self.conn).search(&name_key(query), exact, skip, take)?)
    }

    /// Returns `false` when the tag was already deleted.
    pub fn soft_delete(&self, id: TagId, expected_version: Option<i64>) -> EngineResult<bool> {
        in_transaction(self.conn, &self.cancel, |conn| {
            let repo = SqliteTagRepository::new(conn);
            repo.get(id, true)?
                .ok_or(EngineError::not_found(EntityKind::Tag, id))?;
            Ok(repo.delete(id, expected_version)?)
        })
    }

    /// Returns `false` when the tag was already alive.
    pub fn restore(&self, id: TagId) -> EngineResult<bool> {
        in_transaction(self.conn, &self.cancel, |conn| {
            let repo = SqliteTagRepository::new(conn);
            let mut tag = repo
                .get(id, true)?
                .ok_or(EngineError::not_found(EntityKind::Tag, id))?;
            if !tag.is_deleted {
                return Ok(false);
            }
            ensure_unique(conn, &NameScope::Tag, &tag.name, Some(id))?;
            tag.is_deleted = false;
            repo.upsert(&tag, Some(tag.version))?;
            Ok(true)
        })
    }

    /// Removes the tag and all its links. Returns removed row count.
    pub fn purge(&self, id: TagId) -> EngineResult<usize> {
        in_transaction(self.conn, &self.cancel, |conn| {
            let repo = SqliteTagRepository::new(conn);
            let links = repo.delete_links_for_tag(id)?;
            Ok(links + repo.purge(id)?)
        })
    }

    fn update(
        &self,
        id: TagId,
        expected_version: Option<i64>,
        apply: impl FnOnce(&Connection, &mut Tag) -> EngineResult<()>,
    ) -> EngineResult<Tag> {
        in_transaction(self.conn, &self.cancel, |conn| {
            let repo = SqliteTagRepository::new(conn);
            let mut tag = repo.get_alive(id)?;
            let read_version = tag.version;
            apply(conn, &mut tag)?;
            Ok(repo.upsert(&tag, guard_version(expected_version, read_version))?)
        })
    }
}
