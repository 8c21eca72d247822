//! World use-case service.
//!
//! # Invariants
//! - World names are unique among alive worlds, compared by name key.
//! - Delete / restore / purge always cascade to containers and cards.

use super::guard_version;
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::engine::cascade::CascadeManager;
use crate::engine::in_transaction;
use crate::engine::uniqueness::{ensure_unique, NameScope};
use crate::error::EngineResult;
use crate::model::name::{validate_description, validate_name};
use crate::model::world::{World, WorldId};
use crate::repo::world_repo::SqliteWorldRepository;
use crate::repo::{ensure_schema_ready, DocumentRepository};
use rusqlite::Connection;

/// World service facade.
pub struct WorldService<'conn> {
    conn: &'conn Connection,
    config: EngineConfig,
    cancel: CancelToken,
}

impl<'conn> WorldService<'conn> {
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

    pub fn create(&self, name: &str, description: &str) -> EngineResult<World> {
        let name = validate_name(name, "name", self.config.max_name_chars)?;
        let description = validate_description(description, self.config.max_description_chars)?;
        in_transaction(self.conn, &self.cancel, |conn| {
            ensure_unique(conn, &NameScope::World, &name, None)?;
            let world = World::new(name, description);
            Ok(SqliteWorldRepository::new(conn).upsert(&world, None)?)
        })
    }

    pub fn rename(
        &self,
        id: WorldId,
        name: &str,
        expected_version: Option<i64>,
    ) -> EngineResult<World> {
        let name = validate_name(name, "name", self.config.max_name_chars)?;
        in_transaction(self.conn, &self.cancel, |conn| {
            let repo = SqliteWorldRepository::new(conn);
            let mut world = repo.get_alive(id)?;
            ensure_unique(conn, &NameScope::World, &name, Some(id))?;
            world.name = name;
            Ok(repo.upsert(&world, guard_version(expected_version, world.version))?)
        })
    }

    pub fn set_description(
        &self,
        id: WorldId,
        description: &str,
        expected_version: Option<i64>,
    ) -> EngineResult<World> {
        let description = validate_description(description, self.config.max_description_chars)?;
        in_transaction(self.conn, &self.cancel, |conn| {
            let repo = SqliteWorldRepository::new(conn);
            let mut world = repo.get_alive(id)?;
            world.description = description;
            Ok(repo.upsert(&world, guard_version(expected_version, world.version))?)
        })
    }

    /// Loads one alive world.
    pub fn get(&self, id: WorldId) -> EngineResult<World> {
        Ok(SqliteWorldRepository::new(self.conn).get_alive(id)?)
    }

    /// Lists alive worlds, most recently touched first.
    pub fn list(&self, skip: usize, take: usize) -> EngineResult<Vec<World>> {
        let take = self.config.list_take(take);
        Ok(SqliteWorldRepository::new(self.conn).list_alive(skip, take)?)
    }

    /// Searches alive worlds by name or description substring.
    pub fn search(&self, text: &str, skip: usize, take: usize) -> EngineResult<Vec<World>> {
        let take = self.config.list_take(take);
        Ok(SqliteWorldRepository::new(self.conn).search(text.trim(), skip, take)?)
    }

    pub fn soft_delete(&self, id: WorldId) -> EngineResult<usize> {
        self.cascade().soft_delete_world(id)
    }

    pub fn restore(&self, id: WorldId) -> EngineResult<usize> {
        self.cascade().restore_world(id)
    }

    pub fn purge(&self, id: WorldId) -> EngineResult<usize> {
        self.cascade().purge_world(id)
    }

    fn cascade(&self) -> CascadeManager<'conn> {
        CascadeManager::new(self.conn).with_cancel(self.cancel.clone())
    }
}
