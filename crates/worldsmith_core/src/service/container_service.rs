//! Container use-case service.
//!
//! # Responsibility
//! - Create, rename, reorder and move containers inside one world.
//! - Delegate subtree lifecycle to the cascade engine.
//!
//! # Invariants
//! - A child container always carries its parent's `world_id`.
//! - Moves stay within one world and never create a parent cycle.
//! - Names are unique per `(world_id, parent_id)` among alive siblings.

use super::guard_version;
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::engine::cascade::CascadeManager;
use crate::engine::in_transaction;
use crate::engine::uniqueness::{ensure_unique, NameScope};
use crate::error::{EngineError, EngineResult};
use crate::model::container::{Container, ContainerId, ContentType};
use crate::model::name::{validate_description, validate_name, ValidationError};
use crate::model::world::WorldId;
use crate::repo::container_repo::SqliteContainerRepository;
use crate::repo::world_repo::SqliteWorldRepository;
use crate::repo::{ensure_schema_ready, DocumentRepository};
use rusqlite::Connection;
use std::collections::HashSet;
use uuid::Uuid;

/// Input for [`ContainerService::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContainer {
    /// Required for root containers; must match the parent's world otherwise.
    pub world_id: Option<WorldId>,
    pub parent_id: Option<ContainerId>,
    pub name: String,
    pub description: String,
    pub content_type: ContentType,
}

impl NewContainer {
    /// Root container of `world_id`.
    pub fn root(world_id: WorldId, name: impl Into<String>) -> Self {
        Self {
            world_id: Some(world_id),
            parent_id: None,
            name: name.into(),
            description: String::new(),
            content_type: ContentType::Cards,
        }
    }

    /// Child container of `parent_id`, inheriting its world.
    pub fn child(parent_id: ContainerId, name: impl Into<String>) -> Self {
        Self {
            world_id: None,
            parent_id: Some(parent_id),
            name: name.into(),
            description: String::new(),
            content_type: ContentType::Cards,
        }
    }
}

/// Container service facade.
pub struct ContainerService<'conn> {
    conn: &'conn Connection,
    config: EngineConfig,
    cancel: CancelToken,
}

impl<'conn> ContainerService<'conn> {
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

    /// Creates one container at the end of its sibling list.
    ///
    /// # Errors
    /// - `Validation` when neither a world nor a parent is given.
    /// - `NotFound` when the world or parent container is not alive.
    /// - `Integrity` when an explicit world disagrees with the parent's.
    /// - `DuplicateName` for a sibling with the same name key.
    pub fn create(&self, request: NewContainer) -> EngineResult<Container> {
        let name = validate_name(&request.name, "name", self.config.max_name_chars)?;
        let description =
            validate_description(&request.description, self.config.max_description_chars)?;
        if request.world_id.is_none() && request.parent_id.is_none() {
            return Err(ValidationError::InvalidInput(
                "a container needs a world or a parent container".to_string(),
            )
            .into());
        }

        in_transaction(self.conn, &self.cancel, |conn| {
            let repo = SqliteContainerRepository::new(conn);
            let world_id = match request.parent_id {
                Some(parent_id) => {
                    let parent = repo.get_alive(parent_id)?;
                    if let Some(world_id) = request.world_id {
                        if world_id != parent.world_id {
                            return Err(EngineError::Integrity(format!(
                                "container parent {parent_id} belongs to world {}, not {world_id}",
                                parent.world_id
                            )));
                        }
                    }
                    parent.world_id
                }
                None => request.world_id.ok_or_else(|| {
                    EngineError::Validation(ValidationError::InvalidInput(
                        "a root container needs a world".to_string(),
                    ))
                })?,
            };
            SqliteWorldRepository::new(conn).get_alive(world_id)?;
            ensure_unique(
                conn,
                &NameScope::Container {
                    world_id,
                    parent_id: request.parent_id,
                },
                &name,
                None,
            )?;

            let container = Container {
                id: Uuid::new_v4(),
                world_id,
                parent_id: request.parent_id,
                name,
                description,
                content_type: request.content_type,
                sort_order: repo.next_sort_order(world_id, request.parent_id)?,
                version: 0,
                updated_at: 0,
                is_deleted: false,
            };
            Ok(repo.upsert(&container, None)?)
        })
    }

    pub fn rename(
        &self,
        id: ContainerId,
        name: &str,
        expected_version: Option<i64>,
    ) -> EngineResult<Container> {
        let name = validate_name(name, "name", self.config.max_name_chars)?;
        self.update(id, expected_version, |conn, container| {
            ensure_unique(
                conn,
                &NameScope::Container {
                    world_id: container.world_id,
                    parent_id: container.parent_id,
                },
                &name,
                Some(container.id),
            )?;
            container.name = name;
            Ok(())
        })
    }

    pub fn set_description(
        &self,
        id: ContainerId,
        description: &str,
        expected_version: Option<i64>,
    ) -> EngineResult<Container> {
        let description = validate_description(description, self.config.max_description_chars)?;
        self.update(id, expected_version, |_, container| {
            container.description = description;
            Ok(())
        })
    }

    pub fn set_content_type(
        &self,
        id: ContainerId,
        content_type: ContentType,
        expected_version: Option<i64>,
    ) -> EngineResult<Container> {
        self.update(id, expected_version, |_, container| {
            container.content_type = content_type;
            Ok(())
        })
    }

    /// Sets the sibling order key.
    pub fn reorder(
        &self,
        id: ContainerId,
        sort_order: i64,
        expected_version: Option<i64>,
    ) -> EngineResult<Container> {
        if sort_order < 0 {
            return Err(ValidationError::InvalidInput(format!(
                "sort order must be >= 0, got {sort_order}"
            ))
            .into());
        }
        self.update(id, expected_version, |_, container| {
            container.sort_order = sort_order;
            Ok(())
        })
    }

    /// Moves a container under another parent of the same world, or to the
    /// world root when `new_parent_id` is `None`.
    ///
    /// # Errors
    /// - `Integrity` for cross-world moves and moves into its own subtree.
    /// - `DuplicateName` when the target scope already holds the name.
    pub fn move_to(
        &self,
        id: ContainerId,
        new_parent_id: Option<ContainerId>,
        expected_version: Option<i64>,
    ) -> EngineResult<Container> {
        self.update(id, expected_version, |conn, container| {
            let repo = SqliteContainerRepository::new(conn);
            if let Some(parent_id) = new_parent_id {
                let parent = repo.get_alive(parent_id)?;
                if parent.world_id != container.world_id {
                    return Err(EngineError::Integrity(format!(
                        "cannot move container {} across worlds",
                        container.id
                    )));
                }
                if would_create_cycle(&repo, container.id, parent_id)? {
                    return Err(EngineError::Integrity(format!(
                        "moving container {} under {parent_id} would create a cycle",
                        container.id
                    )));
                }
            }
            if new_parent_id == container.parent_id {
                return Ok(());
            }
            ensure_unique(
                conn,
                &NameScope::Container {
                    world_id: container.world_id,
                    parent_id: new_parent_id,
                },
                &container.name,
                Some(container.id),
            )?;
            container.sort_order = repo.next_sort_order(container.world_id, new_parent_id)?;
            container.parent_id = new_parent_id;
            Ok(())
        })
    }

    /// Loads one alive container.
    pub fn get(&self, id: ContainerId) -> EngineResult<Container> {
        Ok(SqliteContainerRepository::new(self.conn).get_alive(id)?)
    }

    /// Lists alive root containers of a world.
    ///
    /// Listings of a soft-deleted world or container come back empty; only
    /// purged or unknown ids are `NotFound`.
    pub fn list_roots(
        &self,
        world_id: WorldId,
        skip: usize,
        take: usize,
    ) -> EngineResult<Vec<Container>> {
        SqliteWorldRepository::new(self.conn).get_existing(world_id)?;
        let take = self.config.list_take(take);
        Ok(SqliteContainerRepository::new(self.conn)
            .list_children(world_id, None, false, skip, take)?)
    }

    /// Lists alive containers of a world at every depth, by sibling order.
    pub fn list_by_world(
        &self,
        world_id: WorldId,
        skip: usize,
        take: usize,
    ) -> EngineResult<Vec<Container>> {
        SqliteWorldRepository::new(self.conn).get_existing(world_id)?;
        let take = self.config.list_take(take);
        Ok(SqliteContainerRepository::new(self.conn).list_by_world(world_id, skip, take)?)
    }

    /// Lists alive child containers of a container.
    pub fn list_children(
        &self,
        parent_id: ContainerId,
        skip: usize,
        take: usize,
    ) -> EngineResult<Vec<Container>> {
        let repo = SqliteContainerRepository::new(self.conn);
        let parent = repo.get_existing(parent_id)?;
        let take = self.config.list_take(take);
        Ok(repo.list_children(parent.world_id, Some(parent_id), false, skip, take)?)
    }

    pub fn soft_delete(&self, id: ContainerId) -> EngineResult<usize> {
        self.cascade().soft_delete_container(id)
    }

    pub fn restore(&self, id: ContainerId) -> EngineResult<usize> {
        self.cascade().restore_container(id)
    }

    pub fn purge(&self, id: ContainerId) -> EngineResult<usize> {
        self.cascade().purge_container(id)
    }

    fn cascade(&self) -> CascadeManager<'conn> {
        CascadeManager::new(self.conn).with_cancel(self.cancel.clone())
    }

    fn update(
        &self,
        id: ContainerId,
        expected_version: Option<i64>,
        apply: impl FnOnce(&Connection, &mut Container) -> EngineResult<()>,
    ) -> EngineResult<Container> {
        in_transaction(self.conn, &self.cancel, |conn| {
            let repo = SqliteContainerRepository::new(conn);
            let mut container = repo.get_alive(id)?;
            let read_version = container.version;
            apply(conn, &mut container)?;
            Ok(repo.upsert(&container, guard_version(expected_version, read_version))?)
        })
    }
}

/// Walks up from `new_parent_id`; a cycle exists when `node_id` is reached.
fn would_create_cycle(
    repo: &SqliteContainerRepository<'_>,
    node_id: ContainerId,
    new_parent_id: ContainerId,
) -> EngineResult<bool> {
    let mut visited = HashSet::new();
    let mut cursor = Some(new_parent_id);
    while let Some(current) = cursor {
        if current == node_id {
            return Ok(true);
        }
        if !visited.insert(current) {
            return Err(EngineError::Integrity(format!(
                "existing container hierarchy contains a cycle at {current}"
            )));
        }
        cursor = repo.parent_of(current)?.flatten();
    }
    Ok(false)
}
