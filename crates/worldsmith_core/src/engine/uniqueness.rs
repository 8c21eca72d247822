//! Scoped duplicate-name detection among alive rows.
//!
//! # Invariants
//! - Names compare by [`name_key`]: trimmed, whitespace-collapsed, lowercased.
//! - Soft-deleted rows never block a name.
//! - Scopes: worlds, tags and block templates are global; containers are
//!   scoped by `(world_id, parent_id)`; cards by `parent_id`.

use crate::error::{EngineError, EngineResult};
use crate::model::container::ContainerId;
use crate::model::name::name_key;
use crate::model::world::WorldId;
use crate::model::EntityKind;
use crate::repo::row::parse_uuid;
use crate::repo::StoreResult;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// Uniqueness scope of one candidate name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameScope {
    World,
    Container {
        world_id: WorldId,
        parent_id: Option<ContainerId>,
    },
    Card {
        parent_id: ContainerId,
    },
    Tag,
    BlockTemplate,
}

impl NameScope {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::World => EntityKind::World,
            Self::Container { .. } => EntityKind::Container,
            Self::Card { .. } => EntityKind::Card,
            Self::Tag => EntityKind::Tag,
            Self::BlockTemplate => EntityKind::BlockTemplate,
        }
    }
}

/// Returns the id of an alive row holding `key` in `scope`, other than `exclude`.
pub fn find_alive_conflict(
    conn: &Connection,
    scope: &NameScope,
    key: &str,
    exclude: Option<Uuid>,
) -> StoreResult<Option<Uuid>> {
    let exclude = exclude.map(|value| value.to_string());
    let found: Option<String> = match scope {
        NameScope::World => conn
            .query_row(
                "SELECT id FROM worlds
                 WHERE name_key = ?1 AND is_deleted = 0 AND id IS NOT ?2
                 LIMIT 1;",
                params![key, exclude],
                |row| row.get(0),
            )
            .optional()?,
        NameScope::Container {
            world_id,
            parent_id,
        } => conn
            .query_row(
                "SELECT id FROM containers
                 WHERE name_key = ?1 AND is_deleted = 0 AND id IS NOT ?2
                   AND world_id = ?3 AND parent_id IS ?4
                 LIMIT 1;",
                params![
                    key,
                    exclude,
                    world_id.to_string(),
                    parent_id.map(|value| value.to_string())
                ],
                |row| row.get(0),
            )
            .optional()?,
        NameScope::Card { parent_id } => conn
            .query_row(
                "SELECT id FROM cards
                 WHERE name_key = ?1 AND is_deleted = 0 AND id IS NOT ?2
                   AND parent_id = ?3
                 LIMIT 1;",
                params![key, exclude, parent_id.to_string()],
                |row| row.get(0),
            )
            .optional()?,
        NameScope::Tag => conn
            .query_row(
                "SELECT id FROM tags
                 WHERE normalized_name = ?1 AND is_deleted = 0 AND id IS NOT ?2
                 LIMIT 1;",
                params![key, exclude],
                |row| row.get(0),
            )
            .optional()?,
        NameScope::BlockTemplate => conn
            .query_row(
                "SELECT id FROM block_templates
                 WHERE name_key = ?1 AND is_deleted = 0 AND id IS NOT ?2
                 LIMIT 1;",
                params![key, exclude],
                |row| row.get(0),
            )
            .optional()?,
    };
    found
        .map(|text| parse_uuid(&text, "id"))
        .transpose()
}

/// Fails with `DuplicateName` when `name` is taken in `scope`.
///
/// `exclude` is the row being renamed or restored, if any.
pub fn ensure_unique(
    conn: &Connection,
    scope: &NameScope,
    name: &str,
    exclude: Option<Uuid>,
) -> EngineResult<()> {
    if find_alive_conflict(conn, scope, &name_key(name), exclude)?.is_some() {
        return Err(EngineError::DuplicateName {
            kind: scope.kind(),
            name: name.to_string(),
        });
    }
    Ok(())
}
