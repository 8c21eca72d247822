//! Cascade lifecycle: soft-delete, restore and purge of worlds, container
//! subtrees and single cards.
//!
//! # Responsibility
//! - Apply one lifecycle transition uniformly to a root and its closure.
//! - Refuse restores that would break scoped name uniqueness.
//!
//! # Invariants
//! - Each public operation is one transaction; a failure leaves no row changed.
//! - Soft-delete and restore touch only rows whose state changes, bumping
//!   `version` once and stamping one shared `updated_at`.
//! - Purge removes tag links and layouts, then cards (variants first), then
//!   containers deepest first, then the world row.
//! - A restored variant whose order is now taken moves to the end of its group.
//!
//! # See also
//! - `engine::subtree` for closure resolution.

use super::in_transaction;
use super::subtree::{resolve_container_subtree, resolve_world_subtree, Subtree};
use super::uniqueness::{find_alive_conflict, NameScope};
use crate::cancel::CancelToken;
use crate::error::{EngineError, EngineResult};
use crate::model::card::{Card, CardId};
use crate::model::container::ContainerId;
use crate::model::name::name_key;
use crate::model::world::WorldId;
use crate::model::EntityKind;
use crate::repo::card_repo::SqliteCardRepository;
use crate::repo::container_repo::SqliteContainerRepository;
use crate::repo::row::now_ms;
use crate::repo::world_repo::SqliteWorldRepository;
use crate::repo::{DocumentRepository, StoreResult};
use log::{info, warn};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
enum CascadeOp {
    SoftDelete,
    Restore,
    Purge,
}

impl CascadeOp {
    fn as_str(self) -> &'static str {
        match self {
            Self::SoftDelete => "soft_delete",
            Self::Restore => "restore",
            Self::Purge => "purge",
        }
    }
}

/// Lifecycle transitions over the content tree.
pub struct CascadeManager<'conn> {
    conn: &'conn Connection,
    cancel: CancelToken,
}

impl<'conn> CascadeManager<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Soft-deletes a container and its whole subtree.
    ///
    /// Returns the number of rows that changed; 0 when already deleted.
    pub fn soft_delete_container(&self, root: ContainerId) -> EngineResult<usize> {
        self.run(CascadeOp::SoftDelete, EntityKind::Container, |conn, cancel| {
            let subtree = resolve_container_subtree(conn, root)?
                .ok_or(EngineError::not_found(EntityKind::Container, root))?;
            cancel.check()?;
            mark_deleted(conn, &subtree, now_ms(), cancel)
        })
    }

    /// Restores a container subtree.
    ///
    /// # Errors
    /// - `NotFound` when the root, its parent container or its world is not
    ///   available (the parent/world must be alive).
    /// - `CascadeConflict` when a restored name collides.
    pub fn restore_container(&self, root: ContainerId) -> EngineResult<usize> {
        self.run(CascadeOp::Restore, EntityKind::Container, |conn, cancel| {
            let containers = SqliteContainerRepository::new(conn);
            let root_row = containers
                .get(root, true)?
                .ok_or(EngineError::not_found(EntityKind::Container, root))?;
            SqliteWorldRepository::new(conn).get_alive(root_row.world_id)?;
            if let Some(parent_id) = root_row.parent_id {
                containers.get_alive(parent_id)?;
            }

            let subtree = resolve_container_subtree(conn, root)?
                .ok_or(EngineError::not_found(EntityKind::Container, root))?;
            ensure_restorable(conn, &subtree)?;
            cancel.check()?;
            mark_restored(conn, &subtree, now_ms(), cancel)
        })
    }

    /// Permanently removes a container subtree. Returns removed row count;
    /// 0 for an unknown root.
    pub fn purge_container(&self, root: ContainerId) -> EngineResult<usize> {
        self.run(CascadeOp::Purge, EntityKind::Container, |conn, cancel| {
            match resolve_container_subtree(conn, root)? {
                Some(subtree) => purge_rows(conn, &subtree, cancel),
                None => Ok(0),
            }
        })
    }

    /// Soft-deletes a world, its containers and its cards.
    pub fn soft_delete_world(&self, world_id: WorldId) -> EngineResult<usize> {
        self.run(CascadeOp::SoftDelete, EntityKind::World, |conn, cancel| {
            SqliteWorldRepository::new(conn)
                .get(world_id, true)?
                .ok_or(EngineError::not_found(EntityKind::World, world_id))?;
            let subtree = resolve_world_subtree(conn, world_id)?;
            cancel.check()?;
            let stamp = now_ms();
            let mut changed = set_deleted_flag(conn, "worlds", &[world_id], true, stamp)?;
            changed += mark_deleted(conn, &subtree, stamp, cancel)?;
            Ok(changed)
        })
    }

    /// Restores a world and everything under it.
    ///
    /// # Errors
    /// - `CascadeConflict` when another alive world took the name, or a
    ///   restored member collides.
    pub fn restore_world(&self, world_id: WorldId) -> EngineResult<usize> {
        self.run(CascadeOp::Restore, EntityKind::World, |conn, cancel| {
            let world = SqliteWorldRepository::new(conn)
                .get(world_id, true)?
                .ok_or(EngineError::not_found(EntityKind::World, world_id))?;
            if find_alive_conflict(conn, &NameScope::World, &name_key(&world.name), Some(world_id))?
                .is_some()
            {
                return Err(EngineError::CascadeConflict {
                    kind: EntityKind::World,
                    id: world_id,
                    name: world.name,
                });
            }

            let subtree = resolve_world_subtree(conn, world_id)?;
            ensure_restorable(conn, &subtree)?;
            cancel.check()?;
            let stamp = now_ms();
            let mut changed = set_deleted_flag(conn, "worlds", &[world_id], false, stamp)?;
            changed += mark_restored(conn, &subtree, stamp, cancel)?;
            Ok(changed)
        })
    }

    /// Permanently removes a world and everything under it.
    pub fn purge_world(&self, world_id: WorldId) -> EngineResult<usize> {
        self.run(CascadeOp::Purge, EntityKind::World, |conn, cancel| {
            if SqliteWorldRepository::new(conn).get(world_id, true)?.is_none() {
                return Ok(0);
            }
            let subtree = resolve_world_subtree(conn, world_id)?;
            let mut removed = purge_rows(conn, &subtree, cancel)?;
            removed += conn.execute("DELETE FROM worlds WHERE id = ?1;", [world_id.to_string()])?;
            Ok(removed)
        })
    }

    /// Soft-deletes one card; a root card takes its alive variants along.
    pub fn soft_delete_card(&self, card_id: CardId) -> EngineResult<usize> {
        self.run(CascadeOp::SoftDelete, EntityKind::Card, |conn, _| {
            let cards = SqliteCardRepository::new(conn);
            let card = cards
                .get(card_id, true)?
                .ok_or(EngineError::not_found(EntityKind::Card, card_id))?;
            let mut ids = vec![card_id];
            if !card.is_variant() {
                ids.extend(cards.variants_of(card_id, false)?.into_iter().map(|v| v.id));
            }
            Ok(set_deleted_flag(conn, "cards", &ids, true, now_ms())?)
        })
    }

    /// Restores one card without its variants.
    ///
    /// # Errors
    /// - `NotFound` when the container, or the root of a variant, is not alive.
    /// - `DuplicateName` when an alive sibling took the name meanwhile.
    pub fn restore_card(&self, card_id: CardId) -> EngineResult<usize> {
        self.run(CascadeOp::Restore, EntityKind::Card, |conn, _| {
            let cards = SqliteCardRepository::new(conn);
            let card = cards
                .get(card_id, true)?
                .ok_or(EngineError::not_found(EntityKind::Card, card_id))?;
            if !card.is_deleted {
                return Ok(0);
            }
            SqliteContainerRepository::new(conn).get_alive(card.parent_id)?;
            if let Some(root_id) = card.variant_of_id {
                cards.get_alive(root_id)?;
            }
            let scope = NameScope::Card {
                parent_id: card.parent_id,
            };
            if find_alive_conflict(conn, &scope, &name_key(&card.name), Some(card_id))?.is_some() {
                return Err(EngineError::DuplicateName {
                    kind: EntityKind::Card,
                    name: card.name,
                });
            }
            restore_card_rows(conn, &[card], now_ms())
        })
    }

    /// Permanently removes one card; a root card takes all its variants.
    pub fn purge_card(&self, card_id: CardId) -> EngineResult<usize> {
        self.run(CascadeOp::Purge, EntityKind::Card, |conn, cancel| {
            let cards = SqliteCardRepository::new(conn);
            let Some(card) = cards.get(card_id, true)? else {
                return Ok(0);
            };
            let mut ids = Vec::new();
            if !card.is_variant() {
                ids.extend(cards.variants_of(card_id, true)?.into_iter().map(|v| v.id));
            }
            ids.push(card_id);
            let subtree = Subtree {
                containers: Vec::new(),
                cards: ids,
            };
            purge_rows(conn, &subtree, cancel)
        })
    }

    fn run(
        &self,
        op: CascadeOp,
        root_kind: EntityKind,
        body: impl FnOnce(&Connection, &CancelToken) -> EngineResult<usize>,
    ) -> EngineResult<usize> {
        let started_at = Instant::now();
        let result = in_transaction(self.conn, &self.cancel, |conn| body(conn, &self.cancel));
        match &result {
            Ok(affected) => info!(
                "event=cascade module=engine status=ok op={} root_kind={} affected={} duration_ms={}",
                op.as_str(),
                root_kind,
                affected,
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=cascade module=engine status=error op={} root_kind={} duration_ms={} error_code={}",
                op.as_str(),
                root_kind,
                started_at.elapsed().as_millis(),
                err.code()
            ),
        }
        result
    }
}

fn mark_deleted(
    conn: &Connection,
    subtree: &Subtree,
    stamp: i64,
    cancel: &CancelToken,
) -> EngineResult<usize> {
    let mut changed = set_deleted_flag(conn, "containers", &subtree.containers, true, stamp)?;
    cancel.check()?;
    changed += set_deleted_flag(conn, "cards", &subtree.cards, true, stamp)?;
    Ok(changed)
}

fn mark_restored(
    conn: &Connection,
    subtree: &Subtree,
    stamp: i64,
    cancel: &CancelToken,
) -> EngineResult<usize> {
    let mut changed = set_deleted_flag(conn, "containers", &subtree.containers, false, stamp)?;
    cancel.check()?;

    let repo = SqliteCardRepository::new(conn);
    let mut deleted_cards = Vec::new();
    for id in &subtree.cards {
        if let Some(card) = repo.get(*id, true)? {
            if card.is_deleted {
                deleted_cards.push(card);
            }
        }
    }
    // Roots before variants so re-slotting sees the final group state.
    deleted_cards.sort_by_key(|card| (card.variant_of_id.is_some(), card.variant_order));
    changed += restore_card_rows(conn, &deleted_cards, stamp)?;
    Ok(changed)
}

/// Flips `is_deleted` on rows of `table` whose flag differs.
fn set_deleted_flag(
    conn: &Connection,
    table: &'static str,
    ids: &[Uuid],
    deleted: bool,
    stamp: i64,
) -> StoreResult<usize> {
    let mut stmt = conn.prepare(&format!(
        "UPDATE {table}
         SET is_deleted = ?2,
             version = version + 1,
             updated_at = ?3
         WHERE id = ?1
           AND is_deleted <> ?2;"
    ))?;
    let flag = i64::from(deleted);
    let mut changed = 0;
    for id in ids {
        changed += stmt.execute(params![id.to_string(), flag, stamp])?;
    }
    Ok(changed)
}

/// Revives deleted cards, moving variants whose order is taken to the end.
fn restore_card_rows(conn: &Connection, cards: &[Card], stamp: i64) -> EngineResult<usize> {
    let repo = SqliteCardRepository::new(conn);
    let mut changed = 0;
    for card in cards {
        let mut order = card.variant_order;
        if let Some(root_id) = card.variant_of_id {
            let taken: i64 = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM cards
                    WHERE variant_of_id = ?1
                      AND variant_order = ?2
                      AND is_deleted = 0
                      AND id <> ?3
                 );",
                params![root_id.to_string(), order, card.id.to_string()],
                |row| row.get(0),
            )?;
            if taken == 1 {
                order = repo.next_variant_order(root_id)?;
            }
        }
        changed += conn.execute(
            "UPDATE cards
             SET is_deleted = 0,
                 variant_order = ?2,
                 version = version + 1,
                 updated_at = ?3
             WHERE id = ?1
               AND is_deleted = 1;",
            params![card.id.to_string(), order, stamp],
        )?;
    }
    Ok(changed)
}

/// Rejects a restore when any member's name collides with an alive row
/// outside the subtree or with another member of the same scope.
fn ensure_restorable(conn: &Connection, subtree: &Subtree) -> EngineResult<()> {
    let members = subtree.member_ids();
    let containers = SqliteContainerRepository::new(conn);
    let cards = SqliteCardRepository::new(conn);

    let mut seen: HashMap<(NameScope, String), Uuid> = HashMap::new();
    let mut check = |scope: NameScope, id: Uuid, name: String, was_deleted: bool| -> EngineResult<()> {
        let key = name_key(&name);
        if seen.insert((scope, key.clone()), id).is_some() {
            return Err(EngineError::CascadeConflict {
                kind: scope.kind(),
                id,
                name,
            });
        }
        if was_deleted {
            if let Some(other) = find_alive_conflict(conn, &scope, &key, Some(id))? {
                if !members.contains(&other) {
                    return Err(EngineError::CascadeConflict {
                        kind: scope.kind(),
                        id,
                        name,
                    });
                }
            }
        }
        Ok(())
    };

    for id in &subtree.containers {
        if let Some(container) = containers.get(*id, true)? {
            let scope = NameScope::Container {
                world_id: container.world_id,
                parent_id: container.parent_id,
            };
            check(scope, container.id, container.name, container.is_deleted)?;
        }
    }
    for id in &subtree.cards {
        if let Some(card) = cards.get(*id, true)? {
            let scope = NameScope::Card {
                parent_id: card.parent_id,
            };
            check(scope, card.id, card.name, card.is_deleted)?;
        }
    }
    Ok(())
}

/// Deletes dependent rows, then cards, then containers deepest first.
fn purge_rows(conn: &Connection, subtree: &Subtree, cancel: &CancelToken) -> EngineResult<usize> {
    let mut removed = 0;
    {
        let mut links = conn.prepare("DELETE FROM card_tags WHERE card_id = ?1;")?;
        let mut layouts = conn.prepare("DELETE FROM card_layouts WHERE card_id = ?1;")?;
        for id in &subtree.cards {
            removed += links.execute([id.to_string()])?;
            removed += layouts.execute([id.to_string()])?;
        }
    }
    cancel.check()?;
    {
        let mut stmt = conn.prepare("DELETE FROM cards WHERE id = ?1;")?;
        for id in &subtree.cards {
            removed += stmt.execute([id.to_string()])?;
        }
    }
    cancel.check()?;
    {
        let mut stmt = conn.prepare("DELETE FROM containers WHERE id = ?1;")?;
        for id in subtree.containers.iter().rev() {
            removed += stmt.execute([id.to_string()])?;
        }
    }
    Ok(removed)
}
