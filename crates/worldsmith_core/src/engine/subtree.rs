//! Container subtree closure.
//!
//! # Responsibility
//! - Resolve every container reachable from a root through `parent_id`
//!   edges, plus every card living in those containers.
//!
//! # Invariants
//! - Traversal is iterative over a parent -> children index built once per
//!   call; depth is unbounded and a visited set stops on corrupt cycles.
//! - Deleted members are included; callers decide what to touch.
//! - `containers` is in breadth-first order (root first); `cards` lists
//!   variants before root cards.

use crate::model::card::CardId;
use crate::model::container::ContainerId;
use crate::model::world::WorldId;
use crate::repo::row::{parse_optional_uuid, parse_uuid};
use crate::repo::StoreResult;
use rusqlite::{Connection, OptionalExtension};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// Closure of one cascade root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subtree {
    pub containers: Vec<ContainerId>,
    pub cards: Vec<CardId>,
}

impl Subtree {
    pub fn len(&self) -> usize {
        self.containers.len() + self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.cards.is_empty()
    }

    /// Every member id, containers then cards.
    pub fn member_ids(&self) -> HashSet<Uuid> {
        self.containers
            .iter()
            .chain(self.cards.iter())
            .copied()
            .collect()
    }
}

/// Breadth-first closure over a parent -> children index.
pub fn collect_closure(children: &HashMap<Uuid, Vec<Uuid>>, roots: &[Uuid]) -> Vec<Uuid> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut queue: VecDeque<Uuid> = roots.iter().copied().collect();
    while let Some(current) = queue.pop_front() {
        if !visited.insert(current) {
            continue;
        }
        order.push(current);
        if let Some(next) = children.get(&current) {
            queue.extend(next.iter().copied());
        }
    }
    order
}

/// Resolves the subtree rooted at one container, or `None` if it does not exist.
pub fn resolve_container_subtree(
    conn: &Connection,
    root: ContainerId,
) -> StoreResult<Option<Subtree>> {
    let world_text: Option<String> = conn
        .query_row(
            "SELECT world_id FROM containers WHERE id = ?1;",
            [root.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    let Some(world_text) = world_text else {
        return Ok(None);
    };
    let world_id = parse_uuid(&world_text, "containers.world_id")?;

    let (children, _) = load_container_edges(conn, world_id)?;
    let containers = collect_closure(&children, &[root]);
    let cards = load_cards_in(conn, world_id, &containers)?;
    Ok(Some(Subtree { containers, cards }))
}

/// Resolves every container and card of one world.
pub fn resolve_world_subtree(conn: &Connection, world_id: WorldId) -> StoreResult<Subtree> {
    let (children, all) = load_container_edges(conn, world_id)?;
    let roots = children.get(&Uuid::nil()).cloned().unwrap_or_default();
    let mut containers = collect_closure(&children, &roots);
    if containers.len() < all.len() {
        let reached: HashSet<Uuid> = containers.iter().copied().collect();
        containers.extend(all.into_iter().filter(|id| !reached.contains(id)));
    }
    let cards = load_cards_in(conn, world_id, &containers)?;
    Ok(Subtree { containers, cards })
}

/// Returns the children index (world roots under `Uuid::nil()`) and every
/// container id of the world.
fn load_container_edges(
    conn: &Connection,
    world_id: WorldId,
) -> StoreResult<(HashMap<Uuid, Vec<Uuid>>, Vec<Uuid>)> {
    let mut stmt = conn.prepare(
        "SELECT id, parent_id
         FROM containers
         WHERE world_id = ?1
         ORDER BY sort_order ASC, id ASC;",
    )?;
    let mut rows = stmt.query([world_id.to_string()])?;
    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let mut all = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get(0)?;
        let id = parse_uuid(&id_text, "containers.id")?;
        let parent = parse_optional_uuid(row.get(1)?, "containers.parent_id")?;
        children.entry(parent.unwrap_or_else(Uuid::nil)).or_default().push(id);
        all.push(id);
    }
    Ok((children, all))
}

fn load_cards_in(
    conn: &Connection,
    world_id: WorldId,
    containers: &[ContainerId],
) -> StoreResult<Vec<CardId>> {
    let wanted: HashSet<ContainerId> = containers.iter().copied().collect();
    let mut stmt = conn.prepare(
        "SELECT c.id, c.parent_id
         FROM cards c
         INNER JOIN containers k ON k.id = c.parent_id
         WHERE k.world_id = ?1
         ORDER BY (c.variant_of_id IS NULL) ASC, c.id ASC;",
    )?;
    let mut rows = stmt.query([world_id.to_string()])?;
    let mut cards = Vec::new();
    while let Some(row) = rows.next()? {
        let parent_text: String = row.get(1)?;
        if !wanted.contains(&parse_uuid(&parent_text, "cards.parent_id")?) {
            continue;
        }
        let id_text: String = row.get(0)?;
        cards.push(parse_uuid(&id_text, "cards.id")?);
    }
    Ok(cards)
}
