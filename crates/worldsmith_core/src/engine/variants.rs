//! Variant groups: one root card plus ordered variant cards.
//!
//! # Invariants
//! - Depth is at most one: a variant never roots another group.
//! - Variants live in their root's container.
//! - `(variant_of_id, variant_order)` is unique among alive variants at every
//!   statement boundary, including inside a reorder.
//! - New variants take `max(variant_order over all rows of the root) + 1`.

use super::in_transaction;
use super::permute::{atomic_permute, OrdinalStore, PermuteError, PermutePhase};
use super::uniqueness::{ensure_unique, NameScope};
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::card::{Card, CardId, VariantGroup};
use crate::model::container::ContainerId;
use crate::model::name::{normalize_art_path, validate_description, validate_name};
use crate::model::EntityKind;
use crate::repo::card_repo::SqliteCardRepository;
use crate::repo::container_repo::SqliteContainerRepository;
use crate::repo::row::now_ms;
use crate::repo::{DocumentRepository, StoreError};
use log::info;
use rusqlite::{params, Connection};
use uuid::Uuid;

/// Input for [`VariantGroupManager::create_variant`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewVariant {
    pub name: String,
    pub description: String,
    pub art_path: Option<String>,
    /// Must equal the root's container when given.
    pub parent_id: Option<ContainerId>,
}

/// Creates, orders and removes variants of root cards.
pub struct VariantGroupManager<'conn> {
    conn: &'conn Connection,
    config: EngineConfig,
    cancel: CancelToken,
}

impl<'conn> VariantGroupManager<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            config: EngineConfig::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Adds one variant at the end of the root's group.
    ///
    /// # Errors
    /// - `Validation` for bad name/description/art path.
    /// - `NotFound` when the root card or its container is not alive.
    /// - `Integrity` when the root is itself a variant or the payload names
    ///   another container.
    /// - `DuplicateName` when the container already holds the name.
    pub fn create_variant(&self, root_id: CardId, draft: NewVariant) -> EngineResult<Card> {
        let name = validate_name(&draft.name, "name", self.config.max_name_chars)?;
        let description =
            validate_description(&draft.description, self.config.max_description_chars)?;
        let art_path = match draft.art_path.as_deref() {
            Some(raw) => normalize_art_path(raw)?,
            None => None,
        };

        in_transaction(self.conn, &self.cancel, |conn| {
            let cards = SqliteCardRepository::new(conn);
            let root = cards.get_alive(root_id)?;
            if root.is_variant() {
                return Err(EngineError::Integrity(format!(
                    "card {root_id} is a variant and cannot own variants"
                )));
            }
            if let Some(parent_id) = draft.parent_id {
                if parent_id != root.parent_id {
                    return Err(EngineError::Integrity(format!(
                        "variant must live in container {} of its root, got {parent_id}",
                        root.parent_id
                    )));
                }
            }
            SqliteContainerRepository::new(conn).get_alive(root.parent_id)?;
            ensure_unique(
                conn,
                &NameScope::Card {
                    parent_id: root.parent_id,
                },
                &name,
                None,
            )?;

            let mut card = Card::new(root.parent_id, name);
            card.description = description;
            card.art_path = art_path;
            card.sort_order = cards.next_sort_order(root.parent_id)?;
            card.variant_of_id = Some(root_id);
            card.variant_order = cards.next_variant_order(root_id)?;
            Ok(cards.upsert(&card, None)?)
        })
    }

    /// Reorders the root's alive variants to match `ordered_ids`.
    ///
    /// `ordered_ids[i]` receives `variant_order = i`.
    ///
    /// # Errors
    /// - `NotFound` when the root is not an alive card.
    /// - `Integrity` when `ordered_ids` is not exactly the alive variant set.
    pub fn reorder_variants(&self, root_id: CardId, ordered_ids: &[CardId]) -> EngineResult<usize> {
        let targets: Vec<(CardId, i64)> = ordered_ids
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index as i64))
            .collect();

        let written = in_transaction(self.conn, &self.cancel, |conn| {
            let root = SqliteCardRepository::new(conn).get_alive(root_id)?;
            if root.is_variant() {
                return Err(EngineError::Integrity(format!(
                    "card {root_id} is a variant, not a group root"
                )));
            }
            let mut store = VariantOrdinals {
                conn,
                root_id,
                stamp: now_ms(),
            };
            atomic_permute(&mut store, &targets).map_err(|err| match err {
                PermuteError::Mismatch(message) => {
                    EngineError::Integrity(format!("invalid variant permutation: {message}"))
                }
                PermuteError::Store(err) => err.into(),
            })
        })?;

        info!(
            "event=variant_reorder module=engine status=ok count={}",
            written
        );
        Ok(written)
    }

    /// Soft-deletes one variant; siblings keep their orders.
    ///
    /// Returns `false` when the variant was already deleted.
    pub fn delete_variant(&self, variant_id: CardId) -> EngineResult<bool> {
        in_transaction(self.conn, &self.cancel, |conn| {
            let cards = SqliteCardRepository::new(conn);
            let card = cards
                .get(variant_id, true)?
                .ok_or(EngineError::not_found(EntityKind::Card, variant_id))?;
            if !card.is_variant() {
                return Err(EngineError::Integrity(format!(
                    "card {variant_id} is not a variant"
                )));
            }
            Ok(cards.delete(variant_id, None)?)
        })
    }

    /// Resolves the group of any member: root first, then alive variants.
    pub fn get_group(&self, card_id: CardId) -> EngineResult<VariantGroup> {
        let cards = SqliteCardRepository::new(self.conn);
        let card = cards.get_alive(card_id)?;
        let root = match card.variant_of_id {
            Some(root_id) => cards.get_alive(root_id)?,
            None => card,
        };
        let variants = cards.variants_of(root.id, false)?;
        Ok(VariantGroup { root, variants })
    }
}

/// Alive variant orders of one root, as seen by [`atomic_permute`].
struct VariantOrdinals<'a> {
    conn: &'a Connection,
    root_id: CardId,
    stamp: i64,
}

impl OrdinalStore for VariantOrdinals<'_> {
    type Key = Uuid;
    type Error = StoreError;

    fn current(&mut self) -> Result<Vec<(Uuid, i64)>, StoreError> {
        Ok(SqliteCardRepository::new(self.conn)
            .variants_of(self.root_id, false)?
            .into_iter()
            .map(|card| (card.id, card.variant_order))
            .collect())
    }

    fn write(&mut self, key: Uuid, ordinal: i64, phase: PermutePhase) -> Result<(), StoreError> {
        match phase {
            PermutePhase::Park => self.conn.execute(
                "UPDATE cards SET variant_order = ?2 WHERE id = ?1;",
                params![key.to_string(), ordinal],
            )?,
            PermutePhase::Place => self.conn.execute(
                "UPDATE cards
                 SET variant_order = ?2,
                     version = version + 1,
                     updated_at = ?3
                 WHERE id = ?1;",
                params![key.to_string(), ordinal, self.stamp],
            )?,
        };
        Ok(())
    }
}
