//! Card use-case service.
//!
//! # Responsibility
//! - Create, edit, tag, reorder and move cards.
//! - Expose variant-group operations and single-card lifecycle.
//!
//! # Invariants
//! - Names are unique per container among alive cards.
//! - A root card moves together with all its variants; variants never move
//!   alone.
//! - Tag links only ever reference alive tags at write time.

use super::guard_version;
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::engine::cascade::CascadeManager;
use crate::engine::in_transaction;
use crate::engine::uniqueness::{ensure_unique, NameScope};
use crate::engine::variants::{NewVariant, VariantGroupManager};
use crate::error::{EngineError, EngineResult};
use crate::model::card::{Card, CardId, VariantGroup};
use crate::model::container::ContainerId;
use crate::model::name::{normalize_art_path, validate_description, validate_name, ValidationError};
use crate::model::tag::TagId;
use crate::model::EntityKind;
use crate::repo::card_repo::{SqliteCardRepository, TagFilter};
use crate::repo::container_repo::SqliteContainerRepository;
use crate::repo::tag_repo::SqliteTagRepository;
use crate::repo::{ensure_schema_ready, DocumentRepository};
use rusqlite::Connection;
use std::collections::BTreeSet;

/// Input for [`CardService::create`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCard {
    pub parent_id: ContainerId,
    pub name: String,
    pub description: String,
    pub art_path: Option<String>,
}

/// Card service facade.
pub struct CardService<'conn> {
    conn: &'conn Connection,
    config: EngineConfig,
    cancel: CancelToken,
}

impl<'conn> CardService<'conn> {
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

    /// Creates one root card at the end of its container.
    pub fn create(&self, request: NewCard) -> EngineResult<Card> {
        let name = validate_name(&request.name, "name", self.config.max_name_chars)?;
        let description =
            validate_description(&request.description, self.config.max_description_chars)?;
        let art_path = match request.art_path.as_deref() {
            Some(raw) => normalize_art_path(raw)?,
            None => None,
        };

        in_transaction(self.conn, &self.cancel, |conn| {
            SqliteContainerRepository::new(conn).get_alive(request.parent_id)?;
            ensure_unique(
                conn,
                &NameScope::Card {
                    parent_id: request.parent_id,
                },
                &name,
                None,
            )?;
            let repo = SqliteCardRepository::new(conn);
            let mut card = Card::new(request.parent_id, name);
            card.description = description;
            card.art_path = art_path;
            card.sort_order = repo.next_sort_order(request.parent_id)?;
            Ok(repo.upsert(&card, None)?)
        })
    }

    pub fn rename(
        &self,
        id: CardId,
        name: &str,
        expected_version: Option<i64>,
    ) -> EngineResult<Card> {
        let name = validate_name(name, "name", self.config.max_name_chars)?;
        self.update(id, expected_version, |conn, card| {
            ensure_unique(
                conn,
                &NameScope::Card {
                    parent_id: card.parent_id,
                },
                &name,
                Some(card.id),
            )?;
            card.name = name;
            Ok(())
        })
    }

    pub fn set_description(
        &self,
        id: CardId,
        description: &str,
        expected_version: Option<i64>,
    ) -> EngineResult<Card> {
        let description = validate_description(description, self.config.max_description_chars)?;
        self.update(id, expected_version, |_, card| {
            card.description = description;
            Ok(())
        })
    }

    /// Sets or clears (blank input) the art path.
    pub fn set_art_path(
        &self,
        id: CardId,
        art_path: &str,
        expected_version: Option<i64>,
    ) -> EngineResult<Card> {
        let art_path = normalize_art_path(art_path)?;
        self.update(id, expected_version, |_, card| {
            card.art_path = art_path;
            Ok(())
        })
    }

    /// Sets the order key within the container.
    pub fn reorder(
        &self,
        id: CardId,
        sort_order: i64,
        expected_version: Option<i64>,
    ) -> EngineResult<Card> {
        if sort_order < 0 {
            return Err(ValidationError::InvalidInput(format!(
                "sort order must be >= 0, got {sort_order}"
            ))
            .into());
        }
        self.update(id, expected_version, |_, card| {
            card.sort_order = sort_order;
            Ok(())
        })
    }

    /// Moves a root card, with its variants, into another container of the
    /// same world.
    ///
    /// # Errors
    /// - `Integrity` for variants, and for cross-world targets.
    /// - `DuplicateName` when any moved card's name is taken in the target.
    pub fn move_to(
        &self,
        id: CardId,
        new_parent_id: ContainerId,
        expected_version: Option<i64>,
    ) -> EngineResult<Card> {
        in_transaction(self.conn, &self.cancel, |conn| {
            let cards = SqliteCardRepository::new(conn);
            let containers = SqliteContainerRepository::new(conn);
            let mut card = cards.get_alive(id)?;
            if card.is_variant() {
                return Err(EngineError::Integrity(format!(
                    "variant {id} moves only with its root card"
                )));
            }
            if card.parent_id == new_parent_id {
                return Ok(card);
            }
            let source = containers.get_alive(card.parent_id)?;
            let target = containers.get_alive(new_parent_id)?;
            if source.world_id != target.world_id {
                return Err(EngineError::Integrity(format!(
                    "cannot move card {id} across worlds"
                )));
            }

            let scope = NameScope::Card {
                parent_id: new_parent_id,
            };
            let variants = cards.variants_of(id, true)?;
            ensure_unique(conn, &scope, &card.name, Some(card.id))?;
            for variant in variants.iter().filter(|variant| !variant.is_deleted) {
                ensure_unique(conn, &scope, &variant.name, Some(variant.id))?;
            }

            let read_version = card.version;
            card.parent_id = new_parent_id;
            card.sort_order = cards.next_sort_order(new_parent_id)?;
            let moved = cards.upsert(&card, guard_version(expected_version, read_version))?;
            for mut variant in variants {
                let variant_version = variant.version;
                variant.parent_id = new_parent_id;
                variant.sort_order = cards.next_sort_order(new_parent_id)?;
                cards.upsert(&variant, Some(variant_version))?;
            }
            Ok(moved)
        })
    }

    /// Replaces the card's tag set. Duplicates collapse; every tag must be alive.
    pub fn set_tags(
        &self,
        id: CardId,
        tag_ids: &[TagId],
        expected_version: Option<i64>,
    ) -> EngineResult<Card> {
        let wanted: BTreeSet<TagId> = tag_ids.iter().copied().collect();
        self.update(id, expected_version, |conn, card| {
            let tags = SqliteTagRepository::new(conn);
            let alive = tags.alive_ids(tag_ids)?;
            if let Some(missing) = wanted.iter().find(|tag_id| !alive.contains(tag_id)) {
                return Err(EngineError::not_found(EntityKind::Tag, *missing));
            }
            tags.replace_card_tags(card.id, &wanted)?;
            card.tag_ids = wanted.iter().copied().collect();
            Ok(())
        })
    }

    /// Loads one alive card.
    pub fn get(&self, id: CardId) -> EngineResult<Card> {
        Ok(SqliteCardRepository::new(self.conn).get_alive(id)?)
    }

    /// Lists alive cards of a container, optionally filtered by tags.
    ///
    /// A soft-deleted container lists as empty; a purged or unknown one is
    /// `NotFound`.
    pub fn list(
        &self,
        parent_id: ContainerId,
        filter: Option<&TagFilter>,
        skip: usize,
        take: usize,
    ) -> EngineResult<Vec<Card>> {
        SqliteContainerRepository::new(self.conn).get_existing(parent_id)?;
        let take = self.config.list_take(take);
        Ok(SqliteCardRepository::new(self.conn).list_by_container(parent_id, filter, skip, take)?)
    }

    pub fn create_variant(&self, root_id: CardId, draft: NewVariant) -> EngineResult<Card> {
        self.variants().create_variant(root_id, draft)
    }

    pub fn reorder_variants(&self, root_id: CardId, ordered_ids: &[CardId]) -> EngineResult<usize> {
        self.variants().reorder_variants(root_id, ordered_ids)
    }

    pub fn delete_variant(&self, variant_id: CardId) -> EngineResult<bool> {
        self.variants().delete_variant(variant_id)
    }

    pub fn get_group(&self, card_id: CardId) -> EngineResult<VariantGroup> {
        self.variants().get_group(card_id)
    }

    pub fn soft_delete(&self, id: CardId) -> EngineResult<usize> {
        self.cascade().soft_delete_card(id)
    }

    pub fn restore(&self, id: CardId) -> EngineResult<usize> {
        self.cascade().restore_card(id)
    }

    pub fn purge(&self, id: CardId) -> EngineResult<usize> {
        self.cascade().purge_card(id)
    }

    fn variants(&self) -> VariantGroupManager<'conn> {
        VariantGroupManager::new(self.conn)
            .with_config(self.config)
            .with_cancel(self.cancel.clone())
    }

    fn cascade(&self) -> CascadeManager<'conn> {
        CascadeManager::new(self.conn).with_cancel(self.cancel.clone())
    }

    fn update(
        &self,
        id: CardId,
        expected_version: Option<i64>,
        apply: impl FnOnce(&Connection, &mut Card) -> EngineResult<()>,
    ) -> EngineResult<Card> {
        in_transaction(self.conn, &self.cancel, |conn| {
            let repo = SqliteCardRepository::new(conn);
            let mut card = repo.get_alive(id)?;
            let read_version = card.version;
            apply(conn, &mut card)?;
            Ok(repo.upsert(&card, guard_version(expected_version, read_version))?)
        })
    }
}
