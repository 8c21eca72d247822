//! Keyset-paginated change feeds for incremental sync.
//!
//! # Responsibility
//! - Page every entity family by `(updated_at ASC, id ASC)` strictly after a
//!   caller cursor.
//!
//! # Invariants
//! - Resuming from `next_cursor` never repeats or skips a row that existed
//!   when paging started, even when many rows share one timestamp.
//! - Soft-deleted rows are returned; purged rows are simply gone.
//! - `take` is clamped by [`EngineConfig::feed_take`].

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::model::block_template::BlockTemplate;
use crate::model::card::Card;
use crate::model::container::Container;
use crate::model::cursor::FeedCursor;
use crate::model::layout::CardLayout;
use crate::model::tag::Tag;
use crate::model::world::World;
use crate::repo::block_template_repo::SqliteBlockTemplateRepository;
use crate::repo::card_repo::SqliteCardRepository;
use crate::repo::container_repo::SqliteContainerRepository;
use crate::repo::layout_repo::SqliteLayoutRepository;
use crate::repo::tag_repo::SqliteTagRepository;
use crate::repo::world_repo::SqliteWorldRepository;
use crate::repo::StoreResult;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row that can be positioned in a change feed.
pub trait FeedItem {
    /// `(updated_at, id)` of this row; layouts use their card id.
    fn feed_position(&self) -> (i64, Uuid);
}

impl FeedItem for World {
    fn feed_position(&self) -> (i64, Uuid) {
        (self.updated_at, self.id)
    }
}

impl FeedItem for Container {
    fn feed_position(&self) -> (i64, Uuid) {
        (self.updated_at, self.id)
    }
}

impl FeedItem for Card {
    fn feed_position(&self) -> (i64, Uuid) {
        (self.updated_at, self.id)
    }
}

impl FeedItem for Tag {
    fn feed_position(&self) -> (i64, Uuid) {
        (self.updated_at, self.id)
    }
}

impl FeedItem for CardLayout {
    fn feed_position(&self) -> (i64, Uuid) {
        (self.updated_at, self.card_id)
    }
}

impl FeedItem for BlockTemplate {
    fn feed_position(&self) -> (i64, Uuid) {
        (self.updated_at, self.id)
    }
}

/// One page of a change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPage<T> {
    pub items: Vec<T>,
    /// Last item's position, or the request cursor for an empty page.
    pub next_cursor: FeedCursor,
    /// More rows exist after `next_cursor`.
    pub has_more: bool,
}

/// Read-only change feed over every entity family.
pub struct ChangeFeed<'conn> {
    conn: &'conn Connection,
    config: EngineConfig,
}

impl<'conn> ChangeFeed<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn worlds_since(&self, cursor: &FeedCursor, take: usize) -> EngineResult<FeedPage<World>> {
        let repo = SqliteWorldRepository::new(self.conn);
        self.page(cursor, take, |cursor, limit| repo.list_updated_since(cursor, limit))
    }

    pub fn containers_since(
        &self,
        cursor: &FeedCursor,
        take: usize,
    ) -> EngineResult<FeedPage<Container>> {
        let repo = SqliteContainerRepository::new(self.conn);
        self.page(cursor, take, |cursor, limit| repo.list_updated_since(cursor, limit))
    }

    /// Cards carry their alive tag ids.
    pub fn cards_since(&self, cursor: &FeedCursor, take: usize) -> EngineResult<FeedPage<Card>> {
        let repo = SqliteCardRepository::new(self.conn);
        self.page(cursor, take, |cursor, limit| repo.list_updated_since(cursor, limit))
    }

    pub fn tags_since(&self, cursor: &FeedCursor, take: usize) -> EngineResult<FeedPage<Tag>> {
        let repo = SqliteTagRepository::new(self.conn);
        self.page(cursor, take, |cursor, limit| repo.list_updated_since(cursor, limit))
    }

    pub fn layouts_since(
        &self,
        cursor: &FeedCursor,
        take: usize,
    ) -> EngineResult<FeedPage<CardLayout>> {
        let repo = SqliteLayoutRepository::new(self.conn);
        self.page(cursor, take, |cursor, limit| repo.list_updated_since(cursor, limit))
    }

    pub fn block_templates_since(
        &self,
        cursor: &FeedCursor,
        take: usize,
    ) -> EngineResult<FeedPage<BlockTemplate>> {
        let repo = SqliteBlockTemplateRepository::new(self.conn);
        self.page(cursor, take, |cursor, limit| repo.list_updated_since(cursor, limit))
    }

    /// Fetches one row past the page to tell whether more remain.
    fn page<T: FeedItem>(
        &self,
        cursor: &FeedCursor,
        take: usize,
        fetch: impl FnOnce(&FeedCursor, usize) -> StoreResult<Vec<T>>,
    ) -> EngineResult<FeedPage<T>> {
        let take = self.config.feed_take(take);
        let mut items = fetch(cursor, take + 1)?;
        let has_more = items.len() > take;
        items.truncate(take);

        let next_cursor = match items.last() {
            Some(last) => {
                let (updated_at, id) = last.feed_position();
                FeedCursor::after(updated_at, id)
            }
            None => *cursor,
        };
        Ok(FeedPage {
            items,
            next_cursor,
            has_more,
        })
    }
}
