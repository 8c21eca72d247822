//! Core domain logic for Worldsmith.
//! This crate is the single source of truth for world/container/card
//! lifecycle invariants.

pub mod cancel;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use engine::cascade::CascadeManager;
pub use engine::change_feed::{ChangeFeed, FeedItem, FeedPage};
pub use engine::trash::{list_trash, TrashItem};
pub use engine::uniqueness::NameScope;
pub use engine::variants::{NewVariant, VariantGroupManager};
pub use error::{EngineError, EngineResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::block_template::{BlockTemplate, BlockTemplateId};
pub use model::card::{Card, CardId, VariantGroup};
pub use model::container::{Container, ContainerId, ContentType};
pub use model::cursor::FeedCursor;
pub use model::layout::CardLayout;
pub use model::name::ValidationError;
pub use model::tag::{Tag, TagId, TagMatch};
pub use model::world::{World, WorldId};
pub use model::EntityKind;
pub use repo::card_repo::TagFilter;
pub use repo::sync_cursor_repo::SqliteSyncCursorRepository;
pub use repo::{Document, DocumentRepository, StoreError, StoreResult};
pub use service::block_template_service::BlockTemplateService;
pub use service::card_service::{CardService, NewCard};
pub use service::container_service::{ContainerService, NewContainer};
pub use service::layout_service::LayoutService;
pub use service::tag_service::TagService;
pub use service::world_service::WorldService;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
