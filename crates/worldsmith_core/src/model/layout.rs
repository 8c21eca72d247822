//! Card layout sub-document.
//!
//! The payload is opaque presentation data owned by clients; the core only
//! versions it and keeps the card's layout mirror fields in sync.

use super::card::CardId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardLayout {
    /// Owning card; also the layout's identity.
    pub card_id: CardId,
    /// Independent version counter, 0 on first write.
    pub layout_version: i64,
    pub updated_at: i64,
    pub is_deleted: bool,
    /// JSON object with presentation blocks.
    pub payload: Value,
}
