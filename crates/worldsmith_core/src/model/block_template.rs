//! Reusable named block payloads, independent of the content tree.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Stable block template identifier.
pub type BlockTemplateId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockTemplate {
    pub id: BlockTemplateId,
    pub name: String,
    /// JSON object payload.
    pub payload: Value,
    pub version: i64,
    pub updated_at: i64,
    pub is_deleted: bool,
}
