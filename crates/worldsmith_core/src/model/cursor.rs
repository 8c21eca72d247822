//! Change-feed resume point.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Composite `(updated_at, id)` cursor.
///
/// A feed resumes strictly after this point: rows with a later timestamp, or
/// the same timestamp and a greater id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeedCursor {
    pub updated_at: i64,
    /// `None` sorts before every id.
    pub after_id: Option<Uuid>,
}

impl FeedCursor {
    /// Cursor that precedes every stored row.
    pub fn start() -> Self {
        Self::default()
    }

    pub fn after(updated_at: i64, id: Uuid) -> Self {
        Self {
            updated_at,
            after_id: Some(id),
        }
    }

    /// Id bound as stored text; the empty string precedes every uuid.
    pub(crate) fn after_id_text(&self) -> String {
        self.after_id.map(|id| id.to_string()).unwrap_or_default()
    }
}
