//! Versioned entity store over SQLite.
//!
//! # Responsibility
//! - Provide `get` / `upsert` / `delete` per entity with optimistic
//!   concurrency on an expected version.
//! - Keep SQL details and row parsing out of the engine and services.
//!
//! # Invariants
//! - `upsert(doc, Some(v))` commits only when the stored version is `v`;
//!   a stale `v` yields `ConcurrencyConflict`, an absent row `NotFound`.
//! - `upsert(doc, None)` inserts at version 0 or overwrites with version + 1.
//! - `delete` is a row-level soft delete; cascades live in the engine.
//! - Repositories never open transactions; callers own them.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::EntityKind;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod block_template_repo;
pub mod card_repo;
pub mod container_repo;
pub mod layout_repo;
pub(crate) mod row;
pub mod sync_cursor_repo;
pub mod tag_repo;
pub mod world_repo;

/// Result type used by store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the entity store.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Row with this id does not exist.
    NotFound { kind: EntityKind, id: Uuid },
    /// Stored version differs from the expected one.
    ConcurrencyConflict {
        kind: EntityKind,
        id: Uuid,
        expected: i64,
        actual: i64,
    },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::ConcurrencyConflict {
                kind,
                id,
                expected,
                actual,
            } => write!(
                f,
                "{kind} {id} version mismatch: expected {expected}, found {actual}"
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "store requires table `{table}`"),
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "store requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid stored data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Identity and version accessors shared by every stored document.
pub trait Document {
    const KIND: EntityKind;

    fn id(&self) -> Uuid;
    fn version(&self) -> i64;
}

/// Per-entity versioned document store.
pub trait DocumentRepository<T: Document> {
    /// Loads one document; soft-deleted rows only when `include_deleted`.
    fn get(&self, id: Uuid, include_deleted: bool) -> StoreResult<Option<T>>;
    /// Inserts or overwrites one document and returns the committed state.
    ///
    /// `version` and `updated_at` on `doc` are ignored; the store assigns them.
    fn upsert(&self, doc: &T, expected_version: Option<i64>) -> StoreResult<T>;
    /// Soft-deletes one row. Returns `false` when nothing changed.
    fn delete(&self, id: Uuid, expected_version: Option<i64>) -> StoreResult<bool>;

    /// Loads one alive document or fails with `NotFound`.
    fn get_alive(&self, id: Uuid) -> StoreResult<T> {
        self.get(id, false)?
            .ok_or(StoreError::NotFound { kind: T::KIND, id })
    }

    /// Loads one document in any deletion state; `NotFound` only once purged.
    fn get_existing(&self, id: Uuid) -> StoreResult<T> {
        self.get(id, true)?
            .ok_or(StoreError::NotFound { kind: T::KIND, id })
    }
}

const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    (
        "worlds",
        &["id", "name", "name_key", "description", "version", "updated_at", "is_deleted"],
    ),
    (
        "containers",
        &[
            "id",
            "world_id",
            "parent_id",
            "name",
            "name_key",
            "description",
            "content_type",
            "sort_order",
            "version",
            "updated_at",
            "is_deleted",
        ],
    ),
    (
        "cards",
        &[
            "id",
            "parent_id",
            "name",
            "name_key",
            "art_path",
            "sort_order",
            "has_layout",
            "layout_version",
            "layout_updated_at",
            "variant_of_id",
            "variant_order",
            "version",
            "updated_at",
            "is_deleted",
        ],
    ),
    (
        "tags",
        &["id", "name", "normalized_name", "color_argb", "version", "updated_at", "is_deleted"],
    ),
    ("card_tags", &["card_id", "tag_id"]),
    (
        "card_layouts",
        &["card_id", "layout_version", "updated_at", "is_deleted", "payload_json"],
    ),
    (
        "block_templates",
        &["id", "name", "name_key", "payload_json", "version", "updated_at", "is_deleted"],
    ),
    ("sync_cursors", &["scope", "entity", "updated_at", "after_id"]),
];

/// Verifies that `conn` is migrated to the latest schema this build knows.
///
/// # Errors
/// - `UninitializedConnection` when `user_version` differs from latest.
/// - `MissingRequiredTable` / `MissingRequiredColumn` for drifted schemas.
pub fn ensure_schema_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version = crate::db::migrations::current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for (table, columns) in REQUIRED_COLUMNS {
        if !row::table_exists(conn, table)? {
            return Err(StoreError::MissingRequiredTable(table));
        }
        for column in columns.iter() {
            if !row::table_has_column(conn, table, column)? {
                return Err(StoreError::MissingRequiredColumn { table, column });
            }
        }
    }
    Ok(())
}
