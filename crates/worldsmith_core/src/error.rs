//! Engine-level error taxonomy.
//!
//! # Responsibility
//! - Expose one error type to service callers covering validation, lookup,
//!   naming, concurrency, cascade and integrity failures.
//!
//! # Invariants
//! - Every error raised inside a transaction causes a full rollback; no
//!   variant describes a partially applied change.

use crate::db::DbError;
use crate::model::name::ValidationError;
use crate::model::EntityKind;
use crate::repo::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Result type used by engine and service operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed input, rejected before any I/O.
    Validation(ValidationError),
    /// Referenced entity is absent or not alive.
    NotFound { kind: EntityKind, id: Uuid },
    /// Another alive entity already uses this name in the same scope.
    DuplicateName { kind: EntityKind, name: String },
    /// Expected version is stale.
    ConcurrencyConflict {
        kind: EntityKind,
        id: Uuid,
        expected: i64,
        actual: i64,
    },
    /// Restore blocked by a naming collision.
    CascadeConflict {
        kind: EntityKind,
        id: Uuid,
        name: String,
    },
    /// Invalid variant relationship, malformed permutation, cross-world move.
    Integrity(String),
    /// Caller cancelled the operation before commit.
    Cancelled,
    /// Storage failure.
    Store(StoreError),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "validation failed: {err}"),
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::DuplicateName { kind, name } => {
                write!(f, "{kind} name already in use: `{name}`")
            }
            Self::ConcurrencyConflict {
                kind,
                id,
                expected,
                actual,
            } => write!(
                f,
                "{kind} {id} changed concurrently: expected version {expected}, found {actual}"
            ),
            Self::CascadeConflict { kind, id, name } => write!(
                f,
                "restore blocked: {kind} {id} would collide on name `{name}`"
            ),
            Self::Integrity(message) => write!(f, "integrity violation: {message}"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { kind, id } => Self::NotFound { kind, id },
            StoreError::ConcurrencyConflict {
                kind,
                id,
                expected,
                actual,
            } => Self::ConcurrencyConflict {
                kind,
                id,
                expected,
                actual,
            },
            other => Self::Store(other),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(value: DbError) -> Self {
        Self::Store(StoreError::Db(value))
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Store(StoreError::Db(DbError::Sqlite(value)))
    }
}

impl EngineError {
    pub(crate) fn not_found(kind: EntityKind, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }

    /// Stable machine-readable code for CLI callers and log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::DuplicateName { .. } => "duplicate_name",
            Self::ConcurrencyConflict { .. } => "concurrency_conflict",
            Self::CascadeConflict { .. } => "cascade_conflict",
            Self::Integrity(_) => "integrity",
            Self::Cancelled => "cancelled",
            Self::Store(_) => "store",
        }
    }
}
