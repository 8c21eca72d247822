//! Use-case services over the engine and entity store.
//!
//! # Responsibility
//! - Validate command input before any I/O.
//! - Run each command in one transaction, re-reading the target and writing
//!   back with the version read (compare-and-swap).
//! - Delegate lifecycle transitions to `engine::cascade`.

pub mod block_template_service;
pub mod card_service;
pub mod container_service;
pub mod layout_service;
pub mod tag_service;
pub mod world_service;

/// Version a write must match: the caller's expectation, else the version
/// just read inside the same transaction.
pub(crate) fn guard_version(expected: Option<i64>, read: i64) -> Option<i64> {
    Some(expected.unwrap_or(read))
}
