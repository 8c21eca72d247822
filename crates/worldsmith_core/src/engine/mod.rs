//! Hierarchical lifecycle engine.
//!
//! # Responsibility
//! - Scoped name uniqueness, subtree closure, cascade soft-delete / restore /
//!   purge, variant-group ordering and keyset change feeds.
//!
//! # Invariants
//! - Every mutating operation runs inside exactly one immediate transaction
//!   owned by its public entry point; helpers take `&Connection` and never
//!   open nested transactions.
//! - Cancellation is honoured between steps and before commit only.
//! - One cascade stamps every row it touches with the same `updated_at`.

pub mod cascade;
pub mod change_feed;
pub mod permute;
pub mod subtree;
pub mod trash;
pub mod uniqueness;
pub mod variants;

use crate::cancel::CancelToken;
use crate::error::EngineResult;
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Runs `op` in one immediate transaction and commits unless cancelled.
pub(crate) fn in_transaction<T>(
    conn: &Connection,
    cancel: &CancelToken,
    op: impl FnOnce(&Connection) -> EngineResult<T>,
) -> EngineResult<T> {
    cancel.check()?;
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let value = op(&tx)?;
    cancel.check()?;
    tx.commit()?;
    Ok(value)
}
