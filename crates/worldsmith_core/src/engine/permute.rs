//! Two-phase permutation of unique ordinals.
//!
//! # Responsibility
//! - Reassign a set of unique, non-negative ordinals to a new permutation
//!   without ever holding two keys on the same value.
//!
//! # Invariants
//! - Phase 1 parks every key on `-(old + 1)`: distinct, negative, disjoint
//!   from every target.
//! - Phase 2 writes targets; targets are distinct, so no collision either.
//! - Validation happens before the first write; a rejected permutation
//!   writes nothing.

use std::collections::HashSet;
use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;

/// Which phase a write belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermutePhase {
    /// Temporary negative value.
    Park,
    /// Final target value.
    Place,
}

/// Storage holding one unique ordinal per key.
pub trait OrdinalStore {
    type Key: Copy + Eq + Hash + Debug;
    type Error;

    /// Current `(key, ordinal)` pairs of the whole set.
    fn current(&mut self) -> Result<Vec<(Self::Key, i64)>, Self::Error>;
    /// Writes one ordinal.
    fn write(&mut self, key: Self::Key, ordinal: i64, phase: PermutePhase)
        -> Result<(), Self::Error>;
}

/// Failure of [`atomic_permute`].
#[derive(Debug, PartialEq, Eq)]
pub enum PermuteError<E> {
    /// Requested permutation does not match the stored set.
    Mismatch(String),
    /// Storage failure.
    Store(E),
}

impl<E: Display> Display for PermuteError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mismatch(message) => write!(f, "{message}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

/// Applies `targets` to `store` in two phases and returns the key count.
///
/// # Errors
/// - `Mismatch` when `targets` is not exactly the stored key set, repeats a
///   key, repeats an ordinal, or uses a negative ordinal.
pub fn atomic_permute<S: OrdinalStore>(
    store: &mut S,
    targets: &[(S::Key, i64)],
) -> Result<usize, PermuteError<S::Error>> {
    let current = store.current().map_err(PermuteError::Store)?;

    let mut target_keys = HashSet::with_capacity(targets.len());
    let mut target_ordinals = HashSet::with_capacity(targets.len());
    for (key, ordinal) in targets {
        if !target_keys.insert(*key) {
            return Err(PermuteError::Mismatch(format!("key {key:?} listed twice")));
        }
        if *ordinal < 0 {
            return Err(PermuteError::Mismatch(format!(
                "negative target ordinal {ordinal} for {key:?}"
            )));
        }
        if !target_ordinals.insert(*ordinal) {
            return Err(PermuteError::Mismatch(format!(
                "target ordinal {ordinal} used twice"
            )));
        }
    }

    if current.len() != targets.len() {
        return Err(PermuteError::Mismatch(format!(
            "expected {} keys, got {}",
            current.len(),
            targets.len()
        )));
    }
    for (key, ordinal) in &current {
        if !target_keys.contains(key) {
            return Err(PermuteError::Mismatch(format!("key {key:?} missing")));
        }
        if *ordinal < 0 {
            return Err(PermuteError::Mismatch(format!(
                "stored ordinal {ordinal} of {key:?} is negative"
            )));
        }
    }

    for (key, ordinal) in &current {
        store
            .write(*key, -(ordinal + 1), PermutePhase::Park)
            .map_err(PermuteError::Store)?;
    }
    for (key, ordinal) in targets {
        store
            .write(*key, *ordinal, PermutePhase::Place)
            .map_err(PermuteError::Store)?;
    }
    Ok(targets.len())
}
