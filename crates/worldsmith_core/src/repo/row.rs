//! Row-level helpers shared by SQLite repositories.

use super::{StoreError, StoreResult};
use crate::model::EntityKind;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

static LAST_STAMP_MS: AtomicI64 = AtomicI64::new(0);

/// Epoch milliseconds, never lower than a value returned earlier in-process.
pub fn now_ms() -> i64 {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0);
    let previous = LAST_STAMP_MS.fetch_max(wall, Ordering::SeqCst);
    previous.max(wall)
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_optional_uuid(
    value: Option<String>,
    column: &'static str,
) -> StoreResult<Option<Uuid>> {
    value.map(|text| parse_uuid(&text, column)).transpose()
}

pub(crate) fn parse_bool(value: i64, column: &'static str) -> StoreResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StoreError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

/// Reads `(version, is_deleted)` of one row keyed by `id`.
pub(crate) fn row_state(
    conn: &Connection,
    table: &'static str,
    id: Uuid,
) -> StoreResult<Option<(i64, bool)>> {
    let state: Option<(i64, i64)> = conn
        .query_row(
            &format!("SELECT version, is_deleted FROM {table} WHERE id = ?1;"),
            [id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    match state {
        Some((version, deleted)) => Ok(Some((version, parse_bool(deleted, "is_deleted")?))),
        None => Ok(None),
    }
}

/// Classifies a guarded write that changed no row.
pub(crate) fn stale_write_error(
    conn: &Connection,
    table: &'static str,
    kind: EntityKind,
    id: Uuid,
    expected: i64,
) -> StoreError {
    match row_state(conn, table, id) {
        Ok(Some((actual, _))) => StoreError::ConcurrencyConflict {
            kind,
            id,
            expected,
            actual,
        },
        Ok(None) => StoreError::NotFound { kind, id },
        Err(err) => err,
    }
}

/// Soft-deletes one alive row, optionally guarded by version.
///
/// Returns `Ok(false)` when the row is missing or already deleted.
pub(crate) fn soft_delete_row(
    conn: &Connection,
    table: &'static str,
    kind: EntityKind,
    id: Uuid,
    expected_version: Option<i64>,
) -> StoreResult<bool> {
    let changed = conn.execute(
        &format!(
            "UPDATE {table}
             SET is_deleted = 1,
                 version = version + 1,
                 updated_at = ?2
             WHERE id = ?1
               AND is_deleted = 0
               AND (?3 IS NULL OR version = ?3);"
        ),
        params![id.to_string(), now_ms(), expected_version],
    )?;
    if changed == 1 {
        return Ok(true);
    }

    if let Some(expected) = expected_version {
        if let Some((actual, false)) = row_state(conn, table, id)? {
            return Err(StoreError::ConcurrencyConflict {
                kind,
                id,
                expected,
                actual,
            });
        }
    }
    Ok(false)
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn table_has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Escapes `LIKE` wildcards; pair with `ESCAPE '\'`.
pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{escape_like, now_ms, parse_bool, parse_uuid};

    #[test]
    fn escape_like_protects_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn clock_never_goes_backwards() {
        let mut previous = now_ms();
        for _ in 0..1_000 {
            let next = now_ms();
            assert!(next >= previous);
            previous = next;
        }
    }

    #[test]
    fn parse_helpers_reject_malformed_values() {
        assert!(parse_uuid("not-a-uuid", "cards.id").is_err());
        assert!(parse_bool(2, "cards.is_deleted").is_err());
        assert!(parse_bool(1, "cards.is_deleted").unwrap());
    }
}
