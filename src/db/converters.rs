//! Row <-> domain conversions for the `versions` table.

use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::error::{DagBenchError, Result};
use crate::types::{VersionId, VersionNode};

/// Convert a `versions` row (selected with `v.*`) into a [`VersionNode`].
pub fn row_to_version_node(row: &Row<'_>) -> Result<VersionNode> {
    let id: i64 = row.get("id")?;
    let created_at: i64 = row.get("created_at")?;
    Ok(VersionNode {
        id: id_from_sql(id)?,
        title: row.get("title")?,
        content: row.get("content")?,
        author: row.get("author")?,
        created_at: timestamp_from_sql(created_at)?,
    })
}

pub fn id_from_sql(raw: i64) -> Result<VersionId> {
    u64::try_from(raw)
        .map(VersionId)
        .map_err(|_| DagBenchError::storage("sqlite", format!("negative version id {raw}")))
}

/// Timestamps are stored as Unix seconds.
pub fn timestamp_to_sql(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp()
}

/// Lower bound for a `created_at >= ?` filter. Rows hold whole seconds, so a
/// fractional bound rounds up.
pub fn since_to_sql(ts: &DateTime<Utc>) -> i64 {
    if ts.timestamp_subsec_nanos() > 0 {
        ts.timestamp() + 1
    } else {
        ts.timestamp()
    }
}

pub fn timestamp_from_sql(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| DagBenchError::storage("sqlite", format!("timestamp {secs} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{initialize_database, SchemaOptions};

    #[test]
    fn round_trips_a_version_row() {
        let conn = initialize_database(":memory:", SchemaOptions::default()).unwrap();
        conn.execute(
            "INSERT INTO versions (id, title, content, author, created_at) VALUES (5, 'pdf file edit', 'body', 'kanguk', 1738368000)",
            [],
        )
        .unwrap();

        let node = conn
            .query_row("SELECT * FROM versions WHERE id = 5", [], |row| {
                Ok(row_to_version_node(row))
            })
            .unwrap()
            .unwrap();

        assert_eq!(node.id, VersionId(5));
        assert_eq!(node.author, "kanguk");
        assert_eq!(node.title, "pdf file edit");
        assert_eq!(timestamp_to_sql(&node.created_at), 1_738_368_000);
    }

    #[test]
    fn fractional_since_rounds_up() {
        let whole = DateTime::<Utc>::from_timestamp(100, 0).unwrap();
        let fractional = DateTime::<Utc>::from_timestamp(100, 500_000_000).unwrap();
        assert_eq!(since_to_sql(&whole), 100);
        assert_eq!(since_to_sql(&fractional), 101);
    }

    #[test]
    fn negative_ids_are_storage_errors() {
        let err = id_from_sql(-1).unwrap_err();
        assert!(err.is_recoverable());
    }
}
