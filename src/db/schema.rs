//! SQLite schema initialization for the relational backend.
//!
//! Two tables: `versions` holds node attributes, `version_parents` holds the
//! parent edges keyed `(child_id, parent_id)`. The optional reverse index on
//! `(parent_id, child_id)` serves descendant walks; without it the recursive
//! step has to scan the edge table.

use rusqlite::Connection;

// ---------------------------------------------------------------------------
// DDL constants
// ---------------------------------------------------------------------------

const CREATE_VERSIONS: &str = "\
CREATE TABLE IF NOT EXISTS versions (
  id INTEGER PRIMARY KEY,
  title TEXT NOT NULL,
  content TEXT NOT NULL,
  author TEXT NOT NULL,
  created_at INTEGER NOT NULL
)";

const CREATE_VERSION_PARENTS: &str = "\
CREATE TABLE IF NOT EXISTS version_parents (
  child_id INTEGER NOT NULL,
  parent_id INTEGER NOT NULL,
  PRIMARY KEY (child_id, parent_id),
  FOREIGN KEY (child_id) REFERENCES versions(id),
  FOREIGN KEY (parent_id) REFERENCES versions(id),
  CHECK (child_id <> parent_id)
) WITHOUT ROWID";

// Indexes ----------------------------------------------------------------

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_versions_author ON versions(author)",
    "CREATE INDEX IF NOT EXISTS idx_versions_created ON versions(created_at)",
];

/// Reverse adjacency: parent -> children.
pub const REVERSE_INDEX_NAME: &str = "idx_version_parents_parent";

const CREATE_REVERSE_INDEX: &str = "\
CREATE INDEX IF NOT EXISTS idx_version_parents_parent \
ON version_parents(parent_id, child_id)";

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Schema knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaOptions {
    /// Create the `(parent_id, child_id)` index.
    pub reverse_index: bool,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            reverse_index: true,
        }
    }
}

/// Open (or create) the SQLite database at `db_path` and apply the schema.
///
/// The returned connection has WAL mode, foreign keys ON, and synchronous
/// NORMAL configured. Pass `":memory:"` for a private in-memory database.
///
/// # Errors
///
/// Returns a `rusqlite::Error` if the database cannot be opened or any DDL
/// statement fails.
pub fn initialize_database(db_path: &str, options: SchemaOptions) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;

    // -- Pragmas ----------------------------------------------------------
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    // -- Tables -----------------------------------------------------------
    conn.execute_batch(CREATE_VERSIONS)?;
    conn.execute_batch(CREATE_VERSION_PARENTS)?;

    // -- Indexes ----------------------------------------------------------
    for ddl in CREATE_INDEXES {
        conn.execute_batch(ddl)?;
    }
    if options.reverse_index {
        conn.execute_batch(CREATE_REVERSE_INDEX)?;
    }

    Ok(conn)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(options: SchemaOptions) -> Connection {
        initialize_database(":memory:", options).expect("schema creation should succeed on :memory:")
    }

    /// Query sqlite_master for a given type and name.
    fn object_exists(conn: &Connection, obj_type: &str, obj_name: &str) -> bool {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
                rusqlite::params![obj_type, obj_name],
                |row| row.get(0),
            )
            .unwrap();
        count > 0
    }

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn core_tables_exist() {
        let conn = setup(SchemaOptions::default());
        assert!(object_exists(&conn, "table", "versions"));
        assert!(object_exists(&conn, "table", "version_parents"));
    }

    #[test]
    fn reverse_index_is_optional() {
        let with = setup(SchemaOptions {
            reverse_index: true,
        });
        let without = setup(SchemaOptions {
            reverse_index: false,
        });
        assert!(object_exists(&with, "index", REVERSE_INDEX_NAME));
        assert!(!object_exists(&without, "index", REVERSE_INDEX_NAME));
        assert!(object_exists(&without, "index", "idx_versions_author"));
    }

    #[test]
    fn pragmas_are_set() {
        let conn = setup(SchemaOptions::default());

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        // In-memory databases report "memory" instead of "wal".
        assert!(
            journal_mode == "wal" || journal_mode == "memory",
            "unexpected journal_mode '{journal_mode}'"
        );

        let fk: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn tables_have_expected_columns() {
        let conn = setup(SchemaOptions::default());
        assert_eq!(
            columns(&conn, "versions"),
            vec!["id", "title", "content", "author", "created_at"]
        );
        assert_eq!(columns(&conn, "version_parents"), vec!["child_id", "parent_id"]);
    }

    #[test]
    fn edges_to_missing_versions_are_rejected() {
        let conn = setup(SchemaOptions::default());
        let err = conn.execute(
            "INSERT INTO version_parents (child_id, parent_id) VALUES (2, 1)",
            [],
        );
        assert!(err.is_err(), "foreign keys should reject dangling edges");
    }

    #[test]
    fn self_loops_are_rejected() {
        let conn = setup(SchemaOptions::default());
        conn.execute(
            "INSERT INTO versions (id, title, content, author, created_at) VALUES (1, 't', 'c', 'a', 0)",
            [],
        )
        .unwrap();
        let err = conn.execute(
            "INSERT INTO version_parents (child_id, parent_id) VALUES (1, 1)",
            [],
        );
        assert!(err.is_err());
    }

    #[test]
    fn schema_is_idempotent_on_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bench.db");
        let path = path.to_str().unwrap();
        drop(initialize_database(path, SchemaOptions::default()).unwrap());
        let conn = initialize_database(path, SchemaOptions::default()).unwrap();
        assert!(object_exists(&conn, "table", "versions"));
    }
}
