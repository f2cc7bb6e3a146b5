//! Relational backend: SQLite with recursive CTEs.
//!
//! Unbounded closures recurse over ids only and rely on `UNION` to drop
//! revisits, so a diamond contributes each node once and the recursion
//! terminates on the finite id set. Bounded closures carry a depth column
//! and stop expanding at the hop limit. Attribute filters are applied in SQL
//! after the recursion, never during it.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, Statement, ToSql};

use crate::backend::{BackendKind, ExplainRequest, QueryOperation, QueryPlan, StorageBackend};
use crate::db::converters::{row_to_version_node, since_to_sql, timestamp_to_sql};
use crate::db::schema::{initialize_database, SchemaOptions};
use crate::error::{DagBenchError, Result};
use crate::types::{Direction, ParentEdge, TraversalQuery, VersionId, VersionNode};

// ---------------------------------------------------------------------------
// SQL constants
// ---------------------------------------------------------------------------

const INSERT_VERSION: &str = "\
INSERT INTO versions (id, title, content, author, created_at) \
VALUES (?1, ?2, ?3, ?4, ?5)";

const INSERT_PARENT: &str = "\
INSERT OR IGNORE INTO version_parents (child_id, parent_id) VALUES (?1, ?2)";

// Closure parameters: ?1 start id, ?2 include_self, ?3 author, ?4 title
// substring, ?5 created_since (unix seconds), ?6 max depth (bounded only).

const ANCESTORS_SQL: &str = "
WITH RECURSIVE ancestry(id) AS (
    SELECT ?1
    UNION
    SELECT p.parent_id
    FROM version_parents p
    JOIN ancestry a ON p.child_id = a.id
)
SELECT v.*
FROM versions v
JOIN ancestry a ON v.id = a.id
WHERE (?2 OR v.id <> ?1)
  AND (?3 IS NULL OR v.author = ?3)
  AND (?4 IS NULL OR instr(v.title, ?4) > 0)
  AND (?5 IS NULL OR v.created_at >= ?5)
ORDER BY v.id";

const ANCESTORS_WITHIN_SQL: &str = "
WITH RECURSIVE ancestry(id, depth) AS (
    SELECT ?1, 0
    UNION
    SELECT p.parent_id, a.depth + 1
    FROM version_parents p
    JOIN ancestry a ON p.child_id = a.id
    WHERE a.depth < ?6
)
SELECT v.*
FROM versions v
JOIN (SELECT DISTINCT id FROM ancestry) a ON v.id = a.id
WHERE (?2 OR v.id <> ?1)
  AND (?3 IS NULL OR v.author = ?3)
  AND (?4 IS NULL OR instr(v.title, ?4) > 0)
  AND (?5 IS NULL OR v.created_at >= ?5)
ORDER BY v.id";

const DESCENDANTS_SQL: &str = "
WITH RECURSIVE descent(id) AS (
    SELECT ?1
    UNION
    SELECT p.child_id
    FROM version_parents p
    JOIN descent d ON p.parent_id = d.id
)
SELECT v.*
FROM versions v
JOIN descent d ON v.id = d.id
WHERE (?2 OR v.id <> ?1)
  AND (?3 IS NULL OR v.author = ?3)
  AND (?4 IS NULL OR instr(v.title, ?4) > 0)
  AND (?5 IS NULL OR v.created_at >= ?5)
ORDER BY v.id";

const DESCENDANTS_WITHIN_SQL: &str = "
WITH RECURSIVE descent(id, depth) AS (
    SELECT ?1, 0
    UNION
    SELECT p.child_id, d.depth + 1
    FROM version_parents p
    JOIN descent d ON p.parent_id = d.id
    WHERE d.depth < ?6
)
SELECT v.*
FROM versions v
JOIN (SELECT DISTINCT id FROM descent) d ON v.id = d.id
WHERE (?2 OR v.id <> ?1)
  AND (?3 IS NULL OR v.author = ?3)
  AND (?4 IS NULL OR instr(v.title, ?4) > 0)
  AND (?5 IS NULL OR v.created_at >= ?5)
ORDER BY v.id";

const LATEST_COMMON_ANCESTOR_SQL: &str = "
WITH RECURSIVE
left_side(id) AS (
    SELECT ?1
    UNION
    SELECT p.parent_id FROM version_parents p JOIN left_side l ON p.child_id = l.id
),
right_side(id) AS (
    SELECT ?2
    UNION
    SELECT p.parent_id FROM version_parents p JOIN right_side r ON p.child_id = r.id
)
SELECT v.*
FROM versions v
WHERE v.id IN (SELECT id FROM left_side)
  AND v.id IN (SELECT id FROM right_side)
ORDER BY v.created_at DESC, v.id DESC
LIMIT 1";

fn closure_sql(direction: Direction, bounded: bool) -> &'static str {
    match (direction, bounded) {
        (Direction::Ancestors, false) => ANCESTORS_SQL,
        (Direction::Ancestors, true) => ANCESTORS_WITHIN_SQL,
        (Direction::Descendants, false) => DESCENDANTS_SQL,
        (Direction::Descendants, true) => DESCENDANTS_WITHIN_SQL,
    }
}

// ---------------------------------------------------------------------------
// SqliteBackend
// ---------------------------------------------------------------------------

/// Where and how to open the relational store.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    /// Database file; a private in-memory database when `None`.
    pub path: Option<PathBuf>,
    /// Create the `(parent_id, child_id)` index used by descendant walks.
    pub reverse_index: bool,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            path: None,
            reverse_index: true,
        }
    }
}

pub struct SqliteBackend {
    name: String,
    conn: Mutex<Connection>,
    reverse_index: bool,
}

impl SqliteBackend {
    /// Open a fresh, empty store.
    ///
    /// A file-backed store always starts empty: any database already at
    /// `options.path` (with its WAL and shared-memory side files) is removed
    /// first.
    pub fn open(options: &SqliteOptions) -> Result<Self> {
        let schema = SchemaOptions {
            reverse_index: options.reverse_index,
        };
        let conn = match options.path {
            Some(ref path) => {
                remove_existing(path)?;
                let path_str = path.to_str().ok_or_else(|| {
                    DagBenchError::storage("sqlite", format!("non-UTF-8 path {}", path.display()))
                })?;
                initialize_database(path_str, schema)?
            }
            None => initialize_database(":memory:", schema)?,
        };
        tracing::debug!(
            path = ?options.path,
            reverse_index = options.reverse_index,
            "opened sqlite store"
        );
        Ok(Self {
            name: BackendKind::Sqlite.as_str().to_string(),
            conn: Mutex::new(conn),
            reverse_index: options.reverse_index,
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(&SqliteOptions::default())
    }

    pub fn has_reverse_index(&self) -> bool {
        self.reverse_index
    }

    /// Number of rows in `versions`.
    pub fn version_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM versions", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DagBenchError::storage(&self.name, "connection mutex poisoned"))
    }

    /// Prepare the closure statement for `query` (optionally prefixed with
    /// `EXPLAIN QUERY PLAN`) and hand it to `f` together with its bound
    /// parameters.
    fn with_closure<T>(
        &self,
        direction: Direction,
        id: VersionId,
        query: &TraversalQuery,
        explain: bool,
        f: impl FnOnce(&mut Statement<'_>, &[&dyn ToSql]) -> Result<T>,
    ) -> Result<T> {
        let sql = closure_sql(direction, query.max_depth.is_some());
        let text = if explain {
            format!("EXPLAIN QUERY PLAN {sql}")
        } else {
            sql.to_string()
        };

        let start = id.as_i64();
        let author = query.predicate.author.as_deref();
        let title = query.predicate.title_contains.as_deref();
        let since = query.predicate.created_since.as_ref().map(since_to_sql);
        let depth = query.max_depth.map(i64::from);

        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(6);
        params.push(&start);
        params.push(&query.include_self);
        params.push(&author);
        params.push(&title);
        params.push(&since);
        if let Some(ref k) = depth {
            params.push(k);
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&text)?;
        f(&mut *stmt, &params)
    }

    fn closure(
        &self,
        direction: Direction,
        id: VersionId,
        query: &TraversalQuery,
    ) -> Result<Vec<VersionNode>> {
        self.with_closure(direction, id, query, false, |stmt, params| {
            stmt.query_and_then(params, row_to_version_node)?.collect()
        })
    }
}

fn remove_existing(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    for suffix in ["-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        let side = PathBuf::from(side);
        if side.exists() {
            std::fs::remove_file(side)?;
        }
    }
    Ok(())
}

fn plan_details(stmt: &mut Statement<'_>, params: &[&dyn ToSql]) -> Result<Vec<String>> {
    // EXPLAIN QUERY PLAN columns: id, parent, notused, detail.
    let rows = stmt.query_map(params, |row| row.get::<_, String>(3))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

impl StorageBackend for SqliteBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn insert_batch(&mut self, nodes: &[VersionNode], edges: &[ParentEdge]) -> Result<usize> {
        let name = self.name.clone();
        let rolled_back =
            move |e: rusqlite::Error| DagBenchError::storage(&name, format!("load rolled back: {e}"));

        let conn = self
            .conn
            .get_mut()
            .map_err(|_| DagBenchError::storage(&self.name, "connection mutex poisoned"))?;

        let tx = conn.transaction().map_err(&rolled_back)?;
        {
            let mut insert_version = tx.prepare_cached(INSERT_VERSION).map_err(&rolled_back)?;
            for node in nodes {
                insert_version
                    .execute(rusqlite::params![
                        node.id.as_i64(),
                        node.title,
                        node.content,
                        node.author,
                        timestamp_to_sql(&node.created_at),
                    ])
                    .map_err(&rolled_back)?;
            }

            let mut insert_parent = tx.prepare_cached(INSERT_PARENT).map_err(&rolled_back)?;
            for edge in edges {
                insert_parent
                    .execute(rusqlite::params![edge.child.as_i64(), edge.parent.as_i64()])
                    .map_err(&rolled_back)?;
            }
        }
        tx.commit().map_err(&rolled_back)?;

        tracing::debug!(nodes = nodes.len(), edges = edges.len(), "sqlite load committed");
        Ok(nodes.len())
    }

    fn find_ancestors(&self, id: VersionId, query: &TraversalQuery) -> Result<Vec<VersionNode>> {
        self.closure(Direction::Ancestors, id, query)
    }

    fn find_descendants(
        &self,
        id: VersionId,
        query: &TraversalQuery,
    ) -> Result<Vec<VersionNode>> {
        self.closure(Direction::Descendants, id, query)
    }

    fn find_latest_common_ancestor(
        &self,
        a: VersionId,
        b: VersionId,
    ) -> Result<Option<VersionNode>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(LATEST_COMMON_ANCESTOR_SQL)?;
        let mut rows = stmt.query_and_then(
            rusqlite::params![a.as_i64(), b.as_i64()],
            row_to_version_node,
        )?;
        rows.next().transpose()
    }

    fn explain(&self, request: &ExplainRequest) -> Result<QueryPlan> {
        let steps = match request.operation {
            QueryOperation::Ancestors => self.with_closure(
                Direction::Ancestors,
                request.target,
                &request.query,
                true,
                plan_details,
            )?,
            QueryOperation::Descendants => self.with_closure(
                Direction::Descendants,
                request.target,
                &request.query,
                true,
                plan_details,
            )?,
            QueryOperation::LatestCommonAncestor => {
                let other = request.other.unwrap_or(request.target);
                let conn = self.lock()?;
                let text = format!("EXPLAIN QUERY PLAN {LATEST_COMMON_ANCESTOR_SQL}");
                let mut stmt = conn.prepare_cached(&text)?;
                plan_details(
                    &mut stmt,
                    &[&request.target.as_i64(), &other.as_i64()],
                )?
            }
        };
        Ok(QueryPlan {
            backend: self.name.clone(),
            operation: request.operation,
            steps,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
