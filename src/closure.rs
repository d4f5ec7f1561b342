//! Epsilon-closure builder.
//!
//! Computes, once per load, the fixpoint
//!
//!   C <- {(v, v) : v in V} U {(r, d) : (r, s) in C, nullable(s), (s, d) in E}
//!
//! as a single recursive SQL query. SQLite's `WITH RECURSIVE` uses `UNION`
//! (not `UNION ALL`) below so the recursion naturally terminates on cycles
//! through nullable vertices by deduplicating `(root, reachable)` pairs
//! rather than looping forever.

use rusqlite::Connection;
use rusqlite::Result as SqlResult;

const BUILD_SQL: &str = "
WITH RECURSIVE closure_cte(root, reachable) AS (
	SELECT id, id FROM vertex
	UNION
	SELECT c.root, e.dst
	FROM closure_cte c
	JOIN vertex v ON v.id = c.reachable AND v.nullable = 1
	JOIN edge e ON e.src = c.reachable
)
INSERT INTO closure (root, reachable)
SELECT root, reachable FROM closure_cte;
";

/// Recompute `closure` from scratch against the current `vertex`/`edge`
/// tables. Called once, after [`crate::loader::load`] completes.
pub(crate) fn build(conn: &Connection) -> SqlResult<()> {
	conn.execute("DELETE FROM closure", [])?;
	conn.execute(BUILD_SQL, [])?;
	Ok(())
}

/// The epsilon-closure of a single vertex, as a sorted vertex list. Used by
/// [`crate::registry::find_or_create_state`] to close an arbitrary caller-
/// supplied vertex list.
pub(crate) fn of_vertex(conn: &Connection, vertex: i64) -> SqlResult<Vec<i64>> {
	let mut stmt = conn.prepare_cached("SELECT reachable FROM closure WHERE root = ?1")?;
	stmt.query_map([vertex], |row| row.get(0))?.collect()
}
