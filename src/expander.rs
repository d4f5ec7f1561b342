//! Transition expander, the central algorithm. One call to
//! [`compute_some_transitions`] picks up to `limit` unresolved
//! `(state, input)` pairs, computes their target vertex-sets, interns the
//! results as new states, and resolves the original transition rows.
//!
//! Picking work, computing targets, interning, and resolving run as three
//! scratch-table passes inside a single transaction, so a failure partway
//! through leaves the store exactly as if the call never began.

use rusqlite::Connection;
use rusqlite::params;

use crate::error::Error;
use crate::error::ValidationError;
use crate::registry;

const ENSURE_SCRATCH_TABLES_SQL: &str = "
CREATE TEMP TABLE IF NOT EXISTS work (
	src INTEGER NOT NULL,
	input INTEGER NOT NULL,
	distance INTEGER NOT NULL,
	PRIMARY KEY (src, input)
);
CREATE TEMP TABLE IF NOT EXISTS target (
	src INTEGER NOT NULL,
	input INTEGER NOT NULL,
	target_key TEXT NOT NULL,
	new_distance INTEGER NOT NULL,
	PRIMARY KEY (src, input)
);
";

/// The target-set join:
///
///   target(s, i) = union { closure(w) : v in vertices(s), (v, w) in E, matches(v, i) }
///
/// expressed with outer joins so that a work row with no matching edges
/// still produces exactly one group (whose `vertex_set` aggregate then sees
/// only `NULL`s and canonicalizes to `"[]"`, the dead state's key) rather
/// than being silently dropped from the result.
const COMPUTE_TARGETS_SQL: &str = "
INSERT INTO target (src, input, target_key, new_distance)
SELECT w.src, w.input, vertex_set(cl.reachable), w.distance + 1
FROM work w
JOIN state s ON s.id = w.src
LEFT JOIN json_each(s.vertex_str) sv ON 1 = 1
LEFT JOIN edge e ON e.src = sv.value
LEFT JOIN matches m ON m.vertex = e.src AND m.input = w.input
LEFT JOIN closure cl ON cl.root = e.dst AND m.vertex IS NOT NULL
GROUP BY w.src, w.input;
";

/// Picks up to `limit` unresolved transitions, computes their targets,
/// interns any new states, and resolves the work. Returns the number of
/// transitions resolved in this call.
#[tracing::instrument(skip(conn))]
pub(crate) fn compute_some_transitions(conn: &mut Connection, limit: u32) -> Result<usize, Error> {
	let limit = i64::from(limit);
	let tx = conn.transaction()?;
	tx.execute_batch(ENSURE_SCRATCH_TABLES_SQL)?;
	tx.execute("DELETE FROM work", [])?;
	tx.execute("DELETE FROM target", [])?;

	// 1. Pick work: up to `limit` unresolved transitions, smallest distance first.
	tx.execute(
		"INSERT INTO work (src, input, distance)
		 SELECT t.src, t.input, s.distance
		 FROM transition t
		 JOIN state s ON s.id = t.src
		 WHERE t.dst IS NULL
		 ORDER BY s.distance ASC, t.src ASC, t.input ASC
		 LIMIT ?1",
		params![limit],
	)?;

	// 2. Compute targets.
	tx.execute(COMPUTE_TARGETS_SQL, [])?;

	// 3. Intern new states: one per distinct canonical target key, using the
	//    minimum distance observed for that key.
	tx.execute(
		"INSERT INTO state (vertex_str, distance)
		 SELECT target_key, MIN(new_distance) FROM target GROUP BY target_key
		 ON CONFLICT (vertex_str) DO UPDATE SET distance = MIN(state.distance, excluded.distance)",
		[],
	)?;
	let target_keys: Vec<String> = {
		let mut stmt = tx.prepare("SELECT DISTINCT target_key FROM target")?;
		stmt.query_map([], |row| row.get(0))?.collect::<rusqlite::Result<_>>()?
	};
	for key in &target_keys {
		let state_id: i64 = tx.query_row("SELECT id FROM state WHERE vertex_str = ?1", params![key], |row| row.get(0))?;
		registry::ensure_transition_scaffold(&tx, state_id)?;
	}

	// 4. Resolve work rows.
	tx.execute(
		"UPDATE transition
		 SET dst = (SELECT id FROM state WHERE vertex_str = tg.target_key)
		 FROM target tg
		 WHERE transition.src = tg.src AND transition.input = tg.input",
		[],
	)?;

	let resolved: i64 = tx.query_row("SELECT COUNT(*) FROM target", [], |row| row.get(0))?;
	let resolved = usize::try_from(resolved).map_err(|_| {
		Error::Validation(ValidationError::OutOfRange {
			what: "resolved transition count",
			value: resolved,
		})
	})?;
	tx.commit()?;
	tracing::debug!(resolved, "compute_some_transitions resolved transitions");
	Ok(resolved)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codec;
	use crate::loader;
	use crate::loader::LoadInput;
	use crate::store::SCHEMA_SQL;

	fn setup() -> Connection {
		let conn = Connection::open_in_memory().unwrap();
		codec::register(&conn).unwrap();
		conn.execute_batch(SCHEMA_SQL).unwrap();
		conn
	}

	/// Two-vertex chain.
	#[test]
	fn two_vertex_chain() {
		let mut conn = setup();
		loader::load(
			&mut conn,
			&LoadInput {
				alphabet: vec![1],
				vertices: vec![2, 3],
				edges: vec![(2, 3)],
			},
			&mut |v| v == 2,
			&mut |v, i| v == 3 && i == 1,
		)
		.unwrap();
		crate::closure::build(&conn).unwrap();
		registry::dead_state_id(&conn).unwrap();
		let start = registry::find_or_create_state(&conn, &[2]).unwrap();
		let mut verts = registry::vertices_in_state(&conn, start).unwrap();
		verts.sort_unstable();
		assert_eq!(verts, vec![2, 3]);

		loop {
			if compute_some_transitions(&mut conn, 1000).unwrap() == 0 {
				break;
			}
		}

		let state_count: i64 = conn.query_row("SELECT COUNT(*) FROM state", [], |r| r.get(0)).unwrap();
		assert_eq!(state_count, 2);
		let resolved_count: i64 = conn
			.query_row("SELECT COUNT(*) FROM transition WHERE dst IS NOT NULL", [], |r| r.get(0))
			.unwrap();
		assert_eq!(resolved_count, 2);
	}

	/// Empty alphabet.
	#[test]
	fn empty_alphabet_no_transitions() {
		let mut conn = setup();
		loader::load(&mut conn, &LoadInput::default(), &mut |_| false, &mut |_, _| false).unwrap();
		crate::closure::build(&conn).unwrap();
		registry::dead_state_id(&conn).unwrap();
		assert_eq!(compute_some_transitions(&mut conn, 1000).unwrap(), 0);
		let state_count: i64 = conn.query_row("SELECT COUNT(*) FROM state", [], |r| r.get(0)).unwrap();
		assert_eq!(state_count, 1);
	}

	/// All nullable.
	#[test]
	fn all_nullable_collapses_to_dead() {
		let mut conn = setup();
		loader::load(
			&mut conn,
			&LoadInput {
				alphabet: vec![7],
				vertices: vec![1, 2, 3],
				edges: vec![(1, 2), (2, 3)],
			},
			&mut |_| true,
			&mut |_, _| false,
		)
		.unwrap();
		crate::closure::build(&conn).unwrap();
		registry::dead_state_id(&conn).unwrap();
		let start = registry::find_or_create_state(&conn, &[1]).unwrap();
		let mut verts = registry::vertices_in_state(&conn, start).unwrap();
		verts.sort_unstable();
		assert_eq!(verts, vec![1, 2, 3]);

		while compute_some_transitions(&mut conn, 1000).unwrap() != 0 {}

		let dead = registry::dead_state_id(&conn).unwrap();
		let dst: i64 = conn
			.query_row(
				"SELECT dst FROM transition WHERE src = ?1 AND input = 7",
				params![start],
				|r| r.get(0),
			)
			.unwrap();
		assert_eq!(dst, dead);
	}

	/// Self-loop.
	#[test]
	fn self_loop_stays_on_itself() {
		let mut conn = setup();
		loader::load(
			&mut conn,
			&LoadInput {
				alphabet: vec![7],
				vertices: vec![1],
				edges: vec![(1, 1)],
			},
			&mut |_| false,
			&mut |v, i| v == 1 && i == 7,
		)
		.unwrap();
		crate::closure::build(&conn).unwrap();
		registry::dead_state_id(&conn).unwrap();
		let start = registry::find_or_create_state(&conn, &[1]).unwrap();

		while compute_some_transitions(&mut conn, 1000).unwrap() != 0 {}

		let dst: i64 = conn
			.query_row("SELECT dst FROM transition WHERE src = ?1 AND input = 7", params![start], |r| {
				r.get(0)
			})
			.unwrap();
		assert_eq!(dst, start);
	}

	/// Determinism across different `limit` schedules.
	#[test]
	fn deterministic_regardless_of_limit_schedule() {
		fn build(limit: u32) -> Vec<(String, i64, String)> {
			let mut conn = Connection::open_in_memory().unwrap();
			codec::register(&conn).unwrap();
			conn.execute_batch(SCHEMA_SQL).unwrap();
			loader::load(
				&mut conn,
				&LoadInput {
					alphabet: vec![1, 2],
					vertices: vec![1, 2, 3, 4],
					edges: vec![(1, 2), (1, 3), (2, 4), (3, 4), (4, 1)],
				},
				&mut |v| v == 3,
				&mut |v, i| (v == 1 && i == 1) || (v == 2 && i == 2) || (v == 4 && i == 1),
			)
			.unwrap();
			crate::closure::build(&conn).unwrap();
			registry::dead_state_id(&conn).unwrap();
			registry::find_or_create_state(&conn, &[1]).unwrap();
			while compute_some_transitions(&mut conn, limit).unwrap() != 0 {}

			let mut stmt = conn
				.prepare("SELECT s1.vertex_str, t.input, s2.vertex_str FROM transition t JOIN state s1 ON s1.id = t.src JOIN state s2 ON s2.id = t.dst")
				.unwrap();
			let mut rows: Vec<(String, i64, String)> = stmt
				.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
				.unwrap()
				.collect::<Result<_, _>>()
				.unwrap();
			rows.sort();
			rows
		}

		assert_eq!(build(1), build(1000));
	}
}
