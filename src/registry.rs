//! State registry: interns DFA states keyed by their canonical vertex-set
//! encoding, allocates stable integer IDs, and maintains the BFS `distance`
//! scheduling hint.
//!
//! On creation of a new state, the registry also inserts one *unresolved*
//! transition row per alphabet symbol with that state as source, so "list
//! outstanding work" is a trivial `WHERE dst IS NULL` query.

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;

use crate::closure;
use crate::codec;
use crate::error::Error;
use crate::error::ValidationError;
use crate::error::check_id;

/// Encoding of the empty vertex set; the dead state's canonical key.
pub(crate) const DEAD_STATE_KEY: &str = "[]";

/// Intern a canonical vertex-set key, allocating a new state (and its
/// alphabet-wide scaffold of unresolved transitions) if it isn't already
/// known. `candidate_distance` is folded in as `MIN(existing, candidate)`,
/// keeping `distance` a valid upper bound regardless of which caller
/// reaches a given state first.
pub(crate) fn intern(conn: &Connection, key: &str, candidate_distance: i64) -> Result<i64, Error> {
	conn.execute(
		"INSERT INTO state (vertex_str, distance) VALUES (?1, ?2)
		 ON CONFLICT (vertex_str) DO UPDATE SET distance = MIN(distance, excluded.distance)",
		params![key, candidate_distance],
	)?;
	let state_id: i64 = conn.query_row("SELECT id FROM state WHERE vertex_str = ?1", params![key], |row| row.get(0))?;
	ensure_transition_scaffold(conn, state_id)?;
	Ok(state_id)
}

/// Allocate the per-alphabet-symbol unresolved transition rows for `state_id`,
/// if it doesn't have them yet. Idempotent.
pub(crate) fn ensure_transition_scaffold(conn: &Connection, state_id: i64) -> rusqlite::Result<()> {
	let has_scaffold: bool = conn.query_row(
		"SELECT EXISTS (SELECT 1 FROM transition WHERE src = ?1)",
		params![state_id],
		|row| row.get(0),
	)?;
	if !has_scaffold {
		conn.execute(
			"INSERT INTO transition (src, input, dst) SELECT ?1, symbol, NULL FROM alphabet",
			params![state_id],
		)?;
	}
	Ok(())
}

/// Register `vertex` as a freshly-inserted, non-nullable, isolated vertex if
/// it isn't already known. Lets [`find_or_create_state`] accept vertex IDs
/// a caller never explicitly registered.
fn ensure_isolated_vertex(conn: &Connection, vertex: i64) -> rusqlite::Result<()> {
	conn.execute("INSERT OR IGNORE INTO vertex (id, nullable) VALUES (?1, 0)", params![vertex])?;
	conn.execute("INSERT OR IGNORE INTO closure (root, reachable) VALUES (?1, ?1)", params![vertex])?;
	Ok(())
}

/// Closes `vertices` under epsilon-closure, canonicalizes, and interns the
/// result. Callers are expected to pass start states, so freshly-interned
/// states get distance 0.
pub(crate) fn find_or_create_state(conn: &Connection, vertices: &[i64]) -> Result<i64, Error> {
	for &v in vertices {
		check_id(v)?;
	}
	let mut closed: Vec<i64> = Vec::new();
	for &v in vertices {
		ensure_isolated_vertex(conn, v)?;
		closed.extend(closure::of_vertex(conn, v)?);
	}
	let key = codec::encode(&closed);
	Ok(intern(conn, &key, 0)?)
}

/// The state interned from the empty vertex list. Allocated once, at
/// construction, so it is always valid.
pub(crate) fn dead_state_id(conn: &Connection) -> Result<i64, Error> {
	Ok(intern(conn, DEAD_STATE_KEY, 0)?)
}

/// Decode the canonical key for `state_id`.
pub(crate) fn vertices_in_state(conn: &Connection, state_id: i64) -> Result<Vec<i64>, Error> {
	let key: String = conn
		.query_row("SELECT vertex_str FROM state WHERE id = ?1", params![state_id], |row| row.get(0))
		.optional()?
		.ok_or(ValidationError::UnknownStateId(state_id))?;
	Ok(codec::decode(&key))
}

/// Every `(state_id, vertex_list)` pair present at call time, ascending by
/// `state_id`. Snapshotted eagerly, so it is not required to observe states
/// interned afterwards.
pub(crate) fn state_vertices_snapshot(conn: &Connection) -> Result<Vec<(i64, Vec<i64>)>, Error> {
	let mut stmt = conn.prepare("SELECT id, vertex_str FROM state ORDER BY id ASC")?;
	let rows = stmt.query_map([], |row| {
		let id: i64 = row.get(0)?;
		let vertex_str: String = row.get(1)?;
		Ok((id, vertex_str))
	})?;
	let mut out = Vec::new();
	for row in rows {
		let (id, vertex_str) = row?;
		out.push((id, codec::decode(&vertex_str)));
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::SCHEMA_SQL;

	fn setup() -> Connection {
		let conn = Connection::open_in_memory().unwrap();
		codec::register(&conn).unwrap();
		conn.execute_batch(SCHEMA_SQL).unwrap();
		conn
	}

	#[test]
	fn dead_state_is_stable_and_empty() {
		let conn = setup();
		let dead = dead_state_id(&conn).unwrap();
		assert_eq!(vertices_in_state(&conn, dead).unwrap(), Vec::<i64>::new());
		assert_eq!(dead_state_id(&conn).unwrap(), dead);
	}

	#[test]
	fn find_or_create_is_idempotent_and_bijective() {
		let conn = setup();
		conn.execute_batch(
			"INSERT INTO vertex(id, nullable) VALUES (1, 1), (2, 0);
			 INSERT INTO edge(src, dst) VALUES (1, 2);",
		)
		.unwrap();
		crate::closure::build(&conn).unwrap();

		let a = find_or_create_state(&conn, &[1]).unwrap();
		let b = find_or_create_state(&conn, &[1]).unwrap();
		assert_eq!(a, b);
		let mut verts = vertices_in_state(&conn, a).unwrap();
		verts.sort_unstable();
		assert_eq!(verts, vec![1, 2]);

		let c = find_or_create_state(&conn, &[2]).unwrap();
		assert_ne!(a, c);
		assert_eq!(vertices_in_state(&conn, c).unwrap(), vec![2]);
	}

	#[test]
	fn interning_allocates_full_transition_scaffold() {
		let conn = setup();
		conn.execute_batch("INSERT INTO alphabet(symbol) VALUES (1), (2), (3)").unwrap();
		let dead = dead_state_id(&conn).unwrap();
		let count: i64 = conn
			.query_row("SELECT COUNT(*) FROM transition WHERE src = ?1", params![dead], |r| r.get(0))
			.unwrap();
		assert_eq!(count, 3);
	}

	#[test]
	fn unregistered_vertex_is_autoregistered_as_isolated() {
		let conn = setup();
		let s = find_or_create_state(&conn, &[42]).unwrap();
		assert_eq!(vertices_in_state(&conn, s).unwrap(), vec![42]);
		let nullable: i64 = conn.query_row("SELECT nullable FROM vertex WHERE id = 42", [], |r| r.get(0)).unwrap();
		assert_eq!(nullable, 0);
	}

	#[test]
	fn vertices_in_state_rejects_unknown_id() {
		let conn = setup();
		let err = vertices_in_state(&conn, 999).unwrap_err();
		assert!(matches!(err, Error::Validation(ValidationError::UnknownStateId(999))));
	}
}
