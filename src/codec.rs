//! Canonical encoding of a DFA state's vertex set.
//!
//! The codec is deliberately a pair of free functions with no builder/store
//! context: it breaks the builder/oracle ownership cycle by having nothing
//! to own.

use rusqlite::Connection;
use rusqlite::Result as SqlResult;
use rusqlite::functions::Aggregate;
use rusqlite::functions::Context;
use rusqlite::functions::FunctionFlags;

/// Canonicalize a set of vertex IDs: sort ascending, drop duplicates, emit
/// as a whitespace-free JSON array. Two sets are equal iff their encodings
/// are byte-identical.
pub fn encode(ids: &[i64]) -> String {
	let mut sorted: Vec<i64> = ids.to_vec();
	sorted.sort_unstable();
	sorted.dedup();
	// A `Vec<i64>` always serializes; this cannot fail.
	serde_json::to_string(&sorted).expect("encoding a vertex set cannot fail")
}

/// Decode a canonical key produced by [`encode`] back into its sorted,
/// deduplicated vertex list. Only ever called with keys this crate produced
/// itself (via the `vertex_str` column), so a malformed key is an internal
/// invariant violation, not a caller error.
pub fn decode(key: &str) -> Vec<i64> {
	serde_json::from_str(key).expect("vertex_str is always a canonical encoding produced by this crate")
}

/// SQLite aggregate accumulator for `vertex_set(vertex_id)`: lets a `GROUP
/// BY` query canonicalize a set of vertex IDs without leaving the query
/// planner.
struct VertexSetAggregate;

impl Aggregate<Vec<i64>, String> for VertexSetAggregate {
	fn init(&self, _ctx: &mut Context<'_>) -> SqlResult<Vec<i64>> {
		Ok(Vec::new())
	}

	fn step(&self, ctx: &mut Context<'_>, acc: &mut Vec<i64>) -> SqlResult<()> {
		// SQL NULL (e.g. from an outer join preserving a row with no match)
		// contributes nothing to the set, rather than erroring.
		if let Some(v) = ctx.get::<Option<i64>>(0)? {
			acc.push(v);
		}
		Ok(())
	}

	fn finalize(&self, _ctx: &mut Context<'_>, acc: Option<Vec<i64>>) -> SqlResult<String> {
		Ok(encode(&acc.unwrap_or_default()))
	}
}

/// Register the `vertex_set` aggregate on a connection. Called once per
/// connection during [`crate::store::Store::open`].
pub(crate) fn register(conn: &Connection) -> SqlResult<()> {
	conn.create_aggregate_function(
		"vertex_set",
		1,
		FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
		VertexSetAggregate,
	)
}
