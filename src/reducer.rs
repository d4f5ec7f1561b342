//! Dead-state reducer: given an acceptance oracle, redirects every
//! transition leading to a non-live state to the single dead sink and drops
//! the unreachable states.
//!
//! Made idempotent rather than rejecting a second call: a cleaned automaton
//! is already a fixpoint of the reduction, so re-running it recomputes the
//! same `A`/live set and performs zero further deletions.

use rusqlite::Connection;
use rusqlite::params;

use crate::error::Error;
use crate::error::invoke_oracle;
use crate::registry;

const SCRATCH_TABLES_SQL: &str = "
CREATE TEMP TABLE IF NOT EXISTS accepting (id INTEGER PRIMARY KEY);
CREATE TEMP TABLE IF NOT EXISTS live (id INTEGER PRIMARY KEY);
";

/// Given an acceptance oracle, redirects every transition leading to a
/// non-live state to the dead sink and drops the unreachable states.
/// Returns the accepting state IDs.
#[tracing::instrument(skip(conn, accepts))]
pub(crate) fn cleanup_dead_states(conn: &mut Connection, accepts: &mut dyn FnMut(&[i64]) -> bool) -> Result<Vec<i64>, Error> {
	let tx = conn.transaction()?;
	tx.execute_batch(SCRATCH_TABLES_SQL)?;
	tx.execute("DELETE FROM accepting", [])?;
	tx.execute("DELETE FROM live", [])?;

	// 1. A = { s : accepts_oracle(vertices_in_state(s)) }
	let states = registry::state_vertices_snapshot(&tx)?;
	let mut accepting_ids: Vec<i64> = Vec::new();
	{
		let mut stmt = tx.prepare("INSERT INTO accepting (id) VALUES (?1)")?;
		for (id, vertices) in &states {
			if invoke_oracle(|| accepts(vertices))? {
				accepting_ids.push(*id);
				stmt.execute(params![id])?;
			}
		}
	}

	// 2. L = A U { s : exists transition(s, _, s') with s' in L }, i.e. the
	//    set of states with a forward transition path into A.
	tx.execute(
		"INSERT INTO live (id)
		 WITH RECURSIVE live_cte(id) AS (
			 SELECT id FROM accepting
			 UNION
			 SELECT t.src FROM transition t JOIN live_cte l ON t.dst = l.id
		 )
		 SELECT id FROM live_cte",
		[],
	)?;
	let dead: i64 = tx.query_row(
		"SELECT id FROM state WHERE vertex_str = ?1",
		params![registry::DEAD_STATE_KEY],
		|row| row.get(0),
	)?;
	tx.execute("INSERT OR IGNORE INTO live (id) VALUES (?1)", params![dead])?;

	// 3. Redirect every transition whose dst isn't live to the dead sink.
	tx.execute(
		"UPDATE transition SET dst = ?1 WHERE dst IS NOT NULL AND dst NOT IN (SELECT id FROM live)",
		params![dead],
	)?;

	// 4. Delete every state not in L U { dead }; cascades to its transitions.
	tx.execute("DELETE FROM state WHERE id NOT IN (SELECT id FROM live)", [])?;

	tx.commit()?;
	accepting_ids.sort_unstable();
	tracing::debug!(accepting = accepting_ids.len(), live = ?dead, "cleanup_dead_states finished");
	Ok(accepting_ids)
}
