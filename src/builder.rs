//! The public entry point: `Builder` ties the store, loader, closure
//! builder, registry, expander, and reducer together into the operations a
//! caller actually sees. Nothing below this module is public.

use std::path::Path;

use rusqlite::params;

use crate::closure;
use crate::error::Error;
use crate::expander;
use crate::loader;
use crate::loader::LoadInput;
use crate::reducer;
use crate::registry;
use crate::store::Store;
pub use crate::store::StorageDsn;

/// Constructor inputs, minus the oracles: those aren't plain data so
/// `Builder::new` takes them as separate parameters.
#[derive(Debug, Clone, Default)]
pub struct BuilderConfig {
	pub alphabet: Vec<i64>,
	pub vertices: Vec<i64>,
	pub edges: Vec<(i64, i64)>,
	pub storage_dsn: StorageDsn,
}

/// The builder owns the store exclusively. It is not `Sync`, since
/// `rusqlite::Connection` isn't either, so the single-threaded-cooperative
/// usage model is enforced by the type system, not by convention.
pub struct Builder {
	store: Store,
	dead_state_id: i64,
}

impl Builder {
	/// Loads `config` into a fresh store, computes the epsilon-closure, and
	/// interns the dead state, all before returning, so every other method
	/// can assume a fully-prepared store.
	#[tracing::instrument(skip(config, nullable, matches))]
	pub fn new(
		config: BuilderConfig,
		mut nullable: impl FnMut(i64) -> bool,
		mut matches: impl FnMut(i64, i64) -> bool,
	) -> Result<Self, Error> {
		let mut store = Store::open(&config.storage_dsn)?;
		let input = LoadInput {
			alphabet: config.alphabet,
			vertices: config.vertices,
			edges: config.edges,
		};
		loader::load(store.conn_mut(), &input, &mut nullable, &mut matches)?;
		closure::build(store.conn())?;
		let dead_state_id = registry::dead_state_id(store.conn())?;
		Ok(Self { store, dead_state_id })
	}

	/// Closes `vertices` under epsilon-closure, canonicalizes, and either
	/// returns the interned state's ID or allocates a new one.
	pub fn find_or_create_state_id(&mut self, vertices: &[i64]) -> Result<i64, Error> {
		registry::find_or_create_state(self.store.conn(), vertices)
	}

	/// The ID of the state interned from the empty vertex list. Infallible:
	/// allocated in [`Builder::new`].
	pub fn dead_state_id(&self) -> i64 {
		self.dead_state_id
	}

	/// Picks up to `limit` unresolved `(state, input)` pairs, computes their
	/// target vertex sets, interns the results as new states, and records
	/// the resolved transitions. Returns the number resolved; zero signals
	/// the DFA is complete.
	pub fn compute_some_transitions(&mut self, limit: u32) -> Result<usize, Error> {
		expander::compute_some_transitions(self.store.conn_mut(), limit)
	}

	/// Decodes the canonical vertex-set key for `state_id`.
	pub fn vertices_in_state(&self, state_id: i64) -> Result<Vec<i64>, Error> {
		registry::vertices_in_state(self.store.conn(), state_id)
	}

	/// Every `(state_id, vertex_list)` pair present at call time, ascending
	/// by `state_id`, snapshotted eagerly: it is not required to observe
	/// states interned after this call.
	pub fn state_vertices_iterator(&self) -> Result<StateVerticesIter<'_>, Error> {
		let snapshot = registry::state_vertices_snapshot(self.store.conn())?;
		Ok(StateVerticesIter {
			inner: snapshot.into_iter(),
			_builder: std::marker::PhantomData,
		})
	}

	/// Every *resolved* transition, including those targeting the dead
	/// state. Unresolved rows (`dst IS NULL`) are excluded.
	pub fn transitions_as_3tuples(&self) -> Result<Vec<(i64, i64, i64)>, Error> {
		let mut stmt = self
			.store
			.conn()
			.prepare("SELECT src, input, dst FROM transition WHERE dst IS NOT NULL ORDER BY src, input")?;
		let rows = stmt
			.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
			.collect::<rusqlite::Result<Vec<_>>>()?;
		Ok(rows)
	}

	/// The join of DFA transitions with the NFA edges that witness them,
	/// i.e. the same `(v, w) in E, matches(v, i), dv in closure(w)` formula
	/// the expander uses to compute targets, read back out of the store
	/// instead of recomputed. A self-loop edge `(v, v)` witnesses itself
	/// through this same join with no special case needed. Transitions into
	/// the dead state are excluded: its vertex set is empty, so it has no
	/// witnessing edge by definition.
	pub fn transitions_as_5tuples(&self) -> Result<Vec<(i64, i64, i64, i64, i64)>, Error> {
		const SQL: &str = "
			SELECT t.src, e.src, t.input, t.dst, cl.reachable
			FROM transition t
			JOIN state src_state ON src_state.id = t.src
			JOIN json_each(src_state.vertex_str) sv ON 1 = 1
			JOIN edge e ON e.src = sv.value
			JOIN matches m ON m.vertex = e.src AND m.input = t.input
			JOIN closure cl ON cl.root = e.dst
			JOIN state dst_state ON dst_state.id = t.dst
			JOIN json_each(dst_state.vertex_str) dv ON dv.value = cl.reachable
			WHERE t.dst != ?1
			ORDER BY t.src, t.input, e.src, cl.reachable
		";
		let mut stmt = self.store.conn().prepare(SQL)?;
		let rows = stmt
			.query_map(params![self.dead_state_id], |row| {
				Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
			})?
			.collect::<rusqlite::Result<Vec<_>>>()?;
		Ok(rows)
	}

	/// Given an acceptance oracle over vertex sets, redirects every
	/// transition leading to a non-live state to the dead sink and drops the
	/// unreachable states. Returns the accepting state IDs.
	pub fn cleanup_dead_states(&mut self, mut accepts: impl FnMut(&[i64]) -> bool) -> Result<Vec<i64>, Error> {
		reducer::cleanup_dead_states(self.store.conn_mut(), &mut accepts)
	}

	/// Snapshots the entire store to `path`. `version` must be `"v0"`.
	pub fn backup_to_file(&self, version: &str, path: &Path) -> Result<(), Error> {
		self.store.backup_to_file(version, path)
	}
}

/// Iterator returned by [`Builder::state_vertices_iterator`]. Wraps an
/// eagerly-collected snapshot, so it is not required to observe subsequent
/// insertions, and it borrows nothing from the store so it can't deadlock
/// against it.
pub struct StateVerticesIter<'a> {
	inner: std::vec::IntoIter<(i64, Vec<i64>)>,
	_builder: std::marker::PhantomData<&'a Builder>,
}

impl Iterator for StateVerticesIter<'_> {
	type Item = (i64, Vec<i64>);

	fn next(&mut self) -> Option<Self::Item> {
		self.inner.next()
	}
}
