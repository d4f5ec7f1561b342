//! Input loader: ingests alphabet, vertices, and edges, and invokes the
//! host `nullable`/`matches` oracles to populate their tables.
//!
//! Runs as one transaction so that an oracle panic rolls the whole load back
//! to an empty store rather than leaving partially-loaded tables around.

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::params;

use crate::error::Error;
use crate::error::check_id;
use crate::error::invoke_oracle;

/// The constructor inputs, minus the oracles and the DSN (those are
/// supplied separately since they aren't plain data).
#[derive(Debug, Clone, Default)]
pub struct LoadInput {
	pub alphabet: Vec<i64>,
	pub vertices: Vec<i64>,
	pub edges: Vec<(i64, i64)>,
}

pub(crate) fn load(
	conn: &mut Connection,
	input: &LoadInput,
	nullable: &mut dyn FnMut(i64) -> bool,
	matches: &mut dyn FnMut(i64, i64) -> bool,
) -> Result<(), Error> {
	for &symbol in &input.alphabet {
		check_id(symbol)?;
	}
	for &vertex in &input.vertices {
		check_id(vertex)?;
	}
	for &(src, dst) in &input.edges {
		check_id(src)?;
		check_id(dst)?;
	}

	let tx = conn.transaction()?;
	load_alphabet(&tx, &input.alphabet)?;
	for &vertex in &input.vertices {
		ensure_vertex(&tx, vertex, nullable)?;
	}
	for &(src, dst) in &input.edges {
		ensure_vertex(&tx, src, nullable)?;
		ensure_vertex(&tx, dst, nullable)?;
		tx.execute("INSERT OR IGNORE INTO edge (src, dst) VALUES (?1, ?2)", params![src, dst])?;
	}
	load_matches(&tx, matches)?;
	tx.commit()?;
	Ok(())
}

fn load_alphabet(tx: &Transaction<'_>, alphabet: &[i64]) -> Result<(), Error> {
	let mut stmt = tx.prepare("INSERT OR IGNORE INTO alphabet (symbol) VALUES (?1)")?;
	for &symbol in alphabet {
		stmt.execute(params![symbol])?;
	}
	Ok(())
}

/// Register `vertex` if it isn't already present, invoking `nullable` at
/// most once for it.
fn ensure_vertex(tx: &Transaction<'_>, vertex: i64, nullable: &mut dyn FnMut(i64) -> bool) -> Result<(), Error> {
	let already_present: bool = tx
		.query_row("SELECT 1 FROM vertex WHERE id = ?1", params![vertex], |_| Ok(()))
		.optional()?
		.is_some();
	if already_present {
		return Ok(());
	}
	let is_nullable = invoke_oracle(|| nullable(vertex))?;
	tx.execute(
		"INSERT INTO vertex (id, nullable) VALUES (?1, ?2)",
		params![vertex, is_nullable as i64],
	)?;
	Ok(())
}

/// Populate `matches` as `{(v, i) : matches_oracle(v, i)}` over the full
/// cross-product of every registered vertex and every alphabet symbol.
fn load_matches(tx: &Transaction<'_>, matches: &mut dyn FnMut(i64, i64) -> bool) -> Result<(), Error> {
	let vertices: Vec<i64> = {
		let mut stmt = tx.prepare("SELECT id FROM vertex")?;
		stmt.query_map([], |row| row.get(0))?.collect::<rusqlite::Result<_>>()?
	};
	let symbols: Vec<i64> = {
		let mut stmt = tx.prepare("SELECT symbol FROM alphabet")?;
		stmt.query_map([], |row| row.get(0))?.collect::<rusqlite::Result<_>>()?
	};
	let mut insert = tx.prepare("INSERT INTO matches (vertex, input) VALUES (?1, ?2)")?;
	for &v in &vertices {
		for &i in &symbols {
			if invoke_oracle(|| matches(v, i))? {
				insert.execute(params![v, i])?;
			}
		}
	}
	Ok(())
}
