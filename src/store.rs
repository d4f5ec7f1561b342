//! Indexed relational storage backing every other module. Backed by SQLite
//! via `rusqlite`: the six relations are plain tables, the recursive closure
//! fixpoint is a `WITH RECURSIVE` query, and the vertex-set codec is
//! registered as a SQLite aggregate (`codec::register`) so it can run inside
//! `GROUP BY` queries without a host round-trip.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use rusqlite::Connection;

use crate::codec;
use crate::error::Error;

/// Where the store lives: `storage_dsn`, default ephemeral in-memory.
#[derive(Debug, Clone)]
pub enum StorageDsn {
	/// Ephemeral, process-local. The default.
	Memory,
	/// Backed by a file on disk; survives the process.
	File(PathBuf),
}

impl Default for StorageDsn {
	fn default() -> Self {
		Self::Memory
	}
}

pub(crate) const SCHEMA_SQL: &str = "
CREATE TABLE alphabet (
	symbol INTEGER PRIMARY KEY
);

CREATE TABLE vertex (
	id INTEGER PRIMARY KEY,
	nullable INTEGER NOT NULL CHECK (nullable IN (0, 1))
);

CREATE TABLE edge (
	src INTEGER NOT NULL REFERENCES vertex(id),
	dst INTEGER NOT NULL REFERENCES vertex(id),
	PRIMARY KEY (src, dst)
);
CREATE INDEX idx_edge_src ON edge(src);

CREATE TABLE matches (
	vertex INTEGER NOT NULL REFERENCES vertex(id),
	input INTEGER NOT NULL REFERENCES alphabet(symbol),
	PRIMARY KEY (vertex, input)
);

CREATE TABLE closure (
	root INTEGER NOT NULL REFERENCES vertex(id),
	reachable INTEGER NOT NULL REFERENCES vertex(id),
	PRIMARY KEY (root, reachable)
);
CREATE INDEX idx_closure_root ON closure(root);

CREATE TABLE state (
	id INTEGER PRIMARY KEY AUTOINCREMENT,
	vertex_str TEXT NOT NULL UNIQUE,
	distance INTEGER NOT NULL
);
CREATE INDEX idx_state_distance ON state(distance);

CREATE TABLE transition (
	src INTEGER NOT NULL REFERENCES state(id) ON DELETE CASCADE,
	input INTEGER NOT NULL REFERENCES alphabet(symbol),
	dst INTEGER REFERENCES state(id),
	PRIMARY KEY (src, input)
);
CREATE INDEX idx_transition_pending ON transition(src) WHERE dst IS NULL;
CREATE INDEX idx_transition_dst ON transition(dst);
";

/// The store, and everything sitting on top of the raw connection: pragma
/// setup and the codec aggregate are established once, in [`Store::open`].
pub struct Store {
	conn: Connection,
}

impl Store {
	pub fn open(dsn: &StorageDsn) -> Result<Self, Error> {
		let conn = match dsn {
			StorageDsn::Memory => Connection::open_in_memory()?,
			StorageDsn::File(path) => Connection::open(path)?,
		};
		conn.pragma_update(None, "foreign_keys", true)?;
		codec::register(&conn)?;
		conn.execute_batch(SCHEMA_SQL)?;
		Ok(Self { conn })
	}

	pub(crate) fn conn(&self) -> &Connection {
		&self.conn
	}

	pub(crate) fn conn_mut(&mut self) -> &mut Connection {
		&mut self.conn
	}

	/// Snapshot the entire store to `path`. `version` must be `"v0"`; any
	/// other value is a fatal [`Error::VersionMismatch`] (the version tag
	/// leaves room to change the format later without silently mis-reading
	/// an old snapshot).
	pub fn backup_to_file(&self, version: &str, path: &Path) -> Result<(), Error> {
		if version != "v0" {
			return Err(Error::VersionMismatch {
				expected: "v0",
				got: version.to_owned(),
			});
		}
		let mut dst = Connection::open(path)?;
		let backup = rusqlite::backup::Backup::new(&self.conn, &mut dst)?;
		backup.run_to_completion(100, Duration::from_millis(0), None)?;
		Ok(())
	}
}
