// Deckhand Engine — Ops Store
// Durable state for the belief-maintenance core, in SQLite via rusqlite.
//
// One struct, impl blocks split per table group:
//   facts           — fact CRUD, topic-prefix queries, admin pages, stats
//   investigations  — investigation + step CRUD, active-per-thread lookup
//   patterns        — symptom → cause → resolution records
//   config          — key/value engine config store
//   schema          — idempotent migrations
//
// Every logical operation is a single self-contained read-modify-write on
// one connection; no multi-operation transactions are needed.

use crate::atoms::error::EngineResult;
use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;

mod config;
mod facts;
mod investigations;
mod patterns;
mod schema;

// ── Re-exports (admin surface types live next to their SQL) ────────────────

pub use facts::{FactUpdate, KnowledgeStats};

/// Thread-safe database wrapper.
pub struct OpsStore {
    /// The SQLite connection, protected by a Mutex.
    conn: Mutex<Connection>,
}

impl OpsStore {
    /// Open (or create) the engine database and initialize tables.
    pub fn open() -> EngineResult<Self> {
        let path = crate::engine::paths::engine_db_path();
        info!("[store] Opening ops store at {:?}", path);

        let conn = Connection::open(&path)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    /// Direct SQL escape hatch for unit tests (backdating timestamps and
    /// the like). Not compiled into release builds.
    #[cfg(test)]
    pub(crate) fn execute_for_testing(&self, sql: &str) {
        self.conn.lock().execute_batch(sql).expect("test sql failed");
    }

    fn init(conn: Connection) -> EngineResult<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        // Steps are cascade-deleted with their parent investigation.
        conn.execute_batch("PRAGMA foreign_keys=ON;").ok();

        schema::run_migrations(&conn)?;

        Ok(OpsStore {
            conn: Mutex::new(conn),
        })
    }
}
