// Database schema and migrations for the Deckhand ops store.
// Called once at startup by OpsStore::open() after WAL is enabled.
// Adding a new table or column: append an idempotent CREATE TABLE IF NOT EXISTS
// or ALTER TABLE … ADD COLUMN (errors are silently swallowed) at the end of
// run_migrations() — never modify existing SQL to keep upgrade paths clean.

use crate::atoms::error::EngineResult;
use rusqlite::Connection;

pub(crate) fn run_migrations(conn: &Connection) -> EngineResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS facts (
            id TEXT PRIMARY KEY,
            topic TEXT NOT NULL,
            fact TEXT NOT NULL,
            context TEXT,
            confidence REAL NOT NULL DEFAULT 0.8,
            source TEXT NOT NULL DEFAULT 'discovered',
            is_valid INTEGER NOT NULL DEFAULT 1,
            last_verified TEXT,
            contradicts TEXT,
            created_at TEXT NOT NULL,
            last_used TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_facts_topic ON facts(topic);
        CREATE INDEX IF NOT EXISTS idx_facts_valid ON facts(is_valid, topic);

        CREATE TABLE IF NOT EXISTS investigations (
            id TEXT PRIMARY KEY,
            thread_id TEXT NOT NULL,
            trigger_text TEXT NOT NULL,
            started_at TEXT NOT NULL,
            resolved INTEGER NOT NULL DEFAULT 0,
            resolution TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_investigations_thread
            ON investigations(thread_id, resolved);

        CREATE TABLE IF NOT EXISTS investigation_steps (
            id TEXT PRIMARY KEY,
            investigation_id TEXT NOT NULL,
            action TEXT NOT NULL,
            plugin TEXT,
            result_summary TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (investigation_id) REFERENCES investigations(id)
                ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_steps_investigation
            ON investigation_steps(investigation_id, created_at);

        CREATE TABLE IF NOT EXISTS patterns (
            id TEXT PRIMARY KEY,
            symptom TEXT NOT NULL,
            common_cause TEXT,
            resolution TEXT,
            occurrence_count INTEGER NOT NULL DEFAULT 1,
            last_seen TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_patterns_symptom ON patterns(symptom);

        CREATE TABLE IF NOT EXISTS engine_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;

    Ok(())
}
