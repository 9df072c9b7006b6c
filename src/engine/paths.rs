// Deckhand Engine — Filesystem paths
// Everything durable lives under ~/.deckhand.

use std::path::PathBuf;

/// Directory holding the engine's durable state.
pub fn data_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_default();
    let dir = home.join(".deckhand");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Path to the engine's SQLite database.
pub fn engine_db_path() -> PathBuf {
    data_dir().join("engine.db")
}
