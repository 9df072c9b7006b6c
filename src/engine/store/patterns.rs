use rusqlite::params;

use super::OpsStore;
use crate::atoms::error::EngineResult;
use crate::atoms::types::Pattern;

impl Pattern {
    /// Map a row with columns (id, symptom, common_cause, resolution,
    /// occurrence_count, last_seen) → Pattern.
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Pattern {
            id: row.get(0)?,
            symptom: row.get(1)?,
            common_cause: row.get(2)?,
            resolution: row.get(3)?,
            occurrence_count: row.get(4)?,
            last_seen: row.get(5)?,
        })
    }
}

const PATTERN_COLUMNS: &str = "id, symptom, common_cause, resolution, occurrence_count, last_seen";

impl OpsStore {
    // ── Pattern CRUD ───────────────────────────────────────────────────

    pub fn insert_pattern(&self, pattern: &Pattern) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO patterns (id, symptom, common_cause, resolution, occurrence_count, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                pattern.id,
                pattern.symptom,
                pattern.common_cause,
                pattern.resolution,
                pattern.occurrence_count,
                pattern.last_seen,
            ],
        )?;
        Ok(())
    }

    /// Pattern with this exact symptom text, if any. Patterns are keyed by
    /// exact match — deliberately no fuzzy lookup here.
    pub fn find_pattern_by_symptom(&self, symptom: &str) -> EngineResult<Option<Pattern>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE symptom = ?1 LIMIT 1"),
            params![symptom],
            Pattern::from_row,
        );
        match result {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Recurrence: bump the count, refresh last_seen, and overwrite the
    /// resolution when the new one is non-empty (overwrite, not merge).
    pub fn bump_pattern(
        &self,
        id: &str,
        resolution: Option<&str>,
        last_seen: &str,
    ) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE patterns SET occurrence_count = occurrence_count + 1, last_seen = ?2 WHERE id = ?1",
            params![id, last_seen],
        )?;
        if let Some(res) = resolution {
            if !res.is_empty() {
                conn.execute(
                    "UPDATE patterns SET resolution = ?2 WHERE id = ?1",
                    params![id, res],
                )?;
            }
        }
        Ok(())
    }

    /// The most-frequent patterns. This is the candidate pool for keyword
    /// matching — a pattern outside the pool never matches, even if its
    /// symptom text would.
    pub fn top_patterns_by_occurrence(&self, limit: usize) -> EngineResult<Vec<Pattern>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PATTERN_COLUMNS} FROM patterns
             ORDER BY occurrence_count DESC, last_seen DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], Pattern::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
