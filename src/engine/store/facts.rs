use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::OpsStore;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{Fact, FactSource, Page};

impl Fact {
    /// Map a row with columns (id, topic, fact, context, confidence, source,
    /// is_valid, last_verified, contradicts, created_at, last_used) → Fact.
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let source: String = row.get(5)?;
        Ok(Fact {
            id: row.get(0)?,
            topic: row.get(1)?,
            fact: row.get(2)?,
            context: row.get(3)?,
            confidence: row.get(4)?,
            source: FactSource::from_str_lossy(&source),
            is_valid: row.get::<_, i64>(6)? != 0,
            last_verified: row.get(7)?,
            contradicts: row.get(8)?,
            created_at: row.get(9)?,
            last_used: row.get(10)?,
        })
    }
}

const FACT_COLUMNS: &str = "id, topic, fact, context, confidence, source, \
                            is_valid, last_verified, contradicts, created_at, last_used";

/// Field mask for admin fact mutations. `None` = leave unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactUpdate {
    pub fact: Option<String>,
    pub context: Option<String>,
    pub confidence: Option<f64>,
    pub is_valid: Option<bool>,
}

/// Aggregate counts for the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub total_facts: i64,
    pub valid_facts: i64,
    pub invalid_facts: i64,
    pub average_confidence: f64,
    /// (category, valid fact count), most populated first.
    pub categories: Vec<(String, i64)>,
}

impl OpsStore {
    // ── Fact CRUD ──────────────────────────────────────────────────────

    pub fn insert_fact(&self, fact: &Fact) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO facts (id, topic, fact, context, confidence, source,
                                is_valid, last_verified, contradicts, created_at, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                fact.id,
                fact.topic,
                fact.fact,
                fact.context,
                fact.confidence,
                fact.source.as_str(),
                fact.is_valid as i64,
                fact.last_verified,
                fact.contradicts,
                fact.created_at,
                fact.last_used,
            ],
        )?;
        Ok(())
    }

    /// Find the valid fact with this exact (topic, fact) pair, if any.
    /// This is the dedup lookup behind remember_fact.
    pub fn find_valid_fact(&self, topic: &str, fact: &str) -> EngineResult<Option<Fact>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!(
                "SELECT {FACT_COLUMNS} FROM facts
                 WHERE is_valid = 1 AND topic = ?1 AND fact = ?2
                 LIMIT 1"
            ),
            params![topic, fact],
            Fact::from_row,
        );
        match result {
            Ok(f) => Ok(Some(f)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-assertion merge: raise confidence and refresh last_verified.
    pub fn bump_fact_verified(&self, id: &str, confidence: f64, now: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE facts SET confidence = ?2, last_verified = ?3 WHERE id = ?1",
            params![id, confidence, now],
        )?;
        Ok(())
    }

    /// Valid facts, optionally filtered by exact topic or `topic:` prefix,
    /// ordered by confidence descending.
    pub fn facts_by_topic(&self, topic: Option<&str>) -> EngineResult<Vec<Fact>> {
        let conn = self.conn.lock();
        let mut out = Vec::new();
        match topic {
            Some(t) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {FACT_COLUMNS} FROM facts
                     WHERE is_valid = 1 AND (topic = ?1 OR topic LIKE ?1 || ':%')
                     ORDER BY confidence DESC"
                ))?;
                let rows = stmt.query_map(params![t], Fact::from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {FACT_COLUMNS} FROM facts
                     WHERE is_valid = 1
                     ORDER BY confidence DESC"
                ))?;
                let rows = stmt.query_map([], Fact::from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    /// Valid facts under a topic whose text contains `substring`,
    /// confidence descending. Used by corrections and invalidation.
    pub fn find_valid_facts_containing(
        &self,
        topic: &str,
        substring: &str,
    ) -> EngineResult<Vec<Fact>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FACT_COLUMNS} FROM facts
             WHERE is_valid = 1 AND topic = ?1 AND instr(fact, ?2) > 0
             ORDER BY confidence DESC"
        ))?;
        let rows = stmt.query_map(params![topic, substring], Fact::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Every valid fact, unordered. Decay and the reconcile stale pass
    /// iterate this in Rust — fact volume is small by design.
    pub fn all_valid_facts(&self) -> EngineResult<Vec<Fact>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FACT_COLUMNS} FROM facts WHERE is_valid = 1"
        ))?;
        let rows = stmt.query_map([], Fact::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Whether any valid fact exists under this exact topic.
    pub fn topic_has_valid_fact(&self, topic: &str) -> EngineResult<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM facts WHERE is_valid = 1 AND topic = ?1",
            params![topic],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// Stamp last_used on a set of facts (recall counts as use).
    pub fn mark_facts_used(&self, ids: &[String], now: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        for id in ids {
            conn.execute(
                "UPDATE facts SET last_used = ?2 WHERE id = ?1",
                params![id, now],
            )?;
        }
        Ok(())
    }

    /// Soft-delete: facts are never hard-deleted, so correction chains
    /// (`contradicts` back-references) stay reconstructable.
    pub fn set_fact_validity(&self, id: &str, valid: bool) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE facts SET is_valid = ?2 WHERE id = ?1",
            params![id, valid as i64],
        )?;
        Ok(())
    }

    /// Update confidence in place. Does not touch last_verified.
    pub fn set_fact_confidence(&self, id: &str, confidence: f64) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE facts SET confidence = ?2 WHERE id = ?1",
            params![id, confidence],
        )?;
        Ok(())
    }

    // ── Admin read surface ─────────────────────────────────────────────

    pub fn get_fact(&self, id: &str) -> EngineResult<Fact> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!("SELECT {FACT_COLUMNS} FROM facts WHERE id = ?1"),
            params![id],
            Fact::from_row,
        );
        match result {
            Ok(f) => Ok(f),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(EngineError::not_found(format!("fact {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Paginated fact listing for the admin dashboard. `page` is 1-based.
    pub fn list_facts_page(
        &self,
        page: i64,
        page_size: i64,
        topic_filter: Option<&str>,
        include_invalid: bool,
    ) -> EngineResult<Page<Fact>> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 500);
        let conn = self.conn.lock();

        let validity = if include_invalid { "1 = 1" } else { "is_valid = 1" };
        let (where_clause, filter) = match topic_filter {
            Some(t) => (
                format!("{validity} AND (topic = ?1 OR topic LIKE ?1 || ':%')"),
                Some(t.to_string()),
            ),
            None => (validity.to_string(), None),
        };

        let total_count: i64 = match &filter {
            Some(t) => conn.query_row(
                &format!("SELECT COUNT(*) FROM facts WHERE {where_clause}"),
                params![t],
                |r| r.get(0),
            )?,
            None => conn.query_row(
                &format!("SELECT COUNT(*) FROM facts WHERE {where_clause}"),
                [],
                |r| r.get(0),
            )?,
        };

        let offset = (page - 1) * page_size;
        let mut items = Vec::new();
        match &filter {
            Some(t) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {FACT_COLUMNS} FROM facts WHERE {where_clause}
                     ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
                ))?;
                let rows = stmt.query_map(params![t, page_size, offset], Fact::from_row)?;
                for row in rows {
                    items.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {FACT_COLUMNS} FROM facts WHERE {where_clause}
                     ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
                ))?;
                let rows = stmt.query_map(params![page_size, offset], Fact::from_row)?;
                for row in rows {
                    items.push(row?);
                }
            }
        }

        Ok(Page {
            items,
            total_count,
            page,
            page_size,
        })
    }

    /// Admin field mutation. Confidence is clamped to [0,1] here as well,
    /// so no write path can break the invariant.
    pub fn update_fact_fields(&self, id: &str, update: &FactUpdate) -> EngineResult<Fact> {
        // Existence check first so the caller gets NotFound, not a no-op.
        self.get_fact(id)?;

        let conn = self.conn.lock();
        if let Some(fact) = &update.fact {
            conn.execute("UPDATE facts SET fact = ?2 WHERE id = ?1", params![id, fact])?;
        }
        if let Some(context) = &update.context {
            conn.execute(
                "UPDATE facts SET context = ?2 WHERE id = ?1",
                params![id, context],
            )?;
        }
        if let Some(confidence) = update.confidence {
            conn.execute(
                "UPDATE facts SET confidence = ?2 WHERE id = ?1",
                params![id, confidence.clamp(0.0, 1.0)],
            )?;
        }
        if let Some(is_valid) = update.is_valid {
            conn.execute(
                "UPDATE facts SET is_valid = ?2 WHERE id = ?1",
                params![id, is_valid as i64],
            )?;
        }
        drop(conn);

        self.get_fact(id)
    }

    pub fn knowledge_stats(&self) -> EngineResult<KnowledgeStats> {
        let conn = self.conn.lock();

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM facts", [], |r| r.get(0))?;
        let valid: i64 = conn.query_row(
            "SELECT COUNT(*) FROM facts WHERE is_valid = 1",
            [],
            |r| r.get(0),
        )?;
        let avg: f64 = conn
            .query_row(
                "SELECT AVG(confidence) FROM facts WHERE is_valid = 1",
                [],
                |r| r.get(0),
            )
            .unwrap_or(0.0);

        let mut stmt = conn.prepare(
            "SELECT CASE WHEN instr(topic, ':') > 0
                         THEN substr(topic, 1, instr(topic, ':') - 1)
                         ELSE topic END AS category,
                    COUNT(*)
             FROM facts WHERE is_valid = 1
             GROUP BY category ORDER BY COUNT(*) DESC",
        )?;
        let categories: Vec<(String, i64)> = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(KnowledgeStats {
            total_facts: total,
            valid_facts: valid,
            invalid_facts: total - valid,
            average_confidence: avg,
            categories,
        })
    }
}
