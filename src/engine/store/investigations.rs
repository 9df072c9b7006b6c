use rusqlite::params;

use super::OpsStore;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{Investigation, InvestigationStep, Page};

impl Investigation {
    /// Map a row with columns (id, thread_id, trigger_text, started_at,
    /// resolved, resolution) → Investigation.
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Investigation {
            id: row.get(0)?,
            thread_id: row.get(1)?,
            trigger: row.get(2)?,
            started_at: row.get(3)?,
            resolved: row.get::<_, i64>(4)? != 0,
            resolution: row.get(5)?,
        })
    }
}

impl InvestigationStep {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(InvestigationStep {
            id: row.get(0)?,
            investigation_id: row.get(1)?,
            action: row.get(2)?,
            plugin: row.get(3)?,
            result_summary: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

const INVESTIGATION_COLUMNS: &str = "id, thread_id, trigger_text, started_at, resolved, resolution";
const STEP_COLUMNS: &str = "id, investigation_id, action, plugin, result_summary, created_at";

impl OpsStore {
    // ── Investigation CRUD ─────────────────────────────────────────────

    pub fn insert_investigation(&self, inv: &Investigation) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO investigations (id, thread_id, trigger_text, started_at, resolved, resolution)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                inv.id,
                inv.thread_id,
                inv.trigger,
                inv.started_at,
                inv.resolved as i64,
                inv.resolution,
            ],
        )?;
        Ok(())
    }

    /// The single unresolved investigation for a thread, if one exists.
    /// The durable store is the source of truth for the one-active-per-
    /// thread invariant; any in-memory index is only a hint.
    pub fn find_active_investigation(&self, thread_id: &str) -> EngineResult<Option<Investigation>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!(
                "SELECT {INVESTIGATION_COLUMNS} FROM investigations
                 WHERE thread_id = ?1 AND resolved = 0
                 ORDER BY started_at ASC LIMIT 1"
            ),
            params![thread_id],
            Investigation::from_row,
        );
        match result {
            Ok(inv) => Ok(Some(inv)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_investigation(&self, id: &str) -> EngineResult<Investigation> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!("SELECT {INVESTIGATION_COLUMNS} FROM investigations WHERE id = ?1"),
            params![id],
            Investigation::from_row,
        );
        match result {
            Ok(inv) => Ok(inv),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(EngineError::not_found(format!("investigation {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// One-way transition to resolved. The caller has already checked the
    /// current state; this is just the write.
    pub fn mark_investigation_resolved(&self, id: &str, resolution: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE investigations SET resolved = 1, resolution = ?2 WHERE id = ?1",
            params![id, resolution],
        )?;
        Ok(())
    }

    /// Most recent resolved investigations, newest first. This is the
    /// candidate pool for keyword incident search.
    pub fn recent_resolved_investigations(&self, limit: usize) -> EngineResult<Vec<Investigation>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {INVESTIGATION_COLUMNS} FROM investigations
             WHERE resolved = 1
             ORDER BY started_at DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], Investigation::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // ── Steps ──────────────────────────────────────────────────────────

    pub fn insert_step(&self, step: &InvestigationStep) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO investigation_steps (id, investigation_id, action, plugin, result_summary, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                step.id,
                step.investigation_id,
                step.action,
                step.plugin,
                step.result_summary,
                step.created_at,
            ],
        )?;
        Ok(())
    }

    /// Ordered steps for an investigation (append order).
    pub fn steps_for_investigation(&self, investigation_id: &str) -> EngineResult<Vec<InvestigationStep>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {STEP_COLUMNS} FROM investigation_steps
             WHERE investigation_id = ?1
             ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![investigation_id], InvestigationStep::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn count_steps(&self, investigation_id: &str) -> EngineResult<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM investigation_steps WHERE investigation_id = ?1",
            params![investigation_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    // ── Admin read surface ─────────────────────────────────────────────

    /// Paginated investigation listing, newest first. `page` is 1-based.
    pub fn list_investigations_page(
        &self,
        page: i64,
        page_size: i64,
        resolved_filter: Option<bool>,
    ) -> EngineResult<Page<Investigation>> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 500);
        let conn = self.conn.lock();

        let where_clause = match resolved_filter {
            Some(true) => "resolved = 1",
            Some(false) => "resolved = 0",
            None => "1 = 1",
        };

        let total_count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM investigations WHERE {where_clause}"),
            [],
            |r| r.get(0),
        )?;

        let offset = (page - 1) * page_size;
        let mut stmt = conn.prepare(&format!(
            "SELECT {INVESTIGATION_COLUMNS} FROM investigations
             WHERE {where_clause}
             ORDER BY started_at DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![page_size, offset], Investigation::from_row)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }

        Ok(Page {
            items,
            total_count,
            page,
            page_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> OpsStore {
        OpsStore::open_in_memory().unwrap()
    }

    fn investigation(thread_id: &str, trigger: &str, started_at: &str, resolved: bool) -> Investigation {
        Investigation {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            trigger: trigger.to_string(),
            started_at: started_at.to_string(),
            resolved,
            resolution: resolved.then(|| "fixed".to_string()),
        }
    }

    #[test]
    fn test_list_investigations_page_with_resolved_filter() {
        let s = store();
        s.insert_investigation(&investigation("t1", "network slow", "2025-06-01T00:00:00+00:00", true)).unwrap();
        s.insert_investigation(&investigation("t2", "disk full", "2025-06-02T00:00:00+00:00", true)).unwrap();
        s.insert_investigation(&investigation("t3", "dns flaky", "2025-06-03T00:00:00+00:00", false)).unwrap();

        let all = s.list_investigations_page(1, 10, None).unwrap();
        assert_eq!(all.total_count, 3);
        // Newest first
        assert_eq!(all.items[0].trigger, "dns flaky");

        let resolved = s.list_investigations_page(1, 10, Some(true)).unwrap();
        assert_eq!(resolved.total_count, 2);
        assert!(resolved.items.iter().all(|i| i.resolved));

        let open = s.list_investigations_page(1, 10, Some(false)).unwrap();
        assert_eq!(open.total_count, 1);
        assert_eq!(open.items[0].trigger, "dns flaky");

        // Pagination math and page clamp
        let second = s.list_investigations_page(2, 2, None).unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].trigger, "network slow");
        assert_eq!(s.list_investigations_page(0, 2, None).unwrap().page, 1);
    }

    #[test]
    fn test_get_investigation_unknown_id_is_not_found() {
        let s = store();
        let err = s.get_investigation("no-such-id").unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
