// Deckhand Engine — Incident Memory
// Tracks ongoing diagnostic sessions (investigations) per conversation
// thread and converts resolved ones into reusable troubleshooting patterns.
//
// Lifecycle per investigation: Active → Resolved, and nothing else — no
// cancellation, no reopening. Search is deliberately lexical: lower-cased
// whitespace tokens matched as substrings.

use log::{info, warn};
use uuid::Uuid;

use crate::atoms::constants::*;
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{now_ts, Investigation, InvestigationStep, Pattern};
use crate::engine::store::OpsStore;

// ── Lifecycle ──────────────────────────────────────────────────────────────

/// Start an investigation for a thread, or return the one already active.
///
/// Idempotent start: the read-then-conditionally-insert against the store
/// enforces at most one unresolved investigation per thread.
pub fn start_investigation(
    store: &OpsStore,
    thread_id: &str,
    symptom: &str,
) -> EngineResult<Investigation> {
    if let Some(active) = store.find_active_investigation(thread_id)? {
        info!(
            "[incidents] Thread {thread_id} already has active investigation {}",
            active.id
        );
        return Ok(active);
    }

    let inv = Investigation {
        id: Uuid::new_v4().to_string(),
        thread_id: thread_id.to_string(),
        trigger: symptom.to_string(),
        started_at: now_ts(),
        resolved: false,
        resolution: None,
    };
    store.insert_investigation(&inv)?;
    info!("[incidents] Started investigation {} for thread {thread_id}: {symptom}", inv.id);
    Ok(inv)
}

/// Append a diagnostic step. Fails with an invalid-state error (reported,
/// not fatal) if the investigation is already resolved.
pub fn record_step(
    store: &OpsStore,
    investigation_id: &str,
    action: &str,
    plugin: Option<&str>,
    result_summary: Option<&str>,
) -> EngineResult<InvestigationStep> {
    let inv = store.get_investigation(investigation_id)?;
    if inv.resolved {
        return Err(EngineError::invalid_state(format!(
            "investigation {investigation_id} is already resolved"
        )));
    }

    let step = InvestigationStep {
        id: Uuid::new_v4().to_string(),
        investigation_id: investigation_id.to_string(),
        action: action.to_string(),
        plugin: plugin.map(|p| p.to_string()),
        result_summary: result_summary.map(|r| r.to_string()),
        created_at: now_ts(),
    };
    store.insert_step(&step)?;
    Ok(step)
}

/// Resolve an investigation. One-way: resolving an already-resolved
/// investigation is an invalid-state error. When the investigation has at
/// least one step, pattern extraction runs before returning.
pub fn resolve_investigation(
    store: &OpsStore,
    investigation_id: &str,
    resolution: &str,
) -> EngineResult<Investigation> {
    let inv = store.get_investigation(investigation_id)?;
    if inv.resolved {
        return Err(EngineError::invalid_state(format!(
            "investigation {investigation_id} is already resolved"
        )));
    }

    store.mark_investigation_resolved(investigation_id, resolution)?;
    info!("[incidents] Resolved investigation {investigation_id}: {resolution}");

    if store.count_steps(investigation_id)? > 0 {
        let steps = store.steps_for_investigation(investigation_id)?;
        if let Err(e) = extract_pattern(store, &inv.trigger, resolution, &steps) {
            // Pattern extraction is derived data — losing one never fails
            // the resolution itself.
            warn!("[incidents] Pattern extraction failed for {investigation_id}: {e}");
        }
    }

    store.get_investigation(investigation_id)
}

// ── Pattern extraction ─────────────────────────────────────────────────────

/// Fold a resolved investigation into the pattern index.
///
/// An existing pattern with the identical symptom text gets its occurrence
/// count bumped and its resolution overwritten (not merged). Otherwise a
/// new pattern is created — but only when the resolution is non-empty.
fn extract_pattern(
    store: &OpsStore,
    symptom: &str,
    resolution: &str,
    steps: &[InvestigationStep],
) -> EngineResult<()> {
    let now = now_ts();

    if let Some(existing) = store.find_pattern_by_symptom(symptom)? {
        store.bump_pattern(&existing.id, Some(resolution), &now)?;
        info!(
            "[incidents] Pattern '{symptom}' seen again (count {})",
            existing.occurrence_count + 1
        );
        return Ok(());
    }

    if resolution.is_empty() {
        return Ok(());
    }

    let pattern = Pattern {
        id: Uuid::new_v4().to_string(),
        symptom: symptom.to_string(),
        common_cause: summarize_cause(steps),
        resolution: Some(resolution.to_string()),
        occurrence_count: 1,
        last_seen: now,
    };
    store.insert_pattern(&pattern)?;
    info!("[incidents] New pattern learned: '{symptom}'");
    Ok(())
}

/// Join the non-empty step summaries into a ≤200-char cause description,
/// truncated with an ellipsis when longer.
fn summarize_cause(steps: &[InvestigationStep]) -> Option<String> {
    let parts: Vec<&str> = steps
        .iter()
        .filter_map(|s| s.result_summary.as_deref())
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        return None;
    }

    let joined = parts.join("; ");
    if joined.chars().count() <= PATTERN_CAUSE_MAX_CHARS {
        return Some(joined);
    }
    let truncated: String = joined.chars().take(PATTERN_CAUSE_MAX_CHARS).collect();
    Some(format!("{truncated}…"))
}

// ── Search ─────────────────────────────────────────────────────────────────

fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

/// Score = number of query tokens present as substrings of the haystack.
fn token_score(tokens: &[String], haystack: &str) -> usize {
    let haystack = haystack.to_lowercase();
    tokens.iter().filter(|t| haystack.contains(t.as_str())).count()
}

/// Keyword search over the most recent resolved investigations.
///
/// Scores each of the 50 most recent resolved investigations by how many
/// query tokens appear in its trigger or resolution, keeps score > 0, and
/// orders by score descending then recency descending.
pub fn search_past_incidents(
    store: &OpsStore,
    symptom_query: &str,
    limit: usize,
) -> EngineResult<Vec<Investigation>> {
    let tokens = tokenize(symptom_query);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let pool = store.recent_resolved_investigations(INCIDENT_SEARCH_POOL)?;
    let mut scored: Vec<(usize, Investigation)> = pool
        .into_iter()
        .filter_map(|inv| {
            let haystack = format!(
                "{} {}",
                inv.trigger,
                inv.resolution.as_deref().unwrap_or("")
            );
            let score = token_score(&tokens, &haystack);
            (score > 0).then_some((score, inv))
        })
        .collect();

    // Pool comes back newest-first, so a stable sort by score keeps
    // recency as the tie-break.
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.truncate(limit);
    Ok(scored.into_iter().map(|(_, inv)| inv).collect())
}

/// Keyword match against the pattern index.
///
/// Candidates are pre-limited to the 20 most-frequent patterns *before*
/// token filtering — a pattern outside that pool never matches, even if
/// its symptom text would. Existing behavior, kept on purpose.
pub fn get_relevant_patterns(
    store: &OpsStore,
    symptom_query: &str,
    limit: usize,
) -> EngineResult<Vec<Pattern>> {
    let tokens = tokenize(symptom_query);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let mut candidates = store.top_patterns_by_occurrence(PATTERN_CANDIDATE_POOL)?;
    candidates.retain(|p| token_score(&tokens, &p.symptom) > 0);
    candidates.truncate(limit);
    Ok(candidates)
}

// ── Digests ────────────────────────────────────────────────────────────────

/// Build the incident context injected into a model prompt when a new
/// symptom comes in: up to 3 relevant patterns and up to 5 matching past
/// investigations. Empty string when neither produces anything.
pub fn generate_incident_context(store: &OpsStore, symptom: &str) -> EngineResult<String> {
    let patterns = get_relevant_patterns(store, symptom, PATTERN_MATCH_LIMIT)?;
    let incidents = search_past_incidents(store, symptom, INCIDENT_SEARCH_LIMIT)?;

    if patterns.is_empty() && incidents.is_empty() {
        return Ok(String::new());
    }

    let mut out = String::new();
    if !patterns.is_empty() {
        out.push_str("## Known patterns\n");
        for p in &patterns {
            out.push_str(&format!(
                "- '{}' (seen {}×)",
                p.symptom, p.occurrence_count
            ));
            if let Some(cause) = &p.common_cause {
                out.push_str(&format!(" — likely cause: {cause}"));
            }
            if let Some(res) = &p.resolution {
                out.push_str(&format!(" — last fix: {res}"));
            }
            out.push('\n');
        }
    }
    if !incidents.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("## Similar past incidents\n");
        for inv in &incidents {
            out.push_str(&format!("- {} ({})", inv.trigger, inv.started_at));
            if let Some(res) = &inv.resolution {
                out.push_str(&format!(" → {res}"));
            }
            out.push('\n');
        }
    }
    Ok(out)
}

/// Human-readable status of the active investigation on a thread.
pub fn get_investigation_status(store: &OpsStore, thread_id: &str) -> EngineResult<String> {
    let Some(inv) = store.find_active_investigation(thread_id)? else {
        return Ok("No active investigation on this thread.".to_string());
    };

    let steps = store.steps_for_investigation(&inv.id)?;
    let mut out = format!(
        "Investigating: {} (started {}, {} step(s))\n",
        inv.trigger,
        inv.started_at,
        steps.len()
    );
    for (i, step) in steps.iter().enumerate() {
        out.push_str(&format!("{}. {}", i + 1, step.action));
        if let Some(plugin) = &step.plugin {
            out.push_str(&format!(" [{plugin}]"));
        }
        if let Some(result) = &step.result_summary {
            out.push_str(&format!(" — {result}"));
        }
        out.push('\n');
    }
    Ok(out)
}
