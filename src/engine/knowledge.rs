// Deckhand Engine — Knowledge System
// Policy layer over the fact table: dedup-merge on re-assertion, stale
// cutoff on recall, alias resolution, corrections, and time decay.
//
// Matching throughout this module is deliberately lexical (exact topics,
// substring containment). Confidence is the only ranking signal.

use std::collections::HashSet;

use chrono::Utc;
use log::{debug, info};
use uuid::Uuid;

use crate::atoms::constants::*;
use crate::atoms::error::EngineResult;
use crate::atoms::types::{now_ts, parse_ts, Fact, FactSource};
use crate::engine::store::OpsStore;

// ── Store ──────────────────────────────────────────────────────────────────

/// Remember a fact under a topic.
///
/// If a valid fact with the identical (topic, fact) pair already exists,
/// this merges instead of inserting: confidence is raised to the max of
/// old and new, and last_verified is refreshed. Re-assertion is evidence.
pub fn remember_fact(
    store: &OpsStore,
    topic: &str,
    fact_text: &str,
    context: Option<&str>,
    source: FactSource,
    confidence: f64,
) -> EngineResult<Fact> {
    let confidence = confidence.clamp(0.0, 1.0);
    let now = now_ts();

    if let Some(existing) = store.find_valid_fact(topic, fact_text)? {
        let merged = existing.confidence.max(confidence);
        store.bump_fact_verified(&existing.id, merged, &now)?;
        debug!(
            "[knowledge] Re-asserted {} → confidence {:.2}",
            topic, merged
        );
        return Ok(Fact {
            confidence: merged,
            last_verified: Some(now),
            ..existing
        });
    }

    let fact = Fact {
        id: Uuid::new_v4().to_string(),
        topic: topic.to_string(),
        fact: fact_text.to_string(),
        context: context.map(|c| c.to_string()),
        confidence,
        source,
        is_valid: true,
        last_verified: Some(now.clone()),
        contradicts: None,
        created_at: now,
        last_used: None,
    };
    store.insert_fact(&fact)?;
    info!(
        "[knowledge] Learned {} ({}, confidence {:.2})",
        topic,
        source.as_str(),
        confidence
    );
    Ok(fact)
}

// ── Recall ─────────────────────────────────────────────────────────────────

/// Recall valid facts, optionally filtered by exact topic or `topic:`
/// prefix, ordered by confidence descending.
///
/// Unless `include_stale` is set, facts at or below the stale cutoff are
/// hidden (they remain in storage). Recall counts as use: every returned
/// fact gets its last_used stamped.
pub fn recall(
    store: &OpsStore,
    topic: Option<&str>,
    include_stale: bool,
) -> EngineResult<Vec<Fact>> {
    let mut facts = store.facts_by_topic(topic)?;
    if !include_stale {
        facts.retain(|f| f.confidence > STALE_CONFIDENCE_CUTOFF);
    }

    if !facts.is_empty() {
        let now = now_ts();
        let ids: Vec<String> = facts.iter().map(|f| f.id.clone()).collect();
        store.mark_facts_used(&ids, &now)?;
        for fact in &mut facts {
            fact.last_used = Some(now.clone());
        }
    }

    debug!(
        "[knowledge] Recall topic={:?} stale={} → {} facts",
        topic,
        include_stale,
        facts.len()
    );
    Ok(facts)
}

// ── Aliases ────────────────────────────────────────────────────────────────

/// Resolve a user-facing name through `alias:{alias_type}` facts.
///
/// Alias facts encode `"name → value"` pairs as their fact text. A
/// case-insensitive substring match in either direction between the alias
/// name and the user input wins; candidates are scanned in confidence-
/// descending order and the first match is returned.
///
/// No stale cutoff here: an alias the user taught once should keep
/// resolving even after its confidence has decayed.
pub fn resolve_alias(
    store: &OpsStore,
    alias_type: &str,
    user_input: &str,
) -> EngineResult<Option<String>> {
    let topic = format!("alias:{alias_type}");
    let candidates = store.facts_by_topic(Some(&topic))?;
    let input = user_input.to_lowercase();

    for fact in &candidates {
        if let Some((name, value)) = split_alias(&fact.fact) {
            let name_lc = name.to_lowercase();
            if name_lc.contains(&input) || input.contains(&name_lc) {
                debug!("[knowledge] Alias {alias_type}: '{user_input}' → '{value}'");
                return Ok(Some(value.to_string()));
            }
        }
    }
    Ok(None)
}

/// Split `"name → value"` alias text. Accepts ASCII `"->"` as well since
/// models sometimes emit it.
fn split_alias(text: &str) -> Option<(&str, &str)> {
    for sep in [" → ", "→", " -> ", "->"] {
        if let Some((name, value)) = text.split_once(sep) {
            let (name, value) = (name.trim(), value.trim());
            if !name.is_empty() && !value.is_empty() {
                return Some((name, value));
            }
        }
    }
    None
}

/// Store a `"name → value"` alias under `alias:{alias_type}` as a
/// user-told, full-confidence fact.
pub fn store_alias(
    store: &OpsStore,
    alias_type: &str,
    name: &str,
    value: &str,
) -> EngineResult<Fact> {
    remember_fact(
        store,
        &format!("alias:{alias_type}"),
        &format!("{name} → {value}"),
        None,
        FactSource::UserTold,
        1.0,
    )
}

// ── Corrections ────────────────────────────────────────────────────────────

/// The user corrected us: invalidate the first valid fact under `topic`
/// whose text contains `old_fact_substring` (if any), then store the
/// replacement as a user-told, full-confidence fact linked via
/// `contradicts`. The invalidated fact stays queryable for audit.
pub fn learn_correction(
    store: &OpsStore,
    topic: &str,
    old_fact_substring: &str,
    new_fact: &str,
) -> EngineResult<Fact> {
    let matches = store.find_valid_facts_containing(topic, old_fact_substring)?;
    let contradicted = matches.first().map(|f| f.id.clone());

    if let Some(old_id) = &contradicted {
        store.set_fact_validity(old_id, false)?;
        info!("[knowledge] Correction on {topic}: invalidated {old_id}");
    } else {
        info!("[knowledge] Correction on {topic}: no prior fact matched");
    }

    let now = now_ts();
    let fact = Fact {
        id: Uuid::new_v4().to_string(),
        topic: topic.to_string(),
        fact: new_fact.to_string(),
        context: None,
        confidence: 1.0,
        source: FactSource::UserTold,
        is_valid: true,
        last_verified: Some(now.clone()),
        contradicts: contradicted,
        created_at: now,
        last_used: None,
    };
    store.insert_fact(&fact)?;
    Ok(fact)
}

/// Soft-delete every valid fact under `topic` whose text contains
/// `fact_substring`. Returns how many were invalidated.
pub fn invalidate(store: &OpsStore, topic: &str, fact_substring: &str) -> EngineResult<usize> {
    let matches = store.find_valid_facts_containing(topic, fact_substring)?;
    for fact in &matches {
        store.set_fact_validity(&fact.id, false)?;
    }
    if !matches.is_empty() {
        info!(
            "[knowledge] Invalidated {} fact(s) under {topic}",
            matches.len()
        );
    }
    Ok(matches.len())
}

/// Set the confidence of a specific valid fact in place (clamped).
/// Does not touch last_verified. Returns false if no such fact exists.
pub fn set_confidence(
    store: &OpsStore,
    topic: &str,
    exact_fact: &str,
    value: f64,
) -> EngineResult<bool> {
    match store.find_valid_fact(topic, exact_fact)? {
        Some(fact) => {
            store.set_fact_confidence(&fact.id, value.clamp(0.0, 1.0))?;
            Ok(true)
        }
        None => Ok(false),
    }
}

// ── Decay ──────────────────────────────────────────────────────────────────

/// Summary of one decay pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecayReport {
    pub examined: usize,
    pub decayed: usize,
}

/// Apply time decay to every valid fact:
///   • unverified for more than 30 days → subtract 0.1 × (days / 30)
///   • unused for more than 60 days (when last_used is set) → subtract 0.05
/// Both penalties can apply; the result is clamped to [0,1]. Decay never
/// invalidates — confidence can sit at 0 and the row remains.
pub fn decay_confidence(store: &OpsStore) -> EngineResult<DecayReport> {
    let now = Utc::now();
    let facts = store.all_valid_facts()?;
    let mut report = DecayReport {
        examined: facts.len(),
        ..Default::default()
    };

    for fact in &facts {
        let mut penalty = 0.0;

        let verified_ref = fact.last_verified.as_deref().unwrap_or(&fact.created_at);
        if let Some(verified) = parse_ts(verified_ref) {
            let days = (now - verified).num_days();
            if days > VERIFY_DECAY_AFTER_DAYS {
                penalty += VERIFY_DECAY_RATE * (days as f64 / VERIFY_DECAY_AFTER_DAYS as f64);
            }
        }

        if let Some(used) = fact.last_used.as_deref().and_then(parse_ts) {
            if (now - used).num_days() > UNUSED_DECAY_AFTER_DAYS {
                penalty += UNUSED_DECAY_PENALTY;
            }
        }

        if penalty > 0.0 {
            let new_confidence = (fact.confidence - penalty).clamp(0.0, 1.0);
            if (new_confidence - fact.confidence).abs() > f64::EPSILON {
                store.set_fact_confidence(&fact.id, new_confidence)?;
                report.decayed += 1;
            }
        }
    }

    if report.decayed > 0 {
        info!(
            "[knowledge] Decay pass: {} of {} facts decayed",
            report.decayed, report.examined
        );
    }
    Ok(report)
}

// ── Knowledge prompt ───────────────────────────────────────────────────────

/// Build a grouped, human-readable digest of the knowledge base for
/// injection into a model prompt: up to 50 valid facts above the stale
/// cutoff, grouped by topic category, flagging anything unverified for
/// over 30 days. Empty string when there is nothing worth saying.
pub fn generate_knowledge_prompt(
    store: &OpsStore,
    topics: Option<&[String]>,
) -> EngineResult<String> {
    let mut facts: Vec<Fact> = match topics {
        Some(list) if !list.is_empty() => {
            let mut collected = Vec::new();
            for topic in list {
                collected.extend(store.facts_by_topic(Some(topic))?);
            }
            // Overlapping topics ("docker", "docker:nginx") collect the
            // same fact more than once; keep the first occurrence only.
            let mut seen: HashSet<String> = HashSet::new();
            collected.retain(|f| seen.insert(f.id.clone()));
            collected
        }
        _ => store.facts_by_topic(None)?,
    };

    facts.retain(|f| f.confidence > STALE_CONFIDENCE_CUTOFF);
    facts.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    facts.truncate(KNOWLEDGE_PROMPT_MAX_FACTS);

    if facts.is_empty() {
        return Ok(String::new());
    }

    let now = Utc::now();
    let mut out = String::from("## What I know about this environment\n");
    let mut categories: Vec<&str> = facts.iter().map(|f| f.category()).collect();
    categories.dedup();
    // dedup only removes adjacent duplicates; keep first-seen order overall
    let mut seen = Vec::new();
    categories.retain(|c| {
        if seen.contains(c) {
            false
        } else {
            seen.push(c);
            true
        }
    });

    for category in categories {
        out.push_str(&format!("\n### {category}\n"));
        for fact in facts.iter().filter(|f| f.category() == category) {
            let unverified = fact
                .last_verified
                .as_deref()
                .and_then(parse_ts)
                .map(|v| (now - v).num_days() > VERIFY_DECAY_AFTER_DAYS)
                .unwrap_or(true);
            out.push_str(&format!(
                "- {} (confidence {:.0}%){}\n",
                fact.fact,
                fact.confidence * 100.0,
                if unverified { " [unverified 30+ days]" } else { "" }
            ));
            if let Some(context) = &fact.context {
                out.push_str(&format!("  context: {context}\n"));
            }
        }
    }

    Ok(out)
}

/// Pass-through to the store's aggregate counts.
pub fn knowledge_stats(store: &OpsStore) -> EngineResult<crate::engine::store::KnowledgeStats> {
    store.knowledge_stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> OpsStore {
        OpsStore::open_in_memory().expect("in-memory store")
    }

    fn days_ago(days: i64) -> String {
        (Utc::now() - Duration::days(days)).to_rfc3339()
    }

    #[test]
    fn test_remember_dedups_and_takes_max_confidence() {
        let s = store();
        let first = remember_fact(&s, "docker:nginx", "Container 'nginx' is running", None, FactSource::Discovered, 0.9).unwrap();
        let second = remember_fact(&s, "docker:nginx", "Container 'nginx' is running", None, FactSource::AutoRefresh, 0.5).unwrap();

        assert_eq!(first.id, second.id);
        assert!((second.confidence - 0.9).abs() < 1e-9);

        // Still exactly one valid row
        let all = s.facts_by_topic(Some("docker:nginx")).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_recall_by_topic_prefix_and_stale_cutoff() {
        let s = store();
        remember_fact(&s, "docker:nginx", "Container 'nginx' is running", None, FactSource::Discovered, 0.9).unwrap();

        let found = recall(&s, Some("docker"), false).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].fact, "Container 'nginx' is running");
        assert!(found[0].last_used.is_some());

        // Drop below the stale cutoff — hidden from normal recall
        assert!(set_confidence(&s, "docker:nginx", "Container 'nginx' is running", 0.2).unwrap());
        assert!(recall(&s, Some("docker"), false).unwrap().is_empty());

        // …but still there when stale facts are requested
        assert_eq!(recall(&s, Some("docker"), true).unwrap().len(), 1);
    }

    #[test]
    fn test_recall_orders_by_confidence() {
        let s = store();
        remember_fact(&s, "network:router", "Router is a MikroTik hEX", None, FactSource::Discovered, 0.5).unwrap();
        remember_fact(&s, "network:dns", "Pi-hole handles DNS", None, FactSource::UserTold, 0.95).unwrap();

        let found = recall(&s, Some("network"), false).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].confidence >= found[1].confidence);
        assert_eq!(found[0].topic, "network:dns");
    }

    #[test]
    fn test_alias_resolution_both_directions_case_insensitive() {
        let s = store();
        store_alias(&s, "mac", "office mac mini", "192.168.1.20").unwrap();

        // alias name contained in a longer user sentence
        assert_eq!(
            resolve_alias(&s, "mac", "reboot the Office Mac Mini please").unwrap(),
            Some("192.168.1.20".to_string())
        );
        // input contained in alias name
        assert_eq!(
            resolve_alias(&s, "mac", "Mac Mini").unwrap(),
            Some("192.168.1.20".to_string())
        );
        // exact, different case
        assert_eq!(
            resolve_alias(&s, "mac", "OFFICE MAC MINI").unwrap(),
            Some("192.168.1.20".to_string())
        );
        // no match
        assert_eq!(resolve_alias(&s, "mac", "thinkpad").unwrap(), None);
    }

    #[test]
    fn test_alias_accepts_ascii_arrow() {
        let s = store();
        remember_fact(&s, "alias:host", "nas -> 10.0.0.5", None, FactSource::UserTold, 1.0).unwrap();
        assert_eq!(
            resolve_alias(&s, "host", "nas").unwrap(),
            Some("10.0.0.5".to_string())
        );
    }

    #[test]
    fn test_correction_links_and_preserves_old_fact() {
        let s = store();
        let old = remember_fact(&s, "network:dns", "DNS runs on 192.168.1.2", None, FactSource::Discovered, 0.8).unwrap();
        let new = learn_correction(&s, "network:dns", "192.168.1.2", "DNS runs on 192.168.1.53").unwrap();

        assert_eq!(new.contradicts.as_deref(), Some(old.id.as_str()));
        assert!((new.confidence - 1.0).abs() < 1e-9);
        assert_eq!(new.source, FactSource::UserTold);

        // Old fact is invalidated but still queryable by id (audit trail)
        let old_row = s.get_fact(&old.id).unwrap();
        assert!(!old_row.is_valid);

        // Normal recall sees only the corrected fact
        let found = recall(&s, Some("network:dns"), false).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].fact, "DNS runs on 192.168.1.53");
    }

    #[test]
    fn test_correction_without_match_still_inserts() {
        let s = store();
        let new = learn_correction(&s, "network:dns", "no such text", "DNS runs on 192.168.1.53").unwrap();
        assert!(new.contradicts.is_none());
    }

    #[test]
    fn test_invalidate_by_substring() {
        let s = store();
        remember_fact(&s, "docker:old", "Container 'old' is running", None, FactSource::Discovered, 0.8).unwrap();
        remember_fact(&s, "docker:old", "Container 'old' uses port 8080", None, FactSource::Discovered, 0.8).unwrap();

        let count = invalidate(&s, "docker:old", "Container 'old'").unwrap();
        assert_eq!(count, 2);
        assert!(recall(&s, Some("docker:old"), true).unwrap().is_empty());
    }

    #[test]
    fn test_set_confidence_is_noop_without_exact_match() {
        let s = store();
        remember_fact(&s, "docker:nginx", "Container 'nginx' is running", None, FactSource::Discovered, 0.8).unwrap();
        assert!(!set_confidence(&s, "docker:nginx", "some other fact", 0.1).unwrap());
        assert!(set_confidence(&s, "docker:nginx", "Container 'nginx' is running", 2.0).unwrap());

        // Clamped to 1.0
        let found = recall(&s, Some("docker:nginx"), false).unwrap();
        assert!((found[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_decay_forty_days_unverified() {
        let s = store();
        let fact = remember_fact(&s, "docker:nginx", "Container 'nginx' is running", None, FactSource::Discovered, 0.8).unwrap();
        s.execute_for_testing(&format!(
            "UPDATE facts SET last_verified = '{}' WHERE id = '{}';",
            days_ago(40),
            fact.id
        ));

        let report = decay_confidence(&s).unwrap();
        assert_eq!(report.decayed, 1);

        let row = s.get_fact(&fact.id).unwrap();
        let expected = 0.8 - 0.1 * (40.0 / 30.0);
        assert!((row.confidence - expected).abs() < 1e-6);
        assert!(row.is_valid, "decay never invalidates");
    }

    #[test]
    fn test_decay_adds_unused_penalty_and_clamps_at_zero() {
        let s = store();
        let fact = remember_fact(&s, "docker:nginx", "Container 'nginx' is running", None, FactSource::Discovered, 0.1).unwrap();
        s.execute_for_testing(&format!(
            "UPDATE facts SET last_verified = '{}', last_used = '{}' WHERE id = '{}';",
            days_ago(40),
            days_ago(70),
            fact.id
        ));

        decay_confidence(&s).unwrap();
        let row = s.get_fact(&fact.id).unwrap();
        // 0.1 − 0.1333 − 0.05 clamps to 0, row stays valid
        assert!(row.confidence.abs() < 1e-9);
        assert!(row.is_valid);
    }

    #[test]
    fn test_decay_skips_recently_verified() {
        let s = store();
        remember_fact(&s, "docker:nginx", "Container 'nginx' is running", None, FactSource::Discovered, 0.8).unwrap();
        let report = decay_confidence(&s).unwrap();
        assert_eq!(report.decayed, 0);
    }

    #[test]
    fn test_knowledge_prompt_groups_and_flags_unverified() {
        let s = store();
        remember_fact(&s, "docker:nginx", "Container 'nginx' is running", None, FactSource::Discovered, 0.9).unwrap();
        let old = remember_fact(&s, "storage:tank", "Pool 'tank' is ONLINE", Some("main ZFS pool"), FactSource::Discovered, 0.8).unwrap();
        s.execute_for_testing(&format!(
            "UPDATE facts SET last_verified = '{}' WHERE id = '{}';",
            days_ago(45),
            old.id
        ));
        // Below the cutoff — must not appear at all
        remember_fact(&s, "docker:ghost", "Container 'ghost' exists", None, FactSource::Discovered, 0.2).unwrap();

        let prompt = generate_knowledge_prompt(&s, None).unwrap();
        assert!(prompt.contains("### docker"));
        assert!(prompt.contains("### storage"));
        assert!(prompt.contains("Container 'nginx' is running"));
        assert!(prompt.contains("[unverified 30+ days]"));
        assert!(prompt.contains("context: main ZFS pool"));
        assert!(!prompt.contains("ghost"));
    }

    #[test]
    fn test_knowledge_prompt_empty_when_nothing_known() {
        let s = store();
        assert!(generate_knowledge_prompt(&s, None).unwrap().is_empty());
    }

    #[test]
    fn test_knowledge_prompt_dedups_overlapping_topics() {
        let s = store();
        remember_fact(&s, "docker:nginx", "Container 'nginx' is running", None, FactSource::Discovered, 0.9).unwrap();

        // "docker" already covers "docker:nginx"; the fact must appear once
        let topics = vec!["docker".to_string(), "docker:nginx".to_string()];
        let prompt = generate_knowledge_prompt(&s, Some(&topics)).unwrap();
        assert_eq!(prompt.matches("Container 'nginx' is running").count(), 1);
    }

    #[test]
    fn test_knowledge_stats_counts_and_categories() {
        let s = store();
        remember_fact(&s, "docker:nginx", "Container 'nginx' is running", None, FactSource::Discovered, 0.9).unwrap();
        remember_fact(&s, "docker:postgres", "Container 'postgres' is running", None, FactSource::Discovered, 0.7).unwrap();
        remember_fact(&s, "network:dns", "DNS runs on 192.168.1.53", None, FactSource::UserTold, 1.0).unwrap();
        invalidate(&s, "network:dns", "DNS").unwrap();

        let stats = knowledge_stats(&s).unwrap();
        assert_eq!(stats.total_facts, 3);
        assert_eq!(stats.valid_facts, 2);
        assert_eq!(stats.invalid_facts, 1);
        assert!((stats.average_confidence - 0.8).abs() < 1e-9);
        // Only valid facts count toward categories
        assert_eq!(stats.categories, vec![("docker".to_string(), 2)]);
    }
}
