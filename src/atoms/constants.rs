// ── Deckhand Atoms: Constants ──────────────────────────────────────────────
// All named constants for the crate live here.
// Rationale: collecting constants in one place eliminates magic numbers,
// makes auditing easier, and keeps every layer's code self-documenting.

// ── Fact confidence policy ─────────────────────────────────────────────────
// Used by `engine/knowledge.rs`.
//
// Confidence is a float in [0,1]. It rises when a fact is re-asserted and
// falls over time when nothing re-verifies it. Facts are never hard-deleted;
// low confidence only hides them from normal recall.

/// Default confidence for a fact the model discovered on its own.
pub(crate) const DEFAULT_DISCOVERED_CONFIDENCE: f64 = 0.8;

/// Facts at or below this confidence are hidden from recall unless the
/// caller explicitly asks for stale facts. They stay in storage.
pub(crate) const STALE_CONFIDENCE_CUTOFF: f64 = 0.3;

/// A fact unverified for longer than this starts decaying, and is flagged
/// as unverified in the knowledge prompt.
pub(crate) const VERIFY_DECAY_AFTER_DAYS: i64 = 30;

/// Decay subtracted per VERIFY_DECAY_AFTER_DAYS worth of unverified age:
/// `0.1 × (days_since_verified / 30)`.
pub(crate) const VERIFY_DECAY_RATE: f64 = 0.1;

/// A fact unused (never recalled) for longer than this takes a flat penalty.
pub(crate) const UNUSED_DECAY_AFTER_DAYS: i64 = 60;

/// Flat penalty for long-unused facts.
pub(crate) const UNUSED_DECAY_PENALTY: f64 = 0.05;

/// Maximum facts included in the generated knowledge prompt.
pub(crate) const KNOWLEDGE_PROMPT_MAX_FACTS: usize = 50;

// ── Reconciliation policy ──────────────────────────────────────────────────
// Used by `engine/reconcile.rs`.

/// Confidence assigned to facts freshly observed from infrastructure.
pub(crate) const DISCOVERED_FACT_CONFIDENCE: f64 = 0.9;

/// Confidence penalty for a fact under an active prefix that was not
/// re-discovered this cycle. Landing at or below zero invalidates the fact.
pub(crate) const STALE_FACT_PENALTY: f64 = 0.3;

/// Per-source timeout when collecting the infrastructure snapshot, so one
/// unreachable system does not stall the others.
pub(crate) const AGGREGATOR_SOURCE_TIMEOUT_SECS: u64 = 10;

/// Backoff after an uncaught error in the scheduler loop body.
pub(crate) const RECONCILE_ERROR_BACKOFF_SECS: u64 = 300; // 5 minutes

/// Re-check interval while the scheduler is disabled in config, so flipping
/// the flag takes effect without a restart.
pub(crate) const RECONCILE_DISABLED_RECHECK_SECS: u64 = 3600; // 1 hour

/// Fallback fire time (UTC) when the configured schedule is invalid.
pub(crate) const RECONCILE_DEFAULT_HOUR: u32 = 3;
pub(crate) const RECONCILE_DEFAULT_MINUTE: u32 = 30;

// ── Incident search ────────────────────────────────────────────────────────
// Used by `engine/incidents.rs`. Matching is deliberately lexical —
// lower-cased whitespace tokens matched as substrings. No semantic search.

/// How many recent resolved investigations are scored per search.
pub(crate) const INCIDENT_SEARCH_POOL: usize = 50;

/// Default number of past incidents returned.
pub(crate) const INCIDENT_SEARCH_LIMIT: usize = 5;

/// Candidate pool for pattern matching: the most-frequent patterns are
/// fetched first, then filtered by token match.
pub(crate) const PATTERN_CANDIDATE_POOL: usize = 20;

/// Default number of patterns returned.
pub(crate) const PATTERN_MATCH_LIMIT: usize = 3;

/// Max length of a pattern's common-cause summary (step summaries joined
/// with "; ", truncated with an ellipsis beyond this).
pub(crate) const PATTERN_CAUSE_MAX_CHARS: usize = 200;
