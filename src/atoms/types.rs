// ── Deckhand Atoms: Shared Types ───────────────────────────────────────────
// Plain-data records shared across the engine. Timestamps are RFC 3339
// strings end to end (stored as TEXT in SQLite); `parse_ts` is the single
// place they are turned back into `DateTime<Utc>` for date math.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Timestamp helpers ──────────────────────────────────────────────────────

/// Current time as the canonical RFC 3339 string used everywhere.
pub fn now_ts() -> String {
    Utc::now().to_rfc3339()
}

/// Parse a stored timestamp. Returns None on anything unparseable —
/// callers treat that as "no timestamp" rather than failing the operation.
pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ── Facts ──────────────────────────────────────────────────────────────────

/// Where a fact came from. Facts the user told us directly are privileged:
/// reconciliation never auto-decays or auto-invalidates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactSource {
    Discovered,
    UserTold,
    AutoRefresh,
    Manual,
}

impl FactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactSource::Discovered => "discovered",
            FactSource::UserTold => "user_told",
            FactSource::AutoRefresh => "auto_refresh",
            FactSource::Manual => "manual",
        }
    }

    /// Parse the stored TEXT column. Unknown values map to `Discovered`
    /// so a hand-edited database never breaks recall.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "user_told" => FactSource::UserTold,
            "auto_refresh" => FactSource::AutoRefresh,
            "manual" => FactSource::Manual,
            _ => FactSource::Discovered,
        }
    }
}

/// A single timestamped, confidence-scored assertion under a topic.
///
/// Topics are hierarchical by convention: the segment before `:` is the
/// category (`docker:nginx`, `alias:mac`). Lookups match exact topic or
/// `topic + ":"` prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub topic: String,
    pub fact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Current trust in this fact, always clamped to [0,1].
    pub confidence: f64,
    pub source: FactSource,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_verified: Option<String>,
    /// Id of the fact this one corrected, if it was learned as a correction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contradicts: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<String>,
}

impl Fact {
    /// Category = leading topic segment before `:`, or the whole topic.
    pub fn category(&self) -> &str {
        self.topic.split(':').next().unwrap_or(&self.topic)
    }
}

/// A fact observed from live infrastructure, before it is upserted.
#[derive(Debug, Clone)]
pub struct DiscoveredFact {
    pub topic: String,
    pub fact: String,
    pub confidence: f64,
}

// ── Investigations ─────────────────────────────────────────────────────────

/// A diagnostic session tied to a conversation thread. At most one
/// unresolved investigation exists per thread; resolving is one-way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investigation {
    pub id: String,
    pub thread_id: String,
    /// The symptom text that started the investigation.
    pub trigger: String,
    pub started_at: String,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

/// One diagnostic action taken during an investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationStep {
    pub id: String,
    pub investigation_id: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
    pub created_at: String,
}

// ── Patterns ───────────────────────────────────────────────────────────────

/// A recurring symptom → cause → resolution record, derived automatically
/// from resolved investigations. Keyed by exact symptom text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub symptom: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_cause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub occurrence_count: i64,
    pub last_seen: String,
}

// ── Infrastructure snapshot (State Aggregator boundary) ────────────────────
// `None` for a sub-section means the source was unreachable — never "empty".

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    pub name: String,
    pub health: String,
    pub used_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterStatus {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub uptime: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSummary {
    pub total_targets: i64,
    pub up_targets: i64,
    pub down_targets: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub containers: Option<Vec<ContainerStatus>>,
    pub pools: Option<Vec<PoolStatus>>,
    pub router: Option<RouterStatus>,
    pub monitoring: Option<MonitoringSummary>,
}

impl StateSnapshot {
    /// True when every source was unreachable or returned nothing — the
    /// reconcile cycle aborts rather than mass-staling on a total outage.
    pub fn is_empty(&self) -> bool {
        self.containers.as_ref().map_or(true, |c| c.is_empty())
            && self.pools.as_ref().map_or(true, |p| p.is_empty())
            && self.router.is_none()
            && self.monitoring.is_none()
    }
}

// ── Admin read surface ─────────────────────────────────────────────────────

/// One page of a paginated admin list query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub page: i64,
    pub page_size: i64,
}

// ── Tool surface ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}
