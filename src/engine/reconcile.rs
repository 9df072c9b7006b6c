// Deckhand Engine — Reconciliation Scheduler
// Background loop, independent of any chat turn, that periodically pulls
// live infrastructure state, diffs it against the fact store, and applies
// the merge/stale policy.
//
// The core anti-false-positive rule: a topic prefix is only "active" when
// its source actually produced data this cycle. Facts under prefixes that
// received nothing are left untouched — absence of data is never treated
// as absence of truth.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use log::{error, info, warn};
use tokio::sync::Notify;

use crate::atoms::constants::*;
use crate::atoms::error::EngineResult;
use crate::atoms::types::{DiscoveredFact, FactSource, StateSnapshot};
use crate::engine::aggregator::{collect_snapshot, StateAggregator};
use crate::engine::knowledge;
use crate::engine::notify::Notifier;
use crate::engine::store::OpsStore;

// ── Config ─────────────────────────────────────────────────────────────────
// Read fresh from the engine_config table every cycle, so live changes
// take effect at the next fire without a restart.

const CONFIG_ENABLED: &str = "reconcile.enabled";
const CONFIG_HOUR: &str = "reconcile.hour";
const CONFIG_MINUTE: &str = "reconcile.minute";
const CONFIG_TIMEZONE: &str = "reconcile.timezone";

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub enabled: bool,
    pub hour: u32,
    pub minute: u32,
    pub timezone: Tz,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            hour: RECONCILE_DEFAULT_HOUR,
            minute: RECONCILE_DEFAULT_MINUTE,
            timezone: chrono_tz::UTC,
        }
    }
}

/// Load the schedule from config. Invalid values warn and fall back to
/// the defaults (03:30 UTC) rather than wedging the loop.
pub fn load_config(store: &OpsStore) -> ReconcileConfig {
    let mut config = ReconcileConfig::default();

    if let Ok(Some(v)) = store.get_config(CONFIG_ENABLED) {
        config.enabled = v == "true" || v == "1";
    }
    if let Ok(Some(v)) = store.get_config(CONFIG_HOUR) {
        match v.parse::<u32>() {
            Ok(h) if h < 24 => config.hour = h,
            _ => warn!("[reconcile] Invalid {CONFIG_HOUR}='{v}', using {:02}", config.hour),
        }
    }
    if let Ok(Some(v)) = store.get_config(CONFIG_MINUTE) {
        match v.parse::<u32>() {
            Ok(m) if m < 60 => config.minute = m,
            _ => warn!("[reconcile] Invalid {CONFIG_MINUTE}='{v}', using {:02}", config.minute),
        }
    }
    if let Ok(Some(v)) = store.get_config(CONFIG_TIMEZONE) {
        match v.parse::<Tz>() {
            Ok(tz) => config.timezone = tz,
            Err(_) => warn!("[reconcile] Invalid {CONFIG_TIMEZONE}='{v}', using UTC"),
        }
    }

    config
}

/// Next wall-clock occurrence of hour:minute in the configured zone,
/// strictly after `now`. DST gaps skip to the next valid day.
fn next_fire_time(now: DateTime<Utc>, config: &ReconcileConfig) -> DateTime<Utc> {
    let local_now = now.with_timezone(&config.timezone);
    let mut date = local_now.date_naive();

    for _ in 0..3 {
        let candidate = date
            .and_hms_opt(config.hour, config.minute, 0)
            .and_then(|naive| config.timezone.from_local_datetime(&naive).earliest());
        if let Some(candidate) = candidate {
            let candidate = candidate.with_timezone(&Utc);
            if candidate > now {
                return candidate;
            }
        }
        if let Some(next) = date.succ_opt() {
            date = next;
        }
    }
    now + chrono::Duration::hours(24)
}

// ── Cycle ──────────────────────────────────────────────────────────────────

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub added: usize,
    pub verified: usize,
    pub stale: usize,
    pub errors: usize,
    /// True when every source was unreachable and nothing was written.
    pub aborted: bool,
}

/// Transform the snapshot into one discovered fact per observed entity.
fn discovered_facts(snapshot: &StateSnapshot) -> Vec<DiscoveredFact> {
    let mut facts = Vec::new();

    if let Some(containers) = &snapshot.containers {
        for c in containers {
            let mut text = format!("Container '{}' is {}", c.name, c.state);
            if let Some(health) = &c.health {
                text.push_str(&format!(" ({health})"));
            }
            facts.push(DiscoveredFact {
                topic: format!("docker:{}", c.name),
                fact: text,
                confidence: DISCOVERED_FACT_CONFIDENCE,
            });
        }
    }
    if let Some(pools) = &snapshot.pools {
        for p in pools {
            facts.push(DiscoveredFact {
                topic: format!("storage:{}", p.name),
                fact: format!("Pool '{}' is {}, {:.1}% used", p.name, p.health, p.used_percent),
                confidence: DISCOVERED_FACT_CONFIDENCE,
            });
        }
    }
    if let Some(router) = &snapshot.router {
        facts.push(DiscoveredFact {
            topic: "network:router".to_string(),
            fact: format!(
                "Router: CPU {:.0}%, memory {:.0}%, uptime {}",
                router.cpu_percent, router.memory_percent, router.uptime
            ),
            confidence: DISCOVERED_FACT_CONFIDENCE,
        });
    }
    if let Some(mon) = &snapshot.monitoring {
        facts.push(DiscoveredFact {
            topic: "monitoring:status".to_string(),
            fact: format!(
                "Monitoring: {}/{} targets up, {} down",
                mon.up_targets, mon.total_targets, mon.down_targets
            ),
            confidence: DISCOVERED_FACT_CONFIDENCE,
        });
    }

    facts
}

/// Run one reconciliation cycle: snapshot, upsert, stale pass, decay,
/// notify. Per-fact failures are counted and logged, never fatal.
pub async fn run_cycle(
    store: &OpsStore,
    aggregator: &Arc<dyn StateAggregator>,
    notifier: Option<&Arc<dyn Notifier>>,
) -> EngineResult<CycleReport> {
    let mut report = CycleReport::default();

    let snapshot = collect_snapshot(aggregator).await;
    if snapshot.is_empty() {
        warn!("[reconcile] Every source unreachable or empty — aborting cycle untouched");
        report.aborted = true;
        return Ok(report);
    }

    let discovered = discovered_facts(&snapshot);

    // Which (topic, fact) pairs this cycle actually observed, and which
    // topic prefixes received data at all. Both drive the stale pass.
    let mut observed: HashSet<(String, String)> = HashSet::new();
    let mut active_prefixes: HashSet<String> = HashSet::new();

    for df in &discovered {
        let existed = match store.topic_has_valid_fact(&df.topic) {
            Ok(e) => e,
            Err(e) => {
                error!("[reconcile] Lookup failed for {}: {e}", df.topic);
                report.errors += 1;
                continue;
            }
        };

        match knowledge::remember_fact(
            store,
            &df.topic,
            &df.fact,
            None,
            FactSource::AutoRefresh,
            df.confidence,
        ) {
            Ok(_) => {
                if existed {
                    report.verified += 1;
                } else {
                    report.added += 1;
                }
                observed.insert((df.topic.clone(), df.fact.clone()));
                if let Some(idx) = df.topic.find(':') {
                    active_prefixes.insert(df.topic[..=idx].to_string());
                }
            }
            Err(e) => {
                error!("[reconcile] Upsert failed for {}: {e}", df.topic);
                report.errors += 1;
            }
        }
    }

    // Stale pass: facts under an active prefix that were not re-discovered
    // this cycle lose confidence; at or below zero they are invalidated
    // instead of lingering as zero-confidence rows. User-told facts are
    // exempt. Prefixes with no data this cycle are left untouched.
    match store.all_valid_facts() {
        Ok(facts) => {
            for fact in facts {
                if fact.source == FactSource::UserTold {
                    continue;
                }
                // Same coverage rule as recall: "docker:" covers both
                // "docker:nginx" and the bare category topic "docker".
                let under_active = active_prefixes.iter().any(|p| {
                    fact.topic.starts_with(p.as_str())
                        || Some(fact.topic.as_str()) == p.strip_suffix(':')
                });
                if !under_active {
                    continue;
                }
                if observed.contains(&(fact.topic.clone(), fact.fact.clone())) {
                    continue;
                }

                let penalized = fact.confidence - STALE_FACT_PENALTY;
                let result = if penalized <= 0.0 {
                    store.set_fact_validity(&fact.id, false)
                } else {
                    store.set_fact_confidence(&fact.id, penalized)
                };
                match result {
                    Ok(()) => {
                        info!(
                            "[reconcile] Stale: {} '{}' → {}",
                            fact.topic,
                            fact.fact,
                            if penalized <= 0.0 { "invalidated".to_string() } else { format!("{penalized:.2}") }
                        );
                        report.stale += 1;
                    }
                    Err(e) => {
                        error!("[reconcile] Stale update failed for {}: {e}", fact.topic);
                        report.errors += 1;
                    }
                }
            }
        }
        Err(e) => {
            error!("[reconcile] Stale pass skipped, fact scan failed: {e}");
            report.errors += 1;
        }
    }

    // Decay is independent of reconciliation; a failure here must not
    // fail the cycle.
    if let Err(e) = knowledge::decay_confidence(store) {
        warn!("[reconcile] Decay pass failed: {e}");
    }

    info!(
        "[reconcile] Cycle done: {} added, {} verified, {} stale, {} errors",
        report.added, report.verified, report.stale, report.errors
    );

    if let Some(notifier) = notifier {
        let summary = format!(
            "Reconcile: {} added, {} verified, {} stale, {} errors",
            report.added, report.verified, report.stale, report.errors
        );
        if let Err(e) = notifier.notify(&summary).await {
            warn!("[reconcile] Notification failed: {e}");
        }
    }

    Ok(report)
}

// ── Scheduler loop ─────────────────────────────────────────────────────────

/// Long-lived background loop. Owns nothing but handles; the store stays
/// the source of truth. Never terminates except on shutdown.
pub struct ReconcileScheduler {
    store: Arc<OpsStore>,
    aggregator: Arc<dyn StateAggregator>,
    notifier: Option<Arc<dyn Notifier>>,
    shutdown: Arc<Notify>,
}

impl ReconcileScheduler {
    pub fn new(
        store: Arc<OpsStore>,
        aggregator: Arc<dyn StateAggregator>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            store,
            aggregator,
            notifier,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle used to unblock the scheduler promptly on process shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Spawn the loop onto the runtime.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(&self) {
        info!("[reconcile] Scheduler started");
        loop {
            // Re-read config each cycle so live changes apply next fire.
            let config = load_config(&self.store);

            if !config.enabled {
                if self.sleep_or_shutdown(Duration::from_secs(RECONCILE_DISABLED_RECHECK_SECS)).await {
                    break;
                }
                continue;
            }

            let now = Utc::now();
            let fire_at = next_fire_time(now, &config);
            let wait = (fire_at - now).to_std().unwrap_or(Duration::from_secs(0));
            info!(
                "[reconcile] Next cycle at {} ({:02}:{:02} {})",
                fire_at, config.hour, config.minute, config.timezone
            );

            if self.sleep_or_shutdown(wait).await {
                break;
            }

            match run_cycle(&self.store, &self.aggregator, self.notifier.as_ref()).await {
                Ok(report) if report.aborted => {
                    warn!("[reconcile] Cycle aborted (total outage)");
                }
                Ok(_) => {}
                Err(e) => {
                    error!("[reconcile] Cycle failed: {e} — backing off");
                    if self.sleep_or_shutdown(Duration::from_secs(RECONCILE_ERROR_BACKOFF_SECS)).await {
                        break;
                    }
                }
            }
        }
        info!("[reconcile] Scheduler stopped");
    }

    /// Returns true when shutdown was requested during the sleep.
    async fn sleep_or_shutdown(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.shutdown.notified() => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{ContainerStatus, Fact, MonitoringSummary, PoolStatus};
    use crate::engine::aggregator::test_support::FakeAggregator;
    use crate::engine::notify::test_support::RecordingNotifier;
    use chrono::TimeZone;

    fn store() -> OpsStore {
        OpsStore::open_in_memory().expect("in-memory store")
    }

    fn container(name: &str, state: &str) -> ContainerStatus {
        ContainerStatus {
            name: name.into(),
            state: state.into(),
            health: None,
        }
    }

    fn docker_snapshot(containers: Vec<ContainerStatus>) -> StateSnapshot {
        StateSnapshot {
            containers: Some(containers),
            pools: None,
            router: None,
            monitoring: None,
        }
    }

    #[test]
    fn test_config_falls_back_on_invalid_values() {
        let s = store();
        s.set_config("reconcile.enabled", "true").unwrap();
        s.set_config("reconcile.hour", "99").unwrap();
        s.set_config("reconcile.minute", "not a number").unwrap();
        s.set_config("reconcile.timezone", "Mars/Olympus_Mons").unwrap();

        let config = load_config(&s);
        assert!(config.enabled);
        assert_eq!(config.hour, RECONCILE_DEFAULT_HOUR);
        assert_eq!(config.minute, RECONCILE_DEFAULT_MINUTE);
        assert_eq!(config.timezone, chrono_tz::UTC);
    }

    #[test]
    fn test_config_reads_valid_schedule() {
        let s = store();
        s.set_config("reconcile.hour", "22").unwrap();
        s.set_config("reconcile.minute", "15").unwrap();
        s.set_config("reconcile.timezone", "Europe/Berlin").unwrap();

        let config = load_config(&s);
        assert!(!config.enabled, "enabled defaults to off");
        assert_eq!(config.hour, 22);
        assert_eq!(config.minute, 15);
        assert_eq!(config.timezone, chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_next_fire_time_rolls_to_tomorrow() {
        let config = ReconcileConfig {
            enabled: true,
            hour: 3,
            minute: 30,
            timezone: chrono_tz::UTC,
        };
        // 04:00 UTC — today's 03:30 already passed
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 4, 0, 0).unwrap();
        let fire = next_fire_time(now, &config);
        assert_eq!(fire, Utc.with_ymd_and_hms(2025, 6, 11, 3, 30, 0).unwrap());

        // 02:00 UTC — still today
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 2, 0, 0).unwrap();
        let fire = next_fire_time(now, &config);
        assert_eq!(fire, Utc.with_ymd_and_hms(2025, 6, 10, 3, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn test_cycle_adds_then_verifies_idempotently() {
        let s = store();
        let agg = FakeAggregator::new(docker_snapshot(vec![container("nginx", "running")]));

        let first = run_cycle(&s, &agg, None).await.unwrap();
        assert_eq!((first.added, first.verified, first.stale), (1, 0, 0));

        let second = run_cycle(&s, &agg, None).await.unwrap();
        assert_eq!((second.added, second.verified, second.stale), (0, 1, 0));

        // Still exactly one valid docker fact
        let facts = s.facts_by_topic(Some("docker")).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].fact, "Container 'nginx' is running");
    }

    #[tokio::test]
    async fn test_inactive_prefix_is_protected() {
        let s = store();
        // Existing storage fact; this cycle only docker reports in.
        knowledge::remember_fact(&s, "storage:tank", "Pool 'tank' is ONLINE, 40.0% used", None, FactSource::AutoRefresh, 0.9).unwrap();

        let agg = FakeAggregator::new(docker_snapshot(vec![container("nginx", "running")]));
        let report = run_cycle(&s, &agg, None).await.unwrap();
        assert_eq!(report.stale, 0);

        let tank = s.facts_by_topic(Some("storage:tank")).unwrap();
        assert_eq!(tank.len(), 1);
        assert!((tank[0].confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_vanished_fact_under_active_prefix_goes_stale() {
        let s = store();
        knowledge::remember_fact(&s, "docker:ghost", "Container 'ghost' is running", None, FactSource::AutoRefresh, 0.9).unwrap();

        let agg = FakeAggregator::new(docker_snapshot(vec![container("nginx", "running")]));
        let report = run_cycle(&s, &agg, None).await.unwrap();
        assert_eq!(report.stale, 1);

        let ghost = s.facts_by_topic(Some("docker:ghost")).unwrap();
        assert_eq!(ghost.len(), 1);
        assert!((ghost[0].confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stale_at_zero_confidence_invalidates() {
        let s = store();
        let ghost = knowledge::remember_fact(&s, "docker:ghost", "Container 'ghost' is running", None, FactSource::AutoRefresh, 0.3).unwrap();

        let agg = FakeAggregator::new(docker_snapshot(vec![container("nginx", "running")]));
        run_cycle(&s, &agg, None).await.unwrap();

        let row = s.get_fact(&ghost.id).unwrap();
        assert!(!row.is_valid, "0.3 − 0.3 penalty invalidates instead of leaving a zero row");
    }

    #[tokio::test]
    async fn test_bare_category_topic_participates_in_staleness() {
        let s = store();
        knowledge::remember_fact(&s, "docker", "Docker daemon v24 on the nas", None, FactSource::AutoRefresh, 0.9).unwrap();

        let agg = FakeAggregator::new(docker_snapshot(vec![container("nginx", "running")]));
        let report = run_cycle(&s, &agg, None).await.unwrap();
        assert_eq!(report.stale, 1);

        let facts = s.facts_by_topic(Some("docker")).unwrap();
        let daemon = facts.iter().find(|f| f.fact.contains("daemon")).unwrap();
        assert!((daemon.confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_user_told_facts_are_never_auto_staled() {
        let s = store();
        knowledge::remember_fact(&s, "docker:legacy", "Container 'legacy' exists on the old host", None, FactSource::UserTold, 1.0).unwrap();

        let agg = FakeAggregator::new(docker_snapshot(vec![container("nginx", "running")]));
        let report = run_cycle(&s, &agg, None).await.unwrap();
        assert_eq!(report.stale, 0);

        let legacy = s.facts_by_topic(Some("docker:legacy")).unwrap();
        assert!((legacy[0].confidence - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_state_flip_stales_old_assertion_same_cycle() {
        let s = store();
        knowledge::remember_fact(&s, "docker:nginx", "Container 'nginx' is stopped", None, FactSource::AutoRefresh, 0.9).unwrap();

        let agg = FakeAggregator::new(docker_snapshot(vec![container("nginx", "running")]));
        let report = run_cycle(&s, &agg, None).await.unwrap();

        // Topic already existed → verified, not added; old assertion stale
        assert_eq!((report.added, report.verified, report.stale), (0, 1, 1));

        let facts: Vec<Fact> = s.facts_by_topic(Some("docker:nginx")).unwrap();
        let texts: Vec<&str> = facts.iter().map(|f| f.fact.as_str()).collect();
        assert!(texts.contains(&"Container 'nginx' is running"));
        let stopped = facts.iter().find(|f| f.fact.contains("stopped")).unwrap();
        assert!((stopped.confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_total_outage_aborts_untouched() {
        let s = store();
        knowledge::remember_fact(&s, "docker:nginx", "Container 'nginx' is running", None, FactSource::AutoRefresh, 0.9).unwrap();

        let agg = FakeAggregator::new(StateSnapshot::default());
        let report = run_cycle(&s, &agg, None).await.unwrap();
        assert!(report.aborted);
        assert_eq!((report.added, report.verified, report.stale), (0, 0, 0));

        let facts = s.facts_by_topic(Some("docker")).unwrap();
        assert!((facts[0].confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_multi_source_snapshot_produces_one_fact_per_entity() {
        let s = store();
        let agg = FakeAggregator::new(StateSnapshot {
            containers: Some(vec![container("nginx", "running"), container("postgres", "running")]),
            pools: Some(vec![PoolStatus {
                name: "tank".into(),
                health: "ONLINE".into(),
                used_percent: 41.5,
            }]),
            router: None,
            monitoring: Some(MonitoringSummary {
                total_targets: 12,
                up_targets: 11,
                down_targets: 1,
            }),
        });

        let report = run_cycle(&s, &agg, None).await.unwrap();
        assert_eq!(report.added, 4);

        let pool = s.facts_by_topic(Some("storage:tank")).unwrap();
        assert_eq!(pool[0].fact, "Pool 'tank' is ONLINE, 41.5% used");
        let mon = s.facts_by_topic(Some("monitoring:status")).unwrap();
        assert_eq!(mon[0].fact, "Monitoring: 11/12 targets up, 1 down");
    }

    #[tokio::test]
    async fn test_cycle_notifies_summary_line() {
        let s = store();
        let agg = FakeAggregator::new(docker_snapshot(vec![container("nginx", "running")]));
        let recorder = RecordingNotifier::arc();
        let notifier: Arc<dyn Notifier> = recorder.clone();

        run_cycle(&s, &agg, Some(&notifier)).await.unwrap();

        let messages = recorder.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0], "Reconcile: 1 added, 0 verified, 0 stale, 0 errors");
    }

    #[tokio::test]
    async fn test_scheduler_shuts_down_promptly() {
        let s = Arc::new(store());
        let agg = FakeAggregator::new(StateSnapshot::default());
        let scheduler = ReconcileScheduler::new(s, agg, None);
        let shutdown = scheduler.shutdown_handle();

        let handle = scheduler.start();
        shutdown.notify_one();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop on shutdown")
            .expect("scheduler task panicked");
    }
}
