// Deckhand Engine — State Aggregator boundary
// The reconciliation scheduler's only window onto live infrastructure.
// Implementations live with the protocol wrappers (Docker, ZFS, router,
// monitoring); this module owns the contract and the fan-out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;

use crate::atoms::constants::AGGREGATOR_SOURCE_TIMEOUT_SECS;
use crate::atoms::error::EngineResult;
use crate::atoms::types::{
    ContainerStatus, MonitoringSummary, PoolStatus, RouterStatus, StateSnapshot,
};

/// Pulls current infrastructure state from external systems.
///
/// Each method queries one source. A failure means "unreachable" — the
/// caller must never interpret it as "nothing exists there".
#[async_trait]
pub trait StateAggregator: Send + Sync {
    async fn containers(&self) -> EngineResult<Vec<ContainerStatus>>;
    async fn pools(&self) -> EngineResult<Vec<PoolStatus>>;
    async fn router(&self) -> EngineResult<RouterStatus>;
    async fn monitoring(&self) -> EngineResult<MonitoringSummary>;
}

/// Query all sources concurrently, each under its own timeout, so one
/// unreachable system does not stall the others. Failures and timeouts
/// degrade to `None` for that sub-section only.
pub async fn collect_snapshot(aggregator: &Arc<dyn StateAggregator>) -> StateSnapshot {
    let timeout = Duration::from_secs(AGGREGATOR_SOURCE_TIMEOUT_SECS);

    let (containers, pools, router, monitoring) = futures::join!(
        tokio::time::timeout(timeout, aggregator.containers()),
        tokio::time::timeout(timeout, aggregator.pools()),
        tokio::time::timeout(timeout, aggregator.router()),
        tokio::time::timeout(timeout, aggregator.monitoring()),
    );

    StateSnapshot {
        containers: flatten("containers", containers),
        pools: flatten("pools", pools),
        router: flatten("router", router),
        monitoring: flatten("monitoring", monitoring),
    }
}

/// Collapse timeout + source error into `None`, logging which source
/// went dark.
fn flatten<T>(
    source: &str,
    result: Result<EngineResult<T>, tokio::time::error::Elapsed>,
) -> Option<T> {
    match result {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!("[reconcile] Source '{source}' unreachable: {e}");
            None
        }
        Err(_) => {
            warn!("[reconcile] Source '{source}' timed out");
            None
        }
    }
}
