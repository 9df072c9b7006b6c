// Deckhand — belief-maintenance core for a chat-driven ops assistant.
//
// What lives here is the part of the assistant that has real invariants:
//   • a confidence-weighted fact store ("knowledge") with decay, dedup,
//     aliases, and user corrections;
//   • incident memory ("investigations") that turns resolved diagnostic
//     sessions into reusable troubleshooting patterns;
//   • a reconciliation scheduler that diffs live infrastructure state
//     against stored beliefs on a daily schedule.
//
// The chat front-end, the model orchestration loop, the admin dashboard,
// and the per-system protocol wrappers are external collaborators: they
// consume this crate through the tool surface (engine::tools), the store's
// paginated admin queries, and the StateAggregator / Notifier traits.

pub mod atoms;
pub mod engine;

pub use atoms::error::{EngineError, EngineResult};
pub use atoms::types::{
    ContainerStatus, DiscoveredFact, Fact, FactSource, Investigation, InvestigationStep,
    MonitoringSummary, Page, Pattern, PoolStatus, RouterStatus, StateSnapshot, ToolDefinition,
};
pub use engine::aggregator::StateAggregator;
pub use engine::notify::{Notifier, WebhookNotifier};
pub use engine::reconcile::ReconcileScheduler;
pub use engine::store::OpsStore;
