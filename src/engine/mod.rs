// Deckhand Engine — belief-maintenance core
// Everything stateful lives behind OpsStore; policy sits in thin modules
// on top of it. The reconcile scheduler is the only background process.
//
// Module layout:
//   store       — SQLite persistence (facts, investigations, patterns, config)
//   knowledge   — fact policy: dedup-merge, recall, aliases, corrections, decay
//   incidents   — investigation lifecycle + pattern index + keyword search
//   aggregator  — StateAggregator boundary trait + snapshot fan-out
//   reconcile   — daily diff-and-merge of observed state into the fact store
//   notify      — notification collaborator boundary (webhook impl)
//   tools       — tool definitions + dispatcher for the model surface
//   paths       — ~/.deckhand filesystem layout

pub mod aggregator;
pub mod incidents;
pub mod knowledge;
pub mod notify;
pub mod paths;
pub mod reconcile;
pub mod store;
pub mod tools;
