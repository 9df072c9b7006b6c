// Deckhand Engine — Tool Registry & Dispatcher
// Each tool group is a self-contained module with definitions + executor.
// The orchestration loop (external) merges these definitions into the
// model's tool list and routes calls back through execute_tool.
//
// Every operation here is a local read-modify-write against the store —
// nothing blocks on network I/O.

use log::info;

use crate::atoms::types::ToolDefinition;
use crate::engine::store::OpsStore;

pub mod incidents;
pub mod knowledge;

impl ToolDefinition {
    /// Return the belief-maintenance tool set.
    pub fn builtins() -> Vec<Self> {
        let mut tools = Vec::new();
        tools.extend(knowledge::definitions());
        tools.extend(incidents::definitions());
        tools
    }
}

// ── Main executor ──────────────────────────────────────────────────────────

/// Execute a single tool call and return the result, or None when the
/// tool name belongs to no group here.
pub fn execute_tool(
    store: &OpsStore,
    name: &str,
    args: &serde_json::Value,
) -> Option<Result<String, String>> {
    info!("[tools] Executing {name} args={args}");

    if let Some(result) = knowledge::execute(store, name, args) {
        return Some(result);
    }
    if let Some(result) = incidents::execute(store, name, args) {
        return Some(result);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_all_definitions() {
        let store = OpsStore::open_in_memory().unwrap();
        for def in ToolDefinition::builtins() {
            let result = execute_tool(&store, &def.function.name, &serde_json::json!({}));
            assert!(
                result.is_some(),
                "tool '{}' is defined but not dispatched",
                def.function.name
            );
        }
    }

    #[test]
    fn test_unknown_tool_returns_none() {
        let store = OpsStore::open_in_memory().unwrap();
        assert!(execute_tool(&store, "no_such_tool", &serde_json::json!({})).is_none());
    }
}
