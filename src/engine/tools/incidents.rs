// Deckhand Engine — Incident tools
// investigation_start, investigation_step, investigation_resolve,
// investigation_search, investigation_status

use crate::atoms::constants::{INCIDENT_SEARCH_LIMIT, PATTERN_MATCH_LIMIT};
use crate::atoms::error::EngineResult;
use crate::atoms::types::{FunctionDefinition, ToolDefinition};
use crate::engine::incidents;
use crate::engine::store::OpsStore;

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "investigation_start".into(),
                description: "Start a diagnostic investigation for the current conversation thread. If one is already active on this thread it is returned instead of starting another. Record each diagnostic action with investigation_step.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "thread_id": { "type": "string", "description": "Conversation thread id" },
                        "symptom": { "type": "string", "description": "What the user reported, e.g. 'network slow'" }
                    },
                    "required": ["thread_id", "symptom"]
                }),
            },
        },
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "investigation_step".into(),
                description: "Record a diagnostic step taken during the active investigation — what you checked and what you found.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "investigation_id": { "type": "string", "description": "Id returned by investigation_start" },
                        "action": { "type": "string", "description": "What was checked, e.g. 'checked router CPU'" },
                        "plugin": { "type": "string", "description": "Which system was queried (optional)" },
                        "result": { "type": "string", "description": "Short summary of what was found (optional)" }
                    },
                    "required": ["investigation_id", "action"]
                }),
            },
        },
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "investigation_resolve".into(),
                description: "Close the investigation with what fixed it. This is one-way: resolved investigations cannot be reopened. Resolved investigations become searchable history and feed the pattern index.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "investigation_id": { "type": "string", "description": "Id returned by investigation_start" },
                        "resolution": { "type": "string", "description": "What fixed it, e.g. 'restarted switch'" }
                    },
                    "required": ["investigation_id", "resolution"]
                }),
            },
        },
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "investigation_search".into(),
                description: "Search past resolved incidents and known patterns for a symptom. Use this FIRST when the user reports a problem — it may have happened before.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "symptom": { "type": "string", "description": "Symptom keywords to search for" },
                        "limit": { "type": "integer", "description": "Max past incidents to return (default: 5)" }
                    },
                    "required": ["symptom"]
                }),
            },
        },
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "investigation_status".into(),
                description: "Show the active investigation on this thread and its recorded steps.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "thread_id": { "type": "string", "description": "Conversation thread id" }
                    },
                    "required": ["thread_id"]
                }),
            },
        },
    ]
}

pub fn execute(
    store: &OpsStore,
    name: &str,
    args: &serde_json::Value,
) -> Option<Result<String, String>> {
    match name {
        "investigation_start" => Some(execute_start(store, args).map_err(|e| e.to_string())),
        "investigation_step" => Some(execute_step(store, args).map_err(|e| e.to_string())),
        "investigation_resolve" => Some(execute_resolve(store, args).map_err(|e| e.to_string())),
        "investigation_search" => Some(execute_search(store, args).map_err(|e| e.to_string())),
        "investigation_status" => Some(execute_status(store, args).map_err(|e| e.to_string())),
        _ => None,
    }
}

fn execute_start(store: &OpsStore, args: &serde_json::Value) -> EngineResult<String> {
    let thread_id = args["thread_id"]
        .as_str()
        .ok_or("investigation_start: missing 'thread_id' argument")?;
    let symptom = args["symptom"]
        .as_str()
        .ok_or("investigation_start: missing 'symptom' argument")?;

    let inv = incidents::start_investigation(store, thread_id, symptom)?;

    // Surface prior knowledge alongside the fresh investigation so the
    // model starts from what worked last time.
    let context = incidents::generate_incident_context(store, symptom)?;
    let mut out = format!("Investigation {} active: {}", inv.id, inv.trigger);
    if !context.is_empty() {
        out.push_str("\n\n");
        out.push_str(&context);
    }
    Ok(out)
}

fn execute_step(store: &OpsStore, args: &serde_json::Value) -> EngineResult<String> {
    let investigation_id = args["investigation_id"]
        .as_str()
        .ok_or("investigation_step: missing 'investigation_id' argument")?;
    let action = args["action"]
        .as_str()
        .ok_or("investigation_step: missing 'action' argument")?;
    let plugin = args["plugin"].as_str();
    let result = args["result"].as_str();

    incidents::record_step(store, investigation_id, action, plugin, result)?;
    Ok(format!("Step recorded: {action}"))
}

fn execute_resolve(store: &OpsStore, args: &serde_json::Value) -> EngineResult<String> {
    let investigation_id = args["investigation_id"]
        .as_str()
        .ok_or("investigation_resolve: missing 'investigation_id' argument")?;
    let resolution = args["resolution"]
        .as_str()
        .ok_or("investigation_resolve: missing 'resolution' argument")?;

    let inv = incidents::resolve_investigation(store, investigation_id, resolution)?;
    Ok(format!("Resolved '{}': {resolution}", inv.trigger))
}

fn execute_search(store: &OpsStore, args: &serde_json::Value) -> EngineResult<String> {
    let symptom = args["symptom"]
        .as_str()
        .ok_or("investigation_search: missing 'symptom' argument")?;
    let limit = args["limit"]
        .as_u64()
        .map(|l| l as usize)
        .unwrap_or(INCIDENT_SEARCH_LIMIT);

    let patterns = incidents::get_relevant_patterns(store, symptom, PATTERN_MATCH_LIMIT)?;
    let hits = incidents::search_past_incidents(store, symptom, limit)?;
    if patterns.is_empty() && hits.is_empty() {
        return Ok("Nothing similar on record.".to_string());
    }

    let mut out = String::new();
    for p in &patterns {
        out.push_str(&format!(
            "Pattern: '{}' seen {}× — {}\n",
            p.symptom,
            p.occurrence_count,
            p.resolution.as_deref().unwrap_or("no resolution recorded")
        ));
    }
    for inv in &hits {
        out.push_str(&format!(
            "Incident: {} → {}\n",
            inv.trigger,
            inv.resolution.as_deref().unwrap_or("unresolved")
        ));
    }
    Ok(out)
}

fn execute_status(store: &OpsStore, args: &serde_json::Value) -> EngineResult<String> {
    let thread_id = args["thread_id"]
        .as_str()
        .ok_or("investigation_status: missing 'thread_id' argument")?;
    incidents::get_investigation_status(store, thread_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> OpsStore {
        OpsStore::open_in_memory().unwrap()
    }

    fn start(s: &OpsStore) -> String {
        let out = execute(
            s,
            "investigation_start",
            &serde_json::json!({"thread_id": "42", "symptom": "network slow"}),
        )
        .unwrap()
        .unwrap();
        // "Investigation <id> active: …"
        out.split_whitespace().nth(1).unwrap().to_string()
    }

    #[test]
    fn test_full_tool_lifecycle() {
        let s = store();
        let id = start(&s);

        let out = execute(
            &s,
            "investigation_step",
            &serde_json::json!({"investigation_id": id, "action": "checked router", "plugin": "MikroTik", "result": "CPU 45%"}),
        )
        .unwrap()
        .unwrap();
        assert!(out.contains("checked router"));

        let status = execute(
            &s,
            "investigation_status",
            &serde_json::json!({"thread_id": "42"}),
        )
        .unwrap()
        .unwrap();
        assert!(status.contains("network slow"));

        let out = execute(
            &s,
            "investigation_resolve",
            &serde_json::json!({"investigation_id": id, "resolution": "restarted switch"}),
        )
        .unwrap()
        .unwrap();
        assert!(out.contains("restarted switch"));

        // Resolving again is a reported error, not a panic
        let err = execute(
            &s,
            "investigation_resolve",
            &serde_json::json!({"investigation_id": id, "resolution": "again"}),
        )
        .unwrap()
        .unwrap_err();
        assert!(err.contains("already resolved"));
    }

    #[test]
    fn test_search_finds_resolved_incident() {
        let s = store();
        let id = start(&s);
        execute(
            &s,
            "investigation_step",
            &serde_json::json!({"investigation_id": id, "action": "looked", "result": "ok"}),
        )
        .unwrap()
        .unwrap();
        execute(
            &s,
            "investigation_resolve",
            &serde_json::json!({"investigation_id": id, "resolution": "restarted switch"}),
        )
        .unwrap()
        .unwrap();

        let found = execute(
            &s,
            "investigation_search",
            &serde_json::json!({"symptom": "network slow"}),
        )
        .unwrap()
        .unwrap();
        assert!(found.contains("restarted switch"));

        let nothing = execute(
            &s,
            "investigation_search",
            &serde_json::json!({"symptom": "totally unrelated"}),
        )
        .unwrap()
        .unwrap();
        assert_eq!(nothing, "Nothing similar on record.");
    }
}
