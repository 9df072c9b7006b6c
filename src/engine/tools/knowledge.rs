// Deckhand Engine — Knowledge tools
// knowledge_remember, knowledge_recall, knowledge_resolve_alias,
// knowledge_store_alias, knowledge_correct, knowledge_invalidate

use crate::atoms::constants::DEFAULT_DISCOVERED_CONFIDENCE;
use crate::atoms::error::EngineResult;
use crate::atoms::types::{FactSource, FunctionDefinition, ToolDefinition};
use crate::engine::knowledge;
use crate::engine::store::OpsStore;

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "knowledge_remember".into(),
                description: "Store a fact about the infrastructure under a topic. Topics are hierarchical: 'docker:nginx', 'network:dns', 'hardware:nas'. Re-asserting a known fact raises its confidence instead of duplicating it. Use this whenever you discover something worth keeping.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "topic": { "type": "string", "description": "Hierarchical topic key, e.g. 'docker:nginx'" },
                        "fact": { "type": "string", "description": "The fact to remember" },
                        "context": { "type": "string", "description": "Optional context (why/where this was learned)" },
                        "confidence": { "type": "number", "description": "How sure you are, 0.0 to 1.0 (default: 0.8)" }
                    },
                    "required": ["topic", "fact"]
                }),
            },
        },
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "knowledge_recall".into(),
                description: "Recall stored facts, optionally filtered by topic or topic prefix ('docker' matches 'docker:nginx'). Returns facts ordered by confidence.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "topic": { "type": "string", "description": "Topic or topic prefix to filter by (optional)" },
                        "include_stale": { "type": "boolean", "description": "Include low-confidence facts (default: false)" }
                    }
                }),
            },
        },
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "knowledge_resolve_alias".into(),
                description: "Resolve a user-facing name ('the office mac', 'nas') to its stored value (IP, hostname, id) via alias facts.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "alias_type": { "type": "string", "description": "Alias namespace, e.g. 'mac', 'host', 'device'" },
                        "input": { "type": "string", "description": "The name the user used" }
                    },
                    "required": ["alias_type", "input"]
                }),
            },
        },
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "knowledge_store_alias".into(),
                description: "Teach a name → value alias ('office mac' → '192.168.1.20') so the user can refer to things by their own names.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "alias_type": { "type": "string", "description": "Alias namespace, e.g. 'mac', 'host', 'device'" },
                        "name": { "type": "string", "description": "The user-facing name" },
                        "value": { "type": "string", "description": "What it resolves to" }
                    },
                    "required": ["alias_type", "name", "value"]
                }),
            },
        },
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "knowledge_correct".into(),
                description: "The user corrected a stored fact: invalidate the old fact and store the replacement at full confidence, linked to what it contradicts.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "topic": { "type": "string", "description": "Topic of the wrong fact" },
                        "old_fact": { "type": "string", "description": "Substring identifying the wrong fact" },
                        "new_fact": { "type": "string", "description": "The corrected fact" }
                    },
                    "required": ["topic", "old_fact", "new_fact"]
                }),
            },
        },
        ToolDefinition {
            tool_type: "function".into(),
            function: FunctionDefinition {
                name: "knowledge_invalidate".into(),
                description: "Mark stored facts as no longer true (soft delete). Matches facts under a topic whose text contains the given substring.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "topic": { "type": "string", "description": "Topic of the fact(s)" },
                        "fact": { "type": "string", "description": "Substring identifying the fact(s)" }
                    },
                    "required": ["topic", "fact"]
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
        "knowledge_remember" => Some(execute_remember(store, args).map_err(|e| e.to_string())),
        "knowledge_recall" => Some(execute_recall(store, args).map_err(|e| e.to_string())),
        "knowledge_resolve_alias" => Some(execute_resolve_alias(store, args).map_err(|e| e.to_string())),
        "knowledge_store_alias" => Some(execute_store_alias(store, args).map_err(|e| e.to_string())),
        "knowledge_correct" => Some(execute_correct(store, args).map_err(|e| e.to_string())),
        "knowledge_invalidate" => Some(execute_invalidate(store, args).map_err(|e| e.to_string())),
        _ => None,
    }
}

fn execute_remember(store: &OpsStore, args: &serde_json::Value) -> EngineResult<String> {
    let topic = args["topic"]
        .as_str()
        .ok_or("knowledge_remember: missing 'topic' argument")?;
    let fact = args["fact"]
        .as_str()
        .ok_or("knowledge_remember: missing 'fact' argument")?;
    let context = args["context"].as_str();
    let confidence = args["confidence"]
        .as_f64()
        .unwrap_or(DEFAULT_DISCOVERED_CONFIDENCE);

    let stored = knowledge::remember_fact(
        store,
        topic,
        fact,
        context,
        FactSource::Discovered,
        confidence,
    )?;
    Ok(format!(
        "Remembered under '{}' (confidence {:.0}%)",
        stored.topic,
        stored.confidence * 100.0
    ))
}

fn execute_recall(store: &OpsStore, args: &serde_json::Value) -> EngineResult<String> {
    let topic = args["topic"].as_str();
    let include_stale = args["include_stale"].as_bool().unwrap_or(false);

    let facts = knowledge::recall(store, topic, include_stale)?;
    if facts.is_empty() {
        return Ok(match topic {
            Some(t) => format!("No facts stored under '{t}'."),
            None => "No facts stored yet.".to_string(),
        });
    }

    let mut out = String::new();
    for fact in &facts {
        out.push_str(&format!(
            "[{}] {} (confidence {:.0}%)\n",
            fact.topic,
            fact.fact,
            fact.confidence * 100.0
        ));
    }
    Ok(out)
}

fn execute_resolve_alias(store: &OpsStore, args: &serde_json::Value) -> EngineResult<String> {
    let alias_type = args["alias_type"]
        .as_str()
        .ok_or("knowledge_resolve_alias: missing 'alias_type' argument")?;
    let input = args["input"]
        .as_str()
        .ok_or("knowledge_resolve_alias: missing 'input' argument")?;

    Ok(match knowledge::resolve_alias(store, alias_type, input)? {
        Some(value) => format!("'{input}' → {value}"),
        None => format!("No {alias_type} alias matches '{input}'."),
    })
}

fn execute_store_alias(store: &OpsStore, args: &serde_json::Value) -> EngineResult<String> {
    let alias_type = args["alias_type"]
        .as_str()
        .ok_or("knowledge_store_alias: missing 'alias_type' argument")?;
    let alias_name = args["name"]
        .as_str()
        .ok_or("knowledge_store_alias: missing 'name' argument")?;
    let value = args["value"]
        .as_str()
        .ok_or("knowledge_store_alias: missing 'value' argument")?;

    knowledge::store_alias(store, alias_type, alias_name, value)?;
    Ok(format!("Alias stored: {alias_name} → {value}"))
}

fn execute_correct(store: &OpsStore, args: &serde_json::Value) -> EngineResult<String> {
    let topic = args["topic"]
        .as_str()
        .ok_or("knowledge_correct: missing 'topic' argument")?;
    let old_fact = args["old_fact"]
        .as_str()
        .ok_or("knowledge_correct: missing 'old_fact' argument")?;
    let new_fact = args["new_fact"]
        .as_str()
        .ok_or("knowledge_correct: missing 'new_fact' argument")?;

    let stored = knowledge::learn_correction(store, topic, old_fact, new_fact)?;
    Ok(match &stored.contradicts {
        Some(_) => format!("Corrected '{topic}': old fact invalidated, new fact stored."),
        None => format!("No prior fact matched under '{topic}'; stored the new fact."),
    })
}

fn execute_invalidate(store: &OpsStore, args: &serde_json::Value) -> EngineResult<String> {
    let topic = args["topic"]
        .as_str()
        .ok_or("knowledge_invalidate: missing 'topic' argument")?;
    let fact = args["fact"]
        .as_str()
        .ok_or("knowledge_invalidate: missing 'fact' argument")?;

    let count = knowledge::invalidate(store, topic, fact)?;
    Ok(match count {
        0 => format!("No facts under '{topic}' match '{fact}'."),
        n => format!("Invalidated {n} fact(s) under '{topic}'."),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> OpsStore {
        OpsStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_remember_then_recall_round_trip() {
        let s = store();
        let result = execute(
            &s,
            "knowledge_remember",
            &serde_json::json!({"topic": "docker:nginx", "fact": "Container 'nginx' is running", "confidence": 0.9}),
        )
        .unwrap()
        .unwrap();
        assert!(result.contains("docker:nginx"));

        let recalled = execute(&s, "knowledge_recall", &serde_json::json!({"topic": "docker"}))
            .unwrap()
            .unwrap();
        assert!(recalled.contains("Container 'nginx' is running"));
    }

    #[test]
    fn test_missing_argument_is_soft_error() {
        let s = store();
        let result = execute(&s, "knowledge_remember", &serde_json::json!({"topic": "x"})).unwrap();
        let err = result.unwrap_err();
        assert!(err.contains("missing 'fact'"));
    }

    #[test]
    fn test_alias_store_and_resolve() {
        let s = store();
        execute(
            &s,
            "knowledge_store_alias",
            &serde_json::json!({"alias_type": "host", "name": "nas", "value": "10.0.0.5"}),
        )
        .unwrap()
        .unwrap();

        let resolved = execute(
            &s,
            "knowledge_resolve_alias",
            &serde_json::json!({"alias_type": "host", "input": "nas"}),
        )
        .unwrap()
        .unwrap();
        assert!(resolved.contains("10.0.0.5"));
    }

    #[test]
    fn test_recall_empty_message() {
        let s = store();
        let result = execute(&s, "knowledge_recall", &serde_json::json!({})).unwrap().unwrap();
        assert_eq!(result, "No facts stored yet.");
    }
}
