//! Tool Discovery & Naming (D), Parallelization Analyzer (E), and Tool
//! Executor (F): the layer that turns MCP tool catalogs into something an
//! LLM handle can be offered, and turns the LLM's proposed calls back into
//! executed results.

pub mod analyzer;
pub mod discovery;
pub mod executor;

use serde_json::Value;

use crate::mcp::McpHandle;

/// A tool definition projected from an MCP catalog (spec §3): the
/// fully-qualified dotted name `<endpointId>.<toolName>`, description,
/// cleaned JSON-Schema parameters, and a back-pointer to the owning handle.
#[derive(Clone, Debug)]
pub struct ToolDefinition {
    pub dotted_name: String,
    pub sanitized_name: String,
    pub description: String,
    pub parameters: Value,
    pub mcp_handle: McpHandle,
}

/// One executed tool call, as recorded in a step result (spec §3).
#[derive(Clone, Debug)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub arguments: Value,
    pub endpoint: String,
    pub result: Result<Value, String>,
    pub elapsed_ms: u64,
}

/// Strips JSON-Schema keys providers reject (`$schema`, `$id`, `$ref`),
/// spec §4.D.
pub fn clean_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let cleaned: serde_json::Map<String, Value> = map
                .iter()
                .filter(|(k, _)| !matches!(k.as_str(), "$schema" | "$id" | "$ref"))
                .map(|(k, v)| (k.clone(), clean_schema(v)))
                .collect();
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(items.iter().map(clean_schema).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_schema_strips_non_portable_keys() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "id": {"$id": "foo", "type": "string"}
            }
        });
        let cleaned = clean_schema(&schema);
        assert!(cleaned.get("$schema").is_none());
        assert!(cleaned["properties"]["id"].get("$id").is_none());
        assert_eq!(cleaned["type"], "object");
    }
}
