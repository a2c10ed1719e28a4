//! Tool Discovery & Naming (component D): fetches tool catalogs from a set
//! of MCP handles, projects them into `ToolDefinition`s with fully-qualified
//! dotted names, and memoizes the catalog for the life of the session.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use super::{clean_schema, ToolDefinition};
use crate::error::{AgentError, ErrorMeta};
use crate::mcp::pool::McpPool;
use crate::mcp::{sanitize_identifier, McpHandle};

/// Caches discovered tool catalogs keyed by endpoint, so a multi-turn
/// auto-selection loop doesn't re-issue `tools/list` every iteration.
/// Invalidated on `invalidate`/`invalidate_all` (mirroring the pool being
/// closed for that endpoint).
pub struct ToolCatalog {
    cache: DashMap<String, Arc<Vec<ToolDefinition>>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    pub fn invalidate(&self, handle: &McpHandle) {
        self.cache.remove(&handle.pool_key());
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    /// Discovers (or returns the memoized) tool list for each handle and
    /// flattens them into one ordered catalog.
    pub async fn discover(
        &self,
        pool: &McpPool,
        handles: &[McpHandle],
    ) -> Result<Vec<ToolDefinition>, AgentError> {
        let mut out = Vec::new();
        for handle in handles {
            let key = handle.pool_key();
            if let Some(cached) = self.cache.get(&key) {
                out.extend(cached.iter().cloned());
                continue;
            }
            let defs = self.discover_one(pool, handle).await?;
            self.cache.insert(key, Arc::new(defs.clone()));
            out.extend(defs);
        }
        Ok(out)
    }

    async fn discover_one(
        &self,
        pool: &McpPool,
        handle: &McpHandle,
    ) -> Result<Vec<ToolDefinition>, AgentError> {
        let result = pool.call(handle, "tools/list", serde_json::json!({})).await?;
        let endpoint_id = handle.endpoint_id();
        let tools = result
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| AgentError::McpConnectionError {
                message: "tools/list response missing `tools` array".into(),
                meta: ErrorMeta::new(handle.endpoint.clone(), false),
            })?;

        let mut out = Vec::with_capacity(tools.len());
        for tool in tools {
            let name = tool
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let description = tool
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let parameters = tool
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({"type": "object"}));
            let dotted_name = format!("{endpoint_id}.{name}");
            out.push(ToolDefinition {
                sanitized_name: sanitize_identifier(&dotted_name),
                dotted_name,
                description,
                parameters: clean_schema(&parameters),
                mcp_handle: handle.clone(),
            });
        }
        Ok(out)
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves a sanitized name the LLM returned back to its `ToolDefinition`
/// (spec §8 property 5: the mapping must be exactly reversible).
pub fn resolve<'a>(catalog: &'a [ToolDefinition], sanitized_name: &str) -> Option<&'a ToolDefinition> {
    catalog.iter().find(|t| t.sanitized_name == sanitized_name)
}
