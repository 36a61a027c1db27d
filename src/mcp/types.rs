// MCP wire types, grounded on the teacher's `mcp/types.rs` (`ToolDefinition`,
// request/response pairs per tool) and `mcp/streamable_http.rs`'s
// `serde_json::json!` capability/tool-call envelope shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct KbSearchArgs {
    pub query: String,
    pub limit: Option<usize>,
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct KbSearchWithContextArgs {
    pub query: String,
    pub limit: Option<usize>,
    pub context_chunks: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct KbGetDocumentArgs {
    pub document_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct KagQueryArgs {
    pub query: String,
    pub max_hops: Option<usize>,
    pub max_entities: Option<usize>,
}

/// The six read-only tools this daemon exposes over MCP (spec.md §6). No
/// write-side tool is ever registered here — creating or mutating sources,
/// instances, or documents stays on the HTTP API only.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "kb_search".to_string(),
            description: "Hybrid lexical/semantic search over the knowledge base".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "limit": { "type": "integer" },
                    "source_id": { "type": "string" }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: "kb_search_with_context".to_string(),
            description: "Search and include neighboring chunks from the same document".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "limit": { "type": "integer" },
                    "context_chunks": { "type": "integer" }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: "kb_list_sources".to_string(),
            description: "List every registered knowledge base source".to_string(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        },
        ToolDefinition {
            name: "kb_get_document".to_string(),
            description: "Fetch a document's full content by id".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": { "document_id": { "type": "string" } },
                "required": ["document_id"]
            }),
        },
        ToolDefinition {
            name: "kb_stats".to_string(),
            description: "Summary counts across sources, documents, and chunks".to_string(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        },
        ToolDefinition {
            name: "kag_query".to_string(),
            description: "Query the entity/relation graph built from the knowledge base".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "max_hops": { "type": "integer" },
                    "max_entities": { "type": "integer" }
                },
                "required": ["query"]
            }),
        },
    ]
}
