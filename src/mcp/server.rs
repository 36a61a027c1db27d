// MCP HTTP surface, grounded on `mcp/streamable_http.rs`'s manual JSON-RPC
// dispatch: parse the body as a `jsonrpc_core::Request`, match a single
// `Call::MethodCall` by name, and translate the result into a JSON-RPC
// `Output`. This omits the teacher's session/SSE machinery (no server-push
// transport is needed for a read-only tool set) but keeps its envelope
// shape, so any MCP client speaking plain JSON-RPC-over-HTTP can use it.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use jsonrpc_core::types::request::{Call, MethodCall};
use jsonrpc_core::types::response::{Failure, Output, Success};
use jsonrpc_core::{Error as RpcError, ErrorCode, Id, Request as RpcRequest, Value, Version};
use serde_json::json;
use tracing::warn;

use crate::mcp::tools::{self, ToolContext};
use crate::mcp::types::tool_definitions;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "conduit";

#[derive(Clone)]
pub struct McpServer {
    ctx: ToolContext,
}

impl McpServer {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new().route("/mcp", post(handle_post)).with_state(self)
    }

    async fn dispatch(&self, call: MethodCall) -> Output {
        let id = call.id.clone();
        let result = match call.method.as_str() {
            "initialize" => Ok(self.capabilities()),
            "tools/list" => Ok(json!({ "tools": tool_definitions() })),
            "tools/call" => self.handle_tool_call(call.params.clone()).await,
            "ping" => Ok(json!({ "status": "ok", "server": SERVER_NAME })),
            other => Err(RpcError {
                code: ErrorCode::MethodNotFound,
                message: format!("unknown method: {other}"),
                data: None,
            }),
        };

        match result {
            Ok(value) => Output::Success(Success { jsonrpc: Some(Version::V2), result: value, id }),
            Err(error) => Output::Failure(Failure { jsonrpc: Some(Version::V2), error, id }),
        }
    }

    fn capabilities(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
            "capabilities": { "tools": {} },
        })
    }

    async fn handle_tool_call(&self, params: jsonrpc_core::Params) -> std::result::Result<Value, RpcError> {
        let params: Value = params.parse().map_err(|_| RpcError {
            code: ErrorCode::InvalidParams,
            message: "tools/call requires named parameters".to_string(),
            data: None,
        })?;

        let name = params.get("name").and_then(Value::as_str).ok_or_else(|| RpcError {
            code: ErrorCode::InvalidParams,
            message: "tools/call requires a 'name' field".to_string(),
            data: None,
        })?;

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        tools::call(name, arguments, &self.ctx).await.map_err(|err| {
            warn!(tool = name, error = %err, "mcp tool call failed");
            RpcError { code: ErrorCode::InternalError, message: err.to_string(), data: None }
        })
    }
}

async fn handle_post(State(state): State<Arc<McpServer>>, Json(request): Json<RpcRequest>) -> impl IntoResponse {
    let output = match request {
        RpcRequest::Single(Call::MethodCall(call)) => Some(state.dispatch(call).await),
        RpcRequest::Single(Call::Notification(_)) => None,
        RpcRequest::Single(Call::Invalid { id }) => Some(Output::Failure(Failure {
            jsonrpc: Some(Version::V2),
            error: RpcError { code: ErrorCode::InvalidRequest, message: "invalid request".to_string(), data: None },
            id,
        })),
        RpcRequest::Batch(_) => Some(Output::Failure(Failure {
            jsonrpc: Some(Version::V2),
            error: RpcError { code: ErrorCode::InvalidRequest, message: "batch requests are not supported".to_string(), data: None },
            id: Id::Null,
        })),
    };

    match output {
        Some(output) => Json(serde_json::to_value(output).unwrap_or_else(|_| Value::Null)).into_response(),
        None => axum::http::StatusCode::ACCEPTED.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::Store;
    use crate::graph_query::GraphQueryEngine;
    use crate::retrieval::RetrievalEngine;
    use crate::store::FileStore;
    use jsonrpc_core::Params;

    async fn test_server() -> McpServer {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> = Arc::new(FileStore::open(dir.path().to_path_buf()).await.unwrap());
        let ctx = ToolContext {
            retrieval: Arc::new(RetrievalEngine::new(store.clone())),
            graph: Arc::new(GraphQueryEngine::new(store.clone())),
            store,
        };
        McpServer::new(ctx)
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let server = test_server().await;
        let call = MethodCall { jsonrpc: Some(Version::V2), method: "initialize".to_string(), params: Params::None, id: Id::Num(1) };
        let output = server.dispatch(call).await;
        match output {
            Output::Success(success) => assert_eq!(success.result["serverInfo"]["name"], SERVER_NAME),
            Output::Failure(_) => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let server = test_server().await;
        let call = MethodCall { jsonrpc: Some(Version::V2), method: "tools/delete".to_string(), params: Params::None, id: Id::Num(2) };
        let output = server.dispatch(call).await;
        match output {
            Output::Failure(failure) => assert_eq!(failure.error.code, ErrorCode::MethodNotFound),
            Output::Success(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn tools_list_includes_all_six_read_only_tools() {
        let server = test_server().await;
        let call = MethodCall { jsonrpc: Some(Version::V2), method: "tools/list".to_string(), params: Params::None, id: Id::Num(3) };
        let output = server.dispatch(call).await;
        match output {
            Output::Success(success) => assert_eq!(success.result["tools"].as_array().unwrap().len(), 6),
            Output::Failure(_) => panic!("expected success"),
        }
    }
}
