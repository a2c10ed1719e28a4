//! One real MCP endpoint (stub server) advertising a single tool; the LLM
//! proposes exactly one call, then returns a final answer with no further
//! calls.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{mcp_handshake_response, ok_result, rpc_id, rpc_method, spawn_stub_server, text_content_result};
use skein::llm::mock::{MockLlm, ScriptedTurn};
use skein::llm::ToolCall;
use skein::mcp::McpHandle;
use skein::pipeline::LlmStep;
use skein::{mcp, ExecutionContext, Pipeline};

#[tokio::test]
async fn one_round_of_automatic_tool_selection() {
    // initialize, notifications/initialized, tools/list, tools/call.
    let server = spawn_stub_server(4, |_path, body| {
        let method = rpc_method(body);
        if let Some(resp) = mcp_handshake_response(method, body) {
            return resp;
        }
        let id = rpc_id(body);
        match method {
            "tools/list" => (
                "200 OK".into(),
                ok_result(
                    &id,
                    json!({
                        "tools": [{
                            "name": "get_sign",
                            "description": "looks up a zodiac sign from a birthdate",
                            "inputSchema": {
                                "type": "object",
                                "properties": {"birthdate": {"type": "string"}},
                                "required": ["birthdate"]
                            }
                        }]
                    }),
                ),
            ),
            "tools/call" => ("200 OK".into(), text_content_result(&id, "\"Cancer\"")),
            other => panic!("unexpected method in this scenario: {other}"),
        }
    })
    .await;

    let handle = McpHandle::http(server.url("/mcp"));
    let dotted = format!("{}.get_sign", handle.endpoint_id());
    let sanitized = mcp::sanitize_identifier(&dotted);

    let tool_call = ToolCall {
        name: sanitized.clone(),
        arguments: json!({"birthdate": "1993-07-11"}).as_object().unwrap().clone(),
        mcp_handle_id: None,
    };
    let llm = Arc::new(MockLlm::new(
        "mock",
        vec![
            ScriptedTurn::tool_calls(vec![tool_call]),
            ScriptedTurn::text("Cancer"),
        ],
    ));
    let ctx = ExecutionContext::new(llm.clone());
    let pipeline = Pipeline::new().llm(LlmStep {
        prompt: Some("what sign is someone born 1993-07-11?".into()),
        mcps: vec![handle],
        ..Default::default()
    });

    let results = pipeline.run(&ctx, None).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tool_calls.len(), 1);
    assert!(results[0].tool_calls[0].tool_name.ends_with(".get_sign"));
    assert_eq!(results[0].final_text.as_deref(), Some("Cancer"));
    assert_eq!(server.requests_to("/mcp"), 4);
    assert_eq!(llm.call_count(), 2);
}
