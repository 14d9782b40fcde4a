/// Integration tests for MCP configuration and wire types
use serde_json::json;
use std::collections::HashMap;
use tether_core::mcp::{
    format_result, McpServerConfig, McpTool, StreamEvent, ToolCallRequest, ToolDescriptorRegistry,
    ToolResponse,
};

/// Test MCP server config serialization
#[test]
fn test_mcp_server_config_serialization() {
    let config = McpServerConfig {
        name: "test-server".to_string(),
        url: "http://localhost:3001/events".to_string(),
        auth_token: Some("test-key".to_string()),
        headers: Some({
            let mut headers = HashMap::new();
            headers.insert("X-Client-Name".to_string(), "tests".to_string());
            headers
        }),
        timeout: 60,
        stream_only: false,
    };

    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("test-server"));
    assert!(json.contains("/events"));

    let deserialized: McpServerConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, config);
}

#[test]
fn test_config_defaults_when_omitted() {
    let config: McpServerConfig =
        serde_json::from_value(json!({"name": "fs", "url": "http://h/events"})).unwrap();

    assert_eq!(config.timeout, 30);
    assert!(config.auth_token.is_none());
    assert!(config.headers.is_none());
    assert!(!config.stream_only);
    assert!(config.validate().is_ok());
}

#[test]
fn test_derived_endpoints() {
    let config = McpServerConfig::new("fs", "https://tools.example.com/v1/events?key=abc");

    assert_eq!(
        config.health_url().as_deref(),
        Some("https://tools.example.com/v1/health?key=abc")
    );
    assert_eq!(
        config.tools_url().as_deref(),
        Some("https://tools.example.com/v1/tools?key=abc")
    );
    assert_eq!(
        config.execute_url().as_deref(),
        Some("https://tools.example.com/v1/execute?key=abc")
    );

    let bare = McpServerConfig::new("fs", "http://tools.example.com/stream");
    assert!(bare.tools_url().is_none());
}

/// Test MCP tool definition
#[test]
fn test_mcp_tool_definition() {
    let tool: McpTool = serde_json::from_value(json!({
        "name": "read_file",
        "description": "Read contents of a file",
        "input_schema": {
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        }
    }))
    .unwrap();

    assert_eq!(tool.name, "read_file");
    assert_eq!(tool.input_schema["required"][0], "path");
    assert!(tool.server_name.is_empty());

    let minimal: McpTool = serde_json::from_value(json!({"name": "noop"})).unwrap();
    assert_eq!(minimal.description, "");
    assert_eq!(minimal.input_schema, json!({}));
}

#[test]
fn test_registry_stamps_owner_and_upserts() {
    let registry = ToolDescriptorRegistry::new("files");
    registry.upsert(McpTool::new("read", "v1", json!({})));
    registry.upsert(McpTool::new("read", "v2", json!({})));

    assert_eq!(registry.len(), 1);
    let read = registry.get("read").unwrap();
    assert_eq!(read.description, "v2");
    assert_eq!(read.server_name, "files");
}

#[test]
fn test_wire_envelopes() {
    let request = ToolCallRequest::new("req_0_1700000000", "ping", json!({"x": 1}));
    assert_eq!(
        serde_json::to_value(&request).unwrap(),
        json!({
            "type": "tool_call",
            "request_id": "req_0_1700000000",
            "tool_name": "ping",
            "parameters": {"x": 1}
        })
    );

    let event: StreamEvent = serde_json::from_value(json!({
        "type": "tool_response",
        "request_id": "req_0_1700000000",
        "result": {"content": "pong"}
    }))
    .unwrap();
    assert_eq!(
        event,
        StreamEvent::ToolResponse(ToolResponse {
            request_id: "req_0_1700000000".to_string(),
            result: Some(json!({"content": "pong"})),
        })
    );

    let unknown: StreamEvent = serde_json::from_value(json!({"type": "progress", "pct": 50})).unwrap();
    assert_eq!(unknown, StreamEvent::Unknown);
}

#[test]
fn test_result_rendering() {
    assert_eq!(format_result(&json!({"content": "pong"})), "pong");
    assert_eq!(format_result(&json!({"message": "saved"})), "saved");
    assert_eq!(
        format_result(&json!({"error": "permission denied"})),
        "Tool execution error: permission denied"
    );
    assert_eq!(format_result(&json!([1, 2])), "[1,2]");
}
