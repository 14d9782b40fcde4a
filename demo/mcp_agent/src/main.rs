use serde_json::{json, Value};
use std::sync::Arc;
use tether_core::mcp::{McpManager, McpSupervisor};
use tether_core::{init_logging, McpConfig, Tool, ToolRegistry};
use tokio::signal;
use tracing::{error, info, warn};

/// `--call <tool> [json-arguments]`
fn parse_call(args: &[String]) -> Result<Option<(String, Value)>, String> {
    let Some(pos) = args.iter().position(|a| a == "--call") else {
        return Ok(None);
    };
    let tool = args
        .get(pos + 1)
        .ok_or_else(|| "--call needs a tool name".to_string())?
        .clone();
    let arguments = match args.get(pos + 2) {
        Some(raw) => serde_json::from_str(raw).map_err(|e| format!("invalid JSON arguments: {}", e))?,
        None => json!({}),
    };
    Ok(Some((tool, arguments)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info,tether_core=info,mcp_agent=info");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let call = parse_call(&args)?;

    let cfg = McpConfig::load();
    if !cfg.settings.enable_mcp {
        info!(target: "mcp_agent", "MCP disabled (set ENABLE_MCP=true or [settings] enable_mcp)");
        return Ok(());
    }
    if cfg.servers.is_empty() {
        warn!(target: "mcp_agent", "No MCP servers configured");
        return Ok(());
    }

    let manager = Arc::new(McpManager::new());
    let connected = manager.connect_all(cfg.servers.clone()).await;
    info!(
        target: "mcp_agent",
        connected = connected,
        configured = cfg.servers.len(),
        "MCP servers ready"
    );

    let status = json!({
        "enabled": cfg.settings.enable_mcp,
        "servers": manager.status().await,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);

    let registry = ToolRegistry::new();
    manager.register_tools(&registry).await;
    for tool in manager.all_tools().await {
        println!("{:<40} {}", tool.qualified_name(), tool.description());
    }

    if let Some((name, arguments)) = call {
        match registry.call(&name, arguments).await {
            Ok(Value::String(text)) => println!("{}", text),
            Ok(other) => println!("{}", other),
            Err(e) => error!(target: "mcp_agent", tool = %name, error = %e, "Tool call failed"),
        }
    }

    let supervisor = cfg
        .settings
        .auto_reconnect
        .then(|| McpSupervisor::new(Arc::clone(&manager), cfg.settings.clone()).spawn());

    info!(target: "mcp_agent", "Running; press Ctrl+C to exit");
    if let Err(e) = signal::ctrl_c().await {
        error!(target: "mcp_agent", error = %e, "Failed to listen for Ctrl+C");
    }

    if let Some(handle) = supervisor {
        handle.abort();
    }
    manager.disconnect_all().await;
    info!(target: "mcp_agent", "Shutdown complete");
    Ok(())
}
