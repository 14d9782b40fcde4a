/// MCP reconnect supervisor
///
/// Clients never reconnect on their own. The supervisor polls the manager's
/// status and re-adds servers whose stream has dropped.
use super::manager::McpManager;
use crate::config::McpSettings;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// Result of one reconnect cycle for one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectOutcome {
    pub server: String,
    pub attempts: u32,
    pub reconnected: bool,
}

pub struct McpSupervisor {
    manager: Arc<McpManager>,
    settings: McpSettings,
}

impl McpSupervisor {
    pub fn new(manager: Arc<McpManager>, settings: McpSettings) -> Self {
        Self { manager, settings }
    }

    /// Reconnect every registered server that is no longer connected
    pub async fn check_once(&self) -> Vec<ReconnectOutcome> {
        if !self.settings.auto_reconnect {
            return Vec::new();
        }

        let dropped: Vec<String> = self
            .manager
            .status()
            .await
            .into_iter()
            .filter(|(_, status)| !status.connected)
            .map(|(name, _)| name)
            .collect();

        let mut outcomes = Vec::with_capacity(dropped.len());
        for server in dropped {
            outcomes.push(self.reconnect(&server).await);
        }
        outcomes
    }

    /// Run [`check_once`](Self::check_once) every health check interval
    pub fn spawn(self) -> JoinHandle<()> {
        let period = Duration::from_secs(self.settings.health_check_interval.max(1));
        info!(
            target: "mcp_supervisor",
            interval_secs = period.as_secs(),
            "Starting MCP reconnect supervisor"
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let outcomes = self.check_once().await;
                if !outcomes.is_empty() {
                    debug!(
                        target: "mcp_supervisor",
                        count = outcomes.len(),
                        "Reconnect cycle finished"
                    );
                }
            }
        })
    }

    async fn reconnect(&self, server: &str) -> ReconnectOutcome {
        let Some(config) = self.manager.server_config(server).await else {
            return ReconnectOutcome {
                server: server.to_string(),
                attempts: 0,
                reconnected: false,
            };
        };
        let hook = self.manager.client_hook(server).await;

        warn!(target: "mcp_supervisor", server = %server, "MCP server disconnected, reconnecting");
        self.manager.remove_server(server).await;

        let max_attempts = self.settings.max_reconnect_attempts;
        let delay = Duration::from_secs(self.settings.reconnect_delay);

        for attempt in 1..=max_attempts {
            match self.manager.add_configured(config.clone(), hook.clone()).await {
                Ok(tool_count) => {
                    info!(
                        target: "mcp_supervisor",
                        server = %server,
                        attempt = attempt,
                        tool_count = tool_count,
                        "MCP server reconnected"
                    );
                    return ReconnectOutcome {
                        server: server.to_string(),
                        attempts: attempt,
                        reconnected: true,
                    };
                }
                Err(e) => {
                    warn!(
                        target: "mcp_supervisor",
                        server = %server,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Reconnect attempt failed"
                    );
                    if attempt < max_attempts {
                        sleep(delay).await;
                    }
                }
            }
        }

        error!(
            target: "mcp_supervisor",
            server = %server,
            attempts = max_attempts,
            "Giving up on MCP server"
        );
        ReconnectOutcome {
            server: server.to_string(),
            attempts: max_attempts,
            reconnected: false,
        }
    }
}
