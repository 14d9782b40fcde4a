use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::mcp::McpServerConfig;
use crate::{Result, TetherError};

/// Value sent in `X-Client-Name` by the preset servers
pub const CLIENT_NAME: &str = "tether";

/// Default config file, overridable with `TETHER_MCP_CONFIG`
pub const DEFAULT_CONFIG_PATH: &str = "mcp.toml";

/// Global MCP settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct McpSettings {
    pub enable_mcp: bool,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    /// Seconds between reconnect attempts
    pub reconnect_delay: u64,
    /// Seconds between supervisor sweeps
    pub health_check_interval: u64,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            enable_mcp: env_flag("ENABLE_MCP").unwrap_or(false),
            auto_reconnect: env_flag("MCP_AUTO_RECONNECT").unwrap_or(true),
            max_reconnect_attempts: env_parse("MCP_MAX_RECONNECT_ATTEMPTS").unwrap_or(3),
            reconnect_delay: env_parse("MCP_RECONNECT_DELAY").unwrap_or(5),
            health_check_interval: env_parse("MCP_HEALTH_CHECK_INTERVAL").unwrap_or(60),
        }
    }
}

/// Settings plus the ordered list of servers to connect
#[derive(Clone, Debug, Default)]
pub struct McpConfig {
    pub settings: McpSettings,
    pub servers: Vec<McpServerConfig>,
}

impl McpConfig {
    /// Settings and preset servers from environment variables only
    pub fn from_env() -> Self {
        Self {
            settings: McpSettings::default(),
            servers: env_servers(),
        }
    }

    /// Parse a TOML document; `[settings]` keys overlay the env-backed defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let parsed: McpToml = toml::from_str(s)?;

        let mut settings = McpSettings::default();
        if let Some(overlay) = parsed.settings {
            overlay.apply(&mut settings);
        }

        for server in &parsed.servers {
            server
                .validate()
                .map_err(|e| TetherError::Config(format!("server '{}': {}", server.name, e)))?;
        }

        Ok(Self {
            settings,
            servers: parsed.servers,
        })
    }

    /// Load configuration from a TOML file (path via TETHER_MCP_CONFIG or ./mcp.toml),
    /// falling back to the environment. Env preset servers are appended unless a
    /// server of the same name is already configured.
    pub fn load() -> Self {
        let path =
            std::env::var("TETHER_MCP_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!(target: "config", path = %path.display(), "No MCP config file found; using env");
            return Self::from_env();
        }

        let mut config = match fs::read_to_string(path)
            .map_err(TetherError::from)
            .and_then(|s| Self::from_toml_str(&s))
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(target: "config", path = %path.display(), error = %e, "Failed to load MCP config; using env");
                return Self::from_env();
            }
        };

        for preset in env_servers() {
            if !config.servers.iter().any(|s| s.name == preset.name) {
                config.servers.push(preset);
            }
        }

        tracing::info!(
            target: "config",
            path = %path.display(),
            servers = config.servers.len(),
            enabled = config.settings.enable_mcp,
            "Loaded MCP config"
        );
        config
    }

    pub fn server(&self, name: &str) -> Option<&McpServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }
}

fn env_servers() -> Vec<McpServerConfig> {
    let mut servers = Vec::new();

    if let Some(url) = env_nonempty("MCP_FILE_SERVER_URL") {
        let mut cfg = McpServerConfig::new("file_server", url)
            .with_header("X-Client-Name", CLIENT_NAME)
            .with_timeout(30);
        cfg.auth_token = env_nonempty("MCP_FILE_SERVER_TOKEN");
        servers.push(cfg);
    }

    if let Some(url) = env_nonempty("MCP_DATABASE_SERVER_URL") {
        let mut cfg = McpServerConfig::new("database_server", url).with_timeout(60);
        cfg.auth_token = env_nonempty("MCP_DATABASE_SERVER_TOKEN");
        servers.push(cfg);
    }

    if let Some(url) = env_nonempty("MCP_API_SERVER_URL") {
        let mut cfg = McpServerConfig::new("api_server", url)
            .with_header("X-API-Version", "v1")
            .with_header("X-Client-Name", CLIENT_NAME)
            .with_timeout(45);
        cfg.auth_token = env_nonempty("MCP_API_SERVER_TOKEN");
        servers.push(cfg);
    }

    servers
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_nonempty(key).and_then(|v| v.trim().parse::<T>().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    env_nonempty(key).map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Default, Deserialize)]
struct McpToml {
    settings: Option<SettingsToml>,
    #[serde(default)]
    servers: Vec<McpServerConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsToml {
    enable_mcp: Option<bool>,
    auto_reconnect: Option<bool>,
    max_reconnect_attempts: Option<u32>,
    reconnect_delay: Option<u64>,
    health_check_interval: Option<u64>,
}

impl SettingsToml {
    fn apply(self, s: &mut McpSettings) {
        if let Some(v) = self.enable_mcp {
            s.enable_mcp = v;
        }
        if let Some(v) = self.auto_reconnect {
            s.auto_reconnect = v;
        }
        if let Some(v) = self.max_reconnect_attempts {
            s.max_reconnect_attempts = v;
        }
        if let Some(v) = self.reconnect_delay {
            s.reconnect_delay = v;
        }
        if let Some(v) = self.health_check_interval {
            s.health_check_interval = v;
        }
    }
}
