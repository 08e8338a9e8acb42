use config::{Config, File};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

pub mod validator;

use crate::cli::StartArgs;

/// Top-level settings: `troupe.toml` plus `config/agents/*`, then CLI/env overrides
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub client: ClientSettings,
    /// Agents created when the server starts
    #[serde(default)]
    pub agents: Vec<AgentDeployment>,
}

/// Result storage backend of the servicer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PoolType {
    #[default]
    Local,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    /// Host advertised to clients
    #[serde(default = "default_host")]
    pub host: String,
    /// Requested port; a free port is used when absent or taken
    #[serde(default)]
    pub port: Option<u16>,
    /// Worker pool size
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub pool_type: PoolType,
    /// Maximum number of results kept
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
    /// Seconds a result is kept
    #[serde(default = "default_max_expire_time")]
    pub max_expire_time: u64,
    /// Bind to loopback only
    #[serde(default = "default_local_mode")]
    pub local_mode: bool,
    /// Largest accepted request body in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Seconds the launcher waits for a clean exit before killing the server
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    /// Longest a single get_result call blocks server side
    #[serde(default = "default_result_wait")]
    pub result_wait_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientSettings {
    /// Give up waiting for a result after this many seconds
    #[serde(default = "default_max_timeout")]
    pub max_timeout_seconds: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Pause between result polls that came back not ready
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

/// An agent the server creates at startup
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentDeployment {
    pub id: String,
    pub class: String,
    #[serde(default = "default_args")]
    pub args: Value,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_capacity() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_max_pool_size() -> usize {
    8192
}

fn default_max_expire_time() -> u64 {
    7200
}

fn default_local_mode() -> bool {
    true
}

fn default_max_message_size() -> usize {
    32 * 1024 * 1024
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_result_wait() -> u64 {
    1000
}

fn default_max_timeout() -> u64 {
    1800
}

fn default_request_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_args() -> Value {
    Value::Object(Default::default())
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            capacity: default_capacity(),
            pool_type: PoolType::default(),
            max_pool_size: default_max_pool_size(),
            max_expire_time: default_max_expire_time(),
            local_mode: default_local_mode(),
            max_message_size: default_max_message_size(),
            shutdown_grace_seconds: default_shutdown_grace(),
            result_wait_ms: default_result_wait(),
        }
    }
}

impl ServerSettings {
    /// Interface the listener binds to
    pub fn bind_host(&self) -> &str {
        if self.local_mode {
            "127.0.0.1"
        } else {
            "0.0.0.0"
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            max_timeout_seconds: default_max_timeout(),
            request_timeout_seconds: default_request_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, anyhow::Error> {
        Self::from_root(".")
    }

    /// Load `<config file>` and the agent directory next to it, then apply `start` flags
    pub fn new_with_cli(config_path: &Path, args: &StartArgs) -> Result<Self, anyhow::Error> {
        let root = config_path
            .parent()
            .and_then(|p| p.to_str())
            .filter(|p| !p.is_empty())
            .unwrap_or(".");

        let s = Config::builder()
            .add_source(File::from(config_path.to_path_buf()).required(false))
            .build()?;

        let mut settings: Settings = s.try_deserialize()?;
        settings.apply_cli_overrides(args);
        settings.load_agents_from_dir(&format!("{}/config/agents", root))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_root(root: &str) -> Result<Self, anyhow::Error> {
        let config_path = Path::new(root).join("troupe");
        let s = Config::builder()
            .add_source(File::from(config_path).required(false))
            .build()?;

        let mut settings: Settings = s.try_deserialize()?;
        settings.load_agents_from_dir(&format!("{}/config/agents", root))?;
        settings.validate()?;
        Ok(settings)
    }

    /// CLI flags (and their env vars) win over the file
    pub fn apply_cli_overrides(&mut self, args: &StartArgs) {
        if let Some(host) = &args.host {
            self.server.host = host.clone();
        }
        if args.port.is_some() {
            self.server.port = args.port;
        }
        if let Some(capacity) = args.capacity {
            self.server.capacity = capacity;
        }
        if let Some(pool_type) = args.pool_type {
            self.server.pool_type = pool_type;
        }
        if let Some(size) = args.max_pool_size {
            self.server.max_pool_size = size;
        }
        if let Some(expire) = args.max_expire_time {
            self.server.max_expire_time = expire;
        }
        if let Some(local_mode) = args.local_mode {
            self.server.local_mode = local_mode;
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        validator::ConfigValidator::validate(self).map_err(|errors| {
            let error_messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow::anyhow!(
                "Configuration validation failed:\n{}",
                error_messages.join("\n")
            )
        })
    }

    fn load_agents_from_dir(&mut self, path: &str) -> Result<(), anyhow::Error> {
        let pattern = format!("{}/*", path);
        for entry in glob::glob(&pattern)? {
            match entry {
                Ok(path) => {
                    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                        if matches!(ext, "json" | "yaml" | "yml" | "toml") {
                            let content = std::fs::read_to_string(&path)?;
                            let agent: AgentDeployment = match ext {
                                "json" => serde_json::from_str(&content)?,
                                "toml" => toml::from_str(&content)?,
                                _ => serde_yaml::from_str(&content)?,
                            };
                            self.agents.push(agent);
                        }
                    }
                }
                Err(e) => tracing::warn!("Failed to read glob entry: {}", e),
            }
        }
        Ok(())
    }
}
