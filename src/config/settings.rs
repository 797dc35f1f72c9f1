/*
* Balancer configuration
* ----------------------
*
* Settings are read exactly once at startup and then handed around as an
* immutable value. Sources, from lowest to highest priority:
*
* 1. Built-in defaults (the `Default` impls below)
* 2. `$CONFIG_PATH/default.toml` (optional, `CONFIG_PATH` defaults to `config`)
* 3. `$CONFIG_PATH/local.toml` (optional)
* 4. An explicit file passed with `--config` (required when given)
* 5. Environment variables prefixed with `DRS_`, nested with `__`:
*      DRS_BALANCER__LOAD_THRESHOLD=25
*      DRS_BALANCER__TARGET_NODES=pve1,pve2
*      DRS_CLUSTER__TOKEN_SECRET=...
*
* Anything that fails `validate` is fatal; the control loop never starts on a
* bad configuration.
*/

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cluster: ClusterSettings,
    pub balancer: BalancerSettings,
    pub status_api: StatusApiSettings,
    pub logging: LoggingSettings,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// Base URL of the cluster API, e.g. `https://192.168.0.1:8006`.
    pub endpoint: String,
    pub user: String,
    pub token_id: String,
    pub token_secret: String,
    pub verify_ssl: bool,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerSettings {
    pub check_interval_secs: u64,
    /// Minimum load-score spread (inclusive) that counts as an imbalance.
    pub load_threshold: f64,
    /// Projected target memory usage must stay strictly below this percentage.
    pub memory_threshold: f64,
    /// Opt-in CPU gate on the target; projected CPU is only logged when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_threshold: Option<f64>,
    pub auto_migration: bool,
    pub target_nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusApiSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub history_size: usize,
    pub retention_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://127.0.0.1:8006".to_string(),
            user: "root@pam".to_string(),
            token_id: String::new(),
            token_secret: String::new(),
            verify_ssl: false,
            request_timeout_secs: 30,
        }
    }
}

// Keep the token secret out of logs.
impl fmt::Debug for ClusterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSettings")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .field("token_id", &self.token_id)
            .field("token_secret", &"<redacted>")
            .field("verify_ssl", &self.verify_ssl)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for BalancerSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: 300,
            load_threshold: 20.0,
            memory_threshold: 95.0,
            cpu_threshold: None,
            auto_migration: false,
            target_nodes: Vec::new(),
        }
    }
}

impl Default for StatusApiSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 8787,
            history_size: 100,
            retention_hours: 24,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// Loads the layered configuration and validates it.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());

        let mut builder = Config::builder()
            .add_source(File::with_name(&format!("{}/default", config_path)).required(false))
            .add_source(File::with_name(&format!("{}/local", config_path)).required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path));
        }

        Self::from_builder(builder.add_source(environment()))
    }

    /// Parses and validates a TOML document with no other sources.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        Self::from_builder(Config::builder().add_source(File::from_str(source, FileFormat::Toml)))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cluster.validate()?;
        self.balancer.validate()?;
        if self.status_api.enabled && self.status_api.history_size == 0 {
            return Err(ConfigError::invalid(
                "status_api.history_size",
                "must be at least 1 when the status API is enabled",
            ));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn environment() -> Environment {
    Environment::with_prefix("DRS")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("balancer.target_nodes")
        .try_parsing(true)
}

impl ClusterSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::invalid("cluster.endpoint", "must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "cluster.request_timeout_secs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl BalancerSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.target_nodes.is_empty() {
            return Err(ConfigError::invalid(
                "balancer.target_nodes",
                "at least one target node is required",
            ));
        }

        let mut seen = HashSet::new();
        for node in &self.target_nodes {
            if node.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "balancer.target_nodes",
                    "node names must not be blank",
                ));
            }
            if !seen.insert(node.as_str()) {
                return Err(ConfigError::invalid(
                    "balancer.target_nodes",
                    format!("node {} is listed more than once", node),
                ));
            }
        }

        if self.check_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "balancer.check_interval_secs",
                "must be greater than zero",
            ));
        }
        if !self.load_threshold.is_finite() || self.load_threshold < 0.0 {
            return Err(ConfigError::invalid(
                "balancer.load_threshold",
                format!("{} is not a non-negative number", self.load_threshold),
            ));
        }
        if !is_percentage(self.memory_threshold) {
            return Err(ConfigError::invalid(
                "balancer.memory_threshold",
                format!("{} is outside (0, 100]", self.memory_threshold),
            ));
        }
        if let Some(cpu) = self.cpu_threshold {
            if !is_percentage(cpu) {
                return Err(ConfigError::invalid(
                    "balancer.cpu_threshold",
                    format!("{} is outside (0, 100]", cpu),
                ));
            }
        }
        Ok(())
    }

    pub fn is_target(&self, node: &str) -> bool {
        self.target_nodes.iter().any(|t| t == node)
    }
}

fn is_percentage(value: f64) -> bool {
    value.is_finite() && value > 0.0 && value <= 100.0
}

/// Template written by `vm-drs init`.
pub fn generate_default_config() -> Settings {
    Settings {
        cluster: ClusterSettings {
            endpoint: "https://192.168.0.1:8006".to_string(),
            token_id: "pve-token".to_string(),
            ..ClusterSettings::default()
        },
        balancer: BalancerSettings {
            target_nodes: vec!["pve1".to_string(), "pve2".to_string(), "pve3".to_string()],
            ..BalancerSettings::default()
        },
        status_api: StatusApiSettings::default(),
        logging: LoggingSettings::default(),
    }
}
