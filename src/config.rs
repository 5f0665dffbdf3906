//! Server configuration module
//!
//! Handles loading and parsing of server configuration from files and environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server name used in logs
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Lobby port (WebSocket)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Inactivity window in seconds; players idle longer than this are
    /// reported by the idle query (no automatic disconnect)
    #[serde(default = "default_idle_window")]
    pub idle_window_secs: u64,

    /// Outbound queue depth per connection
    #[serde(default = "default_send_queue")]
    pub send_queue: usize,

    /// TLS configuration (plain TCP when absent)
    #[serde(default)]
    pub tls: Option<TlsConfig>,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

/// TLS configuration; the certificate material itself is opaque to the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to the PEM certificate chain
    pub cert_file: PathBuf,

    /// Path to the PEM private key
    pub key_file: PathBuf,
}

// Default value functions
fn default_server_name() -> String {
    "Tavern".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    43758
}

fn default_idle_window() -> u64 {
    300 // 5 minutes
}

fn default_send_queue() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/server.toml"),
            server_name: default_server_name(),
            host: default_host(),
            port: default_port(),
            idle_window_secs: default_idle_window(),
            send_queue: default_send_queue(),
            tls: None,
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        // Determine config path from environment or use default
        let config_path = env::var("TAVERN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/server.toml"));

        // Try to load from file
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;

        // Override with environment variables
        config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("TAVERN_SERVER_NAME") {
            self.server_name = val;
        }
        if let Ok(val) = env::var("TAVERN_HOST") {
            self.host = val;
        }
        if let Ok(val) = env::var("TAVERN_PORT") {
            if let Ok(port) = val.parse() {
                self.port = port;
            }
        }
        if let Ok(val) = env::var("TAVERN_IDLE_WINDOW_SECS") {
            if let Ok(secs) = val.parse() {
                self.idle_window_secs = secs;
            }
        }
        if let Ok(val) = env::var("TAVERN_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }

        // TLS material from the environment overrides the file entirely
        if let (Ok(cert), Ok(key)) = (env::var("TAVERN_TLS_CERT"), env::var("TAVERN_TLS_KEY")) {
            self.tls = Some(TlsConfig {
                cert_file: PathBuf::from(cert),
                key_file: PathBuf::from(key),
            });
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port must be non-zero");
        }

        if self.send_queue == 0 {
            anyhow::bail!("Send queue depth must be at least 1");
        }

        if let Some(tls) = &self.tls {
            if !tls.cert_file.exists() {
                anyhow::bail!(
                    "TLS certificate not found: {}",
                    tls.cert_file.display()
                );
            }
            if !tls.key_file.exists() {
                anyhow::bail!("TLS key not found: {}", tls.key_file.display());
            }
        }

        Ok(())
    }

    /// Bind address string (`host:port`)
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Inactivity window as a `Duration`
    pub fn idle_window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.idle_window_secs)
    }
}
