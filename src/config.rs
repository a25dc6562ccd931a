use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CACHE_DEPTH;

/// Parley chat relay server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "parley-server", version, about = "Parley chat relay server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PARLEY_PORT", default_value = "1998")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "PARLEY_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./parley.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "PARLEY_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, stored media)
    #[arg(long, env = "PARLEY_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Ephemeral cache configuration (loaded from [cache] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

/// Configuration for the ephemeral recent-message cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entries retained per group before the oldest is evicted
    #[serde(default = "default_cache_depth")]
    pub depth: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_CACHE_DEPTH,
        }
    }
}

fn default_cache_depth() -> usize {
    DEFAULT_CACHE_DEPTH
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 1998,
            bind_address: "0.0.0.0".to_string(),
            config: "./parley.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            cache: None,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PARLEY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("PARLEY_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }

    /// Effective cache depth, falling back to the built-in default.
    pub fn cache_depth(&self) -> usize {
        self.cache
            .as_ref()
            .map(|c| c.depth)
            .unwrap_or(DEFAULT_CACHE_DEPTH)
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Parley Chat Relay Server Configuration
# Place this file at ./parley.toml or specify with --config <path>
# All settings can be overridden via environment variables (PARLEY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 1998)
# port = 1998

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database and stored media
# data_dir = "./data"

# ---- Ephemeral Cache ----
# [cache]

# Recent messages retained per conversation group (default: 100)
# Loss on restart is expected; the durable store is unaffected.
# depth = 100
"#
    .to_string()
}
