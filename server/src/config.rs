use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tether connection tracker
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "tether-server", version, about = "Fingerprint-keyed connection tracker")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "TETHER_PORT", default_value = "5000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "TETHER_BIND_ADDRESS", default_value = "localhost")]
    pub bind_address: String,

    /// Log verbosity: trace, debug, info, warn or error (RUST_LOG takes precedence)
    #[arg(long, env = "TETHER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./tether.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "TETHER_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Seconds a connection may stay idle before the sweeper drops it
    #[arg(long, env = "TETHER_SESSION_TIMEOUT", default_value = "30")]
    pub session_timeout: u64,

    /// Seconds between expiry sweeps
    #[arg(long, env = "TETHER_SWEEP_INTERVAL_SECS", default_value = "120")]
    pub sweep_interval_secs: u64,

    /// Path of the JSON user cache file
    #[arg(long, env = "TETHER_USER_CACHE", default_value = "users.json")]
    pub user_cache: String,

    /// Deadline in seconds for a single user cache file operation
    #[arg(long, env = "TETHER_CACHE_IO_TIMEOUT_SECS", default_value = "5")]
    pub cache_io_timeout_secs: u64,

    /// Load the user cache into memory at startup when the file exists
    #[arg(long, env = "TETHER_PRELOAD_USER_CACHE", default_value_t = true, action = clap::ArgAction::Set)]
    pub preload_user_cache: bool,

    /// Reserved; accepted but not used by any behavior
    #[arg(long, env = "TETHER_USER_MANAGEMENT", default_value_t = true, action = clap::ArgAction::Set)]
    pub user_management: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            bind_address: "localhost".to_string(),
            log_level: "info".to_string(),
            config: "./tether.toml".to_string(),
            json_logs: false,
            generate_config: false,
            session_timeout: 30,
            sweep_interval_secs: 120,
            user_cache: "users.json".to_string(),
            cache_io_timeout_secs: 5,
            preload_user_cache: true,
            user_management: true,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (TETHER_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let matches = Config::command().get_matches();
        let cli = Config::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
        let config_path = cli.config.clone();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("TETHER_"))
            .merge(Serialized::defaults(explicit_args(&cli, &matches)))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall the sweeper or make the server unusable.
    pub fn validate(&self) -> Result<(), figment::Error> {
        if self.port == 0 {
            return Err(figment::Error::from("port cannot be 0".to_string()));
        }
        if self.session_timeout == 0 {
            return Err(figment::Error::from(
                "session_timeout must be greater than 0".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(figment::Error::from(
                "sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.cache_io_timeout_secs == 0 {
            return Err(figment::Error::from(
                "cache_io_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.user_cache.trim().is_empty() {
            return Err(figment::Error::from("user_cache cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn cache_io_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_io_timeout_secs)
    }

    /// Default tracing filter derived from `log_level`.
    pub fn log_filter(&self) -> String {
        format!(
            "tether_server={level},tower_http={level}",
            level = self.log_level
        )
    }
}

/// Only the values the user actually passed, so clap's own defaults don't
/// mask the TOML layer.
fn explicit_args(cli: &Config, matches: &ArgMatches) -> serde_json::Map<String, serde_json::Value> {
    let Ok(serde_json::Value::Object(all)) = serde_json::to_value(cli) else {
        return serde_json::Map::new();
    };
    all.into_iter()
        .filter(|(key, _)| {
            matches!(
                matches.value_source(key),
                Some(ValueSource::CommandLine | ValueSource::EnvVariable)
            )
        })
        .collect()
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Tether Server Configuration
# Place this file at ./tether.toml or specify with --config <path>
# All settings can be overridden via environment variables (TETHER_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 5000)
# port = 5000

# Bind address (default: localhost)
# bind_address = "localhost"

# Log verbosity: trace, debug, info, warn, error (default: info)
# RUST_LOG overrides this when set
# log_level = "info"

# Enable structured JSON logging for Docker/production
# json_logs = false

# ---- Connections ----

# Seconds a connection may stay idle before it is dropped (default: 30)
# session_timeout = 30

# Seconds between expiry sweeps (default: 120)
# sweep_interval_secs = 120

# ---- Users ----

# JSON file mirroring user records (default: users.json)
# user_cache = "users.json"

# Deadline in seconds for each user cache file operation (default: 5)
# cache_io_timeout_secs = 5

# Load the user cache into memory at startup if the file exists (default: true)
# preload_user_cache = true

# Reserved flag, currently has no effect (default: true)
# user_management = true
"#
    .to_string()
}
