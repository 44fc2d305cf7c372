use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "parley.toml",
    "config/parley.toml",
    "crates/config/parley.toml",
    "../parley.toml",
    "../config/parley.toml",
    "../crates/config/parley.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 4001,
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://parley.db".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_session_ttl")]
    pub session_ttl_seconds: u64,
    #[serde(default = "AuthConfig::default_min_password_length")]
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: Self::default_session_ttl(),
            min_password_length: Self::default_min_password_length(),
        }
    }
}

impl AuthConfig {
    fn default_session_ttl() -> u64 {
        86_400
    }

    const fn default_min_password_length() -> usize {
        6
    }
}

/// Tuning for the realtime relay.
///
/// ```
/// use parley_config::RelayConfig;
///
/// let relay = RelayConfig::default();
/// assert_eq!(relay.outbound_buffer, 100);
/// assert_eq!(relay.identify_timeout_seconds, 60);
/// assert!(relay.require_token);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Capacity of each connection's outbound queue. Events that do not fit are dropped.
    #[serde(default = "RelayConfig::default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Seconds an unidentified connection may stay open. Zero disables the deadline.
    #[serde(default = "RelayConfig::default_identify_timeout")]
    pub identify_timeout_seconds: u64,
    #[serde(default = "RelayConfig::default_ping_interval")]
    pub ping_interval_seconds: u64,
    #[serde(default = "RelayConfig::default_require_token")]
    pub require_token: bool,
}

impl RelayConfig {
    const fn default_outbound_buffer() -> usize {
        100
    }

    const fn default_identify_timeout() -> u64 {
        60
    }

    const fn default_ping_interval() -> u64 {
        25
    }

    const fn default_require_token() -> bool {
        true
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: Self::default_outbound_buffer(),
            identify_timeout_seconds: Self::default_identify_timeout(),
            ping_interval_seconds: Self::default_ping_interval(),
            require_token: Self::default_require_token(),
        }
    }
}

fn clamp_u64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use parley_config::load;
///
/// std::env::remove_var("PARLEY_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("http.allowed_origins", Vec::<String>::new())?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default(
            "auth.session_ttl_seconds",
            clamp_u64(defaults.auth.session_ttl_seconds),
        )?
        .set_default(
            "auth.min_password_length",
            clamp_u64(defaults.auth.min_password_length as u64),
        )?
        .set_default(
            "relay.outbound_buffer",
            clamp_u64(defaults.relay.outbound_buffer as u64),
        )?
        .set_default(
            "relay.identify_timeout_seconds",
            clamp_u64(defaults.relay.identify_timeout_seconds),
        )?
        .set_default(
            "relay.ping_interval_seconds",
            clamp_u64(defaults.relay.ping_interval_seconds),
        )?
        .set_default("relay.require_token", defaults.relay.require_token)?;

    let mut builder = builder;
    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("PARLEY_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via PARLEY_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PARLEY")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("http.allowed_origins")
            .try_parsing(true),
    );

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.auth.session_ttl_seconds > i64::MAX as u64 {
        config.auth.session_ttl_seconds = i64::MAX as u64;
    }

    if config.relay.outbound_buffer == 0 {
        anyhow::bail!("relay.outbound_buffer must be greater than zero");
    }

    debug!(?config, "loaded backend configuration");
    Ok(config)
}
