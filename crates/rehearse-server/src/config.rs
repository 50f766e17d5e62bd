//! Service configuration: a TOML file layered under `REHEARSE_*` variables.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 4010
//!
//! [logging]
//! level = "rehearse_server=debug,info"
//! json = true
//! ```

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    /// Unset means the binary's own port.
    pub port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    pub fn bind_addr(&self, default_port: u16) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port.unwrap_or(default_port))
    }

    /// Parses `path`. A file that does not exist yields the defaults.
    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Reads the config at `path`, if any, then applies the process
/// environment on top.
///
/// | Variable | Field |
/// |---|---|
/// | `REHEARSE_HOST` | `server.host` |
/// | `REHEARSE_PORT`, else `PORT` | `server.port` |
/// | `REHEARSE_LOG_LEVEL` | `logging.level` |
/// | `REHEARSE_LOG_JSON` (`true` or `1`) | `logging.json` |
///
/// Values that do not parse are ignored.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => Config::from_file(Path::new(path))?,
        None => Config::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies the variables above, read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = parsed(&lookup, "REHEARSE_HOST") {
        config.server.host = host;
    }
    if let Some(port) = parsed(&lookup, "REHEARSE_PORT").or_else(|| parsed(&lookup, "PORT")) {
        config.server.port = Some(port);
    }
    if let Some(level) = lookup("REHEARSE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("REHEARSE_LOG_JSON") {
        config.logging.json = matches!(json.as_str(), "true" | "1");
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.parse().ok())
}
