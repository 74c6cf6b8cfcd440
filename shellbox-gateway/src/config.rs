//! Gateway configuration read from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use shellbox_executor::{docker::DEFAULT_SOCKET, EnvironmentConfig, DEFAULT_IMAGE};

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";

/// Default number of sessions that may hold an environment at once.
pub const DEFAULT_MAX_ENVIRONMENTS: usize = 32;

/// Default per-command deadline in seconds.
pub const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 60;

/// Default directory for static assets.
pub const DEFAULT_STATIC_DIR: &str = "public";

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings for the gateway process.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    pub docker_socket: PathBuf,
    pub image: String,
    pub exec_timeout: Duration,
    pub max_environments: usize,
    pub static_dir: PathBuf,
}

impl GatewayConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if any variable is set to a value
    /// that cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which returns a variable's value
    /// if it is set.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if any variable is set to a value
    /// that cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = parse_var(
            "SHELLBOX_LISTEN_ADDR",
            lookup("SHELLBOX_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned()),
        )?;

        let docker_socket = lookup("SHELLBOX_DOCKER_SOCKET")
            .map(PathBuf::from)
            .or_else(|| lookup("DOCKER_HOST").and_then(|h| unix_socket_path(&h)))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET));

        let image = lookup("SHELLBOX_IMAGE")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE.to_owned());

        let timeout_secs: u64 = match lookup("SHELLBOX_EXEC_TIMEOUT_SECS") {
            Some(raw) => positive("SHELLBOX_EXEC_TIMEOUT_SECS", raw)?,
            None => DEFAULT_EXEC_TIMEOUT_SECS,
        };

        let max_environments: usize = match lookup("SHELLBOX_MAX_ENVIRONMENTS") {
            Some(raw) => positive("SHELLBOX_MAX_ENVIRONMENTS", raw)?,
            None => DEFAULT_MAX_ENVIRONMENTS,
        };

        let static_dir = lookup("SHELLBOX_STATIC_DIR")
            .map_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR), PathBuf::from);

        Ok(Self {
            listen_addr,
            docker_socket,
            image,
            exec_timeout: Duration::from_secs(timeout_secs),
            max_environments,
            static_dir,
        })
    }

    /// Provisioning settings for the lifecycle manager and exec channel.
    #[must_use]
    pub fn environment_config(&self) -> EnvironmentConfig {
        EnvironmentConfig::new(self.image.clone())
    }
}

/// Extract the socket path from a `unix://` `DOCKER_HOST` value.
fn unix_socket_path(host: &str) -> Option<PathBuf> {
    host.strip_prefix("unix://")
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

fn parse_var<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
        value,
    })
}

fn positive<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let parsed: T = parse_var(var, value.clone())?;
    if parsed == T::default() {
        return Err(ConfigError::Invalid {
            var,
            value,
            reason: "must be greater than zero".to_owned(),
        });
    }
    Ok(parsed)
}
