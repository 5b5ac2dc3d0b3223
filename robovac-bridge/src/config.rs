//! Configuration for the bridge.
//!
//! Everything comes from environment variables: `ROBOT_IP` and
//! `ROBOT_TOKEN` identify and authenticate the vacuum, `PORT` selects
//! the HTTP listen port. The binary loads a `.env` file before this
//! module reads anything.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::miio::Token;

/// HTTP port used when `PORT` is not set.
pub const DEFAULT_PORT: u16 = 8000;

/// Main configuration structure for the bridge.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// The vacuum to bridge to
    pub robot: RobotConfig,

    /// HTTP server configuration
    pub api: ApiConfig,
}

/// Target device configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RobotConfig {
    /// Network address of the vacuum (hostname or IP)
    pub address: String,

    /// Device secret token
    pub token: Token,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Listen port
    pub port: u16,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    // Seam for tests: resolve variables through a lookup function instead
    // of mutating process-wide environment state.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let address = lookup("ROBOT_IP")
            .ok_or_else(|| Error::Config("ROBOT_IP is not set".into()))?;
        let token: Token = lookup("ROBOT_TOKEN")
            .ok_or_else(|| Error::Config("ROBOT_TOKEN is not set".into()))?
            .parse()?;
        let port = match lookup("PORT") {
            Some(raw) => raw.parse().map_err(|_| {
                Error::Config(format!("PORT is not a valid port number: {raw}"))
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            robot: RobotConfig { address, token },
            api: ApiConfig { port },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TOKEN: &str = "ffffffffffffffffffffffffffffffff";

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars = vars(pairs);
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn loads_full_configuration() {
        let config = load(&[
            ("ROBOT_IP", "192.168.1.42"),
            ("ROBOT_TOKEN", TOKEN),
            ("PORT", "9090"),
        ])
        .unwrap();

        assert_eq!(config.robot.address, "192.168.1.42");
        assert_eq!(config.robot.token.to_hex(), TOKEN);
        assert_eq!(config.api.port, 9090);
    }

    #[test]
    fn port_defaults_to_8000() {
        let config =
            load(&[("ROBOT_IP", "10.0.0.1"), ("ROBOT_TOKEN", TOKEN)]).unwrap();
        assert_eq!(config.api.port, DEFAULT_PORT);
    }

    #[test]
    fn missing_address_is_rejected() {
        let err = load(&[("ROBOT_TOKEN", TOKEN)]).unwrap_err();
        assert!(err.to_string().contains("ROBOT_IP"));
    }

    #[test]
    fn missing_token_is_rejected() {
        let err = load(&[("ROBOT_IP", "10.0.0.1")]).unwrap_err();
        assert!(err.to_string().contains("ROBOT_TOKEN"));
    }

    #[test]
    fn garbage_port_is_rejected() {
        let err = load(&[
            ("ROBOT_IP", "10.0.0.1"),
            ("ROBOT_TOKEN", TOKEN),
            ("PORT", "not-a-port"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
