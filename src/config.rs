use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

use crate::bridge::{BridgeConfig, DEFAULT_REPLY_TIMEOUT};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub path: String,
    pub reply_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BRIDGE_BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("BRIDGE_PATH must start with '/'")]
    InvalidPath,
    #[error("BRIDGE_REPLY_TIMEOUT_MS must be a positive integer")]
    InvalidReplyTimeout,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let bind_addr = read("BRIDGE_BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_port = read("BRIDGE_BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);
        let path = read("BRIDGE_PATH").unwrap_or_else(|| "/mcp".to_string());
        if !path.starts_with('/') {
            return Err(ConfigError::InvalidPath);
        }
        let reply_timeout = read("BRIDGE_REPLY_TIMEOUT_MS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .ok()
                    .filter(|millis| *millis > 0)
                    .map(Duration::from_millis)
                    .ok_or(ConfigError::InvalidReplyTimeout)
            })
            .transpose()?
            .unwrap_or(DEFAULT_REPLY_TIMEOUT);

        let config = Self {
            bind_addr,
            bind_port,
            path,
            reply_timeout,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            reply_timeout: self.reply_timeout,
        }
    }
}
