//! Process configuration, read from the environment.

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PING_INTERVAL_SECS: u64 = 30;
const DEFAULT_PONG_TIMEOUT_SECS: u64 = 10;

const PORT_VAR: &str = "PORT";
const HOST_VAR: &str = "DUET_HOST";
const PING_INTERVAL_VAR: &str = "DUET_PING_INTERVAL_SECS";
const PONG_TIMEOUT_VAR: &str = "DUET_PONG_TIMEOUT_SECS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            pong_timeout: Duration::from_secs(DEFAULT_PONG_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = parse_var(&lookup, PORT_VAR)?.unwrap_or(DEFAULT_PORT);
        let host = parse_var::<IpAddr>(&lookup, HOST_VAR)?.unwrap_or(defaults.listen_addr.ip());

        let ping_interval = parse_secs(&lookup, PING_INTERVAL_VAR)?.unwrap_or(defaults.ping_interval);
        let pong_timeout = parse_secs(&lookup, PONG_TIMEOUT_VAR)?.unwrap_or(defaults.pong_timeout);

        Ok(Self {
            listen_addr: SocketAddr::new(host, port),
            ping_interval,
            pong_timeout,
        })
    }

    /// Same as the defaults but bound to an ephemeral loopback port.
    pub fn loopback() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            ..Self::default()
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    match parse_var::<u64>(lookup, name)? {
        Some(0) => Err(ConfigError::Zero(name)),
        secs => Ok(secs.map(Duration::from_secs)),
    }
}
