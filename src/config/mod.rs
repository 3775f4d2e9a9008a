//! Bus configuration.
//!
//! Loaded once at startup from a TOML file (every key optional), then
//! overridden from `EZMB_*` environment variables, then validated. The
//! resulting [`Config`] is immutable and handed to the bridge explicitly.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};
use thiserror::Error;

use crate::core::command::{DecodeLimits, DEFAULT_CONTROL_MARKER};
use crate::core::queue::OverflowPolicy;
use crate::core::side::Topology;

pub const DEFAULT_NORTH_ADDR: &str = "ipc:///tmp/ezmb_north.ipc";
pub const DEFAULT_SOUTH_ADDR: &str = "ipc:///tmp/ezmb_south.ipc";

/// Room in a frame for segment headers and the control verb.
const FRAME_HEADER_SLACK: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BusConfig {
    pub north_addr: String,
    pub south_addr: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            north_addr: DEFAULT_NORTH_ADDR.to_string(),
            south_addr: DEFAULT_SOUTH_ADDR.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct QueueConfig {
    /// Per-connection outbound queue capacity (the high-water mark).
    pub capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            overflow_policy: OverflowPolicy::DropNewest,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_payload_bytes: usize,
    pub max_topic_bytes: usize,
    /// 0 disables the idle timeout.
    pub idle_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1024 * 1024,
            max_topic_bytes: 4096,
            idle_timeout_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ProtocolConfig {
    pub control_marker: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            control_marker: DEFAULT_CONTROL_MARKER.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RoutingConfig {
    pub topology: Topology,
    pub trace_messages: bool,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsConfig {
    /// 0 disables the periodic metrics log line.
    pub report_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub bus: BusConfig,
    pub queues: QueueConfig,
    pub limits: LimitsConfig,
    pub protocol: ProtocolConfig,
    pub routing: RoutingConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Parses TOML text without environment overrides.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads from `path` (or `EZMB_CONFIG`), applies environment overrides
    /// and validates. With neither a path nor `EZMB_CONFIG`, starts from
    /// defaults.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let effective_path = path
            .map(str::to_string)
            .or_else(|| env::var("EZMB_CONFIG").ok());

        let mut cfg = match effective_path {
            Some(p) => toml::from_str(&fs::read_to_string(p)?)?,
            None => Config::default(),
        };
        cfg.apply_overrides(|key| env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Applies `EZMB_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EZMB_NORTH_ADDR") {
            self.bus.north_addr = v;
        }
        if let Some(v) = lookup("EZMB_SOUTH_ADDR") {
            self.bus.south_addr = v;
        }
        if let Some(v) = lookup("EZMB_QUEUE_CAPACITY") {
            self.queues.capacity = parse_var("EZMB_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("EZMB_OVERFLOW_POLICY") {
            self.queues.overflow_policy = v
                .parse()
                .map_err(|e| ConfigError::Parse(format!("EZMB_OVERFLOW_POLICY: {e}")))?;
        }
        if let Some(v) = lookup("EZMB_MAX_PAYLOAD_BYTES") {
            self.limits.max_payload_bytes = parse_var("EZMB_MAX_PAYLOAD_BYTES", &v)?;
        }
        if let Some(v) = lookup("EZMB_IDLE_TIMEOUT_MS") {
            self.limits.idle_timeout_ms = parse_var("EZMB_IDLE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("EZMB_TOPOLOGY") {
            self.routing.topology = v
                .parse()
                .map_err(|e| ConfigError::Parse(format!("EZMB_TOPOLOGY: {e}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queues.capacity == 0 {
            return Err(ConfigError::Invalid("queues.capacity must be > 0".into()));
        }
        if self.limits.max_payload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_payload_bytes must be > 0".into(),
            ));
        }
        if self.limits.max_topic_bytes == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_topic_bytes must be > 0".into(),
            ));
        }
        if self.protocol.control_marker.is_empty() {
            return Err(ConfigError::Invalid(
                "protocol.control_marker must not be empty".into(),
            ));
        }
        let north = Endpoint::parse(&self.bus.north_addr)?;
        let south = Endpoint::parse(&self.bus.south_addr)?;
        if north == south && !north.is_ephemeral() {
            return Err(ConfigError::Invalid(format!(
                "north and south endpoints are both {north}"
            )));
        }
        Ok(())
    }

    pub fn north_endpoint(&self) -> Result<Endpoint, ConfigError> {
        Endpoint::parse(&self.bus.north_addr)
    }

    pub fn south_endpoint(&self) -> Result<Endpoint, ConfigError> {
        Endpoint::parse(&self.bus.south_addr)
    }

    /// Largest frame body a client may declare.
    pub fn max_frame_len(&self) -> usize {
        self.limits
            .max_payload_bytes
            .saturating_add(self.limits.max_topic_bytes)
            .saturating_add(self.protocol.control_marker.len())
            .saturating_add(FRAME_HEADER_SLACK)
    }

    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_topic: self.limits.max_topic_bytes,
            max_payload: self.limits.max_payload_bytes,
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.limits.idle_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn report_interval(&self) -> Option<Duration> {
        match self.metrics.report_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::Parse(format!("{name}: {e}")))
}

/// Loads a config file, applying environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref().to_string_lossy().into_owned();
    Config::load(Some(&path))
}

/// A rendezvous address: `tcp://host:port` (or bare `host:port`) or
/// `ipc:///path/to/socket`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(String),
    Ipc(PathBuf),
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if let Some(path) = raw.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(ConfigError::Invalid(format!("endpoint '{raw}' has no path")));
            }
            return Ok(Endpoint::Ipc(PathBuf::from(path)));
        }
        let addr = raw.strip_prefix("tcp://").unwrap_or(raw);
        match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Endpoint::Tcp(addr.to_string()))
            }
            _ => Err(ConfigError::Invalid(format!(
                "endpoint '{raw}' is neither ipc://<path> nor [tcp://]<host>:<port>"
            ))),
        }
    }
}

impl Endpoint {
    /// A TCP endpoint on port 0; the OS picks a distinct port per bind.
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Endpoint::Tcp(addr) if addr.ends_with(":0"))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            Endpoint::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}
