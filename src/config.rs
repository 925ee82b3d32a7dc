//! Process configuration.
//!
//! Read once at startup and handed to the components that need it; nothing
//! reads the environment after that.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `APP_API_KEY` | unset | enables the [`ApiKey`](crate::middleware::ApiKey) stage |
//! | `APP_REQUEST_TIMEOUT_MS` | `25000` | [`TimeoutGuard`](crate::middleware::TimeoutGuard) budget |
//! | `APP_EXPOSE_PANIC_MESSAGES` | `false` | send raw panic messages to clients |
//! | `APP_ROLE_CLAIM` | `custom:role` | claim read into the role field |
//! | `APP_LOG_FORMAT` | `json` | `json` or `pretty` |
//! | `APP_LOCAL_ADDR` | `127.0.0.1:3000` | bind address of the local server |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::middleware::DEFAULT_ROLE_CLAIM;

/// Output format of the log subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line; what the function host's log sink expects.
    #[default]
    Json,
    /// Human-readable, for local runs.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(Error::Config(format!("unknown log format {other:?}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub expose_panic_messages: bool,
    pub role_claim: String,
    pub log_format: LogFormat,
    pub local_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            request_timeout: Duration::from_millis(25_000),
            expose_panic_messages: false,
            role_claim: DEFAULT_ROLE_CLAIM.to_owned(),
            log_format: LogFormat::Json,
            local_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

impl Config {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(key) = lookup("APP_API_KEY").filter(|k| !k.is_empty()) {
            config.api_key = Some(key);
        }
        if let Some(ms) = lookup("APP_REQUEST_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(parse("APP_REQUEST_TIMEOUT_MS", &ms)?);
        }
        if let Some(flag) = lookup("APP_EXPOSE_PANIC_MESSAGES") {
            config.expose_panic_messages = parse_bool("APP_EXPOSE_PANIC_MESSAGES", &flag)?;
        }
        if let Some(claim) = lookup("APP_ROLE_CLAIM").filter(|c| !c.is_empty()) {
            config.role_claim = claim;
        }
        if let Some(format) = lookup("APP_LOG_FORMAT") {
            config.log_format = format.parse()?;
        }
        if let Some(addr) = lookup("APP_LOCAL_ADDR") {
            config.local_addr = parse("APP_LOCAL_ADDR", &addr)?;
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| Error::Config(format!("{key}={value:?}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::Config(format!("{key}={value:?}: expected a boolean"))),
    }
}
