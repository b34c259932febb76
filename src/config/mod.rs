//! Configuration module for the linkgraph backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::concepts::TagDeletePolicy;

const DEFAULT_DB_PATH: &str = "./data/app.sqlite";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_SESSION_COOKIE: &str = "linkgraph_sid";

/// A configuration variable that is set but unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Name of the cookie carrying the session id
    pub session_cookie: String,
    /// Whether deleting an absent tag is an error
    pub tag_delete_policy: TagDeletePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.into(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            tag_delete_policy: TagDeletePolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = lookup("LINKGRAPH_DB_PATH")
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
            .into();

        let bind_addr = parse_var(
            "LINKGRAPH_BIND_ADDR",
            lookup("LINKGRAPH_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        )?;

        let log_level =
            lookup("LINKGRAPH_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let session_cookie = lookup("LINKGRAPH_SESSION_COOKIE")
            .unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string());
        if !is_cookie_name(&session_cookie) {
            return Err(ConfigError::Invalid {
                var: "LINKGRAPH_SESSION_COOKIE",
                value: session_cookie,
                reason: "cookie names are ASCII letters, digits, '-' and '_'".to_string(),
            });
        }

        let tag_delete_policy = match lookup("LINKGRAPH_TAG_DELETE_POLICY") {
            Some(value) => parse_var("LINKGRAPH_TAG_DELETE_POLICY", value)?,
            None => TagDeletePolicy::default(),
        };

        Ok(Self {
            db_path,
            bind_addr,
            log_level,
            session_cookie,
            tag_delete_policy,
        })
    }
}

fn parse_var<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
        value,
    })
}

fn is_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
