//! Daemon configuration from environment variables
//!
//! Optional settings carry defaults; required settings and malformed
//! values fail startup loudly. Nothing in the steady-state pipeline
//! reads the environment after this.

use crate::pipeline::flush::DigestRouting;
use crate::pipeline::types::{IdentityField, IdentitySpec};
use std::env;
use std::net::SocketAddr;

#[derive(Debug)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    Missing(&'static str),
    /// A variable is set but its value does not parse.
    Invalid(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(name) => write!(f, "missing required setting {}", name),
            ConfigError::Invalid(name, value) => {
                write!(f, "invalid value for {}: {:?}", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Everything the daemon needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// UDP address to receive error reports on.
    pub bind: SocketAddr,
    /// Seconds between digest flushes.
    pub flush_seconds: u64,
    /// Rate window capacity, in flush intervals.
    pub pager_window_size: usize,
    /// Rate window limit; the window sum must exceed this to page.
    pub pager_limit: u64,
    /// Substrings marking intentional health-check errors.
    pub monitoring_markers: Vec<String>,
    /// Fields that make up the dedup identity of an event.
    pub identity_fields: IdentitySpec,
    /// Wire field carrying the originating host.
    pub source_field: String,
    /// Name this daemon reports itself as in subjects and bodies.
    pub server_name: String,
    /// Listener-to-aggregator queue bound.
    pub channel_buffer: usize,
    /// Bounded wait before the listener drops on backpressure.
    pub send_timeout_ms: u64,
    /// Receive buffer size for one datagram.
    pub max_datagram: usize,
    /// Drop all-monitoring digests when no monitoring recipient exists.
    pub suppress_monitoring_digest: bool,

    pub report_to: String,
    pub report_from: String,
    pub reply_to: Option<String>,
    pub monitoring_report_to: Option<String>,
    pub pager_to: String,
    pub pager_from: String,
    pub pager_reply_to: Option<String>,

    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `ERRFLOW_BIND` (default: 0.0.0.0:1549)
    /// - `ERRFLOW_FLUSH_SECONDS` (default: 60)
    /// - `ERRFLOW_PAGER_WINDOW_SIZE` (default: 5)
    /// - `ERRFLOW_PAGER_LIMIT` (default: 100)
    /// - `ERRFLOW_MONITORING_MARKERS` (comma separated, default: none)
    /// - `ERRFLOW_IDENTITY_FIELDS` (comma separated, default: all fields)
    /// - `ERRFLOW_SOURCE_FIELD` (default: source)
    /// - `ERRFLOW_SERVER_NAME` (default: $HOSTNAME, then "errflow")
    /// - `ERRFLOW_CHANNEL_BUFFER` (default: 10000)
    /// - `ERRFLOW_SEND_TIMEOUT_MS` (default: 100)
    /// - `ERRFLOW_MAX_DATAGRAM` (default: 65536)
    /// - `ERRFLOW_SUPPRESS_MONITORING_DIGEST` (default: true)
    /// - `ERRFLOW_REPORT_TO` / `ERRFLOW_REPORT_FROM` (required)
    /// - `ERRFLOW_REPLY_TO` / `ERRFLOW_MONITORING_REPORT_TO` (optional)
    /// - `ERRFLOW_PAGER_TO` (required)
    /// - `ERRFLOW_PAGER_FROM` (default: ERRFLOW_REPORT_FROM)
    /// - `ERRFLOW_PAGER_REPLY_TO` (optional)
    /// - `ERRFLOW_SMTP_HOST` (required), `ERRFLOW_SMTP_PORT` (default: 465)
    /// - `ERRFLOW_SMTP_USER` / `ERRFLOW_SMTP_PASSWORD` (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        let report_from = required("ERRFLOW_REPORT_FROM")?;
        let pager_from = optional("ERRFLOW_PAGER_FROM").unwrap_or_else(|| report_from.clone());

        Ok(Self {
            bind: parsed("ERRFLOW_BIND", "0.0.0.0:1549".parse().unwrap())?,
            flush_seconds: positive("ERRFLOW_FLUSH_SECONDS", 60)?,
            pager_window_size: positive("ERRFLOW_PAGER_WINDOW_SIZE", 5)? as usize,
            pager_limit: parsed("ERRFLOW_PAGER_LIMIT", 100)?,
            monitoring_markers: list("ERRFLOW_MONITORING_MARKERS"),
            identity_fields: identity_fields()?,
            source_field: optional("ERRFLOW_SOURCE_FIELD").unwrap_or_else(|| "source".to_string()),
            server_name: optional("ERRFLOW_SERVER_NAME")
                .or_else(|| optional("HOSTNAME"))
                .unwrap_or_else(|| "errflow".to_string()),
            channel_buffer: positive("ERRFLOW_CHANNEL_BUFFER", 10_000)? as usize,
            send_timeout_ms: parsed("ERRFLOW_SEND_TIMEOUT_MS", 100)?,
            max_datagram: positive("ERRFLOW_MAX_DATAGRAM", 65_536)? as usize,
            suppress_monitoring_digest: parsed("ERRFLOW_SUPPRESS_MONITORING_DIGEST", true)?,
            report_to: required("ERRFLOW_REPORT_TO")?,
            report_from,
            reply_to: optional("ERRFLOW_REPLY_TO"),
            monitoring_report_to: optional("ERRFLOW_MONITORING_REPORT_TO"),
            pager_to: required("ERRFLOW_PAGER_TO")?,
            pager_from,
            pager_reply_to: optional("ERRFLOW_PAGER_REPLY_TO"),
            smtp_host: required("ERRFLOW_SMTP_HOST")?,
            smtp_port: parsed("ERRFLOW_SMTP_PORT", 465)?,
            smtp_user: optional("ERRFLOW_SMTP_USER"),
            smtp_password: optional("ERRFLOW_SMTP_PASSWORD"),
        })
    }

    /// Addressing knobs handed to the flush coordinator.
    pub fn routing(&self) -> DigestRouting {
        DigestRouting {
            server_name: self.server_name.clone(),
            report_to: self.report_to.clone(),
            report_from: self.report_from.clone(),
            reply_to: self.reply_to.clone(),
            monitoring_report_to: self.monitoring_report_to.clone(),
            pager_to: self.pager_to.clone(),
            pager_from: self.pager_from.clone(),
            pager_reply_to: self.pager_reply_to.clone(),
            suppress_monitoring_digest: self.suppress_monitoring_digest,
        }
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid(name, value)),
        None => Ok(default),
    }
}

fn positive(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let value = parsed(name, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid(name, "0".to_string()));
    }
    Ok(value)
}

fn list(name: &str) -> Vec<String> {
    optional(name)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn identity_fields() -> Result<IdentitySpec, ConfigError> {
    let names = list("ERRFLOW_IDENTITY_FIELDS");
    if names.is_empty() {
        return Ok(IdentitySpec::default_all());
    }
    let mut fields = Vec::with_capacity(names.len());
    for name in names {
        match IdentityField::from_str(&name) {
            Some(field) => fields.push(field),
            None => return Err(ConfigError::Invalid("ERRFLOW_IDENTITY_FIELDS", name)),
        }
    }
    Ok(IdentitySpec::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [(&str, &str); 4] = [
        ("ERRFLOW_REPORT_TO", "team@example.com"),
        ("ERRFLOW_REPORT_FROM", "errs@example.com"),
        ("ERRFLOW_PAGER_TO", "pager@example.com"),
        ("ERRFLOW_SMTP_HOST", "smtp.example.com"),
    ];

    fn clear_all() {
        for (name, _) in REQUIRED {
            env::remove_var(name);
        }
        for name in [
            "ERRFLOW_BIND",
            "ERRFLOW_FLUSH_SECONDS",
            "ERRFLOW_PAGER_WINDOW_SIZE",
            "ERRFLOW_PAGER_LIMIT",
            "ERRFLOW_MONITORING_MARKERS",
            "ERRFLOW_IDENTITY_FIELDS",
            "ERRFLOW_SOURCE_FIELD",
            "ERRFLOW_SERVER_NAME",
            "ERRFLOW_PAGER_FROM",
            "ERRFLOW_SMTP_PORT",
        ] {
            env::remove_var(name);
        }
    }

    fn set_required() {
        for (name, value) in REQUIRED {
            env::set_var(name, value);
        }
    }

    // One sequential test: the cases share process-global environment
    // state and must not interleave.
    #[test]
    fn test_from_env() {
        // Missing required settings fail loudly.
        clear_all();
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("ERRFLOW_REPORT_TO"))
        ));

        // Defaults.
        set_required();
        env::set_var("ERRFLOW_SERVER_NAME", "prod-errs");
        let config = Config::from_env().unwrap();
        assert_eq!(config.bind, "0.0.0.0:1549".parse().unwrap());
        assert_eq!(config.flush_seconds, 60);
        assert_eq!(config.pager_window_size, 5);
        assert_eq!(config.pager_limit, 100);
        assert!(config.monitoring_markers.is_empty());
        assert_eq!(config.identity_fields.fields().len(), 8);
        assert_eq!(config.source_field, "source");
        assert_eq!(config.smtp_port, 465);
        assert_eq!(config.pager_from, "errs@example.com");
        assert!(config.suppress_monitoring_digest);

        // Overrides.
        env::set_var("ERRFLOW_BIND", "127.0.0.1:9999");
        env::set_var("ERRFLOW_FLUSH_SECONDS", "5");
        env::set_var("ERRFLOW_MONITORING_MARKERS", "canary-a, canary-b");
        env::set_var("ERRFLOW_IDENTITY_FIELDS", "module,lineno");
        env::set_var("ERRFLOW_PAGER_FROM", "pager-src@example.com");
        let config = Config::from_env().unwrap();
        assert_eq!(config.bind, "127.0.0.1:9999".parse().unwrap());
        assert_eq!(config.flush_seconds, 5);
        assert_eq!(
            config.monitoring_markers,
            vec!["canary-a".to_string(), "canary-b".to_string()]
        );
        assert_eq!(config.identity_fields.fields().len(), 2);
        assert_eq!(config.pager_from, "pager-src@example.com");

        // Malformed values are fatal, not silently defaulted.
        env::set_var("ERRFLOW_FLUSH_SECONDS", "soon");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("ERRFLOW_FLUSH_SECONDS", _))
        ));
        env::set_var("ERRFLOW_FLUSH_SECONDS", "0");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("ERRFLOW_FLUSH_SECONDS", _))
        ));
        env::remove_var("ERRFLOW_FLUSH_SECONDS");

        env::set_var("ERRFLOW_IDENTITY_FIELDS", "module,no_such_field");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("ERRFLOW_IDENTITY_FIELDS", _))
        ));

        clear_all();
    }
}
