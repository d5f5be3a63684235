//! errflow - UDP error-report aggregation and digest mail daemon
//!
//! Application nodes emit structured error events as UDP datagrams.
//! errflow deduplicates them, accumulates occurrence statistics, emails
//! one digest per interval instead of one mail per error, and pages
//! when recent interval volume exceeds a sliding-window threshold.

pub mod config;
pub mod pipeline;

pub use config::{Config, ConfigError};
