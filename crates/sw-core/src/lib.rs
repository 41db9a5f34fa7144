//! Core configuration types and errors for the stable-watch tool.
//!
//! This crate provides the foundational types used across the workspace:
//!
//! - [`WatchConfig`] - stability threshold, event channel sizing, filtering
//! - [`LogConfig`] - log level and ANSI output
//! - [`Config`] - root configuration, loadable from a JSON file
//! - [`ConfigError`] - errors raised while loading or validating configuration

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;

pub use config::{Config, LogConfig, WatchConfig};
pub use error::ConfigError;
