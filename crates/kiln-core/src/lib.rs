//! Kiln Core - shared foundations for the Kiln build orchestrator
//!
//! This crate provides the error taxonomy and the configuration system used by
//! the task engine and the command surface.

pub mod config;
pub mod error;

pub use config::{CacheConfig, Config, ForceScope, RunConfig};
pub use error::{ConfigError, Result};
