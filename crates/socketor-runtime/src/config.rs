//! Server configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use socketor_runtime::config::ServerConfig;
//!
//! let config = ServerConfig::from_env()
//!     .operation(Operation::new("*"))
//!     .accept_timeout(Duration::from_millis(500));
//! ```

use crate::memory::page_size;
use socketor_core::constants::{ACCEPT_TIMEOUT_MS, STACK_SIZE};
use socketor_core::env::env_get;
use socketor_core::Operation;

use std::time::Duration;

/// Smallest worker stack we accept
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Accept loop configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Operation applied to every request
    pub operation: Operation,
    /// Accept timeout while workers are registered
    pub accept_timeout: Duration,
    /// Usable stack bytes per worker (guard page not included)
    pub stack_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ServerConfig {
    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `SOCKETOR_ACCEPT_TIMEOUT_MS` - Accept timeout in milliseconds
    /// - `SOCKETOR_STACK_SIZE` - Worker stack size in bytes
    pub fn from_env() -> Self {
        Self {
            operation: Operation::default(),
            accept_timeout: Duration::from_millis(env_get(
                "SOCKETOR_ACCEPT_TIMEOUT_MS",
                ACCEPT_TIMEOUT_MS,
            )),
            stack_size: env_get("SOCKETOR_STACK_SIZE", STACK_SIZE),
        }
    }

    /// Defaults only, no environment lookups.
    pub fn new() -> Self {
        Self {
            operation: Operation::default(),
            accept_timeout: Duration::from_millis(ACCEPT_TIMEOUT_MS),
            stack_size: STACK_SIZE,
        }
    }

    // Builder methods

    pub fn operation(mut self, op: Operation) -> Self {
        self.operation = op;
        self
    }

    pub fn accept_timeout(mut self, d: Duration) -> Self {
        self.accept_timeout = d;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accept_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("accept_timeout must be > 0"));
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidValue("stack_size must be >= 16KB"));
        }
        if self.stack_size % page_size() != 0 {
            return Err(ConfigError::InvalidValue(
                "stack_size must be a multiple of the page size",
            ));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("Socketor Configuration:");
        eprintln!("  operation:       {}", self.operation);
        eprintln!("  accept_timeout:  {:?}", self.accept_timeout);
        eprintln!("  stack_size:      {}", self.stack_size);
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
