//! # socketor-core
//!
//! Platform-agnostic building blocks for the socketor server.
//!
//! This crate contains no OS-specific code. Worker stacks, `clone(2)`,
//! futexes and the accept loop live in `socketor-runtime`.
//!
//! ## Modules
//!
//! - `registry` - insertion-ordered worker registry over a slab arena
//! - `op` - the arithmetic evaluator
//! - `line` - fixed-capacity, allocation-free text line
//! - `transport` - listener/connection traits the runtime is generic over
//! - `error` - error types
//! - `kprint` - kernel-style leveled print macros
//! - `env` - environment variable helpers

pub mod registry;
pub mod op;
pub mod line;
pub mod transport;
pub mod error;
pub mod kprint;
pub mod env;

pub use registry::{NodeId, Registry};
pub use op::{calculate, parse_operand, OpKind, Operation};
pub use line::{Line, LINE_CAPACITY};
pub use transport::{Accepted, LineConnection, LineListener};
pub use error::{MemoryError, ServerError, ServerResult};
pub use kprint::{set_log_level, LogLevel};
pub use env::{env_get, env_get_bool};

/// Protocol and memory layout constants
pub mod constants {
    /// Longest wire line, terminator included
    pub const LINE_MAX: usize = 32;

    /// Worker stack size (64 KiB)
    pub const STACK_SIZE: usize = 64 * 1024;

    /// Guard page below each worker stack
    pub const GUARD_SIZE: usize = 4096;

    /// Accept timeout while any worker is still registered (10 s)
    pub const ACCEPT_TIMEOUT_MS: u64 = 10_000;
}
