//! # socketor - thread-per-connection arithmetic server
//!
//! Every accepted TCP client gets its own kernel thread, started with raw
//! `clone(2)` on a private mmap'd stack. The worker reads two operand
//! lines, applies the server's single operation, writes back
//! `"<A> <op> <B> = <result>"` and exits. The accept loop reclaims
//! finished workers by polling the completion flag the kernel clears on
//! thread exit.
//!
//! ## Quick Start
//!
//! ```ignore
//! use socketor::{Operation, Server, ServerConfig};
//!
//! let config = ServerConfig::from_env().operation(Operation::new("*"));
//! let mut server = Server::bind(8080, config)?;
//! server.run()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 Accept loop                  │
//! │   timed accept ─► spawn ─► sweep registry    │
//! └──────────────────────────────────────────────┘
//!          │ clone(2)                 ▲ flag == 0
//!          ▼                          │
//!    ┌───────────┐  ┌───────────┐  ┌───────────┐
//!    │  Worker   │  │  Worker   │  │  Worker   │
//!    │ 64K stack │  │ 64K stack │  │ 64K stack │
//!    └───────────┘  └───────────┘  └───────────┘
//! ```

// Re-export core types
pub use socketor_core::{
    calculate,
    parse_operand,
    Line,
    LineConnection,
    LineListener,
    Accepted,
    MemoryError,
    OpKind,
    Operation,
    Registry,
    NodeId,
    ServerError,
    ServerResult,
};
pub use socketor_core::constants;

// Re-export kprint macros and env utilities
pub use socketor_core::{kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use socketor_core::kprint::{init as init_logging, set_log_level, LogLevel};
pub use socketor_core::{env_get, env_get_bool};

// Re-export runtime types
pub use socketor_runtime::{
    AcceptLoop,
    ConfigError,
    Cycle,
    Exchange,
    LoopStats,
    ServerConfig,
    Stage,
    WorkerOutcome,
};
pub use socketor_runtime::futex::{signal, wait};

// Re-export transport
pub use socketor_net::{request, TcpConnection, TcpLineListener};

use std::convert::Infallible;
use std::fmt;
use std::io;
use std::net::Ipv4Addr;

/// Errors from setting up or running a server
#[derive(Debug)]
pub enum Error {
    /// Could not bind or inspect the listening socket
    Bind(io::Error),
    /// Rejected configuration
    Config(ConfigError),
    /// Fatal accept loop error
    Server(ServerError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bind(e) => write!(f, "bind failed: {}", e),
            Error::Config(e) => write!(f, "{}", e),
            Error::Server(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Bind(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Server(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Bind(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<ServerError> for Error {
    fn from(e: ServerError) -> Self {
        Error::Server(e)
    }
}

/// A bound TCP arithmetic server
pub struct Server {
    inner: AcceptLoop<TcpLineListener>,
    port: u16,
}

impl Server {
    /// Listen on `port` on all interfaces
    pub fn bind(port: u16, config: ServerConfig) -> Result<Self, Error> {
        Self::bind_addr(Ipv4Addr::UNSPECIFIED, port, config)
    }

    /// Listen on `ip:port`; port 0 picks a free one
    pub fn bind_addr(ip: Ipv4Addr, port: u16, config: ServerConfig) -> Result<Self, Error> {
        let listener = TcpLineListener::bind_addr(ip, port)?;
        let port = listener.local_port()?;
        let inner = AcceptLoop::new(listener, config)?;
        Ok(Self { inner, port })
    }

    /// Port actually bound
    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[inline]
    pub fn operation(&self) -> &Operation {
        &self.inner.config().operation
    }

    /// Serve forever; returns only on a fatal error
    pub fn run(&mut self) -> Result<Infallible, Error> {
        Ok(self.inner.run()?)
    }

    /// One accept-spawn-sweep cycle
    pub fn run_once(&mut self) -> Result<Cycle, Error> {
        Ok(self.inner.run_once()?)
    }

    #[inline]
    pub fn live_workers(&self) -> usize {
        self.inner.live_workers()
    }

    #[inline]
    pub fn stats(&self) -> LoopStats {
        self.inner.stats()
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("port", &self.port)
            .field("operation", self.operation())
            .field("live_workers", &self.live_workers())
            .finish()
    }
}

/// Bind `port` and serve with `config` forever
pub fn serve(port: u16, config: ServerConfig) -> Result<Infallible, Error> {
    Server::bind(port, config)?.run()
}
