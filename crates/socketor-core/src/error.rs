//! Error types for the socketor server
//!
//! Everything here is fatal from the accept loop's point of view. Failures
//! local to a single worker never surface as a `ServerError`; they are
//! recorded in that worker's exchange and reclaimed like any other worker.

use core::fmt;

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that end the accept loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Worker stack mapping failed
    Memory(MemoryError),

    /// clone(2) refused to create a worker context (errno)
    Spawn(i32),

    /// futex wait/wake failed with something other than EAGAIN/EINTR (errno)
    Signal(i32),

    /// Platform-specific error (errno)
    Platform(i32),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Memory(e) => write!(f, "memory error: {}", e),
            ServerError::Spawn(errno) => {
                write!(f, "failed to spawn worker context: {}", describe_errno(*errno))
            }
            ServerError::Signal(errno) => {
                write!(f, "futex operation failed: {}", describe_errno(*errno))
            }
            ServerError::Platform(errno) => write!(f, "platform error: {}", describe_errno(*errno)),
        }
    }
}

impl std::error::Error for ServerError {}

/// Worker stack errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// mmap of the stack region failed (errno)
    MapFailed(i32),

    /// mprotect of the guard page failed (errno)
    GuardFailed(i32),

    /// munmap of the stack region failed (errno)
    UnmapFailed(i32),

    /// Requested stack size is zero or not page aligned
    InvalidSize(usize),
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::MapFailed(errno) => {
                write!(f, "stack mapping failed: {}", describe_errno(*errno))
            }
            MemoryError::GuardFailed(errno) => {
                write!(f, "guard page protection failed: {}", describe_errno(*errno))
            }
            MemoryError::UnmapFailed(errno) => {
                write!(f, "stack unmapping failed: {}", describe_errno(*errno))
            }
            MemoryError::InvalidSize(size) => write!(f, "invalid stack size {}", size),
        }
    }
}

impl From<MemoryError> for ServerError {
    fn from(e: MemoryError) -> Self {
        ServerError::Memory(e)
    }
}

fn describe_errno(errno: i32) -> std::io::Error {
    std::io::Error::from_raw_os_error(errno)
}
