//! # socketor-runtime
//!
//! Linux runtime for the socketor server.
//!
//! This crate provides:
//! - Worker stacks (mmap with a guard page)
//! - Worker contexts started with raw `clone(2)`
//! - Completion flags cleared by the kernel on worker exit
//! - A futex-based binary signal
//! - The accept loop that spawns and reclaims workers

pub mod config;
pub mod memory;
pub mod completion;
pub mod futex;
pub mod worker;
pub mod descriptor;
pub mod scheduler;

// Re-exports
pub use config::{ConfigError, ServerConfig};
pub use completion::CompletionFlag;
pub use descriptor::{WorkerDescriptor, WorkerHandle, WorkerState};
pub use memory::WorkerStack;
pub use scheduler::{AcceptLoop, Cycle, LoopStats};
pub use worker::{Exchange, Stage, WorkerOutcome};

// Platform detection
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod platform_linux;
        pub use platform_linux::{clone_context, ContextEntry};
    } else {
        compile_error!("socketor-runtime supports Linux only");
    }
}
