//! Per-worker completion flag
//!
//! The kernel owns every write to this word:
//!
//! - `CLONE_PARENT_SETTID` stores the new thread id before `clone` returns
//!   to the accept loop, so the flag is non-zero before the first sweep can
//!   look at it.
//! - `CLONE_CHILD_CLEARTID` stores 0 (and futex-wakes the word) once the
//!   worker has left its stack for good.
//!
//! The accept loop only reads it, with acquire ordering, so everything the
//! worker wrote before exiting is visible once the flag reads zero.

use std::sync::atomic::{AtomicI32, Ordering};

/// Kernel-maintained "still running" word
#[repr(transparent)]
pub struct CompletionFlag(AtomicI32);

impl CompletionFlag {
    /// A fresh, zeroed flag
    pub const fn new() -> Self {
        Self(AtomicI32::new(0))
    }

    /// Current value: the worker's tid while it runs, 0 once it has exited
    #[inline]
    pub fn load(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_clear(&self) -> bool {
        self.load() == 0
    }

    /// The word itself, for futex-based waiting
    #[inline]
    pub fn as_atomic(&self) -> &AtomicI32 {
        &self.0
    }

    /// Raw address handed to `clone` as both tid pointers
    #[inline]
    pub(crate) fn as_tid_ptr(&self) -> *mut libc::pid_t {
        self.0.as_ptr()
    }
}

impl Default for CompletionFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompletionFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompletionFlag({})", self.load())
    }
}
