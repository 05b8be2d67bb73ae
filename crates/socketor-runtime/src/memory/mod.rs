//! Worker stack memory
//!
//! Each worker runs on its own anonymous mapping:
//!
//! ```text
//!   base                     base + guard                 top
//!    │  guard (PROT_NONE)     │  stack (RW, grows down) ◄──│
//!    └────────────────────────┴────────────────────────────┘
//! ```
//!
//! Overflowing the stack faults on the guard page instead of scribbling
//! over a neighbour. The mapping is released only when the owning
//! descriptor is reclaimed.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::page_size;
    }
}

use std::ffi::c_void;
use std::ptr::NonNull;

/// One worker's stack mapping
pub struct WorkerStack {
    /// Start of the mapping (the guard page)
    base: NonNull<c_void>,

    /// Bytes mapped, guard included
    mapped: usize,

    /// Bytes of guard at `base`
    guard: usize,
}

impl WorkerStack {
    /// Highest address of the stack; the initial stack pointer
    ///
    /// Page aligned, which satisfies every ABI's 16-byte requirement.
    #[inline]
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().cast::<u8>().add(self.mapped) }
    }

    /// Lowest usable address, just above the guard page
    #[inline]
    pub fn bottom(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().cast::<u8>().add(self.guard) }
    }

    /// Usable stack bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.mapped - self.guard
    }

    /// Guard bytes below the stack
    #[inline]
    pub fn guard_size(&self) -> usize {
        self.guard
    }
}

impl std::fmt::Debug for WorkerStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerStack")
            .field("bottom", &self.bottom())
            .field("top", &self.top())
            .field("size", &self.size())
            .finish()
    }
}

// Safety: the mapping is plain memory owned by exactly one descriptor
unsafe impl Send for WorkerStack {}
