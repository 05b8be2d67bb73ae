//! Worker descriptors and the handles that own them
//!
//! A descriptor is everything one worker needs: its stack, the operation,
//! the connection and the exchange record it fills in, and the completion
//! flag the kernel maintains. It is boxed once and never moves, because
//! the worker context holds a raw pointer to it for its whole life.
//!
//! Ownership stays with the accept loop's `WorkerHandle`. The handle frees
//! the descriptor on drop, except while the worker is still running: then
//! freeing would pull the stack out from under a live context, so the
//! descriptor is leaked instead.

use crate::completion::CompletionFlag;
use crate::memory::WorkerStack;
use crate::platform_linux::clone_context;
use crate::worker::{self, Exchange};

use socketor_core::error::{ServerError, ServerResult};
use socketor_core::{kwarn, LineConnection, Operation};

use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

/// Lifecycle of one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Descriptor built, context not started
    Created,
    /// Context running; the completion flag holds its tid
    Active,
    /// Context gone; the kernel cleared the flag
    Terminated,
}

/// Worker-owned part of the descriptor
struct WorkerSlot<C> {
    conn: Option<C>,
    exchange: Exchange,
}

/// One worker's state
pub struct WorkerDescriptor<C> {
    serial: u64,
    stack: WorkerStack,
    operation: Arc<Operation>,
    completion: CompletionFlag,
    /// Set for the duration of a successful start
    started: AtomicBool,
    /// tid returned by clone, kept after the flag clears
    native_id: AtomicI32,
    /// Written only by the worker between start and termination
    slot: UnsafeCell<WorkerSlot<C>>,
}

impl<C: LineConnection> WorkerDescriptor<C> {
    /// Sequence number assigned by the accept loop
    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Kernel thread id, 0 before start
    #[inline]
    pub fn native_id(&self) -> i32 {
        self.native_id.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn completion(&self) -> &CompletionFlag {
        &self.completion
    }

    #[inline]
    pub fn stack(&self) -> &WorkerStack {
        &self.stack
    }

    pub fn state(&self) -> WorkerState {
        if !self.started.load(Ordering::Acquire) {
            WorkerState::Created
        } else if self.completion.is_clear() {
            WorkerState::Terminated
        } else {
            WorkerState::Active
        }
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.state() == WorkerState::Terminated
    }

    /// The exchange record, readable once the worker has terminated
    pub fn exchange(&self) -> Option<&Exchange> {
        if self.is_terminated() {
            // Safety: the worker context is gone, nothing writes the slot
            Some(unsafe { &(*self.slot.get()).exchange })
        } else {
            None
        }
    }

    /// The connection, readable once the worker has terminated
    pub fn connection(&self) -> Option<&C> {
        if self.is_terminated() {
            // Safety: as in `exchange`
            unsafe { (*self.slot.get()).conn.as_ref() }
        } else {
            None
        }
    }
}

/// Worker context entry point
///
/// Must stay allocation-, logging- and panic-free; see `worker`.
extern "C" fn worker_entry<C: LineConnection>(arg: *mut c_void) -> libc::c_int {
    // Safety: `arg` is the descriptor pointer handed over by `spawn`, kept
    // alive by the handle until the completion flag clears; the slot
    // belongs to this context exclusively until then.
    let desc = unsafe { &*arg.cast::<WorkerDescriptor<C>>() };
    let slot = unsafe { &mut *desc.slot.get() };

    match slot.conn.as_mut() {
        Some(conn) => {
            worker::serve(conn, &desc.operation, &mut slot.exchange);
            0
        }
        None => 1,
    }
}

/// Owning handle to a heap-pinned worker descriptor
pub struct WorkerHandle<C: LineConnection> {
    ptr: NonNull<WorkerDescriptor<C>>,
}

impl<C: LineConnection> WorkerHandle<C> {
    /// Map a stack and build a descriptor around `conn`
    pub fn new(serial: u64, conn: C, operation: Arc<Operation>, stack_size: usize) -> ServerResult<Self> {
        let stack = WorkerStack::new(stack_size)?;
        let desc = Box::new(WorkerDescriptor {
            serial,
            stack,
            operation,
            completion: CompletionFlag::new(),
            started: AtomicBool::new(false),
            native_id: AtomicI32::new(0),
            slot: UnsafeCell::new(WorkerSlot {
                conn: Some(conn),
                exchange: Exchange::new(),
            }),
        });

        Ok(Self {
            ptr: NonNull::from(Box::leak(desc)),
        })
    }

    /// Start the worker context; returns its tid
    ///
    /// On failure the descriptor stays `Created` and can be dropped
    /// normally.
    pub fn spawn(&self) -> ServerResult<i32> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ServerError::Platform(libc::EALREADY));
        }

        let desc = self.ptr.as_ptr();
        // Safety: the descriptor is boxed and outlives the context (see
        // `Drop`); the stack is exclusively the worker's.
        let result = unsafe {
            clone_context(
                worker_entry::<C>,
                self.stack.top(),
                desc.cast::<c_void>(),
                &self.completion,
            )
        };

        match result {
            Ok(tid) => {
                self.native_id.store(tid, Ordering::Relaxed);
                Ok(tid)
            }
            Err(errno) => {
                self.started.store(false, Ordering::Release);
                Err(ServerError::Spawn(errno as i32))
            }
        }
    }
}

impl<C: LineConnection> Deref for WorkerHandle<C> {
    type Target = WorkerDescriptor<C>;

    fn deref(&self) -> &Self::Target {
        // Safety: the pointer came from Box::leak and is freed only in Drop
        unsafe { self.ptr.as_ref() }
    }
}

impl<C: LineConnection> Drop for WorkerHandle<C> {
    fn drop(&mut self) {
        if self.state() == WorkerState::Active {
            kwarn!(
                "worker {} (tid {}) still running; leaking its descriptor",
                self.serial,
                self.native_id()
            );
            return;
        }
        // Safety: no context references the descriptor any more
        drop(unsafe { Box::from_raw(self.ptr.as_ptr()) });
    }
}

impl<C: LineConnection> std::fmt::Debug for WorkerHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("serial", &self.serial)
            .field("tid", &self.native_id())
            .field("state", &self.state())
            .finish()
    }
}

// Safety: the descriptor is touched by exactly one worker context and one
// owning handle, synchronized through the completion flag.
unsafe impl<C: LineConnection> Send for WorkerHandle<C> {}
