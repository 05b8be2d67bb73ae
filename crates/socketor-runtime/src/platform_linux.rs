//! Linux execution-context creation
//!
//! Workers are created with the raw `clone(2)` wrapper rather than
//! `pthread_create`, so the only bookkeeping attached to a worker is the
//! descriptor we own. The new context shares:
//!
//! - the address space (`CLONE_VM`)
//! - cwd/umask (`CLONE_FS`) and the descriptor table (`CLONE_FILES`)
//! - signal dispositions (`CLONE_SIGHAND`) and the thread group (`CLONE_THREAD`)
//! - SysV semaphore undo lists (`CLONE_SYSVSEM`)
//!
//! No `CLONE_SETTLS`: the worker runs on the caller's thread pointer, which
//! is why worker code must stay away from the allocator, stdio and anything
//! else keyed off thread-local state.

use crate::completion::CompletionFlag;

use nix::errno::Errno;
use std::ffi::c_void;

/// Entry point signature expected by the glibc/musl `clone` wrapper
pub type ContextEntry = extern "C" fn(*mut c_void) -> libc::c_int;

const CLONE_FLAGS: libc::c_int = libc::CLONE_VM
    | libc::CLONE_FS
    | libc::CLONE_FILES
    | libc::CLONE_SIGHAND
    | libc::CLONE_THREAD
    | libc::CLONE_SYSVSEM
    | libc::CLONE_PARENT_SETTID
    | libc::CLONE_CHILD_CLEARTID;

/// Start `entry(arg)` on a new kernel thread running on `stack_top`
///
/// Both tid pointers target `flag`: it holds the tid by the time this
/// returns and is cleared by the kernel when `entry` returns. When `entry`
/// returns the wrapper issues a plain `exit`, ending only that thread.
///
/// # Safety
///
/// `stack_top` must be the top of a writable region large enough for
/// `entry`, and that region, `arg` and `flag` must all stay valid until
/// `flag` has been observed clear.
pub unsafe fn clone_context(
    entry: ContextEntry,
    stack_top: *mut u8,
    arg: *mut c_void,
    flag: &CompletionFlag,
) -> Result<i32, Errno> {
    let tid_ptr = flag.as_tid_ptr();
    let tid = libc::clone(
        entry,
        stack_top.cast::<c_void>(),
        CLONE_FLAGS,
        arg,
        tid_ptr,                       // parent_tid
        std::ptr::null_mut::<c_void>(), // tls (unused)
        tid_ptr,                       // child_tid
    );

    if tid < 0 {
        Err(Errno::last())
    } else {
        Ok(tid)
    }
}
