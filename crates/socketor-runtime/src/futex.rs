//! Binary signal over a futex word
//!
//! `wait` blocks until the word can be flipped from `unlock_val` to
//! `lock_val`; `signal` flips it back and wakes the sleepers. Both sides
//! are a compare-and-swap first and a syscall only when the CAS says there
//! is something to wait for or someone to wake.
//!
//! The accept loop does not use this: it polls completion flags during its
//! sweep. The primitive works on any `AtomicI32`, completion flags
//! included, because it uses shared (non-private) futex operations, the
//! same flavour the kernel uses for its clear-tid wake on thread exit.
//!
//! Errors other than EAGAIN (word already changed) and EINTR are returned
//! as `ServerError::Signal`; callers treat them as fatal.

use socketor_core::error::{ServerError, ServerResult};

use nix::errno::Errno;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

fn futex(
    word: &AtomicI32,
    op: libc::c_int,
    val: i32,
    timeout: Option<&libc::timespec>,
) -> Result<libc::c_long, Errno> {
    let timeout_ptr = match timeout {
        Some(ts) => ts as *const libc::timespec,
        None => std::ptr::null(),
    };

    let ret = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            op,
            val,
            timeout_ptr,
            std::ptr::null::<u32>(), // uaddr2 (unused)
            0u32,                    // val3 (unused)
        )
    };

    if ret < 0 {
        Err(Errno::last())
    } else {
        Ok(ret)
    }
}

/// Sleep while `word == expected`
///
/// Returns `Ok` on wake, `Err(EAGAIN)` if the word already differed,
/// `Err(ETIMEDOUT)` when `timeout` expires.
pub fn futex_wait(word: &AtomicI32, expected: i32, timeout: Option<Duration>) -> Result<(), Errno> {
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });
    futex(word, libc::FUTEX_WAIT, expected, ts.as_ref()).map(|_| ())
}

/// Wake up to `count` sleepers on `word`; returns how many woke
pub fn futex_wake(word: &AtomicI32, count: i32) -> Result<usize, Errno> {
    futex(word, libc::FUTEX_WAKE, count, None).map(|n| n as usize)
}

/// Block until `flag` moves from `unlock_val` to `lock_val` on our CAS
pub fn wait(flag: &AtomicI32, lock_val: i32, unlock_val: i32) -> ServerResult<()> {
    loop {
        if flag
            .compare_exchange(unlock_val, lock_val, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return Ok(());
        }

        match futex_wait(flag, lock_val, None) {
            Ok(()) | Err(Errno::EAGAIN) | Err(Errno::EINTR) => continue,
            Err(e) => return Err(ServerError::Signal(e as i32)),
        }
    }
}

/// Move `flag` from `lock_val` to `unlock_val` and wake every waiter
///
/// Returns `false` without waking anyone when the flag was not locked.
pub fn signal(flag: &AtomicI32, lock_val: i32, unlock_val: i32) -> ServerResult<bool> {
    if flag
        .compare_exchange(lock_val, unlock_val, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Ok(false);
    }

    futex_wake(flag, i32::MAX).map_err(|e| ServerError::Signal(e as i32))?;
    Ok(true)
}
