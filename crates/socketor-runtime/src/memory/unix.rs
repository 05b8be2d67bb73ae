//! Unix worker stacks using mmap

use super::WorkerStack;
use socketor_core::error::MemoryError;
use socketor_core::kwarn;

use nix::sys::mman::{mmap_anonymous, mprotect, munmap, MapFlags, ProtFlags};
use std::num::NonZeroUsize;

/// System page size, falling back to 4 KiB if sysconf has no answer
pub fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        socketor_core::constants::GUARD_SIZE
    }
}

impl WorkerStack {
    /// Map `size` bytes of stack plus one guard page
    ///
    /// `size` must be a non-zero multiple of the page size.
    pub fn new(size: usize) -> Result<Self, MemoryError> {
        let page = page_size();
        if size == 0 || size % page != 0 {
            return Err(MemoryError::InvalidSize(size));
        }

        let mapped = size
            .checked_add(page)
            .and_then(NonZeroUsize::new)
            .ok_or(MemoryError::InvalidSize(size))?;

        let base = unsafe {
            mmap_anonymous(
                None,
                mapped,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_PRIVATE | MapFlags::MAP_STACK,
            )
        }
        .map_err(|e| MemoryError::MapFailed(e as i32))?;

        // Lowest page becomes the guard; a runaway stack faults here
        if let Err(e) = unsafe { mprotect(base, page, ProtFlags::PROT_NONE) } {
            let _ = unsafe { munmap(base, mapped.get()) };
            return Err(MemoryError::GuardFailed(e as i32));
        }

        Ok(Self {
            base,
            mapped: mapped.get(),
            guard: page,
        })
    }
}

impl Drop for WorkerStack {
    fn drop(&mut self) {
        if let Err(e) = unsafe { munmap(self.base, self.mapped) } {
            kwarn!("{}", MemoryError::UnmapFailed(e as i32));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use socketor_core::constants::STACK_SIZE;

    #[test]
    fn test_stack_layout() {
        let stack = WorkerStack::new(STACK_SIZE).unwrap();
        assert_eq!(stack.size(), STACK_SIZE);
        assert_eq!(stack.guard_size(), page_size());
        assert_eq!(stack.top() as usize - stack.bottom() as usize, STACK_SIZE);
        assert_eq!(stack.top() as usize % 16, 0);
    }

    #[test]
    fn test_stack_is_writable() {
        let stack = WorkerStack::new(STACK_SIZE).unwrap();
        unsafe {
            stack.bottom().write(0xAB);
            stack.top().sub(1).write(0xCD);
            assert_eq!(stack.bottom().read(), 0xAB);
            assert_eq!(stack.top().sub(1).read(), 0xCD);
        }
    }

    #[test]
    fn test_invalid_sizes_rejected() {
        assert_eq!(WorkerStack::new(0).unwrap_err(), MemoryError::InvalidSize(0));
        assert_eq!(
            WorkerStack::new(STACK_SIZE + 1).unwrap_err(),
            MemoryError::InvalidSize(STACK_SIZE + 1)
        );
    }

    #[test]
    fn test_many_stacks_map_and_unmap() {
        let stacks: Vec<_> = (0..64).map(|_| WorkerStack::new(STACK_SIZE).unwrap()).collect();
        let mut tops: Vec<_> = stacks.iter().map(|s| s.top() as usize).collect();
        tops.sort_unstable();
        tops.dedup();
        assert_eq!(tops.len(), 64);
    }
}
