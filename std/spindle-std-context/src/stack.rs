///
/// Green thread stacks.
///
/// Each stack is a private anonymous mapping. The lowest page is remapped
/// `PROT_NONE` so that running off the end faults instead of scribbling over
/// whatever the allocator placed below it. The mapping is released exactly
/// once, when the `Stack` is dropped.
///

use std::io;
use std::ptr::NonNull;

use crate::errors::ContextError;

/// Smallest stack a thread may be given
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Stack size used when the caller has no preference
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

#[derive(Debug)]
pub struct Stack {
    base: NonNull<u8>,
    mapped: usize,
    guard: usize,
}

impl Stack {
    /// Map a stack with at least `size` usable bytes plus a guard page
    pub fn allocate(size: usize) -> Result<Self, ContextError> {
        if size < MIN_STACK_SIZE {
            return Err(ContextError::InvalidStackSize {
                size,
                min: MIN_STACK_SIZE,
            });
        }

        let page = page_size();
        let usable = size
            .checked_next_multiple_of(page)
            .ok_or_else(|| alloc_error(size, io::Error::from_raw_os_error(libc::ENOMEM)))?;
        let mapped = usable
            .checked_add(page)
            .ok_or_else(|| alloc_error(size, io::Error::from_raw_os_error(libc::ENOMEM)))?;

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                mapped,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_STACK,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(alloc_error(size, io::Error::last_os_error()));
        }
        let base = NonNull::new(ptr as *mut u8)
            .ok_or_else(|| alloc_error(size, io::Error::from_raw_os_error(libc::ENOMEM)))?;

        let stack = Self {
            base,
            mapped,
            guard: page,
        };

        // On failure `stack` drops here and unmaps the region.
        if unsafe { libc::mprotect(ptr, page, libc::PROT_NONE) } != 0 {
            return Err(ContextError::GuardPage(io::Error::last_os_error()));
        }

        Ok(stack)
    }

    /// Lowest usable address, just above the guard page
    pub fn bottom(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.guard) }
    }

    /// One past the highest usable address
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.mapped) }
    }

    /// Usable bytes, excluding the guard page
    pub fn size(&self) -> usize {
        self.mapped - self.guard
    }

    pub fn contains(&self, addr: *const u8) -> bool {
        let addr = addr as usize;
        addr >= self.bottom() as usize && addr < self.top() as usize
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.mapped);
        }
    }
}

fn alloc_error(size: usize, source: io::Error) -> ContextError {
    ContextError::StackAlloc { size, source }
}

pub fn page_size() -> usize {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        n if n > 0 => n as usize,
        _ => 4096,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_rounds_to_pages() {
        let page = page_size();
        let stack = Stack::allocate(MIN_STACK_SIZE + 1).unwrap();

        assert_eq!(stack.size() % page, 0);
        assert!(stack.size() > MIN_STACK_SIZE);
        assert_eq!(stack.top() as usize - stack.bottom() as usize, stack.size());
    }

    #[test]
    fn test_stack_is_writable() {
        let stack = Stack::allocate(DEFAULT_STACK_SIZE).unwrap();
        unsafe {
            stack.bottom().write(0xAB);
            stack.top().sub(1).write(0xCD);
            assert_eq!(stack.bottom().read(), 0xAB);
            assert_eq!(stack.top().sub(1).read(), 0xCD);
        }
    }

    #[test]
    fn test_too_small_is_rejected() {
        let err = Stack::allocate(1024).unwrap_err();
        assert!(matches!(err, ContextError::InvalidStackSize { size: 1024, .. }));
    }

    #[test]
    fn test_huge_stack_fails_cleanly() {
        let err = Stack::allocate(1 << 60).unwrap_err();
        assert!(matches!(err, ContextError::StackAlloc { .. }));
    }

    #[test]
    fn test_contains() {
        let stack = Stack::allocate(MIN_STACK_SIZE).unwrap();
        assert!(stack.contains(stack.bottom()));
        assert!(!stack.contains(stack.top()));
        assert!(!stack.contains(unsafe { stack.bottom().sub(1) }));
    }
}
