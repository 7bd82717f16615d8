//! Executable memory for installed stubs, using mmap.
//!
//! Stub code is built in a [`super::codebuf::CodeBuffer`], copied into a
//! fresh writable mapping, and then flipped to read+execute. The mapping
//! is never writable and executable at the same time.

use std::ptr::NonNull;

/// Error type for memory operations.
#[derive(Debug)]
pub enum MemoryError {
    AllocationFailed,
    ProtectionFailed,
    InvalidSize,
}

impl std::fmt::Display for MemoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "memory allocation failed"),
            MemoryError::ProtectionFailed => write!(f, "memory protection change failed"),
            MemoryError::InvalidSize => write!(f, "invalid memory size"),
        }
    }
}

impl std::error::Error for MemoryError {}

/// A block of memory allocated via mmap, writable until
/// `make_executable()` flips it to read+execute.
pub struct ExecutableMemory {
    ptr: NonNull<u8>,
    size: usize,
    executable: bool,
}

impl ExecutableMemory {
    /// Allocate a writable block of at least `size` bytes, rounded up to
    /// the page size.
    pub fn new(size: usize) -> Result<Self, MemoryError> {
        if size == 0 {
            return Err(MemoryError::InvalidSize);
        }

        let page_size = Self::page_size();
        let aligned_size = (size + page_size - 1) & !(page_size - 1);

        let ptr = Self::mmap_alloc(aligned_size)?;

        Ok(Self {
            ptr,
            size: aligned_size,
            executable: false,
        })
    }

    /// Copy `code` into a fresh mapping and make it executable.
    pub fn install(code: &[u8]) -> Result<Self, MemoryError> {
        let mut mem = Self::new(code.len())?;
        mem.write(0, code)?;
        mem.make_executable()?;
        Ok(mem)
    }

    fn page_size() -> usize {
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    }

    fn mmap_alloc(size: usize) -> Result<NonNull<u8>, MemoryError> {
        use std::ptr;

        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(MemoryError::AllocationFailed);
        }

        NonNull::new(ptr as *mut u8).ok_or(MemoryError::AllocationFailed)
    }

    /// Get a pointer to the start of the mapping.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Get the size of the allocated memory.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Write bytes at the given offset. Fails once the mapping is
    /// executable or if the write would run past the end.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), MemoryError> {
        if self.executable {
            return Err(MemoryError::ProtectionFailed);
        }

        if offset + data.len() > self.size {
            return Err(MemoryError::InvalidSize);
        }

        unsafe {
            let dest = self.ptr.as_ptr().add(offset);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dest, data.len());
        }

        Ok(())
    }

    /// Flip the mapping to read+execute. After this call it can no longer
    /// be written to.
    pub fn make_executable(&mut self) -> Result<(), MemoryError> {
        if self.executable {
            return Ok(());
        }

        let result = unsafe {
            libc::mprotect(
                self.ptr.as_ptr() as *mut libc::c_void,
                self.size,
                libc::PROT_READ | libc::PROT_EXEC,
            )
        };

        if result != 0 {
            return Err(MemoryError::ProtectionFailed);
        }

        self.executable = true;
        Ok(())
    }

    /// Check if the memory is executable.
    pub fn is_executable(&self) -> bool {
        self.executable
    }

    /// Get a function pointer to the start of the mapping. Returns None
    /// until the mapping is executable.
    ///
    /// # Safety
    /// The caller must ensure that the memory contains valid machine code
    /// for the target architecture and that `F` is a function pointer type
    /// matching the code's calling convention.
    pub unsafe fn as_fn<F>(&self) -> Option<F>
    where
        F: Copy,
    {
        if !self.executable {
            return None;
        }

        if std::mem::size_of::<F>() != std::mem::size_of::<fn()>() {
            return None;
        }

        // SAFETY: Caller guarantees the memory contains valid code
        let ptr = self.ptr.as_ptr();
        Some(unsafe { std::mem::transmute_copy(&ptr) })
    }
}

impl Drop for ExecutableMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
        }
    }
}

// The mapping is owned and only mutated through &mut before the
// protection flip, so sharing the executable block is safe.
unsafe impl Send for ExecutableMemory {}
unsafe impl Sync for ExecutableMemory {}
