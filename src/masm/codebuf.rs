//! Code buffer for building machine code.
//!
//! A plain growable byte vector with little-endian emit and patch
//! primitives. Branch bookkeeping lives in [`crate::masm::Label`]; the
//! buffer only knows how to append and overwrite bytes.

#[cfg(feature = "jit")]
use super::memory::{ExecutableMemory, MemoryError};

/// A buffer for building machine code.
pub struct CodeBuffer {
    code: Vec<u8>,
}

impl CodeBuffer {
    /// Create a new empty code buffer.
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    /// Create a new code buffer with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            code: Vec::with_capacity(capacity),
        }
    }

    /// Get the current size of the code.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Get the current offset (the position the next byte lands at).
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Emit a single byte.
    pub fn emit_u8(&mut self, byte: u8) {
        self.code.push(byte);
    }

    /// Emit a 16-bit value (little-endian).
    pub fn emit_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 32-bit value (little-endian).
    pub fn emit_u32(&mut self, value: u32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit value (little-endian).
    pub fn emit_u64(&mut self, value: u64) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit multiple bytes.
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    /// Overwrite the byte at `pos`.
    pub fn put_u8(&mut self, pos: usize, byte: u8) {
        self.code[pos] = byte;
    }

    /// Overwrite the 32-bit value at `pos` (little-endian).
    pub fn put_u32(&mut self, pos: usize, value: u32) {
        self.code[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Read back the byte at `pos`.
    pub fn get_u8(&self, pos: usize) -> u8 {
        self.code[pos]
    }

    /// Read back the 32-bit value at `pos` (little-endian).
    pub fn get_u32(&self, pos: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.code[pos..pos + 4]);
        u32::from_le_bytes(bytes)
    }

    /// Pad with `fill` bytes up to the given power-of-two boundary.
    pub fn align(&mut self, alignment: usize, fill: u8) {
        debug_assert!(alignment.is_power_of_two());
        let current = self.code.len();
        let aligned = (current + alignment - 1) & !(alignment - 1);
        for _ in current..aligned {
            self.emit_u8(fill);
        }
    }

    /// Finalize the buffer and copy it to executable memory.
    #[cfg(feature = "jit")]
    pub fn finalize(self) -> Result<ExecutableMemory, MemoryError> {
        let mut mem = ExecutableMemory::new(self.code.len())?;
        mem.write(0, &self.code)?;
        mem.make_executable()?;
        Ok(mem)
    }

    /// Get the code bytes (for inspection).
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Consume the buffer and return the raw code bytes.
    pub fn into_code(self) -> Vec<u8> {
        self.code
    }
}

impl Default for CodeBuffer {
    fn default() -> Self {
        Self::new()
    }
}
