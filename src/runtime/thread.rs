//! The per-thread "glue" area emitted code addresses relative to a single
//! base register.
//!
//! All three dispatch tables (runtime functions, common stubs, bytecode
//! handlers) are dense arrays indexed by the IDs the signature registry
//! hands out; the byte offsets below are baked into generated stubs, so
//! the struct layout is part of the ABI and must stay `#[repr(C)]`.

use super::value::TaggedValue;

pub const MAX_RUNTIME_FUNCTIONS: usize = 64;
pub const MAX_COMMON_STUBS: usize = 32;
pub const MAX_BYTECODE_HANDLERS: usize = 256;

/// Per-VM-thread state shared with generated code. Populated once at
/// bring-up; the tables are read-only afterward, the frame and exception
/// slots are written by trampolines around calls.
#[repr(C)]
pub struct VmThread {
    rt_fn_entries: [usize; MAX_RUNTIME_FUNCTIONS],
    co_stub_entries: [usize; MAX_COMMON_STUBS],
    bc_stub_entries: [usize; MAX_BYTECODE_HANDLERS],
    current_frame: u64,
    leave_frame: u64,
    exception: TaggedValue,
}

impl VmThread {
    /// Byte offset of the runtime-function table from the glue base.
    pub const RT_FN_ENTRIES_OFFSET: i32 =
        core::mem::offset_of!(VmThread, rt_fn_entries) as i32;
    /// Byte offset of the common-stub table.
    pub const CO_STUB_ENTRIES_OFFSET: i32 =
        core::mem::offset_of!(VmThread, co_stub_entries) as i32;
    /// Byte offset of the bytecode-handler table.
    pub const BC_STUB_ENTRIES_OFFSET: i32 =
        core::mem::offset_of!(VmThread, bc_stub_entries) as i32;
    /// Byte offset of the current-frame stack-pointer slot.
    pub const CURRENT_FRAME_OFFSET: i32 =
        core::mem::offset_of!(VmThread, current_frame) as i32;
    /// Byte offset of the last-leave-frame slot.
    pub const LEAVE_FRAME_OFFSET: i32 = core::mem::offset_of!(VmThread, leave_frame) as i32;
    /// Byte offset of the pending-exception slot.
    pub const EXCEPTION_OFFSET: i32 = core::mem::offset_of!(VmThread, exception) as i32;

    pub fn new() -> Self {
        Self {
            rt_fn_entries: [0; MAX_RUNTIME_FUNCTIONS],
            co_stub_entries: [0; MAX_COMMON_STUBS],
            bc_stub_entries: [0; MAX_BYTECODE_HANDLERS],
            current_frame: 0,
            leave_frame: 0,
            exception: TaggedValue::hole(),
        }
    }

    pub fn set_runtime_function(&mut self, id: usize, addr: usize) {
        assert!(id < MAX_RUNTIME_FUNCTIONS, "runtime function id out of range");
        self.rt_fn_entries[id] = addr;
    }

    pub fn runtime_function(&self, id: usize) -> usize {
        self.rt_fn_entries[id]
    }

    pub fn set_common_stub(&mut self, id: usize, addr: usize) {
        assert!(id < MAX_COMMON_STUBS, "common stub id out of range");
        self.co_stub_entries[id] = addr;
    }

    pub fn common_stub(&self, id: usize) -> usize {
        self.co_stub_entries[id]
    }

    pub fn set_bytecode_handler(&mut self, id: usize, addr: usize) {
        assert!(id < MAX_BYTECODE_HANDLERS, "bytecode handler id out of range");
        self.bc_stub_entries[id] = addr;
    }

    pub fn bytecode_handler(&self, id: usize) -> usize {
        self.bc_stub_entries[id]
    }

    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn set_current_frame(&mut self, sp: u64) {
        self.current_frame = sp;
    }

    pub fn leave_frame(&self) -> u64 {
        self.leave_frame
    }

    pub fn set_leave_frame(&mut self, fp: u64) {
        self.leave_frame = fp;
    }

    pub fn exception(&self) -> TaggedValue {
        self.exception
    }

    pub fn set_exception(&mut self, value: TaggedValue) {
        self.exception = value;
    }

    pub fn clear_exception(&mut self) {
        self.exception = TaggedValue::hole();
    }

    pub fn has_pending_exception(&self) -> bool {
        !self.exception.is_hole()
    }
}

impl Default for VmThread {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_offsets_are_distinct_and_ordered() {
        assert_eq!(VmThread::RT_FN_ENTRIES_OFFSET, 0);
        assert_eq!(
            VmThread::CO_STUB_ENTRIES_OFFSET,
            (MAX_RUNTIME_FUNCTIONS * 8) as i32
        );
        assert_eq!(
            VmThread::BC_STUB_ENTRIES_OFFSET,
            ((MAX_RUNTIME_FUNCTIONS + MAX_COMMON_STUBS) * 8) as i32
        );
        assert!(VmThread::CURRENT_FRAME_OFFSET < VmThread::LEAVE_FRAME_OFFSET);
        assert!(VmThread::LEAVE_FRAME_OFFSET < VmThread::EXCEPTION_OFFSET);
    }

    #[test]
    fn test_dispatch_tables() {
        let mut thread = VmThread::new();
        thread.set_runtime_function(3, 0x1000);
        thread.set_common_stub(1, 0x2000);
        thread.set_bytecode_handler(0x42, 0x3000);
        assert_eq!(thread.runtime_function(3), 0x1000);
        assert_eq!(thread.common_stub(1), 0x2000);
        assert_eq!(thread.bytecode_handler(0x42), 0x3000);
    }

    #[test]
    fn test_exception_slot() {
        let mut thread = VmThread::new();
        assert!(!thread.has_pending_exception());
        thread.set_exception(TaggedValue::exception());
        assert!(thread.has_pending_exception());
        thread.clear_exception();
        assert!(!thread.has_pending_exception());
    }

    #[test]
    #[should_panic(expected = "runtime function id out of range")]
    fn test_table_bounds_checked() {
        let mut thread = VmThread::new();
        thread.set_runtime_function(MAX_RUNTIME_FUNCTIONS, 0x1000);
    }
}
