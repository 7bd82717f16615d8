//! Stack-frame model.
//!
//! Every frame variant stores a [`FrameType`] tag one word below the
//! stack-pointer value the walker holds for it; that tag is the only way
//! the unwinder identifies the frame's shape. Layouts are `#[repr(C)]`
//! and their byte offsets are ABI, consumed both by the stack walker and
//! by generated trampoline code.

pub mod walker;

pub use walker::FrameWalker;

use crate::runtime::value::TaggedValue;

/// Discriminant tag written at a fixed offset below every frame pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum FrameType {
    Optimized = 0,
    OptimizedEntry = 1,
    OptimizedJsFunction = 2,
    Leave = 3,
    LeaveWithArgv = 4,
    Interpreter = 5,
    AsmInterpreter = 6,
    InterpreterConstructor = 7,
    Builtin = 8,
    BuiltinWithArgv = 9,
    BuiltinEntry = 10,
    InterpreterFastNew = 11,
    InterpreterEntry = 12,
    AsmInterpreterEntry = 13,
    AsmInterpreterBridge = 14,
    OptimizedJsFunctionArgsConfig = 15,
}

impl FrameType {
    /// Decode a raw tag word. Unknown tags are not representable; the
    /// walker treats them as fatal.
    pub fn from_raw(raw: u64) -> Option<FrameType> {
        Some(match raw {
            0 => FrameType::Optimized,
            1 => FrameType::OptimizedEntry,
            2 => FrameType::OptimizedJsFunction,
            3 => FrameType::Leave,
            4 => FrameType::LeaveWithArgv,
            5 => FrameType::Interpreter,
            6 => FrameType::AsmInterpreter,
            7 => FrameType::InterpreterConstructor,
            8 => FrameType::Builtin,
            9 => FrameType::BuiltinWithArgv,
            10 => FrameType::BuiltinEntry,
            11 => FrameType::InterpreterFastNew,
            12 => FrameType::InterpreterEntry,
            13 => FrameType::AsmInterpreterEntry,
            14 => FrameType::AsmInterpreterBridge,
            15 => FrameType::OptimizedJsFunctionArgsConfig,
            _ => return None,
        })
    }

    /// Interpreter-family frames share the interpreted-frame base layout.
    pub fn is_interpreted(self) -> bool {
        (self as u64) >= FrameType::Interpreter as u64
            && (self as u64) <= FrameType::InterpreterFastNew as u64
    }
}

/// Shared tail of every interpreter-family frame: previous stack pointer
/// then the type tag (the tag word the walker reads lives here).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InterpretedFrameBase {
    pub prev: u64,
    pub frame_type: u64,
}

/// The full interpreter frame, laid out below its stack pointer.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InterpretedFrame {
    pub constpool: TaggedValue,
    pub function: TaggedValue,
    pub profile_type_info: TaggedValue,
    pub acc: TaggedValue,
    pub env: TaggedValue,
    pub pc: u64,
    pub base: InterpretedFrameBase,
}

/// The hand-assembled interpreter's frame, written by the dispatch
/// trampolines.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AsmInterpretedFrame {
    pub function: TaggedValue,
    pub acc: TaggedValue,
    pub env: TaggedValue,
    /// Bytes the resume path must skip past the calling bytecode.
    pub call_size: u64,
    /// Machine stack pointer to restore when this frame pops.
    pub fp: u64,
    pub pc: u64,
    pub base: InterpretedFrameBase,
}

impl AsmInterpretedFrame {
    pub const FUNCTION_OFFSET: i32 = core::mem::offset_of!(AsmInterpretedFrame, function) as i32;
    pub const ACC_OFFSET: i32 = core::mem::offset_of!(AsmInterpretedFrame, acc) as i32;
    pub const ENV_OFFSET: i32 = core::mem::offset_of!(AsmInterpretedFrame, env) as i32;
    pub const CALL_SIZE_OFFSET: i32 = core::mem::offset_of!(AsmInterpretedFrame, call_size) as i32;
    pub const FP_OFFSET: i32 = core::mem::offset_of!(AsmInterpretedFrame, fp) as i32;
    pub const PC_OFFSET: i32 = core::mem::offset_of!(AsmInterpretedFrame, pc) as i32;
    pub const BASE_OFFSET: i32 = core::mem::offset_of!(AsmInterpretedFrame, base) as i32;
    pub const SIZE: usize = core::mem::size_of::<AsmInterpretedFrame>();
}

/// Entry frame for interpreter re-entry from native code.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InterpretedEntryFrame {
    pub pc: u64,
    pub base: InterpretedFrameBase,
}

/// Compiled-code frame: tag, previous frame pointer, return address.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct OptimizedFrame {
    pub frame_type: u64,
    pub prev_fp: u64,
    pub return_addr: u64,
}

/// Entry frame for calls from native code into compiled code. The
/// previous-leave-frame slot is what the walker follows.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct OptimizedEntryFrame {
    pub pre_leave_frame_fp: u64,
    pub frame_type: u64,
    pub prev_fp: u64,
}

/// Compiled JS-function frame (argc/argv pushed above it).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct OptimizedJsFunctionFrame {
    pub frame_type: u64,
    pub prev_fp: u64,
    pub return_addr: u64,
}

/// Argument-adaptation frame pushed by the arity adapter.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct OptimizedArgsConfigFrame {
    pub frame_type: u64,
    pub prev_fp: u64,
}

/// Frame marking a call out of compiled code into the runtime.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct OptimizedLeaveFrame {
    pub frame_type: u64,
    pub callsite_fp: u64,
    pub return_addr: u64,
    pub arg_runtime_id: u64,
    pub argc: u64,
    // argv[0..argc] follows
}

impl OptimizedLeaveFrame {
    /// Offset from the frame base to the caller's call-site stack pointer.
    pub const CALL_SITE_SP_TO_FP: u64 =
        core::mem::offset_of!(OptimizedLeaveFrame, arg_runtime_id) as u64;
}

/// Frame for calls into native built-ins.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BuiltinFrame {
    pub frame_type: u64,
    pub prev_fp: u64,
    pub return_addr: u64,
    pub native_code: u64,
    pub num_args: u64,
    pub stack_args: u64,
}

impl BuiltinFrame {
    pub const CALL_SITE_SP_TO_FP: u64 = core::mem::offset_of!(BuiltinFrame, native_code) as u64;
}
