//! Frame-by-frame stack walker for unwinding, exception propagation, and
//! root enumeration.

use super::{BuiltinFrame, FrameType, OptimizedLeaveFrame};

/// A frame chain with a corrupted or unimplemented tag cannot be
/// continued safely; give a diagnostic and abort without unwinding.
fn fatal(msg: &str) -> ! {
    eprintln!("stack walker: {msg}");
    std::process::abort();
}

/// Walks a chain of frames starting from a stack-pointer snapshot.
///
/// For every frame the walker holds the address the owning code published
/// as that frame's stack pointer; the frame-type tag sits one word below
/// it and each layout's previous-frame field at a type-specific offset.
pub struct FrameWalker {
    current: *const u64,
}

impl FrameWalker {
    /// # Safety
    /// `sp` must point into a well-formed frame chain: every frame tagged
    /// with a valid [`FrameType`] and every previous-frame field either
    /// null or pointing at another such frame.
    pub unsafe fn new(sp: *const u64) -> Self {
        Self { current: sp }
    }

    pub fn done(&self) -> bool {
        self.current.is_null()
    }

    pub fn sp(&self) -> *const u64 {
        self.current
    }

    /// The current frame's tag. An unrecognized tag word is fatal.
    pub fn frame_type(&self) -> FrameType {
        debug_assert!(!self.done());
        let raw = unsafe { *self.current.sub(1) };
        match FrameType::from_raw(raw) {
            Some(ty) => ty,
            None => fatal(&format!("unknown frame type tag {raw:#x}")),
        }
    }

    /// Advance to the previous frame. The previous-frame field's position
    /// depends on the frame shape, so dispatch is a closed match over the
    /// tag.
    pub fn advance(&mut self) {
        debug_assert!(!self.done());
        let prev = unsafe {
            match self.frame_type() {
                // Tag directly below sp, previous-frame word at sp.
                FrameType::Optimized
                | FrameType::OptimizedJsFunction
                | FrameType::OptimizedJsFunctionArgsConfig
                | FrameType::Leave
                | FrameType::LeaveWithArgv
                | FrameType::Builtin
                | FrameType::BuiltinWithArgv
                | FrameType::BuiltinEntry => *self.current,
                // Entry frames chain through the slot two words below sp
                // (the saved previous-leave-frame pointer).
                FrameType::OptimizedEntry => *self.current.sub(2),
                // Interpreter-family frames end in the shared base; its
                // prev field sits two words below sp.
                FrameType::Interpreter
                | FrameType::AsmInterpreter
                | FrameType::InterpreterConstructor
                | FrameType::InterpreterFastNew
                | FrameType::InterpreterEntry
                | FrameType::AsmInterpreterEntry
                | FrameType::AsmInterpreterBridge => *self.current.sub(2),
            }
        };
        self.current = prev as *const u64;
    }

    /// The call-site stack pointer of the frame that called out of
    /// compiled code, available only on leave/builtin/bridge frames.
    /// Other frame types never carry one and return zero.
    pub fn prev_frame_call_site_sp(&self) -> u64 {
        debug_assert!(!self.done());
        let sp = self.current as u64;
        match self.frame_type() {
            FrameType::Leave | FrameType::LeaveWithArgv => {
                // Frame base is one word below sp.
                sp - 8 + OptimizedLeaveFrame::CALL_SITE_SP_TO_FP
            }
            FrameType::Builtin => sp - 8 + BuiltinFrame::CALL_SITE_SP_TO_FP,
            FrameType::BuiltinWithArgv => {
                // Call-site sp is just past the three fixed words.
                sp - 8 + 24
            }
            FrameType::AsmInterpreterBridge => {
                // Frame base is three words below sp; call-site sp is
                // past the four-word frame.
                sp - 24 + 32
            }
            _ => 0,
        }
    }
}
