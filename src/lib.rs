//! Kestrel - the machine-code emission and calling-convention layer of a
//! dynamic-language VM.
//!
//! The crate covers the path between "the compiler decided what to emit"
//! and "the CPU is executing it": instruction encoders for a fixed-width
//! and a variable-length ISA, label/branch patching, the hand-assembled
//! trampolines that move control between native code, compiled code and
//! the interpreter, the stack-frame model those trampolines maintain,
//! and the deoptimizer that rebuilds interpreter state from an optimized
//! frame.

pub mod bits;
pub mod config;
pub mod deopt;
pub mod frames;
pub mod masm;
pub mod runtime;
pub mod trampoline;

// Re-export commonly used types
pub use config::{CodegenConfig, TargetArch};
pub use masm::codebuf::CodeBuffer;
pub use runtime::{CallSignature, SignatureRegistry, TaggedValue, VmThread};
pub use trampoline::{RuntimeStubId, StubSet};
