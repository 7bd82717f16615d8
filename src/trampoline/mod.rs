//! Hand-assembled trampolines bridging calling conventions.
//!
//! The x86-64 set carries the optimized-code call path (runtime calls,
//! JS call classification, arity adaptation, native calls); the AArch64
//! set carries the bytecode-dispatch entry and the deopt/exception resume
//! path. Every stub has a dense [`RuntimeStubId`]; generation emits all
//! of an ISA's stubs into one buffer and records each body's offset, and
//! installation copies the buffer into executable memory and publishes
//! the entry addresses through the per-thread common-stub table.

pub mod aarch64;
pub mod x86_64;

use crate::config::{CodegenConfig, TargetArch};
use crate::masm::codebuf::CodeBuffer;
#[cfg(feature = "jit")]
use crate::masm::memory::{ExecutableMemory, MemoryError};
use crate::runtime::signature::{
    CallConv, CallSignature, SignatureRegistry, TargetKind, VarType,
};
#[cfg(feature = "jit")]
use crate::runtime::thread::VmThread;

/// Dense IDs of the C runtime functions trampolines call through the
/// per-thread runtime-function table. Populated by the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RuntimeFnId {
    ThrowTypeError = 0,
}

/// Dense IDs of compiler-generated common stubs the trampolines jump
/// through. Populated by the embedder; only the proxy call trap is
/// referenced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommonStubId {
    JsProxyCallInternal = 0,
}

/// Common-stub-table index the trampoline entries are published from.
/// Indices below this belong to compiler-generated stubs.
pub const TRAMPOLINE_STUB_BASE: usize = 8;

/// Dense IDs of the hand-assembled trampolines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RuntimeStubId {
    CallRuntime = 0,
    CallRuntimeWithArgv,
    JsFunctionEntry,
    OptimizedCallOptimized,
    JsCall,
    JsCallWithArgv,
    CallNative,
    PushCallArgsAndDispatch,
    ResumeRspAndDispatch,
    ResumeRspAndReturn,
    ResumeCaughtFrameAndDispatch,
    ResumeUncaughtFrameAndReturn,
}

impl RuntimeStubId {
    pub const ALL: [RuntimeStubId; 12] = [
        RuntimeStubId::CallRuntime,
        RuntimeStubId::CallRuntimeWithArgv,
        RuntimeStubId::JsFunctionEntry,
        RuntimeStubId::OptimizedCallOptimized,
        RuntimeStubId::JsCall,
        RuntimeStubId::JsCallWithArgv,
        RuntimeStubId::CallNative,
        RuntimeStubId::PushCallArgsAndDispatch,
        RuntimeStubId::ResumeRspAndDispatch,
        RuntimeStubId::ResumeRspAndReturn,
        RuntimeStubId::ResumeCaughtFrameAndDispatch,
        RuntimeStubId::ResumeUncaughtFrameAndReturn,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RuntimeStubId::CallRuntime => "CallRuntime",
            RuntimeStubId::CallRuntimeWithArgv => "CallRuntimeWithArgv",
            RuntimeStubId::JsFunctionEntry => "JSFunctionEntry",
            RuntimeStubId::OptimizedCallOptimized => "OptimizedCallOptimized",
            RuntimeStubId::JsCall => "JSCall",
            RuntimeStubId::JsCallWithArgv => "JSCallWithArgV",
            RuntimeStubId::CallNative => "CallNativeTrampoline",
            RuntimeStubId::PushCallArgsAndDispatch => "PushCallArgsAndDispatch",
            RuntimeStubId::ResumeRspAndDispatch => "ResumeRspAndDispatch",
            RuntimeStubId::ResumeRspAndReturn => "ResumeRspAndReturn",
            RuntimeStubId::ResumeCaughtFrameAndDispatch => "ResumeCaughtFrameAndDispatch",
            RuntimeStubId::ResumeUncaughtFrameAndReturn => "ResumeUncaughtFrameAndReturn",
        }
    }

    /// The stubs each ISA's generator emits.
    pub fn for_arch(arch: TargetArch) -> &'static [RuntimeStubId] {
        match arch {
            TargetArch::X86_64 => &[
                RuntimeStubId::CallRuntime,
                RuntimeStubId::CallRuntimeWithArgv,
                RuntimeStubId::JsFunctionEntry,
                RuntimeStubId::OptimizedCallOptimized,
                RuntimeStubId::JsCall,
                RuntimeStubId::JsCallWithArgv,
                RuntimeStubId::CallNative,
            ],
            TargetArch::Aarch64 => &[
                RuntimeStubId::PushCallArgsAndDispatch,
                RuntimeStubId::ResumeRspAndDispatch,
                RuntimeStubId::ResumeRspAndReturn,
                RuntimeStubId::ResumeCaughtFrameAndDispatch,
                RuntimeStubId::ResumeUncaughtFrameAndReturn,
            ],
        }
    }
}

/// One generated stub body inside a [`StubSet`] buffer.
#[derive(Debug, Clone, Copy)]
pub struct StubEntry {
    pub id: RuntimeStubId,
    pub offset: usize,
    pub size: usize,
}

/// All of one ISA's trampolines in a single code buffer.
pub struct StubSet {
    arch: TargetArch,
    code: Vec<u8>,
    entries: Vec<StubEntry>,
}

impl StubSet {
    /// Emit every stub for `arch`, 16-byte aligned, recording entries at
    /// their bind offsets.
    pub fn generate(arch: TargetArch, config: &CodegenConfig) -> StubSet {
        let mut buf = CodeBuffer::with_capacity(4096);
        let mut entries = Vec::new();

        for &id in RuntimeStubId::for_arch(arch) {
            buf.align(16, fill_byte(arch));
            let offset = buf.offset();
            emit_stub(arch, id, &mut buf);
            let size = buf.offset() - offset;
            if config.trace_stubs {
                eprintln!("[stubs] {} {}: offset={offset:#x} size={size}", arch, id.name());
            }
            entries.push(StubEntry { id, offset, size });
        }

        StubSet {
            arch,
            code: buf.into_code(),
            entries,
        }
    }

    pub fn arch(&self) -> TargetArch {
        self.arch
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn entries(&self) -> &[StubEntry] {
        &self.entries
    }

    pub fn entry(&self, id: RuntimeStubId) -> Option<&StubEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn stub_code(&self, id: RuntimeStubId) -> Option<&[u8]> {
        self.entry(id)
            .map(|e| &self.code[e.offset..e.offset + e.size])
    }
}

fn fill_byte(arch: TargetArch) -> u8 {
    match arch {
        // NOP on x86-64; zero words between AArch64 stubs are never
        // executed.
        TargetArch::X86_64 => 0x90,
        TargetArch::Aarch64 => 0x00,
    }
}

fn emit_stub(arch: TargetArch, id: RuntimeStubId, buf: &mut CodeBuffer) {
    match arch {
        TargetArch::X86_64 => match id {
            RuntimeStubId::CallRuntime => x86_64::call_runtime(buf),
            RuntimeStubId::CallRuntimeWithArgv => x86_64::call_runtime_with_argv(buf),
            RuntimeStubId::JsFunctionEntry => x86_64::js_function_entry(buf),
            RuntimeStubId::OptimizedCallOptimized => x86_64::optimized_call_optimized(buf),
            RuntimeStubId::JsCall => x86_64::js_call(buf),
            RuntimeStubId::JsCallWithArgv => x86_64::js_call_with_argv(buf),
            RuntimeStubId::CallNative => x86_64::call_native(buf),
            other => panic!("{} is not an x86-64 stub", other.name()),
        },
        TargetArch::Aarch64 => match id {
            RuntimeStubId::PushCallArgsAndDispatch => aarch64::push_call_args_and_dispatch(buf),
            RuntimeStubId::ResumeRspAndDispatch => aarch64::resume_rsp_and_dispatch(buf),
            RuntimeStubId::ResumeRspAndReturn => aarch64::resume_rsp_and_return(buf),
            RuntimeStubId::ResumeCaughtFrameAndDispatch => {
                aarch64::resume_caught_frame_and_dispatch(buf)
            }
            RuntimeStubId::ResumeUncaughtFrameAndReturn => {
                aarch64::resume_uncaught_frame_and_return(buf)
            }
            other => panic!("{} is not an AArch64 stub", other.name()),
        },
    }
}

/// Register every trampoline's ABI contract, in dense-ID order.
pub fn register_signatures(registry: &mut SignatureRegistry) {
    use VarType::*;

    let sigs: [CallSignature; 12] = [
        CallSignature::new("CallRuntime", &[NativePointer, Int64, NativePointer], Tagged)
            .with_target_kind(TargetKind::RuntimeStubVarargs)
            .variadic(),
        CallSignature::new(
            "CallRuntimeWithArgv",
            &[NativePointer, Int64, Int64, NativePointer],
            Tagged,
        )
        .with_target_kind(TargetKind::RuntimeStub),
        CallSignature::new(
            "JSFunctionEntry",
            &[NativePointer, NativePointer, Int32, Int32, NativePointer, NativePointer],
            Tagged,
        )
        .with_target_kind(TargetKind::RuntimeStub),
        CallSignature::new(
            "OptimizedCallOptimized",
            &[NativePointer, Int32, Int32, NativePointer, NativePointer],
            Tagged,
        )
        .with_target_kind(TargetKind::RuntimeStub),
        CallSignature::new("JSCall", &[NativePointer, Int32, Tagged, Tagged, Tagged], Tagged)
            .with_target_kind(TargetKind::RuntimeStub)
            .with_call_conv(CallConv::WebKitJs)
            .variadic(),
        CallSignature::new(
            "JSCallWithArgV",
            &[NativePointer, Int32, Tagged, NativePointer],
            Tagged,
        )
        .with_target_kind(TargetKind::RuntimeStub),
        CallSignature::new("CallNativeTrampoline", &[NativePointer, NativePointer, Int32], Tagged)
            .with_target_kind(TargetKind::RuntimeStub)
            .with_call_conv(CallConv::WebKitJs)
            .variadic(),
        CallSignature::new("PushCallArgsAndDispatch", &[NativePointer, Tagged, Int64, Int64], Void)
            .with_target_kind(TargetKind::RuntimeStub)
            .with_call_conv(CallConv::Ghc)
            .variadic(),
        CallSignature::new("ResumeRspAndDispatch", &[NativePointer, NativePointer], Void)
            .with_target_kind(TargetKind::RuntimeStub)
            .with_call_conv(CallConv::Ghc),
        CallSignature::new("ResumeRspAndReturn", &[NativePointer], Tagged)
            .with_target_kind(TargetKind::RuntimeStub)
            .with_call_conv(CallConv::Ghc),
        CallSignature::new("ResumeCaughtFrameAndDispatch", &[NativePointer, NativePointer], Void)
            .with_target_kind(TargetKind::RuntimeStub)
            .with_call_conv(CallConv::Ghc),
        CallSignature::new("ResumeUncaughtFrameAndReturn", &[NativePointer], Tagged)
            .with_target_kind(TargetKind::RuntimeStub)
            .with_call_conv(CallConv::Ghc),
    ];

    for (stub, sig) in RuntimeStubId::ALL.iter().zip(sigs) {
        let id = registry.register_stub(sig);
        assert_eq!(id, *stub as usize, "stub ids must stay dense");
    }
}

/// Trampolines installed into executable memory.
#[cfg(feature = "jit")]
pub struct InstalledStubs {
    memory: ExecutableMemory,
    entries: Vec<StubEntry>,
}

#[cfg(feature = "jit")]
impl InstalledStubs {
    /// Copy the stub set into executable memory and publish every entry
    /// address through the thread's common-stub table.
    pub fn install(set: &StubSet, thread: &mut VmThread) -> Result<Self, MemoryError> {
        let memory = ExecutableMemory::install(set.code())?;
        let base = memory.as_ptr() as usize;
        for entry in set.entries() {
            thread.set_common_stub(TRAMPOLINE_STUB_BASE + entry.id as usize, base + entry.offset);
        }
        Ok(Self {
            memory,
            entries: set.entries().to_vec(),
        })
    }

    pub fn entry_address(&self, id: RuntimeStubId) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| self.memory.as_ptr() as usize + e.offset)
    }
}
