//! End-to-end exercises of the installed x86-64 trampolines: generate the
//! stub set, publish it through a thread's dispatch tables, and drive the
//! call paths with real compiled callees and fake heap objects.
#![cfg(all(feature = "jit", target_arch = "x86_64"))]

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};

use kestrel::config::{CodegenConfig, TargetArch};
use kestrel::masm::codebuf::CodeBuffer;
use kestrel::masm::memory::ExecutableMemory;
use kestrel::masm::x86_64::{Operand, Reg, X86_64Assembler};
use kestrel::runtime::layout::{hclass, method};
use kestrel::runtime::thread::VmThread;
use kestrel::runtime::value::TaggedValue;
use kestrel::trampoline::{InstalledStubs, RuntimeFnId, RuntimeStubId, StubSet};

type EntryFn = extern "C" fn(u64, u64, u64, u64, *const u64, usize) -> u64;
type OptCallOptFn = extern "C" fn(u64, u64, u64, usize, *const u64) -> u64;
type CallWithArgvFn = extern "C" fn(u64, u64, *const u64) -> u64;

fn compile(emit: impl FnOnce(&mut X86_64Assembler)) -> ExecutableMemory {
    let mut buf = CodeBuffer::new();
    let mut asm = X86_64Assembler::new(&mut buf);
    emit(&mut asm);
    buf.finalize().unwrap()
}

fn install(thread: &mut VmThread) -> InstalledStubs {
    let set = StubSet::generate(TargetArch::X86_64, &CodegenConfig::default());
    InstalledStubs::install(&set, thread).unwrap()
}

fn stub<F: Copy>(installed: &InstalledStubs, id: RuntimeStubId) -> F {
    let addr = installed.entry_address(id).unwrap();
    unsafe { mem::transmute_copy(&addr) }
}

#[test]
fn test_entry_runs_compiled_code_and_restores_leave_frame() {
    let mut thread = Box::new(VmThread::new());
    let installed = install(&mut thread);

    // The callee sees [retAddr][argc][args...] and returns its argc slot.
    let callee = compile(|asm| {
        asm.mov_rm(Reg::Rax, Operand::base_disp(Reg::Rsp, 8));
        asm.ret();
    });

    let entry: EntryFn = stub(&installed, RuntimeStubId::JsFunctionEntry);
    let glue = &mut *thread as *mut VmThread as u64;
    let args = [
        TaggedValue::from_int(1).raw(),
        TaggedValue::from_int(2).raw(),
        TaggedValue::from_int(3).raw(),
    ];
    let ret = entry(glue, 0x5150, 3, 3, args.as_ptr(), callee.as_ptr() as usize);
    assert_eq!(ret, 3);
    assert_eq!(thread.leave_frame(), 0x5150);
}

#[test]
fn test_optimized_call_pads_missing_arguments() {
    let mut thread = Box::new(VmThread::new());
    let installed = install(&mut thread);

    // First argument slot sits above [retAddr][argc].
    let callee = compile(|asm| {
        asm.mov_rm(Reg::Rax, Operand::base_disp(Reg::Rsp, 16));
        asm.ret();
    });

    let oco: OptCallOptFn = stub(&installed, RuntimeStubId::OptimizedCallOptimized);
    let glue = &mut *thread as *mut VmThread as u64;
    let argv = [TaggedValue::from_int(7).raw(), TaggedValue::from_int(8).raw()];
    let ret = oco(glue, 4, 2, callee.as_ptr() as usize, argv.as_ptr());
    assert_eq!(ret, TaggedValue::from_int(7).raw());
}

#[test]
fn test_js_call_dispatches_compiled_function_object() {
    let mut thread = Box::new(VmThread::new());
    let installed = install(&mut thread);

    // Compiled JS code is entered with [retAddr][argc][target][newTarget]
    // [this][args...]; this body returns `this`.
    let code = compile(|asm| {
        asm.mov_rm(Reg::Rax, Operand::base_disp(Reg::Rsp, 32));
        asm.ret();
    });

    let hclass_words = [
        0u64,
        (1u64 << hclass::CALLABLE_BIT) | hclass::JS_FUNCTION_FIRST as u64,
    ];
    let mut method_words = [0u64; 5];
    method_words[(method::CALL_FIELD_OFFSET / 8) as usize] =
        method::pack(0, 0, true, false, false, false, false, true);
    let mut func = [0u64; 7];
    func[0] = hclass_words.as_ptr() as u64;
    func[4] = method_words.as_ptr() as u64;
    func[5] = code.as_ptr() as u64;

    let this = TaggedValue::from_int(55);
    let argv = [
        func.as_ptr() as u64,
        TaggedValue::VALUE_UNDEFINED,
        this.raw(),
    ];
    let call: CallWithArgvFn = stub(&installed, RuntimeStubId::JsCallWithArgv);
    let glue = &mut *thread as *mut VmThread as u64;
    let ret = call(glue, argv.len() as u64, argv.as_ptr());
    assert_eq!(TaggedValue(ret), this);
}

static THROWN_ARGC: AtomicU64 = AtomicU64::new(0);
static THROWN_MESSAGE: AtomicU64 = AtomicU64::new(0);

extern "C" fn throw_type_error(_glue: u64, argc: u64, args: *const u64) -> u64 {
    THROWN_ARGC.store(argc, Ordering::SeqCst);
    THROWN_MESSAGE.store(unsafe { *args }, Ordering::SeqCst);
    TaggedValue::VALUE_UNDEFINED
}

#[test]
fn test_js_call_rejects_non_callable() {
    let mut thread = Box::new(VmThread::new());
    let installed = install(&mut thread);
    thread.set_runtime_function(RuntimeFnId::ThrowTypeError as usize, throw_type_error as usize);

    let argv = [
        TaggedValue::from_int(3).raw(), // boxed int, never callable
        TaggedValue::VALUE_UNDEFINED,
        TaggedValue::VALUE_UNDEFINED,
    ];
    let call: CallWithArgvFn = stub(&installed, RuntimeStubId::JsCallWithArgv);
    let glue = &mut *thread as *mut VmThread as u64;
    let ret = call(glue, argv.len() as u64, argv.as_ptr());
    assert_eq!(ret, TaggedValue::VALUE_EXCEPTION);
    assert_eq!(THROWN_ARGC.load(Ordering::SeqCst), 1);
    assert_eq!(
        THROWN_MESSAGE.load(Ordering::SeqCst),
        TaggedValue::from_int(1).raw()
    );
}
