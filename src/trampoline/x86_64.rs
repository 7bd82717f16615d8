//! x86-64 trampolines for the optimized-code call path.
//!
//! Conventions in play:
//! - Runtime-call stubs use the argument-vector convention: glue arrives
//!   in RAX and everything else sits on the stack above the return
//!   address.
//! - `js_function_entry` and the argv variants take the platform C ABI
//!   (RDI, RSI, RDX, RCX, R8, R9).
//! - Compiled JS code is entered with glue in RAX and the stack laid out
//!   as `[argc][callTarget][newTarget][this][args...]`; the caller cleans
//!   up.
//!
//! Every stub keeps the frame-type tag one word below the frame pointer
//! it establishes, so the stack walker can identify the frame.

use crate::masm::codebuf::CodeBuffer;
use crate::masm::x86_64::{Cond, Distance, Operand, Reg, Scale, X86_64Assembler};
use crate::masm::Label;
use crate::runtime::layout::{bound_function, function, hclass, method, object, tagged_array};
use crate::runtime::thread::VmThread;
use crate::runtime::value::TaggedValue;

use super::{CommonStubId, RuntimeFnId, RuntimeStubId, TRAMPOLINE_STUB_BASE};

/// Call target, new target, and this precede the declared arguments.
const NUM_MANDATORY_ARGS: i32 = 3;

/// Message id handed to ThrowTypeError when the callee is not callable.
const NON_CALLABLE_MESSAGE_ID: i32 = 1;

// ==================== CallRuntime ====================

/// Glue in RAX; stack above the return address: `[rtId][argc][argv...]`.
/// Builds a leave frame, publishes it to the thread, and dispatches
/// through the runtime-function table as `fn(glue, argc, argv)`.
pub fn call_runtime(buf: &mut CodeBuffer) {
    let mut asm = X86_64Assembler::new(buf);

    asm.push(Reg::Rbp);
    asm.mov_rr(Reg::Rbp, Reg::Rsp);
    asm.mov_mr(
        Operand::base_disp(Reg::Rax, VmThread::LEAVE_FRAME_OFFSET),
        Reg::Rbp,
    );
    asm.push_imm(crate::frames::FrameType::Leave as i32);
    asm.push(Reg::R10);
    asm.push(Reg::Rdx);
    asm.push(Reg::Rax);

    // rtId lives two words above the saved frame pointer.
    asm.lea(Reg::Rdx, Operand::base_disp(Reg::Rbp, 16));
    asm.mov_rm(Reg::R10, Operand::base_disp(Reg::Rdx, 0));
    asm.mov_rm(
        Reg::R10,
        Operand::base_index_disp(
            Reg::Rax,
            Reg::R10,
            Scale::Times8,
            VmThread::RT_FN_ENTRIES_OFFSET,
        ),
    );
    asm.mov_rr(Reg::Rdi, Reg::Rax);
    asm.mov_rm(Reg::Rsi, Operand::base_disp(Reg::Rdx, 8));
    asm.lea(Reg::Rdx, Operand::base_disp(Reg::Rdx, 16));
    asm.call_r(Reg::R10);

    asm.add_ri(Reg::Rsp, 8);
    asm.pop(Reg::Rdx);
    asm.pop(Reg::R10);
    asm.add_ri(Reg::Rsp, 8);
    asm.pop(Reg::Rbp);
    asm.ret();
}

// ==================== CallRuntimeWithArgv ====================

/// C ABI: `(glue, rtId, argc, argv)`. Re-pushes the arguments into a
/// leave-frame-with-argv image so the walker sees them, then dispatches
/// through the runtime-function table.
pub fn call_runtime_with_argv(buf: &mut CodeBuffer) {
    let mut asm = X86_64Assembler::new(buf);

    asm.mov_rm(Reg::R11, Operand::base_disp(Reg::Rsp, 0));
    asm.push_imm(0); // keeps the callee 16-byte aligned
    asm.push(Reg::Rcx); // argv
    asm.push(Reg::Rdx); // argc
    asm.push(Reg::Rsi); // rtId
    asm.push(Reg::R11); // return address copy
    asm.push(Reg::Rbp);
    asm.mov_rr(Reg::Rbp, Reg::Rsp);
    asm.mov_mr(
        Operand::base_disp(Reg::Rdi, VmThread::LEAVE_FRAME_OFFSET),
        Reg::Rbp,
    );
    asm.push_imm(crate::frames::FrameType::LeaveWithArgv as i32);

    asm.mov_rm(
        Reg::R9,
        Operand::base_index_disp(
            Reg::Rdi,
            Reg::Rsi,
            Scale::Times8,
            VmThread::RT_FN_ENTRIES_OFFSET,
        ),
    );
    asm.mov_rr(Reg::Rsi, Reg::Rdx);
    asm.mov_rr(Reg::Rdx, Reg::Rcx);
    asm.call_r(Reg::R9);

    asm.add_ri(Reg::Rsp, 8);
    asm.pop(Reg::Rbp);
    asm.add_ri(Reg::Rsp, 40);
    asm.ret();
}

// ==================== JSFunctionEntry ====================

/// C ABI: `(glue, prevFp, expectedArgc, actualArgc, argv, codeAddr)`.
/// The bridge from native code into compiled JS: saves the C callee-saved
/// registers, builds an entry frame, pads or clamps the arguments to the
/// declared count, and calls the code entry. On return the previous
/// leave frame is restored into the thread.
pub fn js_function_entry(buf: &mut CodeBuffer) {
    let mut asm = X86_64Assembler::new(buf);

    asm.push(Reg::Rbx);
    asm.push(Reg::R12);
    asm.push(Reg::R13);
    asm.push(Reg::R14);
    asm.push(Reg::R15);
    asm.push(Reg::Rdi); // glue, reloaded at exit
    asm.push(Reg::Rbp);
    asm.mov_rr(Reg::Rbp, Reg::Rsp);
    asm.push_imm(crate::frames::FrameType::OptimizedEntry as i32);
    asm.push(Reg::Rsi); // prevFp

    asm.mov_rr(Reg::R14, Reg::Rdx);
    let mut aligned = Label::new();
    // expected+1 words follow; keep the callee 16-byte aligned.
    asm.testb_ri(Reg::R14, 1);
    asm.jcc(Cond::Ne, &mut aligned, Distance::Near);
    asm.push_imm(0);
    asm.bind(&mut aligned);

    emit_adapt_and_push_args(&mut asm, Reg::Rdx, Reg::Rcx, Reg::R8);

    asm.push(Reg::R14); // adapted argc
    asm.mov_rr(Reg::Rax, Reg::Rdi);
    asm.call_r(Reg::R9);

    // prevFp sits two words below the frame pointer.
    asm.mov_rm(Reg::Rdx, Operand::base_disp(Reg::Rbp, -16));
    asm.mov_rr(Reg::Rsp, Reg::Rbp);
    asm.pop(Reg::Rbp);
    asm.pop(Reg::Rdi);
    asm.mov_mr(
        Operand::base_disp(Reg::Rdi, VmThread::LEAVE_FRAME_OFFSET),
        Reg::Rdx,
    );
    asm.pop(Reg::R15);
    asm.pop(Reg::R14);
    asm.pop(Reg::R13);
    asm.pop(Reg::R12);
    asm.pop(Reg::Rbx);
    asm.ret();
}

/// Pad with undefined while expected exceeds actual, then push
/// `min(actual, expected)` arguments backwards so argument 0 ends up on
/// top. Clobbers RAX, RBX, R11; the argument registers survive.
fn emit_adapt_and_push_args(asm: &mut X86_64Assembler, expected: Reg, actual: Reg, argv: Reg) {
    let mut pad = Label::new();
    let mut pad_check = Label::new();
    asm.mov_rr(Reg::Rbx, expected);
    asm.jmp(&mut pad_check, Distance::Near);
    asm.bind(&mut pad);
    asm.push_imm(TaggedValue::VALUE_UNDEFINED as i32);
    asm.sub_ri(Reg::Rbx, 1);
    asm.bind(&mut pad_check);
    asm.cmp_rr(Reg::Rbx, actual);
    asm.jcc(Cond::A, &mut pad, Distance::Near);

    asm.mov_rr(Reg::Rax, actual);
    asm.cmp_rr(actual, expected);
    asm.cmov_rr(Cond::A, Reg::Rax, expected);

    let mut copy = Label::new();
    let mut copy_done = Label::new();
    asm.test_rr(Reg::Rax, Reg::Rax);
    asm.jcc(Cond::E, &mut copy_done, Distance::Near);
    asm.bind(&mut copy);
    asm.mov_rm(
        Reg::R11,
        Operand::base_index_disp(argv, Reg::Rax, Scale::Times8, -8),
    );
    asm.push(Reg::R11);
    asm.sub_ri(Reg::Rax, 1);
    asm.jcc(Cond::Ne, &mut copy, Distance::Near);
    asm.bind(&mut copy_done);
}

// ==================== OptimizedCallOptimized ====================

/// C ABI: `(glue, expectedArgc, actualArgc, codeAddr, argv)`. The arity
/// adapter between two compiled functions: same padding and clamping as
/// the entry bridge, under a plain optimized frame.
pub fn optimized_call_optimized(buf: &mut CodeBuffer) {
    let mut asm = X86_64Assembler::new(buf);
    emit_optimized_call_optimized_body(&mut asm);
}

fn emit_optimized_call_optimized_body(asm: &mut X86_64Assembler) {
    asm.push(Reg::Rbp);
    asm.mov_rr(Reg::Rbp, Reg::Rsp);
    asm.push_imm(crate::frames::FrameType::Optimized as i32);
    asm.push(Reg::R14);
    asm.push(Reg::Rbx);

    asm.mov_rr(Reg::R14, Reg::Rsi);
    let mut aligned = Label::new();
    asm.testb_ri(Reg::R14, 1);
    asm.jcc(Cond::Ne, &mut aligned, Distance::Near);
    asm.push_imm(0);
    asm.bind(&mut aligned);

    emit_adapt_and_push_args(asm, Reg::Rsi, Reg::Rdx, Reg::R8);

    asm.push(Reg::Rdx); // actual argc, unadapted
    asm.mov_rr(Reg::Rax, Reg::Rdi);
    asm.call_r(Reg::Rcx);

    asm.lea(Reg::Rsp, Operand::base_disp(Reg::Rbp, -24));
    asm.pop(Reg::Rbx);
    asm.pop(Reg::R14);
    asm.add_ri(Reg::Rsp, 8);
    asm.pop(Reg::Rbp);
    asm.ret();
}

// ==================== CallNativeTrampoline ====================

/// Glue in RAX; stack above the return address:
/// `[nativeCode][argc][callTarget][newTarget][this][args...]`.
/// Builds a leave frame and an on-stack call-info record
/// `{thread, numArgs, stackArgs, data}`, then calls the native function
/// with a pointer to it.
pub fn call_native(buf: &mut CodeBuffer) {
    let mut asm = X86_64Assembler::new(buf);
    emit_call_native_body(&mut asm);
}

fn emit_call_native_body(asm: &mut X86_64Assembler) {
    asm.push(Reg::Rbp);
    asm.mov_rr(Reg::Rbp, Reg::Rsp);
    asm.mov_mr(
        Operand::base_disp(Reg::Rax, VmThread::LEAVE_FRAME_OFFSET),
        Reg::Rbp,
    );
    asm.push_imm(crate::frames::FrameType::Leave as i32);
    asm.push_imm(0); // keeps the native callee 16-byte aligned

    asm.mov_rm(Reg::R10, Operand::base_disp(Reg::Rbp, 16)); // native code

    asm.push_imm(0); // data
    asm.lea(Reg::Rdi, Operand::base_disp(Reg::Rbp, 32));
    asm.push(Reg::Rdi); // stackArgs
    asm.mov_rm(Reg::Rsi, Operand::base_disp(Reg::Rbp, 24));
    asm.sub_ri(Reg::Rsi, NUM_MANDATORY_ARGS);
    asm.push(Reg::Rsi); // numArgs
    asm.push(Reg::Rax); // thread
    asm.mov_rr(Reg::Rdi, Reg::Rsp);
    asm.call_r(Reg::R10);

    asm.add_ri(Reg::Rsp, 48);
    asm.pop(Reg::Rbp);
    asm.ret();
}

// ==================== JSCall ====================

/// Glue in RAX; stack above the return address:
/// `[argc][callTarget][newTarget][this][args...]`.
/// Classifies the call target and routes the call: compiled functions go
/// straight to their code entry (through arity adaptation when the
/// actual count falls short), native functions through the native
/// trampoline, bound functions are flattened and retried, proxies jump
/// to the proxy call stub, and everything else throws a TypeError.
pub fn js_call(buf: &mut CodeBuffer) {
    let mut asm = X86_64Assembler::new(buf);
    emit_js_call_body(&mut asm);
}

/// C ABI: `(glue, argc, argv)` where argv points at the contiguous
/// `[callTarget][newTarget][this][args...]` vector and argc includes the
/// three mandatory slots. Re-pushes the vector into the stack layout the
/// classifier expects and runs it.
pub fn js_call_with_argv(buf: &mut CodeBuffer) {
    let mut asm = X86_64Assembler::new(buf);

    asm.push(Reg::Rbp);
    asm.mov_rr(Reg::Rbp, Reg::Rsp);

    let mut copy = Label::new();
    let mut copy_done = Label::new();
    asm.mov_rr(Reg::Rax, Reg::Rsi);
    asm.test_rr(Reg::Rax, Reg::Rax);
    asm.jcc(Cond::E, &mut copy_done, Distance::Near);
    asm.bind(&mut copy);
    asm.mov_rm(
        Reg::R11,
        Operand::base_index_disp(Reg::Rdx, Reg::Rax, Scale::Times8, -8),
    );
    asm.push(Reg::R11);
    asm.sub_ri(Reg::Rax, 1);
    asm.jcc(Cond::Ne, &mut copy, Distance::Near);
    asm.bind(&mut copy_done);

    asm.push(Reg::Rsi); // argc
    asm.mov_rr(Reg::Rax, Reg::Rdi); // glue
    let mut body = Label::new();
    asm.call(&mut body);

    asm.mov_rr(Reg::Rsp, Reg::Rbp);
    asm.pop(Reg::Rbp);
    asm.ret();

    asm.bind(&mut body);
    emit_js_call_body(&mut asm);
}

fn emit_js_call_body(asm: &mut X86_64Assembler) {
    let mut entry = Label::new();
    let mut non_callable = Label::new();
    let mut function_call = Label::new();
    let mut bound_call = Label::new();
    let mut proxy_call = Label::new();
    let mut native_call = Label::new();
    let mut not_compiled = Label::new();
    let mut adapt = Label::new();

    asm.bind(&mut entry);
    asm.mov_rm(Reg::Rdx, Operand::base_disp(Reg::Rsp, 16)); // callTarget

    // Reject non-objects: any tag bit set means int or double.
    asm.mov_ri64(Reg::R10, TaggedValue::TAG_MASK as i64);
    asm.test_rr(Reg::Rdx, Reg::R10);
    asm.jcc(Cond::Ne, &mut non_callable, Distance::Far);
    // The hole.
    asm.cmp_ri(Reg::Rdx, 0);
    asm.jcc(Cond::E, &mut non_callable, Distance::Far);
    // The special encodings all carry this bit; heap pointers are
    // 8-byte aligned and never do.
    asm.testb_ri(Reg::Rdx, TaggedValue::TAG_SPECIAL_VALUE as i8);
    asm.jcc(Cond::Ne, &mut non_callable, Distance::Far);

    asm.mov_rm(Reg::R10, Operand::base_disp(Reg::Rdx, object::HCLASS_OFFSET));
    asm.mov_rm(Reg::R10, Operand::base_disp(Reg::R10, hclass::BIT_FIELD_OFFSET));
    asm.bt_ri(Reg::R10, hclass::CALLABLE_BIT as u8);
    asm.jcc(Cond::Ae, &mut non_callable, Distance::Far);

    // Route on the type byte.
    asm.and_ri(Reg::R10, hclass::TYPE_MASK as i32);
    asm.lea(
        Reg::R11,
        Operand::base_disp(Reg::R10, -(hclass::JS_FUNCTION_FIRST as i32)),
    );
    asm.cmp_ri(
        Reg::R11,
        (hclass::JS_FUNCTION_LAST - hclass::JS_FUNCTION_FIRST) as i32,
    );
    asm.jcc(Cond::Be, &mut function_call, Distance::Far);
    asm.cmp_ri(Reg::R10, hclass::JS_BOUND_FUNCTION as i32);
    asm.jcc(Cond::E, &mut bound_call, Distance::Far);
    asm.cmp_ri(Reg::R10, hclass::JS_PROXY as i32);
    asm.jcc(Cond::E, &mut proxy_call, Distance::Far);
    asm.jmp(&mut non_callable, Distance::Far);

    // ---- plain function ----
    asm.bind(&mut function_call);
    asm.mov_rm(Reg::Rsi, Operand::base_disp(Reg::Rdx, function::METHOD_OFFSET));
    asm.mov_rm(Reg::Rdi, Operand::base_disp(Reg::Rsi, method::CALL_FIELD_OFFSET));
    asm.bt_ri(Reg::Rdi, method::IS_NATIVE_BIT as u8);
    asm.jcc(Cond::B, &mut native_call, Distance::Far);
    asm.bt_ri(Reg::Rdi, method::IS_AOT_CODE_BIT as u8);
    asm.jcc(Cond::Ae, &mut not_compiled, Distance::Far);

    // Declared argument count plus the mandatory three.
    asm.mov_rr(Reg::Rcx, Reg::Rdi);
    asm.shr_ri(Reg::Rcx, method::NUM_ARGS_SHIFT as u8);
    asm.and_ri(Reg::Rcx, ((1u32 << method::NUM_ARGS_BITS) - 1) as i32);
    asm.add_ri(Reg::Rcx, NUM_MANDATORY_ARGS);
    asm.mov_rm(Reg::R8, Operand::base_disp(Reg::Rsp, 8)); // actual argc
    asm.mov_rm(Reg::R9, Operand::base_disp(Reg::Rdx, function::CODE_ENTRY_OFFSET));
    asm.cmp_rr(Reg::R8, Reg::Rcx);
    asm.jcc(Cond::B, &mut adapt, Distance::Near);
    // Exact or surplus arity: tail-jump straight into the code entry,
    // glue already in RAX and the stack already in callee shape.
    asm.jmp_r(Reg::R9);

    asm.bind(&mut adapt);
    asm.mov_rr(Reg::Rdi, Reg::Rax); // glue
    asm.mov_rr(Reg::Rsi, Reg::Rcx); // expected
    asm.mov_rr(Reg::Rdx, Reg::R8); // actual
    asm.mov_rr(Reg::Rcx, Reg::R9); // code entry
    asm.lea(Reg::R8, Operand::base_disp(Reg::Rsp, 16)); // argv
    emit_optimized_call_optimized_body(asm);

    // ---- native function ----
    asm.bind(&mut native_call);
    asm.mov_rm(Reg::R10, Operand::base_disp(Reg::Rdx, function::CODE_ENTRY_OFFSET));
    // Slot the native pointer in between the return address and argc,
    // which is the native trampoline's expected layout.
    asm.pop(Reg::R11);
    asm.push(Reg::R10);
    asm.push(Reg::R11);
    emit_call_native_body(asm);

    // ---- bound function ----
    asm.bind(&mut bound_call);
    asm.push(Reg::Rbp);
    asm.mov_rr(Reg::Rbp, Reg::Rsp);
    asm.push_imm(crate::frames::FrameType::Optimized as i32);
    asm.push(Reg::R10);

    // New argc: supplied count plus the bound-argument count.
    asm.mov_rm(
        Reg::Rcx,
        Operand::base_disp(Reg::Rdx, bound_function::BOUND_ARGUMENTS_OFFSET),
    );
    asm.mov_rm(Reg::R10, Operand::base_disp(Reg::Rcx, tagged_array::LENGTH_OFFSET));
    asm.mov_rm(Reg::R11, Operand::base_disp(Reg::Rbp, 16)); // original argc
    asm.add_rr(Reg::R10, Reg::R11);

    let mut bound_aligned = Label::new();
    asm.testb_ri(Reg::R10, 1);
    asm.jcc(Cond::Ne, &mut bound_aligned, Distance::Near);
    asm.push_imm(0);
    asm.bind(&mut bound_aligned);

    // Supplied arguments beyond the mandatory three, backwards.
    let mut copy_supplied = Label::new();
    let mut supplied_done = Label::new();
    asm.mov_rr(Reg::Rcx, Reg::R11);
    asm.sub_ri(Reg::Rcx, NUM_MANDATORY_ARGS);
    asm.jcc(Cond::E, &mut supplied_done, Distance::Near);
    asm.bind(&mut copy_supplied);
    asm.mov_rm(
        Reg::Rdi,
        Operand::base_index_disp(Reg::Rbp, Reg::Rcx, Scale::Times8, 40),
    );
    asm.push(Reg::Rdi);
    asm.sub_ri(Reg::Rcx, 1);
    asm.jcc(Cond::Ne, &mut copy_supplied, Distance::Near);
    asm.bind(&mut supplied_done);

    // Bound arguments, backwards, from the tagged array's data.
    let mut copy_bound = Label::new();
    let mut bound_done = Label::new();
    asm.mov_rm(
        Reg::Rcx,
        Operand::base_disp(Reg::Rdx, bound_function::BOUND_ARGUMENTS_OFFSET),
    );
    asm.mov_rm(Reg::Rsi, Operand::base_disp(Reg::Rcx, tagged_array::LENGTH_OFFSET));
    asm.test_rr(Reg::Rsi, Reg::Rsi);
    asm.jcc(Cond::E, &mut bound_done, Distance::Near);
    asm.bind(&mut copy_bound);
    asm.mov_rm(
        Reg::Rdi,
        Operand::base_index_disp(
            Reg::Rcx,
            Reg::Rsi,
            Scale::Times8,
            tagged_array::DATA_OFFSET - 8,
        ),
    );
    asm.push(Reg::Rdi);
    asm.sub_ri(Reg::Rsi, 1);
    asm.jcc(Cond::Ne, &mut copy_bound, Distance::Near);
    asm.bind(&mut bound_done);

    // Mandatory slots: bound this, no new target, the bound target.
    asm.mov_rm(Reg::Rdi, Operand::base_disp(Reg::Rdx, bound_function::BOUND_THIS_OFFSET));
    asm.push(Reg::Rdi);
    asm.push_imm(TaggedValue::VALUE_UNDEFINED as i32);
    asm.mov_rm(
        Reg::Rdi,
        Operand::base_disp(Reg::Rdx, bound_function::BOUND_TARGET_OFFSET),
    );
    asm.push(Reg::Rdi);
    asm.push(Reg::R10);
    asm.call(&mut entry);

    asm.lea(Reg::Rsp, Operand::base_disp(Reg::Rbp, -16));
    asm.pop(Reg::R10);
    asm.add_ri(Reg::Rsp, 8);
    asm.pop(Reg::Rbp);
    asm.ret();

    // ---- proxy ----
    asm.bind(&mut proxy_call);
    asm.mov_rm(Reg::Rsi, Operand::base_disp(Reg::Rsp, 8)); // argc
    asm.lea(Reg::Rcx, Operand::base_disp(Reg::Rsp, 16)); // argv
    asm.mov_rr(Reg::Rdi, Reg::Rax);
    asm.mov_ri32(Reg::R9, CommonStubId::JsProxyCallInternal as i32);
    asm.jmp_m(Operand::base_index_disp(
        Reg::Rdi,
        Reg::R9,
        Scale::Times8,
        VmThread::CO_STUB_ENTRIES_OFFSET,
    ));

    // ---- not callable ----
    asm.bind(&mut non_callable);
    asm.push(Reg::Rbp);
    asm.mov_rr(Reg::Rbp, Reg::Rsp);
    asm.push_imm(crate::frames::FrameType::Optimized as i32);
    asm.mov_ri64(
        Reg::R10,
        TaggedValue::from_int(NON_CALLABLE_MESSAGE_ID).raw() as i64,
    );
    asm.push(Reg::R10); // message argument
    asm.push_imm(1); // argc
    asm.push_imm(RuntimeFnId::ThrowTypeError as i32); // rtId
    asm.mov_rm(
        Reg::R10,
        Operand::base_disp(
            Reg::Rax,
            VmThread::CO_STUB_ENTRIES_OFFSET
                + ((TRAMPOLINE_STUB_BASE + RuntimeStubId::CallRuntime as usize) * 8) as i32,
        ),
    );
    asm.call_r(Reg::R10);
    asm.mov_ri64(Reg::Rax, TaggedValue::VALUE_EXCEPTION as i64);
    asm.add_ri(Reg::Rsp, 32);
    asm.pop(Reg::Rbp);
    asm.ret();

    // ---- declared but not compiled ----
    // No interpreter re-entry bridge through this path.
    asm.bind(&mut not_compiled);
    asm.int3();
}
