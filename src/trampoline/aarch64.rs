//! AArch64 trampolines for the bytecode-dispatch path.
//!
//! These run under the fast-dispatch convention with pinned register
//! roles: X19 carries the glue pointer for the whole interpreter
//! activation, X29 the current interpreter frame, and X20-X25 the
//! per-dispatch values. The machine stack pointer only matters at the
//! edges; frame slots are addressed through the frame register, which
//! has no 16-byte alignment requirement.
//!
//! The interpreter frame image these stubs push and pop is
//! [`AsmInterpretedFrame`]. The frame register and the thread's
//! current-frame slot hold the address one word past the frame's tag,
//! the same stack-pointer convention the walker reads (tag at sp-8,
//! prev at sp-16), so fields are reached at negative offsets.

use crate::frames::{AsmInterpretedFrame, FrameType};
use crate::masm::aarch64::{Aarch64Assembler, Cond, MemOperand, Operand, Reg};
use crate::masm::codebuf::CodeBuffer;
use crate::masm::Label;
use crate::runtime::layout::{function, method};
use crate::runtime::thread::VmThread;
use crate::runtime::value::TaggedValue;

use self::aarch64_roles::*;

/// Pinned register roles of the dispatch convention.
pub mod aarch64_roles {
    use crate::masm::aarch64::Reg;

    /// Glue pointer, live across every handler.
    pub const GLUE: Reg = Reg::X19;
    /// Call target on the way in; current bytecode pc once dispatching.
    pub const CALL_TARGET: Reg = Reg::X20;
    /// Method on the way in; constant pool once dispatching.
    pub const METHOD: Reg = Reg::X21;
    /// Call field on the way in; profile info once dispatching.
    pub const CALL_FIELD: Reg = Reg::X22;
    /// First argument on the way in; accumulator once dispatching.
    pub const ACC: Reg = Reg::X23;
    pub const ARG1: Reg = Reg::X24;
    pub const ARG2: Reg = Reg::X25;
    /// Current interpreter frame (X29), pointing one word past the
    /// frame's tag.
    pub const FRAME: Reg = Reg::FP;
}

/// Byte offset of a frame field from the published frame pointer, which
/// sits one past the frame image.
const fn frame_field(offset: i32) -> i32 {
    offset - AsmInterpretedFrame::SIZE as i32
}

/// Set the machine stack pointer to `below`, rounded down to 16 bytes.
fn emit_align_sp_below(asm: &mut Aarch64Assembler, below: Reg, scratch: Reg) {
    asm.and(scratch, below, Operand::Imm(!0xF));
    asm.mov(Reg::SP, scratch);
}

/// Set the machine stack pointer below the current frame image, rounded
/// down to 16 bytes. Clobbers `scratch`.
fn emit_align_sp_below_frame(asm: &mut Aarch64Assembler, scratch: Reg) {
    asm.sub(
        scratch,
        FRAME,
        Operand::Imm(AsmInterpretedFrame::SIZE as i64),
    );
    asm.and(scratch, scratch, Operand::Imm(!0xF));
    asm.mov(Reg::SP, scratch);
}

/// Load the handler for the opcode byte at `pc` and jump to it.
/// Clobbers X9-X11.
fn emit_dispatch(asm: &mut Aarch64Assembler, pc: Reg) {
    asm.ldrb(Reg::X9.w(), MemOperand::offset(pc, 0));
    asm.lsl_imm(Reg::X10, Reg::X9, 3);
    asm.add(Reg::X10, GLUE, Operand::Reg(Reg::X10));
    asm.ldr(
        Reg::X11,
        MemOperand::offset(Reg::X10, VmThread::BC_STUB_ENTRIES_OFFSET),
    );
    asm.br(Reg::X11);
}

/// Entry into the interpreter: GLUE, CALL_TARGET, METHOD and CALL_FIELD
/// carry the callee, X0 the supplied argument count and X1 the argument
/// vector. One unified path adapts the arguments to the declared count
/// (padding shortfall with undefined, dropping surplus), pushes the
/// declared locals and the interpreter frame, publishes the frame to the
/// thread, and dispatches the first opcode.
pub fn push_call_args_and_dispatch(buf: &mut CodeBuffer) {
    let mut asm = Aarch64Assembler::new(buf);

    // Declared argument count from the call field.
    asm.lsr_imm(Reg::X9, CALL_FIELD, method::NUM_ARGS_SHIFT);
    asm.and(
        Reg::X9,
        Reg::X9,
        Operand::Imm(((1u64 << method::NUM_ARGS_BITS) - 1) as i64),
    );

    // Arguments actually copied: min(supplied, declared).
    asm.cmp(Reg::X0, Operand::Reg(Reg::X9));
    asm.csel(Reg::X10, Reg::X0, Reg::X9, Cond::Ls);

    // Build the frame through a scratch pointer; the machine sp moves
    // once, after alignment. X16 keeps the entry sp, restored when this
    // frame pops.
    asm.mov(Reg::X13, Reg::SP);
    asm.mov(Reg::X16, Reg::SP);

    // Varargs methods record the supplied count above the arguments.
    let mut no_extra = Label::new();
    asm.tbz(CALL_FIELD, method::HAVE_EXTRA_BIT, &mut no_extra);
    asm.str(Reg::X0, MemOperand::pre_index(Reg::X13, -8));
    asm.bind(&mut no_extra);

    // Undefined padding for the shortfall.
    let mut pad = Label::new();
    let mut pad_done = Label::new();
    asm.sub(Reg::X11, Reg::X9, Operand::Reg(Reg::X10));
    asm.mov_imm(Reg::X15, TaggedValue::VALUE_UNDEFINED);
    asm.cbz(Reg::X11, &mut pad_done);
    asm.bind(&mut pad);
    asm.str(Reg::X15, MemOperand::pre_index(Reg::X13, -8));
    asm.subs(Reg::X11, Reg::X11, Operand::Imm(1));
    asm.b_cond(Cond::Ne, &mut pad);
    asm.bind(&mut pad_done);

    // Supplied arguments, copied backwards so argument 0 lands on top.
    let mut copy = Label::new();
    let mut copy_done = Label::new();
    asm.lsl_imm(Reg::X12, Reg::X10, 3);
    asm.add(Reg::X12, Reg::X1, Operand::Reg(Reg::X12));
    asm.cbz(Reg::X10, &mut copy_done);
    asm.mov(Reg::X14, Reg::X10);
    asm.bind(&mut copy);
    asm.ldr(Reg::X15, MemOperand::pre_index(Reg::X12, -8));
    asm.str(Reg::X15, MemOperand::pre_index(Reg::X13, -8));
    asm.subs(Reg::X14, Reg::X14, Operand::Imm(1));
    asm.b_cond(Cond::Ne, &mut copy);
    asm.bind(&mut copy_done);

    // Calling-contract slots the method declares, func closest to the
    // frame. ARG1 carries `this`, ARG2 the new target on the way in.
    let mut no_this = Label::new();
    asm.tbz(CALL_FIELD, method::HAVE_THIS_BIT, &mut no_this);
    asm.str(ARG1, MemOperand::pre_index(Reg::X13, -8));
    asm.bind(&mut no_this);
    let mut no_new_target = Label::new();
    asm.tbz(CALL_FIELD, method::HAVE_NEW_TARGET_BIT, &mut no_new_target);
    asm.str(ARG2, MemOperand::pre_index(Reg::X13, -8));
    asm.bind(&mut no_new_target);
    let mut no_func = Label::new();
    asm.tbz(CALL_FIELD, method::HAVE_FUNC_BIT, &mut no_func);
    asm.str(CALL_TARGET, MemOperand::pre_index(Reg::X13, -8));
    asm.bind(&mut no_func);

    // Declared locals, all undefined until their first store.
    let mut vregs = Label::new();
    let mut vregs_done = Label::new();
    asm.lsr_imm(Reg::X11, CALL_FIELD, method::NUM_VREGS_SHIFT);
    asm.and(
        Reg::X11,
        Reg::X11,
        Operand::Imm(((1u64 << method::NUM_VREGS_BITS) - 1) as i64),
    );
    asm.mov_imm(Reg::X15, TaggedValue::VALUE_UNDEFINED);
    asm.cbz(Reg::X11, &mut vregs_done);
    asm.bind(&mut vregs);
    asm.str(Reg::X15, MemOperand::pre_index(Reg::X13, -8));
    asm.subs(Reg::X11, Reg::X11, Operand::Imm(1));
    asm.b_cond(Cond::Ne, &mut vregs);
    asm.bind(&mut vregs_done);

    // One past the frame image about to be pushed; this is the stack
    // pointer the walker and the resume stubs see.
    asm.mov(Reg::X12, Reg::X13);

    // Frame state, pushed in pairs from the base downwards.
    asm.ldr(
        Reg::X14,
        MemOperand::offset(GLUE, VmThread::CURRENT_FRAME_OFFSET),
    );
    asm.mov_imm(Reg::X15, FrameType::AsmInterpreter as u64);
    asm.stp(Reg::X14, Reg::X15, MemOperand::pre_index(Reg::X13, -16));

    asm.ldr(
        Reg::X14,
        MemOperand::offset(METHOD, method::BYTECODE_ARRAY_OFFSET),
    );
    asm.stp(Reg::X16, Reg::X14, MemOperand::pre_index(Reg::X13, -16));

    asm.ldr(
        Reg::X15,
        MemOperand::offset(CALL_TARGET, function::LEXICAL_ENV_OFFSET),
    );
    asm.stp(Reg::X15, Reg::ZERO, MemOperand::pre_index(Reg::X13, -16));

    asm.mov_imm(Reg::X14, TaggedValue::VALUE_UNDEFINED);
    asm.stp(CALL_TARGET, Reg::X14, MemOperand::pre_index(Reg::X13, -16));

    // The new frame becomes current, for the walker and for the
    // handlers.
    asm.mov(FRAME, Reg::X12);
    asm.str(
        Reg::X12,
        MemOperand::offset(GLUE, VmThread::CURRENT_FRAME_OFFSET),
    );
    emit_align_sp_below(&mut asm, Reg::X13, Reg::X14);

    // First dispatch: pc register takes over the call-target role.
    asm.ldr(
        CALL_TARGET,
        MemOperand::offset(METHOD, method::BYTECODE_ARRAY_OFFSET),
    );
    emit_dispatch(&mut asm, CALL_TARGET);
}

/// Resume after a completed call: write the accumulator back, advance
/// the frame's pc past the calling bytecode, restore the stack pointer,
/// and dispatch.
pub fn resume_rsp_and_dispatch(buf: &mut CodeBuffer) {
    let mut asm = Aarch64Assembler::new(buf);

    asm.ldur(
        CALL_TARGET,
        MemOperand::offset(FRAME, frame_field(AsmInterpretedFrame::PC_OFFSET)),
    );
    asm.ldur(
        Reg::X9,
        MemOperand::offset(FRAME, frame_field(AsmInterpretedFrame::CALL_SIZE_OFFSET)),
    );
    asm.add(CALL_TARGET, CALL_TARGET, Operand::Reg(Reg::X9));
    asm.stur(
        CALL_TARGET,
        MemOperand::offset(FRAME, frame_field(AsmInterpretedFrame::PC_OFFSET)),
    );
    asm.stur(
        ACC,
        MemOperand::offset(FRAME, frame_field(AsmInterpretedFrame::ACC_OFFSET)),
    );

    emit_align_sp_below_frame(&mut asm, Reg::X10);
    emit_dispatch(&mut asm, CALL_TARGET);
}

/// Leave the interpreter: pop the current frame, republish the previous
/// one, restore the caller's stack pointer, and return the accumulator.
pub fn resume_rsp_and_return(buf: &mut CodeBuffer) {
    let mut asm = Aarch64Assembler::new(buf);

    asm.ldur(
        Reg::X0,
        MemOperand::offset(FRAME, frame_field(AsmInterpretedFrame::ACC_OFFSET)),
    );
    emit_pop_frame(&mut asm);
    asm.ret();
}

/// A handler for the pending exception was found in this frame: move
/// the exception into the accumulator, clear the thread slot, point the
/// frame's pc at the handler, and dispatch.
pub fn resume_caught_frame_and_dispatch(buf: &mut CodeBuffer) {
    let mut asm = Aarch64Assembler::new(buf);

    asm.ldr(ACC, MemOperand::offset(GLUE, VmThread::EXCEPTION_OFFSET));
    asm.mov_imm(Reg::X9, TaggedValue::VALUE_HOLE);
    asm.str(Reg::X9, MemOperand::offset(GLUE, VmThread::EXCEPTION_OFFSET));

    // CALL_TARGET carries the handler pc.
    asm.stur(
        CALL_TARGET,
        MemOperand::offset(FRAME, frame_field(AsmInterpretedFrame::PC_OFFSET)),
    );
    emit_align_sp_below_frame(&mut asm, Reg::X10);
    emit_dispatch(&mut asm, CALL_TARGET);
}

/// No handler anywhere in this frame: pop it and return the exception
/// sentinel to the native caller.
pub fn resume_uncaught_frame_and_return(buf: &mut CodeBuffer) {
    let mut asm = Aarch64Assembler::new(buf);

    asm.mov_imm(Reg::X0, TaggedValue::VALUE_EXCEPTION);
    emit_pop_frame(&mut asm);
    asm.ret();
}

/// Unlink the current interpreter frame: previous frame becomes current
/// (in the thread and in the frame register) and the machine sp returns
/// to the slot the frame recorded. Clobbers X9-X10.
fn emit_pop_frame(asm: &mut Aarch64Assembler) {
    asm.ldur(
        Reg::X9,
        MemOperand::offset(FRAME, frame_field(AsmInterpretedFrame::BASE_OFFSET)),
    );
    asm.str(
        Reg::X9,
        MemOperand::offset(GLUE, VmThread::CURRENT_FRAME_OFFSET),
    );
    asm.ldur(
        Reg::X10,
        MemOperand::offset(FRAME, frame_field(AsmInterpretedFrame::FP_OFFSET)),
    );
    asm.mov(Reg::SP, Reg::X10);
    asm.mov(FRAME, Reg::X9);
}
