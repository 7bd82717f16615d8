//! Variable-length (x86-64-style) instruction encoding.
//!
//! Instructions are byte sequences in prefix/opcode/ModRM/SIB/disp/imm
//! order. Memory operands are prepacked by [`Operand`] into their ModRM
//! mode, optional SIB byte, and displacement, so every instruction emitter
//! just streams the pieces out. Jumps take a caller-supplied [`Distance`]
//! hint choosing the rel8 or rel32 form; a near jump whose displacement
//! ends up out of range panics at bind time.

use super::codebuf::CodeBuffer;
use super::{BranchClass, Label};

/// General-purpose registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Reg {
    /// Get the register code (lower 3 bits).
    pub fn code(self) -> u8 {
        (self as u8) & 0x7
    }

    /// Check if this register requires a REX extension bit.
    pub fn needs_rex_ext(self) -> bool {
        (self as u8) >= 8
    }

    /// The REX.B bit for this register (when used as base/rm).
    pub fn rex_b(self) -> u8 {
        if self.needs_rex_ext() { 0x01 } else { 0x00 }
    }

    /// The REX.X bit for this register (when used as an index).
    pub fn rex_x(self) -> u8 {
        if self.needs_rex_ext() { 0x02 } else { 0x00 }
    }

    /// The REX.R bit for this register (when used as reg).
    pub fn rex_r(self) -> u8 {
        if self.needs_rex_ext() { 0x04 } else { 0x00 }
    }
}

/// Condition codes (for Jcc and SETcc).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cond {
    O = 0x0,
    No = 0x1,
    B = 0x2,
    Ae = 0x3,
    E = 0x4,
    Ne = 0x5,
    Be = 0x6,
    A = 0x7,
    S = 0x8,
    Ns = 0x9,
    P = 0xA,
    Np = 0xB,
    L = 0xC,
    Ge = 0xD,
    Le = 0xE,
    G = 0xF,
}

impl Cond {
    /// Invert the condition.
    pub fn invert(self) -> Self {
        match self {
            Cond::O => Cond::No,
            Cond::No => Cond::O,
            Cond::B => Cond::Ae,
            Cond::Ae => Cond::B,
            Cond::E => Cond::Ne,
            Cond::Ne => Cond::E,
            Cond::Be => Cond::A,
            Cond::A => Cond::Be,
            Cond::S => Cond::Ns,
            Cond::Ns => Cond::S,
            Cond::P => Cond::Np,
            Cond::Np => Cond::P,
            Cond::L => Cond::Ge,
            Cond::Ge => Cond::L,
            Cond::Le => Cond::G,
            Cond::G => Cond::Le,
        }
    }
}

/// Index scale for SIB addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Scale {
    Times1 = 0,
    Times2 = 1,
    Times4 = 2,
    Times8 = 3,
}

/// Jump-form hint: `Near` emits the 2-byte rel8 form, `Far` the rel32
/// form. The caller promises a near target actually is near.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    Near,
    Far,
}

#[derive(Debug, Clone, Copy)]
enum Disp {
    None,
    Byte(i8),
    Long(i32),
}

/// A memory operand, eagerly packed into ModRM mode bits, low rm bits,
/// REX.X/REX.B contribution, optional SIB byte, and displacement.
#[derive(Debug, Clone, Copy)]
pub struct Operand {
    mode: u8,
    rm: u8,
    rex: u8,
    sib: Option<u8>,
    disp: Disp,
}

impl Operand {
    /// `[base + disp]`. RSP/R12 as base force a SIB byte; RBP/R13 cannot
    /// use the no-displacement mode.
    pub fn base_disp(base: Reg, disp: i32) -> Operand {
        let (mode, disp) = Self::pick_mode(base, disp);
        if base == Reg::Rsp || base == Reg::R12 {
            // SIB with index 0b100 means "no index".
            Operand {
                mode,
                rm: 0b100,
                rex: base.rex_b(),
                sib: Some(Self::sib(Scale::Times1, 0b100, base.code())),
                disp,
            }
        } else {
            Operand {
                mode,
                rm: base.code(),
                rex: base.rex_b(),
                sib: None,
                disp,
            }
        }
    }

    /// `[base + index * scale + disp]`. The index register must not be
    /// RSP, whose code is reserved for "no index".
    pub fn base_index_disp(base: Reg, index: Reg, scale: Scale, disp: i32) -> Operand {
        assert!(index != Reg::Rsp, "rsp cannot be an index");
        let (mode, disp) = Self::pick_mode(base, disp);
        Operand {
            mode,
            rm: 0b100,
            rex: index.rex_x() | base.rex_b(),
            sib: Some(Self::sib(scale, index.code(), base.code())),
            disp,
        }
    }

    fn pick_mode(base: Reg, disp: i32) -> (u8, Disp) {
        if disp == 0 && base != Reg::Rbp && base != Reg::R13 {
            (0b00, Disp::None)
        } else if (-128..=127).contains(&disp) {
            (0b01, Disp::Byte(disp as i8))
        } else {
            (0b10, Disp::Long(disp))
        }
    }

    fn sib(scale: Scale, index: u8, base: u8) -> u8 {
        ((scale as u8) << 6) | ((index & 0x7) << 3) | (base & 0x7)
    }
}

/// Assembler appending variable-length instructions to a code buffer.
pub struct X86_64Assembler<'a> {
    buf: &'a mut CodeBuffer,
}

impl<'a> X86_64Assembler<'a> {
    pub fn new(buf: &'a mut CodeBuffer) -> Self {
        Self { buf }
    }

    pub fn buf(&mut self) -> &mut CodeBuffer {
        self.buf
    }

    // ==================== REX / ModRM helpers ====================

    /// Emit REX.W for a reg/rm register pair.
    fn emit_rex_w(&mut self, reg: Reg, rm: Reg) {
        self.buf.emit_u8(0x48 | reg.rex_r() | rm.rex_b());
    }

    /// Emit REX.W for a single register in the rm slot.
    fn emit_rex_w_single(&mut self, rm: Reg) {
        self.buf.emit_u8(0x48 | rm.rex_b());
    }

    /// Emit REX.W for a register and a memory operand.
    fn emit_rex_w_mem(&mut self, reg: Reg, mem: &Operand) {
        self.buf.emit_u8(0x48 | reg.rex_r() | mem.rex);
    }

    /// Encode a ModR/M byte.
    fn modrm(mode: u8, reg: u8, rm: u8) -> u8 {
        ((mode & 0x3) << 6) | ((reg & 0x7) << 3) | (rm & 0x7)
    }

    /// Emit the ModRM/SIB/disp tail for a memory operand.
    fn emit_mem(&mut self, reg_field: u8, mem: &Operand) {
        self.buf.emit_u8(Self::modrm(mem.mode, reg_field, mem.rm));
        if let Some(sib) = mem.sib {
            self.buf.emit_u8(sib);
        }
        match mem.disp {
            Disp::None => {}
            Disp::Byte(b) => self.buf.emit_u8(b as u8),
            Disp::Long(d) => self.buf.emit_u32(d as u32),
        }
    }

    // ==================== Data Movement ====================

    /// MOV r64, r64
    pub fn mov_rr(&mut self, dst: Reg, src: Reg) {
        self.emit_rex_w(src, dst);
        self.buf.emit_u8(0x89);
        self.buf.emit_u8(Self::modrm(0b11, src.code(), dst.code()));
    }

    /// MOV r64, imm64
    pub fn mov_ri64(&mut self, dst: Reg, imm: i64) {
        self.emit_rex_w_single(dst);
        self.buf.emit_u8(0xB8 + dst.code());
        self.buf.emit_u64(imm as u64);
    }

    /// MOV r64, imm32 (sign-extended)
    pub fn mov_ri32(&mut self, dst: Reg, imm: i32) {
        self.emit_rex_w_single(dst);
        self.buf.emit_u8(0xC7);
        self.buf.emit_u8(Self::modrm(0b11, 0, dst.code()));
        self.buf.emit_u32(imm as u32);
    }

    /// MOV r64, m64 (load)
    pub fn mov_rm(&mut self, dst: Reg, src: Operand) {
        self.emit_rex_w_mem(dst, &src);
        self.buf.emit_u8(0x8B);
        self.emit_mem(dst.code(), &src);
    }

    /// MOV m64, r64 (store)
    pub fn mov_mr(&mut self, dst: Operand, src: Reg) {
        self.emit_rex_w_mem(src, &dst);
        self.buf.emit_u8(0x89);
        self.emit_mem(src.code(), &dst);
    }

    /// MOV m64, imm32 (sign-extended store)
    pub fn mov_mi32(&mut self, dst: Operand, imm: i32) {
        self.buf.emit_u8(0x48 | dst.rex);
        self.buf.emit_u8(0xC7);
        self.emit_mem(0, &dst);
        self.buf.emit_u32(imm as u32);
    }

    /// MOVZX r64, m8 (zero-extending byte load)
    pub fn movzx_rm8(&mut self, dst: Reg, src: Operand) {
        self.emit_rex_w_mem(dst, &src);
        self.buf.emit_u8(0x0F);
        self.buf.emit_u8(0xB6);
        self.emit_mem(dst.code(), &src);
    }

    /// MOVZX r64, m16 (zero-extending word load)
    pub fn movzx_rm16(&mut self, dst: Reg, src: Operand) {
        self.emit_rex_w_mem(dst, &src);
        self.buf.emit_u8(0x0F);
        self.buf.emit_u8(0xB7);
        self.emit_mem(dst.code(), &src);
    }

    /// LEA r64, m
    pub fn lea(&mut self, dst: Reg, src: Operand) {
        self.emit_rex_w_mem(dst, &src);
        self.buf.emit_u8(0x8D);
        self.emit_mem(dst.code(), &src);
    }

    // ==================== Arithmetic / Logic ====================

    /// ADD r64, r64
    pub fn add_rr(&mut self, dst: Reg, src: Reg) {
        self.emit_rex_w(src, dst);
        self.buf.emit_u8(0x01);
        self.buf.emit_u8(Self::modrm(0b11, src.code(), dst.code()));
    }

    /// ADD r64, imm32 (imm8 and RAX short forms when they apply)
    pub fn add_ri(&mut self, dst: Reg, imm: i32) {
        self.arith_ri(0, 0x05, dst, imm);
    }

    /// SUB r64, r64
    pub fn sub_rr(&mut self, dst: Reg, src: Reg) {
        self.emit_rex_w(src, dst);
        self.buf.emit_u8(0x29);
        self.buf.emit_u8(Self::modrm(0b11, src.code(), dst.code()));
    }

    /// SUB r64, imm32
    pub fn sub_ri(&mut self, dst: Reg, imm: i32) {
        self.arith_ri(5, 0x2D, dst, imm);
    }

    /// CMP r64, r64
    pub fn cmp_rr(&mut self, dst: Reg, src: Reg) {
        self.emit_rex_w(src, dst);
        self.buf.emit_u8(0x39);
        self.buf.emit_u8(Self::modrm(0b11, src.code(), dst.code()));
    }

    /// CMP r64, imm32
    pub fn cmp_ri(&mut self, dst: Reg, imm: i32) {
        self.arith_ri(7, 0x3D, dst, imm);
    }

    /// CMP r64, m64
    pub fn cmp_rm(&mut self, dst: Reg, src: Operand) {
        self.emit_rex_w_mem(dst, &src);
        self.buf.emit_u8(0x3B);
        self.emit_mem(dst.code(), &src);
    }

    /// AND r64, imm32
    pub fn and_ri(&mut self, dst: Reg, imm: i32) {
        self.arith_ri(4, 0x25, dst, imm);
    }

    /// OR r64, r64
    pub fn or_rr(&mut self, dst: Reg, src: Reg) {
        self.emit_rex_w(src, dst);
        self.buf.emit_u8(0x09);
        self.buf.emit_u8(Self::modrm(0b11, src.code(), dst.code()));
    }

    /// XOR r64, r64
    pub fn xor_rr(&mut self, dst: Reg, src: Reg) {
        self.emit_rex_w(src, dst);
        self.buf.emit_u8(0x31);
        self.buf.emit_u8(Self::modrm(0b11, src.code(), dst.code()));
    }

    /// The /n imm group: imm8 short form, accumulator short form for RAX
    /// with a full imm32, then the generic 81 /n id.
    fn arith_ri(&mut self, ext: u8, rax_op: u8, dst: Reg, imm: i32) {
        self.emit_rex_w_single(dst);
        if (-128..=127).contains(&imm) {
            self.buf.emit_u8(0x83);
            self.buf.emit_u8(Self::modrm(0b11, ext, dst.code()));
            self.buf.emit_u8(imm as u8);
        } else if dst == Reg::Rax {
            self.buf.emit_u8(rax_op);
            self.buf.emit_u32(imm as u32);
        } else {
            self.buf.emit_u8(0x81);
            self.buf.emit_u8(Self::modrm(0b11, ext, dst.code()));
            self.buf.emit_u32(imm as u32);
        }
    }

    /// TEST r64, r64
    pub fn test_rr(&mut self, dst: Reg, src: Reg) {
        self.emit_rex_w(src, dst);
        self.buf.emit_u8(0x85);
        self.buf.emit_u8(Self::modrm(0b11, src.code(), dst.code()));
    }

    /// TEST r8, imm8 against a register's low byte.
    pub fn testb_ri(&mut self, dst: Reg, imm: i8) {
        if dst.needs_rex_ext()
            || dst == Reg::Rsp
            || dst == Reg::Rbp
            || dst == Reg::Rsi
            || dst == Reg::Rdi
        {
            // REX reaches SPL/BPL/SIL/DIL and R8B-R15B.
            self.buf.emit_u8(0x40 | dst.rex_b());
        }
        self.buf.emit_u8(0xF6);
        self.buf.emit_u8(Self::modrm(0b11, 0, dst.code()));
        self.buf.emit_u8(imm as u8);
    }

    /// BT r64, imm8 (bit test, result in CF)
    pub fn bt_ri(&mut self, dst: Reg, bit: u8) {
        self.emit_rex_w_single(dst);
        self.buf.emit_u8(0x0F);
        self.buf.emit_u8(0xBA);
        self.buf.emit_u8(Self::modrm(0b11, 4, dst.code()));
        self.buf.emit_u8(bit);
    }

    /// CMOVcc r64, r64
    pub fn cmov_rr(&mut self, cond: Cond, dst: Reg, src: Reg) {
        self.emit_rex_w(dst, src);
        self.buf.emit_u8(0x0F);
        self.buf.emit_u8(0x40 + cond as u8);
        self.buf.emit_u8(Self::modrm(0b11, dst.code(), src.code()));
    }

    /// SHL r64, imm8
    pub fn shl_ri(&mut self, dst: Reg, imm: u8) {
        self.shift_ri(4, dst, imm);
    }

    /// SHR r64, imm8
    pub fn shr_ri(&mut self, dst: Reg, imm: u8) {
        self.shift_ri(5, dst, imm);
    }

    /// SAR r64, imm8
    pub fn sar_ri(&mut self, dst: Reg, imm: u8) {
        self.shift_ri(7, dst, imm);
    }

    fn shift_ri(&mut self, ext: u8, dst: Reg, imm: u8) {
        self.emit_rex_w_single(dst);
        self.buf.emit_u8(0xC1);
        self.buf.emit_u8(Self::modrm(0b11, ext, dst.code()));
        self.buf.emit_u8(imm);
    }

    // ==================== Stack Operations ====================

    /// PUSH r64
    pub fn push(&mut self, reg: Reg) {
        if reg.needs_rex_ext() {
            self.buf.emit_u8(0x41);
        }
        self.buf.emit_u8(0x50 + reg.code());
    }

    /// PUSH imm (imm8 short form when it fits)
    pub fn push_imm(&mut self, imm: i32) {
        if (-128..=127).contains(&imm) {
            self.buf.emit_u8(0x6A);
            self.buf.emit_u8(imm as u8);
        } else {
            self.buf.emit_u8(0x68);
            self.buf.emit_u32(imm as u32);
        }
    }

    /// POP r64
    pub fn pop(&mut self, reg: Reg) {
        if reg.needs_rex_ext() {
            self.buf.emit_u8(0x41);
        }
        self.buf.emit_u8(0x58 + reg.code());
    }

    // ==================== Control Flow ====================

    /// JMP to a label, form picked by the distance hint.
    pub fn jmp(&mut self, label: &mut Label, distance: Distance) {
        match distance {
            Distance::Near => {
                self.buf.emit_u8(0xEB);
                self.rel8_site(label);
            }
            Distance::Far => {
                self.buf.emit_u8(0xE9);
                self.rel32_site(label);
            }
        }
    }

    /// Jcc to a label, form picked by the distance hint.
    pub fn jcc(&mut self, cond: Cond, label: &mut Label, distance: Distance) {
        match distance {
            Distance::Near => {
                self.buf.emit_u8(0x70 + cond as u8);
                self.rel8_site(label);
            }
            Distance::Far => {
                self.buf.emit_u8(0x0F);
                self.buf.emit_u8(0x80 + cond as u8);
                self.rel32_site(label);
            }
        }
    }

    fn rel8_site(&mut self, label: &mut Label) {
        let pos = self.buf.offset();
        match label.link(pos, BranchClass::Rel8) {
            Some(target) => {
                let disp = target as i64 - (pos as i64 + 1);
                assert!(
                    disp >= i8::MIN as i64 && disp <= i8::MAX as i64,
                    "near jump target out of rel8 range"
                );
                self.buf.emit_u8(disp as i8 as u8);
            }
            None => self.buf.emit_u8(0),
        }
    }

    fn rel32_site(&mut self, label: &mut Label) {
        let pos = self.buf.offset();
        match label.link(pos, BranchClass::Rel32) {
            Some(target) => {
                let disp = target as i64 - (pos as i64 + 4);
                self.buf.emit_u32(disp as i32 as u32);
            }
            None => self.buf.emit_u32(0),
        }
    }

    /// Bind `label` to the current position, patching pending jumps.
    pub fn bind(&mut self, label: &mut Label) {
        label.bind(self.buf);
    }

    /// CALL rel32 to a label.
    pub fn call(&mut self, label: &mut Label) {
        self.buf.emit_u8(0xE8);
        self.rel32_site(label);
    }

    /// CALL r64
    pub fn call_r(&mut self, reg: Reg) {
        if reg.needs_rex_ext() {
            self.buf.emit_u8(0x41);
        }
        self.buf.emit_u8(0xFF);
        self.buf.emit_u8(Self::modrm(0b11, 2, reg.code()));
    }

    /// JMP r64
    pub fn jmp_r(&mut self, reg: Reg) {
        if reg.needs_rex_ext() {
            self.buf.emit_u8(0x41);
        }
        self.buf.emit_u8(0xFF);
        self.buf.emit_u8(Self::modrm(0b11, 4, reg.code()));
    }

    /// JMP m64
    pub fn jmp_m(&mut self, target: Operand) {
        if target.rex != 0 {
            self.buf.emit_u8(0x40 | target.rex);
        }
        self.buf.emit_u8(0xFF);
        self.emit_mem(4, &target);
    }

    /// RET
    pub fn ret(&mut self) {
        self.buf.emit_u8(0xC3);
    }

    /// NOP
    pub fn nop(&mut self) {
        self.buf.emit_u8(0x90);
    }

    /// INT3 breakpoint.
    pub fn int3(&mut self) {
        self.buf.emit_u8(0xCC);
    }

    /// Pad with NOPs to a 16-byte boundary.
    pub fn align16(&mut self) {
        self.buf.align(16, 0x90);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(f: impl FnOnce(&mut X86_64Assembler)) -> Vec<u8> {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        f(&mut asm);
        buf.into_code()
    }

    #[test]
    fn test_mov_rr() {
        assert_eq!(
            assemble(|asm| asm.mov_rr(Reg::Rax, Reg::Rbx)),
            vec![0x48, 0x89, 0xD8]
        );
        assert_eq!(
            assemble(|asm| asm.mov_rr(Reg::R9, Reg::R8)),
            vec![0x4D, 0x89, 0xC1]
        );
    }

    #[test]
    fn test_mov_ri64() {
        assert_eq!(
            assemble(|asm| asm.mov_ri64(Reg::Rax, 0x123456789ABCDEF0u64 as i64)),
            vec![0x48, 0xB8, 0xF0, 0xDE, 0xBC, 0x9A, 0x78, 0x56, 0x34, 0x12]
        );
        assert_eq!(
            assemble(|asm| asm.mov_ri64(Reg::R15, 42)),
            vec![0x49, 0xBF, 0x2A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_mov_load_simple() {
        // MOV RAX, [RBX]
        assert_eq!(
            assemble(|asm| asm.mov_rm(Reg::Rax, Operand::base_disp(Reg::Rbx, 0))),
            vec![0x48, 0x8B, 0x03]
        );
        // MOV RAX, [RBX+16]
        assert_eq!(
            assemble(|asm| asm.mov_rm(Reg::Rax, Operand::base_disp(Reg::Rbx, 16))),
            vec![0x48, 0x8B, 0x43, 0x10]
        );
    }

    #[test]
    fn test_mov_load_rsp_needs_sib() {
        // MOV RAX, [RSP+8]
        assert_eq!(
            assemble(|asm| asm.mov_rm(Reg::Rax, Operand::base_disp(Reg::Rsp, 8))),
            vec![0x48, 0x8B, 0x44, 0x24, 0x08]
        );
        // MOV RAX, [R12]
        assert_eq!(
            assemble(|asm| asm.mov_rm(Reg::Rax, Operand::base_disp(Reg::R12, 0))),
            vec![0x49, 0x8B, 0x04, 0x24]
        );
    }

    #[test]
    fn test_mov_load_rbp_needs_disp() {
        // MOV RAX, [RBP] must use the disp8-zero form.
        assert_eq!(
            assemble(|asm| asm.mov_rm(Reg::Rax, Operand::base_disp(Reg::Rbp, 0))),
            vec![0x48, 0x8B, 0x45, 0x00]
        );
        // Same for R13.
        assert_eq!(
            assemble(|asm| asm.mov_rm(Reg::Rax, Operand::base_disp(Reg::R13, 0))),
            vec![0x49, 0x8B, 0x45, 0x00]
        );
    }

    #[test]
    fn test_mov_load_disp32() {
        // MOV RAX, [RBX+0x1000]
        assert_eq!(
            assemble(|asm| asm.mov_rm(Reg::Rax, Operand::base_disp(Reg::Rbx, 0x1000))),
            vec![0x48, 0x8B, 0x83, 0x00, 0x10, 0x00, 0x00]
        );
    }

    #[test]
    fn test_mov_load_scaled_index() {
        // MOV RAX, [RDI + RSI*8 + 0x10]
        assert_eq!(
            assemble(|asm| asm.mov_rm(
                Reg::Rax,
                Operand::base_index_disp(Reg::Rdi, Reg::Rsi, Scale::Times8, 0x10)
            )),
            vec![0x48, 0x8B, 0x44, 0xF7, 0x10]
        );
        // MOV R10, [RDI + R9*8]
        assert_eq!(
            assemble(|asm| asm.mov_rm(
                Reg::R10,
                Operand::base_index_disp(Reg::Rdi, Reg::R9, Scale::Times8, 0)
            )),
            vec![0x4E, 0x8B, 0x14, 0xCF]
        );
    }

    #[test]
    fn test_mov_store() {
        // MOV [RBX], RAX
        assert_eq!(
            assemble(|asm| asm.mov_mr(Operand::base_disp(Reg::Rbx, 0), Reg::Rax)),
            vec![0x48, 0x89, 0x03]
        );
        // MOV [RSP-8], RDI
        assert_eq!(
            assemble(|asm| asm.mov_mr(Operand::base_disp(Reg::Rsp, -8), Reg::Rdi)),
            vec![0x48, 0x89, 0x7C, 0x24, 0xF8]
        );
    }

    #[test]
    fn test_mov_store_imm() {
        // MOV QWORD PTR [RSP], 5
        assert_eq!(
            assemble(|asm| asm.mov_mi32(Operand::base_disp(Reg::Rsp, 0), 5)),
            vec![0x48, 0xC7, 0x04, 0x24, 0x05, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_lea() {
        // LEA RAX, [RSP+0x10]
        assert_eq!(
            assemble(|asm| asm.lea(Reg::Rax, Operand::base_disp(Reg::Rsp, 0x10))),
            vec![0x48, 0x8D, 0x44, 0x24, 0x10]
        );
    }

    #[test]
    fn test_movzx_loads() {
        // MOVZX RAX, BYTE PTR [RBX+1]
        assert_eq!(
            assemble(|asm| asm.movzx_rm8(Reg::Rax, Operand::base_disp(Reg::Rbx, 1))),
            vec![0x48, 0x0F, 0xB6, 0x43, 0x01]
        );
        // MOVZX RCX, WORD PTR [RBX+2]
        assert_eq!(
            assemble(|asm| asm.movzx_rm16(Reg::Rcx, Operand::base_disp(Reg::Rbx, 2))),
            vec![0x48, 0x0F, 0xB7, 0x4B, 0x02]
        );
    }

    #[test]
    fn test_add_forms() {
        // imm8 short form
        assert_eq!(
            assemble(|asm| asm.add_ri(Reg::Rax, 16)),
            vec![0x48, 0x83, 0xC0, 0x10]
        );
        // RAX accumulator form
        assert_eq!(
            assemble(|asm| asm.add_ri(Reg::Rax, 0x1000)),
            vec![0x48, 0x05, 0x00, 0x10, 0x00, 0x00]
        );
        // generic imm32 form
        assert_eq!(
            assemble(|asm| asm.add_ri(Reg::Rcx, 0x1000)),
            vec![0x48, 0x81, 0xC1, 0x00, 0x10, 0x00, 0x00]
        );
    }

    #[test]
    fn test_sub_cmp_forms() {
        assert_eq!(
            assemble(|asm| asm.sub_ri(Reg::Rsp, 32)),
            vec![0x48, 0x83, 0xEC, 0x20]
        );
        assert_eq!(
            assemble(|asm| asm.sub_ri(Reg::Rax, 0x1000)),
            vec![0x48, 0x2D, 0x00, 0x10, 0x00, 0x00]
        );
        assert_eq!(
            assemble(|asm| asm.cmp_ri(Reg::Rax, 0)),
            vec![0x48, 0x83, 0xF8, 0x00]
        );
        assert_eq!(
            assemble(|asm| asm.cmp_ri(Reg::Rax, 0x1000)),
            vec![0x48, 0x3D, 0x00, 0x10, 0x00, 0x00]
        );
        assert_eq!(
            assemble(|asm| asm.cmp_rr(Reg::Rax, Reg::Rbx)),
            vec![0x48, 0x39, 0xD8]
        );
    }

    #[test]
    fn test_test_forms() {
        assert_eq!(
            assemble(|asm| asm.test_rr(Reg::Rax, Reg::Rax)),
            vec![0x48, 0x85, 0xC0]
        );
        // TEST R14B, 1
        assert_eq!(
            assemble(|asm| asm.testb_ri(Reg::R14, 1)),
            vec![0x41, 0xF6, 0xC6, 0x01]
        );
        // TEST AL, 1 needs no REX
        assert_eq!(
            assemble(|asm| asm.testb_ri(Reg::Rax, 1)),
            vec![0xF6, 0xC0, 0x01]
        );
    }

    #[test]
    fn test_bt_cmov() {
        // BT RAX, 60
        assert_eq!(
            assemble(|asm| asm.bt_ri(Reg::Rax, 60)),
            vec![0x48, 0x0F, 0xBA, 0xE0, 0x3C]
        );
        // CMOVBE RCX, RBX
        assert_eq!(
            assemble(|asm| asm.cmov_rr(Cond::Be, Reg::Rcx, Reg::Rbx)),
            vec![0x48, 0x0F, 0x46, 0xCB]
        );
    }

    #[test]
    fn test_call_label_backward() {
        let code = assemble(|asm| {
            let mut top = Label::new();
            asm.bind(&mut top);
            asm.nop();
            asm.call(&mut top);
        });
        // E8 with rel32 -6 from the end of the field.
        assert_eq!(code, vec![0x90, 0xE8, 0xFA, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_shifts() {
        assert_eq!(
            assemble(|asm| asm.shl_ri(Reg::Rax, 3)),
            vec![0x48, 0xC1, 0xE0, 0x03]
        );
        assert_eq!(
            assemble(|asm| asm.shr_ri(Reg::Rax, 3)),
            vec![0x48, 0xC1, 0xE8, 0x03]
        );
        assert_eq!(
            assemble(|asm| asm.sar_ri(Reg::Rax, 3)),
            vec![0x48, 0xC1, 0xF8, 0x03]
        );
    }

    #[test]
    fn test_push_pop() {
        assert_eq!(
            assemble(|asm| {
                asm.push(Reg::Rbx);
                asm.push(Reg::R12);
                asm.pop(Reg::R12);
                asm.pop(Reg::Rbx);
            }),
            vec![0x53, 0x41, 0x54, 0x41, 0x5C, 0x5B]
        );
    }

    #[test]
    fn test_push_imm() {
        assert_eq!(assemble(|asm| asm.push_imm(5)), vec![0x6A, 0x05]);
        assert_eq!(
            assemble(|asm| asm.push_imm(0x1000)),
            vec![0x68, 0x00, 0x10, 0x00, 0x00]
        );
    }

    #[test]
    fn test_call_jmp_indirect() {
        assert_eq!(assemble(|asm| asm.call_r(Reg::Rax)), vec![0xFF, 0xD0]);
        assert_eq!(assemble(|asm| asm.call_r(Reg::R10)), vec![0x41, 0xFF, 0xD2]);
        assert_eq!(assemble(|asm| asm.jmp_r(Reg::Rax)), vec![0xFF, 0xE0]);
    }

    #[test]
    fn test_jmp_far_forward() {
        let code = assemble(|asm| {
            let mut l = Label::new();
            asm.jmp(&mut l, Distance::Far);
            asm.nop();
            asm.bind(&mut l);
        });
        // E9 01 00 00 00, then the NOP, target right after.
        assert_eq!(code, vec![0xE9, 0x01, 0x00, 0x00, 0x00, 0x90]);
    }

    #[test]
    fn test_jmp_near_backward() {
        let code = assemble(|asm| {
            let mut top = Label::new();
            asm.bind(&mut top);
            asm.nop();
            asm.jmp(&mut top, Distance::Near);
        });
        // EB FD: -3 from the byte after the rel8 field.
        assert_eq!(code, vec![0x90, 0xEB, 0xFD]);
    }

    #[test]
    fn test_jcc_near_and_far() {
        let code = assemble(|asm| {
            let mut l = Label::new();
            asm.jcc(Cond::E, &mut l, Distance::Near);
            asm.jcc(Cond::Ne, &mut l, Distance::Far);
            asm.bind(&mut l);
        });
        assert_eq!(code, vec![0x74, 0x06, 0x0F, 0x85, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    #[should_panic(expected = "rel8 branch displacement out of range")]
    fn test_near_jump_overflow_panics() {
        let mut buf = CodeBuffer::new();
        let mut asm = X86_64Assembler::new(&mut buf);
        let mut l = Label::new();
        asm.jmp(&mut l, Distance::Near);
        for _ in 0..200 {
            asm.nop();
        }
        asm.bind(&mut l);
    }

    #[test]
    fn test_align16() {
        let code = assemble(|asm| {
            asm.ret();
            asm.align16();
        });
        assert_eq!(code.len(), 16);
        assert_eq!(code[0], 0xC3);
        assert!(code[1..].iter().all(|&b| b == 0x90));
    }

    #[test]
    fn test_ret_nop_int3() {
        assert_eq!(
            assemble(|asm| {
                asm.ret();
                asm.nop();
                asm.int3();
            }),
            vec![0xC3, 0x90, 0xCC]
        );
    }
}
