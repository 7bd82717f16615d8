//! Fixed-width (AArch64-style) instruction encoding.
//!
//! Every operation emits exactly one 32-bit word built by OR-ing a base
//! opcode with bit-packed operands. The two non-trivial pieces are
//! [`LogicalImmediate`] (the rotated-run-of-ones bitmask form) and
//! [`Aarch64Assembler::mov_imm`], which picks the cheapest synthesis for
//! an arbitrary 64-bit immediate (at most four instructions).
//!
//! Invalid operand combinations panic: they are bugs in the routine being
//! assembled, not runtime conditions.

use super::codebuf::CodeBuffer;
use super::{pack_branch_disp, BranchClass, Label};
use crate::bits::{
    count_leading_ones, count_leading_zeros, count_trailing_ones, count_trailing_zeros, is_mask,
    is_shifted_mask,
};

// ==================== Registers ====================

/// A general-purpose register with a width class. `W` views alias the low
/// 32 bits of the `X` register with the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reg {
    id: u8,
    wide: bool,
}

impl Reg {
    pub const X0: Reg = Reg::x(0);
    pub const X1: Reg = Reg::x(1);
    pub const X2: Reg = Reg::x(2);
    pub const X3: Reg = Reg::x(3);
    pub const X4: Reg = Reg::x(4);
    pub const X5: Reg = Reg::x(5);
    pub const X6: Reg = Reg::x(6);
    pub const X7: Reg = Reg::x(7);
    pub const X8: Reg = Reg::x(8);
    pub const X9: Reg = Reg::x(9);
    pub const X10: Reg = Reg::x(10);
    pub const X11: Reg = Reg::x(11);
    pub const X12: Reg = Reg::x(12);
    pub const X13: Reg = Reg::x(13);
    pub const X14: Reg = Reg::x(14);
    pub const X15: Reg = Reg::x(15);
    pub const X16: Reg = Reg::x(16);
    pub const X17: Reg = Reg::x(17);
    pub const X18: Reg = Reg::x(18);
    pub const X19: Reg = Reg::x(19);
    pub const X20: Reg = Reg::x(20);
    pub const X21: Reg = Reg::x(21);
    pub const X22: Reg = Reg::x(22);
    pub const X23: Reg = Reg::x(23);
    pub const X24: Reg = Reg::x(24);
    pub const X25: Reg = Reg::x(25);
    pub const X26: Reg = Reg::x(26);
    pub const X27: Reg = Reg::x(27);
    pub const X28: Reg = Reg::x(28);
    pub const X29: Reg = Reg::x(29);
    pub const X30: Reg = Reg::x(30);
    /// Frame pointer (X29).
    pub const FP: Reg = Reg::x(29);
    /// Link register (X30).
    pub const LR: Reg = Reg::x(30);
    /// Stack pointer. Shares id 31 with [`Reg::ZERO`]; each instruction
    /// class fixes which one id 31 means.
    pub const SP: Reg = Reg::x(31);
    /// Zero register (XZR).
    pub const ZERO: Reg = Reg::x(31);

    const fn x(id: u8) -> Reg {
        Reg { id, wide: true }
    }

    /// The 32-bit view of this register.
    pub const fn w(self) -> Reg {
        Reg {
            id: self.id,
            wide: false,
        }
    }

    pub fn code(self) -> u32 {
        self.id as u32
    }

    pub fn is_wide(self) -> bool {
        self.wide
    }

    /// Register width in bits.
    pub fn width(self) -> u32 {
        if self.wide { 64 } else { 32 }
    }

    fn sf(self) -> u32 {
        if self.wide { 1 << 31 } else { 0 }
    }
}

/// Condition codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cond {
    Eq = 0b0000,
    Ne = 0b0001,
    Cs = 0b0010,
    Cc = 0b0011,
    Mi = 0b0100,
    Pl = 0b0101,
    Vs = 0b0110,
    Vc = 0b0111,
    Hi = 0b1000,
    Ls = 0b1001,
    Ge = 0b1010,
    Lt = 0b1011,
    Gt = 0b1100,
    Le = 0b1101,
    Al = 0b1110,
}

impl Cond {
    pub fn code(self) -> u32 {
        self as u32
    }

    /// The logical negation of the condition.
    pub fn invert(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Cs => Cond::Cc,
            Cond::Cc => Cond::Cs,
            Cond::Mi => Cond::Pl,
            Cond::Pl => Cond::Mi,
            Cond::Vs => Cond::Vc,
            Cond::Vc => Cond::Vs,
            Cond::Hi => Cond::Ls,
            Cond::Ls => Cond::Hi,
            Cond::Ge => Cond::Lt,
            Cond::Lt => Cond::Ge,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
            Cond::Al => panic!("AL has no inversion"),
        }
    }
}

/// Shift kinds for the shifted-register operand form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Shift {
    Lsl = 0,
    Lsr = 1,
    Asr = 2,
    Ror = 3,
}

/// Extend kinds for the extended-register operand form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Extend {
    Uxtb = 0,
    Uxth = 1,
    Uxtw = 2,
    Uxtx = 3,
    Sxtb = 4,
    Sxth = 5,
    Sxtw = 6,
    Sxtx = 7,
}

/// Second operand of a data-processing instruction.
#[derive(Debug, Clone, Copy)]
pub enum Operand {
    Imm(i64),
    Reg(Reg),
    Shifted(Reg, Shift, u8),
    Extended(Reg, Extend, u8),
}

/// Memory operand with an addressing mode.
#[derive(Debug, Clone, Copy)]
pub struct MemOperand {
    base: Reg,
    offset: i32,
    mode: AddrMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    Offset,
    PreIndex,
    PostIndex,
}

impl MemOperand {
    pub fn offset(base: Reg, offset: i32) -> MemOperand {
        MemOperand {
            base,
            offset,
            mode: AddrMode::Offset,
        }
    }

    pub fn pre_index(base: Reg, offset: i32) -> MemOperand {
        MemOperand {
            base,
            offset,
            mode: AddrMode::PreIndex,
        }
    }

    pub fn post_index(base: Reg, offset: i32) -> MemOperand {
        MemOperand {
            base,
            offset,
            mode: AddrMode::PostIndex,
        }
    }
}

// ==================== Logical immediates ====================

/// A value provably encodable as a rotated contiguous run of ones, held as
/// the packed N:immr:imms field of a logical-immediate instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalImmediate {
    bits: u32,
}

impl LogicalImmediate {
    /// Find the bitmask encoding of `imm` at the given register width.
    /// Zero and all-ones have no encoding and return `None`, as does any
    /// value that is not a rotation of a single run of ones.
    pub fn create(imm: u64, width: u32) -> Option<LogicalImmediate> {
        debug_assert!(width == 32 || width == 64);
        if imm == 0 || imm == u64::MAX {
            return None;
        }
        if width != 64 && ((imm >> width) != 0 || imm == (u64::MAX >> (64 - width))) {
            return None;
        }

        // Determine the element size: the smallest power of two the value
        // is a self-similar repetition of.
        let mut size = width;
        loop {
            size /= 2;
            let mask = (1u64 << size) - 1;
            if (imm & mask) != ((imm >> size) & mask) {
                size *= 2;
                break;
            }
            if size <= 2 {
                break;
            }
        }

        // Determine the rotation that turns the element into 0^m 1^n.
        let mask = u64::MAX >> (64 - size);
        let mut elem = imm & mask;

        let (i, cto);
        if is_shifted_mask(elem) {
            i = count_trailing_zeros(elem, 64);
            cto = count_trailing_ones(elem >> i, 64);
        } else {
            elem |= !mask;
            if !is_shifted_mask(!elem) {
                return None;
            }
            let clo = count_leading_ones(elem, 64);
            i = 64 - clo;
            cto = clo + count_trailing_ones(elem, 64) - (64 - size);
        }

        // immr is the number of rotations from 0^m 1^n to the value.
        debug_assert!(size > i);
        let immr = (size - i) & (size - 1);

        // imms is the run length minus one, under a leading pattern that
        // also identifies the element size; N is its inverted seventh bit.
        let n_imms = (!(size as u64 - 1) << 1) | (cto as u64 - 1);
        let n = ((n_imms >> 6) & 1) ^ 1;

        Some(LogicalImmediate {
            bits: ((n as u32) << 22) | ((immr & 0x3F) << 16) | (((n_imms as u32) << 10) & 0xFC00),
        })
    }

    /// The packed N:immr:imms field, positioned for OR-ing into an
    /// instruction word.
    pub fn bits(self) -> u32 {
        self.bits
    }
}

// ==================== Opcode constants ====================

const MOVN: u32 = 0x1280_0000;
const MOVZ: u32 = 0x5280_0000;
const MOVK: u32 = 0x7280_0000;

const ADD_IMM: u32 = 0x1100_0000;
const ADD_SHIFT: u32 = 0x0B00_0000;
const ADD_EXTEND: u32 = 0x0B20_0000;
const SUB_IMM: u32 = 0x5100_0000;
const SUB_SHIFT: u32 = 0x4B00_0000;
const SUB_EXTEND: u32 = 0x4B20_0000;
// S flag turns ADD/SUB into ADDS/SUBS.
const FLAGS_S: u32 = 1 << 29;

const AND_IMM: u32 = 0x1200_0000;
const AND_SHIFT: u32 = 0x0A00_0000;
const ANDS_IMM: u32 = 0x7200_0000;
const ANDS_SHIFT: u32 = 0x6A00_0000;
const ORR_IMM: u32 = 0x3200_0000;
const ORR_SHIFT: u32 = 0x2A00_0000;

const UBFM: u32 = 0x5300_0000;
const LSL_REG: u32 = 0x1AC0_2000;
const LSR_REG: u32 = 0x1AC0_2400;
const CSEL: u32 = 0x1A80_0000;

const BRANCH: u32 = 0x1400_0000;
const BRANCH_LINK: u32 = 0x9400_0000;
const BRANCH_COND: u32 = 0x5400_0000;
const CBZ: u32 = 0x3400_0000;
const CBNZ: u32 = 0x3500_0000;
const TBZ: u32 = 0x3600_0000;
const TBNZ: u32 = 0x3700_0000;
const BR: u32 = 0xD61F_0000;
const BLR: u32 = 0xD63F_0000;
const RET: u32 = 0xD65F_0000;

const LDP_POST: u32 = 0x28C0_0000;
const LDP_PRE: u32 = 0x29C0_0000;
const LDP_OFFSET: u32 = 0x2940_0000;
const STP_POST: u32 = 0x2880_0000;
const STP_PRE: u32 = 0x2980_0000;
const STP_OFFSET: u32 = 0x2900_0000;

const LDR_POST: u32 = 0xB840_0400;
const LDR_PRE: u32 = 0xB840_0C00;
const LDR_OFFSET: u32 = 0xB940_0000;
const STR_POST: u32 = 0xB800_0400;
const STR_PRE: u32 = 0xB800_0C00;
const STR_OFFSET: u32 = 0xB900_0000;
const LDUR_OFFSET: u32 = 0xB840_0000;
const STUR_OFFSET: u32 = 0xB800_0000;
const LDRH_OFFSET: u32 = 0x7940_0000;
const LDRB_OFFSET: u32 = 0x3940_0000;

const NOP: u32 = 0xD503_201F;
const BRK: u32 = 0xD420_0000;

const HWORD_MASK: u64 = 0xFFFF;
const HWORD_SIZE: u32 = 16;

fn rd(r: Reg) -> u32 {
    r.code()
}
fn rn(r: Reg) -> u32 {
    r.code() << 5
}
fn rm(r: Reg) -> u32 {
    r.code() << 16
}
fn rt2(r: Reg) -> u32 {
    r.code() << 10
}

// ==================== Assembler ====================

/// Assembler appending fixed-width instructions to a code buffer.
pub struct Aarch64Assembler<'a> {
    buf: &'a mut CodeBuffer,
}

impl<'a> Aarch64Assembler<'a> {
    pub fn new(buf: &'a mut CodeBuffer) -> Self {
        Self { buf }
    }

    pub fn buf(&mut self) -> &mut CodeBuffer {
        self.buf
    }

    /// Emit a raw 32-bit instruction word.
    pub fn emit_raw(&mut self, inst: u32) {
        self.buf.emit_u32(inst);
    }

    /// Bind `label` to the current position, patching pending branches.
    pub fn bind(&mut self, label: &mut Label) {
        label.bind(self.buf);
    }

    // ==================== Move immediates ====================

    pub fn movz(&mut self, r: Reg, imm16: u64, shift: u32) {
        self.mov_wide(MOVZ, r, imm16, shift);
    }

    pub fn movk(&mut self, r: Reg, imm16: u64, shift: u32) {
        self.mov_wide(MOVK, r, imm16, shift);
    }

    pub fn movn(&mut self, r: Reg, imm16: u64, shift: u32) {
        self.mov_wide(MOVN, r, imm16, shift);
    }

    fn mov_wide(&mut self, op: u32, r: Reg, imm16: u64, shift: u32) {
        debug_assert!(imm16 <= 0xFFFF && shift % 16 == 0);
        let inst =
            r.sf() | op | (((imm16 as u32) & 0xFFFF) << 5) | ((shift / 16) << 21) | rd(r);
        self.emit_raw(inst);
    }

    /// Register-to-register move. Uses ADD #0 when either side is the
    /// stack pointer, since id 31 means XZR in the ORR form.
    pub fn mov(&mut self, dst: Reg, src: Reg) {
        if dst == Reg::SP || src == Reg::SP {
            self.add(dst, src, Operand::Imm(0));
        } else {
            let zero = if dst.is_wide() { Reg::ZERO } else { Reg::ZERO.w() };
            self.orr(dst, zero, Operand::Reg(src));
        }
    }

    /// Materialize an arbitrary immediate with the cheapest sequence:
    /// a move-wide pair, a single bitmask ORR, ORR plus one or two MOVKs
    /// exploiting repeated or run-of-ones half-word structure, or the
    /// generic MOVZ/MOVN + MOVK fallback. Never more than four
    /// instructions.
    pub fn mov_imm(&mut self, r: Reg, imm: u64) {
        assert!(r != Reg::SP, "mov_imm cannot target sp, use add");
        let reg_size = r.width();
        let half_words = reg_size / HWORD_SIZE;

        let mut all_one = 0u32;
        let mut all_zero = 0u32;
        for shift in (0..reg_size).step_by(HWORD_SIZE as usize) {
            let hw = (imm >> shift) & HWORD_MASK;
            if hw == HWORD_MASK {
                all_one += 1;
            } else if hw == 0 {
                all_zero += 1;
            }
        }

        // A single move-wide (plus at most one MOVK) wins outright.
        if half_words - all_one <= 1 && half_words - all_zero <= 1 {
            self.emit_mov_sequence(r, imm, all_one, all_zero);
            return;
        }

        // Try a single ORR against the zero register.
        let real_imm = if reg_size == 64 { imm } else { imm & 0xFFFF_FFFF };
        if let Some(orr_imm) = LogicalImmediate::create(real_imm, reg_size) {
            self.orr_bitmask(r, self.zero_like(r), orr_imm);
            return;
        }

        // One to three move-wide instructions.
        if all_one >= half_words - 2 || all_zero >= half_words - 2 {
            self.emit_mov_sequence(r, imm, all_one, all_zero);
            return;
        }

        debug_assert!(
            reg_size == 64,
            "any 32-bit immediate reduces to a MOVZ/MOVK pair"
        );

        // Replace one half-word with zeros, ones, or its rotated twin and
        // see if the rest becomes a bitmask immediate; if so, ORR + MOVK.
        for shift in (0..reg_size).step_by(HWORD_SIZE as usize) {
            let shifted_mask = HWORD_MASK << shift;
            let zero_chunk = real_imm & !shifted_mask;
            let one_chunk = real_imm | shifted_mask;
            let rotated = real_imm.rotate_left(32);
            let replicate_chunk = zero_chunk | (rotated & shifted_mask);
            let candidate = [zero_chunk, one_chunk, replicate_chunk]
                .into_iter()
                .find_map(|c| LogicalImmediate::create(c, reg_size));
            if let Some(orr_imm) = candidate {
                self.orr_bitmask(r, self.zero_like(r), orr_imm);
                self.movk(r, (real_imm & shifted_mask) >> shift, shift);
                return;
            }
        }

        if all_one != 0 || all_zero != 0 {
            self.emit_mov_sequence(r, imm, all_one, all_zero);
            return;
        }

        if self.try_replicate_hwords(r, real_imm) {
            return;
        }

        if self.try_sequence_of_ones(r, real_imm) {
            return;
        }

        self.emit_mov_sequence(r, imm, all_one, all_zero);
    }

    fn zero_like(&self, r: Reg) -> Reg {
        if r.is_wide() { Reg::ZERO } else { Reg::ZERO.w() }
    }

    /// Generic move-wide fallback: MOVZ or MOVN for the first interesting
    /// half-word, MOVK for every later half-word that differs from the
    /// fill value.
    fn emit_mov_sequence(&mut self, r: Reg, imm: u64, all_one: u32, all_zero: u32) {
        let width = r.width();
        let value_mask = if width == 64 { u64::MAX } else { 0xFFFF_FFFF };
        let neg = all_one > all_zero;
        let mut imm = if neg { !imm & value_mask } else { imm & value_mask };

        let mut first_shift = 0u32;
        let mut last_shift = 0u32;
        if imm != 0 {
            let lz = count_leading_zeros(imm, width);
            let tz = count_trailing_zeros(imm, width);
            first_shift = (tz / 16) * 16;
            last_shift = ((width - 1 - lz) / 16) * 16;
        }

        let imm16 = (imm >> first_shift) & HWORD_MASK;
        if neg {
            self.movn(r, imm16, first_shift);
            imm = !imm & value_mask;
        } else {
            self.movz(r, imm16, first_shift);
        }

        let fill = if neg { HWORD_MASK } else { 0 };
        let mut shift = first_shift;
        while shift < last_shift {
            shift += HWORD_SIZE;
            let imm16 = (imm >> shift) & HWORD_MASK;
            if imm16 == fill {
                continue;
            }
            self.movk(r, imm16, shift);
        }
    }

    /// If a half-word repeats two or three times and its full replication
    /// is a bitmask immediate, materialize with ORR plus MOVKs for the
    /// odd half-words out.
    fn try_replicate_hwords(&mut self, r: Reg, imm: u64) -> bool {
        let mut counts: std::collections::BTreeMap<u64, u32> = std::collections::BTreeMap::new();
        for shift in (0..64).step_by(HWORD_SIZE as usize) {
            *counts.entry((imm >> shift) & HWORD_MASK).or_insert(0) += 1;
        }

        for (&h_imm, &count) in &counts {
            if count != 2 && count != 3 {
                continue;
            }
            let repeat_imm = h_imm | (h_imm << 16) | (h_imm << 32) | (h_imm << 48);
            let Some(orr_imm) = LogicalImmediate::create(repeat_imm, 64) else {
                continue;
            };
            self.orr_bitmask(r, Reg::ZERO, orr_imm);

            // Patch the half-words the ORR got wrong.
            let mut shift = 0u32;
            let mut imm16 = 0u64;
            while shift < 64 {
                imm16 = (imm >> shift) & HWORD_MASK;
                if imm16 != h_imm {
                    break;
                }
                shift += HWORD_SIZE;
            }
            self.movk(r, imm16, shift);
            if count == 3 {
                return true;
            }
            shift += HWORD_SIZE;
            while shift < 64 {
                imm16 = (imm >> shift) & HWORD_MASK;
                if imm16 != h_imm {
                    break;
                }
                shift += HWORD_SIZE;
            }
            self.movk(r, imm16, shift);
            return true;
        }
        false
    }

    /// If the value is a single contiguous run of ones (possibly wrapping)
    /// with at most two irregular half-words, materialize the idealized
    /// run with one ORR and patch the irregular half-words with MOVKs.
    fn try_sequence_of_ones(&mut self, r: Reg, imm: u64) -> bool {
        let mut start_idx: i32 = -1;
        let mut end_idx: i32 = -1;
        for shift in (0..64).step_by(HWORD_SIZE as usize) {
            let h = (imm >> shift) & HWORD_MASK;
            // Sign extend the half-word so the run predicates see the
            // neighbouring fill bits.
            let h_ext = (((h as i64) << 48) >> 48) as u64;
            if is_start_hword(h_ext) {
                start_idx = shift as i32;
            } else if is_end_hword(h_ext) {
                end_idx = shift as i32;
            }
        }
        if start_idx == -1 || end_idx == -1 {
            return false;
        }

        let mut outside = 0u64;
        let mut inside = HWORD_MASK;
        // A run wrapping MSB->LSB is a run of zeros surrounded by ones.
        if start_idx > end_idx {
            std::mem::swap(&mut start_idx, &mut end_idx);
            std::mem::swap(&mut outside, &mut inside);
        }

        let mut orr_imm = imm;
        let mut first_movk: i32 = -1;
        let mut second_movk: i32 = -1;
        for shift in (0..64).step_by(HWORD_SIZE as usize) {
            let shift = shift as i32;
            let h = (imm >> shift) & HWORD_MASK;
            let irregular = if shift < start_idx || end_idx < shift {
                h != outside
            } else if shift > start_idx && shift < end_idx {
                h != inside
            } else {
                false
            };
            if irregular {
                orr_imm = set_hword(orr_imm, shift as u32, outside == 0);
                if first_movk == -1 {
                    first_movk = shift;
                } else {
                    second_movk = shift;
                }
            }
        }
        debug_assert!(first_movk != -1, "materializable with a single orr");

        let orr = LogicalImmediate::create(orr_imm, 64)
            .expect("idealized run of ones has a bitmask encoding");
        self.orr_bitmask(r, Reg::ZERO, orr);
        self.movk(r, (imm >> first_movk) & HWORD_MASK, first_movk as u32);
        if second_movk != -1 {
            self.movk(r, (imm >> second_movk) & HWORD_MASK, second_movk as u32);
        }
        true
    }

    // ==================== Add / Sub / Compare ====================

    pub fn add(&mut self, dst: Reg, src: Reg, operand: Operand) {
        self.add_sub(ADD_IMM, ADD_SHIFT, ADD_EXTEND, dst, src, operand);
    }

    pub fn sub(&mut self, dst: Reg, src: Reg, operand: Operand) {
        self.add_sub(SUB_IMM, SUB_SHIFT, SUB_EXTEND, dst, src, operand);
    }

    pub fn subs(&mut self, dst: Reg, src: Reg, operand: Operand) {
        self.add_sub(
            SUB_IMM | FLAGS_S,
            SUB_SHIFT | FLAGS_S,
            SUB_EXTEND | FLAGS_S,
            dst,
            src,
            operand,
        );
    }

    /// CMP is SUBS into the zero register.
    pub fn cmp(&mut self, src: Reg, operand: Operand) {
        let zero = self.zero_like(src);
        self.subs(zero, src, operand);
    }

    fn add_sub(
        &mut self,
        op_imm: u32,
        op_shift: u32,
        op_extend: u32,
        dst: Reg,
        src: Reg,
        operand: Operand,
    ) {
        match operand {
            Operand::Imm(imm) => {
                // A negative immediate flips between ADD and SUB.
                if imm < 0 {
                    let flipped = if op_imm & SUB_IMM == SUB_IMM {
                        (ADD_IMM | (op_imm & FLAGS_S), ADD_SHIFT, ADD_EXTEND)
                    } else {
                        (SUB_IMM | (op_imm & FLAGS_S), SUB_SHIFT, SUB_EXTEND)
                    };
                    self.add_sub(flipped.0, flipped.1, flipped.2, dst, src, Operand::Imm(-imm));
                    return;
                }
                let imm = imm as u64;
                let (imm12, sh) = if imm <= 0xFFF {
                    (imm as u32, 0)
                } else {
                    assert!(
                        imm & 0xFFF == 0 && (imm >> 12) <= 0xFFF,
                        "immediate does not fit an add/sub imm12"
                    );
                    ((imm >> 12) as u32, 1)
                };
                let inst = dst.sf() | op_imm | (sh << 22) | (imm12 << 10) | rn(src) | rd(dst);
                self.emit_raw(inst);
            }
            Operand::Reg(r) => {
                let inst = dst.sf() | op_shift | rm(r) | rn(src) | rd(dst);
                self.emit_raw(inst);
            }
            Operand::Shifted(r, shift, amount) => {
                let inst = dst.sf()
                    | op_shift
                    | ((shift as u32) << 22)
                    | rm(r)
                    | ((amount as u32) << 10)
                    | rn(src)
                    | rd(dst);
                self.emit_raw(inst);
            }
            Operand::Extended(r, extend, amount) => {
                debug_assert!(amount <= 4);
                let inst = dst.sf()
                    | op_extend
                    | rm(r)
                    | ((extend as u32) << 13)
                    | ((amount as u32) << 10)
                    | rn(src)
                    | rd(dst);
                self.emit_raw(inst);
            }
        }
    }

    // ==================== Bitwise ====================

    pub fn orr(&mut self, dst: Reg, src: Reg, operand: Operand) {
        self.bitwise(ORR_IMM, ORR_SHIFT, dst, src, operand);
    }

    pub fn and(&mut self, dst: Reg, src: Reg, operand: Operand) {
        self.bitwise(AND_IMM, AND_SHIFT, dst, src, operand);
    }

    pub fn ands(&mut self, dst: Reg, src: Reg, operand: Operand) {
        self.bitwise(ANDS_IMM, ANDS_SHIFT, dst, src, operand);
    }

    /// TST is ANDS into the zero register.
    pub fn tst(&mut self, src: Reg, operand: Operand) {
        let zero = self.zero_like(src);
        self.ands(zero, src, operand);
    }

    pub fn orr_bitmask(&mut self, dst: Reg, src: Reg, imm: LogicalImmediate) {
        let inst = dst.sf() | ORR_IMM | imm.bits() | rn(src) | rd(dst);
        self.emit_raw(inst);
    }

    pub fn and_bitmask(&mut self, dst: Reg, src: Reg, imm: LogicalImmediate) {
        let inst = dst.sf() | AND_IMM | imm.bits() | rn(src) | rd(dst);
        self.emit_raw(inst);
    }

    fn bitwise(&mut self, op_imm: u32, op_shift: u32, dst: Reg, src: Reg, operand: Operand) {
        match operand {
            Operand::Imm(imm) => {
                let li = LogicalImmediate::create(imm as u64, dst.width())
                    .unwrap_or_else(|| panic!("{imm:#x} is not a bitmask immediate"));
                let inst = dst.sf() | op_imm | li.bits() | rn(src) | rd(dst);
                self.emit_raw(inst);
            }
            Operand::Reg(r) => {
                let inst = dst.sf() | op_shift | rm(r) | rn(src) | rd(dst);
                self.emit_raw(inst);
            }
            Operand::Shifted(r, shift, amount) => {
                let inst = dst.sf()
                    | op_shift
                    | ((shift as u32) << 22)
                    | rm(r)
                    | ((amount as u32) << 10)
                    | rn(src)
                    | rd(dst);
                self.emit_raw(inst);
            }
            Operand::Extended(..) => panic!("bitwise ops take no extended operand"),
        }
    }

    // ==================== Shifts / Select ====================

    /// Logical shift left by a constant (a UBFM alias).
    pub fn lsl_imm(&mut self, dst: Reg, src: Reg, shift: u32) {
        let size = dst.width();
        debug_assert!(shift < size);
        self.ubfm(dst, src, (size - shift) % size, size - 1 - shift);
    }

    /// Logical shift right by a constant (a UBFM alias).
    pub fn lsr_imm(&mut self, dst: Reg, src: Reg, shift: u32) {
        let size = dst.width();
        debug_assert!(shift < size);
        self.ubfm(dst, src, shift, size - 1);
    }

    fn ubfm(&mut self, dst: Reg, src: Reg, immr: u32, imms: u32) {
        let n = if dst.is_wide() { 1 << 22 } else { 0 };
        let inst = dst.sf() | UBFM | n | (immr << 16) | (imms << 10) | rn(src) | rd(dst);
        self.emit_raw(inst);
    }

    pub fn lsl_reg(&mut self, dst: Reg, src: Reg, shift: Reg) {
        let inst = dst.sf() | LSL_REG | rm(shift) | rn(src) | rd(dst);
        self.emit_raw(inst);
    }

    pub fn lsr_reg(&mut self, dst: Reg, src: Reg, shift: Reg) {
        let inst = dst.sf() | LSR_REG | rm(shift) | rn(src) | rd(dst);
        self.emit_raw(inst);
    }

    /// CSEL: dst = if cond { a } else { b }.
    pub fn csel(&mut self, dst: Reg, a: Reg, b: Reg, cond: Cond) {
        let inst = dst.sf() | CSEL | rm(b) | (cond.code() << 12) | rn(a) | rd(dst);
        self.emit_raw(inst);
    }

    // ==================== Loads / Stores ====================

    pub fn ldr(&mut self, rt: Reg, operand: MemOperand) {
        self.load_store(LDR_OFFSET, LDR_PRE, LDR_POST, rt, operand);
    }

    pub fn str(&mut self, rt: Reg, operand: MemOperand) {
        self.load_store(STR_OFFSET, STR_PRE, STR_POST, rt, operand);
    }

    /// Load a zero-extended half-word. Offset addressing only.
    pub fn ldrh(&mut self, rt: Reg, operand: MemOperand) {
        assert!(operand.mode == AddrMode::Offset);
        let offset = operand.offset as u32;
        debug_assert!(offset & 1 == 0);
        let inst = LDRH_OFFSET | (((offset >> 1) & 0xFFF) << 10) | rn(operand.base) | rd(rt);
        self.emit_raw(inst);
    }

    /// Load a zero-extended byte. Offset addressing only.
    pub fn ldrb(&mut self, rt: Reg, operand: MemOperand) {
        assert!(operand.mode == AddrMode::Offset);
        let offset = operand.offset as u32;
        let inst = LDRB_OFFSET | ((offset & 0xFFF) << 10) | rn(operand.base) | rd(rt);
        self.emit_raw(inst);
    }

    /// Load with an unscaled 9-bit signed offset.
    pub fn ldur(&mut self, rt: Reg, operand: MemOperand) {
        assert!(operand.mode == AddrMode::Offset);
        let reg_x = if rt.is_wide() { 1 << 30 } else { 0 };
        let inst = reg_x
            | LDUR_OFFSET
            | (((operand.offset as u32) & 0x1FF) << 12)
            | rn(operand.base)
            | rd(rt);
        self.emit_raw(inst);
    }

    /// Store with an unscaled 9-bit signed offset.
    pub fn stur(&mut self, rt: Reg, operand: MemOperand) {
        assert!(operand.mode == AddrMode::Offset);
        let reg_x = if rt.is_wide() { 1 << 30 } else { 0 };
        let inst = reg_x
            | STUR_OFFSET
            | (((operand.offset as u32) & 0x1FF) << 12)
            | rn(operand.base)
            | rd(rt);
        self.emit_raw(inst);
    }

    fn load_store(&mut self, op_offset: u32, op_pre: u32, op_post: u32, rt: Reg, mem: MemOperand) {
        let reg_x = if rt.is_wide() { 1u32 << 30 } else { 0 };
        let inst = match mem.mode {
            AddrMode::Offset => {
                // Plain offsets are scaled by the access size.
                let scale = if rt.is_wide() { 3 } else { 2 };
                assert!(
                    mem.offset >= 0 && mem.offset & ((1 << scale) - 1) == 0,
                    "unscaled or negative offset, use ldur/stur"
                );
                let imm12 = (mem.offset as u32) >> scale;
                debug_assert!(imm12 <= 0xFFF);
                reg_x | op_offset | (imm12 << 10) | rn(mem.base) | rd(rt)
            }
            AddrMode::PreIndex => {
                reg_x | op_pre | (((mem.offset as u32) & 0x1FF) << 12) | rn(mem.base) | rd(rt)
            }
            AddrMode::PostIndex => {
                reg_x | op_post | (((mem.offset as u32) & 0x1FF) << 12) | rn(mem.base) | rd(rt)
            }
        };
        self.emit_raw(inst);
    }

    pub fn ldp(&mut self, rt: Reg, rt2_: Reg, operand: MemOperand) {
        self.load_store_pair(LDP_OFFSET, LDP_PRE, LDP_POST, rt, rt2_, operand);
    }

    pub fn stp(&mut self, rt: Reg, rt2_: Reg, operand: MemOperand) {
        self.load_store_pair(STP_OFFSET, STP_PRE, STP_POST, rt, rt2_, operand);
    }

    fn load_store_pair(
        &mut self,
        op_offset: u32,
        op_pre: u32,
        op_post: u32,
        rt: Reg,
        rt2_: Reg,
        mem: MemOperand,
    ) {
        let op = match mem.mode {
            AddrMode::Offset => op_offset,
            AddrMode::PreIndex => op_pre,
            AddrMode::PostIndex => op_post,
        };
        // Pair offsets are scaled by the element size.
        let scale = if rt.is_wide() { 3 } else { 2 };
        debug_assert!(mem.offset & ((1 << scale) - 1) == 0);
        let imm7 = ((mem.offset >> scale) as u32) & 0x7F;
        let inst = rt.sf() | op | (imm7 << 15) | rt2(rt2_) | rn(mem.base) | rd(rt);
        self.emit_raw(inst);
    }

    // ==================== Branches ====================

    /// B: unconditional branch to a label.
    pub fn b(&mut self, label: &mut Label) {
        self.branch_to(BRANCH, BranchClass::Imm26, label);
    }

    /// BL: branch and link to a label.
    pub fn bl(&mut self, label: &mut Label) {
        self.branch_to(BRANCH_LINK, BranchClass::Imm26, label);
    }

    /// B.cond: conditional branch to a label.
    pub fn b_cond(&mut self, cond: Cond, label: &mut Label) {
        self.branch_to(BRANCH_COND | cond.code(), BranchClass::Imm19, label);
    }

    /// CBZ: branch if the register is zero.
    pub fn cbz(&mut self, rt: Reg, label: &mut Label) {
        self.branch_to(rt.sf() | CBZ | rd(rt), BranchClass::Imm19, label);
    }

    /// CBNZ: branch if the register is non-zero.
    pub fn cbnz(&mut self, rt: Reg, label: &mut Label) {
        self.branch_to(rt.sf() | CBNZ | rd(rt), BranchClass::Imm19, label);
    }

    /// TBZ: branch if bit `bit` of the register is clear.
    pub fn tbz(&mut self, rt: Reg, bit: u32, label: &mut Label) {
        self.branch_to(self.test_branch_word(TBZ, rt, bit), BranchClass::Imm14, label);
    }

    /// TBNZ: branch if bit `bit` of the register is set.
    pub fn tbnz(&mut self, rt: Reg, bit: u32, label: &mut Label) {
        self.branch_to(self.test_branch_word(TBNZ, rt, bit), BranchClass::Imm14, label);
    }

    fn test_branch_word(&self, op: u32, rt: Reg, bit: u32) -> u32 {
        debug_assert!(bit < rt.width());
        let b5 = (bit >> 5) << 31;
        let b40 = (bit & 0x1F) << 19;
        b5 | op | b40 | rd(rt)
    }

    fn branch_to(&mut self, word: u32, class: BranchClass, label: &mut Label) {
        let pos = self.buf.offset();
        match label.link(pos, class) {
            Some(target) => {
                let disp = target as i64 - pos as i64;
                self.emit_raw(pack_branch_disp(word, class, disp));
            }
            None => self.emit_raw(word),
        }
    }

    /// BR: indirect branch.
    pub fn br(&mut self, target: Reg) {
        self.emit_raw(BR | rn(target));
    }

    /// BLR: indirect call.
    pub fn blr(&mut self, target: Reg) {
        self.emit_raw(BLR | rn(target));
    }

    /// RET via the link register.
    pub fn ret(&mut self) {
        self.emit_raw(RET | rn(Reg::LR));
    }

    // ==================== System ====================

    pub fn nop(&mut self) {
        self.emit_raw(NOP);
    }

    pub fn brk(&mut self, imm16: u32) {
        self.emit_raw(BRK | ((imm16 & 0xFFFF) << 5));
    }
}

/// Half-word matching '1...0...': starts a run of ones scanning LSB to
/// MSB. Takes the sign-extended chunk.
fn is_start_hword(h: u64) -> bool {
    if h == 0 || h == u64::MAX {
        return false;
    }
    is_mask(!h)
}

/// Half-word matching '0...1...': ends a run of ones scanning LSB to MSB.
fn is_end_hword(h: u64) -> bool {
    if h == 0 || h == u64::MAX {
        return false;
    }
    is_mask(h)
}

/// Clear or fill the half-word at bit index `idx`.
fn set_hword(imm: u64, idx: u32, clear: bool) -> u64 {
    if clear {
        imm & !(HWORD_MASK << idx)
    } else {
        imm | (HWORD_MASK << idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(f: impl FnOnce(&mut Aarch64Assembler)) -> Vec<u32> {
        let mut buf = CodeBuffer::new();
        let mut asm = Aarch64Assembler::new(&mut buf);
        f(&mut asm);
        buf.code()
            .chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Interpret a MOVZ/MOVN/MOVK/ORR-bitmask sequence, checking that
    /// synthesized immediates reproduce the requested bit pattern.
    fn simulate_mov(words: &[u32], wide: bool) -> u64 {
        let mut value: u64 = 0xDEAD_BEEF_DEAD_BEEF;
        for &word in words {
            assert_eq!(word & 0x1F, 0, "simulator only tracks register 0");
            let class = word & 0x7F80_0000;
            let imm16 = ((word >> 5) & 0xFFFF) as u64;
            let hw = (word >> 21) & 3;
            if class == MOVZ {
                value = imm16 << (hw * 16);
            } else if class == MOVN {
                value = !(imm16 << (hw * 16));
            } else if class == MOVK {
                let shift = hw * 16;
                value = (value & !(0xFFFFu64 << shift)) | (imm16 << shift);
            } else if class == ORR_IMM {
                // ORR against XZR: decode N:immr:imms.
                assert_eq!((word >> 5) & 0x1F, 31, "orr source must be the zero register");
                let n = (word >> 22) & 1;
                let immr = (word >> 16) & 0x3F;
                let imms = (word >> 10) & 0x3F;
                value = decode_bitmask(n, immr, imms);
            } else {
                panic!("unexpected instruction {word:#010x}");
            }
            if !wide {
                value &= 0xFFFF_FFFF;
            }
        }
        value
    }

    /// Reference decoder for the N:immr:imms bitmask form.
    fn decode_bitmask(n: u32, immr: u32, imms: u32) -> u64 {
        // Element size is 2^(index of the highest set bit of N:~imms).
        let combined = ((n << 6) | (!imms & 0x3F)) & 0x7F;
        assert!(combined != 0, "reserved bitmask encoding");
        let len = 31 - combined.leading_zeros();
        let size = 1u64 << len;
        let run = ((imms as u64) & (size - 1)) + 1;
        let mut elem: u64 = if run == 64 { u64::MAX } else { (1u64 << run) - 1 };
        let rot = (immr as u64) & (size - 1);
        let mask = if size == 64 { u64::MAX } else { (1u64 << size) - 1 };
        if rot != 0 {
            elem = ((elem >> rot) | (elem << (size - rot))) & mask;
        }
        let mut value = 0u64;
        let mut shift = 0;
        while shift < 64 {
            value |= elem << shift;
            shift += size;
        }
        value
    }

    #[test]
    fn test_add_reg() {
        let words = assemble(|asm| asm.add(Reg::X0, Reg::X1, Operand::Reg(Reg::X2)));
        assert_eq!(words, vec![0x8B020020]);
    }

    #[test]
    fn test_add_imm() {
        let words = assemble(|asm| asm.add(Reg::X0, Reg::X1, Operand::Imm(16)));
        assert_eq!(words, vec![0x91004020]);
    }

    #[test]
    fn test_add_negative_imm_becomes_sub() {
        let words = assemble(|asm| asm.add(Reg::X0, Reg::X0, Operand::Imm(-16)));
        assert_eq!(words, vec![0xD1004000]);
    }

    #[test]
    fn test_add_shifted_imm() {
        // 0x5000 = 5 << 12, uses the shifted imm12 form.
        let words = assemble(|asm| asm.add(Reg::X0, Reg::X1, Operand::Imm(0x5000)));
        assert_eq!(words, vec![0x91401420]);
    }

    #[test]
    fn test_add_shifted_reg() {
        let words =
            assemble(|asm| asm.add(Reg::X0, Reg::X1, Operand::Shifted(Reg::X2, Shift::Lsl, 3)));
        assert_eq!(words, vec![0x8B020C20]);
    }

    #[test]
    fn test_sub_sp() {
        let words = assemble(|asm| asm.sub(Reg::SP, Reg::SP, Operand::Imm(16)));
        assert_eq!(words, vec![0xD10043FF]);
    }

    #[test]
    fn test_cmp_imm() {
        let words = assemble(|asm| asm.cmp(Reg::X0, Operand::Imm(0)));
        assert_eq!(words, vec![0xF100001F]);
    }

    #[test]
    fn test_mov_reg() {
        let words = assemble(|asm| asm.mov(Reg::X0, Reg::X1));
        // ORR X0, XZR, X1
        assert_eq!(words, vec![0xAA0103E0]);
    }

    #[test]
    fn test_mov_sp_uses_add() {
        let words = assemble(|asm| asm.mov(Reg::SP, Reg::FP));
        // ADD SP, FP, #0
        assert_eq!(words, vec![0x910003BF]);
    }

    #[test]
    fn test_movz() {
        let words = assemble(|asm| asm.movz(Reg::X0, 42, 0));
        assert_eq!(words, vec![0xD2800540]);
    }

    #[test]
    fn test_ldr_offset_scaled() {
        let words = assemble(|asm| asm.ldr(Reg::X0, MemOperand::offset(Reg::X1, 16)));
        // imm12 = 16 / 8 = 2
        assert_eq!(words, vec![0xF9400820]);
    }

    #[test]
    fn test_ldr_post_index() {
        let words = assemble(|asm| asm.ldr(Reg::X0, MemOperand::post_index(Reg::X1, -8)));
        assert_eq!(words, vec![0xF85F8420]);
    }

    #[test]
    fn test_str_pre_index() {
        let words = assemble(|asm| asm.str(Reg::X0, MemOperand::pre_index(Reg::X1, -8)));
        assert_eq!(words, vec![0xF81F8C20]);
    }

    #[test]
    fn test_stp_pre_index() {
        let words = assemble(|asm| asm.stp(Reg::X29, Reg::X30, MemOperand::pre_index(Reg::SP, -16)));
        assert_eq!(words, vec![0xA9BF7BFD]);
    }

    #[test]
    fn test_ldp_post_index() {
        let words = assemble(|asm| asm.ldp(Reg::X29, Reg::X30, MemOperand::post_index(Reg::SP, 16)));
        assert_eq!(words, vec![0xA8C17BFD]);
    }

    #[test]
    fn test_ldrh() {
        let words = assemble(|asm| asm.ldrh(Reg::X0.w(), MemOperand::offset(Reg::X1, 4)));
        assert_eq!(words, vec![0x79400820]);
    }

    #[test]
    fn test_stur_negative_offset() {
        let words = assemble(|asm| asm.stur(Reg::X0, MemOperand::offset(Reg::X1, -8)));
        assert_eq!(words, vec![0xF81F8020]);
    }

    #[test]
    fn test_lsl_lsr_imm() {
        let words = assemble(|asm| {
            asm.lsl_imm(Reg::X0, Reg::X1, 3);
            asm.lsr_imm(Reg::X0, Reg::X1, 3);
        });
        // LSL is UBFM X0, X1, #61, #60; LSR is UBFM X0, X1, #3, #63.
        assert_eq!(words, vec![0xD37DF020, 0xD343FC20]);
    }

    #[test]
    fn test_ret_br_blr() {
        let words = assemble(|asm| {
            asm.ret();
            asm.br(Reg::X16);
            asm.blr(Reg::X17);
        });
        assert_eq!(words, vec![0xD65F03C0, 0xD61F0200, 0xD63F0220]);
    }

    #[test]
    fn test_nop_brk() {
        let words = assemble(|asm| {
            asm.nop();
            asm.brk(0);
        });
        assert_eq!(words, vec![0xD503201F, 0xD4200000]);
    }

    #[test]
    fn test_branch_forward_and_backward() {
        let words = assemble(|asm| {
            let mut top = Label::new();
            let mut out = Label::new();
            asm.bind(&mut top);
            asm.cbz(Reg::X0, &mut out);
            asm.sub(Reg::X0, Reg::X0, Operand::Imm(1));
            asm.b(&mut top);
            asm.bind(&mut out);
            asm.ret();
        });
        // CBZ forward by 3 words, B backward by 2 words.
        assert_eq!(words[0], 0xB4000060);
        assert_eq!(words[2], 0x14000000 | (0x03FF_FFFF & (-2i32 as u32)));
        assert_eq!(words[3], 0xD65F03C0);
    }

    #[test]
    fn test_tbz_bit_above_31() {
        let words = assemble(|asm| {
            let mut l = Label::new();
            asm.tbz(Reg::X0, 48, &mut l);
            asm.bind(&mut l);
        });
        // B5 set, B40 = 16, displacement 1 word.
        assert_eq!(words, vec![0xB6800020]);
    }

    #[test]
    fn test_b_cond() {
        let words = assemble(|asm| {
            let mut l = Label::new();
            asm.b_cond(Cond::Ne, &mut l);
            asm.nop();
            asm.bind(&mut l);
        });
        assert_eq!(words[0], 0x54000041);
    }

    #[test]
    fn test_logical_immediate_simple() {
        // 0xFF is an 8-bit run of ones.
        assert!(LogicalImmediate::create(0xFF, 64).is_some());
        assert!(LogicalImmediate::create(0xFF00, 64).is_some());
        assert!(LogicalImmediate::create(0x5555_5555_5555_5555, 64).is_some());
        assert!(LogicalImmediate::create(0x0000_FFFF_0000_FFFF, 64).is_some());
    }

    #[test]
    fn test_logical_immediate_invalid() {
        assert!(LogicalImmediate::create(0, 64).is_none());
        assert!(LogicalImmediate::create(u64::MAX, 64).is_none());
        assert!(LogicalImmediate::create(0xFFFF_FFFF, 32).is_none());
        assert!(LogicalImmediate::create(0x1_0000_0000, 32).is_none());
        // Two separate runs.
        assert!(LogicalImmediate::create(0xF0F, 64).is_none());
    }

    #[test]
    fn test_logical_immediate_not_a_run() {
        assert!(LogicalImmediate::create(0b101, 64).is_none());
        // A run wrapping around the width only encodes at that width.
        assert!(LogicalImmediate::create(0xFF00_00FF, 32).is_some());
        assert!(LogicalImmediate::create(0xFF00_00FF, 64).is_none());
        assert!(LogicalImmediate::create(0xFF00_00F1, 64).is_none());
    }

    #[test]
    fn test_logical_immediate_sweep_runs() {
        // Every rotation of every run length must encode at width 64.
        for len in 1..64u32 {
            let run = (1u64 << len) - 1;
            for rot in 0..64u32 {
                let val = run.rotate_left(rot);
                assert!(
                    LogicalImmediate::create(val, 64).is_some(),
                    "len {len} rot {rot} should encode"
                );
            }
        }
    }

    #[test]
    fn test_logical_immediate_known_encoding() {
        // ORR X0, XZR, #0xFF: N=1, immr=0, imms=0b000111.
        let li = LogicalImmediate::create(0xFF, 64).unwrap();
        assert_eq!(li.bits(), (1 << 22) | (0b000111 << 10));
    }

    #[test]
    fn test_mov_imm_single_movz() {
        let words = assemble(|asm| asm.mov_imm(Reg::X0, 42));
        assert_eq!(words, vec![0xD2800540]);
    }

    #[test]
    fn test_mov_imm_single_movn() {
        // -1 is all ones: MOVN X0, #0.
        let words = assemble(|asm| asm.mov_imm(Reg::X0, u64::MAX));
        assert_eq!(words, vec![0x92800000]);
    }

    #[test]
    fn test_mov_imm_shifted_movz() {
        let words = assemble(|asm| asm.mov_imm(Reg::X0, 0x1234_0000_0000));
        // Single MOVZ with hw=2.
        assert_eq!(words.len(), 1);
        assert_eq!(words[0], MOVZ | (1 << 31) | (2 << 21) | (0x1234 << 5));
    }

    #[test]
    fn test_mov_imm_orr_bitmask() {
        let words = assemble(|asm| asm.mov_imm(Reg::X0, 0x5555_5555_5555_5555));
        assert_eq!(words.len(), 1);
        assert_eq!(simulate_mov(&words, true), 0x5555_5555_5555_5555);
    }

    #[test]
    fn test_mov_imm_sequences_reproduce_value() {
        let cases: &[u64] = &[
            0,
            1,
            42,
            0xFFFF,
            0x1_0000,
            0xFFFF_FFFF,
            0x1234_5678_9ABC_DEF0,
            0x0000_FFFF_FFFF_0000,
            0xFFFF_0000_0000_FFFF,
            0x00FF_FF00_0000_0000,
            0x5555_5555_0000_1234,
            0xAAAA_AAAA_AAAA_AAAA,
            0x1234_1234_1234_1234,
            0x1234_1234_1234_5678,
            0x1234_5678_1234_5678,
            0x8000_0000_0000_0001,
            u64::MAX - 1,
            u64::MAX,
        ];
        for &imm in cases {
            let words = assemble(|asm| asm.mov_imm(Reg::X0, imm));
            assert!(words.len() <= 4, "{imm:#x} took {} instructions", words.len());
            assert_eq!(simulate_mov(&words, true), imm, "materializing {imm:#x}");
        }
    }

    #[test]
    fn test_mov_imm_w_register() {
        let words = assemble(|asm| asm.mov_imm(Reg::X0.w(), 0x12345678));
        assert!(words.len() <= 2);
        assert_eq!(simulate_mov(&words, false), 0x12345678);
    }

    #[test]
    fn test_csel() {
        let words = assemble(|asm| asm.csel(Reg::X0, Reg::X1, Reg::X2, Cond::Eq));
        assert_eq!(words, vec![0x9A820020]);
    }

    #[test]
    fn test_tst_and_ands() {
        let words = assemble(|asm| asm.tst(Reg::X0, Operand::Imm(0xF)));
        // ANDS XZR, X0, #0xF
        let li = LogicalImmediate::create(0xF, 64).unwrap();
        assert_eq!(words, vec![(1 << 31) | ANDS_IMM | li.bits() | (0 << 5) | 31]);
    }
}
