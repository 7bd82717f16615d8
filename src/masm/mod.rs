//! Machine code emission: code buffer, labels, executable memory, and the
//! two instruction encoders.
//!
//! Both assemblers borrow a [`codebuf::CodeBuffer`] mutably and append
//! encoded instructions to it. Control flow inside a generated routine is
//! expressed with [`Label`]s: a branch to a not-yet-bound label emits a
//! placeholder and records a patch site, and binding the label rewrites
//! every recorded site with the final displacement.

pub mod codebuf;
#[cfg(feature = "jit")]
pub mod memory;

pub mod aarch64;
pub mod x86_64;

use codebuf::CodeBuffer;

// ==================== Labels ====================

/// The displacement field a patch site carries, which determines both the
/// placeholder layout and how the final displacement is packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchClass {
    /// 26-bit word displacement in bits 25:0 (unconditional branch / call).
    Imm26,
    /// 19-bit word displacement in bits 23:5 (conditional and compare
    /// branches).
    Imm19,
    /// 14-bit word displacement in bits 18:5 (test-bit branches).
    Imm14,
    /// 32-bit byte displacement relative to the end of the field.
    Rel32,
    /// 8-bit byte displacement relative to the end of the field.
    Rel8,
}

/// A pending branch waiting for its target.
#[derive(Debug, Clone, Copy)]
struct PatchSite {
    /// Offset of the displacement field (AArch64: the instruction word;
    /// x86-64: the rel8/rel32 field itself).
    pos: usize,
    class: BranchClass,
}

/// A code position that branches can target before it is known.
///
/// Labels are single-use: binding twice panics, and dropping a label that
/// still has unresolved references panics, since that would leave garbage
/// displacements in the emitted code.
#[derive(Debug, Default)]
pub struct Label {
    bound: Option<usize>,
    patches: Vec<PatchSite>,
}

impl Label {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bound offset, if `bind` has run.
    pub fn target(&self) -> Option<usize> {
        self.bound
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Record a displacement field at `pos` to be patched at bind time.
    /// Returns the target immediately if the label is already bound, in
    /// which case nothing is recorded and the caller encodes directly.
    pub fn link(&mut self, pos: usize, class: BranchClass) -> Option<usize> {
        match self.bound {
            Some(target) => Some(target),
            None => {
                self.patches.push(PatchSite { pos, class });
                None
            }
        }
    }

    /// Bind the label to the current end of `buf` and patch every recorded
    /// site. Panics if the label is already bound or if a displacement does
    /// not fit its field, both of which are bugs in the routine being
    /// assembled.
    pub fn bind(&mut self, buf: &mut CodeBuffer) {
        assert!(self.bound.is_none(), "label bound twice");
        let target = buf.offset();
        self.bound = Some(target);
        for site in self.patches.drain(..) {
            patch_site(buf, site, target);
        }
    }
}

impl Drop for Label {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            assert!(
                self.patches.is_empty(),
                "label dropped with unresolved branches"
            );
        }
    }
}

fn patch_site(buf: &mut CodeBuffer, site: PatchSite, target: usize) {
    match site.class {
        BranchClass::Imm26 | BranchClass::Imm19 | BranchClass::Imm14 => {
            let disp = target as i64 - site.pos as i64;
            debug_assert_eq!(disp & 3, 0);
            let word = buf.get_u32(site.pos);
            buf.put_u32(site.pos, pack_branch_disp(word, site.class, disp));
        }
        BranchClass::Rel32 => {
            let disp = target as i64 - (site.pos as i64 + 4);
            assert!(
                disp >= i32::MIN as i64 && disp <= i32::MAX as i64,
                "rel32 branch displacement out of range"
            );
            buf.put_u32(site.pos, disp as i32 as u32);
        }
        BranchClass::Rel8 => {
            let disp = target as i64 - (site.pos as i64 + 1);
            assert!(
                disp >= i8::MIN as i64 && disp <= i8::MAX as i64,
                "rel8 branch displacement out of range"
            );
            buf.put_u8(site.pos, disp as i8 as u8);
        }
    }
}

/// Pack a word displacement into the branch instruction at a patch site.
/// The placeholder field is all zero, so OR-ing the field in is enough.
pub(crate) fn pack_branch_disp(word: u32, class: BranchClass, disp: i64) -> u32 {
    let imm = disp >> 2;
    match class {
        BranchClass::Imm26 => {
            assert!(
                imm >= -(1 << 25) && imm < (1 << 25),
                "imm26 branch displacement out of range"
            );
            word | ((imm as u32) & 0x03FF_FFFF)
        }
        BranchClass::Imm19 => {
            assert!(
                imm >= -(1 << 18) && imm < (1 << 18),
                "imm19 branch displacement out of range"
            );
            word | (((imm as u32) & 0x7_FFFF) << 5)
        }
        BranchClass::Imm14 => {
            assert!(
                imm >= -(1 << 13) && imm < (1 << 13),
                "imm14 branch displacement out of range"
            );
            word | (((imm as u32) & 0x3FFF) << 5)
        }
        BranchClass::Rel32 | BranchClass::Rel8 => unreachable!("byte-relative class"),
    }
}
