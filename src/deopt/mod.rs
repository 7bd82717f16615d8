//! Deoptimization: rebuilding an interpreter-resumable execution context
//! when optimized code bails out.
//!
//! Runs in two phases. Collect walks the frame chain from the thread's
//! last leave frame to the optimized JS-function frame being abandoned
//! and gathers its stack-map bundle plus the raw call-site pointers
//! needed to read spill slots. Materialize resolves every bundle entry to
//! a boxed value and fills an [`InterpretedContext`] the resume path can
//! execute.

pub mod stackmap;

pub use stackmap::{DeoptBundle, Location, StackMapBuilder, StackMapTable};
pub use stackmap::{ACC_VREG, RESUME_PC_VREG};

use crate::frames::{FrameType, FrameWalker};
use crate::runtime::value::TaggedValue;

fn fatal(msg: &str) -> ! {
    eprintln!("deoptimizer: {msg}");
    std::process::abort();
}

/// Everything the collect phase extracts about one bailout.
pub struct DeoptContext {
    /// The function being deoptimized, read from the frame's argument
    /// vector.
    pub callee: TaggedValue,
    pub bundle: DeoptBundle,
    /// Stack pointer at the optimized frame's call site, for
    /// [`Location::CallSiteSp`] slots.
    pub callsite_sp: u64,
    /// Frame pointer of the optimized frame, for
    /// [`Location::CallSiteFp`] slots.
    pub callsite_fp: u64,
}

/// The resumable interpreter state produced by materialization. Its shape
/// is the contract with the interpreter's resume path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpretedContext {
    pub vregs: Vec<TaggedValue>,
    pub acc: TaggedValue,
    pub env: TaggedValue,
    /// Bytecode offset execution resumes at.
    pub pc_offset: u64,
}

pub struct Deoptimizer<'a> {
    stack_maps: &'a StackMapTable,
}

impl<'a> Deoptimizer<'a> {
    pub fn new(stack_maps: &'a StackMapTable) -> Self {
        Self { stack_maps }
    }

    /// Phase 1: walk from the saved last-leave-frame stack pointer to the
    /// optimized JS-function frame and capture its deopt inputs.
    ///
    /// # Safety
    /// `leave_frame_sp` must point into a well-formed frame chain whose
    /// optimized JS-function frame carries argc/argv above its fixed
    /// words, as the calling convention lays them out.
    pub unsafe fn collect(&self, leave_frame_sp: *const u64) -> DeoptContext {
        let mut walker = unsafe { FrameWalker::new(leave_frame_sp) };
        let mut callsite_sp = 0u64;

        loop {
            if walker.done() {
                fatal("no optimized JS function frame on the stack");
            }
            match walker.frame_type() {
                FrameType::OptimizedJsFunction => break,
                _ => {
                    let sp = walker.prev_frame_call_site_sp();
                    if sp != 0 {
                        callsite_sp = sp;
                    }
                    walker.advance();
                }
            }
        }

        let frame_sp = walker.sp();
        // Fixed words relative to the walker's sp: prevFp at sp, return
        // address one word up, argc and argv above those.
        let return_addr = unsafe { *frame_sp.add(1) };
        let callee = TaggedValue(unsafe { *frame_sp.add(3) });

        let bundle = match self.stack_maps.lookup(return_addr) {
            Some(bundle) => bundle.clone(),
            None => fatal(&format!("no stack map for return address {return_addr:#x}")),
        };

        // Only a direct entry-frame predecessor is understood; bailing
        // out of any other call shape is unimplemented.
        let mut pred = unsafe { FrameWalker::new(frame_sp) };
        pred.advance();
        if pred.done() || pred.frame_type() != FrameType::OptimizedEntry {
            fatal("unsupported predecessor frame for deoptimization");
        }

        DeoptContext {
            callee,
            bundle,
            callsite_sp,
            callsite_fp: frame_sp as u64,
        }
    }

    /// Phase 2: resolve every bundle entry and build the resumable
    /// context. Virtual registers the bundle does not mention stay
    /// undefined.
    ///
    /// # Safety
    /// Spill-slot locations in the bundle must dereference within the
    /// still-live optimized frame the context's pointers describe.
    pub unsafe fn materialize(&self, ctx: &DeoptContext, declared_vregs: u32) -> InterpretedContext {
        let mut out = InterpretedContext {
            vregs: vec![TaggedValue::undefined(); declared_vregs as usize],
            acc: TaggedValue::undefined(),
            env: TaggedValue::undefined(),
            pc_offset: 0,
        };

        for &(vreg, location) in ctx.bundle.entries() {
            let value = unsafe { resolve(location, ctx.callsite_sp, ctx.callsite_fp) };
            match vreg {
                RESUME_PC_VREG => out.pc_offset = value.raw(),
                ACC_VREG => out.acc = value,
                id => {
                    let idx = id as usize;
                    if idx >= out.vregs.len() {
                        fatal(&format!("virtual register {idx} outside declared frame"));
                    }
                    out.vregs[idx] = value;
                }
            }
        }
        out
    }
}

unsafe fn resolve(location: Location, callsite_sp: u64, callsite_fp: u64) -> TaggedValue {
    match location {
        Location::Constant(v) => v,
        Location::CallSiteSp(offset) => {
            let addr = (callsite_sp as i64 + offset as i64) as *const u64;
            TaggedValue(unsafe { *addr })
        }
        Location::CallSiteFp(offset) => {
            let addr = (callsite_fp as i64 + offset as i64) as *const u64;
            TaggedValue(unsafe { *addr })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Synthetic stack: a leave frame, the optimized JS-function frame
    // with argc/argv above it, and an entry frame as its predecessor.
    struct Stack {
        slots: Vec<u64>,
    }

    impl Stack {
        fn addr(&self, idx: usize) -> u64 {
            &self.slots[idx] as *const u64 as u64
        }
    }

    fn build_stack(callee: TaggedValue) -> (Stack, usize) {
        let mut stack = Stack {
            slots: vec![0; 32],
        };
        // Entry frame: [preLeave=0, tag, prevFp]; sp at slot 2.
        stack.slots[1] = FrameType::OptimizedEntry as u64;
        let entry_sp = stack.addr(2);
        // Optimized JS function frame: [tag, prevFp, retAddr, argc, argv0..].
        stack.slots[4] = FrameType::OptimizedJsFunction as u64;
        stack.slots[5] = entry_sp;
        stack.slots[6] = 0x4000; // return address
        stack.slots[7] = 1; // argc
        stack.slots[8] = callee.raw(); // argv[0]
        let opt_sp = stack.addr(5);
        // Leave frame: [tag, callsiteFp, retAddr, rtId, argc]; sp slot 10.
        stack.slots[9] = FrameType::Leave as u64;
        stack.slots[10] = opt_sp;
        (stack, 10)
    }

    #[test]
    fn test_collect_finds_optimized_frame() {
        let callee = TaggedValue(0x1234_5678);
        let (stack, leave_idx) = build_stack(callee);

        let mut builder = StackMapBuilder::new();
        let mut bundle = DeoptBundle::new();
        bundle.push(0, Location::Constant(TaggedValue::from_int(1)));
        builder.record(0x4000, bundle);
        let table = builder.build();

        let deopt = Deoptimizer::new(&table);
        let ctx = unsafe { deopt.collect(&stack.slots[leave_idx] as *const u64) };
        assert_eq!(ctx.callee, callee);
        assert_eq!(ctx.callsite_fp, stack.addr(5));
        // Call-site sp published by the leave frame.
        assert_eq!(ctx.callsite_sp, stack.addr(12));
        assert_eq!(ctx.bundle.entries().len(), 1);
    }

    #[test]
    fn test_materialize_round_trip() {
        let spill = [TaggedValue::from_int(41).raw(), TaggedValue::from_int(42).raw()];
        let sp = spill.as_ptr() as u64;

        let mut bundle = DeoptBundle::new();
        bundle.push(0, Location::Constant(TaggedValue::from_int(7)));
        bundle.push(1, Location::CallSiteSp(0));
        bundle.push(2, Location::CallSiteSp(8));
        bundle.push(ACC_VREG, Location::Constant(TaggedValue::from_int(9)));
        bundle.push(
            RESUME_PC_VREG,
            Location::Constant(TaggedValue(0x30)),
        );

        let mut builder = StackMapBuilder::new();
        builder.record(0x4000, bundle.clone());
        let table = builder.build();
        let deopt = Deoptimizer::new(&table);

        let ctx = DeoptContext {
            callee: TaggedValue::undefined(),
            bundle,
            callsite_sp: sp,
            callsite_fp: 0,
        };
        let resumed = unsafe { deopt.materialize(&ctx, 4) };
        assert_eq!(resumed.vregs.len(), 4);
        assert_eq!(resumed.vregs[0], TaggedValue::from_int(7));
        assert_eq!(resumed.vregs[1], TaggedValue::from_int(41));
        assert_eq!(resumed.vregs[2], TaggedValue::from_int(42));
        // Unmentioned registers default to undefined.
        assert_eq!(resumed.vregs[3], TaggedValue::undefined());
        assert_eq!(resumed.acc, TaggedValue::from_int(9));
        assert_eq!(resumed.pc_offset, 0x30);
    }
}
