//! Stack-map records describing where an optimized frame keeps each
//! virtual register, keyed by the native return address of the call site
//! that can bail out.

use std::collections::BTreeMap;

use crate::runtime::value::TaggedValue;

/// Reserved virtual-register id carrying the resume bytecode offset.
pub const RESUME_PC_VREG: u16 = 0xFFFF;
/// Reserved virtual-register id carrying the accumulator.
pub const ACC_VREG: u16 = 0xFFFE;

/// Where one virtual register's value lives at a deopt point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Literal embedded in the stack map.
    Constant(TaggedValue),
    /// Spill slot at a byte offset from the call-site stack pointer.
    CallSiteSp(i32),
    /// Spill slot at a byte offset from the call-site frame pointer.
    CallSiteFp(i32),
}

/// Flat per-call-site list of virtual-register locations.
#[derive(Debug, Clone, Default)]
pub struct DeoptBundle {
    entries: Vec<(u16, Location)>,
}

impl DeoptBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, vreg: u16, location: Location) {
        self.entries.push((vreg, location));
    }

    pub fn entries(&self) -> &[(u16, Location)] {
        &self.entries
    }
}

/// Accumulates per-call-site bundles during code generation.
#[derive(Default)]
pub struct StackMapBuilder {
    records: Vec<(u64, DeoptBundle)>,
}

impl StackMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the bundle for the call whose return address is `ret_addr`.
    pub fn record(&mut self, ret_addr: u64, bundle: DeoptBundle) {
        self.records.push((ret_addr, bundle));
    }

    /// Freeze into a lookup table. Two records for one return address is
    /// a code-generator bug.
    pub fn build(self) -> StackMapTable {
        let mut map = BTreeMap::new();
        for (addr, bundle) in self.records {
            let clash = map.insert(addr, bundle);
            assert!(clash.is_none(), "duplicate stack map for {addr:#x}");
        }
        StackMapTable { map }
    }
}

/// Immutable return-address-keyed bundle table.
pub struct StackMapTable {
    map: BTreeMap<u64, DeoptBundle>,
}

impl StackMapTable {
    pub fn lookup(&self, ret_addr: u64) -> Option<&DeoptBundle> {
        self.map.get(&ret_addr)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
