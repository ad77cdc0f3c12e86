//! Fake PORT controller

use std::cell::RefCell;
use std::collections::BTreeMap;

use sam_sercom::PortRegisters;

/// A level change on a set of pins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinEdge {
    pub group: u8,
    pub mask: u32,
    pub high: bool,
}

/// PORT fake. Every pin starts high; only writes that change a level are
/// recorded as edges.
#[derive(Debug, Default)]
pub struct FakePort {
    low: RefCell<BTreeMap<u8, u32>>,
    edges: RefCell<Vec<PinEdge>>,
}

impl FakePort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edges(&self) -> Vec<PinEdge> {
        self.edges.borrow().clone()
    }

    pub fn is_low(&self, group: u8, mask: u32) -> bool {
        self.low.borrow().get(&group).copied().unwrap_or(0) & mask == mask
    }
}

impl PortRegisters for FakePort {
    fn set_pins(&self, group: u8, mask: u32) {
        let mut low = self.low.borrow_mut();
        let levels = low.entry(group).or_insert(0);
        let changed = *levels & mask;
        *levels &= !mask;
        if changed != 0 {
            self.edges.borrow_mut().push(PinEdge {
                group,
                mask: changed,
                high: true,
            });
        }
    }

    fn clear_pins(&self, group: u8, mask: u32) {
        let mut low = self.low.borrow_mut();
        let levels = low.entry(group).or_insert(0);
        let changed = !*levels & mask;
        *levels |= mask;
        if changed != 0 {
            self.edges.borrow_mut().push(PinEdge {
                group,
                mask: changed,
                high: false,
            });
        }
    }
}
