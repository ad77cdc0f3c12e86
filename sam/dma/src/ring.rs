//! Descriptor planning for draining a ring buffer

use sam_core::RingSnapshot;

/// How the unread region of a ring maps onto descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RingSplit {
    /// `head < tail`: one descriptor covering `head..tail`
    NoWrap { length: u16 },
    /// `tail == 0` after a wrap: one descriptor covering `head..capacity`
    WrapsWithEmptyTail { length: u16 },
    /// Wrapped with data at the start: `head..capacity` then `0..tail`
    WrapsWithNonEmptyTail { first: u16, second: u16 },
}

impl RingSplit {
    /// Plan the drain of `ring`, `None` if it is empty
    pub fn plan(ring: &RingSnapshot) -> Option<Self> {
        if ring.is_empty() {
            None
        } else if ring.tail > ring.head {
            Some(RingSplit::NoWrap {
                length: ring.tail - ring.head,
            })
        } else if ring.tail == 0 {
            Some(RingSplit::WrapsWithEmptyTail {
                length: ring.capacity - ring.head,
            })
        } else {
            Some(RingSplit::WrapsWithNonEmptyTail {
                first: ring.capacity - ring.head,
                second: ring.tail,
            })
        }
    }

    /// Bytes moved by the whole chain
    pub const fn total(&self) -> u16 {
        match *self {
            RingSplit::NoWrap { length } | RingSplit::WrapsWithEmptyTail { length } => length,
            RingSplit::WrapsWithNonEmptyTail { first, second } => first + second,
        }
    }

    /// Length of the block starting at the head
    pub const fn first(&self) -> u16 {
        match *self {
            RingSplit::NoWrap { length } | RingSplit::WrapsWithEmptyTail { length } => length,
            RingSplit::WrapsWithNonEmptyTail { first, .. } => first,
        }
    }

    /// Length of the wrapped block at the start of storage, if any
    pub const fn second(&self) -> Option<u16> {
        match *self {
            RingSplit::WrapsWithNonEmptyTail { second, .. } => Some(second),
            _ => None,
        }
    }

    pub const fn descriptor_count(&self) -> usize {
        match self {
            RingSplit::WrapsWithNonEmptyTail { .. } => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(head: u16, tail: u16) -> RingSnapshot {
        RingSnapshot {
            base: 0x2000_0000,
            capacity: 16,
            head,
            tail,
        }
    }

    #[test]
    fn test_plan_cases() {
        assert_eq!(RingSplit::plan(&snap(5, 5)), None);
        assert_eq!(RingSplit::plan(&snap(2, 9)), Some(RingSplit::NoWrap { length: 7 }));
        assert_eq!(
            RingSplit::plan(&snap(12, 0)),
            Some(RingSplit::WrapsWithEmptyTail { length: 4 })
        );
        let split = RingSplit::plan(&snap(10, 4)).unwrap();
        assert_eq!(split, RingSplit::WrapsWithNonEmptyTail { first: 6, second: 4 });
        assert_eq!(split.total(), 10);
        assert_eq!(split.descriptor_count(), 2);
    }
}
