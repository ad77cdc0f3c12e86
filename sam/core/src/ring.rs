//! Fixed-capacity byte ring buffer
//!
//! The buffer keeps one slot open so that `head == tail` always means empty.
//! All state lives behind a critical-section mutex: producers push from
//! foreground code while the DMA completion interrupt advances the head.

use core::cell::RefCell;
use critical_section::Mutex;

/// Point-in-time view of a ring used to plan a DMA drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingSnapshot {
    /// Bus address of the first storage byte
    pub base: u32,
    pub capacity: u16,
    pub head: u16,
    pub tail: u16,
}

impl RingSnapshot {
    pub const fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Number of unread bytes between head and tail
    pub const fn len(&self) -> u16 {
        if self.tail >= self.head {
            self.tail - self.head
        } else {
            (self.capacity - self.head) + self.tail
        }
    }
}

/// Ring buffer view used by the DMA layer.
///
/// Object safe so a DMA controller can keep `&dyn DmaRing` records per
/// channel without knowing the ring's capacity.
pub trait DmaRing {
    /// Current storage address, capacity, head and tail
    fn snapshot(&self) -> RingSnapshot;

    /// Discard `length` bytes from the head, never passing the tail
    fn move_head(&self, length: u16);
}

struct RingState<const N: usize> {
    storage: [u8; N],
    head: u16,
    tail: u16,
}

impl<const N: usize> RingState<N> {
    const fn capacity(&self) -> u16 {
        N as u16
    }

    fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    fn is_full(&self) -> bool {
        (self.tail + 1) % self.capacity() == self.head
    }

    fn advance(&self, index: u16) -> u16 {
        (index + 1) % self.capacity()
    }

    fn move_head(&mut self, length: u16) {
        let cap = self.capacity() as u32;
        let head = self.head as u32;
        let tail = self.tail as u32;
        let len = length as u32;

        if self.is_empty() {
            return;
        }
        if head < tail {
            self.head = if head + len < tail { (head + len) as u16 } else { self.tail };
        } else if head + len < cap {
            self.head = (head + len) as u16;
        } else if (head + len) % cap < tail {
            self.head = ((head + len) % cap) as u16;
        } else {
            self.head = self.tail;
        }
    }
}

/// Byte ring buffer with `N` slots, one of which is always kept free
pub struct CircularBuffer<const N: usize> {
    state: Mutex<RefCell<RingState<N>>>,
}

impl<const N: usize> CircularBuffer<N> {
    const CAPACITY_OK: () = assert!(N > 1 && N <= u16::MAX as usize);

    /// Create an empty ring
    pub const fn new() -> Self {
        let () = Self::CAPACITY_OK;
        Self {
            state: Mutex::new(RefCell::new(RingState {
                storage: [0; N],
                head: 0,
                tail: 0,
            })),
        }
    }

    /// Get the capacity of the ring
    pub const fn capacity(&self) -> u16 {
        N as u16
    }

    /// Insert a byte at the tail, overwriting the oldest byte when full
    pub fn push(&self, value: u8) {
        critical_section::with(|cs| {
            let mut ring = self.state.borrow_ref_mut(cs);
            let tail = ring.tail as usize;
            ring.storage[tail] = value;
            ring.tail = ring.advance(ring.tail);
            if ring.tail == ring.head {
                ring.head = ring.advance(ring.head);
            }
        })
    }

    /// Insert a byte only if there is space, handing it back otherwise
    pub fn try_push(&self, value: u8) -> Result<(), u8> {
        critical_section::with(|cs| {
            let mut ring = self.state.borrow_ref_mut(cs);
            if ring.is_full() {
                return Err(value);
            }
            let tail = ring.tail as usize;
            ring.storage[tail] = value;
            ring.tail = ring.advance(ring.tail);
            Ok(())
        })
    }

    /// Remove and return the byte at the head
    pub fn pop(&self) -> Option<u8> {
        critical_section::with(|cs| {
            let mut ring = self.state.borrow_ref_mut(cs);
            if ring.is_empty() {
                return None;
            }
            let value = ring.storage[ring.head as usize];
            ring.head = ring.advance(ring.head);
            Some(value)
        })
    }

    /// Return the byte at the head without removing it
    pub fn peek(&self) -> Option<u8> {
        critical_section::with(|cs| {
            let ring = self.state.borrow_ref(cs);
            if ring.is_empty() {
                None
            } else {
                Some(ring.storage[ring.head as usize])
            }
        })
    }

    /// Remove the most recently pushed byte
    pub fn unpush(&self) -> Option<u8> {
        critical_section::with(|cs| {
            let mut ring = self.state.borrow_ref_mut(cs);
            if ring.is_empty() {
                return None;
            }
            ring.tail = if ring.tail == 0 { ring.capacity() - 1 } else { ring.tail - 1 };
            Some(ring.storage[ring.tail as usize])
        })
    }

    /// Number of bytes stored
    pub fn len(&self) -> u16 {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).is_empty())
    }

    pub fn is_full(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).is_full())
    }

    /// Length of the run of unread bytes starting at the head that does not
    /// wrap around the end of storage
    pub fn contiguous_head(&self) -> u16 {
        critical_section::with(|cs| {
            let ring = self.state.borrow_ref(cs);
            if ring.is_empty() {
                0
            } else if ring.head > ring.tail {
                ring.capacity() - ring.head
            } else {
                ring.tail - ring.head
            }
        })
    }

    /// Check whether `value` is among the unread bytes
    pub fn has_byte(&self, value: u8) -> bool {
        critical_section::with(|cs| {
            let ring = self.state.borrow_ref(cs);
            let mut i = ring.head;
            while i != ring.tail {
                if ring.storage[i as usize] == value {
                    return true;
                }
                i = ring.advance(i);
            }
            false
        })
    }

    /// Check whether the unread bytes contain a complete `"\r\n"` line ending
    pub fn has_line(&self) -> bool {
        critical_section::with(|cs| {
            let ring = self.state.borrow_ref(cs);
            let mut i = ring.head;
            while i != ring.tail {
                let next = ring.advance(i);
                if ring.storage[i as usize] == b'\r'
                    && next != ring.tail
                    && ring.storage[next as usize] == b'\n'
                {
                    return true;
                }
                i = next;
            }
            false
        })
    }

    /// Reset to the empty state
    pub fn clear(&self) {
        critical_section::with(|cs| {
            let mut ring = self.state.borrow_ref_mut(cs);
            ring.head = 0;
            ring.tail = 0;
        })
    }

    /// Force head and tail, used to stage a specific layout
    pub fn set_positions(&self, head: u16, tail: u16) {
        critical_section::with(|cs| {
            let mut ring = self.state.borrow_ref_mut(cs);
            ring.head = head % ring.capacity();
            ring.tail = tail % ring.capacity();
        })
    }
}

impl<const N: usize> DmaRing for CircularBuffer<N> {
    fn snapshot(&self) -> RingSnapshot {
        critical_section::with(|cs| {
            let ring = self.state.borrow_ref(cs);
            RingSnapshot {
                base: ring.storage.as_ptr() as usize as u32,
                capacity: ring.capacity(),
                head: ring.head,
                tail: ring.tail,
            }
        })
    }

    fn move_head(&self, length: u16) {
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).move_head(length))
    }
}

impl<const N: usize> Default for CircularBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
