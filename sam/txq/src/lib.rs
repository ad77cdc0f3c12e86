#![no_std]
#![forbid(unsafe_code)]

//! # Transaction Queue
//!
//! Fixed-capacity ring of transaction slots shared by the SPI and I2C
//! drivers. Each slot carries a driver-specific payload plus the
//! `valid`/`active`/`done` life cycle flags:
//!
//! ```text
//! add() -> set_valid() -> next() + activate() -> set_done() -> invalidate()
//! ```
//!
//! At most one slot is active at a time, and an active slot can never be
//! invalidated. Slots are picked by scanning forward from the slot after the
//! last dispatched one (`head + 1`), wrapping around. That scan is not a
//! strict FIFO: a request placed in a slot just after the head can start
//! before an older one sitting in a lower slot.

mod fmt;

use sam_core::{PResult, PeriphError};

/// Index of a slot in a [`TransactionQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Slot(usize);

impl Slot {
    pub const fn index(self) -> usize {
        self.0
    }
}

/// One transaction slot
#[derive(Debug)]
pub struct Transaction<T> {
    payload: T,
    id: u8,
    valid: bool,
    active: bool,
    done: bool,
}

impl<T> Transaction<T> {
    const fn new(payload: T) -> Self {
        Self {
            payload,
            id: 0,
            valid: false,
            active: false,
            done: false,
        }
    }

    /// Transaction id assigned when the slot was claimed
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut T {
        &mut self.payload
    }
}

/// Queue of `N` transaction slots carrying payloads of type `T`
pub struct TransactionQueue<T, const N: usize> {
    slots: [Transaction<T>; N],
    head: usize,
    next_id: u8,
}

impl<T: Default, const N: usize> TransactionQueue<T, N> {
    /// Create a queue with every slot free
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Transaction::new(T::default())),
            head: 0,
            next_id: 0,
        }
    }

    /// Move the payload out of a slot, leaving the default behind
    pub fn take_payload(&mut self, slot: Slot) -> T {
        core::mem::take(&mut self.slots[slot.0].payload)
    }
}

impl<T: Default, const N: usize> Default for TransactionQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> TransactionQueue<T, N> {
    /// Get the number of slots
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Scan forward from `head + 1`, wrapping, for the first matching slot
    fn scan_from_head(&self, mut pred: impl FnMut(&Transaction<T>) -> bool) -> Option<usize> {
        (1..=N)
            .map(|offset| (self.head + offset) % N)
            .find(|&i| pred(&self.slots[i]))
    }

    /// Claim a free slot and assign it the next id.
    ///
    /// The slot is not valid until [`set_valid`](Self::set_valid) is called,
    /// so two calls without an intervening `set_valid` return the same slot.
    /// Returns `None` when every slot is in use, which is a normal condition
    /// the caller retries later.
    pub fn add(&mut self) -> Option<Slot> {
        let Some(i) = self.scan_from_head(|t| !t.valid) else {
            debug!("transaction queue full");
            return None;
        };
        let slot = &mut self.slots[i];
        slot.active = false;
        slot.done = false;
        slot.id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        Some(Slot(i))
    }

    /// Mark a claimed slot as holding a transaction
    pub fn set_valid(&mut self, slot: Slot) {
        self.slots[slot.0].valid = true;
    }

    /// Select the next transaction to start and make it the head
    pub fn next(&mut self) -> Option<Slot> {
        let i = self.scan_from_head(|t| t.valid && !t.active && !t.done)?;
        self.head = i;
        Some(Slot(i))
    }

    /// Make `slot` the head when the caller picks the next transaction
    /// itself instead of scanning with [`next`](Self::next)
    pub fn select(&mut self, slot: Slot) {
        self.head = slot.0;
    }

    /// Slot most recently returned by [`next`](Self::next) or passed to
    /// [`select`](Self::select)
    pub fn head(&self) -> Slot {
        Slot(self.head)
    }

    /// Check whether the head transaction is being serviced
    pub fn head_active(&self) -> bool {
        self.slots[self.head].active
    }

    /// The active transaction, if any
    pub fn get_active(&self) -> Option<Slot> {
        if self.head_active() {
            Some(Slot(self.head))
        } else {
            None
        }
    }

    /// Find the valid transaction with the given id
    pub fn get(&self, id: u8) -> Option<Slot> {
        self.slots
            .iter()
            .position(|t| t.valid && t.id == id)
            .map(Slot)
    }

    /// Mark a transaction as being serviced.
    ///
    /// Fails with `Busy` if another slot is already active.
    pub fn activate(&mut self, slot: Slot) -> PResult<()> {
        let other_active = self
            .slots
            .iter()
            .enumerate()
            .any(|(i, t)| t.active && i != slot.0);
        if other_active {
            return Err(PeriphError::Busy);
        }
        self.slots[slot.0].active = true;
        Ok(())
    }

    /// Free a slot, rejecting active transactions
    pub fn invalidate(&mut self, slot: Slot) -> PResult<()> {
        let t = &mut self.slots[slot.0];
        if t.active {
            return Err(PeriphError::Busy);
        }
        t.valid = false;
        Ok(())
    }

    /// Free the slot holding transaction `id`
    pub fn invalidate_id(&mut self, id: u8) -> PResult<()> {
        let slot = self.get(id).ok_or(PeriphError::NotFound)?;
        self.invalidate(slot)
    }

    pub fn is_done(&self, slot: Slot) -> bool {
        self.slots[slot.0].done
    }

    /// Check whether transaction `id` has finished.
    ///
    /// An id with no valid slot counts as done: it either finished and was
    /// cleared or never existed, and either way there is nothing to wait for.
    pub fn is_done_id(&self, id: u8) -> bool {
        self.get(id).map_or(true, |slot| self.is_done(slot))
    }

    /// Mark a transaction as finished and no longer active
    pub fn set_done(&mut self, slot: Slot) {
        let t = &mut self.slots[slot.0];
        t.done = true;
        t.active = false;
    }

    /// Re-arm a finished transaction so it can be serviced again
    pub fn clear_done(&mut self, slot: Slot) {
        self.slots[slot.0].done = false;
    }

    /// Number of slots not holding a valid transaction
    pub fn free_slots(&self) -> usize {
        self.slots.iter().filter(|t| !t.valid).count()
    }

    pub fn transaction(&self, slot: Slot) -> &Transaction<T> {
        &self.slots[slot.0]
    }

    pub fn payload(&self, slot: Slot) -> &T {
        &self.slots[slot.0].payload
    }

    pub fn payload_mut(&mut self, slot: Slot) -> &mut T {
        &mut self.slots[slot.0].payload
    }

    /// Count of active slots, at most one
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|t| t.active).count()
    }
}
