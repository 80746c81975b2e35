//! Densely-packed handle table (C2, spec.md §4.1).
//!
//! A direct port of the `hdb_handle_database` technique in
//! `original_source/include/hdb.h`: a growable array of slots, each either
//! empty, active, or pending removal, plus a refcount. We trade the original's
//! raw pointers for an `Owned<T>` stored inline, and opaque integer handles
//! instead of pointers, so that queues/groups can hold handles as plain data
//! without unsafe code.

use crate::error::MsgError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Empty,
    Active,
    PendingRemoval,
}

struct Slot<T> {
    state: SlotState,
    refcount: u32,
    instance: Option<T>,
}

/// Opaque integer handle into a [`HandleTable`]. Stable identity for the
/// lifetime of the instance it names; never reused while a client may still
/// hold it, because reuse only happens once the refcount has dropped to zero
/// and the slot has been swept.
pub type Handle = u32;

pub struct HandleTable<T> {
    slots: Vec<Slot<T>>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        HandleTable { slots: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        HandleTable {
            slots: Vec::with_capacity(cap),
        }
    }

    /// Allocate a slot for `instance`, returning its handle with refcount 1.
    pub fn create(&mut self, instance: T) -> Handle {
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.state == SlotState::Empty {
                slot.state = SlotState::Active;
                slot.refcount = 1;
                slot.instance = Some(instance);
                return idx as Handle;
            }
        }
        self.slots.push(Slot {
            state: SlotState::Active,
            refcount: 1,
            instance: Some(instance),
        });
        (self.slots.len() - 1) as Handle
    }

    fn slot(&self, handle: Handle) -> Result<&Slot<T>, MsgError> {
        self.slots.get(handle as usize).ok_or(MsgError::BadHandle)
    }

    fn slot_mut(&mut self, handle: Handle) -> Result<&mut Slot<T>, MsgError> {
        self.slots.get_mut(handle as usize).ok_or(MsgError::BadHandle)
    }

    /// Look up `handle`, incrementing its refcount. Errors if the slot is not
    /// ACTIVE (includes PENDING_REMOVAL, per spec.md §4.1).
    pub fn get(&mut self, handle: Handle) -> Result<&T, MsgError> {
        let slot = self.slot_mut(handle)?;
        if slot.state != SlotState::Active {
            return Err(MsgError::BadHandle);
        }
        slot.refcount += 1;
        Ok(slot.instance.as_ref().expect("active slot always holds an instance"))
    }

    /// Borrow without touching the refcount — used by the apply engine where
    /// a handle is already known live for the duration of the call.
    pub fn peek(&self, handle: Handle) -> Result<&T, MsgError> {
        let slot = self.slot(handle)?;
        if slot.state == SlotState::Empty {
            return Err(MsgError::BadHandle);
        }
        Ok(slot.instance.as_ref().expect("non-empty slot always holds an instance"))
    }

    pub fn peek_mut(&mut self, handle: Handle) -> Result<&mut T, MsgError> {
        let slot = self.slot_mut(handle)?;
        if slot.state == SlotState::Empty {
            return Err(MsgError::BadHandle);
        }
        Ok(slot.instance.as_mut().expect("non-empty slot always holds an instance"))
    }

    /// Decrement refcount; sweep (drop the instance, zero the slot) if it
    /// reaches zero while PENDING_REMOVAL.
    pub fn put(&mut self, handle: Handle) -> Result<(), MsgError> {
        let slot = self.slot_mut(handle)?;
        if slot.refcount == 0 {
            return Err(MsgError::BadHandle);
        }
        slot.refcount -= 1;
        if slot.refcount == 0 && slot.state == SlotState::PendingRemoval {
            slot.state = SlotState::Empty;
            slot.instance = None;
        }
        Ok(())
    }

    /// Mark PENDING_REMOVAL and release the caller's reference.
    pub fn destroy(&mut self, handle: Handle) -> Result<(), MsgError> {
        {
            let slot = self.slot_mut(handle)?;
            if slot.state == SlotState::Empty {
                return Err(MsgError::BadHandle);
            }
            slot.state = SlotState::PendingRemoval;
        }
        self.put(handle)
    }

    pub fn is_active(&self, handle: Handle) -> bool {
        matches!(self.slot(handle), Ok(s) if s.state == SlotState::Active)
    }

    /// Iterate live (ACTIVE or PENDING_REMOVAL) slots with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            if slot.state == SlotState::Empty {
                None
            } else {
                slot.instance.as_ref().map(|inst| (idx as Handle, inst))
            }
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(idx, slot)| {
            if slot.state == SlotState::Empty {
                None
            } else {
                slot.instance.as_mut().map(|inst| (idx as Handle, inst))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_get_put_roundtrip() {
        let mut table = HandleTable::new();
        let h = table.create(42u32);
        assert_eq!(*table.get(h).unwrap(), 42);
        table.put(h).unwrap(); // release the get()
        table.put(h).unwrap(); // release the create()
        assert!(table.is_active(h));
    }

    #[test]
    fn destroy_defers_until_refcount_zero() {
        let mut table = HandleTable::new();
        let h = table.create("q".to_string());
        table.get(h).unwrap(); // simulate a second reference
        table.destroy(h).unwrap(); // releases the create() ref, one remains
        assert!(!table.is_active(h));
        assert!(table.peek(h).is_ok()); // still present, pending removal
        table.put(h).unwrap(); // release the outstanding get()
        assert!(table.peek(h).is_err()); // swept
    }

    #[test]
    fn bad_handle_on_unknown_index() {
        let table: HandleTable<u32> = HandleTable::new();
        assert_eq!(table.peek(0).unwrap_err(), MsgError::BadHandle);
    }

    #[test]
    fn reuses_empty_slot_before_growing() {
        let mut table = HandleTable::new();
        let h0 = table.create(1u32);
        table.destroy(h0).unwrap();
        let h1 = table.create(2u32);
        assert_eq!(h0, h1);
    }
}
