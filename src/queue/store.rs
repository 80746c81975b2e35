//! Queue store (C3, spec.md §4.2): global name→Queue mapping.

use std::collections::HashMap;

use enumflags2::BitFlags;
use log::debug;

use crate::error::MsgError;
use crate::handle::{Handle, HandleTable};
use crate::name::Name;

use super::queue::{CreationFlags, OpenFlags, Queue, RetentionState, SizeLimits, Waiter};

/// Snapshot returned by `status_get` (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct QueueStatus {
    pub creation_flags: BitFlags<CreationFlags>,
    pub retention_time_nanos: u64,
    /// Per priority: `(queue_size, queue_used, number_of_messages)`.
    pub per_priority: [(usize, usize, usize); 4],
}

#[derive(Default)]
pub struct QueueStore {
    table: HandleTable<Queue>,
    index: HashMap<Vec<u8>, Handle>,
}

fn key(name: &Name) -> Vec<u8> {
    name.as_bytes().to_vec()
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, handle: Handle) -> Result<&Queue, MsgError> {
        self.table.peek(handle)
    }

    pub fn queue_mut(&mut self, handle: Handle) -> Result<&mut Queue, MsgError> {
        self.table.peek_mut(handle)
    }

    pub fn find_handle(&self, name: &Name) -> Option<Handle> {
        self.index.get(&key(name)).copied()
    }

    /// `open(name, creation_attrs, flags, ...)` (spec.md §4.2). Returns the
    /// queue handle; increments `refcount`.
    pub fn open(
        &mut self,
        name: Name,
        flags: BitFlags<OpenFlags>,
        creation_attrs: Option<(BitFlags<CreationFlags>, SizeLimits, u64)>,
    ) -> Result<Handle, MsgError> {
        if let Some(&handle) = self.index.get(&key(&name)) {
            let q = self.table.peek_mut(handle)?;
            q.refcount += 1;
            q.retention = RetentionState::Live; // reopening cancels retention
            debug!("queue {name:?} reopened, refcount now {}", q.refcount);
            return Ok(handle);
        }

        if !flags.contains(OpenFlags::Create) {
            return Err(MsgError::NotExist);
        }

        let (creation_flags, size_limits, retention) =
            creation_attrs.unwrap_or((BitFlags::empty(), [usize::MAX; 4], 0));
        let mut queue = Queue::new(name.clone(), creation_flags, size_limits, retention);
        queue.refcount = 1;
        let handle = self.table.create(queue);
        self.index.insert(key(&name), handle);
        debug!("queue {name:?} created as handle {handle}");
        Ok(handle)
    }

    /// `close(handle)` (spec.md §4.2): decrement refcount; on zero, schedule
    /// retention or delete immediately. Returns whether the queue was
    /// actually destroyed, so callers can unlink it from any group it
    /// belonged to.
    pub fn close(&mut self, handle: Handle, now_nanos: u64) -> Result<bool, MsgError> {
        let name_key;
        let should_destroy_now;
        {
            let q = self.table.peek_mut(handle)?;
            if q.refcount == 0 {
                return Err(MsgError::BadHandle);
            }
            q.refcount -= 1;
            name_key = key(&q.name);
            if q.refcount == 0 {
                if q.retention_time_nanos > 0 {
                    q.retention = RetentionState::Retained {
                        expiry_nanos: now_nanos + q.retention_time_nanos,
                    };
                    should_destroy_now = false;
                } else {
                    should_destroy_now = true;
                }
            } else {
                should_destroy_now = false;
            }
        }
        if should_destroy_now {
            self.index.remove(&name_key);
            self.table.destroy(handle)?;
        }
        Ok(should_destroy_now)
    }

    /// `unlink(name)` (spec.md §4.2): remove from the name index so no new
    /// opens succeed; existing opens stay live until closed. Returns the
    /// queue's handle and whether it was destroyed outright (refcount was
    /// already zero), so callers can unlink a destroyed queue from any group.
    pub fn unlink(&mut self, name: &Name) -> Result<(Handle, bool), MsgError> {
        let handle = self
            .index
            .remove(&key(name))
            .ok_or(MsgError::NotExist)?;
        let refcount = self.table.peek(handle)?.refcount;
        let destroyed = refcount == 0;
        if destroyed {
            self.table.destroy(handle)?;
        }
        Ok((handle, destroyed))
    }

    pub fn status_get(&self, name: &Name) -> Result<QueueStatus, MsgError> {
        let handle = self.find_handle(name).ok_or(MsgError::NotExist)?;
        let q = self.table.peek(handle)?;
        let mut per_priority = [(0usize, 0usize, 0usize); 4];
        for i in 0..4 {
            per_priority[i] = (q.size_limits[i], q.queue_used[i], q.messages[i].len());
        }
        Ok(QueueStatus {
            creation_flags: q.creation_flags,
            retention_time_nanos: q.retention_time_nanos,
            per_priority,
        })
    }

    /// Sweep queues whose retention has expired, deleting them. Called from
    /// the poll-loop work queue (spec.md §9 "cooperative loop"). Returns each
    /// destroyed queue's handle alongside its name, so callers can unlink it
    /// from any group before the handle is gone for good.
    pub fn sweep_retention(&mut self, now_nanos: u64) -> Vec<(Handle, Name)> {
        let mut expired = Vec::new();
        let mut to_remove = Vec::new();
        for (k, &handle) in self.index.iter() {
            if let Ok(q) = self.table.peek(handle) {
                if let RetentionState::Retained { expiry_nanos } = q.retention {
                    if now_nanos >= expiry_nanos {
                        to_remove.push((k.clone(), handle, q.name.clone()));
                    }
                }
            }
        }
        for (k, handle, name) in to_remove {
            self.index.remove(&k);
            let _ = self.table.destroy(handle);
            expired.push((handle, name));
        }
        expired
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &Queue)> {
        self.table.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut Queue)> {
        self.table.iter_mut()
    }

    /// Re-create `name` during state transfer (spec.md §4.8). The resulting
    /// handle is *not* guaranteed to match the sending node's — only the
    /// steady-state apply sequence guarantees identical handle values across
    /// members, since every node then runs `HandleTable::create` in lockstep
    /// from the same delivered record order. A synced-in node only needs
    /// name-equivalent stores; it resolves members by name afterward.
    pub fn insert_at(&mut self, name: Name, queue: Queue) -> Handle {
        let key = key(&name);
        let handle = self.table.create(queue);
        self.index.insert(key, handle);
        handle
    }

    /// Evict waiters whose deadline has passed, across every queue. Called
    /// from the poll-loop alongside `sweep_retention` (spec.md §4.7 open
    /// question: blocking `MessageGet` needs a timeout path even when no
    /// `Send` ever arrives to wake it).
    pub fn sweep_expired_waiters(&mut self, now_nanos: u64) -> Vec<(Handle, Waiter)> {
        let mut expired = Vec::new();
        for (handle, q) in self.table.iter_mut() {
            let mut remaining = std::collections::VecDeque::new();
            while let Some(w) = q.waiters.pop_front() {
                if w.timeout_nanos <= now_nanos {
                    expired.push((handle, w));
                } else {
                    remaining.push_back(w);
                }
            }
            q.waiters = remaining;
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_create_then_reopen_increments_refcount() {
        let mut store = QueueStore::new();
        let name = Name::try_from("Q1").unwrap();
        let h = store
            .open(name.clone(), BitFlags::from(OpenFlags::Create), Some((BitFlags::empty(), [10; 4], 0)))
            .unwrap();
        assert_eq!(store.queue(h).unwrap().refcount, 1);
        let h2 = store.open(name, BitFlags::empty(), None).unwrap();
        assert_eq!(h, h2);
        assert_eq!(store.queue(h).unwrap().refcount, 2);
    }

    #[test]
    fn open_without_create_on_absent_name_fails() {
        let mut store = QueueStore::new();
        let name = Name::try_from("Missing").unwrap();
        assert_eq!(store.open(name, BitFlags::empty(), None).unwrap_err(), MsgError::NotExist);
    }

    #[test]
    fn close_to_zero_without_retention_deletes_immediately() {
        let mut store = QueueStore::new();
        let name = Name::try_from("Q1").unwrap();
        let h = store
            .open(name.clone(), BitFlags::from(OpenFlags::Create), Some((BitFlags::empty(), [10; 4], 0)))
            .unwrap();
        store.close(h, 0).unwrap();
        assert!(store.find_handle(&name).is_none());
    }

    #[test]
    fn unlink_then_open_create_fails_but_existing_handle_survives() {
        let mut store = QueueStore::new();
        let name = Name::try_from("Q1").unwrap();
        let h = store
            .open(name.clone(), BitFlags::from(OpenFlags::Create), Some((BitFlags::empty(), [10; 4], 0)))
            .unwrap();
        store.unlink(&name).unwrap();
        assert!(store.queue(h).is_ok());
        assert_eq!(
            store.open(name, BitFlags::empty(), None).unwrap_err(),
            MsgError::NotExist
        );
    }

    #[test]
    fn retention_sweep_deletes_expired_queue() {
        let mut store = QueueStore::new();
        let name = Name::try_from("Q1").unwrap();
        let h = store
            .open(
                name.clone(),
                BitFlags::from(OpenFlags::Create),
                Some((BitFlags::empty(), [10; 4], 100)),
            )
            .unwrap();
        store.close(h, 0).unwrap();
        assert!(store.queue(h).is_ok()); // retained
        let expired = store.sweep_retention(50);
        assert!(expired.is_empty());
        let expired = store.sweep_retention(101);
        assert_eq!(expired.len(), 1);
        assert!(store.queue(h).is_err());
    }

    #[test]
    fn reopen_during_retention_cancels_it() {
        let mut store = QueueStore::new();
        let name = Name::try_from("Q1").unwrap();
        let h = store
            .open(
                name.clone(),
                BitFlags::from(OpenFlags::Create),
                Some((BitFlags::empty(), [10; 4], 100)),
            )
            .unwrap();
        store.close(h, 0).unwrap();
        let h2 = store
            .open(name, BitFlags::from(OpenFlags::Create), Some((BitFlags::empty(), [10; 4], 100)))
            .unwrap();
        assert_eq!(h, h2);
        assert_eq!(store.queue(h).unwrap().retention, RetentionState::Live);
    }
}
