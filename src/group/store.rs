//! Group store (C4, spec.md §4.3): global name→QueueGroup mapping and
//! send-to-group routing policy.

use std::collections::HashMap;

use log::debug;

use crate::error::MsgError;
use crate::handle::{Handle, HandleTable};
use crate::name::Name;
use crate::queue::QueueStore;

use super::group::{ChangeTag, GroupEntry, Policy, QueueGroup};

fn key(name: &Name) -> Vec<u8> {
    name.as_bytes().to_vec()
}

#[derive(Default)]
pub struct GroupStore {
    table: HandleTable<QueueGroup>,
    index: HashMap<Vec<u8>, Handle>,
}

impl GroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, handle: Handle) -> Result<&QueueGroup, MsgError> {
        self.table.peek(handle)
    }

    pub fn group_mut(&mut self, handle: Handle) -> Result<&mut QueueGroup, MsgError> {
        self.table.peek_mut(handle)
    }

    pub fn find_handle(&self, name: &Name) -> Option<Handle> {
        self.index.get(&key(name)).copied()
    }

    pub fn create(&mut self, name: Name, policy: Policy) -> Result<Handle, MsgError> {
        if self.index.contains_key(&key(&name)) {
            return Err(MsgError::Exist);
        }
        let handle = self.table.create(QueueGroup::new(name.clone(), policy));
        self.index.insert(key(&name), handle);
        Ok(handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &QueueGroup)> {
        self.table.iter()
    }

    /// Re-create `group` during state transfer (spec.md §4.8); see
    /// `QueueStore::insert_at` for why the resulting handle need not match
    /// the sending node's.
    pub fn insert_at(&mut self, name: Name, group: QueueGroup) -> Handle {
        let handle = self.table.create(group);
        self.index.insert(key(&name), handle);
        handle
    }

    /// `insert(group_name, queue_name)` (spec.md §4.3): append
    /// `GroupEntry{queue, change_tag=ADDED}`.
    pub fn insert(
        &mut self,
        group_handle: Handle,
        queue_handle: Handle,
        queue_name: Name,
        owner_node: u32,
    ) -> Result<(), MsgError> {
        let group = self.table.peek_mut(group_handle)?;
        if group.find_member(queue_handle).is_some() {
            return Err(MsgError::Exist);
        }
        group.members.push(GroupEntry {
            queue: queue_handle,
            queue_name,
            owner_node,
            change_tag: ChangeTag::Added,
        });
        Ok(())
    }

    /// `remove(group_name, queue_name)` (spec.md §4.3): tag REMOVED; actual
    /// unlinking from the member list happens in `finish_remove`, after
    /// tracking notifications have observed the REMOVED tag.
    pub fn mark_removed(&mut self, group_handle: Handle, queue_handle: Handle) -> Result<(), MsgError> {
        let group = self.table.peek_mut(group_handle)?;
        let idx = group.find_member(queue_handle).ok_or(MsgError::NotExist)?;
        group.members[idx].change_tag = ChangeTag::Removed;
        Ok(())
    }

    /// Drop members tagged REMOVED, called after `reset_change_tags` would
    /// otherwise have erased the tag a consumer still needed to see.
    pub fn finish_removed(&mut self, group_handle: Handle) -> Result<(), MsgError> {
        let group = self.table.peek_mut(group_handle)?;
        group.members.retain(|m| m.change_tag != ChangeTag::Removed);
        Ok(())
    }

    /// `delete(name)` (spec.md §4.3): group must exist and be empty; members
    /// tagged REMOVED are force-dropped first (they're logically already
    /// gone), but a group with any live member is rejected rather than
    /// silently deleted out from under its remaining members.
    pub fn delete(&mut self, name: &Name) -> Result<Handle, MsgError> {
        let handle = *self.index.get(&key(name)).ok_or(MsgError::NotExist)?;
        self.finish_removed(handle)?;
        if !self.table.peek(handle)?.members.is_empty() {
            return Err(MsgError::InvalidParam("group still has members".into()));
        }
        self.index.remove(&key(name));
        self.table.destroy(handle)?;
        debug!("group {name:?} deleted");
        Ok(handle)
    }

    /// Remove every membership of `queue_handle` across all groups (implicit
    /// removal on queue destruction, spec.md §3 "QueueGroup lifecycle").
    /// Returns the groups that had a member removed, for tracking
    /// notification.
    pub fn remove_queue_everywhere(&mut self, queue_handle: Handle) -> Vec<Handle> {
        let mut touched = Vec::new();
        for &group_handle in self.index.values() {
            if let Ok(group) = self.table.peek_mut(group_handle) {
                if group.find_member(queue_handle).is_some() {
                    let idx = group.find_member(queue_handle).unwrap();
                    group.members[idx].change_tag = ChangeTag::Removed;
                    touched.push(group_handle);
                }
            }
        }
        touched
    }

    /// Select the destination queue handle(s) for a `MessageSend` addressed
    /// to this group, per the routing policy (spec.md §4.3).
    pub fn route(
        &mut self,
        group_handle: Handle,
        queues: &QueueStore,
        originating_node: u32,
    ) -> Result<Vec<Handle>, MsgError> {
        let group = self.table.peek_mut(group_handle)?;
        let active: Vec<&GroupEntry> = group
            .members
            .iter()
            .filter(|m| m.change_tag != ChangeTag::Removed)
            .collect();
        if active.is_empty() {
            return Ok(Vec::new());
        }
        match group.policy {
            Policy::Broadcast => Ok(active.iter().map(|m| m.queue).collect()),
            Policy::RoundRobin => {
                let n = active.len();
                let start = group.round_robin_cursor % n;
                group.round_robin_cursor = (start + 1) % n;
                Ok(vec![active[start].queue])
            }
            Policy::LocalRoundRobin => {
                let local: Vec<&&GroupEntry> = active
                    .iter()
                    .filter(|m| m.owner_node == originating_node)
                    .collect();
                if local.is_empty() {
                    return Ok(Vec::new());
                }
                let n = local.len();
                let start = group.round_robin_cursor % n;
                group.round_robin_cursor = (start + 1) % n;
                Ok(vec![local[start].queue])
            }
            Policy::LocalBestQueue => {
                let local: Vec<&&GroupEntry> = active
                    .iter()
                    .filter(|m| m.owner_node == originating_node)
                    .collect();
                let best = local.iter().min_by_key(|m| {
                    queues
                        .queue(m.queue)
                        .map(|q| q.queue_used.iter().sum::<usize>())
                        .unwrap_or(usize::MAX)
                });
                Ok(best.map(|m| vec![m.queue]).unwrap_or_default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_member(store: &mut GroupStore, group: Handle, qh: Handle, name: &str, node: u32) {
        store
            .insert(group, qh, Name::try_from(name).unwrap(), node)
            .unwrap();
    }

    #[test]
    fn round_robin_cycles_through_members_in_order() {
        let mut store = GroupStore::new();
        let g = store.create(Name::try_from("GA").unwrap(), Policy::RoundRobin).unwrap();
        insert_member(&mut store, g, 10, "Q_A", 1);
        insert_member(&mut store, g, 11, "Q_B", 1);
        insert_member(&mut store, g, 12, "Q_C", 1);
        let queues = QueueStore::new();
        let picks: Vec<Handle> = (0..6)
            .map(|_| store.route(g, &queues, 1).unwrap()[0])
            .collect();
        assert_eq!(picks, vec![10, 11, 12, 10, 11, 12]);
    }

    #[test]
    fn round_robin_skips_removed_members() {
        let mut store = GroupStore::new();
        let g = store.create(Name::try_from("GA").unwrap(), Policy::RoundRobin).unwrap();
        insert_member(&mut store, g, 10, "Q_A", 1);
        insert_member(&mut store, g, 11, "Q_B", 1);
        store.mark_removed(g, 10).unwrap();
        let queues = QueueStore::new();
        let pick = store.route(g, &queues, 1).unwrap();
        assert_eq!(pick, vec![11]);
    }

    #[test]
    fn broadcast_targets_every_active_member() {
        let mut store = GroupStore::new();
        let g = store.create(Name::try_from("GA").unwrap(), Policy::Broadcast).unwrap();
        insert_member(&mut store, g, 10, "Q_A", 1);
        insert_member(&mut store, g, 11, "Q_B", 1);
        let queues = QueueStore::new();
        let picks = store.route(g, &queues, 1).unwrap();
        assert_eq!(picks.len(), 2);
    }

    #[test]
    fn duplicate_create_is_exist() {
        let mut store = GroupStore::new();
        store.create(Name::try_from("GA").unwrap(), Policy::RoundRobin).unwrap();
        assert_eq!(
            store.create(Name::try_from("GA").unwrap(), Policy::RoundRobin).unwrap_err(),
            MsgError::Exist
        );
    }
}
