//! The `QueueGroup` entity (spec.md §3, §4.3).

use crate::handle::Handle as QueueHandle;
use crate::name::Name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    RoundRobin,
    LocalRoundRobin,
    LocalBestQueue,
    Broadcast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeTag {
    NoChange,
    Added,
    Removed,
    StateChanged,
}

/// One member of a [`QueueGroup`], with the change tag assembled into the
/// next tracking notification (spec.md §3, §4.4).
#[derive(Debug, Clone)]
pub struct GroupEntry {
    pub queue: QueueHandle,
    pub queue_name: Name,
    /// Node that owns the queue handle, needed by LOCAL_* routing policies
    /// (spec.md §4.3) since membership is cluster-wide but "local" routing
    /// only considers members whose queue lives on the originating node.
    pub owner_node: u32,
    pub change_tag: ChangeTag,
}

pub struct QueueGroup {
    pub name: Name,
    pub policy: Policy,
    pub members: Vec<GroupEntry>,
    /// Deterministic round-robin cursor, identical on every node because
    /// apply order is identical (spec.md §4.3).
    pub round_robin_cursor: usize,
}

impl QueueGroup {
    pub fn new(name: Name, policy: Policy) -> Self {
        QueueGroup {
            name,
            policy,
            members: Vec::new(),
            round_robin_cursor: 0,
        }
    }

    pub fn find_member(&self, queue: QueueHandle) -> Option<usize> {
        self.members.iter().position(|m| m.queue == queue)
    }

    /// Reset every member's change tag to NO_CHANGE (spec.md §3 invariant 5),
    /// called after tracking notifications for the current mutation step
    /// have been assembled.
    pub fn reset_change_tags(&mut self) {
        for m in &mut self.members {
            m.change_tag = ChangeTag::NoChange;
        }
    }

    pub fn change_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.change_tag != ChangeTag::NoChange)
            .count()
    }
}
