//! Membership/state-transfer adapter (C9, spec.md §4.8).
//!
//! Drives a `STEADY -> SYNCING -> STEADY` state machine off the transport's
//! configuration-change events. A join needs a full snapshot of C3/C4 state
//! before the new member can safely apply records against them; a pure
//! leave needs nothing (every surviving member's stores are already
//! consistent). The lowest `node_id` in the new view is the sync driver,
//! mirroring corosync's usual "oldest member" convention for this kind of
//! singleton responsibility.

use log::info;

use crate::apply::ApplyEngine;
use crate::error::MsgResult;
use crate::snapshot;
use crate::transport::{ConfigurationChange, NodeId, RingId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Steady,
    Syncing { ring_id: RingId },
}

/// What the service should do in response to a configuration change, for
/// the caller (spec.md §9 poll-loop) to act on — this module only decides,
/// it doesn't itself touch `Transport`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// No join occurred; nothing to transfer.
    None,
    /// This node is the driver: call `build_snapshot` and send it to the
    /// joining member(s) over the application's own channel (outside
    /// `Transport`'s agreed-multicast path, which only carries `ExecRecord`s).
    BecomeDriver,
    /// This node just joined: stop applying records until a snapshot
    /// arrives and `install_snapshot` has run.
    AwaitSnapshot,
}

pub struct SyncAdapter {
    local_node_id: NodeId,
    state: SyncState,
}

impl SyncAdapter {
    pub fn new(local_node_id: NodeId) -> Self {
        SyncAdapter { local_node_id, state: SyncState::Steady }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn on_configuration_change(&mut self, change: &ConfigurationChange) -> SyncAction {
        if change.joined.is_empty() {
            self.state = SyncState::Steady;
            return SyncAction::None;
        }
        self.state = SyncState::Syncing { ring_id: change.ring_id };
        if change.members.iter().min().copied() == Some(self.local_node_id) {
            info!("ring {} join: this node ({}) is the sync driver", change.ring_id, self.local_node_id);
            SyncAction::BecomeDriver
        } else {
            info!("ring {} join: awaiting snapshot from the driver", change.ring_id);
            SyncAction::AwaitSnapshot
        }
    }

    /// Called once a joining node has installed its snapshot (or once the
    /// driver has finished shipping it to every joiner).
    pub fn mark_steady(&mut self) {
        info!("sync complete, back to steady state");
        self.state = SyncState::Steady;
    }
}

pub fn build_snapshot(engine: &ApplyEngine) -> Vec<u8> {
    snapshot::export(&engine.queues, &engine.groups)
}

pub fn install_snapshot(engine: &mut ApplyEngine, bytes: &[u8]) -> MsgResult<()> {
    let (queues, groups) = snapshot::import(bytes)?;
    engine.queues = queues;
    engine.groups = groups;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(members: Vec<NodeId>, joined: Vec<NodeId>) -> ConfigurationChange {
        ConfigurationChange { members, left: Vec::new(), joined, ring_id: 1 }
    }

    #[test]
    fn pure_leave_needs_no_sync() {
        let mut adapter = SyncAdapter::new(1);
        let action = adapter.on_configuration_change(&change(vec![1], vec![]));
        assert_eq!(action, SyncAction::None);
        assert_eq!(adapter.state(), SyncState::Steady);
    }

    #[test]
    fn lowest_node_id_becomes_driver_on_join() {
        let mut adapter = SyncAdapter::new(1);
        let action = adapter.on_configuration_change(&change(vec![1, 2], vec![2]));
        assert_eq!(action, SyncAction::BecomeDriver);
    }

    #[test]
    fn joining_node_awaits_snapshot() {
        let mut adapter = SyncAdapter::new(2);
        let action = adapter.on_configuration_change(&change(vec![1, 2], vec![2]));
        assert_eq!(action, SyncAction::AwaitSnapshot);
        assert_eq!(adapter.state(), SyncState::Syncing { ring_id: 1 });
    }
}
