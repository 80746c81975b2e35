//! Tracking engine (C5, spec.md §4.4): per-group subscriptions and
//! notification assembly.

use enumflags2::{bitflags, BitFlags};

use crate::error::MsgError;
use crate::handle::Handle as GroupHandle;
use crate::ipc::{ConnHandle, DispatchHandle};
use crate::name::Name;

use super::group::{ChangeTag, QueueGroup};

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackFlags {
    /// One-shot snapshot of current members, delivered once at subscribe
    /// time; never persists as a streaming subscription on its own.
    Current = 0b001,
    Changes = 0b010,
    ChangesOnly = 0b100,
}

/// `(client_id, group_ref, track_flags, tracking_context)` (spec.md §3).
/// Only installed when `flags` includes CHANGES or CHANGES_ONLY — a
/// CURRENT-only request is satisfied synchronously and never stored.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub client_id: u64,
    pub conn: ConnHandle,
    pub dispatch: DispatchHandle,
    pub context: u64,
    pub flags: BitFlags<TrackFlags>,
}

/// A tracking notification ready to be framed and dispatched (C8).
#[derive(Debug, Clone)]
pub struct Notification {
    pub conn: ConnHandle,
    pub dispatch: DispatchHandle,
    pub context: u64,
    pub entries: Vec<(Name, ChangeTag)>,
}

/// A one-shot CURRENT snapshot (spec.md §4.3 `track`).
#[derive(Debug, Clone)]
pub struct CurrentSnapshot {
    pub entries: Vec<(Name, ChangeTag)>,
}

#[derive(Default)]
pub struct TrackingEngine {
    subscriptions: std::collections::HashMap<GroupHandle, Vec<Subscription>>,
}

impl TrackingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// `track(name, flags, with_current_buffer)` (spec.md §4.3). Returns a
    /// one-shot snapshot when `flags` includes CURRENT; the caller decides,
    /// via `with_current_buffer`, whether to fold it into the synchronous
    /// response or dispatch it asynchronously (spec.md §4.3).
    pub fn track(
        &mut self,
        group_handle: GroupHandle,
        group: &QueueGroup,
        client_id: u64,
        conn: ConnHandle,
        dispatch: DispatchHandle,
        flags: BitFlags<TrackFlags>,
        context: u64,
    ) -> Option<CurrentSnapshot> {
        let streaming = flags.intersects(TrackFlags::Changes | TrackFlags::ChangesOnly);
        if streaming {
            let subs = self.subscriptions.entry(group_handle).or_default();
            subs.retain(|s| s.client_id != client_id); // re-subscribe replaces
            subs.push(Subscription {
                client_id,
                conn,
                dispatch,
                context,
                flags,
            });
        }
        if flags.contains(TrackFlags::Current) {
            Some(CurrentSnapshot {
                entries: group
                    .members
                    .iter()
                    .map(|m| (m.queue_name.clone(), m.change_tag))
                    .collect(),
            })
        } else {
            None
        }
    }

    /// `track_stop(name)` (spec.md §4.3): `NotExist` if the client has no
    /// streaming subscription on this group.
    pub fn track_stop(&mut self, group_handle: GroupHandle, client_id: u64) -> Result<(), MsgError> {
        match self.subscriptions.get_mut(&group_handle) {
            Some(subs) => {
                let before = subs.len();
                subs.retain(|s| s.client_id != client_id);
                if subs.len() == before {
                    Err(MsgError::NotExist)
                } else {
                    Ok(())
                }
            }
            None => Err(MsgError::NotExist),
        }
    }

    pub fn drop_client(&mut self, client_id: u64) {
        for subs in self.subscriptions.values_mut() {
            subs.retain(|s| s.client_id != client_id);
        }
    }

    pub fn drop_group(&mut self, group_handle: GroupHandle) {
        self.subscriptions.remove(&group_handle);
    }

    /// Assemble notifications for every subscription on `group`, per
    /// spec.md §4.4 steps 1-4. Does not reset change tags — the caller
    /// (group store) does that as step 5, after this runs.
    pub fn notify(&self, group_handle: GroupHandle, group: &QueueGroup) -> Vec<Notification> {
        let Some(subs) = self.subscriptions.get(&group_handle) else {
            return Vec::new();
        };
        let full: Vec<(Name, ChangeTag)> = group
            .members
            .iter()
            .map(|m| (m.queue_name.clone(), m.change_tag))
            .collect();
        let delta: Vec<(Name, ChangeTag)> = full
            .iter()
            .filter(|(_, tag)| *tag != ChangeTag::NoChange)
            .cloned()
            .collect();

        subs.iter()
            .filter(|s| s.flags.intersects(TrackFlags::Changes | TrackFlags::ChangesOnly))
            .map(|s| {
                let entries = if s.flags.contains(TrackFlags::ChangesOnly) {
                    delta.clone()
                } else {
                    full.clone()
                };
                Notification {
                    conn: s.conn,
                    dispatch: s.dispatch,
                    context: s.context,
                    entries,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::group::Policy;

    fn group_with_one_member(tag: ChangeTag) -> QueueGroup {
        let mut g = QueueGroup::new(Name::try_from("GA").unwrap(), Policy::RoundRobin);
        g.members.push(super::super::group::GroupEntry {
            queue: 0,
            queue_name: Name::try_from("Q_A").unwrap(),
            owner_node: 1,
            change_tag: tag,
        });
        g
    }

    #[test]
    fn changes_only_notification_contains_just_the_delta() {
        let mut engine = TrackingEngine::new();
        let group = group_with_one_member(ChangeTag::Added);
        engine.track(
            0,
            &group,
            1,
            Some(7),
            None,
            BitFlags::from(TrackFlags::ChangesOnly),
            0xdead,
        );
        let notes = engine.notify(0, &group);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].entries.len(), 1);
        assert_eq!(notes[0].context, 0xdead);
    }

    #[test]
    fn changes_notification_includes_unchanged_entries() {
        let mut engine = TrackingEngine::new();
        let group = group_with_one_member(ChangeTag::NoChange);
        engine.track(0, &group, 1, Some(7), None, BitFlags::from(TrackFlags::Changes), 0);
        let notes = engine.notify(0, &group);
        assert_eq!(notes[0].entries.len(), 1);
        assert_eq!(notes[0].entries[0].1, ChangeTag::NoChange);
    }

    #[test]
    fn track_stop_without_subscription_is_not_exist() {
        let mut engine = TrackingEngine::new();
        assert_eq!(engine.track_stop(0, 1).unwrap_err(), MsgError::NotExist);
    }
}
