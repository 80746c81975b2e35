//! The `Queue` entity (spec.md §3, §4.2).

use std::collections::VecDeque;

use enumflags2::{bitflags, BitFlags};

use crate::error::MsgError;
use crate::ipc::{ConnHandle, DispatchHandle};
use crate::message::{MessageEntry, Priority};
use crate::name::Name;

#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationFlags {
    Persistent = 0b0001,
}

#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlags {
    Create = 0b0001,
    ReceiveCallback = 0b0010,
}

#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckFlags {
    MessageDeliveredAck = 0b0001,
}

/// Advisory per-priority byte quota, `size_limits[0..=LOWEST]` (spec.md §3).
pub type SizeLimits = [usize; 4];

/// A client parked on an empty queue's `MessageGet`, per spec.md §4.7 and the
/// open question it flags ("spec RECOMMENDS this behavior").
#[derive(Debug, Clone)]
pub struct Waiter {
    pub client_id: u64,
    pub conn: ConnHandle,
    pub dispatch: DispatchHandle,
    pub request_id: u32,
    pub timeout_nanos: u64,
    pub async_call: bool,
    pub invocation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionState {
    Live,
    /// `refcount` has reached zero; the queue survives until `expiry_nanos`
    /// unless reopened with CREATE first (spec.md §4.2).
    Retained { expiry_nanos: u64 },
}

pub struct Queue {
    pub name: Name,
    pub creation_flags: BitFlags<CreationFlags>,
    pub size_limits: SizeLimits,
    pub retention_time_nanos: u64,
    pub refcount: u32,
    pub messages: [VecDeque<MessageEntry>; 4],
    pub queue_used: [usize; 4],
    pub waiters: VecDeque<Waiter>,
    pub retention: RetentionState,
}

impl Queue {
    pub fn new(
        name: Name,
        creation_flags: BitFlags<CreationFlags>,
        size_limits: SizeLimits,
        retention_time_nanos: u64,
    ) -> Self {
        Queue {
            name,
            creation_flags,
            size_limits,
            retention_time_nanos,
            refcount: 0,
            messages: Default::default(),
            queue_used: [0; 4],
            waiters: VecDeque::new(),
            retention: RetentionState::Live,
        }
    }

    /// `true` once refcount has hit zero: eligible either for immediate
    /// deletion (no retention) or for the retention sweep (spec.md §4.2).
    pub fn is_unreferenced(&self) -> bool {
        self.refcount == 0
    }

    pub fn number_of_messages(&self, priority: Priority) -> usize {
        self.messages[priority.as_index()].len()
    }

    /// Enqueue `entry`, enforcing the per-priority quota (spec.md §9: a
    /// correct implementation MUST add this check, unlike the original).
    pub fn enqueue(&mut self, entry: MessageEntry) -> Result<(), MsgError> {
        let idx = entry.message.priority.as_index();
        let incoming = entry.message.size();
        if self.queue_used[idx] + incoming > self.size_limits[idx] {
            return Err(MsgError::QueueFull);
        }
        self.queue_used[idx] += incoming;
        self.messages[idx].push_back(entry);
        Ok(())
    }

    /// Pop the oldest message at the highest pending priority
    /// (priority-then-arrival, spec.md §3 invariant: ascending priority
    /// order, FIFO within a priority).
    pub fn dequeue_highest_priority(&mut self) -> Option<MessageEntry> {
        for idx in 0..self.messages.len() {
            if let Some(entry) = self.messages[idx].pop_front() {
                self.queue_used[idx] -= entry.message.size();
                return Some(entry);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn entry(priority: u8, data: &[u8]) -> MessageEntry {
        MessageEntry {
            enqueue_time_nanos: 0,
            sender_id: 0,
            message: Message {
                msg_type: 0,
                version: 0,
                sender_name: None,
                priority: Priority::clamp(priority),
                data: data.to_vec(),
            },
            reply_to: None,
        }
    }

    fn queue() -> Queue {
        Queue::new(
            Name::try_from("Q").unwrap(),
            Default::default(),
            [1024; 4],
            0,
        )
    }

    #[test]
    fn priority_then_arrival_ordering() {
        let mut q = queue();
        q.enqueue(entry(2, b"a")).unwrap();
        q.enqueue(entry(0, b"b")).unwrap();
        q.enqueue(entry(2, b"c")).unwrap();
        assert_eq!(q.dequeue_highest_priority().unwrap().message.data, b"b");
        assert_eq!(q.dequeue_highest_priority().unwrap().message.data, b"a");
        assert_eq!(q.dequeue_highest_priority().unwrap().message.data, b"c");
        assert!(q.dequeue_highest_priority().is_none());
    }

    #[test]
    fn quota_enforced_per_priority() {
        let mut q = Queue::new(Name::try_from("Q").unwrap(), Default::default(), [4, 1024, 1024, 1024], 0);
        q.enqueue(entry(0, b"abcd")).unwrap();
        assert_eq!(q.enqueue(entry(0, b"e")).unwrap_err(), MsgError::QueueFull);
        // a different priority's quota is untouched
        q.enqueue(entry(1, b"ok")).unwrap();
    }
}
