//! Replicated-state snapshot codec (spec.md §4.8): encodes/decodes the
//! contents of C3 (`QueueStore`) and C4 (`GroupStore`) for state transfer
//! into a newly synced node. Node-local stores (`OpenHandle`s, tracking
//! subscriptions, parked waiters) are never part of a snapshot — spec.md §3
//! only binds C3/C4/C5's cluster-wide stores to the "byte-identical on every
//! member" invariant, and C5's subscriptions are rebuilt by each client
//! re-subscribing after a view change, not by transfer.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::MsgError;
use crate::group::{ChangeTag, GroupEntry, GroupStore, Policy, QueueGroup};
use crate::message::{Message, MessageEntry, Priority};
use crate::name::Name;
use crate::queue::{Queue, QueueStore, RetentionState};

fn policy_byte(p: Policy) -> u8 {
    match p {
        Policy::RoundRobin => 0,
        Policy::LocalRoundRobin => 1,
        Policy::LocalBestQueue => 2,
        Policy::Broadcast => 3,
    }
}

fn policy_from_byte(b: u8) -> Policy {
    match b {
        1 => Policy::LocalRoundRobin,
        2 => Policy::LocalBestQueue,
        3 => Policy::Broadcast,
        _ => Policy::RoundRobin,
    }
}

fn change_tag_byte(t: ChangeTag) -> u8 {
    match t {
        ChangeTag::NoChange => 0,
        ChangeTag::Added => 1,
        ChangeTag::Removed => 2,
        ChangeTag::StateChanged => 3,
    }
}

fn change_tag_from_byte(b: u8) -> ChangeTag {
    match b {
        1 => ChangeTag::Added,
        2 => ChangeTag::Removed,
        3 => ChangeTag::StateChanged,
        _ => ChangeTag::NoChange,
    }
}

fn write_entry(buf: &mut Vec<u8>, entry: &MessageEntry) {
    buf.write_u64::<LittleEndian>(entry.enqueue_time_nanos).unwrap();
    buf.write_u64::<LittleEndian>(entry.sender_id).unwrap();
    buf.write_u32::<LittleEndian>(entry.message.msg_type).unwrap();
    buf.write_u32::<LittleEndian>(entry.message.version).unwrap();
    buf.push(entry.message.sender_name.is_some() as u8);
    if let Some(name) = &entry.message.sender_name {
        name.write_to_wire(buf);
    }
    entry.message.priority.write_to_wire(buf);
    buf.push(entry.reply_to.is_some() as u8);
    if let Some(name) = &entry.reply_to {
        name.write_to_wire(buf);
    }
    buf.write_u32::<LittleEndian>(entry.message.data.len() as u32).unwrap();
    buf.extend_from_slice(&entry.message.data);
}

fn read_entry(c: &mut Cursor<&[u8]>) -> Result<MessageEntry, MsgError> {
    let enqueue_time_nanos = c.read_u64::<LittleEndian>().map_err(|_| MsgError::Library)?;
    let sender_id = c.read_u64::<LittleEndian>().map_err(|_| MsgError::Library)?;
    let msg_type = c.read_u32::<LittleEndian>().map_err(|_| MsgError::Library)?;
    let version = c.read_u32::<LittleEndian>().map_err(|_| MsgError::Library)?;
    let has_sender = c.read_u8().map_err(|_| MsgError::Library)? != 0;
    let sender_name = if has_sender { Some(Name::read_from_wire(c)?) } else { None };
    let priority = Priority::read_from_wire(c.read_u8().map_err(|_| MsgError::Library)?);
    let has_reply_to = c.read_u8().map_err(|_| MsgError::Library)? != 0;
    let reply_to = if has_reply_to { Some(Name::read_from_wire(c)?) } else { None };
    let data_len = c.read_u32::<LittleEndian>().map_err(|_| MsgError::Library)? as usize;
    let mut data = vec![0u8; data_len];
    std::io::Read::read_exact(c, &mut data).map_err(|_| MsgError::Library)?;
    Ok(MessageEntry {
        enqueue_time_nanos,
        sender_id,
        message: Message { msg_type, version, sender_name, priority, data },
        reply_to,
    })
}

fn write_queue(buf: &mut Vec<u8>, name: &Name, q: &Queue) {
    name.write_to_wire(buf);
    buf.write_u32::<LittleEndian>(q.creation_flags.bits()).unwrap();
    for s in q.size_limits {
        buf.write_u64::<LittleEndian>(s as u64).unwrap();
    }
    buf.write_u64::<LittleEndian>(q.retention_time_nanos).unwrap();
    buf.write_u32::<LittleEndian>(q.refcount).unwrap();
    match q.retention {
        RetentionState::Live => buf.push(0),
        RetentionState::Retained { expiry_nanos } => {
            buf.push(1);
            buf.write_u64::<LittleEndian>(expiry_nanos).unwrap();
        }
    }
    for priority in 0..Priority::count() {
        let entries = &q.messages[priority];
        buf.write_u32::<LittleEndian>(entries.len() as u32).unwrap();
        for entry in entries {
            write_entry(buf, entry);
        }
    }
}

fn creation_flags_from_u32(v: u32) -> enumflags2::BitFlags<crate::queue::CreationFlags> {
    let mut f = enumflags2::BitFlags::empty();
    if v & (crate::queue::CreationFlags::Persistent as u32) != 0 {
        f |= crate::queue::CreationFlags::Persistent;
    }
    f
}

fn read_queue(c: &mut Cursor<&[u8]>) -> Result<(Name, Queue), MsgError> {
    let name = Name::read_from_wire(c)?;
    let creation_flags_raw = c.read_u32::<LittleEndian>().map_err(|_| MsgError::Library)?;
    let creation_flags = creation_flags_from_u32(creation_flags_raw);
    let mut size_limits = [0usize; 4];
    for s in size_limits.iter_mut() {
        *s = c.read_u64::<LittleEndian>().map_err(|_| MsgError::Library)? as usize;
    }
    let retention_time_nanos = c.read_u64::<LittleEndian>().map_err(|_| MsgError::Library)?;
    let refcount = c.read_u32::<LittleEndian>().map_err(|_| MsgError::Library)?;
    let retention_tag = c.read_u8().map_err(|_| MsgError::Library)?;
    let retention = if retention_tag == 1 {
        RetentionState::Retained { expiry_nanos: c.read_u64::<LittleEndian>().map_err(|_| MsgError::Library)? }
    } else {
        RetentionState::Live
    };
    let mut queue = Queue::new(name.clone(), creation_flags, size_limits, retention_time_nanos);
    queue.refcount = refcount;
    queue.retention = retention;
    for priority in 0..Priority::count() {
        let count = c.read_u32::<LittleEndian>().map_err(|_| MsgError::Library)?;
        for _ in 0..count {
            let entry = read_entry(c)?;
            queue.queue_used[priority] += entry.message.size();
            queue.messages[priority].push_back(entry);
        }
    }
    Ok((name, queue))
}

fn write_group(buf: &mut Vec<u8>, name: &Name, g: &QueueGroup) {
    name.write_to_wire(buf);
    buf.push(policy_byte(g.policy));
    buf.write_u32::<LittleEndian>(g.round_robin_cursor as u32).unwrap();
    buf.write_u32::<LittleEndian>(g.members.len() as u32).unwrap();
    for m in &g.members {
        m.queue_name.write_to_wire(buf);
        buf.write_u32::<LittleEndian>(m.owner_node).unwrap();
        buf.push(change_tag_byte(m.change_tag));
    }
}

fn read_group(c: &mut Cursor<&[u8]>) -> Result<(Name, QueueGroup), MsgError> {
    let name = Name::read_from_wire(c)?;
    let policy = policy_from_byte(c.read_u8().map_err(|_| MsgError::Library)?);
    let round_robin_cursor = c.read_u32::<LittleEndian>().map_err(|_| MsgError::Library)? as usize;
    let member_count = c.read_u32::<LittleEndian>().map_err(|_| MsgError::Library)?;
    let mut group = QueueGroup::new(name.clone(), policy);
    group.round_robin_cursor = round_robin_cursor;
    for _ in 0..member_count {
        let queue_name = Name::read_from_wire(c)?;
        let owner_node = c.read_u32::<LittleEndian>().map_err(|_| MsgError::Library)?;
        let change_tag = change_tag_from_byte(c.read_u8().map_err(|_| MsgError::Library)?);
        // `queue` is fixed up by the caller once the new node's QueueStore exists.
        group.members.push(GroupEntry { queue: 0, queue_name, owner_node, change_tag });
    }
    Ok((name, group))
}

pub fn export(queues: &QueueStore, groups: &GroupStore) -> Vec<u8> {
    let mut buf = Vec::new();
    let all_queues: Vec<_> = queues.iter().collect();
    buf.write_u32::<LittleEndian>(all_queues.len() as u32).unwrap();
    for (_, q) in &all_queues {
        write_queue(&mut buf, &q.name, q);
    }
    let all_groups: Vec<_> = groups.iter().collect();
    buf.write_u32::<LittleEndian>(all_groups.len() as u32).unwrap();
    for (_, g) in &all_groups {
        write_group(&mut buf, &g.name, g);
    }
    buf
}

pub fn import(bytes: &[u8]) -> Result<(QueueStore, GroupStore), MsgError> {
    let mut c = Cursor::new(bytes);
    let mut queues = QueueStore::new();
    let queue_count = c.read_u32::<LittleEndian>().map_err(|_| MsgError::Library)?;
    for _ in 0..queue_count {
        let (name, queue) = read_queue(&mut c)?;
        queues.insert_at(name, queue);
    }
    let mut groups = GroupStore::new();
    let group_count = c.read_u32::<LittleEndian>().map_err(|_| MsgError::Library)?;
    for _ in 0..group_count {
        let (name, mut group) = read_group(&mut c)?;
        for m in group.members.iter_mut() {
            if let Some(h) = queues.find_handle(&m.queue_name) {
                m.queue = h;
            }
        }
        groups.insert_at(name, group);
    }
    Ok((queues, groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::OpenFlags;
    use enumflags2::BitFlags;

    #[test]
    fn queue_and_group_round_trip_through_snapshot() {
        let mut queues = QueueStore::new();
        let qh = queues
            .open(Name::try_from("Q1").unwrap(), BitFlags::from(OpenFlags::Create), Some((BitFlags::empty(), [100; 4], 0)))
            .unwrap();
        queues
            .queue_mut(qh)
            .unwrap()
            .enqueue(MessageEntry {
                enqueue_time_nanos: 1,
                sender_id: 2,
                message: Message { msg_type: 1, version: 1, sender_name: None, priority: Priority::HIGHEST, data: b"hi".to_vec() },
                reply_to: None,
            })
            .unwrap();
        let mut groups = GroupStore::new();
        let gh = groups.create(Name::try_from("G1").unwrap(), Policy::Broadcast).unwrap();
        groups.insert(gh, qh, Name::try_from("Q1").unwrap(), 7).unwrap();

        let bytes = export(&queues, &groups);
        let (new_queues, new_groups) = import(&bytes).unwrap();

        let new_qh = new_queues.find_handle(&Name::try_from("Q1").unwrap()).unwrap();
        assert_eq!(new_queues.queue(new_qh).unwrap().number_of_messages(Priority::HIGHEST), 1);
        let new_gh = new_groups.find_handle(&Name::try_from("G1").unwrap()).unwrap();
        let group = new_groups.group(new_gh).unwrap();
        assert_eq!(group.members.len(), 1);
        assert_eq!(group.members[0].queue, new_qh);
    }
}
