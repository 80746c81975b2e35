//! Local response/dispatch payloads (C7/C8, spec.md §6).
//!
//! These never cross a node boundary — they are what the apply engine hands
//! to the IPC layer on the one node that owns the originating connection, so
//! unlike `exec::wire` there is no byte-order concern here. Framed the same
//! way (`byteorder`, little-endian) for consistency with the rest of the
//! codec, on a raw `Vec<u8>` payload since `IpcServer` only commits to
//! `IpcFrame { id, error, payload }`.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::ErrorCode;
use crate::exec::OpCode;
use crate::group::{ChangeTag, CurrentSnapshot};
use crate::ipc::IpcFrame;
use crate::name::Name;

#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    pub msg_type: u32,
    pub msg_version: u32,
    pub sender_name: Option<Name>,
    pub priority: u8,
    pub sender_id: u64,
    pub send_time_nanos: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum ResponseBody {
    Empty,
    Handle(u64),
    Status(crate::queue::QueueStatus),
    Current(CurrentSnapshot),
    TrackNotify { entries: Vec<(Name, ChangeTag)> },
    Available { queue_handle: u64, priority: u8 },
    Delivered(DeliveredMessage),
    /// `MESSAGE_DELIVERED_ACK` notification (spec.md §4.7 point 5), dispatched
    /// after an async send with that ack flag set has actually landed.
    DeliveredAck { sender_id: u64 },
}

fn change_tag_byte(tag: ChangeTag) -> u8 {
    match tag {
        ChangeTag::NoChange => 0,
        ChangeTag::Added => 1,
        ChangeTag::Removed => 2,
        ChangeTag::StateChanged => 3,
    }
}

fn write_entries(buf: &mut Vec<u8>, entries: &[(Name, ChangeTag)]) {
    buf.write_u32::<LittleEndian>(entries.len() as u32).unwrap();
    for (name, tag) in entries {
        name.write_to_wire(buf);
        buf.push(change_tag_byte(*tag));
    }
}

fn encode_body(invocation: u64, body: &ResponseBody) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u64::<LittleEndian>(invocation).unwrap();
    match body {
        ResponseBody::Empty => {}
        ResponseBody::Handle(h) => buf.write_u64::<LittleEndian>(*h).unwrap(),
        ResponseBody::Status(s) => {
            buf.write_u32::<LittleEndian>(s.creation_flags.bits()).unwrap();
            buf.write_u64::<LittleEndian>(s.retention_time_nanos).unwrap();
            for (size, used, count) in s.per_priority {
                buf.write_u64::<LittleEndian>(size as u64).unwrap();
                buf.write_u64::<LittleEndian>(used as u64).unwrap();
                buf.write_u64::<LittleEndian>(count as u64).unwrap();
            }
        }
        ResponseBody::Current(snap) => write_entries(&mut buf, &snap.entries),
        ResponseBody::TrackNotify { entries } => write_entries(&mut buf, entries),
        ResponseBody::Available { queue_handle, priority } => {
            buf.write_u64::<LittleEndian>(*queue_handle).unwrap();
            buf.push(*priority);
        }
        ResponseBody::DeliveredAck { sender_id } => buf.write_u64::<LittleEndian>(*sender_id).unwrap(),
        ResponseBody::Delivered(m) => {
            buf.write_u32::<LittleEndian>(m.msg_type).unwrap();
            buf.write_u32::<LittleEndian>(m.msg_version).unwrap();
            buf.push(m.sender_name.is_some() as u8);
            if let Some(name) = &m.sender_name {
                name.write_to_wire(&mut buf);
            }
            buf.push(m.priority);
            buf.write_u64::<LittleEndian>(m.sender_id).unwrap();
            buf.write_u64::<LittleEndian>(m.send_time_nanos).unwrap();
            buf.write_u32::<LittleEndian>(m.payload.len() as u32).unwrap();
            buf.extend_from_slice(&m.payload);
        }
    }
    buf
}

/// Build the `IpcFrame` for one response or dispatch delivery.
pub fn build(op: OpCode, error: ErrorCode, invocation: u64, body: ResponseBody) -> IpcFrame {
    IpcFrame {
        id: op.wire_id(),
        error: error as u32,
        payload: encode_body(invocation, &body),
    }
}
