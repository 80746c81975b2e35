//! `ExecRecord` (C6/C7, spec.md §6, §9): the cluster-visible representation
//! of a client request, and the unit of totem broadcast.
//!
//! This is the sum type spec.md §9 asks for in place of the original's
//! duck-typed C structs overlaid on a shared header: one arm per wire `op`,
//! each carrying its own fields verbatim from the spec.md §6 body table.

use crate::name::Name;

/// `(node_id, conn)` (spec.md §3). Only meaningful on the originating node;
/// `conn` is `None` once the record has crossed a node boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSource {
    pub node_id: u32,
    pub conn: Option<u64>,
}

impl MessageSource {
    pub fn local(node_id: u32, conn: u64) -> Self {
        MessageSource { node_id, conn: Some(conn) }
    }

    /// Per spec.md §6: "each record type implements a `convert_endian` step
    /// that ... zeros `source.conn`". Idempotent, so apply can call it
    /// unconditionally for any record whose origin isn't this node, not only
    /// on an actual endian mismatch — a local `conn` handle is never
    /// meaningful on any node but the one that created it.
    pub fn clear_conn(&mut self) {
        self.conn = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreationAttrs {
    pub flags: u32,
    pub size: [u32; 4],
    pub retention: u64,
}

macro_rules! exec_records {
    ($($variant:ident { $($field:ident : $ty:ty),* $(,)? }),* $(,)?) => {
        #[derive(Debug, Clone)]
        pub enum ExecRecord {
            $($variant($variant)),*
        }

        $(
            #[derive(Debug, Clone)]
            pub struct $variant {
                pub source: MessageSource,
                $(pub $field: $ty),*
            }
        )*

        impl ExecRecord {
            pub fn source(&self) -> &MessageSource {
                match self {
                    $(ExecRecord::$variant(r) => &r.source),*
                }
            }

            pub fn source_mut(&mut self) -> &mut MessageSource {
                match self {
                    $(ExecRecord::$variant(r) => &mut r.source),*
                }
            }

            pub fn op(&self) -> OpCode {
                match self {
                    $(ExecRecord::$variant(_) => OpCode::$variant),*
                }
            }
        }
    };
}

exec_records! {
    QueueOpen {
        async_call: bool,
        queue_name: Name,
        invocation: u64,
        /// Caller-side correlation handle, echoed back in the response so the
        /// local library stub can match it to the blocked/async caller
        /// (spec.md §6 wire table).
        queue_handle: u64,
        creation_attrs: CreationAttrs,
        open_flags: u32,
        timeout: u64,
    },
    QueueClose {
        queue_name: Name,
    },
    QueueStatusGet {
        queue_name: Name,
    },
    QueueUnlink {
        queue_name: Name,
    },
    QueueGroupCreate {
        group_name: Name,
        policy: u32,
    },
    QueueGroupInsert {
        queue_name: Name,
        group_name: Name,
    },
    QueueGroupRemove {
        queue_name: Name,
        group_name: Name,
    },
    QueueGroupDelete {
        group_name: Name,
    },
    QueueGroupTrack {
        group_name: Name,
        track_flags: u8,
        buffer_flag: u8,
    },
    QueueGroupTrackStop {
        group_name: Name,
    },
    MessageSend {
        destination: Name,
        timeout: u64,
        msg_type: u32,
        msg_version: u32,
        msg_size: u32,
        sender_name: Name,
        has_sender: bool,
        priority: u8,
        invocation: u64,
        ack_flags: u32,
        async_call: bool,
        payload: Vec<u8>,
    },
    MessageGet {
        queue_name: Name,
        timeout: u64,
    },
    MessageCancel {
        queue_name: Name,
    },
    MessageSendReceive {
        queue_name: Name,
        destination: Name,
        timeout: u64,
        msg_type: u32,
        msg_version: u32,
        msg_size: u32,
        priority: u8,
        payload: Vec<u8>,
    },
    MessageReply {
        queue_name: Name,
        async_call: bool,
        msg_type: u32,
        msg_version: u32,
        msg_size: u32,
        priority: u8,
        payload: Vec<u8>,
    },
}

/// `id := service(16) | op(16)` (spec.md §6). `MSG_SERVICE` is this
/// service's slot among the AIS services bundled in the same repository
/// (spec.md §1 — event service, checkpoint service, AMF, CLM share the
/// shape but are out of scope).
pub const MSG_SERVICE: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OpCode {
    QueueOpen = 1,
    QueueClose = 2,
    QueueStatusGet = 3,
    QueueUnlink = 4,
    QueueGroupCreate = 5,
    QueueGroupInsert = 6,
    QueueGroupRemove = 7,
    QueueGroupDelete = 8,
    QueueGroupTrack = 9,
    QueueGroupTrackStop = 10,
    MessageSend = 11,
    MessageGet = 12,
    MessageCancel = 13,
    MessageSendReceive = 14,
    MessageReply = 15,
}

impl OpCode {
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            1 => OpCode::QueueOpen,
            2 => OpCode::QueueClose,
            3 => OpCode::QueueStatusGet,
            4 => OpCode::QueueUnlink,
            5 => OpCode::QueueGroupCreate,
            6 => OpCode::QueueGroupInsert,
            7 => OpCode::QueueGroupRemove,
            8 => OpCode::QueueGroupDelete,
            9 => OpCode::QueueGroupTrack,
            10 => OpCode::QueueGroupTrackStop,
            11 => OpCode::MessageSend,
            12 => OpCode::MessageGet,
            13 => OpCode::MessageCancel,
            14 => OpCode::MessageSendReceive,
            15 => OpCode::MessageReply,
            _ => return None,
        })
    }

    pub fn wire_id(self) -> u32 {
        (MSG_SERVICE as u32) << 16 | (self as u32)
    }
}
