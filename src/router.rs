//! Request router (C6, spec.md §4.5).
//!
//! One method per client-facing operation, called by the local library stub
//! in-process (the stub/router boundary never crosses a wire — only
//! `Transport::mcast` does, spec.md §1). Each method's job: stamp
//! `MessageSource`, translate a node-local `lib_handle` to its cluster-wide
//! `Name` where the op needs one (spec.md §6 wire table addresses
//! `QueueClose`/`MessageGet`/`MessageCancel` by name because a `lib_handle`
//! never survives a node boundary), and hand the record to
//! `Transport::mcast(_, Agreed)`.

use log::trace;

use crate::apply::ApplyEngine;
use crate::error::MsgResult;
use crate::exec::{
    CreationAttrs, ExecRecord, MessageCancel, MessageGet, MessageReply, MessageSend,
    MessageSendReceive, MessageSource, QueueClose, QueueGroupCreate, QueueGroupDelete,
    QueueGroupInsert, QueueGroupRemove, QueueGroupTrack, QueueGroupTrackStop, QueueOpen,
    QueueStatusGet, QueueUnlink,
};
use crate::handle::Handle;
use crate::name::Name;
use crate::transport::{DeliveryMode, Transport};

pub struct Router {
    node_id: u32,
}

impl Router {
    pub fn new(node_id: u32) -> Self {
        Router { node_id }
    }

    fn source(&self, conn: u64) -> MessageSource {
        MessageSource::local(self.node_id, conn)
    }

    fn mcast(&self, transport: &mut impl Transport, record: ExecRecord) -> MsgResult<()> {
        trace!("mcast {:?}", record.op());
        transport.mcast(record, DeliveryMode::Agreed)
    }

    /// Resolve a node-local `lib_handle` (an `OpenHandle` slot) to the
    /// queue's cluster-wide name, for ops whose wire record addresses the
    /// queue by name (spec.md §6).
    fn queue_name_of(&self, apply: &ApplyEngine, lib_handle: Handle) -> MsgResult<Name> {
        let oh = apply.open_handles.peek(lib_handle)?;
        let qh = oh.queue;
        Ok(apply.queues.queue(qh)?.name.clone())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &self,
        transport: &mut impl Transport,
        conn: u64,
        async_call: bool,
        queue_name: Name,
        invocation: u64,
        creation_attrs: CreationAttrs,
        open_flags: u32,
        timeout: u64,
    ) -> MsgResult<()> {
        self.mcast(
            transport,
            ExecRecord::QueueOpen(QueueOpen {
                source: self.source(conn),
                async_call,
                queue_name,
                invocation,
                queue_handle: 0,
                creation_attrs,
                open_flags,
                timeout,
            }),
        )
    }

    /// `saMsgQueueClose`-equivalent: release the node-local handle
    /// immediately (spec.md §3: not replicated state) and broadcast the
    /// refcount decrement by name.
    pub fn close(&self, transport: &mut impl Transport, apply: &mut ApplyEngine, conn: u64, lib_handle: Handle) -> MsgResult<()> {
        let queue_name = self.queue_name_of(apply, lib_handle)?;
        apply.release_open_handle(lib_handle)?;
        self.mcast(transport, ExecRecord::QueueClose(QueueClose { source: self.source(conn), queue_name }))
    }

    pub fn status_get(&self, transport: &mut impl Transport, conn: u64, queue_name: Name) -> MsgResult<()> {
        self.mcast(transport, ExecRecord::QueueStatusGet(QueueStatusGet { source: self.source(conn), queue_name }))
    }

    pub fn unlink(&self, transport: &mut impl Transport, conn: u64, queue_name: Name) -> MsgResult<()> {
        self.mcast(transport, ExecRecord::QueueUnlink(QueueUnlink { source: self.source(conn), queue_name }))
    }

    pub fn group_create(&self, transport: &mut impl Transport, conn: u64, group_name: Name, policy: u32) -> MsgResult<()> {
        self.mcast(transport, ExecRecord::QueueGroupCreate(QueueGroupCreate { source: self.source(conn), group_name, policy }))
    }

    pub fn group_insert(&self, transport: &mut impl Transport, conn: u64, queue_name: Name, group_name: Name) -> MsgResult<()> {
        self.mcast(transport, ExecRecord::QueueGroupInsert(QueueGroupInsert { source: self.source(conn), queue_name, group_name }))
    }

    pub fn group_remove(&self, transport: &mut impl Transport, conn: u64, queue_name: Name, group_name: Name) -> MsgResult<()> {
        self.mcast(transport, ExecRecord::QueueGroupRemove(QueueGroupRemove { source: self.source(conn), queue_name, group_name }))
    }

    pub fn group_delete(&self, transport: &mut impl Transport, conn: u64, group_name: Name) -> MsgResult<()> {
        self.mcast(transport, ExecRecord::QueueGroupDelete(QueueGroupDelete { source: self.source(conn), group_name }))
    }

    pub fn group_track(
        &self,
        transport: &mut impl Transport,
        conn: u64,
        group_name: Name,
        track_flags: u8,
        buffer_flag: u8,
    ) -> MsgResult<()> {
        self.mcast(
            transport,
            ExecRecord::QueueGroupTrack(QueueGroupTrack { source: self.source(conn), group_name, track_flags, buffer_flag }),
        )
    }

    pub fn group_track_stop(&self, transport: &mut impl Transport, conn: u64, group_name: Name) -> MsgResult<()> {
        self.mcast(transport, ExecRecord::QueueGroupTrackStop(QueueGroupTrackStop { source: self.source(conn), group_name }))
    }

    /// `saMsgMessageSend`/`SendAsync`-equivalent. `payload` is copied into
    /// the record's tail verbatim (spec.md §4.5 step 3); `msg_size` is
    /// derived from it rather than trusted from the caller.
    #[allow(clippy::too_many_arguments)]
    pub fn message_send(
        &self,
        transport: &mut impl Transport,
        conn: u64,
        destination: Name,
        timeout: u64,
        msg_type: u32,
        msg_version: u32,
        sender_name: Option<Name>,
        priority: u8,
        invocation: u64,
        ack_flags: u32,
        async_call: bool,
        payload: Vec<u8>,
    ) -> MsgResult<()> {
        let msg_size = payload.len() as u32;
        let has_sender = sender_name.is_some();
        self.mcast(
            transport,
            ExecRecord::MessageSend(MessageSend {
                source: self.source(conn),
                destination,
                timeout,
                msg_type,
                msg_version,
                msg_size,
                sender_name: sender_name.unwrap_or(Name::new(&[]).expect("empty name is always valid")),
                has_sender,
                priority,
                invocation,
                ack_flags,
                async_call,
                payload,
            }),
        )
    }

    pub fn message_get(&self, transport: &mut impl Transport, apply: &ApplyEngine, conn: u64, lib_handle: Handle, timeout: u64) -> MsgResult<()> {
        let queue_name = self.queue_name_of(apply, lib_handle)?;
        self.mcast(transport, ExecRecord::MessageGet(MessageGet { source: self.source(conn), queue_name, timeout }))
    }

    pub fn message_cancel(&self, transport: &mut impl Transport, apply: &ApplyEngine, conn: u64, lib_handle: Handle) -> MsgResult<()> {
        let queue_name = self.queue_name_of(apply, lib_handle)?;
        self.mcast(transport, ExecRecord::MessageCancel(MessageCancel { source: self.source(conn), queue_name }))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn message_send_receive(
        &self,
        transport: &mut impl Transport,
        conn: u64,
        reply_queue_name: Name,
        destination: Name,
        timeout: u64,
        msg_type: u32,
        msg_version: u32,
        priority: u8,
        payload: Vec<u8>,
    ) -> MsgResult<()> {
        let msg_size = payload.len() as u32;
        self.mcast(
            transport,
            ExecRecord::MessageSendReceive(MessageSendReceive {
                source: self.source(conn),
                queue_name: reply_queue_name,
                destination,
                timeout,
                msg_type,
                msg_version,
                msg_size,
                priority,
                payload,
            }),
        )
    }

    pub fn message_reply(
        &self,
        transport: &mut impl Transport,
        conn: u64,
        reply_queue_name: Name,
        async_call: bool,
        msg_type: u32,
        msg_version: u32,
        priority: u8,
        payload: Vec<u8>,
    ) -> MsgResult<()> {
        let msg_size = payload.len() as u32;
        self.mcast(
            transport,
            ExecRecord::MessageReply(MessageReply {
                source: self.source(conn),
                queue_name: reply_queue_name,
                async_call,
                msg_type,
                msg_version,
                msg_size,
                priority,
                payload,
            }),
        )
    }
}
