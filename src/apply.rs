//! Exec apply engine (C7, spec.md §4.2-§4.7, §9).
//!
//! `ApplyEngine::apply` is called once per `ExecRecord` delivered by
//! `Transport::mcast(_, Agreed)`, in delivery order, identically on every
//! member (spec.md §3 invariant 4). It owns every replicated store (C3/C4/C5)
//! plus the node-local `OpenHandle` table, and returns the list of frames
//! C8 should ship — already carrying `None` wherever the record's origin
//! wasn't this node.

use enumflags2::BitFlags;
use log::{debug, trace, warn};

use crate::config::MsgServiceConfig;
use crate::dispatch::Outgoing;
use crate::error::{ErrorCode, MsgError, MsgResult};
use crate::exec::{ExecRecord, OpCode};
use crate::group::{GroupStore, Policy, TrackFlags, TrackingEngine};
use crate::handle::Handle;
use crate::ipc::ConnHandle;
use crate::message::{Message, MessageEntry, Priority};
use crate::name::Name;
use crate::open_handle::OpenHandle;
use crate::queue::{AckFlags, CreationFlags, OpenFlags, QueueStore, SizeLimits, Waiter};
use crate::response::{self, DeliveredMessage, ResponseBody};
use crate::session::ClientSessions;

fn open_flags_from_u32(v: u32) -> BitFlags<OpenFlags> {
    let mut f = BitFlags::empty();
    if v & (OpenFlags::Create as u32) != 0 {
        f |= OpenFlags::Create;
    }
    if v & (OpenFlags::ReceiveCallback as u32) != 0 {
        f |= OpenFlags::ReceiveCallback;
    }
    f
}

fn creation_flags_from_u32(v: u32) -> BitFlags<CreationFlags> {
    let mut f = BitFlags::empty();
    if v & (CreationFlags::Persistent as u32) != 0 {
        f |= CreationFlags::Persistent;
    }
    f
}

fn ack_flags_from_u32(v: u32) -> BitFlags<AckFlags> {
    let mut f = BitFlags::empty();
    if v & (AckFlags::MessageDeliveredAck as u32) != 0 {
        f |= AckFlags::MessageDeliveredAck;
    }
    f
}

fn track_flags_from_u8(v: u8) -> BitFlags<TrackFlags> {
    let mut f = BitFlags::empty();
    if v & (TrackFlags::Current as u8) != 0 {
        f |= TrackFlags::Current;
    }
    if v & (TrackFlags::Changes as u8) != 0 {
        f |= TrackFlags::Changes;
    }
    if v & (TrackFlags::ChangesOnly as u8) != 0 {
        f |= TrackFlags::ChangesOnly;
    }
    f
}

/// 0-3, indexed RoundRobin/LocalRoundRobin/LocalBestQueue/Broadcast; an
/// arbitrary but fixed mapping since spec.md §3 names the policies without
/// assigning wire values. Unrecognised values fall back to RoundRobin rather
/// than failing the create, matching spec.md §3 invariant 6's "never reject
/// on malformed wire data" stance for other clamped fields.
fn policy_from_u32(v: u32) -> Policy {
    match v {
        1 => Policy::LocalRoundRobin,
        2 => Policy::LocalBestQueue,
        3 => Policy::Broadcast,
        _ => Policy::RoundRobin,
    }
}

fn delivered_from(entry: &MessageEntry) -> DeliveredMessage {
    DeliveredMessage {
        msg_type: entry.message.msg_type,
        msg_version: entry.message.version,
        sender_name: entry.message.sender_name.clone(),
        priority: entry.message.priority.into(),
        sender_id: entry.sender_id,
        send_time_nanos: entry.enqueue_time_nanos,
        payload: entry.message.data.clone(),
    }
}

pub struct ApplyEngine {
    pub queues: QueueStore,
    pub groups: GroupStore,
    pub tracking: TrackingEngine,
    pub open_handles: crate::handle::HandleTable<OpenHandle>,
    config: MsgServiceConfig,
    sender_seq: u64,
}

impl ApplyEngine {
    pub fn new(config: MsgServiceConfig) -> Self {
        let open_handles = crate::handle::HandleTable::with_capacity(config.handle_table_initial_capacity);
        ApplyEngine {
            queues: QueueStore::new(),
            groups: GroupStore::new(),
            tracking: TrackingEngine::new(),
            open_handles,
            config,
            sender_seq: 0,
        }
    }

    /// Release the node-local `OpenHandle` for a client's close. Purely
    /// local bookkeeping (spec.md §3: `OpenHandle` is not replicated state),
    /// called by the router directly — never through `apply`, since a
    /// `lib_handle` never crosses the wire (spec.md §6 wire table addresses
    /// `QueueClose`/`QueueUnlink` by name precisely because it isn't
    /// portable).
    pub fn release_open_handle(&mut self, lib_handle: Handle) -> MsgResult<()> {
        self.open_handles.destroy(lib_handle)
    }

    fn notify_receive_callbacks(&self, qh: Handle, priority: Priority, out: &mut Vec<Outgoing>) {
        for (_, oh) in self.open_handles.iter() {
            if oh.queue == qh && oh.receive_callback {
                let frame = response::build(
                    OpCode::MessageGet,
                    ErrorCode::Ok,
                    0,
                    ResponseBody::Available { queue_handle: qh as u64, priority: priority.into() },
                );
                out.push(Outgoing::Dispatch { dispatch: oh.dispatch, frame });
            }
        }
    }

    /// Assemble and flush tracking notifications for `group_handle`, then
    /// reset change tags and drop REMOVED members (spec.md §4.4 steps 1-5).
    /// Runs after *every* group-affecting mutation, on every node, since a
    /// node's own local subscribers must learn about changes made by clients
    /// on other nodes.
    pub(crate) fn flush_tracking(&mut self, group_handle: Handle, out: &mut Vec<Outgoing>) {
        if let Ok(group) = self.groups.group(group_handle) {
            for note in self.tracking.notify(group_handle, group) {
                let frame = response::build(
                    OpCode::QueueGroupTrack,
                    ErrorCode::Ok,
                    note.context,
                    ResponseBody::TrackNotify { entries: note.entries },
                );
                out.push(Outgoing::Dispatch { dispatch: note.dispatch, frame });
            }
        }
        // REMOVED members must still be visible to `finish_removed`'s filter,
        // so it has to run before `reset_change_tags` erases the tag.
        let _ = self.groups.finish_removed(group_handle);
        if let Ok(group) = self.groups.group_mut(group_handle) {
            group.reset_change_tags();
        }
    }

    /// Enqueue `entry` into `qh`, satisfying the oldest waiter instead if one
    /// is parked (spec.md §4.7 Send step 2: a blocked `Get` is served before
    /// the message ever touches the queue). Notifies `RECEIVE_CALLBACK`
    /// openers only when the message actually landed in the queue.
    fn deliver_to_queue(&mut self, qh: Handle, entry: MessageEntry, out: &mut Vec<Outgoing>) -> MsgResult<()> {
        let priority = entry.message.priority;
        let waiter = {
            let q = self.queues.queue_mut(qh)?;
            q.waiters.pop_front()
        };
        match waiter {
            Some(w) => {
                let frame = response::build(OpCode::MessageGet, ErrorCode::Ok, 0, ResponseBody::Delivered(delivered_from(&entry)));
                out.push(Outgoing::Response { conn: w.conn, frame });
                Ok(())
            }
            None => {
                let q = self.queues.queue_mut(qh)?;
                q.enqueue(entry)?;
                self.notify_receive_callbacks(qh, priority, out);
                Ok(())
            }
        }
    }

    /// Route `destination` to its target queue handle(s): a direct queue
    /// name, or a group name resolved through its routing policy (spec.md
    /// §4.3). `NotExist` if neither a queue nor a group owns that name.
    fn resolve_destination(&mut self, destination: &Name, originating_node: u32) -> MsgResult<Vec<Handle>> {
        if let Some(qh) = self.queues.find_handle(destination) {
            return Ok(vec![qh]);
        }
        if let Some(gh) = self.groups.find_handle(destination) {
            return self.groups.route(gh, &self.queues, originating_node);
        }
        Err(MsgError::NotExist)
    }

    pub fn apply(&mut self, mut record: ExecRecord, sessions: &ClientSessions, now_nanos: u64) -> Vec<Outgoing> {
        trace!("applying {:?} from node {}", record.op(), record.source().node_id);
        if record.source().node_id != self.config.node_id {
            record.source_mut().clear_conn();
        }
        let mut out = Vec::new();
        let source = *record.source();
        let is_local = source.conn.is_some();
        let (dispatch, client_id) = match source.conn {
            Some(conn) => sessions
                .lookup(conn)
                .map(|s| (s.dispatch, s.client_id))
                .unwrap_or((None, 0)),
            None => (None, 0),
        };

        match record {
            ExecRecord::QueueOpen(r) if r.timeout > 0 && now_nanos > r.timeout => {
                trace!("QueueOpen {:?} missed its deadline before apply", r.queue_name);
                if is_local {
                    let frame = response::build(OpCode::QueueOpen, ErrorCode::Timeout, r.invocation, ResponseBody::Empty);
                    out.push(route_response(r.async_call, source.conn, dispatch, frame));
                }
            }
            ExecRecord::QueueOpen(r) => {
                let open_flags = open_flags_from_u32(r.open_flags);
                let creation_attrs = if open_flags.contains(OpenFlags::Create) {
                    let flags = creation_flags_from_u32(r.creation_attrs.flags);
                    let size: SizeLimits = if r.creation_attrs.size == [0; 4] {
                        self.config.default_size_limits
                    } else {
                        [
                            r.creation_attrs.size[0] as usize,
                            r.creation_attrs.size[1] as usize,
                            r.creation_attrs.size[2] as usize,
                            r.creation_attrs.size[3] as usize,
                        ]
                    };
                    Some((flags, size, r.creation_attrs.retention))
                } else {
                    None
                };
                let result = self.queues.open(r.queue_name.clone(), open_flags, creation_attrs);
                if is_local {
                    let frame = match result {
                        Ok(qh) => {
                            let lib_handle = self.open_handles.create(OpenHandle {
                                client_id,
                                queue: qh,
                                conn: source.conn,
                                dispatch,
                                async_invocation: if r.async_call { Some(r.invocation) } else { None },
                                receive_callback: open_flags.contains(OpenFlags::ReceiveCallback),
                            });
                            response::build(OpCode::QueueOpen, ErrorCode::Ok, r.invocation, ResponseBody::Handle(lib_handle as u64))
                        }
                        Err(e) => response::build(OpCode::QueueOpen, e.code(), r.invocation, ResponseBody::Empty),
                    };
                    out.push(route_response(r.async_call, source.conn, dispatch, frame));
                }
            }
            ExecRecord::QueueClose(r) => {
                let qh_lookup = self.queues.find_handle(&r.queue_name);
                let result = match qh_lookup {
                    Some(qh) => self.queues.close(qh, now_nanos),
                    None => Err(MsgError::NotExist),
                };
                if let (Some(qh), Ok(true)) = (qh_lookup, &result) {
                    debug!("queue {:?} destroyed on close, unlinking from its groups", r.queue_name);
                    let touched = self.groups.remove_queue_everywhere(qh);
                    for gh in touched {
                        self.flush_tracking(gh, &mut out);
                    }
                }
                if is_local {
                    let err = result.err().map(|e| e.code()).unwrap_or(ErrorCode::Ok);
                    let frame = response::build(OpCode::QueueClose, err, 0, ResponseBody::Empty);
                    out.push(Outgoing::Response { conn: source.conn, frame });
                }
            }
            ExecRecord::QueueStatusGet(r) => {
                if is_local {
                    let frame = match self.queues.status_get(&r.queue_name) {
                        Ok(status) => response::build(OpCode::QueueStatusGet, ErrorCode::Ok, 0, ResponseBody::Status(status)),
                        Err(e) => response::build(OpCode::QueueStatusGet, e.code(), 0, ResponseBody::Empty),
                    };
                    out.push(Outgoing::Response { conn: source.conn, frame });
                }
            }
            ExecRecord::QueueUnlink(r) => {
                let result = self.queues.unlink(&r.queue_name);
                if let Ok((qh, true)) = &result {
                    debug!("queue {:?} destroyed on unlink, unlinking from its groups", r.queue_name);
                    let touched = self.groups.remove_queue_everywhere(*qh);
                    for gh in touched {
                        self.flush_tracking(gh, &mut out);
                    }
                }
                if is_local {
                    let err = result.err().map(|e| e.code()).unwrap_or(ErrorCode::Ok);
                    let frame = response::build(OpCode::QueueUnlink, err, 0, ResponseBody::Empty);
                    out.push(Outgoing::Response { conn: source.conn, frame });
                }
            }
            ExecRecord::QueueGroupCreate(r) => {
                let result = self.groups.create(r.group_name.clone(), policy_from_u32(r.policy));
                if is_local {
                    let err = result.err().map(|e| e.code()).unwrap_or(ErrorCode::Ok);
                    let frame = response::build(OpCode::QueueGroupCreate, err, 0, ResponseBody::Empty);
                    out.push(Outgoing::Response { conn: source.conn, frame });
                }
            }
            ExecRecord::QueueGroupInsert(r) => {
                let result = (|| {
                    let gh = self.groups.find_handle(&r.group_name).ok_or(MsgError::NotExist)?;
                    let qh = self.queues.find_handle(&r.queue_name).ok_or(MsgError::NotExist)?;
                    self.groups.insert(gh, qh, r.queue_name.clone(), source.node_id)?;
                    Ok::<Handle, MsgError>(gh)
                })();
                if let Ok(gh) = result {
                    self.flush_tracking(gh, &mut out);
                }
                if is_local {
                    let err = result.err().map(|e| e.code()).unwrap_or(ErrorCode::Ok);
                    let frame = response::build(OpCode::QueueGroupInsert, err, 0, ResponseBody::Empty);
                    out.push(Outgoing::Response { conn: source.conn, frame });
                }
            }
            ExecRecord::QueueGroupRemove(r) => {
                let result = (|| {
                    let gh = self.groups.find_handle(&r.group_name).ok_or(MsgError::NotExist)?;
                    let qh = self.queues.find_handle(&r.queue_name).ok_or(MsgError::NotExist)?;
                    self.groups.mark_removed(gh, qh)?;
                    Ok::<Handle, MsgError>(gh)
                })();
                if let Ok(gh) = result {
                    self.flush_tracking(gh, &mut out);
                }
                if is_local {
                    let err = result.err().map(|e| e.code()).unwrap_or(ErrorCode::Ok);
                    let frame = response::build(OpCode::QueueGroupRemove, err, 0, ResponseBody::Empty);
                    out.push(Outgoing::Response { conn: source.conn, frame });
                }
            }
            ExecRecord::QueueGroupDelete(r) => {
                let result = self.groups.delete(&r.group_name);
                if let Ok(gh) = result {
                    self.tracking.drop_group(gh);
                }
                if is_local {
                    let err = result.err().map(|e| e.code()).unwrap_or(ErrorCode::Ok);
                    let frame = response::build(OpCode::QueueGroupDelete, err, 0, ResponseBody::Empty);
                    out.push(Outgoing::Response { conn: source.conn, frame });
                }
            }
            ExecRecord::QueueGroupTrack(r) => {
                if is_local {
                    let result = self.groups.find_handle(&r.group_name).ok_or(MsgError::NotExist);
                    match result {
                        Ok(gh) => {
                            let flags = track_flags_from_u8(r.track_flags);
                            let snapshot = {
                                let group = self.groups.group(gh).expect("handle just resolved");
                                self.tracking.track(gh, group, client_id, source.conn, dispatch, flags, 0)
                            };
                            let ack = response::build(OpCode::QueueGroupTrack, ErrorCode::Ok, 0, ResponseBody::Empty);
                            out.push(Outgoing::Response { conn: source.conn, frame: ack });
                            if let Some(snap) = snapshot {
                                let frame = response::build(OpCode::QueueGroupTrack, ErrorCode::Ok, 0, ResponseBody::Current(snap));
                                if r.buffer_flag != 0 {
                                    out.push(Outgoing::Response { conn: source.conn, frame });
                                } else {
                                    out.push(Outgoing::Dispatch { dispatch, frame });
                                }
                            }
                        }
                        Err(e) => {
                            let frame = response::build(OpCode::QueueGroupTrack, e.code(), 0, ResponseBody::Empty);
                            out.push(Outgoing::Response { conn: source.conn, frame });
                        }
                    }
                }
            }
            ExecRecord::QueueGroupTrackStop(r) => {
                if is_local {
                    let result = self
                        .groups
                        .find_handle(&r.group_name)
                        .ok_or(MsgError::NotExist)
                        .and_then(|gh| self.tracking.track_stop(gh, client_id));
                    let err = result.err().map(|e| e.code()).unwrap_or(ErrorCode::Ok);
                    let frame = response::build(OpCode::QueueGroupTrackStop, err, 0, ResponseBody::Empty);
                    out.push(Outgoing::Response { conn: source.conn, frame });
                }
            }
            ExecRecord::MessageSend(r) if r.timeout > 0 && now_nanos > r.timeout => {
                trace!("MessageSend to {:?} missed its deadline before apply", r.destination);
                if is_local {
                    let frame = response::build(OpCode::MessageSend, ErrorCode::Timeout, r.invocation, ResponseBody::Empty);
                    out.push(route_response(r.async_call, source.conn, dispatch, frame));
                }
            }
            ExecRecord::MessageSend(r) => {
                self.sender_seq += 1;
                let sender_id = self.sender_seq;
                let priority = Priority::clamp(r.priority);
                let sender_name = if r.has_sender { Some(r.sender_name.clone()) } else { None };
                let message = Message {
                    msg_type: r.msg_type,
                    version: r.msg_version,
                    sender_name,
                    priority,
                    data: r.payload.clone(),
                };
                let result = (|| {
                    let targets = self.resolve_destination(&r.destination, source.node_id)?;
                    if targets.is_empty() {
                        return Err(MsgError::NotExist);
                    }
                    // Broadcast enqueues on every member; one member's failure
                    // (e.g. QUEUE_FULL) must not stop delivery to the rest, so
                    // results are collected instead of short-circuited.
                    let mut delivered = false;
                    let mut last_err = MsgError::NotExist;
                    for qh in targets {
                        let entry = MessageEntry {
                            enqueue_time_nanos: now_nanos,
                            sender_id,
                            message: message.clone(),
                            reply_to: None,
                        };
                        match self.deliver_to_queue(qh, entry, &mut out) {
                            Ok(()) => delivered = true,
                            Err(e) => {
                                warn!("MessageSend delivery to one member of {:?} failed: {e}", r.destination);
                                last_err = e;
                            }
                        }
                    }
                    if delivered {
                        Ok(())
                    } else {
                        Err(last_err)
                    }
                })();
                if result.is_ok() {
                    let ack_flags = ack_flags_from_u32(r.ack_flags);
                    if r.async_call && ack_flags.contains(AckFlags::MessageDeliveredAck) {
                        let frame = response::build(OpCode::MessageSend, ErrorCode::Ok, r.invocation, ResponseBody::DeliveredAck { sender_id });
                        out.push(Outgoing::Dispatch { dispatch, frame });
                    }
                }
                if is_local {
                    let err = result.err().map(|e| e.code()).unwrap_or(ErrorCode::Ok);
                    let frame = response::build(OpCode::MessageSend, err, r.invocation, ResponseBody::Empty);
                    out.push(route_response(r.async_call, source.conn, dispatch, frame));
                }
            }
            ExecRecord::MessageGet(r) => {
                let qh = self.queues.find_handle(&r.queue_name);
                match qh {
                    None => {
                        if is_local {
                            let frame = response::build(OpCode::MessageGet, ErrorCode::NotExist, 0, ResponseBody::Empty);
                            out.push(Outgoing::Response { conn: source.conn, frame });
                        }
                    }
                    Some(qh) => {
                        let entry = self.queues.queue_mut(qh).ok().and_then(|q| q.dequeue_highest_priority());
                        match entry {
                            Some(entry) => {
                                if is_local {
                                    let frame = response::build(OpCode::MessageGet, ErrorCode::Ok, 0, ResponseBody::Delivered(delivered_from(&entry)));
                                    out.push(Outgoing::Response { conn: source.conn, frame });
                                }
                            }
                            None if is_local => {
                                if r.timeout > 0 {
                                    if let Ok(q) = self.queues.queue_mut(qh) {
                                        q.waiters.push_back(Waiter {
                                            client_id,
                                            conn: source.conn,
                                            dispatch,
                                            request_id: 0,
                                            timeout_nanos: now_nanos + r.timeout,
                                            async_call: false,
                                            invocation: 0,
                                        });
                                    }
                                } else {
                                    let frame = response::build(OpCode::MessageGet, ErrorCode::Timeout, 0, ResponseBody::Empty);
                                    out.push(Outgoing::Response { conn: source.conn, frame });
                                }
                            }
                            None => {}
                        }
                    }
                }
            }
            ExecRecord::MessageCancel(r) => {
                if is_local {
                    if let Some(qh) = self.queues.find_handle(&r.queue_name) {
                        if let Ok(q) = self.queues.queue_mut(qh) {
                            let before = q.waiters.len();
                            q.waiters.retain(|w| w.client_id != client_id);
                            if q.waiters.len() < before {
                                let frame = response::build(OpCode::MessageGet, ErrorCode::Interrupt, 0, ResponseBody::Empty);
                                out.push(Outgoing::Response { conn: source.conn, frame });
                            }
                        }
                    }
                    let frame = response::build(OpCode::MessageCancel, ErrorCode::Ok, 0, ResponseBody::Empty);
                    out.push(Outgoing::Response { conn: source.conn, frame });
                }
            }
            ExecRecord::MessageSendReceive(r) if r.timeout > 0 && now_nanos > r.timeout => {
                trace!("MessageSendReceive to {:?} missed its deadline before apply", r.destination);
                if is_local {
                    let frame = response::build(OpCode::MessageSendReceive, ErrorCode::Timeout, 0, ResponseBody::Empty);
                    out.push(Outgoing::Response { conn: source.conn, frame });
                }
            }
            ExecRecord::MessageSendReceive(r) => {
                self.sender_seq += 1;
                let sender_id = self.sender_seq;
                let priority = Priority::clamp(r.priority);
                let message = Message {
                    msg_type: r.msg_type,
                    version: r.msg_version,
                    sender_name: None,
                    priority,
                    data: r.payload.clone(),
                };
                let result = (|| {
                    let targets = self.resolve_destination(&r.destination, source.node_id)?;
                    if targets.is_empty() {
                        return Err(MsgError::NotExist);
                    }
                    let mut delivered = false;
                    let mut last_err = MsgError::NotExist;
                    for qh in targets {
                        let entry = MessageEntry {
                            enqueue_time_nanos: now_nanos,
                            sender_id,
                            message: message.clone(),
                            reply_to: Some(r.queue_name.clone()),
                        };
                        match self.deliver_to_queue(qh, entry, &mut out) {
                            Ok(()) => delivered = true,
                            Err(e) => {
                                warn!("MessageSendReceive delivery to one member of {:?} failed: {e}", r.destination);
                                last_err = e;
                            }
                        }
                    }
                    if delivered {
                        Ok(())
                    } else {
                        Err(last_err)
                    }
                })();
                if is_local {
                    let err = result.err().map(|e| e.code()).unwrap_or(ErrorCode::Ok);
                    let frame = response::build(OpCode::MessageSendReceive, err, 0, ResponseBody::Empty);
                    out.push(Outgoing::Response { conn: source.conn, frame });
                }
            }
            ExecRecord::MessageReply(r) => {
                self.sender_seq += 1;
                let sender_id = self.sender_seq;
                let priority = Priority::clamp(r.priority);
                let message = Message {
                    msg_type: r.msg_type,
                    version: r.msg_version,
                    sender_name: None,
                    priority,
                    data: r.payload.clone(),
                };
                let result = (|| {
                    let qh = self.queues.find_handle(&r.queue_name).ok_or(MsgError::NotExist)?;
                    let entry = MessageEntry {
                        enqueue_time_nanos: now_nanos,
                        sender_id,
                        message,
                        reply_to: None,
                    };
                    self.deliver_to_queue(qh, entry, &mut out)
                })();
                if is_local {
                    let err = result.err().map(|e| e.code()).unwrap_or(ErrorCode::Ok);
                    let frame = response::build(OpCode::MessageReply, err, 0, ResponseBody::Empty);
                    out.push(route_response(r.async_call, source.conn, dispatch, frame));
                }
            }
        }
        out
    }

    /// Sweep retained queues and expired waiters, for the poll-loop's idle
    /// tick (spec.md §9). Not itself an `ExecRecord` — runs node-local and
    /// unconditionally, since retention/timeout deadlines are derived from
    /// each node's own clock rather than agreed over the wire.
    pub fn sweep(&mut self, now_nanos: u64) -> Vec<Outgoing> {
        let mut out = Vec::new();
        for (_, waiter) in self.queues.sweep_expired_waiters(now_nanos) {
            let frame = response::build(OpCode::MessageGet, ErrorCode::Timeout, waiter.invocation, ResponseBody::Empty);
            out.push(Outgoing::Response { conn: waiter.conn, frame });
        }
        for (qh, name) in self.queues.sweep_retention(now_nanos) {
            debug!("queue {name:?} destroyed by retention sweep, unlinking from its groups");
            let touched = self.groups.remove_queue_everywhere(qh);
            for gh in touched {
                self.flush_tracking(gh, &mut out);
            }
        }
        out
    }
}

fn route_response(async_call: bool, conn: ConnHandle, dispatch: crate::ipc::DispatchHandle, frame: crate::ipc::IpcFrame) -> Outgoing {
    if async_call {
        Outgoing::Dispatch { dispatch, frame }
    } else {
        Outgoing::Response { conn, frame }
    }
}
