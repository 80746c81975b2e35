//! `Transport` capability (spec.md §1, §6): the group-communication layer.
//!
//! Out of scope for this crate (spec.md §1 lists it as an external
//! collaborator); we specify only the surface the router (C6), apply engine
//! (C7) and sync adapter (C9) need. A real implementation sits on top of
//! totem/corosync-style totally-ordered multicast; tests in this crate drive
//! the same trait with an in-memory double that preserves delivery order.

use crate::exec::ExecRecord;

/// Delivery guarantee requested for a multicast, per spec.md §2 and §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Totally ordered, every member sees the same sequence.
    Agreed,
    /// Weaker guarantee, not used by the MSG service's normative path but
    /// part of the `Transport` capability surface (spec.md §1).
    Safe,
}

/// Identifies a member of the current cluster view.
pub type NodeId = u32;

/// The transport's monotonically advancing membership epoch (GLOSSARY:
/// "Ring id"), used to discard records delivered across a stale view.
pub type RingId = u64;

/// A membership change, as delivered to [`crate::sync::SyncAdapter`]
/// (spec.md §4.8).
#[derive(Debug, Clone)]
pub struct ConfigurationChange {
    pub members: Vec<NodeId>,
    pub left: Vec<NodeId>,
    pub joined: Vec<NodeId>,
    pub ring_id: RingId,
}

/// Capability required of the underlying group-communication transport.
///
/// Implementations MUST guarantee, for `mcast(_, DeliveryMode::Agreed)`:
/// every member delivers the same sequence of records in the same order
/// (spec.md §3 invariant 4, §5).
pub trait Transport {
    /// True when the given remote node uses a different byte order than this
    /// node — the apply engine calls `ExecRecord::byteswap_in_place` exactly
    /// when this is true for the record's origin (spec.md §6).
    fn is_cross_endian(&self, origin: NodeId) -> bool;

    fn local_node_id(&self) -> NodeId;

    /// Broadcast `record`. Returns `Err(TryAgain)` if the transport's own
    /// send queue is full (spec.md §5 "backpressure") without broadcasting.
    fn mcast(&mut self, record: ExecRecord, mode: DeliveryMode) -> Result<(), crate::error::MsgError>;
}
