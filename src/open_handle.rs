//! `OpenHandle` (spec.md §3): per-client, per-queue open record.
//!
//! Unlike `Queue`/`QueueGroup`, `OpenHandle`s are *not* replicated state —
//! each node only tracks the handles of clients connected to it (spec.md §3
//! invariant 2 is an equality over the whole cluster, but each node's share
//! of it is just its own `OpenHandle`s). The `lib_handle` returned to the
//! client is this record's slot in the node-local `HandleTable`.

use crate::handle::Handle as QueueHandle;
use crate::ipc::{ConnHandle, DispatchHandle};

#[derive(Debug, Clone)]
pub struct OpenHandle {
    pub client_id: u64,
    pub queue: QueueHandle,
    pub conn: ConnHandle,
    pub dispatch: DispatchHandle,
    pub async_invocation: Option<u64>,
    pub receive_callback: bool,
}
