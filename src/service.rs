//! Top-level service: wires C6 (router), C7 (apply), C8 (dispatch) and C9
//! (sync) together behind the single-threaded poll-loop spec.md §9 asks
//! for. Conceptually `saMsgInitialize`/`saMsgFinalize`'s server-side
//! counterpart — one `MsgService` per node process, constructed once at
//! startup and driven by whatever owns the `Transport`/`IpcServer`
//! connections (out of scope here, spec.md §1).

use log::{debug, info};

use crate::apply::ApplyEngine;
use crate::config::MsgServiceConfig;
use crate::exec::{byteswap_in_place, ExecRecord};
use crate::handle::Handle;
use crate::ipc::{DispatchHandle, IpcServer};
use crate::dispatch::dispatch_all;
use crate::router::Router;
use crate::session::ClientSessions;
use crate::sync::{SyncAction, SyncAdapter};
use crate::transport::ConfigurationChange;

pub struct MsgService {
    pub router: Router,
    pub apply: ApplyEngine,
    pub sessions: ClientSessions,
    pub sync: SyncAdapter,
}

impl MsgService {
    pub fn new(config: MsgServiceConfig) -> Self {
        let node_id = config.node_id;
        MsgService {
            router: Router::new(node_id),
            sync: SyncAdapter::new(node_id),
            apply: ApplyEngine::new(config),
            sessions: ClientSessions::new(),
        }
    }

    pub fn on_client_connected(&mut self, conn: u64, client_id: u64, dispatch: DispatchHandle) {
        debug!("client {client_id} connected on conn {conn}");
        self.sessions.register(conn, client_id, dispatch);
    }

    /// A client dropped its IPC connection: release everything node-local
    /// that was keyed on it (spec.md §1 "leaked handles on client exit"), and
    /// close every queue the client had open but never explicitly closed —
    /// otherwise the cluster-wide `Queue.refcount` those handles held would
    /// never reach zero (invariant 2: refcount == count(open_handles
    /// referencing q across all nodes)). A queue this drops to its last
    /// reference is also unlinked from any group it belonged to, the same as
    /// an explicit `QueueClose`/`QueueUnlink`/retention expiry would do.
    pub fn on_client_disconnected(&mut self, conn: u64, now_nanos: u64, ipc: &mut impl IpcServer) {
        let Some(info) = self.sessions.remove(conn) else { return };
        info!("client {} disconnected on conn {conn}", info.client_id);
        self.apply.tracking.drop_client(info.client_id);
        let stale: Vec<(Handle, Handle)> = self
            .apply
            .open_handles
            .iter()
            .filter(|(_, oh)| oh.conn == Some(conn))
            .map(|(h, oh)| (h, oh.queue))
            .collect();
        let mut outgoing = Vec::new();
        for (lib_handle, queue_handle) in stale {
            if let Ok(true) = self.apply.queues.close(queue_handle, now_nanos) {
                debug!("queue closed on client disconnect reached refcount 0, unlinking from its groups");
                let touched = self.apply.groups.remove_queue_everywhere(queue_handle);
                for gh in touched {
                    self.apply.flush_tracking(gh, &mut outgoing);
                }
            }
            let _ = self.apply.release_open_handle(lib_handle);
        }
        dispatch_all(outgoing, ipc);
    }

    /// One record delivered off the agreed-order transport (spec.md §4.6):
    /// byteswap first if its origin is cross-endian, then apply and ship
    /// whatever C8 frames came out of it.
    pub fn on_delivered(&mut self, mut record: ExecRecord, cross_endian: bool, now_nanos: u64, ipc: &mut impl IpcServer) {
        if cross_endian {
            byteswap_in_place(&mut record);
        }
        let outgoing = self.apply.apply(record, &self.sessions, now_nanos);
        dispatch_all(outgoing, ipc);
    }

    /// Idle-tick housekeeping: retention sweep and waiter timeout sweep
    /// (spec.md §9), run once per poll-loop iteration regardless of whether
    /// any record was delivered.
    pub fn on_idle(&mut self, now_nanos: u64, ipc: &mut impl IpcServer) {
        let outgoing = self.apply.sweep(now_nanos);
        dispatch_all(outgoing, ipc);
    }

    /// A membership view change (spec.md §4.8). The caller is responsible
    /// for actually shipping/receiving the snapshot bytes over whatever
    /// out-of-band channel it has — `sync::build_snapshot`/`install_snapshot`
    /// do the encode/decode once those bytes exist.
    pub fn on_configuration_change(&mut self, change: &ConfigurationChange) -> SyncAction {
        info!(
            "configuration change: ring {} members {:?} joined {:?} left {:?}",
            change.ring_id, change.members, change.joined, change.left
        );
        self.sync.on_configuration_change(change)
    }
}
