//! Node-local client session bookkeeping.
//!
//! Not part of the replicated state (spec.md §3 invariant 4 only binds
//! C3/C4/C5): every node tracks only the sessions of clients connected to
//! *it*, matching `conn` → the client's paired dispatch connection
//! (GLOSSARY: "Dispatch connection") and its `client_id`.

use std::collections::HashMap;

use crate::ipc::DispatchHandle;

#[derive(Debug, Clone, Copy)]
pub struct SessionInfo {
    pub client_id: u64,
    pub dispatch: DispatchHandle,
}

#[derive(Default)]
pub struct ClientSessions {
    by_conn: HashMap<u64, SessionInfo>,
}

impl ClientSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, conn: u64, client_id: u64, dispatch: DispatchHandle) {
        self.by_conn.insert(conn, SessionInfo { client_id, dispatch });
    }

    pub fn lookup(&self, conn: u64) -> Option<SessionInfo> {
        self.by_conn.get(&conn).copied()
    }

    /// A client disconnected: drop its session record. The caller is
    /// responsible for also releasing its `OpenHandle`s and tracking
    /// subscriptions (spec.md §1 "leaked handles on client exit").
    pub fn remove(&mut self, conn: u64) -> Option<SessionInfo> {
        self.by_conn.remove(&conn)
    }
}
