//! `IpcServer` capability (spec.md §1, §6): the local application ↔ broker
//! transport.
//!
//! Out of scope for this crate; specified only as the surface the response
//! dispatcher (C8) needs to ship frames back to a client. A real
//! implementation is a length-prefixed local socket; the `conn`/`dispatch`
//! identifiers here are opaque, cheap-to-copy handles into that layer.

use crate::message::Priority;

/// Identifies a client's synchronous response connection. Meaningful only on
/// the node that accepted the connection (spec.md §3 `MessageSource`); reset
/// to `None` when an `ExecRecord` crosses a node boundary.
pub type ConnHandle = Option<u64>;

/// Identifies a client's paired asynchronous dispatch connection
/// (GLOSSARY: "Dispatch connection"), established alongside `conn` at
/// session handshake.
pub type DispatchHandle = Option<u64>;

/// A framed response or dispatch payload, ready to be written to an IPC
/// connection (spec.md §6 local IPC header shape).
#[derive(Debug, Clone)]
pub struct IpcFrame {
    pub id: u32,
    pub error: u32,
    pub payload: Vec<u8>,
}

/// Capability required of the local IPC layer.
pub trait IpcServer {
    /// Send `frame` on the client's synchronous response connection. A
    /// `None` `conn` (cross-node apply, spec.md §4.6) is a documented no-op,
    /// not an error.
    fn respond(&mut self, conn: ConnHandle, frame: IpcFrame);

    /// Send `frame` on the client's asynchronous dispatch connection.
    fn dispatch(&mut self, dispatch: DispatchHandle, frame: IpcFrame);
}

/// A "message available" notification body (spec.md §4.7 Send step 4),
/// delivered to every open handle with `RECEIVE_CALLBACK` on the target
/// queue.
#[derive(Debug, Clone, Copy)]
pub struct MessageAvailable {
    pub queue_handle: u64,
    pub priority: Priority,
}
