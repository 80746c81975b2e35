//! A replicated message queue service: clients open/send/get against named
//! queues and queue-groups, every mutation is agreed on by the whole
//! cluster before any node applies it, and every node ends up holding the
//! same queue contents in the same order.
//!
//! Crate layout mirrors the pipeline a request takes:
//! - [`name`], [`handle`], [`message`], [`error`]: small shared types.
//! - [`queue`], [`group`]: the replicated stores (C3/C4/C5).
//! - [`open_handle`], [`session`]: node-local bookkeeping.
//! - [`transport`], [`ipc`]: capability traits this crate is built against
//!   but does not implement (out of scope; see spec.md §1).
//! - [`exec`]: the wire record family carried over `Transport::mcast`.
//! - [`router`]: turns a client request into an `ExecRecord` (C6).
//! - [`apply`]: applies a delivered `ExecRecord` identically on every node
//!   (C7).
//! - [`response`], [`dispatch`]: turn apply's output into IPC frames (C8).
//! - [`snapshot`], [`sync`]: state transfer for newly joined members (C9).
//! - [`config`]: service configuration.
//! - [`service`]: wires the above into the per-node poll-loop entry points.

pub mod apply;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod exec;
pub mod group;
pub mod handle;
pub mod ipc;
pub mod message;
pub mod name;
pub mod open_handle;
pub mod queue;
pub mod response;
pub mod router;
pub mod service;
pub mod session;
pub mod snapshot;
pub mod sync;
pub mod transport;

pub use config::{MsgServiceConfig, MsgServiceConfigBuilder};
pub use error::{ErrorCode, MsgError, MsgResult};
pub use service::MsgService;
