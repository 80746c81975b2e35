//! Single-node command-line harness for exercising `clustermsg` end to end,
//! in the spirit of `ddsperf` in the upstream example tree: no real cluster,
//! just the library driven in-process against loopback `Transport`/`IpcServer`
//! doubles so a user can poke at queues from a shell.

use std::fs;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use clap::{Parser, Subcommand};

use clustermsg::exec::{CreationAttrs, ExecRecord, OpCode};
use clustermsg::ipc::{ConnHandle, DispatchHandle, IpcFrame, IpcServer};
use clustermsg::name::Name;
use clustermsg::transport::{DeliveryMode, Transport};
use clustermsg::{MsgError, MsgResult, MsgService, MsgServiceConfigBuilder};

const CONN: u64 = 1;
const CLIENT_ID: u64 = 1;

#[derive(Parser)]
#[command(author, version, about = "Single-node clustermsg test harness")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open (and create, if missing) a queue.
    Open {
        /// Queue name.
        #[arg(short = 'c', long = "queue")]
        queue: String,
        /// Retention time in seconds, applied if the queue is created.
        #[arg(short = 't', long = "retention", default_value_t = 0)]
        retention_secs: u64,
    },
    /// Send a message, reading its payload from a file.
    Send {
        #[arg(short = 'c', long = "queue")]
        queue: String,
        /// Sender name echoed to anyone that later `MessageGet`s it.
        #[arg(short = 'n', long = "sender")]
        sender: Option<String>,
        /// Path to a file holding the raw payload bytes.
        #[arg(short = 'u', long = "data")]
        data: String,
        #[arg(short = 'i', long = "invocation", default_value_t = 0)]
        invocation: u64,
    },
    /// Block (up to a wait time) for the next message on a queue.
    Get {
        #[arg(short = 'c', long = "queue")]
        queue: String,
        /// Wait time in seconds before giving up.
        #[arg(short = 'w', long = "wait", default_value_t = 0)]
        wait_secs: u64,
    },
    /// Repeat a send/get cycle `-x` times against the same queue, for a
    /// quick soak of the priority queue and retention sweep paths.
    Replay {
        #[arg(short = 'c', long = "queue")]
        queue: String,
        #[arg(short = 'u', long = "data")]
        data: String,
        #[arg(short = 'x', long = "count", default_value_t = 1)]
        count: u32,
    },
    /// Print a queue's current status.
    Status {
        #[arg(short = 'c', long = "queue")]
        queue: String,
    },
}

/// Loopback `Transport`: a single-node harness has no real agreed-order
/// group to deliver through, so `mcast` just parks the record for
/// `deliver_pending` to hand straight to `MsgService::on_delivered`.
#[derive(Default)]
struct LoopbackTransport {
    pending: Option<ExecRecord>,
}

impl Transport for LoopbackTransport {
    fn is_cross_endian(&self, _origin: u32) -> bool {
        false
    }

    fn local_node_id(&self) -> u32 {
        0
    }

    fn mcast(&mut self, record: ExecRecord, _mode: DeliveryMode) -> MsgResult<()> {
        self.pending = Some(record);
        Ok(())
    }
}

/// Prints every frame it receives in a human-readable form instead of
/// shipping bytes over a real socket.
struct ConsoleIpc;

fn opcode_name(id: u32) -> String {
    match OpCode::from_u16((id & 0xffff) as u16) {
        Some(op) => format!("{op:?}"),
        None => format!("op#{id}"),
    }
}

fn describe_payload(op: u32, payload: &[u8]) -> String {
    let mut cur = Cursor::new(payload);
    let invocation = cur.read_u64::<LittleEndian>().unwrap_or(0);
    let rest = &payload[(cur.position() as usize).min(payload.len())..];
    match OpCode::from_u16((op & 0xffff) as u16) {
        Some(OpCode::QueueOpen) => {
            let mut r = Cursor::new(rest);
            let handle = r.read_u64::<LittleEndian>().unwrap_or(0);
            format!("invocation={invocation} handle={handle}")
        }
        Some(OpCode::MessageGet) if !rest.is_empty() => {
            let mut r = Cursor::new(rest);
            let msg_type = r.read_u32::<LittleEndian>().unwrap_or(0);
            let msg_version = r.read_u32::<LittleEndian>().unwrap_or(0);
            let has_sender = r.read_u8().unwrap_or(0) != 0;
            if has_sender {
                let len = r.read_u16::<LittleEndian>().unwrap_or(0) as usize;
                let mut name = vec![0u8; len];
                std::io::Read::read_exact(&mut r, &mut name).ok();
            }
            let priority = r.read_u8().unwrap_or(0);
            let sender_id = r.read_u64::<LittleEndian>().unwrap_or(0);
            let _send_time = r.read_u64::<LittleEndian>().unwrap_or(0);
            let size = r.read_u32::<LittleEndian>().unwrap_or(0);
            format!(
                "delivered type={msg_type} version={msg_version} priority={priority} sender_id={sender_id} size={size}"
            )
        }
        _ => format!("invocation={invocation} body_len={}", rest.len()),
    }
}

fn print_frame(label: &str, frame: &IpcFrame) {
    println!(
        "{label}: {} error={} {}",
        opcode_name(frame.id),
        frame.error,
        describe_payload(frame.id, &frame.payload)
    );
}

impl IpcServer for ConsoleIpc {
    fn respond(&mut self, conn: ConnHandle, frame: IpcFrame) {
        if conn.is_some() {
            print_frame("response", &frame);
        }
    }

    fn dispatch(&mut self, dispatch: DispatchHandle, frame: IpcFrame) {
        if dispatch.is_some() {
            print_frame("dispatch", &frame);
        }
    }
}

fn name_of(s: &str) -> MsgResult<Name> {
    Name::try_from(s)
}

/// Drive one client request through the router and straight into apply,
/// since a single-node harness has no real agreed-order transport to wait on.
fn run_open(service: &mut MsgService, transport: &mut LoopbackTransport, ipc: &mut ConsoleIpc, queue: Name, retention_secs: u64) {
    let attrs = CreationAttrs {
        flags: 0,
        size: [0; 4],
        retention: retention_secs * 1_000_000_000,
    };
    service
        .router
        .open(transport, CONN, false, queue, 0, attrs, 0b0001, 0)
        .expect("local open never fails to enqueue");
    drain_one(service, transport, ipc);
}

fn run_send(service: &mut MsgService, transport: &mut LoopbackTransport, ipc: &mut ConsoleIpc, queue: Name, sender: Option<Name>, invocation: u64, payload: Vec<u8>) {
    service
        .router
        .message_send(transport, CONN, queue, 0, 0, 0, sender, 0, invocation, 0, false, payload)
        .expect("local send never fails to enqueue");
    drain_one(service, transport, ipc);
}

fn run_get(service: &mut MsgService, transport: &mut LoopbackTransport, ipc: &mut ConsoleIpc, queue: Name, wait_secs: u64) -> Result<(), MsgError> {
    let lib_handle = open_lib_handle(service, transport, queue.clone(), ipc)?;
    service
        .router
        .message_get(transport, &service.apply, CONN, lib_handle, wait_secs * 1_000_000_000)
        .expect("local get never fails to enqueue");
    drain_one(service, transport, ipc);
    Ok(())
}

fn run_status(service: &mut MsgService, transport: &mut LoopbackTransport, ipc: &mut ConsoleIpc, queue: Name) {
    service
        .router
        .status_get(transport, CONN, queue)
        .expect("local status_get never fails to enqueue");
    drain_one(service, transport, ipc);
}

/// `MessageGet`/`MessageCancel` address a queue by name but still need a
/// node-local handle to reach `ApplyEngine::open_handles`; the demo opens one
/// on demand rather than tracking it across invocations.
fn open_lib_handle(service: &mut MsgService, transport: &mut LoopbackTransport, queue: Name, ipc: &mut ConsoleIpc) -> Result<u32, MsgError> {
    let attrs = CreationAttrs { flags: 0, size: [0; 4], retention: 0 };
    service.router.open(transport, CONN, false, queue, 0, attrs, 0b0001, 0)?;
    drain_one(service, transport, ipc);
    let handle = service
        .apply
        .open_handles
        .iter()
        .map(|(h, _)| h)
        .max()
        .expect("open just created a handle");
    Ok(handle)
}

/// Pulls whatever record a router call just parked in `transport` and runs
/// it through apply/dispatch, then sweeps retention/waiter timeouts. A real
/// node would do the first half once per record delivered off the wire and
/// the second half once per poll-loop tick; a single-node harness can just
/// do both after every op.
fn drain_one(service: &mut MsgService, transport: &mut LoopbackTransport, ipc: &mut ConsoleIpc) {
    if let Some(record) = transport.pending.take() {
        service.on_delivered(record, false, 0, ipc);
    }
    service.on_idle(0, ipc);
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = MsgServiceConfigBuilder::new().node_id(0).build();
    let mut service = MsgService::new(config);
    let mut transport = LoopbackTransport::default();
    let mut ipc = ConsoleIpc;
    service.on_client_connected(CONN, CLIENT_ID, Some(CONN));

    let result = match cli.command {
        Command::Open { queue, retention_secs } => {
            let queue = name_of(&queue).expect("queue name too long");
            run_open(&mut service, &mut transport, &mut ipc, queue, retention_secs);
            Ok(())
        }
        Command::Send { queue, sender, data, invocation } => {
            let queue = name_of(&queue).expect("queue name too long");
            let sender = sender.map(|s| name_of(&s).expect("sender name too long"));
            let payload = fs::read(&data).unwrap_or_else(|e| panic!("reading {data}: {e}"));
            run_send(&mut service, &mut transport, &mut ipc, queue, sender, invocation, payload);
            Ok(())
        }
        Command::Get { queue, wait_secs } => {
            let queue = name_of(&queue).expect("queue name too long");
            run_get(&mut service, &mut transport, &mut ipc, queue, wait_secs)
        }
        Command::Status { queue } => {
            let queue = name_of(&queue).expect("queue name too long");
            run_status(&mut service, &mut transport, &mut ipc, queue);
            Ok(())
        }
        Command::Replay { queue, data, count } => {
            let queue = name_of(&queue).expect("queue name too long");
            let payload = fs::read(&data).unwrap_or_else(|e| panic!("reading {data}: {e}"));
            run_open(&mut service, &mut transport, &mut ipc, queue.clone(), 0);
            for i in 0..count {
                run_send(&mut service, &mut transport, &mut ipc, queue.clone(), None, i as u64, payload.clone());
                let _ = run_get(&mut service, &mut transport, &mut ipc, queue.clone(), 0);
            }
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
