//! End-to-end scenarios against an in-memory `Transport`/`IpcServer` pair
//! (spec.md §8 "Concrete end-to-end scenarios"). A single-node cluster is
//! enough to exercise router -> apply -> dispatch; multi-node agreement
//! itself is `Transport`'s contract, not this crate's.

use std::collections::VecDeque;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use clustermsg::config::MsgServiceConfigBuilder;
use clustermsg::error::{ErrorCode, MsgError};
use clustermsg::exec::{CreationAttrs, ExecRecord};
use clustermsg::group::TrackFlags;
use clustermsg::ipc::{ConnHandle, DispatchHandle, IpcFrame, IpcServer};
use clustermsg::name::Name;
use clustermsg::queue::OpenFlags;
use clustermsg::service::MsgService;
use clustermsg::transport::{DeliveryMode, NodeId, Transport};

struct LoopbackTransport {
    node_id: NodeId,
    queue: VecDeque<ExecRecord>,
}

impl LoopbackTransport {
    fn new(node_id: NodeId) -> Self {
        LoopbackTransport { node_id, queue: VecDeque::new() }
    }
}

impl Transport for LoopbackTransport {
    fn is_cross_endian(&self, _origin: NodeId) -> bool {
        false
    }

    fn local_node_id(&self) -> NodeId {
        self.node_id
    }

    fn mcast(&mut self, record: ExecRecord, _mode: DeliveryMode) -> Result<(), MsgError> {
        self.queue.push_back(record);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingIpc {
    responses: Vec<(ConnHandle, IpcFrame)>,
    dispatches: Vec<(DispatchHandle, IpcFrame)>,
}

impl IpcServer for RecordingIpc {
    fn respond(&mut self, conn: ConnHandle, frame: IpcFrame) {
        self.responses.push((conn, frame));
    }

    fn dispatch(&mut self, dispatch: DispatchHandle, frame: IpcFrame) {
        self.dispatches.push((dispatch, frame));
    }
}

fn drain(service: &mut MsgService, transport: &mut LoopbackTransport, ipc: &mut RecordingIpc) {
    while let Some(record) = transport.queue.pop_front() {
        service.on_delivered(record, false, 0, ipc);
    }
}

fn name(s: &str) -> Name {
    Name::try_from(s).unwrap()
}

fn creation_attrs() -> CreationAttrs {
    CreationAttrs { flags: 0, size: [0; 4], retention: 0 }
}

fn read_name(c: &mut Cursor<&[u8]>) -> String {
    let len = c.read_u16::<LittleEndian>().unwrap();
    let mut buf = vec![0u8; len as usize];
    std::io::Read::read_exact(c, &mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}

fn decode_invocation_and_handle(frame: &IpcFrame) -> (u64, u64) {
    let mut c = Cursor::new(frame.payload.as_slice());
    let invocation = c.read_u64::<LittleEndian>().unwrap();
    let handle = c.read_u64::<LittleEndian>().unwrap();
    (invocation, handle)
}

fn decode_delivered(frame: &IpcFrame) -> (u8, Vec<u8>) {
    let mut c = Cursor::new(frame.payload.as_slice());
    let _invocation = c.read_u64::<LittleEndian>().unwrap();
    let _msg_type = c.read_u32::<LittleEndian>().unwrap();
    let _version = c.read_u32::<LittleEndian>().unwrap();
    let has_sender = c.read_u8().unwrap() != 0;
    if has_sender {
        let _ = read_name(&mut c);
    }
    let priority = c.read_u8().unwrap();
    let _sender_id = c.read_u64::<LittleEndian>().unwrap();
    let _send_time = c.read_u64::<LittleEndian>().unwrap();
    let len = c.read_u32::<LittleEndian>().unwrap() as usize;
    let mut data = vec![0u8; len];
    std::io::Read::read_exact(&mut c, &mut data).unwrap();
    (priority, data)
}

fn decode_available(frame: &IpcFrame) -> (u64, u8) {
    let mut c = Cursor::new(frame.payload.as_slice());
    let _invocation = c.read_u64::<LittleEndian>().unwrap();
    let queue_handle = c.read_u64::<LittleEndian>().unwrap();
    let priority = c.read_u8().unwrap();
    (queue_handle, priority)
}

fn decode_track_entries(frame: &IpcFrame) -> Vec<(String, u8)> {
    let mut c = Cursor::new(frame.payload.as_slice());
    let _invocation = c.read_u64::<LittleEndian>().unwrap();
    let count = c.read_u32::<LittleEndian>().unwrap();
    (0..count).map(|_| (read_name(&mut c), c.read_u8().unwrap())).collect()
}

fn new_service() -> MsgService {
    MsgService::new(MsgServiceConfigBuilder::new().node_id(1).build())
}

fn open_queue(service: &mut MsgService, transport: &mut LoopbackTransport, ipc: &mut RecordingIpc, conn: u64, queue: &str, open_flags: u32) -> u32 {
    service
        .router
        .open(transport, conn, false, name(queue), 0, creation_attrs(), open_flags, 0)
        .unwrap();
    drain(service, transport, ipc);
    let (_, frame) = ipc.responses.last().unwrap();
    assert_eq!(frame.error, ErrorCode::Ok as u32, "open({queue}) failed");
    let (_, handle) = decode_invocation_and_handle(frame);
    handle as u32
}

/// Scenario 1: simple open/close round trip (spec.md §8 scenario 1).
#[test]
fn open_close_unlink_round_trip() {
    let mut service = new_service();
    let mut transport = LoopbackTransport::new(1);
    let mut ipc = RecordingIpc::default();
    service.on_client_connected(1, 100, Some(1));

    let lib_handle = open_queue(&mut service, &mut transport, &mut ipc, 1, "Q1", OpenFlags::Create as u32);

    service.router.close(&mut transport, &mut service.apply, 1, lib_handle).unwrap();
    drain(&mut service, &mut transport, &mut ipc);
    assert_eq!(ipc.responses.last().unwrap().1.error, ErrorCode::Ok as u32);

    service.router.unlink(&mut transport, 1, name("Q1")).unwrap();
    drain(&mut service, &mut transport, &mut ipc);
    assert_eq!(ipc.responses.last().unwrap().1.error, ErrorCode::Ok as u32);
}

/// Scenario 2: Send + Get with RECEIVE_CALLBACK (spec.md §8 scenario 2).
#[test]
fn send_then_get_with_receive_callback() {
    let mut service = new_service();
    let mut transport = LoopbackTransport::new(1);
    let mut ipc = RecordingIpc::default();
    service.on_client_connected(1, 100, Some(7));

    let lib_handle = open_queue(
        &mut service,
        &mut transport,
        &mut ipc,
        1,
        "Q1",
        (OpenFlags::Create as u32) | (OpenFlags::ReceiveCallback as u32),
    );

    service
        .router
        .message_send(&mut transport, 1, name("Q1"), 0, 1, 1, None, 2, 0, 0, false, b"hello".to_vec())
        .unwrap();
    drain(&mut service, &mut transport, &mut ipc);

    assert_eq!(ipc.dispatches.len(), 1, "receive callback should have fired once");
    let (_, priority) = decode_available(&ipc.dispatches[0].1);
    assert_eq!(priority, 2);

    service.router.message_get(&mut transport, &service.apply, 1, lib_handle, 0).unwrap();
    drain(&mut service, &mut transport, &mut ipc);
    let (_, get_frame) = ipc.responses.last().unwrap();
    assert_eq!(get_frame.error, ErrorCode::Ok as u32);
    let (priority, data) = decode_delivered(get_frame);
    assert_eq!(priority, 2);
    assert_eq!(data, b"hello");
}

/// Scenario 3: queue-group round-robin (spec.md §8 scenario 3).
#[test]
fn queue_group_round_robin_cycles_members() {
    let mut service = new_service();
    let mut transport = LoopbackTransport::new(1);
    let mut ipc = RecordingIpc::default();
    service.on_client_connected(1, 100, Some(1));

    service.router.group_create(&mut transport, 1, name("GA"), 0).unwrap();
    drain(&mut service, &mut transport, &mut ipc);
    assert_eq!(ipc.responses.last().unwrap().1.error, ErrorCode::Ok as u32);

    let mut handles = Vec::new();
    for q in ["Q_A", "Q_B", "Q_C"] {
        handles.push(open_queue(&mut service, &mut transport, &mut ipc, 1, q, OpenFlags::Create as u32));
    }

    for q in ["Q_A", "Q_B", "Q_C"] {
        service.router.group_insert(&mut transport, 1, name(q), name("GA")).unwrap();
        drain(&mut service, &mut transport, &mut ipc);
        assert_eq!(ipc.responses.last().unwrap().1.error, ErrorCode::Ok as u32);
    }

    for i in 0..6u8 {
        service
            .router
            .message_send(&mut transport, 1, name("GA"), 0, 1, 1, None, 0, 0, 0, false, vec![i])
            .unwrap();
        drain(&mut service, &mut transport, &mut ipc);
    }

    for (i, lib_handle) in handles.iter().enumerate() {
        service.router.message_get(&mut transport, &service.apply, 1, *lib_handle, 0).unwrap();
        drain(&mut service, &mut transport, &mut ipc);
        let (_, frame) = ipc.responses.last().unwrap();
        let (_, first) = decode_delivered(frame);
        assert_eq!(first, vec![i as u8]);

        service.router.message_get(&mut transport, &service.apply, 1, *lib_handle, 0).unwrap();
        drain(&mut service, &mut transport, &mut ipc);
        let (_, frame) = ipc.responses.last().unwrap();
        let (_, second) = decode_delivered(frame);
        assert_eq!(second, vec![(i + 3) as u8]);
    }
}

/// Scenario 4: tracking with CHANGES_ONLY (spec.md §8 scenario 4).
#[test]
fn tracking_changes_only_reports_exactly_the_delta() {
    let mut service = new_service();
    let mut transport = LoopbackTransport::new(1);
    let mut ipc = RecordingIpc::default();
    service.on_client_connected(1, 100, Some(9));

    service.router.group_create(&mut transport, 1, name("GA"), 0).unwrap();
    drain(&mut service, &mut transport, &mut ipc);

    service
        .router
        .group_track(&mut transport, 1, name("GA"), TrackFlags::ChangesOnly as u8, 0)
        .unwrap();
    drain(&mut service, &mut transport, &mut ipc);
    assert_eq!(ipc.responses.last().unwrap().1.error, ErrorCode::Ok as u32);
    assert!(ipc.dispatches.is_empty(), "CHANGES_ONLY without CURRENT yields no immediate snapshot");

    open_queue(&mut service, &mut transport, &mut ipc, 1, "Q_A", OpenFlags::Create as u32);
    service.router.group_insert(&mut transport, 1, name("Q_A"), name("GA")).unwrap();
    drain(&mut service, &mut transport, &mut ipc);
    assert_eq!(ipc.dispatches.len(), 1);
    let entries = decode_track_entries(&ipc.dispatches[0].1);
    assert_eq!(entries, vec![("Q_A".to_string(), 1)]); // ADDED

    service.router.group_remove(&mut transport, 1, name("Q_A"), name("GA")).unwrap();
    drain(&mut service, &mut transport, &mut ipc);
    assert_eq!(ipc.dispatches.len(), 2);
    let entries = decode_track_entries(&ipc.dispatches[1].1);
    assert_eq!(entries, vec![("Q_A".to_string(), 2)]); // REMOVED

    service.router.group_track_stop(&mut transport, 1, name("GA")).unwrap();
    drain(&mut service, &mut transport, &mut ipc);

    open_queue(&mut service, &mut transport, &mut ipc, 1, "Q_B", OpenFlags::Create as u32);
    service.router.group_insert(&mut transport, 1, name("Q_B"), name("GA")).unwrap();
    drain(&mut service, &mut transport, &mut ipc);
    assert_eq!(ipc.dispatches.len(), 2, "no further notifications after track_stop");
}

/// Scenario 5: async open carries the caller's invocation on the dispatch
/// socket (spec.md §8 scenario 5).
#[test]
fn async_open_dispatches_with_matching_invocation() {
    let mut service = new_service();
    let mut transport = LoopbackTransport::new(1);
    let mut ipc = RecordingIpc::default();
    service.on_client_connected(1, 100, Some(5));

    service
        .router
        .open(&mut transport, 1, true, name("Qx"), 0xcafe, creation_attrs(), OpenFlags::Create as u32, 0)
        .unwrap();
    drain(&mut service, &mut transport, &mut ipc);

    assert!(ipc.responses.is_empty());
    assert_eq!(ipc.dispatches.len(), 1);
    let (invocation, handle) = decode_invocation_and_handle(&ipc.dispatches[0].1);
    assert_eq!(invocation, 0xcafe);
    assert_ne!(handle, 0);
}
