//! Response dispatcher (C8, spec.md §4.6).
//!
//! Deliberately dumb: the apply engine already decided, per record, whether
//! a given outgoing frame belongs on the synchronous response connection or
//! the asynchronous dispatch connection, and already carries `None` for
//! either when the record's origin wasn't this node. This module only walks
//! the list and calls `IpcServer`, which documents `None` as a no-op.

use crate::ipc::{ConnHandle, DispatchHandle, IpcFrame, IpcServer};

#[derive(Debug, Clone)]
pub enum Outgoing {
    Response { conn: ConnHandle, frame: IpcFrame },
    Dispatch { dispatch: DispatchHandle, frame: IpcFrame },
}

pub fn dispatch_all(outgoing: Vec<Outgoing>, ipc: &mut impl IpcServer) {
    for item in outgoing {
        match item {
            Outgoing::Response { conn, frame } => ipc.respond(conn, frame),
            Outgoing::Dispatch { dispatch, frame } => ipc.dispatch(dispatch, frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingIpc {
        responses: Vec<(ConnHandle, u32)>,
        dispatches: Vec<(DispatchHandle, u32)>,
    }

    impl IpcServer for RecordingIpc {
        fn respond(&mut self, conn: ConnHandle, frame: IpcFrame) {
            self.responses.push((conn, frame.id));
        }
        fn dispatch(&mut self, dispatch: DispatchHandle, frame: IpcFrame) {
            self.dispatches.push((dispatch, frame.id));
        }
    }

    fn frame(id: u32) -> IpcFrame {
        IpcFrame { id, error: 0, payload: Vec::new() }
    }

    #[test]
    fn routes_response_and_dispatch_items_separately() {
        let mut ipc = RecordingIpc::default();
        dispatch_all(
            vec![
                Outgoing::Response { conn: Some(1), frame: frame(10) },
                Outgoing::Dispatch { dispatch: Some(2), frame: frame(20) },
            ],
            &mut ipc,
        );
        assert_eq!(ipc.responses, vec![(Some(1), 10)]);
        assert_eq!(ipc.dispatches, vec![(Some(2), 20)]);
    }

    #[test]
    fn none_targets_still_reach_the_ipc_layer_as_documented_no_ops() {
        let mut ipc = RecordingIpc::default();
        dispatch_all(vec![Outgoing::Response { conn: None, frame: frame(10) }], &mut ipc);
        assert_eq!(ipc.responses, vec![(None, 10)]);
    }
}
