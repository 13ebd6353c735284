//! The sender task: drains the per-session send queue in strict FIFO
//! order and performs exactly one write per frame. A write's outcome is
//! published to the frame's request through the status-word CAS; the
//! sender only completes a URB itself when that CAS tells it the
//! receiver (or a cancel) got there first.

use crate::completion::{complete_canceled, complete_success};
use crate::host::HostCallbacks;
use crate::outstanding::OutstandingTable;
use crate::pool::BufferPool;
use crate::request::{Request, UrbKind};
use crate::status::SendOutcome;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use usbip_wire::UsbdStatus;

/// One fully-encoded wire frame, paired with the request record it
/// completes (or, for UNLINK frames, the tracking record awaiting
/// RET_UNLINK).
pub struct PreparedFrame {
    pub seqnum: u32,
    pub bytes: Vec<u8>,
    pub request: Arc<Request>,
}

/// Drains `rx` onto `writer` one frame at a time until the channel
/// closes or a write fails. Returns on the first write failure so the
/// caller can drive the session into `Draining`.
pub async fn run(
    mut rx: mpsc::UnboundedReceiver<PreparedFrame>,
    mut writer: OwnedWriteHalf,
    outstanding: Arc<OutstandingTable>,
    host: Arc<dyn HostCallbacks>,
    pool: Arc<BufferPool>,
) {
    while let Some(frame) = rx.recv().await {
        trace!(seqnum = frame.seqnum, len = frame.bytes.len(), "sending frame");
        match writer.write_all(&frame.bytes).await {
            Ok(()) => handle_write_success(&frame, &outstanding, &host, &pool),
            Err(e) => {
                warn!(seqnum = frame.seqnum, error = %e, "send failed, tearing down session");
                handle_write_failure(&frame, &outstanding, &host, &pool);
                break;
            }
        }
    }
    debug!("sender task exiting");
}

fn handle_write_success(
    frame: &PreparedFrame,
    outstanding: &OutstandingTable,
    host: &Arc<dyn HostCallbacks>,
    pool: &BufferPool,
) {
    // UNLINK frames never carry a host completion of their own; the
    // tracking record stays in the table until RET_UNLINK arrives.
    if frame.request.urb_kind == UrbKind::Unlink {
        return;
    }
    match frame.request.status.sender_transition() {
        SendOutcome::DeferToReceiver => {}
        SendOutcome::CompleteNow => {
            // The receiver already parsed the reply and deferred to us;
            // it dequeued the record already, so we only need our Arc.
            complete_success(host, pool, &frame.request);
        }
        SendOutcome::CompleteCanceled => {
            // Canceled before the write landed; the record is still in
            // the table (cancellation never touches it), so we must
            // erase it ourselves to preserve the outstanding invariant.
            outstanding.dequeue(frame.seqnum);
            complete_canceled(host, pool, &frame.request);
        }
    }
}

fn handle_write_failure(
    frame: &PreparedFrame,
    outstanding: &OutstandingTable,
    host: &Arc<dyn HostCallbacks>,
    pool: &BufferPool,
) {
    if frame.request.urb_kind == UrbKind::Unlink {
        outstanding.dequeue(frame.seqnum);
        return;
    }
    if let Some(request) = outstanding.dequeue(frame.seqnum) {
        if let Some(buf) = request.take_buffer() {
            pool.release(buf);
        }
        host.complete_urb(
            request
                .host_handle
                .as_ref()
                .expect("SUBMIT records always carry a host handle")
                .as_ref(),
            UsbdStatus::DeviceNotResponding,
            0,
            None,
        );
    }
    // `None` means the receiver or a cancel already took ownership of
    // this record; nothing left for the send-failure path to do.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostRequestHandle;
    use crate::status::StatusWord;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;
    use usbip_wire::Direction;

    #[derive(Debug)]
    struct NullHandle;
    impl HostRequestHandle for NullHandle {}

    struct RecordingHost {
        completions: Mutex<Vec<(UsbdStatus, u32)>>,
        cancellations: Mutex<u32>,
    }

    impl RecordingHost {
        fn new() -> Self {
            RecordingHost {
                completions: Mutex::new(Vec::new()),
                cancellations: Mutex::new(0),
            }
        }
    }

    impl HostCallbacks for RecordingHost {
        fn complete_urb(
            &self,
            _handle: &dyn HostRequestHandle,
            status: UsbdStatus,
            actual_length: u32,
            _data: Option<Vec<u8>>,
        ) {
            self.completions.lock().unwrap().push((status, actual_length));
        }

        fn complete_urb_cancel(&self, _handle: &dyn HostRequestHandle) {
            *self.cancellations.lock().unwrap() += 1;
        }
    }

    fn bulk_request(seqnum: u32) -> Arc<Request> {
        Arc::new(Request {
            seqnum,
            urb_kind: UrbKind::BulkOrInterrupt,
            direction: Direction::Out,
            transfer_buffer: Mutex::new(Some(Vec::new())),
            declared_length: 0,
            iso_packets: Mutex::new(Vec::new()),
            result_status: Mutex::new(None),
            result_actual_length: AtomicU32::new(0),
            status: StatusWord::new(),
            urb_function_select: false,
            host_handle: Some(Box::new(NullHandle)),
            victim_seqnum: None,
        })
    }

    #[test]
    fn write_success_with_no_race_defers_to_receiver() {
        let table = OutstandingTable::new();
        let host: Arc<dyn HostCallbacks> = Arc::new(RecordingHost::new());
        let request = bulk_request(1);
        let frame = PreparedFrame {
            seqnum: 1,
            bytes: Vec::new(),
            request: request.clone(),
        };
        handle_write_success(&frame, &table, &host, &BufferPool::new(4));
        assert_eq!(request.status.load(), crate::status::RequestStatus::SendComplete);
    }

    #[test]
    fn write_success_completes_now_when_recv_raced_first() {
        let table = OutstandingTable::new();
        let host = Arc::new(RecordingHost::new());
        let request = bulk_request(1);
        // Simulate the receiver having already deferred to the sender.
        assert_eq!(
            request.status.receiver_transition(),
            crate::status::RecvOutcome::DeferToSender
        );
        let frame = PreparedFrame {
            seqnum: 1,
            bytes: Vec::new(),
            request: request.clone(),
        };
        handle_write_success(
            &frame,
            &table,
            &host.clone() as &Arc<dyn HostCallbacks>,
            &BufferPool::new(4),
        );
        assert_eq!(host.completions.lock().unwrap().len(), 1);
    }

    #[test]
    fn write_success_completes_canceled_and_erases_table_entry() {
        let table = OutstandingTable::new();
        let host = Arc::new(RecordingHost::new());
        let request = bulk_request(5);
        table.insert(|_| {
            // seqnum already fixed on `request`; just occupy the slot.
            Request {
                seqnum: 5,
                urb_kind: UrbKind::BulkOrInterrupt,
                direction: Direction::Out,
                transfer_buffer: Mutex::new(Some(Vec::new())),
                declared_length: 0,
                iso_packets: Mutex::new(Vec::new()),
                result_status: Mutex::new(None),
                result_actual_length: AtomicU32::new(0),
                status: StatusWord::new(),
                urb_function_select: false,
                host_handle: Some(Box::new(NullHandle)),
                victim_seqnum: None,
            }
        })
        .unwrap();
        assert_eq!(
            request.status.cancel_transition(),
            crate::status::CancelOutcome::BeforeSend
        );
        let frame = PreparedFrame {
            seqnum: 5,
            bytes: Vec::new(),
            request: request.clone(),
        };
        handle_write_success(
            &frame,
            &table,
            &(host.clone() as Arc<dyn HostCallbacks>),
            &BufferPool::new(4),
        );
        assert_eq!(*host.cancellations.lock().unwrap(), 1);
    }

    #[test]
    fn write_failure_dequeues_and_completes_io_error() {
        let table = OutstandingTable::new();
        let host = Arc::new(RecordingHost::new());
        let (seqnum, request) = table
            .insert(|seqnum| Request {
                seqnum,
                urb_kind: UrbKind::BulkOrInterrupt,
                direction: Direction::Out,
                transfer_buffer: Mutex::new(Some(Vec::new())),
                declared_length: 0,
                iso_packets: Mutex::new(Vec::new()),
                result_status: Mutex::new(None),
                result_actual_length: AtomicU32::new(0),
                status: StatusWord::new(),
                urb_function_select: false,
                host_handle: Some(Box::new(NullHandle)),
                victim_seqnum: None,
            })
            .unwrap();
        let frame = PreparedFrame {
            seqnum,
            bytes: Vec::new(),
            request,
        };
        handle_write_failure(
            &frame,
            &table,
            &(host.clone() as Arc<dyn HostCallbacks>),
            &BufferPool::new(4),
        );
        assert_eq!(table.len(), 0);
        assert_eq!(host.completions.lock().unwrap().len(), 1);
    }

    #[test]
    fn unlink_frame_write_failure_just_dequeues() {
        let table = OutstandingTable::new();
        let host = Arc::new(RecordingHost::new());
        let (seqnum, request) = table
            .insert(|seqnum| Request {
                seqnum,
                urb_kind: UrbKind::Unlink,
                direction: Direction::Out,
                transfer_buffer: Mutex::new(None),
                declared_length: 0,
                iso_packets: Mutex::new(Vec::new()),
                result_status: Mutex::new(None),
                result_actual_length: AtomicU32::new(0),
                status: StatusWord::new(),
                urb_function_select: false,
                host_handle: None,
                victim_seqnum: Some(1),
            })
            .unwrap();
        let frame = PreparedFrame {
            seqnum,
            bytes: Vec::new(),
            request,
        };
        handle_write_failure(
            &frame,
            &table,
            &(host.clone() as Arc<dyn HostCallbacks>),
            &BufferPool::new(4),
        );
        assert_eq!(table.len(), 0);
        assert_eq!(host.completions.lock().unwrap().len(), 0);
    }
}
