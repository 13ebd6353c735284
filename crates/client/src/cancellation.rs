//! Host-initiated cancel (Windows `URB_FUNCTION_ABORT_PIPE`-style unlink
//! requests arrive here). The status-word CAS decides the outcome;
//! cancellation itself never touches the Outstanding Table.

use crate::intake;
use crate::session::SessionInner;
use crate::status::CancelOutcome;
use crate::sender::PreparedFrame;
use crate::error::{ClientError, Result};

/// Cancels the outstanding URB identified by `seqnum`.
///
/// Returns `Ok(())` whether or not anything was actually canceled: a
/// request that has already completed, or one the host never submitted
/// in the first place, is not an error for the caller to unwind.
pub(crate) fn cancel_urb(session: &SessionInner, seqnum: u32) -> Result<()> {
    let Some(request) = session.outstanding.peek(seqnum) else {
        return Ok(());
    };

    match request.status.cancel_transition() {
        CancelOutcome::BeforeSend => {
            // The sender hasn't observed the write yet; it will see
            // `Canceled` on its own CAS and complete the request. No
            // wire traffic is needed because nothing was ever sent.
        }
        CancelOutcome::MidFlight => {
            let frame = intake::build_unlink_frame(session, seqnum)?;
            send_unlink(session, frame)?;
        }
        CancelOutcome::TooLate => {
            // Already completing via the normal path; nothing to do.
        }
    }
    Ok(())
}

fn send_unlink(session: &SessionInner, frame: PreparedFrame) -> Result<()> {
    session
        .send_tx
        .send(frame)
        .map_err(|_| ClientError::Io(std::io::Error::other("sender task is gone")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::host::{HostCallbacks, HostRequestHandle};
    use crate::outstanding::OutstandingTable;
    use crate::pool::BufferPool;
    use crate::request::{Request, UrbKind};
    use crate::status::StatusWord;
    use std::sync::atomic::AtomicU32;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;
    use usbip_wire::{Direction, UsbdStatus};

    #[derive(Debug)]
    struct NullHandle;
    impl HostRequestHandle for NullHandle {}

    struct RecordingHost {
        cancellations: Mutex<u32>,
    }

    impl HostCallbacks for RecordingHost {
        fn complete_urb(&self, _: &dyn HostRequestHandle, _: UsbdStatus, _: u32, _: Option<Vec<u8>>) {}
        fn complete_urb_cancel(&self, _: &dyn HostRequestHandle) {
            *self.cancellations.lock().unwrap() += 1;
        }
    }

    fn test_session() -> (SessionInner, mpsc::UnboundedReceiver<PreparedFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = SessionInner {
            config: SessionConfig::default(),
            outstanding: Arc::new(OutstandingTable::new()),
            intake_lock: Mutex::new(()),
            send_tx: tx,
            host: Arc::new(RecordingHost {
                cancellations: Mutex::new(0),
            }),
            pool: Arc::new(BufferPool::new(4)),
        };
        (session, rx)
    }

    #[test]
    fn cancel_before_send_completes_immediately_with_no_wire_traffic() {
        let (session, mut rx) = test_session();
        let (seqnum, request) = session
            .outstanding
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
        cancel_urb(&session, seqnum).unwrap();
        assert_eq!(request.status.load(), crate::status::RequestStatus::Canceled);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn cancel_mid_flight_queues_an_unlink_frame() {
        let (session, mut rx) = test_session();
        let (seqnum, request) = session
            .outstanding
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
        request.status.sender_transition();
        cancel_urb(&session, seqnum).unwrap();
        let frame = rx.try_recv().expect("unlink frame queued");
        assert_eq!(frame.request.victim_seqnum, Some(seqnum));
    }

    #[test]
    fn cancel_of_unknown_seqnum_is_a_no_op() {
        let (session, _rx) = test_session();
        assert!(cancel_urb(&session, 999).is_ok());
    }
}
