//! The per-request atomic status word: the sole synchronization
//! primitive shared between the sender, the receiver, and a
//! host-initiated cancel, manipulated exclusively by compare-and-swap.
//!
//! States form a short lattice: `Init -> SendComplete -> RecvComplete`,
//! with `Canceled` absorbing from `Init` or `SendComplete`. The first
//! actor whose CAS reaches a terminal state acquires the right to
//! complete the request; every other actor backs off.

use std::sync::atomic::{AtomicU8, Ordering};

const INIT: u8 = 0;
const SEND_COMPLETE: u8 = 1;
const RECV_COMPLETE: u8 = 2;
const CANCELED: u8 = 3;
const NO_HANDLE: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Init,
    SendComplete,
    RecvComplete,
    Canceled,
    NoHandle,
}

impl From<u8> for RequestStatus {
    fn from(v: u8) -> Self {
        match v {
            INIT => RequestStatus::Init,
            SEND_COMPLETE => RequestStatus::SendComplete,
            RECV_COMPLETE => RequestStatus::RecvComplete,
            CANCELED => RequestStatus::Canceled,
            _ => RequestStatus::NoHandle,
        }
    }
}

/// Outcome of the sender observing its own write completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Normal case: receiver will complete the request when the reply arrives.
    DeferToReceiver,
    /// The reply raced in before the write was acknowledged locally.
    CompleteNow,
    /// The request was canceled before the write was acknowledged.
    CompleteCanceled,
}

/// Outcome of the receiver processing an inbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    /// The send path had already observed completion; complete now.
    CompleteNow,
    /// The send path has not yet run; it will complete when it does.
    DeferToSender,
    /// The request was canceled before the reply arrived.
    CompleteCanceled,
    /// A second reply arrived for an already-completed request.
    DuplicateReply,
}

/// Outcome of a host-initiated cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Still with the sender; no wire UNLINK needed.
    BeforeSend,
    /// Already on the wire; a UNLINK frame must be sent.
    MidFlight,
    /// Already completing or completed; cancel is a no-op.
    TooLate,
}

pub struct StatusWord(AtomicU8);

impl StatusWord {
    pub fn new() -> Self {
        StatusWord(AtomicU8::new(INIT))
    }

    pub fn load(&self) -> RequestStatus {
        RequestStatus::from(self.0.load(Ordering::Acquire))
    }

    /// Called by the sender after a successful write.
    pub fn sender_transition(&self) -> SendOutcome {
        loop {
            let cur = self.0.load(Ordering::Acquire);
            match cur {
                INIT => {
                    if self
                        .0
                        .compare_exchange(
                            INIT,
                            SEND_COMPLETE,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        return SendOutcome::DeferToReceiver;
                    }
                }
                RECV_COMPLETE => return SendOutcome::CompleteNow,
                CANCELED => return SendOutcome::CompleteCanceled,
                // The sender only ever runs once per request; anything
                // else here means the receiver is mid-transition. Spin.
                _ => std::hint::spin_loop(),
            }
        }
    }

    /// Called by the receiver when a reply frame is parsed for this request.
    pub fn receiver_transition(&self) -> RecvOutcome {
        loop {
            let cur = self.0.load(Ordering::Acquire);
            match cur {
                INIT => {
                    if self
                        .0
                        .compare_exchange(
                            INIT,
                            RECV_COMPLETE,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        return RecvOutcome::DeferToSender;
                    }
                }
                SEND_COMPLETE => {
                    if self
                        .0
                        .compare_exchange(
                            SEND_COMPLETE,
                            RECV_COMPLETE,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        return RecvOutcome::CompleteNow;
                    }
                }
                CANCELED => return RecvOutcome::CompleteCanceled,
                RECV_COMPLETE => return RecvOutcome::DuplicateReply,
                _ => return RecvOutcome::DuplicateReply,
            }
        }
    }

    /// Called by a host-initiated cancel.
    pub fn cancel_transition(&self) -> CancelOutcome {
        loop {
            let cur = self.0.load(Ordering::Acquire);
            match cur {
                INIT => {
                    if self
                        .0
                        .compare_exchange(INIT, CANCELED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return CancelOutcome::BeforeSend;
                    }
                }
                SEND_COMPLETE => {
                    if self
                        .0
                        .compare_exchange(
                            SEND_COMPLETE,
                            CANCELED,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        return CancelOutcome::MidFlight;
                    }
                }
                _ => return CancelOutcome::TooLate,
            }
        }
    }

    /// Unconditionally marks a request as having no host handle left to
    /// complete (used when a request is drained without ever having been
    /// attached to a live URB, e.g. defensive teardown paths).
    pub fn mark_no_handle(&self) {
        self.0.store(NO_HANDLE, Ordering::Release);
    }
}

impl Default for StatusWord {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_word_starts_at_init() {
        assert_eq!(StatusWord::new().load(), RequestStatus::Init);
    }

    #[test]
    fn normal_path_send_then_recv() {
        let w = StatusWord::new();
        assert_eq!(w.sender_transition(), SendOutcome::DeferToReceiver);
        assert_eq!(w.receiver_transition(), RecvOutcome::CompleteNow);
    }

    #[test]
    fn reply_races_ahead_of_send_completion() {
        let w = StatusWord::new();
        assert_eq!(w.receiver_transition(), RecvOutcome::DeferToSender);
        assert_eq!(w.sender_transition(), SendOutcome::CompleteNow);
    }

    #[test]
    fn cancel_before_send_then_sender_observes_it() {
        let w = StatusWord::new();
        assert_eq!(w.cancel_transition(), CancelOutcome::BeforeSend);
        assert_eq!(w.sender_transition(), SendOutcome::CompleteCanceled);
    }

    #[test]
    fn cancel_mid_flight_after_send_complete() {
        let w = StatusWord::new();
        assert_eq!(w.sender_transition(), SendOutcome::DeferToReceiver);
        assert_eq!(w.cancel_transition(), CancelOutcome::MidFlight);
    }

    #[test]
    fn cancel_after_recv_complete_is_too_late() {
        let w = StatusWord::new();
        assert_eq!(w.sender_transition(), SendOutcome::DeferToReceiver);
        assert_eq!(w.receiver_transition(), RecvOutcome::CompleteNow);
        assert_eq!(w.cancel_transition(), CancelOutcome::TooLate);
    }

    #[test]
    fn duplicate_reply_detected_after_completion() {
        let w = StatusWord::new();
        w.sender_transition();
        w.receiver_transition();
        assert_eq!(w.receiver_transition(), RecvOutcome::DuplicateReply);
    }

    #[test]
    fn no_request_is_ever_completed_twice_across_all_interleavings() {
        // Enumerate every pairing of {send, recv, cancel} arriving in
        // either order and assert exactly one of the two calls reports
        // a terminal (complete-now / complete-canceled) outcome.
        fn is_terminal_send(o: SendOutcome) -> bool {
            !matches!(o, SendOutcome::DeferToReceiver)
        }
        fn is_terminal_recv(o: RecvOutcome) -> bool {
            matches!(
                o,
                RecvOutcome::CompleteNow | RecvOutcome::CompleteCanceled
            )
        }

        // send then recv
        let w = StatusWord::new();
        let s = w.sender_transition();
        let r = w.receiver_transition();
        assert!(is_terminal_send(s) ^ is_terminal_recv(r));

        // recv then send
        let w = StatusWord::new();
        let r = w.receiver_transition();
        let s = w.sender_transition();
        assert!(is_terminal_recv(r) ^ is_terminal_send(s));
    }
}
