//! The Request record: one entry per outstanding URB, living in the
//! Outstanding Table from intake until completion.

use crate::host::HostRequestHandle;
use crate::status::StatusWord;
use std::sync::atomic::AtomicU32;
use std::sync::Mutex;
use usbip_wire::{Direction, IsoPacketDescriptor, UsbdStatus};

/// The kind of URB a request represents, replacing the original's large
/// dynamic-dispatch function table with a single tagged enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrbKind {
    Control,
    BulkOrInterrupt,
    Iso,
    SetConfig,
    SetInterface,
    Unlink,
}

pub struct Request {
    pub seqnum: u32,
    pub urb_kind: UrbKind,
    pub direction: Direction,
    /// Owned by the request for its lifetime in the table; handed back
    /// to the host on completion. `None` once the buffer has been
    /// claimed by a completion.
    pub transfer_buffer: Mutex<Option<Vec<u8>>>,
    pub declared_length: u32,
    pub iso_packets: Mutex<Vec<IsoPacketDescriptor>>,
    /// Filled by the receiver before it transitions `status`, so that
    /// whichever actor (sender or receiver) ends up completing the
    /// request always has the wire result available.
    pub result_status: Mutex<Option<UsbdStatus>>,
    pub result_actual_length: AtomicU32,
    pub status: StatusWord,
    /// Distinguishes SELECT_CONFIGURATION/SELECT_INTERFACE, which have
    /// a synthesized setup packet and no URB-supplied payload.
    pub urb_function_select: bool,
    /// `None` only for `Unlink` tracking records, which complete the
    /// victim request rather than a host handle of their own.
    pub host_handle: Option<Box<dyn HostRequestHandle>>,
    /// Only set when `urb_kind == Unlink`: the seqnum of the SUBMIT this
    /// UNLINK targets.
    pub victim_seqnum: Option<u32>,
}

impl Request {
    pub fn take_buffer(&self) -> Option<Vec<u8>> {
        self.transfer_buffer.lock().unwrap().take()
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("seqnum", &self.seqnum)
            .field("urb_kind", &self.urb_kind)
            .field("direction", &self.direction)
            .field("status", &self.status.load())
            .field("victim_seqnum", &self.victim_seqnum)
            .finish()
    }
}
