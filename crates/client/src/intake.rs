//! Submission intake: converts one local URB into an Outstanding Table
//! entry plus a prepared wire frame, or completes it locally when the
//! URB function does not translate to one.

use crate::error::{ClientError, Result};
use crate::host::HostRequestHandle;
use crate::pool::BufferPool;
use crate::request::{Request, UrbKind};
use crate::sender::PreparedFrame;
use crate::session::SessionInner;
use crate::status::StatusWord;
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use usbip_wire::{
    Direction, EndpointType, SubmitBody, UnlinkBody, UrbFunction, UsbIpHeader, repack_out,
    write_padding,
};

const SET_CONFIGURATION: u8 = 0x09;
const SET_INTERFACE: u8 = 0x0B;
/// `USBD_START_ISO_TRANSFER_ASAP`: current-frame-number is not tracked
/// locally, so every isochronous submission forces this bit on.
const START_ISO_TRANSFER_ASAP: u32 = 0x0000_0100;
/// Sentinel `number_of_packets` value meaning "not an iso transfer".
const NOT_ISO: u32 = 0xFFFF_FFFF;

/// What the host layer hands the intake dispatcher for one URB.
pub struct UrbSubmission {
    pub function: UrbFunction,
    pub endpoint_type: Option<EndpointType>,
    pub ep: u8,
    /// Present for CONTROL_TRANSFER[_EX]; ignored otherwise.
    pub setup: Option<[u8; 8]>,
    /// For SELECT_CONFIGURATION/SELECT_INTERFACE: wValue/wIndex.
    pub config_value: Option<u16>,
    pub interface_value: Option<u16>,
    /// OUT payload, or the capacity to allocate for an IN payload.
    pub direction: Direction,
    pub buffer: Vec<u8>,
    pub transfer_buffer_length: u32,
    pub iso_offsets: Vec<u32>,
    pub interval: u32,
    pub host_handle: Box<dyn HostRequestHandle>,
}

struct PreparedSubmit {
    urb_kind: UrbKind,
    direction: Direction,
    ep: u8,
    transfer_flags: u32,
    transfer_buffer_length: u32,
    number_of_packets: u32,
    interval: u32,
    setup: [u8; 8],
    out_payload: Vec<u8>,
    iso_out: Vec<usbip_wire::IsoPacketDescriptor>,
    urb_function_select: bool,
    initial_buffer: Vec<u8>,
    host_handle: Box<dyn HostRequestHandle>,
}

fn setup_packet(
    bm_request_type: u8,
    b_request: u8,
    w_value: u16,
    w_index: u16,
    w_length: u16,
) -> [u8; 8] {
    [
        bm_request_type,
        b_request,
        (w_value & 0xFF) as u8,
        (w_value >> 8) as u8,
        (w_index & 0xFF) as u8,
        (w_index >> 8) as u8,
        (w_length & 0xFF) as u8,
        (w_length >> 8) as u8,
    ]
}

fn prepare(submission: UrbSubmission, pool: &BufferPool) -> Result<PreparedSubmit> {
    match submission.function {
        UrbFunction::SelectConfiguration | UrbFunction::SelectInterface => {
            let is_select_configuration = submission.function == UrbFunction::SelectConfiguration;
            let (b_request, value) = if is_select_configuration {
                (SET_CONFIGURATION, submission.config_value.unwrap_or(0))
            } else {
                (SET_INTERFACE, submission.interface_value.unwrap_or(0))
            };
            let setup = setup_packet(0x00, b_request, value, submission.interface_value.unwrap_or(0), 0);
            Ok(PreparedSubmit {
                urb_kind: if is_select_configuration {
                    UrbKind::SetConfig
                } else {
                    UrbKind::SetInterface
                },
                direction: Direction::Out,
                ep: 0,
                transfer_flags: 0,
                transfer_buffer_length: 0,
                number_of_packets: NOT_ISO,
                interval: 0,
                setup,
                out_payload: Vec::new(),
                iso_out: Vec::new(),
                urb_function_select: true,
                initial_buffer: Vec::new(),
                host_handle: submission.host_handle,
            })
        }
        UrbFunction::ControlTransfer | UrbFunction::ControlTransferEx => {
            let setup = submission
                .setup
                .ok_or(ClientError::InvalidParameter("control transfer missing setup packet"))?;
            // bmRequestType.Dir (bit 7) decides direction, not TransferFlags.
            let direction = if setup[0] & 0x80 != 0 {
                Direction::In
            } else {
                Direction::Out
            };
            let (out_payload, initial_buffer) = match direction {
                Direction::Out => (submission.buffer.clone(), submission.buffer),
                Direction::In => (
                    Vec::new(),
                    pool.acquire(submission.transfer_buffer_length as usize),
                ),
            };
            Ok(PreparedSubmit {
                urb_kind: UrbKind::Control,
                direction,
                ep: submission.ep,
                transfer_flags: 0,
                transfer_buffer_length: submission.transfer_buffer_length,
                number_of_packets: NOT_ISO,
                interval: 0,
                setup,
                out_payload,
                iso_out: Vec::new(),
                urb_function_select: false,
                initial_buffer,
                host_handle: submission.host_handle,
            })
        }
        UrbFunction::BulkOrInterruptTransfer => {
            let ep_type = submission
                .endpoint_type
                .ok_or(ClientError::InvalidParameter("missing endpoint type"))?;
            if ep_type != EndpointType::Bulk && ep_type != EndpointType::Interrupt {
                return Err(ClientError::InvalidParameter(
                    "BULK_OR_INTERRUPT_TRANSFER requires a bulk or interrupt endpoint",
                ));
            }
            let direction = submission.direction;
            let (out_payload, initial_buffer) = match direction {
                Direction::Out => (submission.buffer.clone(), submission.buffer),
                Direction::In => (
                    Vec::new(),
                    pool.acquire(submission.transfer_buffer_length as usize),
                ),
            };
            Ok(PreparedSubmit {
                urb_kind: UrbKind::BulkOrInterrupt,
                direction,
                ep: submission.ep,
                transfer_flags: normalize_transfer_flags(0, direction),
                transfer_buffer_length: submission.transfer_buffer_length,
                number_of_packets: NOT_ISO,
                interval: submission.interval,
                setup: [0u8; 8],
                out_payload,
                iso_out: Vec::new(),
                urb_function_select: false,
                initial_buffer,
                host_handle: submission.host_handle,
            })
        }
        UrbFunction::IsochTransfer => {
            let ep_type = submission
                .endpoint_type
                .ok_or(ClientError::InvalidParameter("missing endpoint type"))?;
            if ep_type != EndpointType::Isochronous {
                return Err(ClientError::InvalidParameter(
                    "ISOCH_TRANSFER requires an isochronous endpoint",
                ));
            }
            let direction = submission.direction;
            let iso_out = repack_out(&submission.iso_offsets, submission.transfer_buffer_length)?;
            let (out_payload, initial_buffer) = match direction {
                Direction::Out => (submission.buffer.clone(), submission.buffer),
                Direction::In => (
                    Vec::new(),
                    pool.acquire(submission.transfer_buffer_length as usize),
                ),
            };
            Ok(PreparedSubmit {
                urb_kind: UrbKind::Iso,
                direction,
                ep: submission.ep,
                transfer_flags: START_ISO_TRANSFER_ASAP,
                transfer_buffer_length: submission.transfer_buffer_length,
                number_of_packets: iso_out.len() as u32,
                interval: submission.interval,
                setup: [0u8; 8],
                out_payload,
                iso_out,
                urb_function_select: false,
                initial_buffer,
                host_handle: submission.host_handle,
            })
        }
        UrbFunction::NotSupported => Err(ClientError::NotSupported),
    }
}

/// Endpoint-direction bits are the only part of `transfer_flags` the
/// core recomputes locally; everything else is meaningful only to the
/// host OS and is masked out.
fn normalize_transfer_flags(flags: u32, direction: Direction) -> u32 {
    const DIRECTION_IN_BIT: u32 = 0x0000_0001;
    let masked = flags & !DIRECTION_IN_BIT;
    match direction {
        Direction::In => masked | DIRECTION_IN_BIT,
        Direction::Out => masked,
    }
}

/// What became of a submitted URB at intake time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued on the wire; `cancel_urb` takes this seqnum.
    Pending(u32),
    /// Completed synchronously through `HostCallbacks` and never
    /// touched the outstanding table or the wire.
    CompletedLocally,
}

/// Submits one URB into the session: either queues a wire frame, or (for
/// `NotSupported`) completes it locally and returns without touching the
/// outstanding table or the wire.
pub(crate) fn submit(session: &SessionInner, submission: UrbSubmission) -> Result<SubmitOutcome> {
    if submission.function == UrbFunction::NotSupported {
        session.host.complete_urb(
            submission.host_handle.as_ref(),
            usbip_wire::UsbdStatus::ErrorNotSupported,
            0,
            None,
        );
        return Ok(SubmitOutcome::CompletedLocally);
    }

    let prepared = prepare(submission, &session.pool)?;
    let devid = session.config.devid;

    let _guard = session.intake_lock.lock().unwrap();
    let (seqnum, _request) = session.outstanding.insert(|seqnum| Request {
        seqnum,
        urb_kind: prepared.urb_kind,
        direction: prepared.direction,
        transfer_buffer: Mutex::new(Some(prepared.initial_buffer)),
        declared_length: prepared.transfer_buffer_length,
        iso_packets: Mutex::new(prepared.iso_out.clone()),
        result_status: Mutex::new(None),
        result_actual_length: AtomicU32::new(0),
        status: StatusWord::new(),
        urb_function_select: prepared.urb_function_select,
        host_handle: Some(prepared.host_handle),
        victim_seqnum: None,
    })?;

    let bytes = encode_submit_frame(seqnum, devid, &prepared);
    let request = session.outstanding.peek(seqnum).expect("just inserted");
    session
        .send_tx
        .send(PreparedFrame {
            seqnum,
            bytes,
            request,
        })
        .map_err(|_| ClientError::Io(std::io::Error::other("sender task is gone")))?;
    Ok(SubmitOutcome::Pending(seqnum))
}

fn encode_submit_frame(seqnum: u32, devid: u32, prepared: &PreparedSubmit) -> Vec<u8> {
    let header = UsbIpHeader {
        command: usbip_wire::Command::Submit.as_u32(),
        seqnum,
        devid,
        direction: prepared.direction.as_u32(),
        ep: prepared.ep as u32,
    };
    let body = SubmitBody {
        transfer_flags: prepared.transfer_flags,
        transfer_buffer_length: prepared.transfer_buffer_length,
        start_frame: 0,
        number_of_packets: prepared.number_of_packets,
        interval: prepared.interval,
        setup: prepared.setup,
    };
    let mut bytes = Vec::with_capacity(
        UsbIpHeader::WIRE_SIZE + 28 + prepared.out_payload.len() + prepared.iso_out.len() * 16,
    );
    header.write_to(&mut bytes).expect("write to Vec never fails");
    body.write_to(&mut bytes).expect("write to Vec never fails");
    write_padding(&mut bytes, SubmitBody::WIRE_SIZE).expect("write to Vec never fails");
    bytes.extend_from_slice(&prepared.out_payload);
    for packet in &prepared.iso_out {
        packet.write_to(&mut bytes).expect("write to Vec never fails");
    }
    bytes
}

/// Builds the UNLINK frame for an in-flight victim, under the same
/// intake lock so it lands on the wire in submission order relative to
/// any concurrent SUBMITs.
pub(crate) fn build_unlink_frame(session: &SessionInner, victim_seqnum: u32) -> Result<PreparedFrame> {
    let devid = session.config.devid;
    let _guard = session.intake_lock.lock().unwrap();
    let (seqnum, request) = session.outstanding.insert(|seqnum| Request {
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
        victim_seqnum: Some(victim_seqnum),
    })?;

    let header = UsbIpHeader {
        command: usbip_wire::Command::Unlink.as_u32(),
        seqnum,
        devid,
        direction: Direction::Out.as_u32(),
        ep: 0,
    };
    let body = UnlinkBody {
        unlink_seqnum: victim_seqnum,
    };
    let mut bytes = Vec::with_capacity(UsbIpHeader::WIRE_SIZE + 28);
    header.write_to(&mut bytes)?;
    body.write_to(&mut bytes)?;
    write_padding(&mut bytes, UnlinkBody::WIRE_SIZE)?;
    Ok(PreparedFrame {
        seqnum,
        bytes,
        request,
    })
}
