//! The receiver task: parses an unbounded sequence of inbound USB/IP
//! frames and routes each to its outstanding request. Implemented as an
//! explicit state machine (`AwaitHeader` -> `AwaitPayload` ->
//! `AwaitIsoTail`) so that a short read never delivers a partial frame
//! to completion.

use crate::completion::{complete_canceled, complete_success};
use crate::outstanding::OutstandingTable;
use crate::pool::BufferPool;
use crate::request::Request;
use crate::status::RecvOutcome;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{trace, warn};
use usbip_wire::{
    Command, Direction, IsoPacketDescriptor, ProtocolError, Result as WireResult, RetSubmitBody,
    RetUnlinkBody, UsbIpHeader, UsbdStatus,
};

/// Sentinel `number_of_packets` meaning "not an isochronous transfer",
/// mirrored from the intake adapter's SUBMIT encoding.
const NOT_ISO: u32 = 0xFFFF_FFFF;

pub struct ReceiverContext {
    pub outstanding: Arc<OutstandingTable>,
    pub host: Arc<dyn crate::host::HostCallbacks>,
    pub pool: Arc<BufferPool>,
}

/// Runs the receive loop until the peer closes the connection or a
/// protocol/I/O error forces the session to drain. Returns the error
/// that ended the loop, or `Ok(())` on a clean peer-initiated close.
pub async fn run(mut reader: OwnedReadHalf, ctx: ReceiverContext) -> WireResult<()> {
    loop {
        let mut header_bytes = [0u8; UsbIpHeader::WIRE_SIZE];
        match reader.read_exact(&mut header_bytes).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let header = UsbIpHeader::read_from(&mut &header_bytes[..])?;
        let command = Command::from_u32(header.command)
            .ok_or(ProtocolError::UnexpectedCommand(header.command))?;

        match command {
            Command::RetSubmit => handle_ret_submit(&mut reader, &header, &ctx).await?,
            Command::RetUnlink => handle_ret_unlink(&mut reader, &header, &ctx).await?,
            Command::ResetDev => {
                warn!("RESET_DEV received, draining all outstanding requests");
                for request in ctx.outstanding.drain() {
                    complete_canceled(ctx.host.as_ref(), ctx.pool.as_ref(), &request);
                }
            }
            Command::Submit | Command::Unlink => {
                return Err(ProtocolError::UnexpectedCommand(header.command));
            }
        }
    }
}

async fn handle_ret_submit(
    reader: &mut OwnedReadHalf,
    header: &UsbIpHeader,
    ctx: &ReceiverContext,
) -> WireResult<()> {
    let mut body_bytes = [0u8; 28];
    reader.read_exact(&mut body_bytes[..RetSubmitBody::WIRE_SIZE]).await?;
    let body = RetSubmitBody::read_from(&mut &body_bytes[..RetSubmitBody::WIRE_SIZE])?;
    reader
        .read_exact(&mut body_bytes[RetSubmitBody::WIRE_SIZE..28])
        .await?;

    let request = ctx.outstanding.dequeue(header.seqnum);
    // The reference server zeroes `direction` on every RET_SUBMIT; the
    // originating URB's direction, not the reply header's, is what
    // decides whether a payload follows. Only the no-op race against an
    // already-dequeued victim has no stored request to fall back on, in
    // which case the zeroed header direction happens to match: no
    // further bytes follow for that seqnum in that race.
    let direction = request
        .as_ref()
        .map(|r| r.direction)
        .unwrap_or_else(|| Direction::from_u32(header.direction));

    let payload = if direction == Direction::In {
        Some(read_payload(reader, &request, body.actual_length).await?)
    } else {
        None
    };

    let has_iso = body.number_of_packets != 0 && body.number_of_packets != NOT_ISO;
    let iso_packets = if has_iso {
        Some(read_iso_tail(reader, body.number_of_packets, direction, &request).await?)
    } else {
        None
    };

    let Some(request) = request else {
        trace!(seqnum = header.seqnum, "RET_SUBMIT for unknown seqnum, no-op");
        return Ok(());
    };

    if let Some(payload) = payload {
        *request.transfer_buffer.lock().unwrap() = Some(payload);
    }
    if let Some(packets) = iso_packets {
        *request.iso_packets.lock().unwrap() = packets;
    }
    *request.result_status.lock().unwrap() = Some(UsbdStatus::from_wire(body.status));
    request
        .result_actual_length
        .store(body.actual_length, Ordering::Release);

    match request.status.receiver_transition() {
        RecvOutcome::DeferToSender => {}
        RecvOutcome::CompleteNow => complete_success(ctx.host.as_ref(), ctx.pool.as_ref(), &request),
        RecvOutcome::CompleteCanceled => complete_canceled(ctx.host.as_ref(), ctx.pool.as_ref(), &request),
        RecvOutcome::DuplicateReply => {
            return Err(ProtocolError::DuplicateReply(header.seqnum));
        }
    }
    Ok(())
}

async fn handle_ret_unlink(
    reader: &mut OwnedReadHalf,
    header: &UsbIpHeader,
    ctx: &ReceiverContext,
) -> WireResult<()> {
    let mut body_bytes = [0u8; 28];
    reader.read_exact(&mut body_bytes[..RetUnlinkBody::WIRE_SIZE]).await?;
    reader
        .read_exact(&mut body_bytes[RetUnlinkBody::WIRE_SIZE..28])
        .await?;
    let _body = RetUnlinkBody::read_from(&mut &body_bytes[..RetUnlinkBody::WIRE_SIZE])?;

    let Some(unlink_record) = ctx.outstanding.dequeue(header.seqnum) else {
        trace!(seqnum = header.seqnum, "RET_UNLINK for unknown seqnum, no-op");
        return Ok(());
    };
    let Some(victim_seqnum) = unlink_record.victim_seqnum else {
        warn!(seqnum = header.seqnum, "RET_UNLINK matched a non-UNLINK record");
        return Ok(());
    };

    // The server acked the unlink: if the victim's SUBMIT reply hasn't
    // raced in on its own, no RET_SUBMIT will ever follow for it, so
    // complete it as canceled here. If it already completed via its own
    // RET_SUBMIT, `dequeue` simply returns `None`.
    if let Some(victim) = ctx.outstanding.dequeue(victim_seqnum) {
        complete_canceled(ctx.host.as_ref(), ctx.pool.as_ref(), &victim);
    }
    Ok(())
}

async fn read_payload(
    reader: &mut OwnedReadHalf,
    request: &Option<Arc<Request>>,
    actual_length: u32,
) -> WireResult<Vec<u8>> {
    if let Some(request) = request {
        if actual_length > request.declared_length {
            return Err(ProtocolError::PayloadOverflow {
                actual: actual_length,
                declared: request.declared_length,
            });
        }
    }
    let mut buf = vec![0u8; actual_length as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn read_iso_tail(
    reader: &mut OwnedReadHalf,
    number_of_packets: u32,
    direction: Direction,
    request: &Option<Arc<Request>>,
) -> WireResult<Vec<IsoPacketDescriptor>> {
    let mut raw = Vec::with_capacity(number_of_packets as usize);
    for _ in 0..number_of_packets {
        let mut bytes = [0u8; IsoPacketDescriptor::WIRE_SIZE];
        reader.read_exact(&mut bytes).await?;
        raw.push(IsoPacketDescriptor::read_from(&mut &bytes[..])?);
    }

    match direction {
        Direction::In => {
            // Packets may have landed shorter than requested; the data
            // is packed contiguously by actual length, not by the
            // originally planned offsets.
            let mut offset = 0u32;
            for packet in raw.iter_mut() {
                packet.offset = offset;
                offset = offset.saturating_add(packet.actual_length);
            }
        }
        Direction::Out => {
            // The server only reports per-packet actual_length/status;
            // the client's own planned offsets remain authoritative.
            if let Some(request) = request {
                let original = request.iso_packets.lock().unwrap();
                for (packet, orig) in raw.iter_mut().zip(original.iter()) {
                    packet.offset = orig.offset;
                }
            }
        }
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_iso_sentinel_is_never_treated_as_a_packet_count() {
        assert_eq!(NOT_ISO, 0xFFFF_FFFF);
        assert!(NOT_ISO != 0);
    }
}
