//! The wire-level vocabulary a scripted peer reads and replies with.

use usbip_wire::{Command, IsoPacketDescriptor, RetSubmitBody, SubmitBody, UnlinkBody, UsbIpHeader};

/// One fully-parsed inbound frame, as received from the client under test.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Submit {
        header: UsbIpHeader,
        body: SubmitBody,
        payload: Vec<u8>,
        iso: Vec<IsoPacketDescriptor>,
    },
    Unlink {
        header: UsbIpHeader,
        body: UnlinkBody,
    },
}

impl InboundFrame {
    pub fn seqnum(&self) -> u32 {
        match self {
            InboundFrame::Submit { header, .. } => header.seqnum,
            InboundFrame::Unlink { header, .. } => header.seqnum,
        }
    }

    pub fn command(&self) -> Command {
        match self {
            InboundFrame::Submit { .. } => Command::Submit,
            InboundFrame::Unlink { .. } => Command::Unlink,
        }
    }
}

/// A reply whose bytes are either fixed ahead of time or computed from
/// the inbound frame the step just read (for a RET_UNLINK that must
/// echo a seqnum only the client assigns at submission time).
pub enum ScriptReply {
    Fixed(Vec<u8>),
    Dynamic(Box<dyn FnOnce(&InboundFrame) -> Vec<u8> + Send>),
}

/// One step of a scripted exchange: wait for the next inbound frame,
/// optionally assert something about it, then optionally reply.
pub struct ScriptStep {
    pub check: Box<dyn FnOnce(&InboundFrame) + Send>,
    pub reply: Option<ScriptReply>,
}

impl ScriptStep {
    /// A step that ignores the inbound frame's content and replies
    /// with the given bytes.
    pub fn reply(bytes: Vec<u8>) -> Self {
        ScriptStep {
            check: Box::new(|_| {}),
            reply: Some(ScriptReply::Fixed(bytes)),
        }
    }

    /// A step that replies with bytes computed from the inbound frame,
    /// e.g. a RET_UNLINK echoing the UNLINK frame's own seqnum.
    pub fn reply_with(f: impl FnOnce(&InboundFrame) -> Vec<u8> + Send + 'static) -> Self {
        ScriptStep {
            check: Box::new(|_| {}),
            reply: Some(ScriptReply::Dynamic(Box::new(f))),
        }
    }

    /// A step that consumes the inbound frame but sends nothing back
    /// (the victim of a mid-flight cancel: the server never answers
    /// the original SUBMIT).
    pub fn no_reply() -> Self {
        ScriptStep {
            check: Box::new(|_| {}),
            reply: None,
        }
    }

    /// Attaches an assertion on the parsed inbound frame.
    pub fn expect(mut self, check: impl FnOnce(&InboundFrame) + Send + 'static) -> Self {
        self.check = Box::new(check);
        self
    }
}

/// Builds a literal RET_SUBMIT reply frame (header + body + optional
/// payload/iso tail), the counterpart to what `InboundFrame::Submit`
/// parses on the way in.
pub fn ret_submit(
    seqnum: u32,
    devid: u32,
    status: i32,
    actual_length: u32,
    payload: &[u8],
    iso: &[IsoPacketDescriptor],
) -> Vec<u8> {
    let header = UsbIpHeader {
        command: Command::RetSubmit.as_u32(),
        seqnum,
        devid,
        // The reference server zeroes `direction` on every RET_SUBMIT
        // (stub_tx.c's setup_base_pdu); a real client never gets to
        // lean on this field and neither should anything exercising one.
        direction: 0,
        ep: 0,
    };
    let body = RetSubmitBody {
        status,
        actual_length,
        start_frame: 0,
        number_of_packets: if iso.is_empty() { 0 } else { iso.len() as u32 },
        error_count: 0,
    };
    let mut bytes = Vec::new();
    header.write_to(&mut bytes).unwrap();
    body.write_to(&mut bytes).unwrap();
    usbip_wire::write_padding(&mut bytes, RetSubmitBody::WIRE_SIZE).unwrap();
    bytes.extend_from_slice(payload);
    for packet in iso {
        packet.write_to(&mut bytes).unwrap();
    }
    bytes
}

/// Builds a literal RET_UNLINK reply frame.
pub fn ret_unlink(seqnum: u32, devid: u32, status: i32) -> Vec<u8> {
    let header = UsbIpHeader {
        command: Command::RetUnlink.as_u32(),
        seqnum,
        devid,
        direction: 0,
        ep: 0,
    };
    let body = usbip_wire::RetUnlinkBody { status };
    let mut bytes = Vec::new();
    header.write_to(&mut bytes).unwrap();
    body.write_to(&mut bytes).unwrap();
    usbip_wire::write_padding(&mut bytes, usbip_wire::RetUnlinkBody::WIRE_SIZE).unwrap();
    bytes
}
