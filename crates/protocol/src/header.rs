//! USB/IP fixed-layout wire header and command bodies.
//!
//! Every frame on the wire is a 48-byte header (network byte order)
//! followed by an optional payload and, for isochronous transfers, a
//! trailing table of packet descriptors. The 8-byte USB setup packet
//! embedded in the SUBMIT body is the one field carried in USB wire
//! order (little-endian), not network order.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Fixed protocol version exchanged during the (out-of-scope) attach
/// handshake; kept here because wire-layout code is the natural home
/// for it.
pub const USBIP_VERSION: u16 = 0x0111;

/// `command` values that appear in a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Submit,
    RetSubmit,
    Unlink,
    RetUnlink,
    ResetDev,
}

impl Command {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0x0000_0001 => Some(Command::Submit),
            0x0000_0003 => Some(Command::RetSubmit),
            0x0000_0002 => Some(Command::Unlink),
            0x0000_0004 => Some(Command::RetUnlink),
            0xFFFF_FFFF => Some(Command::ResetDev),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Command::Submit => 0x0000_0001,
            Command::RetSubmit => 0x0000_0003,
            Command::Unlink => 0x0000_0002,
            Command::RetUnlink => 0x0000_0004,
            Command::ResetDev => 0xFFFF_FFFF,
        }
    }
}

/// Transfer direction as carried in the header's `direction` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
}

impl Direction {
    pub fn from_u32(v: u32) -> Direction {
        if v == 0 { Direction::Out } else { Direction::In }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Direction::Out => 0,
            Direction::In => 1,
        }
    }
}

/// The common 48-byte header shared by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbIpHeader {
    pub command: u32,
    pub seqnum: u32,
    pub devid: u32,
    pub direction: u32,
    pub ep: u32,
}

impl UsbIpHeader {
    pub const WIRE_SIZE: usize = 20;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(self.command)?;
        w.write_u32::<BigEndian>(self.seqnum)?;
        w.write_u32::<BigEndian>(self.devid)?;
        w.write_u32::<BigEndian>(self.direction)?;
        w.write_u32::<BigEndian>(self.ep)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(UsbIpHeader {
            command: r.read_u32::<BigEndian>()?,
            seqnum: r.read_u32::<BigEndian>()?,
            devid: r.read_u32::<BigEndian>()?,
            direction: r.read_u32::<BigEndian>()?,
            ep: r.read_u32::<BigEndian>()?,
        })
    }
}

/// SUBMIT command body (offset 20, 28 bytes followed by padding to 40).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitBody {
    pub transfer_flags: u32,
    pub transfer_buffer_length: u32,
    pub start_frame: u32,
    pub number_of_packets: u32,
    pub interval: u32,
    pub setup: [u8; 8],
}

impl SubmitBody {
    pub const WIRE_SIZE: usize = 28;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(self.transfer_flags)?;
        w.write_u32::<BigEndian>(self.transfer_buffer_length)?;
        w.write_u32::<BigEndian>(self.start_frame)?;
        w.write_u32::<BigEndian>(self.number_of_packets)?;
        w.write_u32::<BigEndian>(self.interval)?;
        w.write_all(&self.setup)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let transfer_flags = r.read_u32::<BigEndian>()?;
        let transfer_buffer_length = r.read_u32::<BigEndian>()?;
        let start_frame = r.read_u32::<BigEndian>()?;
        let number_of_packets = r.read_u32::<BigEndian>()?;
        let interval = r.read_u32::<BigEndian>()?;
        let mut setup = [0u8; 8];
        r.read_exact(&mut setup)?;
        Ok(SubmitBody {
            transfer_flags,
            transfer_buffer_length,
            start_frame,
            number_of_packets,
            interval,
            setup,
        })
    }
}

/// RET_SUBMIT command body (offset 20, 20 bytes then 8 bytes padding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetSubmitBody {
    pub status: i32,
    pub actual_length: u32,
    pub start_frame: u32,
    pub number_of_packets: u32,
    pub error_count: u32,
}

impl RetSubmitBody {
    pub const WIRE_SIZE: usize = 20;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<BigEndian>(self.status)?;
        w.write_u32::<BigEndian>(self.actual_length)?;
        w.write_u32::<BigEndian>(self.start_frame)?;
        w.write_u32::<BigEndian>(self.number_of_packets)?;
        w.write_u32::<BigEndian>(self.error_count)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(RetSubmitBody {
            status: r.read_i32::<BigEndian>()?,
            actual_length: r.read_u32::<BigEndian>()?,
            start_frame: r.read_u32::<BigEndian>()?,
            number_of_packets: r.read_u32::<BigEndian>()?,
            error_count: r.read_u32::<BigEndian>()?,
        })
    }

    pub fn success(actual_length: u32) -> Self {
        RetSubmitBody {
            status: 0,
            actual_length,
            start_frame: 0,
            number_of_packets: 0,
            error_count: 0,
        }
    }
}

/// UNLINK command body: the seqnum of the victim SUBMIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlinkBody {
    pub unlink_seqnum: u32,
}

impl UnlinkBody {
    pub const WIRE_SIZE: usize = 4;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(self.unlink_seqnum)
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(UnlinkBody {
            unlink_seqnum: r.read_u32::<BigEndian>()?,
        })
    }
}

/// RET_UNLINK command body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetUnlinkBody {
    pub status: i32,
}

impl RetUnlinkBody {
    pub const WIRE_SIZE: usize = 4;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_i32::<BigEndian>(self.status)
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(RetUnlinkBody {
            status: r.read_i32::<BigEndian>()?,
        })
    }
}

/// Zero-pads a command body from its wire size up to the 28-byte union
/// width shared by every command-specific section of the header.
pub fn write_padding<W: Write>(w: &mut W, body_len: usize) -> io::Result<()> {
    const COMMAND_BODY_WIDTH: usize = 28;
    let pad = COMMAND_BODY_WIDTH.saturating_sub(body_len);
    if pad > 0 {
        w.write_all(&[0u8; 28][..pad])?;
    }
    Ok(())
}

pub fn skip_padding<R: Read>(r: &mut R, body_len: usize) -> io::Result<()> {
    const COMMAND_BODY_WIDTH: usize = 28;
    let pad = COMMAND_BODY_WIDTH.saturating_sub(body_len);
    if pad > 0 {
        let mut buf = [0u8; 28];
        r.read_exact(&mut buf[..pad])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_roundtrip() {
        let h = UsbIpHeader {
            command: Command::Submit.as_u32(),
            seqnum: 42,
            devid: 0x0001_0002,
            direction: Direction::In.as_u32(),
            ep: 3,
        };
        let mut buf = Vec::new();
        h.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), UsbIpHeader::WIRE_SIZE);
        let decoded = UsbIpHeader::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn command_round_trips_through_u32() {
        for cmd in [
            Command::Submit,
            Command::RetSubmit,
            Command::Unlink,
            Command::RetUnlink,
            Command::ResetDev,
        ] {
            assert_eq!(Command::from_u32(cmd.as_u32()), Some(cmd));
        }
    }

    #[test]
    fn unknown_command_is_none() {
        assert_eq!(Command::from_u32(9999), None);
    }

    #[test]
    fn submit_body_roundtrip() {
        let body = SubmitBody {
            transfer_flags: 0,
            transfer_buffer_length: 0x40,
            start_frame: 0,
            number_of_packets: 0xFFFF_FFFF,
            interval: 0,
            setup: [0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00],
        };
        let mut buf = Vec::new();
        body.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), SubmitBody::WIRE_SIZE);
        let decoded = SubmitBody::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(body, decoded);
    }

    #[test]
    fn ret_submit_success_has_zero_status() {
        let body = RetSubmitBody::success(512);
        assert_eq!(body.status, 0);
        assert_eq!(body.actual_length, 512);
    }

    #[test]
    fn ret_submit_body_roundtrip() {
        let body = RetSubmitBody {
            status: -32,
            actual_length: 0,
            start_frame: 0,
            number_of_packets: 0,
            error_count: 1,
        };
        let mut buf = Vec::new();
        body.write_to(&mut buf).unwrap();
        let decoded = RetSubmitBody::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(body, decoded);
    }

    #[test]
    fn unlink_body_roundtrip() {
        let body = UnlinkBody { unlink_seqnum: 30 };
        let mut buf = Vec::new();
        body.write_to(&mut buf).unwrap();
        let decoded = UnlinkBody::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(body, decoded);
    }

    #[test]
    fn padding_fills_to_command_body_width() {
        let mut buf = Vec::new();
        write_padding(&mut buf, UnlinkBody::WIRE_SIZE).unwrap();
        assert_eq!(buf.len(), 24);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
