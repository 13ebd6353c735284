//! Isochronous packet descriptor wire layout and OUT-side repack.

use crate::error::{ProtocolError, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// One 16-byte isochronous packet descriptor, network byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoPacketDescriptor {
    pub offset: u32,
    pub length: u32,
    pub actual_length: u32,
    pub status: i32,
}

impl IsoPacketDescriptor {
    pub const WIRE_SIZE: usize = 16;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(self.offset)?;
        w.write_u32::<BigEndian>(self.length)?;
        w.write_u32::<BigEndian>(self.actual_length)?;
        w.write_i32::<BigEndian>(self.status)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Ok(IsoPacketDescriptor {
            offset: r.read_u32::<BigEndian>()?,
            length: r.read_u32::<BigEndian>()?,
            actual_length: r.read_u32::<BigEndian>()?,
            status: r.read_i32::<BigEndian>()?,
        })
    }
}

/// Derives the OUT-side packet table from a URB's packet offsets and the
/// transfer's total length, per the consecutive-difference rule: each
/// packet's length is the gap to the next packet's offset (or, for the
/// last packet, the gap to the end of the buffer).
///
/// `actual_length` and `status` are zeroed; the server fills them in for
/// the IN direction only.
pub fn repack_out(offsets: &[u32], transfer_buffer_length: u32) -> Result<Vec<IsoPacketDescriptor>> {
    let n = offsets.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let offset = offsets[i];
        let next = if i + 1 < n {
            offsets[i + 1]
        } else {
            transfer_buffer_length
        };
        if next < offset {
            return Err(ProtocolError::InvalidIsoTable(
                "packet offsets are not monotonically non-decreasing",
            ));
        }
        let length = next - offset;
        if offset + length > transfer_buffer_length {
            return Err(ProtocolError::InvalidIsoTable(
                "packet boundary exceeds transfer_buffer_length",
            ));
        }
        out.push(IsoPacketDescriptor {
            offset,
            length,
            actual_length: 0,
            status: 0,
        });
    }
    let sum: u64 = out.iter().map(|p| p.length as u64).sum();
    if sum != transfer_buffer_length as u64 {
        return Err(ProtocolError::InvalidIsoTable(
            "sum of packet lengths does not equal transfer_buffer_length",
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn descriptor_roundtrip() {
        let d = IsoPacketDescriptor {
            offset: 200,
            length: 200,
            actual_length: 150,
            status: 0,
        };
        let mut buf = Vec::new();
        d.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), IsoPacketDescriptor::WIRE_SIZE);
        let decoded = IsoPacketDescriptor::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(d, decoded);
    }

    #[test]
    fn repack_three_even_packets() {
        let packets = repack_out(&[0, 200, 400], 600).unwrap();
        let lengths: Vec<u32> = packets.iter().map(|p| p.length).collect();
        assert_eq!(lengths, vec![200, 200, 200]);
        assert!(packets.iter().all(|p| p.actual_length == 0 && p.status == 0));
    }

    #[test]
    fn repack_single_packet_spans_whole_buffer() {
        let packets = repack_out(&[0], 64).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].length, 64);
    }

    #[test]
    fn repack_rejects_non_monotonic_offsets() {
        let err = repack_out(&[0, 400, 200], 600).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidIsoTable(_)));
    }

    #[test]
    fn repack_rejects_boundary_past_buffer_end() {
        let err = repack_out(&[0, 200], 300).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidIsoTable(_)));
    }

    #[test]
    fn repack_sum_always_equals_transfer_length() {
        for (offsets, total) in [
            (vec![0u32, 100, 250], 400u32),
            (vec![0], 1),
            (vec![0, 1, 2, 3], 10),
        ] {
            let packets = repack_out(&offsets, total).unwrap();
            let sum: u32 = packets.iter().map(|p| p.length).sum();
            assert_eq!(sum, total);
        }
    }
}
