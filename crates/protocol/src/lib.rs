//! Wire-level USB/IP protocol types: the fixed header layout, command
//! bodies, isochronous packet descriptors, the closed status table, and
//! the URB function dispatch key.
//!
//! # Example
//!
//! ```
//! use usbip_wire::header::{Command, Direction, SubmitBody, UsbIpHeader};
//!
//! let header = UsbIpHeader {
//!     command: Command::Submit.as_u32(),
//!     seqnum: 1,
//!     devid: 0x0001_0002,
//!     direction: Direction::In.as_u32(),
//!     ep: 0,
//! };
//! let mut bytes = Vec::new();
//! header.write_to(&mut bytes).unwrap();
//! assert_eq!(bytes.len(), UsbIpHeader::WIRE_SIZE);
//! ```

pub mod error;
pub mod header;
pub mod iso;
pub mod status;
pub mod urb;

pub use error::{ProtocolError, Result};
pub use header::{
    Command, Direction, RetSubmitBody, RetUnlinkBody, SubmitBody, UnlinkBody, USBIP_VERSION,
    UsbIpHeader,
};
pub use iso::{IsoPacketDescriptor, repack_out};
pub use status::UsbdStatus;
pub use urb::{EndpointType, UrbFunction};
