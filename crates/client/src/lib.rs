//! USB/IP client protocol engine.
//!
//! Translates host-side URBs into USB/IP SUBMIT frames, tracks them in
//! an outstanding-request table, and completes them from RET_SUBMIT /
//! RET_UNLINK replies as they arrive. Host OS integration (virtual HCD,
//! device enumeration, descriptor caching) lives outside this crate;
//! see [`host`] for the boundary.

mod cancellation;
mod completion;
pub mod config;
pub mod error;
pub mod host;
pub mod intake;
mod outstanding;
pub mod pool;
mod receiver;
mod request;
mod sender;
pub mod session;
mod status;

pub use config::{ClientConfig, SessionConfig};
pub use error::{ClientError, Result};
pub use host::{HostCallbacks, HostRequestHandle};
pub use intake::{SubmitOutcome, UrbSubmission};
pub use pool::BufferPool;
pub use request::UrbKind;
pub use session::{Lifecycle, Session};

pub use usbip_wire::{
    Command, Direction, EndpointType, IsoPacketDescriptor, ProtocolError, SubmitBody, UrbFunction,
    UsbIpHeader, UsbdStatus,
};
