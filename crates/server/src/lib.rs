//! A scripted USB/IP wire peer for exercising `usbip-client` against
//! literal, pre-recorded traffic instead of a real kernel usbip server.
//!
//! Not a usable USB/IP server: it has no device backing store, no
//! attach handshake, and no policy. It exists to let the client's
//! integration tests assert on exact frame bytes and completion
//! ordering without a kernel module.

mod peer;
mod script;

pub use peer::{PeerError, ScriptedPeer, bind};
pub use script::{InboundFrame, ScriptReply, ScriptStep, ret_submit, ret_unlink};
