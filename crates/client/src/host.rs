//! The interface boundary between the protocol engine and the
//! surrounding host OS integration layer. The engine calls
//! `HostCallbacks` to complete URBs; the host layer calls
//! `Session::submit_urb`/`cancel_urb`/`detach` to drive the engine.
//! Host OS integration itself (virtual HCD, enumeration, descriptor
//! caching) lives outside this crate.

use usbip_wire::UsbdStatus;

/// An opaque token identifying a single outstanding URB to the host
/// layer. The engine never inspects it; it only hands it back unchanged
/// through `complete_urb`/`complete_urb_cancel`.
pub trait HostRequestHandle: Send + Sync + std::fmt::Debug + 'static {}

/// Required from the surrounding layer: called by the core to report a
/// URB's final outcome.
pub trait HostCallbacks: Send + Sync + 'static {
    /// A URB finished: on the wire, or locally (not-supported, invalid
    /// parameter). `data` carries the IN-direction payload, if any.
    fn complete_urb(
        &self,
        handle: &dyn HostRequestHandle,
        status: UsbdStatus,
        actual_length: u32,
        data: Option<Vec<u8>>,
    );

    /// A URB finished because it was canceled.
    fn complete_urb_cancel(&self, handle: &dyn HostRequestHandle);
}
