//! Shared completion helpers used by the sender, receiver, and
//! cancellation paths: whichever actor's CAS reaches a terminal status
//! acquires the right to complete the request exactly once, and always
//! does so through one of these two functions.

use crate::host::HostCallbacks;
use crate::pool::BufferPool;
use crate::request::Request;
use usbip_wire::{Direction, UsbdStatus};

/// Completes a request that ran to a (possibly unsuccessful) wire
/// reply. The buffer is handed to the host only for IN transfers; OUT
/// transfers have nothing left to report beyond status/length, so their
/// buffer is returned to the session's pool instead of being dropped.
pub fn complete_success(host: &dyn HostCallbacks, pool: &BufferPool, request: &Request) {
    let buffer = request.take_buffer();
    let data = match request.direction {
        Direction::In => buffer,
        Direction::Out => {
            if let Some(buf) = buffer {
                pool.release(buf);
            }
            None
        }
    };
    let status = *request.result_status.lock().unwrap();
    let actual_length = request.result_actual_length.load(std::sync::atomic::Ordering::Acquire);
    host.complete_urb(
        request
            .host_handle
            .as_ref()
            .expect("non-UNLINK records always carry a host handle")
            .as_ref(),
        status.unwrap_or(UsbdStatus::Unknown(0)),
        actual_length,
        data,
    );
}

/// Completes a request that terminated via cancellation, regardless of
/// which actor's CAS observed it first. The buffer never reached the
/// host, so it always goes back to the pool.
///
/// A no-op for UNLINK tracking records: they carry no host handle of
/// their own (only their victim does), and a teardown drain sweeps them
/// up alongside every real request.
pub fn complete_canceled(host: &dyn HostCallbacks, pool: &BufferPool, request: &Request) {
    if let Some(buf) = request.take_buffer() {
        pool.release(buf);
    }
    let Some(handle) = request.host_handle.as_ref() else {
        return;
    };
    host.complete_urb_cancel(handle.as_ref());
}
