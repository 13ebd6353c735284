//! The closed `UsbdStatus` table and its mapping to/from the wire
//! `status` field (a signed Linux errno magnitude on SUBMIT/RET_SUBMIT).

/// Host-facing completion status. Closed set; anything the wire sends
/// that isn't one of these collapses to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbdStatus {
    Success,
    Crc,
    Stall,
    DeviceNotResponding,
    Cancelled,
    InsufficientResources,
    InvalidUrbFunction,
    InvalidParameter,
    ErrorNotSupported,
    Timeout,
    Unknown(i32),
}

impl UsbdStatus {
    /// Maps a wire `status` value (a negative Linux errno, or 0 for
    /// success) to a `UsbdStatus`.
    pub fn from_wire(status: i32) -> Self {
        match status {
            0 => UsbdStatus::Success,
            -5 => UsbdStatus::Crc,          // EIO, also used generically by the reference server for CRC faults
            -32 => UsbdStatus::Stall,       // EPIPE
            -19 => UsbdStatus::DeviceNotResponding, // ENODEV
            -104 => UsbdStatus::Cancelled,  // ECONNRESET
            -12 => UsbdStatus::InsufficientResources, // ENOMEM
            -22 => UsbdStatus::InvalidParameter, // EINVAL
            -38 => UsbdStatus::ErrorNotSupported, // ENOSYS
            -62 => UsbdStatus::Timeout,     // ETIME
            other => UsbdStatus::Unknown(other),
        }
    }

    /// Maps a `UsbdStatus` back to its wire representation.
    pub fn to_wire(self) -> i32 {
        match self {
            UsbdStatus::Success => 0,
            UsbdStatus::Crc => -5,
            UsbdStatus::Stall => -32,
            UsbdStatus::DeviceNotResponding => -19,
            UsbdStatus::Cancelled => -104,
            UsbdStatus::InsufficientResources => -12,
            UsbdStatus::InvalidUrbFunction => -38,
            UsbdStatus::InvalidParameter => -22,
            UsbdStatus::ErrorNotSupported => -38,
            UsbdStatus::Timeout => -62,
            UsbdStatus::Unknown(v) => v,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, UsbdStatus::Success)
    }
}
