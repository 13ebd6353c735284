//! URB function codes and endpoint types, the dispatch key the intake
//! adapter matches on.

/// Endpoint transfer type, as carried on the pipe the URB targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointType {
    Control,
    Bulk,
    Interrupt,
    Isochronous,
}

/// The URB function codes the intake dispatcher recognizes. Grouped by
/// how they are handled rather than by numeric value: transfers that
/// translate to a wire frame, configuration calls synthesized as
/// control transfers, and everything completed locally as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrbFunction {
    SelectConfiguration,
    SelectInterface,
    ControlTransfer,
    ControlTransferEx,
    BulkOrInterruptTransfer,
    IsochTransfer,
    /// Every URB function the core refuses to translate: pipe-reset and
    /// stream-control calls, descriptor/status/configuration queries
    /// that are either meaningless across the network or served from a
    /// local cache external to the core, and deprecated/reserved codes.
    NotSupported,
}

impl UrbFunction {
    pub fn requires_endpoint_type(self) -> Option<&'static [EndpointType]> {
        match self {
            UrbFunction::BulkOrInterruptTransfer => {
                Some(&[EndpointType::Bulk, EndpointType::Interrupt])
            }
            UrbFunction::IsochTransfer => Some(&[EndpointType::Isochronous]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_or_interrupt_accepts_either_type() {
        let allowed = UrbFunction::BulkOrInterruptTransfer
            .requires_endpoint_type()
            .unwrap();
        assert!(allowed.contains(&EndpointType::Bulk));
        assert!(allowed.contains(&EndpointType::Interrupt));
        assert!(!allowed.contains(&EndpointType::Control));
    }

    #[test]
    fn isoch_requires_isochronous_endpoint() {
        let allowed = UrbFunction::IsochTransfer.requires_endpoint_type().unwrap();
        assert_eq!(allowed, &[EndpointType::Isochronous]);
    }

    #[test]
    fn not_supported_has_no_endpoint_requirement() {
        assert!(UrbFunction::NotSupported.requires_endpoint_type().is_none());
    }
}
