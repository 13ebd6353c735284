//! Ambient support shared between the protocol engine and its binaries:
//! an application-level error type and tracing setup.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::setup_logging;
