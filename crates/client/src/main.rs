//! usbip-client
//!
//! Thin CLI front end for the USB/IP client protocol engine. Connects
//! to a usbip server, submits one control-transfer GET_DESCRIPTOR URB
//! against the attached device, and prints the result. Intended as a
//! smoke test and a worked example of the `usbip_client::Session` API;
//! real host OS integration (virtual HCD, enumeration) is out of scope.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::info;
use usbip_client::{
    ClientConfig, Direction, EndpointType, HostCallbacks, HostRequestHandle, Session,
    SubmitOutcome, UrbFunction, UrbSubmission, UsbdStatus,
};

#[derive(Parser, Debug)]
#[command(name = "usbip-client")]
#[command(author, version, about = "USB/IP client protocol engine smoke test")]
struct Args {
    /// Address of the usbip server, host:port.
    #[arg(long, value_name = "HOST:PORT")]
    server: String,

    /// Remote device identifier (busnum/devnum packed into one u32).
    #[arg(long, value_name = "DEVID")]
    devid: Option<u32>,

    /// Path to configuration file.
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to the default location and exit.
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

type CompletionTuple = (UsbdStatus, u32, Option<Vec<u8>>);

/// Marker handle; `CliHost` tracks completion itself through a shared
/// slot rather than inspecting the handle it's handed back.
#[derive(Debug)]
struct CliHandle;

impl HostRequestHandle for CliHandle {}

/// A `HostCallbacks` sufficient for a CLI that only ever has one URB
/// in flight at a time: the slot is filled before submission and taken
/// by whichever `complete_urb*` call runs first.
struct CliHost {
    slot: Mutex<Option<oneshot::Sender<CompletionTuple>>>,
}

impl CliHost {
    fn new() -> Self {
        CliHost {
            slot: Mutex::new(None),
        }
    }

    fn expect_one(&self) -> oneshot::Receiver<CompletionTuple> {
        let (tx, rx) = oneshot::channel();
        *self.slot.lock().unwrap() = Some(tx);
        rx
    }
}

impl HostCallbacks for CliHost {
    fn complete_urb(
        &self,
        _handle: &dyn HostRequestHandle,
        status: UsbdStatus,
        actual_length: u32,
        data: Option<Vec<u8>>,
    ) {
        if let Some(tx) = self.slot.lock().unwrap().take() {
            let _ = tx.send((status, actual_length, data));
        }
    }

    fn complete_urb_cancel(&self, _handle: &dyn HostRequestHandle) {
        if let Some(tx) = self.slot.lock().unwrap().take() {
            let _ = tx.send((UsbdStatus::Cancelled, 0, None));
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = ClientConfig::default();
        let path = ClientConfig::default_path();
        config.save(&path).context("failed to save configuration")?;
        println!("configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut client_config = match &args.config {
        Some(path) => ClientConfig::load(Some(path.clone())).context("failed to load configuration")?,
        None => ClientConfig::load_or_default(),
    };
    if let Some(level) = &args.log_level {
        client_config.log_level = level.clone();
    }
    if let Some(devid) = args.devid {
        client_config.session.devid = devid;
    }

    usbip_support::setup_logging(&client_config.log_level).context("failed to set up logging")?;
    info!("usbip-client v{}", env!("CARGO_PKG_VERSION"));

    let host = Arc::new(CliHost::new());
    let session = Session::connect(args.server.as_str(), client_config.session, host.clone())
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    info!("connected to {}", args.server);

    let (status, actual_length, data) = get_device_descriptor(&session, &host).await?;
    info!(?status, actual_length, "GET_DESCRIPTOR completed");
    if let Some(bytes) = data {
        println!("{bytes:02x?}");
    }

    session.detach().await;
    Ok(())
}

/// Submits a standard GET_DESCRIPTOR(DEVICE) control transfer and waits
/// for its completion.
async fn get_device_descriptor(session: &Session, host: &Arc<CliHost>) -> Result<CompletionTuple> {
    let rx = host.expect_one();

    let submission = UrbSubmission {
        function: UrbFunction::ControlTransfer,
        endpoint_type: Some(EndpointType::Control),
        ep: 0,
        setup: Some([0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00]),
        config_value: None,
        interface_value: None,
        direction: Direction::In,
        buffer: Vec::new(),
        transfer_buffer_length: 18,
        iso_offsets: Vec::new(),
        interval: 0,
        host_handle: Box::new(CliHandle),
    };

    match session.submit_urb(submission)? {
        SubmitOutcome::Pending(_) => {}
        SubmitOutcome::CompletedLocally => {
            anyhow::bail!("GET_DESCRIPTOR completed locally without reaching the wire");
        }
    }

    rx.await.context("host callback channel closed before completion")
}
