//! The session: owns the TCP connection and the two long-running tasks
//! (sender, receiver) that drive it, plus the shared state they and
//! intake/cancellation operate on.

use crate::cancellation;
use crate::completion::complete_canceled;
use crate::config::SessionConfig;
use crate::host::HostCallbacks;
use crate::intake::{self, SubmitOutcome, UrbSubmission};
use crate::outstanding::OutstandingTable;
use crate::pool::BufferPool;
use crate::receiver::{self, ReceiverContext};
use crate::sender::{self, PreparedFrame};
use crate::status::StatusWord;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A session's place in its own lifecycle, shared between the public
/// handle and the receiver task that drives the `Draining` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    Draining,
    Closed,
}

const ACTIVE: u8 = 0;
const DRAINING: u8 = 1;
const CLOSED: u8 = 2;

struct LifecycleState(AtomicU8);

impl LifecycleState {
    fn new() -> Self {
        LifecycleState(AtomicU8::new(ACTIVE))
    }

    fn load(&self) -> Lifecycle {
        match self.0.load(Ordering::Acquire) {
            ACTIVE => Lifecycle::Active,
            DRAINING => Lifecycle::Draining,
            _ => Lifecycle::Closed,
        }
    }

    fn store(&self, state: Lifecycle) {
        let v = match state {
            Lifecycle::Active => ACTIVE,
            Lifecycle::Draining => DRAINING,
            Lifecycle::Closed => CLOSED,
        };
        self.0.store(v, Ordering::Release);
    }
}

/// State shared between intake, the sender task, the receiver task, and
/// cancellation. Never exposed directly; `Session` is the public face.
pub(crate) struct SessionInner {
    pub config: SessionConfig,
    pub outstanding: Arc<OutstandingTable>,
    /// Serializes intake (SUBMIT and UNLINK encoding) so seqnum
    /// allocation and wire order agree; held across table insert and
    /// channel send.
    pub intake_lock: Mutex<()>,
    pub send_tx: mpsc::UnboundedSender<PreparedFrame>,
    pub host: Arc<dyn HostCallbacks>,
    pub pool: Arc<BufferPool>,
}

/// One live USB/IP client session: a connected TCP stream plus the
/// sender and receiver tasks reading and writing it.
pub struct Session {
    inner: Arc<SessionInner>,
    lifecycle: Arc<LifecycleState>,
    sender_task: JoinHandle<()>,
    receiver_task: JoinHandle<()>,
}

impl Session {
    /// Connects to `addr`, applies the configured TCP keepalive, and
    /// spawns the sender/receiver tasks. The returned session is
    /// `Active` immediately.
    pub async fn connect(
        addr: impl tokio::net::ToSocketAddrs,
        config: SessionConfig,
        host: Arc<dyn HostCallbacks>,
    ) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        apply_keepalive(&stream, &config);
        Ok(Self::from_stream(stream, config, host))
    }

    /// Builds a session over an already-connected stream (used by tests
    /// against an in-process mock peer, and by callers that need custom
    /// socket setup before handing the stream over).
    pub fn from_stream(stream: TcpStream, config: SessionConfig, host: Arc<dyn HostCallbacks>) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (send_tx, send_rx) = mpsc::unbounded_channel();
        let outstanding = Arc::new(OutstandingTable::new());
        let pool = Arc::new(BufferPool::new(config.session_pool_capacity()));

        let inner = Arc::new(SessionInner {
            config,
            outstanding: outstanding.clone(),
            intake_lock: Mutex::new(()),
            send_tx,
            host: host.clone(),
            pool: pool.clone(),
        });

        let lifecycle = Arc::new(LifecycleState::new());

        let sender_task = tokio::spawn(sender::run(
            send_rx,
            write_half,
            outstanding.clone(),
            host.clone(),
            pool.clone(),
        ));

        let receiver_lifecycle = lifecycle.clone();
        let receiver_outstanding = outstanding.clone();
        let receiver_host = host.clone();
        let receiver_pool = pool.clone();
        let receiver_task = tokio::spawn(async move {
            let ctx = ReceiverContext {
                outstanding: receiver_outstanding.clone(),
                host: receiver_host.clone(),
                pool: receiver_pool.clone(),
            };
            if let Err(e) = receiver::run(read_half, ctx).await {
                warn!(error = %e, "receiver task ending session");
            }
            receiver_lifecycle.store(Lifecycle::Draining);
            for request in receiver_outstanding.drain() {
                complete_canceled(receiver_host.as_ref(), receiver_pool.as_ref(), &request);
            }
            receiver_lifecycle.store(Lifecycle::Closed);
            info!("session closed");
        });

        Session {
            inner,
            lifecycle,
            sender_task,
            receiver_task,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.load()
    }

    /// Submits one URB. On `SubmitOutcome::Pending(seqnum)` the caller
    /// may later pass that seqnum to `cancel_urb`; `CompletedLocally`
    /// means the URB finished synchronously through `HostCallbacks` and
    /// never touched the wire (e.g. `UrbFunction::NotSupported`).
    pub fn submit_urb(&self, submission: UrbSubmission) -> crate::error::Result<SubmitOutcome> {
        if self.lifecycle() != Lifecycle::Active {
            return Err(crate::error::ClientError::Canceled);
        }
        intake::submit(&self.inner, submission)
    }

    pub fn cancel_urb(&self, seqnum: u32) -> crate::error::Result<()> {
        cancellation::cancel_urb(&self.inner, seqnum)
    }

    /// Forces every outstanding request to complete as canceled and
    /// drops the connection, without waiting for the peer.
    pub async fn detach(self) {
        self.sender_task.abort();
        self.receiver_task.abort();
        for request in self.inner.outstanding.drain() {
            complete_canceled(self.inner.host.as_ref(), self.inner.pool.as_ref(), &request);
        }
        self.lifecycle.store(Lifecycle::Closed);
    }
}

impl SessionConfig {
    fn session_pool_capacity(&self) -> usize {
        self.buffer_pool_capacity
    }
}

#[cfg(target_os = "linux")]
fn apply_keepalive(stream: &TcpStream, config: &SessionConfig) {
    use nix::sys::socket::sockopt::{KeepAlive, TcpKeepCount, TcpKeepIdle, TcpKeepInterval};
    use nix::sys::socket::setsockopt;
    use std::os::fd::{AsRawFd, BorrowedFd};

    let fd = unsafe { BorrowedFd::borrow_raw(stream.as_raw_fd()) };
    let idle = config.keepalive_idle().as_secs() as u32;
    let interval = config.keepalive_interval().as_secs() as u32;
    let probes = config.keepalive_probe_count;

    if let Err(e) = setsockopt(&fd, KeepAlive, &true) {
        warn!(error = %e, "failed to enable TCP keepalive");
        return;
    }
    if let Err(e) = setsockopt(&fd, TcpKeepIdle, &idle) {
        warn!(error = %e, "failed to set TCP_KEEPIDLE");
    }
    if let Err(e) = setsockopt(&fd, TcpKeepInterval, &interval) {
        warn!(error = %e, "failed to set TCP_KEEPINTVL");
    }
    if let Err(e) = setsockopt(&fd, TcpKeepCount, &probes) {
        warn!(error = %e, "failed to set TCP_KEEPCNT");
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_keepalive(_stream: &TcpStream, _config: &SessionConfig) {}
