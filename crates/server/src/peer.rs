//! The scripted peer: binds a loopback socket, accepts exactly one
//! connection, and plays back a fixed sequence of `ScriptStep`s against
//! whatever the other side sends.

use crate::script::{InboundFrame, ScriptReply, ScriptStep};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, trace};
use usbip_wire::{Command, IsoPacketDescriptor, SubmitBody, UnlinkBody, UsbIpHeader};

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire error: {0}")]
    Wire(#[from] usbip_wire::ProtocolError),

    #[error("unexpected command code: {0:#06x}")]
    UnexpectedCommand(u32),
}

/// One bound, not-yet-accepting scripted peer.
pub struct ScriptedPeer {
    listener: TcpListener,
}

/// Binds a loopback listener and returns it together with the address
/// clients should connect to.
pub async fn bind() -> std::io::Result<(ScriptedPeer, SocketAddr)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    Ok((ScriptedPeer { listener }, addr))
}

impl ScriptedPeer {
    /// Accepts one connection and plays the script against it to
    /// completion. Returns every frame it parsed, in arrival order, so
    /// tests can additionally assert on exact bytes beyond what
    /// `ScriptStep::expect` already checked inline.
    pub async fn run(self, script: Vec<ScriptStep>) -> Result<Vec<InboundFrame>, PeerError> {
        let (mut stream, peer_addr) = self.listener.accept().await?;
        debug!(%peer_addr, steps = script.len(), "scripted peer accepted connection");

        let mut seen = Vec::with_capacity(script.len());
        for (i, step) in script.into_iter().enumerate() {
            let frame = read_frame(&mut stream).await?;
            trace!(i, seqnum = frame.seqnum(), ?frame, "scripted peer read frame");
            (step.check)(&frame);
            seen.push(frame);

            if let Some(reply) = step.reply {
                let bytes = match reply {
                    ScriptReply::Fixed(bytes) => bytes,
                    ScriptReply::Dynamic(f) => f(seen.last().expect("frame just pushed")),
                };
                stream.write_all(&bytes).await?;
            }
        }
        Ok(seen)
    }
}

async fn read_frame(stream: &mut TcpStream) -> Result<InboundFrame, PeerError> {
    let mut header_bytes = [0u8; UsbIpHeader::WIRE_SIZE];
    stream.read_exact(&mut header_bytes).await?;
    let header = UsbIpHeader::read_from(&mut &header_bytes[..])?;
    let command = Command::from_u32(header.command).ok_or(PeerError::UnexpectedCommand(header.command))?;

    match command {
        Command::Submit => {
            let mut body_bytes = [0u8; 28];
            stream.read_exact(&mut body_bytes).await?;
            let body = SubmitBody::read_from(&mut &body_bytes[..SubmitBody::WIRE_SIZE])?;

            let direction_out = header.direction == usbip_wire::Direction::Out.as_u32();
            let mut payload = Vec::new();
            if direction_out && body.transfer_buffer_length > 0 {
                payload = vec![0u8; body.transfer_buffer_length as usize];
                stream.read_exact(&mut payload).await?;
            }

            let has_iso = body.number_of_packets != 0 && body.number_of_packets != 0xFFFF_FFFF;
            let mut iso = Vec::new();
            if has_iso {
                for _ in 0..body.number_of_packets {
                    let mut descriptor_bytes = [0u8; IsoPacketDescriptor::WIRE_SIZE];
                    stream.read_exact(&mut descriptor_bytes).await?;
                    iso.push(IsoPacketDescriptor::read_from(&mut &descriptor_bytes[..])?);
                }
            }

            Ok(InboundFrame::Submit {
                header,
                body,
                payload,
                iso,
            })
        }
        Command::Unlink => {
            let mut body_bytes = [0u8; 28];
            stream.read_exact(&mut body_bytes).await?;
            let body = UnlinkBody::read_from(&mut &body_bytes[..UnlinkBody::WIRE_SIZE])?;
            Ok(InboundFrame::Unlink { header, body })
        }
        other => Err(PeerError::UnexpectedCommand(other.as_u32())),
    }
}
