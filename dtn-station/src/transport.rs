//! TCP link to the peer station: one connection for the whole run,
//! length-prefixed frames, handshake, and the send-then-receive exchange.

use std::io;
use std::time::Duration;

use dtn_core::wire::{self, LEN_SIZE};
use dtn_core::{Dispatch, Frame, FrameDecodeError, FrameEncodeError, Role, PROTOCOL_VERSION};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tracing::warn;

/// Server: bind and accept exactly one client. Client: connect to the server.
pub async fn establish(role: Role, addr: &str) -> io::Result<TcpStream> {
    let stream = match role {
        Role::Server => {
            let listener = TcpListener::bind(addr).await?;
            tracing::info!(addr = %listener.local_addr()?, "waiting for the client");
            let (stream, peer) = listener.accept().await?;
            tracing::info!(%peer, "client connected");
            stream
        }
        Role::Client => {
            let stream = TcpStream::connect(addr).await?;
            tracing::info!(%addr, "connected to the server");
            stream
        }
    };
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// A framed stream with a receive buffer that outlives each read, so a
/// read abandoned at a deadline loses no bytes.
pub struct Connection<S> {
    stream: S,
    rx: Vec<u8>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            rx: Vec::new(),
        }
    }

    /// Write one already-encoded frame.
    pub async fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes).await.map_err(TransportError::from_io)?;
        self.stream.flush().await.map_err(TransportError::from_io)?;
        Ok(())
    }

    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let bytes = wire::encode_frame(frame)?;
        self.send_bytes(&bytes).await
    }

    /// Read exactly one frame. Cancel safe: partial input stays buffered
    /// for the next call. EOF before a complete frame is `Closed`.
    pub async fn read_frame(&mut self) -> Result<Frame, TransportError> {
        loop {
            match wire::decode_frame(&self.rx) {
                Ok((frame, used)) => {
                    self.rx.drain(..used);
                    return Ok(frame);
                }
                Err(FrameDecodeError::NeedMore) => {}
                Err(e @ FrameDecodeError::Decode(_)) => {
                    // The prefix was valid, so the next frame starts right after this one.
                    self.skip_current_frame();
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
            let n = self
                .stream
                .read_buf(&mut self.rx)
                .await
                .map_err(TransportError::from_io)?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
        }
    }

    fn skip_current_frame(&mut self) {
        if self.rx.len() < LEN_SIZE {
            return;
        }
        let prefix = [self.rx[0], self.rx[1], self.rx[2], self.rx[3]];
        if let Ok(len) = wire::payload_len(prefix) {
            let end = (LEN_SIZE + len).min(self.rx.len());
            self.rx.drain(..end);
        }
    }

    /// Exchange Hello frames and check the peer runs the same protocol in
    /// the opposite role.
    pub async fn handshake(&mut self, role: Role) -> Result<(), TransportError> {
        self.send_frame(&Frame::Hello {
            protocol_version: PROTOCOL_VERSION,
            role,
        })
        .await?;
        match self.read_frame().await? {
            Frame::Hello {
                protocol_version, ..
            } if protocol_version != PROTOCOL_VERSION => Err(TransportError::VersionMismatch(protocol_version)),
            Frame::Hello { role: peer, .. } if peer != role.peer() => Err(TransportError::RoleMismatch {
                expected: role.peer(),
                got: peer,
            }),
            Frame::Hello { .. } => Ok(()),
            Frame::Dispatch { .. } => Err(TransportError::UnexpectedFrame("dispatch")),
        }
    }

    /// Send our encoded dispatch for cycle `seq`, then wait up to
    /// `deadline` for the peer's dispatch of the same cycle.
    ///
    /// Dispatches from earlier peer cycles that arrive first (left over
    /// from a timed-out exchange) are returned too, in arrival order, with
    /// the current one last. If only late ones arrive before the deadline
    /// they are returned on their own; if nothing arrives it is `TimedOut`.
    pub async fn exchange(
        &mut self,
        outbound: &[u8],
        seq: u64,
        deadline: Duration,
    ) -> Result<Vec<Dispatch>, TransportError> {
        self.send_bytes(outbound).await?;
        let until = Instant::now() + deadline;
        let mut received = Vec::new();
        loop {
            let frame = match tokio::time::timeout_at(until, self.read_frame()).await {
                Ok(frame) => frame?,
                Err(_) if received.is_empty() => return Err(TransportError::TimedOut(deadline)),
                Err(_) => {
                    warn!(seq, late = received.len(), "peer's dispatch for this cycle did not arrive");
                    return Ok(received);
                }
            };
            match frame {
                Frame::Dispatch { seq: theirs, dispatch } if theirs < seq => {
                    warn!(seq, theirs, dispatch = %dispatch.id(), "late dispatch from an earlier cycle");
                    received.push(dispatch);
                }
                Frame::Dispatch { dispatch, .. } => {
                    received.push(dispatch);
                    return Ok(received);
                }
                Frame::Hello { .. } => return Err(TransportError::UnexpectedFrame("hello")),
            }
        }
    }
}

impl Connection<TcpStream> {
    /// Non-blocking liveness check. Data already waiting counts as alive.
    pub async fn is_closed(&self) -> bool {
        let mut buf = [0u8; 1];
        match tokio::time::timeout(Duration::ZERO, self.stream.peek(&mut buf)).await {
            Ok(Ok(0)) => true,
            Ok(Ok(_)) => false,
            Ok(Err(_)) => true,
            Err(_) => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed by peer")]
    Closed,
    #[error("no dispatch from the peer within {0:?}")]
    TimedOut(Duration),
    #[error("i/o error: {0}")]
    Io(io::Error),
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameDecodeError),
    #[error("cannot frame outbound data: {0}")]
    Encode(#[from] FrameEncodeError),
    #[error("unexpected {0} frame")]
    UnexpectedFrame(&'static str),
    #[error("peer speaks protocol version {0}, expected {PROTOCOL_VERSION}")]
    VersionMismatch(u8),
    #[error("peer is a {got}, expected a {expected}")]
    RoleMismatch { expected: Role, got: Role },
}

impl TransportError {
    fn from_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => TransportError::Closed,
            _ => TransportError::Io(e),
        }
    }
}
