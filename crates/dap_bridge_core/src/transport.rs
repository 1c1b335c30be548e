//! Loopback TCP transport to a debug adapter
//!
//! The transport owns the socket. A background reader task feeds inbound
//! bytes through the [`FrameDecoder`](crate::codec::FrameDecoder) and
//! forwards each decoded message, in arrival order, over an unbounded
//! channel so that slow consumers never stall ingestion.

use std::net::SocketAddr;

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, trace, warn};

use crate::{
    codec::{self, FrameDecoder},
    DapError, ProtocolMessage, Result,
};

const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Lifecycle and traffic notifications observed by the owning session.
#[derive(Debug)]
pub enum TransportEvent {
    Connected,
    Message(ProtocolMessage),
    DecodeError(DapError),
    /// The inbound stream ended; `error` is set when the close was error-associated.
    Exited { error: Option<String> },
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct Transport {
    peer: String,
    writer: Mutex<Option<BoxedWriter>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Open a single TCP connection. Retrying is the caller's concern.
    pub async fn connect(
        addr: SocketAddr,
    ) -> std::io::Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer, peer)
    }

    /// Build a transport over arbitrary byte streams.
    pub fn new<R, W>(
        reader: R,
        writer: W,
        peer: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let peer = peer.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(reader_loop(reader, tx, peer.clone()));

        let transport = Self {
            peer,
            writer: Mutex::new(Some(Box::new(writer))),
            reader_task: Mutex::new(Some(reader_task)),
        };
        (transport, rx)
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Encode and write one message. Correlation with a response is the
    /// session's job; this returns as soon as the bytes are flushed.
    pub async fn send(&self, message: &ProtocolMessage) -> Result<()> {
        let framed = codec::encode(message)?;

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| DapError::Transport(format!("connection to {} is closed", self.peer)))?;

        writer
            .write_all(&framed)
            .await
            .map_err(|e| DapError::Transport(format!("write to {} failed: {e}", self.peer)))?;
        writer
            .flush()
            .await
            .map_err(|e| DapError::Transport(format!("flush to {} failed: {e}", self.peer)))?;

        trace!(seq = message.seq(), peer = %self.peer, "Sent DAP message");
        Ok(())
    }

    /// Half-close then drop the socket and stop the reader. Never fails.
    pub async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Ignoring shutdown error on {}: {}", self.peer, e);
            }
        }
        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }
        debug!("Transport to {} closed", self.peer);
    }

    pub async fn is_open(&self) -> bool {
        self.writer.lock().await.is_some()
    }
}

async fn reader_loop<R>(mut reader: R, tx: mpsc::UnboundedSender<TransportEvent>, peer: String)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let _ = tx.send(TransportEvent::Connected);
    let mut decoder = FrameDecoder::new();
    let mut chunk = vec![0_u8; READ_CHUNK_SIZE];

    let error = loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) => {
                info!("Adapter connection {} closed (EOF)", peer);
                break None;
            }
            Ok(n) => n,
            Err(e) => {
                info!("Adapter connection {} failed: {}", peer, e);
                break Some(e.to_string());
            }
        };

        decoder.extend(&chunk[..read]);
        while let Some(decoded) = decoder.next_message() {
            let event = match decoded {
                Ok(message) => TransportEvent::Message(message),
                Err(e) => {
                    warn!("Dropping undecodable DAP frame from {}: {}", peer, e);
                    TransportEvent::DecodeError(e)
                }
            };
            if tx.send(event).is_err() {
                debug!("Transport consumer for {} went away; stopping reader", peer);
                return;
            }
        }
    };

    let _ = tx.send(TransportEvent::Exited { error });
}
