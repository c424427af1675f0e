//! WebSocket server over `tokio-tungstenite`.
//!
//! Each accepted TCP stream is upgraded, its upgrade request captured as a
//! [`ConnectionRequest`], and the result handed to the
//! [`ConnectionManager`] as a [`WsHandshake`]. Rejection happens after the
//! upgrade so that the client receives a WebSocket close code.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::request::parse_request;
use crate::application::manager::ConnectionManager;
use crate::domain::{CloseReason, ConnectionRequest, ServerMessage};
use crate::error::{Result, TransportError};
use crate::port::{Accepted, Handshake, InboundFrame, InboundStream, Transport};

type Socket = WebSocketStream<TcpStream>;

fn close_frame(reason: CloseReason) -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::from(reason.code()),
        reason: reason.description().into(),
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Accept loop feeding upgraded sockets to the connection manager.
pub struct WsServer {
    listener: TcpListener,
    manager: Arc<ConnectionManager>,
}

impl WsServer {
    /// Bind to `server.bind_address` of the manager's configuration.
    pub async fn bind(manager: Arc<ConnectionManager>) -> Result<Self> {
        let listener = TcpListener::bind(&manager.config().bind_address).await?;
        Ok(Self { listener, manager })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        info!(%addr, "WebSocket server listening");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve_socket(Arc::clone(&self.manager), stream, peer));
                    }
                    Err(e) => warn!(error = %e, "Failed to accept TCP connection"),
                },
            }
        }

        info!(%addr, "WebSocket server stopped");
        Ok(())
    }
}

async fn serve_socket(manager: Arc<ConnectionManager>, stream: TcpStream, peer: SocketAddr) {
    let config = manager.config();
    let handshake = match upgrade(
        stream,
        peer,
        config.trust_forwarded_for,
        config.outbound_buffer,
    )
    .await
    {
        Ok(handshake) => handshake,
        Err(e) => {
            debug!(%peer, error = %e, "WebSocket upgrade failed");
            return;
        }
    };

    match manager.handle(handshake).await {
        Ok(id) => debug!(%peer, connection_id = %id, "Connection ended"),
        Err(e) => debug!(%peer, error = %e, "Connection refused"),
    }
}

async fn upgrade(
    stream: TcpStream,
    peer: SocketAddr,
    trust_forwarded_for: bool,
    outbound_buffer: usize,
) -> std::result::Result<WsHandshake, TransportError> {
    let mut captured: Option<ConnectionRequest> = None;
    let callback =
        |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
            captured = Some(parse_request(request, peer, trust_forwarded_for));
            Ok(response)
        };
    let socket = accept_hdr_async(stream, callback)
        .await
        .map_err(|e| TransportError::Handshake(e.to_string()))?;

    let request = captured.unwrap_or_else(|| ConnectionRequest::new(peer.ip().to_string()));
    Ok(WsHandshake {
        request,
        socket,
        outbound_buffer,
    })
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// An upgraded socket awaiting the manager's admission decision.
pub struct WsHandshake {
    request: ConnectionRequest,
    socket: Socket,
    outbound_buffer: usize,
}

#[async_trait]
impl Handshake for WsHandshake {
    fn request(&self) -> &ConnectionRequest {
        &self.request
    }

    async fn accept(self) -> std::result::Result<Accepted, TransportError> {
        let (sink, stream) = self.socket.split();
        Ok(Accepted {
            transport: Arc::new(WsTransport::spawn(sink, self.outbound_buffer)),
            inbound: Box::new(WsInbound { stream }),
        })
    }

    async fn reject(mut self, reason: CloseReason) {
        if let Err(e) = self.socket.close(Some(close_frame(reason))).await {
            debug!(error = %e, "Failed to send rejection close frame");
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

enum Outbound {
    Text(String),
    Close(CloseReason),
}

/// Write half: messages are queued to a writer task.
///
/// A full queue fails the send, so a slow client is dropped instead of
/// stalling fan-out.
pub struct WsTransport {
    tx: mpsc::Sender<Outbound>,
    close_requested: AtomicBool,
    dead: Arc<AtomicBool>,
}

impl WsTransport {
    fn spawn(sink: SplitSink<Socket, Message>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let dead = Arc::new(AtomicBool::new(false));
        tokio::spawn(write_loop(sink, rx, Arc::clone(&dead)));
        Self {
            tx,
            close_requested: AtomicBool::new(false),
            dead,
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<Socket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    dead: Arc<AtomicBool>,
) {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Text(text) => {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    debug!(error = %e, "WebSocket write failed");
                    break;
                }
            }
            Outbound::Close(reason) => {
                let _ = sink.send(Message::Close(Some(close_frame(reason)))).await;
                let _ = sink.close().await;
                break;
            }
        }
    }
    dead.store(true, Ordering::SeqCst);
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, message: &ServerMessage) -> std::result::Result<usize, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let text = serde_json::to_string(message).map_err(|e| TransportError::Send(e.to_string()))?;
        let bytes = text.len();
        self.tx.try_send(Outbound::Text(text)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                TransportError::Send("outbound buffer full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })?;
        trace!(kind = message.kind(), bytes, "Queued message");
        Ok(bytes)
    }

    async fn close(&self, reason: CloseReason) {
        if self.close_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(Outbound::Close(reason)).await;
    }

    fn is_closed(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
            || self.dead.load(Ordering::SeqCst)
            || self.tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Read half of an accepted socket.
pub struct WsInbound {
    stream: SplitStream<Socket>,
}

#[async_trait]
impl InboundStream for WsInbound {
    async fn next_frame(&mut self) -> Option<InboundFrame> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => {
                    debug!(error = %e, "WebSocket read failed");
                    return None;
                }
            };
            let frame = match message {
                Message::Text(text) => InboundFrame::Text(text),
                Message::Binary(data) => InboundFrame::Binary(data.len()),
                Message::Ping(data) | Message::Pong(data) => InboundFrame::Control(data.len()),
                Message::Close(frame) => InboundFrame::Close(frame.map(|f| u16::from(f.code))),
                Message::Frame(_) => continue,
            };
            return Some(frame);
        }
    }
}
