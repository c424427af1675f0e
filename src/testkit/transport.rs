//! Mock transport, inbound stream and handshake.
//!
//! - [`MockTransport`]: records sent messages and the close reason, with
//!   send-failure injection.
//! - [`ChannelInbound`]: inbound frames pushed from a [`ClientHandle`].
//! - [`MockHandshake`]: a pending upgrade that yields both of the above, or
//!   records the rejection reason.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::domain::{ClientMessage, CloseReason, ConnectionRequest, ServerMessage};
use crate::error::TransportError;
use crate::port::{Accepted, Handshake, InboundFrame, InboundStream, Transport};

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// Transport that keeps every sent message in memory.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<ServerMessage>>,
    fail_sends: AtomicBool,
    close_reason: Mutex<Option<CloseReason>>,
    close_calls: AtomicU32,
    changed: Notify,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A transport whose sends always fail.
    pub fn failing() -> Arc<Self> {
        let transport = Self::new();
        transport.set_failing(true);
        transport
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_sends.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<ServerMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_kinds(&self) -> Vec<&'static str> {
        self.sent.lock().iter().map(ServerMessage::kind).collect()
    }

    /// Reason passed to the first `close()` call.
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Wait until the transport is closed and return the reason.
    pub async fn wait_closed(&self) -> CloseReason {
        loop {
            let changed = self.changed.notified();
            if let Some(reason) = self.close_reason() {
                return reason;
            }
            changed.await;
        }
    }

    /// Wait until at least `count` messages were sent.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<ServerMessage> {
        loop {
            let changed = self.changed.notified();
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            changed.await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, message: &ServerMessage) -> Result<usize, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("injected send failure".to_string()));
        }
        let bytes = serde_json::to_string(message)
            .map_err(|e| TransportError::Send(e.to_string()))?
            .len();
        self.sent.lock().push(message.clone());
        self.changed.notify_waiters();
        Ok(bytes)
    }

    async fn close(&self, reason: CloseReason) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let mut slot = self.close_reason.lock();
        if slot.is_none() {
            *slot = Some(reason);
        }
        drop(slot);
        self.changed.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.close_reason.lock().is_some()
    }
}

// ---------------------------------------------------------------------------
// ChannelInbound
// ---------------------------------------------------------------------------

/// Inbound stream fed by a [`ClientHandle`]. Ends when the handle drops.
pub struct ChannelInbound {
    rx: mpsc::UnboundedReceiver<InboundFrame>,
}

/// Client side of a [`ChannelInbound`].
#[derive(Clone)]
pub struct ClientHandle {
    tx: mpsc::UnboundedSender<InboundFrame>,
}

impl ClientHandle {
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.tx.send(InboundFrame::Text(text.into()));
    }

    pub fn send_message(&self, message: &ClientMessage) {
        self.send_text(serde_json::to_string(message).expect("client message encodes"));
    }

    pub fn send_frame(&self, frame: InboundFrame) {
        let _ = self.tx.send(frame);
    }

    /// Send a normal close frame.
    pub fn close(&self) {
        let _ = self.tx.send(InboundFrame::Close(Some(CloseReason::Normal.code())));
    }
}

pub fn channel_inbound() -> (ChannelInbound, ClientHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelInbound { rx }, ClientHandle { tx })
}

#[async_trait]
impl InboundStream for ChannelInbound {
    async fn next_frame(&mut self) -> Option<InboundFrame> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// MockHandshake
// ---------------------------------------------------------------------------

/// Pending upgrade backed by a [`MockTransport`] and [`ChannelInbound`].
pub struct MockHandshake {
    request: ConnectionRequest,
    transport: Arc<MockTransport>,
    inbound: ChannelInbound,
    rejected: Arc<Mutex<Option<CloseReason>>>,
    fail_accept: bool,
}

/// What the test keeps to drive and observe a [`MockHandshake`].
pub struct MockClient {
    pub transport: Arc<MockTransport>,
    pub handle: ClientHandle,
    rejected: Arc<Mutex<Option<CloseReason>>>,
}

impl MockClient {
    /// Reason the handshake was rejected with, if it was.
    pub fn rejected(&self) -> Option<CloseReason> {
        *self.rejected.lock()
    }
}

impl MockHandshake {
    /// Make `accept()` fail as if the upgrade broke.
    #[must_use]
    pub fn failing_accept(mut self) -> Self {
        self.fail_accept = true;
        self
    }
}

pub fn mock_handshake(request: ConnectionRequest) -> (MockHandshake, MockClient) {
    let transport = MockTransport::new();
    let (inbound, handle) = channel_inbound();
    let rejected = Arc::new(Mutex::new(None));
    (
        MockHandshake {
            request,
            transport: Arc::clone(&transport),
            inbound,
            rejected: Arc::clone(&rejected),
            fail_accept: false,
        },
        MockClient {
            transport,
            handle,
            rejected,
        },
    )
}

#[async_trait]
impl Handshake for MockHandshake {
    fn request(&self) -> &ConnectionRequest {
        &self.request
    }

    async fn accept(self) -> Result<Accepted, TransportError> {
        if self.fail_accept {
            return Err(TransportError::Handshake("injected accept failure".to_string()));
        }
        Ok(Accepted {
            transport: self.transport,
            inbound: Box::new(self.inbound),
        })
    }

    async fn reject(self, reason: CloseReason) {
        *self.rejected.lock() = Some(reason);
    }
}
