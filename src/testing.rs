//! In-memory stand-ins for the external collaborators, used by unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{GatewayError, TransportError};
use crate::session::{Principal, SessionVerifier};
use crate::source::{BusSource, encode_record};
use crate::ws::transport::{InboundFrame, TransportSink, TransportStream};

/// What the gateway wrote to a mock peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outbound {
    Text(String),
    Close(u16),
}

struct MockSink {
    outbound: mpsc::UnboundedSender<Outbound>,
    fail_writes: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl TransportSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Io("connection reset".to_string()));
        }
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let _ = self.outbound.send(Outbound::Close(code));
        Ok(())
    }
}

struct MockStream {
    inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

#[async_trait]
impl TransportStream for MockStream {
    async fn next_frame(&mut self) -> Result<InboundFrame, TransportError> {
        self.inbound.recv().await.ok_or(TransportError::Closed)
    }
}

/// The client end of a mock transport.
pub(crate) struct MockPeer {
    outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: Option<mpsc::UnboundedSender<InboundFrame>>,
    fail_writes: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MockPeer {
    /// Sends a text frame to the gateway.
    pub(crate) fn send_text(&self, text: &str) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(InboundFrame::Text(text.to_string()));
        }
    }

    /// Closes the client side; the gateway's next receive fails.
    pub(crate) fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Makes every subsequent write from the gateway fail.
    pub(crate) fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Marks the transport as already closed, as if the socket went away.
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Next frame written by the gateway, if one is already buffered.
    pub(crate) fn try_outbound(&mut self) -> Option<Outbound> {
        self.outbound.try_recv().ok()
    }

    /// Waits up to `wait` for the next frame written by the gateway.
    pub(crate) async fn next_outbound(&mut self, wait: Duration) -> Option<Outbound> {
        tokio::time::timeout(wait, self.outbound.recv())
            .await
            .ok()
            .flatten()
    }

    /// Waits for the next non-heartbeat text frame and returns its topic.
    pub(crate) async fn next_published_topic(&mut self, wait: Duration) -> Option<String> {
        loop {
            let Outbound::Text(text) = self.next_outbound(wait).await? else {
                return None;
            };
            let value: Value = serde_json::from_str(&text).ok()?;
            let topic = value.get("topic")?.as_str()?.to_string();
            if topic != crate::domain::HEARTBEAT_TOPIC {
                return Some(topic);
            }
        }
    }

    /// Drains every buffered frame.
    pub(crate) fn drain(&mut self) -> Vec<Outbound> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

/// Builds a connected pair of transport halves and their client end.
pub(crate) fn mock_transport() -> (Box<dyn TransportSink>, Box<dyn TransportStream>, MockPeer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let fail_writes = Arc::new(AtomicBool::new(false));
    let closed = Arc::new(AtomicBool::new(false));
    let sink = MockSink {
        outbound: out_tx,
        fail_writes: Arc::clone(&fail_writes),
        closed: Arc::clone(&closed),
    };
    let stream = MockStream { inbound: in_rx };
    let peer = MockPeer {
        outbound: out_rx,
        inbound: Some(in_tx),
        fail_writes,
        closed,
    };
    (Box::new(sink), Box::new(stream), peer)
}

/// Verifier accepting a fixed set of tokens.
#[derive(Debug, Default)]
pub(crate) struct StaticVerifier {
    tokens: HashMap<String, Principal>,
}

impl StaticVerifier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_token(mut self, token: &str, login: &str) -> Self {
        self.tokens.insert(
            token.to_string(),
            Principal {
                id: login.to_string(),
                name: Some(login.to_string()),
                claims: Value::Null,
            },
        );
        self
    }
}

#[async_trait]
impl SessionVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token).cloned()
    }
}

/// Source fed by a [`ScriptFeed`]; yields scripted records and failures.
#[derive(Debug)]
pub(crate) struct ScriptedSource {
    items: mpsc::UnboundedReceiver<Result<String, GatewayError>>,
}

/// Producer side of a [`ScriptedSource`].
#[derive(Debug, Clone)]
pub(crate) struct ScriptFeed {
    items: mpsc::UnboundedSender<Result<String, GatewayError>>,
}

impl ScriptFeed {
    /// Queues a well-formed record for `topic`.
    pub(crate) fn record(&self, topic: &str, data: Value) {
        self.raw(&encode_record("site", "host", topic, data));
    }

    /// Queues a raw record, well-formed or not.
    pub(crate) fn raw(&self, raw: &str) {
        let _ = self.items.send(Ok(raw.to_string()));
    }

    /// Queues a source failure.
    pub(crate) fn fail(&self, message: &str) {
        let _ = self.items.send(Err(GatewayError::BusSource(message.to_string())));
    }
}

pub(crate) fn scripted_source() -> (ScriptedSource, ScriptFeed) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ScriptedSource { items: rx }, ScriptFeed { items: tx })
}

#[async_trait]
impl BusSource for ScriptedSource {
    async fn subscribe(&mut self, _channel: &str) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn next_message(&mut self, timeout: Duration) -> Result<Option<String>, GatewayError> {
        match tokio::time::timeout(timeout, self.items.recv()).await {
            Ok(Some(item)) => item.map(Some),
            Ok(None) => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }
}
