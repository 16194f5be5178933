//! Message-framed transport halves owned by a connection.
//!
//! A peer's socket is split into an outbound [`TransportSink`] and an
//! inbound [`TransportStream`] so the delivery loop can write while the
//! connection's own task is parked waiting for the next client frame.
//! [`WsSink`] and [`WsStream`] adapt an Axum [`WebSocket`].

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use crate::error::TransportError;

/// WebSocket "normal closure" code.
pub const NORMAL_CLOSURE: u16 = 1000;

/// One inbound frame as seen by the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A text frame.
    Text(String),
    /// Binary, ping or pong frames; not part of the protocol.
    Other,
}

/// Outbound half of a transport.
#[async_trait]
pub trait TransportSink: Send {
    /// Writes one text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the peer is gone or the write fails.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Sends a close frame with `code` and closes the outbound half.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the transport was already closed.
    async fn close(&mut self, code: u16) -> Result<(), TransportError>;
}

/// Inbound half of a transport.
#[async_trait]
pub trait TransportStream: Send {
    /// Suspends until the peer sends the next frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] when the peer closed the
    /// connection and [`TransportError::Io`] on read failures.
    async fn next_frame(&mut self) -> Result<InboundFrame, TransportError>;
}

/// Outbound half of an Axum WebSocket.
#[derive(Debug)]
pub struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

/// Inbound half of an Axum WebSocket.
#[derive(Debug)]
pub struct WsStream {
    inner: SplitStream<WebSocket>,
}

/// Splits an accepted socket into its two halves.
#[must_use]
pub fn split(socket: WebSocket) -> (WsSink, WsStream) {
    let (inner_sink, inner_stream) = socket.split();
    (
        WsSink { inner: inner_sink },
        WsStream {
            inner: inner_stream,
        },
    )
}

#[async_trait]
impl TransportSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::text(text))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code,
            reason: Utf8Bytes::from_static(""),
        };
        self.inner
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|_| TransportError::Closed)?;
        self.inner.close().await.map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl TransportStream for WsStream {
    async fn next_frame(&mut self) -> Result<InboundFrame, TransportError> {
        match self.inner.next().await {
            Some(Ok(Message::Text(text))) => Ok(InboundFrame::Text(text.to_string())),
            Some(Ok(Message::Close(_))) | None => Err(TransportError::Closed),
            Some(Ok(_)) => Ok(InboundFrame::Other),
            Some(Err(e)) => Err(TransportError::Io(e.to_string())),
        }
    }
}
