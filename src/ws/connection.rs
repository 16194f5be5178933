//! One connected peer and its authorization state.
//!
//! A [`Connection`] is shared between two tasks: the peer's own task, which
//! drives [`Connection::receive`] and [`Connection::authorize`], and the
//! delivery loop, which calls [`Connection::send`] and, when purging,
//! [`Connection::close`]. The two transport halves sit behind separate
//! locks so a parked `receive` never blocks delivery.
//!
//! # Validity
//!
//! A connection is valid while it is not disconnected and is either
//! authorized or younger than its grace period. Nothing times an
//! unauthorized connection out eagerly; the next purge removes it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::messages::ClientFrame;
use super::transport::{InboundFrame, NORMAL_CLOSURE, TransportSink, TransportStream};
use crate::domain::{ConnectionId, Frame, TopicSet};
use crate::error::TransportError;
use crate::session::{Principal, SessionVerifier};

/// Topic announcing that a gateway process (re)started.
pub const SERVER_STARTED_TOPIC: &str = "server.started";

/// Topics every authorized, non-wildcard connection receives.
pub const ALWAYS_SUBSCRIBE: &[&str] = &[SERVER_STARTED_TOPIC];

/// Outcome of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The frame was written to the transport.
    Sent,
    /// Not attempted: unauthorized or invalid connection.
    Skipped,
    /// The write failed; the connection is now disconnected.
    Failed,
}

#[derive(Debug, Default)]
struct Subscription {
    topics: TopicSet,
    principal: Option<Principal>,
}

/// Server-side state of one peer.
pub struct Connection {
    id: ConnectionId,
    sink: Mutex<Box<dyn TransportSink>>,
    stream: Mutex<Box<dyn TransportStream>>,
    subscription: RwLock<Subscription>,
    authorized: AtomicBool,
    gone: CancellationToken,
    created_at: Instant,
    grace_period: Duration,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("authorized", &self.is_authorized())
            .field("disconnected", &self.is_disconnected())
            .field("age", &self.created_at.elapsed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wraps a freshly accepted transport.
    #[must_use]
    pub fn new(
        sink: Box<dyn TransportSink>,
        stream: Box<dyn TransportStream>,
        grace_period: Duration,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            subscription: RwLock::new(Subscription::default()),
            authorized: AtomicBool::new(false),
            gone: CancellationToken::new(),
            created_at: Instant::now(),
            grace_period,
        }
    }

    /// Unique id of this connection.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Instant the transport was accepted.
    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Whether a valid token has been presented.
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::Acquire)
    }

    /// Whether the transport has failed or been closed.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.gone.is_cancelled()
    }

    /// Resolves once the connection is disconnected or closed by the server.
    pub async fn disconnected(&self) {
        self.gone.cancelled().await;
    }

    /// Not disconnected, and either authorized or still within the grace period.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.is_disconnected() {
            return false;
        }
        self.is_authorized() || self.created_at.elapsed() < self.grace_period
    }

    /// Flags the transport as gone. Never reset.
    pub fn mark_disconnected(&self) {
        self.gone.cancel();
    }

    /// Principal recorded by the last successful authorization.
    pub async fn principal(&self) -> Option<Principal> {
        self.subscription.read().await.principal.clone()
    }

    /// Current subscriptions.
    pub async fn topics(&self) -> TopicSet {
        self.subscription.read().await.topics.clone()
    }

    /// Returns `true` if any subscription matches `topic`.
    pub async fn matches(&self, topic: &str) -> bool {
        self.subscription.read().await.topics.matches(topic)
    }

    /// Verifies `token` and, on success, records the principal and replaces
    /// the subscriptions with `requested` plus [`ALWAYS_SUBSCRIBE`] (or
    /// exactly `"*"` if requested).
    ///
    /// On failure nothing changes and the client may retry. A disconnected
    /// connection is never authorized.
    pub async fn authorize(
        &self,
        verifier: &dyn SessionVerifier,
        token: Option<&str>,
        requested: Vec<String>,
    ) -> bool {
        if self.is_disconnected() {
            return false;
        }
        let Some(token) = token else {
            tracing::debug!(conn_id = %self.id, "auth frame without token");
            return false;
        };
        let Some(principal) = verifier.verify(token).await else {
            tracing::debug!(conn_id = %self.id, "authorization rejected");
            return false;
        };

        let topics = TopicSet::granted(requested, ALWAYS_SUBSCRIBE);
        tracing::info!(
            conn_id = %self.id,
            user = principal.display_name(),
            topics = ?topics.as_slice(),
            "connection authorized"
        );
        {
            let mut subscription = self.subscription.write().await;
            subscription.topics = topics;
            subscription.principal = Some(principal);
        }
        self.authorized.store(true, Ordering::Release);
        true
    }

    /// Writes `frame` to the peer.
    ///
    /// Skipped when `auth_only` is set and the connection is unauthorized,
    /// or when the connection is no longer valid. A failed write marks the
    /// connection disconnected and is reported as [`Delivery::Failed`];
    /// it is never propagated.
    pub async fn send(&self, frame: &Frame, auth_only: bool) -> Delivery {
        if auth_only && !self.is_authorized() {
            return Delivery::Skipped;
        }
        if !self.is_valid() {
            return Delivery::Skipped;
        }

        let result = self.sink.lock().await.send_text(frame.text().to_string()).await;
        match result {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                self.mark_disconnected();
                tracing::debug!(conn_id = %self.id, error = %e, "send failed; marking disconnected");
                Delivery::Failed
            }
        }
    }

    /// Waits for the next client frame.
    ///
    /// Returns `Ok(None)` for frames that are not well-formed control
    /// frames; those are dropped without affecting the connection.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportError`] once the peer is gone; the connection
    /// is marked disconnected first.
    pub async fn receive(&self) -> Result<Option<ClientFrame>, TransportError> {
        let next = self.stream.lock().await.next_frame().await;
        match next {
            Ok(InboundFrame::Text(text)) => {
                let frame = ClientFrame::parse(&text);
                if frame.is_none() {
                    tracing::debug!(conn_id = %self.id, "dropping malformed client frame");
                }
                Ok(frame)
            }
            Ok(InboundFrame::Other) => Ok(None),
            Err(e) => {
                self.mark_disconnected();
                Err(e)
            }
        }
    }

    /// Closes the transport with a normal-closure code. The connection is
    /// disconnected afterwards whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the transport was already closed;
    /// callers purging stale connections ignore it.
    pub async fn close(&self) -> Result<(), TransportError> {
        let result = self.sink.lock().await.close(NORMAL_CLOSURE).await;
        self.mark_disconnected();
        result
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Envelope;
    use crate::testing::{Outbound, StaticVerifier, mock_transport};

    const GRACE: Duration = Duration::from_secs(3);

    fn frame(topic: &str) -> Frame {
        let raw = format!(r#"[1, "site", "host", "{topic}", {{}}]"#);
        let Ok(envelope) = Envelope::decode(&raw) else {
            panic!("bad test record");
        };
        let Ok(frame) = envelope.encode() else {
            panic!("encode failed");
        };
        frame
    }

    fn verifier() -> StaticVerifier {
        StaticVerifier::new().with_token("good", "editor")
    }

    #[tokio::test]
    async fn authorize_records_topics_and_principal() {
        let (sink, stream, _peer) = mock_transport();
        let conn = Connection::new(sink, stream, GRACE);

        assert!(
            conn.authorize(&verifier(), Some("good"), vec!["objects".to_string()])
                .await
        );
        assert!(conn.is_authorized());
        assert_eq!(
            conn.topics().await.as_slice(),
            &["objects".to_string(), SERVER_STARTED_TOPIC.to_string()]
        );
        let Some(principal) = conn.principal().await else {
            panic!("principal missing");
        };
        assert_eq!(principal.display_name(), "editor");
    }

    #[tokio::test]
    async fn wildcard_authorization_collapses_topics() {
        let (sink, stream, _peer) = mock_transport();
        let conn = Connection::new(sink, stream, GRACE);
        let requested = vec!["objects".to_string(), "*".to_string()];
        assert!(conn.authorize(&verifier(), Some("good"), requested).await);
        assert!(conn.topics().await.is_wildcard());
    }

    #[tokio::test]
    async fn failed_authorization_changes_nothing() {
        let (sink, stream, _peer) = mock_transport();
        let conn = Connection::new(sink, stream, GRACE);
        assert!(
            !conn
                .authorize(&verifier(), Some("bad"), vec!["*".to_string()])
                .await
        );
        assert!(!conn.authorize(&verifier(), None, vec!["*".to_string()]).await);
        assert!(!conn.is_authorized());
        assert!(conn.topics().await.is_empty());
        assert!(conn.principal().await.is_none());
    }

    #[tokio::test]
    async fn send_requires_authorization_by_default() {
        let (sink, stream, mut peer) = mock_transport();
        let conn = Connection::new(sink, stream, GRACE);

        assert_eq!(conn.send(&frame("objects"), true).await, Delivery::Skipped);
        assert!(peer.try_outbound().is_none());

        assert_eq!(conn.send(&frame("objects"), false).await, Delivery::Sent);
        assert!(matches!(peer.try_outbound(), Some(Outbound::Text(_))));
    }

    #[tokio::test]
    async fn authorized_send_writes_frame_text() {
        let (sink, stream, mut peer) = mock_transport();
        let conn = Connection::new(sink, stream, GRACE);
        assert!(conn.authorize(&verifier(), Some("good"), vec![]).await);

        let f = frame("objects");
        assert_eq!(conn.send(&f, true).await, Delivery::Sent);
        assert_eq!(peer.try_outbound(), Some(Outbound::Text(f.text().to_string())));
    }

    #[tokio::test]
    async fn write_failure_marks_disconnected() {
        let (sink, stream, peer) = mock_transport();
        let conn = Connection::new(sink, stream, GRACE);
        assert!(conn.authorize(&verifier(), Some("good"), vec![]).await);

        peer.fail_writes();
        assert_eq!(conn.send(&frame("objects"), true).await, Delivery::Failed);
        assert!(conn.is_disconnected());
        assert!(!conn.is_valid());
        assert_eq!(conn.send(&frame("objects"), true).await, Delivery::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_connection_expires_after_grace_period() {
        let (sink, stream, _peer) = mock_transport();
        let conn = Connection::new(sink, stream, GRACE);
        assert!(conn.is_valid());

        tokio::time::advance(Duration::from_millis(2_900)).await;
        assert!(conn.is_valid());

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(!conn.is_valid());
        assert_eq!(conn.send(&frame("objects"), false).await, Delivery::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn authorized_connection_outlives_grace_period() {
        let (sink, stream, _peer) = mock_transport();
        let conn = Connection::new(sink, stream, GRACE);
        assert!(conn.authorize(&verifier(), Some("good"), vec![]).await);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(conn.is_valid());
    }

    #[tokio::test]
    async fn receive_parses_and_drops_malformed_frames() {
        let (sink, stream, peer) = mock_transport();
        let conn = Connection::new(sink, stream, GRACE);

        peer.send_text("garbage");
        peer.send_text(r#"{"topic":"auth","token":"good","subscribe":["*"]}"#);

        let Ok(None) = conn.receive().await else {
            panic!("malformed frame must be dropped");
        };
        let Ok(Some(ClientFrame::Auth(req))) = conn.receive().await else {
            panic!("expected auth frame");
        };
        assert_eq!(req.subscribe, vec!["*".to_string()]);
        assert!(!conn.is_disconnected());
    }

    #[tokio::test]
    async fn receive_reports_hang_up() {
        let (sink, stream, mut peer) = mock_transport();
        let conn = Connection::new(sink, stream, GRACE);
        peer.hang_up();
        assert_eq!(conn.receive().await, Err(TransportError::Closed));
        assert!(conn.is_disconnected());
    }

    #[tokio::test]
    async fn close_uses_normal_closure_and_errors_when_repeated() {
        let (sink, stream, mut peer) = mock_transport();
        let conn = Connection::new(sink, stream, GRACE);
        assert!(conn.close().await.is_ok());
        assert_eq!(peer.try_outbound(), Some(Outbound::Close(NORMAL_CLOSURE)));
        assert!(conn.close().await.is_err());
    }

    #[tokio::test]
    async fn closed_connection_cannot_be_authorized() {
        let (sink, stream, _peer) = mock_transport();
        let conn = Connection::new(sink, stream, GRACE);
        assert!(conn.close().await.is_ok());

        assert!(conn.is_disconnected());
        tokio::time::timeout(Duration::from_secs(1), conn.disconnected())
            .await
            .unwrap_or_else(|_| panic!("disconnected() must resolve after close"));
        assert!(!conn.authorize(&verifier(), Some("good"), vec![]).await);
        assert!(!conn.is_authorized());
    }
}
