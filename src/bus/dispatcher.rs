//! The delivery loop.
//!
//! One task reads the shared channel and fans every envelope out to the
//! matching connections. Fan-out of one envelope finishes before the next
//! record is read, so each connection sees envelopes in channel order. The
//! price is head-of-line blocking: a stalled peer delays the peers served
//! after it. `max_concurrent_sends` lets up to that many sends of one
//! fan-out overlap without giving up the per-connection ordering.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{StreamExt, future, stream};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::ConnectionRegistry;
use crate::config::BusConfig;
use crate::domain::Envelope;
use crate::error::GatewayError;
use crate::source::BusSource;
use crate::ws::Delivery;

pub(crate) struct DeliveryLoop {
    registry: Arc<ConnectionRegistry>,
    source: Box<dyn BusSource>,
    config: BusConfig,
    cancel: CancellationToken,
    last_delivery: Instant,
}

impl DeliveryLoop {
    pub(crate) fn new(
        registry: Arc<ConnectionRegistry>,
        source: Box<dyn BusSource>,
        config: BusConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            source,
            config,
            cancel,
            last_delivery: Instant::now(),
        }
    }

    /// Runs until cancellation is observed.
    pub(crate) async fn run(mut self) {
        if !self.subscribe().await {
            return;
        }
        tracing::info!(channel = %self.config.channel, "delivery loop started");
        self.last_delivery = Instant::now();

        while !self.cancel.is_cancelled() {
            let result = self.iterate().await;
            // Stale connections go even while the source is failing.
            self.registry.purge().await;
            if let Err(e) = result {
                tracing::error!(error = %e, "delivery iteration failed");
                self.pause(self.config.error_backoff).await;
            }
        }
        tracing::warn!(channel = %self.config.channel, "delivery loop stopped");
    }

    /// Subscribes to the channel, retrying until it succeeds or the loop
    /// is cancelled. Returns `false` on cancellation.
    async fn subscribe(&mut self) -> bool {
        while !self.cancel.is_cancelled() {
            match self.source.subscribe(&self.config.channel).await {
                Ok(()) => return true,
                Err(e) => {
                    tracing::error!(channel = %self.config.channel, error = %e, "subscribe failed");
                    self.pause(self.config.error_backoff).await;
                }
            }
        }
        false
    }

    async fn iterate(&mut self) -> Result<(), GatewayError> {
        let next = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(()),
            next = self.source.next_message(self.config.poll_timeout) => next?,
        };

        let envelope = match next {
            Some(raw) => Some(Envelope::decode(&raw)?),
            None if self.last_delivery.elapsed() > self.config.idle_threshold => {
                Some(Envelope::Heartbeat)
            }
            None => {
                self.pause(self.config.idle_yield).await;
                None
            }
        };

        if let Some(envelope) = envelope {
            self.last_delivery = Instant::now();
            let recipients = self.fan_out(&envelope).await?;
            tracing::trace!(topic = envelope.topic(), recipients, "envelope delivered");
        }
        Ok(())
    }

    /// Sends `envelope` to every matching connection of a registry snapshot.
    /// Returns the number of successful sends.
    async fn fan_out(&self, envelope: &Envelope) -> Result<usize, GatewayError> {
        let frame = envelope.encode()?;
        let frame = &frame;
        let snapshot = self.registry.snapshot().await;

        let sent = stream::iter(snapshot)
            .map(|connection| async move {
                if connection.matches(frame.topic()).await {
                    connection.send(frame, true).await
                } else {
                    Delivery::Skipped
                }
            })
            .buffer_unordered(self.config.max_concurrent_sends.max(1))
            .filter(|delivery| future::ready(*delivery == Delivery::Sent))
            .count()
            .await;
        Ok(sent)
    }

    /// Sleeps for `duration`, waking early on cancellation.
    async fn pause(&self, duration: Duration) {
        tokio::select! {
            () = self.cancel.cancelled() => {}
            () = tokio::time::sleep(duration) => {}
        }
    }
}
