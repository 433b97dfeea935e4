//! Streaming client
//!
//! Connects, performs the subscription handshake, then runs the receive loop:
//! decode each frame and deliver it to every registered subscriber in
//! registration order. Stopping is cooperative and the client never
//! reconnects on its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::{SubscriberRegistry, SubscriptionId};
use super::transport::FeedTransport;
use super::{ConnectionState, Subscriber};
use crate::codec;
use crate::error::{FeedError, Result};
use crate::subscription::SubscriptionDescriptor;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Counters kept by the receive loop
#[derive(Default)]
struct Counters {
    frames_received: AtomicU64,
    records_dispatched: AtomicU64,
    frames_drained: AtomicU64,
    decode_failures: AtomicU64,
    delivery_faults: AtomicU64,
}

/// Point-in-time copy of a client's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Text frames taken off the wire after the handshake
    pub frames_received: u64,
    /// Records fanned out to the subscribers
    pub records_dispatched: u64,
    /// Frames discarded because no subscriber was registered
    pub frames_drained: u64,
    /// Frames skipped because they failed to decode
    pub decode_failures: u64,
    /// Subscriber callbacks that returned an error
    pub delivery_faults: u64,
}

/// Streaming client for one subscription against one endpoint.
///
/// The lifecycle is `Idle -> Connecting -> Subscribed -> Streaming`, ending
/// in `Closed`. A connect failure returns the client to `Idle` so the caller
/// may retry; every other exit is terminal.
pub struct FeedClient {
    endpoint: String,
    descriptor: SubscriptionDescriptor,
    connect_timeout: Duration,
    handshake_timeout: Duration,
    state: Mutex<ConnectionState>,
    cancel: CancellationToken,
    registry: SubscriberRegistry,
    counters: Counters,
}

impl FeedClient {
    pub fn new(endpoint: impl Into<String>, descriptor: SubscriptionDescriptor) -> Self {
        Self {
            endpoint: endpoint.into(),
            descriptor,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            state: Mutex::new(ConnectionState::Idle),
            cancel: CancellationToken::new(),
            registry: SubscriberRegistry::new(),
            counters: Counters::default(),
        }
    }

    /// Override the connect and handshake timeouts
    pub fn with_timeouts(mut self, connect: Duration, handshake: Duration) -> Self {
        self.connect_timeout = connect;
        self.handshake_timeout = handshake;
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn descriptor(&self) -> &SubscriptionDescriptor {
        &self.descriptor
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            frames_received: self.counters.frames_received.load(Ordering::Relaxed),
            records_dispatched: self.counters.records_dispatched.load(Ordering::Relaxed),
            frames_drained: self.counters.frames_drained.load(Ordering::Relaxed),
            decode_failures: self.counters.decode_failures.load(Ordering::Relaxed),
            delivery_faults: self.counters.delivery_faults.load(Ordering::Relaxed),
        }
    }

    /// Register a subscriber. Takes effect no later than the next record;
    /// a record already being dispatched is never delivered partially.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let id = self.registry.add(subscriber);
        debug!(id, total = self.registry.len(), "Subscriber registered");
        id
    }

    /// Remove a subscriber. Returns false for an unknown id. A subscriber
    /// removed mid-dispatch still receives the in-flight record.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            debug!(id, total = self.registry.len(), "Subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Request a cooperative stop. Never blocks and never fails; an in-flight
    /// record finishes dispatch before the loop exits. Repeated and
    /// concurrent calls are no-ops after the first.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                ConnectionState::Idle => {
                    debug!("Stop on idle client");
                    *state = ConnectionState::Closed;
                }
                ConnectionState::Stopping | ConnectionState::Closed => {}
                _ => *state = ConnectionState::Stopping,
            }
        }
        self.cancel.cancel();
    }

    /// Run on a fresh task, returning its join handle
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }

    /// Drive the connection until the transport fails or [`stop`] is called.
    ///
    /// Returns `Ok(())` only for a cooperative stop. On return the client is
    /// `Closed`, except after a connect failure which leaves it `Idle`.
    ///
    /// [`stop`]: FeedClient::stop
    pub async fn run(&self) -> Result<()> {
        self.begin_connect()?;

        info!(
            endpoint = %self.endpoint,
            channel = %self.descriptor.channel(),
            "Connecting to feed"
        );

        let mut transport =
            match timeout(self.connect_timeout, FeedTransport::connect(&self.endpoint))
                .await
            {
                Ok(Ok(transport)) => transport,
                Ok(Err(e)) => {
                    self.abort_connect();
                    return Err(e);
                }
                Err(_) => {
                    self.abort_connect();
                    return Err(FeedError::Connect(format!(
                        "no connection to {} within {:?}",
                        self.endpoint, self.connect_timeout
                    )));
                }
            };

        if self.cancel.is_cancelled() {
            // Stop arrived while the dial was in flight
            transport.close().await;
            self.set_state(ConnectionState::Closed);
            return Ok(());
        }

        if let Err(e) = self.handshake(&mut transport).await {
            transport.close().await;
            self.set_state(ConnectionState::Closed);
            return Err(e);
        }
        self.set_state(ConnectionState::Subscribed);

        if self.cancel.is_cancelled() {
            transport.close().await;
            self.set_state(ConnectionState::Closed);
            return Ok(());
        }

        self.set_state(ConnectionState::Streaming);
        info!(symbols = self.descriptor.symbols().len(), "Streaming started");

        let result = self.receive_loop(&mut transport).await;
        transport.close().await;
        self.set_state(ConnectionState::Closed);
        result
    }

    /// `Idle -> Connecting`, rejecting reuse and concurrent runs. Performs no
    /// transport I/O.
    fn begin_connect(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            ConnectionState::Idle => {
                *state = ConnectionState::Connecting;
                Ok(())
            }
            ConnectionState::Closed => Err(FeedError::AlreadyClosed),
            _ => Err(FeedError::AlreadyRunning),
        }
    }

    /// Roll back to `Idle` after a connect failure, unless a stop arrived in
    /// the meantime.
    fn abort_connect(&self) {
        let mut state = self.state.lock();
        match *state {
            ConnectionState::Stopping => *state = ConnectionState::Closed,
            _ => *state = ConnectionState::Idle,
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!(from = ?*state, to = ?next, "State transition");
            *state = next;
        }
    }

    /// Greeting, subscribe request, acknowledgement. Any failure here counts
    /// as a subscription rejection; the caller closes the transport.
    async fn handshake(&self, transport: &mut FeedTransport) -> Result<()> {
        // The server greets with a connection acknowledgement before any data
        let greeting = self.next_text(transport).await?;
        match codec::decode_ack(&greeting) {
            Ok(ack) => {
                debug!(status = %ack.status, resmsg = %ack.resmsg, "Feed greeting")
            }
            Err(_) => debug!(raw = %greeting, "Unrecognized greeting frame"),
        }

        let payload = codec::encode_subscribe(&self.descriptor).map_err(|e| {
            FeedError::SubscriptionRejected(format!(
                "failed to encode subscribe frame: {e}"
            ))
        })?;
        transport.send(payload).await.map_err(|e| {
            FeedError::SubscriptionRejected(format!(
                "failed to send subscribe frame: {e}"
            ))
        })?;

        let ack_raw = self.next_text(transport).await?;
        let ack = codec::decode_ack(&ack_raw)
            .map_err(|e| FeedError::SubscriptionRejected(e.to_string()))?;
        if !ack.is_success() {
            return Err(FeedError::SubscriptionRejected(format!(
                "status {}: {}",
                ack.status, ack.resmsg
            )));
        }

        info!(resmsg = %ack.resmsg, "Subscription acknowledged");
        Ok(())
    }

    /// Next text frame within the handshake timeout
    async fn next_text(&self, transport: &mut FeedTransport) -> Result<String> {
        let recv = async {
            loop {
                if let Some(text) = transport.recv().await? {
                    return Ok::<String, FeedError>(text);
                }
            }
        };

        match timeout(self.handshake_timeout, recv).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(FeedError::SubscriptionRejected(format!(
                "handshake failed: {e}"
            ))),
            Err(_) => Err(FeedError::SubscriptionRejected(format!(
                "no acknowledgement within {:?}",
                self.handshake_timeout
            ))),
        }
    }

    async fn receive_loop(&self, transport: &mut FeedTransport) -> Result<()> {
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Stop requested, closing stream");
                    return Ok(());
                }
                frame = transport.recv() => frame?,
            };
            let Some(text) = frame else { continue };
            self.counters.frames_received.fetch_add(1, Ordering::Relaxed);

            // Snapshot first so registrations land on record boundaries
            let subscribers = self.registry.snapshot();
            if subscribers.is_empty() {
                // Nobody listening; keep the connection drained
                self.counters.frames_drained.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let record = match codec::decode(&text) {
                Ok(record) => record,
                Err(e) => {
                    self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "Skipping undecodable frame");
                    continue;
                }
            };

            for (id, subscriber) in &subscribers {
                if let Err(e) = subscriber.on_record(&record).await {
                    self.counters.delivery_faults.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscriber = subscriber.name(),
                        id = *id,
                        error = %e,
                        "Delivery fault"
                    );
                }
            }
            self.counters.records_dispatched.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::StreamRecord;
    use crate::subscription::TickInterval;
    use async_trait::async_trait;

    fn descriptor() -> SubscriptionDescriptor {
        SubscriptionDescriptor::ticker(
            vec!["BTC_KRW".to_string()],
            vec![TickInterval::ThirtyMinute],
        )
        .unwrap()
    }

    // endpoint is never dialed in these tests
    fn client() -> FeedClient {
        FeedClient::new("ws://127.0.0.1:1", descriptor())
    }

    struct Noop;

    #[async_trait]
    impl Subscriber for Noop {
        async fn on_record(&self, _record: &StreamRecord) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_new_client_is_idle() {
        let client = client();
        assert_eq!(client.state(), ConnectionState::Idle);
        assert_eq!(client.stats(), FeedStats::default());
    }

    #[test]
    fn test_stop_on_idle_closes() {
        let client = client();
        client.stop();
        assert_eq!(client.state(), ConnectionState::Closed);
        client.stop();
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_run_after_closed_fails_without_io() {
        let client = client();
        client.stop();

        match client.run().await {
            Err(FeedError::AlreadyClosed) => {}
            other => panic!("expected AlreadyClosed, got {other:?}"),
        }
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let client = client();
        let a = client.subscribe(Arc::new(Noop));
        let b = client.subscribe(Arc::new(Noop));
        assert_ne!(a, b);
        assert_eq!(client.subscriber_count(), 2);

        assert!(client.unsubscribe(a));
        assert!(!client.unsubscribe(a));
        assert_eq!(client.subscriber_count(), 1);
        assert!(client.unsubscribe(b));
    }
}
