//! Broadcast hub
//!
//! Registry of live observer connections plus a fan-out publish.
//!
//! Each registered connection gets its own bounded queue drained by a
//! dedicated forwarder task, so:
//! - one slow or broken connection never blocks delivery to the others
//! - messages reach a given connection in publish-call order
//! - `publish` itself never waits on the network and never fails
//!
//! A connection whose queue is full has the overflowing messages dropped.

use aarc_common::events::AarcEvent;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Server-assigned observer connection identifier
pub type ConnectionId = u64;

/// Messages buffered per connection before new ones are dropped
pub const OBSERVER_QUEUE_CAPACITY: usize = 256;

/// Delivery failure on one observer connection
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// A live connection that accepts serialized messages and may fail
#[async_trait]
pub trait ObserverSink: Send + Sync + 'static {
    /// Whether the transport is still in a ready/open state
    fn is_open(&self) -> bool;

    /// Deliver one serialized envelope
    async fn send_text(&self, message: Arc<str>) -> Result<(), SinkError>;
}

struct Connection {
    tx: mpsc::Sender<Arc<str>>,
    sink: Arc<dyn ObserverSink>,
    forwarder: JoinHandle<()>,
}

struct HubInner {
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, Connection>,
}

/// Cheaply cloneable handle to the shared hub
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                next_id: AtomicU64::new(1),
                connections: DashMap::new(),
            }),
        }
    }

    /// Add a connection and start its forwarder; returns a fresh id
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register(&self, sink: Arc<dyn ObserverSink>) -> ConnectionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::channel::<Arc<str>>(OBSERVER_QUEUE_CAPACITY);

        let forward_sink = Arc::clone(&sink);
        let forwarder = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if !forward_sink.is_open() {
                    debug!(connection_id = id, "Observer not open, dropping message");
                    continue;
                }
                if let Err(e) = forward_sink.send_text(message).await {
                    warn!(connection_id = id, error = %e, "Observer delivery failed");
                }
            }
        });

        self.inner.connections.insert(
            id,
            Connection {
                tx,
                sink,
                forwarder,
            },
        );
        info!(
            connection_id = id,
            observers = self.inner.connections.len(),
            "Observer registered"
        );
        id
    }

    /// Remove and release a connection; returns whether it was present
    pub fn unregister(&self, id: ConnectionId) -> bool {
        match self.inner.connections.remove(&id) {
            Some((_, connection)) => {
                connection.forwarder.abort();
                info!(
                    connection_id = id,
                    observers = self.inner.connections.len(),
                    "Observer unregistered"
                );
                true
            }
            None => false,
        }
    }

    /// Serialize `event` once and queue it for every registered connection
    ///
    /// Returns the number of connections the message was queued for. Zero
    /// observers is a no-op.
    pub fn publish(&self, event: &AarcEvent) -> usize {
        if self.inner.connections.is_empty() {
            return 0;
        }

        let message: Arc<str> = match event.to_json() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(event = event.event_type(), error = %e, "Failed to serialize event");
                return 0;
            }
        };

        let mut queued = 0;
        for entry in self.inner.connections.iter() {
            let connection = entry.value();
            if !connection.sink.is_open() {
                debug!(connection_id = *entry.key(), "Skipping observer that is not open");
                continue;
            }
            match connection.tx.try_send(Arc::clone(&message)) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        connection_id = *entry.key(),
                        capacity = OBSERVER_QUEUE_CAPACITY,
                        event = event.event_type(),
                        "Observer queue full, dropping message"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(connection_id = *entry.key(), "Observer forwarder has stopped");
                }
            }
        }

        debug!(event = event.event_type(), observers = queued, "Event published");
        queued
    }

    /// Number of registered connections
    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aarc_common::events::{JobStatus, JobStatusUpdate};
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    struct ChannelSink {
        open: AtomicBool,
        tx: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl ObserverSink for ChannelSink {
        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        async fn send_text(&self, message: Arc<str>) -> Result<(), SinkError> {
            self.tx
                .send(message.to_string())
                .map_err(|_| SinkError::Closed)
        }
    }

    fn event(progress: u8) -> AarcEvent {
        AarcEvent::JobStatusUpdate(JobStatusUpdate {
            id: uuid::Uuid::nil(),
            status: JobStatus::Running,
            progress,
            progress_label: String::new(),
        })
    }

    #[tokio::test]
    async fn publish_without_observers_is_noop() {
        let hub = BroadcastHub::new();
        assert_eq!(hub.publish(&event(1)), 0);
    }

    #[tokio::test]
    async fn register_assigns_distinct_ids_and_unregister_is_idempotent() {
        let hub = BroadcastHub::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let sink = Arc::new(ChannelSink {
            open: AtomicBool::new(true),
            tx,
        });
        let a = hub.register(sink.clone());
        let b = hub.register(sink);
        assert_ne!(a, b);
        assert_eq!(hub.connection_count(), 2);

        assert!(hub.unregister(a));
        assert!(!hub.unregister(a));
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn closed_sink_is_skipped() {
        let hub = BroadcastHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(Arc::new(ChannelSink {
            open: AtomicBool::new(false),
            tx,
        }));

        assert_eq!(hub.publish(&event(1)), 0);
        let received = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(received.is_err(), "closed sink must not receive messages");
    }

    struct StalledSink;

    #[async_trait]
    impl ObserverSink for StalledSink {
        fn is_open(&self) -> bool {
            true
        }

        async fn send_text(&self, _message: Arc<str>) -> Result<(), SinkError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_observer_queue_is_bounded() {
        let hub = BroadcastHub::new();
        hub.register(Arc::new(StalledSink));
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(Arc::new(ChannelSink {
            open: AtomicBool::new(true),
            tx,
        }));

        const BATCH: usize = 50;
        let total = OBSERVER_QUEUE_CAPACITY + 2 * BATCH;
        let mut queued = 0;
        let mut received = Vec::new();
        for batch in 0..total / BATCH {
            for i in 0..BATCH {
                queued += hub.publish(&event(((batch * BATCH + i) % 100) as u8));
            }
            for _ in 0..BATCH {
                let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                    .await
                    .expect("healthy observer starved by stalled one")
                    .unwrap();
                received.push(message);
            }
        }

        // The stalled forwarder holds at most one message outside its queue
        assert!(queued <= total + OBSERVER_QUEUE_CAPACITY + 1);
        assert_eq!(received.len(), total);
        let expected: Vec<String> = (0..total)
            .map(|i| event((i % 100) as u8).to_json().unwrap())
            .collect();
        assert_eq!(received, expected);
    }
}
