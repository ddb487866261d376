//! Change-event publisher with a lazily established, shared connection.
//!
//! The connection moves through `Idle -> Connecting -> Ready`. Callers that
//! arrive while an attempt is in flight await the same attempt. A failed
//! connect, or a failed send on a ready connection, returns the publisher to
//! `Idle` so the next call starts over.

use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::counter;
use serde::Serialize;
use tracing::{debug, warn};

use crate::util::lock::lock;

use super::bus::{BusConnection, BusConnector, BusError};

pub(crate) const METRIC_EVENTS_PUBLISHED: &str = "taskflow_events_published_total";
pub(crate) const METRIC_EVENTS_PUBLISH_FAILED: &str = "taskflow_events_publish_failed_total";

const SOURCE: &str = "events::publisher";

type ConnectAttempt = Shared<BoxFuture<'static, Result<Arc<dyn BusConnection>, BusError>>>;

enum ConnectionState {
    Idle,
    Connecting(ConnectAttempt),
    Ready(Arc<dyn BusConnection>),
}

/// Observable phase of the publisher connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    Idle,
    Connecting,
    Ready,
}

pub struct EventPublisher {
    connector: Arc<dyn BusConnector>,
    state: Mutex<ConnectionState>,
}

impl EventPublisher {
    pub fn new(connector: Arc<dyn BusConnector>) -> Self {
        Self {
            connector,
            state: Mutex::new(ConnectionState::Idle),
        }
    }

    pub fn state(&self) -> PublisherState {
        match &*lock(&self.state, SOURCE, "state") {
            ConnectionState::Idle => PublisherState::Idle,
            ConnectionState::Connecting(_) => PublisherState::Connecting,
            ConnectionState::Ready(_) => PublisherState::Ready,
        }
    }

    /// Serializes `message` as JSON and sends it on `channel`.
    pub async fn publish<M>(&self, channel: &str, message: &M) -> Result<(), BusError>
    where
        M: Serialize + Sync + ?Sized,
    {
        let payload = serde_json::to_string(message).map_err(|err| {
            counter!(METRIC_EVENTS_PUBLISH_FAILED, "channel" => channel.to_string()).increment(1);
            BusError::Encode(err.to_string())
        })?;
        self.publish_raw(channel, &payload).await
    }

    /// Sends an already-encoded payload on `channel`.
    pub async fn publish_raw(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        let result = self.send(channel, payload).await;
        match &result {
            Ok(()) => {
                counter!(METRIC_EVENTS_PUBLISHED, "channel" => channel.to_string()).increment(1);
                debug!(target = SOURCE, channel, "event published");
            }
            Err(_) => {
                counter!(METRIC_EVENTS_PUBLISH_FAILED, "channel" => channel.to_string())
                    .increment(1);
            }
        }
        result
    }

    async fn send(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        let connection = self.connection().await?;
        if let Err(err) = connection.publish(channel, payload).await {
            self.discard(&connection);
            return Err(err);
        }
        Ok(())
    }

    async fn connection(&self) -> Result<Arc<dyn BusConnection>, BusError> {
        let attempt = {
            let mut state = lock(&self.state, SOURCE, "connection.begin");
            match &*state {
                ConnectionState::Ready(connection) => return Ok(Arc::clone(connection)),
                ConnectionState::Connecting(attempt) => attempt.clone(),
                ConnectionState::Idle => {
                    let attempt = self.start_connect();
                    *state = ConnectionState::Connecting(attempt.clone());
                    attempt
                }
            }
        };

        let outcome = attempt.clone().await;

        let mut state = lock(&self.state, SOURCE, "connection.finish");
        let current = matches!(&*state, ConnectionState::Connecting(pending) if pending.ptr_eq(&attempt));
        match outcome {
            Ok(connection) => {
                if current {
                    *state = ConnectionState::Ready(Arc::clone(&connection));
                }
                Ok(connection)
            }
            Err(err) => {
                if current {
                    *state = ConnectionState::Idle;
                }
                Err(err)
            }
        }
    }

    fn start_connect(&self) -> ConnectAttempt {
        let connector = Arc::clone(&self.connector);
        async move {
            debug!(target = SOURCE, "opening message bus connection");
            connector.connect().await.inspect_err(|err| {
                warn!(target = SOURCE, error = %err, "message bus connect failed");
            })
        }
        .boxed()
        .shared()
    }

    /// Drops `connection` if it is still the ready one.
    fn discard(&self, connection: &Arc<dyn BusConnection>) {
        let mut state = lock(&self.state, SOURCE, "discard");
        if let ConnectionState::Ready(ready) = &*state
            && Arc::ptr_eq(ready, connection)
        {
            warn!(target = SOURCE, "publish failed; discarding connection");
            *state = ConnectionState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::events::MemoryBus;

    #[tokio::test]
    async fn connects_lazily_and_reuses_the_connection() {
        let bus = MemoryBus::recording();
        let publisher = EventPublisher::new(Arc::new(bus.clone()));
        assert_eq!(publisher.state(), PublisherState::Idle);
        assert_eq!(bus.connect_count(), 0);

        publisher.publish("ch", &"one").await.expect("publish");
        publisher.publish("ch", &"two").await.expect("publish");

        assert_eq!(publisher.state(), PublisherState::Ready);
        assert_eq!(bus.connect_count(), 1);
        assert_eq!(bus.published_on("ch"), vec!["\"one\"", "\"two\""]);
    }

    #[tokio::test]
    async fn concurrent_publishes_share_one_connect() {
        let bus = MemoryBus::recording();
        bus.set_connect_delay(Duration::from_millis(50));
        let publisher = EventPublisher::new(Arc::new(bus.clone()));

        let (a, b, c) = tokio::join!(
            publisher.publish("ch", &1),
            publisher.publish("ch", &2),
            publisher.publish("ch", &3),
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(bus.connect_count(), 1);
        assert_eq!(bus.published_on("ch").len(), 3);
    }

    #[tokio::test]
    async fn failed_connect_propagates_and_resets() {
        let bus = MemoryBus::recording();
        bus.fail_connect(true);
        let publisher = EventPublisher::new(Arc::new(bus.clone()));

        let err = publisher.publish("ch", &1).await.expect_err("connect fails");
        assert!(matches!(err, BusError::Connect(_)));
        assert_eq!(publisher.state(), PublisherState::Idle);

        bus.fail_connect(false);
        publisher.publish("ch", &2).await.expect("retry succeeds");
        assert_eq!(bus.connect_count(), 2);
        assert_eq!(bus.published_on("ch"), vec!["2"]);
    }

    #[tokio::test]
    async fn failed_send_discards_the_connection() {
        let bus = MemoryBus::recording();
        let publisher = EventPublisher::new(Arc::new(bus.clone()));
        publisher.publish("ch", &1).await.expect("publish");

        bus.fail_publish(true);
        assert!(publisher.publish("ch", &2).await.is_err());
        assert_eq!(publisher.state(), PublisherState::Idle);

        bus.fail_publish(false);
        publisher.publish("ch", &3).await.expect("publish");
        assert_eq!(bus.connect_count(), 2);
    }
}
