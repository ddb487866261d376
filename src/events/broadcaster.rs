//! In-process fan-out of change events to live connections.

use std::sync::Arc;

use dashmap::DashMap;
use metrics::{counter, gauge};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::events::ChangeEvent;

pub(crate) const METRIC_EVENTS_BROADCAST: &str = "taskflow_events_broadcast_total";
pub(crate) const METRIC_NOTIFICATION_CONNECTIONS: &str = "taskflow_notification_connections";

/// Event name carried by every frame sent to clients.
pub const TASK_UPDATE_EVENT: &str = "task-update";

const SOURCE: &str = "events::broadcaster";

/// One frame delivered to attached connections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub event: &'static str,
    pub data: ChangeEvent,
}

impl Notification {
    pub fn task_update(data: ChangeEvent) -> Self {
        Self {
            event: TASK_UPDATE_EVENT,
            data,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubscriberConnection {
    pub id: Uuid,
    pub attached_at: OffsetDateTime,
}

struct Inner {
    sender: broadcast::Sender<Notification>,
    connections: DashMap<Uuid, SubscriberConnection>,
}

impl Inner {
    fn publish_count(&self) {
        gauge!(METRIC_NOTIFICATION_CONNECTIONS).set(self.connections.len() as f64);
    }
}

/// Registry of live connections plus the channel that feeds them.
///
/// Delivery is at-most-once. A connection only sees events broadcast while it
/// is attached.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                sender,
                connections: DashMap::new(),
            }),
        }
    }

    /// Sends `event` to every attached connection, returning how many
    /// receivers it reached.
    pub fn broadcast(&self, event: ChangeEvent) -> usize {
        counter!(METRIC_EVENTS_BROADCAST).increment(1);
        let action = event.action();
        match self.inner.sender.send(Notification::task_update(event)) {
            Ok(receivers) => {
                debug!(target = SOURCE, action, receivers, "event broadcast");
                receivers
            }
            Err(_) => {
                debug!(target = SOURCE, action, "event broadcast with no listeners");
                0
            }
        }
    }

    pub fn attach(&self) -> Subscription {
        let receiver = self.inner.sender.subscribe();
        let connection = SubscriberConnection {
            id: Uuid::new_v4(),
            attached_at: OffsetDateTime::now_utc(),
        };
        let id = connection.id;
        self.inner.connections.insert(id, connection);
        self.inner.publish_count();
        debug!(target = SOURCE, connection_id = %id, "connection attached");

        Subscription {
            id,
            receiver,
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn connections(&self) -> Vec<SubscriberConnection> {
        self.inner
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

/// A live connection's handle. Dropping it detaches the connection.
pub struct Subscription {
    id: Uuid,
    receiver: broadcast::Receiver<Notification>,
    inner: Arc<Inner>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Waits for the next notification. Skips over events lost to lag.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) => return Some(notification),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        target = SOURCE,
                        connection_id = %self.id,
                        skipped,
                        "connection lagged; events dropped"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.connections.remove(&self.id);
        self.inner.publish_count();
        debug!(target = SOURCE, connection_id = %self.id, "connection detached");
    }
}
