//! Bridges the pub/sub channel to the [`Broadcaster`].

use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::StreamExt;
use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::events::ChangeEvent;
use crate::util::lock::{read, write};

use super::broadcaster::Broadcaster;
use super::bus::BusSubscriber;

pub(crate) const METRIC_EVENTS_MALFORMED: &str = "taskflow_events_malformed_total";

const SOURCE: &str = "events::listener";
const PAYLOAD_PREVIEW_CHARS: usize = 256;

#[derive(Debug, Error)]
#[error("malformed change event: {source}")]
pub struct MalformedEvent {
    pub payload: String,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Subscribed,
}

pub struct NotificationListener {
    subscriber: Arc<dyn BusSubscriber>,
    broadcaster: Broadcaster,
    channel: String,
    reconnect_delay: Duration,
    state: RwLock<ListenerState>,
}

impl NotificationListener {
    pub fn new(
        subscriber: Arc<dyn BusSubscriber>,
        broadcaster: Broadcaster,
        channel: impl Into<String>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            subscriber,
            broadcaster,
            channel: channel.into(),
            reconnect_delay,
            state: RwLock::new(ListenerState::Disconnected),
        }
    }

    pub fn state(&self) -> ListenerState {
        *read(&self.state, SOURCE, "state")
    }

    fn set_state(&self, state: ListenerState) {
        *write(&self.state, SOURCE, "set_state") = state;
    }

    /// Subscribes and forwards events until `shutdown` flips to `true` or its
    /// sender is dropped. Lost subscriptions are retried after the reconnect
    /// delay.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let channel = self.channel.as_str();

        while !*shutdown.borrow() {
            self.set_state(ListenerState::Connecting);

            let subscribed = tokio::select! {
                result = self.subscriber.subscribe(channel) => result,
                _ = shutdown.changed() => break,
            };

            match subscribed {
                Ok(mut stream) => {
                    self.set_state(ListenerState::Subscribed);
                    info!(target = SOURCE, channel, "subscribed to change events");

                    loop {
                        tokio::select! {
                            message = stream.next() => match message {
                                Some(payload) => {
                                    if let Ok(delivered) = self.handle_payload(&payload) {
                                        debug!(
                                            target = SOURCE,
                                            channel,
                                            delivered,
                                            "change event fanned out"
                                        );
                                    }
                                }
                                None => {
                                    warn!(target = SOURCE, channel, "subscription ended");
                                    break;
                                }
                            },
                            _ = shutdown.changed() => {
                                self.set_state(ListenerState::Disconnected);
                                return;
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(target = SOURCE, channel, error = %err, "subscribe failed");
                }
            }

            self.set_state(ListenerState::Disconnected);

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.set_state(ListenerState::Disconnected);
        info!(target = SOURCE, channel, "notification listener stopped");
    }

    /// Decodes one raw payload and broadcasts it.
    ///
    /// Malformed payloads are logged, counted and dropped.
    pub fn handle_payload(&self, payload: &str) -> Result<usize, MalformedEvent> {
        match serde_json::from_str::<ChangeEvent>(payload) {
            Ok(event) => Ok(self.broadcaster.broadcast(event)),
            Err(source) => {
                counter!(METRIC_EVENTS_MALFORMED).increment(1);
                let preview: String = payload.chars().take(PAYLOAD_PREVIEW_CHARS).collect();
                warn!(
                    target = SOURCE,
                    channel = self.channel.as_str(),
                    payload = %preview,
                    error = %source,
                    "dropping malformed change event"
                );
                Err(MalformedEvent {
                    payload: payload.to_string(),
                    source,
                })
            }
        }
    }
}
