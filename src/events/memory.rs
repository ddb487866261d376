//! In-process message bus.
//!
//! Only reaches subscribers in the same process. Used when no pub/sub URL is
//! configured and by tests, which can inject failures, count connects and
//! record published payloads.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::util::lock::lock;

use super::bus::{BusConnection, BusConnector, BusError, BusSubscriber};

const TOPIC_CAPACITY: usize = 64;
const SOURCE: &str = "events::memory";

#[derive(Default)]
struct BusState {
    topics: DashMap<String, broadcast::Sender<String>>,
    record: AtomicBool,
    published: Mutex<Vec<(String, String)>>,
    connect_delay: Mutex<Duration>,
    fail_connect: AtomicBool,
    fail_publish: AtomicBool,
    fail_subscribe: AtomicBool,
    connects: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MemoryBus {
    state: Arc<BusState>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus that keeps every successfully published payload for
    /// [`MemoryBus::published_on`].
    pub fn recording() -> Self {
        let bus = Self::new();
        bus.record_published(true);
        bus
    }

    /// Off by default; the log is unbounded while enabled.
    pub fn record_published(&self, record: bool) {
        self.state.record.store(record, Ordering::SeqCst);
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_publish(&self, fail: bool) {
        self.state.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.state.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Delays every connect so concurrent callers overlap.
    pub fn set_connect_delay(&self, delay: Duration) {
        *lock(&self.state.connect_delay, SOURCE, "set_connect_delay") = delay;
    }

    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Payloads published on `channel` while recording was on, oldest first.
    pub fn published_on(&self, channel: &str) -> Vec<String> {
        lock(&self.state.published, SOURCE, "published_on")
            .iter()
            .filter(|(topic, _)| topic == channel)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Ends every open subscription stream.
    pub fn close_subscriptions(&self) {
        self.state.topics.clear();
    }

    /// Delivers a raw payload to subscribers without going through a
    /// connection.
    pub fn inject(&self, channel: &str, payload: &str) -> usize {
        self.state.deliver(channel, payload)
    }
}

impl BusState {
    fn deliver(&self, channel: &str, payload: &str) -> usize {
        self.topics
            .get(channel)
            .and_then(|sender| sender.send(payload.to_string()).ok())
            .unwrap_or(0)
    }
}

#[async_trait]
impl BusConnector for MemoryBus {
    async fn connect(&self) -> Result<Arc<dyn BusConnection>, BusError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);

        let delay = *lock(&self.state.connect_delay, SOURCE, "connect");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(BusError::connect("memory bus refused connection"));
        }
        Ok(Arc::new(MemoryConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryConnection {
    state: Arc<BusState>,
}

#[async_trait]
impl BusConnection for MemoryConnection {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        if self.state.fail_publish.load(Ordering::SeqCst) {
            return Err(BusError::publish(channel, "memory bus rejected publish"));
        }
        if self.state.record.load(Ordering::SeqCst) {
            lock(&self.state.published, SOURCE, "publish")
                .push((channel.to_string(), payload.to_string()));
        }
        self.state.deliver(channel, payload);
        Ok(())
    }
}

#[async_trait]
impl BusSubscriber for MemoryBus {
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, BusError> {
        if self.state.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BusError::subscribe(channel, "memory bus refused subscription"));
        }

        let receiver = self
            .state
            .topics
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe();

        let messages = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => return Some((payload, receiver)),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return None,
                }
            }
        });
        Ok(messages.boxed())
    }
}
