//! Redis adapters for the cache backend and the message bus.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::cache::{CacheBackend, CacheError};
use crate::events::{BusConnection, BusConnector, BusError, BusSubscriber};

use super::error::InfraError;

const SOURCE: &str = "infra::redis";

fn open_client(url: &str) -> Result<redis::Client, InfraError> {
    redis::Client::open(url).map_err(|err| InfraError::redis(format!("invalid url: {err}")))
}

/// Cache backend over `GET`/`SETEX`/`DEL`.
///
/// Connects on first use. A failed connect leaves the handle empty so the
/// next operation retries.
pub struct RedisCacheBackend {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
}

impl RedisCacheBackend {
    pub fn open(url: &str) -> Result<Self, InfraError> {
        Ok(Self {
            client: open_client(url)?,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        self.connection
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone()).await?;
                info!(target = SOURCE, "cache connection established");
                Ok::<_, redis::RedisError>(manager)
            })
            .await
            .cloned()
            .map_err(|err| CacheError::unavailable(err.to_string()))
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut connection = self.connection().await?;
        connection
            .get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(|err| CacheError::backend(err.to_string()))
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut connection = self.connection().await?;
        connection
            .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|err| CacheError::backend(err.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut connection = self.connection().await?;
        connection
            .del::<_, ()>(key)
            .await
            .map_err(|err| CacheError::backend(err.to_string()))
    }
}

/// Opens multiplexed publishing connections.
pub struct RedisConnector {
    client: redis::Client,
}

impl RedisConnector {
    pub fn open(url: &str) -> Result<Self, InfraError> {
        Ok(Self {
            client: open_client(url)?,
        })
    }
}

#[async_trait]
impl BusConnector for RedisConnector {
    async fn connect(&self) -> Result<Arc<dyn BusConnection>, BusError> {
        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| BusError::connect(err.to_string()))?;
        info!(target = SOURCE, "publisher connection established");
        Ok(Arc::new(RedisPublisherConnection { connection }))
    }
}

struct RedisPublisherConnection {
    connection: MultiplexedConnection,
}

#[async_trait]
impl BusConnection for RedisPublisherConnection {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        let mut connection = self.connection.clone();
        connection
            .publish::<_, _, ()>(channel, payload)
            .await
            .map_err(|err| BusError::publish(channel, err.to_string()))
    }
}

/// Dedicated `SUBSCRIBE` connections, one per subscription.
pub struct RedisSubscriber {
    client: redis::Client,
}

impl RedisSubscriber {
    pub fn open(url: &str) -> Result<Self, InfraError> {
        Ok(Self {
            client: open_client(url)?,
        })
    }
}

#[async_trait]
impl BusSubscriber for RedisSubscriber {
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, BusError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|err| BusError::subscribe(channel, err.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|err| BusError::subscribe(channel, err.to_string()))?;

        let messages = pubsub
            .into_on_message()
            .filter_map(|message| async move {
                match message.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(err) => {
                        warn!(
                            target = SOURCE,
                            channel = message.get_channel_name(),
                            error = %err,
                            "discarding non-text pub/sub payload"
                        );
                        None
                    }
                }
            })
            .boxed();
        Ok(messages)
    }
}
