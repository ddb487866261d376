//! Pub/sub backend seams.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BusError {
    #[error("failed to connect to message bus: {0}")]
    Connect(String),
    #[error("failed to publish to `{channel}`: {reason}")]
    Publish { channel: String, reason: String },
    #[error("failed to subscribe to `{channel}`: {reason}")]
    Subscribe { channel: String, reason: String },
    #[error("failed to encode message: {0}")]
    Encode(String),
}

impl BusError {
    pub fn connect(reason: impl Into<String>) -> Self {
        Self::Connect(reason.into())
    }

    pub fn publish(channel: &str, reason: impl Into<String>) -> Self {
        Self::Publish {
            channel: channel.to_string(),
            reason: reason.into(),
        }
    }

    pub fn subscribe(channel: &str, reason: impl Into<String>) -> Self {
        Self::Subscribe {
            channel: channel.to_string(),
            reason: reason.into(),
        }
    }
}

/// Opens publishing connections to the message bus.
#[async_trait]
pub trait BusConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn BusConnection>, BusError>;
}

/// An established publishing connection.
#[async_trait]
pub trait BusConnection: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError>;
}

/// Opens a subscription yielding raw payloads for one channel.
///
/// The stream ends when the underlying connection is lost.
#[async_trait]
pub trait BusSubscriber: Send + Sync {
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, BusError>;
}
