//! Change-event plumbing.
//!
//! Writers publish through [`EventPublisher`]. The notification service runs a
//! [`NotificationListener`] that subscribes to the same channel and hands each
//! decoded event to the [`Broadcaster`], which fans it out to live
//! connections.

mod broadcaster;
mod bus;
mod listener;
mod memory;
mod publisher;

pub use broadcaster::{
    Broadcaster, Notification, SubscriberConnection, Subscription, TASK_UPDATE_EVENT,
};
pub use bus::{BusConnection, BusConnector, BusError, BusSubscriber};
pub use listener::{ListenerState, MalformedEvent, NotificationListener};
pub use memory::MemoryBus;
pub use publisher::{EventPublisher, PublisherState};

pub(crate) use broadcaster::{METRIC_EVENTS_BROADCAST, METRIC_NOTIFICATION_CONNECTIONS};
pub(crate) use listener::METRIC_EVENTS_MALFORMED;
pub(crate) use publisher::{METRIC_EVENTS_PUBLISHED, METRIC_EVENTS_PUBLISH_FAILED};
