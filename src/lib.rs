//! Task tracking services: a read-through cached task API, a write path that
//! invalidates the cache and publishes change events, and a notification
//! service that fans those events out to live WebSocket clients.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod events;
pub mod infra;
pub(crate) mod util;
