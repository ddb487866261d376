//! Application services: cached reads and the invalidating write path.

pub mod error;
pub mod repos;
pub mod tasks;
pub mod users;
