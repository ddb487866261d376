//! Cache key definitions.
//!
//! Keys are coarse: a single key holds a whole collection, and any write to
//! that collection deletes the key.

use std::fmt;

/// Identifies a cached collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Every task, in storage order.
    AllTasks,
    /// Every user account.
    AllUsers,
}

impl CacheKey {
    /// The literal key stored in the backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllTasks => "all_tasks",
            Self::AllUsers => "all_users",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
