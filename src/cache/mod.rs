//! Path state memo + durable revision-log cache

mod lock;
mod path_cache;
mod paths;
mod revisions;

pub use lock::CacheLock;
pub use path_cache::PathCache;
pub use paths::{CachePaths, WorkingCopy, relative_to};
pub use revisions::RevisionStore;
