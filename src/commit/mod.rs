//! Commit flow: path locks, commit message files and the session tying them together.

mod artifact;
mod lock;
mod session;

pub use artifact::{ArtifactManager, MAX_CANDIDATES, SENTINEL, extract_message};
pub use lock::LockCoordinator;
pub use session::{CommitOutcome, CommitSession, format_clipboard};
