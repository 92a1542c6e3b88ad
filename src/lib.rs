//! svnp: a coordination layer over the `svn` command-line client.
//!
//! It caches per-path status and history, keeps two commits from claiming
//! the same file, and manages the commit message file for each commit.

pub mod cache;
pub mod commit;
pub mod config;
pub mod context;
pub mod error;
pub mod repository;
pub mod svn;
pub mod tasks;
pub mod types;

pub use context::Context;
pub use error::SvnError;
pub use repository::{Confirm, Repository, StatusFormat};
pub use types::Target;
