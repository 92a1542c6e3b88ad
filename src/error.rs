//! Error taxonomy shared by every layer.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by svnp operations.
#[derive(Error, Debug)]
pub enum SvnError {
    /// The svn binary or the configured roots are unusable.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The path is not inside any configured repository root.
    #[error("{0} is not in a configured SVN repository")]
    NotConfigured(PathBuf),
    /// No ancestor of the path contains a `.svn` directory.
    #[error("no .svn directory found above {0}")]
    MarkerMissing(PathBuf),
    /// The path exists but is not under version control.
    #[error("{0} is not under version control")]
    NotTracked(PathBuf),
    /// svn exited non-zero.
    #[error("svn exited with code {code}: {stderr}")]
    Subprocess { code: i32, stderr: String },
    /// svn could not be started at all.
    #[error("failed to run svn: {0}")]
    Spawn(#[source] std::io::Error),
    /// Structured output did not have the expected shape.
    #[error("failed to parse svn output: {0}")]
    Parse(String),
    /// Some of the requested paths already belong to an in-flight commit.
    #[error("already being committed: {}", display_paths(.paths))]
    LockConflict { paths: Vec<PathBuf> },
    /// The commit file is already registered with the lock coordinator.
    #[error("commit file {0} is already in use")]
    LockKeyInUse(PathBuf),
    /// Commit message file could not be created, read or found.
    #[error("commit file error: {0}")]
    Artifact(String),
    #[error("no files to commit")]
    NothingToCommit,
    /// The commit message is empty once the ignored section is stripped.
    #[error("log message unchanged or not specified")]
    EmptyMessage,
    /// The durable revision cache could not be read or written.
    #[error("cache error: {0}")]
    Cache(String),
    #[error("invalid input: {0}")]
    InvalidArgument(String),
    /// A background task failed without producing a result.
    #[error("background task failed: {0}")]
    TaskFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SvnError {
    /// True when the caller should offer to add the path rather than report a failure.
    pub fn is_not_tracked(&self) -> bool {
        matches!(self, SvnError::NotTracked(_))
    }

    /// Build a subprocess error from a failed command's stderr.
    pub fn subprocess(code: i32, stderr: &str) -> Self {
        SvnError::Subprocess {
            code,
            stderr: stderr.trim().to_string(),
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
