//! Shared types for svnp

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What an operation acts on.
///
/// Commands pick exactly one of these up front instead of juggling
/// `file`/`directory` flags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    File(PathBuf),
    Directory(PathBuf),
}

impl Target {
    /// Classify a path by looking at the filesystem.
    pub fn detect(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let meta = std::fs::metadata(&path)?;
        if meta.is_dir() {
            Ok(Target::Directory(path))
        } else {
            Ok(Target::File(path))
        }
    }

    /// Returns the wrapped path.
    pub fn path(&self) -> &Path {
        match self {
            Target::File(path) | Target::Directory(path) => path,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Target::File(_))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::File(path) => write!(f, "file {}", path.display()),
            Target::Directory(path) => write!(f, "directory {}", path.display()),
        }
    }
}

/// Outcome of a single invocation of the svn binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    /// The result reported for a detached (background) invocation.
    pub fn detached() -> Self {
        Self {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One entry of `svn log`, newest first as the tool reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub number: String,
    pub author: String,
    pub date: String,
    pub message: String,
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{} | {} | {}", self.number, self.author, self.date)
    }
}

/// Memoised state for a single absolute path. `None` means not yet known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathRecord {
    pub tracked: Option<bool>,
    pub modified: Option<bool>,
}

/// Working-copy status of an item, as reported in `wc-status/@item`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WcStatus {
    Added,
    Conflicted,
    Deleted,
    External,
    Ignored,
    Incomplete,
    Merged,
    Missing,
    Modified,
    None,
    Normal,
    Obstructed,
    Replaced,
    Unversioned,
    Other(String),
}

impl WcStatus {
    /// Whether the item counts as a local modification.
    pub fn is_modification(&self) -> bool {
        matches!(
            self,
            WcStatus::Added
                | WcStatus::Deleted
                | WcStatus::Replaced
                | WcStatus::Modified
                | WcStatus::Merged
                | WcStatus::Conflicted
        )
    }

    /// Whether the item belongs in a commit.
    pub fn is_committable(&self) -> bool {
        matches!(
            self,
            WcStatus::Added | WcStatus::Deleted | WcStatus::Replaced | WcStatus::Modified
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            WcStatus::Added => "added",
            WcStatus::Conflicted => "conflicted",
            WcStatus::Deleted => "deleted",
            WcStatus::External => "external",
            WcStatus::Ignored => "ignored",
            WcStatus::Incomplete => "incomplete",
            WcStatus::Merged => "merged",
            WcStatus::Missing => "missing",
            WcStatus::Modified => "modified",
            WcStatus::None => "none",
            WcStatus::Normal => "normal",
            WcStatus::Obstructed => "obstructed",
            WcStatus::Replaced => "replaced",
            WcStatus::Unversioned => "unversioned",
            WcStatus::Other(value) => value,
        }
    }

    /// Single-letter code used in commit files (`M`, `A`, ...).
    pub fn code(&self) -> char {
        self.as_str()
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('?')
    }
}

impl FromStr for WcStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "added" => WcStatus::Added,
            "conflicted" => WcStatus::Conflicted,
            "deleted" => WcStatus::Deleted,
            "external" => WcStatus::External,
            "ignored" => WcStatus::Ignored,
            "incomplete" => WcStatus::Incomplete,
            "merged" => WcStatus::Merged,
            "missing" => WcStatus::Missing,
            "modified" => WcStatus::Modified,
            "none" => WcStatus::None,
            "normal" => WcStatus::Normal,
            "obstructed" => WcStatus::Obstructed,
            "replaced" => WcStatus::Replaced,
            "unversioned" => WcStatus::Unversioned,
            other => WcStatus::Other(other.to_string()),
        })
    }
}

impl fmt::Display for WcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `entry` of structured `svn status` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Path as reported by svn, or root-relative once passed through `Repository`.
    pub path: PathBuf,
    pub item: WcStatus,
}

impl fmt::Display for StatusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.item.code(), self.path.display())
    }
}

/// Node kind in `svn ls` / `svn info` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryKind {
    Dir,
    File,
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dir" => Ok(EntryKind::Dir),
            "file" => Ok(EntryKind::File),
            other => Err(format!("unknown node kind '{}'", other)),
        }
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub kind: EntryKind,
    pub name: String,
    /// Absolute path, the listed directory joined with `name`.
    pub path: PathBuf,
}
