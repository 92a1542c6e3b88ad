//! Cache directory path management
//!
//! This module provides the `CachePaths` struct which manages all filesystem paths
//! for the durable cache layout:
//!
//! ```text
//! ~/.cache/svnp/
//! ├── revisions/
//! │   └── <wc-key>/
//! │       └── <root-relative path>.<limit>.json   # Cached `svn log`
//! └── locks/
//!     └── <wc-key>.lock                           # flock-based locking
//! ```
//!
//! `<wc-key>` is the escaped repository URL of the working-copy root, so two
//! checkouts that share a directory name never share history, and moving a
//! checkout on disk keeps its entries. Without a URL the escaped root path
//! is used instead.

use std::path::{Component, Path, PathBuf};

use crate::error::SvnError;

/// File stem used when the cached path is the working-copy root itself.
const ROOT_ENTRY: &str = "_root_";

/// Manages all filesystem paths for the cache directory layout
#[derive(Debug, Clone)]
pub struct CachePaths {
    root: PathBuf,
}

impl CachePaths {
    /// Creates a new CachePaths with the specified root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root cache directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the revisions directory path: `{root}/revisions`
    pub fn revisions_dir(&self) -> PathBuf {
        self.root.join("revisions")
    }

    /// Returns the locks directory path: `{root}/locks`
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    /// Returns the per-working-copy directory: `{root}/revisions/{wc-key}`
    pub fn working_copy_dir(&self, wc: &WorkingCopy) -> PathBuf {
        self.revisions_dir().join(wc.key())
    }

    /// Returns the cache file for `relative` at `limit`.
    pub fn revision_file(&self, wc: &WorkingCopy, relative: &Path, limit: Option<u32>) -> PathBuf {
        let (parent, stem) = split_relative(relative);
        self.working_copy_dir(wc)
            .join(parent)
            .join(format!("{}.{}.json", stem, limit_token(limit)))
    }

    /// Returns the lock file path: `{root}/locks/{wc-key}.lock`
    pub fn lock_path(&self, wc: &WorkingCopy) -> PathBuf {
        self.locks_dir().join(format!("{}.lock", wc.key()))
    }
}

/// A working-copy root and the key its durable cache entries live under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingCopy {
    root: PathBuf,
    key: String,
}

impl WorkingCopy {
    /// `url` is the repository URL svn reports for `root`.
    pub fn new(root: impl Into<PathBuf>, url: Option<&str>) -> Self {
        let root = root.into();
        let key = match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => escape_key(url),
            None => escape_key(&root.to_string_lossy()),
        };
        Self { root, key }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// `path` relative to this root; see `relative_to`.
    pub fn relative(&self, path: &Path) -> Result<PathBuf, SvnError> {
        relative_to(&self.root, path)
    }
}

/// Escape `raw` into a single file name. Bytes outside `[A-Za-z0-9.-]`
/// become `_xx`, so distinct inputs never share a key. An all-dot input is
/// escaped whole so it can never name `.` or `..`.
fn escape_key(raw: &str) -> String {
    let dots_only = raw.bytes().all(|b| b == b'.');
    let mut key = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if !dots_only && (byte.is_ascii_alphanumeric() || byte == b'.' || byte == b'-') {
            key.push(char::from(byte));
        } else {
            key.push_str(&format!("_{:02x}", byte));
        }
    }
    key
}

impl Default for CachePaths {
    /// Creates a CachePaths using the system cache directory + "svnp"
    fn default() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"));
        Self::new(cache_dir.join("svnp"))
    }
}

/// `None` (no limit) is stored as `all`.
pub(crate) fn limit_token(limit: Option<u32>) -> String {
    match limit {
        Some(n) => n.to_string(),
        None => "all".to_string(),
    }
}

/// Split a relative path into its parent and file stem.
pub(crate) fn split_relative(relative: &Path) -> (PathBuf, String) {
    match relative.file_name() {
        Some(name) => (
            relative.parent().map(Path::to_path_buf).unwrap_or_default(),
            name.to_string_lossy().into_owned(),
        ),
        None => (PathBuf::new(), ROOT_ENTRY.to_string()),
    }
}

/// Make `path` relative to `wc_root`.
///
/// Rejects paths outside the root and paths with `..` or `.` components.
pub fn relative_to(wc_root: &Path, path: &Path) -> Result<PathBuf, SvnError> {
    let relative = path.strip_prefix(wc_root).map_err(|_| {
        SvnError::Cache(format!(
            "{} is not inside {}",
            path.display(),
            wc_root.display()
        ))
    })?;
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(SvnError::Cache(format!(
            "{} is not a normalized path",
            path.display()
        )));
    }
    Ok(relative.to_path_buf())
}
