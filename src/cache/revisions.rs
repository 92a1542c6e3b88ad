//! Durable revision-log cache.
//!
//! One JSON file per (path, limit). Files are written to a temp name and
//! renamed into place, so readers never see a partial write. Writers and
//! invalidation for the same working copy are serialised with a `CacheLock`:
//! invalidation waits for it, a save is skipped when it is busy.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::lock::CacheLock;
use super::paths::{CachePaths, WorkingCopy, limit_token, split_relative};
use crate::error::SvnError;
use crate::types::Revision;

/// Bumped when the file layout changes; older files are treated as misses.
const FORMAT_VERSION: u32 = 1;

/// Global counter for unique temp file names within a process
static WRITE_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct RevisionFile {
    version: u32,
    path: String,
    limit: Option<u32>,
    revisions: Vec<Revision>,
}

/// On-disk store for `svn log` results.
#[derive(Debug, Clone)]
pub struct RevisionStore {
    paths: CachePaths,
}

impl RevisionStore {
    pub fn new(paths: CachePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    /// Load cached revisions. Unreadable or outdated files count as a miss.
    pub fn load(
        &self,
        wc: &WorkingCopy,
        relative: &Path,
        limit: Option<u32>,
    ) -> Option<Vec<Revision>> {
        let file = self.paths.revision_file(wc, relative, limit);
        let contents = match fs::read_to_string(&file) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Failed to read revision cache {}: {}", file.display(), e);
                return None;
            }
        };

        match serde_json::from_str::<RevisionFile>(&contents) {
            Ok(cached) if cached.version == FORMAT_VERSION && cached.limit == limit => {
                Some(cached.revisions)
            }
            Ok(_) => {
                log::debug!("Ignoring outdated revision cache {}", file.display());
                None
            }
            Err(e) => {
                log::warn!("Ignoring corrupt revision cache {}: {}", file.display(), e);
                None
            }
        }
    }

    /// Persist revisions for (relative, limit).
    ///
    /// Returns `Ok(false)` without writing when another process holds the
    /// working copy's lock; the entry is simply fetched again next time.
    pub fn save(
        &self,
        wc: &WorkingCopy,
        relative: &Path,
        limit: Option<u32>,
        revisions: &[Revision],
    ) -> Result<bool, SvnError> {
        let record = RevisionFile {
            version: FORMAT_VERSION,
            path: relative.to_string_lossy().into_owned(),
            limit,
            revisions: revisions.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| SvnError::Cache(format!("failed to serialize revisions: {}", e)))?;

        let lock_path = self.paths.lock_path(wc);
        let Some(_lock) = CacheLock::try_acquire(&lock_path).map_err(|e| cache_io(&lock_path, e))?
        else {
            log::debug!("Revision cache busy, not saving {}", relative.display());
            return Ok(false);
        };
        let file = self.paths.revision_file(wc, relative, limit);
        write_atomic(&file, &json)
            .map_err(|e| SvnError::Cache(format!("failed to write {}: {}", file.display(), e)))?;
        Ok(true)
    }

    /// Drop every cached limit for `relative`, everything below it, and each
    /// of its ancestors up to the working-copy root.
    pub fn invalidate(&self, wc: &WorkingCopy, relative: &Path) -> Result<(), SvnError> {
        let lock_path = self.paths.lock_path(wc);
        let _lock = CacheLock::acquire(&lock_path).map_err(|e| cache_io(&lock_path, e))?;
        let wc_dir = self.paths.working_copy_dir(wc);

        if relative.as_os_str().is_empty() {
            return remove_dir_if_exists(&wc_dir);
        }

        remove_dir_if_exists(&wc_dir.join(relative))?;
        // `ancestors` yields `relative` itself and ends with the empty root path.
        for entry in relative.ancestors() {
            remove_entries(&wc_dir, entry)?;
        }
        Ok(())
    }

    /// Remove every cached revision list.
    pub fn clear(&self) -> Result<(), SvnError> {
        remove_dir_if_exists(&self.paths.revisions_dir())
    }
}

/// Remove the `<stem>.<limit>.json` files of one path.
fn remove_entries(wc_dir: &Path, relative: &Path) -> Result<(), SvnError> {
    let (parent, stem) = split_relative(relative);
    let dir = wc_dir.join(parent);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(cache_io(&dir, e)),
    };
    for entry in entries.flatten() {
        if is_entry_for(&entry.file_name().to_string_lossy(), &stem) {
            fs::remove_file(entry.path()).map_err(|e| cache_io(&entry.path(), e))?;
        }
    }
    Ok(())
}

/// Whether `file_name` is `<stem>.<limit>.json`.
fn is_entry_for(file_name: &str, stem: &str) -> bool {
    let Some(rest) = file_name
        .strip_prefix(stem)
        .and_then(|r| r.strip_prefix('.'))
        .and_then(|r| r.strip_suffix(".json"))
    else {
        return false;
    };
    rest == limit_token(None) || rest.parse::<u32>().is_ok()
}

fn cache_io(path: &Path, e: io::Error) -> SvnError {
    SvnError::Cache(format!("{}: {}", path.display(), e))
}

fn remove_dir_if_exists(dir: &Path) -> Result<(), SvnError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(cache_io(dir, e)),
    }
}

/// Write `contents` to `path` via a unique temp file and a rename.
fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let counter = WRITE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path =
        path.with_file_name(format!("{}.tmp.{}.{}", file_name, std::process::id(), counter));

    let result = fs::File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&temp_path, path));

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
