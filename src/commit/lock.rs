//! Admission control for commit flows.
//!
//! Each in-flight commit is keyed by its commit-message file and owns a set
//! of paths. A path can belong to at most one in-flight commit. The set of
//! locked paths is always derived from the key→paths map, never tracked on
//! its own.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::SvnError;

type LockMap = HashMap<PathBuf, BTreeSet<PathBuf>>;

/// Tracks which paths are locked by which commit file.
#[derive(Debug, Default)]
pub struct LockCoordinator {
    held: Mutex<LockMap>,
}

impl LockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, LockMap> {
        // A panic while holding the guard cannot leave the map half-updated:
        // every mutation is a single insert or remove.
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lock `paths` for the commit identified by `key`.
    ///
    /// Fails without changing anything if `key` is already registered or if
    /// any path is held by another commit.
    pub fn try_lock<I, P>(&self, key: &Path, paths: I) -> Result<(), SvnError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let requested: BTreeSet<PathBuf> = paths.into_iter().map(Into::into).collect();
        let mut held = self.held();

        if held.contains_key(key) {
            return Err(SvnError::LockKeyInUse(key.to_path_buf()));
        }

        let conflicts: Vec<PathBuf> = held
            .values()
            .flat_map(|set| set.intersection(&requested))
            .cloned()
            .collect();
        if !conflicts.is_empty() {
            log::debug!(
                "Rejecting commit {}: {} path(s) already locked",
                key.display(),
                conflicts.len()
            );
            return Err(SvnError::LockConflict { paths: conflicts });
        }

        log::debug!("Locked {} path(s) for {}", requested.len(), key.display());
        held.insert(key.to_path_buf(), requested);
        Ok(())
    }

    /// Check `paths` against current locks without taking them.
    pub fn check<'a, I>(&self, paths: I) -> Result<(), SvnError>
    where
        I: IntoIterator<Item = &'a PathBuf>,
    {
        let held = self.held();
        let conflicts: Vec<PathBuf> = paths
            .into_iter()
            .filter(|path| held.values().any(|set| set.contains(*path)))
            .cloned()
            .collect();
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(SvnError::LockConflict { paths: conflicts })
        }
    }

    /// Release the paths held by `key`. Returns false if `key` was not held.
    pub fn release(&self, key: &Path) -> bool {
        let released = self.held().remove(key);
        match &released {
            Some(paths) => log::debug!("Released {} path(s) for {}", paths.len(), key.display()),
            None => log::debug!("Release for {} ignored, not locked", key.display()),
        }
        released.is_some()
    }

    /// Union of every held path set.
    pub fn locked_paths(&self) -> BTreeSet<PathBuf> {
        self.held().values().flatten().cloned().collect()
    }

    /// Paths held by `key`, if it is registered.
    pub fn paths_for(&self, key: &Path) -> Option<BTreeSet<PathBuf>> {
        self.held().get(key).cloned()
    }

    /// The commit file currently holding `path`.
    pub fn holder(&self, path: &Path) -> Option<PathBuf> {
        self.held()
            .iter()
            .find(|(_, set)| set.contains(path))
            .map(|(key, _)| key.clone())
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        self.holder(path).is_some()
    }

    /// Number of in-flight commits.
    pub fn active(&self) -> usize {
        self.held().len()
    }
}
