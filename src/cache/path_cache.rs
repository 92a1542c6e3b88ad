//! Per-path memo of tracked/modified state and revision lists.
//!
//! Values are computed on a miss and kept until `invalidate` is called for
//! the path or one of its ancestors. Failed computations are not cached.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use super::paths::WorkingCopy;
use super::revisions::RevisionStore;
use crate::error::SvnError;
use crate::types::{PathRecord, Revision};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RevisionKey {
    path: PathBuf,
    limit: Option<u32>,
}

/// Process-wide path cache, shared through `Context`.
pub struct PathCache {
    records: DashMap<PathBuf, PathRecord>,
    working_copies: DashMap<PathBuf, Arc<WorkingCopy>>,
    revisions: DashMap<RevisionKey, Arc<Vec<Revision>>>,
    store: Option<RevisionStore>,
}

impl Default for PathCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PathCache {
    /// Memory-only cache.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            working_copies: DashMap::new(),
            revisions: DashMap::new(),
            store: None,
        }
    }

    /// Cache that also persists revision lists to `store`.
    pub fn with_store(store: RevisionStore) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    pub fn store(&self) -> Option<&RevisionStore> {
        self.store.as_ref()
    }

    /// Snapshot of what is known about `path`.
    pub fn record(&self, path: &Path) -> Option<PathRecord> {
        self.records.get(path).map(|r| r.value().clone())
    }

    /// Cached tracked flag, calling `compute` on a miss.
    pub fn tracked<F>(&self, path: &Path, compute: F) -> Result<bool, SvnError>
    where
        F: FnOnce() -> Result<bool, SvnError>,
    {
        if let Some(tracked) = self.records.get(path).and_then(|r| r.tracked) {
            return Ok(tracked);
        }
        let tracked = compute()?;
        self.records.entry(path.to_path_buf()).or_default().tracked = Some(tracked);
        Ok(tracked)
    }

    /// Cached working copy at `root`, or `None` when svn does not track it.
    ///
    /// `compute` returns `None` for an untracked root. The answer also fills
    /// the root's tracked flag.
    pub fn working_copy<F>(
        &self,
        root: &Path,
        compute: F,
    ) -> Result<Option<Arc<WorkingCopy>>, SvnError>
    where
        F: FnOnce() -> Result<Option<WorkingCopy>, SvnError>,
    {
        if let Some(wc) = self.working_copies.get(root) {
            return Ok(Some(Arc::clone(&wc)));
        }
        if self.records.get(root).and_then(|r| r.tracked) == Some(false) {
            return Ok(None);
        }

        let wc = compute()?.map(Arc::new);
        self.records.entry(root.to_path_buf()).or_default().tracked = Some(wc.is_some());
        if let Some(wc) = &wc {
            self.working_copies.insert(root.to_path_buf(), Arc::clone(wc));
        }
        Ok(wc)
    }

    /// Cached modified flag, calling `compute` on a miss.
    pub fn modified<F>(&self, path: &Path, compute: F) -> Result<bool, SvnError>
    where
        F: FnOnce() -> Result<bool, SvnError>,
    {
        if let Some(modified) = self.records.get(path).and_then(|r| r.modified) {
            return Ok(modified);
        }
        let modified = compute()?;
        self.records.entry(path.to_path_buf()).or_default().modified = Some(modified);
        Ok(modified)
    }

    /// Cached revision list for (path, limit).
    ///
    /// Lookup order is memory, then the durable store, then `compute`. Fresh
    /// results are written to the durable store on a best-effort basis.
    pub fn revisions<F>(
        &self,
        wc: &WorkingCopy,
        path: &Path,
        limit: Option<u32>,
        compute: F,
    ) -> Result<Arc<Vec<Revision>>, SvnError>
    where
        F: FnOnce() -> Result<Vec<Revision>, SvnError>,
    {
        let key = RevisionKey {
            path: path.to_path_buf(),
            limit,
        };
        if let Some(cached) = self.revisions.get(&key).map(|r| Arc::clone(&r)) {
            return Ok(cached);
        }

        let relative = match &self.store {
            Some(_) => Some(wc.relative(path)?),
            None => None,
        };

        if let (Some(store), Some(relative)) = (&self.store, &relative) {
            if let Some(revisions) = store.load(wc, relative, limit) {
                log::debug!("Revision cache hit on disk for {}", path.display());
                let revisions = Arc::new(revisions);
                self.revisions.insert(key, Arc::clone(&revisions));
                return Ok(revisions);
            }
        }

        let revisions = Arc::new(compute()?);
        if let (Some(store), Some(relative)) = (&self.store, &relative) {
            if let Err(e) = store.save(wc, relative, limit, &revisions) {
                log::warn!("Failed to persist revisions for {}: {}", path.display(), e);
            }
        }
        self.revisions.insert(key, Arc::clone(&revisions));
        Ok(revisions)
    }

    /// Forget everything about `path` and its descendants.
    ///
    /// Ancestors keep their tracked flag but lose their modified flag and
    /// their revision lists, since a change below a directory is part of the
    /// directory's state and history. With `wc` set, the durable revision
    /// entries go too.
    pub fn invalidate(&self, path: &Path, wc: Option<&WorkingCopy>) {
        self.records.retain(|key, _| !key.starts_with(path));
        self.working_copies.retain(|key, _| !key.starts_with(path));
        self.revisions
            .retain(|key, _| !key.path.starts_with(path) && !path.starts_with(&key.path));
        for ancestor in path.ancestors().skip(1) {
            if let Some(mut record) = self.records.get_mut(ancestor) {
                record.modified = None;
            }
        }

        if let (Some(store), Some(wc)) = (&self.store, wc) {
            let result = wc.relative(path).and_then(|rel| store.invalidate(wc, &rel));
            if let Err(e) = result {
                log::warn!(
                    "Failed to invalidate revision cache for {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }

    /// Drop every cached value, in memory and on disk.
    pub fn clear(&self) -> Result<(), SvnError> {
        self.records.clear();
        self.working_copies.clear();
        self.revisions.clear();
        match &self.store {
            Some(store) => store.clear(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePaths;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn revision(number: &str) -> Revision {
        Revision {
            number: number.into(),
            author: "bob".into(),
            date: "2024-01-01T00:00:00.000000Z".into(),
            message: format!("r{}", number),
        }
    }

    #[test]
    fn tracked_computes_once_until_invalidated() {
        let cache = PathCache::new();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        };

        assert!(cache.tracked(Path::new("/repo/a.txt"), compute).unwrap());
        assert!(cache.tracked(Path::new("/repo/a.txt"), compute).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate(Path::new("/repo/a.txt"), None);
        assert!(cache.tracked(Path::new("/repo/a.txt"), compute).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn not_tracked_is_sticky() {
        let cache = PathCache::new();
        assert!(!cache.tracked(Path::new("/elsewhere/x"), || Ok(false)).unwrap());
        let later = cache.tracked(Path::new("/elsewhere/x"), || panic!("must not recompute"));
        assert!(!later.unwrap());
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = PathCache::new();
        let first = cache.tracked(Path::new("/repo/a"), || Err(SvnError::subprocess(1, "boom")));
        assert!(first.is_err());
        assert!(cache.record(Path::new("/repo/a")).is_none());
        assert!(cache.tracked(Path::new("/repo/a"), || Ok(true)).unwrap());
    }

    #[test]
    fn keys_are_per_path() {
        let cache = PathCache::new();
        cache.tracked(Path::new("/repo/a"), || Ok(true)).unwrap();
        cache.tracked(Path::new("/repo/b"), || Ok(false)).unwrap();
        cache.modified(Path::new("/repo/a"), || Ok(true)).unwrap();

        assert_eq!(
            cache.record(Path::new("/repo/a")),
            Some(PathRecord {
                tracked: Some(true),
                modified: Some(true)
            })
        );
        assert_eq!(
            cache.record(Path::new("/repo/b")),
            Some(PathRecord {
                tracked: Some(false),
                modified: None
            })
        );
    }

    #[test]
    fn invalidating_ancestor_clears_descendants() {
        let cache = PathCache::new();
        cache.tracked(Path::new("/repo/src/a"), || Ok(true)).unwrap();
        cache.tracked(Path::new("/repo/srcfile"), || Ok(true)).unwrap();

        cache.invalidate(Path::new("/repo/src"), None);

        assert!(cache.record(Path::new("/repo/src/a")).is_none());
        assert!(cache.record(Path::new("/repo/srcfile")).is_some());
    }

    #[test]
    fn invalidating_child_resets_ancestor_modified_flag() {
        let cache = PathCache::new();
        cache.tracked(Path::new("/repo"), || Ok(true)).unwrap();
        cache.modified(Path::new("/repo"), || Ok(true)).unwrap();

        cache.invalidate(Path::new("/repo/a.txt"), None);

        assert_eq!(
            cache.record(Path::new("/repo")),
            Some(PathRecord {
                tracked: Some(true),
                modified: None
            })
        );
    }

    #[test]
    fn revisions_memoised_per_limit() {
        let cache = PathCache::new();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![revision("2"), revision("1")])
        };
        let root = &WorkingCopy::new("/repo", None);
        let path = Path::new("/repo/a.txt");

        let first = cache.revisions(root, path, Some(10), compute).unwrap();
        let second = cache.revisions(root, path, Some(10), compute).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.revisions(root, path, Some(20), compute).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn revisions_survive_restart_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let root = &WorkingCopy::new("/repo", Some("svn://host/repo"));
        let path = Path::new("/repo/a.txt");

        {
            let cache = PathCache::with_store(RevisionStore::new(CachePaths::new(dir.path())));
            cache
                .revisions(root, path, Some(5), || Ok(vec![revision("7")]))
                .unwrap();
        }

        let restarted = PathCache::with_store(RevisionStore::new(CachePaths::new(dir.path())));
        let revisions = restarted
            .revisions(root, path, Some(5), || panic!("should come from disk"))
            .unwrap();
        assert_eq!(*revisions, vec![revision("7")]);
    }

    #[test]
    fn invalidate_with_root_drops_durable_entry() {
        let dir = tempfile::tempdir().unwrap();
        let root = &WorkingCopy::new("/repo", Some("svn://host/repo"));
        let path = Path::new("/repo/a.txt");
        let cache = PathCache::with_store(RevisionStore::new(CachePaths::new(dir.path())));
        cache
            .revisions(root, path, Some(5), || Ok(vec![revision("7")]))
            .unwrap();

        cache.invalidate(path, Some(root));

        let fresh = cache
            .revisions(root, path, Some(5), || Ok(vec![revision("8"), revision("7")]))
            .unwrap();
        assert_eq!(fresh.len(), 2);
    }

    #[test]
    fn other_repository_with_same_directory_name_misses() {
        let dir = tempfile::tempdir().unwrap();
        let alpha = WorkingCopy::new("/work/alpha/trunk", Some("svn://host/alpha/trunk"));
        let beta = WorkingCopy::new("/work/beta/trunk", Some("svn://host/beta/trunk"));
        {
            let cache = PathCache::with_store(RevisionStore::new(CachePaths::new(dir.path())));
            cache
                .revisions(&alpha, Path::new("/work/alpha/trunk/README"), Some(10), || {
                    Ok(vec![revision("999")])
                })
                .unwrap();
        }

        let restarted = PathCache::with_store(RevisionStore::new(CachePaths::new(dir.path())));
        let calls = AtomicUsize::new(0);
        let revisions = restarted
            .revisions(&beta, Path::new("/work/beta/trunk/README"), Some(10), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![revision("4")])
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*revisions, vec![revision("4")]);
    }

    #[test]
    fn invalidating_child_drops_ancestor_revisions() {
        let dir = tempfile::tempdir().unwrap();
        let wc = WorkingCopy::new("/repo", Some("svn://host/repo"));
        let cache = PathCache::with_store(RevisionStore::new(CachePaths::new(dir.path())));
        for path in ["/repo", "/repo/src", "/repo/src/a.c", "/repo/docs"] {
            cache
                .revisions(&wc, Path::new(path), Some(10), || Ok(vec![revision("3")]))
                .unwrap();
        }

        cache.invalidate(Path::new("/repo/src/a.c"), Some(&wc));

        // A restarted cache sees only what survived on disk; check it first,
        // before refetching rewrites those entries.
        let restarted = PathCache::with_store(RevisionStore::new(CachePaths::new(dir.path())));
        for (cache, label) in [(&restarted, "disk"), (&cache, "memory")] {
            for path in ["/repo", "/repo/src", "/repo/src/a.c"] {
                let fresh = cache
                    .revisions(&wc, Path::new(path), Some(10), || Ok(vec![revision("4")]))
                    .unwrap();
                assert_eq!(fresh[0].number, "4", "{label} {path}");
            }
            let kept = cache
                .revisions(&wc, Path::new("/repo/docs"), Some(10), || panic!("docs refetched"))
                .unwrap();
            assert_eq!(kept[0].number, "3");
        }
    }

    #[test]
    fn working_copy_is_memoised_with_tracked_flag() {
        let cache = PathCache::new();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(WorkingCopy::new("/repo", Some("svn://host/repo"))))
        };

        let first = cache.working_copy(Path::new("/repo"), compute).unwrap().unwrap();
        let second = cache.working_copy(Path::new("/repo"), compute).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.record(Path::new("/repo")).unwrap().tracked, Some(true));

        assert!(cache.working_copy(Path::new("/plain"), || Ok(None)).unwrap().is_none());
        assert!(
            cache
                .working_copy(Path::new("/plain"), || panic!("must not recompute"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn concurrent_access_is_consistent() {
        let cache = Arc::new(PathCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    let path = PathBuf::from(format!("/repo/file{}", i % 2));
                    for _ in 0..100 {
                        let value = cache
                            .tracked(&path, || {
                                calls.fetch_add(1, Ordering::SeqCst);
                                Ok(i % 2 == 0)
                            })
                            .unwrap();
                        assert_eq!(value, i % 2 == 0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Racing misses may compute more than once, but never per call.
        assert!(calls.load(Ordering::SeqCst) <= 8);
    }

    #[test]
    fn clear_empties_everything() {
        let cache = PathCache::new();
        cache.tracked(Path::new("/repo/a"), || Ok(true)).unwrap();
        cache.clear().unwrap();
        assert!(cache.record(Path::new("/repo/a")).is_none());
    }
}
