//! Process-wide state, constructed once and passed to every operation.

use std::sync::Arc;

use crate::cache::{CachePaths, PathCache, RevisionStore};
use crate::commit::{ArtifactManager, LockCoordinator};
use crate::config::Settings;
use crate::error::SvnError;
use crate::svn::{Executor, SvnCli};

/// Everything shared between commands: settings, the svn runner, the path
/// cache, commit locks and the commit-file manager.
pub struct Context {
    settings: Settings,
    executor: Arc<dyn Executor>,
    cache: PathCache,
    locks: LockCoordinator,
    artifacts: ArtifactManager,
}

impl Context {
    /// Build a context that runs the configured svn binary.
    pub fn new(settings: Settings) -> Result<Self, SvnError> {
        let binary = settings.binary()?.to_path_buf();
        let executor = SvnCli::new(binary, settings.svn_log_commands);
        Ok(Self::with_executor(settings, Arc::new(executor)))
    }

    /// Build a context around an arbitrary executor.
    pub fn with_executor(settings: Settings, executor: Arc<dyn Executor>) -> Self {
        let store = RevisionStore::new(CachePaths::new(&settings.cache_dir));
        let artifacts = ArtifactManager::new(&settings.commit_dir);
        Self {
            settings,
            executor,
            cache: PathCache::with_store(store),
            locks: LockCoordinator::new(),
            artifacts,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    pub fn locks(&self) -> &LockCoordinator {
        &self.locks
    }

    pub fn artifacts(&self) -> &ArtifactManager {
        &self.artifacts
    }

    /// Record a repository-level failure according to `log_errors`.
    pub fn log_error(&self, operation: &str, err: &SvnError) {
        if self.settings.log_errors {
            log::warn!("svn {} failed: {}", operation, err);
        } else {
            log::debug!("svn {} failed: {}", operation, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svn::testing::ScriptedExecutor;

    #[test]
    fn new_requires_a_binary() {
        let settings = Settings::default();
        assert!(matches!(
            Context::new(settings),
            Err(SvnError::Configuration(_))
        ));
    }

    #[test]
    fn new_rejects_missing_binary() {
        let settings = Settings {
            svn_binary: Some("/definitely/not/here/svn".into()),
            ..Settings::default()
        };
        assert!(matches!(
            Context::new(settings),
            Err(SvnError::Configuration(_))
        ));
    }

    #[test]
    fn artifacts_use_commit_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            commit_dir: dir.path().to_path_buf(),
            cache_dir: dir.path().join("cache"),
            ..Settings::default()
        };
        let ctx = Context::with_executor(settings, Arc::new(ScriptedExecutor::new()));
        assert_eq!(ctx.artifacts().dir(), dir.path());
        assert_eq!(
            ctx.cache().store().unwrap().paths().root(),
            dir.path().join("cache")
        );
    }
}
