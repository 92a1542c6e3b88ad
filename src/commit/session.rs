//! One commit flow, from commit file to `svn commit`.
//!
//! A session owns a commit file and the lock on the paths listed in it.
//! Both are given back exactly once: after a successful commit, on
//! `abandon`, or when the session is dropped.

use std::path::{Path, PathBuf};

use crate::error::SvnError;
use crate::repository::Repository;

/// Placeholder in the clipboard template.
pub const REVISION_PLACEHOLDER: &str = "$revision";

/// What a finished commit produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// svn's stdout.
    pub output: String,
    pub revision: Option<String>,
    /// Clipboard text built from the configured template, if any.
    pub clipboard: Option<String>,
}

/// An in-flight commit.
#[derive(Debug)]
pub struct CommitSession<'r> {
    repo: &'r Repository,
    artifact: PathBuf,
    paths: Vec<PathBuf>,
    finished: bool,
}

impl<'r> CommitSession<'r> {
    /// Start a commit of everything committable at or below the repository target.
    ///
    /// Fails with `LockConflict` if any of those paths is part of another
    /// session; in that case no commit file is left behind.
    pub fn begin(repo: &'r Repository) -> Result<Self, SvnError> {
        repo.require_tracked()?;
        let ctx = repo.context();

        let entries: Vec<_> = repo
            .status_entries()?
            .into_iter()
            .filter(|entry| entry.item.is_committable())
            .collect();
        if entries.is_empty() {
            return Err(SvnError::NothingToCommit);
        }

        let status: String = entries.iter().map(|entry| format!("{}\n", entry)).collect();
        let paths: Vec<PathBuf> = entries
            .iter()
            .map(|entry| repo.wc_root().join(&entry.path))
            .collect();

        ctx.locks().check(&paths)?;
        let artifact = ctx.artifacts().create(&status)?;
        if let Err(e) = ctx.locks().try_lock(&artifact, paths.iter().cloned()) {
            ctx.artifacts().delete(&artifact);
            return Err(e);
        }

        log::info!(
            "Started commit of {} path(s) with {}",
            paths.len(),
            artifact.display()
        );
        Ok(Self {
            repo,
            artifact,
            paths,
            finished: false,
        })
    }

    /// The commit file the user edits.
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Absolute paths covered by this commit.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Read the message and run `svn commit`.
    ///
    /// An empty message or a failed commit leaves the session open, so the
    /// caller can edit again and retry, or abandon.
    pub fn commit(&mut self) -> Result<CommitOutcome, SvnError> {
        if self.finished {
            return Err(SvnError::InvalidArgument(
                "commit session already finished".to_string(),
            ));
        }

        let repo = self.repo;
        let ctx = repo.context();
        let message = ctx.artifacts().read_message(&self.artifact)?;
        if message.is_empty() {
            return Err(SvnError::EmptyMessage);
        }

        let output = repo.commit(&self.artifact, &self.paths)?;
        self.finish();

        let clipboard = match (&ctx.settings().svn_commit_clipboard, &output.revision) {
            (Some(template), Some(revision)) => Some(format_clipboard(template, revision)),
            _ => None,
        };
        Ok(CommitOutcome {
            output: output.stdout,
            revision: output.revision,
            clipboard,
        })
    }

    /// End the flow without committing.
    pub fn abandon(mut self) {
        log::info!("Commit with {} abandoned", self.artifact.display());
        self.finish();
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        let ctx = self.repo.context();
        ctx.locks().release(&self.artifact);
        ctx.artifacts().delete(&self.artifact);
        self.finished = true;
    }
}

impl Drop for CommitSession<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::debug!("Commit session for {} dropped", self.artifact.display());
            self.finish();
        }
    }
}

/// Fill `$revision` in a clipboard template.
pub fn format_clipboard(template: &str, revision: &str) -> String {
    template.replace(REVISION_PLACEHOLDER, revision)
}
