//! High-level svn operations on one file or directory.
//!
//! A `Repository` is cheap: it is opened per command and shares all state
//! through the `Context`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{WorkingCopy, relative_to};
use crate::context::Context;
use crate::error::SvnError;
use crate::svn::xml::{self, InfoEntry};
use crate::svn::{Mode, SvnArgs};
use crate::types::{ListEntry, Revision, StatusEntry, Target};

/// Name of the working-copy administrative directory.
pub const MARKER_DIR: &str = ".svn";

/// stderr fragments meaning "this path is not versioned", as opposed to a real failure.
const NOT_TRACKED_MARKERS: &[&str] = &[
    "not a working copy",
    "E155007",
    "W155010",
    "is not under version control",
];

/// Yes/no gate for destructive operations, supplied by the host.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Output shape for `status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFormat {
    /// Only show locally modified items.
    pub quiet: bool,
    /// Structured output instead of text.
    pub xml: bool,
}

/// Result of a successful `svn commit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutput {
    pub stdout: String,
    /// Revision number parsed from `Committed revision N.`, if present.
    pub revision: Option<String>,
}

/// A validated file or directory inside a configured working copy.
pub struct Repository {
    ctx: Arc<Context>,
    target: Target,
    wc: Arc<WorkingCopy>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("target", &self.target)
            .field("wc", &self.wc)
            .finish()
    }
}

impl Repository {
    /// Validate `target` against the configured roots and locate its working copy.
    ///
    /// Fails with:
    /// - `NotConfigured` when the path is outside every configured root
    /// - `MarkerMissing` when no ancestor holds a `.svn` directory
    /// - `NotTracked` when svn does not recognise the working copy
    pub fn open(ctx: Arc<Context>, target: Target) -> Result<Self, SvnError> {
        let path = target.path();
        if !path.is_absolute() {
            return Err(SvnError::InvalidArgument(format!(
                "path must be absolute: {}",
                path.display()
            )));
        }

        let roots = ctx.settings().roots()?;
        if !roots.iter().any(|root| path.starts_with(root)) {
            return Err(SvnError::NotConfigured(path.to_path_buf()));
        }

        let wc_root = match &target {
            Target::Directory(dir) if roots.iter().any(|root| root == dir) => dir.clone(),
            Target::Directory(dir) => find_wc_root(dir)?,
            Target::File(file) => {
                let parent = file
                    .parent()
                    .ok_or_else(|| SvnError::MarkerMissing(file.clone()))?;
                find_wc_root(parent).map_err(|_| SvnError::MarkerMissing(file.clone()))?
            }
        };

        let wc = ctx.cache().working_copy(&wc_root, || {
            let entry = query_info(&ctx, &wc_root, &wc_root)?;
            Ok(entry.map(|entry| WorkingCopy::new(wc_root.clone(), entry.url.as_deref())))
        })?;
        let Some(wc) = wc else {
            return Err(SvnError::NotTracked(wc_root));
        };

        log::debug!("Opened {} in working copy {}", target, wc_root.display());
        Ok(Self { ctx, target, wc })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn path(&self) -> &Path {
        self.target.path()
    }

    pub fn wc_root(&self) -> &Path {
        self.wc.root()
    }

    /// The working copy and its durable cache key.
    pub fn working_copy(&self) -> &WorkingCopy {
        &self.wc
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Whether svn knows the target. Cached per path.
    pub fn is_tracked(&self) -> Result<bool, SvnError> {
        self.ctx
            .cache()
            .tracked(self.path(), || {
                query_info(&self.ctx, self.wc_root(), self.path()).map(|entry| entry.is_some())
            })
    }

    /// Fail with `NotTracked` unless the target is versioned.
    pub fn require_tracked(&self) -> Result<(), SvnError> {
        if self.is_tracked()? {
            Ok(())
        } else {
            Err(SvnError::NotTracked(self.path().to_path_buf()))
        }
    }

    /// Whether anything at or below the target has local changes. Cached per path.
    pub fn is_modified(&self) -> Result<bool, SvnError> {
        self.ctx.cache().modified(self.path(), || {
            let entries = self.status_entries()?;
            Ok(entries.iter().any(|entry| entry.item.is_modification()))
        })
    }

    /// `svn status` as text or XML.
    pub fn status(&self, format: StatusFormat) -> Result<String, SvnError> {
        let args = SvnArgs::new("status")
            .flag_if(format.quiet, "--quiet")
            .flag_if(format.xml, "--xml")
            .path(self.path());
        self.run("status", args)
    }

    /// Structured status with paths relative to the working-copy root.
    pub fn status_entries(&self) -> Result<Vec<StatusEntry>, SvnError> {
        let output = self.status(StatusFormat {
            quiet: false,
            xml: true,
        })?;
        let entries = self.parsed("status", xml::parse_status(&output))?;

        entries
            .into_iter()
            .map(|entry| {
                let path = if entry.path.is_absolute() {
                    relative_to(self.wc_root(), &entry.path)?
                } else {
                    entry.path
                };
                let path = if path.as_os_str().is_empty() {
                    PathBuf::from(".")
                } else {
                    path
                };
                Ok(StatusEntry {
                    path,
                    item: entry.item,
                })
            })
            .collect()
    }

    /// Structured `svn info` for the target.
    pub fn info(&self) -> Result<Vec<InfoEntry>, SvnError> {
        let output = self.run("info", SvnArgs::new("info").flag("--xml").path(self.path()))?;
        self.parsed("info", xml::parse_info(&output))
    }

    pub fn add(&self) -> Result<String, SvnError> {
        let output = self.run("add", SvnArgs::new("add").path(self.path()))?;
        self.invalidate(self.path());
        Ok(output)
    }

    /// Revert local changes after `confirm` agrees. Returns false when declined.
    pub fn revert(&self, confirm: &dyn Confirm) -> Result<bool, SvnError> {
        let kind = if self.target.is_file() {
            "file"
        } else {
            "directory"
        };
        let prompt = format!(
            "Are you sure you want to revert {}:\n\n{}",
            kind,
            self.path().display()
        );
        if !confirm.confirm(&prompt) {
            log::info!("Revert of {} declined", self.path().display());
            return Ok(false);
        }

        let args = SvnArgs::new("revert")
            .flag_if(!self.target.is_file(), "--recursive")
            .path(self.path());
        self.run("revert", args)?;
        self.invalidate(self.path());
        Ok(true)
    }

    /// Commit `paths` (the target when empty) with the message in `artifact`.
    ///
    /// Fails before running svn if the commit file is missing.
    pub fn commit(&self, artifact: &Path, paths: &[PathBuf]) -> Result<CommitOutput, SvnError> {
        if !artifact.is_file() {
            return Err(SvnError::Artifact(format!(
                "commit file does not exist: {}",
                artifact.display()
            )));
        }

        let mut args = SvnArgs::new("commit").option("--file", artifact);
        args = if paths.is_empty() {
            args.path(self.path())
        } else {
            args.paths(paths)
        };
        let stdout = self.run("commit", args)?;

        if paths.is_empty() {
            self.invalidate(self.path());
        }
        for path in paths {
            self.invalidate(path);
        }

        let revision = committed_revision(&stdout);
        match &revision {
            Some(rev) => {
                log::info!("Committed revision {} from {}", rev, self.wc_root().display())
            }
            None => log::debug!("Commit output had no revision line"),
        }
        Ok(CommitOutput { stdout, revision })
    }

    /// Diff against `revision` (BASE when `None`).
    ///
    /// With an external `tool` the diff runs detached and `None` is returned,
    /// since the tool shows its own window.
    pub fn diff(
        &self,
        revision: Option<&str>,
        tool: Option<&str>,
    ) -> Result<Option<String>, SvnError> {
        let mut args = SvnArgs::new("diff").revision(revision)?;
        if let Some(tool) = tool {
            args = args.option("--diff-cmd", tool);
        }
        let args = args.path(self.path());

        match tool {
            Some(_) => {
                self.execute("diff", args, Mode::Background)?;
                Ok(None)
            }
            None => self.run("diff", args).map(Some),
        }
    }

    pub fn annotate(&self, revision: Option<&str>) -> Result<String, SvnError> {
        self.require_file("annotate")?;
        let args = SvnArgs::new("annotate").revision(revision)?.path(self.path());
        self.run("annotate", args)
    }

    /// File contents at `revision`.
    pub fn cat(&self, revision: Option<&str>) -> Result<String, SvnError> {
        self.require_file("cat")?;
        let args = SvnArgs::new("cat").revision(revision)?.path(self.path());
        self.run("cat", args)
    }

    /// Revision history, newest first.
    ///
    /// A `limit` of `None` or `Some(0)` fetches everything. Results without an
    /// explicit `revision` are cached per (path, limit), including on disk.
    pub fn log(
        &self,
        limit: Option<u32>,
        revision: Option<&str>,
    ) -> Result<Arc<Vec<Revision>>, SvnError> {
        let limit = limit.filter(|&n| n > 0);
        let fetch = || -> Result<Vec<Revision>, SvnError> {
            let mut args = SvnArgs::new("log")
                .flag("--verbose")
                .flag("--xml")
                .flag("--stop-on-copy");
            if let Some(limit) = limit {
                args = args.option("--limit", limit.to_string());
            }
            let args = args.revision(revision)?.path(self.path());
            let output = self.run("log", args)?;
            self.parsed("log", xml::parse_log(&output))
        };

        match revision {
            Some(_) => fetch().map(Arc::new),
            None => self
                .ctx
                .cache()
                .revisions(&self.wc, self.path(), limit, fetch),
        }
    }

    /// `svn update --accept postpone`; conflicts are left for the user.
    pub fn update(&self) -> Result<String, SvnError> {
        let args = SvnArgs::new("update")
            .option("--accept", "postpone")
            .path(self.path());
        let output = self.run("update", args)?;
        self.invalidate(self.path());
        Ok(output)
    }

    /// Entries of the target directory, or of the directory holding the target file.
    pub fn ls(&self) -> Result<Vec<ListEntry>, SvnError> {
        let base = match &self.target {
            Target::Directory(dir) => dir.as_path(),
            Target::File(file) => file.parent().unwrap_or(self.wc.root()),
        };
        let output = self.run("ls", SvnArgs::new("ls").flag("--xml").path(base))?;
        self.parsed("ls", xml::parse_list(&output, base))
    }

    /// Forget cached state for `path` and the history of its parents, in
    /// memory and on disk.
    pub fn invalidate(&self, path: &Path) {
        self.ctx.cache().invalidate(path, Some(self.wc.as_ref()));
    }

    fn require_file(&self, operation: &str) -> Result<(), SvnError> {
        if self.target.is_file() {
            Ok(())
        } else {
            Err(SvnError::InvalidArgument(format!(
                "{} needs a file, got {}",
                operation, self.target
            )))
        }
    }

    fn execute(
        &self,
        operation: &str,
        args: SvnArgs,
        mode: Mode,
    ) -> Result<String, SvnError> {
        let result = self
            .ctx
            .executor()
            .execute(&args.build(), self.wc.root(), mode)
            .inspect_err(|e| self.ctx.log_error(operation, e))?;
        if !result.success() {
            let err = SvnError::subprocess(result.exit_code, &result.stderr);
            self.ctx.log_error(operation, &err);
            return Err(err);
        }
        Ok(result.stdout)
    }

    fn run(&self, operation: &str, args: SvnArgs) -> Result<String, SvnError> {
        self.execute(operation, args, Mode::Blocking)
    }

    fn parsed<T>(&self, operation: &str, result: Result<T, SvnError>) -> Result<T, SvnError> {
        result.inspect_err(|e| self.ctx.log_error(operation, e))
    }
}

/// Nearest directory at or above `start` that holds a `.svn` directory.
fn find_wc_root(start: &Path) -> Result<PathBuf, SvnError> {
    start
        .ancestors()
        .find(|dir| dir.join(MARKER_DIR).is_dir())
        .map(Path::to_path_buf)
        .ok_or_else(|| SvnError::MarkerMissing(start.to_path_buf()))
}

/// `svn info` for `path`, or `None` when it is not versioned.
///
/// "Not a working copy" style failures are a plain `None`; anything else
/// that makes svn exit non-zero is an error carrying its stderr.
fn query_info(
    ctx: &Context,
    wc_root: &Path,
    path: &Path,
) -> Result<Option<InfoEntry>, SvnError> {
    let args = SvnArgs::new("info").flag("--xml").path(path).build();
    let result = ctx
        .executor()
        .execute(&args, wc_root, Mode::Blocking)
        .inspect_err(|e| ctx.log_error("info", e))?;

    if !result.success() {
        if is_not_tracked_stderr(&result.stderr) {
            log::debug!("{} is not under version control", path.display());
            return Ok(None);
        }
        let err = SvnError::subprocess(result.exit_code, &result.stderr);
        ctx.log_error("info", &err);
        return Err(err);
    }

    let entries = xml::parse_info(&result.stdout).inspect_err(|e| ctx.log_error("info", e))?;
    Ok(entries.into_iter().next())
}

fn is_not_tracked_stderr(stderr: &str) -> bool {
    NOT_TRACKED_MARKERS.iter().any(|marker| stderr.contains(marker))
}

/// Revision number from `svn commit` output (`Committed revision 42.`).
pub fn committed_revision(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("Committed revision ")?;
        let number = rest.trim_end_matches('.');
        (!number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()))
            .then(|| number.to_string())
    })
}
