//! Commit message files.
//!
//! A commit file looks like this, where the user types above the sentinel:
//!
//! ```text
//!
//! --This line, and those below, will be ignored--
//!
//! M	src/a.txt
//! A	src/b.txt
//! ```

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::SvnError;

/// Everything from this line down is dropped from the message.
pub const SENTINEL: &str = "--This line, and those below, will be ignored--";

/// How many file names are tried before giving up.
pub const MAX_CANDIDATES: usize = 100;

const BASE_NAME: &str = "svn-commit";
const EXTENSION: &str = "tmp";

/// Creates, reads and deletes commit message files in one directory.
#[derive(Debug, Clone)]
pub struct ArtifactManager {
    dir: PathBuf,
}

impl ArtifactManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Candidate `n`: `svn-commit.tmp`, then `svn-commit1.tmp` ... `svn-commit99.tmp`.
    pub fn candidate(&self, n: usize) -> PathBuf {
        if n == 0 {
            self.dir.join(format!("{}.{}", BASE_NAME, EXTENSION))
        } else {
            self.dir.join(format!("{}{}.{}", BASE_NAME, n, EXTENSION))
        }
    }

    /// Create a fresh commit file seeded with `status`.
    ///
    /// The first free candidate name is claimed with `create_new`, so two
    /// callers can never end up with the same file.
    pub fn create(&self, status: &str) -> Result<PathBuf, SvnError> {
        for n in 0..MAX_CANDIDATES {
            let path = self.candidate(n);
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(SvnError::Artifact(format!(
                        "failed to create {}: {}",
                        path.display(),
                        e
                    )));
                }
            };

            if let Err(e) = file.write_all(render(status).as_bytes()) {
                drop(file);
                let _ = std::fs::remove_file(&path);
                return Err(SvnError::Artifact(format!(
                    "failed to write commit data to {}: {}",
                    path.display(),
                    e
                )));
            }

            log::debug!("Created commit file {}", path.display());
            return Ok(path);
        }

        Err(SvnError::Artifact(format!(
            "failed to create a unique file name in {}",
            self.dir.display()
        )))
    }

    /// Read the commit file and extract the user's message.
    pub fn read_message(&self, path: &Path) -> Result<String, SvnError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SvnError::Artifact(format!(
                "failed to read commit message from {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(extract_message(&contents))
    }

    /// Remove a commit file. Failures are logged, never returned.
    pub fn delete(&self, path: &Path) -> bool {
        match std::fs::remove_file(path) {
            Ok(()) => {
                log::debug!("Deleted commit file {}", path.display());
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                log::warn!("Failed to delete commit file {}: {}", path.display(), e);
                false
            }
        }
    }
}

/// Initial contents of a commit file.
pub fn render(status: &str) -> String {
    format!("\n{}\n\n{}", SENTINEL, status)
}

/// The message part of a commit file: everything above the sentinel line, trimmed.
///
/// Without a sentinel line the whole text is the message. An empty result
/// means "do not commit".
pub fn extract_message(contents: &str) -> String {
    let mut message = String::new();
    for line in contents.split_inclusive('\n') {
        if line.trim_end_matches(['\n', '\r']) == SENTINEL {
            break;
        }
        message.push_str(line);
    }
    message.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_writes_sentinel_and_status() {
        let dir = tempdir().unwrap();
        let manager = ArtifactManager::new(dir.path());

        let path = manager.create("M\ta.txt\n").unwrap();

        assert_eq!(path, dir.path().join("svn-commit.tmp"));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "\n--This line, and those below, will be ignored--\n\nM\ta.txt\n"
        );
    }

    #[test]
    fn create_skips_taken_names() {
        let dir = tempdir().unwrap();
        let manager = ArtifactManager::new(dir.path());
        std::fs::write(dir.path().join("svn-commit.tmp"), "taken").unwrap();
        std::fs::write(dir.path().join("svn-commit1.tmp"), "taken").unwrap();

        let path = manager.create("A\tb.txt\n").unwrap();
        assert_eq!(path, dir.path().join("svn-commit2.tmp"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("svn-commit.tmp")).unwrap(),
            "taken"
        );
    }

    #[test]
    fn create_fails_when_all_candidates_taken() {
        let dir = tempdir().unwrap();
        let manager = ArtifactManager::new(dir.path());
        for n in 0..MAX_CANDIDATES {
            std::fs::write(manager.candidate(n), "taken").unwrap();
        }
        assert_eq!(manager.candidate(99), dir.path().join("svn-commit99.tmp"));

        let result = manager.create("M\ta.txt\n");

        assert!(matches!(result, Err(SvnError::Artifact(_))));
        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, MAX_CANDIDATES);
    }

    #[test]
    fn create_in_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let manager = ArtifactManager::new(dir.path().join("nope"));
        assert!(matches!(manager.create("x"), Err(SvnError::Artifact(_))));
    }

    #[test]
    fn unmodified_file_yields_empty_message() {
        assert_eq!(extract_message(&render("M\ta.txt\n")), "");
    }

    #[test]
    fn text_above_sentinel_is_the_message() {
        let edited = format!("fix bug{}", render("M\ta.txt\n"));
        assert_eq!(extract_message(&edited), "fix bug");

        let multi = format!("  first line\n\nsecond line  \n{}", render("M\ta.txt\n"));
        assert_eq!(extract_message(&multi), "first line\n\nsecond line");
    }

    #[test]
    fn sentinel_must_be_a_whole_line() {
        let contents = format!("see {} here\n{}\n", SENTINEL, SENTINEL);
        assert_eq!(extract_message(&contents), format!("see {} here", SENTINEL));
    }

    #[test]
    fn crlf_sentinel_is_recognised() {
        let contents = format!("msg\r\n{}\r\nM\ta.txt\r\n", SENTINEL);
        assert_eq!(extract_message(&contents), "msg");
    }

    #[test]
    fn missing_sentinel_uses_whole_text() {
        assert_eq!(extract_message("  just a message \n"), "just a message");
    }

    #[test]
    fn read_message_round_trip() {
        let dir = tempdir().unwrap();
        let manager = ArtifactManager::new(dir.path());
        let path = manager.create("M\ta.txt\n").unwrap();
        assert_eq!(manager.read_message(&path).unwrap(), "");

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, format!("fix bug{}", contents)).unwrap();
        assert_eq!(manager.read_message(&path).unwrap(), "fix bug");
    }

    #[test]
    fn read_missing_file_is_artifact_error() {
        let dir = tempdir().unwrap();
        let manager = ArtifactManager::new(dir.path());
        assert!(matches!(
            manager.read_message(&dir.path().join("gone.tmp")),
            Err(SvnError::Artifact(_))
        ));
    }

    #[test]
    fn delete_is_best_effort() {
        let dir = tempdir().unwrap();
        let manager = ArtifactManager::new(dir.path());
        let path = manager.create("x").unwrap();

        assert!(manager.delete(&path));
        assert!(!path.exists());
        assert!(manager.delete(&path));
    }
}
