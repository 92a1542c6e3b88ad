//! User settings.
//!
//! Settings live in a JSON file (`~/.config/svnp/settings.json` on Linux).
//! Every key is optional. A key with the wrong type is ignored with a
//! warning so one typo does not take the whole file down.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::cache::CachePaths;
use crate::error::SvnError;

/// Default number of log entries fetched for revision lists.
pub const DEFAULT_LOG_LIMIT: u32 = 100;

/// Effective settings after defaults are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub svn_binary: Option<PathBuf>,
    pub svn_directories: Vec<PathBuf>,
    pub svn_log_commands: bool,
    pub log_errors: bool,
    pub svn_log_limit: u32,
    pub svn_diff_tool: Option<String>,
    /// Clipboard template, `$revision` is replaced with the committed revision.
    pub svn_commit_clipboard: Option<String>,
    pub cache_dir: PathBuf,
    pub commit_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            svn_binary: None,
            svn_directories: Vec::new(),
            svn_log_commands: false,
            log_errors: false,
            svn_log_limit: DEFAULT_LOG_LIMIT,
            svn_diff_tool: None,
            svn_commit_clipboard: None,
            cache_dir: default_cache_dir(),
            commit_dir: std::env::temp_dir(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    CachePaths::default().root().to_path_buf()
}

impl Settings {
    /// Default location of the settings file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("svnp").join("settings.json"))
    }

    /// Load settings from `path`, or the default location when `None`.
    ///
    /// A missing file at the default location yields the defaults; a missing
    /// file that was asked for explicitly is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, SvnError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_json(&contents).map_err(|e| {
                SvnError::Configuration(format!("{}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                log::debug!("No settings file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(SvnError::Configuration(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Parse settings from a JSON object.
    pub fn from_json(contents: &str) -> Result<Self, SvnError> {
        let value: Value = serde_json::from_str(contents)
            .map_err(|e| SvnError::Configuration(format!("invalid JSON: {}", e)))?;
        let Value::Object(map) = value else {
            return Err(SvnError::Configuration(
                "settings must be a JSON object".to_string(),
            ));
        };

        let defaults = Self::default();
        Ok(Self {
            svn_binary: path_field(&map, "svn_binary"),
            svn_directories: paths_field(&map, "svn_directories"),
            svn_log_commands: bool_field(&map, "svn_log_commands").unwrap_or(false),
            log_errors: bool_field(&map, "log_errors").unwrap_or(false),
            svn_log_limit: limit_field(&map, "svn_log_limit").unwrap_or(DEFAULT_LOG_LIMIT),
            svn_diff_tool: string_field(&map, "svn_diff_tool"),
            svn_commit_clipboard: string_field(&map, "svn_commit_clipboard"),
            cache_dir: path_field(&map, "cache_dir").unwrap_or(defaults.cache_dir),
            commit_dir: path_field(&map, "commit_dir").unwrap_or(defaults.commit_dir),
        })
    }

    /// Validate and return the configured svn binary.
    pub fn binary(&self) -> Result<&Path, SvnError> {
        let binary = self.svn_binary.as_deref().ok_or_else(|| {
            SvnError::Configuration(
                "an SVN binary needs to be configured (svn_binary)".to_string(),
            )
        })?;
        validate_binary(binary)?;
        Ok(binary)
    }

    /// Configured repository roots; an empty list is a configuration error.
    pub fn roots(&self) -> Result<&[PathBuf], SvnError> {
        if self.svn_directories.is_empty() {
            return Err(SvnError::Configuration(
                "no repository roots configured (svn_directories)".to_string(),
            ));
        }
        Ok(&self.svn_directories)
    }
}

/// Check that `binary` is an executable regular file.
pub fn validate_binary(binary: &Path) -> Result<(), SvnError> {
    let meta = std::fs::metadata(binary).map_err(|_| {
        SvnError::Configuration(format!("SVN binary not found: {}", binary.display()))
    })?;
    if !meta.is_file() {
        return Err(SvnError::Configuration(format!(
            "SVN binary is not a file: {}",
            binary.display()
        )));
    }
    if !is_executable(&meta) {
        return Err(SvnError::Configuration(format!(
            "SVN binary is not executable: {}",
            binary.display()
        )));
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    true
}

fn present<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

fn ignored(key: &str, value: &Value) {
    log::warn!("Ignoring setting {}: unexpected value {}", key, value);
}

fn bool_field(map: &Map<String, Value>, key: &str) -> Option<bool> {
    let value = present(map, key)?;
    let result = value.as_bool();
    if result.is_none() {
        ignored(key, value);
    }
    result
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    let value = present(map, key)?;
    match value.as_str() {
        Some(s) if !s.is_empty() => Some(s.to_string()),
        _ => {
            ignored(key, value);
            None
        }
    }
}

fn path_field(map: &Map<String, Value>, key: &str) -> Option<PathBuf> {
    string_field(map, key).map(PathBuf::from)
}

fn paths_field(map: &Map<String, Value>, key: &str) -> Vec<PathBuf> {
    let Some(value) = present(map, key) else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        ignored(key, value);
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item.as_str() {
            Some(s) if !s.is_empty() => Some(PathBuf::from(s.trim_end_matches('/'))),
            _ => {
                ignored(key, item);
                None
            }
        })
        .collect()
}

fn limit_field(map: &Map<String, Value>, key: &str) -> Option<u32> {
    let value = present(map, key)?;
    let result = value.as_u64().and_then(|n| u32::try_from(n).ok());
    if result.is_none() {
        ignored(key, value);
    }
    result
}
