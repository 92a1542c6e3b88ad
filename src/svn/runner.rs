//! Running the svn binary.
//!
//! Arguments always travel as an argument vector. Nothing is ever handed to a
//! shell, so a file name with spaces or `;` stays a single operand. On top of
//! that, every path operand goes after `--`, and paths containing `@` get a
//! trailing `@` so svn does not read the tail as a peg revision.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use crate::error::SvnError;
use crate::types::CommandResult;

/// Log target used for command logging.
pub const COMMAND_LOG_TARGET: &str = "svnp::command";

/// How an invocation is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Wait for the process and capture its output.
    Blocking,
    /// Start the process and return immediately. Used for external diff tools.
    Background,
}

/// Something that can run svn. `SvnCli` in production, a scripted fake in tests.
pub trait Executor: Send + Sync {
    /// Run svn with `args` in `cwd`.
    ///
    /// A non-zero exit is reported through `CommandResult::exit_code`, not as
    /// an error. `Err` means the process could not be started.
    fn execute(&self, args: &[OsString], cwd: &Path, mode: Mode)
    -> Result<CommandResult, SvnError>;
}

/// Validate a revision argument (`42`, `HEAD`, `10:20`, `{2024-01-01}`).
///
/// Rejects:
/// - Empty strings
/// - Strings starting with `-` (could be interpreted as flags)
/// - Strings containing null bytes or control characters
pub fn validate_revision(value: &str) -> Result<(), SvnError> {
    if value.is_empty() {
        return Err(SvnError::InvalidArgument(
            "revision cannot be empty".to_string(),
        ));
    }
    if value.starts_with('-') {
        return Err(SvnError::InvalidArgument(
            "revision cannot start with '-'".to_string(),
        ));
    }
    if value.bytes().any(|b| b == 0 || b < 0x20) {
        return Err(SvnError::InvalidArgument(
            "revision cannot contain null or control characters".to_string(),
        ));
    }
    Ok(())
}

/// Escape a path operand against peg-revision parsing.
fn path_operand(path: &Path) -> OsString {
    let mut operand = path.as_os_str().to_os_string();
    if path.to_string_lossy().contains('@') {
        operand.push("@");
    }
    operand
}

/// Builder for one svn argument vector.
#[derive(Debug, Clone)]
pub struct SvnArgs {
    subcommand: &'static str,
    options: Vec<OsString>,
    operands: Vec<OsString>,
}

impl SvnArgs {
    pub fn new(subcommand: &'static str) -> Self {
        Self {
            subcommand,
            options: Vec::new(),
            operands: Vec::new(),
        }
    }

    /// Add a bare flag such as `--xml`.
    pub fn flag(mut self, flag: &'static str) -> Self {
        self.options.push(flag.into());
        self
    }

    /// Add a flag only when `enabled`.
    pub fn flag_if(self, enabled: bool, flag: &'static str) -> Self {
        if enabled { self.flag(flag) } else { self }
    }

    /// Add `name value` as two separate arguments.
    pub fn option(mut self, name: &'static str, value: impl AsRef<OsStr>) -> Self {
        self.options.push(name.into());
        self.options.push(value.as_ref().to_os_string());
        self
    }

    /// Add `--revision value` after validating the revision.
    pub fn revision(self, revision: Option<&str>) -> Result<Self, SvnError> {
        match revision {
            Some(rev) => {
                validate_revision(rev)?;
                Ok(self.option("--revision", rev))
            }
            None => Ok(self),
        }
    }

    /// Add a path operand.
    pub fn path(mut self, path: &Path) -> Self {
        self.operands.push(path_operand(path));
        self
    }

    pub fn paths<'a>(mut self, paths: impl IntoIterator<Item = &'a PathBuf>) -> Self {
        for path in paths {
            self.operands.push(path_operand(path));
        }
        self
    }

    /// The finished argument vector, without the binary.
    pub fn build(self) -> Vec<OsString> {
        let mut args = Vec::with_capacity(self.options.len() + self.operands.len() + 3);
        args.push(OsString::from(self.subcommand));
        args.push(OsString::from("--non-interactive"));
        args.extend(self.options);
        if !self.operands.is_empty() {
            args.push(OsString::from("--"));
            args.extend(self.operands);
        }
        args
    }
}

/// Render an argument vector the way a shell user would type it. Display only.
pub fn render_command(binary: &Path, args: &[OsString]) -> String {
    std::iter::once(binary.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(|arg| shell_quote(&arg.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// svn CLI wrapper with hardening.
#[derive(Debug, Clone)]
pub struct SvnCli {
    binary: PathBuf,
    log_commands: bool,
}

impl SvnCli {
    pub fn new(binary: impl Into<PathBuf>, log_commands: bool) -> Self {
        Self {
            binary: binary.into(),
            log_commands,
        }
    }

    /// Create a hardened Command.
    ///
    /// Applies:
    /// - `LC_MESSAGES=C` - stable English stderr for classification
    /// - closed stdin - svn can never block on a prompt
    fn command(&self, args: &[OsString], cwd: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.env("LC_MESSAGES", "C");
        cmd.args(args);
        cmd.current_dir(cwd);
        cmd.stdin(Stdio::null());
        cmd
    }
}

impl Executor for SvnCli {
    fn execute(
        &self,
        args: &[OsString],
        cwd: &Path,
        mode: Mode,
    ) -> Result<CommandResult, SvnError> {
        // Logged before spawning so a hung svn still shows up.
        if self.log_commands {
            log::info!(target: COMMAND_LOG_TARGET, "{}", render_command(&self.binary, args));
        }

        match mode {
            Mode::Blocking => {
                let output = self
                    .command(args, cwd)
                    .output()
                    .map_err(SvnError::Spawn)?;
                Ok(CommandResult {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            Mode::Background => {
                let mut child = self
                    .command(args, cwd)
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(SvnError::Spawn)?;

                // Reap the child so it does not linger as a zombie.
                let spawned = thread::Builder::new()
                    .name("svnp-reaper".to_string())
                    .spawn(move || match child.wait() {
                        Ok(status) => log::debug!("Background svn exited with {}", status),
                        Err(e) => log::warn!("Failed to wait for background svn: {}", e),
                    });
                if let Err(e) = spawned {
                    log::warn!("Failed to spawn reaper thread: {}", e);
                }

                Ok(CommandResult::detached())
            }
        }
    }
}
