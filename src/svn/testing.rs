//! Scripted stand-in for the svn binary.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{Executor, Mode};
use crate::error::SvnError;
use crate::types::CommandResult;

/// A recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub mode: Mode,
}

impl Call {
    pub fn subcommand(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }
}

/// Replies are matched by subcommand; unmatched calls get the fallback.
pub struct ScriptedExecutor {
    replies: Mutex<Vec<(String, VecDeque<CommandResult>)>>,
    calls: Mutex<Vec<Call>>,
    fallback: CommandResult,
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            fallback: CommandResult {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            },
        }
    }

    /// Queue a reply for the next `subcommand` invocation.
    pub fn reply(&self, subcommand: &str, exit_code: i32, stdout: &str, stderr: &str) {
        let result = CommandResult {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        };
        let mut replies = self.replies.lock().unwrap();
        match replies.iter_mut().find(|(name, _)| name == subcommand) {
            Some((_, queue)) => queue.push_back(result),
            None => replies.push((subcommand.to_string(), VecDeque::from([result]))),
        }
    }

    pub fn ok(&self, subcommand: &str, stdout: &str) {
        self.reply(subcommand, 0, stdout, "");
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, subcommand: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.subcommand() == subcommand)
            .count()
    }

    pub fn last(&self, subcommand: &str) -> Option<Call> {
        self.calls()
            .into_iter()
            .rev()
            .find(|c| c.subcommand() == subcommand)
    }
}

impl Executor for ScriptedExecutor {
    fn execute(
        &self,
        args: &[OsString],
        cwd: &Path,
        mode: Mode,
    ) -> Result<CommandResult, SvnError> {
        let call = Call {
            args: args
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
            cwd: cwd.to_path_buf(),
            mode,
        };
        let subcommand = call.subcommand().to_string();
        self.calls.lock().unwrap().push(call);

        if mode == Mode::Background {
            return Ok(CommandResult::detached());
        }

        let mut replies = self.replies.lock().unwrap();
        let reply = replies
            .iter_mut()
            .find(|(name, _)| *name == subcommand)
            .and_then(|(_, queue)| queue.pop_front());
        Ok(reply.unwrap_or_else(|| self.fallback.clone()))
    }
}
