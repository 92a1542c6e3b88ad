//! svn binary access: argument building, execution and output parsing.

mod runner;
#[cfg(test)]
pub(crate) mod testing;
pub mod xml;

pub use runner::{
    COMMAND_LOG_TARGET, Executor, Mode, SvnArgs, SvnCli, render_command, validate_revision,
};
