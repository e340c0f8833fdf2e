//! Git operations via the system `git` binary.
//!
//! Every function shells out through [`crate::utils::command`] and maps
//! failures to `git.command_failed` errors carrying git's own stderr.

pub mod primitives;

pub use primitives::*;

use crate::error::{Error, Result};

/// Run a git subcommand in `dir`, returning trimmed stdout.
pub(crate) fn execute_git(dir: &str, args: &[&str]) -> Result<String> {
    let context = format!("git {}", args.first().copied().unwrap_or(""));
    crate::utils::command::run_in(dir, "git", args, &context)
        .map_err(|e| Error::git_command_failed(e.message))
}
