//! Low-level git building blocks used by the publish transaction.

use super::execute_git;
use crate::error::Result;
use crate::utils::command;

/// Whether `dir` is inside a git work tree.
pub fn is_git_repo(dir: &str) -> bool {
    command::succeeded_in(dir, "git", &["rev-parse", "--is-inside-work-tree"])
}

/// Whether `path` (relative to `dir`) is tracked by git.
pub fn is_tracked(dir: &str, path: &str) -> bool {
    command::succeeded_in(dir, "git", &["ls-files", "--error-unmatch", path])
}

/// The currently checked-out branch name.
pub fn current_branch(dir: &str) -> Result<String> {
    execute_git(dir, &["rev-parse", "--abbrev-ref", "HEAD"])
}

/// Set the repo-local committer identity.
pub fn set_local_identity(dir: &str, name: &str, email: &str) -> Result<()> {
    execute_git(dir, &["config", "user.name", name])?;
    execute_git(dir, &["config", "user.email", email])?;
    Ok(())
}

pub fn get_remote_url(dir: &str, remote: &str) -> Result<String> {
    execute_git(dir, &["remote", "get-url", remote])
}

pub fn set_remote_url(dir: &str, remote: &str, url: &str) -> Result<()> {
    execute_git(dir, &["remote", "set-url", remote, url])?;
    Ok(())
}

/// Stage every change in the work tree, including untracked files.
pub fn stage_all(dir: &str) -> Result<()> {
    execute_git(dir, &["add", "--all"])?;
    Ok(())
}

/// Unstage the given paths, leaving their work-tree content alone.
///
/// Paths that were never staged are fine; `git reset` ignores them.
pub fn unstage(dir: &str, paths: &[&str]) -> Result<()> {
    if paths.is_empty() {
        return Ok(());
    }
    let mut args = vec!["reset", "HEAD", "--"];
    args.extend_from_slice(paths);
    execute_git(dir, &args)?;
    Ok(())
}

/// Whether anything is staged for commit.
pub fn has_staged_changes(dir: &str) -> bool {
    !command::succeeded_in(dir, "git", &["diff", "--cached", "--quiet"])
}

pub fn commit(dir: &str, message: &str) -> Result<()> {
    execute_git(dir, &["commit", "-m", message])?;
    Ok(())
}

pub fn create_branch(dir: &str, branch: &str) -> Result<()> {
    execute_git(dir, &["checkout", "-b", branch])?;
    Ok(())
}

pub fn push_branch(dir: &str, remote: &str, branch: &str) -> Result<()> {
    execute_git(dir, &["push", remote, branch])?;
    Ok(())
}

/// Push the current branch to its same-named ref on `remote`.
///
/// `push origin HEAD` works without an upstream configured.
pub fn push_current(dir: &str, remote: &str) -> Result<()> {
    execute_git(dir, &["push", remote, "HEAD"])?;
    Ok(())
}
