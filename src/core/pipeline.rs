//! The end-to-end update run: compile, rewrite, protect, publish.

use std::path::Path;

use serde::Serialize;

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::git;
use crate::publish::{PublishOptions, PublishTransaction};
use crate::remote::{PullRequestRef, RemotePublisher};
use crate::repo::RepoContext;
use crate::rewrite::CompiledRules;
use crate::scan;

/// The full result of an update run, shaped for the JSON envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutput {
    /// `direct` or `pull_request`.
    pub mode: &'static str,
    pub dry_run: bool,
    pub files_scanned: usize,
    pub changed_files: Vec<String>,
    pub warnings: Vec<String>,
    pub committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestRef>,
}

fn mode_name(create_pr: bool) -> &'static str {
    if create_pr {
        "pull_request"
    } else {
        "direct"
    }
}

/// Run a link update end to end.
///
/// A dry run rewrites nothing on disk and touches no git state. A real run
/// rewrites first and opens a publish transaction only when something
/// changed; the transaction snapshots protected files as the rewrite left
/// them and hands the work tree back in that exact state.
pub fn run_update(
    config: &RunConfig,
    ctx: &RepoContext,
    publisher: Option<&dyn RemotePublisher>,
    dry_run: bool,
) -> Result<UpdateOutput> {
    let rules = CompiledRules::compile(config)?;
    crate::log_status!(
        "update",
        "Compiled {} rule(s) and {} URL type(s)",
        rules.rule_count(),
        rules.url_type_count()
    );

    if dry_run {
        let report = scan::apply_rules(config, &rules, Path::new(&ctx.dir), false)?;
        return Ok(UpdateOutput {
            mode: mode_name(config.create_pr),
            dry_run: true,
            files_scanned: report.files_scanned,
            changed_files: report.changed_files,
            warnings: report.warnings,
            committed: false,
            branch: None,
            pull_request: None,
        });
    }

    if !git::is_git_repo(&ctx.dir) {
        return Err(Error::validation_invalid_argument(
            "repoDir",
            format!("{} is not a git repository", ctx.dir),
        ));
    }

    let report = scan::apply_rules(config, &rules, Path::new(&ctx.dir), true)?;
    let mut warnings = report.warnings;

    // No changes: no transaction, no git mutation, no marker.
    if report.changed_files.is_empty() {
        crate::log_status!("update", "No changes were needed");
        return Ok(UpdateOutput {
            mode: mode_name(config.create_pr),
            dry_run: false,
            files_scanned: report.files_scanned,
            changed_files: report.changed_files,
            warnings,
            committed: false,
            branch: None,
            pull_request: None,
        });
    }

    // Snapshots are taken now, after write-back, so cleanup leaves rewritten
    // protected files on disk while keeping them out of the commit.
    let mut tx = PublishTransaction::new(ctx, PublishOptions::from_config(config));
    if let Err(e) = tx.protect() {
        tx.abort();
        return Err(e);
    }

    let outcome = tx.commit_and_publish(publisher)?;
    warnings.extend(outcome.warnings);
    Ok(UpdateOutput {
        mode: mode_name(config.create_pr),
        dry_run: false,
        files_scanned: report.files_scanned,
        changed_files: report.changed_files,
        warnings,
        committed: outcome.committed,
        branch: outcome.branch,
        pull_request: outcome.pull_request,
    })
}
