use std::path::Path;

use clap::Args;

use relink::pipeline::{self, UpdateOutput};
use relink::repo::RepoContext;

use super::CmdResult;

#[derive(Args)]
pub struct CheckArgs {
    /// Rule configuration file, relative to the repository directory
    #[arg(long, default_value = ".relink.yml")]
    pub config: String,

    /// Repository directory to operate on
    #[arg(long, default_value = ".")]
    pub repo_dir: String,
}

/// Dry run with a CI-friendly exit code: nonzero when links are stale.
pub fn run(args: CheckArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<UpdateOutput> {
    let config_path = Path::new(&args.repo_dir).join(&args.config);
    let config = relink::config::load(&config_path)?;
    let ctx = RepoContext::resolve(&args.repo_dir, &config, None);

    let output = pipeline::run_update(&config, &ctx, None, true)?;
    let exit_code = if output.changed_files.is_empty() { 0 } else { 1 };
    Ok((output, exit_code))
}
