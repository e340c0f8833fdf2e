use std::path::Path;

use clap::Args;

use relink::pipeline::{self, UpdateOutput};
use relink::remote::{GithubPublisher, RemotePublisher};
use relink::repo::RepoContext;

use super::CmdResult;

#[derive(Args)]
pub struct UpdateArgs {
    /// Rule configuration file, relative to the repository directory
    #[arg(long, default_value = ".relink.yml")]
    pub config: String,

    /// Repository directory to operate on
    #[arg(long, default_value = ".")]
    pub repo_dir: String,

    /// GitHub token (falls back to RELINK_TOKEN, then GITHUB_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Report what would change without writing or publishing
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(args: UpdateArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<UpdateOutput> {
    let config_path = Path::new(&args.repo_dir).join(&args.config);
    let config = relink::config::load(&config_path)?;
    let ctx = RepoContext::resolve(&args.repo_dir, &config, args.token);

    // PR mode needs credentials before any file is touched.
    let github;
    let publisher: Option<&dyn RemotePublisher> = if config.create_pr && !args.dry_run {
        let slug = ctx.require_slug()?.to_string();
        let token = ctx.require_token()?.to_string();
        github = GithubPublisher::new(slug, token);
        Some(&github)
    } else {
        None
    };

    let output = pipeline::run_update(&config, &ctx, publisher, args.dry_run)?;
    Ok((output, 0))
}
