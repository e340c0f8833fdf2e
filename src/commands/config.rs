use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;

use relink::config::RunConfig;
use relink::rewrite::CompiledRules;

use super::CmdResult;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Validate a rule file, including pattern compilation
    Validate {
        /// Rule configuration file
        #[arg(long, default_value = ".relink.yml")]
        config: PathBuf,
    },
    /// Print the parsed configuration with defaults applied
    Show {
        /// Rule configuration file
        #[arg(long, default_value = ".relink.yml")]
        config: PathBuf,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateOutput {
    pub valid: bool,
    pub rules: usize,
    pub url_types: usize,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum ConfigCommandOutput {
    Validated(ValidateOutput),
    Shown(Box<RunConfig>),
}

pub fn run(
    args: ConfigArgs,
    _global: &crate::commands::GlobalArgs,
) -> CmdResult<ConfigCommandOutput> {
    match args.command {
        ConfigCommand::Validate { config } => {
            let parsed = relink::config::load(&config)?;
            let rules = CompiledRules::compile(&parsed)?;
            Ok((
                ConfigCommandOutput::Validated(ValidateOutput {
                    valid: true,
                    rules: rules.rule_count(),
                    url_types: rules.url_type_count(),
                }),
                0,
            ))
        }
        ConfigCommand::Show { config } => {
            let parsed = relink::config::load(&config)?;
            Ok((ConfigCommandOutput::Shown(Box::new(parsed)), 0))
        }
    }
}
