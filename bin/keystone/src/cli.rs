use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::{Args, Parser, Subcommand};
use keystone_deploy::{MANIFEST_FILENAME, SETTINGS_FILENAME};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "keystone")]
#[command(
    author,
    version,
    about = "Deploy interdependent contracts in dependency order"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "KEYSTONE_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the settings file.
    ///
    /// Settings not found in the file fall back to defaults. Any setting can be
    /// overridden with a `KEYSTONE_<SETTING>` environment variable.
    #[arg(short, long, alias = "conf", env = "KEYSTONE_CONFIG", default_value = SETTINGS_FILENAME)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the deployment order without touching the network.
    Plan(PlanArgs),
    /// Deploy every unit of the manifest.
    Deploy(DeployArgs),
    /// Write the built-in strategy stack manifest.
    Init(InitArgs),
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Manifest to plan. Defaults to the `manifest` setting, then the built-in stack.
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Manifest to deploy. Defaults to the `manifest` setting, then the built-in stack.
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Parameter override as `name=value`. Beats manifest parameters and the environment.
    #[arg(short, long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Build every transaction without sending anything.
    #[arg(long, env = "KEYSTONE_DRY_RUN", default_value_t = false)]
    pub dry_run: bool,

    /// Report of a previous run. Units it lists are skipped.
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Signer address. Defaults to the `from` setting, then the node's first account.
    #[arg(long)]
    pub from: Option<Address>,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Where to write the manifest.
    #[arg(short, long, default_value = MANIFEST_FILENAME)]
    pub output: PathBuf,

    /// Overwrite an existing file.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

/// Parse a `name=value` parameter override.
fn parse_param(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected `name=value`, got `{s}`"))?;

    if name.is_empty() {
        return Err(format!("missing parameter name in `{s}`"));
    }

    Ok((name.to_string(), value.to_string()))
}
