//! keystone deploys interdependent contracts in dependency order and records their
//! addresses.

mod cli;

use std::path::PathBuf;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use tokio::sync::watch;

use cli::{Cli, Command, DeployArgs, InitArgs, PlanArgs};
use keystone_deploy::{
    ArtifactStore, ConfigResolver, ContractDeployer, DependencyPlanner, DeploySettings,
    DeploymentManifest, DeploymentReport, DeploymentResult, DeploymentUnit, DryRunDeployer,
    Orchestrator, RpcDeployer, SignerIdentity, dry_run_path,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let settings = DeploySettings::load(&cli.config)?;

    match cli.command {
        Command::Plan(args) => plan(&settings, args),
        Command::Deploy(args) => deploy(settings, args).await,
        Command::Init(args) => init(args),
    }
}

/// Manifest from the command line, then the settings, then the built-in stack.
fn load_manifest(settings: &DeploySettings, path: Option<PathBuf>) -> Result<DeploymentManifest> {
    match path.or_else(|| settings.manifest.clone()) {
        Some(path) => DeploymentManifest::load_from_file(&path),
        None => {
            tracing::info!("No manifest configured, using the built-in strategy stack");
            Ok(DeploymentManifest::strategy_stack_with_ids(|var| {
                std::env::var(var).ok().filter(|v| !v.is_empty())
            }))
        }
    }
}

fn plan(settings: &DeploySettings, args: PlanArgs) -> Result<()> {
    let manifest = load_manifest(settings, args.manifest)?;
    let plan = DependencyPlanner::plan(manifest.units)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["#", "Unit", "Artifact", "Depends on"]);
    for (i, unit) in plan.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            unit.name.clone(),
            unit.artifact_name().to_string(),
            unit.references().join(", "),
        ]);
    }
    println!("{table}");

    Ok(())
}

fn init(args: InitArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite it",
            args.output.display()
        );
    }

    DeploymentManifest::strategy_stack().save_to_file(&args.output)
}

async fn deploy(settings: DeploySettings, args: DeployArgs) -> Result<()> {
    let manifest = load_manifest(&settings, args.manifest)?;

    // Command-line parameters are inserted last and win over manifest parameters.
    let resolver = ConfigResolver::from_env(manifest.parameters.into_iter().chain(args.params));
    let artifacts = ArtifactStore::new(&settings.artifacts_dir, settings.layout);

    let previous = args
        .resume
        .as_deref()
        .map(DeploymentReport::load_from_file)
        .transpose()?;

    if args.dry_run {
        if let Some(report) = &previous {
            report.check_resumable(None)?;
        }

        let signer = SignerIdentity::new(args.from.or(settings.from).unwrap_or(Address::ZERO));
        let results_path = dry_run_path(&settings.results_path);
        tracing::info!(
            signer = %signer.address,
            report = %results_path.display(),
            "Dry run, nothing will be sent"
        );

        let run = Run::new(artifacts, resolver, manifest.units, previous, results_path);
        return run.execute(DryRunDeployer::default(), None, signer, true).await;
    }

    let mut deployer = RpcDeployer::new(&settings.rpc_url)?
        .request_timeout(settings.request_timeout())?
        .confirmations(settings.confirmations)
        .confirmation_timeout(settings.confirmation_timeout())
        .poll_interval(settings.poll_interval())
        .gas_limit(settings.gas_limit);
    if let Some(key) = &settings.private_key {
        deployer = deployer.private_key(key.expose())?;
    }

    let chain_id = deployer.chain_id().await?;
    if let Some(report) = &previous {
        report.check_resumable(Some(chain_id))?;
    }

    let signer = match args.from.or(settings.from) {
        Some(address) => SignerIdentity::new(address),
        None => deployer.default_signer().await?,
    };

    tracing::info!(
        rpc_url = deployer.rpc_url(),
        chain_id,
        signer = %signer.address,
        local_signing = settings.private_key.is_some(),
        "Connected to the network"
    );

    let run = Run::new(
        artifacts,
        resolver,
        manifest.units,
        previous,
        settings.results_path.clone(),
    );
    run.execute(deployer, Some(chain_id), signer, false).await
}

/// Everything needed for one orchestrated run, independent of the transport.
struct Run {
    artifacts: ArtifactStore,
    resolver: ConfigResolver,
    units: Vec<DeploymentUnit>,
    previous: Vec<DeploymentResult>,
    results_path: PathBuf,
}

impl Run {
    fn new(
        artifacts: ArtifactStore,
        resolver: ConfigResolver,
        units: Vec<DeploymentUnit>,
        previous: Option<DeploymentReport>,
        results_path: PathBuf,
    ) -> Self {
        let previous = previous.map(|report| {
            tracing::info!(
                deployed = report.deployments.len(),
                "Resuming from a previous report"
            );
            report.deployments
        });

        Self {
            artifacts,
            resolver,
            units,
            previous: previous.unwrap_or_default(),
            results_path,
        }
    }

    async fn execute<D: ContractDeployer>(
        self,
        deployer: D,
        chain_id: Option<u64>,
        signer: SignerIdentity,
        dry_run: bool,
    ) -> Result<()> {
        let (cancel, cancelled) = watch::channel(false);
        tokio::spawn(handle_interrupts(cancel));

        let mut orchestrator = Orchestrator::new(self.artifacts, self.resolver, deployer)
            .with_cancellation(cancelled);
        orchestrator
            .resume_from(&self.previous)
            .context("Invalid resume report")?;

        let outcome = orchestrator.run(self.units, &signer).await;

        let mut report = DeploymentReport::new(self.previous)
            .chain_id(chain_id)
            .deployer(signer.address)
            .dry_run(dry_run);
        match &outcome {
            Ok(results) => report.deployments.extend(results.iter().cloned()),
            Err(err) => report = report.failed(err),
        }

        report.save_to_file(&self.results_path)?;
        print_report(&report);

        if let Err(err) = outcome {
            tracing::error!(
                last_completed = err.last_completed().unwrap_or("none"),
                failed_unit = err.failed_unit.as_deref().unwrap_or("planning"),
                kind = err.source.kind(),
                "Deployment halted"
            );
            if err.source.is_ambiguous() {
                tracing::warn!(
                    "The failing transaction may still be mined; check the chain before resuming with --resume {}",
                    self.results_path.display()
                );
            } else if !err.completed.is_empty() && !dry_run {
                tracing::info!(
                    "Resume with --resume {} to skip deployed units",
                    self.results_path.display()
                );
            }
            return Err(err.into());
        }

        Ok(())
    }
}

/// The first Ctrl-C stops the run after the current unit, a second one exits at once.
async fn handle_interrupts(cancel: watch::Sender<bool>) {
    let interrupted = || async { tokio::signal::ctrl_c().await.is_ok() };
    if cancel_on_interrupt(interrupted, &cancel).await {
        std::process::exit(130);
    }
}

/// Cancel on the first interrupt. Returns `true` when a second interrupt follows.
async fn cancel_on_interrupt<F, Fut>(mut interrupted: F, cancel: &watch::Sender<bool>) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    if !interrupted().await {
        return false;
    }
    tracing::warn!(
        "Interrupted, stopping after the current unit. Press Ctrl-C again to exit immediately"
    );
    cancel.send_replace(true);

    if !interrupted().await {
        return false;
    }
    tracing::error!("Interrupted again, exiting without waiting for the current unit");
    true
}

fn print_report(report: &DeploymentReport) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Unit", "Address", "Transaction"]);
    for deployment in &report.deployments {
        table.add_row(vec![
            deployment.unit.clone(),
            deployment.address.to_string(),
            deployment.transaction.to_string(),
        ]);
    }
    println!("{table}");
}
