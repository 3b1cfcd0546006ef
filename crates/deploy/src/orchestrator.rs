//! Drives a deployment run from a unit list to confirmed results.

use alloy_core::primitives::Address;
use tokio::sync::watch;

use crate::{
    AddressRegistry, ArgumentSpec, ArtifactStore, ConfigResolver, ContractDeployer, DeployError,
    DependencyPlanner, DeploymentPlan, DeploymentResult, DeploymentUnit, RunError, SignerIdentity,
};

/// Receives progress notifications from the orchestrator.
///
/// All methods default to doing nothing.
pub trait DeploymentObserver: Send + Sync {
    /// The plan has been computed. No unit has been processed yet.
    fn on_planned(&self, _plan: &DeploymentPlan) {}

    /// A unit was already registered and is not deployed again.
    fn on_skipped(&self, _unit: &DeploymentUnit, _address: Address) {}

    /// A unit was deployed, confirmed and recorded.
    fn on_deployed(&self, _result: &DeploymentResult) {}

    /// A unit failed. The run halts after this notification.
    fn on_failed(&self, _unit: &DeploymentUnit, _error: &DeployError) {}
}

/// Logs progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DeploymentObserver for TracingObserver {
    fn on_planned(&self, plan: &DeploymentPlan) {
        tracing::info!(units = plan.len(), order = ?plan.names(), "Deployment plan computed");
    }

    fn on_skipped(&self, unit: &DeploymentUnit, address: Address) {
        tracing::info!(unit = %unit.name, address = %address, "Already deployed, skipping");
    }

    fn on_deployed(&self, result: &DeploymentResult) {
        tracing::info!(
            unit = %result.unit,
            address = %result.address,
            tx = %result.transaction,
            "Unit deployed"
        );
    }

    fn on_failed(&self, unit: &DeploymentUnit, error: &DeployError) {
        if error.is_ambiguous() {
            tracing::error!(
                unit = %unit.name,
                error = %error,
                "Deployment outcome unknown; inspect the chain before retrying this unit"
            );
        } else {
            tracing::error!(unit = %unit.name, kind = error.kind(), error = %error, "Deployment failed");
        }
    }
}

/// Runs deployment units in dependency order, one at a time.
///
/// The orchestrator exclusively owns the [`AddressRegistry`]. Each unit goes through
/// argument resolution, artifact loading, deployment and registration before the next
/// one starts.
pub struct Orchestrator<D> {
    artifacts: ArtifactStore,
    resolver: ConfigResolver,
    deployer: D,
    registry: AddressRegistry,
    observer: Box<dyn DeploymentObserver>,
    cancel: Option<watch::Receiver<bool>>,
}

impl<D: ContractDeployer> Orchestrator<D> {
    pub fn new(artifacts: ArtifactStore, resolver: ConfigResolver, deployer: D) -> Self {
        Self {
            artifacts,
            resolver,
            deployer,
            registry: AddressRegistry::new(),
            observer: Box::new(TracingObserver),
            cancel: None,
        }
    }

    /// Replace the default [`TracingObserver`].
    pub fn with_observer(mut self, observer: impl DeploymentObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Stop the run before the next unit once `cancel` reads `true`.
    ///
    /// An in-flight deployment always runs to completion first.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Register the results of a previous run. Those units are skipped and their
    /// addresses still satisfy unit references.
    pub fn resume_from<'a>(
        &mut self,
        previous: impl IntoIterator<Item = &'a DeploymentResult>,
    ) -> Result<(), DeployError> {
        for result in previous {
            self.registry.record(&result.unit, result.address)?;
        }
        Ok(())
    }

    pub fn registry(&self) -> &AddressRegistry {
        &self.registry
    }

    pub fn deployer(&self) -> &D {
        &self.deployer
    }

    /// Deploy `units` in dependency order with `signer`.
    ///
    /// Planning errors are raised before any deployment. The run halts on the first
    /// failing unit; the results completed so far are carried by the [`RunError`].
    pub async fn run(
        &mut self,
        units: Vec<DeploymentUnit>,
        signer: &SignerIdentity,
    ) -> Result<Vec<DeploymentResult>, RunError> {
        let plan = DependencyPlanner::plan(units).map_err(RunError::planning)?;
        self.observer.on_planned(&plan);

        let mut completed: Vec<DeploymentResult> = Vec::with_capacity(plan.len());

        for unit in plan.iter() {
            let halt = |completed: Vec<DeploymentResult>, source: DeployError| RunError {
                completed,
                failed_unit: Some(unit.name.clone()),
                source,
            };

            if self.is_cancelled() {
                tracing::warn!(next = %unit.name, "Run cancelled");
                return Err(halt(completed, DeployError::Cancelled));
            }

            if let Ok(address) = self.registry.lookup(&unit.name) {
                self.observer.on_skipped(unit, address);
                continue;
            }

            match self.deploy_unit(unit, signer).await {
                Ok(result) => {
                    self.observer.on_deployed(&result);
                    completed.push(result);
                }
                Err(source) => {
                    self.observer.on_failed(unit, &source);
                    return Err(halt(completed, source));
                }
            }
        }

        Ok(completed)
    }

    /// Resolve every argument of `unit` to its string form.
    ///
    /// Unit references must point at units already recorded in the registry.
    pub fn resolve_arguments(&self, unit: &DeploymentUnit) -> Result<Vec<String>, DeployError> {
        unit.args
            .iter()
            .map(|arg| match arg {
                ArgumentSpec::Literal(value) => Ok(value.clone()),
                ArgumentSpec::ParameterRef { name, default } => {
                    self.resolver.resolve(name, default.as_deref())
                }
                ArgumentSpec::UnitRef(name) => {
                    self.registry.lookup(name).map(|address| address.to_string())
                }
            })
            .collect()
    }

    async fn deploy_unit(
        &mut self,
        unit: &DeploymentUnit,
        signer: &SignerIdentity,
    ) -> Result<DeploymentResult, DeployError> {
        let args = self.resolve_arguments(unit)?;
        let artifact = self.artifacts.load(unit.artifact_name()).await?;

        tracing::debug!(
            unit = %unit.name,
            artifact = %artifact.name,
            args = ?args,
            "Deploying unit..."
        );

        let deployment = self.deployer.deploy(&artifact, &args, signer).await?;
        self.registry.record(&unit.name, deployment.address)?;

        Ok(DeploymentResult {
            unit: unit.name.clone(),
            id: unit.id.clone(),
            address: deployment.address,
            transaction: deployment.transaction,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|cancel| *cancel.borrow())
    }
}
