//! keystone-deploy - Contract deployment orchestration.
//!
//! This crate deploys a set of interdependent contracts in an order that respects their
//! constructor-argument dependencies, and records the resulting addresses so later units
//! can reference earlier ones.

mod artifact;
pub use artifact::{Artifact, ArtifactLayout, ArtifactStore};

mod config;
pub use config::ConfigResolver;

mod deployer;
pub use deployer::{
    ContractDeployer, DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_POLL_INTERVAL, Deployment,
    DryRunDeployer, RpcDeployer, SignerIdentity,
};

mod error;
pub use error::{DeployError, RunError};

mod manifest;
pub use manifest::{DEFAULT_INITIAL_SUPPLY, DeploymentManifest, MANIFEST_FILENAME, TOKEN_ID_VARS};

mod orchestrator;
pub use orchestrator::{DeploymentObserver, Orchestrator, TracingObserver};

mod planner;
pub use planner::{DependencyPlanner, DeploymentPlan};

mod registry;
pub use registry::AddressRegistry;

mod report;
pub use report::{DeploymentReport, DeploymentResult, FailureSummary, REPORT_FILENAME, dry_run_path};

pub mod rpc;

mod settings;
pub use settings::{DeploySettings, ENV_PREFIX, PrivateKey, SETTINGS_FILENAME};

mod unit;
pub use unit::{ArgumentSpec, DeploymentUnit};
