//! Durable record of a deployment run.
//!
//! Live runs write the report to the configured results path, dry runs next to it
//! under [`dry_run_path`], so simulated addresses never overwrite real ones.

use std::path::{Path, PathBuf};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::RunError;

/// Default file name of the results file.
pub const REPORT_FILENAME: &str = "deployments.json";

/// Outcome of one confirmed unit deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Logical unit name.
    pub unit: String,
    /// External identifier declared on the unit, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Deployed contract address.
    pub address: Address,
    /// Hash of the creation transaction.
    pub transaction: B256,
}

/// Why a run stopped before completing its plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    /// First failing unit. `None` when planning failed.
    pub unit: Option<String>,
    /// Error kind, e.g. `TransactionReverted`.
    pub kind: String,
    pub message: String,
    /// Last unit deployed before the failure.
    pub last_completed: Option<String>,
    /// Set when on-chain state must be inspected before retrying the failing unit.
    #[serde(default)]
    pub ambiguous: bool,
}

impl From<&RunError> for FailureSummary {
    fn from(err: &RunError) -> Self {
        Self {
            unit: err.failed_unit.clone(),
            kind: err.source.kind().to_string(),
            message: err.source.to_string(),
            last_completed: err.last_completed().map(str::to_string),
            ambiguous: err.source.is_ambiguous(),
        }
    }
}

/// Durable record of a run: deployed addresses plus the failure, if any.
///
/// A report written after a failed run can be fed back to resume the run, skipping
/// units that are already deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Signer address used for the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer: Option<Address>,
    pub generated_at: DateTime<Utc>,
    /// Confirmed deployments, in deployment order.
    pub deployments: Vec<DeploymentResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureSummary>,
    /// Set for reports of simulated runs. Their addresses were never deployed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

/// Where a dry run writes its report: `deployments.json` becomes
/// `deployments.dry-run.json`.
pub fn dry_run_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "deployments".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{stem}.dry-run.{}", ext.to_string_lossy()),
        None => format!("{stem}.dry-run"),
    };
    path.with_file_name(name)
}

impl DeploymentReport {
    pub fn new(deployments: Vec<DeploymentResult>) -> Self {
        Self {
            chain_id: None,
            deployer: None,
            generated_at: Utc::now(),
            deployments,
            failure: None,
            dry_run: false,
        }
    }

    pub fn chain_id(mut self, chain_id: Option<u64>) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn deployer(mut self, deployer: Address) -> Self {
        self.deployer = Some(deployer);
        self
    }

    /// Record a halted run. Results it completed are appended to the deployments.
    pub fn failed(mut self, err: &RunError) -> Self {
        self.deployments.extend(err.completed.iter().cloned());
        self.failure = Some(FailureSummary::from(err));
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Check that this report can seed a run on `chain_id`.
    ///
    /// Dry-run reports never can. A report recorded on a known chain only resumes a
    /// run on the same chain.
    pub fn check_resumable(&self, chain_id: Option<u64>) -> Result<()> {
        if self.dry_run {
            anyhow::bail!("Cannot resume from a dry-run report, its addresses were never deployed");
        }

        if let (Some(recorded), Some(connected)) = (self.chain_id, chain_id) {
            if recorded != connected {
                anyhow::bail!(
                    "Report was recorded on chain {recorded} but the endpoint is on chain {connected}"
                );
            }
        }

        Ok(())
    }

    /// Save this report as formatted JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize deployment report")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create directory {}", parent.display()))?;
        }

        std::fs::write(path, json).context(format!(
            "Failed to write deployment report to {}",
            path.display()
        ))?;

        tracing::info!(path = %path.display(), "Deployment report saved");
        Ok(())
    }

    /// Load a report from a file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Deployment report does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path).context(format!(
            "Failed to read deployment report from {}",
            path.display()
        ))?;

        serde_json::from_str(&content).context("Failed to parse deployment report")
    }
}
