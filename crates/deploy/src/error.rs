//! Error taxonomy for the deployment pipeline.

use std::{path::PathBuf, time::Duration};

use alloy_core::primitives::B256;

use crate::report::DeploymentResult;

/// Errors that terminate a deployment run.
///
/// None of these are retried internally. Configuration errors (`CyclicDependency`,
/// `UnknownUnitReference`, `DuplicateUnit`) are raised before any network call.
#[derive(Debug, thiserror::Error, strum::IntoStaticStr)]
pub enum DeployError {
    /// No compiled descriptor exists for the artifact name.
    #[error("artifact `{name}` not found at {}", path.display())]
    ArtifactNotFound { name: String, path: PathBuf },

    /// The descriptor exists but could not be parsed.
    #[error("artifact `{name}` is invalid: {reason}")]
    InvalidArtifact { name: String, reason: String },

    /// No override, environment value or default exists for the parameter.
    #[error("parameter `{0}` has no override, environment value or default")]
    UnresolvedParameter(String),

    /// A unit name was recorded twice in the address registry.
    #[error("unit `{0}` is already registered")]
    DuplicateRegistration(String),

    /// A unit address was looked up before it was recorded.
    #[error("unit `{0}` has no recorded address")]
    UnknownUnit(String),

    /// Two units in the input list share a name.
    #[error("unit `{0}` is declared more than once")]
    DuplicateUnit(String),

    /// The unit graph contains a cycle. Members are listed in reference order.
    #[error("dependency cycle: {}", format_cycle(.0))]
    CyclicDependency(Vec<String>),

    /// A unit references a unit that is not part of the input list.
    #[error("unit `{unit}` references unknown unit `{missing}`")]
    UnknownUnitReference { unit: String, missing: String },

    /// The resolved arguments do not fit the artifact constructor.
    #[error("invalid constructor arguments for `{artifact}`: {reason}")]
    InvalidArguments { artifact: String, reason: String },

    /// The node refused the creation transaction; nothing was broadcast.
    #[error("transaction rejected by the node: {0}")]
    TransactionRejected(String),

    /// The transaction was included but its execution failed.
    #[error("transaction {0} reverted")]
    TransactionReverted(B256),

    /// The transaction was broadcast but not confirmed in time. It may still land.
    #[error("transaction {tx} not confirmed within {}s", .timeout.as_secs())]
    TransactionTimeout { tx: B256, timeout: Duration },

    /// The creation transaction may have reached the node, but no answer came back.
    /// The hash is known only when the transaction was signed locally.
    #[error(
        "submission outcome unknown{}: {reason}",
        .tx.map(|tx| format!(" for transaction {tx}")).unwrap_or_default()
    )]
    SubmissionUnknown { tx: Option<B256>, reason: String },

    /// The RPC endpoint could not be reached.
    #[error("RPC endpoint unavailable: {0}")]
    NetworkUnavailable(String),

    /// The caller cancelled the run between two units.
    #[error("run cancelled")]
    Cancelled,
}

impl DeployError {
    /// The variant name, used when reporting the failing error kind.
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Whether the failure leaves on-chain state unknown.
    ///
    /// Ambiguous failures must never trigger an automatic re-deploy of the same unit.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            Self::TransactionTimeout { .. } | Self::SubmissionUnknown { .. }
        )
    }
}

fn format_cycle(members: &[String]) -> String {
    match members.first() {
        Some(first) => format!("{} -> {}", members.join(" -> "), first),
        None => String::from("<empty>"),
    }
}

/// A halted run.
///
/// Results produced before the failure are kept so the caller can resume by
/// skipping already deployed units.
#[derive(Debug, thiserror::Error)]
#[error("deployment halted at {}: {source}", .failed_unit.as_deref().unwrap_or("planning"))]
pub struct RunError {
    /// Results of the units deployed before the failure, in plan order.
    pub completed: Vec<DeploymentResult>,
    /// The unit that failed, or `None` when planning failed.
    pub failed_unit: Option<String>,
    /// The underlying failure.
    #[source]
    pub source: DeployError,
}

impl RunError {
    /// Create a failure raised before any unit was processed.
    pub fn planning(source: DeployError) -> Self {
        Self {
            completed: Vec::new(),
            failed_unit: None,
            source,
        }
    }

    /// Name of the last unit deployed in this run, if any.
    pub fn last_completed(&self) -> Option<&str> {
        self.completed.last().map(|r| r.unit.as_str())
    }
}
