//! Run settings: endpoint, artifact location, signer and confirmation policy.

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
    ArtifactLayout, REPORT_FILENAME,
    deployer::{DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_POLL_INTERVAL},
    rpc::DEFAULT_REQUEST_TIMEOUT,
};

/// Default settings file name.
pub const SETTINGS_FILENAME: &str = "Keystone.toml";

/// Prefix of environment variables overriding settings (`KEYSTONE_RPC_URL`, ...).
pub const ENV_PREFIX: &str = "KEYSTONE_";

/// Hex-encoded secp256k1 key. Never printed or written back out.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    /// JSON-RPC endpoint of the target network.
    pub rpc_url: String,
    /// Compiler output directory.
    pub artifacts_dir: PathBuf,
    pub layout: ArtifactLayout,
    /// Signer account. Defaults to the first account managed by the node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    /// Sign locally with this key instead of a node-managed account. Usually set
    /// through `KEYSTONE_PRIVATE_KEY`.
    #[serde(skip_serializing)]
    pub private_key: Option<PrivateKey>,
    /// Blocks to wait for, including the inclusion block.
    pub confirmations: u64,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Timeout of a single RPC request.
    pub request_timeout_secs: u64,
    /// Fixed gas limit for creation transactions. Estimated by the node when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    /// Unit list to deploy. The built-in strategy stack is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
    /// Where the deployment report is written.
    pub results_path: PathBuf,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            artifacts_dir: PathBuf::from("artifacts"),
            layout: ArtifactLayout::default(),
            from: None,
            private_key: None,
            confirmations: 1,
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT.as_secs(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            gas_limit: None,
            manifest: None,
            results_path: PathBuf::from(REPORT_FILENAME),
        }
    }
}

impl DeploySettings {
    /// Layered sources: defaults, then the TOML file, then `KEYSTONE_*` variables.
    ///
    /// A missing file is not an error; its layer is simply empty.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load and validate settings from `path` and the environment.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_figment(Self::figment(path))
    }

    /// Extract and validate settings from an already layered figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Self = figment
            .extract()
            .context("Failed to load deployment settings")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check the settings before any network use.
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.rpc_url)
            .context(format!("Invalid RPC URL: {}", self.rpc_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Unsupported RPC URL scheme `{}`", url.scheme());
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
