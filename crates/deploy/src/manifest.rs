//! Deployment manifests: parameter overrides plus the unit list, stored as TOML.
//!
//! Also provides the built-in strategy stack used when no manifest is configured.

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{ArgumentSpec, DeploymentUnit};

/// Default file name of a deployment manifest.
pub const MANIFEST_FILENAME: &str = "deployment.toml";

/// Environment variables carrying the external ids of the built-in mock tokens.
pub const TOKEN_ID_VARS: [(&str, &str); 4] = [
    ("TokenA", "MOCKERCTOKEN_A"),
    ("TokenB", "MOCKERCTOKEN_B"),
    ("LPToken", "MOCKERCTOKEN_LP"),
    ("RewardToken", "MOCKERCTOKEN_REWARD"),
];

/// Default initial supply of the mock tokens.
pub const DEFAULT_INITIAL_SUPPLY: u64 = 1_000_000_000;

/// Declarative description of a deployment: parameter overrides and the unit list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    /// Explicit parameter overrides. They beat environment values.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Units in declaration order.
    #[serde(default)]
    pub units: Vec<DeploymentUnit>,
}

impl DeploymentManifest {
    /// The strategy stack: mock tokens, staking, vault, swap factory and router, and the
    /// strategy wiring them together. The tokens carry no external ids.
    pub fn strategy_stack() -> Self {
        Self::strategy_stack_with_ids(|_| None)
    }

    /// The strategy stack with token ids looked up by variable name (see
    /// [`TOKEN_ID_VARS`]), typically from the environment.
    pub fn strategy_stack_with_ids(ids: impl Fn(&str) -> Option<String>) -> Self {
        let token = |unit: &str, name: &str, symbol: &str| {
            let token = DeploymentUnit::new(unit).artifact("MockERC20").args([
                ArgumentSpec::literal(name),
                ArgumentSpec::literal(symbol),
                ArgumentSpec::literal(18),
                ArgumentSpec::param_or("initialSupply", DEFAULT_INITIAL_SUPPLY),
                ArgumentSpec::param("ownerAddress"),
            ]);
            let id = TOKEN_ID_VARS
                .iter()
                .find(|(u, _)| *u == unit)
                .and_then(|(_, var)| ids(var));
            match id {
                Some(id) => token.id(id),
                None => token,
            }
        };

        let units = vec![
            token("TokenA", "TokenA", "TKA"),
            token("TokenB", "TokenB", "TKB"),
            token("LPToken", "LP Token", "LPT"),
            token("RewardToken", "RewardToken", "RWD"),
            DeploymentUnit::new("CustomStaking")
                .args([ArgumentSpec::unit("LPToken"), ArgumentSpec::unit("RewardToken")]),
            DeploymentUnit::new("ERC4626Vault")
                .args([ArgumentSpec::unit("TokenA"), ArgumentSpec::unit("TokenB")]),
            DeploymentUnit::new("UniswapV2Factory").args([
                ArgumentSpec::param("feeToSetter"),
                ArgumentSpec::param("ownerAddress"),
            ]),
            DeploymentUnit::new("UniswapV2Router").arg(ArgumentSpec::unit("UniswapV2Factory")),
            DeploymentUnit::new("Strategy").args([
                ArgumentSpec::unit("ERC4626Vault"),
                ArgumentSpec::unit("UniswapV2Router"),
                ArgumentSpec::unit("CustomStaking"),
                ArgumentSpec::unit("RewardToken"),
                ArgumentSpec::unit("TokenA"),
                ArgumentSpec::unit("TokenB"),
            ]),
        ];

        Self {
            parameters: BTreeMap::new(),
            units,
        }
    }

    /// Save the manifest to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize manifest to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write manifest to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Manifest saved");
        Ok(())
    }

    /// Load a manifest from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Manifest file not found: {}",
                path.display()
            ));
        }

        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read manifest from {}", path.display()))?;
        let manifest: Self =
            toml::from_str(&content).context("Failed to parse manifest file as TOML")?;
        tracing::info!(path = %path.display(), units = manifest.units.len(), "Manifest loaded");
        Ok(manifest)
    }
}
