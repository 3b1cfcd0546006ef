//! Compiled contract artifacts.
//!
//! An artifact is the interface definition and creation bytecode of a contract, keyed by
//! name. Artifacts are read from the compiler output directory and cached for the
//! lifetime of the store.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use alloy_core::{
    dyn_abi::{DynSolValue, Specifier},
    json_abi::{JsonAbi, Param},
    primitives::Bytes,
};
use serde::{Deserialize, Serialize};

use crate::DeployError;

/// Directory layout of the compiler output.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ArtifactLayout {
    /// `<root>/contracts/<Name>.sol/<Name>.json`, bytecode as a hex string.
    #[default]
    Hardhat,
    /// `<root>/<Name>.sol/<Name>.json`, bytecode under `bytecode.object`.
    Foundry,
}

/// A compiled contract: interface definition plus creation bytecode.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

/// On-disk artifact JSON. Only the fields needed for deployment are read.
#[derive(Deserialize)]
struct RawArtifact {
    abi: JsonAbi,
    bytecode: RawBytecode,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object { object: String },
}

impl Artifact {
    pub fn new(name: impl Into<String>, abi: JsonAbi, bytecode: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            abi,
            bytecode: bytecode.into(),
        }
    }

    /// Parse an artifact from compiler output JSON (hardhat or foundry flavour).
    pub fn from_json(name: &str, json: &str) -> Result<Self, DeployError> {
        let invalid = |reason: String| DeployError::InvalidArtifact {
            name: name.to_string(),
            reason,
        };

        let raw: RawArtifact = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
        let code = match raw.bytecode {
            RawBytecode::Hex(code) | RawBytecode::Object { object: code } => code,
        };

        let code = code.trim_start_matches("0x");
        if code.contains("__") {
            return Err(invalid(
                "bytecode contains unlinked library placeholders".to_string(),
            ));
        }
        if code.is_empty() {
            return Err(invalid(
                "bytecode is empty (abstract contract or interface?)".to_string(),
            ));
        }

        let bytecode = hex::decode(code).map_err(|e| invalid(format!("bad bytecode: {e}")))?;

        Ok(Self::new(name, raw.abi, bytecode))
    }

    /// Constructor inputs declared by the interface. Empty when there is no constructor.
    pub fn constructor_inputs(&self) -> &[Param] {
        self.abi
            .constructor
            .as_ref()
            .map(|c| c.inputs.as_slice())
            .unwrap_or_default()
    }

    /// Build the creation code: bytecode followed by the ABI-encoded constructor arguments.
    ///
    /// Arguments are given in string form and coerced to the declared parameter types.
    pub fn creation_code(&self, args: &[String]) -> Result<Bytes, DeployError> {
        let invalid = |reason: String| DeployError::InvalidArguments {
            artifact: self.name.clone(),
            reason,
        };

        let inputs = self.constructor_inputs();
        if inputs.len() != args.len() {
            return Err(invalid(format!(
                "constructor takes {} arguments, got {}",
                inputs.len(),
                args.len()
            )));
        }

        let values = inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                let ty = param
                    .resolve()
                    .map_err(|e| invalid(format!("unsupported type `{}`: {e}", param.ty)))?;
                ty.coerce_str(arg).map_err(|e| {
                    invalid(format!(
                        "`{arg}` is not a valid {} for `{}`: {e}",
                        param.ty, param.name
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut code = self.bytecode.to_vec();
        if !values.is_empty() {
            code.extend(DynSolValue::Tuple(values).abi_encode_params());
        }

        Ok(code.into())
    }
}

/// Loads artifacts by name and caches them.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    /// Compiler output directory. `None` for a purely in-memory store.
    root: Option<PathBuf>,
    layout: ArtifactLayout,
    cache: HashMap<String, Arc<Artifact>>,
}

impl ArtifactStore {
    /// Create a store reading from `root` with the given layout.
    pub fn new(root: impl Into<PathBuf>, layout: ArtifactLayout) -> Self {
        Self {
            root: Some(root.into()),
            layout,
            cache: HashMap::new(),
        }
    }

    /// Create a store holding only the given artifacts.
    pub fn in_memory(artifacts: impl IntoIterator<Item = Artifact>) -> Self {
        artifacts
            .into_iter()
            .fold(Self::default(), |store, artifact| store.with_artifact(artifact))
    }

    /// Seed the cache with an artifact, shadowing any file of the same name.
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.cache.insert(artifact.name.clone(), Arc::new(artifact));
        self
    }

    /// Path of the descriptor for `name`, derived from the layout.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let root = self.root.clone().unwrap_or_default();
        let file = format!("{name}.json");
        match self.layout {
            ArtifactLayout::Hardhat => root.join("contracts").join(format!("{name}.sol")).join(file),
            ArtifactLayout::Foundry => root.join(format!("{name}.sol")).join(file),
        }
    }

    /// Load the artifact for `name`. Repeated calls return the cached artifact.
    pub async fn load(&mut self, name: &str) -> Result<Arc<Artifact>, DeployError> {
        if let Some(artifact) = self.cache.get(name) {
            return Ok(artifact.clone());
        }

        let path = self.path_for(name);
        let not_found = || DeployError::ArtifactNotFound {
            name: name.to_string(),
            path: path.clone(),
        };

        if self.root.is_none() {
            return Err(not_found());
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => {
                return Err(DeployError::InvalidArtifact {
                    name: name.to_string(),
                    reason: format!("failed to read {}: {e}", path.display()),
                });
            }
        };

        let artifact = Arc::new(Artifact::from_json(name, &content)?);
        tracing::debug!(artifact = name, path = %path.display(), "Artifact loaded");

        self.cache.insert(name.to_string(), artifact.clone());
        Ok(artifact)
    }
}
