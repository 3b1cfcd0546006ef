//! Declarative deployment units.

use serde::{Deserialize, Serialize};

/// One constructor argument of a deployment unit.
///
/// In a manifest a scalar is a literal, `{ param = "...", default = "..." }` is a
/// parameter reference and `{ unit = "..." }` is a reference to another unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawArgument", into = "RawArgument")]
pub enum ArgumentSpec {
    /// A value passed through unchanged.
    Literal(String),
    /// A named parameter resolved through the config resolver.
    ParameterRef {
        name: String,
        default: Option<String>,
    },
    /// The deployed address of another unit.
    UnitRef(String),
}

impl ArgumentSpec {
    pub fn literal(value: impl ToString) -> Self {
        Self::Literal(value.to_string())
    }

    pub fn param(name: impl Into<String>) -> Self {
        Self::ParameterRef {
            name: name.into(),
            default: None,
        }
    }

    pub fn param_or(name: impl Into<String>, default: impl ToString) -> Self {
        Self::ParameterRef {
            name: name.into(),
            default: Some(default.to_string()),
        }
    }

    pub fn unit(name: impl Into<String>) -> Self {
        Self::UnitRef(name.into())
    }

    /// The referenced unit name, if this is a unit reference.
    pub fn unit_ref(&self) -> Option<&str> {
        match self {
            Self::UnitRef(name) => Some(name),
            _ => None,
        }
    }
}

/// Manifest representation of an [`ArgumentSpec`].
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawArgument {
    Text(String),
    Integer(i64),
    Bool(bool),
    Param {
        param: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    Unit {
        unit: String,
    },
}

impl From<RawArgument> for ArgumentSpec {
    fn from(raw: RawArgument) -> Self {
        match raw {
            RawArgument::Text(value) => Self::Literal(value),
            RawArgument::Integer(value) => Self::Literal(value.to_string()),
            RawArgument::Bool(value) => Self::Literal(value.to_string()),
            RawArgument::Param { param, default } => Self::ParameterRef {
                name: param,
                default,
            },
            RawArgument::Unit { unit } => Self::UnitRef(unit),
        }
    }
}

impl From<ArgumentSpec> for RawArgument {
    fn from(spec: ArgumentSpec) -> Self {
        match spec {
            ArgumentSpec::Literal(value) => Self::Text(value),
            ArgumentSpec::ParameterRef { name, default } => Self::Param {
                param: name,
                default,
            },
            ArgumentSpec::UnitRef(unit) => Self::Unit { unit },
        }
    }
}

/// A deployable component and its constructor argument specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentUnit {
    /// Logical name. Unit references and the address registry are keyed by it.
    pub name: String,
    /// Artifact to deploy. Defaults to the unit name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Optional external identifier carried into the results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Constructor arguments, in declaration order.
    #[serde(default)]
    pub args: Vec<ArgumentSpec>,
}

impl DeploymentUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artifact: None,
            id: None,
            args: Vec::new(),
        }
    }

    /// Deploy this unit from a differently named artifact.
    pub fn artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn arg(mut self, arg: ArgumentSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = ArgumentSpec>) -> Self {
        self.args.extend(args);
        self
    }

    /// Name of the artifact this unit is deployed from.
    pub fn artifact_name(&self) -> &str {
        self.artifact.as_deref().unwrap_or(&self.name)
    }

    /// Units referenced by the arguments, in argument order, without duplicates.
    pub fn references(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = Vec::new();
        for name in self.args.iter().filter_map(ArgumentSpec::unit_ref) {
            if !refs.contains(&name) {
                refs.push(name);
            }
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        units: Vec<DeploymentUnit>,
    }

    #[test]
    fn test_parse_unit_arguments_from_toml() {
        let parsed: Wrapper = toml::from_str(
            r#"
            [[units]]
            name = "TokenA"
            artifact = "MockERC20"
            args = ["TokenA", "TKA", 18, { param = "initialSupply", default = "1000000000" }, { param = "ownerAddress" }]

            [[units]]
            name = "Vault"
            args = [{ unit = "TokenA" }, true]
            "#,
        )
        .unwrap();

        let token = &parsed.units[0];
        assert_eq!(token.artifact_name(), "MockERC20");
        assert_eq!(
            token.args,
            vec![
                ArgumentSpec::literal("TokenA"),
                ArgumentSpec::literal("TKA"),
                ArgumentSpec::literal(18),
                ArgumentSpec::param_or("initialSupply", 1000000000),
                ArgumentSpec::param("ownerAddress"),
            ]
        );

        let vault = &parsed.units[1];
        assert_eq!(vault.artifact_name(), "Vault");
        assert_eq!(
            vault.args,
            vec![ArgumentSpec::unit("TokenA"), ArgumentSpec::literal(true)]
        );
    }

    #[test]
    fn test_references_are_deduplicated_in_order() {
        let unit = DeploymentUnit::new("Pair").args([
            ArgumentSpec::unit("TokenB"),
            ArgumentSpec::literal("x"),
            ArgumentSpec::unit("TokenA"),
            ArgumentSpec::unit("TokenB"),
        ]);
        assert_eq!(unit.references(), vec!["TokenB", "TokenA"]);
    }
}
