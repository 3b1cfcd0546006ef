//! Constructor parameter resolution.

use std::collections::HashMap;

use crate::DeployError;

/// Resolves named parameters to values.
///
/// Precedence: explicit override, then environment value, then the caller's fallback.
/// The environment is snapshotted at construction, so resolution is pure for the
/// lifetime of a run.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    overrides: HashMap<String, String>,
    environment: HashMap<String, String>,
}

impl ConfigResolver {
    /// Create a resolver from explicit overrides and an environment mapping.
    pub fn new(
        overrides: impl IntoIterator<Item = (String, String)>,
        environment: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self {
            overrides: overrides.into_iter().collect(),
            environment: environment.into_iter().collect(),
        }
    }

    /// Create a resolver backed by the current process environment.
    pub fn from_env(overrides: impl IntoIterator<Item = (String, String)>) -> Self {
        Self::new(overrides, std::env::vars())
    }

    /// Add or replace an explicit override.
    pub fn with_override(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(name.into(), value.into());
        self
    }

    /// Resolve `name`, falling back to `fallback` when neither an override nor an
    /// environment value exists.
    pub fn resolve(&self, name: &str, fallback: Option<&str>) -> Result<String, DeployError> {
        if let Some(value) = self.overrides.get(name) {
            return Ok(value.clone());
        }

        if let Some(value) = self.environment_value(name) {
            return Ok(value.to_string());
        }

        fallback
            .map(str::to_string)
            .ok_or_else(|| DeployError::UnresolvedParameter(name.to_string()))
    }

    /// Environment lookup: the name verbatim, then its SCREAMING_SNAKE form.
    /// Empty values count as unset.
    fn environment_value(&self, name: &str) -> Option<&str> {
        [name.to_string(), env_key(name)]
            .iter()
            .filter_map(|key| self.environment.get(key))
            .map(String::as_str)
            .find(|value| !value.is_empty())
    }
}

/// Convert a camelCase parameter name to an environment key (`ownerAddress` -> `OWNER_ADDRESS`).
fn env_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() && prev_lower {
            key.push('_');
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        key.push(if c == '-' { '_' } else { c.to_ascii_uppercase() });
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_override_beats_environment() {
        let resolver = ConfigResolver::new(
            pairs(&[("ownerAddress", "0xoverride")]),
            pairs(&[("ownerAddress", "0xenv")]),
        );
        assert_eq!(
            resolver.resolve("ownerAddress", Some("0xdefault")).unwrap(),
            "0xoverride"
        );
    }

    #[test]
    fn test_environment_beats_fallback() {
        let resolver = ConfigResolver::new(pairs(&[]), pairs(&[("initialSupply", "42")]));
        assert_eq!(resolver.resolve("initialSupply", Some("1000")).unwrap(), "42");
    }

    #[test]
    fn test_fallback_used_when_nothing_else_applies() {
        let resolver = ConfigResolver::default();
        assert_eq!(
            resolver.resolve("initialSupply", Some("1000000000")).unwrap(),
            "1000000000"
        );
    }

    #[test]
    fn test_unresolved_without_fallback() {
        let resolver = ConfigResolver::default();
        let err = resolver.resolve("feeToSetter", None).unwrap_err();
        assert!(matches!(err, DeployError::UnresolvedParameter(name) if name == "feeToSetter"));
    }

    #[test]
    fn test_environment_key_is_screaming_snake_case() {
        let resolver = ConfigResolver::new(pairs(&[]), pairs(&[("OWNER_ADDRESS", "0xabc")]));
        assert_eq!(resolver.resolve("ownerAddress", None).unwrap(), "0xabc");
    }

    #[test]
    fn test_empty_environment_value_is_ignored() {
        let resolver = ConfigResolver::new(pairs(&[]), pairs(&[("FEE_TO_SETTER", "")]));
        assert_eq!(resolver.resolve("feeToSetter", Some("0x1")).unwrap(), "0x1");
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let resolver = ConfigResolver::new(pairs(&[]), pairs(&[("INITIAL_SUPPLY", "7")]))
            .with_override("symbol", "TKA");
        for _ in 0..3 {
            assert_eq!(resolver.resolve("initialSupply", Some("1")).unwrap(), "7");
            assert_eq!(resolver.resolve("symbol", None).unwrap(), "TKA");
        }
    }

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("lpToken"), "LP_TOKEN");
        assert_eq!(env_key("feeToSetter"), "FEE_TO_SETTER");
        assert_eq!(env_key("OWNER_ADDRESS"), "OWNER_ADDRESS");
        assert_eq!(env_key("token0"), "TOKEN0");
        assert_eq!(env_key("reward-token"), "REWARD_TOKEN");
    }
}
