//! Process-lifetime mapping from unit names to deployed addresses.

use std::collections::HashMap;

use alloy_core::primitives::Address;

use crate::DeployError;

/// Registry of confirmed deployments.
///
/// Entries are write-once: a unit is recorded after its deployment is confirmed and
/// never changes afterwards. Only the orchestrator writes to it.
#[derive(Debug, Clone, Default)]
pub struct AddressRegistry {
    addresses: HashMap<String, Address>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the address of a deployed unit.
    ///
    /// Recording the same unit twice points at a planner or orchestrator bug and fails.
    pub fn record(&mut self, unit: &str, address: Address) -> Result<(), DeployError> {
        if self.addresses.contains_key(unit) {
            return Err(DeployError::DuplicateRegistration(unit.to_string()));
        }

        self.addresses.insert(unit.to_string(), address);
        Ok(())
    }

    /// Address of an already recorded unit.
    pub fn lookup(&self, unit: &str) -> Result<Address, DeployError> {
        self.addresses
            .get(unit)
            .copied()
            .ok_or_else(|| DeployError::UnknownUnit(unit.to_string()))
    }

    pub fn contains(&self, unit: &str) -> bool {
        self.addresses.contains_key(unit)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}
