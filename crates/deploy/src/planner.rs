//! Dependency ordering of deployment units.

use std::collections::{BTreeSet, HashMap};

use derive_more::Deref;

use crate::{DeployError, DeploymentUnit};

/// Units in an order where every unit reference points at an earlier unit.
///
/// Built once per run by [`DependencyPlanner::plan`] and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deref)]
pub struct DeploymentPlan(Vec<DeploymentUnit>);

impl DeploymentPlan {
    /// Unit names in plan order.
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|unit| unit.name.as_str()).collect()
    }
}

/// Computes a deployment order from unit references.
pub struct DependencyPlanner;

impl DependencyPlanner {
    /// Order `units` so that every referenced unit precedes its referrer.
    ///
    /// The sort is stable: among units whose references are all satisfied, the one
    /// declared first goes first, so identical input always yields identical output.
    pub fn plan(units: Vec<DeploymentUnit>) -> Result<DeploymentPlan, DeployError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(units.len());
        for (i, unit) in units.iter().enumerate() {
            if index.insert(unit.name.as_str(), i).is_some() {
                return Err(DeployError::DuplicateUnit(unit.name.clone()));
            }
        }

        // deps[i]: units that unit i references. dependents[j]: units referencing j.
        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(units.len());
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); units.len()];
        for (i, unit) in units.iter().enumerate() {
            let mut unit_deps = Vec::new();
            for name in unit.references() {
                let j = *index
                    .get(name)
                    .ok_or_else(|| DeployError::UnknownUnitReference {
                        unit: unit.name.clone(),
                        missing: name.to_string(),
                    })?;
                unit_deps.push(j);
                dependents[j].push(i);
            }
            deps.push(unit_deps);
        }

        let mut pending: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = (0..units.len()).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(units.len());

        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &dependent in &dependents[i] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < units.len() {
            let cycle = find_cycle(&deps, &pending);
            return Err(DeployError::CyclicDependency(
                cycle.into_iter().map(|i| units[i].name.clone()).collect(),
            ));
        }

        let mut slots: Vec<Option<DeploymentUnit>> = units.into_iter().map(Some).collect();
        let ordered = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();

        Ok(DeploymentPlan(ordered))
    }
}

/// Walk references among the units left unsorted until a unit repeats.
///
/// Every unsorted unit references at least one other unsorted unit, so the walk always
/// closes a cycle. Starts from the first declared unsorted unit for deterministic output.
fn find_cycle(deps: &[Vec<usize>], pending: &[usize]) -> Vec<usize> {
    let Some(start) = (0..deps.len()).find(|&i| pending[i] > 0) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(&next) = deps[current].iter().find(|&&j| pending[j] > 0) else {
            return path;
        };
        if let Some(pos) = path.iter().position(|&i| i == next) {
            return path.split_off(pos);
        }
        path.push(next);
        current = next;
    }
}
