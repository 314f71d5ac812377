use nalgebra::{Isometry2, UnitComplex, Vector3};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;

use crate::error::{UwbError, UwbResult};
use crate::mapping::factor::Factor;
use crate::mapping::key::{PoseKey, TrajectoryId};

/// Append-only collection of factors plus the trajectory namespaces that
/// contributed them.
#[derive(Debug, Default, Clone)]
pub struct FactorGraph {
    factors: Vec<Factor>,
    trajectories: FxHashSet<TrajectoryId>,
}

impl FactorGraph {
    pub fn new() -> FactorGraph {
        FactorGraph::default()
    }

    pub fn add(&mut self, factor: Factor) {
        self.factors.push(factor);
    }

    /// Claims a namespace; a second builder using the same id is rejected.
    pub fn register_trajectory(&mut self, id: TrajectoryId) -> UwbResult<()> {
        if !self.trajectories.insert(id) {
            return Err(UwbError::TrajectoryCollision(id));
        }
        Ok(())
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Every key referenced by a factor, sorted.
    pub fn keys(&self) -> BTreeSet<PoseKey> {
        self.factors.iter().flat_map(|f| f.keys()).collect()
    }

    pub fn check_initial_estimates(&self, values: &Values) -> UwbResult<()> {
        match self.keys().into_iter().find(|k| !values.contains(k)) {
            Some(key) => Err(UwbError::MissingInitialEstimate(key)),
            None => Ok(()),
        }
    }

    pub fn total_cost(&self, values: &Values) -> UwbResult<f64> {
        self.factors.iter().map(|f| f.cost(values)).sum()
    }
}

/// Pose estimate per key.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Values {
    poses: FxHashMap<PoseKey, Isometry2<f64>>,
}

impl Values {
    pub fn new() -> Values {
        Values::default()
    }

    pub fn insert(&mut self, key: PoseKey, pose: Isometry2<f64>) -> UwbResult<()> {
        if self.poses.contains_key(&key) {
            return Err(UwbError::DuplicateKey(key));
        }
        self.poses.insert(key, pose);
        Ok(())
    }

    pub fn at(&self, key: PoseKey) -> UwbResult<&Isometry2<f64>> {
        self.poses.get(&key).ok_or(UwbError::KeyNotFound(key))
    }

    pub fn get(&self, key: PoseKey) -> Option<&Isometry2<f64>> {
        self.poses.get(&key)
    }

    pub fn contains(&self, key: &PoseKey) -> bool {
        self.poses.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn keys(&self) -> BTreeSet<PoseKey> {
        self.poses.keys().copied().collect()
    }

    pub(crate) fn update(&mut self, key: PoseKey, pose: Isometry2<f64>) {
        self.poses.insert(key, pose);
    }

    /// Applies a local increment (dx, dy, dtheta) to the pose at `key`.
    pub(crate) fn retract(&mut self, key: PoseKey, delta: &Vector3<f64>) {
        if let Some(pose) = self.poses.get_mut(&key) {
            pose.translation.vector += delta.xy();
            pose.rotation *= UnitComplex::from_angle(delta.z);
        }
    }
}
