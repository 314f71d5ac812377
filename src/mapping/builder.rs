use nalgebra::{Isometry2, Translation2, UnitComplex};
use tracing::debug;

use crate::error::{UwbError, UwbResult};
use crate::mapping::factor::{BetweenFactor, Factor, PriorFactor};
use crate::mapping::graph::{FactorGraph, Values};
use crate::mapping::key::{PoseKey, TrajectoryId};
use crate::mapping::noise::{NoiseModels, PriorNoise};

pub(crate) fn iso2(x: f64, y: f64, angle: f64) -> Isometry2<f64> {
    Isometry2::from_parts(Translation2::new(x, y), UnitComplex::from_angle(angle))
}

/// One local pose chain.
#[derive(Debug, Clone)]
pub struct LocalTrajectory {
    pub id: TrajectoryId,
    /// Prior on the first pose; `None` leaves the chain to be located by ranges only.
    pub prior: Option<PriorNoise>,
    pub prior_mean: Isometry2<f64>,
    /// Relative transform from pose i to pose i + 1.
    pub odometry: Vec<Isometry2<f64>>,
    /// Deliberately perturbed initial guesses, one per pose.
    pub initial_guesses: Vec<Isometry2<f64>>,
}

impl LocalTrajectory {
    pub fn len(&self) -> usize {
        self.initial_guesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.initial_guesses.is_empty()
    }

    pub fn key(&self, index: u32) -> PoseKey {
        PoseKey::new(self.id, index)
    }

    pub fn keys(&self) -> Vec<PoseKey> {
        (1..=self.len() as u32).map(|i| self.key(i)).collect()
    }

    /// Poses obtained by chaining the odometry from `origin`.
    pub fn nominal_poses(&self, origin: Isometry2<f64>) -> Vec<Isometry2<f64>> {
        let mut poses = vec![origin];
        for step in &self.odometry {
            let last = poses[poses.len() - 1];
            poses.push(last * step);
        }
        poses
    }

    fn validate(&self) -> UwbResult<()> {
        if self.is_empty() {
            return Err(UwbError::InvalidTrajectory {
                id: self.id,
                reason: "no poses".to_string(),
            });
        }
        if self.odometry.len() + 1 != self.initial_guesses.len() {
            return Err(UwbError::InvalidTrajectory {
                id: self.id,
                reason: format!(
                    "{} odometry steps for {} initial guesses",
                    self.odometry.len(),
                    self.initial_guesses.len()
                ),
            });
        }
        Ok(())
    }
}

/// Appends the prior, the odometry chain and the initial guesses of one
/// trajectory to the shared problem.
pub fn add_local_graph(
    graph: &mut FactorGraph,
    initial: &mut Values,
    trajectory: &LocalTrajectory,
    noise: &NoiseModels,
) -> UwbResult<()> {
    trajectory.validate()?;
    graph.register_trajectory(trajectory.id)?;

    let keys = trajectory.keys();
    if let Some(kind) = trajectory.prior {
        graph.add(Factor::Prior(PriorFactor::new(
            keys[0],
            trajectory.prior_mean,
            noise.prior(kind).clone(),
        )?));
    }

    for (pair, odometry) in keys.windows(2).zip(&trajectory.odometry) {
        graph.add(Factor::Between(BetweenFactor::new(
            pair[0],
            pair[1],
            *odometry,
            noise.odometry.clone(),
        )?));
    }

    for (key, guess) in keys.iter().zip(&trajectory.initial_guesses) {
        initial.insert(*key, *guess)?;
    }

    debug!(
        "{}: {} poses, prior {:?}",
        trajectory.id,
        keys.len(),
        trajectory.prior
    );
    Ok(())
}
