use nalgebra::Vector2;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{UwbError, UwbResult};
use crate::mapping::factor::{Factor, RangeFactor};
use crate::mapping::graph::FactorGraph;
use crate::mapping::key::{PoseKey, TrajectoryId};
use crate::mapping::noise::NoiseModel;

/// Ground-truth positions of one trajectory, used to synthesize UWB ranges.
#[derive(Debug, Clone)]
pub struct NominalTrajectory {
    pub id: TrajectoryId,
    pub positions: BTreeMap<u32, Vector2<f64>>,
}

impl NominalTrajectory {
    /// Local points (index 1, 2, ...) shifted by a fixed world offset.
    pub fn with_offset(id: TrajectoryId, local: &[Vector2<f64>], offset: Vector2<f64>) -> Self {
        let positions = local
            .iter()
            .enumerate()
            .map(|(i, p)| (i as u32 + 1, p + offset))
            .collect();
        NominalTrajectory { id, positions }
    }

    pub fn position(&self, index: u32) -> UwbResult<&Vector2<f64>> {
        self.positions
            .get(&index)
            .ok_or(UwbError::KeyNotFound(PoseKey::new(self.id, index)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeMeasurement {
    pub from: PoseKey,
    pub to: PoseKey,
    pub range: f64,
}

pub fn distance(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    (a - b).norm()
}

/// Ranges between corresponding poses of every pair of trajectories.
///
/// Indices are taken from the first trajectory; for each index the pairs are
/// visited in order (0, 1), (0, 2), ..., (1, 2), ...
pub fn cross_ranges(trajectories: &[NominalTrajectory]) -> UwbResult<Vec<RangeMeasurement>> {
    let Some(first) = trajectories.first() else {
        return Ok(Vec::new());
    };

    let mut ranges = Vec::new();
    for index in first.positions.keys() {
        for (j, a) in trajectories.iter().enumerate() {
            for b in &trajectories[j + 1..] {
                ranges.push(RangeMeasurement {
                    from: PoseKey::new(a.id, *index),
                    to: PoseKey::new(b.id, *index),
                    range: distance(a.position(*index)?, b.position(*index)?),
                });
            }
        }
    }
    Ok(ranges)
}

/// Couples the local graphs with one range factor per nominal distance.
pub fn add_range_constraints(
    graph: &mut FactorGraph,
    trajectories: &[NominalTrajectory],
    noise: &Arc<NoiseModel>,
) -> UwbResult<usize> {
    let ranges = cross_ranges(trajectories)?;
    for measurement in &ranges {
        graph.add(Factor::Range(RangeFactor::new(
            measurement.from,
            measurement.to,
            measurement.range,
            noise.clone(),
        )?));
    }
    debug!("added {} range factors", ranges.len());
    Ok(ranges.len())
}
