use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::UwbResult;
use crate::mapping::graph::Values;
use crate::mapping::optimizer::Marginals;

/// One row of the exported estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoseRecord {
    pub trajectory: u32,
    pub index: u32,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub sigma_theta: f64,
}

/// Records in key order, trajectory first.
pub fn pose_records(values: &Values, marginals: &Marginals) -> UwbResult<Vec<PoseRecord>> {
    values
        .keys()
        .into_iter()
        .map(|key| {
            let pose = values.at(key)?;
            let cov = marginals.marginal_covariance(key)?;
            Ok(PoseRecord {
                trajectory: key.trajectory.0,
                index: key.index,
                x: pose.translation.x,
                y: pose.translation.y,
                theta: pose.rotation.angle(),
                sigma_x: cov[(0, 0)].max(0.0).sqrt(),
                sigma_y: cov[(1, 1)].max(0.0).sqrt(),
                sigma_theta: cov[(2, 2)].max(0.0).sqrt(),
            })
        })
        .collect()
}

pub fn write_pose_records<W: Write>(writer: W, records: &[PoseRecord]) -> UwbResult<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_pose_records(path: &Path, values: &Values, marginals: &Marginals) -> UwbResult<()> {
    let records = pose_records(values, marginals)?;
    write_pose_records(File::create(path)?, &records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UwbError;
    use crate::mapping::key::{PoseKey, TrajectoryId};
    use approx::assert_abs_diff_eq;
    use nalgebra::{Isometry2, Matrix3, Vector2, Vector3};
    use std::error::Error;

    fn sample() -> Result<(Values, Marginals), Box<dyn Error>> {
        let mut values = Values::new();
        let mut covariances = Vec::new();
        for (id, index) in [(2, 1), (1, 2), (1, 1)] {
            let key = PoseKey::new(TrajectoryId(id), index);
            values.insert(key, Isometry2::new(Vector2::new(index as f64, id as f64), 0.1))?;
            covariances.push((key, Matrix3::from_diagonal(&Vector3::new(0.04, 0.09, 0.01))));
        }
        Ok((values, covariances.into_iter().collect()))
    }

    #[test]
    fn records_are_sorted_by_key() -> Result<(), Box<dyn Error>> {
        let (values, marginals) = sample()?;
        let records = pose_records(&values, &marginals)?;
        let order: Vec<_> = records.iter().map(|r| (r.trajectory, r.index)).collect();
        assert_eq!(order, vec![(1, 1), (1, 2), (2, 1)]);

        assert_abs_diff_eq!(records[0].theta, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(records[0].sigma_x, 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(records[0].sigma_y, 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(records[0].sigma_theta, 0.1, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn csv_has_header_and_one_row_per_pose() -> Result<(), Box<dyn Error>> {
        let (values, marginals) = sample()?;
        let mut buffer = Vec::new();
        write_pose_records(&mut buffer, &pose_records(&values, &marginals)?)?;

        let text = String::from_utf8(buffer)?;
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "trajectory,index,x,y,theta,sigma_x,sigma_y,sigma_theta");
        assert!(lines[3].starts_with("2,1,1.0,2.0,"));
        Ok(())
    }

    #[test]
    fn missing_marginal_aborts_export() -> Result<(), Box<dyn Error>> {
        let (values, _) = sample()?;
        assert!(matches!(
            pose_records(&values, &Marginals::default()),
            Err(UwbError::KeyNotFound(_))
        ));
        Ok(())
    }
}
