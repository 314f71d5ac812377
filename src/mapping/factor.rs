#![allow(non_snake_case)]

use nalgebra::{DMatrix, DVector, Isometry2, Matrix2, Matrix3, Vector2, Vector3};
use std::sync::Arc;

use crate::error::{UwbError, UwbResult};
use crate::mapping::graph::Values;
use crate::mapping::key::PoseKey;
use crate::mapping::noise::NoiseModel;

#[derive(Debug, Clone)]
pub enum Factor {
    Prior(PriorFactor),
    Between(BetweenFactor),
    Range(RangeFactor),
}

#[derive(Debug, Clone)]
pub struct PriorFactor {
    key: PoseKey,
    mean: Isometry2<f64>,
    noise: Arc<NoiseModel>,
}

impl PriorFactor {
    pub fn new(key: PoseKey, mean: Isometry2<f64>, noise: Arc<NoiseModel>) -> UwbResult<Self> {
        noise.ensure_dim(3)?;
        Ok(PriorFactor { key, mean, noise })
    }

    pub fn key(&self) -> PoseKey {
        self.key
    }
}

/// Relative pose (odometry) between two consecutive poses.
#[derive(Debug, Clone)]
pub struct BetweenFactor {
    from: PoseKey,
    to: PoseKey,
    measurement: Isometry2<f64>,
    noise: Arc<NoiseModel>,
}

impl BetweenFactor {
    pub fn new(
        from: PoseKey,
        to: PoseKey,
        measurement: Isometry2<f64>,
        noise: Arc<NoiseModel>,
    ) -> UwbResult<Self> {
        noise.ensure_dim(3)?;
        Ok(BetweenFactor {
            from,
            to,
            measurement,
            noise,
        })
    }

    pub fn measurement(&self) -> &Isometry2<f64> {
        &self.measurement
    }
}

/// Scalar distance between the translations of two poses.
#[derive(Debug, Clone)]
pub struct RangeFactor {
    from: PoseKey,
    to: PoseKey,
    range: f64,
    noise: Arc<NoiseModel>,
}

impl RangeFactor {
    pub fn new(from: PoseKey, to: PoseKey, range: f64, noise: Arc<NoiseModel>) -> UwbResult<Self> {
        noise.ensure_dim(1)?;
        if !(range.is_finite() && range >= 0.0) {
            return Err(UwbError::InvalidMeasurement(format!(
                "range {range} between {from} and {to}"
            )));
        }
        Ok(RangeFactor {
            from,
            to,
            range,
            noise,
        })
    }

    pub fn range(&self) -> f64 {
        self.range
    }
}

/// Residual and per-variable Jacobian blocks (rows x 3) at a linearization point.
#[derive(Debug)]
pub struct LinearizedFactor {
    pub error: DVector<f64>,
    pub jacobians: Vec<(PoseKey, DMatrix<f64>)>,
}

impl Factor {
    pub fn keys(&self) -> Vec<PoseKey> {
        match self {
            Factor::Prior(f) => vec![f.key],
            Factor::Between(f) => vec![f.from, f.to],
            Factor::Range(f) => vec![f.from, f.to],
        }
    }

    pub fn noise(&self) -> &Arc<NoiseModel> {
        match self {
            Factor::Prior(f) => &f.noise,
            Factor::Between(f) => &f.noise,
            Factor::Range(f) => &f.noise,
        }
    }

    pub fn error(&self, values: &Values) -> UwbResult<DVector<f64>> {
        let e = match self {
            Factor::Prior(f) => {
                let x = values.at(f.key)?;
                dvec3(&v3(&pose_prior_constraint(x, &f.mean)))
            }
            Factor::Between(f) => {
                let x1 = values.at(f.from)?;
                let x2 = values.at(f.to)?;
                dvec3(&v3(&pose_pose_constraint(x1, x2, &f.measurement)))
            }
            Factor::Range(f) => {
                let x1 = values.at(f.from)?;
                let x2 = values.at(f.to)?;
                DVector::from_element(1, range_constraint(x1, x2, f.range))
            }
        };
        Ok(e)
    }

    /// Cost of the factor under its noise model (robust kernels included).
    pub fn cost(&self, values: &Values) -> UwbResult<f64> {
        Ok(self.noise().cost(&self.error(values)?))
    }

    pub fn linearize(&self, values: &Values) -> UwbResult<LinearizedFactor> {
        let linearized = match self {
            Factor::Prior(f) => {
                let x = values.at(f.key)?;
                let e = v3(&pose_prior_constraint(x, &f.mean));
                let A = linearize_pose_prior_constraint(&f.mean);
                LinearizedFactor {
                    error: dvec3(&e),
                    jacobians: vec![(f.key, dmat3(&A))],
                }
            }
            Factor::Between(f) => {
                let x1 = values.at(f.from)?;
                let x2 = values.at(f.to)?;
                let e = v3(&pose_pose_constraint(x1, x2, &f.measurement));
                let (A, B) = linearize_pose_pose_constraint(x1, x2, &f.measurement);
                LinearizedFactor {
                    error: dvec3(&e),
                    jacobians: vec![(f.from, dmat3(&A)), (f.to, dmat3(&B))],
                }
            }
            Factor::Range(f) => {
                let x1 = values.at(f.from)?;
                let x2 = values.at(f.to)?;
                let e = range_constraint(x1, x2, f.range);
                let u = range_direction(x1, x2);
                LinearizedFactor {
                    error: DVector::from_element(1, e),
                    jacobians: vec![
                        (f.from, DMatrix::from_row_slice(1, 3, &[-u.x, -u.y, 0.0])),
                        (f.to, DMatrix::from_row_slice(1, 3, &[u.x, u.y, 0.0])),
                    ],
                }
            }
        };
        Ok(linearized)
    }
}

pub(crate) fn v3(iso2: &Isometry2<f64>) -> Vector3<f64> {
    Vector3::new(
        iso2.translation.x,
        iso2.translation.y,
        iso2.rotation.angle(),
    )
}

fn dvec3(v: &Vector3<f64>) -> DVector<f64> {
    DVector::from_column_slice(v.as_slice())
}

fn dmat3(m: &Matrix3<f64>) -> DMatrix<f64> {
    DMatrix::from_column_slice(3, 3, m.as_slice())
}

fn pose_prior_constraint(x: &Isometry2<f64>, z: &Isometry2<f64>) -> Isometry2<f64> {
    z.inverse() * x
}

fn pose_pose_constraint(
    x1: &Isometry2<f64>,
    x2: &Isometry2<f64>,
    z: &Isometry2<f64>,
) -> Isometry2<f64> {
    z.inverse() * x1.inverse() * x2
}

fn range_constraint(x1: &Isometry2<f64>, x2: &Isometry2<f64>, z: f64) -> f64 {
    (x2.translation.vector - x1.translation.vector).norm() - z
}

fn range_direction(x1: &Isometry2<f64>, x2: &Isometry2<f64>) -> Vector2<f64> {
    let d = x2.translation.vector - x1.translation.vector;
    let norm = d.norm();
    if norm > 1e-10 {
        d / norm
    } else {
        // coincident positions: the gradient is undefined. (1, 1) is the GTSAM
        // norm2 convention and is intentionally not unit length.
        Vector2::new(1.0, 1.0)
    }
}

fn linearize_pose_prior_constraint(z: &Isometry2<f64>) -> Matrix3<f64> {
    let z_rot_t = z.rotation.to_rotation_matrix().transpose();
    let r = z_rot_t.matrix();

    #[rustfmt::skip]
    let A = Matrix3::new(
        r.m11, r.m12, 0.0,
        r.m21, r.m22, 0.0,
        0.0, 0.0, 1.0,
    );
    A
}

fn linearize_pose_pose_constraint(
    x1: &Isometry2<f64>,
    x2: &Isometry2<f64>,
    z: &Isometry2<f64>,
) -> (Matrix3<f64>, Matrix3<f64>) {
    let deriv = Matrix2::<f64>::new(0.0, -1.0, 1.0, 0.0);

    let z_rot = z.rotation.to_rotation_matrix();
    let x1_rot = x1.rotation.to_rotation_matrix();
    let a_11 = -(z_rot.inverse() * x1_rot.inverse()).matrix();
    let xr1d = deriv * x1_rot.matrix();
    let a_12 =
        z_rot.transpose() * xr1d.transpose() * (x2.translation.vector - x1.translation.vector);

    #[rustfmt::skip]
    let A = Matrix3::new(
        a_11.m11, a_11.m12, a_12.x,
        a_11.m21, a_11.m22, a_12.y,
        0.0, 0.0, -1.0,
    );

    let b_11 = (z_rot.inverse() * x1_rot.inverse()).matrix().to_owned();
    #[rustfmt::skip]
    let B = Matrix3::new(
        b_11.m11, b_11.m12, 0.0,
        b_11.m21, b_11.m22, 0.0,
        0.0, 0.0, 1.0,
    );
    (A, B)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::key::TrajectoryId;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Translation2, UnitComplex};
    use std::error::Error;

    fn iso2(x: f64, y: f64, angle: f64) -> Isometry2<f64> {
        Isometry2::from_parts(Translation2::new(x, y), UnitComplex::from_angle(angle))
    }

    fn retract(x: &Isometry2<f64>, i: usize, h: f64) -> Isometry2<f64> {
        let mut x = *x;
        match i {
            0 => x.translation.vector.x += h,
            1 => x.translation.vector.y += h,
            _ => x.rotation *= UnitComplex::from_angle(h),
        }
        x
    }

    /// Central differences of the factor error w.r.t. the variable `key`.
    fn numerical_jacobian(
        factor: &Factor,
        values: &Values,
        key: PoseKey,
    ) -> Result<DMatrix<f64>, Box<dyn Error>> {
        let h = 1e-6;
        let rows = factor.error(values)?.len();
        let mut J = DMatrix::zeros(rows, 3);
        for i in 0..3 {
            let x = *values.at(key)?;
            let mut plus = values.clone();
            plus.update(key, retract(&x, i, h));
            let mut minus = values.clone();
            minus.update(key, retract(&x, i, -h));
            let column = (factor.error(&plus)? - factor.error(&minus)?) / (2.0 * h);
            J.set_column(i, &column);
        }
        Ok(J)
    }

    fn keys() -> (PoseKey, PoseKey) {
        let g = TrajectoryId(1);
        (PoseKey::new(g, 1), PoseKey::new(g, 2))
    }

    fn values(x1: Isometry2<f64>, x2: Isometry2<f64>) -> Result<Values, Box<dyn Error>> {
        let (k1, k2) = keys();
        let mut values = Values::new();
        values.insert(k1, x1)?;
        values.insert(k2, x2)?;
        Ok(values)
    }

    #[test]
    fn between_error_vanishes_for_exact_odometry() -> Result<(), Box<dyn Error>> {
        let (k1, k2) = keys();
        let noise = NoiseModel::diagonal(&[0.2, 0.2, 0.1])?;
        let z = iso2(2.0, 0.0, 0.0);
        let factor = Factor::Between(BetweenFactor::new(k1, k2, z, noise)?);

        let x1 = iso2(1.0, -1.0, 0.5);
        let values = values(x1, x1 * z)?;
        approx::assert_abs_diff_eq!(factor.error(&values)?, DVector::zeros(3), epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn analytic_jacobians_match_finite_differences() -> Result<(), Box<dyn Error>> {
        let (k1, k2) = keys();
        let pose_noise = NoiseModel::diagonal(&[0.2, 0.2, 0.1])?;
        let range_noise = NoiseModel::diagonal(&[0.1])?;
        let values = values(iso2(0.5, 0.1, 0.2), iso2(2.3, -0.4, -0.3))?;

        let factors = vec![
            Factor::Prior(PriorFactor::new(k1, iso2(0.1, 0.2, 0.3), pose_noise.clone())?),
            Factor::Between(BetweenFactor::new(
                k1,
                k2,
                iso2(2.0, 0.0, 0.1),
                pose_noise,
            )?),
            Factor::Range(RangeFactor::new(k1, k2, 1.5, range_noise)?),
        ];

        for factor in &factors {
            let linearized = factor.linearize(&values)?;
            assert_abs_diff_eq!(linearized.error, factor.error(&values)?, epsilon = 1e-12);
            for (key, J) in &linearized.jacobians {
                let expected = numerical_jacobian(factor, &values, *key)?;
                assert_abs_diff_eq!(*J, expected, epsilon = 1e-5);
            }
        }
        Ok(())
    }

    #[test]
    fn coincident_range_endpoints_have_finite_jacobian() -> Result<(), Box<dyn Error>> {
        let (k1, k2) = keys();
        let factor = Factor::Range(RangeFactor::new(k1, k2, 4.0, NoiseModel::diagonal(&[0.1])?)?);
        let values = values(iso2(0.3, 0.0, 0.2), iso2(0.3, 0.0, -0.1))?;
        let linearized = factor.linearize(&values)?;
        assert_abs_diff_eq!(linearized.error[0], -4.0);
        for (_, J) in &linearized.jacobians {
            assert!(J.iter().all(|v| v.is_finite()));
        }
        let (_, J1) = &linearized.jacobians[0];
        let (_, J2) = &linearized.jacobians[1];
        assert_eq!(J1.as_slice(), &[-1.0, -1.0, 0.0]);
        assert_eq!(J2.as_slice(), &[1.0, 1.0, 0.0]);
        Ok(())
    }

    #[test]
    fn noise_dimension_is_checked() -> Result<(), Box<dyn Error>> {
        let (k1, k2) = keys();
        let range_noise = NoiseModel::diagonal(&[0.1])?;
        let pose_noise = NoiseModel::diagonal(&[0.2, 0.2, 0.1])?;
        assert!(matches!(
            PriorFactor::new(k1, Isometry2::identity(), range_noise.clone()),
            Err(UwbError::NoiseDimension {
                expected: 3,
                actual: 1
            })
        ));
        assert!(RangeFactor::new(k1, k2, 1.0, pose_noise).is_err());
        assert!(matches!(
            RangeFactor::new(k1, k2, -1.0, range_noise),
            Err(UwbError::InvalidMeasurement(_))
        ));
        Ok(())
    }
}
