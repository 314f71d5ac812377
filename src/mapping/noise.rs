use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

use crate::error::{UwbError, UwbResult};
use crate::mapping::robust_kernels::{GemanMcClure, RobustKernel};

#[derive(Debug)]
pub enum NoiseModel {
    /// Independent Gaussian noise per residual component.
    Diagonal { sigmas: DVector<f64> },
    /// Robust kernel applied on top of a Gaussian base model.
    Robust {
        kernel: Arc<dyn RobustKernel>,
        base: Arc<NoiseModel>,
    },
}

impl NoiseModel {
    pub fn diagonal(sigmas: &[f64]) -> UwbResult<Arc<NoiseModel>> {
        if let Some(bad) = sigmas.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(UwbError::InvalidSigma(*bad));
        }
        if sigmas.is_empty() {
            return Err(UwbError::NoiseDimension {
                expected: 1,
                actual: 0,
            });
        }
        Ok(Arc::new(NoiseModel::Diagonal {
            sigmas: DVector::from_column_slice(sigmas),
        }))
    }

    pub fn robust(kernel: Arc<dyn RobustKernel>, base: Arc<NoiseModel>) -> Arc<NoiseModel> {
        Arc::new(NoiseModel::Robust { kernel, base })
    }

    pub fn dim(&self) -> usize {
        match self {
            NoiseModel::Diagonal { sigmas } => sigmas.len(),
            NoiseModel::Robust { base, .. } => base.dim(),
        }
    }

    pub fn sigmas(&self) -> &DVector<f64> {
        match self {
            NoiseModel::Diagonal { sigmas } => sigmas,
            NoiseModel::Robust { base, .. } => base.sigmas(),
        }
    }

    /// Omega = diag(1 / sigma^2)
    pub fn information(&self) -> DMatrix<f64> {
        DMatrix::from_diagonal(&self.sigmas().map(|s| 1.0 / (s * s)))
    }

    /// Mahalanobis norm of a residual under the Gaussian part of the model.
    pub fn whitened_norm(&self, e: &DVector<f64>) -> f64 {
        e.component_div(self.sigmas()).norm()
    }

    /// Information matrix reweighted for the current residual (IRLS).
    pub fn weighted_information(&self, e: &DVector<f64>) -> DMatrix<f64> {
        match self {
            NoiseModel::Diagonal { .. } => self.information(),
            NoiseModel::Robust { kernel, base } => {
                base.weighted_information(e) * kernel.weight(base.whitened_norm(e))
            }
        }
    }

    pub fn cost(&self, e: &DVector<f64>) -> f64 {
        match self {
            NoiseModel::Diagonal { .. } => 0.5 * self.whitened_norm(e).powi(2),
            NoiseModel::Robust { kernel, base } => kernel.cost(base.whitened_norm(e)),
        }
    }

    pub fn ensure_dim(&self, expected: usize) -> UwbResult<()> {
        if self.dim() != expected {
            return Err(UwbError::NoiseDimension {
                expected,
                actual: self.dim(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorNoise {
    Loose,
    Tight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeNoise {
    Gaussian,
    /// Geman–McClure over the Gaussian range model.
    Robust,
}

/// Sigmas of the noise model catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseConfig {
    pub prior_loose: [f64; 3],
    pub prior_tight: [f64; 3],
    pub odometry: [f64; 3],
    pub range: f64,
    pub geman_mcclure_c: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        NoiseConfig {
            prior_loose: [0.3, 0.3, 0.1],
            prior_tight: [0.001, 0.001, 0.001],
            odometry: [0.2, 0.2, 0.1],
            range: 0.1,
            geman_mcclure_c: 1.0,
        }
    }
}

/// Noise models shared by every graph builder of a run.
#[derive(Debug, Clone)]
pub struct NoiseModels {
    pub prior_loose: Arc<NoiseModel>,
    pub prior_tight: Arc<NoiseModel>,
    pub odometry: Arc<NoiseModel>,
    pub range: Arc<NoiseModel>,
    pub robust_range: Arc<NoiseModel>,
}

impl NoiseModels {
    pub fn new(config: &NoiseConfig) -> UwbResult<NoiseModels> {
        let range = NoiseModel::diagonal(&[config.range])?;
        let robust_range = NoiseModel::robust(
            Arc::new(GemanMcClure::new(config.geman_mcclure_c)),
            range.clone(),
        );
        Ok(NoiseModels {
            prior_loose: NoiseModel::diagonal(&config.prior_loose)?,
            prior_tight: NoiseModel::diagonal(&config.prior_tight)?,
            odometry: NoiseModel::diagonal(&config.odometry)?,
            range,
            robust_range,
        })
    }

    pub fn prior(&self, kind: PriorNoise) -> &Arc<NoiseModel> {
        match kind {
            PriorNoise::Loose => &self.prior_loose,
            PriorNoise::Tight => &self.prior_tight,
        }
    }

    pub fn range(&self, kind: RangeNoise) -> &Arc<NoiseModel> {
        match kind {
            RangeNoise::Gaussian => &self.range,
            RangeNoise::Robust => &self.robust_range,
        }
    }
}
