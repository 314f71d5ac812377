//! Robust kernels for down-weighting outlier measurements.
//!
//! The optimizer works on the whitened residual norm r = ‖e‖_Ω. A kernel maps
//! it to a cost ρ(r) and to a multiplicative IRLS weight on the information
//! matrix.

use std::fmt::Debug;

pub trait RobustKernel: Debug + Send + Sync {
    /// IRLS weight for the whitened residual norm.
    fn weight(&self, residual_abs: f64) -> f64;

    /// Robust cost ρ(r), equal to ½r² near zero.
    fn cost(&self, residual_abs: f64) -> f64;
}

/// Geman–McClure kernel
///
/// rho(r) = 0.5 * c^2 * r^2 / (c^2 + r^2)
/// weight(r) = c^4 / (c^2 + r^2)^2
#[derive(Debug, Clone, Copy)]
pub struct GemanMcClure {
    pub c: f64,
}

impl Default for GemanMcClure {
    fn default() -> Self {
        Self { c: 1.0 }
    }
}

impl GemanMcClure {
    pub fn new(c: f64) -> Self {
        Self {
            c: c.abs().max(1e-6),
        }
    }
}

impl RobustKernel for GemanMcClure {
    fn weight(&self, residual_abs: f64) -> f64 {
        let c2 = self.c * self.c;
        let denominator = c2 + residual_abs * residual_abs;
        c2 * c2 / (denominator * denominator)
    }

    fn cost(&self, residual_abs: f64) -> f64 {
        let c2 = self.c * self.c;
        let r2 = residual_abs * residual_abs;
        0.5 * c2 * r2 / (c2 + r2)
    }
}
