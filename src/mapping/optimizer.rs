#![allow(non_snake_case)]

use nalgebra::{DMatrix, DVector, Matrix3};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::error::{UwbError, UwbResult};
use crate::mapping::graph::{FactorGraph, Values};
use crate::mapping::key::PoseKey;

/// Narrow interface of the nonlinear least-squares backend.
pub trait Optimizer {
    fn optimize(&self, graph: &FactorGraph, initial: &Values) -> UwbResult<OptimizationResult>;
    fn marginals(&self, graph: &FactorGraph, values: &Values) -> UwbResult<Marginals>;
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Solver {
    GaussNewton,
    LevenbergMarquardt,
}

#[derive(Debug, Clone)]
pub struct LevenbergMarquardtParams {
    pub max_iterations: usize,
    pub relative_error_tol: f64,
    pub absolute_error_tol: f64,
    pub lambda_initial: f64,
    pub lambda_factor: f64,
    pub lambda_upper_bound: f64,
    pub solver: Solver,
}

impl Default for LevenbergMarquardtParams {
    fn default() -> Self {
        LevenbergMarquardtParams {
            max_iterations: 100,
            relative_error_tol: 1e-5,
            absolute_error_tol: 1e-5,
            lambda_initial: 1e-5,
            lambda_factor: 10.0,
            lambda_upper_bound: 1e5,
            solver: Solver::LevenbergMarquardt,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub values: Values,
    /// Total cost before the first and after every accepted iteration.
    pub errors: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl OptimizationResult {
    pub fn initial_error(&self) -> f64 {
        self.errors.first().copied().unwrap_or_default()
    }

    pub fn final_error(&self) -> f64 {
        self.errors.last().copied().unwrap_or_default()
    }
}

/// Marginal covariance per pose, in (x, y, theta) coordinates.
#[derive(Debug, Clone, Default)]
pub struct Marginals {
    covariances: FxHashMap<PoseKey, Matrix3<f64>>,
}

impl Marginals {
    pub fn marginal_covariance(&self, key: PoseKey) -> UwbResult<&Matrix3<f64>> {
        self.covariances
            .get(&key)
            .ok_or(UwbError::KeyNotFound(key))
    }

    pub fn len(&self) -> usize {
        self.covariances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.covariances.is_empty()
    }
}

impl FromIterator<(PoseKey, Matrix3<f64>)> for Marginals {
    fn from_iter<I: IntoIterator<Item = (PoseKey, Matrix3<f64>)>>(iter: I) -> Self {
        Marginals {
            covariances: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    params: LevenbergMarquardtParams,
}

/// Variable ordering: sorted keys, 3 columns each.
fn build_lut(graph: &FactorGraph) -> FxHashMap<PoseKey, usize> {
    graph
        .keys()
        .into_iter()
        .enumerate()
        .map(|(i, key)| (key, 3 * i))
        .collect()
}

/// H = sum J^T W J and b = sum J^T W e over all factors.
fn build_linear_system(
    graph: &FactorGraph,
    values: &Values,
    lut: &FxHashMap<PoseKey, usize>,
) -> UwbResult<(DMatrix<f64>, DVector<f64>)> {
    let n = 3 * lut.len();
    let mut H = DMatrix::zeros(n, n);
    let mut b = DVector::zeros(n);

    for factor in graph.factors() {
        let linearized = factor.linearize(values)?;
        let omega = factor.noise().weighted_information(&linearized.error);
        let e = &linearized.error;

        for (key_i, J_i) in &linearized.jacobians {
            let i = *lut.get(key_i).ok_or(UwbError::KeyNotFound(*key_i))?;
            let J_i_omega = J_i.transpose() * &omega;

            let mut v = b.rows_mut(i, 3);
            v += &J_i_omega * e;

            for (key_j, J_j) in &linearized.jacobians {
                let j = *lut.get(key_j).ok_or(UwbError::KeyNotFound(*key_j))?;
                let mut v = H.view_mut((i, j), (3, 3));
                v += &J_i_omega * J_j;
            }
        }
    }
    Ok((H, b))
}

fn apply_update(values: &mut Values, lut: &FxHashMap<PoseKey, usize>, dx: &DVector<f64>) {
    for (key, offset) in lut {
        let delta = dx.fixed_rows::<3>(*offset).clone_owned();
        values.retract(*key, &delta);
    }
}

impl LevenbergMarquardt {
    pub fn new(params: LevenbergMarquardtParams) -> LevenbergMarquardt {
        LevenbergMarquardt { params }
    }

    /// Solves (H + lambda I) dx = -b.
    fn solve_damped(H: &DMatrix<f64>, b: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
        let n = H.nrows();
        let damped = H + DMatrix::<f64>::identity(n, n) * lambda;
        damped.cholesky().map(|chol| chol.solve(&(-b)))
    }

    fn converged(&self, last_error: f64, error: f64) -> bool {
        if error <= self.params.absolute_error_tol {
            return true;
        }
        let decrease = last_error - error;
        decrease >= 0.0 && decrease <= self.params.relative_error_tol * last_error
    }
}

impl Optimizer for LevenbergMarquardt {
    fn optimize(&self, graph: &FactorGraph, initial: &Values) -> UwbResult<OptimizationResult> {
        graph.check_initial_estimates(initial)?;

        let lut = build_lut(graph);
        let mut values = initial.clone();
        let mut lambda = match self.params.solver {
            Solver::GaussNewton => 0.0,
            Solver::LevenbergMarquardt => self.params.lambda_initial,
        };
        let mut last_error = graph.total_cost(&values)?;
        let mut errors = vec![last_error];
        let mut converged = last_error <= self.params.absolute_error_tol;
        let mut iterations = 0;

        info!(
            "Loaded graph with {} nodes and {} factors, initial error {:.5}",
            lut.len(),
            graph.len(),
            last_error
        );

        while !converged && iterations < self.params.max_iterations {
            iterations += 1;
            let (H, b) = build_linear_system(graph, &values, &lut)?;

            let mut accepted = None;
            loop {
                let candidate = Self::solve_damped(&H, &b, lambda).map(|dx| {
                    let mut next = values.clone();
                    apply_update(&mut next, &lut, &dx);
                    (next, dx.norm())
                });

                if let Some((next, norm_dx)) = candidate {
                    let error = graph.total_cost(&next)?;
                    if self.params.solver == Solver::GaussNewton || error <= last_error {
                        lambda /= self.params.lambda_factor;
                        accepted = Some((next, error, norm_dx));
                        break;
                    }
                } else if self.params.solver == Solver::GaussNewton {
                    return Err(UwbError::IndefiniteSystem);
                }

                lambda *= self.params.lambda_factor;
                if lambda > self.params.lambda_upper_bound {
                    break;
                }
            }

            let Some((next, error, norm_dx)) = accepted else {
                debug!("lambda reached {lambda:e} without decreasing the error");
                break;
            };

            converged = self.converged(last_error, error);
            values = next;
            last_error = error;
            errors.push(error);
            debug!("step {iterations:3} : |dx| = {norm_dx:3.5}, error = {error:3.5}, lambda = {lambda:e}");
        }

        if converged {
            info!("converged after {iterations} iterations, final error {last_error:.5}");
        } else {
            warn!("stopped after {iterations} iterations without converging, error {last_error:.5}");
        }

        Ok(OptimizationResult {
            values,
            errors,
            iterations,
            converged,
        })
    }

    fn marginals(&self, graph: &FactorGraph, values: &Values) -> UwbResult<Marginals> {
        graph.check_initial_estimates(values)?;
        let lut = build_lut(graph);
        let (H, _) = build_linear_system(graph, values, &lut)?;
        let covariance = H.cholesky().ok_or(UwbError::IndefiniteSystem)?.inverse();

        Ok(lut
            .iter()
            .map(|(key, offset)| {
                let block = covariance.fixed_view::<3, 3>(*offset, *offset).clone_owned();
                (*key, block)
            })
            .collect())
    }
}
