pub mod builder;
pub mod factor;
pub mod graph;
pub mod key;
pub mod noise;
pub mod optimizer;
pub mod range_linker;
pub mod robust_kernels;
pub mod scenario;

pub use builder::{add_local_graph, LocalTrajectory};
pub use factor::{BetweenFactor, Factor, PriorFactor, RangeFactor};
pub use graph::{FactorGraph, Values};
pub use key::{PoseKey, TrajectoryId};
pub use noise::{NoiseConfig, NoiseModel, NoiseModels, PriorNoise, RangeNoise};
pub use optimizer::{
    LevenbergMarquardt, LevenbergMarquardtParams, Marginals, OptimizationResult, Optimizer, Solver,
};
pub use range_linker::{add_range_constraints, NominalTrajectory};
pub use scenario::{build_problem, run_scenario, ScenarioConfig, ScenarioOutcome};
