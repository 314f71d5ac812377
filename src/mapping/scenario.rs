use nalgebra::{Isometry2, Vector2};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::data::export_pose_records;
use crate::error::UwbResult;
use crate::mapping::builder::{add_local_graph, iso2, LocalTrajectory};
use crate::mapping::graph::{FactorGraph, Values};
use crate::mapping::key::TrajectoryId;
use crate::mapping::noise::{NoiseModels, PriorNoise, RangeNoise};
use crate::mapping::optimizer::{Marginals, OptimizationResult, Optimizer};
use crate::mapping::range_linker::{add_range_constraints, NominalTrajectory};
use crate::utils::plot::{local_graphs_figure, render, PlotStyle};

pub const G1: TrajectoryId = TrajectoryId(1);
pub const G2: TrajectoryId = TrajectoryId(2);
pub const G3: TrajectoryId = TrajectoryId(3);

pub const G2_OFFSET: (f64, f64) = (-4.0, 2.0);
pub const G3_OFFSET: (f64, f64) = (-1.0, -4.0);

#[derive(Debug, Clone)]
pub struct RangeLinkConfig {
    pub nominal: Vec<NominalTrajectory>,
    pub noise: RangeNoise,
}

#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub name: String,
    pub title: String,
    /// Lines logged after the optimization.
    pub legend: Vec<String>,
    pub trajectories: Vec<LocalTrajectory>,
    pub ranges: Option<RangeLinkConfig>,
    pub output_dir: PathBuf,
    pub image_name: String,
    pub style: PlotStyle,
}

#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub result: OptimizationResult,
    pub marginals: Marginals,
    pub image: PathBuf,
    pub csv: PathBuf,
}

/// Straight line along x.
pub fn trajectory_g1(prior: Option<PriorNoise>) -> LocalTrajectory {
    LocalTrajectory {
        id: G1,
        prior,
        prior_mean: Isometry2::identity(),
        odometry: vec![iso2(2.0, 0.0, 0.0); 4],
        initial_guesses: vec![
            iso2(0.5, 0.0, 0.2),
            iso2(2.3, 0.1, -0.2),
            iso2(4.1, 0.1, -0.1),
            iso2(5.9, -0.2, 0.1),
            iso2(8.1, 0.01, 0.14),
        ],
    }
}

/// Staircase climbing in +y.
pub fn trajectory_g2(prior: Option<PriorNoise>) -> LocalTrajectory {
    LocalTrajectory {
        id: G2,
        prior,
        prior_mean: Isometry2::identity(),
        odometry: vec![
            iso2(0.0, 2.0, 0.0),
            iso2(2.0, 0.0, 0.0),
            iso2(0.0, 2.0, 0.0),
            iso2(2.0, 0.0, 0.0),
        ],
        initial_guesses: vec![
            iso2(0.3, 0.0, 0.2),
            iso2(-0.1, 2.1, -0.2),
            iso2(2.1, 2.3, -0.1),
            iso2(1.9, 4.2, 0.1),
            iso2(4.1, 4.01, 0.14),
        ],
    }
}

/// Staircase descending in -y.
pub fn trajectory_g3(prior: Option<PriorNoise>) -> LocalTrajectory {
    LocalTrajectory {
        id: G3,
        prior,
        prior_mean: Isometry2::identity(),
        odometry: vec![
            iso2(0.0, -2.0, 0.0),
            iso2(2.0, 0.0, 0.0),
            iso2(0.0, -2.0, 0.0),
            iso2(2.0, 0.0, 0.0),
        ],
        initial_guesses: vec![
            iso2(0.3, 0.0, 0.2),
            iso2(-0.1, -2.1, -0.2),
            iso2(2.1, -2.3, -0.1),
            iso2(1.9, -4.2, 0.1),
            iso2(4.1, -4.01, 0.14),
        ],
    }
}

/// True positions the UWB ranges are synthesized from.
pub fn nominal_trajectories() -> Vec<NominalTrajectory> {
    let points = |p: &[(f64, f64)]| p.iter().map(|(x, y)| Vector2::new(*x, *y)).collect::<Vec<_>>();
    let g1 = points(&[(0.0, 0.0), (2.0, 0.0), (4.0, 0.0), (6.0, 0.0), (8.0, 0.0)]);
    let g2 = points(&[(0.0, 0.0), (0.0, 2.0), (2.0, 2.0), (2.0, 4.0), (4.0, 4.0)]);
    let g3 = points(&[(0.0, 0.0), (0.0, -2.0), (2.0, -2.0), (2.0, -4.0), (4.0, -4.0)]);
    vec![
        NominalTrajectory::with_offset(G1, &g1, Vector2::zeros()),
        NominalTrajectory::with_offset(G2, &g2, Vector2::new(G2_OFFSET.0, G2_OFFSET.1)),
        NominalTrajectory::with_offset(G3, &g3, Vector2::new(G3_OFFSET.0, G3_OFFSET.1)),
    ]
}

impl ScenarioConfig {
    /// Three independent chains, each held by a loose prior.
    pub fn odom_only() -> ScenarioConfig {
        let prior = Some(PriorNoise::Loose);
        ScenarioConfig {
            name: "odom_only".to_string(),
            title: "Odom only local graph optimization".to_string(),
            legend: vec![
                "This is the result for 3 local odom only solutions".to_string(),
                "G1 --> RED".to_string(),
                "G2 --> Green".to_string(),
                "G3 --> Blue".to_string(),
            ],
            trajectories: vec![trajectory_g1(prior), trajectory_g2(prior), trajectory_g3(prior)],
            ranges: None,
            output_dir: PathBuf::from("plots"),
            image_name: "uwb_example1_graph.png".to_string(),
            style: PlotStyle::default(),
        }
    }

    /// G1 pinned by a tight prior; G2 and G3 are located through ranges alone.
    pub fn odom_plus_range() -> ScenarioConfig {
        ScenarioConfig {
            name: "odom_plus_range".to_string(),
            title: "Final Results for odom + ranging".to_string(),
            legend: vec![
                "This is the result for 3 local with odom + range".to_string(),
                "G1 (0,0)--> RED".to_string(),
                format!("G2 (offset at {G2_OFFSET:?} w.r.t. G1)--> Green"),
                format!("G3 (offset at {G3_OFFSET:?} w.r.t. G1)--> Blue"),
            ],
            trajectories: vec![
                trajectory_g1(Some(PriorNoise::Tight)),
                trajectory_g2(None),
                trajectory_g3(None),
            ],
            ranges: Some(RangeLinkConfig {
                nominal: nominal_trajectories(),
                noise: RangeNoise::Gaussian,
            }),
            output_dir: PathBuf::from("plots"),
            image_name: "uwb_example2_graph.png".to_string(),
            style: PlotStyle::default(),
        }
    }

    pub fn image_path(&self) -> PathBuf {
        self.output_dir.join(&self.image_name)
    }

    pub fn csv_path(&self) -> PathBuf {
        self.image_path().with_extension("csv")
    }
}

pub fn build_problem(
    config: &ScenarioConfig,
    noise: &NoiseModels,
) -> UwbResult<(FactorGraph, Values)> {
    let mut graph = FactorGraph::new();
    let mut initial = Values::new();

    for trajectory in &config.trajectories {
        add_local_graph(&mut graph, &mut initial, trajectory, noise)?;
    }
    if let Some(ranges) = &config.ranges {
        add_range_constraints(&mut graph, &ranges.nominal, noise.range(ranges.noise))?;
    }

    graph.check_initial_estimates(&initial)?;
    Ok((graph, initial))
}

/// Builds, optimizes and plots one scenario, then writes the estimate as CSV.
pub fn run_scenario<O: Optimizer + ?Sized>(
    config: &ScenarioConfig,
    noise: &NoiseModels,
    optimizer: &O,
) -> UwbResult<ScenarioOutcome> {
    fs::create_dir_all(&config.output_dir)?;

    let (graph, initial) = build_problem(config, noise)?;
    info!("{}: {} factors, {} poses", config.name, graph.len(), initial.len());

    let result = optimizer.optimize(&graph, &initial)?;
    let marginals = optimizer.marginals(&graph, &result.values)?;

    for line in &config.legend {
        info!("{line}");
    }

    let image = config.image_path();
    let figure = local_graphs_figure(&result.values, &marginals, &config.style)?;
    render(&figure, &image, &config.title, &config.style)?;
    info!("saved {}", image.display());

    let csv = config.csv_path();
    export_pose_records(&csv, &result.values, &marginals)?;
    info!("saved {}", csv.display());

    Ok(ScenarioOutcome {
        result,
        marginals,
        image,
        csv,
    })
}
