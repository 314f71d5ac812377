use std::error::Error;

use uwb_pose_graph::logger::init_logger;
use uwb_pose_graph::mapping::{
    run_scenario, LevenbergMarquardt, NoiseConfig, NoiseModels, ScenarioConfig,
};

fn main() -> Result<(), Box<dyn Error>> {
    init_logger();

    let noise = NoiseModels::new(&NoiseConfig::default())?;
    let outcome = run_scenario(
        &ScenarioConfig::odom_only(),
        &noise,
        &LevenbergMarquardt::default(),
    )?;
    println!(
        "{} iterations, error {:.5} -> {:.5}",
        outcome.result.iterations,
        outcome.result.initial_error(),
        outcome.result.final_error()
    );
    Ok(())
}
