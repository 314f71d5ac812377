use std::error::Error;

use uwb_pose_graph::logger::init_logger;
use uwb_pose_graph::mapping::{
    run_scenario, LevenbergMarquardt, NoiseConfig, NoiseModels, ScenarioConfig,
};

fn main() -> Result<(), Box<dyn Error>> {
    init_logger();

    let noise = NoiseModels::new(&NoiseConfig::default())?;
    let optimizer = LevenbergMarquardt::default();
    for config in [ScenarioConfig::odom_only(), ScenarioConfig::odom_plus_range()] {
        run_scenario(&config, &noise, &optimizer)?;
    }
    Ok(())
}
