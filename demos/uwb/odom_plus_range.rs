use std::error::Error;

use uwb_pose_graph::logger::init_logger;
use uwb_pose_graph::mapping::scenario::{G1, G2, G3};
use uwb_pose_graph::mapping::{
    run_scenario, LevenbergMarquardt, NoiseConfig, NoiseModels, PoseKey, ScenarioConfig,
};

fn main() -> Result<(), Box<dyn Error>> {
    init_logger();

    let noise = NoiseModels::new(&NoiseConfig::default())?;
    let outcome = run_scenario(
        &ScenarioConfig::odom_plus_range(),
        &noise,
        &LevenbergMarquardt::default(),
    )?;

    let values = &outcome.result.values;
    let origin = values.at(PoseKey::new(G1, 1))?.translation.vector;
    for id in [G2, G3] {
        let anchor = values.at(PoseKey::new(id, 1))?.translation.vector - origin;
        println!("{id} anchor w.r.t. G1: ({:.3}, {:.3})", anchor.x, anchor.y);
    }
    Ok(())
}
