use criterion::{criterion_group, criterion_main, Criterion};

extern crate uwb_pose_graph;
use uwb_pose_graph::mapping::{
    build_problem, LevenbergMarquardt, NoiseConfig, NoiseModels, Optimizer, ScenarioConfig,
};

fn odom_plus_range(b: &mut Criterion) {
    let noise = NoiseModels::new(&NoiseConfig::default()).expect("noise models");
    let config = ScenarioConfig::odom_plus_range();
    let optimizer = LevenbergMarquardt::default();
    b.bench_function("odom_plus_range", |b| {
        b.iter(|| {
            let (graph, initial) = build_problem(&config, &noise)?;
            optimizer.optimize(&graph, &initial)
        })
    });
}

fn odom_plus_range_marginals(b: &mut Criterion) {
    let noise = NoiseModels::new(&NoiseConfig::default()).expect("noise models");
    let (graph, initial) =
        build_problem(&ScenarioConfig::odom_plus_range(), &noise).expect("scenario");
    let optimizer = LevenbergMarquardt::default();
    let result = optimizer.optimize(&graph, &initial).expect("optimization");
    b.bench_function("odom_plus_range_marginals", |b| {
        b.iter(|| optimizer.marginals(&graph, &result.values))
    });
}

criterion_group!(benches, odom_plus_range, odom_plus_range_marginals);
criterion_main!(benches);
