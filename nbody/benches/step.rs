use criterion::{Criterion, criterion_group, criterion_main};
use nbody::{CancelToken, HostBackend, NullAdapter, SimulationConfig, StepDriver, scene};

fn config(body_count: usize) -> SimulationConfig {
    SimulationConfig {
        body_count,
        seed: Some(7),
        // Never terminates on its own.
        time_budget: f64::MAX,
        ..Default::default()
    }
}

fn bench_host_step(c: &mut Criterion) {
    let config = config(1024);
    let (state, frame) = scene::initialize(&config);
    let mut driver =
        StepDriver::new(HostBackend::new(), &config, state, frame).expect("driver setup");
    let cancel = CancelToken::new();

    c.bench_function("host_step_1k", |b| {
        b.iter(|| driver.step(&mut NullAdapter, &cancel).unwrap())
    });
}

fn bench_scene_generation(c: &mut Criterion) {
    let config = config(12800);

    c.bench_function("scene_12800", |b| b.iter(|| scene::initialize(&config)));
}

criterion_group!(benches, bench_host_step, bench_scene_generation);
criterion_main!(benches);
