use nbody::{MassBand, SceneInitializer, SimulationConfig, scene};

fn config(body_count: usize, seed: u64) -> SimulationConfig {
    SimulationConfig {
        body_count,
        metres_constraint: 10.0,
        mass_constraint: 10,
        seed: Some(seed),
        ..Default::default()
    }
}

#[test]
fn bodies_start_inside_the_cube_at_rest() {
    let config = config(3000, 1);
    let (state, frame) = scene::initialize(&config);

    assert_eq!(state.points.len(), 9000);
    assert_eq!(state.masses.len(), 3000);
    for p in &state.points {
        assert!(*p > -10.0 && *p < 10.0, "position {p} outside the cube");
    }
    for p in &frame.positions {
        assert!(*p > -1.0 && *p < 1.0, "normalized position {p} outside [-1, 1]");
    }
    assert!(state.speed.iter().all(|v| *v == 0.0));
    assert!(state.accel.iter().all(|a| *a == 0.0));
}

#[test]
fn normalized_positions_match_points() {
    let config = config(100, 2);
    let (state, frame) = scene::initialize(&config);
    for (p, n) in state.points.iter().zip(&frame.positions) {
        assert_eq!(*n, *p / 10.0);
    }
}

#[test]
fn masses_are_integers_below_the_ceiling() {
    let config = config(2000, 3);
    let (state, _) = scene::initialize(&config);
    for m in &state.masses {
        assert!(*m >= 0.0 && *m < 10.0);
        assert_eq!(m.fract(), 0.0);
    }
    // With 2000 draws every value shows up.
    for value in 0..10 {
        assert!(state.masses.contains(&(value as f32)), "mass {value} never drawn");
    }
}

#[test]
fn every_body_gets_exactly_one_band_color() {
    let config = config(500, 4);
    let (state, frame) = scene::initialize(&config);

    for (mass, color) in state.masses.iter().zip(frame.colors.chunks_exact(3)) {
        let expected = MassBand::classify(*mass, 10).color();
        assert_eq!(color, expected);
        assert_eq!(color.iter().filter(|c| **c == 1.0).count(), 1);
        assert_eq!(color.iter().sum::<f32>(), 1.0);
    }
}

#[test]
fn seeded_scenes_are_reproducible() {
    // Spans several generation chunks.
    let config = config(5000, 99);
    let a = scene::initialize(&config);
    let b = SceneInitializer::new(&config).generate(5000);
    assert_eq!(a, b);

    let other = scene::initialize(&SimulationConfig {
        seed: Some(100),
        ..config
    });
    assert_ne!(a.0.points, other.0.points);
}

#[test]
fn populate_resets_motion() {
    let config = config(10, 5);
    let init = SceneInitializer::new(&config);
    let (mut state, mut frame) = init.generate(10);
    state.speed.fill(3.0);
    state.accel.fill(-1.0);

    init.populate(&mut state, &mut frame);
    assert_eq!((state, frame), init.generate(10));
}

#[test]
fn seeded_scene_ignores_thread_count() {
    // Spans several generation chunks so they land on different threads.
    let config = config(5000, 11);
    let in_pool = |threads| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap()
            .install(|| scene::initialize(&config))
    };

    let single = in_pool(1);
    assert_eq!(single, in_pool(7));
    assert_eq!(single, scene::initialize(&config));
}
