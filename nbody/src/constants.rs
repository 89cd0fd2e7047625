// PHYSICAL
/// SI gravitational constant, in m^3 kg^-1 s^-2
pub const G: f32 = 6.67e-11;
/// Half-width of the cube bodies are scattered in at start, in meters.
pub const METRES_CONSTRAINT: f32 = 1000.0;
/// Exclusive upper bound on the integer mass of a body, in kilograms.
pub const MASS_CONSTRAINT: u32 = 10;
/// Largest mass ceiling whose integer masses are all exact in `f32`.
pub const MAX_MASS_CONSTRAINT: u32 = 1 << 24;

// SIMULATION
/// Number of bodies. Each body occupies three floats per state array.
pub const BODY_COUNT: usize = 12800;
/// Simulated seconds per step.
pub const DELTA: f64 = 100.0;
/// Simulated time budget, in seconds.
pub const TIME_BUDGET: f64 = 6400.0;
/// Index into the GPU-class adapters found on the platform.
pub const DEVICE_INDEX: usize = 0;
/// Work-items per work-group.
pub const WORKGROUP_SIZE: u32 = shaders::NBODY_WORKGROUP_SIZE;
/// Log a progress line every this many steps.
pub const REPORT_INTERVAL: u64 = 16;

/// Bodies initialized per RNG stream. Fixed so that a seeded run produces the
/// same scene regardless of how many threads rayon uses.
pub const BODIES_PER_CHUNK: usize = 1024;
