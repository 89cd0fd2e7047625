use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use nbody::{
    BatchRequest, CancelToken, ComputeBackend, GpuBackend, HostBackend, LogAdapter,
    SceneInitializer, SimulationConfig, StepDriver, backend::gpu::gpu_adapters, constants::*,
    visualization::FrameView,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    /// First platform found by wgpu
    Gpu,
    /// CPU reference device
    Host,
}

#[derive(Parser, Debug)]
#[command(name = "nbody")]
#[command(about = "Gravitational n-body simulation stepped on a compute device")]
struct Args {
    /// Number of bodies
    #[arg(long, default_value_t = BODY_COUNT)]
    bodies: usize,

    /// Simulated seconds per step
    #[arg(long, default_value_t = DELTA)]
    dt: f64,

    /// Simulated seconds to run for
    #[arg(long, default_value_t = TIME_BUDGET)]
    time: f64,

    /// Gravitational constant
    #[arg(long, default_value_t = G)]
    g: f32,

    /// Half-width of the initial cube, in meters
    #[arg(long, default_value_t = METRES_CONSTRAINT)]
    metres: f32,

    /// Exclusive upper bound on body mass, in kilograms
    #[arg(long, default_value_t = MASS_CONSTRAINT)]
    mass: u32,

    /// Index of the GPU-class adapter to run on
    #[arg(long, default_value_t = DEVICE_INDEX)]
    device: usize,

    #[arg(long, value_enum, default_value_t = Backend::Gpu)]
    backend: Backend,

    /// Seed for the initial scene
    #[arg(long)]
    seed: Option<u64>,

    /// Kernel to load
    #[arg(long, default_value_t = shaders::NBODY_KERNEL.to_owned())]
    kernel: String,

    /// Directory searched for `<kernel>.wgsl` before the bundled kernels
    #[arg(long)]
    kernel_dir: Option<PathBuf>,

    /// Log progress every this many steps
    #[arg(long, default_value_t = REPORT_INTERVAL)]
    report_interval: u64,

    /// Cancel the run after this many wall-clock seconds
    #[arg(long)]
    max_wall_seconds: Option<f64>,

    /// Print the GPU-class adapters and exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn config(&self) -> SimulationConfig {
        SimulationConfig {
            body_count: self.bodies,
            g: self.g,
            dt: self.dt,
            time_budget: self.time,
            metres_constraint: self.metres,
            mass_constraint: self.mass,
            device_index: self.device,
            seed: self.seed,
            kernel_name: self.kernel.clone(),
            kernel_dir: self.kernel_dir.clone(),
            report_interval: self.report_interval,
            ..Default::default()
        }
    }
}

/// Stands in for a render thread: pulls frames off the exchange and enforces
/// the wall-clock limit.
fn run_viewer(exchange: Arc<BatchRequest>, done: Arc<AtomicBool>, max_wall: Option<Duration>) {
    let start = Instant::now();
    let mut sample = Vec::new();
    let mut last_tick = 0;

    while !done.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(250));

        let tick = exchange.sample(&mut sample);
        if tick != last_tick {
            let frame = FrameView {
                positions: &sample,
                colors: exchange.colors(),
                step: tick,
                time: exchange.current_time(),
            };
            let [x, y, z] = frame.centroid();
            log::debug!("Viewer at step {tick}: centroid ({x:.4}, {y:.4}, {z:.4})");
            last_tick = tick;
        }

        if max_wall.is_some_and(|limit| start.elapsed() >= limit) {
            log::warn!("Wall-clock limit reached, stopping");
            exchange.request_stop();
            break;
        }
    }
}

fn simulate<B: ComputeBackend>(
    backend: B,
    config: &SimulationConfig,
    max_wall: Option<Duration>,
) -> anyhow::Result<()> {
    let scene = SceneInitializer::new(config);
    let (state, frame) = scene.generate(config.body_count);
    let cancel = CancelToken::new();
    let exchange = Arc::new(BatchRequest::new(&frame.colors, cancel.clone()));
    let mut driver = StepDriver::new(backend, config, state, frame)?;

    let done = Arc::new(AtomicBool::new(false));
    let viewer = {
        let exchange = exchange.clone();
        let done = done.clone();
        std::thread::spawn(move || run_viewer(exchange, done, max_wall))
    };

    let begin = Instant::now();
    let result = driver.run(&mut (LogAdapter, &*exchange), &cancel);
    let wall = begin.elapsed();

    done.store(true, Ordering::Relaxed);
    if viewer.join().is_err() {
        log::error!("Viewer thread panicked");
    }

    let summary = result?;
    log::info!(
        "Seed {}: {} steps ({} dispatches, {} readbacks), t = {}, {}",
        scene.seed(),
        summary.steps,
        summary.dispatches,
        summary.readbacks,
        summary.time,
        summary.reason
    );
    println!("{} ms", wall.as_millis());

    driver.teardown();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list_devices {
        for (idx, adapter) in gpu_adapters().iter().enumerate() {
            let info = adapter.get_info();
            println!("[{idx}] {} ({:?}, {:?})", info.name, info.device_type, info.backend);
        }
        return Ok(());
    }

    let config = args.config();
    config.validate()?;
    let max_wall = args
        .max_wall_seconds
        .map(Duration::try_from_secs_f64)
        .transpose()?;

    match args.backend {
        Backend::Gpu => simulate(GpuBackend::new(&config)?, &config, max_wall),
        Backend::Host => simulate(HostBackend::new(), &config, max_wall),
    }
}
