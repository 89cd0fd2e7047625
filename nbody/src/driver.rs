//! The simulation loop.
//!
//! A [`StepDriver`] owns one run: the host state, the device mirrors and the
//! bound kernel. Every step dispatches the kernel over all floats, blocks until
//! the device is done, copies every mirror back, advances simulated time and
//! hands the fresh frame to the visualization adapter.

use std::{
    fmt::Display,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    backend::{ComputeBackend, DeviceBufferSet},
    config::SimulationConfig,
    error::{Result, SimError},
    kernel::{DispatchShape, KernelBinding, KernelSignature, KernelSource},
    state::{ParticleState, VisualizationFrame},
    visualization::{FrameView, VisualizationAdapter},
};

/// External request to stop a run. Checked once per completed step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Simulated time, derived from the number of completed steps so that it
/// never drifts from `ticks * dt`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationClock {
    ticks: u64,
    dt: f64,
}

impl SimulationClock {
    pub fn new(dt: f64) -> Self {
        Self { ticks: 0, dt }
    }

    pub fn advance(&mut self) {
        self.ticks += 1;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn time(&self) -> f64 {
        self.ticks as f64 * self.dt
    }

    pub fn elapsed(&self) -> ElapsedTime {
        ElapsedTime::new(self.time(), self.ticks)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    TimeBudget,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
    Terminated(TerminationReason),
    /// A dispatch or readback failed; the host arrays are not trustworthy.
    Faulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Terminated(TerminationReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub steps: u64,
    pub dispatches: u64,
    pub readbacks: u64,
    pub time: f64,
    pub reason: TerminationReason,
}

pub struct StepDriver<B: ComputeBackend> {
    // Field order is drop order: kernel and mirrors go before the backend.
    kernel: B::Kernel,
    buffers: Option<B::Buffers>,
    backend: B,
    state: ParticleState,
    frame: VisualizationFrame,
    clock: SimulationClock,
    shape: DispatchShape,
    time_budget: f64,
    report_interval: u64,
    status: DriverState,
    dispatches: u64,
    readbacks: u64,
}

impl<B: ComputeBackend> StepDriver<B> {
    /// Load the configured kernel and set up the run. Fails before any
    /// dispatch if the program, the mirrors or the binding cannot be built.
    pub fn new(
        backend: B,
        config: &SimulationConfig,
        state: ParticleState,
        frame: VisualizationFrame,
    ) -> Result<Self> {
        config.validate()?;
        let source = KernelSource::load(&config.kernel_name, config.kernel_dir.as_deref())?;
        Self::with_source(backend, config, &source, state, frame)
    }

    pub fn with_source(
        backend: B,
        config: &SimulationConfig,
        source: &KernelSource,
        state: ParticleState,
        frame: VisualizationFrame,
    ) -> Result<Self> {
        config.validate()?;
        if state.body_count() != config.body_count || frame.body_count() != config.body_count {
            return Err(SimError::InvalidConfig(format!(
                "configured for {} bodies, state holds {} and frame {}",
                config.body_count,
                state.body_count(),
                frame.body_count()
            )));
        }
        log::info!("Device: {}", backend.device_name());

        let program = backend.build_program(source)?;
        let buffers = backend.create_buffers(&state, &frame)?;
        let shape = DispatchShape::for_config(config);

        let kernel = KernelBinding::new(KernelSignature::NBODY)
            .bind(&KernelBinding::nbody_args(config))
            .and_then(|args| backend.bind_kernel(&program, &buffers, &args, shape));
        let kernel = match kernel {
            Ok(kernel) => kernel,
            Err(e) => {
                buffers.release();
                return Err(e);
            }
        };
        log::info!(
            "Kernel `{}` bound: {} work-items in {} groups of {}",
            source.entry_point,
            shape.global,
            shape.workgroups(),
            shape.local
        );

        Ok(Self {
            kernel,
            buffers: Some(buffers),
            backend,
            state,
            frame,
            clock: SimulationClock::new(config.dt),
            shape,
            time_budget: config.time_budget,
            report_interval: config.report_interval.max(1),
            status: DriverState::Idle,
            dispatches: 0,
            readbacks: 0,
        })
    }

    pub fn status(&self) -> DriverState {
        self.status
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    pub fn readbacks(&self) -> u64 {
        self.readbacks
    }

    pub fn state(&self) -> &ParticleState {
        &self.state
    }

    pub fn frame(&self) -> &VisualizationFrame {
        &self.frame
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one step. Once terminated, further calls do nothing and report the
    /// same reason; once faulted, they fail.
    pub fn step<A: VisualizationAdapter + ?Sized>(
        &mut self,
        adapter: &mut A,
        cancel: &CancelToken,
    ) -> Result<StepOutcome> {
        match self.status {
            DriverState::Terminated(reason) => return Ok(StepOutcome::Terminated(reason)),
            DriverState::Faulted => {
                return Err(SimError::DeviceExecution(
                    "run already aborted by an earlier device error".to_owned(),
                ));
            }
            DriverState::Idle => {
                log::info!("Simulation running");
                self.status = DriverState::Running;
            }
            DriverState::Running => (),
        }

        let Some(buffers) = self.buffers.as_ref() else {
            self.status = DriverState::Faulted;
            return Err(SimError::DeviceExecution(
                "device mirrors already released".to_owned(),
            ));
        };

        self.dispatches += 1;
        if let Err(e) = self.backend.dispatch(&self.kernel, self.shape) {
            self.status = DriverState::Faulted;
            return Err(e);
        }

        self.readbacks += 1;
        if let Err(e) = self
            .backend
            .read_back(buffers, &mut self.state, &mut self.frame)
        {
            self.status = DriverState::Faulted;
            return Err(e);
        }

        self.clock.advance();
        adapter.present(FrameView {
            positions: &self.frame.positions,
            colors: &self.frame.colors,
            step: self.clock.ticks(),
            time: self.clock.time(),
        });

        log::debug!("Step {} done, t = {}", self.clock.ticks(), self.clock.time());
        if self.clock.ticks() % self.report_interval == 0 {
            log::info!("Simulated {}", self.clock.elapsed());
        }

        let reason = if cancel.is_cancelled() {
            Some(TerminationReason::Cancelled)
        } else if self.clock.time() >= self.time_budget {
            Some(TerminationReason::TimeBudget)
        } else {
            None
        };

        Ok(match reason {
            Some(reason) => {
                log::info!("Simulation stopped ({reason}) after {}", self.clock.elapsed());
                self.status = DriverState::Terminated(reason);
                StepOutcome::Terminated(reason)
            }
            None => StepOutcome::Continue,
        })
    }

    /// Step until the time budget is spent or `cancel` fires.
    pub fn run<A: VisualizationAdapter + ?Sized>(
        &mut self,
        adapter: &mut A,
        cancel: &CancelToken,
    ) -> Result<RunSummary> {
        loop {
            if let StepOutcome::Terminated(reason) = self.step(adapter, cancel)? {
                return Ok(RunSummary {
                    steps: self.clock.ticks(),
                    dispatches: self.dispatches,
                    readbacks: self.readbacks,
                    time: self.clock.time(),
                    reason,
                });
            }
        }
    }

    /// Release the device mirrors and hand back the host arrays.
    pub fn teardown(mut self) -> (ParticleState, VisualizationFrame) {
        if let Some(buffers) = self.buffers.take() {
            log::debug!("Releasing {} bytes of device mirrors", buffers.size_bytes());
            buffers.release();
        }
        (
            std::mem::take(&mut self.state),
            std::mem::take(&mut self.frame),
        )
    }
}

impl<B: ComputeBackend> Drop for StepDriver<B> {
    fn drop(&mut self) {
        if let Some(buffers) = self.buffers.take() {
            buffers.release();
        }
    }
}

impl Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::TimeBudget => f.write_str("time budget reached"),
            TerminationReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

const SEC_PER_HOUR: f64 = 60.0 * 60.0;
const SEC_PER_DAY: f64 = SEC_PER_HOUR * 24.0;
const SEC_PER_YEAR: f64 = 365.25 * SEC_PER_DAY;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ElapsedTime {
    pub years: u64,
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: f64,
    pub ticks: u64,
}

impl ElapsedTime {
    pub fn new(time_s: f64, ticks: u64) -> Self {
        let mut time_s = time_s;

        let years = (time_s / SEC_PER_YEAR).floor();
        time_s -= years * SEC_PER_YEAR;
        let days = (time_s / SEC_PER_DAY).floor();
        time_s -= days * SEC_PER_DAY;
        let hours = (time_s / SEC_PER_HOUR).floor();
        time_s -= hours * SEC_PER_HOUR;
        let minutes = (time_s / 60.0).floor();
        let seconds = time_s - minutes * 60.0;

        Self {
            years: years as u64,
            days: days as u64,
            hours: hours as u64,
            minutes: minutes as u64,
            seconds,
            ticks,
        }
    }
}

impl Display for ElapsedTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Y {}D {:0>2}:{:0>2}:{:0>2} ({} ticks)",
            self.years, self.days, self.hours, self.minutes, self.seconds, self.ticks
        )
    }
}
