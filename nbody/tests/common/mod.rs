#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use nbody::{
    CancelToken, ComputeBackend, HostBackend, ParticleState, Result, SimError, SimulationConfig,
    VisualizationAdapter, VisualizationFrame,
    backend::host::{HostBufferSet, HostKernel, HostProgram},
    kernel::{BoundArgs, DispatchShape, KernelSource},
    visualization::FrameView,
};

/// The four-body scene used by most driver tests: three steps of one second.
pub fn small_config() -> SimulationConfig {
    SimulationConfig {
        body_count: 4,
        metres_constraint: 10.0,
        mass_constraint: 10,
        dt: 1.0,
        time_budget: 3.0,
        seed: Some(42),
        ..Default::default()
    }
}

/// Host device that counts dispatches and readbacks, and can be told to fail
/// a given dispatch.
#[derive(Clone, Default)]
pub struct Recording {
    pub inner: HostBackend,
    pub dispatches: Arc<AtomicU64>,
    pub readbacks: Arc<AtomicU64>,
    pub fail_dispatch: Option<u64>,
}

impl Recording {
    pub fn new(inner: HostBackend) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::SeqCst)
    }

    pub fn readbacks(&self) -> u64 {
        self.readbacks.load(Ordering::SeqCst)
    }
}

impl ComputeBackend for Recording {
    type Program = HostProgram;
    type Buffers = HostBufferSet;
    type Kernel = HostKernel;

    fn device_name(&self) -> String {
        format!("recording {}", self.inner.device_name())
    }

    fn build_program(&self, source: &KernelSource) -> Result<HostProgram> {
        self.inner.build_program(source)
    }

    fn create_buffers(
        &self,
        state: &ParticleState,
        frame: &VisualizationFrame,
    ) -> Result<HostBufferSet> {
        self.inner.create_buffers(state, frame)
    }

    fn bind_kernel(
        &self,
        program: &HostProgram,
        buffers: &HostBufferSet,
        args: &BoundArgs,
        shape: DispatchShape,
    ) -> Result<HostKernel> {
        self.inner.bind_kernel(program, buffers, args, shape)
    }

    fn dispatch(&self, kernel: &HostKernel, shape: DispatchShape) -> Result<()> {
        let n = self.dispatches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_dispatch == Some(n) {
            return Err(SimError::DeviceExecution(format!("dispatch {n} lost")));
        }
        self.inner.dispatch(kernel, shape)
    }

    fn read_back(
        &self,
        buffers: &HostBufferSet,
        state: &mut ParticleState,
        frame: &mut VisualizationFrame,
    ) -> Result<()> {
        self.readbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.read_back(buffers, state, frame)
    }
}

/// Keeps the step and time of every presented frame, and optionally cancels
/// the run once a given step has been presented.
#[derive(Default)]
pub struct Recorder {
    pub frames: Vec<(u64, f64)>,
    pub positions: Vec<Vec<f32>>,
    pub cancel_at: Option<(u64, CancelToken)>,
}

impl VisualizationAdapter for Recorder {
    fn present(&mut self, frame: FrameView<'_>) {
        self.frames.push((frame.step, frame.time));
        self.positions.push(frame.positions.to_vec());
        if let Some((step, token)) = &self.cancel_at {
            if frame.step == *step {
                token.cancel();
            }
        }
    }
}
