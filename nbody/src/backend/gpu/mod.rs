//! wgpu device: one instance stands in for the platform, GPU-class adapters on
//! it are the selectable devices, and each device gets a single queue.

use crate::{
    backend::ComputeBackend,
    config::SimulationConfig,
    error::Result,
    kernel::{BoundArgs, DispatchShape, KernelSource},
    state::{ParticleState, VisualizationFrame},
};

mod buffers;
mod device;
mod pipeline;

pub use buffers::GpuBufferSet;
pub use device::gpu_adapters;
pub use pipeline::{GpuKernel, GpuProgram};

pub struct GpuBackend {
    info: wgpu::AdapterInfo,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl GpuBackend {
    /// Open the GPU-class adapter selected by `config.device_index`.
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        let device::DeviceState {
            info,
            device,
            queue,
        } = device::open_device(config.device_index)?;
        Ok(Self {
            info,
            device,
            queue,
        })
    }
}

impl ComputeBackend for GpuBackend {
    type Program = GpuProgram;
    type Buffers = GpuBufferSet;
    type Kernel = GpuKernel;

    fn device_name(&self) -> String {
        format!("{} ({:?})", self.info.name, self.info.backend)
    }

    fn build_program(&self, source: &KernelSource) -> Result<GpuProgram> {
        pipeline::build_program(&self.device, source)
    }

    fn create_buffers(
        &self,
        state: &ParticleState,
        frame: &VisualizationFrame,
    ) -> Result<GpuBufferSet> {
        GpuBufferSet::new(&self.device, state, frame)
    }

    fn bind_kernel(
        &self,
        program: &GpuProgram,
        buffers: &GpuBufferSet,
        args: &BoundArgs,
        shape: DispatchShape,
    ) -> Result<GpuKernel> {
        pipeline::bind_kernel(&self.device, program, buffers, args, shape)
    }

    fn dispatch(&self, kernel: &GpuKernel, shape: DispatchShape) -> Result<()> {
        pipeline::dispatch(&self.device, &self.queue, kernel, shape)
    }

    fn read_back(
        &self,
        buffers: &GpuBufferSet,
        state: &mut ParticleState,
        frame: &mut VisualizationFrame,
    ) -> Result<()> {
        buffers.read_back(&self.device, &self.queue, state, frame)
    }
}
