//! Compute devices the step driver can run on.
//!
//! A backend goes through setup exactly once, in order: build the program,
//! allocate the device mirrors from the host arrays, bind the kernel. After
//! that it only dispatches and reads back until the run ends.

use crate::{
    error::Result,
    kernel::{BoundArgs, DispatchShape, KernelSource},
    state::{BufferRole, ParticleState, VisualizationFrame},
};

pub mod gpu;
pub mod host;

pub use gpu::GpuBackend;
pub use host::HostBackend;

/// Device-resident mirrors of the host arrays.
pub trait DeviceBufferSet {
    /// Length in floats of the mirror for `role`.
    fn float_len(&self, role: BufferRole) -> usize;

    /// Bytes of device memory held by all mirrors.
    fn size_bytes(&self) -> u64 {
        BufferRole::ALL
            .iter()
            .map(|role| (self.float_len(*role) * std::mem::size_of::<f32>()) as u64)
            .sum()
    }

    /// Free the device memory. Called before the owning backend is dropped.
    fn release(self);
}

pub trait ComputeBackend {
    type Program;
    type Buffers: DeviceBufferSet;
    type Kernel;

    /// Human readable name of the selected device.
    fn device_name(&self) -> String;

    /// Compile `source` and check it exposes its entry point.
    fn build_program(&self, source: &KernelSource) -> Result<Self::Program>;

    /// Allocate every mirror and copy the host arrays into it.
    fn create_buffers(
        &self,
        state: &ParticleState,
        frame: &VisualizationFrame,
    ) -> Result<Self::Buffers>;

    /// Attach the bound arguments to the program. Arguments stay fixed for the
    /// rest of the run.
    fn bind_kernel(
        &self,
        program: &Self::Program,
        buffers: &Self::Buffers,
        args: &BoundArgs,
        shape: DispatchShape,
    ) -> Result<Self::Kernel>;

    /// Run the kernel once and block until the device has finished.
    fn dispatch(&self, kernel: &Self::Kernel, shape: DispatchShape) -> Result<()>;

    /// Copy every mirror back into the host arrays, blocking until done.
    fn read_back(
        &self,
        buffers: &Self::Buffers,
        state: &mut ParticleState,
        frame: &mut VisualizationFrame,
    ) -> Result<()>;
}
