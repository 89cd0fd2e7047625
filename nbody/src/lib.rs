pub mod backend;
pub mod batch_request;
pub mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod kernel;
pub mod scene;
pub mod state;
pub mod visualization;

pub use backend::{ComputeBackend, DeviceBufferSet, GpuBackend, HostBackend};
pub use batch_request::BatchRequest;
pub use config::SimulationConfig;
pub use driver::{
    CancelToken, DriverState, RunSummary, SimulationClock, StepDriver, StepOutcome,
    TerminationReason,
};
pub use error::{Result, SimError};
pub use kernel::{DispatchShape, KernelArg, KernelBinding, KernelSignature, KernelSource};
pub use scene::{MassBand, SceneInitializer};
pub use state::{BufferRole, ParticleState, VisualizationFrame};
pub use visualization::{FrameView, LogAdapter, NullAdapter, VisualizationAdapter};
