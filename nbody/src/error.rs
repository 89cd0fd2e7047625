use thiserror::Error;

pub type Result<T, E = SimError> = std::result::Result<T, E>;

/// Every error is fatal for the run it occurs in.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("platform discovery failed: {0}")]
    PlatformDiscovery(String),
    #[error("kernel `{kernel}` failed to build:\n{diagnostics}")]
    KernelBuild { kernel: String, diagnostics: String },
    #[error("kernel binding rejected: {0}")]
    KernelBinding(String),
    #[error("device allocation failed: {0}")]
    DeviceAllocation(String),
    #[error("device execution failed: {0}")]
    DeviceExecution(String),
}

impl SimError {
    pub fn kernel_build(kernel: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self::KernelBuild {
            kernel: kernel.into(),
            diagnostics: diagnostics.into(),
        }
    }
}
