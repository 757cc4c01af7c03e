use thiserror::Error;

/// Reasons the GPU runner could not produce (more) work on the device.
///
/// None of these escape the crate: the runner logs them and degrades the run's score.
#[derive(Debug, Error)]
pub(crate) enum GpuError {
    #[error("no compute-capable GPU adapter is available")]
    NoAdapter(#[from] wgpu::RequestAdapterError),

    #[error("the GPU adapter refused to create a device")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// Shader or pipeline validation failed. The message is the validation error text.
    #[error("the GPU compute kernel failed to compile: {0}")]
    KernelCompilation(String),

    #[error("polling the GPU device failed")]
    Poll(#[from] wgpu::PollError),
}
