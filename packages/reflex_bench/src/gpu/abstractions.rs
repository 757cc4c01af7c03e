use std::fmt::Debug;

use crate::gpu::GpuError;

/// Entry point to a compute platform. Acquiring a device compiles the workload kernel and creates
/// every resource a run needs, so a device that was acquired successfully is ready to dispatch.
pub(crate) trait ComputeApi: Debug + Send + Sync + 'static {
    type Device: ComputeDevice;

    fn acquire_device(&self) -> Result<Self::Device, GpuError>;
}

/// An acquired compute device with the workload kernel loaded.
///
/// Dropping the device releases every resource it owns.
#[cfg_attr(test, mockall::automock)]
pub(crate) trait ComputeDevice: Debug + Send {
    /// Kernel iterations one batch performs on the device.
    fn ops_per_batch(&self) -> u64;

    /// Queues one batch of dispatches followed by a completion fence. Does not wait.
    fn submit_batch(&mut self);

    /// Drives device progress without blocking and reports whether the fence of the most recently
    /// submitted batch has signaled.
    fn poll_batch(&mut self) -> Result<bool, GpuError>;
}
