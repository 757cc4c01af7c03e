use std::fmt::{self, Debug};
#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use crate::gpu::{MockComputeApi, MockComputeDevice};
use crate::gpu::{ComputeApi, ComputeDevice, GpuError, WGPU_API, WgpuApi, WgpuDevice};

#[derive(Clone)]
pub(crate) enum ComputeApiFacade {
    Real(&'static WgpuApi),

    #[cfg(test)]
    Mock(Arc<MockComputeApi>),
}

impl ComputeApiFacade {
    pub(crate) fn real() -> Self {
        Self::Real(&WGPU_API)
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockComputeApi) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl ComputeApi for ComputeApiFacade {
    type Device = ComputeDeviceFacade;

    fn acquire_device(&self) -> Result<ComputeDeviceFacade, GpuError> {
        match self {
            Self::Real(api) => api.acquire_device().map(Into::into),
            #[cfg(test)]
            Self::Mock(api) => api.acquire_device().map(Into::into),
        }
    }
}

impl Debug for ComputeApiFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real(api) => api.fmt(f),
            #[cfg(test)]
            Self::Mock(api) => api.fmt(f),
        }
    }
}

pub(crate) enum ComputeDeviceFacade {
    Real(Box<WgpuDevice>),

    #[cfg(test)]
    Mock(MockComputeDevice),
}

impl From<WgpuDevice> for ComputeDeviceFacade {
    fn from(device: WgpuDevice) -> Self {
        Self::Real(Box::new(device))
    }
}

#[cfg(test)]
impl From<MockComputeDevice> for ComputeDeviceFacade {
    fn from(device: MockComputeDevice) -> Self {
        Self::Mock(device)
    }
}

impl ComputeDevice for ComputeDeviceFacade {
    fn ops_per_batch(&self) -> u64 {
        match self {
            Self::Real(device) => device.ops_per_batch(),
            #[cfg(test)]
            Self::Mock(device) => device.ops_per_batch(),
        }
    }

    fn submit_batch(&mut self) {
        match self {
            Self::Real(device) => device.submit_batch(),
            #[cfg(test)]
            Self::Mock(device) => device.submit_batch(),
        }
    }

    fn poll_batch(&mut self) -> Result<bool, GpuError> {
        match self {
            Self::Real(device) => device.poll_batch(),
            #[cfg(test)]
            Self::Mock(device) => device.poll_batch(),
        }
    }
}

impl Debug for ComputeDeviceFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real(device) => device.fmt(f),
            #[cfg(test)]
            Self::Mock(device) => device.fmt(f),
        }
    }
}
