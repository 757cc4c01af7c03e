#![cfg_attr(coverage_nightly, coverage(off))]

use mockall::mock;

use crate::gpu::{ComputeApi, GpuError, MockComputeDevice};

mock! {
    #[derive(Debug)]
    pub ComputeApi {
    }

    impl ComputeApi for ComputeApi {
        type Device = MockComputeDevice;

        fn acquire_device(&self) -> Result<MockComputeDevice, GpuError>;
    }
}
