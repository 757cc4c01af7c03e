use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::executor::block_on;
use tracing::debug;

use crate::gpu::{
    ComputeApi, ComputeDevice, DISPATCHES_PER_BATCH, GpuError, OPS_PER_BATCH, OUTPUT_BUFFER_SIZE,
    WORKGROUPS_PER_DISPATCH, kernel_source,
};

pub(crate) static WGPU_API: WgpuApi = WgpuApi;

/// The real compute platform, backed by whatever native API `wgpu` finds (Vulkan, Metal, DX12).
#[derive(Debug)]
pub(crate) struct WgpuApi;

impl ComputeApi for WgpuApi {
    type Device = WgpuDevice;

    fn acquire_device(&self) -> Result<WgpuDevice, GpuError> {
        block_on(WgpuDevice::acquire())
    }
}

/// A `wgpu` device with the workload kernel compiled and its output buffer bound.
pub(crate) struct WgpuDevice {
    adapter_name: String,
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,

    // Only referenced by the bind group, but owned here so it lives exactly as long as the device.
    _output: wgpu::Buffer,

    /// Set by the queue once all work submitted before the fence was armed has completed.
    batch_done: Arc<AtomicBool>,
}

impl WgpuDevice {
    /// Every early return drops whatever was created so far, releasing it on the device.
    async fn acquire() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await?;

        let info = adapter.get_info();
        debug!(adapter = %info.name, backend = ?info.backend, "acquired GPU adapter");

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("reflex-bench"),
                ..Default::default()
            })
            .await?;

        // Without an error scope, validation errors go to the uncaptured error handler, which
        // panics. Compilation failure must degrade the run instead.
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("reflex-bench-kernel"),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(kernel_source())),
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("reflex-bench-pipeline"),
            layout: None,
            module: &module,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let output = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("reflex-bench-output"),
            size: OUTPUT_BUFFER_SIZE,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("reflex-bench-bindings"),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: output.as_entire_binding(),
            }],
        });

        if let Some(error) = device.pop_error_scope().await {
            return Err(GpuError::KernelCompilation(error.to_string()));
        }

        Ok(Self {
            adapter_name: info.name,
            device,
            queue,
            pipeline,
            bind_group,
            _output: output,
            batch_done: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl ComputeDevice for WgpuDevice {
    fn ops_per_batch(&self) -> u64 {
        OPS_PER_BATCH
    }

    fn submit_batch(&mut self) {
        self.batch_done.store(false, Ordering::Release);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("reflex-bench-batch"),
            });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("reflex-bench-pass"),
                timestamp_writes: None,
            });

            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);

            for _ in 0..DISPATCHES_PER_BATCH {
                pass.dispatch_workgroups(WORKGROUPS_PER_DISPATCH, 1, 1);
            }
        }

        self.queue.submit(Some(encoder.finish()));

        let batch_done = Arc::clone(&self.batch_done);
        self.queue.on_submitted_work_done(move || {
            // Release pairs with the Acquire in poll_batch().
            batch_done.store(true, Ordering::Release);
        });
    }

    fn poll_batch(&mut self) -> Result<bool, GpuError> {
        self.device.poll(wgpu::PollType::Poll)?;

        Ok(self.batch_done.load(Ordering::Acquire))
    }
}

impl Debug for WgpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("adapter_name", &self.adapter_name)
            .field("batch_done", &self.batch_done)
            .finish_non_exhaustive()
    }
}
