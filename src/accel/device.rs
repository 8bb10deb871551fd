//! Device ownership, pipeline compilation and deadline-bounded waiting.
//!
//! Stage completion is observed through queue work-done and buffer-map
//! callbacks delivered over a channel. A dedicated poller thread drives
//! `device.poll(Maintain::Wait)` so the host can block on the channel with a
//! timeout instead of spinning.

use crate::backend::{Stage, StageError};
use crate::error::{GpuError, SomError};
use log::{debug, error, warn};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Storage or uniform binding slot in a bind group layout.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Slot {
    /// Read-only storage buffer.
    Read,
    /// Read-write storage buffer.
    ReadWrite,
    /// Uniform buffer.
    Uniform,
}

/// Owns the wgpu device and queue for one training run.
///
/// Dropping the context releases every resource created through it. The
/// poller thread keeps its own `Arc<Device>` only until outstanding work
/// completes.
pub struct DeviceContext {
    device: Arc<wgpu::Device>,
    queue: wgpu::Queue,
    info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
    poller: Poller,
}

impl DeviceContext {
    /// Check if a compute adapter is available.
    pub fn is_available() -> bool {
        pollster::block_on(Self::is_available_async())
    }

    async fn is_available_async() -> bool {
        let instance = wgpu::Instance::default();
        instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .is_some()
    }

    /// Acquire an adapter and create a device.
    pub fn new() -> Result<Self, GpuError> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN | wgpu::Backends::METAL | wgpu::Backends::DX12,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let info = adapter.get_info();
        let limits = adapter.limits();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("SOM Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e: wgpu::RequestDeviceError| GpuError::DeviceCreation(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|e: wgpu::Error| {
            error!("Uncaptured device error: {}", e);
        }));

        debug!("Using adapter {} ({:?})", info.name, info.backend);

        let device = Arc::new(device);
        let poller = Poller::spawn(Arc::clone(&device))?;

        Ok(Self {
            device,
            queue,
            info,
            limits,
            poller,
        })
    }

    /// The wgpu device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// The wgpu queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Adapter name and backend, for logs.
    pub fn describe(&self) -> String {
        format!("{} ({:?})", self.info.name, self.info.backend)
    }

    /// Maximum workgroups per dispatch dimension.
    pub fn max_workgroups(&self) -> u32 {
        self.limits.max_compute_workgroups_per_dimension
    }

    /// Maximum storage buffer binding size in bytes.
    pub fn max_storage_binding(&self) -> u64 {
        self.limits.max_storage_buffer_binding_size as u64
    }

    /// Creates a bind group layout for compute shaders.
    pub(crate) fn bind_group_layout(&self, label: &str, slots: &[(u32, Slot)]) -> wgpu::BindGroupLayout {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = slots
            .iter()
            .map(|&(binding, slot)| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: match slot {
                        Slot::Read => wgpu::BufferBindingType::Storage { read_only: true },
                        Slot::ReadWrite => wgpu::BufferBindingType::Storage { read_only: false },
                        Slot::Uniform => wgpu::BufferBindingType::Uniform,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();

        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &entries,
        })
    }

    /// Creates a bind group binding whole buffers in slot order.
    pub(crate) fn bind_group(
        &self,
        label: &str,
        layout: &wgpu::BindGroupLayout,
        buffers: &[(u32, &wgpu::Buffer)],
    ) -> wgpu::BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .map(|&(binding, buffer)| wgpu::BindGroupEntry {
                binding,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &entries,
        })
    }

    /// Compiles a WGSL compute pipeline.
    ///
    /// Shader and pipeline validation errors are captured in an error scope
    /// and returned as [`GpuError::Compilation`].
    pub(crate) fn compile(
        &self,
        label: &str,
        source: &str,
        entry_point: &str,
        layout: &wgpu::BindGroupLayout,
    ) -> Result<wgpu::ComputePipeline, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });

        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        });

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(e) => Err(GpuError::Compilation {
                label: label.to_string(),
                message: e.to_string(),
            }),
            None => Ok(pipeline),
        }
    }

    /// Allocates a buffer, reporting allocation failures.
    pub(crate) fn buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> Result<wgpu::Buffer, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        // Zero-sized bindings are invalid; keep at least one element.
        let size = size.max(4);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });

        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        match validation.or(oom) {
            Some(e) => Err(GpuError::Validation(format!("{}: {}", label, e))),
            None => Ok(buffer),
        }
    }

    /// Starts tracking a group of submissions.
    pub(crate) fn submission(&self) -> Submission<'_> {
        Submission::new(self)
    }

    /// Runs a single encoder to completion, without a deadline.
    pub(crate) fn run(&self, stage: Stage, encoder: wgpu::CommandEncoder) -> Result<(), SomError> {
        let mut submission = self.submission();
        submission.submit(stage, encoder).map_err(StageError::into_inner)?;
        submission.wait(None).map_err(StageError::into_inner)
    }

    /// Copies `size` bytes of `source` to the host.
    pub(crate) fn read_back(
        &self,
        stage: Stage,
        source: &wgpu::Buffer,
        size: u64,
        deadline: Option<Duration>,
    ) -> Result<Vec<u8>, SomError> {
        let staging = self.buffer(
            "Readback Staging Buffer",
            size,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        )?;

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);

        let mut submission = self.submission();
        submission.submit(stage, encoder).map_err(StageError::into_inner)?;
        submission.map_read(stage, &staging);
        submission.wait(deadline).map_err(StageError::into_inner)?;

        let bytes = {
            let data = staging.slice(..size).get_mapped_range();
            data.to_vec()
        };
        staging.unmap();

        Ok(bytes)
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        self.poller.stop();
    }
}

/// Background thread that polls the device whenever work is pending.
struct Poller {
    kick: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    fn spawn(device: Arc<wgpu::Device>) -> Result<Self, GpuError> {
        let (kick, rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("som-device-poller".to_string())
            .spawn(move || {
                while rx.recv().is_ok() {
                    device.poll(wgpu::Maintain::Wait);
                }
            })
            .map_err(|e| GpuError::DeviceCreation(format!("cannot spawn poller: {}", e)))?;

        Ok(Self {
            kick: Some(kick),
            handle: Some(handle),
        })
    }

    fn kick(&self) -> Result<(), GpuError> {
        match &self.kick {
            Some(kick) => kick
                .send(())
                .map_err(|_| GpuError::Lost("device poller exited".to_string())),
            None => Err(GpuError::Lost("device poller stopped".to_string())),
        }
    }

    fn stop(&mut self) {
        self.kick = None;
        if let Some(handle) = self.handle.take() {
            // A poller stuck on hung work is detached; it exits once the
            // device finishes and its channel reports disconnection.
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

enum Signal {
    Done(Stage),
    Mapped(Stage, Result<(), wgpu::BufferAsyncError>),
}

/// Completion tracker for the submissions of one iteration.
pub(crate) struct Submission<'a> {
    ctx: &'a DeviceContext,
    started: Instant,
    tx: Sender<Signal>,
    rx: Receiver<Signal>,
    submitted: Vec<Stage>,
    completed: Vec<Stage>,
    pending_maps: usize,
}

impl<'a> Submission<'a> {
    fn new(ctx: &'a DeviceContext) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            ctx,
            started: Instant::now(),
            tx,
            rx,
            submitted: Vec::new(),
            completed: Vec::new(),
            pending_maps: 0,
        }
    }

    /// Submits one stage's commands and registers its completion callback.
    pub(crate) fn submit(&mut self, stage: Stage, encoder: wgpu::CommandEncoder) -> Result<(), StageError> {
        let device = &self.ctx.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.ctx.queue.submit(Some(encoder.finish()));
        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            return Err(StageError::new(stage, GpuError::Validation(e.to_string())));
        }

        let tx = self.tx.clone();
        self.ctx.queue.on_submitted_work_done(move || {
            let _ = tx.send(Signal::Done(stage));
        });
        self.submitted.push(stage);
        Ok(())
    }

    /// Requests a read mapping of `buffer` once prior submissions finish.
    pub(crate) fn map_read(&mut self, stage: Stage, buffer: &wgpu::Buffer) {
        let tx = self.tx.clone();
        buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(Signal::Mapped(stage, result));
        });
        self.pending_maps += 1;
    }

    /// Blocks until every submitted stage and mapping has completed.
    ///
    /// With a timeout, the deadline counts from the creation of this
    /// tracker; expiry names the first stage still incomplete.
    pub(crate) fn wait(mut self, timeout: Option<Duration>) -> Result<(), StageError> {
        let fallback_stage = self.submitted.last().copied().unwrap_or(Stage::DistanceCompute);
        self.ctx
            .poller
            .kick()
            .map_err(|e| StageError::new(fallback_stage, e))?;

        while self.completed.len() < self.submitted.len() || self.pending_maps > 0 {
            let signal = match timeout {
                Some(timeout) => {
                    let remaining = timeout.saturating_sub(self.started.elapsed());
                    match self.rx.recv_timeout(remaining) {
                        Ok(signal) => signal,
                        Err(RecvTimeoutError::Timeout) => {
                            let stage = self.first_incomplete();
                            warn!("Device work timed out after {:?} during {}", timeout, stage);
                            return Err(StageError::new(stage, SomError::DeviceTimeout { stage, timeout }));
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(StageError::new(
                                self.first_incomplete(),
                                GpuError::Lost("completion channel closed".to_string()),
                            ));
                        }
                    }
                }
                None => match self.rx.recv() {
                    Ok(signal) => signal,
                    Err(_) => {
                        return Err(StageError::new(
                            self.first_incomplete(),
                            GpuError::Lost("completion channel closed".to_string()),
                        ));
                    }
                },
            };

            match signal {
                Signal::Done(stage) => self.completed.push(stage),
                Signal::Mapped(stage, result) => {
                    self.pending_maps -= 1;
                    result.map_err(|e| StageError::new(stage, GpuError::BufferMapping(format!("{:?}", e))))?;
                }
            }
        }

        Ok(())
    }

    fn first_incomplete(&self) -> Stage {
        self.submitted
            .iter()
            .copied()
            .find(|s| !self.completed.contains(s))
            .or_else(|| self.submitted.last().copied())
            .unwrap_or(Stage::DistanceCompute)
    }
}
