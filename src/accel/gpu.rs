//! GPU training backend.
//!
//! Runs the three device stages of an iteration through wgpu:
//!
//! 1. **Distance**: one invocation per cell, metric-specific WGSL
//! 2. **Reduce**: workgroup tree reduction to the winner slot
//! 3. **Update**: 16x16 workgroups over cells x dimensions, reading the
//!    winner slot directly
//!
//! Grid weights, distances and activation counters stay resident on the
//! device for the whole run; only the winner (8 bytes) is read back per
//! iteration.

use super::device::{DeviceContext, Slot};
use super::reduce::{Candidate, ReducePipelines, ReductionPlan};
use crate::backend::{ComputeBackend, Stage, StageError, UpdateParams};
use crate::distance::{DistanceKernel, Metric, DISTANCE_WORKGROUP_SIZE};
use crate::error::{GpuError, Result, SomError};
use crate::som::{Bmu, Grid};
use log::{debug, info};
use std::time::Duration;

/// Workgroup edge of the update shader.
const UPDATE_TILE: u32 = 16;

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct DistanceParams {
    num_cells: u32,
    dim: u32,
    _padding: [u32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct UpdateUniform {
    num_cells: u32,
    dim: u32,
    width: u32,
    height: u32,
    learning_rate: f32,
    radius: f32,
    topology: u32,
    soft_threshold: f32,
}

struct Pipelines {
    distance_layout: wgpu::BindGroupLayout,
    distance: wgpu::ComputePipeline,
    update_layout: wgpu::BindGroupLayout,
    update: wgpu::ComputePipeline,
    reduce: ReducePipelines,
}

impl Pipelines {
    fn new(ctx: &DeviceContext, kernel: &dyn DistanceKernel) -> std::result::Result<Self, GpuError> {
        let distance_layout = ctx.bind_group_layout(
            "Distance Layout",
            &[(0, Slot::Read), (1, Slot::Read), (2, Slot::ReadWrite), (3, Slot::Uniform)],
        );
        let distance = ctx.compile(
            &format!("Distance Pipeline ({})", kernel.name()),
            &kernel.shader_source(),
            "main",
            &distance_layout,
        )?;

        let update_layout = ctx.bind_group_layout(
            "Update Layout",
            &[
                (0, Slot::Read),
                (1, Slot::ReadWrite),
                (2, Slot::ReadWrite),
                (3, Slot::Read),
                (4, Slot::Uniform),
            ],
        );
        let update = ctx.compile("Update Pipeline", super::shaders::UPDATE_SHADER, "main", &update_layout)?;

        let reduce = ReducePipelines::new(ctx)?;

        Ok(Self {
            distance_layout,
            distance,
            update_layout,
            update,
            reduce,
        })
    }
}

/// Device-resident grid state of one run.
struct GridBuffers {
    num_cells: usize,
    dim: usize,
    width: usize,
    height: usize,
    topology: u32,
    input: wgpu::Buffer,
    weights: wgpu::Buffer,
    distances: wgpu::Buffer,
    states: wgpu::Buffer,
    update_params: wgpu::Buffer,
    winner_staging: wgpu::Buffer,
    distance_bind_group: wgpu::BindGroup,
    update_bind_group: wgpu::BindGroup,
    reduction: ReductionPlan,
    // Kept alive for the distance bind group.
    _distance_params: wgpu::Buffer,
}

impl GridBuffers {
    fn new(ctx: &DeviceContext, pipelines: &Pipelines, grid: &Grid) -> Result<Self> {
        let num_cells = grid.len();
        let dim = grid.node_dimensionality();
        let f32_size = std::mem::size_of::<f32>() as u64;

        let weight_bytes = (num_cells * dim) as u64 * f32_size;
        if weight_bytes > ctx.max_storage_binding() {
            return Err(SomError::Config(format!(
                "weight matrix of {} bytes exceeds the device binding limit of {}",
                weight_bytes,
                ctx.max_storage_binding()
            )));
        }
        let max_groups = ctx.max_workgroups();
        if (num_cells as u32).div_ceil(UPDATE_TILE) > max_groups || (dim as u32).div_ceil(UPDATE_TILE) > max_groups {
            return Err(SomError::Config(format!(
                "{} cells x {} dimensions exceed the update dispatch limit",
                num_cells, dim
            )));
        }

        let storage = wgpu::BufferUsages::STORAGE;
        let copy = wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST;

        let input = ctx.buffer("Input Buffer", dim as u64 * f32_size, storage | wgpu::BufferUsages::COPY_DST)?;
        let weights = ctx.buffer("Weights Buffer", weight_bytes, storage | copy)?;
        let distances = ctx.buffer("Distances Buffer", num_cells as u64 * f32_size, storage | copy)?;
        let states = ctx.buffer("States Buffer", num_cells as u64 * 4, storage | copy)?;
        let distance_params = ctx.buffer(
            "Distance Params",
            std::mem::size_of::<DistanceParams>() as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        )?;
        let update_params = ctx.buffer(
            "Update Params",
            std::mem::size_of::<UpdateUniform>() as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        )?;
        let winner_staging = ctx.buffer(
            "Winner Staging Buffer",
            Candidate::SIZE,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        )?;

        let queue = ctx.queue();
        queue.write_buffer(&weights, 0, bytemuck::cast_slice(&grid.flat_weights()));
        let initial_distances: Vec<f32> = grid.cells().iter().map(|c| c.distance).collect();
        queue.write_buffer(&distances, 0, bytemuck::cast_slice(&initial_distances));
        let initial_states: Vec<u32> = grid.cells().iter().map(|c| c.state).collect();
        queue.write_buffer(&states, 0, bytemuck::cast_slice(&initial_states));
        queue.write_buffer(
            &distance_params,
            0,
            bytemuck::bytes_of(&DistanceParams {
                num_cells: num_cells as u32,
                dim: dim as u32,
                _padding: [0; 2],
            }),
        );

        let reduction = ReductionPlan::new(ctx, &pipelines.reduce, &distances, num_cells)?;

        let distance_bind_group = ctx.bind_group(
            "Distance Bind Group",
            &pipelines.distance_layout,
            &[(0, &input), (1, &weights), (2, &distances), (3, &distance_params)],
        );
        let update_bind_group = ctx.bind_group(
            "Update Bind Group",
            &pipelines.update_layout,
            &[
                (0, &input),
                (1, &weights),
                (2, &states),
                (3, reduction.winner()),
                (4, &update_params),
            ],
        );

        debug!(
            "Uploaded {} cells x {} dims, reduction depth {}",
            num_cells,
            dim,
            reduction.depth()
        );

        Ok(Self {
            num_cells,
            dim,
            width: grid.width(),
            height: grid.height(),
            topology: grid.topology().code(),
            input,
            weights,
            distances,
            states,
            update_params,
            winner_staging,
            distance_bind_group,
            update_bind_group,
            reduction,
            _distance_params: distance_params,
        })
    }

    fn check_input(&self, input: &[f32]) -> Result<()> {
        if input.len() != self.dim {
            return Err(SomError::DimensionMismatch {
                expected: self.dim,
                actual: input.len(),
            });
        }
        Ok(())
    }

    fn write_update_params(&self, queue: &wgpu::Queue, params: &UpdateParams) {
        let uniform = UpdateUniform {
            num_cells: self.num_cells as u32,
            dim: self.dim as u32,
            width: self.width as u32,
            height: self.height as u32,
            learning_rate: params.learning_rate,
            radius: params.radius,
            topology: self.topology,
            // Zero disables soft activation in the shader.
            soft_threshold: params.soft_threshold.unwrap_or(0.0),
        };
        queue.write_buffer(&self.update_params, 0, bytemuck::bytes_of(&uniform));
    }
}

/// wgpu implementation of [`ComputeBackend`].
pub struct GpuBackend {
    ctx: DeviceContext,
    kernel: &'static dyn DistanceKernel,
    pipelines: Pipelines,
    grid: Option<GridBuffers>,
    poisoned: bool,
}

impl GpuBackend {
    /// Check if GPU acceleration is available.
    pub fn is_available() -> bool {
        DeviceContext::is_available()
    }

    /// Creates a backend on a fresh device.
    pub fn new(metric: Metric) -> Result<Self> {
        Self::with_context(DeviceContext::new()?, metric)
    }

    /// Creates a backend on an existing device, compiling every pipeline.
    pub fn with_context(ctx: DeviceContext, metric: Metric) -> Result<Self> {
        let kernel = metric.kernel();
        let pipelines = Pipelines::new(&ctx, kernel)?;
        info!("GPU backend ready on {} ({} distance)", ctx.describe(), kernel.name());

        Ok(Self {
            ctx,
            kernel,
            pipelines,
            grid: None,
            poisoned: false,
        })
    }

    /// The owned device context.
    pub fn context(&self) -> &DeviceContext {
        &self.ctx
    }

    fn loaded(&self) -> Result<&GridBuffers> {
        if self.poisoned {
            return Err(GpuError::Lost("earlier device work timed out; create a new backend".to_string()).into());
        }
        self.grid.as_ref().ok_or(SomError::EmptyGrid)
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn encode_distance(&self, buffers: &GridBuffers, encoder: &mut wgpu::CommandEncoder) {
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Distance Pass"),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(&self.pipelines.distance);
        compute_pass.set_bind_group(0, &buffers.distance_bind_group, &[]);
        compute_pass.dispatch_workgroups((buffers.num_cells as u32).div_ceil(DISTANCE_WORKGROUP_SIZE), 1, 1);
    }

    fn encode_update(&self, buffers: &GridBuffers, encoder: &mut wgpu::CommandEncoder) {
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Update Pass"),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(&self.pipelines.update);
        compute_pass.set_bind_group(0, &buffers.update_bind_group, &[]);
        compute_pass.dispatch_workgroups(
            (buffers.num_cells as u32).div_ceil(UPDATE_TILE),
            (buffers.dim as u32).div_ceil(UPDATE_TILE),
            1,
        );
    }

    /// Scores every cell of the loaded grid against `input`.
    ///
    /// The result also stays in the device distance buffer.
    pub fn compute_distances(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let buffers = self.loaded()?;
        buffers.check_input(input)?;

        self.ctx.queue().write_buffer(&buffers.input, 0, bytemuck::cast_slice(input));
        let mut encoder = self.encoder("Distance Encoder");
        self.encode_distance(buffers, &mut encoder);
        self.ctx.run(Stage::DistanceCompute, encoder)?;

        let bytes = self.ctx.read_back(
            Stage::DistanceCompute,
            &buffers.distances,
            (buffers.num_cells * std::mem::size_of::<f32>()) as u64,
            None,
        )?;
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    /// Finds the minimum of an arbitrary distance buffer on the device.
    pub fn reduce_distances(&self, distances: &[f32]) -> Result<Bmu> {
        if distances.is_empty() {
            return Err(SomError::EmptyBuffer);
        }

        let source = self.ctx.buffer(
            "Reduce Source Buffer",
            std::mem::size_of_val(distances) as u64,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        )?;
        self.ctx.queue().write_buffer(&source, 0, bytemuck::cast_slice(distances));

        let plan = ReductionPlan::new(&self.ctx, &self.pipelines.reduce, &source, distances.len())?;
        let mut encoder = self.encoder("Reduce Encoder");
        plan.encode(&self.pipelines.reduce, &mut encoder);
        self.ctx.run(Stage::BmuReduce, encoder)?;

        let bytes = self.ctx.read_back(Stage::BmuReduce, plan.winner(), Candidate::SIZE, None)?;
        Candidate::from_bytes(&bytes)?.into_bmu(distances.len())
    }

    /// Moves every cell of the loaded grid towards `input` around `winner`.
    pub fn update(&mut self, winner: usize, input: &[f32], params: &UpdateParams) -> Result<()> {
        params.check()?;
        let buffers = self.loaded()?;
        buffers.check_input(input)?;
        if winner >= buffers.num_cells {
            return Err(SomError::IndexOutOfBounds {
                index: winner,
                max: buffers.num_cells,
            });
        }

        let queue = self.ctx.queue();
        queue.write_buffer(&buffers.input, 0, bytemuck::cast_slice(input));
        let slot = Candidate {
            value: 0.0,
            index: winner as u32,
        };
        queue.write_buffer(buffers.reduction.winner(), 0, bytemuck::bytes_of(&slot));
        buffers.write_update_params(queue, params);

        let mut encoder = self.encoder("Update Encoder");
        self.encode_update(buffers, &mut encoder);
        self.ctx.run(Stage::WeightUpdate, encoder)
    }

    fn run_step(
        &self,
        input: &[f32],
        params: &UpdateParams,
        deadline: Option<Duration>,
    ) -> std::result::Result<Bmu, StageError> {
        params.check().map_err(|e| StageError::new(Stage::WeightUpdate, e))?;
        let buffers = self.loaded().map_err(|e| StageError::new(Stage::DistanceCompute, e))?;
        buffers
            .check_input(input)
            .map_err(|e| StageError::new(Stage::DistanceCompute, e))?;

        let queue = self.ctx.queue();
        queue.write_buffer(&buffers.input, 0, bytemuck::cast_slice(input));
        buffers.write_update_params(queue, params);

        let mut submission = self.ctx.submission();

        let mut encoder = self.encoder("Distance Encoder");
        self.encode_distance(buffers, &mut encoder);
        submission.submit(Stage::DistanceCompute, encoder)?;

        let mut encoder = self.encoder("Reduce Encoder");
        buffers.reduction.encode(&self.pipelines.reduce, &mut encoder);
        submission.submit(Stage::BmuReduce, encoder)?;

        let mut encoder = self.encoder("Update Encoder");
        self.encode_update(buffers, &mut encoder);
        encoder.copy_buffer_to_buffer(buffers.reduction.winner(), 0, &buffers.winner_staging, 0, Candidate::SIZE);
        submission.submit(Stage::WeightUpdate, encoder)?;

        submission.map_read(Stage::WeightUpdate, &buffers.winner_staging);
        submission.wait(deadline)?;

        let candidate = {
            let data = buffers.winner_staging.slice(..).get_mapped_range();
            Candidate::from_bytes(&data)
        };
        buffers.winner_staging.unmap();

        candidate
            .map_err(SomError::from)
            .and_then(|c| c.into_bmu(buffers.num_cells))
            .map_err(|e| StageError::new(Stage::BmuReduce, e))
    }
}

impl ComputeBackend for GpuBackend {
    fn describe(&self) -> String {
        format!("GPU {} ({})", self.ctx.describe(), self.kernel.name())
    }

    fn load(&mut self, grid: &Grid) -> Result<()> {
        if grid.is_empty() {
            return Err(SomError::EmptyGrid);
        }
        if grid.node_dimensionality() == 0 {
            return Err(SomError::Config("node_dimensionality must be > 0".to_string()));
        }
        // Release the previous grid before allocating the next.
        self.grid = None;
        self.grid = Some(GridBuffers::new(&self.ctx, &self.pipelines, grid)?);
        Ok(())
    }

    fn step(
        &mut self,
        input: &[f32],
        params: &UpdateParams,
        deadline: Option<Duration>,
    ) -> std::result::Result<Bmu, StageError> {
        let result = self.run_step(input, params, deadline);
        if let Err(StageError {
            error: SomError::DeviceTimeout { .. },
            ..
        }) = &result
        {
            // The staging buffer may still be pending a map.
            self.poisoned = true;
        }
        result
    }

    fn store(&mut self, grid: &mut Grid, deadline: Option<Duration>) -> Result<()> {
        let result = self.read_snapshot(grid, deadline);
        if let Err(SomError::DeviceTimeout { .. }) = &result {
            // A readback staging buffer may still be pending a map.
            self.poisoned = true;
        }
        result
    }
}

impl GpuBackend {
    fn read_snapshot(&self, grid: &mut Grid, deadline: Option<Duration>) -> Result<()> {
        let buffers = self.loaded()?;
        if grid.len() != buffers.num_cells || grid.node_dimensionality() != buffers.dim {
            return Err(SomError::Config("grid shape differs from the loaded grid".to_string()));
        }

        let f32_size = std::mem::size_of::<f32>();
        let weights = self.ctx.read_back(
            Stage::WeightUpdate,
            &buffers.weights,
            (buffers.num_cells * buffers.dim * f32_size) as u64,
            deadline,
        )?;
        let distances = self.ctx.read_back(
            Stage::DistanceCompute,
            &buffers.distances,
            (buffers.num_cells * f32_size) as u64,
            deadline,
        )?;
        let states = self.ctx.read_back(
            Stage::WeightUpdate,
            &buffers.states,
            (buffers.num_cells * 4) as u64,
            deadline,
        )?;

        grid.apply_snapshot(
            &bytemuck::pod_collect_to_vec::<u8, f32>(&weights),
            &bytemuck::pod_collect_to_vec::<u8, f32>(&distances),
            &bytemuck::pod_collect_to_vec::<u8, u32>(&states),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ReferenceBackend;
    use crate::som::Topology;

    fn backend(metric: Metric) -> Option<GpuBackend> {
        if !GpuBackend::is_available() {
            println!("GPU not available, skipping test");
            return None;
        }
        Some(GpuBackend::new(metric).expect("GPU init failed"))
    }

    fn random_grid(width: usize, height: usize, dim: usize, topology: Topology) -> Grid {
        let config = crate::SomConfig {
            width,
            height,
            node_dimensionality: dim,
            topology,
            seed: Some(11),
            ..Default::default()
        };
        Grid::new(&config).unwrap()
    }

    #[test]
    fn test_gpu_available() {
        let available = GpuBackend::is_available();
        println!("GPU available: {}", available);
    }

    #[test]
    fn test_distances_match_reference() {
        for metric in [Metric::Euclidean, Metric::Manhattan, Metric::Chebyshev, Metric::Cosine] {
            let Some(mut gpu) = backend(metric) else { return };
            let grid = random_grid(37, 29, 19, Topology::Rectangular);
            let input: Vec<f32> = (0..19).map(|i| (i as f32 * 0.37).sin()).collect();

            gpu.load(&grid).unwrap();
            let mut reference = ReferenceBackend::new(metric);
            reference.load(&grid).unwrap();

            let a = gpu.compute_distances(&input).unwrap();
            let b = reference.compute_distances(&input).unwrap();
            assert_eq!(a.len(), b.len());
            for (x, y) in a.iter().zip(&b) {
                assert!((x - y).abs() < 1e-4, "{:?}: {} vs {}", metric, x, y);
            }
        }
    }

    #[test]
    fn test_reduce_multi_pass_ties() {
        let Some(gpu) = backend(Metric::Euclidean) else { return };

        // Three passes: 70_000 -> 274 -> 2 -> 1.
        let mut distances = vec![9.0f32; 70_000];
        distances[65_001] = 0.5;
        distances[300] = 0.5;
        distances[69_999] = 0.5;

        let bmu = gpu.reduce_distances(&distances).unwrap();
        assert_eq!(bmu.index, 300);
        assert_eq!(bmu.value, 0.5);
    }

    #[test]
    fn test_reduce_overflowed_distances() {
        let Some(gpu) = backend(Metric::Euclidean) else { return };
        let reference = ReferenceBackend::new(Metric::Euclidean);

        // 300 entries leave padded lanes in the second workgroup.
        let distances = vec![f32::INFINITY; 300];
        let bmu = gpu.reduce_distances(&distances).unwrap();
        assert_eq!(bmu.index, 0);
        assert_eq!(bmu, reference.reduce_distances(&distances).unwrap());
    }

    #[test]
    fn test_reduce_nan_and_max_agree_with_host() {
        let Some(gpu) = backend(Metric::Euclidean) else { return };
        let reference = ReferenceBackend::new(Metric::Euclidean);

        for distances in [
            vec![f32::NAN, f32::MAX],
            vec![f32::NAN, f32::INFINITY, f32::NAN],
            vec![f32::NAN; 700],
        ] {
            let a = gpu.reduce_distances(&distances).unwrap();
            let b = reference.reduce_distances(&distances).unwrap();
            assert_eq!(a.index, b.index);
            assert_eq!(a.value, b.value);
        }
    }

    #[test]
    fn test_tiny_radius_keeps_weights_finite() {
        let Some(mut gpu) = backend(Metric::Euclidean) else { return };
        let mut grid = random_grid(6, 5, 3, Topology::Hexagonal);
        gpu.load(&grid).unwrap();
        for radius in [1e-25f32, 1e-30] {
            gpu.step(&[0.3, 0.6, 0.9], &UpdateParams::new(0.5, radius), None).unwrap();
        }
        gpu.store(&mut grid, None).unwrap();
        assert!(grid.cells().iter().flat_map(|c| &c.weights).all(|w| w.is_finite()));
    }

    #[test]
    fn test_reduce_empty() {
        let Some(gpu) = backend(Metric::Euclidean) else { return };
        assert!(matches!(gpu.reduce_distances(&[]), Err(SomError::EmptyBuffer)));
    }

    #[test]
    fn test_step_matches_reference() {
        for topology in [Topology::Rectangular, Topology::Toroidal, Topology::Hexagonal] {
            let Some(mut gpu) = backend(Metric::Euclidean) else { return };
            let mut gpu_grid = random_grid(12, 9, 5, topology);
            let mut ref_grid = gpu_grid.clone();

            gpu.load(&gpu_grid).unwrap();
            let mut reference = ReferenceBackend::new(Metric::Euclidean);
            reference.load(&ref_grid).unwrap();

            let params = UpdateParams::new(0.3, 2.0);
            let input = [0.9, 0.1, 0.4, 0.7, 0.2];
            for _ in 0..5 {
                let a = gpu.step(&input, &params, None).unwrap();
                let b = reference.step(&input, &params, None).unwrap();
                assert_eq!(a.index, b.index);
            }

            gpu.store(&mut gpu_grid, None).unwrap();
            reference.store(&mut ref_grid, None).unwrap();
            for (x, y) in gpu_grid.flat_weights().iter().zip(ref_grid.flat_weights().iter()) {
                assert!((x - y).abs() < 1e-4, "{:?}: {} vs {}", topology, x, y);
            }
            let states_a: Vec<u32> = gpu_grid.cells().iter().map(|c| c.state).collect();
            let states_b: Vec<u32> = ref_grid.cells().iter().map(|c| c.state).collect();
            assert_eq!(states_a, states_b);
        }
    }

    #[test]
    fn test_zero_radius_touches_only_winner() {
        let Some(mut gpu) = backend(Metric::Euclidean) else { return };
        let mut grid = random_grid(8, 8, 4, Topology::Hexagonal);
        let before = grid.flat_weights();

        gpu.load(&grid).unwrap();
        gpu.update(10, &[1.0, 1.0, 1.0, 1.0], &UpdateParams::new(0.5, 0.0)).unwrap();
        gpu.store(&mut grid, None).unwrap();

        let after = grid.flat_weights();
        for cell in 0..64 {
            let range = cell * 4..(cell + 1) * 4;
            if cell == 10 {
                assert_ne!(after[range.clone()], before[range]);
            } else {
                assert_eq!(after[range.clone()], before[range]);
            }
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let Some(mut gpu) = backend(Metric::Euclidean) else { return };
        let grid = random_grid(4, 4, 4, Topology::Rectangular);
        gpu.load(&grid).unwrap();

        let err = gpu.step(&[0.0; 3], &UpdateParams::new(0.5, 1.0), None).unwrap_err();
        assert_eq!(err.stage, Stage::DistanceCompute);
        assert!(matches!(err.error, SomError::DimensionMismatch { expected: 4, actual: 3 }));
    }
}
