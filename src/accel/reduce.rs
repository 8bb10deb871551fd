//! Multi-pass BMU reduction on the device.

use super::device::{DeviceContext, Slot};
use super::shaders;
use crate::error::{GpuError, SomError};
use crate::som::Bmu;

/// Lanes per reduction workgroup (matches `REDUCE_SHADER`).
pub(crate) const REDUCE_LANES: usize = 256;

/// `(value, index)` pair carried through every merge.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct Candidate {
    pub value: f32,
    pub index: u32,
}

impl Candidate {
    pub(crate) const SIZE: u64 = std::mem::size_of::<Candidate>() as u64;

    /// Decodes a candidate read back from the device.
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, GpuError> {
        if bytes.len() < Self::SIZE as usize {
            return Err(GpuError::BufferMapping(format!(
                "winner readback has {} bytes",
                bytes.len()
            )));
        }
        Ok(bytemuck::pod_read_unaligned(&bytes[..Self::SIZE as usize]))
    }

    /// Converts to a [`Bmu`], rejecting a winner outside `0..num_cells`.
    pub(crate) fn into_bmu(self, num_cells: usize) -> Result<Bmu, SomError> {
        let index = self.index as usize;
        if index >= num_cells {
            return Err(GpuError::Validation(format!(
                "reduction produced winner {} for {} cells",
                self.index, num_cells
            ))
            .into());
        }
        Ok(Bmu {
            index,
            value: self.value,
        })
    }
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ReduceParams {
    count: u32,
    _padding: [u32; 3],
}

/// Compiled reduction pipelines, shared by every plan of a backend.
pub(crate) struct ReducePipelines {
    distances_layout: wgpu::BindGroupLayout,
    candidates_layout: wgpu::BindGroupLayout,
    distances: wgpu::ComputePipeline,
    candidates: wgpu::ComputePipeline,
}

impl ReducePipelines {
    pub(crate) fn new(ctx: &DeviceContext) -> Result<Self, GpuError> {
        let distances_layout = ctx.bind_group_layout(
            "Reduce Distances Layout",
            &[(0, Slot::Read), (2, Slot::ReadWrite), (3, Slot::Uniform)],
        );
        let candidates_layout = ctx.bind_group_layout(
            "Reduce Candidates Layout",
            &[(1, Slot::Read), (2, Slot::ReadWrite), (3, Slot::Uniform)],
        );

        let distances = ctx.compile(
            "Reduce Distances Pipeline",
            shaders::REDUCE_SHADER,
            "reduce_distances",
            &distances_layout,
        )?;
        let candidates = ctx.compile(
            "Reduce Candidates Pipeline",
            shaders::REDUCE_SHADER,
            "reduce_candidates",
            &candidates_layout,
        )?;

        Ok(Self {
            distances_layout,
            candidates_layout,
            distances,
            candidates,
        })
    }
}

struct Pass {
    bind_group: wgpu::BindGroup,
    workgroups: u32,
    first: bool,
}

/// Precomputed passes reducing one distance buffer to a winner slot.
///
/// Pass k reduces `ceil(N / 256^k)` entries; outputs ping-pong between two
/// scratch buffers and the last pass writes the `winner` buffer, which the
/// update stage binds directly.
pub(crate) struct ReductionPlan {
    passes: Vec<Pass>,
    winner: wgpu::Buffer,
    // Kept alive for the bind groups.
    _scratch: [wgpu::Buffer; 2],
    _uniforms: Vec<wgpu::Buffer>,
}

impl ReductionPlan {
    pub(crate) fn new(
        ctx: &DeviceContext,
        pipelines: &ReducePipelines,
        source: &wgpu::Buffer,
        count: usize,
    ) -> Result<Self, SomError> {
        if count == 0 {
            return Err(SomError::EmptyBuffer);
        }
        let first_groups = count.div_ceil(REDUCE_LANES);
        if first_groups > ctx.max_workgroups() as usize {
            return Err(SomError::Config(format!(
                "{} distances exceed the reduction dispatch limit",
                count
            )));
        }

        let storage = wgpu::BufferUsages::STORAGE;
        let scratch_size = first_groups as u64 * Candidate::SIZE;
        let scratch = [
            ctx.buffer("Reduce Scratch A", scratch_size, storage)?,
            ctx.buffer("Reduce Scratch B", scratch_size, storage)?,
        ];
        let winner = ctx.buffer(
            "Winner Buffer",
            Candidate::SIZE,
            storage | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        )?;

        let mut passes = Vec::new();
        let mut uniforms = Vec::new();
        let mut remaining = count;
        let mut level = 0usize;

        loop {
            let groups = remaining.div_ceil(REDUCE_LANES);
            let output = if groups == 1 { &winner } else { &scratch[level % 2] };

            let params = ReduceParams {
                count: remaining as u32,
                _padding: [0; 3],
            };
            let uniform = ctx.buffer(
                "Reduce Params",
                std::mem::size_of::<ReduceParams>() as u64,
                wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            )?;
            ctx.queue().write_buffer(&uniform, 0, bytemuck::bytes_of(&params));

            let bind_group = if level == 0 {
                ctx.bind_group(
                    "Reduce Distances Bind Group",
                    &pipelines.distances_layout,
                    &[(0, source), (2, output), (3, &uniform)],
                )
            } else {
                let input = &scratch[(level - 1) % 2];
                ctx.bind_group(
                    "Reduce Candidates Bind Group",
                    &pipelines.candidates_layout,
                    &[(1, input), (2, output), (3, &uniform)],
                )
            };

            passes.push(Pass {
                bind_group,
                workgroups: groups as u32,
                first: level == 0,
            });
            uniforms.push(uniform);

            if groups == 1 {
                break;
            }
            remaining = groups;
            level += 1;
        }

        Ok(Self {
            passes,
            winner,
            _scratch: scratch,
            _uniforms: uniforms,
        })
    }

    /// Records every pass, one compute pass per level.
    pub(crate) fn encode(&self, pipelines: &ReducePipelines, encoder: &mut wgpu::CommandEncoder) {
        for pass in &self.passes {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("BMU Reduce Pass"),
                timestamp_writes: None,
            });
            let pipeline = if pass.first { &pipelines.distances } else { &pipelines.candidates };
            compute_pass.set_pipeline(pipeline);
            compute_pass.set_bind_group(0, &pass.bind_group, &[]);
            compute_pass.dispatch_workgroups(pass.workgroups, 1, 1);
        }
    }

    /// Device slot holding the reduced winner.
    pub(crate) fn winner(&self) -> &wgpu::Buffer {
        &self.winner
    }

    /// Number of passes the plan records.
    pub(crate) fn depth(&self) -> usize {
        self.passes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_decode() {
        let c = Candidate { value: 0.5, index: 7 };
        let decoded = Candidate::from_bytes(bytemuck::bytes_of(&c)).unwrap();
        assert_eq!(decoded, c);
        assert!(Candidate::from_bytes(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_padding_winner_is_rejected() {
        let padding = Candidate {
            value: f32::INFINITY,
            index: u32::MAX,
        };
        assert!(matches!(
            padding.into_bmu(300),
            Err(SomError::DeviceFailure(GpuError::Validation(_)))
        ));

        let real = Candidate {
            value: f32::INFINITY,
            index: 299,
        };
        assert_eq!(real.into_bmu(300).unwrap().index, 299);
    }
}
