//! WGSL compute shaders for BMU reduction and weight update.
//!
//! The per-metric distance shader is generated from a shared template in
//! [`crate::distance`].

/// Workgroup tree reduction to the minimum `(value, index)` candidate.
///
/// Each workgroup of 256 lanes folds its slice of the input to one
/// candidate. The host chains passes until a single candidate remains:
/// pass 0 reads raw distances (`reduce_distances`), later passes read the
/// previous pass's candidates (`reduce_candidates`).
///
/// Merge rule: smaller value wins, equal values go to the smaller index.
/// Out-of-range lanes hold `{+inf, 0xffffffff}`, which loses every merge
/// against a real cell, including one whose distance overflowed to +inf.
/// NaN distances are treated as +inf.
///
/// Inputs:
/// - distances_in / candidates_in: pass input, `params.count` entries
/// - params: { count }
///
/// Output:
/// - candidates_out[workgroup_id.x]
pub const REDUCE_SHADER: &str = r#"
struct Candidate {
    value: f32,
    index: u32,
}

struct ReduceParams {
    count: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

@group(0) @binding(0) var<storage, read> distances_in: array<f32>;
@group(0) @binding(1) var<storage, read> candidates_in: array<Candidate>;
@group(0) @binding(2) var<storage, read_write> candidates_out: array<Candidate>;
@group(0) @binding(3) var<uniform> params: ReduceParams;

const LANES: u32 = 256u;
const INF_BITS: u32 = 0x7f800000u;
const NO_INDEX: u32 = 0xffffffffu;

var<workgroup> lane_value: array<f32, 256>;
var<workgroup> lane_index: array<u32, 256>;

fn infinity() -> f32 {
    return bitcast<f32>(INF_BITS);
}

// Bit test, so it holds under fast-math compilation too.
fn is_nan(x: f32) -> bool {
    return (bitcast<u32>(x) & 0x7fffffffu) > INF_BITS;
}

fn fold_workgroup(lane: u32, group: u32) {
    workgroupBarrier();
    for (var stride: u32 = LANES / 2u; stride > 0u; stride = stride >> 1u) {
        if (lane < stride) {
            let av = lane_value[lane];
            let ai = lane_index[lane];
            let bv = lane_value[lane + stride];
            let bi = lane_index[lane + stride];
            if (bv < av || (bv == av && bi < ai)) {
                lane_value[lane] = bv;
                lane_index[lane] = bi;
            }
        }
        workgroupBarrier();
    }

    if (lane == 0u) {
        candidates_out[group] = Candidate(lane_value[0], lane_index[0]);
    }
}

@compute @workgroup_size(256)
fn reduce_distances(
    @builtin(global_invocation_id) global_id: vec3<u32>,
    @builtin(local_invocation_id) local_id: vec3<u32>,
    @builtin(workgroup_id) workgroup_id: vec3<u32>
) {
    var value = infinity();
    var index = NO_INDEX;
    if (global_id.x < params.count) {
        value = distances_in[global_id.x];
        index = global_id.x;
        if (is_nan(value)) {
            value = infinity();
        }
    }
    lane_value[local_id.x] = value;
    lane_index[local_id.x] = index;

    fold_workgroup(local_id.x, workgroup_id.x);
}

@compute @workgroup_size(256)
fn reduce_candidates(
    @builtin(global_invocation_id) global_id: vec3<u32>,
    @builtin(local_invocation_id) local_id: vec3<u32>,
    @builtin(workgroup_id) workgroup_id: vec3<u32>
) {
    var value = infinity();
    var index = NO_INDEX;
    if (global_id.x < params.count) {
        let c = candidates_in[global_id.x];
        value = c.value;
        index = c.index;
    }
    lane_value[local_id.x] = value;
    lane_index[local_id.x] = index;

    fold_workgroup(local_id.x, workgroup_id.x);
}
"#;

/// Neighborhood-weighted weight update around the winner.
///
/// Thread (cell, d) moves `weights[cell][d]` towards `input[d]` by
/// `learning_rate * h`, where `h` is the Gaussian of the topological
/// distance to the winner (indicator of the winner when `2 * radius^2` is 0
/// or not finite).
/// Threads with `d == 0` also bump the activation counter of the winner
/// and, with a soft threshold, of every cell with `h >= soft_threshold`.
///
/// The winner comes from the reduction's output buffer, so no host round
/// trip is needed between reduce and update.
///
/// Topology codes: 0 rectangular, 1 toroidal, 2 hexagonal (odd-row offset).
pub const UPDATE_SHADER: &str = r#"
struct Candidate {
    value: f32,
    index: u32,
}

struct UpdateParams {
    num_cells: u32,
    dim: u32,
    width: u32,
    height: u32,
    learning_rate: f32,
    radius: f32,
    topology: u32,
    soft_threshold: f32,
}

@group(0) @binding(0) var<storage, read> input: array<f32>;
@group(0) @binding(1) var<storage, read_write> weights: array<f32>;
@group(0) @binding(2) var<storage, read_write> states: array<u32>;
@group(0) @binding(3) var<storage, read> winner: Candidate;
@group(0) @binding(4) var<uniform> params: UpdateParams;

const INF_BITS: u32 = 0x7f800000u;

fn topological_distance(a: u32, b: u32) -> f32 {
    let w = i32(params.width);
    let h = i32(params.height);
    let ar = i32(a / params.width);
    let ac = i32(a % params.width);
    let br = i32(b / params.width);
    let bc = i32(b % params.width);

    var dist: f32;
    switch params.topology {
        case 1u: {
            var dr = abs(ar - br);
            var dc = abs(ac - bc);
            dr = min(dr, h - dr);
            dc = min(dc, w - dc);
            dist = sqrt(f32(dr * dr + dc * dc));
        }
        case 2u: {
            let ax = ac - (ar - (ar & 1)) / 2;
            let bx = bc - (br - (br & 1)) / 2;
            let dx = ax - bx;
            let dz = ar - br;
            let dy = -dx - dz;
            dist = f32((abs(dx) + abs(dy) + abs(dz)) / 2);
        }
        default: {
            let dr = f32(ar - br);
            let dc = f32(ac - bc);
            dist = sqrt(dr * dr + dc * dc);
        }
    }
    return dist;
}

fn neighborhood(d: f32, radius: f32) -> f32 {
    if (d == 0.0) {
        return 1.0;
    }
    let spread = 2.0 * radius * radius;
    // Zero when the radius is 0 or small enough to underflow; the exponent
    // bits are all set for inf and NaN.
    if (spread == 0.0 || (bitcast<u32>(spread) & INF_BITS) == INF_BITS) {
        return 0.0;
    }
    return exp(-(d * d) / spread);
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let cell = global_id.x;
    let d = global_id.y;
    if (cell >= params.num_cells || d >= params.dim) {
        return;
    }

    let win = winner.index;
    let h = neighborhood(topological_distance(cell, win), params.radius);

    if (d == 0u) {
        let soft = params.soft_threshold > 0.0 && h >= params.soft_threshold;
        if (cell == win || soft) {
            states[cell] = states[cell] + 1u;
        }
    }

    let influence = params.learning_rate * h;
    if (influence == 0.0) {
        return;
    }

    let k = cell * params.dim + d;
    let w = weights[k];
    weights[k] = w + influence * (input[d] - w);
}
"#;
