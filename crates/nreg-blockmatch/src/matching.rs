use glam::{DMat4, DVec3};
use nreg_image::{parallel, VolumeSize, VolumetricImage};
use nreg_linalg::mat44;

use crate::{
    blocks::{BlockLayout, BlockMatchingState},
    config::BlockMatchingConfig,
    error::BlockMatchingError,
};

/// Paired world positions produced by block matching.
///
/// The arrays are parallel: entry `i` of every field describes the same
/// block. Pairs are ordered by ascending block index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrespondenceSet {
    /// World position of each reference block origin.
    pub target_positions: Vec<DVec3>,
    /// World position of the best matching floating block origin.
    pub result_positions: Vec<DVec3>,
    /// Block index of each pair.
    pub block_indices: Vec<usize>,
    /// Best absolute normalized cross-correlation of each pair.
    pub correlations: Vec<f64>,
}

impl CorrespondenceSet {
    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.target_positions.len()
    }

    /// Whether the set holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.target_positions.is_empty()
    }

    /// Iterate over `(target, result)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (DVec3, DVec3)> + '_ {
        self.target_positions
            .iter()
            .copied()
            .zip(self.result_positions.iter().copied())
    }

    fn push(&mut self, block: BlockMatch) {
        self.target_positions.push(block.target);
        self.result_positions.push(block.result);
        self.block_indices.push(block.block_index);
        self.correlations.push(block.correlation);
    }
}

/// Outcome of the search of a single block.
struct BlockMatch {
    block_index: usize,
    target: DVec3,
    result: DVec3,
    correlation: f64,
}

/// Values of one block, `None` where the voxel is outside the image or zero.
fn gather_block(
    values: &[f64],
    size: VolumeSize,
    layout: &BlockLayout,
    origin: [i64; 3],
    out: &mut [Option<f64>],
) {
    let [wx, wy, wz] = layout.width;
    let mut a = 0;
    for dz in 0..wz {
        let z = origin[2] + dz as i64;
        for dy in 0..wy {
            let y = origin[1] + dy as i64;
            for dx in 0..wx {
                let x = origin[0] + dx as i64;
                out[a] = if size.contains(x, y, z) {
                    Some(values[size.index(x as usize, y as usize, z as usize)])
                        .filter(|v| *v != 0.0)
                } else {
                    None
                };
                a += 1;
            }
        }
    }
}

/// Absolute normalized cross-correlation over the voxels valid in both blocks.
///
/// Returns `None` when no voxel overlaps.
fn normalized_cross_correlation(target: &[Option<f64>], result: &[Option<f64>]) -> Option<f64> {
    let overlap = || {
        target
            .iter()
            .zip(result)
            .filter_map(|(t, r)| t.zip(*r))
    };

    let (mut target_mean, mut result_mean, mut n) = (0.0, 0.0, 0usize);
    for (t, r) in overlap() {
        target_mean += t;
        result_mean += r;
        n += 1;
    }
    if n == 0 {
        return None;
    }
    let count = n as f64;
    target_mean /= count;
    result_mean /= count;

    let (mut target_var, mut result_var, mut cc) = (0.0, 0.0, 0.0);
    for (t, r) in overlap() {
        let dt = t - target_mean;
        let dr = r - result_mean;
        target_var += dt * dt;
        result_var += dr * dr;
        cc += dt * dr;
    }
    let target_sd = (target_var / count).sqrt();
    let result_sd = (result_var / count).sqrt();
    Some((cc / (count * target_sd * result_sd)).abs())
}

/// Signed displacements visited along one axis.
fn search_range(radius: usize, step: usize) -> impl Iterator<Item = i64> + Clone {
    let r = radius as i64;
    (-r..r).step_by(step)
}

fn match_block(
    reference: &[f64],
    floating: &[f64],
    state: &BlockMatchingState,
    config: &BlockMatchingConfig,
    voxel_to_world: &DMat4,
    block_index: usize,
) -> BlockMatch {
    let layout = &state.layout;
    let size = state.size;
    let [x0, y0, z0] = layout.block_origin(block_index).map(|v| v as i64);

    let mut target_values = vec![None; layout.block_size()];
    let mut result_values = vec![None; layout.block_size()];
    gather_block(reference, size, layout, [x0, y0, z0], &mut target_values);

    let xy_range = search_range(config.search_radius, config.step_size);
    let z_range: Vec<i64> = if size.is_2d() {
        vec![0]
    } else {
        search_range(config.search_radius, config.step_size).collect()
    };

    let mut best_cc = 0.0;
    let mut best = [0i64; 3];
    for &n in &z_range {
        for m in xy_range.clone() {
            for l in xy_range.clone() {
                gather_block(
                    floating,
                    size,
                    layout,
                    [x0 + l, y0 + m, z0 + n],
                    &mut result_values,
                );
                if let Some(cc) = normalized_cross_correlation(&target_values, &result_values) {
                    if cc.is_finite() && cc > best_cc {
                        best_cc = cc;
                        best = [l, m, n];
                    }
                }
            }
        }
    }

    let origin = DVec3::new(x0 as f64, y0 as f64, z0 as f64);
    let displaced = origin + DVec3::new(best[0] as f64, best[1] as f64, best[2] as f64);
    BlockMatch {
        block_index,
        target: mat44::mat44_mul_point(voxel_to_world, origin),
        result: mat44::mat44_mul_point(voxel_to_world, displaced),
        correlation: best_cc,
    }
}

/// Find, for every active block of the reference, the best matching block of the floating image.
///
/// Each active block is compared with the floating image at every
/// displacement of the search window, visited z, y then x from the most
/// negative offset. The displacement with the strictly highest absolute
/// normalized cross-correlation wins, so the first maximum found is kept.
/// Block origins are mapped to world coordinates with the reference
/// voxel-to-world matrix.
///
/// # Arguments
///
/// * `reference` - The reference image the state was initialised on.
/// * `floating` - The floating image, with the same dimensions.
/// * `state` - The active block selection.
/// * `config` - The block matching parameters.
///
/// # Returns
///
/// The correspondences ordered by block index. Blocks whose search never
/// produced a positive correlation are left out when
/// `config.exclude_uncorrelated_blocks` is set; otherwise they are kept with
/// a zero displacement and a zero correlation.
pub fn block_matching(
    reference: &VolumetricImage,
    floating: &VolumetricImage,
    state: &BlockMatchingState,
    config: &BlockMatchingConfig,
) -> Result<CorrespondenceSet, BlockMatchingError> {
    config.validate()?;
    if reference.size() != floating.size() {
        return Err(BlockMatchingError::DimensionMismatch(
            reference.size(),
            floating.size(),
        ));
    }
    if reference.size() != state.size {
        return Err(BlockMatchingError::StateSizeMismatch(
            state.size,
            reference.size(),
        ));
    }
    if state.layout.width[0] != config.block_width {
        return Err(BlockMatchingError::InvalidConfig(
            "block_width differs from the initialised state",
        ));
    }

    let reference_values = reference.to_f64_vec();
    let floating_values = floating.to_f64_vec();
    let voxel_to_world = *reference.geometry().voxel_to_world();
    let active = state.active_block_indices();

    let matches = parallel::map_indexed(config.execution, active.len(), |i| {
        match_block(
            &reference_values,
            &floating_values,
            state,
            config,
            &voxel_to_world,
            active[i],
        )
    })?;

    let mut set = CorrespondenceSet::default();
    let mut uncorrelated = 0;
    for block in matches {
        if block.correlation > 0.0 || !config.exclude_uncorrelated_blocks {
            set.push(block);
        } else {
            uncorrelated += 1;
        }
    }

    if uncorrelated > 0 {
        log::debug!(
            "{} active block(s) found no correlated match and were excluded",
            uncorrelated
        );
    }
    log::debug!("Block matching produced {} correspondence(s)", set.len());

    Ok(set)
}
