use nreg_image::{parallel, Mask, VolumeSize, VolumetricImage};

use crate::{config::BlockMatchingConfig, error::BlockMatchingError};

/// Regular decomposition of a volume into blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    /// Block edge length along each axis; 1 along z for 2D volumes.
    pub width: [usize; 3],
    /// Number of blocks along each axis, `ceil(n / width)`.
    pub count: [usize; 3],
}

impl BlockLayout {
    /// Lay blocks of edge `block_width` over `size`. Single-slice volumes get flat blocks.
    pub fn new(size: VolumeSize, block_width: usize) -> Self {
        let wz = if size.is_2d() { 1 } else { block_width };
        let width = [block_width, block_width, wz];
        let count = [
            size.nx.div_ceil(width[0]),
            size.ny.div_ceil(width[1]),
            size.nz.div_ceil(width[2]),
        ];
        Self { width, count }
    }

    /// Voxels in one block.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.width[0] * self.width[1] * self.width[2]
    }

    /// Total number of blocks.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.count[0] * self.count[1] * self.count[2]
    }

    /// Voxel coordinates of the first voxel of a block.
    #[inline]
    pub fn block_origin(&self, block_index: usize) -> [usize; 3] {
        let plane = self.count[0] * self.count[1];
        let i = block_index % self.count[0];
        let j = (block_index % plane) / self.count[0];
        let k = block_index / plane;
        [i * self.width[0], j * self.width[1], k * self.width[2]]
    }
}

/// Active block selection for a reference image.
///
/// Recomputed from scratch by every call to [`BlockMatchingState::initialise`].
#[derive(Debug, Clone, PartialEq)]
pub struct BlockMatchingState {
    /// Size of the image the blocks were laid over.
    pub size: VolumeSize,
    /// The block decomposition.
    pub layout: BlockLayout,
    /// Per-block dense active index, `-1` for inactive blocks.
    pub active_blocks: Vec<i32>,
    /// Number of active blocks.
    pub active_block_number: usize,
}

impl BlockMatchingState {
    /// Select the most informative blocks of `reference`.
    ///
    /// A block is usable when more than half of its voxels lie inside the
    /// image, inside the mask and are non-zero. Among the usable blocks the
    /// `percent_to_keep_blocks` percent (of all blocks) with the highest
    /// intensity variance are activated. Active blocks are numbered densely in
    /// ascending block index order.
    ///
    /// # Arguments
    ///
    /// * `reference` - The reference image.
    /// * `config` - The block matching parameters.
    /// * `mask` - Optional inclusion mask with the size of the reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the mask size does
    /// not match the reference.
    pub fn initialise(
        reference: &VolumetricImage,
        config: &BlockMatchingConfig,
        mask: Option<&Mask>,
    ) -> Result<Self, BlockMatchingError> {
        config.validate()?;
        let size = reference.size();
        if let Some(mask) = mask {
            if mask.size() != size {
                return Err(BlockMatchingError::MaskSizeMismatch(mask.size(), size));
            }
        }

        let layout = BlockLayout::new(size, config.block_width);
        let total = layout.block_count();
        let values = reference.to_f64_vec();

        let variances = parallel::map_indexed(config.execution, total, |block| {
            block_variance(&values, size, &layout, block, mask)
        })?;

        let mut ranked: Vec<(f64, usize)> = variances
            .iter()
            .enumerate()
            .filter_map(|(block, variance)| variance.map(|v| (v, block)))
            .collect();
        let usable = ranked.len();
        let active_block_number = (total * config.percent_to_keep_blocks / 100).min(usable);

        ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut is_active = vec![false; total];
        for &(_, block) in ranked.iter().take(active_block_number) {
            is_active[block] = true;
        }

        let mut count = 0;
        let active_blocks = is_active
            .into_iter()
            .map(|active| {
                if active {
                    count += 1;
                    count - 1
                } else {
                    -1
                }
            })
            .collect();

        log::info!(
            "There are {} active block(s) out of {} ({} unusable)",
            active_block_number,
            total,
            total - usable
        );

        Ok(Self {
            size,
            layout,
            active_blocks,
            active_block_number,
        })
    }

    /// Block indices of the active blocks in ascending order.
    pub fn active_block_indices(&self) -> Vec<usize> {
        self.active_blocks
            .iter()
            .enumerate()
            .filter(|&(_, &a)| a >= 0)
            .map(|(block, _)| block)
            .collect()
    }
}

/// Intensity variance of a block, or `None` when too few voxels are valid.
fn block_variance(
    values: &[f64],
    size: VolumeSize,
    layout: &BlockLayout,
    block: usize,
    mask: Option<&Mask>,
) -> Option<f64> {
    let [x0, y0, z0] = layout.block_origin(block);
    let mut valid = Vec::with_capacity(layout.block_size());
    for z in z0..(z0 + layout.width[2]).min(size.nz) {
        for y in y0..(y0 + layout.width[1]).min(size.ny) {
            for x in x0..(x0 + layout.width[0]).min(size.nx) {
                let index = size.index(x, y, z);
                if mask.is_some_and(|m| !m.is_included(index)) {
                    continue;
                }
                let value = values[index];
                if value != 0.0 {
                    valid.push(value);
                }
            }
        }
    }

    if 2 * valid.len() <= layout.block_size() {
        return None;
    }

    let n = valid.len() as f64;
    let mean = valid.iter().sum::<f64>() / n;
    let variance = valid.iter().map(|v| (mean - v) * (mean - v)).sum::<f64>() / n;
    Some(variance)
}
