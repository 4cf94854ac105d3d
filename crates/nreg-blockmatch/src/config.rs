use nreg_image::ExecutionStrategy;
use serde::{Deserialize, Serialize};

use crate::error::{BlockMatchingError, EstimationError};

/// Parameters of the block matching stage.
///
/// Missing fields take their default values when deserialized.
///
/// # Examples
///
/// ```
/// use nreg_blockmatch::BlockMatchingConfig;
///
/// let config: BlockMatchingConfig =
///     serde_json::from_str(r#"{ "percent_to_keep_blocks": 30 }"#).unwrap();
///
/// assert_eq!(config.percent_to_keep_blocks, 30);
/// assert_eq!(config.block_width, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockMatchingConfig {
    /// Percentage of all blocks to activate, highest variance first.
    pub percent_to_keep_blocks: usize,
    /// Percentage of correspondences kept by each trimmed least-squares iteration.
    pub percent_to_keep_points: usize,
    /// Block edge length in voxels.
    pub block_width: usize,
    /// Displacements are searched in `[-search_radius, search_radius)` along each axis.
    pub search_radius: usize,
    /// Stride of the displacement search.
    pub step_size: usize,
    /// Drop blocks whose search never found a positive correlation.
    pub exclude_uncorrelated_blocks: bool,
    /// How the per-block loops are executed.
    pub execution: ExecutionStrategy,
}

impl Default for BlockMatchingConfig {
    fn default() -> Self {
        Self {
            percent_to_keep_blocks: 50,
            percent_to_keep_points: 50,
            block_width: 4,
            search_radius: 3,
            step_size: 1,
            exclude_uncorrelated_blocks: true,
            execution: ExecutionStrategy::default(),
        }
    }
}

impl BlockMatchingConfig {
    pub(crate) fn validate(&self) -> Result<(), BlockMatchingError> {
        if self.block_width == 0 {
            return Err(BlockMatchingError::InvalidConfig("block_width must be > 0"));
        }
        if self.step_size == 0 {
            return Err(BlockMatchingError::InvalidConfig("step_size must be > 0"));
        }
        if self.percent_to_keep_blocks > 100 {
            return Err(BlockMatchingError::InvalidConfig(
                "percent_to_keep_blocks must be <= 100",
            ));
        }
        Ok(())
    }
}

/// Parameters of the trimmed least-squares refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimmedFitConfig {
    /// Percentage of pairs with the smallest residual kept at each iteration.
    pub percent_to_keep: usize,
    /// Number of trimming iterations.
    pub max_iterations: usize,
    /// Stop early once the summed squared residual of the kept pairs changes
    /// by less than this amount between two iterations.
    pub convergence_tolerance: Option<f64>,
}

impl Default for TrimmedFitConfig {
    fn default() -> Self {
        Self {
            percent_to_keep: 50,
            max_iterations: 30,
            convergence_tolerance: None,
        }
    }
}

impl TrimmedFitConfig {
    pub(crate) fn validate(&self) -> Result<(), EstimationError> {
        if self.percent_to_keep == 0 || self.percent_to_keep > 100 {
            return Err(EstimationError::InvalidPercent(self.percent_to_keep));
        }
        Ok(())
    }
}

impl From<&BlockMatchingConfig> for TrimmedFitConfig {
    fn from(config: &BlockMatchingConfig) -> Self {
        Self {
            percent_to_keep: config.percent_to_keep_points,
            ..Default::default()
        }
    }
}
