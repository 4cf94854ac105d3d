use nreg_image::ExecutionStrategy;
use serde::{Deserialize, Serialize};

/// Per-site penalty applied to the Jacobian determinant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PenaltyKind {
    /// `log(det)^2`.
    #[default]
    SquaredLog,
    /// `|log(det)|`.
    AbsoluteLog,
}

impl PenaltyKind {
    /// Penalty of a single positive determinant.
    #[inline]
    pub fn value(&self, det: f64) -> f64 {
        let log_det = det.ln();
        match self {
            PenaltyKind::SquaredLog => log_det * log_det,
            PenaltyKind::AbsoluteLog => log_det.abs(),
        }
    }

    /// Derivative of [`Self::value`] with respect to the determinant.
    ///
    /// The absolute mode uses a zero subgradient at `det == 1`.
    #[inline]
    pub fn derivative(&self, det: f64) -> f64 {
        let log_det = det.ln();
        match self {
            PenaltyKind::SquaredLog => 2.0 * log_det / det,
            PenaltyKind::AbsoluteLog => {
                if log_det > 0.0 {
                    1.0 / det
                } else if log_det < 0.0 {
                    -1.0 / det
                } else {
                    0.0
                }
            }
        }
    }
}

/// Parameters shared by the Jacobian operations.
///
/// # Examples
///
/// ```
/// use nreg_spline::{JacobianConfig, PenaltyKind};
///
/// let config: JacobianConfig = serde_json::from_str(r#"{ "penalty": "AbsoluteLog" }"#).unwrap();
///
/// assert_eq!(config.penalty, PenaltyKind::AbsoluteLog);
/// assert!(config.fast_path);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JacobianConfig {
    /// Penalty applied to each determinant.
    pub penalty: PenaltyKind,
    /// How the per-site and per-control-point loops are executed.
    pub execution: ExecutionStrategy,
    /// Use the separable tensor contraction for 3D sites.
    pub fast_path: bool,
}

impl Default for JacobianConfig {
    fn default() -> Self {
        Self {
            penalty: PenaltyKind::default(),
            execution: ExecutionStrategy::default(),
            fast_path: true,
        }
    }
}
