pub mod affine_klt;
pub mod affine_klt_fast;
pub mod lssd_klt;
pub mod feature_tracking;
mod tests;

use serde::{Deserialize, Serialize};

use crate::image_operations::IntensityImage;
use crate::patch::PatchWindow;
use crate::types::*;

pub use affine_klt::AffineWarpSolver;
pub use affine_klt_fast::AffineWarpSolverFast;
pub use lssd_klt::RigidWarpSolver;
pub use feature_tracking::OpticalFlowTracker;


/// Outcome of tracking one feature.
///
/// Every value above `Tracked` is a terminal failure: a later call on the same
/// feature leaves it untouched.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrackStatus {
    #[default]
    NotTracked = 0,
    Tracked = 1,
    OutsideImage = 2,
    LargeResidual = 3,
    NumericError = 4,
}

impl TrackStatus {
    #[inline]
    pub fn is_terminal_failure(self) -> bool {
        self > TrackStatus::Tracked
    }
}


/// Where the image gradient is sampled.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpticalFlowMethod {
    /// Gradient of the current image at the warped location, recomputed every iteration.
    Direct,
    /// Gradient of the reference image at the fixed reference location.
    Inverse,
    /// Inverse compositional with a Hessian cached once per feature.
    #[default]
    Fast,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarpModel {
    /// 2x2 linear map plus translation.
    #[default]
    Affine,
    /// Rotation plus translation with mean-normalised intensities (LSSD).
    Rigid,
}


#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OpticalFlowOptions {
    pub patch_row_half_size: u32,
    pub patch_col_half_size: u32,
    pub max_iteration: u32,
    /// Squared displacement (pixels^2) under which an iteration counts as converged.
    pub max_converge_step: Float,
    pub method: OpticalFlowMethod,
    pub warp_model: WarpModel,
    /// Features beyond this index are ignored by a tracking call.
    pub max_track_points_number: usize,
    /// Consecutive non-improving steps tolerated by the fast solver.
    pub max_tolerance_large_step: u32,
}

impl Default for OpticalFlowOptions {
    fn default() -> Self {
        OpticalFlowOptions {
            patch_row_half_size: 6,
            patch_col_half_size: 6,
            max_iteration: 30,
            max_converge_step: 1e-4,
            method: OpticalFlowMethod::Fast,
            warp_model: WarpModel::Affine,
            max_track_points_number: 200,
            max_tolerance_large_step: 3,
        }
    }
}

impl OpticalFlowOptions {
    pub fn patch_window(&self) -> PatchWindow {
        PatchWindow::new(self.patch_row_half_size, self.patch_col_half_size)
    }
}


/// One tracking strategy, run on a single feature at a single pyramid level.
pub trait FeatureSolver {
    /// Refine `cur_pixel` so the patch around it in `cur_image` matches the patch around
    /// `ref_pixel` in `ref_image`, and record the outcome in `status`.
    ///
    /// `status` is left at `NotTracked` when the iteration budget runs out; the batch
    /// entry point resolves that to `LargeResidual`. Returns the number of increments
    /// solved.
    fn track_feature<I: IntensityImage>(
        &mut self,
        ref_image: &I,
        cur_image: &I,
        ref_pixel: &Vec2,
        cur_pixel: &mut Vec2,
        status: &mut TrackStatus,
    ) -> u32;
}


/// Affine jacobian row `[x*fx, x*fy, y*fx, y*fy, fx, fy]` of a pixel at `(x, y)`.
#[inline]
pub(crate) fn affine_jacobian(x: Float, y: Float, fx: Float, fy: Float) -> SVector<6> {
    SVector::<6>::from([x * fx, x * fy, y * fx, y * fy, fx, fy])
}

/// Displacement of `pixel` under the affine increment `z`.
#[inline]
pub(crate) fn affine_displacement(z: &SVector<6>, pixel: &Vec2) -> Vec2 {
    z.fixed_rows::<2>(0) * pixel.x + z.fixed_rows::<2>(2) * pixel.y + z.fixed_rows::<2>(4)
}

/// Fold the linear part of `z` into the running affine matrix.
#[inline]
pub(crate) fn compose_affine(affine: &mut Mat2, z: &SVector<6>) {
    let mut col0 = affine.column_mut(0);
    col0 += z.fixed_rows::<2>(0);
    let mut col1 = affine.column_mut(1);
    col1 += z.fixed_rows::<2>(2);
}
