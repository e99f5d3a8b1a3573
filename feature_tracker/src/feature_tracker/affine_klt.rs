use crate::image_operations::*;
use crate::normal_equation::NormalEquation;
use crate::patch::PatchWindow;
use crate::types::*;

use super::{
    affine_displacement, affine_jacobian, compose_affine,
    FeatureSolver, OpticalFlowMethod, TrackStatus,
};


/// Affine KLT rebuilding the full 6x6 system at every iteration.
///
/// With `OpticalFlowMethod::Direct` gradients come from the current image at the warped
/// location, otherwise from the reference image at the fixed reference location.
#[derive(Clone, Debug)]
pub struct AffineWarpSolver {
    window: PatchWindow,
    max_iteration: u32,
    max_converge_step: Float,
    method: OpticalFlowMethod,
    system: NormalEquation<6>,
}

impl AffineWarpSolver {
    pub fn new(
        window: PatchWindow,
        max_iteration: u32,
        max_converge_step: Float,
        method: OpticalFlowMethod,
    ) -> Self {
        Self { window, max_iteration, max_converge_step, method, system: NormalEquation::default() }
    }

    /// Rebuild the normal equations for the current estimate. Returns the number of
    /// patch pixels whose six samples were all available.
    fn construct_incremental_function<I: IntensityImage>(
        &mut self,
        ref_image: &I,
        cur_image: &I,
        ref_pixel: &Vec2,
        cur_pixel: &Vec2,
        affine: &Mat2,
    ) -> usize {
        self.system.reset();
        let direct = self.method == OpticalFlowMethod::Direct;

        let mut valid_pixel_num = 0;
        for (drow, dcol) in self.window.offsets() {
            let row_i = ref_pixel.y + drow as Float;
            let col_i = ref_pixel.x + dcol as Float;
            let warped = cur_pixel + affine * Vec2::new(dcol as Float, drow as Float);
            let (row_j, col_j) = (warped.y, warped.x);

            let (gradient_image, row_g, col_g) = if direct {
                (cur_image, row_j, col_j)
            } else {
                (ref_image, row_i, col_i)
            };
            let samples = (
                gradient_image.sample(row_g, col_g - 1.0),
                gradient_image.sample(row_g, col_g + 1.0),
                gradient_image.sample(row_g - 1.0, col_g),
                gradient_image.sample(row_g + 1.0, col_g),
                ref_image.sample(row_i, col_i),
                cur_image.sample(row_j, col_j),
            );
            let (Some(left), Some(right), Some(top), Some(bottom), Some(ref_value), Some(cur_value)) = samples
            else {
                continue;
            };

            let fx = right - left;
            let fy = bottom - top;
            let ft = cur_value - ref_value;
            let jacobian = affine_jacobian(col_j, row_j, fx, fy);
            self.system.accumulate(&jacobian, ft);
            valid_pixel_num += 1;
        }

        self.system.symmetrize();
        valid_pixel_num
    }
}

impl FeatureSolver for AffineWarpSolver {
    fn track_feature<I: IntensityImage>(
        &mut self,
        ref_image: &I,
        cur_image: &I,
        ref_pixel: &Vec2,
        cur_pixel: &mut Vec2,
        status: &mut TrackStatus,
    ) -> u32 {
        let mut affine = Mat2::identity();
        let mut iterations = 0;

        for _ in 0..self.max_iteration {
            let valid_pixel_num =
                self.construct_incremental_function(ref_image, cur_image, ref_pixel, cur_pixel, &affine);
            if valid_pixel_num == 0 {
                log::trace!("no valid pixel around {:?}, stop iterating", cur_pixel);
                break;
            }

            let z = self.system.solve();
            iterations += 1;
            let v = affine_displacement(&z, cur_pixel);
            if !v.x.is_finite() || !v.y.is_finite() {
                *status = TrackStatus::NumericError;
                break;
            }

            *cur_pixel += v;
            compose_affine(&mut affine, &z);

            if !contains_pixel(cur_image, cur_pixel) {
                *status = TrackStatus::OutsideImage;
                break;
            }
            if v.norm_squared() < self.max_converge_step {
                *status = TrackStatus::Tracked;
                break;
            }
        }

        iterations
    }
}
