use crate::image_operations::*;
use crate::normal_equation::NormalEquation;
use crate::patch::{PatchMask, PatchWindow};
use crate::types::*;

use super::{FeatureSolver, OpticalFlowMethod, TrackStatus};


/// `[[cos, sin], [-sin, cos]]`, applied to `(x, y) = (col, row)` coordinates.
#[inline]
pub fn rotation_matrix(theta: Float) -> Mat2 {
    let (sin_theta, cos_theta) = theta.sin_cos();
    Mat2::new(cos_theta, sin_theta, -sin_theta, cos_theta)
}

/// Derivative of the warped location w.r.t. `(theta, tx, ty)`.
///
/// Only the translation block is filled: the rotation column is zero, so the solved
/// rotation increment is always zero and the angle stays at its prior.
fn se2_jacobian() -> SMatrix<2, 3> {
    SMatrix::<2, 3>::new(
        0.0, 1.0, 0.0,
        0.0, 0.0, 1.0,
    )
}


/// Half central difference `(d/dx, d/dy)` from the four neighbours of a pixel.
#[inline]
fn central_difference(left: Float, right: Float, up: Float, down: Float) -> Vec2 {
    Vec2::new(0.5 * (right - left), 0.5 * (down - up))
}


/// Rigid (rotation + translation) KLT on mean-normalised intensities (LSSD).
///
/// The pose is absolute: every iteration recomputes the estimate as
/// `R(theta) * ref_pixel + translation`.
#[derive(Clone, Debug)]
pub struct RigidWarpSolver {
    window: PatchWindow,
    max_iteration: u32,
    max_converge_step: Float,
    method: OpticalFlowMethod,
    predicted_rotation: Float,
    mask: PatchMask,
    system: NormalEquation<3>,
}

impl RigidWarpSolver {
    pub fn new(
        window: PatchWindow,
        max_iteration: u32,
        max_converge_step: Float,
        method: OpticalFlowMethod,
    ) -> Self {
        Self {
            window,
            max_iteration,
            max_converge_step,
            method,
            predicted_rotation: 0.0,
            mask: PatchMask::new(window),
            system: NormalEquation::default(),
        }
    }

    pub fn reserve(&mut self, window: PatchWindow) {
        self.window = window;
        self.mask.reserve(window);
    }

    /// Angle every feature starts from.
    pub fn set_predicted_rotation(&mut self, theta: Float) {
        self.predicted_rotation = theta;
    }

    pub fn predicted_rotation(&self) -> Float {
        self.predicted_rotation
    }

    fn construct_incremental_function<I: IntensityImage>(
        &mut self,
        ref_image: &I,
        cur_image: &I,
        ref_pixel: &Vec2,
        rotation: &Mat2,
        translation: &Vec2,
    ) -> usize {
        self.system.reset();
        self.mask.clear();
        let direct = self.method == OpticalFlowMethod::Direct;
        let locate = |drow: i32, dcol: i32| {
            let ref_location = ref_pixel + Vec2::new(dcol as Float, drow as Float);
            let cur_location = rotation * ref_location + translation;
            (ref_location, cur_location)
        };

        // Validity, patch means and mean gradient.
        let mut ref_sum = 0.0;
        let mut cur_sum = 0.0;
        let mut gradient_sum = Vec2::zeros();
        let mut valid_pixel_num = 0;
        for (drow, dcol) in self.window.offsets() {
            let (ref_location, cur_location) = locate(drow, dcol);
            let (gradient_image, gradient_location) =
                if direct { (cur_image, cur_location) } else { (ref_image, ref_location) };
            let (row_g, col_g) = (gradient_location.y, gradient_location.x);

            let samples = (
                gradient_image.sample(row_g, col_g - 1.0),
                gradient_image.sample(row_g, col_g + 1.0),
                gradient_image.sample(row_g - 1.0, col_g),
                gradient_image.sample(row_g + 1.0, col_g),
                ref_image.sample(ref_location.y, ref_location.x),
                cur_image.sample(cur_location.y, cur_location.x),
            );
            if let (Some(left), Some(right), Some(up), Some(down), Some(ref_value), Some(cur_value)) = samples {
                gradient_sum += central_difference(left, right, up, down);
                ref_sum += ref_value;
                cur_sum += cur_value;
                valid_pixel_num += 1;
                self.mask.push(true);
            } else {
                self.mask.push(false);
            }
        }
        if valid_pixel_num == 0 {
            return 0;
        }
        let ref_mean = ref_sum / valid_pixel_num as Float;
        let cur_mean = cur_sum / valid_pixel_num as Float;
        let gradient_mean = if direct { cur_mean } else { ref_mean };
        let mean_gradient = gradient_sum / valid_pixel_num as Float;

        let jacobian_se2 = se2_jacobian();
        for (index, (drow, dcol)) in self.window.offsets().enumerate() {
            if !self.mask.is_valid(index) {
                continue;
            }
            let (ref_location, cur_location) = locate(drow, dcol);
            let (gradient_image, gradient_location) =
                if direct { (cur_image, cur_location) } else { (ref_image, ref_location) };
            let (row_g, col_g) = (gradient_location.y, gradient_location.x);

            let gradient = central_difference(
                gradient_image.sample_unchecked(row_g, col_g - 1.0),
                gradient_image.sample_unchecked(row_g, col_g + 1.0),
                gradient_image.sample_unchecked(row_g - 1.0, col_g),
                gradient_image.sample_unchecked(row_g + 1.0, col_g),
            );
            let ref_value = ref_image.sample_unchecked(ref_location.y, ref_location.x);
            let cur_value = cur_image.sample_unchecked(cur_location.y, cur_location.x);
            let gradient_value = if direct { cur_value } else { ref_value };

            // d(I / mean(I)) = (dI - I / mean(I) * mean(dI)) / mean(I)
            let jacobian_pixel =
                ((gradient - mean_gradient * (gradient_value / gradient_mean)) / gradient_mean).transpose();
            let jacobian: SVector<3> = (jacobian_pixel * jacobian_se2).transpose();
            let residual = cur_value / cur_mean - ref_value / ref_mean;
            self.system.accumulate(&jacobian, residual);
        }

        self.system.symmetrize();
        valid_pixel_num
    }
}

impl FeatureSolver for RigidWarpSolver {
    fn track_feature<I: IntensityImage>(
        &mut self,
        ref_image: &I,
        cur_image: &I,
        ref_pixel: &Vec2,
        cur_pixel: &mut Vec2,
        status: &mut TrackStatus,
    ) -> u32 {
        let mut theta = self.predicted_rotation;
        let mut rotation = rotation_matrix(theta);
        // Start from the caller's estimate: the centre maps onto `cur_pixel`.
        // A fresh estimate equal to `ref_pixel` with a zero prior gives a zero seed.
        let mut translation = *cur_pixel - rotation * ref_pixel;
        let mut iterations = 0;

        for _ in 0..self.max_iteration {
            let valid_pixel_num =
                self.construct_incremental_function(ref_image, cur_image, ref_pixel, &rotation, &translation);
            if valid_pixel_num == 0 {
                log::trace!("no valid pixel around {:?}, stop iterating", cur_pixel);
                break;
            }

            let z = self.system.solve();
            iterations += 1;
            if z.iter().any(|v| !v.is_finite()) {
                *status = TrackStatus::NumericError;
                break;
            }

            theta += z[0];
            translation += z.fixed_rows::<2>(1);
            rotation = rotation_matrix(theta);
            *cur_pixel = rotation * ref_pixel + translation;

            if !contains_pixel(cur_image, cur_pixel) {
                *status = TrackStatus::OutsideImage;
                break;
            }
            if z.norm_squared() < self.max_converge_step {
                *status = TrackStatus::Tracked;
                break;
            }
        }

        iterations
    }
}
