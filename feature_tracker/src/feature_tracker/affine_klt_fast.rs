use crate::image_operations::*;
use crate::normal_equation::NormalEquation;
use crate::patch::{ExtendedPatch, PatchDerivatives, PatchWindow};
use crate::types::*;

use super::{affine_displacement, affine_jacobian, compose_affine, FeatureSolver, TrackStatus};


/// Inverse compositional affine KLT.
///
/// The reference patch, its derivatives and the Hessian are computed once per feature;
/// each iteration only resamples the current image to rebuild the bias. Jacobian
/// coordinates are those of the patch pixels around the initial estimate, so the cached
/// Hessian and the per-iteration bias live in the same frame.
#[derive(Clone, Debug)]
pub struct AffineWarpSolverFast {
    window: PatchWindow,
    max_iteration: u32,
    max_converge_step: Float,
    max_tolerance_large_step: u32,
    patch: ExtendedPatch,
    derivatives: PatchDerivatives,
    system: NormalEquation<6>,
}

impl AffineWarpSolverFast {
    pub fn new(
        window: PatchWindow,
        max_iteration: u32,
        max_converge_step: Float,
        max_tolerance_large_step: u32,
    ) -> Self {
        Self {
            window,
            max_iteration,
            max_converge_step,
            max_tolerance_large_step,
            patch: ExtendedPatch::new(window),
            derivatives: PatchDerivatives::new(window),
            system: NormalEquation::default(),
        }
    }

    /// Size the scratch buffers for `window`. They are only cleared between features.
    pub fn reserve(&mut self, window: PatchWindow) {
        self.window = window;
        self.patch.reserve(window);
        self.derivatives.reserve(window);
    }

    fn precompute_hessian(&mut self, anchor: &Vec2) {
        self.system.reset();
        for (index, (drow, dcol)) in self.window.offsets().enumerate() {
            if let Some((dx, dy)) = self.derivatives.get(index) {
                let x = anchor.x + dcol as Float;
                let y = anchor.y + drow as Float;
                self.system.accumulate_hessian(&affine_jacobian(x, y, dx, dy));
            }
        }
        self.system.symmetrize();
    }

    /// Rebuild the bias from the current image. Returns the number of contributing pixels.
    fn compute_bias<I: IntensityImage>(
        &mut self,
        cur_image: &I,
        cur_pixel: &Vec2,
        anchor: &Vec2,
        affine: &Mat2,
    ) -> usize {
        let Self { window, patch, derivatives, system, .. } = self;
        system.reset_bias();

        if warped_window_inside(cur_image, *window, cur_pixel, affine) {
            accumulate_bias(*window, patch, derivatives, system, cur_pixel, anchor, affine,
                |row, col| Some(cur_image.sample_unchecked(row, col)))
        } else {
            accumulate_bias(*window, patch, derivatives, system, cur_pixel, anchor, affine,
                |row, col| cur_image.sample(row, col))
        }
    }
}

/// Whether every sample of the warped window keeps its 2x2 stencil in the image, i.e.
/// its floor lies in `[0, width-2] x [0, height-2]`. The warp is linear, so the corners
/// bound the whole window.
fn warped_window_inside<I: IntensityImage>(
    cur_image: &I,
    window: PatchWindow,
    cur_pixel: &Vec2,
    affine: &Mat2,
) -> bool {
    let max_row = cur_image.height() as Float - 2.0;
    let max_col = cur_image.width() as Float - 2.0;
    let row_half = window.row_half_size as Float;
    let col_half = window.col_half_size as Float;

    [(-row_half, -col_half), (-row_half, col_half), (row_half, -col_half), (row_half, col_half)]
        .iter()
        .all(|&(drow, dcol)| {
            let corner = cur_pixel + affine * Vec2::new(dcol, drow);
            let (row, col) = (corner.y.floor(), corner.x.floor());
            row >= 0.0 && row <= max_row && col >= 0.0 && col <= max_col
        })
}

#[allow(clippy::too_many_arguments)]
fn accumulate_bias<F>(
    window: PatchWindow,
    patch: &ExtendedPatch,
    derivatives: &PatchDerivatives,
    system: &mut NormalEquation<6>,
    cur_pixel: &Vec2,
    anchor: &Vec2,
    affine: &Mat2,
    sample: F,
) -> usize
where
    F: Fn(Float, Float) -> Option<Float>,
{
    let cols = window.cols();
    let mut valid_pixel_num = 0;
    for (index, (drow, dcol)) in window.offsets().enumerate() {
        let Some((dx, dy)) = derivatives.get(index) else {
            continue;
        };
        let offset = Vec2::new(dcol as Float, drow as Float);
        let warped = cur_pixel + affine * offset;
        let Some(cur_value) = sample(warped.y, warped.x) else {
            continue;
        };

        let ref_value = patch.value(patch.ex_index(index / cols, index % cols));
        let dt = cur_value - ref_value;
        let jacobian = affine_jacobian(anchor.x + offset.x, anchor.y + offset.y, dx, dy);
        system.accumulate_bias(&jacobian, dt);
        valid_pixel_num += 1;
    }
    valid_pixel_num
}

impl FeatureSolver for AffineWarpSolverFast {
    fn track_feature<I: IntensityImage>(
        &mut self,
        ref_image: &I,
        cur_image: &I,
        ref_pixel: &Vec2,
        cur_pixel: &mut Vec2,
        status: &mut TrackStatus,
    ) -> u32 {
        if self.patch.extract(ref_image, ref_pixel) == 0 {
            *status = TrackStatus::OutsideImage;
            return 0;
        }
        self.derivatives.compute(&self.patch);
        let anchor = *cur_pixel;
        self.precompute_hessian(&anchor);

        let mut affine = Mat2::identity();
        let mut last_squared_step = Float::INFINITY;
        let mut large_step_count = 0;
        let mut iterations = 0;

        for _ in 0..self.max_iteration {
            if self.compute_bias(cur_image, cur_pixel, &anchor, &affine) == 0 {
                break;
            }

            let z = self.system.solve();
            iterations += 1;
            if z.iter().any(|v| !v.is_finite()) {
                *status = TrackStatus::NumericError;
                break;
            }

            let v = affine_displacement(&z, cur_pixel);
            *cur_pixel += v;
            compose_affine(&mut affine, &z);

            let squared_step = v.norm_squared();
            if squared_step < last_squared_step {
                last_squared_step = squared_step;
                large_step_count = 0;
            } else {
                large_step_count += 1;
                if large_step_count >= self.max_tolerance_large_step {
                    log::trace!("step stagnates at {squared_step} after {iterations} iterations");
                    break;
                }
            }
            if squared_step < self.max_converge_step {
                *status = TrackStatus::Tracked;
                break;
            }
        }

        if *status != TrackStatus::NumericError && !contains_pixel(cur_image, cur_pixel) {
            *status = TrackStatus::OutsideImage;
        }
        iterations
    }
}
