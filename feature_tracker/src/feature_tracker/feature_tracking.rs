use rayon::prelude::*;

use crate::image_operations::IntensityImage;
use crate::types::*;

use super::{
    AffineWarpSolver, AffineWarpSolverFast, FeatureSolver, OpticalFlowMethod, OpticalFlowOptions,
    RigidWarpSolver, TrackStatus, WarpModel,
};


/// Solver selected by `(warp_model, method)`, resolved once per batch.
#[derive(Clone, Debug)]
enum KltSolver {
    Affine(AffineWarpSolver),
    AffineFast(AffineWarpSolverFast),
    Rigid(RigidWarpSolver),
}

impl KltSolver {
    fn new(options: &OpticalFlowOptions, predicted_rotation: Float) -> Self {
        match (options.warp_model, options.method) {
            (WarpModel::Rigid, method) => {
                let mut solver = rigid_solver(options, method);
                solver.set_predicted_rotation(predicted_rotation);
                KltSolver::Rigid(solver)
            }
            (WarpModel::Affine, OpticalFlowMethod::Fast) => KltSolver::AffineFast(fast_solver(options)),
            (WarpModel::Affine, method) => KltSolver::Affine(affine_solver(options, method)),
        }
    }
}

fn affine_solver(options: &OpticalFlowOptions, method: OpticalFlowMethod) -> AffineWarpSolver {
    AffineWarpSolver::new(options.patch_window(), options.max_iteration, options.max_converge_step, method)
}

fn fast_solver(options: &OpticalFlowOptions) -> AffineWarpSolverFast {
    let mut solver = AffineWarpSolverFast::new(
        options.patch_window(),
        options.max_iteration,
        options.max_converge_step,
        options.max_tolerance_large_step,
    );
    solver.reserve(options.patch_window());
    solver
}

fn rigid_solver(options: &OpticalFlowOptions, method: OpticalFlowMethod) -> RigidWarpSolver {
    let mut solver =
        RigidWarpSolver::new(options.patch_window(), options.max_iteration, options.max_converge_step, method);
    solver.reserve(options.patch_window());
    solver
}


/// Single pyramid level KLT over a batch of features.
///
/// Features are given as parallel slices indexed by feature id. Failures are only
/// reported through the status slice: a feature already in a terminal failure state is
/// left untouched, and a feature whose solver ran out of iterations ends as
/// `LargeResidual`.
#[derive(Clone, Debug)]
pub struct OpticalFlowTracker {
    options: OpticalFlowOptions,
    predicted_rotation: Float,
    solver: Option<KltSolver>,
}

impl OpticalFlowTracker {
    pub fn new(options: OpticalFlowOptions) -> Self {
        Self { options, predicted_rotation: 0.0, solver: None }
    }

    pub fn options(&self) -> &OpticalFlowOptions {
        &self.options
    }

    /// Replace the options. The solver has to be prepared again.
    pub fn set_options(&mut self, options: OpticalFlowOptions) {
        self.options = options;
        self.solver = None;
    }

    pub fn is_prepared(&self) -> bool {
        self.solver.is_some()
    }

    /// Build the solver for the configured mode and size its scratch buffers.
    pub fn prepare_for_tracking(&mut self) {
        log::debug!(
            "prepare {:?}/{:?} tracking, patch {}x{}",
            self.options.warp_model,
            self.options.method,
            self.options.patch_window().rows(),
            self.options.patch_window().cols(),
        );
        self.solver = Some(KltSolver::new(&self.options, self.predicted_rotation));
    }

    /// Rotation prior of the rigid warp, in radians.
    pub fn set_predicted_rotation(&mut self, theta: Float) {
        self.predicted_rotation = theta;
        if let Some(KltSolver::Rigid(solver)) = self.solver.as_mut() {
            solver.set_predicted_rotation(theta);
        }
    }

    fn feature_count(&self, ref_pixels: &[Vec2], cur_pixels: &[Vec2], status: &[TrackStatus]) -> usize {
        ref_pixels.len()
            .min(cur_pixels.len())
            .min(status.len())
            .min(self.options.max_track_points_number)
    }

    /// Track every feature on one level. Always returns `true`.
    pub fn track_single_level<I: IntensityImage>(
        &mut self,
        ref_image: &I,
        cur_image: &I,
        ref_pixels: &[Vec2],
        cur_pixels: &mut [Vec2],
        status: &mut [TrackStatus],
    ) -> bool {
        if self.solver.is_none() {
            log::warn!("track_single_level called before prepare_for_tracking, preparing now");
            self.prepare_for_tracking();
        }

        let n = self.feature_count(ref_pixels, cur_pixels, status);
        let (ref_pixels, cur_pixels, status) = (&ref_pixels[..n], &mut cur_pixels[..n], &mut status[..n]);

        match self.solver.as_mut() {
            Some(KltSolver::Affine(solver)) => track_batch(solver, ref_image, cur_image, ref_pixels, cur_pixels, status),
            Some(KltSolver::AffineFast(solver)) => track_batch(solver, ref_image, cur_image, ref_pixels, cur_pixels, status),
            Some(KltSolver::Rigid(solver)) => track_batch(solver, ref_image, cur_image, ref_pixels, cur_pixels, status),
            None => {}
        }

        log_summary(status);
        true
    }

    /// Same per-feature semantics as `track_single_level`, with features spread over the
    /// rayon pool. Each worker owns its own solver.
    pub fn track_single_level_parallel<I: IntensityImage>(
        &self,
        ref_image: &I,
        cur_image: &I,
        ref_pixels: &[Vec2],
        cur_pixels: &mut [Vec2],
        status: &mut [TrackStatus],
    ) -> bool {
        let n = self.feature_count(ref_pixels, cur_pixels, status);
        let (ref_pixels, cur_pixels, status) = (&ref_pixels[..n], &mut cur_pixels[..n], &mut status[..n]);
        let options = &self.options;

        match (options.warp_model, options.method) {
            (WarpModel::Rigid, method) => {
                let theta = self.predicted_rotation;
                let make = || {
                    let mut solver = rigid_solver(options, method);
                    solver.set_predicted_rotation(theta);
                    solver
                };
                track_batch_parallel(make, ref_image, cur_image, ref_pixels, cur_pixels, status)
            }
            (WarpModel::Affine, OpticalFlowMethod::Fast) => {
                track_batch_parallel(|| fast_solver(options), ref_image, cur_image, ref_pixels, cur_pixels, status)
            }
            (WarpModel::Affine, method) => {
                track_batch_parallel(|| affine_solver(options, method), ref_image, cur_image, ref_pixels, cur_pixels, status)
            }
        }

        log_summary(status);
        true
    }
}


fn track_one<S: FeatureSolver, I: IntensityImage>(
    solver: &mut S,
    ref_image: &I,
    cur_image: &I,
    feature_id: usize,
    ref_pixel: &Vec2,
    cur_pixel: &mut Vec2,
    status: &mut TrackStatus,
) {
    if status.is_terminal_failure() {
        return;
    }

    *status = TrackStatus::NotTracked;
    let iterations = solver.track_feature(ref_image, cur_image, ref_pixel, cur_pixel, status);
    if *status == TrackStatus::NotTracked {
        *status = TrackStatus::LargeResidual;
    }
    log::trace!("feature {feature_id}: {status:?} after {iterations} iterations at {cur_pixel:?}");
}

fn track_batch<S: FeatureSolver, I: IntensityImage>(
    solver: &mut S,
    ref_image: &I,
    cur_image: &I,
    ref_pixels: &[Vec2],
    cur_pixels: &mut [Vec2],
    status: &mut [TrackStatus],
) {
    let features = ref_pixels.iter().zip(cur_pixels.iter_mut()).zip(status.iter_mut());
    for (feature_id, ((ref_pixel, cur_pixel), status)) in features.enumerate() {
        track_one(solver, ref_image, cur_image, feature_id, ref_pixel, cur_pixel, status);
    }
}

fn track_batch_parallel<S, I, F>(
    make_solver: F,
    ref_image: &I,
    cur_image: &I,
    ref_pixels: &[Vec2],
    cur_pixels: &mut [Vec2],
    status: &mut [TrackStatus],
) where
    S: FeatureSolver,
    I: IntensityImage,
    F: Fn() -> S + Sync + Send,
{
    ref_pixels.par_iter()
        .zip(cur_pixels.par_iter_mut())
        .zip(status.par_iter_mut())
        .enumerate()
        .for_each_init(make_solver, |solver, (feature_id, ((ref_pixel, cur_pixel), status))| {
            track_one(solver, ref_image, cur_image, feature_id, ref_pixel, cur_pixel, status);
        });
}

fn log_summary(status: &[TrackStatus]) {
    if log::max_level() < log::LevelFilter::Debug {
        return;
    }
    let count = |wanted: TrackStatus| status.iter().filter(|s| **s == wanted).count();
    log::debug!(
        "{} features: {} tracked, {} outside, {} large residual, {} numeric error",
        status.len(),
        count(TrackStatus::Tracked),
        count(TrackStatus::OutsideImage),
        count(TrackStatus::LargeResidual),
        count(TrackStatus::NumericError),
    );
}
