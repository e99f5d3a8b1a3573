#[cfg(test)]
mod tests {
    use crate::feature_tracker::*;
    use crate::patch::PatchWindow;
    use crate::types::*;
    use image::Luma;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const MODES: [(WarpModel, OpticalFlowMethod); 5] = [
        (WarpModel::Affine, OpticalFlowMethod::Direct),
        (WarpModel::Affine, OpticalFlowMethod::Inverse),
        (WarpModel::Affine, OpticalFlowMethod::Fast),
        (WarpModel::Rigid, OpticalFlowMethod::Direct),
        (WarpModel::Rigid, OpticalFlowMethod::Inverse),
    ];

    /// Smooth texture sampled at `(col, row) - shift`, so an integer shift moves content
    /// by exactly that many pixels without resampling.
    fn textured_image(shift: Vec2) -> FloatGrayImage {
        FloatGrayImage::from_fn(90, 70, |col, row| {
            let (x, y) = (col as Float - shift.x, row as Float - shift.y);
            let value = 0.5 + 0.15 * (0.3 * x).sin() + 0.15 * (0.25 * y).cos() + 0.1 * (0.2 * (x + y)).sin();
            Luma([value as f32])
        })
    }

    fn noise_image(seed: u64) -> FloatGrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        FloatGrayImage::from_fn(90, 70, |_, _| Luma([rng.r#gen::<f32>()]))
    }

    fn interior_features() -> Vec<Vec2> {
        vec![
            Vec2::new(30.0, 30.0),
            Vec2::new(45.0, 35.0),
            Vec2::new(60.0, 40.0),
            Vec2::new(38.5, 27.25),
        ]
    }

    fn tracker(warp_model: WarpModel, method: OpticalFlowMethod) -> OpticalFlowTracker {
        let options = OpticalFlowOptions {
            patch_row_half_size: 6,
            patch_col_half_size: 7,
            max_iteration: 30,
            max_converge_step: 1e-6,
            warp_model,
            method,
            ..Default::default()
        };
        let mut tracker = OpticalFlowTracker::new(options);
        tracker.prepare_for_tracking();
        tracker
    }

    fn track(
        tracker: &mut OpticalFlowTracker,
        ref_image: &FloatGrayImage,
        cur_image: &FloatGrayImage,
        ref_pixels: &[Vec2],
        cur_pixels: &mut [Vec2],
    ) -> Vec<TrackStatus> {
        let mut status = vec![TrackStatus::NotTracked; ref_pixels.len()];
        assert!(tracker.track_single_level(ref_image, cur_image, ref_pixels, cur_pixels, &mut status));
        status
    }

    #[test]
    fn test_identity_warp_recovery() {
        let img = textured_image(Vec2::zeros());
        let ref_pixels = interior_features();
        for (warp_model, method) in MODES {
            let mut tracker = tracker(warp_model, method);
            let mut cur_pixels = ref_pixels.clone();
            let status = track(&mut tracker, &img, &img, &ref_pixels, &mut cur_pixels);
            for (i, s) in status.iter().enumerate() {
                assert_eq!(*s, TrackStatus::Tracked, "{:?}/{:?} feature {}", warp_model, method, i);
                assert!(cur_pixels[i].relative_eq(&ref_pixels[i], 1e-6, 1e-6));
            }
        }
    }

    #[test]
    fn test_pure_translation_recovery() {
        let ref_img = textured_image(Vec2::zeros());
        let ref_pixels = interior_features();
        for shift in [Vec2::new(2.0, 1.0), Vec2::new(-1.0, 2.0)] {
            let cur_img = textured_image(shift);
            for (warp_model, method) in MODES {
                let mut tracker = tracker(warp_model, method);
                let mut cur_pixels = ref_pixels.clone();
                let status = track(&mut tracker, &ref_img, &cur_img, &ref_pixels, &mut cur_pixels);
                for (i, s) in status.iter().enumerate() {
                    let flow = cur_pixels[i] - ref_pixels[i];
                    assert_eq!(*s, TrackStatus::Tracked, "{:?}/{:?} feature {}", warp_model, method, i);
                    assert!(flow.relative_eq(&shift, 1e-2, 1e-2), "{:?}/{:?}: {} vs {}", warp_model, method, flow, shift);
                }
            }
        }
    }

    #[test]
    fn test_idempotence_on_convergence() {
        let ref_img = textured_image(Vec2::zeros());
        let cur_img = textured_image(Vec2::new(1.0, -2.0));
        let ref_pixels = interior_features();
        for (warp_model, method) in MODES {
            let mut tracker = tracker(warp_model, method);
            let mut converged = ref_pixels.clone();
            let status = track(&mut tracker, &ref_img, &cur_img, &ref_pixels, &mut converged);
            assert!(status.iter().all(|s| *s == TrackStatus::Tracked));

            // A single iteration must be enough from the converged estimate.
            let options = OpticalFlowOptions { max_iteration: 1, ..tracker.options().clone() };
            tracker.set_options(options);
            tracker.prepare_for_tracking();
            let mut again = converged.clone();
            let status = track(&mut tracker, &ref_img, &cur_img, &ref_pixels, &mut again);
            for (i, s) in status.iter().enumerate() {
                assert_eq!(*s, TrackStatus::Tracked, "{:?}/{:?} feature {}", warp_model, method, i);
                assert!(again[i].relative_eq(&converged[i], 1e-3, 1e-3));
            }
        }
    }

    #[test]
    fn test_boundary_termination() {
        let img = textured_image(Vec2::zeros());
        let ref_pixels = vec![Vec2::new(-40.0, 30.0)];

        // The fast solver gives up before building any system.
        let mut fast = AffineWarpSolverFast::new(PatchWindow::new(6, 7), 30, 1e-6, 3);
        let mut cur_pixel = ref_pixels[0];
        let mut status = TrackStatus::NotTracked;
        let iterations = fast.track_feature(&img, &img, &ref_pixels[0], &mut cur_pixel, &mut status);
        assert_eq!(status, TrackStatus::OutsideImage);
        assert_eq!(iterations, 0);

        // The other solvers stop on the first iteration without any valid pixel.
        for (warp_model, method) in MODES {
            let mut tracker = tracker(warp_model, method);
            let mut cur_pixels = ref_pixels.clone();
            let status = track(&mut tracker, &img, &img, &ref_pixels, &mut cur_pixels);
            let expected = if method == OpticalFlowMethod::Fast && warp_model == WarpModel::Affine {
                TrackStatus::OutsideImage
            } else {
                TrackStatus::LargeResidual
            };
            assert_eq!(status[0], expected, "{:?}/{:?}", warp_model, method);
            assert_eq!(cur_pixels[0], ref_pixels[0]);
        }
    }

    #[test]
    fn test_terminal_status_is_never_retracked() {
        let ref_img = textured_image(Vec2::zeros());
        let cur_img = textured_image(Vec2::new(1.0, 1.0));
        let ref_pixels = interior_features();
        let initial_pixels = vec![
            Vec2::new(31.0, 31.0),
            Vec2::new(-3.0, 7.5),
            Vec2::new(60.0, 40.0),
            Vec2::new(Float::NAN, 1.0),
        ];
        let initial_status = vec![
            TrackStatus::NotTracked,
            TrackStatus::OutsideImage,
            TrackStatus::LargeResidual,
            TrackStatus::NumericError,
        ];

        for (warp_model, method) in MODES {
            let mut tracker = tracker(warp_model, method);
            let mut cur_pixels = initial_pixels.clone();
            let mut status = initial_status.clone();
            tracker.track_single_level(&ref_img, &cur_img, &ref_pixels, &mut cur_pixels, &mut status);

            assert_eq!(status[0], TrackStatus::Tracked);
            assert_eq!(&status[1..], &initial_status[1..]);
            for i in 1..initial_pixels.len() {
                assert_eq!(cur_pixels[i].x.to_bits(), initial_pixels[i].x.to_bits());
                assert_eq!(cur_pixels[i].y.to_bits(), initial_pixels[i].y.to_bits());
            }
        }
    }

    #[test]
    fn test_iteration_cap_on_noise() {
        let ref_img = textured_image(Vec2::zeros());
        let cur_img = noise_image(7);
        let ref_pixels = interior_features();
        let max_iteration = 8;

        let window = PatchWindow::new(6, 7);
        let mut affine = AffineWarpSolver::new(window, max_iteration, 0.0, OpticalFlowMethod::Direct);
        let mut fast = AffineWarpSolverFast::new(window, max_iteration, 0.0, max_iteration);
        let mut rigid = RigidWarpSolver::new(window, max_iteration, 0.0, OpticalFlowMethod::Inverse);
        for ref_pixel in ref_pixels.iter() {
            let runs = [
                run(&mut affine, &ref_img, &cur_img, ref_pixel),
                run(&mut fast, &ref_img, &cur_img, ref_pixel),
                run(&mut rigid, &ref_img, &cur_img, ref_pixel),
            ];
            for (iterations, status) in runs {
                assert!(iterations <= max_iteration);
                assert_eq!(status, TrackStatus::NotTracked, "{}", ref_pixel);
            }
        }

        for (warp_model, method) in MODES {
            let options = OpticalFlowOptions {
                max_iteration,
                max_converge_step: 0.0,
                warp_model,
                method,
                ..Default::default()
            };
            let mut tracker = OpticalFlowTracker::new(options);
            tracker.prepare_for_tracking();
            let mut cur_pixels = ref_pixels.clone();
            let status = track(&mut tracker, &ref_img, &cur_img, &ref_pixels, &mut cur_pixels);
            assert!(status.iter().all(|s| *s == TrackStatus::LargeResidual), "{:?}/{:?}: {:?}", warp_model, method, status);
        }
    }

    #[test]
    fn test_exhausted_budget_is_large_residual() {
        let ref_img = textured_image(Vec2::zeros());
        let cur_img = textured_image(Vec2::new(2.0, 2.0));
        let ref_pixels = interior_features();
        for (warp_model, method) in MODES {
            let options = OpticalFlowOptions {
                max_iteration: 1,
                max_converge_step: 1e-12,
                warp_model,
                method,
                ..Default::default()
            };
            let mut tracker = OpticalFlowTracker::new(options);
            tracker.prepare_for_tracking();
            let mut cur_pixels = ref_pixels.clone();
            let status = track(&mut tracker, &ref_img, &cur_img, &ref_pixels, &mut cur_pixels);
            assert!(status.iter().all(|s| *s == TrackStatus::LargeResidual), "{:?}/{:?}: {:?}", warp_model, method, status);
        }
    }

    #[test]
    fn test_coarse_to_fine_levels() {
        // Two levels driven by the caller: half resolution first, estimates doubled.
        let fine_ref = textured_image(Vec2::zeros());
        let shift = Vec2::new(2.0, -2.0);
        let fine_cur = textured_image(shift);
        let half = |img: &FloatGrayImage| {
            FloatGrayImage::from_fn(img.width() / 2, img.height() / 2, |col, row| {
                let sum = img.get_pixel(2 * col, 2 * row)[0]
                    + img.get_pixel(2 * col + 1, 2 * row)[0]
                    + img.get_pixel(2 * col, 2 * row + 1)[0]
                    + img.get_pixel(2 * col + 1, 2 * row + 1)[0];
                Luma([sum / 4.0])
            })
        };
        let (coarse_ref, coarse_cur) = (half(&fine_ref), half(&fine_cur));

        let fine_pixels = vec![Vec2::new(40.0, 36.0), Vec2::new(50.0, 30.0)];
        let coarse_pixels = fine_pixels.iter().map(|p| p / 2.0).collect::<Vec<_>>();

        let mut tracker = tracker(WarpModel::Affine, OpticalFlowMethod::Fast);
        let mut cur_pixels = coarse_pixels.clone();
        let mut status = vec![TrackStatus::NotTracked; fine_pixels.len()];
        tracker.track_single_level(&coarse_ref, &coarse_cur, &coarse_pixels, &mut cur_pixels, &mut status);
        assert!(status.iter().all(|s| *s == TrackStatus::Tracked));

        let mut cur_pixels = cur_pixels.iter().map(|p| p * 2.0).collect::<Vec<_>>();
        tracker.track_single_level(&fine_ref, &fine_cur, &fine_pixels, &mut cur_pixels, &mut status);
        for (i, s) in status.iter().enumerate() {
            assert_eq!(*s, TrackStatus::Tracked);
            assert!((cur_pixels[i] - fine_pixels[i]).relative_eq(&shift, 1e-2, 1e-2));
        }
    }

    fn run<S: FeatureSolver>(
        solver: &mut S,
        ref_image: &FloatGrayImage,
        cur_image: &FloatGrayImage,
        ref_pixel: &Vec2,
    ) -> (u32, TrackStatus) {
        let mut cur_pixel = *ref_pixel;
        let mut status = TrackStatus::NotTracked;
        let iterations = solver.track_feature(ref_image, cur_image, ref_pixel, &mut cur_pixel, &mut status);
        (iterations, status)
    }
}
