use feature_tracker::TrackStatus;
use feature_tracker::types::*;


/// Features on a regular grid, `margin` pixels away from every border.
pub fn grid_features(width: u32, height: u32, step: u32, margin: u32) -> Vec<Vec2> {
    let step = step.max(1) as usize;
    if width <= 2 * margin || height <= 2 * margin {
        return Vec::new();
    }
    (margin..height - margin).step_by(step)
        .flat_map(|row| (margin..width - margin).step_by(step).map(move |col| Vec2::new(col as Float, row as Float)))
        .collect()
}


/// Outcome of one tracking call, per status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingSummary {
    pub total: usize,
    pub not_tracked: usize,
    pub tracked: usize,
    pub outside_image: usize,
    pub large_residual: usize,
    pub numeric_error: usize,
    /// Mean of `cur - ref` over tracked features.
    pub mean_displacement: Option<Vec2>,
}

impl TrackingSummary {
    pub fn new(ref_pixels: &[Vec2], cur_pixels: &[Vec2], status: &[TrackStatus]) -> Self {
        let mut summary = TrackingSummary { total: status.len(), ..Default::default() };
        let mut displacement_sum = Vec2::zeros();

        for ((ref_pixel, cur_pixel), status) in ref_pixels.iter().zip(cur_pixels).zip(status) {
            match status {
                TrackStatus::NotTracked => summary.not_tracked += 1,
                TrackStatus::Tracked => {
                    summary.tracked += 1;
                    displacement_sum += cur_pixel - ref_pixel;
                }
                TrackStatus::OutsideImage => summary.outside_image += 1,
                TrackStatus::LargeResidual => summary.large_residual += 1,
                TrackStatus::NumericError => summary.numeric_error += 1,
            }
        }

        if summary.tracked > 0 {
            summary.mean_displacement = Some(displacement_sum / summary.tracked as Float);
        }
        summary
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_grid_features() {
        let features = grid_features(100, 60, 20, 10);
        // cols 10, 30, 50, 70 and rows 10, 30
        assert_eq!(features.len(), 8);
        assert_eq!(features[0], Vec2::new(10.0, 10.0));
        assert_eq!(features[7], Vec2::new(70.0, 30.0));
        assert!(grid_features(10, 10, 5, 5).is_empty());
    }

    #[test]
    fn test_summary() {
        let ref_pixels = vec![Vec2::new(10.0, 10.0), Vec2::new(20.0, 20.0), Vec2::new(30.0, 30.0)];
        let cur_pixels = vec![Vec2::new(11.0, 12.0), Vec2::new(23.0, 20.0), Vec2::new(0.0, 0.0)];
        let status = vec![TrackStatus::Tracked, TrackStatus::Tracked, TrackStatus::OutsideImage];

        let summary = TrackingSummary::new(&ref_pixels, &cur_pixels, &status);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.tracked, 2);
        assert_eq!(summary.outside_image, 1);
        assert_eq!(summary.mean_displacement, Some(Vec2::new(2.0, 1.0)));

        let none = TrackingSummary::new(&ref_pixels, &cur_pixels, &[TrackStatus::LargeResidual]);
        assert_eq!(none.large_residual, 1);
        assert_eq!(none.mean_displacement, None);
    }
}
