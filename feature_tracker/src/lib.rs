pub mod feature_tracker;
pub mod patch;
pub mod image_operations;
pub mod normal_equation;

pub use feature_tracker::{
    FeatureSolver, OpticalFlowMethod, OpticalFlowOptions, OpticalFlowTracker, TrackStatus, WarpModel,
};



pub mod types {

    use image::{ImageBuffer, Luma, Pixel};
    use nalgebra as na;

    #[cfg(feature = "use_f32")]
    /// Scalar used by the normal equations and pixel coordinates (f32 precision)
    pub type Float = f32;

    #[cfg(not(feature = "use_f32"))]
    /// Scalar used by the normal equations and pixel coordinates (f64 precision, default)
    pub type Float = f64;

    pub type Image<P> = ImageBuffer<P, Vec<<P as Pixel>::Subpixel>>;
    pub type FloatGrayImage = Image<Luma<f32>>;

    pub type Vec2 = na::Vector2<Float>;
    pub type Mat2 = na::Matrix2<Float>;
    pub type SVector<const N: usize> = na::SVector<Float, N>;
    pub type SMatrix<const R: usize, const C: usize> = na::SMatrix<Float, R, C>;

}
