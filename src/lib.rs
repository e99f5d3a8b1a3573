pub mod config;
pub mod harness;

// Re-export commonly used types for convenience
pub use config::Config;
pub use harness::{grid_features, TrackingSummary};
pub use feature_tracker::{
    FeatureSolver, OpticalFlowMethod, OpticalFlowOptions, OpticalFlowTracker, TrackStatus, WarpModel,
};
pub use feature_tracker::types;
