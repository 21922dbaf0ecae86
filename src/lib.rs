pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod lines;
pub mod preprocess;
pub mod raster;
pub mod tilt;
pub mod transform;

pub use cli::Cli;
pub use config::{BandOptions, EdgeOptions, EstimatorConfig, TiltOptions};
pub use error::{LevelError, Result};
pub use geometry::{compute_image_crop, CropDimensions};
pub use lines::{HoughLineSource, LineSegment, LineSource};
pub use preprocess::extract_band;
pub use raster::RasterImage;
pub use tilt::{aggregate, classify, estimate_tilt, TiltCandidate, TiltEstimate, TiltEstimator};
pub use transform::level_and_crop;
