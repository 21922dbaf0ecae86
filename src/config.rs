//! Tuning parameters for the tilt estimator.
//!
//! The defaults are empirically chosen values, not correctness requirements.
//! Every field can be overridden from the command line.

use crate::error::{LevelError, Result};

/// Analysis band and local contrast enhancement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandOptions {
    /// First row of the band as a fraction of the image height (inclusive).
    pub start: f64,
    /// Last row of the band as a fraction of the image height (exclusive).
    pub end: f64,
    /// CLAHE clip limit, relative to a uniform histogram.
    pub clip_limit: f64,
    /// CLAHE tile grid (columns, rows).
    pub tile_grid: (u32, u32),
}

impl Default for BandOptions {
    fn default() -> Self {
        Self {
            start: 0.25,
            end: 0.75,
            clip_limit: 2.0,
            tile_grid: (8, 8),
        }
    }
}

/// Edge detection and segment extraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeOptions {
    /// Canny hysteresis low threshold.
    pub canny_low: f32,
    /// Canny hysteresis high threshold.
    pub canny_high: f32,
    /// Minimum Hough accumulator votes for a line.
    pub vote_threshold: u32,
    /// Non-maximum suppression radius in the Hough accumulator.
    pub suppression_radius: u32,
    /// Max perpendicular distance (px) of an edge pixel from a traced line.
    pub snap_distance: f64,
    /// Max run of missing edge pixels (px) before a segment is split.
    pub max_gap: u32,
    /// Minimum edge pixels needed to fit a segment.
    pub min_points: usize,
}

impl Default for EdgeOptions {
    fn default() -> Self {
        Self {
            canny_low: 40.0,
            canny_high: 120.0,
            vote_threshold: 60,
            suppression_radius: 8,
            snap_distance: 2.0,
            max_gap: 3,
            min_points: 10,
        }
    }
}

/// Segment classification and aggregation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiltOptions {
    /// Segments shorter than this (px) are ignored.
    pub min_length: f64,
    /// Half-width (degrees) of the band around ±90° accepted as vertical.
    pub vertical_tolerance: f64,
    /// Half-width (degrees) of the band around 0° accepted as horizontal.
    pub horizontal_tolerance: f64,
    /// Decimal places kept in the final estimate.
    pub decimals: i32,
}

impl Default for TiltOptions {
    fn default() -> Self {
        Self {
            min_length: 60.0,
            vertical_tolerance: 15.0,
            horizontal_tolerance: 10.0,
            decimals: 2,
        }
    }
}

/// Full estimator configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EstimatorConfig {
    pub band: BandOptions,
    pub edges: EdgeOptions,
    pub tilt: TiltOptions,
}

impl EstimatorConfig {
    /// Reject option combinations the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        let band = &self.band;
        if !(0.0..=1.0).contains(&band.start) || !(0.0..=1.0).contains(&band.end) {
            return Err(LevelError::InvalidInput(format!(
                "band bounds must lie in [0, 1], got [{}, {})",
                band.start, band.end
            )));
        }
        if band.start >= band.end {
            return Err(LevelError::InvalidInput(format!(
                "band start {} must be below band end {}",
                band.start, band.end
            )));
        }
        if band.clip_limit <= 0.0 {
            return Err(LevelError::InvalidInput(format!(
                "clip limit must be positive, got {}",
                band.clip_limit
            )));
        }
        if band.tile_grid.0 == 0 || band.tile_grid.1 == 0 {
            return Err(LevelError::InvalidInput(format!(
                "tile grid must be non-empty, got {}x{}",
                band.tile_grid.0, band.tile_grid.1
            )));
        }
        if self.edges.canny_low > self.edges.canny_high {
            return Err(LevelError::InvalidInput(format!(
                "canny low threshold {} exceeds high threshold {}",
                self.edges.canny_low, self.edges.canny_high
            )));
        }
        if self.tilt.vertical_tolerance < 0.0 || self.tilt.horizontal_tolerance < 0.0 {
            return Err(LevelError::InvalidInput(
                "angle tolerances must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
