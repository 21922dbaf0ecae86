//! Tilt estimation: band extraction, line detection, classification of the
//! segments against the horizontal and vertical references, and a
//! length-weighted median over the survivors.
//!
//! Angles are in degrees, positive = clockwise.

use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::config::{EstimatorConfig, TiltOptions};
use crate::error::Result;
use crate::lines::{HoughLineSource, LineSegment, LineSource};
use crate::preprocess::extract_band;
use crate::raster::RasterImage;

/// Signed tilt suggested by one segment, weighted by the segment length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiltCandidate {
    pub tilt_degrees: f64,
    pub weight: f64,
}

impl TiltCandidate {
    pub fn new(tilt_degrees: f64, weight: f64) -> Self {
        Self {
            tilt_degrees,
            weight,
        }
    }
}

/// Result of the estimation pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiltEstimate {
    /// Rounded tilt, 0.0 when no segment qualified
    pub angle_degrees: f64,
    /// Number of segments returned by the line source
    pub segment_count: usize,
    /// Number of segments that survived classification
    pub candidate_count: usize,
}

impl TiltEstimate {
    /// Whether the angle came from line evidence rather than the fallback.
    pub fn has_evidence(&self) -> bool {
        self.candidate_count > 0
    }
}

/// Map one segment onto the signed tilt convention, or reject it.
///
/// Steep segments within `vertical_tolerance` of ±90° report their deviation
/// from plumb; flat segments within `horizontal_tolerance` of 0° report their
/// own angle. Everything else (short or diagonal) is dropped.
pub fn classify_segment(segment: &LineSegment, options: &TiltOptions) -> Option<TiltCandidate> {
    let length = segment.length();
    if length < options.min_length {
        return None;
    }

    let angle = segment.angle_degrees();

    if (angle.abs() - 90.0).abs() < options.vertical_tolerance {
        let tilt = if angle > 0.0 { angle - 90.0 } else { angle + 90.0 };
        Some(TiltCandidate::new(tilt, length))
    } else if angle.abs() < options.horizontal_tolerance {
        Some(TiltCandidate::new(angle, length))
    } else {
        None
    }
}

/// Classify every segment, keeping only level and plumb references.
pub fn classify(segments: &[LineSegment], options: &TiltOptions) -> Vec<TiltCandidate> {
    segments
        .iter()
        .filter_map(|segment| classify_segment(segment, options))
        .collect()
}

/// Compute weighted median of tilts
///
/// Candidates are sorted by tilt and the first one whose cumulative weight
/// reaches half the total wins. No interpolation between neighbors.
pub fn weighted_median(candidates: &[TiltCandidate]) -> Option<f64> {
    if candidates.is_empty() {
        return None;
    }

    let mut sorted: Vec<_> = candidates
        .iter()
        .map(|c| (c.tilt_degrees, c.weight))
        .collect();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    // Total and running sums share one summation order, so ties at the half
    // weight resolve the same way whatever order the segments arrived in.
    let cumulative: Vec<f64> = sorted
        .iter()
        .scan(0.0, |sum, (_, weight)| {
            *sum += weight;
            Some(*sum)
        })
        .collect();
    let half_weight = cumulative.last().copied().unwrap_or(0.0) / 2.0;

    let index = cumulative
        .iter()
        .position(|&sum| sum >= half_weight)
        // Only reachable through NaN weights.
        .unwrap_or(sorted.len() - 1);

    Some(sorted[index].0)
}

/// Round to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Weighted median of the candidates, rounded; 0.0 when there are none.
pub fn aggregate(candidates: &[TiltCandidate], options: &TiltOptions) -> f64 {
    weighted_median(candidates).map_or(0.0, |tilt| round_to(tilt, options.decimals))
}

/// Tilt estimation pipeline over a pluggable line source.
#[derive(Debug, Clone)]
pub struct TiltEstimator<S = HoughLineSource> {
    config: EstimatorConfig,
    source: S,
}

impl TiltEstimator<HoughLineSource> {
    /// Estimator using the Hough line source configured from `config.edges`.
    pub fn new(config: EstimatorConfig) -> Self {
        let source = HoughLineSource::new(config.edges);
        Self { config, source }
    }
}

impl Default for TiltEstimator<HoughLineSource> {
    fn default() -> Self {
        Self::new(EstimatorConfig::default())
    }
}

impl<S: LineSource> TiltEstimator<S> {
    pub fn with_source(config: EstimatorConfig, source: S) -> Self {
        Self { config, source }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Run the full pipeline on `image`.
    ///
    /// Fails only on invalid input or configuration. Missing line evidence
    /// yields an estimate of 0.0 with `candidate_count == 0`.
    pub fn estimate(&self, image: &RasterImage) -> Result<TiltEstimate> {
        self.config.validate()?;

        let band = extract_band(image, &self.config.band)?;
        let segments = self.source.detect(&band);
        let candidates = classify(&segments, &self.config.tilt);

        debug!(
            segments = segments.len(),
            candidates = candidates.len(),
            "classified line segments"
        );

        let angle_degrees = aggregate(&candidates, &self.config.tilt);
        if candidates.is_empty() {
            warn!("no reliable lines detected, assuming the image is level");
        }

        Ok(TiltEstimate {
            angle_degrees,
            segment_count: segments.len(),
            candidate_count: candidates.len(),
        })
    }
}

/// Estimate the tilt of `image` with the default configuration.
///
/// Never fails: invalid input is logged and reported as 0.0, like the
/// no-evidence case. Use [`TiltEstimator::estimate`] to tell them apart.
pub fn estimate_tilt(image: &RasterImage) -> f64 {
    match TiltEstimator::<HoughLineSource>::default().estimate(image) {
        Ok(estimate) => estimate.angle_degrees,
        Err(err) => {
            warn!(%err, "tilt estimation skipped");
            0.0
        }
    }
}
