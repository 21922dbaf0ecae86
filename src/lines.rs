use image::GrayImage;
use imageproc::edges::canny;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use nalgebra::{Matrix2, Vector2};
use tracing::debug;

use crate::config::EdgeOptions;

/// A finite line segment in band-local pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl LineSegment {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Segment starting at (x, y) with the given length and orientation.
    pub fn from_polar(x: f64, y: f64, length: f64, angle_degrees: f64) -> Self {
        let theta = angle_degrees.to_radians();
        Self::new(x, y, x + length * theta.cos(), y + length * theta.sin())
    }

    pub fn length(&self) -> f64 {
        (self.x2 - self.x1).hypot(self.y2 - self.y1)
    }

    /// Orientation of the endpoint vector, in (-180, 180] degrees.
    pub fn angle_degrees(&self) -> f64 {
        (self.y2 - self.y1).atan2(self.x2 - self.x1).to_degrees()
    }
}

/// Anything that can find straight line segments in a grayscale band.
///
/// Implementations must be deterministic for a given input. The order of
/// the returned segments carries no meaning.
pub trait LineSource {
    fn detect(&self, band: &GrayImage) -> Vec<LineSegment>;
}

impl<F> LineSource for F
where
    F: Fn(&GrayImage) -> Vec<LineSegment>,
{
    fn detect(&self, band: &GrayImage) -> Vec<LineSegment> {
        self(band)
    }
}

/// Default line source: Canny edges, Hough lines, then each Hough line is
/// traced over the edge map and split into finite segments wherever the
/// supporting edge pixels stop.
#[derive(Debug, Clone, Default)]
pub struct HoughLineSource {
    pub options: EdgeOptions,
}

impl HoughLineSource {
    pub fn new(options: EdgeOptions) -> Self {
        Self { options }
    }
}

impl LineSource for HoughLineSource {
    fn detect(&self, band: &GrayImage) -> Vec<LineSegment> {
        let (width, height) = band.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }

        let edges = detect_edges(band, self.options.canny_low, self.options.canny_high);

        let polar_lines = detect_lines(
            &edges,
            LineDetectionOptions {
                vote_threshold: self.options.vote_threshold,
                suppression_radius: self.options.suppression_radius,
            },
        );

        let segments: Vec<LineSegment> = polar_lines
            .iter()
            .flat_map(|pl| refine_polar_line(&edges, pl, &self.options))
            .collect();

        debug!(
            hough_lines = polar_lines.len(),
            segments = segments.len(),
            "line source finished"
        );

        segments
    }
}

/// Apply Canny edge detection
fn detect_edges(gray: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(gray, low_threshold, high_threshold)
}

/// Infinite line through `point` along the unit vector `direction`.
#[derive(Debug, Clone, Copy)]
struct TraceLine {
    point: Vector2<f64>,
    direction: Vector2<f64>,
}

impl TraceLine {
    /// Hough lines satisfy x·cosθ + y·sinθ = r, with θ measured to the normal.
    fn from_polar(line: &PolarLine) -> Self {
        let theta = (line.angle_in_degrees as f64).to_radians();
        let normal = Vector2::new(theta.cos(), theta.sin());
        Self {
            point: normal * line.r as f64,
            direction: Vector2::new(-theta.sin(), theta.cos()),
        }
    }
}

/// The coarse Hough line only seeds the search: edge pixels near it are fitted
/// once, and the fitted line is traced again to cut the final segments.
fn refine_polar_line(edges: &GrayImage, line: &PolarLine, options: &EdgeOptions) -> Vec<LineSegment> {
    let seed = TraceLine::from_polar(line);

    let support: Vec<Vector2<f64>> = trace_runs(edges, &seed, options)
        .into_iter()
        .flatten()
        .collect();

    let refined = match fit_line(&support) {
        Some(fitted) => fitted,
        None => return Vec::new(),
    };

    trace_runs(edges, &refined, options)
        .iter()
        .filter(|run| run.len() >= options.min_points)
        .filter_map(|run| fit_segment(run))
        .collect()
}

/// Walk along `line` one pixel at a time over its dominant axis, snapping to
/// the nearest edge pixel within `snap_distance`. Consecutive hits form a run;
/// more than `max_gap` misses in a row close it.
fn trace_runs(edges: &GrayImage, line: &TraceLine, options: &EdgeOptions) -> Vec<Vec<Vector2<f64>>> {
    let (width, height) = edges.dimensions();
    let horizontal = line.direction.x.abs() >= line.direction.y.abs();
    let (major_len, minor_len) = if horizontal {
        (width, height)
    } else {
        (height, width)
    };
    let snap = options.snap_distance.max(0.0).floor() as i64;

    let mut runs = Vec::new();
    let mut current: Vec<Vector2<f64>> = Vec::new();
    let mut misses = 0u32;

    for major in 0..major_len {
        let minor_f = if horizontal {
            let t = (major as f64 - line.point.x) / line.direction.x;
            line.point.y + t * line.direction.y
        } else {
            let t = (major as f64 - line.point.y) / line.direction.y;
            line.point.x + t * line.direction.x
        };
        let minor_center = minor_f.round() as i64;

        let hit = snap_offsets(snap).find_map(|offset| {
            let minor = minor_center + offset;
            if minor < 0 || minor >= minor_len as i64 {
                return None;
            }
            let (x, y) = if horizontal {
                (major, minor as u32)
            } else {
                (minor as u32, major)
            };
            (edges.get_pixel(x, y)[0] > 0).then(|| Vector2::new(x as f64, y as f64))
        });

        match hit {
            Some(p) => {
                if misses > options.max_gap && !current.is_empty() {
                    runs.push(std::mem::take(&mut current));
                }
                current.push(p);
                misses = 0;
            }
            None => misses += 1,
        }
    }

    if !current.is_empty() {
        runs.push(current);
    }

    runs
}

/// 0, -1, 1, -2, 2, ... up to ±snap.
fn snap_offsets(snap: i64) -> impl Iterator<Item = i64> {
    std::iter::once(0).chain((1..=snap).flat_map(|d| [-d, d]))
}

/// Total least squares fit: centroid plus principal axis of the scatter.
fn fit_line(points: &[Vector2<f64>]) -> Option<TraceLine> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let centroid = points.iter().fold(Vector2::<f64>::zeros(), |acc, p| acc + p) / n;

    let scatter = points.iter().fold(Matrix2::<f64>::zeros(), |acc, p| {
        let d = p - centroid;
        acc + d * d.transpose()
    });

    let eigen = scatter.symmetric_eigen();
    let major = eigen.eigenvalues.imax();
    let direction: Vector2<f64> = eigen.eigenvectors.column(major).into_owned();
    let norm = direction.norm();
    if !norm.is_finite() || norm == 0.0 {
        return None;
    }

    // Mostly-horizontal lines point rightwards, mostly-vertical ones
    // downwards, so a horizontal edge reads near 0° rather than 180°.
    let mut direction = direction / norm;
    let backwards = if direction.x.abs() >= direction.y.abs() {
        direction.x < 0.0
    } else {
        direction.y < 0.0
    };
    if backwards {
        direction = -direction;
    }

    Some(TraceLine {
        point: centroid,
        direction,
    })
}

/// Fit a line to a run of edge pixels and clip it to the run's extent.
fn fit_segment(points: &[Vector2<f64>]) -> Option<LineSegment> {
    let line = fit_line(points)?;

    let (t_min, t_max) = points
        .iter()
        .map(|p| (p - line.point).dot(&line.direction))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| {
            (lo.min(t), hi.max(t))
        });

    let start = line.point + line.direction * t_min;
    let end = line.point + line.direction * t_max;

    Some(LineSegment::new(start.x, start.y, end.x, end.y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Edge map with a one-pixel-wide line drawn from x0 to x1 at `angle`.
    fn edge_line(width: u32, height: u32, x0: u32, x1: u32, y0: f64, angle: f64) -> GrayImage {
        let mut edges = GrayImage::new(width, height);
        let slope = angle.to_radians().tan();
        for x in x0..x1 {
            let y = (y0 + (x - x0) as f64 * slope).round();
            if y >= 0.0 && y < height as f64 {
                edges.put_pixel(x, y as u32, Luma([255]));
            }
        }
        edges
    }

    #[test]
    fn test_segment_geometry() {
        let seg = LineSegment::new(0.0, 0.0, 3.0, 4.0);
        assert!((seg.length() - 5.0).abs() < 1e-12);

        let seg = LineSegment::new(10.0, 10.0, 10.0, 0.0);
        assert!((seg.angle_degrees() + 90.0).abs() < 1e-12);

        let seg = LineSegment::new(10.0, 0.0, 0.0, 0.0);
        assert!((seg.angle_degrees() - 180.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_polar() {
        let seg = LineSegment::from_polar(5.0, 5.0, 200.0, 3.2);
        assert!((seg.length() - 200.0).abs() < 1e-9);
        assert!((seg.angle_degrees() - 3.2).abs() < 1e-9);
    }

    #[test]
    fn test_closure_line_source() {
        let source = |_: &GrayImage| vec![LineSegment::new(0.0, 0.0, 100.0, 0.0)];
        let band = GrayImage::new(4, 4);
        assert_eq!(source.detect(&band).len(), 1);
    }

    #[test]
    fn test_blank_band_has_no_segments() {
        let band = GrayImage::from_pixel(120, 80, Luma([128]));
        let source = HoughLineSource::default();
        assert!(source.detect(&band).is_empty());

        let empty = GrayImage::new(120, 0);
        assert!(source.detect(&empty).is_empty());
    }

    #[test]
    fn test_fit_segment_recovers_angle() {
        let edges = edge_line(400, 100, 20, 380, 30.0, 3.0);
        let points: Vec<Vector2<f64>> = edges
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] > 0)
            .map(|(x, y, _)| Vector2::new(x as f64, y as f64))
            .collect();

        let seg = fit_segment(&points).unwrap();
        assert!((seg.angle_degrees() - 3.0).abs() < 0.1);
        assert!((seg.length() - 360.0 / 3f64.to_radians().cos()).abs() < 2.0);
        assert!(seg.x1 < seg.x2);
    }

    #[test]
    fn test_refine_splits_at_gaps() {
        // Two collinear pieces separated by a 40px hole.
        let mut edges = edge_line(400, 100, 10, 150, 50.0, 0.0);
        for x in 190..390 {
            edges.put_pixel(x, 50, Luma([255]));
        }

        // Horizontal line y = 50: normal at 90°, r = 50.
        let polar = PolarLine {
            r: 50.0,
            angle_in_degrees: 90,
        };
        let segments = refine_polar_line(&edges, &polar, &EdgeOptions::default());

        assert_eq!(segments.len(), 2);
        let mut lengths: Vec<f64> = segments.iter().map(|s| s.length()).collect();
        lengths.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((lengths[0] - 139.0).abs() < 1.0);
        assert!((lengths[1] - 199.0).abs() < 1.0);
        for seg in &segments {
            assert!(seg.angle_degrees().abs() < 1e-6);
        }
    }

    #[test]
    fn test_refine_corrects_coarse_hough_angle() {
        // True line at 2.6°, seeded with the nearest whole-degree Hough line.
        let edges = edge_line(300, 100, 0, 300, 40.0, 2.6);
        let theta = 93f64.to_radians();
        let r = 40.0 * theta.sin();
        let polar = PolarLine {
            r: r as f32,
            angle_in_degrees: 93,
        };

        let segments = refine_polar_line(&edges, &polar, &EdgeOptions::default());
        let longest = segments
            .iter()
            .max_by(|a, b| a.length().partial_cmp(&b.length()).unwrap())
            .unwrap();
        assert!((longest.angle_degrees() - 2.6).abs() < 0.1);
    }

    #[test]
    fn test_vertical_trace() {
        let mut edges = GrayImage::new(100, 300);
        for y in 20..280 {
            edges.put_pixel(60, y, Luma([255]));
        }

        // Vertical line x = 60: normal at 0°, r = 60.
        let polar = PolarLine {
            r: 60.0,
            angle_in_degrees: 0,
        };
        let segments = refine_polar_line(&edges, &polar, &EdgeOptions::default());
        assert_eq!(segments.len(), 1);
        assert!((segments[0].angle_degrees() - 90.0).abs() < 1e-6);
        assert!((segments[0].length() - 259.0).abs() < 1e-6);
    }

    #[test]
    fn test_detects_step_edge() {
        // Dark lower half under a bright upper half: one horizontal edge.
        let mut band = GrayImage::from_pixel(300, 120, Luma([220]));
        for y in 60..120 {
            for x in 0..300 {
                band.put_pixel(x, y, Luma([30]));
            }
        }

        let segments = HoughLineSource::default().detect(&band);
        assert!(!segments.is_empty());
        for seg in &segments {
            assert!(seg.angle_degrees().abs() < 1.0, "got {:?}", seg);
        }
        assert!(segments.iter().any(|s| s.length() > 200.0));
    }
}
