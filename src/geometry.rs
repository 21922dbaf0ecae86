use nalgebra::{Matrix3, Vector3};

use crate::error::{LevelError, Result};

/// Below this |cos 2θ| the inscribed-crop formula is treated as singular.
pub const SINGULAR_COS2_EPSILON: f64 = 1e-6;

/// Slack added before flooring so that results which are integral in exact
/// arithmetic (e.g. at 90°) do not lose a pixel to rounding noise.
const FLOOR_EPSILON: f64 = 1e-9;

/// Size of the largest axis-aligned crop inside a rotated image.
///
/// Sides can be zero or negative for extreme aspect ratios and angles; the
/// solver reports them as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropDimensions {
    pub width: i64,
    pub height: i64,
}

impl CropDimensions {
    pub fn new(width: i64, height: i64) -> Self {
        Self { width, height }
    }

    /// True when either side is not positive.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Dimensions as unsigned pixel counts, rejecting degenerate crops.
    pub fn to_pixels(&self) -> Result<(u32, u32)> {
        if self.is_degenerate() {
            return Err(LevelError::DegenerateCrop {
                width: self.width,
                height: self.height,
            });
        }
        let width = u32::try_from(self.width).map_err(|_| {
            LevelError::InvalidInput(format!("crop width {} out of range", self.width))
        })?;
        let height = u32::try_from(self.height).map_err(|_| {
            LevelError::InvalidInput(format!("crop height {} out of range", self.height))
        })?;
        Ok((width, height))
    }
}

/// Fold any angle onto [0, 90] degrees. The crop only depends on |cos θ|,
/// |sin θ| and cos 2θ, which are all invariant under θ → -θ and θ → 180° - θ.
fn fold_angle(degrees: f64) -> f64 {
    let a = degrees.abs() % 180.0;
    if a > 90.0 {
        180.0 - a
    } else {
        a
    }
}

/// Largest axis-aligned rectangle that fits inside a `width`×`height` image
/// rotated by `rotation_degrees` about its center.
///
/// With c = |cos θ|, s = |sin θ|:
/// ```text
/// w' = floor((W·c − H·s) / cos 2θ)
/// h' = floor((H·c − W·s) / cos 2θ)
/// ```
/// Near odd multiples of 45° the denominator vanishes and
/// [`LevelError::SingularRotation`] is returned instead.
pub fn compute_image_crop(width: u32, height: u32, rotation_degrees: f64) -> Result<CropDimensions> {
    if width == 0 || height == 0 {
        return Err(LevelError::InvalidInput(format!(
            "image has invalid dimensions {}x{}",
            width, height
        )));
    }
    if !rotation_degrees.is_finite() {
        return Err(LevelError::InvalidInput(format!(
            "rotation must be finite, got {}",
            rotation_degrees
        )));
    }

    let theta = fold_angle(rotation_degrees).to_radians();
    let cos = theta.cos().abs();
    let sin = theta.sin().abs();
    let cos_2 = (2.0 * theta).cos();

    if cos_2.abs() < SINGULAR_COS2_EPSILON {
        return Err(LevelError::SingularRotation {
            degrees: rotation_degrees,
        });
    }

    let w = width as f64;
    let h = height as f64;

    let cropped_width = (w * cos - h * sin) / cos_2;
    let cropped_height = (h * cos - w * sin) / cos_2;

    Ok(CropDimensions::new(
        (cropped_width + FLOOR_EPSILON).floor() as i64,
        (cropped_height + FLOOR_EPSILON).floor() as i64,
    ))
}

/// Affine map from pixel coordinates of the leveled crop back into the
/// source image.
///
/// The crop is centered on the source center and the source content is
/// turned by `-tilt_degrees`, so a source line at `+tilt_degrees` comes out
/// horizontal. Coordinates are continuous, with (0, 0) at the top-left corner.
pub fn leveling_matrix(
    source: (u32, u32),
    crop: (u32, u32),
    tilt_degrees: f64,
) -> Matrix3<f64> {
    let theta = tilt_degrees.to_radians();
    let (cos, sin) = (theta.cos(), theta.sin());

    let (cx, cy) = (crop.0 as f64 / 2.0, crop.1 as f64 / 2.0);
    let (sx, sy) = (source.0 as f64 / 2.0, source.1 as f64 / 2.0);

    let translate_to_origin = Matrix3::new(
        1.0, 0.0, -cx,
        0.0, 1.0, -cy,
        0.0, 0.0, 1.0,
    );

    let rotation = Matrix3::new(
        cos, -sin, 0.0,
        sin, cos, 0.0,
        0.0, 0.0, 1.0,
    );

    let translate_to_source = Matrix3::new(
        1.0, 0.0, sx,
        0.0, 1.0, sy,
        0.0, 0.0, 1.0,
    );

    translate_to_source * rotation * translate_to_origin
}

/// Transform a point using the affine matrix
pub fn transform_point(matrix: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let p = Vector3::new(x, y, 1.0);
    let result = matrix * p;
    (result.x / result.z, result.y / result.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_rotation_keeps_size() {
        for (w, h) in [(4000, 3000), (1, 1), (640, 480), (1080, 1920)] {
            assert_eq!(
                compute_image_crop(w, h, 0.0).unwrap(),
                CropDimensions::new(w as i64, h as i64)
            );
        }
    }

    #[test]
    fn test_half_and_full_turns() {
        assert_eq!(
            compute_image_crop(4000, 3000, 180.0).unwrap(),
            CropDimensions::new(4000, 3000)
        );
        assert_eq!(
            compute_image_crop(4000, 3000, 360.0).unwrap(),
            CropDimensions::new(4000, 3000)
        );
        assert_eq!(
            compute_image_crop(4000, 3000, 90.0).unwrap(),
            CropDimensions::new(3000, 4000)
        );
    }

    #[test]
    fn test_singular_rotation() {
        for angle in [45.0, -45.0, 135.0, 225.0, 45.0000001] {
            assert!(
                matches!(
                    compute_image_crop(4000, 3000, angle),
                    Err(LevelError::SingularRotation { .. })
                ),
                "angle {angle} should be singular"
            );
        }
        assert!(compute_image_crop(4000, 3000, 44.9).is_ok());
    }

    #[test]
    fn test_invalid_dimensions() {
        assert!(matches!(
            compute_image_crop(0, 3000, 3.0),
            Err(LevelError::InvalidInput(_))
        ));
        assert!(compute_image_crop(4000, 0, 3.0).is_err());
        assert!(compute_image_crop(4000, 3000, f64::NAN).is_err());
    }

    #[test]
    fn test_known_crop() {
        assert_eq!(
            compute_image_crop(4000, 3000, 3.2).unwrap(),
            CropDimensions::new(3850, 2789)
        );
        assert_eq!(
            compute_image_crop(1920, 1080, 10.0).unwrap(),
            CropDimensions::new(1812, 777)
        );
    }

    #[test]
    fn test_degenerate_crop_reported_unclamped() {
        // Tall narrow image at 30°: the width goes negative.
        let crop = compute_image_crop(100, 1000, 30.0).unwrap();
        assert_eq!(crop, CropDimensions::new(-827, 1632));
        assert!(crop.is_degenerate());
        assert!(matches!(
            crop.to_pixels(),
            Err(LevelError::DegenerateCrop { .. })
        ));
    }

    #[test]
    fn test_to_pixels() {
        assert_eq!(CropDimensions::new(12, 7).to_pixels().unwrap(), (12, 7));
        assert!(CropDimensions::new(0, 7).to_pixels().is_err());
    }

    #[test]
    fn test_identity_leveling() {
        let matrix = leveling_matrix((100, 80), (100, 80), 0.0);
        let (x, y) = transform_point(&matrix, 12.5, 70.0);
        assert!((x - 12.5).abs() < 1e-12);
        assert!((y - 70.0).abs() < 1e-12);
    }

    #[test]
    fn test_leveling_straightens_tilted_line() {
        // A horizontal step in the crop must follow the +5° line in the source.
        let matrix = leveling_matrix((400, 300), (360, 260), 5.0);
        let (x0, y0) = transform_point(&matrix, 100.0, 130.0);
        let (x1, y1) = transform_point(&matrix, 200.0, 130.0);
        let angle = (y1 - y0).atan2(x1 - x0).to_degrees();
        assert!((angle - 5.0).abs() < 1e-9);

        let (cx, cy) = transform_point(&matrix, 180.0, 130.0);
        assert!((cx - 200.0).abs() < 1e-9);
        assert!((cy - 150.0).abs() < 1e-9);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================
