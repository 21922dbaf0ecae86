use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::error::Result;
use crate::geometry::{compute_image_crop, leveling_matrix, transform_point};

/// Premultiply alpha: RGB values are multiplied by alpha
fn premultiply_alpha(img: &RgbaImage) -> Vec<[f64; 4]> {
    img.pixels()
        .map(|pixel| {
            let alpha = pixel[3] as f64 / 255.0;
            [
                pixel[0] as f64 * alpha,
                pixel[1] as f64 * alpha,
                pixel[2] as f64 * alpha,
                pixel[3] as f64,
            ]
        })
        .collect()
}

/// Unpremultiply alpha: divide RGB by alpha
fn unpremultiply_alpha(premultiplied: [f64; 4]) -> Rgba<u8> {
    let alpha = premultiplied[3];
    if alpha < 1.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let alpha_norm = alpha / 255.0;
    let r = (premultiplied[0] / alpha_norm).round().clamp(0.0, 255.0) as u8;
    let g = (premultiplied[1] / alpha_norm).round().clamp(0.0, 255.0) as u8;
    let b = (premultiplied[2] / alpha_norm).round().clamp(0.0, 255.0) as u8;
    let a = alpha.round().clamp(0.0, 255.0) as u8;

    Rgba([r, g, b, a])
}

/// Cubic interpolation kernel (Catmull-Rom)
fn cubic_weight(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;

    [
        -0.5 * t3 + t2 - 0.5 * t,
        1.5 * t3 - 2.5 * t2 + 1.0,
        -1.5 * t3 + 2.0 * t2 + 0.5 * t,
        0.5 * t3 - 0.5 * t2,
    ]
}

/// Bicubic interpolation at a position given in pixel-index space
/// (pixel (i, j) sits at (i, j)). Samples outside the image are clamped.
fn bicubic_interpolate(
    premultiplied: &[[f64; 4]],
    width: u32,
    height: u32,
    x: f64,
    y: f64,
) -> [f64; 4] {
    let x_floor = x.floor() as i64;
    let y_floor = y.floor() as i64;
    let wx = cubic_weight(x - x.floor());
    let wy = cubic_weight(y - y.floor());

    let mut result = [0.0; 4];

    for (j, weight_y) in wy.iter().enumerate() {
        let py = (y_floor + j as i64 - 1).clamp(0, height as i64 - 1) as usize;
        for (i, weight_x) in wx.iter().enumerate() {
            let px = (x_floor + i as i64 - 1).clamp(0, width as i64 - 1) as usize;
            let sample = &premultiplied[py * width as usize + px];

            let weight = weight_x * weight_y;
            for c in 0..4 {
                result[c] += sample[c] * weight;
            }
        }
    }

    result
}

/// Rotate `img` by `-tilt_degrees` about its center and cut out the largest
/// axis-aligned rectangle that contains no blank corners.
///
/// Fails when the crop formula is singular for this angle or the resulting
/// crop would be empty.
pub fn level_and_crop(img: &RgbaImage, tilt_degrees: f64) -> Result<RgbaImage> {
    let (src_width, src_height) = img.dimensions();
    let (crop_width, crop_height) =
        compute_image_crop(src_width, src_height, tilt_degrees)?.to_pixels()?;

    if tilt_degrees == 0.0 {
        return Ok(img.clone());
    }

    debug!(
        src_width,
        src_height, crop_width, crop_height, tilt_degrees, "leveling image"
    );

    let matrix = leveling_matrix(
        (src_width, src_height),
        (crop_width, crop_height),
        tilt_degrees,
    );
    let premultiplied = premultiply_alpha(img);

    let mut output = RgbaImage::new(crop_width, crop_height);

    for (out_x, out_y, pixel) in output.enumerate_pixels_mut() {
        // Map the output pixel center, then shift back to index space.
        let (src_x, src_y) = transform_point(&matrix, out_x as f64 + 0.5, out_y as f64 + 0.5);

        // Only reachable through rounding at the very edge of the crop.
        if src_x < 0.0 || src_x > src_width as f64 || src_y < 0.0 || src_y > src_height as f64 {
            *pixel = Rgba([0, 0, 0, 0]);
            continue;
        }

        let interpolated = bicubic_interpolate(
            &premultiplied,
            src_width,
            src_height,
            src_x - 0.5,
            src_y - 0.5,
        );
        *pixel = unpremultiply_alpha(interpolated);
    }

    Ok(output)
}
