//! Turns a full RGBA raster into the contrast-enhanced grayscale band that
//! the line source analyzes.
//!
//! Only the central rows of the image are kept: frame borders, sky and floor
//! tend to produce long edges that say nothing about the tilt.

use image::{GrayImage, Luma};
use tracing::debug;

use crate::config::BandOptions;
use crate::error::{LevelError, Result};
use crate::raster::RasterImage;

const BINS: usize = 256;

/// Scale a normalized sample to 8 bits (truncating) and clamp to [0, 255].
#[inline]
fn to_u8(sample: f32) -> u8 {
    (sample * 255.0).trunc().clamp(0.0, 255.0) as u8
}

/// Standard luminance of an 8-bit RGB triple.
#[inline]
fn luminance(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Row range `[start, end)` of the analysis band for an image of `height` rows.
pub fn band_rows(height: u32, options: &BandOptions) -> (u32, u32) {
    let start = (options.start * height as f64) as u32;
    let end = ((options.end * height as f64) as u32).min(height);
    (start.min(end), end)
}

/// Convert the band rows of `image` to 8-bit grayscale and equalize them.
pub fn extract_band(image: &RasterImage, options: &BandOptions) -> Result<GrayImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(LevelError::InvalidInput(format!(
            "invalid image dimensions {}x{}",
            width, height
        )));
    }

    let (row_start, row_end) = band_rows(height, options);
    let mut gray = GrayImage::new(width, row_end - row_start);

    for y in row_start..row_end {
        for x in 0..width {
            let px = image.pixel(x, y);
            let luma = luminance(to_u8(px[0]), to_u8(px[1]), to_u8(px[2]));
            gray.put_pixel(x, y - row_start, Luma([luma]));
        }
    }

    debug!(
        width,
        rows = row_end - row_start,
        row_start,
        "extracted analysis band"
    );

    Ok(apply_clahe(&gray, options.clip_limit, options.tile_grid))
}

/// Contrast limited adaptive histogram equalization.
///
/// Each tile gets its own clipped-histogram lookup table. Every pixel is
/// mapped through the four nearest tile tables and bilinearly blended, so
/// tile borders do not show.
pub fn apply_clahe(gray: &GrayImage, clip_limit: f64, tile_grid: (u32, u32)) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let tile_w = width.div_ceil(tile_grid.0.clamp(1, width));
    let tile_h = height.div_ceil(tile_grid.1.clamp(1, height));
    let tiles_x = width.div_ceil(tile_w) as usize;
    let tiles_y = height.div_ceil(tile_h) as usize;

    let mut luts = Vec::with_capacity(tiles_x * tiles_y);
    for ty in 0..tiles_y as u32 {
        for tx in 0..tiles_x as u32 {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(tile_lut(gray, (x0, y0, x1, y1), clip_limit));
        }
    }

    let mut output = GrayImage::new(width, height);

    for y in 0..height {
        let (ty0, ty1, ay) = tile_neighbors(y, tile_h, tiles_y);
        for x in 0..width {
            let (tx0, tx1, ax) = tile_neighbors(x, tile_w, tiles_x);
            let v = gray.get_pixel(x, y)[0] as usize;

            let top = luts[ty0 * tiles_x + tx0][v] as f64 * (1.0 - ax)
                + luts[ty0 * tiles_x + tx1][v] as f64 * ax;
            let bottom = luts[ty1 * tiles_x + tx0][v] as f64 * (1.0 - ax)
                + luts[ty1 * tiles_x + tx1][v] as f64 * ax;
            let value = top * (1.0 - ay) + bottom * ay;

            output.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }

    output
}

/// Indices of the two tiles whose centers bracket `pos`, and the blend weight
/// of the second one.
#[inline]
fn tile_neighbors(pos: u32, tile_size: u32, tiles: usize) -> (usize, usize, f64) {
    let f = ((pos as f64 + 0.5) / tile_size as f64 - 0.5).clamp(0.0, (tiles - 1) as f64);
    let i0 = f.floor() as usize;
    let i1 = (i0 + 1).min(tiles - 1);
    (i0, i1, f - i0 as f64)
}

/// Equalization table of one tile with its histogram clipped at
/// `clip_limit` times the uniform bin height.
fn tile_lut(gray: &GrayImage, (x0, y0, x1, y1): (u32, u32, u32, u32), clip_limit: f64) -> [u8; BINS] {
    let mut hist = [0u32; BINS];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let area = ((x1 - x0) * (y1 - y0)) as u64;
    let clip = ((clip_limit * area as f64 / BINS as f64) as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }

    // Spread the clipped mass evenly, then the remainder at a fixed stride.
    let batch = excess / BINS as u32;
    let residual = (excess % BINS as u32) as usize;
    for bin in hist.iter_mut() {
        *bin += batch;
    }
    if residual > 0 {
        let step = (BINS / residual).max(1);
        for bin in hist.iter_mut().step_by(step).take(residual) {
            *bin += 1;
        }
    }

    let scale = 255.0 / area as f64;
    let mut lut = [0u8; BINS];
    let mut cumulative = 0u64;
    for (value, count) in hist.iter().enumerate() {
        cumulative += *count as u64;
        lut[value] = (cumulative as f64 * scale).round().clamp(0.0, 255.0) as u8;
    }

    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_u8_truncates_and_clamps() {
        assert_eq!(to_u8(0.0), 0);
        assert_eq!(to_u8(1.0), 255);
        assert_eq!(to_u8(0.999), 254);
        assert_eq!(to_u8(1.5), 255);
        assert_eq!(to_u8(-0.2), 0);
    }

    #[test]
    fn test_band_rows() {
        let options = BandOptions::default();
        assert_eq!(band_rows(3000, &options), (750, 2250));
        assert_eq!(band_rows(10, &options), (2, 7));
        assert_eq!(band_rows(1, &options), (0, 0));
    }

    #[test]
    fn test_rejects_zero_dimensions() {
        let options = BandOptions::default();
        let img = RasterImage::new(0, 4, Vec::new()).unwrap();
        assert!(matches!(
            extract_band(&img, &options),
            Err(LevelError::InvalidInput(_))
        ));

        let img = RasterImage::new(4, 0, Vec::new()).unwrap();
        assert!(extract_band(&img, &options).is_err());
    }

    #[test]
    fn test_band_has_central_rows_only() {
        let img = RasterImage::from_pixel(40, 100, [0.5, 0.5, 0.5, 1.0]);
        let band = extract_band(&img, &BandOptions::default()).unwrap();
        assert_eq!(band.dimensions(), (40, 50));
    }

    #[test]
    fn test_band_ignores_outer_rows() {
        // Bright top and bottom quarters, dark middle: the band must be
        // uniform, so equalization maps it to a single value.
        let mut img = RasterImage::from_pixel(16, 16, [0.1, 0.1, 0.1, 1.0]);
        for y in (0..4).chain(12..16) {
            for x in 0..16 {
                img.put_pixel(x, y, [1.0, 1.0, 1.0, 1.0]);
            }
        }

        let band = extract_band(&img, &BandOptions::default()).unwrap();
        assert_eq!(band.dimensions(), (16, 8));
        let first = band.get_pixel(0, 0)[0];
        assert!(band.pixels().all(|p| p[0] == first));
    }

    #[test]
    fn test_input_not_mutated() {
        let img = RasterImage::from_pixel(20, 20, [0.3, 0.6, 0.9, 1.0]);
        let before = img.clone();
        let _ = extract_band(&img, &BandOptions::default()).unwrap();
        assert_eq!(img, before);
    }

    fn checkerboard(size: u32, low: u8, high: u8) -> GrayImage {
        let mut gray = GrayImage::new(size, size);
        for y in 0..size {
            for x in 0..size {
                let v = if (x + y) % 2 == 0 { low } else { high };
                gray.put_pixel(x, y, Luma([v]));
            }
        }
        gray
    }

    #[test]
    fn test_clahe_stretches_low_contrast() {
        let gray = checkerboard(256, 100, 110);

        let out = apply_clahe(&gray, 40.0, (8, 8));
        let low = out.get_pixel(128, 128)[0] as i32;
        let high = out.get_pixel(129, 128)[0] as i32;
        assert!(high - low > 30, "expected contrast boost, got {low} vs {high}");
    }

    #[test]
    fn test_clip_limit_bounds_the_boost() {
        let gray = checkerboard(256, 100, 110);

        let spread = |clip: f64| {
            let out = apply_clahe(&gray, clip, (8, 8));
            out.get_pixel(129, 128)[0] as i32 - out.get_pixel(128, 128)[0] as i32
        };

        assert!(spread(2.0) < spread(40.0));
        assert!(spread(2.0) >= 10);
    }

    #[test]
    fn test_clahe_small_and_empty_images() {
        let empty = GrayImage::new(5, 0);
        assert_eq!(apply_clahe(&empty, 2.0, (8, 8)).dimensions(), (5, 0));

        let tiny = GrayImage::from_pixel(3, 2, Luma([50]));
        assert_eq!(apply_clahe(&tiny, 2.0, (8, 8)).dimensions(), (3, 2));
    }
}
