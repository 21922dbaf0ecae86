use image::DynamicImage;

use crate::error::{LevelError, Result};

/// Number of interleaved samples per pixel (RGBA).
pub const CHANNELS: usize = 4;

/// Row-major RGBA image with normalized samples in [0, 1], top row first.
///
/// The pipeline only ever reads from it.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    pixels: Vec<f32>,
}

impl RasterImage {
    /// Wrap an existing sample buffer. The buffer must hold exactly
    /// `width * height * 4` samples.
    pub fn new(width: u32, height: u32, pixels: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if pixels.len() != expected {
            return Err(LevelError::InvalidInput(format!(
                "pixel buffer holds {} samples, expected {} for {}x{} RGBA",
                pixels.len(),
                expected,
                width,
                height
            )));
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Uniformly colored image, mostly useful for tests.
    pub fn from_pixel(width: u32, height: u32, rgba: [f32; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * CHANNELS);
        for _ in 0..count {
            pixels.extend_from_slice(&rgba);
        }

        Self {
            width,
            height,
            pixels,
        }
    }

    /// Convert any decoded image into normalized RGBA samples.
    pub fn from_dynamic(img: &DynamicImage) -> Self {
        let rgba = img.to_rgba32f();
        let (width, height) = rgba.dimensions();

        Self {
            width,
            height,
            pixels: rgba.into_raw(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// RGBA samples of the pixel at (x, y).
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[f32] {
        let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
        &self.pixels[idx..idx + CHANNELS]
    }

    /// Set one pixel. Panics when (x, y) is out of bounds.
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [f32; 4]) {
        let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
        self.pixels[idx..idx + CHANNELS].copy_from_slice(&rgba);
    }
}
