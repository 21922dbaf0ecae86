use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::EstimatorConfig;

#[derive(Parser, Debug)]
#[command(name = "level-crop")]
#[command(version, about = "Estimate image tilt from straight edges and crop the leveled image")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Show detection details
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Estimate the tilt of an image
    Estimate {
        /// Input image path
        input: PathBuf,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// Compute the inscribed crop for a rotated image size
    Crop {
        /// Original width in pixels
        #[arg(long)]
        width: u32,

        /// Original height in pixels
        #[arg(long)]
        height: u32,

        /// Rotation in degrees
        #[arg(long, allow_hyphen_values = true)]
        rotation: f64,
    },

    /// Level an image and crop it to the largest rectangle without blank corners
    Level {
        /// Input image path
        input: PathBuf,

        /// Output path [default: input_leveled.png]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Manual rotation override in degrees (skips estimation)
        #[arg(short, long, allow_hyphen_values = true)]
        rotation: Option<f64>,

        #[command(flatten)]
        tuning: TuningArgs,
    },
}

/// Overrides for the estimator's tuning constants.
#[derive(Args, Debug, Clone)]
pub struct TuningArgs {
    /// Canny low threshold
    #[arg(long, default_value = "40")]
    pub canny_low: f32,

    /// Canny high threshold
    #[arg(long, default_value = "120")]
    pub canny_high: f32,

    /// Ignore segments shorter than this (pixels)
    #[arg(long, default_value = "60")]
    pub min_length: f64,

    /// Accepted deviation from vertical (degrees)
    #[arg(long, default_value = "15")]
    pub vertical_tolerance: f64,

    /// Accepted deviation from horizontal (degrees)
    #[arg(long, default_value = "10")]
    pub horizontal_tolerance: f64,

    /// CLAHE clip limit
    #[arg(long, default_value = "2.0")]
    pub clip_limit: f64,

    /// CLAHE tile grid size (tiles per side)
    #[arg(long, default_value = "8")]
    pub tiles: u32,
}

impl TuningArgs {
    pub fn to_config(&self) -> EstimatorConfig {
        let mut config = EstimatorConfig::default();
        config.edges.canny_low = self.canny_low;
        config.edges.canny_high = self.canny_high;
        config.tilt.min_length = self.min_length;
        config.tilt.vertical_tolerance = self.vertical_tolerance;
        config.tilt.horizontal_tolerance = self.horizontal_tolerance;
        config.band.clip_limit = self.clip_limit;
        config.band.tile_grid = (self.tiles, self.tiles);
        config
    }
}

/// Default output path: `<stem>_leveled.png` next to the input.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{}_leveled.png", stem))
}
