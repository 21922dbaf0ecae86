use anyhow::{Context, Result};
use clap::Parser;
use image::{DynamicImage, ImageReader};
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

use level_crop::cli::{default_output_path, Command, TuningArgs};
use level_crop::{compute_image_crop, level_and_crop, Cli, RasterImage, TiltEstimator};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Estimate { input, tuning } => {
            let img = load_image(&input)?;
            let tilt = estimate(&img, &tuning)?;
            println!("Tilt estimated: {:.2}°", tilt);
        }
        Command::Crop {
            width,
            height,
            rotation,
        } => {
            let crop = compute_image_crop(width, height, rotation)?;
            println!(
                "Render size set to {}×{}px (from {}×{}px @ {:.2}°)",
                crop.width, crop.height, width, height, rotation
            );
        }
        Command::Level {
            input,
            output,
            rotation,
            tuning,
        } => {
            let img = load_image(&input)?;

            let tilt = match rotation {
                Some(manual) => {
                    info!(rotation = manual, "using manual rotation");
                    manual
                }
                None => estimate(&img, &tuning)?,
            };

            let rgba = img.to_rgba8();
            let leveled = level_and_crop(&rgba, tilt)
                .with_context(|| format!("Failed to level {:?} by {:.2}°", input, tilt))?;

            let output_path = output.unwrap_or_else(|| default_output_path(&input));
            leveled
                .save(&output_path)
                .with_context(|| format!("Failed to save output: {:?}", output_path))?;

            eprintln!("Saved leveled image: {:?}", output_path);
            eprintln!(
                "Dimensions: {}x{} -> {}x{} @ {:.2}°",
                img.width(),
                img.height(),
                leveled.width(),
                leveled.height(),
                tilt
            );
        }
    }

    Ok(())
}

fn load_image(path: &Path) -> Result<DynamicImage> {
    let img = ImageReader::open(path)
        .with_context(|| format!("Failed to open input file: {:?}", path))?
        .decode()
        .with_context(|| format!("Failed to decode image: {:?}", path))?;

    info!(path = ?path, width = img.width(), height = img.height(), "loaded image");
    Ok(img)
}

fn estimate(img: &DynamicImage, tuning: &TuningArgs) -> Result<f64> {
    let raster = RasterImage::from_dynamic(img);
    let estimate = TiltEstimator::new(tuning.to_config())
        .estimate(&raster)
        .context("Failed to estimate tilt")?;

    info!(
        tilt = estimate.angle_degrees,
        segments = estimate.segment_count,
        candidates = estimate.candidate_count,
        "tilt estimated"
    );

    Ok(estimate.angle_degrees)
}
