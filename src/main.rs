//! hwr - Handwritten character recognition CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use handwriting_recognizer::canvas::Raster;
use handwriting_recognizer::config::{self, AppConfig};
use handwriting_recognizer::status::Status;
use handwriting_recognizer::storage;
use handwriting_recognizer::vision::labels::display_label;
use handwriting_recognizer::vision::models::load_onnx_classifier;
use handwriting_recognizer::vision::preprocess::InkConvention;
use handwriting_recognizer::vision::{LabelTable, PredictionOutcome, Recognizer};

/// hwr - handwritten character recognition
#[derive(Parser, Debug)]
#[command(name = "hwr")]
#[command(about = "Recognize a hand-drawn character with a pretrained classifier")]
struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a drawing stored as an image file
    Predict {
        /// Drawing to classify (PNG, JPEG, ...)
        image: PathBuf,

        /// ONNX classifier to use
        #[arg(long)]
        model: Option<PathBuf>,

        /// Label table (JSON array or one label per line)
        #[arg(long)]
        labels: Option<PathBuf>,

        /// Padding around the ink, in pixels
        #[arg(long)]
        margin: Option<u32>,

        /// The drawing uses light ink on a dark background
        #[arg(long)]
        light_on_dark: bool,

        /// Where to write the preprocessed preview
        #[arg(long, conflicts_with = "no_preview")]
        preview: Option<PathBuf>,

        /// Do not write a preview
        #[arg(long)]
        no_preview: bool,

        /// Give up waiting for the model after this many seconds
        #[arg(long, default_value = "120")]
        load_timeout: u64,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the label table in classifier output order
    Labels {
        /// Label table (JSON array or one label per line)
        #[arg(long)]
        labels: Option<PathBuf>,
    },

    /// Write a synthetic drawing: a dark square on a white canvas
    Demo {
        /// Output image path
        output: PathBuf,

        /// Canvas side length
        #[arg(long, default_value = "100")]
        size: u32,

        /// Square side length
        #[arg(long, default_value = "10")]
        square: u32,
    },

    /// Write the default configuration
    InitConfig {
        /// Output path (defaults to the platform config directory)
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Predict {
            image,
            model,
            labels,
            margin,
            light_on_dark,
            preview,
            no_preview,
            load_timeout,
            json,
        } => {
            let mut config = load_or_create_config(args.config.as_deref())?;
            if let Some(model) = model {
                config.model.path = model;
            }
            if let Some(labels) = labels {
                config.model.labels_path = Some(labels);
            }
            if let Some(margin) = margin {
                config.preprocess.margin = margin;
            }
            if light_on_dark {
                config.preprocess.ink = InkConvention::LightOnDark;
            }
            if let Some(preview) = preview {
                config.preview.enabled = true;
                config.preview.path = preview;
            }
            if no_preview {
                config.preview.enabled = false;
            }

            let status = run_predict(&config, &image, Duration::from_secs(load_timeout))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", status);
            }

            if status.is_failure() {
                std::process::exit(1);
            }
        }
        Command::Labels { labels } => {
            let config = load_or_create_config(args.config.as_deref())?;
            let table = load_labels(labels.as_deref().or(config.model.labels_path.as_deref()))?;
            for (index, label) in table.iter().enumerate() {
                println!("{:>3}  {:<28} {}", index, label, display_label(label));
            }
        }
        Command::Demo { output, size, square } => {
            write_demo_drawing(&output, size, square)?;
            println!("Wrote {}x{} demo drawing to {:?}", size, size, output);
        }
        Command::InitConfig { path } => {
            let path = match path {
                Some(path) => path,
                None => storage::get_config_dir()?.join("config.toml"),
            };
            config::save_config(&AppConfig::default(), &path)?;
            println!("Wrote default configuration to {:?}", path);
        }
    }

    Ok(())
}

/// Load configuration from an explicit path, the config directory, or defaults
fn load_or_create_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            let config = config::load_config(&config_path)?;
            info!("Loaded configuration from {:?}", config_path);
            return Ok(config);
        }
    }

    info!("Using default configuration");
    Ok(AppConfig::default())
}

fn load_labels(path: Option<&Path>) -> Result<LabelTable> {
    match path {
        Some(path) => LabelTable::load(path).with_context(|| format!("Failed to load labels from {:?}", path)),
        None => Ok(LabelTable::default()),
    }
}

/// Load the model in the background, then classify one drawing
fn run_predict(config: &AppConfig, image: &Path, load_timeout: Duration) -> Result<Status> {
    config.validate()?;

    let labels = load_labels(config.model.labels_path.as_deref())?;
    let recognizer =
        Recognizer::new(labels, config.preprocess.clone()).with_preview(config.preview.clone());

    let model_settings = config.model.clone();
    let mut loading = recognizer.load_in_background(move || load_onnx_classifier(&model_settings));

    // Snapshot the drawing while the model loads
    let raster = Raster::open(image).with_context(|| format!("Failed to open drawing {:?}", image))?;
    info!("Loaded drawing {:?} ({}x{})", image, raster.width(), raster.height());

    match loading.wait_timeout(load_timeout) {
        Some(Ok(())) => {}
        Some(Err(e)) => return Ok(Status::Unavailable { reason: e.to_string() }),
        None => return Ok(Status::NotReady),
    }

    let outcome = recognizer.submit_drawing(&raster);
    if let PredictionOutcome::NoInk = outcome {
        info!("Canvas is empty, nothing to classify");
    }

    Ok(Status::from(&outcome))
}

fn write_demo_drawing(path: &Path, size: u32, square: u32) -> Result<()> {
    anyhow::ensure!(size > 0, "canvas size must be greater than zero");
    let square = square.min(size);
    let offset = ((size - square) / 2) as i32;

    let mut img = RgbaImage::from_pixel(size, size, Rgba([255, 255, 255, 255]));
    if square > 0 {
        draw_filled_rect_mut(
            &mut img,
            Rect::at(offset, offset).of_size(square, square),
            Rgba([0, 0, 0, 255]),
        );
    }

    img.save(path).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use handwriting_recognizer::vision::ink::{locate_ink, BoundingRect};
    use tempfile::TempDir;

    #[test]
    fn test_demo_drawing_has_centered_square() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("demo.png");
        write_demo_drawing(&path, 100, 10).unwrap();

        let raster = Raster::open(&path).unwrap();
        let bounds = locate_ink(&raster, 250, InkConvention::DarkOnLight).bounds();
        assert_eq!(bounds, Some(BoundingRect { min_x: 45, min_y: 45, max_x: 54, max_y: 54 }));
    }

    #[test]
    fn test_demo_drawing_without_square_is_blank() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blank.png");
        write_demo_drawing(&path, 20, 0).unwrap();

        let raster = Raster::open(&path).unwrap();
        assert!(locate_ink(&raster, 250, InkConvention::DarkOnLight).bounds().is_none());
    }

    #[test]
    fn test_predict_without_model_reports_unavailable() {
        let dir = TempDir::new().unwrap();
        let drawing = dir.path().join("demo.png");
        write_demo_drawing(&drawing, 64, 12).unwrap();

        let mut config = AppConfig::default();
        config.model.path = dir.path().join("missing.onnx");
        config.preview.enabled = false;

        let status = run_predict(&config, &drawing, Duration::from_secs(10)).unwrap();
        assert!(matches!(status, Status::Unavailable { .. }));
        assert!(status.is_failure());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["hwr", "predict", "drawing.png", "--margin", "8", "--json"]).unwrap();
        match args.command {
            Command::Predict { image, margin, json, .. } => {
                assert_eq!(image, PathBuf::from("drawing.png"));
                assert_eq!(margin, Some(8));
                assert!(json);
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Args::try_parse_from(["hwr", "predict", "x.png", "--preview", "p.png", "--no-preview"]).is_err());
    }
}
