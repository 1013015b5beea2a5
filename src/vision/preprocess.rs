//! Image preprocessing for the character classifier
//!
//! Handles grayscale reduction, nearest-neighbor resizing, normalization, and
//! tensor conversion. The output is an NHWC tensor of shape (1, 32, 32, 1)
//! with every value in [0, 1].

use image::{GrayImage, Luma};
use ndarray::{Array2, Array4, Axis};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use super::crop::crop_with_margin;
use super::ink::{locate_ink, BoundingRect, InkSearch};
use crate::canvas::{Raster, RasterError};
use crate::config::PreprocessSettings;

/// Which part of the canvas is fed to the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessMode {
    /// Crop to the ink bounding box plus margin, then resize
    #[default]
    Enhanced,
    /// Resize the whole canvas without cropping
    WholeCanvas,
}

/// How ink and background are drawn on the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InkConvention {
    /// Dark strokes on a light background (the classifier's training distribution)
    #[default]
    DarkOnLight,
    /// Light strokes on a dark background; normalized values are inverted
    LightOnDark,
}

/// Reduction of RGB to one intensity channel
///
/// Every mode returns `v` unchanged for a pixel with R = G = B = v. The ink
/// locator always tests the red channel, so only `Red` agrees with it on
/// colored strokes: with `Average` or `Luma`, pure red ink is background to
/// the locator but gray to the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrayscaleMode {
    /// Take the red channel as-is
    #[default]
    Red,
    /// Rounded mean of R, G and B
    Average,
    /// ITU-R BT.601 luma, 0.299 R + 0.587 G + 0.114 B, rounded half up
    Luma,
}

impl GrayscaleMode {
    /// Reduce one pixel. Alpha is ignored.
    pub fn reduce(self, r: u8, g: u8, b: u8) -> u8 {
        let (r, g, b) = (r as u32, g as u32, b as u32);
        let value = match self {
            GrayscaleMode::Red => r,
            GrayscaleMode::Average => (r + g + b + 1) / 3,
            // Integer weights keep the result exact for gray input
            GrayscaleMode::Luma => (299 * r + 587 * g + 114 * b + 500) / 1000,
        };
        value.min(255) as u8
    }
}

/// Output of a successful preprocessing pass
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Classifier input, shape (1, size, size, 1)
    pub tensor: Array4<f32>,
    /// Ink bounding box on the source canvas
    pub ink_bounds: BoundingRect,
    /// Dimensions of the region that was resized
    pub region_size: (u32, u32),
}

impl Preprocessed {
    /// The size x size grid without batch and channel axes
    pub fn grid(&self) -> Array2<f32> {
        self.tensor
            .index_axis(Axis(0), 0)
            .index_axis(Axis(2), 0)
            .to_owned()
    }
}

/// Result of preprocessing a drawing
#[derive(Debug, Clone)]
pub enum PreprocessOutcome {
    /// The drawing is ready for the classifier
    Ready(Preprocessed),
    /// The canvas holds no ink
    NoInk,
}

/// Reduce an RGBA raster to a single intensity channel
pub fn to_grayscale(raster: &Raster, mode: GrayscaleMode) -> GrayImage {
    let (width, height) = raster.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let [r, g, b, _] = raster.pixel(x, y).0;
        Luma([mode.reduce(r, g, b)])
    })
}

/// Nearest-neighbor resize to `size` x `size`
///
/// Destination pixel `d` samples source pixel `floor(d * in / out)`, without
/// half-pixel centers or corner alignment. No blending takes place, so hard
/// stroke edges survive.
pub fn resize_nearest(gray: &GrayImage, size: u32) -> GrayImage {
    let (width, height) = gray.dimensions();

    GrayImage::from_fn(size, size, |x, y| {
        let src_x = source_index(x, width, size);
        let src_y = source_index(y, height, size);
        *gray.get_pixel(src_x, src_y)
    })
}

fn source_index(dst: u32, src_len: u32, dst_len: u32) -> u32 {
    let idx = dst as u64 * src_len as u64 / dst_len as u64;
    (idx as u32).min(src_len.saturating_sub(1))
}

/// Scale intensities into [0, 1], inverting for light-on-dark drawings
pub fn normalize(gray: &GrayImage, convention: InkConvention) -> Array2<f32> {
    let (width, height) = gray.dimensions();

    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        let value = gray.get_pixel(x as u32, y as u32).0[0] as f32 / 255.0;
        match convention {
            InkConvention::DarkOnLight => value,
            InkConvention::LightOnDark => 1.0 - value,
        }
    })
}

/// Add batch and channel axes: (H, W) -> (1, H, W, 1)
pub fn to_batch_tensor(grid: Array2<f32>) -> Array4<f32> {
    grid.insert_axis(Axis(2)).insert_axis(Axis(0))
}

/// Grayscale, resize and normalize an already-cropped raster
pub fn resize_normalize(raster: &Raster, settings: &PreprocessSettings) -> Array4<f32> {
    let gray = to_grayscale(raster, settings.grayscale);
    let resized = resize_nearest(&gray, settings.target_size);
    to_batch_tensor(normalize(&resized, settings.ink))
}

/// Full preprocessing pipeline: locate ink, crop with margin, resize, normalize
///
/// Returns [`PreprocessOutcome::NoInk`] for an empty canvas without cropping
/// or resizing anything.
pub fn preprocess_drawing(
    raster: &Raster,
    settings: &PreprocessSettings,
) -> Result<PreprocessOutcome, RasterError> {
    let start = Instant::now();

    let ink_bounds = match locate_ink(raster, settings.background_threshold, settings.ink) {
        InkSearch::Found(rect) => rect,
        InkSearch::NotFound => return Ok(PreprocessOutcome::NoInk),
    };

    let (tensor, region_size) = match settings.mode {
        PreprocessMode::Enhanced => {
            let cropped = crop_with_margin(raster, ink_bounds, settings.margin)?;
            (resize_normalize(&cropped, settings), cropped.dimensions())
        }
        PreprocessMode::WholeCanvas => (resize_normalize(raster, settings), raster.dimensions()),
    };

    debug!(
        "Preprocessed {:?} region {}x{} into {:?} in {:?}",
        settings.mode,
        region_size.0,
        region_size.1,
        tensor.dim(),
        start.elapsed()
    );

    Ok(PreprocessOutcome::Ready(Preprocessed {
        tensor,
        ink_bounds,
        region_size,
    }))
}
