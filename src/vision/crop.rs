//! Crop the ink region with a margin of background around it

use image::imageops;
use tracing::debug;

use super::ink::BoundingRect;
use crate::canvas::{Raster, RasterError};

/// Grow `rect` by `margin` on every side and clamp it to a `width` x `height` raster
///
/// Clamping is monotone, so a non-degenerate input rectangle stays
/// non-degenerate and the result is always at least 1x1.
pub fn expand_with_margin(rect: BoundingRect, margin: u32, width: u32, height: u32) -> BoundingRect {
    let last_x = width.saturating_sub(1);
    let last_y = height.saturating_sub(1);

    BoundingRect {
        min_x: rect.min_x.saturating_sub(margin).min(last_x),
        min_y: rect.min_y.saturating_sub(margin).min(last_y),
        max_x: rect.max_x.saturating_add(margin).min(last_x),
        max_y: rect.max_y.saturating_add(margin).min(last_y),
    }
}

/// Extract the ink region plus margin into a new raster
pub fn crop_with_margin(raster: &Raster, rect: BoundingRect, margin: u32) -> Result<Raster, RasterError> {
    let (width, height) = raster.dimensions();
    let region = expand_with_margin(rect, margin, width, height);

    debug!(
        "Cropping {}x{} at ({}, {}) from {}x{} canvas (margin {})",
        region.width(),
        region.height(),
        region.min_x,
        region.min_y,
        width,
        height,
        margin
    );

    let cropped = imageops::crop_imm(
        raster.image(),
        region.min_x,
        region.min_y,
        region.width(),
        region.height(),
    )
    .to_image();

    Raster::new(cropped)
}
