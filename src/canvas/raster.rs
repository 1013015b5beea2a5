//! Raster snapshot of a drawing surface

use image::{DynamicImage, GrayImage, Rgba, RgbaImage};
use std::path::Path;
use thiserror::Error;

/// Errors raised while building a raster
#[derive(Error, Debug)]
pub enum RasterError {
    #[error("pixel buffer holds {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("raster has zero area ({0}x{1})")]
    Empty(u32, u32),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// A snapshot of the drawing surface
///
/// Pixels are RGBA. A raster is never mutated once captured; every pipeline
/// stage produces a new raster or tensor instead.
#[derive(Debug, Clone)]
pub struct Raster {
    image: RgbaImage,
}

impl Raster {
    /// Wrap an existing RGBA image
    pub fn new(image: RgbaImage) -> Result<Self, RasterError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(RasterError::Empty(width, height));
        }

        Ok(Self { image })
    }

    /// Build a raster from raw RGBA bytes (row-major, 4 bytes per pixel)
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32) -> Result<Self, RasterError> {
        let expected = width as usize * height as usize * 4;
        let actual = data.len();
        let image = RgbaImage::from_raw(width, height, data).ok_or(RasterError::BufferSize {
            width,
            height,
            expected,
            actual,
        })?;

        Self::new(image)
    }

    /// Build an opaque raster from a single-channel image
    pub fn from_gray(gray: &GrayImage) -> Result<Self, RasterError> {
        Self::new(DynamicImage::ImageLuma8(gray.clone()).to_rgba8())
    }

    /// Load a drawing from an image file (PNG, JPEG, ...)
    pub fn open(path: &Path) -> Result<Self, RasterError> {
        let img = image::open(path)?;
        Self::new(img.to_rgba8())
    }

    /// A canvas filled with a single color, as a freshly cleared drawing surface
    pub fn filled(width: u32, height: u32, color: Rgba<u8>) -> Result<Self, RasterError> {
        Self::new(RgbaImage::from_pixel(width, height, color))
    }

    /// Raster width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Raster height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Get raster dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Pixel at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.image.get_pixel(x, y)
    }

    /// Borrow the underlying image
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba() {
        let data = vec![
            255, 255, 255, 255, // white
            0, 0, 0, 255,       // black
        ];

        let raster = Raster::from_rgba(data, 2, 1).unwrap();
        assert_eq!(raster.dimensions(), (2, 1));
        assert_eq!(raster.pixel(1, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_from_rgba_wrong_size() {
        let result = Raster::from_rgba(vec![0; 7], 2, 1);
        assert!(matches!(
            result,
            Err(RasterError::BufferSize { expected: 8, actual: 7, .. })
        ));
    }

    #[test]
    fn test_zero_area_rejected() {
        assert!(matches!(
            Raster::from_rgba(vec![], 0, 4),
            Err(RasterError::Empty(0, 4))
        ));
    }

    #[test]
    fn test_from_gray_is_opaque() {
        let gray = GrayImage::from_pixel(3, 2, image::Luma([42]));
        let raster = Raster::from_gray(&gray).unwrap();
        assert_eq!(raster.pixel(2, 1), Rgba([42, 42, 42, 255]));
    }

    #[test]
    fn test_open_missing_file() {
        assert!(Raster::open(Path::new("/nonexistent/drawing.png")).is_err());
    }
}
