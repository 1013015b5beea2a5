//! Ink localization
//!
//! Finds the bounding rectangle of everything the user drew.

use image::Rgba;
use tracing::{debug, warn};

use super::preprocess::InkConvention;
use crate::canvas::Raster;

/// Inclusive pixel rectangle enclosing all ink
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BoundingRect {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingRect {
    /// Width in pixels (inclusive bounds, so never zero)
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    /// Height in pixels (inclusive bounds, so never zero)
    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Whether (x, y) lies inside the rectangle
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// Outcome of an ink search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InkSearch {
    /// At least one ink pixel, bounded by the rectangle
    Found(BoundingRect),
    /// Only background: nothing to classify
    NotFound,
}

impl InkSearch {
    /// The bounding rectangle, if any ink was found
    pub fn bounds(&self) -> Option<BoundingRect> {
        match self {
            InkSearch::Found(rect) => Some(*rect),
            InkSearch::NotFound => None,
        }
    }
}

/// Whether a single pixel counts as ink
///
/// Transparent pixels are never ink. Otherwise the red channel is compared
/// against the background threshold: dark ink sits below it, light ink sits
/// above its mirror `255 - threshold`.
pub fn is_ink(pixel: Rgba<u8>, background_threshold: u8, convention: InkConvention) -> bool {
    let [red, _, _, alpha] = pixel.0;
    if alpha == 0 {
        return false;
    }

    match convention {
        InkConvention::DarkOnLight => red < background_threshold,
        InkConvention::LightOnDark => red > 255 - background_threshold,
    }
}

/// Scan every pixel and bound the ink
///
/// There is no early exit: the full scan is what guarantees the extremes.
pub fn locate_ink(raster: &Raster, background_threshold: u8, convention: InkConvention) -> InkSearch {
    let (width, height) = raster.dimensions();

    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut found = false;

    for (x, y, pixel) in raster.image().enumerate_pixels() {
        if is_ink(*pixel, background_threshold, convention) {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
            found = true;
        }
    }

    if !found {
        warn!("No ink detected on canvas ({}x{})", width, height);
        return InkSearch::NotFound;
    }

    let rect = BoundingRect { min_x, min_y, max_x, max_y };
    debug!("Ink bounds {:?} ({}x{})", rect, rect.width(), rect.height());
    InkSearch::Found(rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn canvas_with(width: u32, height: u32, background: Rgba<u8>, ink: &[(u32, u32)], color: Rgba<u8>) -> Raster {
        let mut img = RgbaImage::from_pixel(width, height, background);
        for &(x, y) in ink {
            img.put_pixel(x, y, color);
        }
        Raster::new(img).unwrap()
    }

    #[test]
    fn test_blank_canvas_not_found() {
        let raster = Raster::filled(40, 30, WHITE).unwrap();
        assert_eq!(locate_ink(&raster, 250, InkConvention::DarkOnLight), InkSearch::NotFound);
    }

    #[test]
    fn test_bounds_cover_scattered_ink() {
        let raster = canvas_with(50, 40, WHITE, &[(10, 30), (3, 7), (44, 12)], BLACK);

        let rect = locate_ink(&raster, 250, InkConvention::DarkOnLight).bounds().unwrap();
        assert_eq!(rect, BoundingRect { min_x: 3, min_y: 7, max_x: 44, max_y: 30 });
        assert_eq!(rect.width(), 42);
        assert_eq!(rect.height(), 24);
    }

    #[test]
    fn test_single_pixel_ink() {
        let raster = canvas_with(8, 8, WHITE, &[(0, 7)], BLACK);

        let rect = locate_ink(&raster, 250, InkConvention::DarkOnLight).bounds().unwrap();
        assert_eq!((rect.width(), rect.height()), (1, 1));
        assert!(rect.contains(0, 7));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        // 250 is background, 249 is ink
        let near_white = canvas_with(4, 4, WHITE, &[(1, 1)], Rgba([250, 250, 250, 255]));
        assert_eq!(locate_ink(&near_white, 250, InkConvention::DarkOnLight), InkSearch::NotFound);

        let light_gray = canvas_with(4, 4, WHITE, &[(1, 1)], Rgba([249, 249, 249, 255]));
        assert!(locate_ink(&light_gray, 250, InkConvention::DarkOnLight).bounds().is_some());
    }

    #[test]
    fn test_transparent_pixels_ignored() {
        let raster = canvas_with(6, 6, Rgba([0, 0, 0, 0]), &[], BLACK);
        assert_eq!(locate_ink(&raster, 250, InkConvention::DarkOnLight), InkSearch::NotFound);
    }

    #[test]
    fn test_light_on_dark() {
        let raster = canvas_with(20, 20, BLACK, &[(5, 6), (9, 2)], WHITE);

        assert_eq!(
            locate_ink(&raster, 250, InkConvention::LightOnDark),
            InkSearch::Found(BoundingRect { min_x: 5, min_y: 2, max_x: 9, max_y: 6 })
        );

        // Under the dark-on-light convention the whole black canvas reads as ink
        let rect = locate_ink(&raster, 250, InkConvention::DarkOnLight).bounds().unwrap();
        assert_eq!((rect.width(), rect.height()), (20, 20));
    }
}
