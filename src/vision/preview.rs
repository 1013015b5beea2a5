//! Preview of the preprocessed classifier input
//!
//! Purely observational: rendering works on a borrowed grid and never touches
//! the tensor handed to the classifier.

use anyhow::{Context, Result};
use image::{imageops, GrayImage, Luma};
use ndarray::Array2;
use std::path::Path;
use tracing::debug;

/// Scale a normalized grid back to 0-255 grayscale
pub fn render_preview(grid: &Array2<f32>) -> GrayImage {
    let (height, width) = grid.dim();

    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let value = (grid[[y as usize, x as usize]] * 255.0).round().clamp(0.0, 255.0);
        Luma([value as u8])
    })
}

/// Render the grid and write it as a PNG, upscaled `scale` times for display
pub fn save_preview(grid: &Array2<f32>, path: &Path, scale: u32) -> Result<()> {
    let preview = render_preview(grid);
    let preview = if scale > 1 {
        imageops::resize(
            &preview,
            preview.width() * scale,
            preview.height() * scale,
            imageops::FilterType::Nearest,
        )
    } else {
        preview
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create preview directory {:?}", parent))?;
    }

    preview
        .save(path)
        .with_context(|| format!("Failed to write preview image {:?}", path))?;

    debug!("Wrote {}x{} preview to {:?}", preview.width(), preview.height(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_scales_back() {
        let grid = Array2::from_shape_vec((2, 2), vec![0.0, 1.0, 0.2, 0.5]).unwrap();
        let preview = render_preview(&grid);

        assert_eq!(preview.dimensions(), (2, 2));
        assert_eq!(preview.get_pixel(0, 0).0[0], 0);
        assert_eq!(preview.get_pixel(1, 0).0[0], 255);
        assert_eq!(preview.get_pixel(0, 1).0[0], 51);
        assert_eq!(preview.get_pixel(1, 1).0[0], 128);
    }

    #[test]
    fn test_render_leaves_grid_untouched() {
        let grid = Array2::from_elem((32, 32), 0.25f32);
        let before = grid.clone();
        let _ = render_preview(&grid);
        assert_eq!(grid, before);
    }

    #[test]
    fn test_save_upscaled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("preview.png");
        let grid = Array2::from_elem((32, 32), 1.0f32);

        save_preview(&grid, &path, 4).unwrap();

        let written = image::open(&path).unwrap().to_luma8();
        assert_eq!(written.dimensions(), (128, 128));
        assert!(written.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn test_save_to_unwritable_path_fails() {
        let dir = TempDir::new().unwrap();
        // a directory cannot be overwritten by a file
        let grid = Array2::from_elem((4, 4), 0.0f32);
        assert!(save_preview(&grid, dir.path(), 1).is_err());
    }
}
