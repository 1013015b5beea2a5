//! Handwritten character recognition
//!
//! Locates the ink on a drawing, crops it with a margin, resizes it to a
//! 32x32 normalized tensor and classifies it with a pretrained ONNX model.
//!
//! - [`canvas`]: immutable raster snapshots of the drawing surface
//! - [`vision`]: the preprocessing pipeline, classifier and label decoding
//! - [`status`]: the user-facing status slot
//! - [`config`] / [`storage`]: TOML settings and platform directories

pub mod canvas;
pub mod config;
pub mod status;
pub mod storage;
pub mod vision;
