//! Drawing Surface Layer
//!
//! Immutable raster snapshots of whatever the user drew on. The recognition
//! pipeline only ever reads a [`Raster`]; it never cares how the pixels got there.

pub mod raster;

pub use raster::{Raster, RasterError};
