//! CPU image primitives for the surround-view engine.
//!
//! Everything the stitching pipeline touches per frame lives here:
//! bilinear resize, border-aware sampling, dense remap, perspective
//! estimation, and image pyramids. Hot loops are parallelized across
//! rows with Rayon.

pub mod geometry;
pub mod pyramid;
pub mod resize;
pub mod sample;

pub use geometry::*;
pub use pyramid::*;
pub use resize::*;
pub use sample::*;

pub use sv_core::{Error, Result};

use image::{ImageBuffer, Luma};

/// Single-channel f32 buffer, used for blend weights.
pub type GrayF32Image = ImageBuffer<Luma<f32>, Vec<f32>>;
