//! Surround-view stitching engine.
//!
//! Converts per-camera calibration into fixed spherical warp tables,
//! composites four independently-exposed streams into one
//! photometrically consistent panorama per frame, and periodically
//! re-balances exposure without stalling the frame path.
//!
//! # Pipeline
//!
//! Setup (once): calibration → warp geometry → overlap masks → blender
//! preparation → gain seeding → optional output crop.
//!
//! Per frame: scale → gain-correct → remap through the fixed tables →
//! multi-band blend → crop or resize.

pub mod blend;
pub mod calib;
pub mod crop;
pub mod gain;
pub mod mask;
pub mod pipeline;
pub mod warp;

pub use blend::*;
pub use calib::*;
pub use crop::*;
pub use gain::*;
pub use mask::*;
pub use pipeline::*;
pub use warp::*;

pub use sv_core::{Error, Result};
