use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{Error, Result};

/// Process-level knobs the stitching pipeline's setup depends on.
///
/// The defaults mirror a typical four-camera HD rig; deployments may
/// override them from a JSON file via [`StitchConfig::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    /// Number of cameras in the rig.
    pub num_cameras: usize,
    /// Expected per-camera input resolution (width, height).
    pub input_width: u32,
    pub input_height: u32,
    /// Output canvas resolution (width, height).
    pub output_width: u32,
    pub output_height: u32,
    /// Working-resolution scale applied before warping. Warp tables are
    /// built for the scaled resolution, so this trades sharpness for
    /// per-frame cost.
    pub process_scale: f32,
    /// Number of bands in the multi-band blender.
    pub blend_bands: usize,
    /// Cadence, in seconds, at which the owning loop should trigger a
    /// gain recompute.
    pub gain_update_interval_secs: u64,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            num_cameras: 4,
            input_width: 1920,
            input_height: 1080,
            output_width: 1280,
            output_height: 720,
            process_scale: 0.5,
            blend_bands: 5,
            gain_update_interval_secs: 30,
        }
    }
}

impl StitchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("failed to read config {}: {e}", path.display()))
        })?;
        let config: StitchConfig = serde_json::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("failed to parse config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_cameras == 0 {
            return Err(Error::configuration("num_cameras must be >= 1"));
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err(Error::configuration("input resolution must be non-zero"));
        }
        if self.output_width == 0 || self.output_height == 0 {
            return Err(Error::configuration("output resolution must be non-zero"));
        }
        if !(self.process_scale > 0.0 && self.process_scale <= 1.0) {
            return Err(Error::configuration(format!(
                "process_scale must be in (0, 1], got {}",
                self.process_scale
            )));
        }
        if self.blend_bands == 0 {
            return Err(Error::configuration("blend_bands must be >= 1"));
        }
        Ok(())
    }

    /// Working resolution the warp stage operates at.
    pub fn scaled_input_size(&self) -> (u32, u32) {
        let w = ((self.input_width as f32 * self.process_scale).round() as u32).max(1);
        let h = ((self.input_height as f32 * self.process_scale).round() as u32).max(1);
        (w, h)
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.output_width, self.output_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = StitchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scaled_input_size(), (960, 540));
    }

    #[test]
    fn rejects_zero_scale() {
        let config = StitchConfig {
            process_scale: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let parsed: StitchConfig = serde_json::from_str(r#"{"blend_bands": 3}"#).unwrap();
        assert_eq!(parsed.blend_bands, 3);
        assert_eq!(parsed.num_cameras, 4);
    }
}
