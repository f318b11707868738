use image::{Rgb32FImage, RgbImage};
use log::info;
use rayon::prelude::*;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sv_core::{CameraRoster, Error, Result, StitchConfig};
use sv_imgproc::{remap_rgb_to_f32, resize_rgb, BorderMode};

use crate::{
    build_overlap_masks, build_warp_geometries, Blender, CalibrationStore,
    ChannelGainCompensator, ExposureCompensator, GainVector, MultiBandBlender, OutputCropper,
    OverlapMask, WarpGeometry,
};

/// The surround-view stitching pipeline.
///
/// Constructed only by a fully successful [`initialize`]; an
/// uninitialized pipeline is simply the absence of a value, so the
/// per-frame entry points cannot be called out of order. After
/// construction, warp tables, masks, and the crop transform are
/// immutable; the gain snapshot is the only runtime-mutable state and
/// has exactly one writer ([`recompute_gain`]).
///
/// [`initialize`]: SurroundStitcher::initialize
/// [`recompute_gain`]: SurroundStitcher::recompute_gain
pub struct SurroundStitcher {
    config: StitchConfig,
    roster: CameraRoster,
    scaled_size: (u32, u32),
    geometries: Vec<WarpGeometry>,
    masks: Vec<OverlapMask>,
    gain: ChannelGainCompensator,
    blender: Box<dyn Blender>,
    cropper: OutputCropper,
}

impl SurroundStitcher {
    /// Run the full setup sequence: calibration → warp geometry →
    /// overlap masks → blender preparation → gain seeding → output
    /// crop. Any failing step aborts the whole initialization.
    ///
    /// `sample_frames` must hold exactly one frame per camera; they
    /// bootstrap the initial gain balance.
    pub fn initialize(
        config: StitchConfig,
        calib_folder: &Path,
        sample_frames: &[RgbImage],
    ) -> Result<Self> {
        config.validate()?;
        if sample_frames.len() != config.num_cameras {
            return Err(Error::Configuration(format!(
                "expected {} sample frames, got {}",
                config.num_cameras,
                sample_frames.len()
            )));
        }

        let store = CalibrationStore::load(calib_folder, config.num_cameras)?;
        let scaled_size = config.scaled_input_size();

        let geometries =
            build_warp_geometries(&store, config.process_scale as f64, scaled_size)?;
        let masks = build_overlap_masks(&geometries, scaled_size);

        let mut blender: Box<dyn Blender> = Box::new(MultiBandBlender::new(config.blend_bands));
        blender.prepare(&geometries, &masks)?;

        let warped_samples = warp_batch(sample_frames, &geometries, scaled_size);
        let mut gain = ChannelGainCompensator::new(config.num_cameras);
        gain.init(&warped_samples, &geometries, &masks);

        let cropper = OutputCropper::configure(calib_folder, config.output_size());

        info!(
            "stitcher initialized: {} cameras, working {}x{}, canvas {}x{}, output {}x{}",
            config.num_cameras,
            scaled_size.0,
            scaled_size.1,
            blender.canvas_size().0,
            blender.canvas_size().1,
            cropper.output_size().0,
            cropper.output_size().1,
        );

        Ok(Self {
            roster: store.roster().clone(),
            config,
            scaled_size,
            geometries,
            masks,
            gain,
            blender,
            cropper,
        })
    }

    /// Compose one output frame from `N` synchronized camera frames.
    ///
    /// Per camera (parallel): scale to working resolution, apply the
    /// current gain, remap through the fixed warp table into the blend
    /// intermediate. Contributions are then fed to the blender in
    /// ascending camera order, blended, and cropped or resized to the
    /// output canvas.
    pub fn stitch(&mut self, frames: &[RgbImage]) -> Result<RgbImage> {
        self.check_frame_count(frames)?;

        let gain = &self.gain;
        let geometries = &self.geometries;
        let scaled_size = self.scaled_size;
        let warped: Vec<Rgb32FImage> = (0..self.roster.len())
            .into_par_iter()
            .map(|index| {
                let scaled = resize_rgb(&frames[index], scaled_size.0, scaled_size.1);
                let compensated = gain.apply(&scaled, index);
                let geometry = &geometries[index];
                remap_rgb_to_f32(
                    &compensated,
                    &geometry.map_x,
                    &geometry.map_y,
                    geometry.width(),
                    geometry.height(),
                    BorderMode::Constant(0.0),
                )
            })
            .collect();

        // Deterministic feed order: blend weighting depends on it.
        for (index, contribution) in warped.iter().enumerate() {
            self.blender.feed(contribution, index)?;
        }

        let panorama = self.blender.blend()?;
        Ok(self.cropper.apply(&panorama))
    }

    /// Re-solve the gain balance against current frames.
    ///
    /// Strictly heavier than one `stitch` (full re-warp plus a linear
    /// solve); intended for a slow periodic cadence driven by
    /// [`GainRefreshSchedule`], not the per-frame path. A degenerate
    /// solve keeps the previous gains.
    pub fn recompute_gain(&mut self, frames: &[RgbImage]) -> Result<()> {
        self.check_frame_count(frames)?;

        let warped = warp_batch(frames, &self.geometries, self.scaled_size);
        self.gain.recompute(&warped, &self.geometries, &self.masks);
        Ok(())
    }

    fn check_frame_count(&self, frames: &[RgbImage]) -> Result<()> {
        if frames.len() != self.roster.len() {
            return Err(Error::InputContract(format!(
                "expected {} frames, got {}",
                self.roster.len(),
                frames.len()
            )));
        }
        Ok(())
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    pub fn roster(&self) -> &CameraRoster {
        &self.roster
    }

    /// Current gain snapshot; the handle stays valid across recomputes.
    pub fn gains(&self) -> Arc<GainVector> {
        self.gain.gains()
    }

    pub fn output_size(&self) -> (u32, u32) {
        self.cropper.output_size()
    }

    pub fn panorama_size(&self) -> (u32, u32) {
        self.blender.canvas_size()
    }
}

// The blender strategy is not Debug, so derive is unavailable.
impl fmt::Debug for SurroundStitcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurroundStitcher")
            .field("config", &self.config)
            .field("scaled_size", &self.scaled_size)
            .field("panorama_size", &self.blender.canvas_size())
            .field("output_size", &self.cropper.output_size())
            .finish_non_exhaustive()
    }
}

/// Scale and warp one frame per camera, without gain correction. Used
/// for gain seeding and recomputation.
fn warp_batch(
    frames: &[RgbImage],
    geometries: &[WarpGeometry],
    scaled_size: (u32, u32),
) -> Vec<Rgb32FImage> {
    frames
        .par_iter()
        .zip(geometries.par_iter())
        .map(|(frame, geometry)| {
            let scaled = resize_rgb(frame, scaled_size.0, scaled_size.1);
            remap_rgb_to_f32(
                &scaled,
                &geometry.map_x,
                &geometry.map_y,
                geometry.width(),
                geometry.height(),
                BorderMode::Constant(0.0),
            )
        })
        .collect()
}

/// Wall-clock cadence for gain refreshes, owned by the application
/// loop: call [`due`] each frame and trigger
/// [`SurroundStitcher::recompute_gain`] when it fires.
///
/// [`due`]: GainRefreshSchedule::due
pub struct GainRefreshSchedule {
    interval: Duration,
    last: Instant,
}

impl GainRefreshSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    pub fn from_config(config: &StitchConfig) -> Self {
        Self::new(Duration::from_secs(config.gain_update_interval_secs))
    }

    /// True when the interval has elapsed; arms the next period.
    pub fn due(&mut self, now: Instant) -> bool {
        if now.duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_fires_every_check() {
        let mut schedule = GainRefreshSchedule::new(Duration::ZERO);
        assert!(schedule.due(Instant::now()));
        assert!(schedule.due(Instant::now()));
    }

    #[test]
    fn long_interval_does_not_fire_immediately() {
        let mut schedule = GainRefreshSchedule::new(Duration::from_secs(3600));
        assert!(!schedule.due(Instant::now()));
    }
}
