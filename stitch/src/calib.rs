use log::{debug, info};
use nalgebra::Matrix3;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use sv_core::{CameraId, CameraRoster, Error, Result};

/// Fixed geometry of one camera: 3×3 intrinsic and rotation matrices.
#[derive(Debug, Clone)]
pub struct CameraCalibration {
    pub intrinsic: Matrix3<f64>,
    pub rotation: Matrix3<f64>,
}

impl CameraCalibration {
    /// Intrinsic matrix with focal and principal-point terms scaled for
    /// a reduced working resolution.
    pub fn scaled_intrinsic(&self, scale: f64) -> Matrix3<f64> {
        let mut k = self.intrinsic;
        k[(0, 0)] *= scale; // fx
        k[(1, 1)] *= scale; // fy
        k[(0, 2)] *= scale; // cx
        k[(1, 2)] *= scale; // cy
        k
    }
}

/// On-disk per-camera record: `camparam<i>.json`.
#[derive(Debug, Deserialize)]
struct CalibrationRecord {
    focal_length: f64,
    intrinsic: [[f64; 3]; 3],
    rotation: [[f64; 3]; 3],
}

/// Immutable calibration for the whole rig, loaded once at startup.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    roster: CameraRoster,
    calibrations: Vec<CameraCalibration>,
    focal_length: f64,
}

impl CalibrationStore {
    /// Load `num_cameras` per-camera records from `folder`.
    ///
    /// The shared focal length is expected to be identical across
    /// records; the last value read wins. Any missing or malformed
    /// record fails the whole load, there is no partial-camera mode.
    pub fn load(folder: &Path, num_cameras: usize) -> Result<Self> {
        if num_cameras == 0 {
            return Err(Error::configuration("camera count must be >= 1"));
        }

        let roster = CameraRoster::with_count(num_cameras);
        let mut calibrations = Vec::with_capacity(num_cameras);
        let mut focal_length = 0.0f64;

        for id in roster.iter() {
            let path = folder.join(format!("camparam{}.json", id.index()));
            let contents = fs::read_to_string(&path).map_err(|e| {
                Error::Configuration(format!(
                    "failed to read calibration for {id}: {}: {e}",
                    path.display()
                ))
            })?;
            let record: CalibrationRecord = serde_json::from_str(&contents).map_err(|e| {
                Error::Configuration(format!(
                    "failed to parse calibration for {id}: {}: {e}",
                    path.display()
                ))
            })?;

            if !(record.focal_length.is_finite() && record.focal_length > 0.0) {
                return Err(Error::Configuration(format!(
                    "non-positive focal length {} for {id}",
                    record.focal_length
                )));
            }

            focal_length = record.focal_length;
            calibrations.push(CameraCalibration {
                intrinsic: matrix_from_rows(&record.intrinsic),
                rotation: matrix_from_rows(&record.rotation),
            });
            debug!("loaded calibration for {id} from {}", path.display());
        }

        info!(
            "calibration loaded: {} cameras, focal length {:.1} px",
            num_cameras, focal_length
        );

        Ok(Self {
            roster,
            calibrations,
            focal_length,
        })
    }

    pub fn roster(&self) -> &CameraRoster {
        &self.roster
    }

    pub fn calibration(&self, id: CameraId) -> &CameraCalibration {
        &self.calibrations[id.index()]
    }

    /// Shared focal length in pixels.
    pub fn focal_length(&self) -> f64 {
        self.focal_length
    }
}

fn matrix_from_rows(rows: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::new(
        rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
        rows[2][1], rows[2][2],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_intrinsic_scales_focal_and_center() {
        let calib = CameraCalibration {
            intrinsic: Matrix3::new(100.0, 0.0, 50.0, 0.0, 100.0, 40.0, 0.0, 0.0, 1.0),
            rotation: Matrix3::identity(),
        };
        let k = calib.scaled_intrinsic(0.5);
        assert_eq!(k[(0, 0)], 50.0);
        assert_eq!(k[(1, 1)], 50.0);
        assert_eq!(k[(0, 2)], 25.0);
        assert_eq!(k[(1, 2)], 20.0);
        assert_eq!(k[(2, 2)], 1.0);
    }

    #[test]
    fn load_fails_on_missing_folder() {
        let err = CalibrationStore::load(Path::new("/nonexistent-calib"), 4).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
