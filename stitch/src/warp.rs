use log::debug;
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use std::f64::consts::PI;

use sv_core::{Error, Result};

use crate::CalibrationStore;

/// Fixed warp geometry of one camera: dense backward remap tables plus
/// the panorama-space placement of the warped footprint.
///
/// `map_x`/`map_y` are sized to the footprint (`size`) and hold scaled
/// source-image coordinates; out-of-view destination pixels map to
/// `(-1, -1)` so a constant-border remap leaves them empty. Computed
/// once from calibration, immutable thereafter.
#[derive(Debug, Clone)]
pub struct WarpGeometry {
    /// Top-left offset of the footprint in panorama space.
    pub corner: (i32, i32),
    /// Footprint extent (width, height).
    pub size: (u32, u32),
    pub map_x: Vec<f32>,
    pub map_y: Vec<f32>,
}

impl WarpGeometry {
    pub fn width(&self) -> u32 {
        self.size.0
    }

    pub fn height(&self) -> u32 {
        self.size.1
    }
}

/// Projection strategy turning calibration into warp geometry.
///
/// Alternative models (cylindrical, fisheye) slot in here without
/// touching orchestration.
pub trait ProjectionModel: Send + Sync {
    fn build_geometry(
        &self,
        intrinsic: &Matrix3<f64>,
        rotation: &Matrix3<f64>,
        src_size: (u32, u32),
    ) -> Result<WarpGeometry>;
}

/// Spherical projection with radius `scale × focal length`.
///
/// Forward mapping projects source pixels through the camera rotation
/// onto the sphere to find the footprint bounds; the stored tables are
/// the backward mapping, so per-frame warping is a plain table lookup.
#[derive(Debug, Clone, Copy)]
pub struct SphericalProjection {
    radius: f64,
}

impl SphericalProjection {
    pub fn new(radius: f64) -> Self {
        Self { radius }
    }

    fn map_forward(&self, r_kinv: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
        let p = r_kinv * Vector3::new(x, y, 1.0);
        let u = self.radius * p.x.atan2(p.z);
        let w = (p.y / p.norm()).clamp(-1.0, 1.0);
        let v = self.radius * (PI - w.acos());
        (u, v)
    }

    fn map_backward(&self, k_rinv: &Matrix3<f64>, u: f64, v: f64) -> (f64, f64) {
        let u = u / self.radius;
        let v = v / self.radius;

        let sinv = (PI - v).sin();
        let dir = Vector3::new(sinv * u.sin(), (PI - v).cos(), sinv * u.cos());

        let p = k_rinv * dir;
        if p.z > 0.0 {
            (p.x / p.z, p.y / p.z)
        } else {
            (-1.0, -1.0)
        }
    }

    /// Panorama-space bounding box of the warped source canvas.
    fn detect_result_roi(
        &self,
        r_kinv: &Matrix3<f64>,
        src_size: (u32, u32),
    ) -> ((i32, i32), (i32, i32)) {
        let (width, height) = src_size;

        let (min_u, min_v, max_u, max_v) = (0..height)
            .into_par_iter()
            .map(|y| {
                let mut bounds = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
                for x in 0..width {
                    let (u, v) = self.map_forward(r_kinv, x as f64, y as f64);
                    bounds.0 = bounds.0.min(u);
                    bounds.1 = bounds.1.min(v);
                    bounds.2 = bounds.2.max(u);
                    bounds.3 = bounds.3.max(v);
                }
                bounds
            })
            .reduce(
                || (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
                |a, b| (a.0.min(b.0), a.1.min(b.1), a.2.max(b.2), a.3.max(b.3)),
            );

        let tl = (min_u.floor() as i32, min_v.floor() as i32);
        let br = (max_u.ceil() as i32, max_v.ceil() as i32);
        (tl, br)
    }
}

impl ProjectionModel for SphericalProjection {
    fn build_geometry(
        &self,
        intrinsic: &Matrix3<f64>,
        rotation: &Matrix3<f64>,
        src_size: (u32, u32),
    ) -> Result<WarpGeometry> {
        if src_size.0 == 0 || src_size.1 == 0 {
            return Err(Error::Image("warp source size must be non-zero".into()));
        }

        let k_inv = intrinsic
            .try_inverse()
            .ok_or_else(|| Error::Numeric("intrinsic matrix is singular".into()))?;
        let r_inv = rotation
            .try_inverse()
            .ok_or_else(|| Error::Numeric("rotation matrix is singular".into()))?;

        let r_kinv = rotation * k_inv;
        let k_rinv = intrinsic * r_inv;

        let (tl, br) = self.detect_result_roi(&r_kinv, src_size);
        let dst_width = (br.0 - tl.0 + 1) as u32;
        let dst_height = (br.1 - tl.1 + 1) as u32;

        let len = (dst_width * dst_height) as usize;
        let mut map_x = vec![0.0f32; len];
        let mut map_y = vec![0.0f32; len];

        map_x
            .par_chunks_mut(dst_width as usize)
            .zip(map_y.par_chunks_mut(dst_width as usize))
            .enumerate()
            .for_each(|(y, (row_x, row_y))| {
                let v = (tl.1 + y as i32) as f64;
                for x in 0..dst_width as usize {
                    let u = (tl.0 + x as i32) as f64;
                    let (sx, sy) = self.map_backward(&k_rinv, u, v);
                    row_x[x] = sx as f32;
                    row_y[x] = sy as f32;
                }
            });

        Ok(WarpGeometry {
            corner: tl,
            size: (dst_width, dst_height),
            map_x,
            map_y,
        })
    }
}

/// Build the per-camera warp geometry for the whole rig at the working
/// resolution.
pub fn build_warp_geometries(
    store: &CalibrationStore,
    scale: f64,
    scaled_input: (u32, u32),
) -> Result<Vec<WarpGeometry>> {
    let projection = SphericalProjection::new(scale * store.focal_length());

    store
        .roster()
        .iter()
        .map(|id| {
            let calib = store.calibration(id);
            let k_scaled = calib.scaled_intrinsic(scale);
            let geometry =
                projection.build_geometry(&k_scaled, &calib.rotation, scaled_input)?;
            debug!(
                "warp geometry for {id}: corner=({}, {}), size={}x{}",
                geometry.corner.0, geometry.corner.1, geometry.width(), geometry.height()
            );
            Ok(geometry)
        })
        .collect()
}
