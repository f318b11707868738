use image::{Rgb32FImage, RgbImage};
use log::{debug, warn};
use nalgebra::{DMatrix, DVector, Vector3};
use rayon::prelude::*;
use std::sync::Arc;

use crate::{OverlapMask, WarpGeometry};

/// Per-camera, per-channel photometric multipliers.
pub type GainVector = Vec<Vector3<f64>>;

/// Exposure-balancing strategy. Implementations own a published gain
/// snapshot; `apply` is a pure per-frame transform against it.
pub trait ExposureCompensator: Send + Sync {
    /// Seed gains from a first batch of warped sample frames.
    fn init(
        &mut self,
        samples: &[Rgb32FImage],
        geometries: &[WarpGeometry],
        masks: &[OverlapMask],
    );

    /// Re-solve the balancing system against current frames. The stored
    /// gains are replaced atomically; on a degenerate solve the previous
    /// snapshot is kept.
    fn recompute(
        &mut self,
        frames: &[Rgb32FImage],
        geometries: &[WarpGeometry],
        masks: &[OverlapMask],
    );

    /// Multiply a frame by its camera's current gain.
    fn apply(&self, frame: &RgbImage, camera: usize) -> RgbImage;

    /// Immutable snapshot of the current gain set. The handle stays
    /// valid across recomputes, so readers never observe a partial
    /// update.
    fn gains(&self) -> Arc<GainVector>;
}

/// Classical panoramic gain compensation: one log-gain unknown per
/// camera, one weighted constraint per overlapping pair equalizing the
/// pair's mean intensities, anchored against drift by a mild
/// regularization term. Cameras without overlap keep gain 1.
pub struct ChannelGainCompensator {
    num_cameras: usize,
    anchor: f64,
    gains: Arc<GainVector>,
}

/// Pairwise overlap statistics for one camera pair.
struct PairStats {
    i: usize,
    j: usize,
    count: usize,
    mean_i: Vector3<f64>,
    mean_j: Vector3<f64>,
}

const MIN_OVERLAP_MEAN: f64 = 1e-3;

impl ChannelGainCompensator {
    pub fn new(num_cameras: usize) -> Self {
        Self {
            num_cameras,
            anchor: 0.1,
            gains: Arc::new(vec![Vector3::repeat(1.0); num_cameras]),
        }
    }

    fn resolve(
        &mut self,
        frames: &[Rgb32FImage],
        geometries: &[WarpGeometry],
        masks: &[OverlapMask],
    ) {
        match self.solve(frames, geometries, masks) {
            Some(gains) => {
                debug!(
                    "gain solve: {:?}",
                    gains.iter().map(|g| g.x).collect::<Vec<_>>()
                );
                self.gains = Arc::new(gains);
            }
            None => {
                warn!("gain solve degenerate, keeping previous gain set");
            }
        }
    }

    fn solve(
        &self,
        frames: &[Rgb32FImage],
        geometries: &[WarpGeometry],
        masks: &[OverlapMask],
    ) -> Option<GainVector> {
        let n = self.num_cameras;
        if frames.len() != n || geometries.len() != n || masks.len() != n {
            return None;
        }

        let mut pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                if let Some(stats) = overlap_stats(
                    i,
                    j,
                    &frames[i],
                    &frames[j],
                    &geometries[i],
                    &geometries[j],
                    &masks[i],
                    &masks[j],
                ) {
                    pairs.push(stats);
                }
            }
        }

        if pairs.is_empty() {
            return None;
        }

        let mut log_gains = vec![Vector3::repeat(0.0); n];
        for channel in 0..3 {
            let x = self.solve_channel(&pairs, channel)?;
            for (gain, value) in log_gains.iter_mut().zip(x.iter()) {
                gain[channel] = *value;
            }
        }

        Some(
            log_gains
                .into_iter()
                .map(|g| Vector3::new(g.x.exp(), g.y.exp(), g.z.exp()))
                .collect(),
        )
    }

    /// Least-squares solve of the log-gain system for one channel.
    fn solve_channel(&self, pairs: &[PairStats], channel: usize) -> Option<Vec<f64>> {
        let n = self.num_cameras;
        let mut a = DMatrix::<f64>::zeros(n, n);
        let mut b = DVector::<f64>::zeros(n);

        for k in 0..n {
            a[(k, k)] = self.anchor;
        }

        let mut constrained = 0usize;
        for pair in pairs {
            let mi = pair.mean_i[channel];
            let mj = pair.mean_j[channel];
            if !(mi > MIN_OVERLAP_MEAN && mj > MIN_OVERLAP_MEAN) {
                continue;
            }

            // x_i - x_j should approach ln(mean_j / mean_i).
            let r = (mj / mi).ln();
            if !r.is_finite() {
                return None;
            }
            let w = pair.count as f64;

            a[(pair.i, pair.i)] += w;
            a[(pair.j, pair.j)] += w;
            a[(pair.i, pair.j)] -= w;
            a[(pair.j, pair.i)] -= w;
            b[pair.i] += w * r;
            b[pair.j] -= w * r;
            constrained += 1;
        }

        if constrained == 0 {
            return None;
        }

        let x = a.cholesky()?.solve(&b);
        if x.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(x.as_slice().to_vec())
    }
}

impl ExposureCompensator for ChannelGainCompensator {
    fn init(
        &mut self,
        samples: &[Rgb32FImage],
        geometries: &[WarpGeometry],
        masks: &[OverlapMask],
    ) {
        self.resolve(samples, geometries, masks);
    }

    fn recompute(
        &mut self,
        frames: &[Rgb32FImage],
        geometries: &[WarpGeometry],
        masks: &[OverlapMask],
    ) {
        self.resolve(frames, geometries, masks);
    }

    fn apply(&self, frame: &RgbImage, camera: usize) -> RgbImage {
        let gain = self.gains[camera];
        let gain = [gain.x as f32, gain.y as f32, gain.z as f32];

        let width = frame.width();
        let mut out = RgbImage::new(width, frame.height());
        out.as_mut()
            .par_chunks_mut(width as usize * 3)
            .zip(frame.as_raw().par_chunks(width as usize * 3))
            .for_each(|(dst_row, src_row)| {
                for (k, (dst, src)) in dst_row.iter_mut().zip(src_row.iter()).enumerate() {
                    let v = *src as f32 * gain[k % 3];
                    *dst = v.round().clamp(0.0, 255.0) as u8;
                }
            });
        out
    }

    fn gains(&self) -> Arc<GainVector> {
        Arc::clone(&self.gains)
    }
}

/// Mean intensities of two cameras over their shared panorama region.
#[allow(clippy::too_many_arguments)]
fn overlap_stats(
    i: usize,
    j: usize,
    frame_i: &Rgb32FImage,
    frame_j: &Rgb32FImage,
    geo_i: &WarpGeometry,
    geo_j: &WarpGeometry,
    mask_i: &OverlapMask,
    mask_j: &OverlapMask,
) -> Option<PairStats> {
    let x0 = geo_i.corner.0.max(geo_j.corner.0);
    let y0 = geo_i.corner.1.max(geo_j.corner.1);
    let x1 = (geo_i.corner.0 + geo_i.width() as i32).min(geo_j.corner.0 + geo_j.width() as i32);
    let y1 = (geo_i.corner.1 + geo_i.height() as i32).min(geo_j.corner.1 + geo_j.height() as i32);

    if x0 >= x1 || y0 >= y1 {
        return None;
    }

    let mut count = 0usize;
    let mut sum_i = Vector3::repeat(0.0f64);
    let mut sum_j = Vector3::repeat(0.0f64);

    for y in y0..y1 {
        for x in x0..x1 {
            let (ix, iy) = ((x - geo_i.corner.0) as u32, (y - geo_i.corner.1) as u32);
            let (jx, jy) = ((x - geo_j.corner.0) as u32, (y - geo_j.corner.1) as u32);

            if mask_i.get_pixel(ix, iy)[0] == 0 || mask_j.get_pixel(jx, jy)[0] == 0 {
                continue;
            }

            let pi = frame_i.get_pixel(ix, iy).0;
            let pj = frame_j.get_pixel(jx, jy).0;
            for c in 0..3 {
                sum_i[c] += pi[c] as f64;
                sum_j[c] += pj[c] as f64;
            }
            count += 1;
        }
    }

    if count == 0 {
        return None;
    }

    Some(PairStats {
        i,
        j,
        count,
        mean_i: sum_i / count as f64,
        mean_j: sum_j / count as f64,
    })
}
