use image::{Rgb32FImage, RgbImage};
use log::debug;
use rayon::prelude::*;

use sv_core::{Error, Result};
use sv_imgproc::{collapse_laplacian, gaussian_pyramid_gray, laplacian_pyramid, GrayF32Image};

use crate::{OverlapMask, WarpGeometry};

const WEIGHT_EPS: f32 = 1e-5;

/// Compositing strategy for the per-frame assembly of camera
/// contributions into one panorama.
///
/// Contract: `prepare` once after setup, then per frame exactly one
/// `feed` per camera (ascending camera order) followed by one `blend`,
/// which also resets the accumulators for the next frame.
pub trait Blender: Send {
    fn prepare(&mut self, geometries: &[WarpGeometry], masks: &[OverlapMask]) -> Result<()>;
    fn feed(&mut self, warped: &Rgb32FImage, camera: usize) -> Result<()>;
    fn blend(&mut self) -> Result<RgbImage>;
    /// Panorama canvas size, valid after `prepare`.
    fn canvas_size(&self) -> (u32, u32);
}

/// Shared prepare-time state: canvas bounds and per-camera placement.
struct CanvasLayout {
    tl: (i32, i32),
    size: (u32, u32),
    /// Per-camera top-left offset inside the canvas.
    offsets: Vec<(u32, u32)>,
}

fn canvas_layout(geometries: &[WarpGeometry], masks: &[OverlapMask]) -> Result<CanvasLayout> {
    if geometries.is_empty() || geometries.len() != masks.len() {
        return Err(Error::input_contract(format!(
            "blender prepare: {} geometries vs {} masks",
            geometries.len(),
            masks.len()
        )));
    }
    for (geometry, mask) in geometries.iter().zip(masks.iter()) {
        if (mask.width(), mask.height()) != geometry.size {
            return Err(Error::input_contract(
                "blender prepare: mask size differs from warp footprint".to_string(),
            ));
        }
    }

    let tl = geometries.iter().fold((i32::MAX, i32::MAX), |acc, g| {
        (acc.0.min(g.corner.0), acc.1.min(g.corner.1))
    });
    let br = geometries.iter().fold((i32::MIN, i32::MIN), |acc, g| {
        (
            acc.0.max(g.corner.0 + g.width() as i32),
            acc.1.max(g.corner.1 + g.height() as i32),
        )
    });

    Ok(CanvasLayout {
        tl,
        size: ((br.0 - tl.0) as u32, (br.1 - tl.1) as u32),
        offsets: geometries
            .iter()
            .map(|g| ((g.corner.0 - tl.0) as u32, (g.corner.1 - tl.1) as u32))
            .collect(),
    })
}

/// Expand a per-camera mask to a full-canvas f32 weight map.
fn canvas_weight(mask: &OverlapMask, offset: (u32, u32), canvas: (u32, u32)) -> GrayF32Image {
    let mut weight = GrayF32Image::new(canvas.0, canvas.1);
    for (x, y, p) in mask.enumerate_pixels() {
        weight.put_pixel(
            offset.0 + x,
            offset.1 + y,
            image::Luma([p[0] as f32 / 255.0]),
        );
    }
    weight
}

/// Copy a footprint-sized image into a zeroed canvas-sized staging buffer.
fn stage_into_canvas(scratch: &mut Rgb32FImage, warped: &Rgb32FImage, offset: (u32, u32)) {
    scratch.as_mut().fill(0.0);
    let canvas_width = scratch.width() as usize;
    let src_width = warped.width() as usize;
    let warped_raw = warped.as_raw();
    let scratch_raw = scratch.as_mut();

    for y in 0..warped.height() as usize {
        let dst_start = ((offset.1 as usize + y) * canvas_width + offset.0 as usize) * 3;
        let src_start = y * src_width * 3;
        scratch_raw[dst_start..dst_start + src_width * 3]
            .copy_from_slice(&warped_raw[src_start..src_start + src_width * 3]);
    }
}

/// `acc += band * weight`, row-parallel.
fn accumulate_weighted(acc: &mut Rgb32FImage, band: &Rgb32FImage, weight: &GrayF32Image) {
    let width = band.width() as usize;
    acc.as_mut()
        .par_chunks_mut(width * 3)
        .zip(band.as_raw().par_chunks(width * 3))
        .zip(weight.as_raw().par_chunks(width))
        .for_each(|((acc_row, band_row), weight_row)| {
            for x in 0..width {
                let w = weight_row[x];
                for c in 0..3 {
                    acc_row[x * 3 + c] += band_row[x * 3 + c] * w;
                }
            }
        });
}

/// `out = acc / total` where the total weight is meaningful, 0 elsewhere.
fn normalize_weighted(acc: &Rgb32FImage, total: &GrayF32Image) -> Rgb32FImage {
    let width = acc.width() as usize;
    let mut out = Rgb32FImage::new(acc.width(), acc.height());
    out.as_mut()
        .par_chunks_mut(width * 3)
        .zip(acc.as_raw().par_chunks(width * 3))
        .zip(total.as_raw().par_chunks(width))
        .for_each(|((out_row, acc_row), weight_row)| {
            for x in 0..width {
                let w = weight_row[x];
                if w > WEIGHT_EPS {
                    for c in 0..3 {
                        out_row[x * 3 + c] = acc_row[x * 3 + c] / w;
                    }
                }
            }
        });
    out
}

fn check_footprint(warped: &Rgb32FImage, footprint: (u32, u32), camera: usize) -> Result<()> {
    if (warped.width(), warped.height()) != footprint {
        return Err(Error::input_contract(format!(
            "feed: camera {camera} frame is {}x{}, footprint is {}x{}",
            warped.width(),
            warped.height(),
            footprint.0,
            footprint.1
        )));
    }
    Ok(())
}

fn to_display(panorama: &Rgb32FImage) -> RgbImage {
    let width = panorama.width();
    let mut out = RgbImage::new(width, panorama.height());
    out.as_mut()
        .par_chunks_mut(width as usize * 3)
        .zip(panorama.as_raw().par_chunks(width as usize * 3))
        .for_each(|(dst_row, src_row)| {
            for (dst, src) in dst_row.iter_mut().zip(src_row.iter()) {
                *dst = src.round().clamp(0.0, 255.0) as u8;
            }
        });
    out
}

/// Laplacian-pyramid blender: low-frequency content blends over wide
/// feathered masks, high-frequency content over narrow ones, which
/// suppresses visible seams from exposure or registration mismatch.
///
/// Accumulation runs in f32, a signed representation wider than display
/// range, so band sums cannot clip or wrap; `blend` converts back to
/// 8-bit after reconstruction.
pub struct MultiBandBlender {
    requested_bands: usize,
    bands: usize,
    canvas_size: (u32, u32),
    offsets: Vec<(u32, u32)>,
    footprints: Vec<(u32, u32)>,
    /// Per-camera Gaussian weight pyramid over the full canvas. Fixed
    /// after prepare.
    weights: Vec<Vec<GrayF32Image>>,
    /// Per-level sum of all camera weights. Fixed after prepare.
    total_weights: Vec<GrayF32Image>,
    /// Per-frame Laplacian accumulators, reused across frames.
    accumulators: Vec<Rgb32FImage>,
    scratch: Rgb32FImage,
    fed: Vec<bool>,
}

impl MultiBandBlender {
    pub fn new(bands: usize) -> Self {
        Self {
            requested_bands: bands.max(1),
            bands: 0,
            canvas_size: (0, 0),
            offsets: Vec::new(),
            footprints: Vec::new(),
            weights: Vec::new(),
            total_weights: Vec::new(),
            accumulators: Vec::new(),
            scratch: Rgb32FImage::new(0, 0),
            fed: Vec::new(),
        }
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    fn expect_prepared(&self) -> Result<()> {
        if self.fed.is_empty() {
            return Err(Error::input_contract("blender not prepared"));
        }
        Ok(())
    }

    fn check_feed(&self, warped: &Rgb32FImage, camera: usize) -> Result<()> {
        self.expect_prepared()?;
        if camera >= self.fed.len() {
            return Err(Error::input_contract(format!(
                "feed: camera index {camera} out of range"
            )));
        }
        if self.fed[camera] {
            return Err(Error::input_contract(format!(
                "feed: camera {camera} already fed this frame"
            )));
        }
        check_footprint(warped, self.footprints[camera], camera)?;
        Ok(())
    }

    fn check_all_fed(&self) -> Result<()> {
        self.expect_prepared()?;
        if let Some(missing) = self.fed.iter().position(|f| !f) {
            return Err(Error::input_contract(format!(
                "blend: camera {missing} not fed this frame"
            )));
        }
        Ok(())
    }
}

impl Blender for MultiBandBlender {
    fn prepare(&mut self, geometries: &[WarpGeometry], masks: &[OverlapMask]) -> Result<()> {
        let layout = canvas_layout(geometries, masks)?;
        let canvas = layout.size;

        // Clamp the band count so the coarsest level keeps real extent:
        // at `bands` levels the short canvas side shrinks to
        // `min_dim >> bands`, which must stay >= 2.
        let min_dim = canvas.0.min(canvas.1);
        let max_bands = if min_dim >= 4 {
            (min_dim.ilog2() - 1) as usize
        } else {
            1
        };
        let bands = self.requested_bands.min(max_bands);

        let weights: Vec<Vec<GrayF32Image>> = masks
            .iter()
            .zip(layout.offsets.iter())
            .map(|(mask, &offset)| {
                gaussian_pyramid_gray(&canvas_weight(mask, offset, canvas), bands)
            })
            .collect();

        let mut total_weights = Vec::with_capacity(bands + 1);
        for level in 0..=bands {
            let mut total = weights[0][level].clone();
            for camera_weights in &weights[1..] {
                total
                    .as_mut()
                    .iter_mut()
                    .zip(camera_weights[level].as_raw().iter())
                    .for_each(|(t, w)| *t += w);
            }
            total_weights.push(total);
        }

        self.accumulators = total_weights
            .iter()
            .map(|w| Rgb32FImage::new(w.width(), w.height()))
            .collect();
        self.scratch = Rgb32FImage::new(canvas.0, canvas.1);
        self.fed = vec![false; geometries.len()];
        self.bands = bands;
        self.canvas_size = canvas;
        self.offsets = layout.offsets;
        self.footprints = geometries.iter().map(|g| g.size).collect();
        self.weights = weights;
        self.total_weights = total_weights;

        debug!(
            "multi-band blender prepared: canvas {}x{}, {} bands",
            canvas.0, canvas.1, bands
        );

        Ok(())
    }

    fn feed(&mut self, warped: &Rgb32FImage, camera: usize) -> Result<()> {
        self.check_feed(warped, camera)?;

        let mut scratch = std::mem::replace(&mut self.scratch, Rgb32FImage::new(0, 0));
        stage_into_canvas(&mut scratch, warped, self.offsets[camera]);
        let pyramid = laplacian_pyramid(&scratch, self.bands);
        self.scratch = scratch;

        for (level, band) in pyramid.iter().enumerate() {
            accumulate_weighted(
                &mut self.accumulators[level],
                band,
                &self.weights[camera][level],
            );
        }

        self.fed[camera] = true;
        Ok(())
    }

    fn blend(&mut self) -> Result<RgbImage> {
        self.check_all_fed()?;

        let normalized: Vec<Rgb32FImage> = self
            .accumulators
            .iter()
            .zip(self.total_weights.iter())
            .map(|(acc, total)| normalize_weighted(acc, total))
            .collect();

        let panorama = collapse_laplacian(&normalized);
        let out = to_display(&panorama);

        // Reset for the next frame; buffers are reused, not reallocated.
        for acc in &mut self.accumulators {
            acc.as_mut().fill(0.0);
        }
        self.fed.iter_mut().for_each(|f| *f = false);

        Ok(out)
    }

    fn canvas_size(&self) -> (u32, u32) {
        self.canvas_size
    }
}

/// Single-band weighted average. The simple substitutable strategy:
/// cheaper than multi-band, visibly softer at exposure steps.
pub struct FeatherBlender {
    canvas_size: (u32, u32),
    offsets: Vec<(u32, u32)>,
    footprints: Vec<(u32, u32)>,
    weights: Vec<GrayF32Image>,
    total_weight: GrayF32Image,
    accumulator: Rgb32FImage,
    scratch: Rgb32FImage,
    fed: Vec<bool>,
}

impl FeatherBlender {
    pub fn new() -> Self {
        Self {
            canvas_size: (0, 0),
            offsets: Vec::new(),
            footprints: Vec::new(),
            weights: Vec::new(),
            total_weight: GrayF32Image::new(0, 0),
            accumulator: Rgb32FImage::new(0, 0),
            scratch: Rgb32FImage::new(0, 0),
            fed: Vec::new(),
        }
    }
}

impl Default for FeatherBlender {
    fn default() -> Self {
        Self::new()
    }
}

impl Blender for FeatherBlender {
    fn prepare(&mut self, geometries: &[WarpGeometry], masks: &[OverlapMask]) -> Result<()> {
        let layout = canvas_layout(geometries, masks)?;
        let canvas = layout.size;

        let weights: Vec<GrayF32Image> = masks
            .iter()
            .zip(layout.offsets.iter())
            .map(|(mask, &offset)| canvas_weight(mask, offset, canvas))
            .collect();

        let mut total_weight = weights[0].clone();
        for weight in &weights[1..] {
            total_weight
                .as_mut()
                .iter_mut()
                .zip(weight.as_raw().iter())
                .for_each(|(t, w)| *t += w);
        }

        self.accumulator = Rgb32FImage::new(canvas.0, canvas.1);
        self.scratch = Rgb32FImage::new(canvas.0, canvas.1);
        self.fed = vec![false; geometries.len()];
        self.canvas_size = canvas;
        self.offsets = layout.offsets;
        self.footprints = geometries.iter().map(|g| g.size).collect();
        self.weights = weights;
        self.total_weight = total_weight;
        Ok(())
    }

    fn feed(&mut self, warped: &Rgb32FImage, camera: usize) -> Result<()> {
        if self.fed.is_empty() {
            return Err(Error::input_contract("blender not prepared"));
        }
        if camera >= self.fed.len() || self.fed[camera] {
            return Err(Error::input_contract(format!(
                "feed: bad or repeated camera index {camera}"
            )));
        }
        check_footprint(warped, self.footprints[camera], camera)?;

        let mut scratch = std::mem::replace(&mut self.scratch, Rgb32FImage::new(0, 0));
        stage_into_canvas(&mut scratch, warped, self.offsets[camera]);
        accumulate_weighted(&mut self.accumulator, &scratch, &self.weights[camera]);
        self.scratch = scratch;

        self.fed[camera] = true;
        Ok(())
    }

    fn blend(&mut self) -> Result<RgbImage> {
        if self.fed.is_empty() {
            return Err(Error::input_contract("blender not prepared"));
        }
        if let Some(missing) = self.fed.iter().position(|f| !f) {
            return Err(Error::input_contract(format!(
                "blend: camera {missing} not fed this frame"
            )));
        }

        let panorama = normalize_weighted(&self.accumulator, &self.total_weight);
        let out = to_display(&panorama);

        self.accumulator.as_mut().fill(0.0);
        self.fed.iter_mut().for_each(|f| *f = false);
        Ok(out)
    }

    fn canvas_size(&self) -> (u32, u32) {
        self.canvas_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    fn full_mask(width: u32, height: u32) -> GrayImage {
        let mut mask = GrayImage::new(width, height);
        for p in mask.pixels_mut() {
            p.0 = [255];
        }
        mask
    }

    fn uniform_f32(width: u32, height: u32, value: [f32; 3]) -> Rgb32FImage {
        let mut img = Rgb32FImage::new(width, height);
        for p in img.pixels_mut() {
            p.0 = value;
        }
        img
    }

    fn geometry_at(corner: (i32, i32), size: (u32, u32)) -> WarpGeometry {
        WarpGeometry {
            corner,
            size,
            map_x: vec![0.0; (size.0 * size.1) as usize],
            map_y: vec![0.0; (size.0 * size.1) as usize],
        }
    }

    #[test]
    fn disjoint_masks_reproduce_inputs() {
        let geometries = vec![geometry_at((0, 0), (32, 32)), geometry_at((64, 0), (32, 32))];
        let masks = vec![full_mask(32, 32), full_mask(32, 32)];

        let mut blender = MultiBandBlender::new(3);
        blender.prepare(&geometries, &masks).unwrap();
        assert_eq!(blender.canvas_size(), (96, 32));

        blender
            .feed(&uniform_f32(32, 32, [80.0, 120.0, 160.0]), 0)
            .unwrap();
        blender
            .feed(&uniform_f32(32, 32, [40.0, 20.0, 10.0]), 1)
            .unwrap();
        let out = blender.blend().unwrap();

        // Interior of each exclusive region equals that camera's input.
        assert_eq!(out.get_pixel(16, 16).0, [80, 120, 160]);
        assert_eq!(out.get_pixel(80, 16).0, [40, 20, 10]);
    }

    #[test]
    fn overlap_blends_between_inputs() {
        let geometries = vec![geometry_at((0, 0), (32, 16)), geometry_at((16, 0), (32, 16))];
        let masks = vec![full_mask(32, 16), full_mask(32, 16)];

        let mut blender = MultiBandBlender::new(2);
        blender.prepare(&geometries, &masks).unwrap();

        blender.feed(&uniform_f32(32, 16, [200.0; 3]), 0).unwrap();
        blender.feed(&uniform_f32(32, 16, [100.0; 3]), 1).unwrap();
        let out = blender.blend().unwrap();

        let mid = out.get_pixel(24, 8).0[0];
        assert!((100..=200).contains(&mid), "overlap value {mid}");
    }

    #[test]
    fn oversized_band_request_is_clamped() {
        let geometries = vec![geometry_at((0, 0), (64, 64))];
        let masks = vec![full_mask(64, 64)];

        let mut blender = MultiBandBlender::new(40);
        blender.prepare(&geometries, &masks).unwrap();
        // 64 >> 5 == 2, so 5 is the deepest usable pyramid.
        assert_eq!(blender.bands(), 5);

        blender.feed(&uniform_f32(64, 64, [90.0; 3]), 0).unwrap();
        let out = blender.blend().unwrap();
        assert_eq!(out.get_pixel(32, 32).0, [90, 90, 90]);
    }

    #[test]
    fn tiny_canvas_degrades_to_single_band() {
        let geometries = vec![geometry_at((0, 0), (3, 3))];
        let masks = vec![full_mask(3, 3)];

        let mut blender = MultiBandBlender::new(5);
        blender.prepare(&geometries, &masks).unwrap();
        assert_eq!(blender.bands(), 1);
    }

    #[test]
    fn feed_rejects_wrong_footprint_size() {
        let geometries = vec![geometry_at((0, 0), (16, 16))];
        let masks = vec![full_mask(16, 16)];
        let mut blender = MultiBandBlender::new(2);
        blender.prepare(&geometries, &masks).unwrap();

        let err = blender.feed(&uniform_f32(32, 32, [10.0; 3]), 0).unwrap_err();
        assert!(matches!(err, Error::InputContract(_)));

        // The rejected feed left the frame cycle intact.
        blender.feed(&uniform_f32(16, 16, [10.0; 3]), 0).unwrap();
        blender.blend().unwrap();
    }

    #[test]
    fn feather_feed_rejects_wrong_footprint_size() {
        let geometries = vec![geometry_at((0, 0), (8, 8))];
        let masks = vec![full_mask(8, 8)];
        let mut blender = FeatherBlender::new();
        blender.prepare(&geometries, &masks).unwrap();

        let err = blender.feed(&uniform_f32(4, 4, [10.0; 3]), 0).unwrap_err();
        assert!(matches!(err, Error::InputContract(_)));
    }

    #[test]
    fn double_feed_rejected() {
        let geometries = vec![geometry_at((0, 0), (8, 8))];
        let masks = vec![full_mask(8, 8)];
        let mut blender = MultiBandBlender::new(2);
        blender.prepare(&geometries, &masks).unwrap();

        let frame = uniform_f32(8, 8, [10.0; 3]);
        blender.feed(&frame, 0).unwrap();
        assert!(blender.feed(&frame, 0).is_err());
    }

    #[test]
    fn blend_requires_all_cameras() {
        let geometries = vec![geometry_at((0, 0), (8, 8)), geometry_at((8, 0), (8, 8))];
        let masks = vec![full_mask(8, 8), full_mask(8, 8)];
        let mut blender = MultiBandBlender::new(1);
        blender.prepare(&geometries, &masks).unwrap();

        blender.feed(&uniform_f32(8, 8, [10.0; 3]), 0).unwrap();
        assert!(blender.blend().is_err());
    }

    #[test]
    fn blend_resets_for_next_frame() {
        let geometries = vec![geometry_at((0, 0), (16, 16))];
        let masks = vec![full_mask(16, 16)];
        let mut blender = MultiBandBlender::new(2);
        blender.prepare(&geometries, &masks).unwrap();

        blender.feed(&uniform_f32(16, 16, [50.0; 3]), 0).unwrap();
        let first = blender.blend().unwrap();
        blender.feed(&uniform_f32(16, 16, [50.0; 3]), 0).unwrap();
        let second = blender.blend().unwrap();
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn feather_matches_weighted_average() {
        let geometries = vec![geometry_at((0, 0), (16, 8)), geometry_at((0, 0), (16, 8))];
        let masks = vec![full_mask(16, 8), full_mask(16, 8)];

        let mut blender = FeatherBlender::new();
        blender.prepare(&geometries, &masks).unwrap();
        blender.feed(&uniform_f32(16, 8, [100.0; 3]), 0).unwrap();
        blender.feed(&uniform_f32(16, 8, [200.0; 3]), 1).unwrap();
        let out = blender.blend().unwrap();
        assert_eq!(out.get_pixel(8, 4).0, [150, 150, 150]);
    }
}
