use image::{Rgb32FImage, RgbImage};
use nalgebra::{Matrix3, SMatrix, SVector};
use rayon::prelude::*;

use crate::{bilinear_rgb, BorderMode};

/// Remap an 8-bit RGB image through dense coordinate lookup tables.
///
/// `map_x`/`map_y` are destination-sized and hold source coordinates;
/// pixels whose source coordinate falls outside the image take the
/// border value.
pub fn remap_rgb(
    src: &RgbImage,
    map_x: &[f32],
    map_y: &[f32],
    width: u32,
    height: u32,
    border: BorderMode,
) -> RgbImage {
    assert_eq!(
        map_x.len(),
        (width * height) as usize,
        "map_x size must equal width*height"
    );
    assert_eq!(
        map_y.len(),
        (width * height) as usize,
        "map_y size must equal width*height"
    );

    let mut dst = RgbImage::new(width, height);

    dst.as_mut()
        .par_chunks_mut(width as usize * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let idx = y * width as usize + x;
                let v = bilinear_rgb(src, map_x[idx], map_y[idx], border);
                for c in 0..3 {
                    row[x * 3 + c] = v[c].clamp(0.0, 255.0) as u8;
                }
            }
        });

    dst
}

/// Remap an 8-bit RGB image into an f32 destination, for feeding the
/// blend intermediate without an extra conversion pass.
pub fn remap_rgb_to_f32(
    src: &RgbImage,
    map_x: &[f32],
    map_y: &[f32],
    width: u32,
    height: u32,
    border: BorderMode,
) -> Rgb32FImage {
    assert_eq!(map_x.len(), (width * height) as usize);
    assert_eq!(map_y.len(), (width * height) as usize);

    let mut dst = Rgb32FImage::new(width, height);

    dst.as_mut()
        .par_chunks_mut(width as usize * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let idx = y * width as usize + x;
                let v = bilinear_rgb(src, map_x[idx], map_y[idx], border);
                row[x * 3..x * 3 + 3].copy_from_slice(&v);
            }
        });

    dst
}

/// Apply a homogeneous 3×3 transform to a 2-D point.
pub fn transform_point(matrix: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let w = matrix[(2, 0)] * x + matrix[(2, 1)] * y + matrix[(2, 2)];

    if w.abs() > 1e-10 {
        (
            (matrix[(0, 0)] * x + matrix[(0, 1)] * y + matrix[(0, 2)]) / w,
            (matrix[(1, 0)] * x + matrix[(1, 1)] * y + matrix[(1, 2)]) / w,
        )
    } else {
        (
            matrix[(0, 0)] * x + matrix[(0, 1)] * y + matrix[(0, 2)],
            matrix[(1, 0)] * x + matrix[(1, 1)] * y + matrix[(1, 2)],
        )
    }
}

/// Perspective transform mapping four source points onto four
/// destination points. Returns `None` when the correspondences are
/// degenerate (collinear points).
pub fn perspective_from_quad(
    src: &[(f64, f64); 4],
    dst: &[(f64, f64); 4],
) -> Option<Matrix3<f64>> {
    // Unknowns a..h of the homography with i fixed to 1:
    //   u = (a x + b y + c) / (g x + h y + 1)
    //   v = (d x + e y + f) / (g x + h y + 1)
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let (x, y) = src[k];
        let (u, v) = dst[k];

        a[(2 * k, 0)] = x;
        a[(2 * k, 1)] = y;
        a[(2 * k, 2)] = 1.0;
        a[(2 * k, 6)] = -u * x;
        a[(2 * k, 7)] = -u * y;
        b[2 * k] = u;

        a[(2 * k + 1, 3)] = x;
        a[(2 * k + 1, 4)] = y;
        a[(2 * k + 1, 5)] = 1.0;
        a[(2 * k + 1, 6)] = -v * x;
        a[(2 * k + 1, 7)] = -v * y;
        b[2 * k + 1] = v;
    }

    let p = a.full_piv_lu().solve(&b)?;

    Some(Matrix3::new(
        p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7], 1.0,
    ))
}

/// Precompute dense remap tables for a perspective warp.
///
/// `dst_to_src` maps destination pixel coordinates into source
/// coordinates (i.e. the inverse of the forward transform), matching
/// the backward-mapping convention of [`remap_rgb`].
pub fn build_perspective_maps(
    dst_to_src: &Matrix3<f64>,
    width: u32,
    height: u32,
) -> (Vec<f32>, Vec<f32>) {
    let len = (width * height) as usize;
    let mut map_x = vec![0.0f32; len];
    let mut map_y = vec![0.0f32; len];

    map_x
        .par_chunks_mut(width as usize)
        .zip(map_y.par_chunks_mut(width as usize))
        .enumerate()
        .for_each(|(y, (row_x, row_y))| {
            for x in 0..width as usize {
                let (sx, sy) = transform_point(dst_to_src, x as f64, y as f64);
                row_x[x] = sx as f32;
                row_y[x] = sy as f32;
            }
        });

    (map_x, map_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn remap_identity_keeps_pixels() {
        let mut img = RgbImage::new(6, 4);
        img.put_pixel(2, 1, Rgb([200, 100, 50]));

        let mut map_x = vec![0.0f32; 24];
        let mut map_y = vec![0.0f32; 24];
        for y in 0..4u32 {
            for x in 0..6u32 {
                let idx = (y * 6 + x) as usize;
                map_x[idx] = x as f32;
                map_y[idx] = y as f32;
            }
        }

        let out = remap_rgb(&img, &map_x, &map_y, 6, 4, BorderMode::Constant(0.0));
        assert_eq!(out.get_pixel(2, 1).0, [200, 100, 50]);
    }

    #[test]
    fn perspective_identity_from_unit_square() {
        let quad = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)];
        let m = perspective_from_quad(&quad, &quad).unwrap();
        let (x, y) = transform_point(&m, 3.0, 7.0);
        assert!((x - 3.0).abs() < 1e-9);
        assert!((y - 7.0).abs() < 1e-9);
    }

    #[test]
    fn perspective_maps_corners_exactly() {
        let src = [(2.0, 3.0), (40.0, 5.0), (1.0, 30.0), (42.0, 33.0)];
        let dst = [(0.0, 0.0), (16.0, 0.0), (0.0, 8.0), (16.0, 8.0)];
        let m = perspective_from_quad(&src, &dst).unwrap();
        for k in 0..4 {
            let (u, v) = transform_point(&m, src[k].0, src[k].1);
            assert!((u - dst[k].0).abs() < 1e-6);
            assert!((v - dst[k].1).abs() < 1e-6);
        }
    }

    #[test]
    fn degenerate_quad_is_rejected() {
        let src = [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)];
        let dst = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)];
        assert!(perspective_from_quad(&src, &dst).is_none());
    }

    #[test]
    fn perspective_maps_translate() {
        let m = Matrix3::new(1.0, 0.0, 2.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0);
        let (map_x, map_y) = build_perspective_maps(&m, 4, 3);
        assert_eq!(map_x[0], 2.0);
        assert_eq!(map_y[0], 1.0);
    }
}
