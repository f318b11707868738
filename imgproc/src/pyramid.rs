//! Image pyramids on f32 buffers, used by the multi-band blender.
//!
//! `pyr_up_to` takes an explicit target size so Laplacian reconstruction
//! is exact for odd-sized levels: collapsing `laplacian_pyramid` output
//! with `collapse_laplacian` reproduces the source bit-for-bit wherever
//! no cross-camera blending occurred.

use image::Rgb32FImage;

use crate::{resize_gray_f32, resize_rgb_f32, GrayF32Image};

pub fn pyr_down_rgb(src: &Rgb32FImage) -> Rgb32FImage {
    let width = (src.width() / 2).max(1);
    let height = (src.height() / 2).max(1);
    resize_rgb_f32(src, width, height)
}

pub fn pyr_up_rgb_to(src: &Rgb32FImage, width: u32, height: u32) -> Rgb32FImage {
    resize_rgb_f32(src, width, height)
}

pub fn pyr_down_gray(src: &GrayF32Image) -> GrayF32Image {
    let width = (src.width() / 2).max(1);
    let height = (src.height() / 2).max(1);
    resize_gray_f32(src, width, height)
}

/// Gaussian pyramid with `levels + 1` entries; index 0 is the source,
/// each following level is half the size of the previous.
pub fn gaussian_pyramid_rgb(src: &Rgb32FImage, levels: usize) -> Vec<Rgb32FImage> {
    let mut pyramid = Vec::with_capacity(levels + 1);
    pyramid.push(src.clone());
    for _ in 0..levels {
        let next = pyr_down_rgb(pyramid.last().expect("non-empty pyramid"));
        pyramid.push(next);
    }
    pyramid
}

pub fn gaussian_pyramid_gray(src: &GrayF32Image, levels: usize) -> Vec<GrayF32Image> {
    let mut pyramid = Vec::with_capacity(levels + 1);
    pyramid.push(src.clone());
    for _ in 0..levels {
        let next = pyr_down_gray(pyramid.last().expect("non-empty pyramid"));
        pyramid.push(next);
    }
    pyramid
}

/// Laplacian pyramid with `levels + 1` entries: band-pass residuals for
/// the first `levels` entries, the coarsest Gaussian level last.
pub fn laplacian_pyramid(src: &Rgb32FImage, levels: usize) -> Vec<Rgb32FImage> {
    let gauss = gaussian_pyramid_rgb(src, levels);
    let mut pyramid = Vec::with_capacity(levels + 1);

    for k in 0..levels {
        let fine = &gauss[k];
        let up = pyr_up_rgb_to(&gauss[k + 1], fine.width(), fine.height());
        let mut band = fine.clone();
        band.as_mut()
            .iter_mut()
            .zip(up.as_raw().iter())
            .for_each(|(b, u)| *b -= u);
        pyramid.push(band);
    }
    pyramid.push(gauss[levels].clone());

    pyramid
}

/// Reconstruct an image from its Laplacian pyramid.
pub fn collapse_laplacian(pyramid: &[Rgb32FImage]) -> Rgb32FImage {
    let mut iter = pyramid.iter().rev();
    let mut acc = match iter.next() {
        Some(coarsest) => coarsest.clone(),
        None => return Rgb32FImage::new(0, 0),
    };

    for band in iter {
        let mut up = pyr_up_rgb_to(&acc, band.width(), band.height());
        up.as_mut()
            .iter_mut()
            .zip(band.as_raw().iter())
            .for_each(|(u, b)| *u += b);
        acc = up;
    }

    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(width: u32, height: u32) -> Rgb32FImage {
        let mut img = Rgb32FImage::new(width, height);
        for (x, y, p) in img.enumerate_pixels_mut() {
            let v = (x + y) as f32;
            p.0 = [v, v * 0.5, 255.0 - v];
        }
        img
    }

    #[test]
    fn pyramid_level_sizes_halve() {
        let img = gradient_image(64, 48);
        let pyr = gaussian_pyramid_rgb(&img, 3);
        assert_eq!(pyr.len(), 4);
        assert_eq!((pyr[1].width(), pyr[1].height()), (32, 24));
        assert_eq!((pyr[3].width(), pyr[3].height()), (8, 6));
    }

    #[test]
    fn laplacian_collapse_roundtrips() {
        let img = gradient_image(40, 30);
        let pyr = laplacian_pyramid(&img, 3);
        let rebuilt = collapse_laplacian(&pyr);
        assert_eq!(rebuilt.width(), 40);
        assert_eq!(rebuilt.height(), 30);
        for (a, b) in rebuilt.as_raw().iter().zip(img.as_raw().iter()) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn odd_sizes_roundtrip() {
        let img = gradient_image(37, 23);
        let pyr = laplacian_pyramid(&img, 2);
        let rebuilt = collapse_laplacian(&pyr);
        for (a, b) in rebuilt.as_raw().iter().zip(img.as_raw().iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }
}
