use image::{Rgb32FImage, RgbImage};
use rayon::prelude::*;

use crate::GrayF32Image;

/// Bilinear resize of an 8-bit RGB image.
pub fn resize_rgb(src: &RgbImage, width: u32, height: u32) -> RgbImage {
    if width == 0 || height == 0 {
        return RgbImage::new(0, 0);
    }
    if src.width() == width && src.height() == height {
        return src.clone();
    }

    let mut dst = RgbImage::new(width, height);
    let src_width = src.width() as f32 - 1.0;
    let src_height = src.height() as f32 - 1.0;
    let dst_width = (width.max(2) - 1) as f32;
    let dst_height = (height.max(2) - 1) as f32;

    if src_width < 0.0 || src_height < 0.0 {
        return dst;
    }

    dst.as_mut()
        .par_chunks_mut(width as usize * 3)
        .enumerate()
        .for_each(|(y, row)| {
            let fy = (y as f32 / dst_height) * src_height;
            let y0 = (fy as u32).min(src.height() - 1);
            let y1 = (y0 + 1).min(src.height() - 1);
            let dy = fy - y0 as f32;

            for x in 0..width {
                let fx = (x as f32 / dst_width) * src_width;
                let x0 = (fx as u32).min(src.width() - 1);
                let x1 = (x0 + 1).min(src.width() - 1);
                let dx = fx - x0 as f32;

                for c in 0..3 {
                    let v00 = src.get_pixel(x0, y0)[c] as f32;
                    let v10 = src.get_pixel(x1, y0)[c] as f32;
                    let v01 = src.get_pixel(x0, y1)[c] as f32;
                    let v11 = src.get_pixel(x1, y1)[c] as f32;

                    let v0 = v00 * (1.0 - dx) + v10 * dx;
                    let v1 = v01 * (1.0 - dx) + v11 * dx;
                    let v = v0 * (1.0 - dy) + v1 * dy;

                    row[x as usize * 3 + c] = v.clamp(0.0, 255.0) as u8;
                }
            }
        });

    dst
}

/// Bilinear resize of an interleaved f32 plane with `channels` components.
pub fn resize_plane_f32(
    src: &[f32],
    src_width: u32,
    src_height: u32,
    channels: usize,
    width: u32,
    height: u32,
) -> Vec<f32> {
    let mut dst = vec![0.0f32; width as usize * height as usize * channels];
    if width == 0 || height == 0 || src_width == 0 || src_height == 0 {
        return dst;
    }

    let src_w = src_width as f32 - 1.0;
    let src_h = src_height as f32 - 1.0;
    let dst_w = (width.max(2) - 1) as f32;
    let dst_h = (height.max(2) - 1) as f32;
    let row_stride = src_width as usize * channels;

    dst.par_chunks_mut(width as usize * channels)
        .enumerate()
        .for_each(|(y, row)| {
            let fy = (y as f32 / dst_h) * src_h;
            let y0 = (fy as usize).min(src_height as usize - 1);
            let y1 = (y0 + 1).min(src_height as usize - 1);
            let dy = fy - y0 as f32;

            for x in 0..width as usize {
                let fx = (x as f32 / dst_w) * src_w;
                let x0 = (fx as usize).min(src_width as usize - 1);
                let x1 = (x0 + 1).min(src_width as usize - 1);
                let dx = fx - x0 as f32;

                for c in 0..channels {
                    let v00 = src[y0 * row_stride + x0 * channels + c];
                    let v10 = src[y0 * row_stride + x1 * channels + c];
                    let v01 = src[y1 * row_stride + x0 * channels + c];
                    let v11 = src[y1 * row_stride + x1 * channels + c];

                    let v0 = v00 * (1.0 - dx) + v10 * dx;
                    let v1 = v01 * (1.0 - dx) + v11 * dx;
                    row[x * channels + c] = v0 * (1.0 - dy) + v1 * dy;
                }
            }
        });

    dst
}

pub fn resize_rgb_f32(src: &Rgb32FImage, width: u32, height: u32) -> Rgb32FImage {
    let data = resize_plane_f32(src.as_raw(), src.width(), src.height(), 3, width, height);
    Rgb32FImage::from_raw(width, height, data)
        .unwrap_or_else(|| Rgb32FImage::new(width, height))
}

pub fn resize_gray_f32(src: &GrayF32Image, width: u32, height: u32) -> GrayF32Image {
    let data = resize_plane_f32(src.as_raw(), src.width(), src.height(), 1, width, height);
    GrayF32Image::from_raw(width, height, data)
        .unwrap_or_else(|| GrayF32Image::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn resize_rgb_dimensions() {
        let mut img = RgbImage::new(10, 10);
        img.put_pixel(5, 5, Rgb([255, 128, 64]));
        let out = resize_rgb(&img, 20, 20);
        assert_eq!(out.width(), 20);
        assert_eq!(out.height(), 20);
        assert!(out.pixels().any(|p| p[0] > 0));
    }

    #[test]
    fn resize_noop_returns_copy() {
        let mut img = RgbImage::new(6, 4);
        img.put_pixel(3, 2, Rgb([9, 9, 9]));
        let out = resize_rgb(&img, 6, 4);
        assert_eq!(out.get_pixel(3, 2)[0], 9);
    }

    #[test]
    fn resize_plane_uniform_stays_uniform() {
        let src = vec![0.25f32; 8 * 6];
        let out = resize_plane_f32(&src, 8, 6, 1, 4, 3);
        assert!(out.iter().all(|v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn uniform_rgb_resize_is_exact() {
        let mut img = RgbImage::new(9, 7);
        for p in img.pixels_mut() {
            *p = Rgb([120, 60, 30]);
        }
        let out = resize_rgb(&img, 5, 4);
        for p in out.pixels() {
            assert_eq!(p.0, [120, 60, 30]);
        }
    }
}
