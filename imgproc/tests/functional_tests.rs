use image::{Rgb, Rgb32FImage, RgbImage};
use nalgebra::Matrix3;
use sv_imgproc::*;

#[test]
fn test_resize_functional() {
    let mut img = RgbImage::new(100, 100);
    img.put_pixel(50, 50, Rgb([255, 255, 255]));

    let up = resize_rgb(&img, 200, 200);
    assert_eq!(up.width(), 200);
    assert_eq!(up.height(), 200);

    let down = resize_rgb(&img, 50, 50);
    assert_eq!(down.width(), 50);
    assert_eq!(down.height(), 50);
}

#[test]
fn test_remap_translation() {
    let mut img = RgbImage::new(8, 8);
    img.put_pixel(2, 2, Rgb([255, 0, 0]));

    // dst(x, y) = src(x - 2, y - 1)
    let mut map_x = vec![0.0f32; 64];
    let mut map_y = vec![0.0f32; 64];
    for y in 0..8usize {
        for x in 0..8usize {
            map_x[y * 8 + x] = x as f32 - 2.0;
            map_y[y * 8 + x] = y as f32 - 1.0;
        }
    }

    let out = remap_rgb(&img, &map_x, &map_y, 8, 8, BorderMode::Constant(0.0));
    assert_eq!(out.get_pixel(4, 3).0, [255, 0, 0]);
    assert_eq!(out.get_pixel(2, 2).0, [0, 0, 0]);
}

#[test]
fn test_remap_to_f32_matches_u8_path() {
    let mut img = RgbImage::new(6, 6);
    for (x, y, p) in img.enumerate_pixels_mut() {
        *p = Rgb([(x * 30) as u8, (y * 30) as u8, 128]);
    }

    let mut map_x = vec![0.0f32; 36];
    let mut map_y = vec![0.0f32; 36];
    for y in 0..6usize {
        for x in 0..6usize {
            map_x[y * 6 + x] = x as f32;
            map_y[y * 6 + x] = y as f32;
        }
    }

    let u8_out = remap_rgb(&img, &map_x, &map_y, 6, 6, BorderMode::Constant(0.0));
    let f32_out = remap_rgb_to_f32(&img, &map_x, &map_y, 6, 6, BorderMode::Constant(0.0));
    for (a, b) in u8_out.as_raw().iter().zip(f32_out.as_raw().iter()) {
        assert!((*a as f32 - b).abs() < 1.0);
    }
}

#[test]
fn test_perspective_crop_region() {
    // Map a 10x10 window at (5, 5) onto a 10x10 output.
    let src = [(5.0, 5.0), (15.0, 5.0), (5.0, 15.0), (15.0, 15.0)];
    let dst = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)];
    let forward = perspective_from_quad(&src, &dst).unwrap();
    let inverse = perspective_from_quad(&dst, &src).unwrap();

    let (u, v) = transform_point(&forward, 10.0, 10.0);
    assert!((u - 5.0).abs() < 1e-6);
    assert!((v - 5.0).abs() < 1e-6);

    let (x, y) = transform_point(&inverse, 5.0, 5.0);
    assert!((x - 10.0).abs() < 1e-6);
    assert!((y - 10.0).abs() < 1e-6);
}

#[test]
fn test_laplacian_blend_intermediate_is_signed() {
    // A hard step produces negative band values; the f32 pyramid must
    // carry them without wrapping.
    let mut img = Rgb32FImage::new(16, 16);
    for (x, _, p) in img.enumerate_pixels_mut() {
        let v = if x < 8 { 0.0 } else { 255.0 };
        p.0 = [v; 3];
    }

    let pyr = laplacian_pyramid(&img, 2);
    let has_negative = pyr[0].as_raw().iter().any(|&v| v < 0.0);
    assert!(has_negative);

    let rebuilt = collapse_laplacian(&pyr);
    for (a, b) in rebuilt.as_raw().iter().zip(img.as_raw().iter()) {
        assert!((a - b).abs() < 1e-3);
    }
}
