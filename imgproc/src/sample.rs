use image::RgbImage;

/// Out-of-bounds policy for sampling operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BorderMode {
    Constant(f32),
    Replicate,
}

pub(crate) fn map_coord(coord: isize, len: usize, mode: BorderMode) -> Option<usize> {
    let n = len as isize;
    if n <= 0 {
        return None;
    }

    match mode {
        BorderMode::Constant(_) => {
            if coord < 0 || coord >= n {
                None
            } else {
                Some(coord as usize)
            }
        }
        BorderMode::Replicate => Some(coord.clamp(0, n - 1) as usize),
    }
}

fn border_fill(border: BorderMode) -> [f32; 3] {
    match border {
        BorderMode::Constant(v) => [v; 3],
        BorderMode::Replicate => [0.0; 3],
    }
}

pub fn sample_rgb(img: &RgbImage, x: isize, y: isize, border: BorderMode) -> [f32; 3] {
    let width = img.width() as usize;
    let height = img.height() as usize;
    let raw = img.as_raw();

    match (map_coord(x, width, border), map_coord(y, height, border)) {
        (Some(ix), Some(iy)) => {
            let idx = (iy * width + ix) * 3;
            [
                raw[idx] as f32,
                raw[idx + 1] as f32,
                raw[idx + 2] as f32,
            ]
        }
        _ => border_fill(border),
    }
}

/// Bilinear sample of an 8-bit RGB image at fractional coordinates.
pub fn bilinear_rgb(img: &RgbImage, x: f32, y: f32, border: BorderMode) -> [f32; 3] {
    let x0 = x.floor() as isize;
    let y0 = y.floor() as isize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let v00 = sample_rgb(img, x0, y0, border);
    let v10 = sample_rgb(img, x0 + 1, y0, border);
    let v01 = sample_rgb(img, x0, y0 + 1, border);
    let v11 = sample_rgb(img, x0 + 1, y0 + 1, border);

    lerp2(v00, v10, v01, v11, fx, fy)
}

fn lerp2(
    v00: [f32; 3],
    v10: [f32; 3],
    v01: [f32; 3],
    v11: [f32; 3],
    fx: f32,
    fy: f32,
) -> [f32; 3] {
    let mut out = [0.0f32; 3];
    for c in 0..3 {
        let v0 = v00[c] * (1.0 - fx) + v10[c] * fx;
        let v1 = v01[c] * (1.0 - fx) + v11[c] * fx;
        out[c] = v0 * (1.0 - fy) + v1 * fy;
    }
    out
}
