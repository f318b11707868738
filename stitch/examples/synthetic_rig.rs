//! End-to-end demo on a synthetic four-camera rig.
//!
//! Generates calibration files for four yawed cameras, renders a
//! gradient test pattern per camera with deliberately mismatched
//! exposure, and writes the stitched panorama to `synthetic_rig.png`.
//!
//! Run with `cargo run -p sv-stitch --example synthetic_rig`.

use image::{Rgb, RgbImage};
use serde_json::json;
use std::path::Path;
use sv_core::StitchConfig;
use sv_stitch::SurroundStitcher;

const INPUT: (u32, u32) = (320, 240);
const FOCAL: f64 = 120.0;

fn yaw_rotation(degrees: f64) -> [[f64; 3]; 3] {
    let t = degrees.to_radians();
    [
        [t.cos(), 0.0, t.sin()],
        [0.0, 1.0, 0.0],
        [-t.sin(), 0.0, t.cos()],
    ]
}

fn write_calibration(folder: &Path) -> std::io::Result<()> {
    let intrinsic = [
        [FOCAL, 0.0, INPUT.0 as f64 / 2.0],
        [0.0, FOCAL, INPUT.1 as f64 / 2.0],
        [0.0, 0.0, 1.0],
    ];
    for (index, yaw) in [-60.0, -20.0, 20.0, 60.0].iter().enumerate() {
        let record = json!({
            "focal_length": FOCAL,
            "intrinsic": intrinsic,
            "rotation": yaw_rotation(*yaw),
        });
        std::fs::write(
            folder.join(format!("camparam{index}.json")),
            serde_json::to_string_pretty(&record)?,
        )?;
    }
    Ok(())
}

/// Checkerboard over a horizontal gradient, scaled by a per-camera
/// exposure factor so the gain stage has something to correct.
fn render_frame(exposure: f64) -> RgbImage {
    let mut img = RgbImage::new(INPUT.0, INPUT.1);
    for (x, y, p) in img.enumerate_pixels_mut() {
        let base = 60.0 + 140.0 * (x as f64 / INPUT.0 as f64);
        let check = if (x / 20 + y / 20) % 2 == 0 { 1.0 } else { 0.75 };
        let v = (base * check * exposure).round().clamp(0.0, 255.0) as u8;
        *p = Rgb([v, v, (v as f64 * 0.8) as u8]);
    }
    img
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let dir = tempfile::tempdir()?;
    write_calibration(dir.path())?;

    let config = StitchConfig {
        num_cameras: 4,
        input_width: INPUT.0,
        input_height: INPUT.1,
        output_width: 640,
        output_height: 240,
        process_scale: 1.0,
        blend_bands: 3,
        gain_update_interval_secs: 30,
    };

    let frames: Vec<RgbImage> = [0.8, 1.2, 0.9, 1.1]
        .iter()
        .map(|&e| render_frame(e))
        .collect();

    let mut stitcher = SurroundStitcher::initialize(config, dir.path(), &frames)?;
    let panorama = stitcher.stitch(&frames)?;
    panorama.save("synthetic_rig.png")?;

    println!(
        "wrote synthetic_rig.png ({}x{}), gains: {:?}",
        panorama.width(),
        panorama.height(),
        stitcher.gains()
    );
    Ok(())
}
