use image::RgbImage;
use log::{info, warn};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use sv_imgproc::{build_perspective_maps, perspective_from_quad, remap_rgb, resize_rgb, BorderMode};

/// On-disk crop configuration: `crop_corners.json`.
///
/// Four named panorama-space points map onto the four corners of the
/// output canvas.
#[derive(Debug, Deserialize)]
struct CropRecord {
    output_size: [u32; 2],
    tl: [f64; 2],
    tr: [f64; 2],
    bl: [f64; 2],
    br: [f64; 2],
}

/// Final panorama → display mapping.
///
/// With a valid crop configuration this is a fixed perspective remap
/// through precomputed tables; without one it degrades to a plain
/// resize. The missing-file case is a documented fallback, not an
/// error.
pub struct OutputCropper {
    output_size: (u32, u32),
    remap: Option<CropRemap>,
}

struct CropRemap {
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl OutputCropper {
    /// Read `crop_corners.json` from `folder` if present and valid.
    ///
    /// `default_output` is the configured output resolution used by the
    /// resize fallback.
    pub fn configure(folder: &Path, default_output: (u32, u32)) -> Self {
        let path = folder.join("crop_corners.json");

        let record = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<CropRecord>(&contents) {
                Ok(record) => record,
                Err(e) => {
                    warn!(
                        "invalid crop configuration {}: {e}; falling back to resize",
                        path.display()
                    );
                    return Self::resize_only(default_output);
                }
            },
            Err(_) => {
                warn!(
                    "no crop configuration at {}; falling back to resize",
                    path.display()
                );
                return Self::resize_only(default_output);
            }
        };

        let (width, height) = (record.output_size[0], record.output_size[1]);
        if width == 0 || height == 0 {
            warn!("crop configuration has empty output size; falling back to resize");
            return Self::resize_only(default_output);
        }

        let src = [
            (record.tl[0], record.tl[1]),
            (record.tr[0], record.tr[1]),
            (record.bl[0], record.bl[1]),
            (record.br[0], record.br[1]),
        ];
        let dst = [
            (0.0, 0.0),
            (width as f64, 0.0),
            (0.0, height as f64),
            (width as f64, height as f64),
        ];

        // The remap convention is backward (output pixel → panorama
        // coordinate), so build the maps from the inverse transform.
        let dst_to_src = match perspective_from_quad(&dst, &src) {
            Some(m) => m,
            None => {
                warn!("degenerate crop corners; falling back to resize");
                return Self::resize_only(default_output);
            }
        };

        let (map_x, map_y) = build_perspective_maps(&dst_to_src, width, height);
        info!(
            "output crop configured: {}x{}, corners TL({:.0},{:.0}) TR({:.0},{:.0}) BL({:.0},{:.0}) BR({:.0},{:.0})",
            width, height,
            record.tl[0], record.tl[1],
            record.tr[0], record.tr[1],
            record.bl[0], record.bl[1],
            record.br[0], record.br[1],
        );

        Self {
            output_size: (width, height),
            remap: Some(CropRemap { map_x, map_y }),
        }
    }

    pub fn resize_only(output_size: (u32, u32)) -> Self {
        Self {
            output_size,
            remap: None,
        }
    }

    pub fn output_size(&self) -> (u32, u32) {
        self.output_size
    }

    pub fn has_crop(&self) -> bool {
        self.remap.is_some()
    }

    /// Map the full panorama into the output canvas.
    pub fn apply(&self, panorama: &RgbImage) -> RgbImage {
        match &self.remap {
            Some(crop) => remap_rgb(
                panorama,
                &crop.map_x,
                &crop.map_y,
                self.output_size.0,
                self.output_size.1,
                BorderMode::Constant(0.0),
            ),
            None => resize_rgb(panorama, self.output_size.0, self.output_size.1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Write;

    #[test]
    fn missing_file_falls_back_to_resize() {
        let dir = tempfile::tempdir().unwrap();
        let cropper = OutputCropper::configure(dir.path(), (40, 20));
        assert!(!cropper.has_crop());
        assert_eq!(cropper.output_size(), (40, 20));

        let mut panorama = RgbImage::new(80, 40);
        for p in panorama.pixels_mut() {
            *p = Rgb([30, 60, 90]);
        }
        let out = cropper.apply(&panorama);
        assert_eq!((out.width(), out.height()), (40, 20));
        assert_eq!(out.as_raw(), resize_rgb(&panorama, 40, 20).as_raw());
    }

    #[test]
    fn invalid_file_falls_back_to_resize() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("crop_corners.json")).unwrap();
        f.write_all(b"not json").unwrap();

        let cropper = OutputCropper::configure(dir.path(), (16, 16));
        assert!(!cropper.has_crop());
    }

    #[test]
    fn axis_aligned_crop_extracts_region() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("crop_corners.json"),
            r#"{
                "output_size": [10, 10],
                "tl": [10.0, 10.0],
                "tr": [20.0, 10.0],
                "bl": [10.0, 20.0],
                "br": [20.0, 20.0]
            }"#,
        )
        .unwrap();

        let cropper = OutputCropper::configure(dir.path(), (99, 99));
        assert!(cropper.has_crop());
        assert_eq!(cropper.output_size(), (10, 10));

        let mut panorama = RgbImage::new(40, 40);
        // Bright square exactly over the crop window.
        for y in 10..20 {
            for x in 10..20 {
                panorama.put_pixel(x, y, Rgb([250, 0, 0]));
            }
        }
        let out = cropper.apply(&panorama);
        assert_eq!(out.get_pixel(5, 5).0, [250, 0, 0]);
    }
}
