use image::GrayImage;
use rayon::prelude::*;

use crate::WarpGeometry;

/// Per-camera coverage mask: 255 where the camera contributes to the
/// panorama, 0 elsewhere. Same size as the warp footprint.
pub type OverlapMask = GrayImage;

/// Build full-footprint masks from remap-table validity.
///
/// A panorama pixel is covered when its backward-mapped coordinate
/// falls inside the scaled source image. No seam carving: every source
/// pixel contributes, and overlap handling is left to the blender and
/// gain compensator.
pub fn build_overlap_masks(
    geometries: &[WarpGeometry],
    src_size: (u32, u32),
) -> Vec<OverlapMask> {
    geometries
        .iter()
        .map(|geometry| footprint_mask(geometry, src_size))
        .collect()
}

fn footprint_mask(geometry: &WarpGeometry, src_size: (u32, u32)) -> OverlapMask {
    let (width, height) = geometry.size;
    let max_x = (src_size.0.saturating_sub(1)) as f32;
    let max_y = (src_size.1.saturating_sub(1)) as f32;

    let mut mask = GrayImage::new(width, height);
    mask.as_mut()
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let base = y * width as usize;
            for x in 0..width as usize {
                let sx = geometry.map_x[base + x];
                let sy = geometry.map_y[base + x];
                if sx >= 0.0 && sy >= 0.0 && sx <= max_x && sy <= max_y {
                    row[x] = 255;
                }
            }
        });

    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_follows_map_validity() {
        let geometry = WarpGeometry {
            corner: (0, 0),
            size: (3, 1),
            map_x: vec![1.0, -1.0, 5.0],
            map_y: vec![1.0, -1.0, 1.0],
        };
        let masks = build_overlap_masks(std::slice::from_ref(&geometry), (4, 4));
        let mask = &masks[0];
        assert_eq!(mask.get_pixel(0, 0)[0], 255);
        assert_eq!(mask.get_pixel(1, 0)[0], 0);
        // x = 5 is outside a 4-wide source
        assert_eq!(mask.get_pixel(2, 0)[0], 0);
    }
}
