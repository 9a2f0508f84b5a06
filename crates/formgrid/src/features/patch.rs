//! 128-dim float gradient-histogram patch descriptors.
//!
//! A SIFT-flavoured upright descriptor: the 16×16 patch around a keypoint
//! is divided into a 4×4 grid of cells, each accumulating an 8-bin
//! gradient-orientation histogram weighted by gradient magnitude. The
//! vector is L2-normalized with the usual 0.2 clamp to tame contrast
//! spikes. No dominant-orientation normalization is applied; scanned
//! forms are upright to within the homography the registrar estimates.

use image::GrayImage;

use super::KeyPoint;

const PATCH: i64 = 8;
const CELLS: usize = 4;
const BINS: usize = 8;
/// 4 x 4 cells x 8 bins.
pub(crate) const FLOAT_DIMS: usize = CELLS * CELLS * BINS;
/// Patch plus one pixel for central differences.
const BORDER: i64 = PATCH + 1;

/// A 128-dim descriptor under L2 distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatDescriptor(pub [f32; FLOAT_DIMS]);

impl FloatDescriptor {
    /// Euclidean distance to another descriptor.
    pub fn distance(&self, other: &Self) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }
}

/// Describe keypoints over a pre-smoothed image.
///
/// Returns the surviving keypoints (full patch in bounds) and their
/// descriptors, index-aligned.
pub(super) fn describe(
    blurred: &GrayImage,
    keypoints: &[KeyPoint],
) -> (Vec<KeyPoint>, Vec<FloatDescriptor>) {
    let (w, h) = blurred.dimensions();
    let mut kept = Vec::new();
    let mut descriptors = Vec::new();

    for kp in keypoints {
        let cx = kp.x as i64;
        let cy = kp.y as i64;
        if cx < BORDER || cy < BORDER || cx + BORDER >= w as i64 || cy + BORDER >= h as i64 {
            continue;
        }

        let mut v = [0f32; FLOAT_DIMS];
        for dy in -PATCH..PATCH {
            for dx in -PATCH..PATCH {
                let x = (cx + dx) as u32;
                let y = (cy + dy) as u32;
                let gx = blurred.get_pixel(x + 1, y)[0] as f32
                    - blurred.get_pixel(x - 1, y)[0] as f32;
                let gy = blurred.get_pixel(x, y + 1)[0] as f32
                    - blurred.get_pixel(x, y - 1)[0] as f32;
                let mag = (gx * gx + gy * gy).sqrt();
                if mag == 0.0 {
                    continue;
                }

                let angle = gy.atan2(gx);
                let mut bin =
                    ((angle + std::f32::consts::PI) / (2.0 * std::f32::consts::PI) * BINS as f32)
                        as usize;
                if bin >= BINS {
                    bin = BINS - 1;
                }
                let cell_x = ((dx + PATCH) / 4) as usize;
                let cell_y = ((dy + PATCH) / 4) as usize;
                v[(cell_y * CELLS + cell_x) * BINS + bin] += mag;
            }
        }

        normalize(&mut v);
        for x in v.iter_mut() {
            *x = x.min(0.2);
        }
        normalize(&mut v);

        kept.push(*kp);
        descriptors.push(FloatDescriptor(v));
    }

    (kept, descriptors)
}

fn normalize(v: &mut [f32; FLOAT_DIMS]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{render_form, translate_gray, FormSpec};
    use approx::assert_relative_eq;

    #[test]
    fn descriptor_is_unit_length() {
        let img = render_form(&FormSpec::default(), 9);
        let blurred = imageproc::filter::gaussian_blur_f32(&img, 2.0);
        let kp = KeyPoint { x: 100, y: 90, score: 1.0 };
        let (_, descs) = describe(&blurred, &[kp]);
        let norm = descs[0].0.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn flat_patch_keypoint_yields_zero_vector() {
        let img = GrayImage::from_pixel(64, 64, image::Luma([200]));
        let (_, descs) = describe(&img, &[KeyPoint { x: 32, y: 32, score: 1.0 }]);
        assert!(descs[0].0.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn translation_preserves_descriptors() {
        let img = render_form(&FormSpec::default(), 5);
        let shifted = translate_gray(&img, 10, 5);
        let blurred = imageproc::filter::gaussian_blur_f32(&img, 2.0);
        let blurred_shifted = imageproc::filter::gaussian_blur_f32(&shifted, 2.0);

        let (_, a) = describe(&blurred, &[KeyPoint { x: 120, y: 100, score: 1.0 }]);
        let (_, b) = describe(&blurred_shifted, &[KeyPoint { x: 130, y: 105, score: 1.0 }]);
        assert_relative_eq!(a[0].distance(&b[0]), 0.0, epsilon = 1e-5);
    }
}
