//! 256-bit binary patch descriptors.
//!
//! Classic BRIEF: a fixed, seeded set of point-pair intensity comparisons
//! inside a smoothed patch around each keypoint. The same [`TestPairs`]
//! must be used for reference and target so descriptors are comparable;
//! the registrar derives the seed from its configuration.

use image::GrayImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::KeyPoint;

/// Number of intensity comparisons per descriptor.
const N_BITS: usize = 256;
/// Patch half-size; keypoints closer than this to the border are dropped.
pub(crate) const PATCH_RADIUS: i64 = 15;
/// Comparison offsets stay inside the patch with room for smoothing.
const OFFSET_RANGE: i64 = 13;

/// A 256-bit descriptor packed into four words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryDescriptor(pub [u64; 4]);

impl BinaryDescriptor {
    /// Hamming distance to another descriptor.
    pub fn distance(&self, other: &Self) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// The seeded comparison pattern shared by both images of a pair.
#[derive(Debug, Clone)]
pub struct TestPairs {
    pairs: Vec<[i64; 4]>,
}

impl TestPairs {
    /// Generate the pattern from a seed; identical seeds yield identical
    /// patterns.
    pub fn generate(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let pairs = (0..N_BITS)
            .map(|_| {
                [
                    rng.gen_range(-OFFSET_RANGE..=OFFSET_RANGE),
                    rng.gen_range(-OFFSET_RANGE..=OFFSET_RANGE),
                    rng.gen_range(-OFFSET_RANGE..=OFFSET_RANGE),
                    rng.gen_range(-OFFSET_RANGE..=OFFSET_RANGE),
                ]
            })
            .collect();
        Self { pairs }
    }
}

/// Describe keypoints over a pre-smoothed image.
///
/// Returns the surviving keypoints (full patch in bounds) and their
/// descriptors, index-aligned.
pub(super) fn describe(
    blurred: &GrayImage,
    keypoints: &[KeyPoint],
    pairs: &TestPairs,
) -> (Vec<KeyPoint>, Vec<BinaryDescriptor>) {
    let (w, h) = blurred.dimensions();
    let mut kept = Vec::new();
    let mut descriptors = Vec::new();

    for kp in keypoints {
        let cx = kp.x as i64;
        let cy = kp.y as i64;
        if cx < PATCH_RADIUS
            || cy < PATCH_RADIUS
            || cx + PATCH_RADIUS >= w as i64
            || cy + PATCH_RADIUS >= h as i64
        {
            continue;
        }

        let mut bits = [0u64; 4];
        for (i, [dx1, dy1, dx2, dy2]) in pairs.pairs.iter().enumerate() {
            let a = blurred.get_pixel((cx + dx1) as u32, (cy + dy1) as u32)[0];
            let b = blurred.get_pixel((cx + dx2) as u32, (cy + dy2) as u32)[0];
            if a < b {
                bits[i / 64] |= 1u64 << (i % 64);
            }
        }
        kept.push(*kp);
        descriptors.push(BinaryDescriptor(bits));
    }

    (kept, descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{render_form, translate_gray, FormSpec};

    #[test]
    fn hamming_distance_counts_differing_bits() {
        let a = BinaryDescriptor([0, 0, 0, 0]);
        let b = BinaryDescriptor([0b1011, 0, 1, u64::MAX]);
        assert_eq!(a.distance(&b), 3 + 1 + 64);
        assert_eq!(b.distance(&b), 0);
    }

    #[test]
    fn test_pairs_are_seed_deterministic() {
        let a = TestPairs::generate(42);
        let b = TestPairs::generate(42);
        let c = TestPairs::generate(43);
        assert_eq!(a.pairs, b.pairs);
        assert_ne!(a.pairs, c.pairs);
    }

    #[test]
    fn border_keypoints_are_dropped() {
        let img = GrayImage::from_pixel(64, 64, image::Luma([128]));
        let pairs = TestPairs::generate(0);
        let kps = vec![
            KeyPoint { x: 2, y: 30, score: 1.0 },
            KeyPoint { x: 32, y: 32, score: 1.0 },
            KeyPoint { x: 60, y: 50, score: 1.0 },
        ];
        let (kept, descs) = describe(&img, &kps, &pairs);
        assert_eq!(kept.len(), 1);
        assert_eq!(descs.len(), 1);
        assert_eq!((kept[0].x, kept[0].y), (32, 32));
    }

    #[test]
    fn translation_preserves_descriptors() {
        let img = render_form(&FormSpec::default(), 5);
        let shifted = translate_gray(&img, 10, 5);
        let pairs = TestPairs::generate(7);

        let kp = KeyPoint { x: 120, y: 100, score: 1.0 };
        let kp_shifted = KeyPoint { x: 130, y: 105, score: 1.0 };

        let blurred = imageproc::filter::gaussian_blur_f32(&img, 2.0);
        let blurred_shifted = imageproc::filter::gaussian_blur_f32(&shifted, 2.0);
        let (_, a) = describe(&blurred, &[kp], &pairs);
        let (_, b) = describe(&blurred_shifted, &[kp_shifted], &pairs);
        assert_eq!(a[0].distance(&b[0]), 0);
    }
}
