//! Keypoint detection, descriptor extraction, and matching.
//!
//! Two interchangeable strategies feed the registrar:
//! - binary: FAST corners + 256-bit intensity-comparison descriptors,
//!   exhaustive Hamming matching with mutual cross-check;
//! - float: FAST corners + 128-dim gradient-histogram patch descriptors,
//!   2-NN matching under L2 with Lowe's ratio test.

mod brief;
mod detect;
mod matching;
mod patch;

pub use brief::{BinaryDescriptor, TestPairs};
pub use detect::detect_keypoints;
pub use matching::{match_binary_cross_check, match_float_ratio, FeatureMatch};
pub use patch::FloatDescriptor;

use image::GrayImage;

/// A detected corner with its detector response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

impl KeyPoint {
    /// Keypoint position as a float point for homography fitting.
    pub fn point(&self) -> [f64; 2] {
        [self.x as f64, self.y as f64]
    }
}

/// Descriptors of one image under one strategy.
#[derive(Debug, Clone)]
pub enum DescriptorSet {
    Binary(Vec<BinaryDescriptor>),
    Float(Vec<FloatDescriptor>),
}

/// Keypoints plus their descriptors; the two vectors are index-aligned
/// (keypoints too close to the border for a full patch are dropped before
/// description).
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: DescriptorSet,
}

impl FeatureSet {
    /// Extract binary features: detect, blur, describe.
    pub fn binary(
        gray: &GrayImage,
        fast_threshold: u8,
        max_keypoints: usize,
        blur_sigma: f32,
        pairs: &TestPairs,
    ) -> Self {
        let keypoints = detect_keypoints(gray, fast_threshold, max_keypoints);
        let blurred = imageproc::filter::gaussian_blur_f32(gray, blur_sigma);
        let (keypoints, descriptors) = brief::describe(&blurred, &keypoints, pairs);
        Self {
            keypoints,
            descriptors: DescriptorSet::Binary(descriptors),
        }
    }

    /// Extract float features: detect, blur, describe.
    pub fn float(
        gray: &GrayImage,
        fast_threshold: u8,
        max_keypoints: usize,
        blur_sigma: f32,
    ) -> Self {
        let keypoints = detect_keypoints(gray, fast_threshold, max_keypoints);
        let blurred = imageproc::filter::gaussian_blur_f32(gray, blur_sigma);
        let (keypoints, descriptors) = patch::describe(&blurred, &keypoints);
        Self {
            keypoints,
            descriptors: DescriptorSet::Float(descriptors),
        }
    }
}
