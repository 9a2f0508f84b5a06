//! Feature-based page registration against the reference template.
//!
//! Reference features are extracted once ([`ReferenceFeatures::prepare`])
//! and shared read-only across every page of a stack. Per page, target
//! features are matched against the reference and a homography mapping
//! template coordinates into target coordinates is fitted with RANSAC.
//!
//! Registration never fails hard: too few matches, or a RANSAC fit that
//! cannot reach consensus, produce [`Registration::LowConfidence`] and
//! the pipeline applies its configured fallback.

use image::GrayImage;
use nalgebra::Matrix3;

use crate::features::{
    match_binary_cross_check, match_float_ratio, DescriptorSet, FeatureMatch, FeatureSet,
    TestPairs,
};
use crate::homography::{self, RansacParams};

/// Which detector/matcher strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    /// Float descriptors, 2-NN matching, Lowe's ratio test.
    RatioTest,
    /// Binary descriptors, Hamming cross-check, best-N truncation.
    Binary,
}

/// Registration tuning.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RegistrationParams {
    /// Matching strategy.
    pub matcher: MatcherKind,
    /// FAST corner threshold.
    pub fast_threshold: u8,
    /// Keypoint budget per image.
    pub max_keypoints: usize,
    /// Gaussian smoothing applied before descriptor sampling.
    pub blur_sigma: f32,
    /// Seed for the binary comparison pattern; reference and target must
    /// agree, so the pattern is derived from configuration, not per image.
    pub descriptor_seed: u64,
    /// Lowe ratio for the ratio-test strategy.
    pub ratio: f32,
    /// Match-count cap for the binary strategy.
    pub max_binary_matches: usize,
    /// Below this many accepted matches the page is low-confidence.
    pub min_matches: usize,
    /// RANSAC controls for the homography fit.
    pub ransac: RansacParams,
}

impl Default for RegistrationParams {
    fn default() -> Self {
        Self {
            matcher: MatcherKind::Binary,
            fast_threshold: 25,
            max_keypoints: 5000,
            blur_sigma: 2.0,
            descriptor_seed: 0x0b51_ef5e,
            ratio: 0.7,
            max_binary_matches: 100,
            min_matches: 10,
            ransac: RansacParams::default(),
        }
    }
}

/// Match and fit quality for one page.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct MatchStats {
    /// Keypoints surviving description on the reference.
    pub reference_keypoints: usize,
    /// Keypoints surviving description on the target.
    pub target_keypoints: usize,
    /// Accepted matches after ratio test / cross-check truncation.
    pub matches: usize,
    /// RANSAC inliers (zero when no fit was attempted or it failed).
    pub inliers: usize,
    /// Mean reprojection error over inliers, pixels.
    pub mean_reproj_err_px: f64,
}

/// Outcome of registering one page.
#[derive(Debug, Clone)]
pub enum Registration {
    /// A transform mapping template coordinates into target coordinates.
    Aligned {
        template_to_target: Matrix3<f64>,
        stats: MatchStats,
    },
    /// Too few trustworthy correspondences; the caller decides the
    /// fallback. Degraded quality, not an error.
    LowConfidence { stats: MatchStats },
}

impl Registration {
    pub fn stats(&self) -> &MatchStats {
        match self {
            Self::Aligned { stats, .. } | Self::LowConfidence { stats } => stats,
        }
    }

    /// The fitted transform, if any.
    pub fn homography(&self) -> Option<&Matrix3<f64>> {
        match self {
            Self::Aligned {
                template_to_target, ..
            } => Some(template_to_target),
            Self::LowConfidence { .. } => None,
        }
    }

    pub fn is_aligned(&self) -> bool {
        matches!(self, Self::Aligned { .. })
    }
}

/// Reference-side state computed once per template.
#[derive(Debug, Clone)]
pub struct ReferenceFeatures {
    features: FeatureSet,
    pairs: TestPairs,
}

impl ReferenceFeatures {
    /// Extract reference features per the configured strategy.
    pub fn prepare(reference: &GrayImage, params: &RegistrationParams) -> Self {
        let pairs = TestPairs::generate(params.descriptor_seed);
        let features = extract(reference, params, &pairs);
        tracing::debug!(
            keypoints = features.keypoints.len(),
            "reference features prepared"
        );
        Self { features, pairs }
    }

    pub fn n_keypoints(&self) -> usize {
        self.features.keypoints.len()
    }
}

fn extract(gray: &GrayImage, params: &RegistrationParams, pairs: &TestPairs) -> FeatureSet {
    match params.matcher {
        MatcherKind::Binary => FeatureSet::binary(
            gray,
            params.fast_threshold,
            params.max_keypoints,
            params.blur_sigma,
            pairs,
        ),
        MatcherKind::RatioTest => FeatureSet::float(
            gray,
            params.fast_threshold,
            params.max_keypoints,
            params.blur_sigma,
        ),
    }
}

fn run_matcher(
    reference: &FeatureSet,
    target: &FeatureSet,
    params: &RegistrationParams,
) -> Vec<FeatureMatch> {
    match (&reference.descriptors, &target.descriptors) {
        (DescriptorSet::Binary(r), DescriptorSet::Binary(t)) => {
            match_binary_cross_check(r, t, params.max_binary_matches)
        }
        (DescriptorSet::Float(r), DescriptorSet::Float(t)) => {
            match_float_ratio(r, t, params.ratio)
        }
        // Reference and target always come from the same params.
        _ => unreachable!("mixed descriptor kinds within one registration"),
    }
}

/// Register one target page against prepared reference features.
pub fn register_page(
    reference: &ReferenceFeatures,
    target_gray: &GrayImage,
    params: &RegistrationParams,
) -> Registration {
    let target = extract(target_gray, params, &reference.pairs);
    let matches = run_matcher(&reference.features, &target, params);

    let mut stats = MatchStats {
        reference_keypoints: reference.features.keypoints.len(),
        target_keypoints: target.keypoints.len(),
        matches: matches.len(),
        ..MatchStats::default()
    };

    if matches.len() < params.min_matches.max(4) {
        tracing::warn!(
            matches = matches.len(),
            min = params.min_matches,
            "low-confidence registration: too few accepted matches"
        );
        return Registration::LowConfidence { stats };
    }

    let src: Vec<[f64; 2]> = matches
        .iter()
        .map(|m| reference.features.keypoints[m.reference].point())
        .collect();
    let dst: Vec<[f64; 2]> = matches
        .iter()
        .map(|m| target.keypoints[m.target].point())
        .collect();

    match homography::fit_ransac(&src, &dst, &params.ransac) {
        Ok(fit) => {
            let inlier_errs: Vec<f64> = fit
                .errors
                .iter()
                .zip(fit.inlier_mask.iter())
                .filter(|(_, &m)| m)
                .map(|(&e, _)| e)
                .collect();
            stats.inliers = fit.n_inliers;
            stats.mean_reproj_err_px = if inlier_errs.is_empty() {
                0.0
            } else {
                inlier_errs.iter().sum::<f64>() / inlier_errs.len() as f64
            };
            tracing::info!(
                matches = stats.matches,
                inliers = stats.inliers,
                mean_err_px = stats.mean_reproj_err_px,
                "page registered"
            );
            Registration::Aligned {
                template_to_target: fit.h,
                stats,
            }
        }
        Err(e) => {
            tracing::warn!("low-confidence registration: homography fit failed: {e}");
            Registration::LowConfidence { stats }
        }
    }
}

/// One-shot convenience: prepare the reference and register a single pair.
pub fn register(
    reference_gray: &GrayImage,
    target_gray: &GrayImage,
    params: &RegistrationParams,
) -> Registration {
    let reference = ReferenceFeatures::prepare(reference_gray, params);
    register_page(&reference, target_gray, params)
}
