//! FAST corner detection with a response-ranked keypoint budget.

use image::GrayImage;
use imageproc::corners::corners_fast9;

use super::KeyPoint;

/// Detect FAST-9 corners and keep the `max_keypoints` strongest.
///
/// Ties are broken by `(y, x)` so the result is deterministic for a given
/// image; pathological images cannot inflate downstream matching cost
/// beyond the budget.
pub fn detect_keypoints(gray: &GrayImage, threshold: u8, max_keypoints: usize) -> Vec<KeyPoint> {
    let mut corners: Vec<KeyPoint> = corners_fast9(gray, threshold)
        .into_iter()
        .map(|c| KeyPoint {
            x: c.x,
            y: c.y,
            score: c.score,
        })
        .collect();

    corners.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| (a.y, a.x).cmp(&(b.y, b.x)))
    });
    corners.truncate(max_keypoints);
    corners
}
