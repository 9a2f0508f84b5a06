//! Per-cell crop extraction.
//!
//! Template-space cell boxes are carried into target space either by
//! mapping their corners through the page transform (map-then-crop) or
//! by cropping a pre-rectified page directly (warp-then-crop, transform
//! `None`). Every requested cell yields exactly one [`ExtractionResult`];
//! a cell that cannot be cropped is an explicit failure marker, never a
//! silent omission.

use image::RgbImage;
use nalgebra::Matrix3;

use crate::geometry::{CellBox, CropRect};
use crate::homography::project;

/// Why a cell produced no crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The mapped rectangle has zero area inside the target image.
    EmptyRegion,
    /// Corner mapping produced non-finite coordinates.
    NonFinite,
    /// The page registration was rejected and the fallback skips cells.
    LowConfidenceRegistration,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyRegion => write!(f, "empty crop region"),
            Self::NonFinite => write!(f, "non-finite mapped coordinates"),
            Self::LowConfidenceRegistration => write!(f, "low-confidence registration"),
        }
    }
}

/// Crop or failure for one cell.
#[derive(Debug, Clone)]
pub enum CellOutcome {
    Cropped(RgbImage),
    Failed(FailureReason),
}

impl CellOutcome {
    pub fn is_cropped(&self) -> bool {
        matches!(self, Self::Cropped(_))
    }

    pub fn image(&self) -> Option<&RgbImage> {
        match self {
            Self::Cropped(img) => Some(img),
            Self::Failed(_) => None,
        }
    }
}

/// One cell of one page: positional index, semantic label, outcome.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// Position of the cell within the configured span.
    pub cell_index: usize,
    /// Semantic name bound to that position.
    pub label: String,
    pub outcome: CellOutcome,
}

/// Map a template box into target space: both opposite corners go through
/// the transform and the result is their axis-aligned integer hull.
pub fn map_box(
    template_to_target: &Matrix3<f64>,
    cell: &CellBox,
) -> Result<CropRect, FailureReason> {
    let (a, b) = cell.corners();
    let pa = project(template_to_target, &a);
    let pb = project(template_to_target, &b);
    if !(pa[0].is_finite() && pa[1].is_finite() && pb[0].is_finite() && pb[1].is_finite()) {
        return Err(FailureReason::NonFinite);
    }
    Ok(CropRect::from_corners(pa, pb))
}

/// Crop one rectangle with inward padding and degeneracy fallback.
///
/// Padding shrinks every side by `padding` pixels; if that collapses the
/// rectangle the unpadded rectangle is used instead. A rectangle that is
/// empty before padding is a failure.
fn crop_cell(target: &RgbImage, rect: CropRect, padding: u32) -> Result<RgbImage, FailureReason> {
    let clamped = rect.clamp_to(target.width(), target.height());
    if clamped.is_empty() {
        return Err(FailureReason::EmptyRegion);
    }

    let padded = clamped.shrink(padding);
    let r = if padded.is_empty() { clamped } else { padded };

    Ok(image::imageops::crop_imm(
        target,
        r.x0 as u32,
        r.y0 as u32,
        r.width() as u32,
        r.height() as u32,
    )
    .to_image())
}

/// Extract every box of a row span from a target page.
///
/// `template_to_target = None` means the page is already in template
/// space (warp-then-crop); boxes then crop at their template coordinates.
/// `boxes` and `labels` must be index-aligned; the caller validates the
/// lengths up front.
pub fn extract_row(
    boxes: &[CellBox],
    labels: &[String],
    target: &RgbImage,
    template_to_target: Option<&Matrix3<f64>>,
    padding: u32,
) -> Vec<ExtractionResult> {
    debug_assert_eq!(boxes.len(), labels.len());

    boxes
        .iter()
        .zip(labels.iter())
        .enumerate()
        .map(|(i, (cell, label))| {
            let rect = match template_to_target {
                Some(h) => map_box(h, cell),
                None => Ok(CropRect::from_box(cell)),
            };
            let outcome = match rect.and_then(|r| crop_cell(target, r, padding)) {
                Ok(img) => CellOutcome::Cropped(img),
                Err(reason) => {
                    tracing::debug!(cell = i, label = %label, %reason, "cell crop failed");
                    CellOutcome::Failed(reason)
                }
            };
            ExtractionResult {
                cell_index: i,
                label: label.clone(),
                outcome,
            }
        })
        .collect()
}

/// Mark every cell of a span as failed for `reason`.
///
/// Used by the skip-page fallback so the output sequence still carries
/// one result per requested cell.
pub fn fail_row(labels: &[String], reason: FailureReason) -> Vec<ExtractionResult> {
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| ExtractionResult {
            cell_index: i,
            label: label.clone(),
            outcome: CellOutcome::Failed(reason),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("cell_{i}")).collect()
    }

    fn gradient_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([x as u8, y as u8, 7]))
    }

    #[test]
    fn identity_extraction_crops_exact_regions() {
        let img = gradient_image(120, 90);
        let boxes = [CellBox::new(10, 20, 30, 25), CellBox::new(50, 20, 30, 25)];
        let results = extract_row(&boxes, &labels(2), &img, None, 0);

        assert_eq!(results.len(), 2);
        for (r, b) in results.iter().zip(&boxes) {
            let crop = r.outcome.image().expect("in-bounds crop succeeds");
            assert_eq!(crop.dimensions(), (b.w, b.h));
            assert_eq!(crop.get_pixel(0, 0), img.get_pixel(b.x, b.y));
        }
    }

    #[test]
    fn translation_maps_boxes_into_target_space() {
        let img = gradient_image(120, 90);
        let h = Matrix3::new(1.0, 0.0, 15.0, 0.0, 1.0, -10.0, 0.0, 0.0, 1.0);
        let boxes = [CellBox::new(10, 20, 30, 25)];
        let results = extract_row(&boxes, &labels(1), &img, Some(&h), 0);

        let crop = results[0].outcome.image().unwrap();
        assert_eq!(crop.dimensions(), (30, 25));
        assert_eq!(crop.get_pixel(0, 0), img.get_pixel(25, 10));
    }

    #[test]
    fn every_cell_yields_exactly_one_result() {
        let img = gradient_image(60, 60);
        // Middle box lands fully outside the image once mapped.
        let h = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        let boxes = [
            CellBox::new(5, 5, 20, 20),
            CellBox::new(500, 500, 20, 20),
            CellBox::new(30, 30, 20, 20),
        ];
        let results = extract_row(&boxes, &labels(3), &img, Some(&h), 0);

        assert_eq!(results.len(), 3);
        assert!(results[0].outcome.is_cropped());
        assert!(matches!(
            results[1].outcome,
            CellOutcome::Failed(FailureReason::EmptyRegion)
        ));
        assert!(results[2].outcome.is_cropped());
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.cell_index, i);
            assert_eq!(r.label, format!("cell_{i}"));
        }
    }

    #[test]
    fn padding_shrinks_each_side() {
        let img = gradient_image(100, 100);
        let boxes = [CellBox::new(10, 10, 40, 30)];
        let results = extract_row(&boxes, &labels(1), &img, None, 5);
        let crop = results[0].outcome.image().unwrap();
        assert_eq!(crop.dimensions(), (30, 20));
        assert_eq!(crop.get_pixel(0, 0), img.get_pixel(15, 15));
    }

    #[test]
    fn padding_that_consumes_the_box_falls_back_to_unpadded() {
        let img = gradient_image(100, 100);
        // Height 2p exactly: padded rect collapses, unpadded must win.
        let boxes = [CellBox::new(10, 10, 40, 10)];
        let results = extract_row(&boxes, &labels(1), &img, None, 5);
        let crop = results[0].outcome.image().unwrap();
        assert_eq!(crop.dimensions(), (40, 10));
        assert_eq!(crop.get_pixel(0, 0), img.get_pixel(10, 10));
    }

    #[test]
    fn fail_row_marks_every_label() {
        let results = fail_row(&labels(4), FailureReason::LowConfidenceRegistration);
        assert_eq!(results.len(), 4);
        assert!(results.iter().enumerate().all(|(i, r)| {
            r.cell_index == i
                && matches!(
                    r.outcome,
                    CellOutcome::Failed(FailureReason::LowConfidenceRegistration)
                )
        }));
    }

    #[test]
    fn non_finite_mapping_is_an_explicit_failure() {
        let img = gradient_image(60, 60);
        // Bottom row sends every point to infinity.
        let h = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0);
        let boxes = [CellBox::new(5, 5, 20, 20)];
        let results = extract_row(&boxes, &labels(1), &img, Some(&h), 0);
        assert!(matches!(
            results[0].outcome,
            CellOutcome::Failed(FailureReason::NonFinite)
        ));
    }
}
