//! End-to-end form processing pipeline.
//!
//! One [`FormPipeline`] is built per reference template: grid discovery
//! and reference feature extraction run once in the constructor, then
//! every scanned page is registered against the cached features and its
//! configured cell span is cropped out. Pages are independent, so stack
//! processing parallelizes when the `rayon` feature is enabled.

use image::RgbImage;
use nalgebra::Matrix3;

use crate::error::Error;
use crate::extract::{extract_row, fail_row, ExtractionResult, FailureReason};
use crate::geometry::{CellBox, TemplateGrid};
use crate::grid::{self, GridParams};
use crate::homography::matrix_rows;
use crate::register::{
    register_page, MatchStats, ReferenceFeatures, Registration, RegistrationParams,
};
use crate::warp::warp_to_template;

/// How cell content is lifted off an aligned page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractMode {
    /// Map each template box into target space and crop there. One
    /// projection per box; cells keep the target's native sampling.
    #[default]
    MapThenCrop,
    /// Rectify the whole page into the template frame first, then crop
    /// boxes at their template coordinates.
    WarpThenCrop,
}

/// What to do with a page whose registration did not converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowConfidenceFallback {
    /// Assume the page is already in the template frame and crop boxes
    /// at their template coordinates. Right answer for scans that were
    /// rectified upstream or are the template itself.
    #[default]
    PassThrough,
    /// Emit one failed result per cell and move on.
    SkipPage,
}

/// Which discovered boxes form the answer strip.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CellSpan {
    /// Index into the discovered row list.
    pub row: usize,
    /// First box of the row to take.
    pub start_col: usize,
    /// Number of consecutive boxes.
    pub count: usize,
}

impl Default for CellSpan {
    fn default() -> Self {
        Self {
            row: 13,
            start_col: 1,
            count: 8,
        }
    }
}

fn default_labels() -> Vec<String> {
    ["and", "or", "not", "nand", "nor", "xor", "xnor", "buffer"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub grid: GridParams,
    pub registration: RegistrationParams,
    pub span: CellSpan,
    /// One label per cell of the span, in column order.
    pub labels: Vec<String>,
    /// Inward padding applied to every crop, in pixels.
    pub padding: u32,
    pub mode: ExtractMode,
    pub fallback: LowConfidenceFallback,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grid: GridParams::default(),
            registration: RegistrationParams::default(),
            span: CellSpan::default(),
            labels: default_labels(),
            padding: 0,
            mode: ExtractMode::default(),
            fallback: LowConfidenceFallback::default(),
        }
    }
}

/// Registration outcome of one page, in serializable form.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RegistrationReport {
    pub aligned: bool,
    pub stats: MatchStats,
    /// Row-major template-to-target homography, present when aligned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_to_target: Option<[[f64; 3]; 3]>,
}

impl RegistrationReport {
    fn new(registration: &Registration) -> Self {
        Self {
            aligned: registration.is_aligned(),
            stats: registration.stats().clone(),
            template_to_target: registration.homography().map(matrix_rows),
        }
    }
}

/// Everything the pipeline produced for one page.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub page_index: usize,
    pub registration: RegistrationReport,
    /// One entry per configured label, in span order.
    pub cells: Vec<ExtractionResult>,
}

/// A page resampled into the template frame.
#[derive(Debug, Clone)]
pub struct RectifiedPage {
    pub registration: RegistrationReport,
    /// `None` when no usable transform exists (failed registration or a
    /// degenerate fit) and the fallback is
    /// [`LowConfidenceFallback::SkipPage`].
    pub image: Option<RgbImage>,
}

/// Reference-template state shared across all pages of a batch.
pub struct FormPipeline {
    config: PipelineConfig,
    grid: TemplateGrid,
    boxes: Vec<CellBox>,
    reference: ReferenceFeatures,
    template_size: (u32, u32),
}

impl FormPipeline {
    /// Discover the template grid, validate the configured span against
    /// it, and extract reference features.
    pub fn new(template: &RgbImage, config: PipelineConfig) -> Result<Self, Error> {
        let gray = image::imageops::grayscale(template);
        let grid = grid::discover(&gray, &config.grid)?;

        let boxes = grid
            .span(config.span.row, config.span.start_col, config.span.count)?
            .to_vec();
        if config.labels.len() != boxes.len() {
            return Err(Error::LabelCountMismatch {
                labels: config.labels.len(),
                cells: boxes.len(),
            });
        }

        let reference = ReferenceFeatures::prepare(&gray, &config.registration);
        tracing::info!(
            rows = grid.n_rows(),
            boxes = grid.n_boxes(),
            span_cells = boxes.len(),
            reference_keypoints = reference.n_keypoints(),
            "pipeline ready"
        );

        Ok(Self {
            config,
            grid,
            boxes,
            reference,
            template_size: gray.dimensions(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Full discovered grid, rows top to bottom.
    pub fn grid(&self) -> &TemplateGrid {
        &self.grid
    }

    /// The configured span's boxes, in column order.
    pub fn boxes(&self) -> &[CellBox] {
        &self.boxes
    }

    /// Register one page and crop its span.
    pub fn process_page(&self, page_index: usize, page: &RgbImage) -> PageResult {
        let gray = image::imageops::grayscale(page);
        let registration = register_page(&self.reference, &gray, &self.config.registration);
        let report = RegistrationReport::new(&registration);

        let cells = match registration.homography() {
            Some(h) => self.extract_aligned(page, h),
            None => self.extract_fallback(page_index, page),
        };

        PageResult {
            page_index,
            registration: report,
            cells,
        }
    }

    fn extract_aligned(&self, page: &RgbImage, h: &Matrix3<f64>) -> Vec<ExtractionResult> {
        let labels = &self.config.labels;
        match self.config.mode {
            ExtractMode::MapThenCrop => {
                extract_row(&self.boxes, labels, page, Some(h), self.config.padding)
            }
            ExtractMode::WarpThenCrop => {
                let (w, ht) = self.template_size;
                match warp_to_template(page, h, w, ht) {
                    Ok(warped) => extract_row(&self.boxes, labels, &warped, None, self.config.padding),
                    Err(err) => {
                        tracing::warn!(%err, "rectification failed, falling back to direct mapping");
                        extract_row(&self.boxes, labels, page, Some(h), self.config.padding)
                    }
                }
            }
        }
    }

    /// Warp into the template frame, degrading a degenerate transform to
    /// the configured low-confidence fallback.
    fn warp_with_fallback(&self, page: &RgbImage, h: &Matrix3<f64>) -> Option<RgbImage> {
        let (w, ht) = self.template_size;
        match warp_to_template(page, h, w, ht) {
            Ok(warped) => Some(warped),
            Err(err) => {
                tracing::warn!(%err, "rectification failed, applying low-confidence fallback");
                match self.config.fallback {
                    LowConfidenceFallback::PassThrough => Some(page.clone()),
                    LowConfidenceFallback::SkipPage => None,
                }
            }
        }
    }

    fn extract_fallback(&self, page_index: usize, page: &RgbImage) -> Vec<ExtractionResult> {
        match self.config.fallback {
            LowConfidenceFallback::PassThrough => {
                tracing::warn!(page = page_index, "low confidence, cropping at template coordinates");
                extract_row(&self.boxes, &self.config.labels, page, None, self.config.padding)
            }
            LowConfidenceFallback::SkipPage => {
                tracing::warn!(page = page_index, "low confidence, skipping page");
                fail_row(&self.config.labels, FailureReason::LowConfidenceRegistration)
            }
        }
    }

    /// Resample one page into the template frame without cropping.
    ///
    /// Never fails: failed registration and degenerate transforms alike
    /// degrade to the configured low-confidence fallback; only the
    /// report tells the cases apart.
    pub fn rectify_page(&self, page: &RgbImage) -> RectifiedPage {
        let gray = image::imageops::grayscale(page);
        let registration = register_page(&self.reference, &gray, &self.config.registration);
        let report = RegistrationReport::new(&registration);

        let image = match registration.homography() {
            Some(m) => self.warp_with_fallback(page, m),
            None => match self.config.fallback {
                LowConfidenceFallback::PassThrough => Some(page.clone()),
                LowConfidenceFallback::SkipPage => None,
            },
        };

        RectifiedPage {
            registration: report,
            image,
        }
    }

    /// Process every page of a stack, preserving page order.
    pub fn process_stack(&self, pages: &[RgbImage]) -> Vec<PageResult> {
        self.process_pages(pages)
    }

    #[cfg(feature = "rayon")]
    fn process_pages(&self, pages: &[RgbImage]) -> Vec<PageResult> {
        use rayon::prelude::*;
        pages
            .par_iter()
            .enumerate()
            .map(|(i, page)| self.process_page(i, page))
            .collect()
    }

    #[cfg(not(feature = "rayon"))]
    fn process_pages(&self, pages: &[RgbImage]) -> Vec<PageResult> {
        pages
            .iter()
            .enumerate()
            .map(|(i, page)| self.process_page(i, page))
            .collect()
    }
}
