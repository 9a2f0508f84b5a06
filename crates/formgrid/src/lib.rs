//! formgrid — feature-based registration and cell extraction for scanned forms.
//!
//! Built around a single reference template: a blank form whose table
//! layout defines where the answer cells live. The pipeline stages are:
//!
//! 1. **Grid** – morphological line extraction + contour analysis on the
//!    template, producing rows of cell bounding boxes.
//! 2. **Features** – FAST corners with binary (Hamming / cross-check) or
//!    float (gradient histogram / ratio test) descriptors.
//! 3. **Homography** – normalized DLT inside a RANSAC loop, refit on the
//!    consensus set.
//! 4. **Warp / Extract** – rectify pages into the template frame, or map
//!    cell boxes directly into target space, and crop.
//!
//! # Public API
//! [`FormPipeline`] with [`PipelineConfig`] is the primary entry point;
//! [`register`] and [`grid::discover`] expose the stages individually.

pub mod error;
pub mod extract;
mod features;
pub mod geometry;
pub mod grid;
pub mod homography;
mod pipeline;
mod register;
pub mod stack;
mod warp;

#[cfg(test)]
mod test_utils;

pub use error::Error;
pub use extract::{CellOutcome, ExtractionResult, FailureReason};
pub use geometry::{CellBox, CropRect, TemplateGrid};
pub use pipeline::{
    CellSpan, ExtractMode, FormPipeline, LowConfidenceFallback, PageResult, PipelineConfig,
    RectifiedPage, RegistrationReport,
};
pub use register::{
    register, register_page, MatchStats, MatcherKind, ReferenceFeatures, Registration,
    RegistrationParams,
};
pub use stack::load_pages;
pub use warp::warp_to_template;
