//! Crate-wide error type.
//!
//! Only template-level problems are represented as errors: an unusable
//! template grid or an out-of-range cell span makes the whole batch
//! meaningless. Per-page registration quality and per-cell crop failures
//! are ordinary result values ([`crate::Registration::LowConfidence`],
//! [`crate::CellOutcome::Failed`]) so that one bad page or cell never
//! aborts its siblings.

use std::path::PathBuf;

/// Errors surfaced by the formgrid core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Grid discovery found no contour box passing the height/area
    /// thresholds. The template (or the thresholds) are unusable.
    #[error("template grid discovery produced no cell boxes (check template image and grid thresholds)")]
    EmptyTemplateGrid,

    /// The configured row index does not exist in the discovered grid.
    #[error("grid row {row} out of range: template has {rows} rows")]
    RowOutOfRange { row: usize, rows: usize },

    /// The configured column span does not fit in the configured row.
    #[error("cell span {start}..{end} exceeds row {row} width {width}")]
    SpanOutOfRange {
        row: usize,
        start: usize,
        end: usize,
        width: usize,
    },

    /// Label list length must equal the configured cell count.
    #[error("{labels} cell labels configured for {cells} cells")]
    LabelCountMismatch { labels: usize, cells: usize },

    /// The homography is singular or non-finite and cannot be applied.
    #[error("degenerate homography: transform is not invertible")]
    DegenerateTransform,

    /// A raster frame uses a sample layout the stack loader does not handle.
    #[error("unsupported frame format in {path:?} (page {page}): {detail}")]
    UnsupportedFrame {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    /// Image decode/encode failure.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// Multi-page TIFF decode failure.
    #[error(transparent)]
    Tiff(#[from] tiff::TiffError),

    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
