//! Template-space grid geometry and target-space crop rectangles.

use crate::error::Error;

/// Axis-aligned cell bounding box in template pixel coordinates.
///
/// Produced once per template by grid discovery and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CellBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl CellBox {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Pixel area of the box.
    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    /// Top-left and bottom-right corners as float points, suitable for
    /// mapping through a homography.
    pub fn corners(&self) -> ([f64; 2], [f64; 2]) {
        (
            [self.x as f64, self.y as f64],
            [(self.x + self.w) as f64, (self.y + self.h) as f64],
        )
    }
}

/// The discovered template layout: rows of cell boxes, top-to-bottom,
/// each row sorted left-to-right.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TemplateGrid {
    rows: Vec<Vec<CellBox>>,
}

impl TemplateGrid {
    pub(crate) fn from_rows(rows: Vec<Vec<CellBox>>) -> Self {
        Self { rows }
    }

    /// Number of discovered rows.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Total number of boxes across all rows.
    pub fn n_boxes(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    /// All rows, top-to-bottom.
    pub fn rows(&self) -> &[Vec<CellBox>] {
        &self.rows
    }

    /// One row by index.
    pub fn row(&self, row: usize) -> Option<&[CellBox]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    /// Validate and return a consecutive span of boxes within a row.
    ///
    /// This is the batch-fatal configuration check: a template whose grid
    /// cannot supply the requested cells is unusable.
    pub fn span(&self, row: usize, start_col: usize, count: usize) -> Result<&[CellBox], Error> {
        let boxes = self.row(row).ok_or(Error::RowOutOfRange {
            row,
            rows: self.rows.len(),
        })?;
        let end = start_col + count;
        if end > boxes.len() {
            return Err(Error::SpanOutOfRange {
                row,
                start: start_col,
                end,
                width: boxes.len(),
            });
        }
        Ok(&boxes[start_col..end])
    }
}

/// Half-open integer rectangle in target pixel coordinates.
///
/// Unlike [`CellBox`] this may lie partly or fully outside the image:
/// mapped corners of a template box can land anywhere in the target plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

impl CropRect {
    /// Rectangle spanning two arbitrary corner points, rounded to integers.
    ///
    /// Non-finite coordinates collapse to an empty rectangle.
    pub fn from_corners(a: [f64; 2], b: [f64; 2]) -> Self {
        if !(a[0].is_finite() && a[1].is_finite() && b[0].is_finite() && b[1].is_finite()) {
            return Self {
                x0: 0,
                y0: 0,
                x1: 0,
                y1: 0,
            };
        }
        let x0 = a[0].min(b[0]).round() as i64;
        let x1 = a[0].max(b[0]).round() as i64;
        let y0 = a[1].min(b[1]).round() as i64;
        let y1 = a[1].max(b[1]).round() as i64;
        Self { x0, y0, x1, y1 }
    }

    pub fn from_box(b: &CellBox) -> Self {
        Self {
            x0: b.x as i64,
            y0: b.y as i64,
            x1: (b.x + b.w) as i64,
            y1: (b.y + b.h) as i64,
        }
    }

    pub fn width(&self) -> i64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> i64 {
        self.y1 - self.y0
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Shrink every side inward by `pad` pixels.
    pub fn shrink(&self, pad: u32) -> Self {
        let p = pad as i64;
        Self {
            x0: self.x0 + p,
            y0: self.y0 + p,
            x1: self.x1 - p,
            y1: self.y1 - p,
        }
    }

    /// Intersect with an image of the given dimensions.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        Self {
            x0: self.x0.clamp(0, width as i64),
            y0: self.y0.clamp(0, height as i64),
            x1: self.x1.clamp(0, width as i64),
            y1: self.y1.clamp(0, height as i64),
        }
    }
}
