//! Template grid discovery.
//!
//! One-shot analysis of the clean reference form: binarize, isolate long
//! vertical and horizontal line structures, combine them into a table
//! mask, and read cell bounding boxes off the mask's contours. The result
//! is a pure function of the template image and [`GridParams`]; repeated
//! runs yield identical grids.

mod morph;

use image::GrayImage;
use imageproc::contours::find_contours;
use imageproc::contrast::{otsu_level, threshold, ThresholdType};

use crate::error::Error;
use crate::geometry::{CellBox, TemplateGrid};

/// Vertical line kernel height = image width / this.
const VERTICAL_KERNEL_DIVISOR: u32 = 120;
/// Horizontal line kernel width = image width / this.
const HORIZONTAL_KERNEL_DIVISOR: u32 = 40;

/// Thresholds for template grid discovery.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GridParams {
    /// Minimum contour bounding-box height in pixels.
    pub min_box_height: u32,
    /// Minimum contour bounding-box area in pixels.
    pub min_box_area: u32,
    /// Maximum vertical gap (pixels) between consecutive boxes of one row.
    pub row_tolerance: u32,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            min_box_height: 20,
            min_box_area: 1000,
            row_tolerance: 15,
        }
    }
}

/// Discover the cell grid of a template image.
///
/// Returns [`Error::EmptyTemplateGrid`] when no contour passes the
/// height/area thresholds; an unusable template must be reported, never
/// silently treated as "no cells".
pub fn discover(template: &GrayImage, params: &GridParams) -> Result<TemplateGrid, Error> {
    let (width, _) = template.dimensions();

    // Ink becomes white on black.
    let ink = threshold(template, otsu_level(template), ThresholdType::BinaryInverted);

    // Opening with elongated kernels keeps only long line structures.
    let v_len = (width / VERTICAL_KERNEL_DIVISOR).max(1);
    let h_len = (width / HORIZONTAL_KERNEL_DIVISOR).max(1);
    let vertical = morph::dilate_rect(&morph::erode_rect(&ink, 1, v_len), 1, v_len);
    let horizontal = morph::dilate_rect(&morph::erode_rect(&ink, h_len, 1), h_len, 1);

    // Equal-weight combination, then flip polarity: cell interiors white,
    // line lattice black. A 3x3 erosion thickens the separators enough to
    // close small gaps before re-binarizing.
    let (w, h) = ink.dimensions();
    let lattice = GrayImage::from_fn(w, h, |x, y| {
        let v = vertical.get_pixel(x, y)[0] as u16;
        let hline = horizontal.get_pixel(x, y)[0] as u16;
        image::Luma([255 - ((v + hline) / 2) as u8])
    });
    let eroded = morph::erode_rect(&lattice, 3, 3);
    let mask = threshold(&eroded, otsu_level(&eroded), ThresholdType::Binary);

    // Outer and hole borders both contribute boxes; row indices count
    // every component that passes the thresholds, including the page
    // background and the table extent.
    let contours = find_contours::<u32>(&mask);
    let mut boxes: Vec<CellBox> = contours
        .iter()
        .filter_map(|c| bounding_box(&c.points))
        .filter(|b| b.h >= params.min_box_height && b.area() >= params.min_box_area as u64)
        .collect();

    tracing::debug!(
        contours = contours.len(),
        boxes = boxes.len(),
        "template contour boxes after thresholds"
    );

    if boxes.is_empty() {
        return Err(Error::EmptyTemplateGrid);
    }

    boxes.sort_by_key(|b| (b.y, b.x));
    let rows = group_into_rows(&boxes, params.row_tolerance);
    tracing::info!(
        rows = rows.len(),
        boxes = boxes.len(),
        "template grid discovered"
    );
    Ok(TemplateGrid::from_rows(rows))
}

fn bounding_box(points: &[imageproc::point::Point<u32>]) -> Option<CellBox> {
    let first = points.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    Some(CellBox::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Partition boxes into rows by vertical proximity.
///
/// Boxes are scanned in `(y, x)` order; a new row starts whenever the gap
/// to the previous box's `y` exceeds `tolerance`. Membership is judged
/// against the last-seen box, not the row start, so gently drifting rows
/// stay together. Each row is then sorted by `x`.
pub fn group_into_rows(boxes: &[CellBox], tolerance: u32) -> Vec<Vec<CellBox>> {
    let mut sorted = boxes.to_vec();
    sorted.sort_by_key(|b| (b.y, b.x));

    let mut rows: Vec<Vec<CellBox>> = Vec::new();
    let mut current: Vec<CellBox> = Vec::new();
    let mut prev_y: Option<u32> = None;

    for b in sorted {
        if let Some(py) = prev_y {
            if b.y.abs_diff(py) > tolerance && !current.is_empty() {
                rows.push(std::mem::take(&mut current));
            }
        }
        prev_y = Some(b.y);
        current.push(b);
    }
    if !current.is_empty() {
        rows.push(current);
    }

    for row in &mut rows {
        row.sort_by_key(|b| b.x);
    }
    rows
}
