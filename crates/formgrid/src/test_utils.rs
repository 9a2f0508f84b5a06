//! Shared fixtures for image-based unit tests.
//!
//! Renders a synthetic answer form: a closed table lattice of black lines
//! on white, with seeded speckle inside each cell so feature descriptors
//! are distinctive (a bare repeating lattice makes every corner ambiguous
//! and the ratio test would reject everything).

use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Layout of a rendered synthetic form.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FormSpec {
    /// Table rows.
    pub rows: u32,
    /// Table columns.
    pub cols: u32,
    /// Cell interior width (between line inner edges).
    pub cell_w: u32,
    /// Cell interior height.
    pub cell_h: u32,
    /// Page margin around the table.
    pub margin: u32,
    /// Grid line width.
    pub line_w: u32,
}

impl Default for FormSpec {
    fn default() -> Self {
        Self {
            rows: 4,
            cols: 5,
            cell_w: 72,
            cell_h: 44,
            margin: 40,
            line_w: 3,
        }
    }
}

impl FormSpec {
    pub fn image_size(&self) -> (u32, u32) {
        (
            2 * self.margin + self.cols * (self.cell_w + self.line_w) + self.line_w,
            2 * self.margin + self.rows * (self.cell_h + self.line_w) + self.line_w,
        )
    }

    /// Interior top-left corner of cell (row, col).
    pub fn cell_origin(&self, row: u32, col: u32) -> (u32, u32) {
        (
            self.margin + self.line_w + col * (self.cell_w + self.line_w),
            self.margin + self.line_w + row * (self.cell_h + self.line_w),
        )
    }
}

/// Render the form with per-cell seeded speckle.
pub(crate) fn render_form(spec: &FormSpec, seed: u64) -> GrayImage {
    let (w, h) = spec.image_size();
    let mut img = GrayImage::from_pixel(w, h, Luma([255]));

    let table_w = spec.cols * (spec.cell_w + spec.line_w) + spec.line_w;
    let table_h = spec.rows * (spec.cell_h + spec.line_w) + spec.line_w;

    // Vertical lines.
    for c in 0..=spec.cols {
        let x0 = spec.margin + c * (spec.cell_w + spec.line_w);
        for x in x0..x0 + spec.line_w {
            for y in spec.margin..spec.margin + table_h {
                img.put_pixel(x, y, Luma([0]));
            }
        }
    }
    // Horizontal lines.
    for r in 0..=spec.rows {
        let y0 = spec.margin + r * (spec.cell_h + spec.line_w);
        for y in y0..y0 + spec.line_w {
            for x in spec.margin..spec.margin + table_w {
                img.put_pixel(x, y, Luma([0]));
            }
        }
    }

    // Speckle: a few small dark blobs per cell, inset so they never touch
    // the lattice.
    let mut rng = StdRng::seed_from_u64(seed);
    for r in 0..spec.rows {
        for c in 0..spec.cols {
            let (ox, oy) = spec.cell_origin(r, c);
            for _ in 0..6 {
                let bw = rng.gen_range(3..=7u32);
                let bh = rng.gen_range(3..=7u32);
                let bx = ox + rng.gen_range(6..spec.cell_w - 6 - bw);
                let by = oy + rng.gen_range(6..spec.cell_h - 6 - bh);
                for y in by..by + bh {
                    for x in bx..bx + bw {
                        img.put_pixel(x, y, Luma([0]));
                    }
                }
            }
        }
    }

    img
}

/// Shift image content by integer (dx, dy), filling uncovered pixels white.
pub(crate) fn translate_gray(img: &GrayImage, dx: i32, dy: i32) -> GrayImage {
    let (w, h) = img.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let sx = x as i32 - dx;
        let sy = y as i32 - dy;
        if sx >= 0 && sy >= 0 && (sx as u32) < w && (sy as u32) < h {
            *img.get_pixel(sx as u32, sy as u32)
        } else {
            Luma([255])
        }
    })
}

/// Grayscale image replicated into the three RGB channels.
pub(crate) fn gray_to_rgb(img: &GrayImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let v = img.get_pixel(x, y)[0];
        Rgb([v, v, v])
    })
}
