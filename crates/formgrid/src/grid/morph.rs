//! Separable rectangular min/max filters.
//!
//! Line-structure extraction needs strongly anisotropic structuring
//! elements (1×k and k×1 rectangles). `imageproc::morphology` only offers
//! isotropic L1/LInf elements, so these run filters are implemented
//! directly; out-of-bounds samples are ignored rather than padded.

use image::GrayImage;

fn horizontal_pass<F>(img: &GrayImage, k: u32, reduce: F, init: u8) -> GrayImage
where
    F: Fn(u8, u8) -> u8,
{
    if k <= 1 {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    // OpenCV anchor convention: window [x - (k-1)/2, x + k/2].
    let lo = ((k - 1) / 2) as i64;
    let hi = (k / 2) as i64;
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = init;
            let x0 = (x as i64 - lo).max(0) as u32;
            let x1 = ((x as i64 + hi).min(w as i64 - 1)) as u32;
            for xi in x0..=x1 {
                acc = reduce(acc, img.get_pixel(xi, y)[0]);
            }
            out.put_pixel(x, y, image::Luma([acc]));
        }
    }
    out
}

fn vertical_pass<F>(img: &GrayImage, k: u32, reduce: F, init: u8) -> GrayImage
where
    F: Fn(u8, u8) -> u8,
{
    if k <= 1 {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    let lo = ((k - 1) / 2) as i64;
    let hi = (k / 2) as i64;
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let y0 = (y as i64 - lo).max(0) as u32;
        let y1 = ((y as i64 + hi).min(h as i64 - 1)) as u32;
        for x in 0..w {
            let mut acc = init;
            for yi in y0..=y1 {
                acc = reduce(acc, img.get_pixel(x, yi)[0]);
            }
            out.put_pixel(x, y, image::Luma([acc]));
        }
    }
    out
}

/// Grayscale erosion with a `kw`×`kh` rectangular structuring element.
pub(crate) fn erode_rect(img: &GrayImage, kw: u32, kh: u32) -> GrayImage {
    let tmp = horizontal_pass(img, kw, u8::min, u8::MAX);
    vertical_pass(&tmp, kh, u8::min, u8::MAX)
}

/// Grayscale dilation with a `kw`×`kh` rectangular structuring element.
pub(crate) fn dilate_rect(img: &GrayImage, kw: u32, kh: u32) -> GrayImage {
    let tmp = horizontal_pass(img, kw, u8::max, u8::MIN);
    vertical_pass(&tmp, kh, u8::max, u8::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn image_with_dot(w: u32, h: u32, x: u32, y: u32) -> GrayImage {
        let mut img = GrayImage::new(w, h);
        img.put_pixel(x, y, Luma([255]));
        img
    }

    #[test]
    fn dilate_spreads_along_kernel_axis_only() {
        let img = image_with_dot(9, 9, 4, 4);
        let d = dilate_rect(&img, 1, 5);
        for y in 0..9 {
            for x in 0..9 {
                let expect = x == 4 && (2..=6).contains(&y);
                assert_eq!(d.get_pixel(x, y)[0] == 255, expect, "({x},{y})");
            }
        }
    }

    #[test]
    fn erode_removes_features_shorter_than_kernel() {
        let mut img = GrayImage::new(9, 20);
        // 7-pixel vertical run: survives a 5-tall erosion, dies under 9.
        for y in 5..12 {
            img.put_pixel(4, y, Luma([255]));
        }
        let survives = erode_rect(&img, 1, 5);
        assert!(survives.pixels().any(|p| p[0] == 255));
        let gone = erode_rect(&img, 1, 9);
        assert!(gone.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn open_restores_long_line_extent() {
        let mut img = GrayImage::new(5, 30);
        for y in 0..30 {
            img.put_pixel(2, y, Luma([255]));
        }
        let opened = dilate_rect(&erode_rect(&img, 1, 7), 1, 7);
        for y in 0..30 {
            assert_eq!(opened.get_pixel(2, y)[0], 255, "y={y}");
        }
    }
}
