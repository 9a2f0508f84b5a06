//! Ordered multi-page raster input.
//!
//! Scanned batches usually arrive as multi-page TIFF stacks; the `image`
//! crate's high-level API only surfaces the first frame, so TIFF goes
//! through `tiff::decoder` page by page. Any other raster format loads as
//! a single-page stack. Page order on disk is page order in the result;
//! downstream results are keyed by that index.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::RgbImage;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;

use crate::error::Error;

/// Load every page of a raster file, in input order.
pub fn load_pages(path: &Path) -> Result<Vec<RgbImage>, Error> {
    let is_tiff = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false);

    if is_tiff {
        load_tiff_stack(path)
    } else {
        Ok(vec![image::open(path)?.to_rgb8()])
    }
}

fn load_tiff_stack(path: &Path) -> Result<Vec<RgbImage>, Error> {
    let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    let mut pages = Vec::new();

    loop {
        let page = pages.len();
        let (w, h) = decoder.dimensions()?;
        let color = decoder.colortype()?;
        let frame = decoder.read_image()?;
        pages.push(frame_to_rgb(path, page, w, h, color, frame)?);

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    tracing::info!(pages = pages.len(), path = %path.display(), "stack loaded");
    Ok(pages)
}

fn frame_to_rgb(
    path: &Path,
    page: usize,
    w: u32,
    h: u32,
    color: ColorType,
    frame: DecodingResult,
) -> Result<RgbImage, Error> {
    let unsupported = |detail: &str| Error::UnsupportedFrame {
        path: path.to_path_buf(),
        page,
        detail: detail.to_string(),
    };

    let rgb = match (color, frame) {
        (ColorType::Gray(1), DecodingResult::U8(buf)) => {
            // Bilevel scans decode one sample per byte; any nonzero
            // sample is paper, zero is ink.
            let expanded: Vec<u8> = buf
                .iter()
                .flat_map(|&v| {
                    let b = if v == 0 { 0 } else { 255 };
                    [b, b, b]
                })
                .collect();
            RgbImage::from_raw(w, h, expanded)
        }
        (ColorType::Gray(8), DecodingResult::U8(buf)) => {
            let expanded: Vec<u8> = buf.iter().flat_map(|&v| [v, v, v]).collect();
            RgbImage::from_raw(w, h, expanded)
        }
        (ColorType::Gray(16), DecodingResult::U16(buf)) => {
            let expanded: Vec<u8> = buf
                .iter()
                .flat_map(|&v| {
                    let b = (v >> 8) as u8;
                    [b, b, b]
                })
                .collect();
            RgbImage::from_raw(w, h, expanded)
        }
        (ColorType::RGB(8), DecodingResult::U8(buf)) => RgbImage::from_raw(w, h, buf),
        (ColorType::RGBA(8), DecodingResult::U8(buf)) => {
            let dropped: Vec<u8> = buf.chunks_exact(4).flat_map(|px| [px[0], px[1], px[2]]).collect();
            RgbImage::from_raw(w, h, dropped)
        }
        (color, _) => {
            return Err(unsupported(&format!("sample layout {color:?}")));
        }
    };

    rgb.ok_or_else(|| unsupported("frame buffer size does not match dimensions"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tiff::encoder::{colortype, TiffEncoder};

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("formgrid-stack-{}-{name}", std::process::id()))
    }

    #[test]
    fn multipage_tiff_round_trips_in_order() {
        let path = temp_path("multi.tiff");
        {
            let mut enc = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
            for value in [10u8, 200u8] {
                let data = vec![value; 8 * 6 * 3];
                enc.write_image::<colortype::RGB8>(8, 6, &data).unwrap();
            }
        }

        let pages = load_pages(&path).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].dimensions(), (8, 6));
        assert_eq!(pages[0].get_pixel(0, 0), &Rgb([10, 10, 10]));
        assert_eq!(pages[1].get_pixel(3, 3), &Rgb([200, 200, 200]));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn gray_tiff_expands_to_rgb() {
        let path = temp_path("gray.tif");
        {
            let mut enc = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
            enc.write_image::<colortype::Gray8>(4, 4, &vec![77u8; 16]).unwrap();
        }
        let pages = load_pages(&path).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].get_pixel(1, 2), &Rgb([77, 77, 77]));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn bilevel_frames_expand_to_black_and_white() {
        let frame = DecodingResult::U8(vec![0, 1, 255, 0]);
        let rgb = frame_to_rgb(Path::new("scan.tif"), 0, 2, 2, ColorType::Gray(1), frame).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(0, 1), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([0, 0, 0]));
    }

    #[test]
    fn non_tiff_loads_as_single_page() {
        let path = temp_path("single.png");
        let img = RgbImage::from_pixel(5, 7, Rgb([1, 2, 3]));
        img.save(&path).unwrap();

        let pages = load_pages(&path).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0], img);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_pages(Path::new("/nonexistent/missing.tiff")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
