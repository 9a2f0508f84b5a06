//! Full-page rectification into the template coordinate frame.

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use nalgebra::Matrix3;

use crate::error::Error;

/// Resample a target page into the reference frame.
///
/// `template_to_target` is the transform produced by registration; its
/// inverse carries target content onto a `out_w`×`out_h` canvas (the
/// reference dimensions). Bilinear sampling; pixels with no source fall
/// back to black.
pub fn warp_to_template(
    target: &RgbImage,
    template_to_target: &Matrix3<f64>,
    out_w: u32,
    out_h: u32,
) -> Result<RgbImage, Error> {
    let inv = template_to_target
        .try_inverse()
        .ok_or(Error::DegenerateTransform)?;

    // imageproc projections map input coordinates to output coordinates:
    // here input is the target page, output the template canvas.
    let m = [
        inv[(0, 0)] as f32,
        inv[(0, 1)] as f32,
        inv[(0, 2)] as f32,
        inv[(1, 0)] as f32,
        inv[(1, 1)] as f32,
        inv[(1, 2)] as f32,
        inv[(2, 0)] as f32,
        inv[(2, 1)] as f32,
        inv[(2, 2)] as f32,
    ];
    let projection = Projection::from_matrix(m).ok_or(Error::DegenerateTransform)?;

    let mut out = RgbImage::new(out_w, out_h);
    warp_into(
        target,
        &projection,
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
        &mut out,
    );
    Ok(out)
}
