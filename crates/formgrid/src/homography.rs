//! Projective transform estimation between template and target planes.
//!
//! Normalized DLT from ≥4 correspondences, wrapped in RANSAC for
//! outlier robustness: sample minimal 4-point subsets, fit, count inliers
//! under a reprojection threshold, keep the best consensus, refit on its
//! inlier set.

use nalgebra::{DMatrix, Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Failure modes of homography fitting.
///
/// These never escape the registrar: a fit failure downgrades the page to
/// a low-confidence registration instead of aborting it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FitError {
    #[error("homography needs at least 4 correspondences, got {0}")]
    TooFewPoints(usize),
    #[error("correspondence point sets have mismatched lengths")]
    LengthMismatch,
    #[error("normalization transform is singular")]
    Degenerate,
    #[error("consensus too small: {found} inliers, need {needed}")]
    TooFewInliers { found: usize, needed: usize },
}

/// RANSAC controls for homography fitting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RansacParams {
    /// Maximum sampling iterations.
    pub max_iters: usize,
    /// Inlier reprojection-error threshold in pixels.
    pub inlier_threshold: f64,
    /// Minimum consensus size for an acceptable model.
    pub min_inliers: usize,
    /// Sampling seed; fixed so a page registers identically across runs.
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            inlier_threshold: 5.0,
            min_inliers: 4,
            seed: 0,
        }
    }
}

/// A fitted homography with its consensus.
#[derive(Debug, Clone)]
pub struct RansacFit {
    /// Homography such that `dst ≈ project(h, src)`.
    pub h: Matrix3<f64>,
    /// Inlier flags per correspondence, under the refit model.
    pub inlier_mask: Vec<bool>,
    /// Inlier count under the refit model.
    pub n_inliers: usize,
    /// Reprojection error per correspondence, under the refit model.
    pub errors: Vec<f64>,
}

/// Map a point through a homography; NaN when the point is at infinity.
pub fn project(h: &Matrix3<f64>, p: &[f64; 2]) -> [f64; 2] {
    let q = h * Vector3::new(p[0], p[1], 1.0);
    if q[2].abs() < 1e-15 {
        return [f64::NAN, f64::NAN];
    }
    [q[0] / q[2], q[1] / q[2]]
}

/// Euclidean distance between `project(h, src)` and `dst`.
pub fn reprojection_error(h: &Matrix3<f64>, src: &[f64; 2], dst: &[f64; 2]) -> f64 {
    let p = project(h, src);
    ((p[0] - dst[0]).powi(2) + (p[1] - dst[1]).powi(2)).sqrt()
}

/// Count correspondences whose reprojection error is below `threshold`.
///
/// Monotone in `threshold` for a fixed model and correspondence set.
pub fn count_inliers(
    h: &Matrix3<f64>,
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    threshold: f64,
) -> usize {
    src.iter()
        .zip(dst.iter())
        .filter(|(s, d)| reprojection_error(h, s, d) < threshold)
        .count()
}

/// Row-major 3×3 array form, for JSON reports.
pub fn matrix_rows(h: &Matrix3<f64>) -> [[f64; 3]; 3] {
    [
        [h[(0, 0)], h[(0, 1)], h[(0, 2)]],
        [h[(1, 0)], h[(1, 1)], h[(1, 2)]],
        [h[(2, 0)], h[(2, 1)], h[(2, 2)]],
    ]
}

/// Hartley normalization: centroid to origin, mean radius √2.
fn normalization(points: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = points.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_r = points
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_r > 1e-15 {
        std::f64::consts::SQRT_2 / mean_r
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let mapped = points
        .iter()
        .map(|p| [s * (p[0] - cx), s * (p[1] - cy)])
        .collect();
    (t, mapped)
}

/// Direct linear transform from ≥4 correspondences.
pub fn estimate_dlt(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Result<Matrix3<f64>, FitError> {
    if src.len() != dst.len() {
        return Err(FitError::LengthMismatch);
    }
    let n = src.len();
    if n < 4 {
        return Err(FitError::TooFewPoints(n));
    }

    let (t_src, s) = normalization(src);
    let (t_dst, d) = normalization(dst);

    // Two rows of the 2n×9 design matrix per correspondence.
    let mut rows = Vec::with_capacity(2 * n * 9);
    for i in 0..n {
        let [sx, sy] = s[i];
        let [dx, dy] = d[i];
        rows.extend_from_slice(&[0.0, 0.0, 0.0, -sx, -sy, -1.0, dy * sx, dy * sy, dy]);
        rows.extend_from_slice(&[sx, sy, 1.0, 0.0, 0.0, 0.0, -dx * sx, -dx * sy, -dx]);
    }
    let a = DMatrix::from_row_slice(2 * n, 9, &rows);

    // Null vector of A ≙ eigenvector of AᵀA with the smallest eigenvalue;
    // the symmetric 9×9 eigenproblem sidesteps thin-SVD shape issues.
    let eig = nalgebra::SymmetricEigen::new(a.transpose() * &a);
    let min_idx = (0..9)
        .min_by(|&i, &j| {
            eig.eigenvalues[i]
                .abs()
                .partial_cmp(&eig.eigenvalues[j].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(0);
    let hv = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(
        hv[0], hv[1], hv[2], hv[3], hv[4], hv[5], hv[6], hv[7], hv[8],
    );

    let t_dst_inv = t_dst.try_inverse().ok_or(FitError::Degenerate)?;
    let h = t_dst_inv * h_norm * t_src;

    let scale = h[(2, 2)];
    Ok(if scale.abs() < 1e-15 { h } else { h / scale })
}

/// Outlier-robust homography fit.
pub fn fit_ransac(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    params: &RansacParams,
) -> Result<RansacFit, FitError> {
    let n = src.len().min(dst.len());
    if n < 4 {
        return Err(FitError::TooFewPoints(n));
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut scratch: Vec<usize> = (0..n).collect();
    let mut best_h: Option<Matrix3<f64>> = None;
    let mut best_count = 0usize;
    let mut best_mask = vec![false; n];

    for _ in 0..params.max_iters {
        // Partial Fisher-Yates: the first four scratch entries become a
        // uniformly random distinct 4-subset.
        for k in 0..4 {
            let j = rng.gen_range(k..n);
            scratch.swap(k, j);
        }
        let sample_src: Vec<[f64; 2]> = scratch[..4].iter().map(|&i| src[i]).collect();
        let sample_dst: Vec<[f64; 2]> = scratch[..4].iter().map(|&i| dst[i]).collect();

        let Ok(h) = estimate_dlt(&sample_src, &sample_dst) else {
            continue;
        };

        let mut mask = vec![false; n];
        let mut count = 0usize;
        for i in 0..n {
            if reprojection_error(&h, &src[i], &dst[i]) < params.inlier_threshold {
                mask[i] = true;
                count += 1;
            }
        }

        if count > best_count {
            best_count = count;
            best_mask = mask;
            best_h = Some(h);
            if count as f64 >= 0.9 * n as f64 {
                break;
            }
        }
    }

    if best_count < params.min_inliers.max(4) {
        return Err(FitError::TooFewInliers {
            found: best_count,
            needed: params.min_inliers.max(4),
        });
    }
    let best_h = best_h.ok_or(FitError::TooFewInliers {
        found: 0,
        needed: params.min_inliers.max(4),
    })?;

    // Refit on the consensus set, then re-evaluate everything under the
    // refit model so mask/errors/count are self-consistent.
    let inlier_src: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| src[i]).collect();
    let inlier_dst: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| dst[i]).collect();
    let h = estimate_dlt(&inlier_src, &inlier_dst).unwrap_or(best_h);

    let errors: Vec<f64> = (0..n)
        .map(|i| reprojection_error(&h, &src[i], &dst[i]))
        .collect();
    let inlier_mask: Vec<bool> = errors
        .iter()
        .map(|&e| e < params.inlier_threshold)
        .collect();
    let n_inliers = inlier_mask.iter().filter(|&&m| m).count();

    Ok(RansacFit {
        h,
        inlier_mask,
        n_inliers,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn reference_h() -> Matrix3<f64> {
        // Scale + shear + translation + mild perspective.
        Matrix3::new(
            2.1, 0.08, 310.0, -0.03, 1.9, 145.0, 6e-5, -4e-5, 1.0,
        )
    }

    fn grid_points(nx: usize, ny: usize, step: f64) -> Vec<[f64; 2]> {
        let mut pts = Vec::new();
        for j in 0..ny {
            for i in 0..nx {
                pts.push([i as f64 * step, j as f64 * step]);
            }
        }
        pts
    }

    #[test]
    fn dlt_reproduces_exact_minimal_set() {
        let h_true = reference_h();
        let src = [[0.0, 0.0], [120.0, 0.0], [120.0, 90.0], [0.0, 90.0]];
        let dst: Vec<[f64; 2]> = src.iter().map(|p| project(&h_true, p)).collect();
        let h = estimate_dlt(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            assert!(reprojection_error(&h, s, d) < 1e-6);
        }
    }

    #[test]
    fn dlt_handles_overdetermined_sets() {
        let h_true = reference_h();
        let src = grid_points(6, 5, 25.0);
        let dst: Vec<[f64; 2]> = src.iter().map(|p| project(&h_true, p)).collect();
        let h = estimate_dlt(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            assert!(reprojection_error(&h, s, d) < 1e-6);
        }
    }

    #[test]
    fn dlt_rejects_short_input() {
        let pts = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        assert_eq!(estimate_dlt(&pts, &pts), Err(FitError::TooFewPoints(3)));
    }

    #[test]
    fn ransac_survives_one_third_outliers() {
        let h_true = reference_h();
        let mut rng = StdRng::seed_from_u64(17);

        let mut src = grid_points(5, 5, 30.0);
        let mut dst: Vec<[f64; 2]> = src
            .iter()
            .map(|p| {
                let q = project(&h_true, p);
                [q[0] + rng.gen_range(-0.4..0.4), q[1] + rng.gen_range(-0.4..0.4)]
            })
            .collect();
        for _ in 0..12 {
            src.push([rng.gen_range(0.0..150.0), rng.gen_range(0.0..150.0)]);
            dst.push([rng.gen_range(0.0..900.0), rng.gen_range(0.0..700.0)]);
        }

        let fit = fit_ransac(
            &src,
            &dst,
            &RansacParams {
                inlier_threshold: 3.0,
                seed: 5,
                ..RansacParams::default()
            },
        )
        .unwrap();

        assert!(fit.n_inliers >= 23, "only {} inliers", fit.n_inliers);
        for i in 0..25 {
            assert!(fit.errors[i] < 3.0, "true inlier {i} has error {}", fit.errors[i]);
        }
    }

    #[test]
    fn inlier_count_is_monotone_in_threshold() {
        let h_true = reference_h();
        let mut rng = StdRng::seed_from_u64(3);
        let src = grid_points(5, 4, 20.0);
        let dst: Vec<[f64; 2]> = src
            .iter()
            .map(|p| {
                let q = project(&h_true, p);
                [q[0] + rng.gen_range(-4.0..4.0), q[1] + rng.gen_range(-4.0..4.0)]
            })
            .collect();

        let mut last = 0usize;
        for threshold in [0.5, 1.0, 2.0, 5.0, 10.0, 50.0] {
            let count = count_inliers(&h_true, &src, &dst, threshold);
            assert!(count >= last, "count dropped at threshold {threshold}");
            last = count;
        }
        assert_eq!(last, src.len());
    }

    #[test]
    fn project_roundtrips_through_inverse() {
        let h = reference_h();
        let inv = h.try_inverse().unwrap();
        let p = [83.0, 41.0];
        let back = project(&inv, &project(&h, &p));
        assert_relative_eq!(p[0], back[0], epsilon = 1e-8);
        assert_relative_eq!(p[1], back[1], epsilon = 1e-8);
    }
}
