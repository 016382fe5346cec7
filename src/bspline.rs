// mcinv-param/src/bspline.rs

use libm::pow;
use ndarray::{s, Array2};
use thiserror::Error;

/// Spline order used for a group with the given number of control points.
///
/// Four or more control points get order 4 (cubic segments), fewer get
/// order 3.
pub fn spline_degree(control_points: usize) -> usize {
    if control_points < 4 {
        3
    } else {
        4
    }
}

/// Generate a clamped B-spline basis matrix of shape
/// `(control_points, samples)`.
///
/// The knot vector carries `degree` knots at each end of
/// `[depth_min, depth_max]`, pulled inside the range by `range / 10_000` per
/// knot so the degree-0 indicator recursion stays defined at the bounds.
/// Interior knots are geometrically spaced by `spacing_factor`; a factor
/// above one compresses basis support toward the shallow end. The basis is
/// evaluated at `samples` uniformly spaced depths via the Cox-de Boor
/// recursion, with zero-width knot spans contributing zero.
///
/// The recursion leaves the exact endpoints at its numerical edge case, so
/// `basis[[0, 0]]` and `basis[[control_points - 1, samples - 1]]` are forced
/// to one afterwards.
pub fn basis_matrix(
    control_points: usize,
    degree: usize,
    depth_min: f64,
    depth_max: f64,
    spacing_factor: f64,
    samples: usize,
) -> Result<Array2<f64>, BasisError> {
    if degree < 1 || control_points < degree {
        return Err(BasisError::InvalidParameterization {
            control_points,
            degree,
        });
    }
    if samples < 2 {
        return Err(BasisError::TooFewSamples(samples));
    }
    if depth_max <= depth_min {
        return Err(BasisError::InvalidDepthRange(depth_min, depth_max));
    }

    let m = control_points - 1 + degree;
    let range = depth_max - depth_min;
    let mut knots = vec![0.0f64; m + 1];
    for i in 0..degree {
        knots[i] = depth_min + i as f64 * range / 10_000.;
    }
    let interior_spans = (m + 1 - 2 * degree + 1) as f64;
    for i in degree..(m + 1 - degree) {
        let scale = if spacing_factor != 1. {
            range * (spacing_factor - 1.) / (pow(spacing_factor, interior_spans) - 1.)
        } else {
            range / interior_spans
        };
        knots[i] = scale * pow(spacing_factor, (i - degree) as f64) + depth_min;
    }
    for i in (m + 1 - degree)..(m + 1) {
        knots[i] = depth_max - range / 10_000. * (m - i) as f64;
    }

    let step = range / (samples - 1) as f64;
    let depth: Vec<f64> = (0..samples).map(|j| depth_min + j as f64 * step).collect();

    // degree-0 indicator bases
    let mut basis = Array2::<f64>::zeros((m, samples));
    for i in 0..m {
        for j in 0..samples {
            if depth[j] >= knots[i] && depth[j] < knots[i + 1] {
                basis[[i, j]] = 1.;
            }
        }
    }

    for order in 1..degree {
        let prev = basis.clone();
        for i in 0..(m - order) {
            for j in 0..samples {
                let left_span = knots[i + order] - knots[i];
                let right_span = knots[i + order + 1] - knots[i + 1];
                let left = if left_span != 0. {
                    (depth[j] - knots[i]) / left_span * prev[[i, j]]
                } else {
                    0.
                };
                let right = if right_span != 0. {
                    (knots[i + order + 1] - depth[j]) / right_span * prev[[i + 1, j]]
                } else {
                    0.
                };
                basis[[i, j]] = left + right;
            }
        }
    }

    basis[[0, 0]] = 1.;
    basis[[control_points - 1, samples - 1]] = 1.;
    Ok(basis.slice(s![..control_points, ..]).to_owned())
}

#[derive(Error, Debug)]
pub enum BasisError {
    #[error("cannot build an order-{degree} knot vector for {control_points} control points")]
    InvalidParameterization {
        control_points: usize,
        degree: usize,
    },
    #[error("basis sampling needs at least 2 points, but got {0}")]
    TooFewSamples(usize),
    #[error("depth range must satisfy depth_min < depth_max, but got [{0}, {1}]")]
    InvalidDepthRange(f64, f64),
}
