// mcinv-param/src/model/reference.rs

use super::errors::{GroupConfigError, ModelExpandError};
use super::model::LayeredModel;
use super::group::Parameterization;
use crate::bspline::BasisError;
use log::warn;
use nalgebra::{Cholesky, DMatrix, DVector};
use ndarray::{Array1, Array2};
use ndarray_stats::QuantileExt;
use thiserror::Error;

/// Default bottom of the parameterized profile.
pub const REFERENCE_MAX_DEPTH: f64 = 200.;

/// Parameterize a reference `(depth, vs)` profile into the standard
/// three-group model: a two-point gradient sediment column (vp/vs 2.0), a
/// four-point B-spline crust and a five-point B-spline mantle (vp/vs 1.75).
///
/// The reference is truncated at `max_depth`, a non-monotonic crustal
/// section is sorted into depth order, and the profile is interpolated
/// onto the model's layer depths. Sediment endpoints come straight from
/// the interpolant; crust and mantle spline coefficients are fit by least
/// squares on the group basis, clamped into the bounds the inversion
/// would use for those groups.
pub fn parameterize_reference_profile(
    depths: &[f64],
    vs: &[f64],
    sediment_depth: f64,
    moho_depth: f64,
    max_depth: f64,
) -> Result<LayeredModel, ReferenceFitError> {
    if depths.len() != vs.len() {
        return Err(ReferenceFitError::SizeMismatch(depths.len(), vs.len()));
    }
    if !(sediment_depth > 0. && moho_depth > sediment_depth && max_depth > moho_depth) {
        return Err(ReferenceFitError::InvalidInterfaceDepths(
            sediment_depth,
            moho_depth,
            max_depth,
        ));
    }

    let mut model = LayeredModel::new();
    model.initialize(3);
    model.configure_group(
        0,
        Parameterization::Gradient,
        sediment_depth,
        2.,
        &[0., 0.],
        None,
    )?;
    model.configure_group(
        1,
        Parameterization::BSpline,
        moho_depth - sediment_depth,
        1.75,
        &[0.; 4],
        None,
    )?;
    model.configure_group(
        2,
        Parameterization::BSpline,
        max_depth - moho_depth,
        1.75,
        &[0.; 5],
        None,
    )?;

    let h = model.layer_thicknesses()?;
    let mut zinterp = Vec::with_capacity(h.len());
    let mut running = 0.;
    for hk in h.iter() {
        running += hk;
        zinterp.push(running);
    }

    let cut = depths
        .iter()
        .position(|&z| z >= max_depth)
        .ok_or(ReferenceFitError::ProfileTooShallow(max_depth))?;
    if cut < 1 {
        return Err(ReferenceFitError::ProfileTooSparse(max_depth));
    }
    let zarr = &depths[..=cut];
    let mut vsarr = vs[..=cut].to_vec();
    if vsarr[0] > vsarr[1] {
        vsarr.swap(0, 1);
    }

    // sort a non-monotonic crustal section into depth order
    let ind_crust = zarr
        .iter()
        .position(|&z| z >= moho_depth)
        .ok_or(ReferenceFitError::ProfileTooShallow(moho_depth))?;
    let crust = &vsarr[..=ind_crust];
    if crust.windows(2).any(|pair| pair[1] < pair[0]) {
        warn!("sorting the reference vs array to increase monotonically within the crust");
        let mut sorted = crust.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        vsarr[..=ind_crust].copy_from_slice(&sorted);
    }

    let vsinterp = interp(&zinterp, zarr, &vsarr);
    let nlay0 = model.group(0).layer_count();
    let nlay1 = model.group(1).layer_count();

    // sediment gradient endpoints
    model.group_mut(0).coefficients_mut()[0] = vsinterp[0];
    model.group_mut(0).coefficients_mut()[1] = vsinterp[nlay0 - 1];

    // crust
    let targets = &vsinterp[nlay0..nlay0 + nlay1];
    let lo = vsinterp[nlay0].max(3.);
    let hi = vsinterp[nlay0 + nlay1 - 1].min(4.2);
    let basis = model.group_mut(1).spline_basis()?.clone();
    let coefficients = fit_spline_coefficients(&basis, targets, lo, hi)?;
    model
        .group_mut(1)
        .coefficients_mut()
        .copy_from_slice(&coefficients);

    // mantle
    let targets = &vsinterp[nlay0 + nlay1..];
    let mantle = Array1::from(targets.to_vec());
    let reference = Array1::from(vsarr.clone());
    let lo = mantle.min()?.max(4.);
    let hi = mantle.max()?.min(*reference.max()?);
    let basis = model.group_mut(2).spline_basis()?.clone();
    let coefficients = fit_spline_coefficients(&basis, targets, lo, hi)?;
    model
        .group_mut(2)
        .coefficients_mut()
        .copy_from_slice(&coefficients);

    Ok(model)
}

/// Least-squares spline coefficients for `basis' x = targets`, solved via
/// the normal equations and clamped into `[lo, hi]`.
fn fit_spline_coefficients(
    basis: &Array2<f64>,
    targets: &[f64],
    lo: f64,
    hi: f64,
) -> Result<Vec<f64>, ReferenceFitError> {
    let ncp = basis.nrows();
    let nlay = basis.ncols();
    if targets.len() != nlay {
        return Err(ReferenceFitError::FitSizeMismatch {
            expected: nlay,
            found: targets.len(),
        });
    }
    if !(lo <= hi) {
        return Err(ReferenceFitError::InvalidFitBounds(lo, hi));
    }
    let mut ata = DMatrix::<f64>::zeros(ncp, ncp);
    let mut atb = DVector::<f64>::zeros(ncp);
    for p in 0..ncp {
        for q in 0..ncp {
            ata[(p, q)] = (0..nlay).map(|j| basis[[p, j]] * basis[[q, j]]).sum();
        }
        atb[p] = (0..nlay).map(|j| basis[[p, j]] * targets[j]).sum();
    }
    let solution = Cholesky::new(ata)
        .ok_or(ReferenceFitError::SingularNormalEquations)?
        .solve(&atb);
    Ok(solution.iter().map(|x| x.clamp(lo, hi)).collect())
}

/// Piecewise-linear interpolation of `(xp, fp)` at `x`, clamped at the
/// ends.
fn interp(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    let last = xp.len() - 1;
    x.iter()
        .map(|&xi| {
            if xi <= xp[0] {
                fp[0]
            } else if xi >= xp[last] {
                fp[last]
            } else {
                let hi = xp.partition_point(|&v| v < xi);
                let lo = hi - 1;
                let t = (xi - xp[lo]) / (xp[hi] - xp[lo]);
                fp[lo] + t * (fp[hi] - fp[lo])
            }
        })
        .collect()
}

#[derive(Error, Debug)]
pub enum ReferenceFitError {
    #[error("reference depth and vs arrays must be the same length, but got {0} and {1}")]
    SizeMismatch(usize, usize),
    #[error("interface depths must satisfy 0 < sediment < moho < max, but got {0}, {1}, {2}")]
    InvalidInterfaceDepths(f64, f64, f64),
    #[error("reference profile never reaches {0} km depth")]
    ProfileTooShallow(f64),
    #[error("reference profile needs at least two samples above {0} km")]
    ProfileTooSparse(f64),
    #[error("spline fit needs {expected} target values, but got {found}")]
    FitSizeMismatch { expected: usize, found: usize },
    #[error("spline fit bounds are inverted: [{0}, {1}]")]
    InvalidFitBounds(f64, f64),
    #[error("normal equations for the spline fit are singular")]
    SingularNormalEquations,
    #[error(transparent)]
    Basis(#[from] BasisError),
    #[error(transparent)]
    Expand(#[from] ModelExpandError),
    #[error(transparent)]
    Config(#[from] GroupConfigError),
    #[error(transparent)]
    MinMax(#[from] ndarray_stats::errors::MinMaxError),
}
