// mcinv-param/src/model/group.rs

use crate::bspline::{basis_matrix, spline_degree, BasisError};
use ndarray::Array2;

/// Geometric compression of interior spline knots toward the shallow end.
pub(crate) const SPLINE_SPACING_FACTOR: f64 = 2.;

/// Upper bound on `control_points - 1 + degree` for a spline group.
pub const MAX_SPLINE_BASES: usize = 20;

/// Default per-group layer budget.
pub const DEFAULT_MAX_LAYERS: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parameterization {
    /// Explicit layers: one velocity and one thickness ratio per control
    /// point.
    Layered,
    /// Velocities expanded from spline control coefficients.
    BSpline,
    /// Linear ramp between a top and a bottom velocity.
    Gradient,
    /// Single fluid layer, vs = 0, coefficient carries Vp.
    Water,
}

impl Parameterization {
    /// Wire flag used by the group-spec text format.
    pub fn from_flag(flag: i64) -> Option<Self> {
        match flag {
            1 => Some(Parameterization::Layered),
            2 => Some(Parameterization::BSpline),
            4 => Some(Parameterization::Gradient),
            5 => Some(Parameterization::Water),
            _ => None,
        }
    }

    pub fn flag(&self) -> i64 {
        match self {
            Parameterization::Layered => 1,
            Parameterization::BSpline => 2,
            Parameterization::Gradient => 4,
            Parameterization::Water => 5,
        }
    }
}

/// Number of dense layers a group expands to.
///
/// Pure in its arguments; thin groups get fewer layers.
pub fn layer_count_policy(
    parameterization: Parameterization,
    thickness: f64,
    control_points: usize,
) -> usize {
    match parameterization {
        Parameterization::Layered => control_points,
        Parameterization::BSpline => {
            if thickness >= 150. {
                60
            } else if thickness < 10. {
                5
            } else if thickness < 20. {
                10
            } else {
                30
            }
        }
        Parameterization::Gradient => {
            if thickness >= 20. {
                20
            } else if thickness > 10. {
                (thickness / 1.) as usize
            } else if thickness > 2. {
                (thickness / 0.5) as usize
            } else if thickness < 0.5 {
                2
            } else {
                4
            }
        }
        Parameterization::Water => 1,
    }
}

#[derive(Clone, Debug)]
struct BasisCache {
    control_points: usize,
    thickness: f64,
    layer_count: usize,
    matrix: Array2<f64>,
}

/// One contiguous depth interval of the model.
///
/// The memoized spline basis is keyed on
/// `(control_points, thickness, layer_count)`; a lookup with any of those
/// changed regenerates it, so mutation through the setters can never serve
/// a stale matrix.
#[derive(Clone, Debug)]
pub struct ModelGroup {
    parameterization: Parameterization,
    thickness: f64,
    vp_vs_ratio: f64,
    coefficients: Vec<f64>,
    layer_ratios: Vec<f64>,
    basis: Option<BasisCache>,
}

impl ModelGroup {
    pub(crate) fn placeholder() -> Self {
        Self {
            parameterization: Parameterization::Layered,
            thickness: 0.,
            vp_vs_ratio: 1.75,
            coefficients: Vec::new(),
            layer_ratios: Vec::new(),
            basis: None,
        }
    }

    pub(crate) fn new(
        parameterization: Parameterization,
        thickness: f64,
        vp_vs_ratio: f64,
        coefficients: Vec<f64>,
        layer_ratios: Vec<f64>,
    ) -> Self {
        Self {
            parameterization,
            thickness,
            vp_vs_ratio,
            coefficients,
            layer_ratios,
            basis: None,
        }
    }

    pub fn parameterization(&self) -> Parameterization {
        self.parameterization
    }

    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    pub fn vp_vs_ratio(&self) -> f64 {
        self.vp_vs_ratio
    }

    pub fn control_point_count(&self) -> usize {
        self.coefficients.len()
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn coefficients_mut(&mut self) -> &mut [f64] {
        &mut self.coefficients
    }

    pub fn layer_ratios(&self) -> &[f64] {
        &self.layer_ratios
    }

    pub fn set_thickness(&mut self, thickness: f64) {
        self.thickness = thickness;
    }

    pub fn set_vp_vs_ratio(&mut self, vp_vs_ratio: f64) {
        self.vp_vs_ratio = vp_vs_ratio;
    }

    pub fn layer_count(&self) -> usize {
        layer_count_policy(self.parameterization, self.thickness, self.coefficients.len())
    }

    /// Spline basis of shape `(control_points, layer_count)` for the
    /// group's current thickness, served from the cache when its key still
    /// matches.
    pub fn spline_basis(&mut self) -> Result<&Array2<f64>, BasisError> {
        let control_points = self.coefficients.len();
        let layer_count = self.layer_count();
        let cache = match self.basis.take() {
            Some(cache)
                if cache.control_points == control_points
                    && cache.thickness == self.thickness
                    && cache.layer_count == layer_count =>
            {
                cache
            }
            _ => BasisCache {
                control_points,
                thickness: self.thickness,
                layer_count,
                matrix: basis_matrix(
                    control_points,
                    spline_degree(control_points),
                    0.,
                    self.thickness,
                    SPLINE_SPACING_FACTOR,
                    layer_count,
                )?,
            },
        };
        Ok(&self.basis.insert(cache).matrix)
    }
}
