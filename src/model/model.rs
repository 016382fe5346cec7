// mcinv-param/src/model/model.rs

use super::errors::ModelExpandError;
use super::group::{ModelGroup, Parameterization, DEFAULT_MAX_LAYERS, MAX_SPLINE_BASES};
use crate::bspline::spline_degree;
use log::debug;
use ndarray::Array1;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

/// Ordered collection of model groups, shallow to deep.
#[derive(Clone, Debug, Default)]
pub struct LayeredModel {
    groups: Vec<ModelGroup>,
    max_layers_per_group: usize,
}

impl LayeredModel {
    pub fn new() -> Self {
        Self {
            groups: Vec::new(),
            max_layers_per_group: DEFAULT_MAX_LAYERS,
        }
    }

    /// Reset to `group_count` unconfigured groups.
    pub fn initialize(&mut self, group_count: usize) {
        self.groups = (0..group_count).map(|_| ModelGroup::placeholder()).collect();
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn groups(&self) -> &[ModelGroup] {
        &self.groups
    }

    /// Panics when `index` is out of range, like slice indexing.
    pub fn group(&self, index: usize) -> &ModelGroup {
        &self.groups[index]
    }

    pub fn group_mut(&mut self, index: usize) -> &mut ModelGroup {
        &mut self.groups[index]
    }

    pub fn max_layers_per_group(&self) -> usize {
        self.max_layers_per_group
    }

    pub fn set_max_layers_per_group(&mut self, max: usize) {
        self.max_layers_per_group = max;
    }

    /// Replace group `index` after validating the coefficient/ratio arity
    /// for its parameterization type.
    pub fn configure_group(
        &mut self,
        index: usize,
        parameterization: Parameterization,
        thickness: f64,
        vp_vs_ratio: f64,
        coefficients: &[f64],
        layer_ratios: Option<&[f64]>,
    ) -> Result<(), super::errors::GroupConfigError> {
        use super::errors::GroupConfigError;

        if index >= self.groups.len() {
            return Err(GroupConfigError::GroupIndexOutOfRange {
                index,
                nmod: self.groups.len(),
            });
        }
        if !(thickness > 0.) {
            return Err(GroupConfigError::NonPositiveThickness(thickness));
        }
        if coefficients.is_empty() {
            return Err(GroupConfigError::EmptyCoefficients);
        }
        match parameterization {
            Parameterization::Water => {
                if coefficients.len() != 1 {
                    return Err(GroupConfigError::WaterCoefficientCount(coefficients.len()));
                }
            }
            Parameterization::Gradient => {
                if coefficients.len() != 2 {
                    return Err(GroupConfigError::GradientCoefficientCount(
                        coefficients.len(),
                    ));
                }
            }
            Parameterization::Layered => {}
            Parameterization::BSpline => {}
        }
        let ratios = match (parameterization, layer_ratios) {
            (Parameterization::Layered, Some(ratios)) => {
                if ratios.len() != coefficients.len() {
                    return Err(GroupConfigError::RatioCountMismatch {
                        coefficients: coefficients.len(),
                        ratios: ratios.len(),
                    });
                }
                let sum: f64 = ratios.iter().sum();
                if (sum - 1.).abs() > 1e-9 {
                    return Err(GroupConfigError::RatioSumMismatch(sum));
                }
                ratios.to_vec()
            }
            (Parameterization::Layered, None) => {
                return Err(GroupConfigError::RatioCountMismatch {
                    coefficients: coefficients.len(),
                    ratios: 0,
                })
            }
            (_, Some(_)) => return Err(GroupConfigError::UnexpectedRatios),
            (_, None) => Vec::new(),
        };
        self.groups[index] = ModelGroup::new(
            parameterization,
            thickness,
            vp_vs_ratio,
            coefficients.to_vec(),
            ratios,
        );
        Ok(())
    }

    fn validate_budgets(&self) -> Result<(), ModelExpandError> {
        for (i, group) in self.groups.iter().enumerate() {
            let layer_count = group.layer_count();
            if layer_count > self.max_layers_per_group {
                return Err(ModelExpandError::LayerBudgetExceeded {
                    group: i,
                    layer_count,
                    max: self.max_layers_per_group,
                });
            }
            if group.parameterization() == Parameterization::BSpline {
                let n = group.control_point_count();
                let count = n - 1 + spline_degree(n);
                if count > MAX_SPLINE_BASES {
                    return Err(ModelExpandError::TooManySplineBases {
                        group: i,
                        count,
                        max: MAX_SPLINE_BASES,
                    });
                }
            }
        }
        Ok(())
    }

    /// Layer thicknesses and Vs for group `index`, per its parameterization.
    fn group_layers(&mut self, index: usize) -> Result<(Vec<f64>, Vec<f64>), ModelExpandError> {
        let group = &mut self.groups[index];
        let layer_count = group.layer_count();
        match group.parameterization() {
            Parameterization::Layered => {
                let thickness = group.thickness();
                let h = group
                    .layer_ratios()
                    .iter()
                    .map(|ratio| ratio * thickness)
                    .collect();
                Ok((h, group.coefficients().to_vec()))
            }
            Parameterization::BSpline => {
                let thickness = group.thickness();
                let coefficients = group.coefficients().to_vec();
                let basis = group.spline_basis()?;
                let vs = (0..layer_count)
                    .map(|j| {
                        coefficients
                            .iter()
                            .enumerate()
                            .map(|(i, c)| basis[[i, j]] * c)
                            .sum()
                    })
                    .collect();
                Ok((vec![thickness / layer_count as f64; layer_count], vs))
            }
            Parameterization::Gradient => {
                let dv = (group.coefficients()[1] - group.coefficients()[0])
                    / (layer_count as f64 - 1.);
                let v0 = group.coefficients()[0];
                let vs = (0..layer_count).map(|k| v0 + dv * k as f64).collect();
                let dh = group.thickness() / layer_count as f64;
                Ok((vec![dh; layer_count], vs))
            }
            Parameterization::Water => Ok((vec![group.thickness()], vec![0.])),
        }
    }

    /// Flat per-layer thicknesses across all groups, without touching
    /// velocities. Used to lay out interpolation depths for a reference
    /// profile.
    pub fn layer_thicknesses(&self) -> Result<Array1<f64>, ModelExpandError> {
        self.validate_budgets()?;
        let mut h = Vec::new();
        for group in &self.groups {
            let layer_count = group.layer_count();
            match group.parameterization() {
                Parameterization::Layered => {
                    h.extend(group.layer_ratios().iter().map(|r| r * group.thickness()));
                }
                Parameterization::Water => h.push(group.thickness()),
                Parameterization::BSpline | Parameterization::Gradient => {
                    h.extend(std::iter::repeat(group.thickness() / layer_count as f64)
                        .take(layer_count));
                }
            }
        }
        Ok(Array1::from(h))
    }

    /// Expand every group into the dense per-layer arrays handed to the
    /// forward solver.
    pub fn expand(&mut self) -> Result<LayeredProfile, ModelExpandError> {
        self.validate_budgets()?;
        let nmod = self.groups.len();
        let total: usize = self.groups.iter().map(|g| g.layer_count()).sum();
        debug!("expanding {} groups into {} layers", nmod, total);

        let mut thickness = Vec::with_capacity(total);
        let mut vs = Vec::with_capacity(total);
        let mut vp = Vec::with_capacity(total);
        let mut rho = Vec::with_capacity(total);
        let mut qs = Vec::with_capacity(total);
        let mut qp = Vec::with_capacity(total);

        for i in 0..nmod {
            let below_water = i > 0
                && self.groups[i - 1].parameterization() == Parameterization::Water;
            let (h, v) = self.group_layers(i)?;
            let group = &self.groups[i];
            match group.parameterization() {
                Parameterization::Water => {
                    thickness.push(h[0]);
                    vs.push(0.);
                    vp.push(group.coefficients()[0]);
                    rho.push(1.02);
                    qs.push(10_000.);
                    qp.push(57_822.);
                }
                _ => {
                    let (layer_qs, layer_qp) = if i == 0 || below_water {
                        (80., 160.)
                    } else {
                        (600., 1400.)
                    };
                    for (hk, vk) in h.iter().zip(v.iter()) {
                        let vpk = vk * group.vp_vs_ratio();
                        thickness.push(*hk);
                        vs.push(*vk);
                        vp.push(vpk);
                        rho.push(0.541 + 0.3601 * vpk);
                        qs.push(layer_qs);
                        qp.push(layer_qp);
                    }
                }
            }
        }

        // mantle-lid correction
        for k in 0..rho.len() {
            if vp[k] > 7.5 {
                rho[k] = 3.35;
            }
        }

        let mut depth = Vec::with_capacity(total);
        let mut running = 0.;
        for hk in &thickness {
            running += hk;
            depth.push(running);
        }

        Ok(LayeredProfile {
            thickness: Array1::from(thickness),
            vs: Array1::from(vs),
            vp: Array1::from(vp),
            rho: Array1::from(rho),
            qs: Array1::from(qs),
            qp: Array1::from(qp),
            depth: Array1::from(depth),
        })
    }

    /// Physical acceptance test over the expanded velocities.
    ///
    /// Checks, in order and short-circuiting on the first violation:
    /// velocity must not decrease across any group boundary; within each
    /// group of the inclusive `monotonic` index range (clamped to the valid
    /// groups), velocity must be non-decreasing with depth; within each
    /// group of the inclusive `gradient` range, the top layer must not be
    /// faster than the one below it (single-layer groups pass trivially).
    pub fn is_valid(
        &mut self,
        monotonic: (isize, isize),
        gradient: (isize, isize),
    ) -> Result<bool, ModelExpandError> {
        self.validate_budgets()?;
        let nmod = self.groups.len();
        if nmod == 0 {
            return Ok(true);
        }
        let mut velocities = Vec::with_capacity(nmod);
        for i in 0..nmod {
            let (_, v) = self.group_layers(i)?;
            velocities.push(v);
        }

        for i in 0..nmod.saturating_sub(1) {
            let (Some(&bottom), Some(&top)) = (velocities[i].last(), velocities[i + 1].first())
            else {
                continue;
            };
            if top < bottom {
                return Ok(false);
            }
        }

        if let Some((m0, m1)) = clamp_group_range(monotonic, nmod) {
            for j in m0..=m1 {
                if velocities[j].windows(2).any(|pair| pair[0] > pair[1]) {
                    return Ok(false);
                }
            }
        }

        if let Some((g0, g1)) = clamp_group_range(gradient, nmod) {
            for j in g0..=g1 {
                if velocities[j].len() >= 2 && velocities[j][0] > velocities[j][1] {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }
}

fn clamp_group_range(range: (isize, isize), nmod: usize) -> Option<(usize, usize)> {
    let lo = range.0.max(0);
    let hi = range.1.min(nmod as isize - 1);
    if lo > hi {
        None
    } else {
        Some((lo as usize, hi as usize))
    }
}

/// Dense per-layer model handed to the forward dispersion solver.
#[derive(Clone, Debug, PartialEq)]
pub struct LayeredProfile {
    thickness: Array1<f64>,
    vs: Array1<f64>,
    vp: Array1<f64>,
    rho: Array1<f64>,
    qs: Array1<f64>,
    qp: Array1<f64>,
    depth: Array1<f64>,
}

impl LayeredProfile {
    pub fn layer_count(&self) -> usize {
        self.thickness.len()
    }

    pub fn thicknesses(&self) -> &Array1<f64> {
        &self.thickness
    }

    pub fn vs(&self) -> &Array1<f64> {
        &self.vs
    }

    pub fn vp(&self) -> &Array1<f64> {
        &self.vp
    }

    pub fn rho(&self) -> &Array1<f64> {
        &self.rho
    }

    pub fn qs(&self) -> &Array1<f64> {
        &self.qs
    }

    pub fn qp(&self) -> &Array1<f64> {
        &self.qp
    }

    /// Cumulative depth to the bottom of each layer.
    pub fn depth(&self) -> &Array1<f64> {
        &self.depth
    }

    pub fn write_to_file(&self, filename: &PathBuf) -> std::io::Result<()> {
        let mut file = File::create(filename)?;
        write!(file, "{}", self)?;
        Ok(())
    }
}

impl fmt::Display for LayeredProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>12}\n", self.layer_count())?;
        for k in 0..self.layer_count() {
            write!(
                f,
                "{:14.6}{:14.6}{:14.6}{:14.6}{:14.6}{:14.6}{:14.6}\n",
                self.depth[k],
                self.thickness[k],
                self.vs[k],
                self.vp[k],
                self.rho[k],
                self.qs[k],
                self.qp[k]
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GroupConfigError;

    fn three_group_model() -> LayeredModel {
        let mut model = LayeredModel::new();
        model.initialize(3);
        model
            .configure_group(
                0,
                Parameterization::Layered,
                2.,
                2.,
                &[1.0, 1.2],
                Some(&[0.5, 0.5]),
            )
            .unwrap();
        model
            .configure_group(
                1,
                Parameterization::BSpline,
                33.,
                1.75,
                &[3.3, 3.5, 3.6, 3.8],
                None,
            )
            .unwrap();
        model
            .configure_group(
                2,
                Parameterization::BSpline,
                165.,
                1.75,
                &[4.3, 4.4, 4.4, 4.5, 4.6],
                None,
            )
            .unwrap();
        model
    }

    #[test]
    fn test_three_group_expansion() {
        let mut model = three_group_model();
        let profile = model.expand().unwrap();
        assert_eq!(profile.layer_count(), 2 + 30 + 60);
        let total: f64 = profile.thicknesses().sum();
        assert!((total - 200.).abs() < 1e-6);
        assert!((profile.depth()[profile.layer_count() - 1] - 200.).abs() < 1e-6);
        // sediment layers come straight from the coefficients and ratios
        assert_eq!(profile.vs()[0], 1.0);
        assert_eq!(profile.vs()[1], 1.2);
        assert_eq!(profile.thicknesses()[0], 1.0);
        assert_eq!(profile.vp()[0], 2.0);
        // deeper groups use their own vp/vs ratio
        assert!((profile.vp()[2] - profile.vs()[2] * 1.75).abs() < 1e-12);
        // quality factors by group role
        assert_eq!(profile.qs()[0], 80.);
        assert_eq!(profile.qp()[1], 160.);
        assert_eq!(profile.qs()[2], 600.);
        assert_eq!(profile.qp()[34], 1400.);
    }

    #[test]
    fn test_density_override_above_mantle_velocities() {
        let mut model = three_group_model();
        let profile = model.expand().unwrap();
        let mut corrected = 0;
        for k in 0..profile.layer_count() {
            let vp = profile.vp()[k];
            if vp > 7.5 {
                assert_eq!(profile.rho()[k], 3.35);
                corrected += 1;
            } else {
                assert!((profile.rho()[k] - (0.541 + 0.3601 * vp)).abs() < 1e-12);
            }
        }
        // the mantle group sits above 7.5 km/s Vp throughout
        assert!(corrected >= 60);
    }

    #[test]
    fn test_water_group_expands_to_single_fluid_layer() {
        let mut model = LayeredModel::new();
        model.initialize(2);
        model
            .configure_group(0, Parameterization::Water, 1., 1., &[1.5], None)
            .unwrap();
        model
            .configure_group(
                1,
                Parameterization::BSpline,
                33.,
                1.75,
                &[3.3, 3.5, 3.6, 3.8],
                None,
            )
            .unwrap();
        let profile = model.expand().unwrap();
        assert_eq!(profile.thicknesses()[0], 1.0);
        assert_eq!(profile.vs()[0], 0.);
        assert_eq!(profile.vp()[0], 1.5);
        assert_eq!(profile.rho()[0], 1.02);
        assert_eq!(profile.qs()[0], 10_000.);
        assert_eq!(profile.qp()[0], 57_822.);
        // the group under the water column takes the shallow attenuation
        assert_eq!(profile.qs()[1], 80.);
        assert_eq!(profile.qp()[1], 160.);
    }

    #[test]
    fn test_gradient_expansion_ramps_linearly() {
        let mut model = LayeredModel::new();
        model.initialize(1);
        model
            .configure_group(0, Parameterization::Gradient, 2., 2., &[1.0, 1.3], None)
            .unwrap();
        let profile = model.expand().unwrap();
        assert_eq!(profile.layer_count(), 4);
        assert!((profile.vs()[0] - 1.0).abs() < 1e-12);
        assert!((profile.vs()[3] - 1.3).abs() < 1e-12);
        assert!((profile.vs()[1] - 1.1).abs() < 1e-12);
        assert!((profile.thicknesses()[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_validity_rejects_group_boundary_decrease() {
        let mut model = LayeredModel::new();
        model.initialize(3);
        model
            .configure_group(0, Parameterization::Gradient, 2., 2., &[1.0, 3.5], None)
            .unwrap();
        // crust starts slower than the sediment bottom
        model
            .configure_group(
                1,
                Parameterization::BSpline,
                38.,
                1.75,
                &[3.2, 3.5, 3.6, 3.8],
                None,
            )
            .unwrap();
        model
            .configure_group(
                2,
                Parameterization::BSpline,
                160.,
                1.75,
                &[4.3, 4.4, 4.4, 4.5, 4.6],
                None,
            )
            .unwrap();
        assert!(!model.is_valid((0, 2), (1, 2)).unwrap());
    }

    #[test]
    fn test_validity_accepts_monotone_model() {
        let mut model = three_group_model();
        assert!(model.is_valid((0, 2), (1, 2)).unwrap());
        // out-of-range group indices are clamped, not an error
        assert!(model.is_valid((-1, 10), (1, 10)).unwrap());
    }

    #[test]
    fn test_validity_rejects_in_group_decrease() {
        let mut model = three_group_model();
        model.group_mut(1).coefficients_mut()[1] = 2.9;
        assert!(!model.is_valid((0, 2), (1, 2)).unwrap());
    }

    #[test]
    fn test_layer_budget_is_enforced() {
        let mut model = three_group_model();
        model.set_max_layers_per_group(10);
        assert!(matches!(
            model.expand(),
            Err(ModelExpandError::LayerBudgetExceeded {
                group: 1,
                layer_count: 30,
                max: 10
            })
        ));
    }

    #[test]
    fn test_configure_group_arity_checks() {
        let mut model = LayeredModel::new();
        model.initialize(1);
        assert!(matches!(
            model.configure_group(0, Parameterization::Water, 1., 1., &[1.5, 1.6], None),
            Err(GroupConfigError::WaterCoefficientCount(2))
        ));
        assert!(matches!(
            model.configure_group(0, Parameterization::Gradient, 1., 2., &[1.5], None),
            Err(GroupConfigError::GradientCoefficientCount(1))
        ));
        assert!(matches!(
            model.configure_group(
                0,
                Parameterization::Layered,
                2.,
                2.,
                &[1.0, 1.2],
                Some(&[0.7, 0.4])
            ),
            Err(GroupConfigError::RatioSumMismatch(_))
        ));
        assert!(matches!(
            model.configure_group(1, Parameterization::Water, 1., 1., &[1.5], None),
            Err(GroupConfigError::GroupIndexOutOfRange { index: 1, nmod: 1 })
        ));
    }
}
