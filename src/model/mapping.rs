// mcinv-param/src/model/mapping.rs

use super::errors::MappingError;
use super::model::LayeredModel;
use crate::para::{
    Amplitude, CoeffIndex, GroupIndex, ParamDescriptor, ParamKind, ParameterSet,
};
use log::debug;

impl LayeredModel {
    /// Build the standard perturbation layout for this model.
    ///
    /// One velocity-coefficient parameter per control point of every group
    /// (absolute +-1 km/s amplitude for the sediment group, relative 20%
    /// deeper, step 0.05 km/s), a sediment-thickness parameter when the
    /// model has at least three groups (relative 100%, step 0.1 km), and a
    /// crustal-thickness parameter (relative 20%, step 1 km).
    pub fn parameter_layout(&self) -> ParameterSet {
        let nmod = self.group_count();
        let mut params = ParameterSet::new();
        for (i, group) in self.groups().iter().enumerate() {
            let amplitude = if i == 0 {
                Amplitude::Absolute(1.)
            } else {
                Amplitude::Relative(20.)
            };
            for j in 0..group.control_point_count() {
                params.push(ParamDescriptor {
                    kind: ParamKind::VelocityCoefficient {
                        group: GroupIndex(i),
                        coeff: CoeffIndex(j),
                    },
                    amplitude,
                    step: 0.05,
                });
            }
        }
        if nmod >= 3 {
            params.push(ParamDescriptor {
                kind: ParamKind::GroupThickness {
                    group: GroupIndex(0),
                },
                amplitude: Amplitude::Relative(100.),
                step: 0.1,
            });
        }
        params.push(ParamDescriptor {
            kind: ParamKind::GroupThickness {
                group: GroupIndex(if nmod >= 3 { 1 } else { 0 }),
            },
            amplitude: Amplitude::Relative(20.),
            step: 1.,
        });
        debug!("parameter layout: {} parameters for {} groups", params.len(), nmod);
        params
    }

    fn check_slot(&self, index: usize, kind: ParamKind) -> Result<(), MappingError> {
        let nmod = self.group_count();
        let group = match kind {
            ParamKind::VelocityCoefficient { group, .. } => group,
            ParamKind::GroupThickness { group } => group,
            ParamKind::VpVsRatio { group } => group,
        };
        if group.0 >= nmod {
            return Err(MappingError::GroupOutOfRange {
                index,
                group: group.0,
                nmod,
            });
        }
        if let ParamKind::VelocityCoefficient { group, coeff } = kind {
            let count = self.group(group.0).control_point_count();
            if coeff.0 >= count {
                return Err(MappingError::CoeffOutOfRange {
                    index,
                    group: group.0,
                    coeff: coeff.0,
                    count,
                });
            }
        }
        Ok(())
    }

    /// Copy the model's physical values into the parameter vector.
    ///
    /// On the first pass the per-parameter perturbation space is computed
    /// from the amplitude policy and frozen: lower bounds are floored at
    /// zero, upper bounds kept at least 1e-4 above the lower, and the
    /// shallowest sediment velocity coefficient is floored to the
    /// [0.2, 0.5] surface window. Later passes only refresh values.
    pub fn update_params(&self, params: &mut ParameterSet) -> Result<(), MappingError> {
        let freeze = !params.bounds_ready();
        for i in 0..params.len() {
            let descriptor = params.descriptors()[i];
            self.check_slot(i, descriptor.kind)?;
            let value = match descriptor.kind {
                ParamKind::VelocityCoefficient { group, coeff } => {
                    self.group(group.0).coefficients()[coeff.0]
                }
                ParamKind::GroupThickness { group } => self.group(group.0).thickness(),
                ParamKind::VpVsRatio { group } => self.group(group.0).vp_vs_ratio(),
            };
            params.set_value(i, value);
            if freeze {
                let (mut min, mut max) = match descriptor.amplitude {
                    Amplitude::Absolute(a) => (value - a, value + a),
                    Amplitude::Relative(pct) => {
                        (value - value * pct / 100., value + value * pct / 100.)
                    }
                };
                min = min.max(0.);
                max = max.max(min + 1e-4);
                if let ParamKind::VelocityCoefficient {
                    group: GroupIndex(0),
                    coeff: CoeffIndex(0),
                } = descriptor.kind
                {
                    min = min.max(0.2);
                    max = max.max(0.5);
                }
                params.set_bounds(i, min, max, descriptor.step)?;
            }
        }
        Ok(())
    }

    /// Write the parameter vector back into the model slots it was derived
    /// from. Exact inverse of `update_params` on the parameterized fields.
    pub fn apply_params(&mut self, params: &ParameterSet) -> Result<(), MappingError> {
        for i in 0..params.len() {
            let descriptor = params.descriptors()[i];
            self.check_slot(i, descriptor.kind)?;
            let value = params.value(i);
            match descriptor.kind {
                ParamKind::VelocityCoefficient { group, coeff } => {
                    self.group_mut(group.0).coefficients_mut()[coeff.0] = value;
                }
                ParamKind::GroupThickness { group } => {
                    self.group_mut(group.0).set_thickness(value);
                }
                ParamKind::VpVsRatio { group } => {
                    self.group_mut(group.0).set_vp_vs_ratio(value);
                }
            }
        }
        Ok(())
    }
}
