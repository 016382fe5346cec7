// mcinv-param/src/para.rs

use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Budget for in-bounds Gaussian redraws before a proposal is abandoned.
pub const MAX_GAUSSIAN_DRAWS: usize = 10_000;

/// Position of a group within its model, shallow to deep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct GroupIndex(pub usize);

/// Position of a velocity coefficient within its group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CoeffIndex(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    VelocityCoefficient { group: GroupIndex, coeff: CoeffIndex },
    GroupThickness { group: GroupIndex },
    VpVsRatio { group: GroupIndex },
}

/// Perturbation amplitude, either absolute (km/s or km) or relative
/// (percent of the current value).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Amplitude {
    Absolute(f64),
    Relative(f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamDescriptor {
    pub kind: ParamKind,
    pub amplitude: Amplitude,
    pub step: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct ParamSpace {
    min: f64,
    max: f64,
    step: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProposalPolicy {
    /// Each parameter drawn independently and uniformly from its bounds.
    Uniform,
    /// Each parameter drawn from a normal centered on its current value with
    /// sigma equal to its step, redrawing out-of-bounds samples.
    Gaussian,
}

/// Flat container for the free parameter vector the sampler perturbs.
///
/// Each slot pairs a current value with a descriptor binding it to a model
/// slot (group/coefficient indices). The binding is positional: it stays
/// valid only while the model keeps its group count and per-group
/// control-point counts. Bounds start out uninitialized and are frozen by
/// the first `LayeredModel::update_params` pass; `propose` refuses to run
/// before then.
#[derive(Clone, Debug, Default)]
pub struct ParameterSet {
    descriptors: Vec<ParamDescriptor>,
    values: Vec<f64>,
    space: Vec<Option<ParamSpace>>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `count` slots with zeroed velocity-coefficient descriptors,
    /// values at zero and bounds uninitialized. Used to size a container
    /// before restoring a value snapshot.
    pub fn init(count: usize) -> Self {
        let mut set = Self::default();
        for _ in 0..count {
            set.push(ParamDescriptor {
                kind: ParamKind::VelocityCoefficient {
                    group: GroupIndex(0),
                    coeff: CoeffIndex(0),
                },
                amplitude: Amplitude::Absolute(0.),
                step: 0.,
            });
        }
        set
    }

    pub fn push(&mut self, descriptor: ParamDescriptor) {
        self.descriptors.push(descriptor);
        self.values.push(0.);
        self.space.push(None);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn descriptors(&self) -> &[ParamDescriptor] {
        &self.descriptors
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(&self, index: usize) -> f64 {
        self.values[index]
    }

    pub fn set_value(&mut self, index: usize, value: f64) {
        self.values[index] = value;
    }

    pub fn bounds_ready(&self) -> bool {
        self.space.iter().all(Option::is_some)
    }

    pub fn bounds(&self, index: usize) -> Option<(f64, f64, f64)> {
        self.space[index].map(|s| (s.min, s.max, s.step))
    }

    pub fn set_bounds(
        &mut self,
        index: usize,
        min: f64,
        max: f64,
        step: f64,
    ) -> Result<(), ProposalError> {
        let npara = self.len();
        if index >= npara {
            return Err(ProposalError::IndexOutOfRange { index, npara });
        }
        if !(min <= max) {
            return Err(ProposalError::InvalidBounds { index, min, max });
        }
        self.space[index] = Some(ParamSpace { min, max, step });
        Ok(())
    }

    /// Overwrite the value vector with a fresh proposal.
    ///
    /// A Gaussian proposal that exhausts its redraw budget on parameter `i`
    /// errors out with `ExhaustedRetries`, leaving parameters before `i`
    /// already updated; callers keep a pristine copy per candidate.
    pub fn propose<R: Rng + ?Sized>(
        &mut self,
        policy: ProposalPolicy,
        rng: &mut R,
    ) -> Result<(), ProposalError> {
        if !self.bounds_ready() {
            return Err(ProposalError::BoundsNotInitialized);
        }
        match policy {
            ProposalPolicy::Uniform => {
                for i in 0..self.values.len() {
                    let Some(space) = self.space[i] else {
                        return Err(ProposalError::BoundsNotInitialized);
                    };
                    self.values[i] = rng.random_range(space.min..=space.max);
                }
            }
            ProposalPolicy::Gaussian => {
                for i in 0..self.values.len() {
                    let Some(space) = self.space[i] else {
                        return Err(ProposalError::BoundsNotInitialized);
                    };
                    let normal = Normal::new(self.values[i], space.step).map_err(|_| {
                        ProposalError::InvalidStep {
                            index: i,
                            step: space.step,
                        }
                    })?;
                    let mut accepted = None;
                    for _ in 0..MAX_GAUSSIAN_DRAWS {
                        let draw = normal.sample(rng);
                        if draw >= space.min && draw <= space.max {
                            accepted = Some(draw);
                            break;
                        }
                    }
                    self.values[i] = accepted.ok_or(ProposalError::ExhaustedRetries {
                        index: i,
                        attempts: MAX_GAUSSIAN_DRAWS,
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Snapshot the value vector, one value per line.
    pub fn write_values_txt(&self, filename: &PathBuf) -> std::io::Result<()> {
        let mut file = File::create(filename)?;
        for value in &self.values {
            write!(file, "{:e}\n", value)?;
        }
        Ok(())
    }

    /// Restore the value vector written by `write_values_txt`.
    ///
    /// The file must carry exactly one value per parameter; nothing is
    /// loaded on a count mismatch or an unparseable line.
    pub fn read_values_txt(&mut self, filename: &PathBuf) -> Result<(), ParamLoadError> {
        let file = File::open(filename)?;
        let mut loaded = Vec::with_capacity(self.values.len());
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let token = line.trim();
            if token.is_empty() {
                continue;
            }
            let value = token
                .parse::<f64>()
                .map_err(|_| ParamLoadError::ParseValue {
                    line: lineno + 1,
                    token: token.to_string(),
                })?;
            loaded.push(value);
        }
        if loaded.len() != self.values.len() {
            return Err(ParamLoadError::CountMismatch {
                expected: self.values.len(),
                found: loaded.len(),
            });
        }
        self.values = loaded;
        Ok(())
    }

    /// Read a perturbation setup file, one parameter per line:
    /// `kind amp_flag amplitude step group [coeff]`.
    ///
    /// `kind` is 0 for a velocity coefficient (six fields, the last being
    /// the coefficient index), 1 for a group thickness and -1 for a vp/vs
    /// ratio (five fields each). `amp_flag` 1 marks an absolute amplitude,
    /// anything else a relative one in percent. Values start at zero and
    /// bounds uninitialized.
    pub fn read_descriptors_txt(filename: &PathBuf) -> Result<ParameterSet, ParamLoadError> {
        let file = File::open(filename)?;
        let mut set = ParameterSet::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let lineno = lineno + 1;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let kind_tag: i64 = parse_field(lineno, 1, fields[0])?;
            let expected = match kind_tag {
                0 => 6,
                1 | -1 => 5,
                other => {
                    return Err(ParamLoadError::UnsupportedParameterKind {
                        line: lineno,
                        kind: other,
                    })
                }
            };
            if fields.len() != expected {
                return Err(ParamLoadError::FieldCount {
                    line: lineno,
                    expected,
                    found: fields.len(),
                });
            }
            let amp_flag: i64 = parse_field(lineno, 2, fields[1])?;
            let amplitude_value: f64 = parse_field(lineno, 3, fields[2])?;
            let step: f64 = parse_field(lineno, 4, fields[3])?;
            let group = GroupIndex(parse_field(lineno, 5, fields[4])?);
            let kind = match kind_tag {
                0 => ParamKind::VelocityCoefficient {
                    group,
                    coeff: CoeffIndex(parse_field(lineno, 6, fields[5])?),
                },
                1 => ParamKind::GroupThickness { group },
                _ => ParamKind::VpVsRatio { group },
            };
            let amplitude = if amp_flag == 1 {
                Amplitude::Absolute(amplitude_value)
            } else {
                Amplitude::Relative(amplitude_value)
            };
            set.push(ParamDescriptor {
                kind,
                amplitude,
                step,
            });
        }
        debug!("read {} perturbation parameters", set.len());
        Ok(set)
    }
}

fn parse_field<T: FromStr>(line: usize, field: usize, token: &str) -> Result<T, ParamLoadError> {
    token.parse::<T>().map_err(|_| ParamLoadError::ParseField {
        line,
        field,
        token: token.to_string(),
    })
}

#[derive(Error, Debug)]
pub enum ProposalError {
    #[error("parameter space for perturbation has not been initialized yet")]
    BoundsNotInitialized,
    #[error("no in-bounds Gaussian draw for parameter {index} after {attempts} attempts")]
    ExhaustedRetries { index: usize, attempts: usize },
    #[error("invalid Gaussian step {step} for parameter {index}")]
    InvalidStep { index: usize, step: f64 },
    #[error("parameter index {index} is out of range (npara = {npara})")]
    IndexOutOfRange { index: usize, npara: usize },
    #[error("parameter {index} bounds are inverted: [{min}, {max}]")]
    InvalidBounds { index: usize, min: f64, max: f64 },
}

#[derive(Error, Debug)]
pub enum ParamLoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("line {line}: cannot parse value '{token}'")]
    ParseValue { line: usize, token: String },
    #[error("line {line}, field {field}: cannot parse '{token}'")]
    ParseField {
        line: usize,
        field: usize,
        token: String,
    },
    #[error("line {line}: expected {expected} fields, got {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: unsupported parameter kind tag {kind}")]
    UnsupportedParameterKind { line: usize, kind: i64 },
    #[error("expected {expected} values but file contains {found}")]
    CountMismatch { expected: usize, found: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn three_param_set() -> ParameterSet {
        let mut set = ParameterSet::new();
        for j in 0..3 {
            set.push(ParamDescriptor {
                kind: ParamKind::VelocityCoefficient {
                    group: GroupIndex(0),
                    coeff: CoeffIndex(j),
                },
                amplitude: Amplitude::Relative(20.),
                step: 0.05,
            });
        }
        set
    }

    #[test]
    fn test_propose_requires_bounds() {
        let mut set = three_param_set();
        let mut rng = SmallRng::seed_from_u64(7);
        assert!(matches!(
            set.propose(ProposalPolicy::Uniform, &mut rng),
            Err(ProposalError::BoundsNotInitialized)
        ));
    }

    #[test]
    fn test_uniform_stays_in_bounds() {
        let mut set = three_param_set();
        for i in 0..set.len() {
            set.set_bounds(i, 1.0 + i as f64, 2.0 + i as f64, 0.05).unwrap();
        }
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..100 {
            set.propose(ProposalPolicy::Uniform, &mut rng).unwrap();
            for i in 0..set.len() {
                let (min, max, _) = set.bounds(i).unwrap();
                assert!(set.value(i) >= min && set.value(i) <= max);
            }
        }
    }

    #[test]
    fn test_gaussian_stays_in_bounds() {
        let mut set = three_param_set();
        for i in 0..set.len() {
            set.set_bounds(i, 0.0, 1.0, 0.5).unwrap();
            set.set_value(i, 0.5);
        }
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..100 {
            set.propose(ProposalPolicy::Gaussian, &mut rng).unwrap();
            for i in 0..set.len() {
                assert!(set.value(i) >= 0.0 && set.value(i) <= 1.0);
            }
        }
    }

    #[test]
    fn test_gaussian_retries_exhaust() {
        let mut set = three_param_set();
        for i in 0..set.len() {
            set.set_bounds(i, 0.0, 1.0, 1e-3).unwrap();
        }
        // a current value this far outside the bounds can never be pulled
        // back in by a 1e-3 sigma
        set.set_value(0, 1e8);
        let mut rng = SmallRng::seed_from_u64(11);
        assert!(matches!(
            set.propose(ProposalPolicy::Gaussian, &mut rng),
            Err(ProposalError::ExhaustedRetries {
                index: 0,
                attempts: MAX_GAUSSIAN_DRAWS
            })
        ));
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let mut set = three_param_set();
        assert!(matches!(
            set.set_bounds(0, 2.0, 1.0, 0.05),
            Err(ProposalError::InvalidBounds { .. })
        ));
        assert!(matches!(
            set.set_bounds(5, 0.0, 1.0, 0.05),
            Err(ProposalError::IndexOutOfRange { index: 5, npara: 3 })
        ));
    }

    #[test]
    fn test_value_txt_round_trip() {
        let dir = std::env::temp_dir().join("mcinv-param-test-values");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("paraval.txt");
        let mut set = three_param_set();
        set.set_value(0, 1.25);
        set.set_value(1, -0.5);
        set.set_value(2, 3.75e-2);
        set.write_values_txt(&path).unwrap();
        let mut restored = three_param_set();
        restored.read_values_txt(&path).unwrap();
        assert_eq!(restored.values(), set.values());
    }

    #[test]
    fn test_descriptor_txt_rejects_unknown_kind() {
        let dir = std::env::temp_dir().join("mcinv-param-test-desc");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("para.txt");
        std::fs::write(&path, "0 1 1.0 0.05 0 0\n7 1 1.0 0.05 0\n").unwrap();
        assert!(matches!(
            ParameterSet::read_descriptors_txt(&path),
            Err(ParamLoadError::UnsupportedParameterKind { line: 2, kind: 7 })
        ));
    }

    #[test]
    fn test_descriptor_txt_reads_layout() {
        let dir = std::env::temp_dir().join("mcinv-param-test-desc2");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("para.txt");
        std::fs::write(&path, "0 1 1.0 0.05 0 0\n0 -1 20.0 0.05 1 2\n1 -1 20.0 1.0 1\n").unwrap();
        let set = ParameterSet::read_descriptors_txt(&path).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(
            set.descriptors()[1].kind,
            ParamKind::VelocityCoefficient {
                group: GroupIndex(1),
                coeff: CoeffIndex(2)
            }
        );
        assert_eq!(
            set.descriptors()[2].kind,
            ParamKind::GroupThickness {
                group: GroupIndex(1)
            }
        );
        assert!(!set.bounds_ready());
    }
}
