// mcinv-param/src/model/errors.rs

use crate::bspline::BasisError;
use crate::para::ProposalError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GroupConfigError {
    #[error("group index {index} is out of range (nmod = {nmod})")]
    GroupIndexOutOfRange { index: usize, nmod: usize },
    #[error("group thickness must be positive, but got {0}")]
    NonPositiveThickness(f64),
    #[error("water groups take exactly one coefficient (the water Vp), but got {0}")]
    WaterCoefficientCount(usize),
    #[error("gradient groups take exactly two coefficients (top and bottom Vs), but got {0}")]
    GradientCoefficientCount(usize),
    #[error("layered groups need one ratio per coefficient, but got {coefficients} coefficients and {ratios} ratios")]
    RatioCountMismatch { coefficients: usize, ratios: usize },
    #[error("layer ratios must sum to 1, but sum to {0}")]
    RatioSumMismatch(f64),
    #[error("layer ratios are only meaningful for layered groups")]
    UnexpectedRatios,
    #[error("groups need at least one coefficient")]
    EmptyCoefficients,
}

#[derive(Error, Debug)]
pub enum ModelExpandError {
    #[error("group {group} expands to {layer_count} layers, which exceeds the {max} layer budget")]
    LayerBudgetExceeded {
        group: usize,
        layer_count: usize,
        max: usize,
    },
    #[error("group {group} needs {count} spline bases, which exceeds the {max} basis budget")]
    TooManySplineBases {
        group: usize,
        count: usize,
        max: usize,
    },
    #[error(transparent)]
    Basis(#[from] BasisError),
}

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("parameter {index} points at group {group}, but the model has {nmod} groups")]
    GroupOutOfRange {
        index: usize,
        group: usize,
        nmod: usize,
    },
    #[error(
        "parameter {index} points at coefficient {coeff} of group {group}, which has {count} coefficients"
    )]
    CoeffOutOfRange {
        index: usize,
        group: usize,
        coeff: usize,
        count: usize,
    },
    #[error(transparent)]
    Bounds(#[from] ProposalError),
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("line {line}: expected at least 4 header fields, got {found}")]
    TruncatedLine { line: usize, found: usize },
    #[error("line {line}, field {field}: cannot parse '{token}'")]
    ParseField {
        line: usize,
        field: usize,
        token: String,
    },
    #[error("line {line}: unknown parameterization flag {flag}")]
    UnknownTypeFlag { line: usize, flag: i64 },
    #[error("line {line}: expected {expected} fields for this group spec, got {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: {source}")]
    Config {
        line: usize,
        source: GroupConfigError,
    },
}
