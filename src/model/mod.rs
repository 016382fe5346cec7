// mcinv-param/src/model/mod.rs

mod errors;
mod group;
mod mapping;
mod model;
mod reader;
mod reference;

pub use errors::{GroupConfigError, MappingError, ModelExpandError, ModelLoadError};
pub use group::{
    layer_count_policy, ModelGroup, Parameterization, DEFAULT_MAX_LAYERS, MAX_SPLINE_BASES,
};
pub use model::{LayeredModel, LayeredProfile};
pub use reader::load_model_txt;
pub use reference::{parameterize_reference_profile, ReferenceFitError, REFERENCE_MAX_DEPTH};
