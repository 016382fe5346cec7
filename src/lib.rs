use pretty_env_logger;
use std::sync::Once;

static INIT: Once = Once::new();

pub fn _setup_pretty_env_logger_default() {
    INIT.call_once(|| {
        pretty_env_logger::init();
    });
}

pub use model::{LayeredModel, LayeredProfile};
pub use para::ParameterSet;
pub mod bspline;
pub mod model;
pub mod para;
