pub mod factor_types {
    pub mod binary_factor;
    pub mod unary_factor;
}

pub mod mrf {
    pub mod grid_builder;
    pub mod pairwise_mrf;
}

pub mod alg {
    pub mod bp_update;
    pub mod engine;
    pub mod residual_queue;
}

pub mod error;
pub mod img;

pub use alg::{
    bp_update::{bp_update, SharedParams},
    engine::{EngineOptions, ResidualEngine, RunStats},
    residual_queue::ResidualQueue,
};
pub use error::DenoiseError;
pub use factor_types::{binary_factor::BinaryFactor, unary_factor::UnaryFactor};
pub use img::Image;
pub use mrf::{
    grid_builder::{build_grid_mrf, smoothness_prior, SmoothingKind},
    pairwise_mrf::PairwiseMarkovRandomField,
};
