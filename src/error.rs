use thiserror::Error;

// Configuration and I/O errors, all detected before or outside the update
// loop. Numeric degeneracy inside the update loop is an invariant violation
// and panics with context instead.
#[derive(Debug, Error)]
pub enum DenoiseError {
    #[error("unknown smoothing kind `{0}`, expected `square` or `laplace`")]
    UnknownSmoothing(String),

    #[error("unknown prediction kind `{0}`, expected `map` or `exp`")]
    UnknownPrediction(String),

    #[error("number of colors must be positive")]
    ZeroColors,

    #[error("noise standard deviation must be positive, got {0}")]
    NonPositiveSigma(f64),

    #[error("damping factor must lie in [0, 1], got {0}")]
    DampingOutOfRange(f64),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}
