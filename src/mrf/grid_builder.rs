use std::str::FromStr;

use log::debug;

use crate::{
    error::DenoiseError,
    factor_types::{binary_factor::BinaryFactor, unary_factor::UnaryFactor},
    img::Image,
};

use super::pairwise_mrf::PairwiseMarkovRandomField;

// The shape of the shared smoothness prior over neighboring pixel pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothingKind {
    Square,
    Laplace,
}

impl FromStr for SmoothingKind {
    type Err = DenoiseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "square" => Ok(SmoothingKind::Square),
            "laplace" => Ok(SmoothingKind::Laplace),
            other => Err(DenoiseError::UnknownSmoothing(other.to_string())),
        }
    }
}

// Builds the shared edge-compatibility factor. Lambda controls smoothing
// strength: larger lambda means stronger coupling between neighbors.
pub fn smoothness_prior(
    kind: SmoothingKind,
    colors: usize,
    lambda: f64,
) -> Result<BinaryFactor, DenoiseError> {
    if colors == 0 {
        return Err(DenoiseError::ZeroColors);
    }
    // Dummy variables 0 and 1: the factor is shared by every edge
    let mut prior = BinaryFactor::new(0, colors, 1, colors);
    match kind {
        SmoothingKind::Square => prior.set_as_agreement(lambda),
        SmoothingKind::Laplace => prior.set_as_laplace(lambda),
    }
    Ok(prior)
}

// Constructs the denoising pairwise Markov random field from the noisy
// observation: one vertex per pixel whose potential is a discretized
// Gaussian likelihood around the observed value, and a directed edge pair
// per 4-neighbor adjacency with uniform initial messages.
pub fn build_grid_mrf(
    img: &Image,
    colors: usize,
    sigma: f64,
) -> Result<PairwiseMarkovRandomField, DenoiseError> {
    if colors == 0 {
        return Err(DenoiseError::ZeroColors);
    }
    if sigma <= 0. {
        return Err(DenoiseError::NonPositiveSigma(sigma));
    }

    let num_vertices = img.num_pixels();
    // Four directed edges per cell minus the missing ones along the borders
    let num_edges = 4 * num_vertices - 2 * (img.rows() + img.cols());
    let mut mrf = PairwiseMarkovRandomField::with_capacity(num_vertices, num_edges);

    let two_sigma_sq = 2. * sigma * sigma;
    for row in 0..img.rows() {
        for col in 0..img.cols() {
            let pixel_id = img.vertid(row, col);
            let observed = img.pixel(row, col);
            let mut potential = UnaryFactor::new(pixel_id, colors);
            for state in 0..colors {
                potential[state] = -(observed - state as f64).powi(2) / two_sigma_sq;
            }
            potential.normalize();
            let vertex = mrf.add_vertex(potential);
            assert_eq!(
                vertex, pixel_id,
                "Vertex numbering must match the image's row-major numbering."
            );
        }
    }

    for row in 0..img.rows() {
        for col in 0..img.cols() {
            let vertex = img.vertid(row, col);
            if row > 0 {
                mrf.add_edge(vertex, img.vertid(row - 1, col));
            }
            if row + 1 < img.rows() {
                mrf.add_edge(vertex, img.vertid(row + 1, col));
            }
            if col > 0 {
                mrf.add_edge(vertex, img.vertid(row, col - 1));
            }
            if col + 1 < img.cols() {
                mrf.add_edge(vertex, img.vertid(row, col + 1));
            }
        }
    }
    mrf.finalize();

    debug!(
        "Constructed grid MRF with {} vertices and {} directed edges",
        mrf.num_vertices(),
        mrf.num_edges()
    );
    Ok(mrf)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn constant_image(rows: usize, cols: usize, value: f64) -> Image {
        let mut img = Image::new(rows, cols);
        for id in 0..img.num_pixels() {
            img.set_pixel_by_id(id, value);
        }
        img
    }

    #[test]
    fn grid_has_one_vertex_per_pixel_and_directed_edge_pairs() {
        let img = constant_image(3, 4, 1.);
        let mrf = build_grid_mrf(&img, 5, 2.).unwrap();
        assert_eq!(mrf.num_vertices(), 12);
        // 3x4 grid: 17 undirected adjacencies, two directed edges each
        assert_eq!(mrf.num_edges(), 34);
        assert!(mrf.is_finalized());
    }

    #[test]
    fn interior_vertices_have_four_neighbors_and_corners_two() {
        let img = constant_image(3, 3, 0.);
        let mrf = build_grid_mrf(&img, 2, 1.).unwrap();
        assert_eq!(mrf.in_edges(4).count(), 4);
        assert_eq!(mrf.out_edges(4).count(), 4);
        assert_eq!(mrf.in_edges(0).count(), 2);
        assert_eq!(mrf.out_edges(8).count(), 2);
    }

    #[test]
    fn potential_peaks_at_the_observed_value() {
        let img = constant_image(1, 2, 3.);
        let mrf = build_grid_mrf(&img, 5, 1.).unwrap();
        for vertex in 0..mrf.num_vertices() {
            assert_eq!(mrf.potential(vertex).max_asg(), 3);
        }
    }

    #[test]
    fn potential_is_a_normalized_discretized_gaussian() {
        let img = constant_image(1, 1, 1.5);
        let mrf = build_grid_mrf(&img, 4, 2.).unwrap();
        let potential = mrf.potential(0);
        let sum: f64 = (0..potential.arity()).map(|s| potential[s].exp()).sum();
        assert_relative_eq!(sum, 1., epsilon = 1e-12);
        // Equidistant states get equal probability
        assert_relative_eq!(potential[1], potential[2], epsilon = 1e-12);
        assert!(potential[1] > potential[0]);
    }

    #[test]
    fn zero_colors_is_a_configuration_error() {
        let img = constant_image(2, 2, 0.);
        assert!(matches!(
            build_grid_mrf(&img, 0, 1.),
            Err(DenoiseError::ZeroColors)
        ));
    }

    #[test]
    fn non_positive_sigma_is_a_configuration_error() {
        let img = constant_image(2, 2, 0.);
        assert!(matches!(
            build_grid_mrf(&img, 3, 0.),
            Err(DenoiseError::NonPositiveSigma(_))
        ));
    }

    #[test]
    fn unknown_smoothing_kind_is_rejected() {
        assert!(matches!(
            "potts".parse::<SmoothingKind>(),
            Err(DenoiseError::UnknownSmoothing(_))
        ));
        assert_eq!("square".parse::<SmoothingKind>().unwrap(), SmoothingKind::Square);
        assert_eq!("laplace".parse::<SmoothingKind>().unwrap(), SmoothingKind::Laplace);
    }
}
