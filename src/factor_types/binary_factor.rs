use std::fmt::Display;

use ndarray::Array2;

// The joint compatibility between two discrete variables, stored as a dense
// table of log values. In the denoising model a single instance serves as the
// shared, read-only smoothness prior over every neighboring pixel pair, but
// the algebra supports distinct arities per side.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryFactor {
    var1: usize,
    var2: usize,
    log_values: Array2<f64>,
}

impl BinaryFactor {
    // Creates a factor over the given variable pair with all log values set to zero
    pub fn new(var1: usize, arity1: usize, var2: usize, arity2: usize) -> Self {
        assert!(
            arity1 > 0 && arity2 > 0,
            "Binary factor must have positive arities."
        );
        BinaryFactor {
            var1,
            var2,
            log_values: Array2::zeros((arity1, arity2)),
        }
    }

    pub fn var1(&self) -> usize {
        self.var1
    }

    pub fn var2(&self) -> usize {
        self.var2
    }

    pub fn arity1(&self) -> usize {
        self.log_values.nrows()
    }

    pub fn arity2(&self) -> usize {
        self.log_values.ncols()
    }

    pub fn log_value(&self, state1: usize, state2: usize) -> f64 {
        self.log_values[(state1, state2)]
    }

    pub fn set_log_value(&mut self, state1: usize, state2: usize, value: f64) {
        self.log_values[(state1, state2)] = value;
    }

    // Potts-style agreement prior: zero on the diagonal, -lambda off it.
    // Larger lambda means stronger coupling between neighbors.
    pub fn set_as_agreement(&mut self, lambda: f64) {
        for ((state1, state2), value) in self.log_values.indexed_iter_mut() {
            *value = if state1 == state2 { 0. } else { -lambda };
        }
    }

    // Laplace prior: -lambda * |i - j|, growing linearly with state distance.
    // Softer and heavier-tailed than the agreement prior.
    pub fn set_as_laplace(&mut self, lambda: f64) {
        for ((state1, state2), value) in self.log_values.indexed_iter_mut() {
            *value = -lambda * (state1 as f64 - state2 as f64).abs();
        }
    }
}

impl Display for BinaryFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in self.log_values.rows() {
            writeln!(
                f,
                "{}",
                row.iter()
                    .map(|&value| value.to_string())
                    .collect::<Vec<String>>()
                    .join(" ")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn agreement_prior_penalizes_disagreement_uniformly() {
        let mut factor = BinaryFactor::new(0, 3, 1, 3);
        factor.set_as_agreement(2.5);
        for state1 in 0..3 {
            for state2 in 0..3 {
                let expected = if state1 == state2 { 0. } else { -2.5 };
                assert_relative_eq!(factor.log_value(state1, state2), expected);
            }
        }
    }

    #[test]
    fn laplace_prior_grows_linearly_with_state_distance() {
        let mut factor = BinaryFactor::new(0, 4, 1, 4);
        factor.set_as_laplace(1.5);
        assert_relative_eq!(factor.log_value(0, 0), 0.);
        assert_relative_eq!(factor.log_value(0, 3), -4.5);
        assert_relative_eq!(factor.log_value(3, 1), -3.);
        assert_relative_eq!(factor.log_value(2, 1), factor.log_value(1, 2));
    }

    #[test]
    fn distinct_arities_per_side_are_supported() {
        let factor = BinaryFactor::new(0, 2, 1, 5);
        assert_eq!(factor.arity1(), 2);
        assert_eq!(factor.arity2(), 5);
    }
}
