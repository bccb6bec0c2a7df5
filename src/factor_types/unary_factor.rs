use std::{
    fmt::Display,
    ops::{Index, IndexMut},
};

use super::binary_factor::BinaryFactor;

// A discrete, possibly unnormalized distribution over a single variable,
// stored in log space. Products and quotients of probabilities are carried
// out as sums and differences of logs; exponentiation happens only at the
// normalize/residual/max_asg/expectation boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryFactor {
    var: usize,
    log_values: Vec<f64>,
}

impl UnaryFactor {
    // Creates a factor over the given variable with all log values set to zero
    pub fn new(var: usize, arity: usize) -> Self {
        assert!(arity > 0, "Unary factor must have positive arity.");
        UnaryFactor {
            var,
            log_values: vec![0.; arity],
        }
    }

    // Creates a maximally uncertain factor: every entry is log(1 / arity)
    pub fn uniform(var: usize, arity: usize) -> Self {
        assert!(arity > 0, "Unary factor must have positive arity.");
        UnaryFactor {
            var,
            log_values: vec![-(arity as f64).ln(); arity],
        }
    }

    // Returns the variable this factor is defined over
    pub fn var(&self) -> usize {
        self.var
    }

    // Returns the number of states of the underlying variable
    pub fn arity(&self) -> usize {
        self.log_values.len()
    }

    // Resets every entry to log(1 / arity)
    pub fn set_uniform(&mut self) {
        let log_value = -(self.arity() as f64).ln();
        self.log_values.iter_mut().for_each(|v| *v = log_value);
    }

    // Shifts log values so that the exponentiated entries sum to one.
    // Computed stably by subtracting the maximum before exponentiating.
    // Panics on a degenerate factor whose entries are all non-finite:
    // that signals an upstream construction or damping bug.
    pub fn normalize(&mut self) {
        let max = self
            .log_values
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        assert!(
            max.is_finite(),
            "Degenerate unary factor for variable {}: all log values are non-finite in normalize().",
            self.var
        );
        let log_z = max
            + self
                .log_values
                .iter()
                .map(|v| (v - max).exp())
                .sum::<f64>()
                .ln();
        self.log_values.iter_mut().for_each(|v| *v -= log_z);
    }

    // Log-domain product: adds the other factor's log values element-wise
    pub fn times(&mut self, other: &UnaryFactor) {
        self.assert_compatible(other, "times");
        for (value, other_value) in self.log_values.iter_mut().zip(other.log_values.iter()) {
            *value += other_value;
        }
    }

    // Log-domain quotient: subtracts the other factor's log values element-wise.
    // Dividing a belief by one incoming message recovers the cavity, i.e.,
    // the product of the potential and all other incoming messages.
    pub fn divide(&mut self, other: &UnaryFactor) {
        self.assert_compatible(other, "divide");
        for (value, other_value) in self.log_values.iter_mut().zip(other.log_values.iter()) {
            *value -= other_value;
        }
    }

    // Marginalizes `other` through the pairwise compatibility, storing the
    // result over this factor's (target) variable:
    // log_values[j] = log sum_i exp(binary[i][j] + other[i]).
    // O(arity^2) per call; this is the message-passing step.
    pub fn convolve(&mut self, binary: &BinaryFactor, other: &UnaryFactor) {
        assert_eq!(
            binary.arity1(),
            other.arity(),
            "Binary factor's first arity must match the source factor's arity."
        );
        assert_eq!(
            binary.arity2(),
            self.arity(),
            "Binary factor's second arity must match the target factor's arity."
        );
        for target_state in 0..self.arity() {
            let max = (0..other.arity())
                .map(|source_state| {
                    binary.log_value(source_state, target_state) + other.log_values[source_state]
                })
                .fold(f64::NEG_INFINITY, f64::max);
            self.log_values[target_state] = if max.is_finite() {
                max + (0..other.arity())
                    .map(|source_state| {
                        (binary.log_value(source_state, target_state)
                            + other.log_values[source_state]
                            - max)
                            .exp()
                    })
                    .sum::<f64>()
                    .ln()
            } else {
                f64::NEG_INFINITY
            };
        }
    }

    // Linear interpolation in probability space between this factor and a
    // previous one, re-logged: new = factor * exp(previous) + (1 - factor) * exp(self).
    // Damping stabilizes the fixed point in cyclic graphs where pure updates
    // can oscillate or diverge.
    pub fn damp(&mut self, previous: &UnaryFactor, factor: f64) {
        self.assert_compatible(previous, "damp");
        assert!(
            (0. ..=1.).contains(&factor),
            "Damping factor must lie in [0, 1], got {}.",
            factor
        );
        if factor == 0. {
            return;
        }
        if factor == 1. {
            self.log_values.copy_from_slice(&previous.log_values);
            return;
        }
        for (value, previous_value) in self.log_values.iter_mut().zip(previous.log_values.iter()) {
            let max = value.max(*previous_value);
            if !max.is_finite() {
                continue;
            }
            *value = max
                + (factor * (previous_value - max).exp() + (1. - factor) * (*value - max).exp())
                    .ln();
        }
    }

    // Mean L1 distance between the two factors' normalized probability
    // vectors. Used purely as a convergence/priority signal.
    pub fn residual(&self, other: &UnaryFactor) -> f64 {
        self.assert_compatible(other, "residual");
        let mut this = self.clone();
        this.normalize();
        let mut that = other.clone();
        that.normalize();
        this.log_values
            .iter()
            .zip(that.log_values.iter())
            .map(|(a, b)| (a.exp() - b.exp()).abs())
            .sum::<f64>()
            / self.arity() as f64
    }

    // Returns the state index maximizing the log values (MAP read-out)
    pub fn max_asg(&self) -> usize {
        let mut max_state = 0;
        for state in 1..self.arity() {
            if self.log_values[state] > self.log_values[max_state] {
                max_state = state;
            }
        }
        max_state
    }

    // Returns the expected state value sum_i i * p_i over the normalized
    // probabilities (mean read-out)
    pub fn expectation(&self) -> f64 {
        let max = self
            .log_values
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        assert!(
            max.is_finite(),
            "Degenerate unary factor for variable {}: all log values are non-finite in expectation().",
            self.var
        );
        let mut sum = 0.;
        let mut weighted_sum = 0.;
        for (state, value) in self.log_values.iter().enumerate() {
            let probability = (value - max).exp();
            sum += probability;
            weighted_sum += state as f64 * probability;
        }
        weighted_sum / sum
    }

    fn assert_compatible(&self, other: &UnaryFactor, operation: &str) {
        assert_eq!(
            self.var, other.var,
            "Unary factors in {}() must be defined over the same variable.",
            operation
        );
        assert_eq!(
            self.arity(),
            other.arity(),
            "Unary factors in {}() must have the same arity.",
            operation
        );
    }
}

impl Display for UnaryFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.log_values
                .iter()
                .map(|&value| value.to_string())
                .collect::<Vec<String>>()
                .join(" ")
        )
    }
}

impl Index<usize> for UnaryFactor {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.log_values[index]
    }
}

impl IndexMut<usize> for UnaryFactor {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.log_values[index]
    }
}
