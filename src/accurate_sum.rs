//! Compensated summation.
//!
//! `accurate_sum` is the Rust counterpart of OOMMF's `Oxs_AccurateSum`: sort
//! the input by decreasing absolute value, then run a Kahan-Neumaier
//! (improved Kahan) compensated sum. The Newell closed-form tensor integrals
//! are each a signed sum of 27 corner terms whose individual magnitudes can
//! be many orders larger than the final result; routing every such sum
//! through this routine is what keeps 10+ decimal digits from being eaten by
//! cancellation.
//!
//! `XpFloat` is a minimal double-double (pair-of-`f64`) accumulator, the
//! counterpart of OOMMF's `Nb_Xpfloat`, used where a single running `f64`
//! total isn't enough (grid energy accumulation in
//! `grid::GridCore::calculate_energy`).

/// Sum an unordered slice of `f64` with a doubly-compensated algorithm,
/// after sorting by decreasing absolute value. Guarantees error behavior
/// better than `4*EPSILON*sum(|x_i|)` in practice.
pub fn accurate_sum(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_unstable_by(|a, b| {
        b.abs()
            .partial_cmp(&a.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut sum = sorted[0];
    let mut corr = 0.0_f64;
    for &v in &sorted[1..] {
        let u = v - corr;
        let t = sum + u;
        // Neumaier refinement: track whichever operand the addition
        // swallowed the low bits of.
        corr = if sum.abs() >= u.abs() {
            (sum - t) + u
        } else {
            (u - t) + sum
        };
        sum = t;
    }
    sum - corr
}

/// Double-double (high, low) extended-precision accumulator. Not a full
/// double-double arithmetic type (only the operations the core needs:
/// accumulate, scale-and-accumulate, read back), but sufficient to avoid the
/// mantissa loss a bare `long double`/`f64` total suffers across the ~N^2
/// additions in a demag-energy sum.
#[derive(Debug, Copy, Clone, Default)]
pub struct XpFloat {
    hi: f64,
    lo: f64,
}

impl XpFloat {
    pub fn new() -> XpFloat {
        XpFloat { hi: 0.0, lo: 0.0 }
    }

    /// Two-sum accumulate: adds `x` to the running total, folding the
    /// rounding error back into the low word.
    pub fn accum(&mut self, x: f64) {
        let t = self.hi + x;
        let err = if self.hi.abs() >= x.abs() {
            (self.hi - t) + x
        } else {
            (x - t) + self.hi
        };
        self.hi = t;
        self.lo += err;
    }

    pub fn value(&self) -> f64 {
        self.hi + self.lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accurate_sum_cancels_large_terms() {
        let arr = [1e16, 1.0, -1e16];
        // Naive left-to-right summation loses the 1.0 entirely; accurate_sum
        // does not because it sorts by decreasing magnitude and tracks the
        // compensation term.
        assert_eq!(accurate_sum(&arr), 1.0);
    }

    #[test]
    fn accurate_sum_empty_is_zero() {
        assert_eq!(accurate_sum(&[]), 0.0);
    }

    #[test]
    fn xpfloat_matches_accurate_sum_on_moderate_inputs() {
        let arr = [0.1, 0.2, 0.3, -0.05, 1e-3];
        let mut acc = XpFloat::new();
        for &v in &arr {
            acc.accum(v);
        }
        let expected = accurate_sum(&arr);
        assert!((acc.value() - expected).abs() < 1e-12);
    }
}
