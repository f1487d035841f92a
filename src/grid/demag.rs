//! In-plane demagnetization coefficient tables for the brute-force internal
//! routine. Grounded in `Grid2D::Initialize`'s default (`CYL_COEFS`) branch:
//! each column of cells is treated as a thin cylinder, giving the closed
//! form
//!
//!   A(i,k) = (i^2 - k^2) / (2*pi*(i^2+k^2)^2)
//!   C(i,k) = 2*i*k       / (2*pi*(i^2+k^2)^2)
//!
//! (cell size cancels out of both numerator and denominator) with a fixed
//! self-demag term `-pi/6`. The source also carries `PAPER_COEFS` and
//! `SQUARE_COEFS` alternatives selected at compile time; only the default
//! is reproduced here (see DESIGN.md).

use ndarray::Array2;
use std::f64::consts::PI;

pub struct DemagKernel {
    a_coef: Array2<f64>,
    c_coef: Array2<f64>,
    pub self_demag: f64,
}

impl DemagKernel {
    pub fn new(nx: usize, nz: usize) -> DemagKernel {
        let mut a_coef = Array2::zeros((nx, nz));
        let mut c_coef = Array2::zeros((nx, nz));
        for i in 0..nx {
            for k in 0..nz {
                if i == 0 && k == 0 {
                    continue;
                }
                let (fi, fk) = (i as f64, k as f64);
                let denom = 2.0 * PI * (fi * fi + fk * fk).powi(2);
                a_coef[[i, k]] = (fi * fi - fk * fk) / denom;
                c_coef[[i, k]] = 2.0 * fi * fk / denom;
            }
        }
        DemagKernel { a_coef, c_coef, self_demag: -PI / 6.0 }
    }

    /// `A` evaluated at signed offset `(di, dk)`; symmetric under sign flips
    /// of either argument.
    pub fn a(&self, di: i64, dk: i64) -> f64 {
        self.a_coef[[di.unsigned_abs() as usize, dk.unsigned_abs() as usize]]
    }

    /// `C` evaluated at signed offset `(di, dk)`; antisymmetric under a
    /// single sign flip, symmetric under flipping both.
    pub fn c(&self, di: i64, dk: i64) -> f64 {
        let sign = if (di < 0) != (dk < 0) { -1.0 } else { 1.0 };
        sign * self.c_coef[[di.unsigned_abs() as usize, dk.unsigned_abs() as usize]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_is_symmetric_under_sign_flip_of_either_axis() {
        let k = DemagKernel::new(6, 6);
        assert_eq!(k.a(2, 3), k.a(-2, 3));
        assert_eq!(k.a(2, 3), k.a(2, -3));
        assert_eq!(k.a(2, 3), k.a(-2, -3));
    }

    #[test]
    fn c_is_antisymmetric_under_a_single_sign_flip() {
        let k = DemagKernel::new(6, 6);
        assert_eq!(k.c(2, 3), -k.c(-2, 3));
        assert_eq!(k.c(2, 3), -k.c(2, -3));
        assert_eq!(k.c(2, 3), k.c(-2, -3));
    }

    #[test]
    fn self_demag_is_minus_pi_over_six() {
        let k = DemagKernel::new(4, 4);
        assert!((k.self_demag - (-PI / 6.0)).abs() < 1e-12);
    }
}
