//! Closed-form analytic demagnetization-tensor kernel (Newell et al., 1993).
//!
//! `newell_f`/`newell_g` are the two scalar potentials such that every
//! component `Nab(r; delta)` of the demag tensor between two uniformly
//! magnetized rectangular prisms is a fixed, signed 27-term sum of one of
//! them evaluated at corner offsets `(x +/- dx, y +/- dy, z +/- dz)`. Every
//! such sum is routed through `accurate_sum` because the individual terms
//! can be many orders of magnitude larger than the final (heavily
//! cancelling) result.

use crate::accurate_sum::accurate_sum;

/// `f(x,y,z)`, the potential underlying the three diagonal components
/// `Nxx, Nyy, Nzz`. Even in all three arguments.
pub fn newell_f(x: f64, y: f64, z: f64) -> f64 {
    let x = x.abs();
    let y = y.abs();
    let z = z.abs();
    let xsq = x * x;
    let ysq = y * y;
    let zsq = z * z;

    let rsq = xsq + ysq + zsq;
    if rsq <= 0.0 {
        return 0.0;
    }
    let r = rsq.sqrt();

    let mut piece = [0.0_f64; 8];
    let mut n = 0;
    if z > 0.0 {
        piece[n] = 2.0 * (2.0 * xsq - ysq - zsq) * r;
        n += 1;
        let txyz = x * y * z;
        if txyz > 0.0 {
            piece[n] = -12.0 * txyz * (y * z).atan2(x * r);
            n += 1;
        }
        let temp2 = xsq + zsq;
        if y > 0.0 && temp2 > 0.0 {
            let dummy = (2.0 * y * (y + r) / temp2).ln_1p();
            piece[n] = 3.0 * y * (zsq - xsq) * dummy;
            n += 1;
        }
        let temp3 = xsq + ysq;
        if temp3 > 0.0 {
            let dummy = (2.0 * z * (z + r) / temp3).ln_1p();
            piece[n] = 3.0 * z * (ysq - xsq) * dummy;
            n += 1;
        }
    } else if x == y {
        // z == 0, x == y: closed form avoids a 0/0 in the general branch.
        const K: f64 = 2.0 * std::f64::consts::SQRT_2 - 6.0 * 2.414_213_562_373_095_f64.ln();
        piece[n] = K * xsq * x;
        n += 1;
    } else {
        piece[n] = 2.0 * (2.0 * xsq - ysq) * r;
        n += 1;
        if y > 0.0 && x > 0.0 {
            piece[n] = -3.0 * y * xsq * (2.0 * y * (y + r) / (x * x)).ln_1p();
            n += 1;
        }
    }

    accurate_sum(&piece[..n]) / 12.0
}

/// `g(x,y,z)`, the potential underlying the three off-diagonal components
/// `Nxy, Nxz, Nyz`. Even in z, odd in x and y.
pub fn newell_g(x: f64, y: f64, z: f64) -> f64 {
    let mut sign = 1.0_f64;
    if x < 0.0 {
        sign = -sign;
    }
    if y < 0.0 {
        sign = -sign;
    }
    let x = x.abs();
    let y = y.abs();
    let z = z.abs();
    let xsq = x * x;
    let ysq = y * y;
    let zsq = z * z;

    let rsq = xsq + ysq + zsq;
    if rsq <= 0.0 {
        return 0.0;
    }
    let r = rsq.sqrt();

    let mut piece = [0.0_f64; 7];
    let mut n = 0;
    piece[n] = -2.0 * x * y * r;
    n += 1;
    if z > 0.0 {
        piece[n] = -z * zsq * (x * y).atan2(z * r);
        n += 1;
        piece[n] = -3.0 * z * ysq * (x * z).atan2(y * r);
        n += 1;
        piece[n] = -3.0 * z * xsq * (y * z).atan2(x * r);
        n += 1;

        let temp1 = xsq + ysq;
        if temp1 > 0.0 {
            piece[n] = 3.0 * x * y * z * (2.0 * z * (z + r) / temp1).ln_1p();
            n += 1;
        }
        let temp2 = ysq + zsq;
        if temp2 > 0.0 {
            piece[n] = 0.5 * y * (3.0 * zsq - ysq) * (2.0 * x * (x + r) / temp2).ln_1p();
            n += 1;
        }
        let temp3 = xsq + zsq;
        if temp3 > 0.0 {
            piece[n] = 0.5 * x * (3.0 * zsq - xsq) * (2.0 * y * (y + r) / temp3).ln_1p();
            n += 1;
        }
    } else {
        if y > 0.0 {
            piece[n] = -0.5 * y * ysq * (2.0 * x * (x + r) / (y * y)).ln_1p();
            n += 1;
        }
        if x > 0.0 {
            piece[n] = -0.5 * x * xsq * (2.0 * y * (y + r) / (x * x)).ln_1p();
            n += 1;
        }
    }

    sign * accurate_sum(&piece[..n]) / 6.0
}

/// Self-demagnetization factor `Nxx` of a single `x*y*z` rectangular prism,
/// via the rewritten (non-cancelling) formula. `Oxs_SelfDemagNy`/`Nz` are
/// just coordinate permutations (see `self_demag_ny`/`self_demag_nz`).
///
/// Nx+Ny+Nz == 1 exactly for any edge lengths (spec.md §8 invariant).
pub fn self_demag_nx(x: f64, y: f64, z: f64) -> f64 {
    if x <= 0.0 || y <= 0.0 || z <= 0.0 {
        return 0.0;
    }
    if x == y && y == z {
        return 1.0 / 3.0;
    }

    let xsq = x * x;
    let ysq = y * y;
    let zsq = z * z;
    let r = (xsq + ysq + zsq).sqrt();
    let rxy = (xsq + ysq).sqrt();
    let rxz = (xsq + zsq).sqrt();
    let ryz = (ysq + zsq).sqrt();

    let mut arr = [0.0_f64; 8];

    arr[0] = 2.0
        * x
        * y
        * z
        * ((x / (x + rxy) + (2.0 * xsq + ysq + zsq) / (r * rxy + x * rxz)) / (x + rxz)
            + (x / (x + rxz) + (2.0 * xsq + ysq + zsq) / (r * rxz + x * rxy)) / (x + rxy))
        / ((x + r) * (rxy + rxz + r));
    arr[1] = -1.0
        * x
        * y
        * z
        * ((y / (y + rxy) + (2.0 * ysq + xsq + zsq) / (r * rxy + y * ryz)) / (y + ryz)
            + (y / (y + ryz) + (2.0 * ysq + xsq + zsq) / (r * ryz + y * rxy)) / (y + rxy))
        / ((y + r) * (rxy + ryz + r));
    arr[2] = -1.0
        * x
        * y
        * z
        * ((z / (z + rxz) + (2.0 * zsq + xsq + ysq) / (r * rxz + z * ryz)) / (z + ryz)
            + (z / (z + ryz) + (2.0 * zsq + xsq + ysq) / (r * ryz + z * rxz)) / (z + rxz))
        / ((z + r) * (rxz + ryz + r));

    arr[3] = 6.0 * (y * z / (x * r)).atan();

    let piece4 = -y * z * z * (1.0 / (x + rxz) + y / (rxy * rxz + x * r)) / (rxz * (y + rxy));
    arr[4] = if piece4 > -0.5 {
        3.0 * x * piece4.ln_1p() / z
    } else {
        3.0 * x * (x * (y + r) / (rxz * (y + rxy))).ln() / z
    };

    let piece5 = -y * y * z * (1.0 / (x + rxy) + z / (rxy * rxz + x * r)) / (rxy * (z + rxz));
    arr[5] = if piece5 > -0.5 {
        3.0 * x * piece5.ln_1p() / y
    } else {
        3.0 * x * (x * (z + r) / (rxy * (z + rxz))).ln() / y
    };

    let piece6 = -x * x * z * (1.0 / (y + rxy) + z / (rxy * ryz + y * r)) / (rxy * (z + ryz));
    arr[6] = if piece6 > -0.5 {
        -3.0 * y * piece6.ln_1p() / x
    } else {
        -3.0 * y * (y * (z + r) / (rxy * (z + ryz))).ln() / x
    };

    let piece7 = -x * x * y * (1.0 / (z + rxz) + y / (rxz * ryz + z * r)) / (rxz * (y + ryz));
    arr[7] = if piece7 > -0.5 {
        -3.0 * z * piece7.ln_1p() / x
    } else {
        -3.0 * z * (z * (y + r) / (rxz * (y + ryz))).ln() / x
    };

    accurate_sum(&arr) / (3.0 * std::f64::consts::PI)
}

pub fn self_demag_ny(x: f64, y: f64, z: f64) -> f64 {
    self_demag_nx(y, z, x)
}

pub fn self_demag_nz(x: f64, y: f64, z: f64) -> f64 {
    self_demag_nx(z, x, y)
}

/// `Nxx * 4*pi*dx*dy*dz`: the 27-corner sum of `newell_f` at offsets
/// `(x +/- dx, y +/- dy, z +/- dz)`, with weights `(-1,2,-4,8)` for
/// (corner, edge-midpoint, face-center, center) terms.
fn calculate_sda00(x: f64, y: f64, z: f64, dx: f64, dy: f64, dz: f64) -> f64 {
    if x == 0.0 && y == 0.0 && z == 0.0 {
        return self_demag_nx(dx, dy, dz) * (4.0 * std::f64::consts::PI * dx * dy * dz);
    }
    let f = newell_f;
    let arr = [
        -f(x + dx, y + dy, z + dz),
        -f(x + dx, y - dy, z + dz),
        -f(x + dx, y - dy, z - dz),
        -f(x + dx, y + dy, z - dz),
        -f(x - dx, y + dy, z - dz),
        -f(x - dx, y + dy, z + dz),
        -f(x - dx, y - dy, z + dz),
        -f(x - dx, y - dy, z - dz),
        2.0 * f(x, y - dy, z - dz),
        2.0 * f(x, y - dy, z + dz),
        2.0 * f(x, y + dy, z + dz),
        2.0 * f(x, y + dy, z - dz),
        2.0 * f(x + dx, y + dy, z),
        2.0 * f(x + dx, y, z + dz),
        2.0 * f(x + dx, y, z - dz),
        2.0 * f(x + dx, y - dy, z),
        2.0 * f(x - dx, y - dy, z),
        2.0 * f(x - dx, y, z + dz),
        2.0 * f(x - dx, y, z - dz),
        2.0 * f(x - dx, y + dy, z),
        -4.0 * f(x, y - dy, z),
        -4.0 * f(x, y + dy, z),
        -4.0 * f(x, y, z - dz),
        -4.0 * f(x, y, z + dz),
        -4.0 * f(x + dx, y, z),
        -4.0 * f(x - dx, y, z),
        8.0 * f(x, y, z),
    ];
    accurate_sum(&arr)
}

/// `Nxy * 4*pi*dx*dy*dz`, the analogous 27-corner sum of `newell_g`.
fn calculate_sda01(x: f64, y: f64, z: f64, l: f64, h: f64, e: f64) -> f64 {
    if x == 0.0 || y == 0.0 {
        return 0.0;
    }
    let g = newell_g;
    let arr = [
        -g(x - l, y - h, z - e),
        -g(x - l, y - h, z + e),
        -g(x + l, y - h, z + e),
        -g(x + l, y - h, z - e),
        -g(x + l, y + h, z - e),
        -g(x + l, y + h, z + e),
        -g(x - l, y + h, z + e),
        -g(x - l, y + h, z - e),
        2.0 * g(x, y + h, z - e),
        2.0 * g(x, y + h, z + e),
        2.0 * g(x, y - h, z + e),
        2.0 * g(x, y - h, z - e),
        2.0 * g(x - l, y - h, z),
        2.0 * g(x - l, y + h, z),
        2.0 * g(x - l, y, z - e),
        2.0 * g(x - l, y, z + e),
        2.0 * g(x + l, y, z + e),
        2.0 * g(x + l, y, z - e),
        2.0 * g(x + l, y - h, z),
        2.0 * g(x + l, y + h, z),
        -4.0 * g(x - l, y, z),
        -4.0 * g(x + l, y, z),
        -4.0 * g(x, y, z + e),
        -4.0 * g(x, y, z - e),
        -4.0 * g(x, y - h, z),
        -4.0 * g(x, y + h, z),
        8.0 * g(x, y, z),
    ];
    accurate_sum(&arr)
}

/// `Nxx(r; dx,dy,dz)`.
pub fn calculate_nxx(x: f64, y: f64, z: f64, dx: f64, dy: f64, dz: f64) -> f64 {
    calculate_sda00(x, y, z, dx, dy, dz) / (4.0 * std::f64::consts::PI * dx * dy * dz)
}

pub fn calculate_nyy(x: f64, y: f64, z: f64, dx: f64, dy: f64, dz: f64) -> f64 {
    calculate_nxx(y, x, z, dy, dx, dz)
}

pub fn calculate_nzz(x: f64, y: f64, z: f64, dx: f64, dy: f64, dz: f64) -> f64 {
    calculate_nxx(z, y, x, dz, dy, dx)
}

/// `Nxy(r; dx,dy,dz)`.
pub fn calculate_nxy(x: f64, y: f64, z: f64, dx: f64, dy: f64, dz: f64) -> f64 {
    calculate_sda01(x, y, z, dx, dy, dz) / (4.0 * std::f64::consts::PI * dx * dy * dz)
}

pub fn calculate_nxz(x: f64, y: f64, z: f64, dx: f64, dy: f64, dz: f64) -> f64 {
    calculate_nxy(x, z, y, dx, dz, dy)
}

pub fn calculate_nyz(x: f64, y: f64, z: f64, dx: f64, dy: f64, dz: f64) -> f64 {
    calculate_nxy(y, z, x, dy, dz, dx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "{} != {} (diff {:e})", a, b, (a - b).abs());
    }

    #[test]
    fn self_demag_cube_is_one_third() {
        assert_close(self_demag_nx(1.0, 1.0, 1.0), 1.0 / 3.0, 1e-15);
    }

    #[test]
    fn self_demag_components_sum_to_one() {
        let (x, y, z) = (1.0, 2.0, 3.0);
        let sum = self_demag_nx(x, y, z) + self_demag_ny(x, y, z) + self_demag_nz(x, y, z);
        assert_close(sum, 1.0, 1e-12);
    }

    #[test]
    fn newell_f_zero_is_zero() {
        assert_eq!(newell_f(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn newell_g_zero_is_zero() {
        assert_eq!(newell_g(0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn nxy_vanishes_in_xz_plane() {
        // Nxy is odd in y, so it must vanish exactly for y=0.
        assert_eq!(calculate_nxy(3.0, 0.0, 5.0, 1.0, 2.0, 3.0), 0.0);
        assert_eq!(calculate_nxy(7.0, 0.0, -2.0, 1.0, 2.0, 3.0), 0.0);
    }

    #[test]
    fn reference_nxx_values() {
        assert_close(calculate_nxx(0.0, 0.0, 0.0, 1.0, 1.0, 1.0), 0.333_333_333_333_333_3, 1e-14);
        assert_close(calculate_nxx(0.0, 0.0, 0.0, 1.0, 1.0, 2.0), 0.400_841_923_605_581_0, 1e-13);
        assert_close(calculate_nxx(1.0, 0.0, 0.0, 1.0, 1.0, 1.0), -0.135_017_180_544_495_3, 1e-13);
        assert_close(calculate_nxx(1.0, 2.0, 3.0, 1.0, 2.0, 3.0), 0.007_426_357_027_791_974, 1e-14);
        assert_close(
            calculate_nxx(10.0, 4.0, 6.0, 1.0, 2.0, 3.0),
            -0.000_253_812_607_226_228_0,
            1e-14,
        );
    }

    #[test]
    fn reference_nxy_values() {
        assert_close(calculate_nxy(1.0, 1.0, 0.0, 1.0, 2.0, 3.0), -0.077_258_075_615_212_40, 1e-13);
        assert_close(
            calculate_nxy(1.0, 2.0, 3.0, 1.0, 2.0, 3.0),
            -0.008_822_653_670_771_104,
            1e-14,
        );
        assert_close(
            calculate_nxy(10.0, 4.0, 6.0, 1.0, 2.0, 3.0),
            -0.000_200_047_640_057_411_5,
            1e-14,
        );
    }

    #[test]
    fn tensor_is_symmetric_under_swap() {
        let (x, y, z) = (1.0, 2.0, 3.0);
        let (dx, dy, dz) = (0.5, 1.5, 2.5);
        assert_close(
            calculate_nxx(x, y, z, dx, dy, dz),
            calculate_nyy(y, x, z, dy, dx, dz),
            1e-12,
        );
        assert_close(
            calculate_nxx(x, y, z, dx, dy, dz),
            calculate_nzz(z, y, x, dz, dy, dx),
            1e-12,
        );
    }
}
