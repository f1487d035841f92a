//! `Vector3`: an ordered triple of `f64`s used throughout the core for spin
//! directions, fields, and torques.

use crate::accurate_sum::accurate_sum;
use rand::Rng;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Vector3 {
        Vector3 { x, y, z }
    }

    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vector3) -> Vector3 {
        Vector3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn magsq(&self) -> f64 {
        self.dot(self)
    }

    pub fn mag(&self) -> f64 {
        self.magsq().sqrt()
    }

    pub fn scale(&self, s: f64) -> Vector3 {
        Vector3::new(self.x * s, self.y * s, self.z * s)
    }

    /// Normalize in place using a plain `f64` division. Adequate away from
    /// the unit sphere's numerical edge cases; see `precise_normalize` for
    /// the compensated variant used after many accumulated small updates.
    pub fn normalize(&mut self) {
        let m = self.mag();
        if m > 0.0 {
            self.x /= m;
            self.y /= m;
            self.z /= m;
        }
    }

    pub fn normalized(&self) -> Vector3 {
        let mut v = *self;
        v.normalize();
        v
    }

    /// Normalize using `AccurateSum` to form `|v|^2`, reducing cancellation
    /// when the three components vary wildly in magnitude (e.g. immediately
    /// after a tiny perturbation added to a near-axis-aligned spin).
    pub fn precise_normalize(&mut self) {
        let sq = accurate_sum(&[self.x * self.x, self.y * self.y, self.z * self.z]);
        let m = sq.sqrt();
        if m > 0.0 {
            self.x /= m;
            self.y /= m;
            self.z /= m;
        }
    }

    /// A uniformly-distributed random unit vector (Marsaglia's method).
    pub fn random_unit<R: Rng + ?Sized>(rng: &mut R) -> Vector3 {
        loop {
            let u1 = rng.gen_range(-1.0, 1.0);
            let u2 = rng.gen_range(-1.0, 1.0);
            let s = u1 * u1 + u2 * u2;
            if s >= 1.0 || s <= 0.0 {
                continue;
            }
            let factor = 2.0 * (1.0 - s).sqrt();
            return Vector3::new(u1 * factor, u2 * factor, 1.0 - 2.0 * s);
        }
    }

    /// Componentwise-signed accumulate: adds `other` to `self`, tracking the
    /// signed magnitude of the largest single-component update. Used by the
    /// step controller's `max_torque` bookkeeping.
    pub fn accumulate_signed(&mut self, other: &Vector3) -> f64 {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
        other.x.abs().max(other.y.abs()).max(other.z.abs())
    }
}

impl Add for Vector3 {
    type Output = Vector3;
    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vector3 {
    fn add_assign(&mut self, rhs: Vector3) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for Vector3 {
    type Output = Vector3;
    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl SubAssign for Vector3 {
    fn sub_assign(&mut self, rhs: Vector3) {
        self.x -= rhs.x;
        self.y -= rhs.y;
        self.z -= rhs.z;
    }
}

impl Mul<f64> for Vector3 {
    type Output = Vector3;
    fn mul(self, rhs: f64) -> Vector3 {
        self.scale(rhs)
    }
}

impl Neg for Vector3 {
    type Output = Vector3;
    fn neg(self) -> Vector3 {
        Vector3::new(-self.x, -self.y, -self.z)
    }
}

impl Default for Vector3 {
    fn default() -> Vector3 {
        Vector3::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_is_orthogonal() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(-1.0, 0.5, 4.0);
        let c = a.cross(&b);
        assert!(c.dot(&a).abs() < 1e-12);
        assert!(c.dot(&b).abs() < 1e-12);
    }

    #[test]
    fn random_unit_is_normalized() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let v = Vector3::random_unit(&mut rng);
            assert!((v.mag() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn normalize_handles_zero() {
        let mut v = Vector3::ZERO;
        v.normalize();
        assert_eq!(v, Vector3::ZERO);
    }
}
