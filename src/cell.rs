//! `Cell`: one micromagnetic element of the 2D grid.
//!
//! Carries its own spin direction, relative thickness, anisotropy, and a
//! short list of exchange-coupled neighbors addressed by index into the
//! owning `Grid`'s cell array (an arena rather than pointers, since every
//! neighbor outlives every cell for the life of the grid).
//!
//! Grounded in OOMMF's `MagElt` (`app/mmsolve/magelt.h`/`.cc`): anisotropy
//! energy/field dispatch, the exchange link weight `EXCHANGE_THICKNESS_ADJ`,
//! and the `CalculateExchange`/`CalculateExchangeEnergy` formulas are all
//! carried over, generalized to per-cell anisotropy direction storage and
//! arena-indexed neighbors instead of C++ member pointers.

use crate::errors::{ErrorKind, Result};
use crate::vector::Vector3;
use rand::Rng;

/// Maximum exchange neighbors per cell (8-neighbor stencil on a square
/// lattice).
pub const MAX_NEIGHBORS: usize = 8;

/// Exchange-link weight between two cells of relative thickness `ta`, `tb`,
/// each in `[0,1]`. Symmetric, and bounded between `min(ta,tb)` and the
/// harmonic mean `2*ta*tb/(ta+tb)`.
pub fn exchange_link_weight(ta: f64, tb: f64) -> f64 {
    if ta + tb == 0.0 {
        0.0
    } else {
        2.0 * ta * tb / (ta + tb)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct CellLink {
    pub index: usize,
    pub weight: f64,
}

/// Dispatches which closed-form anisotropy energy/field a `Cell` uses.
/// `StandardCubic` assumes the crystal axes are aligned with the lattice
/// axes (no direction vectors needed); `GeneralCubic` and `Uniaxial` carry
/// their own axes, validated at construction.
#[derive(Debug, Copy, Clone)]
pub enum Anisotropy {
    None,
    Uniaxial { dir: Vector3 },
    StandardCubic,
    GeneralCubic { dir_a: Vector3, dir_b: Vector3, dir_c: Vector3 },
}

#[derive(Debug, Clone)]
pub struct Cell {
    pub spin: Vector3,
    pub thickness: f64,
    pub ny_correction: f64,
    /// `K1 / (mu0 * Ms^2)`, signed; negative flips the anisotropy axis
    /// between easy and hard.
    pub anisotropy_coef: f64,
    pub anisotropy: Anisotropy,
    neighbors: Vec<CellLink>,
}

impl Cell {
    pub fn new(thickness: f64) -> Cell {
        Cell {
            spin: Vector3::ZERO,
            thickness,
            ny_correction: 0.0,
            anisotropy_coef: 0.0,
            anisotropy: Anisotropy::None,
            neighbors: Vec::new(),
        }
    }

    pub fn set_k1(&mut self, k1: f64, ms: f64) {
        const MU0: f64 = 4.0 * std::f64::consts::PI * 1e-7;
        self.anisotropy_coef = k1 / (MU0 * ms * ms);
    }

    pub fn k1(&self, ms: f64) -> f64 {
        const MU0: f64 = 4.0 * std::f64::consts::PI * 1e-7;
        self.anisotropy_coef * MU0 * ms * ms
    }

    pub fn set_thickness(&mut self, thickness: f64) {
        self.thickness = thickness;
    }

    pub fn set_ny_correction(&mut self, correction: f64) {
        self.ny_correction = correction;
    }

    /// Validates and installs a `Uniaxial` or `GeneralCubic` anisotropy
    /// direction set: every axis must be unit length, and for the general
    /// cubic case all three must be mutually orthogonal.
    pub fn init_anis_dirs(&mut self, dir_a: Vector3, dir_b: Option<Vector3>, dir_c: Option<Vector3>) -> Result<()> {
        const TOL: f64 = 1e-8;
        let is_unit = |v: &Vector3| (v.mag() - 1.0).abs() < TOL;

        if !is_unit(&dir_a) {
            return Err(ErrorKind::InvalidAxis(format!("axis a is not unit length: |a|={}", dir_a.mag())).into());
        }

        self.anisotropy = match (dir_b, dir_c) {
            (None, None) => Anisotropy::Uniaxial { dir: dir_a },
            (Some(dir_b), Some(dir_c)) => {
                if !is_unit(&dir_b) {
                    return Err(ErrorKind::InvalidAxis(format!("axis b is not unit length: |b|={}", dir_b.mag())).into());
                }
                if !is_unit(&dir_c) {
                    return Err(ErrorKind::InvalidAxis(format!("axis c is not unit length: |c|={}", dir_c.mag())).into());
                }
                if dir_a.dot(&dir_b).abs() > TOL || dir_a.dot(&dir_c).abs() > TOL || dir_b.dot(&dir_c).abs() > TOL {
                    return Err(ErrorKind::InvalidAxis("anisotropy axes a, b, c are not mutually orthogonal".into()).into());
                }
                Anisotropy::GeneralCubic { dir_a, dir_b, dir_c }
            }
            _ => {
                return Err(ErrorKind::InvalidAxis("general cubic anisotropy requires all three axes".into()).into());
            }
        };
        Ok(())
    }

    pub fn setup_neighbors(&mut self, links: Vec<CellLink>) -> Result<()> {
        if links.len() > MAX_NEIGHBORS {
            return Err(ErrorKind::ConfigurationInvalid(format!(
                "cell has {} neighbors, more than the maximum of {}",
                links.len(),
                MAX_NEIGHBORS
            ))
            .into());
        }
        self.neighbors = links;
        Ok(())
    }

    pub fn neighbors(&self) -> &[CellLink] {
        &self.neighbors
    }

    /// True if this cell sits on the magnetic boundary: it has fewer than
    /// the full neighbor count, or any neighbor's thickness differs from
    /// its own by more than a relative `1e-8`.
    pub fn is_boundary(&self, cells: &[Cell]) -> bool {
        if self.neighbors.len() < MAX_NEIGHBORS {
            return true;
        }
        self.neighbors.iter().any(|link| {
            let other = &cells[link.index];
            (other.thickness - self.thickness).abs() > 1e-8 * (other.thickness + self.thickness)
        })
    }

    /// Exchange field at this cell, per the "remove the in-line guess"
    /// formulation: summing `weight * (neighbor.spin - self.spin)` directly
    /// (rather than `weight * neighbor.spin` then subtracting) keeps the
    /// result accurate even when all neighbors are nearly aligned.
    /// `eight_neighbor` selects the `2/3` vs `2` overall scale factor for
    /// the 8- vs 4-neighbor stencil.
    pub fn calculate_exchange(&self, cells: &[Cell], exchange_coef: f64, eight_neighbor: bool) -> Vector3 {
        let mut sum = Vector3::ZERO;
        for link in &self.neighbors {
            let delta = cells[link.index].spin - self.spin;
            sum += delta.scale(link.weight);
        }
        let scale = if eight_neighbor { exchange_coef * (2.0 / 3.0) } else { 2.0 * exchange_coef };
        sum.scale(scale)
    }

    pub fn calculate_exchange_energy(&self, cells: &[Cell], exchange_coef: f64, eight_neighbor: bool) -> f64 {
        let mut sum = Vector3::ZERO;
        for link in &self.neighbors {
            let delta = self.spin - cells[link.index].spin;
            sum += delta.scale(link.weight);
        }
        let scale = if eight_neighbor { exchange_coef / 3.0 } else { exchange_coef };
        self.spin.dot(&sum) * scale * self.thickness
    }

    pub fn anisotropy_energy(&self) -> f64 {
        match self.anisotropy {
            Anisotropy::None => 0.0,
            Anisotropy::Uniaxial { dir } => {
                let dot = self.spin.dot(&dir);
                let mut energy = -dot * dot;
                if self.anisotropy_coef >= 0.0 {
                    energy += 1.0;
                }
                energy * self.anisotropy_coef * self.thickness
            }
            Anisotropy::StandardCubic => {
                let (ma2, mb2, mc2) = (self.spin.x * self.spin.x, self.spin.y * self.spin.y, self.spin.z * self.spin.z);
                let mut energy = ma2 * (mb2 + mc2) + mb2 * mc2;
                if self.anisotropy_coef < 0.0 {
                    energy -= 1.0 / 3.0;
                }
                energy * self.anisotropy_coef * self.thickness
            }
            Anisotropy::GeneralCubic { dir_a, dir_b, dir_c } => {
                let ma2 = self.spin.dot(&dir_a).powi(2);
                let mb2 = self.spin.dot(&dir_b).powi(2);
                let mc2 = self.spin.dot(&dir_c).powi(2);
                let mut energy = ma2 * mb2 + ma2 * mc2 + mb2 * mc2;
                if self.anisotropy_coef < 0.0 {
                    energy -= 1.0 / 3.0;
                }
                energy * self.anisotropy_coef * self.thickness
            }
        }
    }

    pub fn anisotropy_field(&self) -> Vector3 {
        match self.anisotropy {
            Anisotropy::None => Vector3::ZERO,
            Anisotropy::Uniaxial { dir } => {
                let dot = 2.0 * self.anisotropy_coef * self.spin.dot(&dir);
                dir.scale(dot)
            }
            Anisotropy::StandardCubic => {
                let coef = -2.0 * self.anisotropy_coef;
                let (ma2, mb2, mc2) = (self.spin.x * self.spin.x, self.spin.y * self.spin.y, self.spin.z * self.spin.z);
                Vector3::new(
                    coef * self.spin.x * (mb2 + mc2),
                    coef * self.spin.y * (mc2 + ma2),
                    coef * self.spin.z * (ma2 + mb2),
                )
            }
            Anisotropy::GeneralCubic { dir_a, dir_b, dir_c } => {
                let ma = self.spin.dot(&dir_a);
                let mb = self.spin.dot(&dir_b);
                let mc = self.spin.dot(&dir_c);
                let coef = -2.0 * self.anisotropy_coef;
                let ha = coef * ma * (mb * mb + mc * mc);
                let hb = coef * mb * (ma * ma + mc * mc);
                let hc = coef * mc * (ma * ma + mb * mb);
                dir_a.scale(ha) + dir_b.scale(hb) + dir_c.scale(hc)
            }
        }
    }

    /// Minimum cosine of the angle between this cell's spin and each
    /// neighbor's, used by the step controller's convergence check.
    pub fn min_neighbor_dot(&self, cells: &[Cell]) -> f64 {
        self.neighbors
            .iter()
            .map(|link| self.spin.dot(&cells[link.index].spin))
            .fold(1.0, f64::min)
    }

    pub fn perturb<R: Rng + ?Sized>(&mut self, max_mag: f64, rng: &mut R) {
        let delta = Vector3::new(
            rng.gen_range(-max_mag, max_mag),
            rng.gen_range(-max_mag, max_mag),
            rng.gen_range(-max_mag, max_mag),
        );
        self.spin += delta;
        self.spin.precise_normalize();
    }

    /// Copies spin, thickness, and anisotropy coefficient from `mother`,
    /// leaving neighbor topology untouched.
    pub fn copy_data(&mut self, mother: &Cell) {
        self.spin = mother.spin;
        self.thickness = mother.thickness;
        self.anisotropy_coef = mother.anisotropy_coef;
        self.anisotropy = mother.anisotropy;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_link_weight_is_symmetric() {
        assert_eq!(exchange_link_weight(0.5, 0.8), exchange_link_weight(0.8, 0.5));
    }

    #[test]
    fn exchange_link_weight_handles_zero() {
        assert_eq!(exchange_link_weight(0.0, 0.0), 0.0);
    }

    #[test]
    fn exchange_link_weight_between_min_and_harmonic_bound() {
        let (ta, tb) = (0.3, 0.9);
        let w = exchange_link_weight(ta, tb);
        assert!(w >= ta.min(tb) - 1e-12);
        assert!(w <= 2.0 * ta * tb / (ta + tb) + 1e-12);
    }

    #[test]
    fn uniaxial_anisotropy_field_is_along_axis() {
        let mut cell = Cell::new(1.0);
        cell.set_k1(1000.0, 8e5);
        cell.init_anis_dirs(Vector3::new(0.0, 0.0, 1.0), None, None).unwrap();
        cell.spin = Vector3::new(0.3, 0.0, (1.0 - 0.09_f64).sqrt());
        let field = cell.anisotropy_field();
        assert!(field.x.abs() < 1e-12 && field.y.abs() < 1e-12);
    }

    #[test]
    fn general_cubic_rejects_non_orthogonal_axes() {
        let mut cell = Cell::new(1.0);
        let a = Vector3::new(1.0, 0.0, 0.0);
        let b = Vector3::new(0.7071067811865476, 0.7071067811865476, 0.0); // 45 deg off a
        let c = Vector3::new(0.0, 0.0, 1.0);
        assert!(cell.init_anis_dirs(a, Some(b), Some(c)).is_err());
    }

    #[test]
    fn exchange_is_zero_for_fully_aligned_neighbors() {
        let mut cells = vec![Cell::new(1.0), Cell::new(1.0), Cell::new(1.0)];
        for c in &mut cells {
            c.spin = Vector3::new(0.0, 0.0, 1.0);
        }
        cells[0]
            .setup_neighbors(vec![CellLink { index: 1, weight: 1.0 }, CellLink { index: 2, weight: 1.0 }])
            .unwrap();
        let h = cells[0].calculate_exchange(&cells, 0.05, true);
        assert_eq!(h, Vector3::ZERO);
        let e = cells[0].calculate_exchange_energy(&cells, 0.05, true);
        assert_eq!(e, 0.0);
    }

    #[test]
    fn setup_neighbors_rejects_too_many_links() {
        let mut cell = Cell::new(1.0);
        let links: Vec<CellLink> = (0..(MAX_NEIGHBORS + 1)).map(|i| CellLink { index: i, weight: 1.0 }).collect();
        assert!(cell.setup_neighbors(links).is_err());
    }
}
