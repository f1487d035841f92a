//! Effective field, torque, and energy evaluation. Grounded in
//! `Grid2D::hUpdate`/`hFastUpdate`/`CalculateTorque`/`CalculateEnergy`/
//! `CalculateEnergyDifference`/`GetMaxTorque`/`GetMxH`/`GetdEdt`.

use super::Grid;
use crate::accurate_sum::XpFloat;
use crate::coords;
use crate::vector::Vector3;
use itertools::iproduct;

impl Grid {
    /// Recomputes `h` from scratch: applied field rotated into internal
    /// coordinates, plus exchange and anisotropy contributions, plus a fresh
    /// demag evaluation. Marks `h` valid and invalidates torque/energy.
    pub fn h_update(&mut self) {
        self.h_update_count += 1;
        for (i, k) in iproduct!(0..self.width, 0..self.depth) {
            let idx = self.idx(i, k);
            let (x, y) = (i as f64 * self.cellsize, k as f64 * self.cellsize);
            self.h[idx] = coords::ext_to_int(self.applied.field_at(x, y));
        }
        for (i, k) in iproduct!(0..self.width, 0..self.depth) {
            let idx = self.idx(i, k);
            if self.cells[idx].thickness == 0.0 {
                continue;
            }
            self.h[idx] += self.cells[idx].calculate_exchange(&self.cells, self.exchange_coef, self.eight_neighbor);
            self.h[idx] += self.cells[idx].anisotropy_field();
        }
        if self.demag.is_some() {
            self.internal_demag_calc();
            self.apply_demag_correction();
        }
        self.h_valid = true;
        self.torque_valid = false;
        self.energy_valid = false;
    }

    /// Like `h_update` but reuses the stale `h_demag` from the last full
    /// update instead of recomputing it; used by the RK4 stepper's interior
    /// evaluations when a full demag pass would be wasted work.
    pub fn h_fast_update(&mut self) {
        self.h_update_count += 1;
        for (i, k) in iproduct!(0..self.width, 0..self.depth) {
            let idx = self.idx(i, k);
            let (x, y) = (i as f64 * self.cellsize, k as f64 * self.cellsize);
            self.h[idx] = coords::ext_to_int(self.applied.field_at(x, y));
        }
        for (i, k) in iproduct!(0..self.width, 0..self.depth) {
            let idx = self.idx(i, k);
            if self.cells[idx].thickness == 0.0 {
                continue;
            }
            self.h[idx] += self.cells[idx].calculate_exchange(&self.cells, self.exchange_coef, self.eight_neighbor);
            self.h[idx] += self.cells[idx].anisotropy_field();
        }
        if self.demag.is_some() {
            self.apply_demag_correction();
        }
        self.torque_valid = false;
        self.energy_valid = false;
    }

    /// `hdemag[i][k] = CalculateDemag(i,k)` for every cell.
    fn internal_demag_calc(&mut self) {
        for (i, k) in iproduct!(0..self.width, 0..self.depth) {
            self.h_demag[self.idx(i, k)] = self.calculate_demag(i, k);
        }
    }

    fn calculate_demag(&self, i: usize, k: usize) -> Vector3 {
        let demag = self.demag.as_ref().expect("demag kernel present");
        let mut hx = 0.0;
        let mut hz = 0.0;
        for (i2, k2) in iproduct!(0..self.width, 0..self.depth) {
            if i2 == i && k2 == k {
                continue;
            }
            let other = &self.cells[self.idx(i2, k2)];
            let di = i2 as i64 - i as i64;
            let dk = k2 as i64 - k as i64;
            let a = demag.a(di, dk);
            let c = demag.c(di, dk);
            let (mx, mz) = (other.spin.x, other.spin.z);
            hx += other.thickness * (a * mx + c * mz);
            hz += other.thickness * (c * mx - a * mz);
        }
        let me = &self.cells[self.idx(i, k)];
        hx += me.thickness * demag.self_demag * me.spin.x;
        hz += me.thickness * demag.self_demag * me.spin.z;
        Vector3::new(hx, 0.0, hz)
    }

    /// Adds the (possibly stale) `h_demag` into `h`, with the out-of-plane
    /// `Ny_correction` term for partial-thickness cells.
    fn apply_demag_correction(&mut self) {
        for (i, k) in iproduct!(0..self.width, 0..self.depth) {
            let idx = self.idx(i, k);
            let thickness = self.cells[idx].thickness;
            if thickness != 1.0 && thickness > 0.0 {
                self.h_demag[idx].y -= self.cells[idx].spin.y * self.cells[idx].ny_correction;
            }
            self.h[idx] += self.h_demag[idx];
        }
    }

    /// `T = PRECESSION_RATIO*(m x h) - m x (m x h)` when precession is
    /// enabled (`PRECESSION_RATIO = -1/DampCoef`), collapsing to
    /// `-m x (m x h)` when it is not.
    pub fn calculate_torque(&mut self) {
        for (i, k) in iproduct!(0..self.width, 0..self.depth) {
            let idx = self.idx(i, k);
            let cell = &self.cells[idx];
            if cell.thickness == 0.0 {
                self.torque[idx] = Vector3::ZERO;
                continue;
            }
            let mxh = cell.spin.cross(&self.h[idx]);
            self.torque[idx] = if self.do_precess {
                let precession_ratio = -1.0 / self.damp_coef;
                mxh.scale(precession_ratio) - cell.spin.cross(&mxh)
            } else {
                -cell.spin.cross(&mxh)
            };
        }
        self.torque_valid = true;
    }

    /// Exchange, anisotropy, demag, and Zeeman energy densities, each
    /// accumulated via `XpFloat` and normalized by `thickness_sum`, then
    /// summed into `energy` via a final `XpFloat` pass.
    pub fn calculate_energy(&mut self) {
        let mut exch_acc = XpFloat::new();
        let mut anis_acc = XpFloat::new();
        let mut demag_acc = XpFloat::new();
        let mut zeeman_acc = XpFloat::new();

        for (i, k) in iproduct!(0..self.width, 0..self.depth) {
            let idx = self.idx(i, k);
            let cell = &self.cells[idx];
            if cell.thickness <= 0.0 {
                self.energy_density[idx] = 0.0;
                continue;
            }
            let exch = cell.calculate_exchange_energy(&self.cells, self.exchange_coef, self.eight_neighbor);
            let anis = cell.anisotropy_energy();
            let mut density = exch + anis;
            exch_acc.accum(exch);
            anis_acc.accum(anis);

            if self.demag.is_some() {
                let demag_e = -0.5 * cell.thickness * cell.spin.dot(&self.h_demag[idx]);
                demag_acc.accum(demag_e);
                density += demag_e;
            }

            let zeeman = -cell.thickness * cell.spin.dot(&self.h[idx]);
            zeeman_acc.accum(zeeman);
            density += zeeman;

            self.energy_density[idx] = density;
        }

        self.exch_energy = exch_acc.value() / self.thickness_sum;
        self.anis_energy = anis_acc.value() / self.thickness_sum;
        self.demag_energy = demag_acc.value() / self.thickness_sum;
        self.zeeman_energy = zeeman_acc.value() / self.thickness_sum;

        let mut total = XpFloat::new();
        total.accum(exch_acc.value());
        total.accum(anis_acc.value());
        total.accum(demag_acc.value());
        total.accum(zeeman_acc.value());
        self.energy = total.value() / self.thickness_sum;
        self.energy_valid = true;
    }

    /// `sum(energy_density1 - energy_density) / thickness_sum`, used by the
    /// predictor/corrector stepper for a higher-precision energy-change
    /// estimate than a naive `energy1 - energy` subtraction.
    pub fn calculate_energy_difference(&self) -> f64 {
        let mut acc = XpFloat::new();
        for (d1, d0) in self.energy_density1.iter().zip(self.energy_density.iter()) {
            acc.accum(d1 - d0);
        }
        acc.value() / self.thickness_sum
    }

    /// `-sum(thickness * (torque . h)) / thickness_sum`. Positive values
    /// signal round-off trouble in the caller; this function does not assert
    /// on that, only reports it.
    pub fn get_de_dt(&self) -> f64 {
        let mut acc = XpFloat::new();
        for (i, k) in iproduct!(0..self.width, 0..self.depth) {
            let idx = self.idx(i, k);
            let cell = &self.cells[idx];
            if cell.thickness <= 0.0 {
                continue;
            }
            acc.accum(cell.thickness * self.torque[idx].dot(&self.h[idx]));
        }
        -acc.value() / self.thickness_sum
    }

    /// Ensures `h` and `torque` are valid, then returns
    /// `sqrt(max_i |torque_i|^2)`.
    pub fn get_max_torque(&mut self) -> f64 {
        if !self.h_valid {
            self.h_update();
        }
        if !self.torque_valid {
            self.calculate_torque();
        }
        self.torque.iter().map(|t| t.magsq()).fold(0.0, f64::max).sqrt()
    }

    /// `|mxh| = torque / sqrt(1 + 1/damp_coef^2)` when precession is on
    /// (torque unchanged otherwise).
    pub fn get_mx_h(&self, torque: f64) -> f64 {
        if self.do_precess {
            torque / (1.0 + 1.0 / (self.damp_coef * self.damp_coef)).sqrt()
        } else {
            torque
        }
    }

    pub fn get_max_mx_h(&mut self) -> f64 {
        let max_torque = self.get_max_torque();
        self.get_mx_h(max_torque)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applied_field::Uniform;
    use crate::config::{AnisotropyType, Configuration, NamedCall, PartShape};

    fn base_config() -> Configuration {
        Configuration {
            ms: 8.6e5,
            a: 1.3e-11,
            k1: 0.0,
            edge_k1: 0.0,
            anisotropy_type: AnisotropyType::Uniaxial,
            anis_dir_a: Vector3::new(0.0, 0.0, 1.0),
            anis_dir_b: Vector3::new(1.0, 0.0, 0.0),
            anisotropy_init: NamedCall::new("fixed", vec![]),
            demag_routine: "none".to_string(),
            part_width: 25.0,
            part_height: 25.0,
            part_thickness: 5.0,
            cellsize: 5.0,
            part_shape: PartShape::Rectangle,
            shape_parameter: 0.0,
            mag_init: NamedCall::new("uniform", vec![0.0, 0.0]),
            applied_field: vec![],
            field_range: vec![],
            default_control_point: "-torque 1e-5".to_string(),
            precession: true,
            gyratio: 2.21e5,
            damp_coef: 0.5,
            initial_increment: 0.01,
            seed: 3,
            min_time_step: 1e-6,
            max_time_step: 1.0,
            small_steps: false,
            output_formats: vec![],
        }
    }

    #[test]
    fn uniform_state_with_no_field_has_zero_torque() {
        let cfg = base_config();
        let mut grid = Grid::new(&cfg, Box::new(Uniform::new(Vector3::ZERO))).unwrap();
        let max_torque = grid.get_max_torque();
        assert!(max_torque < 1e-8);
    }

    #[test]
    fn no_precession_drops_the_precession_term() {
        let mut cfg = base_config();
        cfg.precession = false;
        cfg.mag_init = NamedCall::new("uniform", vec![45.0, 0.0]);
        let mut grid = Grid::new(&cfg, Box::new(Uniform::new(Vector3::new(0.0, 0.0, 1.0)))).unwrap();
        grid.h_update();
        grid.calculate_torque();
        let idx = grid.idx(0, 0);
        let h = grid.h[idx];
        let m = grid.cells[idx].spin;
        let expected = -m.cross(&m.cross(&h));
        let actual = grid.torque[idx];
        assert!((actual - expected).mag() < 1e-10);
    }

    #[test]
    fn get_mx_h_without_precession_returns_torque_unchanged() {
        let mut cfg = base_config();
        cfg.precession = false;
        let grid = Grid::new(&cfg, Box::new(Uniform::new(Vector3::ZERO))).unwrap();
        assert_eq!(grid.get_mx_h(3.0), 3.0);
    }
}
