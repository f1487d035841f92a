//! `Grid`: owns the full cell array and drives its lifecycle. Grounded in
//! OOMMF's `Grid2D` (`app/mmsolve/grid.h`/`.cc`): construction order
//! (allocate, set material constants, apply geometry, run MagInit, rotate
//! into internal coordinates, build the neighbor graph) follows
//! `Grid2D::Grid2D`/`Grid2D::Initialize` directly.
//!
//! Experimental features the source gates behind `DEMAG_EDGE_CORRECTION` and
//! `ANIS_BDRY_ADJUSTMENT` (surface-anisotropy boundary corrections) are not
//! implemented; see DESIGN.md.

pub mod demag;
pub mod field_eval;
pub mod integrator;

use crate::applied_field::AppliedField;
use crate::cell::{Cell, CellLink};
use crate::config::{AnisotropyType, Configuration, PartShape};
use crate::errors::Result;
use crate::mag_init;
use crate::vector::Vector3;
use log::debug;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use self::demag::DemagKernel;

const MU0: f64 = 4.0 * std::f64::consts::PI * 1.0e-7;

/// `StepSize * max_torque` is kept below this. 5 degrees/step by default, 1
/// degree/step in "small steps" mode.
pub fn max_torque_step(small_steps: bool) -> f64 {
    if small_steps {
        0.0175
    } else {
        0.0875
    }
}

/// Allowed per-spin error for the step controllers. Tighter in "small
/// steps" mode.
pub fn allowed_spin_error(small_steps: bool) -> f64 {
    if small_steps {
        0.000175
    } else {
        0.00175
    }
}

pub struct Grid {
    width: usize,
    depth: usize,
    cells: Vec<Cell>,

    m0: Vec<Vector3>,

    h: Vec<Vector3>,
    h0: Vec<Vector3>,
    h_demag: Vec<Vector3>,

    torque: Vec<Vector3>,
    torque0: Vec<Vector3>,

    energy_density: Vec<f64>,
    energy_density1: Vec<f64>,

    demag: Option<DemagKernel>,
    applied: Box<dyn AppliedField>,

    ms: f64,
    cellsize: f64,
    exchange_coef: f64,
    eight_neighbor: bool,
    thickness_sum: f64,

    do_precess: bool,
    gyratio: f64,
    damp_coef: f64,
    small_steps: bool,

    step_size: f64,
    step_size0: f64,
    next_step_size: f64,
    initial_step_size: f64,
    ode_iter_count: u32,

    h_valid: bool,
    torque_valid: bool,
    energy_valid: bool,

    energy: f64,
    exch_energy: f64,
    anis_energy: f64,
    demag_energy: f64,
    zeeman_energy: f64,

    step_total: u64,
    reject_total: u64,
    h_update_count: u64,

    seed: u64,
    rng: Pcg32,

    mag_init_name: String,
    mag_init_args: Vec<f64>,
}

impl Grid {
    pub fn new(config: &Configuration, applied: Box<dyn AppliedField>) -> Result<Grid> {
        config.validate()?;

        let width = (config.part_width / config.cellsize).round().max(1.0) as usize;
        let depth = (config.part_height / config.cellsize).round().max(1.0) as usize;
        let n = width * depth;

        let mu0_ms2 = MU0 * config.ms * config.ms;
        let mut cells = Vec::with_capacity(n);
        for _ in 0..n {
            let mut cell = Cell::new(1.0);
            match config.anisotropy_type {
                AnisotropyType::Uniaxial => {
                    cell.init_anis_dirs(config.anis_dir_a, None, None)?;
                }
                AnisotropyType::Cubic => {
                    let dir_c = config.anis_dir_a.cross(&config.anis_dir_b).normalized();
                    cell.init_anis_dirs(config.anis_dir_a, Some(config.anis_dir_b), Some(dir_c))?;
                }
            }
            cell.set_k1(config.k1, config.ms);
            cells.push(cell);
        }

        let exchange_coef = config.a / (mu0_ms2 * config.cellsize * config.cellsize);

        let demag = if config.demag_routine == "none" {
            None
        } else {
            Some(DemagKernel::new(width, depth))
        };

        let seed = config.seed;
        let rng = if seed == 0 { Pcg32::from_entropy() } else { Pcg32::seed_from_u64(seed) };

        let mut grid = Grid {
            width,
            depth,
            cells,
            m0: vec![Vector3::ZERO; n],
            h: vec![Vector3::ZERO; n],
            h0: vec![Vector3::ZERO; n],
            h_demag: vec![Vector3::ZERO; n],
            torque: vec![Vector3::ZERO; n],
            torque0: vec![Vector3::ZERO; n],
            energy_density: vec![0.0; n],
            energy_density1: vec![0.0; n],
            demag,
            applied,
            ms: config.ms,
            cellsize: config.cellsize,
            exchange_coef,
            eight_neighbor: true,
            thickness_sum: n as f64,
            do_precess: config.precession,
            gyratio: config.gyratio,
            damp_coef: config.damp_coef,
            small_steps: config.small_steps,
            step_size: config.initial_increment.max(f64::EPSILON),
            step_size0: config.initial_increment.max(f64::EPSILON),
            next_step_size: config.initial_increment.max(f64::EPSILON),
            initial_step_size: config.initial_increment.max(f64::EPSILON),
            ode_iter_count: 0,
            h_valid: false,
            torque_valid: false,
            energy_valid: false,
            energy: f64::MAX,
            exch_energy: 0.0,
            anis_energy: 0.0,
            demag_energy: 0.0,
            zeeman_energy: 0.0,
            step_total: 0,
            reject_total: 0,
            h_update_count: 0,
            seed,
            rng,
            mag_init_name: config.mag_init.name.clone(),
            mag_init_args: config.mag_init.args.clone(),
        };

        grid.apply_geometry(config.part_shape, config.shape_parameter);
        grid.compute_ny_corrections();
        grid.thickness_sum = grid.cells.iter().map(|c| c.thickness).sum();
        grid.init_magnetization()?;
        grid.build_neighbor_graph();
        debug!(
            "constructed grid {}x{} cells, thickness_sum={:.3}, demag={}",
            width,
            depth,
            grid.thickness_sum,
            grid.demag.is_some()
        );
        Ok(grid)
    }

    fn idx(&self, i: usize, k: usize) -> usize {
        i * self.depth + k
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn spin_at(&self, i: usize, k: usize) -> Vector3 {
        self.cells[self.idx(i, k)].spin
    }

    /// Zeros cell thickness outside the requested shape. Rectangle is the
    /// no-op default; the rest follow `Grid2D::InitEllipse`/`InitEllipsoid`/
    /// `InitOval`/`InitPyramid`. `Mask` (image-file loading) is left to an
    /// outer harness and treated like Rectangle here.
    fn apply_geometry(&mut self, shape: PartShape, parameter: f64) {
        let (nx, nz) = (self.width, self.depth);
        match shape {
            PartShape::Rectangle | PartShape::Mask => {}
            PartShape::Ellipse => {
                if nx >= 2 && nz >= 2 {
                    for i in 0..nx {
                        let x = (2 * i + 1) as f64 / nx as f64 - 1.0;
                        for k in 0..nz {
                            let z = (2 * k + 1) as f64 / nz as f64 - 1.0;
                            if x * x + z * z > 1.0 + f64::EPSILON.sqrt() {
                                let idx = self.idx(i, k);
                                self.cells[idx].set_thickness(0.0);
                            }
                        }
                    }
                }
            }
            PartShape::Ellipsoid => {
                if nx >= 2 && nz >= 2 {
                    for i in 0..nx {
                        let x = (2 * i + 1) as f64 / nx as f64 - 1.0;
                        for k in 0..nz {
                            let z = (2 * k + 1) as f64 / nz as f64 - 1.0;
                            let radsq = x * x + z * z;
                            let idx = self.idx(i, k);
                            if radsq >= 1.0 {
                                self.cells[idx].set_thickness(0.0);
                            } else {
                                self.cells[idx].set_thickness((1.0 - radsq).sqrt());
                            }
                        }
                    }
                }
            }
            PartShape::Oval => {
                let rounded = parameter.clamp(0.0, 1.0);
                let radius = 0.5 * rounded * (nx.min(nz) as f64);
                let radsq = radius * radius;
                let cx1 = radius - 0.5;
                let cx2 = nx as f64 - 0.5 - radius;
                let cz1 = radius - 0.5;
                let cz2 = nz as f64 - 0.5 - radius;
                if cx1 <= cx2 && cz1 <= cz2 {
                    for i in 0..nx {
                        for k in 0..nz {
                            let near_left = (i as f64) < cx1.floor();
                            let near_right = (i as f64) >= cx2.ceil();
                            let near_bottom = (k as f64) < cz1.floor();
                            let near_top = (k as f64) >= cz2.ceil();
                            let corner = (near_left || near_right) && (near_bottom || near_top);
                            if !corner {
                                continue;
                            }
                            let cx = if near_left { cx1 } else { cx2 };
                            let cz = if near_bottom { cz1 } else { cz2 };
                            let xdistsq = (cx - i as f64).powi(2);
                            let zdistsq = (cz - k as f64).powi(2);
                            if xdistsq + zdistsq > radsq + f64::EPSILON.sqrt() {
                                let idx = self.idx(i, k);
                                self.cells[idx].set_thickness(0.0);
                            }
                        }
                    }
                }
            }
            PartShape::Pyramid => {
                let base_width = parameter;
                for i in 0..nx {
                    let edge_x_dist = i.min(nx - 1 - i);
                    for k in 0..nz {
                        let edge_z_dist = k.min(nz - 1 - k);
                        let edge_dist = edge_x_dist.min(edge_z_dist) as f64 + 0.5;
                        let thick = if edge_dist < base_width && base_width > 0.0 {
                            edge_dist / base_width
                        } else {
                            1.0
                        };
                        let idx = self.idx(i, k);
                        self.cells[idx].set_thickness(thick);
                    }
                }
            }
        }
    }

    /// `Ny_correction` trims the out-of-plane self-demag term for cells with
    /// less than full thickness, so that `base_N + correction` still sums
    /// to 1 across the three self-demag axes for that cell's actual
    /// thickness. Grounded on `Grid2D::Grid2D`'s post-geometry pass over
    /// `MagElt::SetNyCorrection`: full- or zero-thickness cells need no
    /// correction; partial-thickness cells get `1 - thickness`.
    fn compute_ny_corrections(&mut self) {
        for cell in self.cells.iter_mut() {
            let thick = cell.thickness;
            if thick == 1.0 || thick <= 0.0 {
                cell.set_ny_correction(0.0);
            } else {
                cell.set_ny_correction(1.0 - thick);
            }
        }
    }

    fn init_magnetization(&mut self) -> Result<()> {
        let grid = mag_init::initialize(
            &self.mag_init_name,
            &self.mag_init_args,
            self.width,
            self.depth,
            &mut self.rng,
            None,
        )?;
        for i in 0..self.width {
            for k in 0..self.depth {
                let idx = self.idx(i, k);
                let spin_ext = grid[i][k];
                self.cells[idx].spin = crate::coords::ext_to_int(spin_ext).normalized();
            }
        }
        Ok(())
    }

    /// Builds the exchange-neighbor graph. Grounded in
    /// `Grid2D::FindNeighbors`: an 8-neighbor stencil with Neumann boundary
    /// clamping at the grid edge, and irregular-boundary handling that
    /// substitutes an axis-aligned neighbor when a diagonal neighbor has
    /// zero thickness.
    fn build_neighbor_graph(&mut self) {
        const IOFF: [i64; 8] = [1, 1, 0, -1, -1, -1, 0, 1];
        const KOFF: [i64; 8] = [0, 1, 1, 1, 0, -1, -1, -1];
        let (nx, nz) = (self.width as i64, self.depth as i64);

        for i in 0..self.width {
            for k in 0..self.depth {
                let my_idx = self.idx(i, k);
                let my_thick = self.cells[my_idx].thickness;
                if my_thick <= 0.0 {
                    continue;
                }
                let my_thin = 1.0 / my_thick;

                let step = if self.eight_neighbor { 1 } else { 2 };
                let mut links = Vec::new();
                let mut offset = 0usize;
                while offset < 8 {
                    let mut it = i as i64 + IOFF[offset];
                    let mut kt = k as i64 + KOFF[offset];
                    offset += step;

                    it = it.clamp(0, nx - 1);
                    kt = kt.clamp(0, nz - 1);
                    if it == i as i64 && kt == k as i64 {
                        continue;
                    }

                    let mut it = it as usize;
                    let mut kt = kt as usize;
                    if self.cells[self.idx(it, kt)].thickness <= 0.0 {
                        if it == i || kt == k {
                            // axis-aligned neighbor with no thickness: no
                            // alternate routing, drop the link.
                            continue;
                        }
                        let alt_a_thick = self.cells[self.idx(i, kt)].thickness;
                        let alt_b_thick = self.cells[self.idx(it, k)].thickness;
                        let a_ok = alt_a_thick > 0.0;
                        let b_ok = alt_b_thick > 0.0;
                        if a_ok == b_ok {
                            // neither or both intermediate cells present:
                            // no unambiguous diagonal route.
                            continue;
                        }
                        if a_ok {
                            it = i;
                        } else {
                            kt = k;
                        }
                    }

                    let ngbr_idx = self.idx(it, kt);
                    let ngbr_thick = self.cells[ngbr_idx].thickness;
                    let weight = crate::cell::exchange_link_weight(my_thick, ngbr_thick) * my_thin;
                    links.push(CellLink { index: ngbr_idx, weight });
                }
                self.cells[my_idx].setup_neighbors(links).expect("8-neighbor stencil never exceeds MAX_NEIGHBORS");
            }
        }
    }

    pub fn reset(&mut self, config: &Configuration) -> Result<()> {
        self.rng = if self.seed == 0 { Pcg32::from_entropy() } else { Pcg32::seed_from_u64(self.seed) };
        self.mag_init_name = config.mag_init.name.clone();
        self.mag_init_args = config.mag_init.args.clone();
        self.init_magnetization()?;
        self.step_size0 = self.initial_step_size;
        self.step_size = self.initial_step_size;
        self.next_step_size = self.initial_step_size;
        self.ode_iter_count = 0;
        self.mark_h_invalid();
        debug!("grid reset, seed={}", self.seed);
        Ok(())
    }

    pub fn mark_h_invalid(&mut self) {
        self.h_valid = false;
        self.torque_valid = false;
    }

    pub fn perturb(&mut self, max_mag: f64) {
        for cell in self.cells.iter_mut() {
            cell.perturb(max_mag, &mut self.rng);
        }
        self.h_valid = false;
        self.torque_valid = false;
        self.energy_valid = false;
    }

    pub fn get_step_stats(&self) -> (u64, u64) {
        (self.step_total, self.reject_total)
    }

    pub fn get_h_update_count(&self) -> u64 {
        self.h_update_count
    }

    pub fn get_time_step(&self) -> f64 {
        self.step_size / (self.gyratio * self.damp_coef * self.ms)
    }

    fn convert_time_to_step_size(&self, time: f64) -> f64 {
        time * self.gyratio * self.damp_coef * self.ms
    }

    pub fn get_step_size(&self) -> f64 {
        self.step_size
    }

    pub fn get_average_magnetization(&self) -> Vector3 {
        let mut acc = Vector3::ZERO;
        let mut weight = 0.0;
        for cell in &self.cells {
            acc += cell.spin.scale(cell.thickness);
            weight += cell.thickness;
        }
        if weight > 0.0 {
            crate::coords::int_to_ext(acc.scale(1.0 / weight))
        } else {
            Vector3::ZERO
        }
    }

    pub fn get_energy_density(&self) -> f64 {
        self.energy
    }

    pub fn get_energy_densities(&self) -> (f64, f64, f64, f64, f64) {
        (self.exch_energy, self.anis_energy, self.demag_energy, self.zeeman_energy, self.energy)
    }

    pub fn set_applied_field(&mut self, field: Vector3) {
        self.applied.set_nominal_field(field);
        self.ode_iter_count = 0;
        self.mark_h_invalid();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applied_field::Uniform;
    use crate::config::{AnisotropyType, NamedCall, PartShape};
    use crate::vector::Vector3;

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
            demag_routine: "internal".to_string(),
            part_width: 50.0,
            part_height: 50.0,
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
            seed: 7,
            min_time_step: 1e-6,
            max_time_step: 1.0,
            small_steps: false,
            output_formats: vec![],
        }
    }

    #[test]
    fn construction_produces_unit_spins() {
        let cfg = base_config();
        let grid = Grid::new(&cfg, Box::new(Uniform::new(Vector3::ZERO))).unwrap();
        for i in 0..grid.width() {
            for k in 0..grid.depth() {
                assert!((grid.spin_at(i, k).mag() - 1.0).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn ellipse_geometry_zeros_corner_thickness() {
        let mut cfg = base_config();
        cfg.part_shape = PartShape::Ellipse;
        let grid = Grid::new(&cfg, Box::new(Uniform::new(Vector3::ZERO))).unwrap();
        let corner = grid.cells[0].thickness;
        let center_idx = grid.idx(grid.width() / 2, grid.depth() / 2);
        let center = grid.cells[center_idx].thickness;
        assert_eq!(corner, 0.0);
        assert!(center > 0.0);
    }
}
