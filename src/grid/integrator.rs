//! Time-step controllers. Grounded in `Grid2D::StepEuler`/`StepPredict2`/
//! `IncRungeKutta4`/`StepRungeKutta4`/`StepODE`.
//!
//! The source selects exactly one of Euler/RK4/Predict2 at compile time
//! (`PREDICTOR_2_ODE` is the branch actually built); here all three are kept
//! as separate methods the caller picks between, defaulting to
//! `step_predict2` to match that default (see DESIGN.md).

use super::{allowed_spin_error, max_torque_step, Grid};
use crate::vector::Vector3;
use log::{debug, warn};

const PERTURB_RETRIES: u32 = 2;
const PERTURBATION_SIZE: f64 = 0.04;

pub enum Stepper {
    Euler,
    RungeKutta4,
    Predict2,
}

impl Grid {
    /// First-order predictor with an energy-based accept/reject test.
    /// `CutRatio=0.5`, `IncreaseRatio=1.1`.
    fn step_euler(&mut self, minstep: f64, maxtorque: f64, next_step_size: &mut f64) -> bool {
        const CUT_RATIO: f64 = 0.5;
        const INCREASE_RATIO: f64 = 1.1;
        let eps = f64::EPSILON;
        let allowed = allowed_spin_error(self.small_steps);
        let n = self.width * self.depth;

        self.m0.copy_from_slice(&self.cells.iter().map(|c| c.spin).collect::<Vec<_>>());
        std::mem::swap(&mut self.h, &mut self.h0);

        let orig_energy = self.energy;
        let de_dt_base = self.get_de_dt();
        let mut step_size = self.step_size;

        loop {
            if step_size <= minstep || step_size * CUT_RATIO * maxtorque < eps {
                std::mem::swap(&mut self.h, &mut self.h0);
                for (cell, &m0) in self.cells.iter_mut().zip(self.m0.iter()) {
                    cell.spin = m0;
                }
                self.energy = orig_energy;
                self.step_size = 0.0;
                return false;
            }

            let predicted_change = de_dt_base * step_size;
            for i in 0..n {
                let torque_i = self.torque[i];
                let m0 = self.m0[i];
                let factor = 1.0 - 0.5 * step_size * step_size * torque_i.magsq();
                let mut m = m0.scale(factor) + torque_i.scale(step_size);
                m.precise_normalize();
                self.cells[i].spin = m;
            }

            self.h_valid = false;
            self.h_update();
            self.calculate_energy();
            let actual_change = self.energy - orig_energy;

            if actual_change < eps && (actual_change - predicted_change).abs() < allowed * n as f64 {
                *next_step_size = step_size * (1.0 + (INCREASE_RATIO - 1.0) * (1.0 - allowed));
                self.step_size = step_size;
                std::mem::swap(&mut self.torque, &mut self.torque0);
                self.calculate_torque();
                return true;
            }

            step_size = (step_size * CUT_RATIO).max(minstep);
        }
    }

    /// One classical RK4 increment with no step-size control of its own;
    /// `fast` selects `h_fast_update` over a full `h_update` for the interior
    /// evaluations.
    fn inc_runge_kutta4(&mut self, m_in: &[Vector3], step: f64, fast: bool) -> Vec<Vector3> {
        let n = self.width * self.depth;
        let mut m_out = m_in.to_vec();

        for (i, cell) in self.cells.iter_mut().enumerate() {
            cell.spin = m_in[i];
        }
        self.calculate_torque();
        for i in 0..n {
            m_out[i] += self.torque[i].scale(step / 6.0);
        }
        let mut mid = vec![Vector3::ZERO; n];
        for i in 0..n {
            let mut m = m_in[i] + self.torque[i].scale(step / 2.0);
            m.precise_normalize();
            mid[i] = m;
        }
        for (i, cell) in self.cells.iter_mut().enumerate() {
            cell.spin = mid[i];
        }
        if fast {
            self.h_fast_update();
        } else {
            self.h_update();
        }
        self.calculate_torque();
        for i in 0..n {
            m_out[i] += self.torque[i].scale(step / 3.0);
        }
        let mut mid2 = vec![Vector3::ZERO; n];
        for i in 0..n {
            let mut m = m_in[i] + self.torque[i].scale(step / 2.0);
            m.precise_normalize();
            mid2[i] = m;
        }
        for (i, cell) in self.cells.iter_mut().enumerate() {
            cell.spin = mid2[i];
        }
        if fast {
            self.h_fast_update();
        } else {
            self.h_update();
        }
        self.calculate_torque();
        for i in 0..n {
            m_out[i] += self.torque[i].scale(step / 3.0);
        }
        let mut fin = vec![Vector3::ZERO; n];
        for i in 0..n {
            let mut m = m_in[i] + self.torque[i].scale(step);
            m.precise_normalize();
            fin[i] = m;
        }
        for (i, cell) in self.cells.iter_mut().enumerate() {
            cell.spin = fin[i];
        }
        if fast {
            self.h_fast_update();
        } else {
            self.h_update();
        }
        self.calculate_torque();
        for i in 0..n {
            m_out[i] += self.torque[i].scale(step / 6.0);
            m_out[i].precise_normalize();
        }
        m_out
    }

    /// Step-doubling (full step vs. two half steps) RK4 controller.
    /// `SafetyFactor=0.8`, `HeadRoom=0.9`.
    fn step_runge_kutta4(&mut self, minstep: f64, _maxtorque: f64, next_step_size: &mut f64, forcestep: bool) -> bool {
        const SAFETY_FACTOR: f64 = 0.8;
        const HEAD_ROOM: f64 = 0.9;
        let allowed = allowed_spin_error(self.small_steps);
        let n = self.width * self.depth;

        let m0: Vec<Vector3> = self.cells.iter().map(|c| c.spin).collect();
        std::mem::swap(&mut self.h, &mut self.h0);
        let oldenergy = self.energy;

        let mut full_step = self.step_size;
        loop {
            let half = full_step / 2.0;
            let m1_half = self.inc_runge_kutta4(&m0, half, true);
            let m2 = self.inc_runge_kutta4(&m1_half, half, true);
            let m1_full = self.inc_runge_kutta4(&m0, full_step, false);

            let mut error = 0.0_f64;
            for i in 0..n {
                error = error.max((m2[i] - m1_full[i]).mag());
            }
            error = error.max(allowed / 1024.0);

            *next_step_size = full_step * (allowed / error).powf(0.2) * SAFETY_FACTOR;

            if error > allowed && !forcestep {
                full_step = (*next_step_size).max(minstep);
                if full_step <= minstep {
                    for (cell, &m) in self.cells.iter_mut().zip(m0.iter()) {
                        cell.spin = m;
                    }
                    std::mem::swap(&mut self.h, &mut self.h0);
                    self.step_size = 0.0;
                    return false;
                }
                continue;
            }

            for (cell, &m) in self.cells.iter_mut().zip(m2.iter()) {
                cell.spin = m;
            }
            self.h_valid = false;
            self.h_update();
            self.calculate_energy();

            if self.energy >= oldenergy + f64::EPSILON && !forcestep {
                *next_step_size /= 2.0;
                full_step = (*next_step_size).max(minstep);
                if full_step <= minstep {
                    for (cell, &m) in self.cells.iter_mut().zip(m0.iter()) {
                        cell.spin = m;
                    }
                    std::mem::swap(&mut self.h, &mut self.h0);
                    self.step_size = 0.0;
                    return false;
                }
                continue;
            }

            self.step_size = full_step;
            *next_step_size *= HEAD_ROOM;
            self.calculate_torque();
            return true;
        }
    }

    /// Second-order predictor/corrector, the source's default stepper.
    /// Falls back to `step_runge_kutta4` on the first call of a run
    /// (`ode_iter_count < 1`).
    fn step_predict2(&mut self, minstep: f64, maxtorque: f64, next_step_size: &mut f64) -> bool {
        if self.ode_iter_count < 1 {
            return self.step_runge_kutta4(minstep, maxtorque, next_step_size, false);
        }

        const UPPER_CUT_RATIO: f64 = 0.8;
        const LOWER_CUT_RATIO: f64 = 0.1;
        const UPPER_INCREASE_RATIO: f64 = 1.2;
        const LOWER_INCREASE_RATIO: f64 = 0.5;
        const ASE_AIM_RATIO: f64 = 0.5;
        const ALLOWED_ENERGY_ERROR_RATIO: f64 = 0.67;
        const ENERGY_HEADROOM: f64 = 0.8;
        const ERROR_ADJ_EXP: f64 = 1.0 / 3.0;

        let n = self.width * self.depth;
        let m0: Vec<Vector3> = self.cells.iter().map(|c| c.spin).collect();
        std::mem::swap(&mut self.h, &mut self.h0);
        let orig_energy = self.energy;
        let de_dt_base = self.get_de_dt();

        let relstep = self.step_size / self.step_size0;
        let t0coef = -0.5 * relstep * self.step_size;
        let tcoef = self.step_size * (1.0 + 0.5 * relstep);

        let mut m1: Vec<Vector3> = (0..n)
            .map(|i| {
                let mut m = m0[i] + self.torque0[i].scale(t0coef) + self.torque[i].scale(tcoef);
                m.precise_normalize();
                m
            })
            .collect();

        loop {
            let allowed_solver_error = allowed_spin_error(self.small_steps).min(0.2 * self.step_size * maxtorque);

            for (cell, &m) in self.cells.iter_mut().zip(m1.iter()) {
                cell.spin = m;
            }
            self.h_valid = false;
            self.h_update();
            let torque1: Vec<Vector3> = {
                self.calculate_torque();
                self.torque.clone()
            };

            let t1coef = self.step_size / 2.0;
            let mut corrected = vec![Vector3::ZERO; n];
            let mut error = 0.0_f64;
            for i in 0..n {
                let mut v = m0[i] + self.torque[i].scale(t1coef) + torque1[i].scale(t1coef);
                v.precise_normalize();
                error = error.max((m1[i] - v).mag());
                corrected[i] = v;
            }
            error /= 6.0;

            for (cell, &m) in self.cells.iter_mut().zip(corrected.iter()) {
                cell.spin = m;
            }
            self.h_valid = false;
            self.h_update();
            self.calculate_energy();
            self.calculate_torque();
            let de_dt_1 = self.get_de_dt();
            let actual_energy_change = -self.calculate_energy_difference();
            let expected_energy_change = (de_dt_base + de_dt_1) * self.step_size / 2.0;
            let energy_slack = 2.0 * orig_energy.abs() * f64::EPSILON;

            let accept = error < allowed_solver_error
                && expected_energy_change < energy_slack
                && actual_energy_change < expected_energy_change * ALLOWED_ENERGY_ERROR_RATIO + energy_slack;

            if accept {
                let energy_adj_ratio = if expected_energy_change.abs() < f64::EPSILON || actual_energy_change > expected_energy_change {
                    LOWER_INCREASE_RATIO
                } else {
                    (ENERGY_HEADROOM * expected_energy_change / actual_energy_change.max(f64::EPSILON)).sqrt()
                };
                let pc_adj_ratio = if error > 0.0 {
                    (ASE_AIM_RATIO * allowed_solver_error / error).powf(ERROR_ADJ_EXP)
                } else {
                    UPPER_INCREASE_RATIO
                };
                let adj_ratio = energy_adj_ratio.min(pc_adj_ratio).clamp(LOWER_INCREASE_RATIO, UPPER_INCREASE_RATIO);
                *next_step_size = adj_ratio * self.step_size;
                self.step_size0 = self.step_size;
                return true;
            }

            let energy_adj_ratio = if actual_energy_change > expected_energy_change || expected_energy_change < energy_slack {
                0.0
            } else {
                (ENERGY_HEADROOM * actual_energy_change.max(f64::EPSILON) / expected_energy_change).sqrt()
            };
            let pc_adj_ratio = if error >= allowed_solver_error {
                (ASE_AIM_RATIO * allowed_solver_error / error).powf(ERROR_ADJ_EXP)
            } else {
                UPPER_CUT_RATIO
            };
            let adj_ratio = energy_adj_ratio.min(pc_adj_ratio).clamp(LOWER_CUT_RATIO, UPPER_CUT_RATIO);
            self.step_size = (self.step_size * adj_ratio).max(minstep);

            if self.step_size <= minstep {
                for (cell, &m) in self.cells.iter_mut().zip(m0.iter()) {
                    cell.spin = m;
                }
                std::mem::swap(&mut self.h, &mut self.h0);
                self.energy = orig_energy;
                self.step_size = 0.0;
                return false;
            }

            let relstep = self.step_size / self.step_size0;
            let t0coef = -0.5 * relstep * self.step_size;
            let tcoef = self.step_size * (1.0 + 0.5 * relstep);
            m1 = (0..n)
                .map(|i| {
                    let mut m = m0[i] + self.torque0[i].scale(t0coef) + self.torque[i].scale(tcoef);
                    m.precise_normalize();
                    m
                })
                .collect();
        }
    }

    fn convert_time_to_step_size(&self, time: f64) -> f64 {
        time * self.gyratio * self.damp_coef * self.ms
    }

    /// Outer step controller: clamps the step size so `step*maxtorque` stays
    /// under `MaxTorqueStep`, runs the selected stepper, falls back to a
    /// forced RK4 step on failure, and retries with a perturbation up to
    /// `PERTURB_RETRIES` times if that also fails.
    ///
    /// Returns `(mxh, errorcode)`: `errorcode > 0` is fatal (caller should
    /// stop), `errorcode < 0` is the (negated) number of perturbation
    /// retries used to recover, `0` means a clean step.
    pub fn step_ode(&mut self, stepper: Stepper, min_timestep: f64, max_timestep: f64) -> (f64, i32) {
        let minstep = self.convert_time_to_step_size(min_timestep);
        let maxstep = self.convert_time_to_step_size(max_timestep);

        if !self.h_valid {
            self.h_update();
        }
        let mut maxtorque = self.get_max_torque();
        if !self.energy_valid {
            self.calculate_energy();
        }

        let max_torque_step_val = max_torque_step(self.small_steps);
        let mut perturb_count = 0u32;

        loop {
            let eps_floor = if maxtorque > 0.0 { f64::EPSILON / maxtorque } else { minstep };
            self.step_size = self.step_size.max(minstep).max(eps_floor).min(maxstep);
            if maxtorque > 0.0 && self.step_size * maxtorque > max_torque_step_val {
                self.step_size = max_torque_step_val / maxtorque;
            }

            let mut next_step_size = self.next_step_size;
            let ok = match stepper {
                Stepper::Euler => self.step_euler(minstep, maxtorque, &mut next_step_size),
                Stepper::RungeKutta4 => self.step_runge_kutta4(minstep, maxtorque, &mut next_step_size, false),
                Stepper::Predict2 => self.step_predict2(minstep, maxtorque, &mut next_step_size),
            };

            if ok {
                self.next_step_size = next_step_size;
                if maxtorque > 0.0 && self.next_step_size * maxtorque > max_torque_step_val {
                    self.next_step_size = max_torque_step_val / maxtorque;
                }
                self.ode_iter_count += 1;
                self.step_total += 1;
                let mxh = self.get_mx_h(maxtorque);
                return (mxh, -(perturb_count as i32));
            }

            self.reject_total += 1;
            debug!("step rejected, forcing a fallback RK4 step (reject_total={})", self.reject_total);

            let forced_step = if maxtorque > 0.0 { max_torque_step_val / maxtorque } else { minstep };
            self.step_size = forced_step.max(minstep);
            if self.step_runge_kutta4(minstep, maxtorque, &mut next_step_size, true) {
                self.next_step_size = next_step_size;
                self.ode_iter_count += 1;
                self.step_total += 1;
                let mxh = self.get_mx_h(maxtorque);
                return (mxh, -(perturb_count as i32));
            }

            if perturb_count >= PERTURB_RETRIES {
                warn!("step failed after {} perturbation retries, giving up", PERTURB_RETRIES);
                return (0.0, 1);
            }
            perturb_count += 1;
            warn!("forced step also failed, perturbing state (attempt {}/{})", perturb_count, PERTURB_RETRIES);
            self.perturb(PERTURBATION_SIZE);
            self.h_update();
            self.calculate_energy();
            maxtorque = self.get_max_torque();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applied_field::Uniform;
    use crate::config::{AnisotropyType, Configuration, NamedCall, PartShape};
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
            demag_routine: "none".to_string(),
            part_width: 20.0,
            part_height: 20.0,
            part_thickness: 5.0,
            cellsize: 5.0,
            part_shape: PartShape::Rectangle,
            shape_parameter: 0.0,
            mag_init: NamedCall::new("uniform", vec![10.0, 0.0]),
            applied_field: vec![],
            field_range: vec![],
            default_control_point: "-torque 1e-5".to_string(),
            precession: true,
            gyratio: 2.21e5,
            damp_coef: 0.5,
            initial_increment: 0.005,
            seed: 11,
            min_time_step: 1e-15,
            max_time_step: 1e-9,
            small_steps: false,
            output_formats: vec![],
        }
    }

    #[test]
    fn step_ode_with_predict2_reduces_max_torque_toward_field() {
        let cfg = base_config();
        let mut grid = Grid::new(&cfg, Box::new(Uniform::new(Vector3::new(0.0, 0.0, 8e4)))).unwrap();
        let before = grid.get_max_torque();
        let (_, errorcode) = grid.step_ode(Stepper::Predict2, cfg.min_time_step, cfg.max_time_step);
        assert!(errorcode <= 0);
        let after = grid.get_max_torque();
        assert!(after <= before + 1e-6);
    }

    #[test]
    fn step_ode_with_euler_does_not_return_fatal_on_a_well_posed_step() {
        let cfg = base_config();
        let mut grid = Grid::new(&cfg, Box::new(Uniform::new(Vector3::new(0.0, 0.0, 8e4)))).unwrap();
        let (_, errorcode) = grid.step_ode(Stepper::Euler, cfg.min_time_step, cfg.max_time_step);
        assert!(errorcode <= 0);
    }
}
