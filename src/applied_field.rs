//! Applied (Zeeman) field sources.
//!
//! Grounded in OOMMF's `Zeeman` class hierarchy (`app/mmsolve/zeeman.h`/
//! `.cc`): `Uniform` mirrors `UniformZeeman`, `Ribbon` mirrors
//! `RibbonZeeman::FieldCalc`'s closed-form line-charge field, `Tie` mirrors
//! `TieZeeman`'s fixed-value strip, and `Multi` mirrors `MultiZeeman`'s
//! composite sum. `File`/`FileSequence` reproduce `FileZeeman`/
//! `FileSeqZeeman`'s role as a zero-order-hold lookup, but defer actual file
//! parsing to the `FileSource` trait: OVF/VIO decoding is an outer-harness
//! concern this crate does not implement (see lib.rs's scope note).
//!
//! All fields here are expressed in the external xyz coordinate system; the
//! grid is responsible for rotating into its internal xzy layout (see
//! `coords`).

use crate::errors::Result;
use crate::vector::Vector3;

/// A source of per-cell applied field, evaluated at a physical (x, y)
/// position in the external coordinate system.
pub trait AppliedField {
    fn field_at(&self, x: f64, y: f64) -> Vector3;

    /// Called when the nominal field step changes (e.g. a field-sweep
    /// schedule advancing to its next value). Most sources ignore this;
    /// `Tie` always ignores it, matching `TieZeeman::SetNomField`.
    fn set_nominal_field(&mut self, _field: Vector3) {}
}

/// A spatially uniform field equal to the nominal value everywhere.
#[derive(Debug, Copy, Clone)]
pub struct Uniform {
    pub field: Vector3,
}

impl Uniform {
    pub fn new(field: Vector3) -> Uniform {
        Uniform { field }
    }
}

impl AppliedField for Uniform {
    fn field_at(&self, _x: f64, _y: f64) -> Vector3 {
        self.field
    }

    fn set_nominal_field(&mut self, field: Vector3) {
        self.field = field;
    }
}

/// Field due to a uniformly charged ribbon (a 3D rectangular line charge of
/// height `rib_height`, from `(x0,y0)` to `(x1,y1)`), relative charge
/// `rel_charge / (4*pi)`.
#[derive(Debug, Copy, Clone)]
pub struct Ribbon {
    rel_charge: f64,
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    rib_height: f64,
    par: Vector3,
    perp: Vector3,
    rib_length: f64,
}

impl Ribbon {
    pub fn new(rel_charge: f64, x0: f64, y0: f64, x1: f64, y1: f64, rib_height: f64) -> Ribbon {
        let dx = x1 - x0;
        let dy = y1 - y0;
        let rib_length = (dx * dx + dy * dy).sqrt();
        let par = if rib_length > 0.0 {
            Vector3::new(dx / rib_length, dy / rib_length, 0.0)
        } else {
            Vector3::new(1.0, 0.0, 0.0)
        };
        let perp = Vector3::new(-par.y, par.x, 0.0);
        Ribbon {
            rel_charge: rel_charge / (4.0 * std::f64::consts::PI),
            x0,
            y0,
            x1,
            y1,
            rib_height,
            par,
            perp,
            rib_length,
        }
    }

    /// Field at the origin of a ribbon running from `(dpar, dperp)` to
    /// `(dpar + rib_length, dperp)` (in the ribbon's own parallel/perp
    /// frame), split into components parallel and perpendicular to the
    /// ribbon. Recurses once if the parallel span crosses the x=0 octant
    /// boundary, matching the source's piecewise decomposition.
    fn field_calc(&self, dpar: f64, rib_length: f64, dperp: f64) -> (f64, f64) {
        const EPSILON: f64 = 1e-15;

        if dpar < 0.0 && dpar + rib_length > 0.0 {
            let (hpar_a, hperp_a) = self.field_calc(dpar, -dpar, dperp);
            let (hpar_b, hperp_b) = self.field_calc(0.0, dpar + rib_length, dperp);
            return (hpar_a + hpar_b, hperp_a + hperp_b);
        }

        let radbot0sq = dpar * dpar + dperp * dperp;
        let radbot1sq = (dpar + rib_length).powi(2) + dperp * dperp;
        let radtop0 = (radbot0sq + (self.rib_height / 2.0).powi(2)).sqrt();
        let radtop1 = (radbot1sq + (self.rib_height / 2.0).powi(2)).sqrt();

        let mut hpar = if radbot0sq < EPSILON * EPSILON {
            -1.0 / (EPSILON * EPSILON)
        } else if radbot1sq < EPSILON * EPSILON {
            1.0 / (EPSILON * EPSILON)
        } else {
            let temp0 = self.rib_height / 2.0 + radtop0;
            let temp1 = self.rib_height / 2.0 + radtop1;
            (temp1 * temp1 * radbot0sq / (temp0 * temp0 * radbot1sq)).ln()
        };

        let mut hperp = if dperp.abs() < EPSILON && dpar.abs() < EPSILON {
            0.0
        } else {
            (dpar.abs() * self.rib_height).atan2(2.0 * dperp.abs() * radtop0)
        };
        if !(dperp.abs() < EPSILON && (dpar + rib_length).abs() < EPSILON) {
            hperp -= ((dpar + rib_length).abs() * self.rib_height).atan2(2.0 * dperp.abs() * radtop1);
        }
        hperp *= 2.0;

        if dpar < 0.0 {
            hperp *= -1.0;
        }
        if dperp < 0.0 {
            hperp *= -1.0;
        }

        hpar *= self.rel_charge;
        hperp *= self.rel_charge;
        (hpar, hperp)
    }
}

impl AppliedField for Ribbon {
    fn field_at(&self, x: f64, y: f64) -> Vector3 {
        let dpar = (self.x0 - x) * self.par.x + (self.y0 - y) * self.par.y;
        let dperp = (self.x0 - x) * self.perp.x + (self.y0 - y) * self.perp.y;
        let (hpar, hperp) = self.field_calc(dpar, self.rib_length, dperp);
        self.par.scale(hpar) + self.perp.scale(hperp)
    }
}

/// A fixed field over a ribbon-shaped strip; zero outside it and immune to
/// nominal-field updates (it models a permanently pinned boundary region,
/// not a swept external field).
#[derive(Debug, Copy, Clone)]
pub struct Tie {
    field: Vector3,
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    width: f64,
}

impl Tie {
    pub fn new(field: Vector3, x0: f64, y0: f64, x1: f64, y1: f64, width: f64) -> Tie {
        Tie { field, x0, y0, x1, y1, width }
    }

    fn inside(&self, x: f64, y: f64) -> bool {
        let dx = self.x1 - self.x0;
        let dy = self.y1 - self.y0;
        let len2 = dx * dx + dy * dy;
        if len2 <= 0.0 {
            return false;
        }
        let t = ((x - self.x0) * dx + (y - self.y0) * dy) / len2;
        if t < 0.0 || t > 1.0 {
            return false;
        }
        let proj_x = self.x0 + t * dx;
        let proj_y = self.y0 + t * dy;
        let perp_dist = ((x - proj_x).powi(2) + (y - proj_y).powi(2)).sqrt();
        perp_dist <= self.width / 2.0
    }
}

impl AppliedField for Tie {
    fn field_at(&self, x: f64, y: f64) -> Vector3 {
        if self.inside(x, y) {
            self.field
        } else {
            Vector3::ZERO
        }
    }
    // set_nominal_field intentionally left as the no-op default: a Tie
    // field never follows the nominal field schedule.
}

/// Interface an outer harness implements to supply field-map data read from
/// a file; this crate only consumes the decoded grid, never the file
/// format. See lib.rs's scope note.
pub trait FileSource {
    fn load(&self, path: &str) -> Result<Vec<Vec<Vector3>>>;
}

/// A single static field map loaded once, with a scalar multiplier applied.
pub struct File {
    data: Vec<Vec<Vector3>>,
    mult: f64,
}

impl File {
    pub fn new(data: Vec<Vec<Vector3>>, mult: f64) -> File {
        File { data, mult }
    }
}

impl AppliedField for File {
    fn field_at(&self, x: f64, y: f64) -> Vector3 {
        let i = (x.round().max(0.0)) as usize;
        let j = (y.round().max(0.0)) as usize;
        self.data
            .get(i)
            .and_then(|col| col.get(j))
            .copied()
            .unwrap_or(Vector3::ZERO)
            .scale(self.mult)
    }
}

/// A sequence of field maps indexed by field step, held fixed between
/// updates (zero-order hold), matching `FileSeqZeeman`.
pub struct FileSequence {
    frames: Vec<Vec<Vec<Vector3>>>,
    mult: f64,
    current: usize,
}

impl FileSequence {
    pub fn new(frames: Vec<Vec<Vec<Vector3>>>, mult: f64) -> FileSequence {
        FileSequence { frames, mult, current: 0 }
    }

    pub fn advance_to(&mut self, step: usize) {
        if step < self.frames.len() {
            self.current = step;
        }
    }
}

impl AppliedField for FileSequence {
    fn field_at(&self, x: f64, y: f64) -> Vector3 {
        let i = (x.round().max(0.0)) as usize;
        let j = (y.round().max(0.0)) as usize;
        self.frames
            .get(self.current)
            .and_then(|frame| frame.get(i))
            .and_then(|col| col.get(j))
            .copied()
            .unwrap_or(Vector3::ZERO)
            .scale(self.mult)
    }
}

/// Sum of several independent applied-field sources.
pub struct Multi {
    pub sources: Vec<Box<dyn AppliedField>>,
}

impl Multi {
    pub fn new(sources: Vec<Box<dyn AppliedField>>) -> Multi {
        Multi { sources }
    }
}

impl AppliedField for Multi {
    fn field_at(&self, x: f64, y: f64) -> Vector3 {
        self.sources.iter().fold(Vector3::ZERO, |acc, s| acc + s.field_at(x, y))
    }

    fn set_nominal_field(&mut self, field: Vector3) {
        for s in &mut self.sources {
            s.set_nominal_field(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_is_constant() {
        let u = Uniform::new(Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(u.field_at(0.0, 0.0), u.field_at(100.0, -50.0));
    }

    #[test]
    fn ribbon_field_decays_far_from_the_ribbon() {
        let r = Ribbon::new(1.0, -10.0, 0.0, 10.0, 0.0, 1.0);
        let near = r.field_at(0.0, 0.1).mag();
        let far = r.field_at(0.0, 1000.0).mag();
        assert!(far < near);
    }

    #[test]
    fn ribbon_field_is_finite_on_axis() {
        let r = Ribbon::new(1.0, -10.0, 0.0, 10.0, 0.0, 1.0);
        let v = r.field_at(0.0, 0.0);
        assert!(v.x.is_finite() && v.y.is_finite() && v.z.is_finite());
    }

    #[test]
    fn tie_field_is_zero_outside_strip() {
        let t = Tie::new(Vector3::new(1.0, 0.0, 0.0), 0.0, 0.0, 10.0, 0.0, 1.0);
        assert_eq!(t.field_at(5.0, 10.0), Vector3::ZERO);
        assert_eq!(t.field_at(5.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn tie_ignores_nominal_field_updates() {
        let mut t = Tie::new(Vector3::new(1.0, 0.0, 0.0), 0.0, 0.0, 10.0, 0.0, 1.0);
        t.set_nominal_field(Vector3::new(9.0, 9.0, 9.0));
        assert_eq!(t.field_at(5.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn multi_sums_sources() {
        let m = Multi::new(vec![
            Box::new(Uniform::new(Vector3::new(1.0, 0.0, 0.0))),
            Box::new(Uniform::new(Vector3::new(0.0, 2.0, 0.0))),
        ]);
        assert_eq!(m.field_at(0.0, 0.0), Vector3::new(1.0, 2.0, 0.0));
    }
}
