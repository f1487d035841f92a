//! Multipole asymptotic expansion of the demagnetization tensor.
//!
//! Far from the origin the 27-corner Newell sum in `newell` loses precision
//! to cancellation long before it becomes slow, so beyond some cutoff radius
//! each tensor component is instead evaluated as a `1/R^5 + 1/R^7 + 1/R^9`
//! multipole series in the direction cosines `tx2 = x^2/R^4` etc. The
//! coefficients below are transcribed from OOMMF's
//! `Oxs_DemagNxxAsymptoticBase`/`Oxs_DemagNxyAsymptoticBase` constructors;
//! the `1/R^11` (order-11) term is not implemented here (see DESIGN.md) and
//! callers needing that precision should fall back to the exact Newell sum.
//!
//! Elongated cells push that series past its useful accuracy, so a cell
//! whose edge ratio exceeds `max_ratio` is sliced into a grid of sub-cells
//! (`TensorRefinement`) and the single-cell expansion is evaluated once per
//! sub-cell offset and averaged, weighted by how many times each offset
//! recurs across the grid. This mirrors `OxsDemagAsymptoticRefineData` and
//! `Oxs_DemagNxxAsymptotic`/`Oxs_DemagNxyAsymptotic`'s refined evaluators.

use crate::newell::self_demag_nx;

/// Direction-cosine point data for one evaluation offset, precomputed once
/// and shared between the `Nxx`- and `Nxy`-family expansions.
#[derive(Debug, Copy, Clone, Default)]
pub struct AsymptoticPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub tx2: f64,
    pub ty2: f64,
    pub tz2: f64,
    pub r: f64,
    pub ir: f64,
    pub r2: f64,
    pub ir2: f64,
}

impl AsymptoticPoint {
    pub fn new(x: f64, y: f64, z: f64) -> AsymptoticPoint {
        let r2 = x * x + y * y + z * z;
        let r4 = r2 * r2;
        let r = r2.sqrt();
        if r2 != 0.0 {
            AsymptoticPoint {
                x,
                y,
                z,
                tx2: x * x / r4,
                ty2: y * y / r4,
                tz2: z * z / r4,
                r,
                ir: 1.0 / r,
                r2,
                ir2: 1.0 / r2,
            }
        } else {
            AsymptoticPoint { x, y, z, ..AsymptoticPoint::default() }
        }
    }
}

/// A pair of offsets `ubase +/- uoff` sharing `y, z`, used by the
/// cancellation-avoiding `nxy_asymptotic_pair_x`.
pub struct AsymptoticPairX {
    pub ubase: f64,
    pub uoff: f64,
    pub ptp: AsymptoticPoint,
    pub ptm: AsymptoticPoint,
}

/// Default maximum edge-length ratio a sub-cell is allowed to have before
/// the asymptotic expansion loses useful accuracy; matches the working
/// default OOMMF's demag tensor setup builds with.
pub const DEFAULT_MAX_RATIO: f64 = 1.5;

/// Sub-cell refinement plan for one `dx * dy * dz` cell shape, grounded on
/// `OxsDemagAsymptoticRefineData`: find the shortest edge, hold its axis at
/// a single sub-cell, and divide the other two axes into enough equal
/// slices that no sub-cell's longest edge exceeds `max_ratio` times the
/// shortest original edge.
#[derive(Debug, Copy, Clone)]
pub struct TensorRefinement {
    pub rdx: f64,
    pub rdy: f64,
    pub rdz: f64,
    pub xcount: i32,
    pub ycount: i32,
    pub zcount: i32,
    pub result_scale: f64,
}

impl TensorRefinement {
    pub fn new(dx: f64, dy: f64, dz: f64, max_ratio: f64) -> TensorRefinement {
        let (rdx, rdy, rdz, xcount, ycount, zcount);
        if dz <= dx && dz <= dy {
            let xratio = (dx / (max_ratio * dz)).ceil().max(1.0);
            xcount = xratio as i32;
            rdx = dx / xratio;
            let yratio = (dy / (max_ratio * dz)).ceil().max(1.0);
            ycount = yratio as i32;
            rdy = dy / yratio;
            zcount = 1;
            rdz = dz;
        } else if dy <= dx && dy <= dz {
            let xratio = (dx / (max_ratio * dy)).ceil().max(1.0);
            xcount = xratio as i32;
            rdx = dx / xratio;
            let zratio = (dz / (max_ratio * dy)).ceil().max(1.0);
            zcount = zratio as i32;
            rdz = dz / zratio;
            ycount = 1;
            rdy = dy;
        } else {
            let yratio = (dy / (max_ratio * dx)).ceil().max(1.0);
            ycount = yratio as i32;
            rdy = dy / yratio;
            let zratio = (dz / (max_ratio * dx)).ceil().max(1.0);
            zcount = zratio as i32;
            rdz = dz / zratio;
            xcount = 1;
            rdx = dx;
        }
        let result_scale = 1.0 / (xcount as f64 * ycount as f64 * zcount as f64);
        TensorRefinement { rdx, rdy, rdz, xcount, ycount, zcount, result_scale }
    }

    /// True when the cell needed no subdivision at all.
    pub fn is_trivial(&self) -> bool {
        self.xcount == 1 && self.ycount == 1 && self.zcount == 1
    }
}

/// Single-point `1/R^5 + 1/R^7 + 1/R^9` expansion of `Nxx` for one
/// rectangular-cell shape, with no sub-cell refinement. Transcribed from
/// `Oxs_DemagNxxAsymptoticBase`.
struct NxxAsymptoticBase {
    cubic_cell: bool,
    self_demag: f64,
    lead_weight: f64,
    a1: f64,
    a2: f64,
    a3: f64,
    a4: f64,
    a5: f64,
    a6: f64,
    b1: f64,
    b2: f64,
    b3: f64,
    b4: f64,
    b5: f64,
    b6: f64,
    b7: f64,
    b8: f64,
    b9: f64,
    b10: f64,
    c1: f64,
    c2: f64,
    c3: f64,
    c4: f64,
    c5: f64,
    c6: f64,
    c7: f64,
    c8: f64,
    c9: f64,
    c10: f64,
    c11: f64,
    c12: f64,
    c13: f64,
    c14: f64,
    c15: f64,
}

impl NxxAsymptoticBase {
    fn new(dx: f64, dy: f64, dz: f64) -> NxxAsymptoticBase {
        let lead_weight = -dx * dy * dz / (4.0 * std::f64::consts::PI);
        let self_demag = self_demag_nx(dx, dy, dz);

        let (dx2, dy2, dz2) = (dx * dx, dy * dy, dz * dz);
        let (dx4, dy4, dz4) = (dx2 * dx2, dy2 * dy2, dz2 * dz2);
        let (dx6, dy6, dz6) = (dx4 * dx2, dy4 * dy2, dz4 * dz2);
        let cubic_cell = dx2 == dy2 && dx2 == dz2 && dy2 == dz2;

        let (mut a1, mut a2, mut a3, mut a4, mut a5, mut a6) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        if !cubic_cell {
            let w = lead_weight / 4.0;
            a1 = w * (8.0 * dx2 - 4.0 * dy2 - 4.0 * dz2);
            a2 = w * (-24.0 * dx2 + 27.0 * dy2 - 3.0 * dz2);
            a3 = w * (-24.0 * dx2 - 3.0 * dy2 + 27.0 * dz2);
            a4 = w * (3.0 * dx2 - 4.0 * dy2 + 1.0 * dz2);
            a5 = w * (6.0 * dx2 - 3.0 * dy2 - 3.0 * dz2);
            a6 = w * (3.0 * dx2 + 1.0 * dy2 - 4.0 * dz2);
        }

        let w7 = lead_weight / 16.0;
        let (b1, b2, b3, b4, b5, b6, b7, b8, b9, b10);
        if cubic_cell {
            b1 = w7 * -14.0 * dx4;
            b2 = w7 * 105.0 * dx4;
            b3 = w7 * 105.0 * dx4;
            b4 = w7 * -105.0 * dx4;
            b5 = 0.0;
            b6 = w7 * -105.0 * dx4;
            b7 = w7 * 7.0 * dx4;
            b8 = 0.0;
            b9 = 0.0;
            b10 = w7 * 7.0 * dx4;
        } else {
            b1 = w7 * (32.0 * dx4 - 40.0 * dx2 * dy2 - 40.0 * dx2 * dz2 + 12.0 * dy4 + 10.0 * dy2 * dz2 + 12.0 * dz4);
            b2 = w7 * (-240.0 * dx4 + 580.0 * dx2 * dy2 + 20.0 * dx2 * dz2 - 202.0 * dy4 - 75.0 * dy2 * dz2 + 22.0 * dz4);
            b3 = w7 * (-240.0 * dx4 + 20.0 * dx2 * dy2 + 580.0 * dx2 * dz2 + 22.0 * dy4 - 75.0 * dy2 * dz2 - 202.0 * dz4);
            b4 = w7 * (180.0 * dx4 - 505.0 * dx2 * dy2 + 55.0 * dx2 * dz2 + 232.0 * dy4 - 75.0 * dy2 * dz2 + 8.0 * dz4);
            b5 = w7 * (360.0 * dx4 - 450.0 * dx2 * dy2 - 450.0 * dx2 * dz2 - 180.0 * dy4 + 900.0 * dy2 * dz2 - 180.0 * dz4);
            b6 = w7 * (180.0 * dx4 + 55.0 * dx2 * dy2 - 505.0 * dx2 * dz2 + 8.0 * dy4 - 75.0 * dy2 * dz2 + 232.0 * dz4);
            b7 = w7 * (-10.0 * dx4 + 30.0 * dx2 * dy2 - 5.0 * dx2 * dz2 - 16.0 * dy4 + 10.0 * dy2 * dz2 - 2.0 * dz4);
            b8 = w7 * (-30.0 * dx4 + 55.0 * dx2 * dy2 + 20.0 * dx2 * dz2 + 8.0 * dy4 - 75.0 * dy2 * dz2 + 22.0 * dz4);
            b9 = w7 * (-30.0 * dx4 + 20.0 * dx2 * dy2 + 55.0 * dx2 * dz2 + 22.0 * dy4 - 75.0 * dy2 * dz2 + 8.0 * dz4);
            b10 = w7 * (-10.0 * dx4 - 5.0 * dx2 * dy2 + 30.0 * dx2 * dz2 - 2.0 * dy4 + 10.0 * dy2 * dz2 - 16.0 * dz4);
        }

        let w9 = lead_weight / 192.0;
        let (c1, c2, c3, c4, c5, c6, c7, c8, c9, c10, c11, c12, c13, c14, c15);
        if cubic_cell {
            c1 = w9 * 32.0 * dx6;
            c2 = w9 * -448.0 * dx6;
            c3 = w9 * -448.0 * dx6;
            c4 = w9 * -150.0 * dx6;
            c5 = w9 * 7620.0 * dx6;
            c6 = w9 * -150.0 * dx6;
            c7 = w9 * 314.0 * dx6;
            c8 = w9 * -3810.0 * dx6;
            c9 = w9 * -3810.0 * dx6;
            c10 = w9 * 314.0 * dx6;
            c11 = w9 * -16.0 * dx6;
            c12 = w9 * 134.0 * dx6;
            c13 = w9 * 300.0 * dx6;
            c14 = w9 * 134.0 * dx6;
            c15 = w9 * -16.0 * dx6;
        } else {
            c1 = w9
                * (384.0 * dx6 - 896.0 * dx4 * dy2 - 896.0 * dx4 * dz2 + 672.0 * dx2 * dy4
                    + 560.0 * dx2 * dy2 * dz2 + 672.0 * dx2 * dz4 - 120.0 * dy6 - 112.0 * dy4 * dz2
                    - 112.0 * dy2 * dz4 - 120.0 * dz6);
            c2 = w9
                * (-5376.0 * dx6 + 22624.0 * dx4 * dy2 + 2464.0 * dx4 * dz2 - 19488.0 * dx2 * dy4
                    - 7840.0 * dx2 * dy2 * dz2 + 672.0 * dx2 * dz4 + 3705.0 * dy6 + 2198.0 * dy4 * dz2
                    + 938.0 * dy2 * dz4 - 345.0 * dz6);
            c3 = w9
                * (-5376.0 * dx6 + 2464.0 * dx4 * dy2 + 22624.0 * dx4 * dz2 + 672.0 * dx2 * dy4
                    - 7840.0 * dx2 * dy2 * dz2 - 19488.0 * dx2 * dz4 - 345.0 * dy6 + 938.0 * dy4 * dz2
                    + 2198.0 * dy2 * dz4 + 3705.0 * dz6);
            c4 = w9
                * (10080.0 * dx6 - 48720.0 * dx4 * dy2 + 1680.0 * dx4 * dz2 + 49770.0 * dx2 * dy4
                    - 2625.0 * dx2 * dy2 * dz2 - 630.0 * dx2 * dz4 - 10440.0 * dy6 - 1050.0 * dy4 * dz2
                    + 2100.0 * dy2 * dz4 - 315.0 * dz6);
            c5 = w9
                * (20160.0 * dx6 - 47040.0 * dx4 * dy2 - 47040.0 * dx4 * dz2 - 6300.0 * dx2 * dy4
                    + 133350.0 * dx2 * dy2 * dz2 - 6300.0 * dx2 * dz4 + 7065.0 * dy6 - 26670.0 * dy4 * dz2
                    - 26670.0 * dy2 * dz4 + 7065.0 * dz6);
            c6 = w9
                * (10080.0 * dx6 + 1680.0 * dx4 * dy2 - 48720.0 * dx4 * dz2 - 630.0 * dx2 * dy4
                    - 2625.0 * dx2 * dy2 * dz2 + 49770.0 * dx2 * dz4 - 315.0 * dy6 + 2100.0 * dy4 * dz2
                    - 1050.0 * dy2 * dz4 - 10440.0 * dz6);
            c7 = w9
                * (-3360.0 * dx6 + 17290.0 * dx4 * dy2 - 1610.0 * dx4 * dz2 - 19488.0 * dx2 * dy4
                    + 5495.0 * dx2 * dy2 * dz2 - 588.0 * dx2 * dz4 + 4848.0 * dy6 - 3136.0 * dy4 * dz2
                    + 938.0 * dy2 * dz4 - 75.0 * dz6);
            c8 = w9
                * (-10080.0 * dx6 + 32970.0 * dx4 * dy2 + 14070.0 * dx4 * dz2 - 6300.0 * dx2 * dy4
                    - 66675.0 * dx2 * dy2 * dz2 + 12600.0 * dx2 * dz4 - 10080.0 * dy6 + 53340.0 * dy4 * dz2
                    - 26670.0 * dy2 * dz4 + 3015.0 * dz6);
            c9 = w9
                * (-10080.0 * dx6 + 14070.0 * dx4 * dy2 + 32970.0 * dx4 * dz2 + 12600.0 * dx2 * dy4
                    - 66675.0 * dx2 * dy2 * dz2 - 6300.0 * dx2 * dz4 + 3015.0 * dy6 - 26670.0 * dy4 * dz2
                    + 53340.0 * dy2 * dz4 - 10080.0 * dz6);
            c10 = w9
                * (-3360.0 * dx6 - 1610.0 * dx4 * dy2 + 17290.0 * dx4 * dz2 - 588.0 * dx2 * dy4
                    + 5495.0 * dx2 * dy2 * dz2 - 19488.0 * dx2 * dz4 - 75.0 * dy6 + 938.0 * dy4 * dz2
                    - 3136.0 * dy2 * dz4 + 4848.0 * dz6);
            c11 = w9
                * (105.0 * dx6 - 560.0 * dx4 * dy2 + 70.0 * dx4 * dz2 + 672.0 * dx2 * dy4
                    - 280.0 * dx2 * dy2 * dz2 + 42.0 * dx2 * dz4 - 192.0 * dy6 + 224.0 * dy4 * dz2
                    - 112.0 * dy2 * dz4 + 15.0 * dz6);
            c12 = w9
                * (420.0 * dx6 - 1610.0 * dx4 * dy2 - 350.0 * dx4 * dz2 + 672.0 * dx2 * dy4
                    + 2345.0 * dx2 * dy2 * dz2 - 588.0 * dx2 * dz4 + 528.0 * dy6 - 3136.0 * dy4 * dz2
                    + 2198.0 * dy2 * dz4 - 345.0 * dz6);
            c13 = w9
                * (630.0 * dx6 - 1470.0 * dx4 * dy2 - 1470.0 * dx4 * dz2 - 630.0 * dx2 * dy4
                    + 5250.0 * dx2 * dy2 * dz2 - 630.0 * dx2 * dz4 + 360.0 * dy6 - 1050.0 * dy4 * dz2
                    - 1050.0 * dy2 * dz4 + 360.0 * dz6);
            c14 = w9
                * (420.0 * dx6 - 350.0 * dx4 * dy2 - 1610.0 * dx4 * dz2 - 588.0 * dx2 * dy4
                    + 2345.0 * dx2 * dy2 * dz2 + 672.0 * dx2 * dz4 - 345.0 * dy6 + 2198.0 * dy4 * dz2
                    - 3136.0 * dy2 * dz4 + 528.0 * dz6);
            c15 = w9
                * (105.0 * dx6 + 70.0 * dx4 * dy2 - 560.0 * dx4 * dz2 + 42.0 * dx2 * dy4
                    - 280.0 * dx2 * dy2 * dz2 + 672.0 * dx2 * dz4 + 15.0 * dy6 - 112.0 * dy4 * dz2
                    + 224.0 * dy2 * dz4 - 192.0 * dz6);
        }

        NxxAsymptoticBase {
            cubic_cell,
            self_demag,
            lead_weight,
            a1, a2, a3, a4, a5, a6,
            b1, b2, b3, b4, b5, b6, b7, b8, b9, b10,
            c1, c2, c3, c4, c5, c6, c7, c8, c9, c10, c11, c12, c13, c14, c15,
        }
    }

    fn evaluate(&self, pt: &AsymptoticPoint) -> f64 {
        if pt.ir2 <= 0.0 {
            return self.self_demag;
        }
        let (tx2, ty2, tz2) = (pt.tx2, pt.ty2, pt.tz2);
        let tz4 = tz2 * tz2;
        let tz6 = tz4 * tz2;
        let term3 = (2.0 * tx2 - ty2 - tz2) * self.lead_weight;

        let (term5, term7);
        if self.cubic_cell {
            term5 = 0.0;
            let ty4 = ty2 * ty2;
            term7 = ((self.b1 * tx2 + (self.b2 * ty2 + self.b3 * tz2)) * tx2
                + (self.b4 * ty4 + self.b6 * tz4))
                * tx2
                + self.b7 * ty4 * ty2
                + self.b10 * tz6;
        } else {
            term5 = (self.a1 * tx2 + (self.a2 * ty2 + self.a3 * tz2)) * tx2
                + (self.a4 * ty2 + self.a5 * tz2) * ty2
                + self.a6 * tz4;
            term7 = ((self.b1 * tx2 + (self.b2 * ty2 + self.b3 * tz2)) * tx2
                + ((self.b4 * ty2 + self.b5 * tz2) * ty2 + self.b6 * tz4))
                * tx2
                + ((self.b7 * ty2 + self.b8 * tz2) * ty2 + self.b9 * tz4) * ty2
                + self.b10 * tz6;
        }

        let term9 = (((self.c1 * tx2 + (self.c2 * ty2 + self.c3 * tz2)) * tx2
            + ((self.c4 * ty2 + self.c5 * tz2) * ty2 + self.c6 * tz4))
            * tx2
            + (((self.c7 * ty2 + self.c8 * tz2) * ty2 + self.c9 * tz4) * ty2 + self.c10 * tz6))
            * tx2
            + (((self.c11 * ty2 + self.c12 * tz2) * ty2 + self.c13 * tz4) * ty2 + self.c14 * tz6) * ty2
            + self.c15 * tz4 * tz4;

        (term9 + term7 + term5 + term3) * pt.ir
    }
}

/// Asymptotic multipole expansion of `Nxx` (and, by coordinate
/// permutation, `Nyy`/`Nzz`) for one rectangular-cell shape `dx * dy * dz`,
/// refined into sub-cells when the shape is elongated. Grounded on
/// `Oxs_DemagNxxAsymptotic`.
pub struct NxxAsymptotic {
    base: NxxAsymptoticBase,
    refinement: TensorRefinement,
}

impl NxxAsymptotic {
    pub fn new(dx: f64, dy: f64, dz: f64) -> NxxAsymptotic {
        Self::with_max_ratio(dx, dy, dz, DEFAULT_MAX_RATIO)
    }

    pub fn with_max_ratio(dx: f64, dy: f64, dz: f64, max_ratio: f64) -> NxxAsymptotic {
        let refinement = TensorRefinement::new(dx, dy, dz, max_ratio);
        let base = NxxAsymptoticBase::new(refinement.rdx, refinement.rdy, refinement.rdz);
        NxxAsymptotic { base, refinement }
    }

    pub fn evaluate(&self, pt: &AsymptoticPoint) -> f64 {
        if pt.ir2 <= 0.0 {
            return self.base.self_demag;
        }
        if self.refinement.is_trivial() {
            return self.base.evaluate(pt);
        }
        let r = &self.refinement;
        let mut zsum = 0.0;
        for k in (1 - r.zcount)..r.zcount {
            let zoff = pt.z + k as f64 * r.rdz;
            let mut ysum = 0.0;
            for j in (1 - r.ycount)..r.ycount {
                let yoff = pt.y + j as f64 * r.rdy;
                let mut xsum = r.xcount as f64 * self.base.evaluate(&AsymptoticPoint::new(pt.x, yoff, zoff));
                for i in 1..r.xcount {
                    let p = AsymptoticPoint::new(pt.x + i as f64 * r.rdx, yoff, zoff);
                    let m = AsymptoticPoint::new(pt.x - i as f64 * r.rdx, yoff, zoff);
                    xsum += (r.xcount - i) as f64 * (self.base.evaluate(&p) + self.base.evaluate(&m));
                }
                ysum += (r.ycount - j.abs()) as f64 * xsum;
            }
            zsum += (r.zcount - k.abs()) as f64 * ysum;
        }
        zsum * r.result_scale
    }
}

/// Sum of `NxxAsymptotic` at two offsets. Unlike `Nxy`, the `Nxx` series has
/// no leading-term cancellation to guard against, so the pair evaluation is
/// just the sum of two independent (already-refined) calls.
pub fn nxx_asymptotic_pair(kernel: &NxxAsymptotic, ptp: &AsymptoticPoint, ptm: &AsymptoticPoint) -> f64 {
    kernel.evaluate(ptp) + kernel.evaluate(ptm)
}

/// Single-point `1/R^5 + 1/R^7 + 1/R^9` expansion of `Nxy` for one
/// rectangular-cell shape, with no sub-cell refinement. Transcribed from
/// `Oxs_DemagNxyAsymptoticBase`.
struct NxyAsymptoticBase {
    cubic_cell: bool,
    lead_weight: f64,
    a1: f64,
    a2: f64,
    a3: f64,
    b1: f64,
    b2: f64,
    b3: f64,
    b4: f64,
    b5: f64,
    b6: f64,
    c1: f64,
    c2: f64,
    c3: f64,
    c4: f64,
    c5: f64,
    c6: f64,
    c7: f64,
    c8: f64,
    c9: f64,
    c10: f64,
}

impl NxyAsymptoticBase {
    fn new(dx: f64, dy: f64, dz: f64) -> NxyAsymptoticBase {
        let lead_weight = -dx * dy * dz / (4.0 * std::f64::consts::PI);
        let (dx2, dy2, dz2) = (dx * dx, dy * dy, dz * dz);
        let (dx4, dy4, dz4) = (dx2 * dx2, dy2 * dy2, dz2 * dz2);
        let (dx6, dy6, dz6) = (dx4 * dx2, dy4 * dy2, dz4 * dz2);
        let cubic_cell = dx2 == dy2 && dx2 == dz2 && dy2 == dz2;

        let (mut a1, mut a2, mut a3) = (0.0, 0.0, 0.0);
        if !cubic_cell {
            let w5 = lead_weight * 5.0 / 4.0;
            a1 = w5 * (4.0 * dx2 - 3.0 * dy2 - 1.0 * dz2);
            a2 = w5 * (-3.0 * dx2 + 4.0 * dy2 - 1.0 * dz2);
            a3 = w5 * (-3.0 * dx2 - 3.0 * dy2 + 6.0 * dz2);
        }

        let w7 = lead_weight * 7.0 / 16.0;
        let (b1, b2, b3, b4, b5, b6);
        if cubic_cell {
            b1 = w7 * -7.0 * dx4;
            b2 = w7 * 19.0 * dx4;
            b3 = w7 * 13.0 * dx4;
            b4 = w7 * -7.0 * dx4;
            b5 = w7 * 13.0 * dx4;
            b6 = w7 * -13.0 * dx4;
        } else {
            b1 = w7 * (16.0 * dx4 - 30.0 * dx2 * dy2 - 10.0 * dx2 * dz2 + 10.0 * dy4 + 5.0 * dy2 * dz2 + 2.0 * dz4);
            b2 = w7 * (-40.0 * dx4 + 105.0 * dx2 * dy2 - 5.0 * dx2 * dz2 - 40.0 * dy4 - 5.0 * dy2 * dz2 + 4.0 * dz4);
            b3 = w7 * (-40.0 * dx4 - 15.0 * dx2 * dy2 + 115.0 * dx2 * dz2 + 20.0 * dy4 - 35.0 * dy2 * dz2 - 32.0 * dz4);
            b4 = w7 * (10.0 * dx4 - 30.0 * dx2 * dy2 + 5.0 * dx2 * dz2 + 16.0 * dy4 - 10.0 * dy2 * dz2 + 2.0 * dz4);
            b5 = w7 * (20.0 * dx4 - 15.0 * dx2 * dy2 - 35.0 * dx2 * dz2 - 40.0 * dy4 + 115.0 * dy2 * dz2 - 32.0 * dz4);
            b6 = w7 * (10.0 * dx4 + 15.0 * dx2 * dy2 - 40.0 * dx2 * dz2 + 10.0 * dy4 - 40.0 * dy2 * dz2 + 32.0 * dz4);
        }

        let w9 = lead_weight / 64.0;
        let (c1, c2, c3, c4, c5, c6, c7, c8, c9, c10);
        if cubic_cell {
            c1 = w9 * 48.0 * dx6;
            c2 = w9 * -142.0 * dx6;
            c3 = w9 * -582.0 * dx6;
            c4 = w9 * -142.0 * dx6;
            c5 = w9 * 2840.0 * dx6;
            c6 = w9 * -450.0 * dx6;
            c7 = w9 * 48.0 * dx6;
            c8 = w9 * -582.0 * dx6;
            c9 = w9 * -450.0 * dx6;
            c10 = w9 * 180.0 * dx6;
        } else {
            c1 = w9
                * (576.0 * dx6 - 2016.0 * dx4 * dy2 - 672.0 * dx4 * dz2 + 1680.0 * dx2 * dy4
                    + 840.0 * dx2 * dy2 * dz2 + 336.0 * dx2 * dz4 - 315.0 * dy6 - 210.0 * dy4 * dz2
                    - 126.0 * dy2 * dz4 - 45.0 * dz6);
            c2 = w9
                * (-3024.0 * dx6 + 13664.0 * dx4 * dy2 + 448.0 * dx4 * dz2 - 12670.0 * dx2 * dy4
                    - 2485.0 * dx2 * dy2 * dz2 + 546.0 * dx2 * dz4 + 2520.0 * dy6 + 910.0 * dy4 * dz2
                    + 84.0 * dy2 * dz4 - 135.0 * dz6);
            c3 = w9
                * (-3024.0 * dx6 + 1344.0 * dx4 * dy2 + 12768.0 * dx4 * dz2 + 2730.0 * dx2 * dy4
                    - 10185.0 * dx2 * dy2 * dz2 - 8694.0 * dx2 * dz4 - 945.0 * dy6 + 1680.0 * dy4 * dz2
                    + 2394.0 * dy2 * dz4 + 1350.0 * dz6);
            c4 = w9
                * (2520.0 * dx6 - 12670.0 * dx4 * dy2 + 910.0 * dx4 * dz2 + 13664.0 * dx2 * dy4
                    - 2485.0 * dx2 * dy2 * dz2 + 84.0 * dx2 * dz4 - 3024.0 * dy6 + 448.0 * dy4 * dz2
                    + 546.0 * dy2 * dz4 - 135.0 * dz6);
            c5 = w9
                * (5040.0 * dx6 - 9940.0 * dx4 * dy2 - 13580.0 * dx4 * dz2 - 9940.0 * dx2 * dy4
                    + 49700.0 * dx2 * dy2 * dz2 - 6300.0 * dx2 * dz4 + 5040.0 * dy6 - 13580.0 * dy4 * dz2
                    - 6300.0 * dy2 * dz4 + 2700.0 * dz6);
            c6 = w9
                * (2520.0 * dx6 + 2730.0 * dx4 * dy2 - 14490.0 * dx4 * dz2 + 420.0 * dx2 * dy4
                    - 7875.0 * dx2 * dy2 * dz2 + 17640.0 * dx2 * dz4 - 945.0 * dy6 + 3990.0 * dy4 * dz2
                    - 840.0 * dy2 * dz4 - 3600.0 * dz6);
            c7 = w9
                * (-315.0 * dx6 + 1680.0 * dx4 * dy2 - 210.0 * dx4 * dz2 - 2016.0 * dx2 * dy4
                    + 840.0 * dx2 * dy2 * dz2 - 126.0 * dx2 * dz4 + 576.0 * dy6 - 672.0 * dy4 * dz2
                    + 336.0 * dy2 * dz4 - 45.0 * dz6);
            c8 = w9
                * (-945.0 * dx6 + 2730.0 * dx4 * dy2 + 1680.0 * dx4 * dz2 + 1344.0 * dx2 * dy4
                    - 10185.0 * dx2 * dy2 * dz2 + 2394.0 * dx2 * dz4 - 3024.0 * dy6 + 12768.0 * dy4 * dz2
                    - 8694.0 * dy2 * dz4 + 1350.0 * dz6);
            c9 = w9
                * (-945.0 * dx6 + 420.0 * dx4 * dy2 + 3990.0 * dx4 * dz2 + 2730.0 * dx2 * dy4
                    - 7875.0 * dx2 * dy2 * dz2 - 840.0 * dx2 * dz4 + 2520.0 * dy6 - 14490.0 * dy4 * dz2
                    + 17640.0 * dy2 * dz4 - 3600.0 * dz6);
            c10 = w9
                * (-315.0 * dx6 - 630.0 * dx4 * dy2 + 2100.0 * dx4 * dz2 - 630.0 * dx2 * dy4
                    + 3150.0 * dx2 * dy2 * dz2 - 3360.0 * dx2 * dz4 - 315.0 * dy6 + 2100.0 * dy4 * dz2
                    - 3360.0 * dy2 * dz4 + 1440.0 * dz6);
        }

        NxyAsymptoticBase {
            cubic_cell,
            lead_weight,
            a1, a2, a3,
            b1, b2, b3, b4, b5, b6,
            c1, c2, c3, c4, c5, c6, c7, c8, c9, c10,
        }
    }

    fn evaluate(&self, pt: &AsymptoticPoint) -> f64 {
        if pt.r2 <= 0.0 {
            return 0.0;
        }
        let (tx2, ty2, tz2) = (pt.tx2, pt.ty2, pt.tz2);
        let term3 = 3.0 * self.lead_weight;

        let term5 = if self.cubic_cell {
            0.0
        } else {
            self.a1 * tx2 + self.a2 * ty2 + self.a3 * tz2
        };

        let tz4 = tz2 * tz2;
        let term7 = (self.b1 * tx2 + (self.b2 * ty2 + self.b3 * tz2)) * tx2
            + (self.b4 * ty2 + self.b5 * tz2) * ty2
            + self.b6 * tz4;

        let term9 = ((self.c1 * tx2 + (self.c2 * ty2 + self.c3 * tz2)) * tx2
            + ((self.c4 * ty2 + self.c5 * tz2) * ty2 + self.c6 * tz4))
            * tx2
            + ((self.c7 * ty2 + self.c8 * tz2) * ty2 + self.c9 * tz4) * ty2
            + self.c10 * tz4 * tz2;

        let ir5 = pt.ir2 * pt.ir2 * pt.ir;
        (term9 + term7 + term5 + term3) * ir5 * pt.x * pt.y
    }

    /// Evaluates `Nxy(ubase+uoff, y, z) + Nxy(ubase-uoff, y, z)` for
    /// `|uoff| >> |ubase|`, cancelling the leading `1/R^3` term
    /// algebraically instead of subtracting two nearly-equal floats.
    fn evaluate_pair_x(&self, ubase: f64, uoff: f64, ptp: &AsymptoticPoint, ptm: &AsymptoticPoint) -> f64 {
        if ptp.r2 <= 0.0 {
            return self.evaluate(ptm);
        }
        if ptm.r2 <= 0.0 {
            return self.evaluate(ptp);
        }

        let xbase = ubase;
        let term3x = 3.0 * self.lead_weight * xbase;
        let xoff = uoff;
        let (y, z) = (ptp.y, ptp.z);
        let a = xbase * xbase + xoff * xoff + y * y + z * z;
        let b = 2.0 * xbase * xoff;
        let r5p = ptp.r2 * ptp.r2 * ptp.r;
        let r5m = ptm.r2 * ptm.r2 * ptm.r;
        let a2 = a * a;
        let b2 = b * b;
        let rdiff = -2.0 * b * (b2 * b2 + 5.0 * a2 * (a2 + 2.0 * b2)) / (r5p * r5m * (r5p + r5m));
        let term3cancel = 3.0 * self.lead_weight * xoff * rdiff;

        let (tx2p, ty2p, tz2p) = (ptp.tx2, ptp.ty2, ptp.tz2);
        let (tx2m, ty2m, tz2m) = (ptm.tx2, ptm.ty2, ptm.tz2);

        let (term5p, term5m) = if self.cubic_cell {
            (0.0, 0.0)
        } else {
            (
                self.a1 * tx2p + self.a2 * ty2p + self.a3 * tz2p,
                self.a1 * tx2m + self.a2 * ty2m + self.a3 * tz2m,
            )
        };

        let tz4p = tz2p * tz2p;
        let tz4m = tz2m * tz2m;
        let term7p = (self.b1 * tx2p + (self.b2 * ty2p + self.b3 * tz2p)) * tx2p
            + (self.b4 * ty2p + self.b5 * tz2p) * ty2p
            + self.b6 * tz4p;
        let term7m = (self.b1 * tx2m + (self.b2 * ty2m + self.b3 * tz2m)) * tx2m
            + (self.b4 * ty2m + self.b5 * tz2m) * ty2m
            + self.b6 * tz4m;

        let term9p = ((self.c1 * tx2p + (self.c2 * ty2p + self.c3 * tz2p)) * tx2p
            + ((self.c4 * ty2p + self.c5 * tz2p) * ty2p + self.c6 * tz4p))
            * tx2p
            + ((self.c7 * ty2p + self.c8 * tz2p) * ty2p + self.c9 * tz4p) * ty2p
            + self.c10 * tz4p * tz2p;
        let term9m = ((self.c1 * tx2m + (self.c2 * ty2m + self.c3 * tz2m)) * tx2m
            + ((self.c4 * ty2m + self.c5 * tz2m) * ty2m + self.c6 * tz4m))
            * tx2m
            + ((self.c7 * ty2m + self.c8 * tz2m) * ty2m + self.c9 * tz4m) * ty2m
            + self.c10 * tz4m * tz2m;

        let ir5p = ptp.ir2 * ptp.ir2 * ptp.ir;
        let ir5m = ptm.ir2 * ptm.ir2 * ptm.ir;

        y * (term3cancel
            + (ptp.x * (term9p + term7p + term5p) + term3x) * ir5p
            + (ptm.x * (term9m + term7m + term5m) + term3x) * ir5m)
    }
}

/// Asymptotic multipole expansion of `Nxy` (and, by coordinate permutation,
/// `Nxz`/`Nyz`) for one rectangular-cell shape `dx * dy * dz`, refined into
/// sub-cells when the shape is elongated. Grounded on
/// `Oxs_DemagNxyAsymptotic`.
pub struct NxyAsymptotic {
    base: NxyAsymptoticBase,
    refinement: TensorRefinement,
}

impl NxyAsymptotic {
    pub fn new(dx: f64, dy: f64, dz: f64) -> NxyAsymptotic {
        Self::with_max_ratio(dx, dy, dz, DEFAULT_MAX_RATIO)
    }

    pub fn with_max_ratio(dx: f64, dy: f64, dz: f64, max_ratio: f64) -> NxyAsymptotic {
        let refinement = TensorRefinement::new(dx, dy, dz, max_ratio);
        let base = NxyAsymptoticBase::new(refinement.rdx, refinement.rdy, refinement.rdz);
        NxyAsymptotic { base, refinement }
    }

    pub fn evaluate(&self, pt: &AsymptoticPoint) -> f64 {
        if self.refinement.is_trivial() {
            return self.base.evaluate(pt);
        }
        let r = &self.refinement;
        let mut zsum = 0.0;
        for k in (1 - r.zcount)..r.zcount {
            let zoff = pt.z + k as f64 * r.rdz;
            let mut ysum = 0.0;
            for j in (1 - r.ycount)..r.ycount {
                let yoff = pt.y + j as f64 * r.rdy;
                let mut xsum = r.xcount as f64 * self.base.evaluate(&AsymptoticPoint::new(pt.x, yoff, zoff));
                for i in 1..r.xcount {
                    let p = AsymptoticPoint::new(pt.x + i as f64 * r.rdx, yoff, zoff);
                    let m = AsymptoticPoint::new(pt.x - i as f64 * r.rdx, yoff, zoff);
                    xsum += (r.xcount - i) as f64 * (self.base.evaluate(&p) + self.base.evaluate(&m));
                }
                ysum += (r.ycount - j.abs()) as f64 * xsum;
            }
            zsum += (r.zcount - k.abs()) as f64 * ysum;
        }
        zsum * r.result_scale
    }

    /// Evaluates `Nxy(ubase+uoff, y, z) + Nxy(ubase-uoff, y, z)` for
    /// `|uoff| >> |ubase|`, refining over sub-cells while preserving the
    /// cancellation-avoiding pair evaluation at each sub-cell offset.
    pub fn evaluate_pair_x(&self, pair: &AsymptoticPairX) -> f64 {
        if self.refinement.is_trivial() {
            return self.base.evaluate_pair_x(pair.ubase, pair.uoff, &pair.ptp, &pair.ptm);
        }
        let r = &self.refinement;
        let mut zsum = 0.0;
        for k in (1 - r.zcount)..r.zcount {
            let zoff = pair.ptp.z + k as f64 * r.rdz;
            let mut ysum = 0.0;
            for j in (1 - r.ycount)..r.ycount {
                let yoff = pair.ptp.y + j as f64 * r.rdy;
                let eval_at = |uoff: f64| -> f64 {
                    let ptp = AsymptoticPoint::new(pair.ubase + uoff, yoff, zoff);
                    let ptm = AsymptoticPoint::new(pair.ubase - uoff, yoff, zoff);
                    self.base.evaluate_pair_x(pair.ubase, uoff, &ptp, &ptm)
                };
                let mut xsum = r.xcount as f64 * eval_at(pair.uoff);
                for i in 1..r.xcount {
                    let offset = i as f64 * r.rdx;
                    xsum += (r.xcount - i) as f64 * (eval_at(pair.uoff + offset) + eval_at(pair.uoff - offset));
                }
                ysum += (r.ycount - j.abs()) as f64 * xsum;
            }
            zsum += (r.zcount - k.abs()) as f64 * ysum;
        }
        zsum * r.result_scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::newell::{calculate_nxx, calculate_nxy};

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "{} != {} (diff {:e})", a, b, (a - b).abs());
    }

    #[test]
    fn nxx_asymptotic_matches_newell_far_field() {
        let (dx, dy, dz) = (1.0, 2.0, 3.0);
        let (x, y, z) = (500.0, 40.0, 60.0);
        let kernel = NxxAsymptotic::new(dx, dy, dz);
        let pt = AsymptoticPoint::new(x, y, z);
        let asym = kernel.evaluate(&pt);
        let exact = calculate_nxx(x, y, z, dx, dy, dz);
        assert_close(asym, exact, 1e-8 * exact.abs().max(1e-12));
    }

    #[test]
    fn nxy_asymptotic_matches_newell_far_field() {
        let (dx, dy, dz) = (1.0, 2.0, 3.0);
        let (x, y, z) = (500.0, 40.0, 60.0);
        let kernel = NxyAsymptotic::new(dx, dy, dz);
        let pt = AsymptoticPoint::new(x, y, z);
        let asym = kernel.evaluate(&pt);
        let exact = calculate_nxy(x, y, z, dx, dy, dz);
        assert_close(asym, exact, 1e-8 * exact.abs().max(1e-12));
    }

    #[test]
    fn nxx_cubic_cell_drops_order_five_term() {
        let kernel = NxxAsymptoticBase::new(1.0, 1.0, 1.0);
        assert_eq!(kernel.a1, 0.0);
        assert_eq!(kernel.a6, 0.0);
    }

    #[test]
    fn nxy_pair_matches_two_independent_evaluations() {
        let (dx, dy, dz) = (1.0, 1.5, 2.0);
        let kernel = NxyAsymptotic::new(dx, dy, dz);
        let (y, z) = (30.0, 7.0);
        let ubase = 0.0;
        let uoff = 400.0;
        let ptp = AsymptoticPoint::new(ubase + uoff, y, z);
        let ptm = AsymptoticPoint::new(ubase - uoff, y, z);
        let pair = AsymptoticPairX { ubase, uoff, ptp, ptm };
        let combined = kernel.evaluate_pair_x(&pair);
        let direct = kernel.evaluate(&pair.ptp) + kernel.evaluate(&pair.ptm);
        assert_close(combined, direct, 1e-6 * direct.abs().max(1e-9));
    }

    #[test]
    fn refinement_picks_unit_count_on_shortest_axis() {
        let r = TensorRefinement::new(1.0, 2.0, 3.0, 1.5);
        assert_eq!(r.zcount, 1);
        assert!(r.xcount >= 1 && r.ycount >= 1);
        assert!((r.rdz - 3.0).abs() < 1e-12);
        assert_eq!(r.result_scale, 1.0 / (r.xcount as f64 * r.ycount as f64 * r.zcount as f64));
    }

    #[test]
    fn refinement_is_trivial_for_near_cubic_cells() {
        let r = TensorRefinement::new(1.0, 1.0, 1.1, 1.5);
        assert!(r.is_trivial());
    }

    #[test]
    fn elongated_cell_refines_and_still_matches_newell() {
        let (dx, dy, dz) = (1.0, 1.0, 20.0);
        let (x, y, z) = (0.0, 0.0, 2000.0);
        let kernel = NxxAsymptotic::new(dx, dy, dz);
        assert!(!kernel.refinement.is_trivial());
        let pt = AsymptoticPoint::new(x, y, z);
        let asym = kernel.evaluate(&pt);
        let exact = calculate_nxx(x, y, z, dx, dy, dz);
        assert_close(asym, exact, 1e-6 * exact.abs().max(1e-12));
    }
}
