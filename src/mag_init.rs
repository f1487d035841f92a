//! Initial-magnetization registry. Grounded in OOMMF's `MagInit`/`maginit.cc`:
//! each named routine fills an `Nx * Ny` grid of unit vectors in the external
//! xyz coordinate system; `Grid` is responsible for rotating the result into
//! its internal xzy layout and building the neighbor graph.
//!
//! `vioFile`/`avfFile` are registered by name (to keep the name table
//! complete) but, like `applied_field::File`, defer actual decoding to an
//! outer harness through `FileSource`.

use crate::errors::{ErrorKind, Result};
use crate::vector::Vector3;
use rand::Rng;

/// The source disables random perturbation in its initializers at compile
/// time (`#define PERTURBATION_SIZE 0.` in maginit.cc) even though the
/// integrator's own perturbation constant is nonzero; kept separate here for
/// the same reason.
const INIT_PERTURBATION_SIZE: f64 = 0.0;

fn deg_cos_sin(degrees: f64) -> (f64, f64) {
    let rad = degrees.to_radians();
    (rad.cos(), rad.sin())
}

fn perturb_and_normalize<R: Rng + ?Sized>(grid: &mut Vec<Vec<Vector3>>, rng: &mut R) {
    if INIT_PERTURBATION_SIZE == 0.0 {
        for row in grid.iter_mut() {
            for v in row.iter_mut() {
                *v = v.normalized();
            }
        }
        return;
    }
    for row in grid.iter_mut() {
        for v in row.iter_mut() {
            let delta = Vector3::new(
                rng.gen_range(-INIT_PERTURBATION_SIZE, INIT_PERTURBATION_SIZE),
                rng.gen_range(-INIT_PERTURBATION_SIZE, INIT_PERTURBATION_SIZE),
                rng.gen_range(-INIT_PERTURBATION_SIZE, INIT_PERTURBATION_SIZE),
            );
            *v = (*v + delta).normalized();
        }
    }
}

fn new_grid(nx: usize, ny: usize) -> Vec<Vec<Vector3>> {
    vec![vec![Vector3::ZERO; ny]; nx]
}

fn mi_random<R: Rng + ?Sized>(nx: usize, ny: usize, rng: &mut R) -> Vec<Vec<Vector3>> {
    let mut grid = new_grid(nx, ny);
    for row in grid.iter_mut() {
        for v in row.iter_mut() {
            *v = Vector3::new(
                rng.gen_range(-1.0, 1.0),
                rng.gen_range(-1.0, 1.0),
                rng.gen_range(-1.0, 1.0),
            )
            .normalized();
        }
    }
    grid
}

fn mi_uniform(nx: usize, ny: usize, theta: f64, phi: f64) -> Vec<Vec<Vector3>> {
    let (cos_phi, sin_phi) = deg_cos_sin(phi);
    let (cos_theta, sin_theta) = deg_cos_sin(theta);
    let x = cos_phi * sin_theta;
    let y = sin_phi * sin_theta;
    let z = cos_theta;
    vec![vec![Vector3::new(x, y, z); ny]; nx]
}

fn mi_in_out(nx: usize, ny: usize) -> Vec<Vec<Vector3>> {
    let mut grid = new_grid(nx, ny);
    for (i, row) in grid.iter_mut().enumerate() {
        let z = if i < nx / 2 { -1.0 } else { 1.0 };
        for v in row.iter_mut() {
            *v = Vector3::new(0.0, 0.0, z);
        }
    }
    grid
}

fn mi_in_up_out(nx: usize, ny: usize) -> Vec<Vec<Vector3>> {
    let mut grid = new_grid(nx, ny);
    for (i, row) in grid.iter_mut().enumerate() {
        let z = if i < nx / 2 {
            -1.0
        } else if i == nx / 2 {
            0.0
        } else {
            1.0
        };
        let y = if i == nx / 2 { 1.0 } else { 0.0 };
        for v in row.iter_mut() {
            *v = Vector3::new(0.0, y, z);
        }
    }
    grid
}

fn mi_in_out_rot(nx: usize, ny: usize, phi: f64) -> Vec<Vec<Vector3>> {
    let (cos_phi, sin_phi) = deg_cos_sin(phi);
    let offset = (nx as f64 - 1.0) * cos_phi / 2.0 + (ny as f64 - 1.0) * sin_phi / 2.0;
    let mut grid = new_grid(nx, ny);
    for (i, row) in grid.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            let z = if i as f64 * cos_phi + j as f64 * sin_phi < offset { -1.0 } else { 1.0 };
            *v = Vector3::new(0.0, 0.0, z);
        }
    }
    grid
}

fn mi_c_rot(nx: usize, ny: usize, phi: f64) -> Result<Vec<Vec<Vector3>>> {
    if nx < 2 || ny < 2 {
        bail!(ErrorKind::ConfigurationInvalid("cRot requires Nx>1 and Ny>1".to_string()));
    }
    let (cos_phi, sin_phi) = deg_cos_sin(phi);
    let center = (nx as f64 - 1.0) * cos_phi / 2.0 + (ny as f64 - 1.0) * sin_phi / 2.0;
    let center_height = (nx as f64 - 1.0) * sin_phi / 2.0 - (ny as f64 - 1.0) * cos_phi / 2.0;
    let max_height = if ((ny as f64 - 1.0) * sin_phi).abs() < ((nx as f64 - 1.0) * cos_phi).abs() {
        ((ny as f64 - 1.0) / (2.0 * cos_phi)).abs()
    } else {
        ((nx as f64 - 1.0) / (2.0 * sin_phi)).abs()
    };

    let mut grid = new_grid(nx, ny);
    for (i, row) in grid.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            let offset = i as f64 * cos_phi + j as f64 * sin_phi;
            let height = i as f64 * sin_phi - j as f64 * cos_phi - center_height;
            let voff = max_height - height.abs();
            if offset < center - 0.5 {
                *v = Vector3::new(0.0, 0.0, -1.0);
            } else if offset > center + 1.5 || (offset > center + 0.5 && voff > 1.0) {
                *v = Vector3::new(0.0, 0.0, 1.0);
            } else if voff > 1.0 {
                *v = Vector3::new(-sin_phi, cos_phi, 0.0);
            } else if height > 0.0 {
                *v = Vector3::new(-cos_phi, -sin_phi, 0.0);
            } else {
                *v = Vector3::new(cos_phi, sin_phi, 0.0);
            }
        }
    }
    Ok(grid)
}

fn mi_bloch(nx: usize, ny: usize, theta: f64) -> Vec<Vec<Vector3>> {
    let (cy, cz) = deg_cos_sin(theta);
    let (y, z) = (-cy, -cz);
    let mut grid = new_grid(nx, ny);
    for (i, row) in grid.iter_mut().enumerate() {
        let v = if i < nx / 2 {
            Vector3::new(0.0, y, z)
        } else if i == nx / 2 {
            Vector3::new(0.0, -z, y)
        } else {
            Vector3::new(0.0, -y, -z)
        };
        for cell in row.iter_mut() {
            *cell = v;
        }
    }
    grid
}

fn mi_neel(nx: usize, ny: usize, theta: f64, width_proportion: f64) -> Vec<Vec<Vector3>> {
    let (vx, vy) = deg_cos_sin(theta);
    let dotref = (nx as f64 / 2.0) * vx + (ny as f64 / 2.0) * vy;
    let tempx = vx / nx as f64;
    let tempy = vy / ny as f64;
    let part_width = 1.0 / (tempx * tempx + tempy * tempy).sqrt();
    let mut wall_width = part_width * width_proportion;
    if wall_width == 0.0 {
        wall_width = f64::EPSILON;
    }
    let scale = std::f64::consts::PI / wall_width;

    let mut grid = new_grid(nx, ny);
    for (i, row) in grid.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            let offset = scale * (i as f64 * vx + j as f64 * vy - dotref);
            let xproj = 1.0 / (1.0 + offset * offset).sqrt();
            let yproj = offset * xproj;
            *v = Vector3::new(vx * xproj - vy * yproj, vy * xproj + vx * yproj, 0.0);
        }
    }
    grid
}

fn mi_spiral(nx: usize, ny: usize, theta: f64, period_proportion: f64) -> Vec<Vec<Vector3>> {
    let (vx, vy) = deg_cos_sin(theta);
    let dotref = (nx as f64 / 2.0) * vx + (ny as f64 / 2.0) * vy;
    let tempx = vx / nx as f64;
    let tempy = vy / ny as f64;
    let part_width = 1.0 / (tempx * tempx + tempy * tempy).sqrt();
    let mut period = part_width * period_proportion;
    if period == 0.0 {
        period = f64::EPSILON;
    }
    let scale = 2.0 * std::f64::consts::PI / period;

    let mut grid = new_grid(nx, ny);
    for (i, row) in grid.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            let offset = scale * (i as f64 * vx + j as f64 * vy - dotref);
            let (xproj, yproj) = (offset.cos(), offset.sin());
            *v = Vector3::new(vx * xproj - vy * yproj, vy * xproj + vx * yproj, 0.0);
        }
    }
    grid
}

fn mi_up_downs(nx: usize, ny: usize, domain_width: i64) -> Result<Vec<Vec<Vector3>>> {
    if domain_width < 1 {
        bail!(ErrorKind::ConfigurationInvalid("upDowns requires a positive domain width".to_string()));
    }
    let domain_width = domain_width as usize;
    let mut grid = new_grid(nx, ny);
    let mut mag = -1.0;
    for (i, row) in grid.iter_mut().enumerate() {
        if i % domain_width == 0 {
            mag *= -1.0;
        }
        for v in row.iter_mut() {
            *v = Vector3::new(0.0, mag, 0.0);
        }
    }
    Ok(grid)
}

fn mi_1domain(nx: usize, ny: usize) -> Vec<Vec<Vector3>> {
    let mut grid = new_grid(nx, ny);
    if ny > nx {
        for (i, row) in grid.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = if j < nx.saturating_sub(i) || j as i64 > ny as i64 - i as i64 {
                    Vector3::new(0.707, 0.707, 0.0)
                } else {
                    Vector3::new(0.0, 1.0, 0.0)
                };
            }
        }
    } else {
        for (i, row) in grid.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = if i < ny.saturating_sub(j) || i as i64 > nx as i64 - j as i64 {
                    Vector3::new(0.707, 0.707, 0.0)
                } else {
                    Vector3::new(1.0, 0.0, 0.0)
                };
            }
        }
    }
    grid
}

fn mi_4domain(nx: usize, ny: usize) -> Vec<Vec<Vector3>> {
    let mut grid = new_grid(nx, ny);
    let (nxi, nyi) = (nx as i64, ny as i64);
    if ny > nx {
        for (i, row) in grid.iter_mut().enumerate() {
            let ii = i as i64;
            for (j, v) in row.iter_mut().enumerate() {
                let jj = j as i64;
                let mut x = 0.0;
                let mut y = if ii < nxi / 2 { -1.0 } else { 1.0 };
                if jj < ii && jj < nxi - 1 - ii {
                    x = 1.0;
                    y = 0.0;
                }
                if jj > nyi - 1 - ii && jj > nyi - nxi + ii {
                    x = -1.0;
                    y = 0.0;
                }
                if jj == ii && ii < nxi / 2 {
                    x = 0.7;
                    y = -0.7;
                }
                if jj == nxi - 1 - ii && ii >= nxi / 2 {
                    x = 0.7;
                    y = 0.7;
                }
                if jj == nyi - 1 - ii && ii < nxi / 2 {
                    x = -0.7;
                    y = -0.7;
                }
                if jj == nyi - nxi + ii && ii >= nxi / 2 {
                    x = -0.7;
                    y = 0.7;
                }
                *v = Vector3::new(x, y, 0.0);
            }
        }
    } else {
        for (i, row) in grid.iter_mut().enumerate() {
            let ii = i as i64;
            for (j, v) in row.iter_mut().enumerate() {
                let jj = j as i64;
                let mut y = 0.0;
                let mut x = if jj < nyi / 2 { 1.0 } else { -1.0 };
                if ii < jj && ii < nyi - 1 - jj {
                    y = -1.0;
                    x = 0.0;
                }
                if ii > nxi - 1 - jj && ii > nxi - nyi + jj {
                    y = 1.0;
                    x = 0.0;
                }
                if ii == jj && jj < nyi / 2 {
                    y = -0.7;
                    x = 0.7;
                }
                if ii == nyi - 1 - jj && jj >= nyi / 2 {
                    y = -0.7;
                    x = -0.7;
                }
                if ii == nxi - 1 - jj && jj < nyi / 2 {
                    y = 0.7;
                    x = 0.7;
                }
                if ii == nxi - nyi + jj && jj >= nyi / 2 {
                    y = 0.7;
                    x = -0.7;
                }
                *v = Vector3::new(x, y, 0.0);
            }
        }
    }
    grid
}

fn mi_7domain(nx: usize, ny: usize) -> Vec<Vec<Vector3>> {
    let mut grid = new_grid(nx, ny);
    if ny > nx {
        let slope = (ny as f64 - 1.0) / (2.0 * (nx as f64 - 1.0));
        let half = (ny as f64 - 1.0) / 2.0;
        let adj = if nx % 2 == 0 { 0.5 } else { 0.0 };
        for (i, row) in grid.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                let (i, j) = (i as f64, j as f64);
                let t1 = j < half - i * slope - adj;
                let t2 = j < i * slope - adj;
                let t3 = j > half + i * slope + adj;
                let t4 = j > ny as f64 - 1.0 - i * slope + adj;
                *v = if (t1 && t2) || (t3 && t4) {
                    Vector3::new(-1.0, 0.0, 0.0)
                } else if t1 || t4 {
                    Vector3::new(0.0, 1.0, 0.0)
                } else if t2 || t3 {
                    Vector3::new(0.0, -1.0, 0.0)
                } else {
                    Vector3::new(1.0, 0.0, 0.0)
                };
            }
        }
    } else {
        let slope = (nx as f64 - 1.0) / (2.0 * (ny as f64 - 1.0));
        let half = (nx as f64 - 1.0) / 2.0;
        let adj = if ny % 2 == 0 { 0.5 } else { 0.0 };
        for (i, row) in grid.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                let (i, j) = (i as f64, j as f64);
                let t1 = i < half - j * slope - adj;
                let t2 = i < j * slope - adj;
                let t3 = i > half + j * slope + adj;
                let t4 = i > nx as f64 - 1.0 - j * slope + adj;
                *v = if (t1 && t2) || (t3 && t4) {
                    Vector3::new(0.0, -1.0, 0.0)
                } else if t1 || t4 {
                    Vector3::new(1.0, 0.0, 0.0)
                } else if t2 || t3 {
                    Vector3::new(-1.0, 0.0, 0.0)
                } else {
                    Vector3::new(0.0, 1.0, 0.0)
                };
            }
        }
    }
    grid
}

fn mi_vortex(nx: usize, ny: usize, chirality: f64) -> Vec<Vec<Vector3>> {
    let midx = (nx as f64 - 1.0) / 2.0;
    let midy = (ny as f64 - 1.0) / 2.0;
    let mut grid = new_grid(nx, ny);
    for (i, row) in grid.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            let x = i as f64 - midx;
            let y = j as f64 - midy;
            *v = if midx != i as f64 || midy != j as f64 {
                let r = x.hypot(y);
                Vector3::new(chirality * -y / r, chirality * x / r, 0.0)
            } else {
                Vector3::new(0.0, 0.0, 1.0)
            };
        }
    }
    grid
}

fn mi_sphere(nx: usize, ny: usize) -> Vec<Vec<Vector3>> {
    let midx = (nx as f64 - 1.0) / 2.0;
    let midy = (ny as f64 - 1.0) / 2.0;
    let radius = midx.min(midy).max(1.0);
    let radius_sq = radius * radius;
    let mut grid = new_grid(nx, ny);
    for (i, row) in grid.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            let x = i as f64 - midx;
            let y = j as f64 - midy;
            let proj_len = x.hypot(y);
            *v = if proj_len >= radius {
                Vector3::new(x / proj_len, y / proj_len, 0.0)
            } else {
                let z = (radius_sq - proj_len * proj_len).sqrt();
                Vector3::new(x / radius, y / radius, z / radius)
            };
        }
    }
    grid
}

fn mi_source(nx: usize, ny: usize) -> Vec<Vec<Vector3>> {
    let midx = (nx as f64 - 1.0) / 2.0;
    let midy = (ny as f64 - 1.0) / 2.0;
    let mut grid = new_grid(nx, ny);
    for (i, row) in grid.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            let x = i as f64 - midx;
            let y = j as f64 - midy;
            *v = if midx != i as f64 || midy != j as f64 {
                let r = x.hypot(y);
                Vector3::new(x / r, y / r, 0.0)
            } else {
                Vector3::new(0.0, 0.0, 1.0)
            };
        }
    }
    grid
}

/// Interface an outer harness implements to supply a decoded field/mag map
/// (OVF/VIO), used by `vioFile`/`avfFile`. This crate only consumes the
/// decoded grid.
pub trait MagFileSource {
    fn load(&self, path: &str) -> Result<Vec<Vec<Vector3>>>;
}

/// Runs the named initializer over an `nx * ny` grid and returns the
/// resulting unit-vector field in external xyz coordinates.
///
/// `file_source` is only consulted for `vioFile`/`avfFile`; pass `None` if
/// the configuration never selects one of those.
pub fn initialize<R: Rng + ?Sized>(
    name: &str,
    args: &[f64],
    nx: usize,
    ny: usize,
    rng: &mut R,
    file_source: Option<(&dyn MagFileSource, &str)>,
) -> Result<Vec<Vec<Vector3>>> {
    let lower = name.to_lowercase();
    let mut grid = match lower.as_str() {
        "" | "random" => mi_random(nx, ny, rng),
        "uniform" => {
            require_args(args, 2, "uniform")?;
            mi_uniform(nx, ny, args[0], args[1])
        }
        "vortex" => mi_vortex(nx, ny, 1.0),
        "exvort" => mi_vortex(nx, ny, -1.0),
        "sphere" => mi_sphere(nx, ny),
        "source" => mi_source(nx, ny),
        "inout" => mi_in_out(nx, ny),
        "inupout" => mi_in_up_out(nx, ny),
        "inoutrot" => {
            require_args(args, 1, "inOutRot")?;
            mi_in_out_rot(nx, ny, args[0])
        }
        "crot" => {
            require_args(args, 1, "cRot")?;
            mi_c_rot(nx, ny, args[0])?
        }
        "bloch" => {
            require_args(args, 1, "bloch")?;
            mi_bloch(nx, ny, args[0])
        }
        "neel" => {
            require_args(args, 2, "neel")?;
            mi_neel(nx, ny, args[0], args[1])
        }
        "spiral" => {
            require_args(args, 2, "spiral")?;
            mi_spiral(nx, ny, args[0], args[1])
        }
        "updowns" => {
            require_args(args, 1, "upDowns")?;
            mi_up_downs(nx, ny, args[0] as i64)?
        }
        "1domain" => mi_1domain(nx, ny),
        "4domain" => mi_4domain(nx, ny),
        "7domain" => mi_7domain(nx, ny),
        "viofile" | "avffile" => {
            let (source, path) = file_source.ok_or_else(|| {
                ErrorKind::ConfigurationInvalid(format!("{} requires a file source", name))
            })?;
            source.load(path)?
        }
        _ => bail!(ErrorKind::ConfigurationInvalid(format!("unknown mag-init routine {:?}", name))),
    };
    perturb_and_normalize(&mut grid, rng);
    Ok(grid)
}

fn require_args(args: &[f64], count: usize, name: &str) -> Result<()> {
    if args.len() != count {
        bail!(ErrorKind::ConfigurationInvalid(format!(
            "{} requires {} argument(s), got {}",
            name,
            count,
            args.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_pcg::Pcg32;

    fn rng() -> Pcg32 {
        Pcg32::new(1, 1)
    }

    #[test]
    fn uniform_fills_every_cell_with_the_same_unit_vector() {
        let grid = initialize("uniform", &[30.0, 45.0], 4, 5, &mut rng(), None).unwrap();
        let first = grid[0][0];
        for row in &grid {
            for v in row {
                assert!((v.mag() - 1.0).abs() < 1e-10);
                assert!((v.x - first.x).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn in_out_splits_down_the_middle() {
        let grid = initialize("inOut", &[], 10, 4, &mut rng(), None).unwrap();
        assert_eq!(grid[0][0].z, -1.0);
        assert_eq!(grid[9][0].z, 1.0);
    }

    #[test]
    fn vortex_and_exvort_have_opposite_chirality() {
        let v = initialize("vortex", &[], 9, 9, &mut rng(), None).unwrap();
        let e = initialize("exvort", &[], 9, 9, &mut rng(), None).unwrap();
        assert!((v[0][4].x + e[0][4].x).abs() < 1e-12);
    }

    #[test]
    fn sphere_center_points_out_of_plane() {
        let grid = initialize("sphere", &[], 9, 9, &mut rng(), None).unwrap();
        assert!(grid[4][4].z > 0.9);
    }

    #[test]
    fn unknown_routine_is_rejected() {
        assert!(initialize("not-a-routine", &[], 4, 4, &mut rng(), None).is_err());
    }

    #[test]
    fn wrong_arg_count_is_rejected() {
        assert!(initialize("uniform", &[1.0], 4, 4, &mut rng(), None).is_err());
    }

    #[test]
    fn every_cell_in_every_routine_is_unit_length() {
        let cases: &[(&str, &[f64])] = &[
            ("random", &[]),
            ("uniform", &[10.0, 20.0]),
            ("vortex", &[]),
            ("exvort", &[]),
            ("sphere", &[]),
            ("source", &[]),
            ("inOut", &[]),
            ("inUpOut", &[]),
            ("inOutRot", &[15.0]),
            ("cRot", &[15.0]),
            ("bloch", &[30.0]),
            ("neel", &[20.0, 0.2]),
            ("spiral", &[20.0, 0.2]),
            ("upDowns", &[3.0]),
            ("1domain", &[]),
            ("4domain", &[]),
            ("7domain", &[]),
        ];
        for (name, args) in cases {
            let grid = initialize(name, args, 12, 10, &mut rng(), None).unwrap();
            for row in &grid {
                for v in row {
                    assert!((v.mag() - 1.0).abs() < 1e-8, "{} gave non-unit vector {:?}", name, v);
                }
            }
        }
    }
}
