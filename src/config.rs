//! The validated configuration record an outer harness hands to `Grid` at
//! construction time. This module owns parsing-independent validation only;
//! reading a config from a MIF-like file or command line is a harness job
//! (see lib.rs's scope note).

use crate::errors::{ErrorKind, Result};
use crate::vector::Vector3;

const ORTHOGONAL_TOL: f64 = 1e-6;
const UNIT_TOL: f64 = 1e-6;
const CELLSIZE_DIVIDES_TOL: f64 = 1e-4;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnisotropyType {
    Uniaxial,
    Cubic,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartShape {
    Rectangle,
    Ellipse,
    Ellipsoid,
    Oval,
    Pyramid,
    Mask,
}

/// A named function plus its positional arguments, e.g. the anisotropy-init
/// or mag-init selector (`uniform(theta, phi)` becomes `name: "uniform",
/// args: vec![theta, phi]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCall {
    pub name: String,
    pub args: Vec<f64>,
}

impl NamedCall {
    pub fn new(name: &str, args: Vec<f64>) -> NamedCall {
        NamedCall { name: name.to_string(), args }
    }
}

/// One entry of a field-range sweep: ramp the nominal field linearly from
/// `start` to `end` over `steps` increments.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRangeStep {
    pub start: Vector3,
    pub end: Vector3,
    pub steps: u32,
}

/// One sub-source of a `MultiZeeman`-style applied field, keyed by kind with
/// the arguments that source's constructor needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppliedFieldSpec {
    Uniform,
    Ribbon { rel_charge: f64, x0: f64, y0: f64, x1: f64, y1: f64, rib_height: f64 },
    Tie { field: Vector3, x0: f64, y0: f64, x1: f64, y1: f64, width: f64 },
    File { path: String, mult: f64 },
    FileSequence { paths: Vec<String>, mult: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub ms: f64,
    pub a: f64,
    pub k1: f64,
    pub edge_k1: f64,
    pub anisotropy_type: AnisotropyType,
    pub anis_dir_a: Vector3,
    pub anis_dir_b: Vector3,
    pub anisotropy_init: NamedCall,
    pub demag_routine: String,

    pub part_width: f64,
    pub part_height: f64,
    pub part_thickness: f64,
    pub cellsize: f64,
    pub part_shape: PartShape,
    pub shape_parameter: f64,

    pub mag_init: NamedCall,
    pub applied_field: Vec<AppliedFieldSpec>,
    pub field_range: Vec<FieldRangeStep>,
    pub default_control_point: String,

    pub precession: bool,
    pub gyratio: f64,
    pub damp_coef: f64,
    pub initial_increment: f64,

    pub seed: u64,
    pub min_time_step: f64,
    pub max_time_step: f64,

    pub small_steps: bool,
    pub output_formats: Vec<String>,
}

impl Configuration {
    /// Runs every check spec.md lists for a `Configuration`. Returns the
    /// first failure found; callers that want every failure at once should
    /// inline the individual checks instead.
    pub fn validate(&self) -> Result<()> {
        if self.ms <= 0.0 {
            bail!(ErrorKind::ConfigurationInvalid("Ms must be positive".to_string()));
        }
        if self.a <= 0.0 {
            bail!(ErrorKind::ConfigurationInvalid("A must be positive".to_string()));
        }

        check_unit(self.anis_dir_a, "anis_dir_a")?;
        match self.anisotropy_type {
            AnisotropyType::Uniaxial => {}
            AnisotropyType::Cubic => {
                check_unit(self.anis_dir_b, "anis_dir_b")?;
                let dot = self.anis_dir_a.dot(&self.anis_dir_b);
                if dot.abs() > ORTHOGONAL_TOL {
                    bail!(ErrorKind::ConfigurationInvalid(
                        "cubic anisotropy axes must be orthogonal".to_string()
                    ));
                }
            }
        }

        if self.part_width <= 0.0 || self.part_height <= 0.0 || self.part_thickness <= 0.0 {
            bail!(ErrorKind::ConfigurationInvalid("part dimensions must be positive".to_string()));
        }
        if self.cellsize <= 0.0 {
            bail!(ErrorKind::ConfigurationInvalid("cellsize must be positive".to_string()));
        }
        if self.cellsize > self.part_width || self.cellsize > self.part_height {
            bail!(ErrorKind::ConfigurationInvalid(
                "cellsize is larger than a part dimension".to_string()
            ));
        }
        check_divides(self.part_width, self.cellsize, "part_width")?;
        check_divides(self.part_height, self.cellsize, "part_height")?;

        if self.min_time_step <= 0.0 || self.max_time_step <= 0.0 {
            bail!(ErrorKind::ConfigurationInvalid("time steps must be positive".to_string()));
        }
        if self.min_time_step > self.max_time_step {
            bail!(ErrorKind::ConfigurationInvalid("min_time_step exceeds max_time_step".to_string()));
        }
        if self.gyratio <= 0.0 || self.damp_coef <= 0.0 {
            bail!(ErrorKind::ConfigurationInvalid("gyratio and damp_coef must be positive".to_string()));
        }

        Ok(())
    }
}

fn check_unit(v: Vector3, label: &str) -> Result<()> {
    if (v.mag() - 1.0).abs() > UNIT_TOL {
        bail!(ErrorKind::ConfigurationInvalid(format!("{} is not a unit vector", label)));
    }
    Ok(())
}

fn check_divides(dimension: f64, cellsize: f64, label: &str) -> Result<()> {
    let ratio = dimension / cellsize;
    let nearest = ratio.round();
    if nearest <= 0.0 || (ratio - nearest).abs() / nearest > CELLSIZE_DIVIDES_TOL {
        bail!(ErrorKind::ConfigurationInvalid(format!(
            "cellsize does not evenly divide {}",
            label
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

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
            part_width: 100.0,
            part_height: 100.0,
            part_thickness: 5.0,
            cellsize: 5.0,
            part_shape: PartShape::Rectangle,
            shape_parameter: 0.0,
            mag_init: NamedCall::new("uniform", vec![0.0, 0.0]),
            applied_field: vec![AppliedFieldSpec::Uniform],
            field_range: vec![],
            default_control_point: "-torque 1e-5".to_string(),
            precession: true,
            gyratio: 2.21e5,
            damp_coef: 0.5,
            initial_increment: 0.01,
            seed: 1,
            min_time_step: 1e-6,
            max_time_step: 1.0,
            small_steps: false,
            output_formats: vec![],
        }
    }

    #[test]
    fn valid_configuration_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_ms() {
        let mut c = base_config();
        c.ms = 0.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_non_unit_anisotropy_direction() {
        let mut c = base_config();
        c.anis_dir_a = Vector3::new(2.0, 0.0, 0.0);
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_non_orthogonal_cubic_axes() {
        let mut c = base_config();
        c.anisotropy_type = AnisotropyType::Cubic;
        c.anis_dir_a = Vector3::new(1.0, 0.0, 0.0);
        c.anis_dir_b = Vector3::new(1.0, 0.0, 0.0);
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_cellsize_larger_than_part() {
        let mut c = base_config();
        c.cellsize = 200.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_cellsize_that_does_not_divide_part_dimensions() {
        let mut c = base_config();
        c.part_width = 103.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn serialize_then_deserialize_round_trips() {
        let c = base_config();
        let toml_text = toml::to_string(&c).expect("serialize");
        let back: Configuration = toml::from_str(&toml_text).expect("deserialize");
        assert_eq!(c, back);
    }
}
