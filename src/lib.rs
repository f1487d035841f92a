//! Computational core of a 2D micromagnetic simulator.
//!
//! This crate integrates the Landau-Lifschitz-Gilbert equation of motion for
//! a rectangular grid of magnetic cells, with the effective field built from
//! exchange, magneto-crystalline anisotropy, magnetostatic (demag), and
//! applied-field contributions. It also exposes the analytic + asymptotic
//! demagnetization-tensor kernel (`newell`, `asymptotic`, `periodic`) as a
//! standalone 3D building block.
//!
//! Out of scope: command dispatch, MIF/OVF file parsing, output-file
//! encoding, timing instrumentation, and image-mask loading. Those are the
//! job of an outer harness; this crate only describes the interfaces it
//! needs from one (see `config` and `applied_field::FileSource`).

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate serde_derive;

pub mod errors;
pub mod vector;
pub mod accurate_sum;
pub mod coords;
pub mod newell;
pub mod asymptotic;
pub mod periodic;
pub mod cell;
pub mod config;
pub mod applied_field;
pub mod mag_init;
pub mod grid;

pub use crate::cell::Cell;
pub use crate::config::Configuration;
pub use crate::errors::{Error as CoreError, ErrorKind, Result};
pub use crate::grid::integrator::Stepper;
pub use crate::grid::Grid;
pub use crate::vector::Vector3;
