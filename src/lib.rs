//! Reduced-order modeling for finite-volume flow problems.
//!
//! `romulus` takes full-order snapshot data produced by a finite-volume
//! discretization and turns it into small dense systems that can be solved
//! online in milliseconds: POD basis construction, Galerkin and
//! Petrov-Galerkin projection of linear systems and snapshots, reduced
//! rank-3 tensor assembly for trilinear terms, a binary cache format for
//! offline artifacts, and the Newton scaffolding that drives the online
//! solves.

pub mod field;
pub mod modes;
pub mod parallel;
pub mod pod;
pub mod projection;
pub mod reduced;
pub mod storage;
pub mod tensor;

pub mod optimize {
    pub use romulus_optimize::*;
}
