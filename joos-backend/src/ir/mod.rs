//! Intermediate Representation (IR) module.
//!
//! This module contains the tree IR definitions, the node builder, the
//! reserved-name conventions, and the canonicalization pass with its checker.

pub mod ir;
pub use ir::*;
pub mod builder;
pub use builder::IrBuilder;
pub mod conventions;
pub mod canonicalize;
pub mod canonical_check;
