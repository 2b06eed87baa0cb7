//! Circuit graph representation and validation.
//!
//! This module provides the graph the solver works on. The [`Circuit`]
//! struct holds all components, nodes, and auxiliary current unknowns;
//! the solver refers to them only through the opaque IDs in [`types`].

mod graph;
mod types;
mod validate;

pub use graph::Circuit;
pub use types::*;
pub use validate::validate_circuit;
