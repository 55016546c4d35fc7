//! Dependency graph construction, validation, and topological leveling.
//!
//! A [`Ride`]'s flow tree is materialized into a flat, deduplicated set of
//! effective segments with structural dependencies (`graph::Graph::build`),
//! then checked for cycles, self-dependencies, unknown references, and
//! missing artifacts before a scheduler ever sees it.
//!
//! [`Ride`]: kite_model::Ride

mod graph;
mod materialize;
mod warning;

pub use graph::{BuildOutcome, Graph, Level};
pub use warning::Warning;
