//! ## Background
//!
//! A federated query engine answers a query over many remote sources, none of which holds all the
//! data. Before anything is executed the query has to be decomposed: every triple pattern must be
//! routed to sources able to answer it, and the pieces have to be joined back together in a plan
//! the engine can run.
//!
//! Sources are described by a catalogue of molecules. A molecule is a source independent RDF shape
//! (the predicates instances of a class have, and which other classes their objects belong to),
//! and every molecule lists the wrappers (physical endpoints) serving some of its predicates.
//!
//! Decomposition works on star shaped sub queries, the triple patterns sharing one subject. Stars
//! are matched against molecules by their predicates, candidates are narrowed through the links
//! between molecules and the connections between stars, and each star is finally covered by
//! calls to the wrappers of its molecules. Filters are pushed to the smallest part of the plan
//! binding all of their variables.
//!
//! ## Design
//!
//! * [`ast`] Query and plan node model.
//! * [`catalogue`] Molecule catalogue and its loader.
//! * [`decomposer`] Star extraction, source selection, pruning and wrapper cover.
//! * [`filter`] Filter placement.
//! * [`planner`] Join tree construction for decomposed blocks.
//! * [`session`] Decomposition entry point.

#[macro_use]
extern crate lazy_static;

pub mod ast;
pub mod catalogue;
pub mod decomposer;
pub mod error;
pub mod explain;
pub mod filter;
pub mod options;
pub mod planner;
pub mod session;

#[cfg(test)]
mod test_utils;

pub use error::{DecomposeError, DecomposeResult};
pub use options::{DecomposerOptions, SourceSelectionMode};
pub use session::{decompose, DecompositionSession};
