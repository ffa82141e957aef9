//! Event types exchanged between the host and the scene graph.
//!
//! Submodules:
//! - [`pointer`] – pointer events, node handlers and their propagation
pub mod pointer;
