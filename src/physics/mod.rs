//! Physics worlds, bodies and fixtures exposed to scripts.
pub mod objects;
pub mod simulation;
