//! Retained-mode scene graph.
//!
//! Nodes are layers, decorators wrapping a single child, or leaves that put
//! pixels on screen. Drawing goes through [`render::RenderContext`] and
//! pointer routing through the inverse of each decorator's transform.
pub mod layer;
pub mod node;
pub mod render;
pub mod transform;
pub mod vector;
