//! Host systems run by the frame schedule.
//!
//! - [`input`] – raylib mouse and keyboard polling
//! - [`scripts`] – pointer dispatch, script advance and asset requests
//! - [`render`] – the raylib-backed render context and frame drawing
//! - [`time`] – per-frame `WorldTime` update
pub mod input;
pub mod render;
pub mod scripts;
pub mod time;
