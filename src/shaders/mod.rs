// SPDX-License-Identifier: GPL-3.0-only
//! Shader programs for the render/readback path
//!
//! A single program is needed: a full-screen quad sampling the decoder's
//! frame texture through the source transform.

pub mod texture_program;

pub use texture_program::ShaderProgram;
