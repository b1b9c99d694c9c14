// SPDX-License-Identifier: GPL-3.0-only

//! GPU render/readback pipeline for frame extraction
//!
//! Decoded frames reach a texture through an [`ExternalFrameSource`], get
//! drawn onto an offscreen pbuffer by the textured-quad program and are read
//! back as RGBA bytes:
//!
//! - [`frame_sync`]: decoder-thread to render-thread handoff
//! - [`gl`]: the GLES2 calls the pipeline issues, over glow
//! - [`platform`]: EGL display, context and pbuffer acquisition
//! - [`frame_source`]: texture targets and source transforms
//! - [`render_surface`]: latch, draw, read back and release

pub mod frame_source;
pub mod frame_sync;
pub mod gl;
pub mod platform;
pub mod render_surface;

pub use frame_source::{
    ExternalFrameSource, Mat4, SeekableFrameSource, TextureTarget, apply_invert_y,
};
pub use frame_sync::FrameSync;
pub use gl::{GlApi, check_gl_error};
pub use platform::{EglPlatform, RenderPlatform};
pub use render_surface::{GpuRenderSurface, PixelReadbackBuffer};
