// SPDX-License-Identifier: GPL-3.0-only

//! Offscreen surface that latches, draws and reads back decoded frames
//!
//! Per frame the extraction loop runs:
//!
//! ```text
//! latch_next_frame(timeout) -> draw_frame(invert_y) -> read_pixels()
//! ```
//!
//! The surface owns its GL context and is pinned to the thread that created
//! it (`!Send`). Release happens once, in the order surface, context, thread
//! binding, either explicitly or on drop.

use super::frame_source::{ExternalFrameSource, IDENTITY, apply_invert_y};
use super::frame_sync::FrameSync;
use super::gl::{GlApi, check_gl_error, consts};
use super::platform::{EglPlatform, RenderPlatform};
use crate::errors::{TranscodeError, TranscodeResult};
use crate::shaders::ShaderProgram;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reusable RGBA8 readback target
///
/// Allocated once per surface as `width * height * 4` bytes and overwritten by
/// every readback. Bytes are in R, G, B, A order; rows run bottom-up in GL
/// window coordinates, which is top-down for a source drawn with
/// `invert_y = true`.
#[derive(Debug, Clone)]
pub struct PixelReadbackBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl PixelReadbackBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; width as usize * height as usize * 4],
            width,
            height,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// GPU render target plus the frame source feeding it
pub struct GpuRenderSurface<P: RenderPlatform, S: ExternalFrameSource> {
    platform: P,
    source: S,
    program: ShaderProgram<P::Gl>,
    texture: <P::Gl as GlApi>::Texture,
    frame_sync: Arc<FrameSync>,
    readback: PixelReadbackBuffer,
    width: u32,
    height: u32,
    released: bool,
    _not_send: PhantomData<*const ()>,
}

impl<S: ExternalFrameSource> GpuRenderSurface<EglPlatform, S> {
    /// Create an EGL pbuffer surface of `width x height` fed by `source`
    pub fn create(width: u32, height: u32, source: S) -> TranscodeResult<Self> {
        validate_size(width, height)?;
        let platform = EglPlatform::open(width, height)?;
        Self::with_platform(platform, source, width, height)
    }
}

impl<P: RenderPlatform, S: ExternalFrameSource> GpuRenderSurface<P, S> {
    /// Set up program, frame texture and readback buffer on `platform`
    ///
    /// On failure the platform is released before the error is returned.
    pub fn with_platform(
        mut platform: P,
        source: S,
        width: u32,
        height: u32,
    ) -> TranscodeResult<Self> {
        if let Err(e) = validate_size(width, height) {
            release_platform(&mut platform);
            return Err(e);
        }

        match Self::init_gl(&platform, &source, width, height) {
            Ok((program, texture)) => {
                info!(width, height, target = ?source.texture_target(), "Render surface ready");
                let frame_sync = source.frame_sync();
                Ok(Self {
                    platform,
                    source,
                    program,
                    texture,
                    frame_sync,
                    readback: PixelReadbackBuffer::new(width, height),
                    width,
                    height,
                    released: false,
                    _not_send: PhantomData,
                })
            }
            Err(e) => {
                release_platform(&mut platform);
                Err(e)
            }
        }
    }

    fn init_gl(
        platform: &P,
        source: &S,
        width: u32,
        height: u32,
    ) -> TranscodeResult<(ShaderProgram<P::Gl>, <P::Gl as GlApi>::Texture)> {
        platform.make_current()?;
        let gl = platform.gl();
        let target = source.texture_target();

        let mut program = ShaderProgram::compile(gl, target)?;

        let texture = match create_frame_texture(gl, target.gl_enum()) {
            Ok(texture) => texture,
            Err(e) => {
                program.release(gl);
                return Err(e);
            }
        };

        gl.viewport(width as i32, height as i32);
        if let Err(e) = check_gl_error(gl, "glViewport") {
            gl.delete_texture(texture);
            program.release(gl);
            return Err(e);
        }

        Ok((program, texture))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Handoff the decoder callback signals
    pub fn frame_sync(&self) -> Arc<FrameSync> {
        Arc::clone(&self.frame_sync)
    }

    /// The frame source, for issuing decode requests
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Bind context and surface to the calling thread
    pub fn make_current(&self) -> TranscodeResult<()> {
        self.ensure_live()?;
        self.platform.make_current()
    }

    /// Wait for the decoder's next frame and latch it into the texture
    ///
    /// # Returns
    /// * `Err(TranscodeError::FrameTimeout)` - No frame within `timeout`; fatal
    /// * `Err(TranscodeError::ProtocolViolation)` - The decoder double-signalled
    pub fn latch_next_frame(&mut self, timeout: Duration) -> TranscodeResult<()> {
        self.ensure_live()?;
        self.frame_sync.await_and_consume(timeout)?;

        let gl = self.platform.gl();
        gl.active_texture(consts::TEXTURE0);
        gl.bind_texture(self.source.texture_target().gl_enum(), Some(self.texture));
        check_gl_error(gl, "glBindTexture frame")?;
        self.source.update_tex_image(gl, self.texture)?;
        check_gl_error(gl, "updateTexImage")?;
        debug!("Frame latched");
        Ok(())
    }

    /// Draw the latched frame, optionally flipped vertically
    pub fn draw_frame(&self, invert_y: bool) -> TranscodeResult<()> {
        self.ensure_live()?;
        let source_transform = apply_invert_y(self.source.transform_matrix(), invert_y);
        self.program
            .draw(self.platform.gl(), self.texture, &IDENTITY, &source_transform)
    }

    /// Read the drawn frame back into the reusable buffer
    ///
    /// The returned view stays valid until the next call.
    pub fn read_pixels(&mut self) -> TranscodeResult<&PixelReadbackBuffer> {
        self.ensure_live()?;
        let gl = self.platform.gl();
        gl.read_pixels_rgba(
            self.width as i32,
            self.height as i32,
            &mut self.readback.data,
        );
        check_gl_error(gl, "glReadPixels")?;
        Ok(&self.readback)
    }

    /// Release GPU resources; later calls are no-ops
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let gl = self.platform.gl();
        self.program.release(gl);
        gl.delete_texture(self.texture);
        release_platform(&mut self.platform);
        info!("Render surface released");
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn ensure_live(&self) -> TranscodeResult<()> {
        if self.released {
            Err(TranscodeError::UseAfterRelease("GpuRenderSurface"))
        } else {
            Ok(())
        }
    }
}

impl<P: RenderPlatform, S: ExternalFrameSource> Drop for GpuRenderSurface<P, S> {
    fn drop(&mut self) {
        self.release();
    }
}

fn validate_size(width: u32, height: u32) -> TranscodeResult<()> {
    if width == 0 || height == 0 {
        return Err(TranscodeError::SurfaceInit {
            code: 0,
            message: format!("Invalid surface size {}x{}", width, height),
        });
    }
    Ok(())
}

fn create_frame_texture<G: GlApi>(gl: &G, target: u32) -> TranscodeResult<G::Texture> {
    let texture = gl.create_texture().map_err(|log| TranscodeError::Gpu {
        operation: format!("glGenTextures: {}", log),
        code: 0,
    })?;
    gl.bind_texture(target, Some(texture));
    check_gl_error(gl, "glBindTexture")?;
    gl.tex_parameter(target, consts::TEXTURE_MIN_FILTER, consts::NEAREST);
    gl.tex_parameter(target, consts::TEXTURE_MAG_FILTER, consts::LINEAR);
    gl.tex_parameter(target, consts::TEXTURE_WRAP_S, consts::CLAMP_TO_EDGE);
    gl.tex_parameter(target, consts::TEXTURE_WRAP_T, consts::CLAMP_TO_EDGE);
    if let Err(e) = check_gl_error(gl, "glTexParameter") {
        gl.delete_texture(texture);
        return Err(e);
    }
    Ok(texture)
}

/// Surface, then context, then thread binding; every step runs even if an
/// earlier one fails
fn release_platform<P: RenderPlatform>(platform: &mut P) {
    if let Err(e) = platform.destroy_surface() {
        warn!(error = %e, "Failed to destroy surface");
    }
    if let Err(e) = platform.destroy_context() {
        warn!(error = %e, "Failed to destroy context");
    }
    if let Err(e) = platform.release_thread() {
        warn!(error = %e, "Failed to release thread binding");
    }
}
