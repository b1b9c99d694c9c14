// SPDX-License-Identifier: GPL-3.0-only

//! Offscreen rendering context acquisition
//!
//! [`RenderPlatform`] owns a display connection, a GLES2 context and a
//! pbuffer surface. [`EglPlatform`] implements it over a dynamically loaded
//! libEGL, so the binary starts on machines without GPU drivers and only
//! fails when extraction is actually requested.

use super::gl::GlApi;
use crate::errors::{TranscodeError, TranscodeResult};
use khronos_egl as egl;
use tracing::{debug, info, warn};

/// Context, surface and thread binding for one render surface
///
/// Teardown is split into the three release steps so the owner controls
/// their order.
pub trait RenderPlatform {
    type Gl: GlApi;

    /// GL entry points for the owned context
    fn gl(&self) -> &Self::Gl;

    /// Bind context and surface to the calling thread
    fn make_current(&self) -> TranscodeResult<()>;

    fn destroy_surface(&mut self) -> TranscodeResult<()>;

    fn destroy_context(&mut self) -> TranscodeResult<()>;

    /// Drop the calling thread's binding and the display connection
    fn release_thread(&mut self) -> TranscodeResult<()>;
}

type EglInstance = egl::DynamicInstance<egl::EGL1_4>;

/// `EGL_BAD_CONFIG`, reported when no config matches
const EGL_BAD_CONFIG: i32 = 0x3005;

/// EGL pbuffer with a GLES2 context
pub struct EglPlatform {
    egl: EglInstance,
    display: egl::Display,
    context: Option<egl::Context>,
    surface: Option<egl::Surface>,
    gl: glow::Context,
}

impl EglPlatform {
    /// Acquire display, config, context and a `width x height` pbuffer
    ///
    /// The context is current on the calling thread when this returns.
    ///
    /// # Returns
    /// * `Ok(EglPlatform)` - Ready-to-draw platform
    /// * `Err(TranscodeError::SurfaceInit)` - Any acquisition step failed;
    ///   everything acquired before the failure is released
    pub fn open(width: u32, height: u32) -> TranscodeResult<Self> {
        info!(width, height, "Creating EGL pbuffer surface");

        let egl = unsafe { EglInstance::load_required() }.map_err(|e| {
            TranscodeError::SurfaceInit {
                code: 0,
                message: format!("Failed to load libEGL: {}", e),
            }
        })?;

        let display = unsafe { egl.get_display(egl::DEFAULT_DISPLAY) }
            .ok_or_else(|| surface_error(&egl, "Unable to get EGL display"))?;

        let (major, minor) = egl
            .initialize(display)
            .map_err(|e| egl_error(e, "Unable to initialize EGL"))?;
        debug!(major, minor, "EGL initialized");

        match Self::create_context_and_surface(&egl, display, width, height) {
            Ok((context, surface)) => {
                let gl = unsafe {
                    glow::Context::from_loader_function(|name| {
                        egl.get_proc_address(name)
                            .map_or(std::ptr::null(), |f| f as *const std::ffi::c_void)
                    })
                };
                Ok(Self {
                    egl,
                    display,
                    context: Some(context),
                    surface: Some(surface),
                    gl,
                })
            }
            Err(e) => {
                let _ = egl.terminate(display);
                Err(e)
            }
        }
    }

    fn create_context_and_surface(
        egl: &EglInstance,
        display: egl::Display,
        width: u32,
        height: u32,
    ) -> TranscodeResult<(egl::Context, egl::Surface)> {
        let config_attribs = [
            egl::RED_SIZE,
            8,
            egl::GREEN_SIZE,
            8,
            egl::BLUE_SIZE,
            8,
            egl::ALPHA_SIZE,
            8,
            egl::RENDERABLE_TYPE,
            egl::OPENGL_ES2_BIT,
            egl::SURFACE_TYPE,
            egl::PBUFFER_BIT,
            egl::NONE,
        ];
        let config = egl
            .choose_first_config(display, &config_attribs)
            .map_err(|e| egl_error(e, "Unable to choose EGL config"))?
            .ok_or_else(|| TranscodeError::SurfaceInit {
                code: EGL_BAD_CONFIG,
                message: "No RGBA8888 pbuffer-capable EGL config".into(),
            })?;

        egl.bind_api(egl::OPENGL_ES_API)
            .map_err(|e| egl_error(e, "Unable to bind OpenGL ES API"))?;

        let context_attribs = [egl::CONTEXT_CLIENT_VERSION, 2, egl::NONE];
        let context = egl
            .create_context(display, config, None, &context_attribs)
            .map_err(|e| egl_error(e, "Unable to create EGL context"))?;

        let surface_attribs = [
            egl::WIDTH,
            width as egl::Int,
            egl::HEIGHT,
            height as egl::Int,
            egl::NONE,
        ];
        let surface = match egl.create_pbuffer_surface(display, config, &surface_attribs) {
            Ok(surface) => surface,
            Err(e) => {
                let _ = egl.destroy_context(display, context);
                return Err(egl_error(e, "Unable to create pbuffer surface"));
            }
        };

        if let Err(e) = egl.make_current(display, Some(surface), Some(surface), Some(context)) {
            let _ = egl.destroy_surface(display, surface);
            let _ = egl.destroy_context(display, context);
            return Err(egl_error(e, "Unable to make EGL context current"));
        }

        Ok((context, surface))
    }
}

impl RenderPlatform for EglPlatform {
    type Gl = glow::Context;

    fn gl(&self) -> &glow::Context {
        &self.gl
    }

    fn make_current(&self) -> TranscodeResult<()> {
        let (Some(context), Some(surface)) = (self.context, self.surface) else {
            return Err(TranscodeError::ContextBind(
                "EGL context or surface already destroyed".into(),
            ));
        };
        self.egl
            .make_current(self.display, Some(surface), Some(surface), Some(context))
            .map_err(|e| TranscodeError::ContextBind(format!("eglMakeCurrent failed: {}", e)))
    }

    fn destroy_surface(&mut self) -> TranscodeResult<()> {
        if let Some(surface) = self.surface.take() {
            self.egl
                .destroy_surface(self.display, surface)
                .map_err(|e| egl_release_error(e, "eglDestroySurface"))?;
            debug!("EGL surface destroyed");
        }
        Ok(())
    }

    fn destroy_context(&mut self) -> TranscodeResult<()> {
        if let Some(context) = self.context.take() {
            self.egl
                .destroy_context(self.display, context)
                .map_err(|e| egl_release_error(e, "eglDestroyContext"))?;
            debug!("EGL context destroyed");
        }
        Ok(())
    }

    fn release_thread(&mut self) -> TranscodeResult<()> {
        self.egl
            .release_thread()
            .map_err(|e| egl_release_error(e, "eglReleaseThread"))?;
        if let Err(e) = self.egl.terminate(self.display) {
            warn!(error = %e, "eglTerminate failed");
        }
        Ok(())
    }
}

fn egl_error(err: egl::Error, message: &str) -> TranscodeError {
    TranscodeError::SurfaceInit {
        code: err.native(),
        message: format!("{}: {}", message, err),
    }
}

fn surface_error(egl: &EglInstance, message: &str) -> TranscodeError {
    TranscodeError::SurfaceInit {
        code: egl.get_error().map(|e| e.native()).unwrap_or(0),
        message: message.to_string(),
    }
}

fn egl_release_error(err: egl::Error, operation: &str) -> TranscodeError {
    TranscodeError::Gpu {
        operation: operation.to_string(),
        code: err.native() as u32,
    }
}
