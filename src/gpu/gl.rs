// SPDX-License-Identifier: GPL-3.0-only

//! The GLES2 calls used by the render/readback path
//!
//! [`GlApi`] is the narrow slice of GL the shader program and render surface
//! issue, with glow-style associated handle types. It is implemented for
//! [`glow::Context`]; tests drive the same code through a recording fake.
//!
//! Real implementations require the owning context to be current on the
//! calling thread. [`GpuRenderSurface`](super::GpuRenderSurface) makes its
//! context current on creation and never leaves its thread.

use crate::errors::{ShaderStage, TranscodeError, TranscodeResult};
use glow::HasContext;

/// GL enum values shared by every implementation
pub mod consts {
    pub const NO_ERROR: u32 = glow::NO_ERROR;
    pub const TEXTURE_2D: u32 = glow::TEXTURE_2D;
    /// `GL_TEXTURE_EXTERNAL_OES` from `OES_EGL_image_external`
    pub const TEXTURE_EXTERNAL_OES: u32 = 0x8D65;
    pub const TEXTURE0: u32 = glow::TEXTURE0;
    pub const TEXTURE_MIN_FILTER: u32 = glow::TEXTURE_MIN_FILTER;
    pub const TEXTURE_MAG_FILTER: u32 = glow::TEXTURE_MAG_FILTER;
    pub const TEXTURE_WRAP_S: u32 = glow::TEXTURE_WRAP_S;
    pub const TEXTURE_WRAP_T: u32 = glow::TEXTURE_WRAP_T;
    pub const NEAREST: i32 = glow::NEAREST as i32;
    pub const LINEAR: i32 = glow::LINEAR as i32;
    pub const CLAMP_TO_EDGE: i32 = glow::CLAMP_TO_EDGE as i32;
}

/// GLES2 entry points used by this crate
pub trait GlApi {
    type Shader: Copy + std::fmt::Debug;
    type Program: Copy + std::fmt::Debug;
    type Buffer: Copy + std::fmt::Debug;
    type Texture: Copy + std::fmt::Debug;
    type UniformLocation: std::fmt::Debug;

    fn create_shader(&self, stage: ShaderStage) -> Result<Self::Shader, String>;
    fn shader_source(&self, shader: Self::Shader, source: &str);
    fn compile_shader(&self, shader: Self::Shader);
    fn shader_compile_status(&self, shader: Self::Shader) -> bool;
    fn shader_info_log(&self, shader: Self::Shader) -> String;
    fn delete_shader(&self, shader: Self::Shader);

    fn create_program(&self) -> Result<Self::Program, String>;
    fn attach_shader(&self, program: Self::Program, shader: Self::Shader);
    fn link_program(&self, program: Self::Program);
    fn program_link_status(&self, program: Self::Program) -> bool;
    fn program_info_log(&self, program: Self::Program) -> String;
    fn use_program(&self, program: Option<Self::Program>);
    fn delete_program(&self, program: Self::Program);
    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32>;
    fn uniform_location(&self, program: Self::Program, name: &str)
    -> Option<Self::UniformLocation>;
    fn uniform_matrix4(&self, location: &Self::UniformLocation, matrix: &[f32; 16]);

    fn create_buffer(&self) -> Result<Self::Buffer, String>;
    fn bind_array_buffer(&self, buffer: Option<Self::Buffer>);
    fn array_buffer_data(&self, data: &[u8]);
    fn delete_buffer(&self, buffer: Self::Buffer);
    fn enable_vertex_attrib_array(&self, index: u32);
    /// Float attribute with `size` components at byte `offset`
    fn vertex_attrib_pointer(&self, index: u32, size: i32, stride: i32, offset: i32);

    fn create_texture(&self) -> Result<Self::Texture, String>;
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, target: u32, texture: Option<Self::Texture>);
    fn tex_parameter(&self, target: u32, parameter: u32, value: i32);
    /// Upload tightly packed RGBA8 pixels into the bound texture
    fn tex_image_rgba(&self, target: u32, width: i32, height: i32, pixels: &[u8]);
    fn delete_texture(&self, texture: Self::Texture);

    fn viewport(&self, width: i32, height: i32);
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32);
    fn clear(&self);
    fn draw_triangle_strip(&self, first: i32, count: i32);
    /// Synchronous RGBA8 readback of the framebuffer origin rectangle
    fn read_pixels_rgba(&self, width: i32, height: i32, out: &mut [u8]);
    fn get_error(&self) -> u32;
}

/// Turn a pending GPU error into `TranscodeError::Gpu`
///
/// Called after every GPU call in the render path.
pub fn check_gl_error<G: GlApi>(gl: &G, operation: &str) -> TranscodeResult<()> {
    let code = gl.get_error();
    if code == consts::NO_ERROR {
        Ok(())
    } else {
        tracing::error!(operation, code = format_args!("{:#06x}", code), "GL error");
        Err(TranscodeError::Gpu {
            operation: operation.to_string(),
            code,
        })
    }
}

impl GlApi for glow::Context {
    type Shader = <glow::Context as HasContext>::Shader;
    type Program = <glow::Context as HasContext>::Program;
    type Buffer = <glow::Context as HasContext>::Buffer;
    type Texture = <glow::Context as HasContext>::Texture;
    type UniformLocation = <glow::Context as HasContext>::UniformLocation;

    fn create_shader(&self, stage: ShaderStage) -> Result<Self::Shader, String> {
        let kind = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe { HasContext::create_shader(self, kind) }
    }

    fn shader_source(&self, shader: Self::Shader, source: &str) {
        unsafe { HasContext::shader_source(self, shader, source) }
    }

    fn compile_shader(&self, shader: Self::Shader) {
        unsafe { HasContext::compile_shader(self, shader) }
    }

    fn shader_compile_status(&self, shader: Self::Shader) -> bool {
        unsafe { self.get_shader_compile_status(shader) }
    }

    fn shader_info_log(&self, shader: Self::Shader) -> String {
        unsafe { self.get_shader_info_log(shader) }
    }

    fn delete_shader(&self, shader: Self::Shader) {
        unsafe { HasContext::delete_shader(self, shader) }
    }

    fn create_program(&self) -> Result<Self::Program, String> {
        unsafe { HasContext::create_program(self) }
    }

    fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        unsafe { HasContext::attach_shader(self, program, shader) }
    }

    fn link_program(&self, program: Self::Program) {
        unsafe { HasContext::link_program(self, program) }
    }

    fn program_link_status(&self, program: Self::Program) -> bool {
        unsafe { self.get_program_link_status(program) }
    }

    fn program_info_log(&self, program: Self::Program) -> String {
        unsafe { self.get_program_info_log(program) }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        unsafe { HasContext::use_program(self, program) }
    }

    fn delete_program(&self, program: Self::Program) {
        unsafe { HasContext::delete_program(self, program) }
    }

    fn attrib_location(&self, program: Self::Program, name: &str) -> Option<u32> {
        unsafe { self.get_attrib_location(program, name) }
    }

    fn uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        unsafe { self.get_uniform_location(program, name) }
    }

    fn uniform_matrix4(&self, location: &Self::UniformLocation, matrix: &[f32; 16]) {
        unsafe { self.uniform_matrix_4_f32_slice(Some(location), false, matrix) }
    }

    fn create_buffer(&self) -> Result<Self::Buffer, String> {
        unsafe { HasContext::create_buffer(self) }
    }

    fn bind_array_buffer(&self, buffer: Option<Self::Buffer>) {
        unsafe { self.bind_buffer(glow::ARRAY_BUFFER, buffer) }
    }

    fn array_buffer_data(&self, data: &[u8]) {
        unsafe { self.buffer_data_u8_slice(glow::ARRAY_BUFFER, data, glow::STATIC_DRAW) }
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        unsafe { HasContext::delete_buffer(self, buffer) }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { HasContext::enable_vertex_attrib_array(self, index) }
    }

    fn vertex_attrib_pointer(&self, index: u32, size: i32, stride: i32, offset: i32) {
        unsafe { self.vertex_attrib_pointer_f32(index, size, glow::FLOAT, false, stride, offset) }
    }

    fn create_texture(&self) -> Result<Self::Texture, String> {
        unsafe { HasContext::create_texture(self) }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { HasContext::active_texture(self, unit) }
    }

    fn bind_texture(&self, target: u32, texture: Option<Self::Texture>) {
        unsafe { HasContext::bind_texture(self, target, texture) }
    }

    fn tex_parameter(&self, target: u32, parameter: u32, value: i32) {
        unsafe { self.tex_parameter_i32(target, parameter, value) }
    }

    fn tex_image_rgba(&self, target: u32, width: i32, height: i32, pixels: &[u8]) {
        unsafe {
            self.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            self.tex_image_2d(
                target,
                0,
                glow::RGBA as i32,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(pixels)),
            )
        }
    }

    fn delete_texture(&self, texture: Self::Texture) {
        unsafe { HasContext::delete_texture(self, texture) }
    }

    fn viewport(&self, width: i32, height: i32) {
        unsafe { HasContext::viewport(self, 0, 0, width, height) }
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { HasContext::clear_color(self, r, g, b, a) }
    }

    fn clear(&self) {
        unsafe { HasContext::clear(self, glow::COLOR_BUFFER_BIT) }
    }

    fn draw_triangle_strip(&self, first: i32, count: i32) {
        unsafe { self.draw_arrays(glow::TRIANGLE_STRIP, first, count) }
    }

    fn read_pixels_rgba(&self, width: i32, height: i32, out: &mut [u8]) {
        unsafe {
            self.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            self.read_pixels(
                0,
                0,
                width,
                height,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(Some(out)),
            )
        }
    }

    fn get_error(&self) -> u32 {
        unsafe { HasContext::get_error(self) }
    }
}
