// SPDX-License-Identifier: GPL-3.0-only

//! Full-screen textured quad program
//!
//! Draws the latched decoder frame over the whole surface. Texture
//! coordinates pass through the source transform reported by the frame
//! source, which is how vertical flips and crops reach the output.
//!
//! Every GL call is followed by an error check; any pending error aborts the
//! draw with `TranscodeError::Gpu`.

use crate::errors::{ShaderStage, TranscodeError, TranscodeResult};
use crate::gpu::frame_source::{Mat4, TextureTarget};
use crate::gpu::gl::{GlApi, check_gl_error, consts};
use tracing::{debug, info};

const VERTEX_SHADER: &str = "\
uniform mat4 uMVPMatrix;
uniform mat4 uSTMatrix;
attribute vec4 aPosition;
attribute vec4 aTextureCoord;
varying vec2 vTextureCoord;
void main() {
    gl_Position = uMVPMatrix * aPosition;
    vTextureCoord = (uSTMatrix * aTextureCoord).xy;
}
";

/// Floats per vertex: position xyz, then uv
const VERTEX_FLOATS: usize = 5;
const VERTEX_STRIDE_BYTES: i32 = (VERTEX_FLOATS * std::mem::size_of::<f32>()) as i32;
const POSITION_OFFSET_BYTES: i32 = 0;
const UV_OFFSET_BYTES: i32 = (3 * std::mem::size_of::<f32>()) as i32;

/// Triangle strip covering clip space, with matching texture coordinates
pub const FULL_SCREEN_QUAD: [f32; 4 * VERTEX_FLOATS] = [
    // X, Y, Z, U, V
    -1.0, -1.0, 0.0, 0.0, 0.0, //
    1.0, -1.0, 0.0, 1.0, 0.0, //
    -1.0, 1.0, 0.0, 0.0, 1.0, //
    1.0, 1.0, 0.0, 1.0, 1.0,
];

/// Opaque green, so a frame that failed to draw is obvious in the output
const CLEAR_COLOR: [f32; 4] = [0.0, 1.0, 0.0, 1.0];

/// Fragment shader sampling `target`
pub fn fragment_shader_source(target: TextureTarget) -> String {
    let mut source = String::new();
    if let Some(extension) = target.extension_directive() {
        source.push_str(extension);
        source.push('\n');
    }
    source.push_str("precision mediump float;\n");
    source.push_str("varying vec2 vTextureCoord;\n");
    source.push_str(&format!("uniform {} sTexture;\n", target.sampler_type()));
    source.push_str("void main() {\n    gl_FragColor = texture2D(sTexture, vTextureCoord);\n}\n");
    source
}

/// Linked program with its attribute and uniform locations
#[derive(Debug)]
pub struct ShaderProgram<G: GlApi> {
    program: G::Program,
    vertex_shader: G::Shader,
    fragment_shader: G::Shader,
    quad_buffer: G::Buffer,
    position_location: u32,
    tex_coord_location: u32,
    mvp_location: G::UniformLocation,
    st_location: G::UniformLocation,
    target: TextureTarget,
    released: bool,
}

impl<G: GlApi> ShaderProgram<G> {
    /// Compile, link and locate inputs for a program sampling `target`
    ///
    /// # Returns
    /// * `Ok(ShaderProgram)` - Program ready to draw
    /// * `Err(TranscodeError::ShaderCompile)` - A stage failed to compile
    /// * `Err(TranscodeError::ProgramLink)` - Linking failed
    /// * `Err(TranscodeError::Gpu)` - A GL call failed or an input is missing
    pub fn compile(gl: &G, target: TextureTarget) -> TranscodeResult<Self> {
        let vertex_shader = compile_stage(gl, ShaderStage::Vertex, VERTEX_SHADER)?;
        let fragment_shader =
            match compile_stage(gl, ShaderStage::Fragment, &fragment_shader_source(target)) {
                Ok(shader) => shader,
                Err(e) => {
                    gl.delete_shader(vertex_shader);
                    return Err(e);
                }
            };

        let program = match link(gl, vertex_shader, fragment_shader) {
            Ok(program) => program,
            Err(e) => {
                gl.delete_shader(vertex_shader);
                gl.delete_shader(fragment_shader);
                return Err(e);
            }
        };

        let release_all = |gl: &G| {
            gl.delete_program(program);
            gl.delete_shader(vertex_shader);
            gl.delete_shader(fragment_shader);
        };

        let located = (|| {
            let position_location = attrib(gl, program, "aPosition")?;
            let tex_coord_location = attrib(gl, program, "aTextureCoord")?;
            let mvp_location = uniform(gl, program, "uMVPMatrix")?;
            let st_location = uniform(gl, program, "uSTMatrix")?;
            Ok::<_, TranscodeError>((
                position_location,
                tex_coord_location,
                mvp_location,
                st_location,
            ))
        })();
        let (position_location, tex_coord_location, mvp_location, st_location) = match located {
            Ok(locations) => locations,
            Err(e) => {
                release_all(gl);
                return Err(e);
            }
        };

        let quad_buffer = match upload_quad(gl) {
            Ok(buffer) => buffer,
            Err(e) => {
                release_all(gl);
                return Err(e);
            }
        };

        info!(?target, "Shader program linked");
        Ok(Self {
            program,
            vertex_shader,
            fragment_shader,
            quad_buffer,
            position_location,
            tex_coord_location,
            mvp_location,
            st_location,
            target,
            released: false,
        })
    }

    /// Texture target this program samples
    pub fn target(&self) -> TextureTarget {
        self.target
    }

    /// Draw `texture` as a full-screen quad
    ///
    /// # Arguments
    /// * `texture` - Frame texture, bound to this program's target
    /// * `mvp` - Vertex transform
    /// * `source_transform` - Texture-coordinate transform from the frame source
    pub fn draw(
        &self,
        gl: &G,
        texture: G::Texture,
        mvp: &Mat4,
        source_transform: &Mat4,
    ) -> TranscodeResult<()> {
        if self.released {
            return Err(TranscodeError::UseAfterRelease("ShaderProgram"));
        }
        check_gl_error(gl, "draw start")?;

        let [r, g, b, a] = CLEAR_COLOR;
        gl.clear_color(r, g, b, a);
        check_gl_error(gl, "glClearColor")?;
        gl.clear();
        check_gl_error(gl, "glClear")?;

        gl.use_program(Some(self.program));
        check_gl_error(gl, "glUseProgram")?;

        let target = self.target.gl_enum();
        gl.active_texture(consts::TEXTURE0);
        check_gl_error(gl, "glActiveTexture")?;
        gl.bind_texture(target, Some(texture));
        check_gl_error(gl, "glBindTexture")?;

        gl.bind_array_buffer(Some(self.quad_buffer));
        check_gl_error(gl, "glBindBuffer")?;
        gl.vertex_attrib_pointer(
            self.position_location,
            3,
            VERTEX_STRIDE_BYTES,
            POSITION_OFFSET_BYTES,
        );
        check_gl_error(gl, "glVertexAttribPointer aPosition")?;
        gl.enable_vertex_attrib_array(self.position_location);
        check_gl_error(gl, "glEnableVertexAttribArray aPosition")?;

        gl.vertex_attrib_pointer(
            self.tex_coord_location,
            2,
            VERTEX_STRIDE_BYTES,
            UV_OFFSET_BYTES,
        );
        check_gl_error(gl, "glVertexAttribPointer aTextureCoord")?;
        gl.enable_vertex_attrib_array(self.tex_coord_location);
        check_gl_error(gl, "glEnableVertexAttribArray aTextureCoord")?;

        gl.uniform_matrix4(&self.mvp_location, mvp);
        check_gl_error(gl, "glUniformMatrix4fv uMVPMatrix")?;
        gl.uniform_matrix4(&self.st_location, source_transform);
        check_gl_error(gl, "glUniformMatrix4fv uSTMatrix")?;

        gl.draw_triangle_strip(0, 4);
        check_gl_error(gl, "glDrawArrays")?;

        gl.bind_array_buffer(None);
        check_gl_error(gl, "glBindBuffer unbind")?;
        gl.bind_texture(target, None);
        check_gl_error(gl, "glBindTexture unbind")?;
        gl.use_program(None);
        check_gl_error(gl, "glUseProgram unbind")
    }

    /// Delete program, shaders and vertex buffer; later calls are no-ops
    pub fn release(&mut self, gl: &G) {
        if self.released {
            return;
        }
        self.released = true;
        gl.delete_buffer(self.quad_buffer);
        gl.delete_program(self.program);
        gl.delete_shader(self.vertex_shader);
        gl.delete_shader(self.fragment_shader);
        debug!("Shader program released");
    }
}

fn compile_stage<G: GlApi>(gl: &G, stage: ShaderStage, source: &str) -> TranscodeResult<G::Shader> {
    let shader = gl.create_shader(stage).map_err(|log| TranscodeError::ShaderCompile {
        stage,
        log: format!("glCreateShader failed: {}", log),
    })?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.shader_compile_status(shader) {
        let log = gl.shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(TranscodeError::ShaderCompile { stage, log });
    }
    Ok(shader)
}

fn link<G: GlApi>(
    gl: &G,
    vertex_shader: G::Shader,
    fragment_shader: G::Shader,
) -> TranscodeResult<G::Program> {
    let program = gl
        .create_program()
        .map_err(|log| TranscodeError::ProgramLink {
            log: format!("glCreateProgram failed: {}", log),
        })?;
    gl.attach_shader(program, vertex_shader);
    gl.attach_shader(program, fragment_shader);
    gl.link_program(program);
    if !gl.program_link_status(program) {
        let log = gl.program_info_log(program);
        gl.delete_program(program);
        return Err(TranscodeError::ProgramLink { log });
    }
    Ok(program)
}

fn attrib<G: GlApi>(gl: &G, program: G::Program, name: &str) -> TranscodeResult<u32> {
    gl.attrib_location(program, name)
        .ok_or_else(|| TranscodeError::Gpu {
            operation: format!("locate {}", name),
            code: 0,
        })
}

fn uniform<G: GlApi>(
    gl: &G,
    program: G::Program,
    name: &str,
) -> TranscodeResult<G::UniformLocation> {
    gl.uniform_location(program, name)
        .ok_or_else(|| TranscodeError::Gpu {
            operation: format!("locate {}", name),
            code: 0,
        })
}

fn upload_quad<G: GlApi>(gl: &G) -> TranscodeResult<G::Buffer> {
    let buffer = gl.create_buffer().map_err(|log| TranscodeError::Gpu {
        operation: format!("glGenBuffers: {}", log),
        code: 0,
    })?;
    gl.bind_array_buffer(Some(buffer));
    gl.array_buffer_data(bytemuck::cast_slice(&FULL_SCREEN_QUAD));
    gl.bind_array_buffer(None);
    if let Err(e) = check_gl_error(gl, "glBufferData") {
        gl.delete_buffer(buffer);
        return Err(e);
    }
    Ok(buffer)
}
