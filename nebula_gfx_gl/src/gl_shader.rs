/// GlShader - program linking, uniform reflection, sampler units
///
/// Active uniforms pack densely into one program-wide layout in
/// reflection order, each keeping its location for upload. Sampler
/// uniforms take sequential texture units, assigned with an integer
/// uniform write right after link. Uniform locations are runtime
/// values, so nothing here is cached to disk.

use std::sync::{Arc, Mutex};

use nebula_gfx::device::DeviceConfig;
use nebula_gfx::error::Result;
use nebula_gfx::shader::layout::{ConstBank, ConstBufferLayout, ConstParamDesc, LayoutSet};
use nebula_gfx::shader::{
    load_expanded, render_macro_block, shader_model_macro, ConstType, GfxShader,
    GfxShaderConstBuffer, SamplerDesc, ShaderCore, ShaderDesc, ShaderMacro, ShaderState,
    SourceProvider,
};
use nebula_gfx::{gfx_debug, gfx_error, gfx_warn};

use crate::gl::{GlApi, GlUniformDesc};
use crate::gl_const_buffer::GlConstBuffer;

const LOG_SOURCE: &str = "nebula::gl::Shader";

// ============================================================================
// Reflection translation
// ============================================================================

/// Uniform name without the driver's `[0]` array suffix
fn base_name(name: &str) -> &str {
    name.strip_suffix("[0]").unwrap_or(name)
}

fn prefixed(name: &str) -> Arc<str> {
    let name = base_name(name);
    if name.starts_with('$') {
        Arc::from(name)
    } else {
        Arc::from(format!("${}", name))
    }
}

/// One uniform's upload route: layout span plus its location
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GlUniformBinding {
    pub location: i32,
    pub const_type: ConstType,
    pub offset: u32,
    pub size: u32,
    pub array_size: u32,
}

struct Translated {
    layout: ConstBufferLayout,
    bindings: Vec<GlUniformBinding>,
    samplers: Vec<SamplerDesc>,
    // Sampler (location, texture unit) pairs to assign after link
    sampler_units: Vec<(i32, u32)>,
}

/// Pack the active uniforms densely into the program-wide layout
///
/// Matrices keep their dense row stride as the alignment so the shared
/// matrix write primitive lays rows out back to back; everything else
/// aligns to 4 bytes. Samplers never enter the layout; they take the
/// next texture unit in reflection order.
fn translate_uniforms(uniforms: &[GlUniformDesc]) -> Translated {
    let mut layout = ConstBufferLayout::new();
    let mut bindings = Vec::new();
    let mut samplers = Vec::new();
    let mut sampler_units = Vec::new();
    let mut cursor = 0u32;
    let mut next_unit = 0u32;

    for uniform in uniforms {
        let name = prefixed(&uniform.name);
        if uniform.const_type.is_sampler() {
            samplers.push(SamplerDesc {
                name,
                const_type: uniform.const_type,
                register: next_unit,
            });
            sampler_units.push((uniform.location, next_unit));
            next_unit += 1;
            continue;
        }

        let align = if uniform.const_type.is_matrix() {
            uniform.const_type.matrix_cols() * 4
        } else {
            4
        };
        let offset = cursor.next_multiple_of(align);
        let array_size = uniform.array_size.max(1);
        let size = uniform.const_type.size_bytes() * array_size;

        layout.add_parameter(ConstParamDesc {
            name,
            const_type: uniform.const_type,
            offset,
            size,
            array_size,
            align_value: align,
        });
        bindings.push(GlUniformBinding {
            location: uniform.location,
            const_type: uniform.const_type,
            offset,
            size,
            array_size,
        });
        cursor = offset + size;
    }

    Translated {
        layout,
        bindings,
        samplers,
        sampler_units,
    }
}

/// Insert the macro preamble after a leading `#version` line, which
/// GLSL requires to stay first
fn splice_preamble(source: &str, preamble: &str) -> String {
    if preamble.is_empty() {
        return source.to_string();
    }
    if source.trim_start().starts_with("#version") {
        if let Some(newline) = source.find('\n') {
            let (version, rest) = source.split_at(newline + 1);
            return format!("{}{}{}", version, preamble, rest);
        }
    }
    format!("{}{}", preamble, source)
}

// ============================================================================
// Shader
// ============================================================================

/// Device-side state shared between the shader and its const buffers
///
/// The shadow mirrors the device's uniform values, zeroed on every
/// link because GL initializes uniforms to zero. Replaced wholesale on
/// a successful reload.
#[derive(Debug, Default)]
pub(crate) struct ProgramState {
    pub program: u32,
    pub bindings: Vec<GlUniformBinding>,
    pub shadow: Vec<u8>,
}

struct Built {
    program: u32,
    layouts: LayoutSet,
    samplers: Vec<SamplerDesc>,
    bindings: Vec<GlUniformBinding>,
    sampler_units: Vec<(i32, u32)>,
    shadow_size: u32,
}

/// GL shader implementation
pub struct GlShader {
    core: ShaderCore,
    api: Arc<dyn GlApi>,
    provider: Arc<dyn SourceProvider>,
    macros: Vec<ShaderMacro>,
    verbose: bool,
    state: Arc<Mutex<ProgramState>>,
}

impl GlShader {
    /// Link a shader; a first-time failure is returned as an error
    pub fn new(
        desc: ShaderDesc,
        api: Arc<dyn GlApi>,
        provider: Arc<dyn SourceProvider>,
        config: &DeviceConfig,
    ) -> Result<Arc<Self>> {
        let mut macros = config.global_macros.clone();
        macros.extend(desc.macros.iter().cloned());
        macros.push(shader_model_macro(desc.shader_model));

        let shader = Arc::new(Self {
            core: ShaderCore::new(desc),
            api,
            provider,
            macros,
            verbose: config.verbose_diagnostics,
            state: Arc::new(Mutex::new(ProgramState::default())),
        });

        shader.core.set_state(ShaderState::Compiling);
        match shader.build() {
            Ok(built) => {
                shader.commit(built);
                Ok(shader)
            }
            Err(e) => {
                shader.core.set_state(ShaderState::Failed);
                gfx_error!(
                    LOG_SOURCE,
                    "Failed to build '{}': {}",
                    shader.core.desc().vertex_path.display(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Program object handle for the embedder to bind
    pub fn program(&self) -> u32 {
        self.state.lock().map(|s| s.program).unwrap_or(0)
    }

    // ===== BUILD =====

    fn build(&self) -> Result<Built> {
        let desc = self.core.desc();
        let vertex_src = load_expanded(&*self.provider, &desc.vertex_path)?;
        let pixel_src = load_expanded(&*self.provider, &desc.pixel_path)?;

        let preamble = render_macro_block(&self.macros);
        let linked = self.api.link_program(
            &splice_preamble(&vertex_src, &preamble),
            &splice_preamble(&pixel_src, &preamble),
        )?;
        if let Some(warnings) = &linked.warnings {
            gfx_warn!(
                LOG_SOURCE,
                "Link warnings for '{}': {}",
                desc.vertex_path.display(),
                warnings
            );
        }

        let translated = translate_uniforms(&linked.uniforms);
        let shadow_size = translated.layout.buffer_size();
        let mut layouts = LayoutSet::new();
        layouts.push(ConstBank::Program, translated.layout);

        Ok(Built {
            program: linked.program,
            layouts,
            samplers: translated.samplers,
            bindings: translated.bindings,
            sampler_units: translated.sampler_units,
            shadow_size,
        })
    }

    fn commit(&self, built: Built) {
        if let Ok(mut state) = self.state.lock() {
            let old = state.program;
            state.program = built.program;
            state.bindings = built.bindings;
            // GL zero-initializes uniforms on link, so a zeroed shadow
            // is the device's actual state
            state.shadow = vec![0u8; built.shadow_size as usize];
            if old != 0 && old != built.program {
                self.api.delete_program(old);
            }
        }
        for (location, unit) in &built.sampler_units {
            self.api
                .set_uniform_i(*location, ConstType::Int, 1, &[*unit as i32]);
        }
        self.core.set_state(ShaderState::Linked);
        let format = self.core.desc().instancing_format.clone();
        self.core
            .commit_reflection(built.layouts, built.samplers, format.as_ref());
        if self.verbose {
            gfx_debug!(
                LOG_SOURCE,
                "'{}' active: {} reflected constants",
                self.core.desc().vertex_path.display(),
                self.core.const_descs().len()
            );
        }
    }
}

impl Drop for GlShader {
    fn drop(&mut self) {
        if let Ok(state) = self.state.lock() {
            if state.program != 0 {
                self.api.delete_program(state.program);
            }
        }
    }
}

impl GfxShader for GlShader {
    fn core(&self) -> &ShaderCore {
        &self.core
    }

    fn reload(&self) -> Result<()> {
        match self.build() {
            Ok(built) => {
                self.commit(built);
                Ok(())
            }
            Err(e) => {
                gfx_warn!(
                    LOG_SOURCE,
                    "Reload of '{}' failed, previous program kept: {}",
                    self.core.desc().vertex_path.display(),
                    e
                );
                Err(e)
            }
        }
    }

    fn alloc_const_buffer(&self) -> Result<Arc<dyn GfxShaderConstBuffer>> {
        Ok(Arc::new(GlConstBuffer::new(
            self.core.alloc_generic_buffer()?,
            Arc::clone(&self.api),
            Arc::clone(&self.state),
        )))
    }
}

#[cfg(test)]
#[path = "gl_shader_tests.rs"]
mod tests;
