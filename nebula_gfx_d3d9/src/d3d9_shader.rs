/// D3d9Shader - compilation, CTAB reflection translation, and cache
///
/// Constants land in four banks (vertex/pixel × float4/int4) at
/// register granularity: offset = register_index × 16, size =
/// register_count × 16. A matrix the compiler truncated reflects with a
/// reduced register count, which the core's matrix write primitive
/// reads back as a reduced row count.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use nebula_gfx::device::DeviceConfig;
use nebula_gfx::error::Result;
use nebula_gfx::shader::cache::{
    check_header, read_bytes, read_samplers, source_digest, write_bytes, write_header,
    write_samplers,
};
use nebula_gfx::shader::layout::{ConstBank, ConstBufferLayout, ConstParamDesc, LayoutSet};
use nebula_gfx::shader::{
    load_expanded, render_macro_block, shader_model_macro, ConstType, GfxShader,
    GfxShaderConstBuffer, SamplerDesc, ShaderCore, ShaderDesc, ShaderMacro, ShaderState,
    ShaderStage, SourceProvider,
};
use nebula_gfx::{gfx_debug, gfx_error, gfx_warn};

use crate::d3d9::{stage_profile, D3d9Api, D3d9CompiledStage, D3d9ConstantDesc, D3d9RegisterSet};
use crate::d3d9_const_buffer::D3d9ConstBuffer;

const LOG_SOURCE: &str = "nebula::d3d9::Shader";

/// Cache blob magic for this backend
const CACHE_MAGIC: [u8; 4] = *b"NC09";

// ============================================================================
// Reflection translation
// ============================================================================

fn prefixed(name: &str) -> Arc<str> {
    if name.starts_with('$') {
        Arc::from(name)
    } else {
        Arc::from(format!("${}", name))
    }
}

/// Constant type from a CTAB shape
///
/// `cols` drives the declared type; `rows` only distinguishes matrices
/// from vectors, since truncation reduces the register count, not the
/// declared shape.
fn shape_type(desc: &D3d9ConstantDesc) -> ConstType {
    if desc.rows > 1 {
        return match desc.cols {
            2 => ConstType::Float2x2,
            3 => ConstType::Float3x3,
            _ => ConstType::Float4x4,
        };
    }
    let is_int = desc.register_set == D3d9RegisterSet::Int4;
    match (desc.cols, is_int) {
        (1, false) => ConstType::Float,
        (2, false) => ConstType::Float2,
        (3, false) => ConstType::Float3,
        (_, false) => ConstType::Float4,
        (1, true) => ConstType::Int,
        (2, true) => ConstType::Int2,
        (3, true) => ConstType::Int3,
        (_, true) => ConstType::Int4,
    }
}

/// Split one stage's constant table into its float and int register
/// banks plus its samplers
fn translate_stage(
    constants: &[D3d9ConstantDesc],
) -> (ConstBufferLayout, ConstBufferLayout, Vec<SamplerDesc>) {
    let mut floats = ConstBufferLayout::new();
    let mut ints = ConstBufferLayout::new();
    let mut samplers = Vec::new();

    for desc in constants {
        let name = prefixed(&desc.name);
        match desc.register_set {
            D3d9RegisterSet::Sampler => samplers.push(SamplerDesc {
                name,
                const_type: if desc.is_cube {
                    ConstType::SamplerCube
                } else {
                    ConstType::Sampler
                },
                register: desc.register_index,
            }),
            D3d9RegisterSet::Float4 | D3d9RegisterSet::Int4 => {
                let param = ConstParamDesc {
                    name,
                    const_type: shape_type(desc),
                    offset: desc.register_index * 16,
                    size: desc.register_count * 16,
                    array_size: desc.elements.max(1),
                    align_value: 16,
                };
                if desc.register_set == D3d9RegisterSet::Int4 {
                    ints.add_parameter(param);
                } else {
                    floats.add_parameter(param);
                }
            }
        }
    }
    (floats, ints, samplers)
}

// ============================================================================
// Shader
// ============================================================================

#[derive(Default)]
struct Programs {
    vertex: Vec<u8>,
    pixel: Vec<u8>,
}

/// Everything one successful build produces, committed atomically
struct Built {
    programs: Programs,
    layouts: LayoutSet,
    samplers: Vec<SamplerDesc>,
}

/// D3D9 shader implementation
pub struct D3d9Shader {
    core: ShaderCore,
    api: Arc<dyn D3d9Api>,
    provider: Arc<dyn SourceProvider>,
    macros: Vec<ShaderMacro>,
    cache_dir: Option<PathBuf>,
    verbose: bool,
    programs: Mutex<Programs>,
}

impl D3d9Shader {
    /// Compile a shader; a first-time failure is returned as an error
    pub fn new(
        desc: ShaderDesc,
        api: Arc<dyn D3d9Api>,
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
            cache_dir: config.cache_dir.clone(),
            verbose: config.verbose_diagnostics,
            programs: Mutex::new(Programs::default()),
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

    /// Compiled vertex bytecode for the embedder to bind
    pub fn vertex_bytecode(&self) -> Vec<u8> {
        self.programs
            .lock()
            .map(|p| p.vertex.clone())
            .unwrap_or_default()
    }

    /// Compiled pixel bytecode for the embedder to bind
    pub fn pixel_bytecode(&self) -> Vec<u8> {
        self.programs
            .lock()
            .map(|p| p.pixel.clone())
            .unwrap_or_default()
    }

    // ===== BUILD =====

    fn build(&self) -> Result<Built> {
        let desc = self.core.desc();
        let vertex_src = load_expanded(&*self.provider, &desc.vertex_path)?;
        let pixel_src = load_expanded(&*self.provider, &desc.pixel_path)?;
        let digest = source_digest(
            &[&vertex_src, &pixel_src],
            &self.macros,
            desc.shader_model,
        );

        if let Some(built) = self.try_load_cache(digest) {
            gfx_debug!(
                LOG_SOURCE,
                "Cache hit for '{}'",
                desc.vertex_path.display()
            );
            return Ok(built);
        }

        let preamble = render_macro_block(&self.macros);
        let vertex = self.compile_stage(ShaderStage::Vertex, &preamble, &vertex_src)?;
        let pixel = self.compile_stage(ShaderStage::Pixel, &preamble, &pixel_src)?;

        let (vertex_floats, vertex_ints, vertex_samplers) = translate_stage(&vertex.constants);
        let (pixel_floats, pixel_ints, pixel_samplers) = translate_stage(&pixel.constants);

        let mut layouts = LayoutSet::new();
        layouts.push(ConstBank::VertexFloat, vertex_floats);
        layouts.push(ConstBank::VertexInt, vertex_ints);
        layouts.push(ConstBank::PixelFloat, pixel_floats);
        layouts.push(ConstBank::PixelInt, pixel_ints);

        // A sampler declared by both stages keeps its first register
        let mut samplers = vertex_samplers;
        for sampler in pixel_samplers {
            if !samplers.iter().any(|s| s.name == sampler.name) {
                samplers.push(sampler);
            }
        }

        let built = Built {
            programs: Programs {
                vertex: vertex.bytecode,
                pixel: pixel.bytecode,
            },
            layouts,
            samplers,
        };
        self.store_cache(digest, &built);
        Ok(built)
    }

    fn compile_stage(
        &self,
        stage: ShaderStage,
        preamble: &str,
        source: &str,
    ) -> Result<D3d9CompiledStage> {
        let profile = stage_profile(stage, self.core.desc().shader_model);
        let compiled = self
            .api
            .compile(stage, &format!("{}{}", preamble, source), &profile)?;
        if let Some(warnings) = &compiled.warnings {
            gfx_warn!(
                LOG_SOURCE,
                "Compile warnings for '{}' ({:?}): {}",
                self.core.desc().vertex_path.display(),
                stage,
                warnings
            );
        }
        Ok(compiled)
    }

    fn commit(&self, built: Built) {
        if let Ok(mut programs) = self.programs.lock() {
            *programs = built.programs;
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

    // ===== CACHE =====

    fn cache_path(&self, digest: u64) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{:016x}.nc9", digest)))
    }

    fn try_load_cache(&self, digest: u64) -> Option<Built> {
        let path = self.cache_path(digest)?;
        let file = File::open(&path).ok()?;
        let mut reader = BufReader::new(file);
        // Any mismatch or corruption is a cache miss, never an error
        match read_cache(&mut reader, digest) {
            Ok(built) => built,
            Err(_) => None,
        }
    }

    fn store_cache(&self, digest: u64, built: &Built) {
        let Some(path) = self.cache_path(digest) else {
            return;
        };
        if let Err(e) = write_cache(&path, digest, built) {
            gfx_debug!(
                LOG_SOURCE,
                "Cache write to '{}' failed: {}",
                path.display(),
                e
            );
        }
    }
}

fn read_cache(r: &mut dyn io::Read, digest: u64) -> io::Result<Option<Built>> {
    if !check_header(r, CACHE_MAGIC, digest)? {
        return Ok(None);
    }
    let layouts = LayoutSet::read(r)?;
    let vertex = read_bytes(r)?;
    let pixel = read_bytes(r)?;
    let samplers = read_samplers(r)?;
    Ok(Some(Built {
        programs: Programs { vertex, pixel },
        layouts,
        samplers,
    }))
}

fn write_cache(path: &std::path::Path, digest: u64, built: &Built) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    write_header(&mut w, CACHE_MAGIC, digest)?;
    built.layouts.write(&mut w)?;
    write_bytes(&mut w, &built.programs.vertex)?;
    write_bytes(&mut w, &built.programs.pixel)?;
    write_samplers(&mut w, &built.samplers)?;
    Ok(())
}

impl GfxShader for D3d9Shader {
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
        Ok(Arc::new(D3d9ConstBuffer::new(
            self.core.alloc_generic_buffer()?,
            Arc::clone(&self.api),
        )))
    }
}

#[cfg(test)]
#[path = "d3d9_shader_tests.rs"]
mod tests;
