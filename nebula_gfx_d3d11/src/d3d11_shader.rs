/// D3d11Shader - compilation, cbuffer reflection translation, and cache
///
/// A stage's cbuffers concatenate into one logical constant space: the
/// n-th cbuffer becomes a sub-buffer at the running byte offset, and
/// every variable's offset shifts by its cbuffer's start. The sub-buffer
/// table is shared with the stage's const buffers, which upload any
/// dirty sub-buffer in full.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use nebula_gfx::device::DeviceConfig;
use nebula_gfx::error::Result;
use nebula_gfx::shader::cache::{
    check_header, read_bytes, read_samplers, read_u32, source_digest, write_bytes, write_header,
    write_samplers, write_u32,
};
use nebula_gfx::shader::layout::{
    ConstBank, ConstBufferLayout, ConstParamDesc, ConstSubBufferDesc, LayoutSet,
};
use nebula_gfx::shader::{
    load_expanded, render_macro_block, shader_model_macro, ConstType, GfxShader,
    GfxShaderConstBuffer, SamplerDesc, ShaderCore, ShaderDesc, ShaderMacro, ShaderState,
    ShaderStage, SourceProvider,
};
use nebula_gfx::{gfx_debug, gfx_error, gfx_warn};

use crate::d3d11::{
    stage_profile, D3d11Api, D3d11CbufferDesc, D3d11CompiledStage, D3d11SamplerBindDesc,
};
use crate::d3d11_const_buffer::D3d11ConstBuffer;

const LOG_SOURCE: &str = "nebula::d3d11::Shader";

/// Cache blob magic for this backend
const CACHE_MAGIC: [u8; 4] = *b"NC11";

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

/// Concatenate one stage's cbuffers into a logical layout plus its
/// sub-buffer table
fn translate_stage(cbuffers: &[D3d11CbufferDesc]) -> (ConstBufferLayout, Vec<ConstSubBufferDesc>) {
    let mut layout = ConstBufferLayout::new();
    let mut subs = Vec::new();
    let mut start = 0u32;
    for cbuffer in cbuffers {
        subs.push(ConstSubBufferDesc {
            start,
            size: cbuffer.size,
        });
        for var in &cbuffer.variables {
            let align = if var.const_type.is_matrix() || var.array_size > 1 {
                16
            } else {
                4
            };
            layout.add_parameter(ConstParamDesc {
                name: prefixed(&var.name),
                const_type: var.const_type,
                offset: start + var.offset,
                size: var.size,
                array_size: var.array_size.max(1),
                align_value: align,
            });
        }
        start += cbuffer.size;
    }
    (layout, subs)
}

fn translate_samplers(binds: &[D3d11SamplerBindDesc], out: &mut Vec<SamplerDesc>) {
    for bind in binds {
        let name = prefixed(&bind.name);
        if out.iter().any(|s| s.name == name) {
            continue;
        }
        out.push(SamplerDesc {
            name,
            const_type: if bind.is_cube {
                ConstType::SamplerCube
            } else {
                ConstType::Sampler
            },
            register: bind.slot,
        });
    }
}

// ============================================================================
// Shader
// ============================================================================

/// Per-bank sub-buffer tables, indexed like the layout set
///
/// Shared with every const buffer of the shader; replaced wholesale on
/// a successful reload.
#[derive(Debug, Default)]
pub(crate) struct SubBufferTable {
    pub banks: Vec<Vec<ConstSubBufferDesc>>,
}

#[derive(Default)]
struct Programs {
    vertex: Vec<u8>,
    pixel: Vec<u8>,
}

struct Built {
    programs: Programs,
    layouts: LayoutSet,
    samplers: Vec<SamplerDesc>,
    subs: Vec<Vec<ConstSubBufferDesc>>,
}

/// D3D11 shader implementation
pub struct D3d11Shader {
    core: ShaderCore,
    api: Arc<dyn D3d11Api>,
    provider: Arc<dyn SourceProvider>,
    macros: Vec<ShaderMacro>,
    cache_dir: Option<PathBuf>,
    verbose: bool,
    programs: Mutex<Programs>,
    subs: Arc<Mutex<SubBufferTable>>,
}

impl D3d11Shader {
    /// Compile a shader; a first-time failure is returned as an error
    pub fn new(
        desc: ShaderDesc,
        api: Arc<dyn D3d11Api>,
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
            subs: Arc::new(Mutex::new(SubBufferTable::default())),
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

    /// Sub-buffer table for a bank index, for diagnostics
    pub fn sub_buffers(&self, bank_index: usize) -> Vec<ConstSubBufferDesc> {
        self.subs
            .lock()
            .map(|table| table.banks.get(bank_index).cloned().unwrap_or_default())
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

        let (vertex_layout, vertex_subs) = translate_stage(&vertex.cbuffers);
        let (pixel_layout, pixel_subs) = translate_stage(&pixel.cbuffers);

        let mut layouts = LayoutSet::new();
        layouts.push(ConstBank::Vertex, vertex_layout);
        layouts.push(ConstBank::Pixel, pixel_layout);

        let mut samplers = Vec::new();
        translate_samplers(&vertex.samplers, &mut samplers);
        translate_samplers(&pixel.samplers, &mut samplers);

        let built = Built {
            programs: Programs {
                vertex: vertex.bytecode,
                pixel: pixel.bytecode,
            },
            layouts,
            samplers,
            subs: vec![vertex_subs, pixel_subs],
        };
        self.store_cache(digest, &built);
        Ok(built)
    }

    fn compile_stage(
        &self,
        stage: ShaderStage,
        preamble: &str,
        source: &str,
    ) -> Result<D3d11CompiledStage> {
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
        if let Ok(mut subs) = self.subs.lock() {
            subs.banks = built.subs;
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
            .map(|dir| dir.join(format!("{:016x}.nc11", digest)))
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

fn write_subs(w: &mut dyn Write, subs: &[Vec<ConstSubBufferDesc>]) -> io::Result<()> {
    write_u32(w, subs.len() as u32)?;
    for bank in subs {
        write_u32(w, bank.len() as u32)?;
        for sub in bank {
            write_u32(w, sub.start)?;
            write_u32(w, sub.size)?;
        }
    }
    Ok(())
}

fn read_subs(r: &mut dyn Read) -> io::Result<Vec<Vec<ConstSubBufferDesc>>> {
    let bank_count = read_u32(r)?;
    if bank_count > 16 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "implausible sub-buffer bank count",
        ));
    }
    let mut banks = Vec::with_capacity(bank_count as usize);
    for _ in 0..bank_count {
        let count = read_u32(r)?;
        let mut bank = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            bank.push(ConstSubBufferDesc {
                start: read_u32(r)?,
                size: read_u32(r)?,
            });
        }
        banks.push(bank);
    }
    Ok(banks)
}

fn read_cache(r: &mut dyn Read, digest: u64) -> io::Result<Option<Built>> {
    if !check_header(r, CACHE_MAGIC, digest)? {
        return Ok(None);
    }
    let layouts = LayoutSet::read(r)?;
    let vertex = read_bytes(r)?;
    let pixel = read_bytes(r)?;
    let samplers = read_samplers(r)?;
    let subs = read_subs(r)?;
    Ok(Some(Built {
        programs: Programs { vertex, pixel },
        layouts,
        samplers,
        subs,
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
    write_subs(&mut w, &built.subs)?;
    Ok(())
}

impl GfxShader for D3d11Shader {
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
        Ok(Arc::new(D3d11ConstBuffer::new(
            self.core.alloc_generic_buffer()?,
            Arc::clone(&self.api),
            Arc::clone(&self.subs),
        )))
    }
}

#[cfg(test)]
#[path = "d3d11_shader_tests.rs"]
mod tests;
