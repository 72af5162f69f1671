/// Constant-buffer layout: named, typed constants mapped to byte offsets
///
/// One ConstBufferLayout describes one backing buffer (a register bank on
/// D3D9, one stage's logical buffer on D3D11, the whole program on GL).
/// Offsets and sizes come straight from backend reflection; this module
/// owns the change-detecting write primitives shared by every backend,
/// including the matrix sub-block extraction with per-backend row stride.

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::shader::cache::{
    read_str, read_u32, read_u8, write_str, write_u32, write_u8,
};
use crate::shader::{ConstType, ShaderStage, StageFlags};

/// Serialized layout version inside the cache payload
const LAYOUT_VERSION: u8 = 1;

// ===== BANKS =====

/// Identifies one backing buffer within a shader's layout set
///
/// This is the backend discriminant the handle carries: D3D9 splits
/// constants across four register files, D3D11 keeps one logical buffer
/// per stage, GL has a single program-wide uniform space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstBank {
    /// D3D9 vertex-stage float4 register file
    VertexFloat,
    /// D3D9 vertex-stage int4 register file
    VertexInt,
    /// D3D9 pixel-stage float4 register file
    PixelFloat,
    /// D3D9 pixel-stage int4 register file
    PixelInt,
    /// D3D11 vertex-stage logical constant buffer
    Vertex,
    /// D3D11 pixel-stage logical constant buffer
    Pixel,
    /// GL program-wide uniform space
    Program,
}

impl ConstBank {
    /// Stages that read from this bank
    pub fn stage_flags(self) -> StageFlags {
        match self {
            ConstBank::VertexFloat | ConstBank::VertexInt | ConstBank::Vertex => {
                StageFlags::VERTEX
            }
            ConstBank::PixelFloat | ConstBank::PixelInt | ConstBank::Pixel => StageFlags::PIXEL,
            ConstBank::Program => StageFlags::VERTEX | StageFlags::PIXEL,
        }
    }

    /// The stage this bank belongs to, if it is stage-specific
    pub fn stage(self) -> Option<ShaderStage> {
        match self {
            ConstBank::VertexFloat | ConstBank::VertexInt | ConstBank::Vertex => {
                Some(ShaderStage::Vertex)
            }
            ConstBank::PixelFloat | ConstBank::PixelInt | ConstBank::Pixel => {
                Some(ShaderStage::Pixel)
            }
            ConstBank::Program => None,
        }
    }

    /// True for the D3D9 int4 register files
    pub fn is_int_registers(self) -> bool {
        matches!(self, ConstBank::VertexInt | ConstBank::PixelInt)
    }

    /// Serialized tag for the shader cache blob
    pub fn to_raw(self) -> u8 {
        match self {
            ConstBank::VertexFloat => 0,
            ConstBank::VertexInt => 1,
            ConstBank::PixelFloat => 2,
            ConstBank::PixelInt => 3,
            ConstBank::Vertex => 4,
            ConstBank::Pixel => 5,
            ConstBank::Program => 6,
        }
    }

    /// Inverse of [`to_raw`](Self::to_raw); None for unknown tags
    pub fn from_raw(raw: u8) -> Option<ConstBank> {
        Some(match raw {
            0 => ConstBank::VertexFloat,
            1 => ConstBank::VertexInt,
            2 => ConstBank::PixelFloat,
            3 => ConstBank::PixelInt,
            4 => ConstBank::Vertex,
            5 => ConstBank::Pixel,
            6 => ConstBank::Program,
            _ => return None,
        })
    }
}

// ===== PARAM DESC =====

/// One named constant inside a layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstParamDesc {
    /// Constant name including the `$` prefix
    pub name: Arc<str>,

    /// Declared type
    pub const_type: ConstType,

    /// Byte offset into the backing buffer
    pub offset: u32,

    /// Element count for arrays (>= 1)
    pub array_size: u32,

    /// Total bytes occupied, including alignment padding and all array
    /// elements. For matrices this accounts for the padded row stride,
    /// not the dense pack.
    pub size: u32,

    /// Element stride for arrays, and row stride for matrices. The
    /// dense element size on GL, 16 on the register-file backends.
    pub align_value: u32,
}

impl ConstParamDesc {
    /// Byte footprint of one array element in the backing buffer,
    /// padding included. Arrays are uniformly strided on every backend
    /// (register files round elements to whole registers, GL packs them
    /// densely), so this is also the element stride.
    pub fn element_size(&self) -> u32 {
        self.size / self.array_size.max(1)
    }
}

// ===== SUB-BUFFERS =====

/// One contiguous hardware constant buffer within a logical layout
///
/// Used by backends (D3D11) that must split one logical constant space
/// across several hardware buffer objects. Sub-buffers are contiguous,
/// non-overlapping, and ordered by ascending start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstSubBufferDesc {
    /// Byte offset of this sub-buffer within the logical buffer
    pub start: u32,
    /// Byte length
    pub size: u32,
}

impl ConstSubBufferDesc {
    /// True if this sub-buffer overlaps the byte range [start, end)
    pub fn overlaps(&self, start: u32, end: u32) -> bool {
        start < self.start + self.size && end > self.start
    }
}

// ===== CHANGE-DETECTING WRITE PRIMITIVES =====

/// Compare-then-copy: writes `src` over `dst` only if the bytes differ.
/// Returns true if anything changed.
fn copy_if_changed(dst: &mut [u8], src: &[u8]) -> bool {
    debug_assert_eq!(dst.len(), src.len());
    if dst == src {
        return false;
    }
    dst.copy_from_slice(src);
    true
}

/// First and one-past-last differing byte between two equal-length
/// buffers, or None if identical. Length mismatch counts as fully
/// different.
pub(crate) fn diff_range(a: &[u8], b: &[u8]) -> Option<(u32, u32)> {
    if a.len() != b.len() {
        return Some((0, a.len().max(b.len()) as u32));
    }
    let first = a.iter().zip(b.iter()).position(|(x, y)| x != y)?;
    let last = a
        .iter()
        .zip(b.iter())
        .rposition(|(x, y)| x != y)
        .unwrap_or(first);
    Some((first as u32, last as u32 + 1))
}

// ===== LAYOUT =====

/// Byte-offset map for all constants of one backing buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstBufferLayout {
    params: Vec<ConstParamDesc>,
    buffer_size: u32,
}

impl ConstBufferLayout {
    /// Create an empty layout
    pub fn new() -> Self {
        Self {
            params: Vec::new(),
            buffer_size: 0,
        }
    }

    /// Append a parameter reflected from a compiled shader
    ///
    /// Duplicate names and misaligned offsets are engine-logic bugs in
    /// the reflection glue, caught by debug assertions only.
    pub fn add_parameter(&mut self, desc: ConstParamDesc) {
        debug_assert!(
            self.lookup(&desc.name).is_none(),
            "duplicate constant '{}' in layout",
            desc.name
        );
        debug_assert!(
            desc.align_value > 0 && desc.offset % desc.align_value == 0,
            "constant '{}' offset {} not aligned to {}",
            desc.name,
            desc.offset,
            desc.align_value
        );
        debug_assert!(desc.array_size >= 1);
        self.buffer_size = self.buffer_size.max(desc.offset + desc.size);
        self.params.push(desc);
    }

    /// Find a parameter by name
    pub fn lookup(&self, name: &str) -> Option<&ConstParamDesc> {
        self.params.iter().find(|p| &*p.name == name)
    }

    /// All parameters, in reflection order
    pub fn params(&self) -> &[ConstParamDesc] {
        &self.params
    }

    /// Total backing-buffer size in bytes, including padding
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// True if no constants were reflected into this layout
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Write a typed value at a parameter's offset, skipping the copy if
    /// the bytes are identical. Returns true if any byte changed.
    ///
    /// `const_type` describes `data`: the dense source representation.
    /// Matrix-typed parameters must go through [`set_matrix`]
    /// (Self::set_matrix) with full 4x4 source blocks; the typed buffer
    /// setters route them there before reaching this call.
    pub fn set(
        &self,
        param: &ConstParamDesc,
        const_type: ConstType,
        data: &[u8],
        backing: &mut [u8],
    ) -> bool {
        if param.const_type.is_matrix() {
            return self.set_matrix(param, data, backing);
        }

        let elem_size = const_type.size_bytes() as usize;
        debug_assert_eq!(
            param.const_type, const_type,
            "type mismatch writing '{}'",
            param.name
        );
        debug_assert!(data.len() % elem_size == 0);

        let stride = param.align_value.max(elem_size as u32) as usize;
        let count = (data.len() / elem_size).min(param.array_size as usize);
        let end = (param.offset + param.size) as usize;
        let mut changed = false;

        for e in 0..count {
            let dst_off = param.offset as usize + e * stride;
            let span = elem_size.min(end.saturating_sub(dst_off));
            if span == 0 || dst_off + span > backing.len() {
                break;
            }
            changed |= copy_if_changed(
                &mut backing[dst_off..dst_off + span],
                &data[e * elem_size..e * elem_size + span],
            );
        }
        changed
    }

    /// Write one or more matrices at a parameter's offset
    ///
    /// `src` holds already-transposed 4x4 blocks, 64 bytes per element,
    /// regardless of the declared type: compilers narrow unused 4x4
    /// uniforms down to 3x3 or 2x2, and register-file reflection reports
    /// truncated row counts, so only the declared sub-block is copied.
    /// Row `r` of each element lands at `r * align_value` within the
    /// element; bytes outside the sub-block, including row padding, are
    /// left untouched.
    ///
    /// Returns true if any byte changed.
    pub fn set_matrix(&self, param: &ConstParamDesc, src: &[u8], backing: &mut [u8]) -> bool {
        debug_assert!(param.const_type.is_matrix());
        debug_assert!(src.len() % 64 == 0);

        let elem_size = param.element_size();
        let row_stride = param.align_value;
        let cols = param.const_type.matrix_cols();
        // Truncated reflection shows up as a reduced element footprint
        let rows = param
            .const_type
            .matrix_rows()
            .min(elem_size.div_ceil(row_stride));

        let count = ((src.len() / 64) as u32).min(param.array_size);
        let mut changed = false;

        for e in 0..count {
            let elem_base = param.offset + e * elem_size;
            for r in 0..rows {
                let dst_off = (elem_base + r * row_stride) as usize;
                let span = (cols * 4).min(elem_size - r * row_stride) as usize;
                let src_off = (e * 64 + r * 16) as usize;
                if dst_off + span > backing.len() {
                    break;
                }
                changed |= copy_if_changed(
                    &mut backing[dst_off..dst_off + span],
                    &src[src_off..src_off + span],
                );
            }
        }
        changed
    }

    /// Serialize this layout into a cache payload
    pub fn write(&self, w: &mut dyn Write) -> io::Result<()> {
        write_u8(w, LAYOUT_VERSION)?;
        write_u32(w, self.buffer_size)?;
        write_u32(w, self.params.len() as u32)?;
        for p in &self.params {
            write_str(w, &p.name)?;
            write_u8(w, p.const_type.to_raw())?;
            write_u32(w, p.offset)?;
            write_u32(w, p.size)?;
            write_u32(w, p.array_size)?;
            write_u32(w, p.align_value)?;
        }
        Ok(())
    }

    /// Deserialize a layout from a cache payload
    pub fn read(r: &mut dyn Read) -> io::Result<ConstBufferLayout> {
        let version = read_u8(r)?;
        if version != LAYOUT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("layout version {} not supported", version),
            ));
        }
        let buffer_size = read_u32(r)?;
        let count = read_u32(r)?;
        let mut params = Vec::with_capacity(count.min(4096) as usize);
        for _ in 0..count {
            let name = read_str(r)?;
            let raw_type = read_u8(r)?;
            let const_type = ConstType::from_raw(raw_type).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown const type tag {} in cached layout", raw_type),
                )
            })?;
            params.push(ConstParamDesc {
                name: name.into(),
                const_type,
                offset: read_u32(r)?,
                size: read_u32(r)?,
                array_size: read_u32(r)?,
                align_value: read_u32(r)?,
            });
        }
        Ok(ConstBufferLayout {
            params,
            buffer_size,
        })
    }
}

// ===== LAYOUT SET =====

/// The ordered collection of (bank, layout) pairs one shader publishes
/// after (re)compilation
///
/// Bank order is fixed per backend and defines the bank index stored in
/// handles and mirrored by each const buffer's backing stores.
#[derive(Debug, Clone, Default)]
pub struct LayoutSet {
    entries: Vec<(ConstBank, ConstBufferLayout)>,
}

impl LayoutSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a bank's layout; banks must be unique within a set
    pub fn push(&mut self, bank: ConstBank, layout: ConstBufferLayout) {
        debug_assert!(
            self.index_of(bank).is_none(),
            "bank {:?} already present in layout set",
            bank
        );
        self.entries.push((bank, layout));
    }

    /// Number of banks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no banks are present
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate (bank, layout) pairs in bank-index order
    pub fn iter(&self) -> impl Iterator<Item = (ConstBank, &ConstBufferLayout)> {
        self.entries.iter().map(|(bank, layout)| (*bank, layout))
    }

    /// Layout for a specific bank
    pub fn get(&self, bank: ConstBank) -> Option<&ConstBufferLayout> {
        self.entries
            .iter()
            .find(|(b, _)| *b == bank)
            .map(|(_, layout)| layout)
    }

    /// Bank index used by handles and const-buffer backing stores
    pub fn index_of(&self, bank: ConstBank) -> Option<usize> {
        self.entries.iter().position(|(b, _)| *b == bank)
    }

    /// (bank, layout) at a bank index
    pub fn entry(&self, index: usize) -> Option<(ConstBank, &ConstBufferLayout)> {
        self.entries
            .get(index)
            .map(|(bank, layout)| (*bank, layout))
    }

    /// Look up a parameter across all banks; returns every bank that
    /// declares the name (a constant used by both stages appears twice)
    pub fn lookup(&self, name: &str) -> Vec<(usize, ConstBank, &ConstParamDesc)> {
        let mut found = Vec::new();
        for (index, (bank, layout)) in self.entries.iter().enumerate() {
            if let Some(param) = layout.lookup(name) {
                found.push((index, *bank, param));
            }
        }
        found
    }

    /// Serialize every bank's layout into a cache payload
    pub fn write(&self, w: &mut dyn Write) -> io::Result<()> {
        write_u32(w, self.entries.len() as u32)?;
        for (bank, layout) in &self.entries {
            write_u8(w, bank.to_raw())?;
            layout.write(w)?;
        }
        Ok(())
    }

    /// Deserialize a layout set from a cache payload
    pub fn read(r: &mut dyn Read) -> io::Result<LayoutSet> {
        let count = read_u32(r)?;
        if count > 16 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("layout set bank count {} not plausible", count),
            ));
        }
        let mut set = LayoutSet::new();
        for _ in 0..count {
            let raw_bank = read_u8(r)?;
            let bank = ConstBank::from_raw(raw_bank).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown bank tag {} in cached layout set", raw_bank),
                )
            })?;
            set.push(bank, ConstBufferLayout::read(r)?);
        }
        Ok(set)
    }
}

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;
