/// Compiled-shader cache blob primitives
///
/// Each backend persists a private cache file so an unchanged shader can
/// skip the compiler on the next run: a 4-byte magic tag, a format
/// version, a digest of the source text and compile inputs, then the
/// backend's payload (serialized layouts, compiled binaries, sampler
/// list). Any mismatch while reading is a cache miss, never an error
/// surfaced to the caller.

use std::hash::Hasher;
use std::io::{self, Read, Write};

use rustc_hash::FxHasher;

use crate::shader::{SamplerDesc, ShaderMacro, ConstType};

/// Cache format version, bumped whenever any serialized structure changes
pub const CACHE_VERSION: u16 = 1;

/// Upper bound on any length-prefixed field, to reject corrupt files
/// before attempting a huge allocation
const MAX_FIELD_LEN: u32 = 64 * 1024 * 1024;

// ===== DIGEST =====

/// Digest of everything that affects compilation output
///
/// Stable across runs (FxHasher is deterministic and unseeded). Not
/// cryptographic; the cache is a local trusted file.
pub fn source_digest(sources: &[&str], macros: &[ShaderMacro], shader_model: f32) -> u64 {
    let mut hasher = FxHasher::default();
    for source in sources {
        hasher.write(source.as_bytes());
        hasher.write_u8(0);
    }
    for m in macros {
        hasher.write(m.name.as_bytes());
        hasher.write_u8(b'=');
        hasher.write(m.value.as_bytes());
        hasher.write_u8(0);
    }
    hasher.write_u32((shader_model * 10.0).round() as u32);
    hasher.finish()
}

// ===== HEADER =====

/// Write the cache file header: magic, version, digest
pub fn write_header(w: &mut dyn Write, magic: [u8; 4], digest: u64) -> io::Result<()> {
    w.write_all(&magic)?;
    write_u16(w, CACHE_VERSION)?;
    write_u64(w, digest)?;
    Ok(())
}

/// Read and validate a cache file header
///
/// Returns false on any mismatch (wrong magic, version skew, stale
/// digest); the caller treats that as a cache miss.
pub fn check_header(r: &mut dyn Read, magic: [u8; 4], digest: u64) -> io::Result<bool> {
    let mut found_magic = [0u8; 4];
    r.read_exact(&mut found_magic)?;
    if found_magic != magic {
        return Ok(false);
    }
    if read_u16(r)? != CACHE_VERSION {
        return Ok(false);
    }
    if read_u64(r)? != digest {
        return Ok(false);
    }
    Ok(true)
}

// ===== SCALAR PRIMITIVES =====

pub fn write_u8(w: &mut dyn Write, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub fn read_u8(r: &mut dyn Read) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn write_u16(w: &mut dyn Write, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_u16(r: &mut dyn Read) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub fn write_u32(w: &mut dyn Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_u32(r: &mut dyn Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn write_u64(w: &mut dyn Write, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_u64(r: &mut dyn Read) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

// ===== LENGTH-PREFIXED FIELDS =====

/// Write a length-prefixed byte block (compiled bytecode, program binaries)
pub fn write_bytes(w: &mut dyn Write, bytes: &[u8]) -> io::Result<()> {
    write_u32(w, bytes.len() as u32)?;
    w.write_all(bytes)
}

/// Read a length-prefixed byte block
pub fn read_bytes(r: &mut dyn Read) -> io::Result<Vec<u8>> {
    let len = read_u32(r)?;
    if len > MAX_FIELD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("cache field length {} exceeds limit", len),
        ));
    }
    let mut bytes = vec![0u8; len as usize];
    r.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Write a length-prefixed UTF-8 string
pub fn write_str(w: &mut dyn Write, s: &str) -> io::Result<()> {
    write_bytes(w, s.as_bytes())
}

/// Read a length-prefixed UTF-8 string
pub fn read_str(r: &mut dyn Read) -> io::Result<String> {
    let bytes = read_bytes(r)?;
    String::from_utf8(bytes)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "cache string is not UTF-8"))
}

// ===== SAMPLER LIST =====

/// Serialize a sampler-description list
pub fn write_samplers(w: &mut dyn Write, samplers: &[SamplerDesc]) -> io::Result<()> {
    write_u32(w, samplers.len() as u32)?;
    for s in samplers {
        write_str(w, &s.name)?;
        write_u8(w, s.const_type.to_raw())?;
        write_u32(w, s.register)?;
    }
    Ok(())
}

/// Deserialize a sampler-description list
pub fn read_samplers(r: &mut dyn Read) -> io::Result<Vec<SamplerDesc>> {
    let count = read_u32(r)?;
    if count > MAX_FIELD_LEN / 8 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("cache sampler count {} exceeds limit", count),
        ));
    }
    let mut samplers = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = read_str(r)?;
        let raw_type = read_u8(r)?;
        let const_type = ConstType::from_raw(raw_type).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown const type tag {} in cache", raw_type),
            )
        })?;
        let register = read_u32(r)?;
        samplers.push(SamplerDesc {
            name: name.into(),
            const_type,
            register,
        });
    }
    Ok(samplers)
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
