/// Shader source loading with `#include` expansion
///
/// Includes resolve relative to the including file's directory first,
/// then fall back to the path as written. An include that resolves
/// nowhere is fatal to compilation, as is a cycle. Backends receive one
/// flattened source string; compilers never see `#include`.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::shader::ShaderMacro;
use crate::{gfx_bail, gfx_error};

const LOG_SOURCE: &str = "nebula::ShaderSource";

/// Supplies shader source text by path
///
/// The default implementation reads the filesystem; tests and tools
/// substitute in-memory providers.
pub trait SourceProvider: Send + Sync {
    /// Load one file's text, unexpanded
    fn load(&self, path: &Path) -> Result<String>;
}

/// Reads shader source from the filesystem
#[derive(Debug, Default)]
pub struct FileSourceProvider;

impl SourceProvider for FileSourceProvider {
    fn load(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidResource(format!("cannot read '{}': {}", path.display(), e)))
    }
}

/// Load a shader source file and expand every `#include "..."` in place
pub fn load_expanded(provider: &dyn SourceProvider, path: &Path) -> Result<String> {
    let text = provider.load(path)?;
    let mut stack = vec![path.to_path_buf()];
    expand_text(provider, path, &text, &mut stack)
}

fn expand_text(
    provider: &dyn SourceProvider,
    path: &Path,
    text: &str,
    stack: &mut Vec<PathBuf>,
) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if let Some(target) = parse_include(line) {
            let (resolved, included) = load_include(provider, path, target)?;
            if stack.contains(&resolved) {
                gfx_bail!(
                    LOG_SOURCE,
                    "Include cycle through '{}' (from '{}')",
                    resolved.display(),
                    path.display()
                );
            }
            stack.push(resolved.clone());
            out.push_str(&expand_text(provider, &resolved, &included, stack)?);
            stack.pop();
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    Ok(out)
}

/// The quoted path of an `#include "..."` line, if this is one
fn parse_include(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("#include")?;
    let rest = rest.trim_start().strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(&rest[..end])
}

/// Resolve an include relative to the including file, falling back to
/// the path as written
fn load_include(
    provider: &dyn SourceProvider,
    including: &Path,
    target: &str,
) -> Result<(PathBuf, String)> {
    if let Some(parent) = including.parent() {
        let relative = parent.join(target);
        if let Ok(text) = provider.load(&relative) {
            return Ok((relative, text));
        }
    }
    let as_given = PathBuf::from(target);
    match provider.load(&as_given) {
        Ok(text) => Ok((as_given, text)),
        Err(_) => {
            gfx_error!(
                LOG_SOURCE,
                "Failed to resolve include '{}' from '{}'",
                target,
                including.display()
            );
            Err(Error::IncludeNotFound(target.to_string()))
        }
    }
}

/// Render a macro list as a `#define` preamble for the compiler
pub fn render_macro_block(macros: &[ShaderMacro]) -> String {
    let mut block = String::new();
    for m in macros {
        if m.value.is_empty() {
            block.push_str(&format!("#define {}\n", m.name));
        } else {
            block.push_str(&format!("#define {} {}\n", m.name, m.value));
        }
    }
    block
}

#[cfg(test)]
#[path = "source_tests.rs"]
mod tests;
