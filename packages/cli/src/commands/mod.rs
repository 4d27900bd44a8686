pub mod apply;
pub mod compact;
pub mod init;
pub mod validate;

pub use apply::{apply, ApplyArgs};
pub use compact::{compact, CompactArgs};
pub use init::{init, InitArgs};
pub use validate::{validate, ValidateArgs};

use anyhow::{Context, Result};
use folio_model::Patch;
use serde_json::Value as Json;
use std::path::Path;

/// Read a JSON file; `null` or an empty file means "no value"
pub(crate) fn read_value(path: &Path) -> Result<Option<Json>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    let value: Json = serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok((!value.is_null()).then_some(value))
}

/// Read a patch log: a JSON array, or one patch per line
pub(crate) fn read_patches(path: &Path) -> Result<Vec<Patch>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_patches(&content).with_context(|| format!("parsing patches in {}", path.display()))
}

pub(crate) fn parse_patches(content: &str) -> Result<Vec<Patch>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| serde_json::from_str(line).with_context(|| format!("line {}", n + 1)))
        .collect()
}

/// Write to `output`, or stdout when absent
pub(crate) fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text).with_context(|| format!("writing {}", path.display())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}
