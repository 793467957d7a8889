// ============================================================
// Layer 6 — Filesystem Helpers
// ============================================================
// Small shared helpers: mkdir -p for a list of paths, pretty
// JSON writes, and human-readable file sizes for logs.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};

/// Create every directory in `paths` (and parents). Idempotent.
pub fn create_directories<P: AsRef<Path>>(paths: &[P]) -> PipelineResult<()> {
    for path in paths {
        let path = path.as_ref();
        fs::create_dir_all(path).map_err(|e| {
            PipelineError::config(format!("cannot create directory '{}': {e}", path.display()))
        })?;
        tracing::debug!("Created directory at: {}", path.display());
    }
    Ok(())
}

/// Write `data` as indented JSON, creating the parent directory.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> anyhow::Result<()> {
    use anyhow::Context;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(data)?;
    fs::write(path, json)
        .with_context(|| format!("Cannot write JSON to '{}'", path.display()))?;

    tracing::info!("JSON file saved at: {}", path.display());
    Ok(())
}

/// Approximate size in KB, for log lines.
pub fn get_size(path: &Path) -> String {
    match fs::metadata(path) {
        Ok(meta) => format!("~ {} KB", (meta.len() as f64 / 1024.0).round() as u64),
        Err(_)   => "unknown size".to_string(),
    }
}
