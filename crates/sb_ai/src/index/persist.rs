use std::fs;
use std::path::Path;

use sb_core::error::AppError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Write `value` as JSON to a sibling tmp file, then rename over `path`.
pub(crate) fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    what: &str,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::io("AI_INDEX_WRITE_FAILED", "Failed to create index directory", parent, e)
        })?;
    }
    let tmp = path.with_extension("tmp");
    let json = serde_json::to_vec(value).map_err(|e| {
        AppError::new("AI_INDEX_WRITE_FAILED", format!("Failed to encode {what}"))
            .with_details(e.to_string())
    })?;
    fs::write(&tmp, json).map_err(|e| {
        AppError::io("AI_INDEX_WRITE_FAILED", format!("Failed to write {what}"), &tmp, e)
    })?;
    fs::rename(&tmp, path).map_err(|e| {
        AppError::new("AI_INDEX_WRITE_FAILED", format!("Failed to finalize {what} write"))
            .with_details(format!(
                "tmp={}; dest={}; err={}",
                tmp.display(),
                path.display(),
                e
            ))
    })?;
    Ok(())
}

/// Read and decode a JSON artifact; an undecodable file is reported as corrupt.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, AppError> {
    let bytes = fs::read(path).map_err(|e| {
        AppError::io("AI_INDEX_READ_FAILED", format!("Failed to read {what}"), path, e)
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        AppError::io("AI_INDEX_CORRUPT", format!("Failed to decode {what}"), path, e)
    })
}
