// src/config/loader.rs

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::config::model::{JobFile, LegacyPlan, RawJobFile};
use crate::errors::Result;

/// Load a plan file from a given path and return the raw `RawJobFile`.
///
/// Files ending in `.json` are read as JSON, everything else as TOML. A JSON
/// document with a top-level `jobs` array is read in the older
/// [`LegacyPlan`] layout. This only performs deserialization; it does **not**
/// perform semantic validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawJobFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let raw = if is_json {
        let value: Value = serde_json::from_str(&contents)?;
        if value.get("jobs").is_some() {
            serde_json::from_value::<LegacyPlan>(value)?.into()
        } else {
            serde_json::from_value(value)?
        }
    } else {
        toml::from_str(&contents)?
    };

    Ok(raw)
}

/// Load a plan file from path and validate it into a runnable job.
///
/// - Reads TOML or JSON.
/// - Applies `[default]` values to tasks (handled by `TryFrom`).
/// - Checks run settings, duplicate ids, unknown dependencies and cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<JobFile> {
    let raw = load_from_path(&path)?;
    let file = JobFile::try_from(raw)?;
    Ok(file)
}
