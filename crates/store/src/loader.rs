//! Bulk-source file loading.
//!
//! The bulk source is a single YAML or JSON file mapping
//! `name -> {system, version?, description?, template?}`. The format is
//! chosen by file extension. A malformed file fails the entire load; no
//! partial parse is ever returned.

use kiln_core::{LoadError, PromptRecord};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// A record body as written in the bulk file; the name comes from the
/// mapping key.
#[derive(Debug, Deserialize)]
struct RecordSpec {
    system: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    template: Option<String>,
}

/// Load the full record set from a bulk-source file.
///
/// All-or-nothing: any read or parse failure returns `LoadError` and no
/// records.
pub fn load_records_from_file(path: &Path) -> Result<HashMap<String, PromptRecord>, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let text = std::fs::read_to_string(path).map_err(|e| LoadError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let raw: HashMap<String, RecordSpec> = match extension.as_deref() {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&text).map_err(|e| LoadError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        }
        Some("json") => serde_json::from_str(&text).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?,
        _ => {
            return Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
            });
        }
    };

    Ok(raw
        .into_iter()
        .map(|(name, spec)| {
            let record = PromptRecord {
                name: name.clone(),
                system: spec.system,
                version: spec.version,
                description: spec.description,
                template: spec.template,
            };
            (name, record)
        })
        .collect())
}
