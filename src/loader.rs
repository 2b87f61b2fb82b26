//! Definition loading from YAML files.
//!
//! YAML is parsed with `serde_yaml` and converted into the `serde_json::Value`
//! tree the rest of the engine works on. The `!run` tag is accepted as an
//! alternative spelling of a computed expression default.

use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Number, Value};

use crate::error::SchemaError;
use crate::types::{json_type_name, EXPRESSION_PREFIX};

/// YAML tag marking a scalar as a computed expression.
const EXPRESSION_TAG: &str = "run";

static SPECIAL_FILE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^__.+__$").expect("special file pattern is valid"));

/// A resource definition file found under the endpoints directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFile {
    pub path: PathBuf,
    /// File name without extension.
    pub title: String,
    /// Route including parent directories (`/blog/posts`).
    pub route: String,
}

impl ResourceFile {
    /// Describe a file directly inside the endpoints directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let title = file_title(&path);
        let route = format!("/{}", title);
        Self { path, title, route }
    }
}

/// Whether a file title is reserved (`__default__`).
pub fn is_special(title: &str) -> bool {
    SPECIAL_FILE_PATTERN.is_match(title)
}

/// Load every YAML document in a file.
///
/// # Errors
///
/// Returns `SchemaError::FileNotFound`, `SchemaError::ReadError`, or
/// `SchemaError::InvalidYaml`.
pub fn load_documents(path: &Path) -> Result<Vec<Value>, SchemaError> {
    if !path.exists() {
        return Err(SchemaError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| SchemaError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    load_documents_str(&content, path)
}

/// Parse every YAML document in `content`. `origin` is used in error messages.
///
/// # Errors
///
/// Returns `SchemaError::InvalidYaml` if any document fails to parse.
pub fn load_documents_str(content: &str, origin: &Path) -> Result<Vec<Value>, SchemaError> {
    let invalid = |message: String| SchemaError::InvalidYaml {
        path: origin.to_path_buf(),
        message,
    };

    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| invalid(e.to_string()))?;
        documents.push(yaml_to_json(value).map_err(invalid)?);
    }
    Ok(documents)
}

/// Load a single-document mapping. A missing file yields `None`.
///
/// # Errors
///
/// Returns `SchemaError` if the file exists but is unreadable, is not valid
/// YAML, or its document is not a mapping.
pub fn load_mapping(path: &Path) -> Result<Option<Map<String, Value>>, SchemaError> {
    if !path.exists() {
        return Ok(None);
    }

    let mut documents = load_documents(path)?;
    if documents.len() > 1 {
        return Err(SchemaError::TooManyDocuments {
            path: path.to_path_buf(),
            count: documents.len(),
        });
    }

    match documents.pop() {
        None | Some(Value::Null) => Ok(Some(Map::new())),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(SchemaError::NotAMapping {
            path: path.to_path_buf(),
            what: "document",
            actual: json_type_name(&other).to_string(),
        }),
    }
}

/// Find resource files under `dir`, recursing into subdirectories.
///
/// Reserved `__name__` files are skipped. Results are sorted by path.
///
/// # Errors
///
/// Returns `SchemaError::FileNotFound` if `dir` does not exist, or
/// `SchemaError::ReadError` if a directory cannot be listed.
pub fn collect_resource_files(dir: &Path) -> Result<Vec<ResourceFile>, SchemaError> {
    if !dir.is_dir() {
        return Err(SchemaError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    collect_files_recursive(dir, "", &mut files)?;
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn collect_files_recursive(
    dir: &Path,
    route_prefix: &str,
    files: &mut Vec<ResourceFile>,
) -> Result<(), SchemaError> {
    let entries = std::fs::read_dir(dir).map_err(|source| SchemaError::ReadError {
        path: dir.to_path_buf(),
        source,
    })?;
    collect_entries(dir, route_prefix, entries.map(|e| e.map(|e| e.path())), files)
}

fn collect_entries(
    dir: &Path,
    route_prefix: &str,
    entries: impl IntoIterator<Item = io::Result<PathBuf>>,
    files: &mut Vec<ResourceFile>,
) -> Result<(), SchemaError> {
    for entry in entries {
        let path = entry.map_err(|source| SchemaError::ReadError {
            path: dir.to_path_buf(),
            source,
        })?;
        if path.is_dir() {
            let dir_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let prefix = format!("{}/{}", route_prefix, dir_name);
            collect_files_recursive(&path, &prefix, files)?;
        } else if is_yaml(&path) {
            let title = file_title(&path);
            if is_special(&title) {
                continue;
            }
            let route = format!("{}/{}", route_prefix, title);
            files.push(ResourceFile { path, title, route });
        }
    }
    Ok(())
}

pub(crate) fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

fn file_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn yaml_to_json(value: serde_yaml::Value) -> Result<Value, String> {
    use serde_yaml::Value as Yaml;

    let converted = match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| format!("number {} has no JSON representation", n))?
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                map.insert(mapping_key(key)?, yaml_to_json(value)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => {
            if tagged.tag != EXPRESSION_TAG {
                return Err(format!("unsupported tag {}", tagged.tag));
            }
            match tagged.value {
                Yaml::String(code) => Value::String(format!("{}{}", EXPRESSION_PREFIX, code)),
                _ => return Err(format!("{} must tag a string", tagged.tag)),
            }
        }
    };
    Ok(converted)
}

fn mapping_key(key: serde_yaml::Value) -> Result<String, String> {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => Ok(s),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        _ => Err("mapping keys must be scalars".to_string()),
    }
}
