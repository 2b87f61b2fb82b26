//! Resource assembly - one resource file into one [`ResourceSchema`].
//!
//! A resource file holds either one YAML document (fields) or two
//! (directives, then fields). Fields are resolved with [`FieldResolver`] and
//! then merged with the default endpoint's fields.

use std::collections::HashSet;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::SchemaError;
use crate::fields::FieldResolver;
use crate::loader::{load_documents, load_mapping, ResourceFile};
use crate::normalize::{canonicalize, DIRECTIVE_SYNONYMS};
use crate::registry::TypeRegistry;
use crate::types::{json_type_name, FieldDescriptor, HttpMethod, ResourceSchema};

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true", "type",
    "unsafe", "use", "where", "while", "abstract", "become", "box", "do", "final", "macro",
    "override", "priv", "try", "typeof", "unsized", "virtual", "yield",
];

/// Directives of a resource file, after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directives {
    pub allowed_methods: Vec<HttpMethod>,
    pub inherits: Option<String>,
}

impl Default for Directives {
    fn default() -> Self {
        Self {
            allowed_methods: HttpMethod::DEFAULT_ALLOWED.to_vec(),
            inherits: None,
        }
    }
}

impl Directives {
    /// Parse a directives mapping, normalizing keys first.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::UnknownDirective` for keys outside the directive
    /// table, and `SchemaError::InvalidDirective`/`UnknownMethod` for bad values.
    pub fn from_map(raw: &Map<String, Value>) -> Result<Self, SchemaError> {
        let mut directives = Self::default();

        for (key, value) in canonicalize(raw, &DIRECTIVE_SYNONYMS) {
            match key.as_str() {
                "allowed_methods" => directives.allowed_methods = parse_methods(&value)?,
                "inherits" => {
                    directives.inherits = match value {
                        Value::Null => None,
                        Value::String(s) => Some(s),
                        other => {
                            return Err(SchemaError::InvalidDirective {
                                directive: key,
                                message: format!("expected a resource name, got {}", json_type_name(&other)),
                            })
                        }
                    }
                }
                _ => return Err(SchemaError::UnknownDirective { directive: key }),
            }
        }

        Ok(directives)
    }
}

fn parse_methods(value: &Value) -> Result<Vec<HttpMethod>, SchemaError> {
    let names: Vec<&str> = match value {
        Value::String(s) => s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().ok_or_else(|| SchemaError::InvalidDirective {
                    directive: "allowed_methods".to_string(),
                    message: format!("expected method names, got {}", json_type_name(item)),
                })
            })
            .collect::<Result<_, _>>()?,
        other => {
            return Err(SchemaError::InvalidDirective {
                directive: "allowed_methods".to_string(),
                message: format!("expected a list of methods, got {}", json_type_name(other)),
            })
        }
    };

    let mut methods = Vec::with_capacity(names.len());
    for name in names {
        let method = HttpMethod::parse(name)?;
        if !methods.contains(&method) {
            methods.push(method);
        }
    }
    Ok(methods)
}

/// Split a file's documents into `(directives, fields)`.
///
/// # Errors
///
/// Returns `SchemaError::TooManyDocuments` for more than two documents and
/// `SchemaError::NotAMapping` for documents that are not mappings.
pub fn split_documents(
    path: &Path,
    mut documents: Vec<Value>,
) -> Result<(Map<String, Value>, Map<String, Value>), SchemaError> {
    let as_map = |value: Value, what: &'static str| match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(SchemaError::NotAMapping {
            path: path.to_path_buf(),
            what,
            actual: json_type_name(&other).to_string(),
        }),
    };

    match documents.len() {
        0 => Ok((Map::new(), Map::new())),
        1 => Ok((Map::new(), as_map(documents.remove(0), "fields")?)),
        2 => {
            let fields = documents.remove(1);
            let directives = documents.remove(0);
            Ok((as_map(directives, "directives")?, as_map(fields, "fields")?))
        }
        count => Err(SchemaError::TooManyDocuments {
            path: path.to_path_buf(),
            count,
        }),
    }
}

/// Builds resources from their definition files.
#[derive(Debug, Clone, Copy)]
pub struct EndpointAssembler<'a> {
    registry: &'a TypeRegistry,
    defaults: Option<&'a [FieldDescriptor]>,
}

impl<'a> EndpointAssembler<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            defaults: None,
        }
    }

    /// Fields of the default endpoint, inherited by every resource.
    pub fn with_defaults(mut self, defaults: &'a [FieldDescriptor]) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Read and assemble one resource file.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the file cannot be loaded or any part of the
    /// definition is invalid.
    pub fn load(&self, file: &ResourceFile) -> Result<ResourceSchema, SchemaError> {
        let documents = load_documents(&file.path)?;
        self.assemble(file, documents)
    }

    /// Assemble a resource from already parsed documents.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` for invalid directives or fields.
    pub fn assemble(
        &self,
        file: &ResourceFile,
        documents: Vec<Value>,
    ) -> Result<ResourceSchema, SchemaError> {
        let (directives, fields) = split_documents(&file.path, documents)?;
        let directives = Directives::from_map(&directives)?;
        let fields = FieldResolver::new(self.registry).resolve(&fields)?;

        let resource = ResourceSchema {
            route: file.route.clone(),
            identifier: identifier(&file.title),
            canonical_name: canonical_name(&file.title),
            fields,
            allowed_methods: directives.allowed_methods,
            inherits: directives.inherits,
        };
        debug!(route = %resource.route, fields = resource.fields.len(), "assembled resource");

        Ok(match self.defaults {
            Some(defaults) => inherit_defaults(&resource, defaults),
            None => resource,
        })
    }
}

/// Resolve the default endpoint's fields. A missing file yields `None`.
///
/// # Errors
///
/// Returns `SchemaError` if the file exists but is invalid.
pub fn load_default_fields(
    path: &Path,
    registry: &TypeRegistry,
) -> Result<Option<Vec<FieldDescriptor>>, SchemaError> {
    let Some(fields) = load_default_mapping(path)? else {
        return Ok(None);
    };
    FieldResolver::new(registry).resolve(&fields).map(Some)
}

fn load_default_mapping(path: &Path) -> Result<Option<Map<String, Value>>, SchemaError> {
    if !path.exists() {
        return Ok(None);
    }
    // A default endpoint written with a directives document keeps only its fields.
    match load_mapping(path) {
        Err(SchemaError::TooManyDocuments { .. }) => {
            let (_, fields) = split_documents(path, load_documents(path)?)?;
            Ok(Some(fields))
        }
        other => other,
    }
}

/// Merge default-endpoint fields into a resource.
///
/// Default fields the resource does not declare come first, in the default
/// endpoint's order, followed by the resource's own fields in their order.
pub fn inherit_defaults(resource: &ResourceSchema, defaults: &[FieldDescriptor]) -> ResourceSchema {
    let own: HashSet<&str> = resource.fields.iter().map(|f| f.name.as_str()).collect();

    let mut merged: Vec<FieldDescriptor> = defaults
        .iter()
        .filter(|f| !own.contains(f.name.as_str()))
        .cloned()
        .collect();
    debug!(route = %resource.route, inherited = merged.len(), "merging default endpoint");
    merged.extend(resource.fields.iter().cloned());

    resource.with_fields(merged)
}

/// Identifier usable in code: non-alphanumerics become `_`, leading
/// non-letters are dropped, keywords get a `_` prefix.
pub fn canonical_name(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let trimmed = replaced.trim_start_matches(|c: char| !c.is_ascii_alphabetic());

    if RUST_KEYWORDS.contains(&trimmed) {
        format!("_{}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// URL-safe identifier: the canonical name with `_` replaced by `-`.
pub fn identifier(title: &str) -> String {
    canonical_name(title).trim_start_matches('_').replace('_', "-")
}
