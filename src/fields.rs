//! Field resolution - turns a raw field mapping into resolved descriptors.
//!
//! Each declared field goes through key normalization, type inference, and
//! shorthand expansion. Once every field is built, custom types are expanded
//! in one pass over the whole list so that generated composite fields can
//! defer to fields the resource declares explicitly.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::error::SchemaError;
use crate::normalize::{canonicalize, FIELD_KEY_SYNONYMS};
use crate::registry::{TypeRegistry, TypeShape};
use crate::shorthand;
use crate::types::{
    json_type_name, Computation, DefaultValue, FieldDescriptor, FieldType, NativeType,
};

/// Field configuration after key canonicalization.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldConfig {
    #[serde(rename = "type")]
    field_type: Option<String>,
    #[serde(default)]
    whitelist: Vec<Value>,
    #[serde(default)]
    blacklist: Vec<Value>,
    max_length: Option<u64>,
    min_length: Option<u64>,
    maximum: Option<Number>,
    minimum: Option<Number>,
    defaults_to: Option<Value>,
    computation: Option<Computation>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    computed: bool,
    #[serde(default)]
    read_only: bool,
    allow_empty: Option<bool>,
}

/// Resolves a resource's raw field mapping against a type catalog.
#[derive(Debug, Clone, Copy)]
pub struct FieldResolver<'a> {
    registry: &'a TypeRegistry,
}

impl<'a> FieldResolver<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self { registry }
    }

    /// Resolve `raw_fields` into an ordered list of native/relational fields.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` for malformed configs, uninferable types,
    /// duplicate names, or unknown custom types.
    pub fn resolve(&self, raw_fields: &Map<String, Value>) -> Result<Vec<FieldDescriptor>, SchemaError> {
        let mut fields = Vec::with_capacity(raw_fields.len());
        let mut seen = HashSet::new();

        for (declared, config) in raw_fields {
            let field = build_field(declared, config)?;
            if !seen.insert(field.name.clone()) {
                return Err(SchemaError::DuplicateField { field: field.name });
            }
            fields.push(field);
        }

        expand_custom_types(fields, self.registry)
    }
}

/// Build one provisional field from its declared name and raw config.
///
/// The returned field may still carry a custom type.
///
/// # Errors
///
/// Returns `SchemaError` if the config is not a mapping, has unknown keys or
/// wrongly shaped values, has no inferable type, or the name carries both
/// shorthand markers.
pub fn build_field(declared: &str, config: &Value) -> Result<FieldDescriptor, SchemaError> {
    let raw = match config {
        Value::Object(map) => canonicalize(map, &FIELD_KEY_SYNONYMS),
        Value::Null => Map::new(),
        other => {
            return Err(SchemaError::InvalidFieldConfig {
                field: declared.to_string(),
                message: format!("expected a mapping, got {}", json_type_name(other)),
            })
        }
    };

    let config: FieldConfig =
        serde_json::from_value(Value::Object(raw)).map_err(|e| SchemaError::InvalidFieldConfig {
            field: declared.to_string(),
            message: e.to_string(),
        })?;

    let declared_type = match &config.field_type {
        Some(t) => t.clone(),
        None => {
            let inferred = infer_type(&config).ok_or_else(|| SchemaError::MissingType {
                field: declared.to_string(),
            })?;
            debug!(field = declared, inferred = %inferred, "inferred field type");
            inferred.as_str().to_string()
        }
    };
    let (field_type, multiple) = FieldType::parse(&declared_type);

    let marks = shorthand::expand(declared)?;
    let computed = marks.computed || config.computed;

    Ok(FieldDescriptor {
        name: marks.name,
        field_type,
        multiple,
        required: marks.required || config.required,
        computed,
        read_only: config.read_only || computed,
        default: config.defaults_to.map(DefaultValue::from_value),
        computation: config.computation,
        whitelist: config.whitelist,
        blacklist: config.blacklist,
        min_length: config.min_length,
        max_length: config.max_length,
        minimum: config.minimum,
        maximum: config.maximum,
        allow_empty: config.allow_empty,
    })
}

/// Infer a type for a field that does not declare one.
fn infer_type(config: &FieldConfig) -> Option<NativeType> {
    if let Some(first) = config.whitelist.first() {
        let kind = NativeType::of_literal(first);
        if kind.is_some()
            && config
                .whitelist
                .iter()
                .all(|v| NativeType::of_literal(v) == kind)
        {
            return kind;
        }
    }
    if config.min_length.is_some() || config.max_length.is_some() {
        return Some(NativeType::String);
    }
    if config.minimum.is_some() || config.maximum.is_some() {
        return Some(NativeType::Number);
    }
    match &config.defaults_to {
        Some(default) if !DefaultValue::from_value(default.clone()).is_expression() => {
            NativeType::of_literal(default)
        }
        _ => None,
    }
}

/// Replace every custom-typed field with native fields.
///
/// Aliases (`_` sub-field) are merged into the field; composites expand into
/// `{field}.{subfield}` entries unless the resource already declares that
/// dotted name. Running this on an already expanded list returns it unchanged.
///
/// # Errors
///
/// Returns `SchemaError::UnknownType` for types missing from the registry.
pub fn expand_custom_types(
    fields: Vec<FieldDescriptor>,
    registry: &TypeRegistry,
) -> Result<Vec<FieldDescriptor>, SchemaError> {
    let declared: HashSet<String> = fields.iter().map(|f| f.name.clone()).collect();
    let mut resolved = Vec::with_capacity(fields.len());

    for field in fields {
        let type_name = match &field.field_type {
            FieldType::Native(_) | FieldType::Relation(_) => {
                resolved.push(field);
                continue;
            }
            FieldType::Custom(name) => name.clone(),
        };

        let shape = registry
            .shape(&type_name)
            .ok_or_else(|| SchemaError::UnknownType {
                field: field.name.clone(),
                type_name: type_name.clone(),
            })?;

        match shape {
            TypeShape::Alias(base) => {
                debug!(field = %field.name, alias = %type_name, "merging type alias");
                resolved.push(field.overlay(base));
            }
            TypeShape::Composite(subfields) => {
                if field.multiple {
                    return Err(SchemaError::InvalidFieldConfig {
                        field: field.name.clone(),
                        message: format!("arrays of composite type '{}' are not supported", type_name),
                    });
                }
                for subfield in subfields {
                    let generated = format!("{}.{}", field.name, subfield.name);
                    if declared.contains(&generated) {
                        debug!(field = %generated, "explicit declaration overrides composite sub-field");
                        continue;
                    }
                    resolved.push(subfield.renamed(generated));
                }
            }
        }
    }

    let mut seen = HashSet::new();
    for field in &resolved {
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateField {
                field: field.name.clone(),
            });
        }
    }

    Ok(resolved)
}
