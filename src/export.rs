//! JSON Schema export of resolved resources.
//!
//! The export describes stored documents in flattened form: dotted field names
//! are kept as flat property names. Optional fields also accept `null`.

use jsonschema::Draft;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::error::SchemaError;
use crate::types::{DefaultValue, FieldDescriptor, FieldType, NativeType, ResourceSchema};
use crate::validator::SLUG_PATTERN;

pub const DRAFT_2020_12: &str = "https://json-schema.org/draft/2020-12/schema";

/// A single way a document departs from a resource's export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// JSON pointer to the offending value (e.g. "/address.city")
    pub path: String,
    pub message: String,
}

/// Errors from checking a document against a resource's export.
#[derive(Debug, Error)]
pub enum ConformanceError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("document does not conform: {} violation(s)", violations.len())]
    Invalid { violations: Vec<Violation> },
}

impl ConformanceError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConformanceError::Schema(e) => e.exit_code(),
            ConformanceError::Invalid { .. } => 1,
        }
    }
}

/// Build the JSON Schema for a resource and check that it compiles.
///
/// # Errors
///
/// Returns `SchemaError::InvalidExport` if the generated schema is rejected by
/// the JSON Schema compiler.
pub fn to_json_schema(resource: &ResourceSchema) -> Result<Value, SchemaError> {
    let schema = build_schema(resource);
    compile(resource, &schema)?;
    Ok(schema)
}

/// Check a stored (flattened) document against the resource's export.
///
/// # Errors
///
/// Returns `ConformanceError::Invalid` listing every violation, or
/// `ConformanceError::Schema` if the export itself does not compile.
pub fn conforms(resource: &ResourceSchema, document: &Value) -> Result<(), ConformanceError> {
    let schema = build_schema(resource);
    let validator = compile(resource, &schema)?;

    let violations: Vec<Violation> = validator
        .iter_errors(document)
        .map(|e| Violation {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConformanceError::Invalid { violations })
    }
}

fn compile(resource: &ResourceSchema, schema: &Value) -> Result<jsonschema::Validator, SchemaError> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|e| SchemaError::InvalidExport {
            resource: resource.identifier.clone(),
            message: e.to_string(),
        })
}

fn build_schema(resource: &ResourceSchema) -> Value {
    let properties: Map<String, Value> = resource
        .fields
        .iter()
        .map(|field| (field.name.clone(), field_schema(field)))
        .collect();
    let required: Vec<&str> = resource
        .fields
        .iter()
        .filter(|f| f.required)
        .map(|f| f.name.as_str())
        .collect();

    json!({
        "$schema": DRAFT_2020_12,
        "title": resource.identifier,
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn field_schema(field: &FieldDescriptor) -> Value {
    let mut item = Map::new();
    let json_type = match &field.field_type {
        FieldType::Native(native) => native_schema(*native, &mut item),
        FieldType::Relation(target) => {
            item.insert("x-relation".into(), Value::String(target.clone()));
            "string"
        }
        // Never present in a resolved resource.
        FieldType::Custom(_) => "string",
    };
    item.insert("type".into(), Value::String(json_type.into()));

    if let Some(minimum) = &field.minimum {
        item.insert("minimum".into(), Value::Number(minimum.clone()));
    }
    if let Some(maximum) = &field.maximum {
        item.insert("maximum".into(), Value::Number(maximum.clone()));
    }
    if !field.whitelist.is_empty() {
        item.insert("enum".into(), Value::Array(field.whitelist.clone()));
    }
    if !field.blacklist.is_empty() {
        item.insert("not".into(), json!({ "enum": field.blacklist }));
    }

    let min_length = match field.allow_empty {
        Some(false) => Some(field.min_length.unwrap_or(0).max(1)),
        _ => field.min_length,
    };

    let mut schema = if field.multiple {
        let mut array = Map::new();
        array.insert("type".into(), json!("array"));
        array.insert("items".into(), Value::Object(item));
        insert_lengths(&mut array, "minItems", "maxItems", min_length, field.max_length);
        array
    } else {
        insert_lengths(&mut item, "minLength", "maxLength", min_length, field.max_length);
        item
    };

    if !field.required {
        make_nullable(&mut schema);
    }
    if field.read_only {
        schema.insert("readOnly".into(), Value::Bool(true));
    }
    if let Some(DefaultValue::Literal(value)) = &field.default {
        schema.insert("default".into(), value.clone());
    }
    Value::Object(schema)
}

fn native_schema(native: NativeType, item: &mut Map<String, Value>) -> &'static str {
    match native {
        NativeType::Integer => "integer",
        NativeType::Number => "number",
        NativeType::Boolean => "boolean",
        NativeType::String => "string",
        NativeType::Date => {
            item.insert("format".into(), json!("date"));
            "string"
        }
        NativeType::Time => {
            item.insert("format".into(), json!("time"));
            "string"
        }
        NativeType::Datetime => {
            item.insert("format".into(), json!("date-time"));
            "string"
        }
        NativeType::Slug => {
            item.insert("pattern".into(), json!(SLUG_PATTERN));
            "string"
        }
    }
}

fn insert_lengths(
    schema: &mut Map<String, Value>,
    min_key: &str,
    max_key: &str,
    min: Option<u64>,
    max: Option<u64>,
) {
    if let Some(min) = min {
        schema.insert(min_key.into(), Value::from(min));
    }
    if let Some(max) = max {
        schema.insert(max_key.into(), Value::from(max));
    }
}

/// Allow `null` alongside the declared type.
fn make_nullable(schema: &mut Map<String, Value>) {
    if let Some(Value::String(json_type)) = schema.get("type").cloned() {
        schema.insert("type".into(), json!([json_type, "null"]));
    }
    if let Some(Value::Array(values)) = schema.get_mut("enum") {
        if !values.contains(&Value::Null) {
            values.push(Value::Null);
        }
    }
}
