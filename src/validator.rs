//! Request payload validation against resolved resources.
//!
//! Rules run in a fixed order and the first rule that finds a problem wins:
//!
//! 1. Bodyless methods (GET, DELETE, HEAD, OPTIONS) are not checked
//! 2. The body must be a JSON object (`malformed body`)
//! 3. POST and PUT must carry every required field (`missing required fields`)
//! 4. Every key must name a field (`unknown fields`)
//! 5. Values must match the field type (`wrong type`)
//! 6. Numbers must be within bounds (`out of bounds`)
//! 7. Strings and arrays must be within length limits (`wrong length`)
//! 8. Values must pass the whitelist and blacklist (`value not allowed`)
//!
//! Nested objects are flattened first, so `{"address": {"city": "x"}}` is
//! checked as field `address.city`.

use std::cmp::Ordering;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Number, Value};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use tracing::debug;

use crate::compute::flatten;
use crate::types::{FieldDescriptor, FieldType, HttpMethod, NativeType, ResourceSchema};

/// Canonical slug form: lowercase ASCII words joined by single hyphens.
pub const SLUG_PATTERN: &str = r"^[a-z0-9]+(?:-[a-z0-9]+)*$";

static SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(SLUG_PATTERN).expect("slug pattern is valid"));

/// Which rule rejected a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    MalformedBody,
    MissingRequiredFields,
    UnknownFields,
    WrongType,
    OutOfBounds,
    WrongLength,
    ValueNotAllowed,
}

impl FailureKind {
    /// Client-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            FailureKind::MalformedBody => "malformed body",
            FailureKind::MissingRequiredFields => "missing required fields",
            FailureKind::UnknownFields => "unknown fields",
            FailureKind::WrongType => "wrong type",
            FailureKind::OutOfBounds => "out of bounds",
            FailureKind::WrongLength => "wrong length",
            FailureKind::ValueNotAllowed => "value not allowed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A rejected payload: a message plus machine-readable details.
///
/// Serializes as `{"message": "...", "details": {...}}`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}: {}", .kind, .details)]
pub struct ValidationFailure {
    pub kind: FailureKind,
    pub details: Value,
}

impl ValidationFailure {
    pub fn new(kind: FailureKind, details: Value) -> Self {
        Self { kind, details }
    }

    pub fn message(&self) -> &'static str {
        self.kind.message()
    }

    /// Returns the exit code for an invalid payload.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl Serialize for ValidationFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ValidationFailure", 2)?;
        state.serialize_field("message", self.message())?;
        state.serialize_field("details", &self.details)?;
        state.end()
    }
}

pub type ValidationOutcome = Result<(), ValidationFailure>;

/// Validate a raw request body.
pub fn validate(resource: &ResourceSchema, method: HttpMethod, body: &[u8]) -> ValidationOutcome {
    if !method.has_body() {
        debug!(%method, route = %resource.route, "bodyless method, skipping validation");
        return Ok(());
    }

    let payload: Value = serde_json::from_slice(body).map_err(|e| {
        ValidationFailure::new(FailureKind::MalformedBody, json!({ "reason": e.to_string() }))
    })?;
    validate_value(resource, method, &payload)
}

/// Validate an already parsed payload.
pub fn validate_value(
    resource: &ResourceSchema,
    method: HttpMethod,
    payload: &Value,
) -> ValidationOutcome {
    if !method.has_body() {
        return Ok(());
    }
    let Value::Object(object) = payload else {
        return Err(ValidationFailure::new(
            FailureKind::MalformedBody,
            json!({ "reason": format!("expected an object, got {}", crate::types::json_type_name(payload)) }),
        ));
    };
    let data = flatten(object);

    if method.creates() {
        let missing: Vec<&str> = resource
            .fields
            .iter()
            .filter(|f| f.required && !data.contains_key(&f.name))
            .map(|f| f.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationFailure::new(
                FailureKind::MissingRequiredFields,
                json!({ "missing": missing }),
            ));
        }
    }

    let unknown: Vec<&str> = data
        .keys()
        .filter(|key| resource.field(key).is_none())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(ValidationFailure::new(
            FailureKind::UnknownFields,
            json!({ "unknown": unknown }),
        ));
    }

    // Known fields with a non-null value, in payload order.
    let mut present = Vec::with_capacity(data.len());
    let mut wrong_types = Map::new();
    for (key, value) in &data {
        let Some(field) = resource.field(key) else {
            continue;
        };
        if value.is_null() {
            if field.required {
                wrong_types.insert(field.name.clone(), Value::String(field.type_label()));
            }
            continue;
        }
        if conforms_to_type(field, value) {
            present.push((field, value));
        } else {
            wrong_types.insert(field.name.clone(), Value::String(field.type_label()));
        }
    }
    if !wrong_types.is_empty() {
        return Err(ValidationFailure::new(
            FailureKind::WrongType,
            Value::Object(wrong_types),
        ));
    }

    check_each(&present, FailureKind::OutOfBounds, check_bounds)?;
    check_each(&present, FailureKind::WrongLength, check_length)?;
    check_each(&present, FailureKind::ValueNotAllowed, check_allowed)?;
    Ok(())
}

fn check_each(
    present: &[(&FieldDescriptor, &Value)],
    kind: FailureKind,
    check: fn(&FieldDescriptor, &Value) -> Option<Value>,
) -> ValidationOutcome {
    let failures: Map<String, Value> = present
        .iter()
        .filter_map(|(field, value)| check(field, value).map(|detail| (field.name.clone(), detail)))
        .collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure::new(kind, Value::Object(failures)))
    }
}

/// Elements to check: the array items of a `multiple` field, else the value.
fn elements<'v>(field: &FieldDescriptor, value: &'v Value) -> Vec<&'v Value> {
    match value {
        Value::Array(items) if field.multiple => items.iter().collect(),
        other => vec![other],
    }
}

fn conforms_to_type(field: &FieldDescriptor, value: &Value) -> bool {
    let items = match value {
        Value::Array(items) if field.multiple => items,
        _ if field.multiple => return false,
        single => return conforms_single(&field.field_type, single),
    };
    items.iter().all(|item| conforms_single(&field.field_type, item))
}

fn conforms_single(field_type: &FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::Native(native) => conforms_native(*native, value),
        FieldType::Relation(_) => value.is_string(),
        FieldType::Custom(_) => false,
    }
}

fn conforms_native(native: NativeType, value: &Value) -> bool {
    match (native, value) {
        (NativeType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
        (NativeType::Number, Value::Number(_)) => true,
        (NativeType::String, Value::String(_)) => true,
        (NativeType::Boolean, Value::Bool(_)) => true,
        (NativeType::Date, Value::String(s)) => is_date(s),
        (NativeType::Time, Value::String(s)) => is_time(s),
        (NativeType::Datetime, Value::String(s)) => is_datetime(s),
        (NativeType::Slug, Value::String(s)) => SLUG.is_match(s),
        _ => false,
    }
}

/// `YYYY-MM-DD`.
pub fn is_date(s: &str) -> bool {
    Date::parse(s, format_description!("[year]-[month]-[day]")).is_ok()
}

/// `HH:MM`, `HH:MM:SS` or `HH:MM:SS.fff`, optionally followed by `Z` or an
/// offset such as `+02:00`.
pub fn is_time(s: &str) -> bool {
    let (local, offset) = split_offset(s);
    let offset_ok = match offset {
        None | Some("Z") => true,
        Some(offset) => {
            UtcOffset::parse(offset, format_description!("[offset_hour sign:mandatory]:[offset_minute]"))
                .is_ok()
        }
    };
    offset_ok
        && (Time::parse(local, format_description!("[hour]:[minute]:[second].[subsecond]")).is_ok()
            || Time::parse(local, format_description!("[hour]:[minute]:[second]")).is_ok()
            || Time::parse(local, format_description!("[hour]:[minute]")).is_ok())
}

/// RFC 3339 (`2024-03-05T14:30:00Z`), or a local date-time without offset.
pub fn is_datetime(s: &str) -> bool {
    OffsetDateTime::parse(s, &Rfc3339).is_ok()
        || PrimitiveDateTime::parse(
            s,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        )
        .is_ok()
        || PrimitiveDateTime::parse(s, format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"))
            .is_ok()
}

fn split_offset(s: &str) -> (&str, Option<&str>) {
    if let Some(local) = s.strip_suffix('Z') {
        return (local, Some("Z"));
    }
    match s.rfind(&['+', '-'][..]) {
        Some(index) if index > 0 => (&s[..index], Some(&s[index..])),
        _ => (s, None),
    }
}

fn check_bounds(field: &FieldDescriptor, value: &Value) -> Option<Value> {
    if field.minimum.is_none() && field.maximum.is_none() {
        return None;
    }
    elements(field, value).into_iter().find_map(|item| {
        let Value::Number(actual) = item else {
            return None;
        };
        let below = field
            .minimum
            .as_ref()
            .is_some_and(|min| compare_numbers(actual, min) == Some(Ordering::Less));
        let above = field
            .maximum
            .as_ref()
            .is_some_and(|max| compare_numbers(actual, max) == Some(Ordering::Greater));
        (below || above).then(|| {
            json!({
                "actual": item,
                "minimum": field.minimum,
                "maximum": field.maximum,
            })
        })
    })
}

/// Integers compare exactly, anything fractional goes through `f64`.
fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    match (integral(a), integral(b)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn integral(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

fn check_length(field: &FieldDescriptor, value: &Value) -> Option<Value> {
    let min_length = match field.allow_empty {
        Some(false) => Some(field.min_length.unwrap_or(0).max(1)),
        _ => field.min_length,
    };
    let max_length = field.max_length;
    if min_length.is_none() && max_length.is_none() {
        return None;
    }

    let actual = match value {
        Value::String(s) => s.chars().count() as u64,
        Value::Array(items) => items.len() as u64,
        _ => return None,
    };
    let too_short = min_length.is_some_and(|min| actual < min);
    let too_long = max_length.is_some_and(|max| actual > max);
    (too_short || too_long).then(|| {
        json!({
            "actual": actual,
            "minimum": min_length,
            "maximum": max_length,
        })
    })
}

fn check_allowed(field: &FieldDescriptor, value: &Value) -> Option<Value> {
    elements(field, value).into_iter().find_map(|item| {
        if !field.whitelist.is_empty() && !field.whitelist.contains(item) {
            Some(json!({ "actual": item, "allowed": field.whitelist }))
        } else if field.blacklist.contains(item) {
            Some(json!({ "actual": item, "forbidden": field.blacklist }))
        } else {
            None
        }
    })
}
