//! Default population and reactive recomputation of computed fields.
//!
//! Both operate on flattened documents (dotted keys), the same shape the
//! request validator checks.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::EvalError;
use crate::expr::Evaluator;
use crate::types::{DefaultValue, FieldDescriptor, React, ResourceSchema};

/// Flatten nested objects into dotted keys.
///
/// `{"address": {"city": "Lyon"}}` becomes `{"address.city": "Lyon"}`. Arrays
/// are left alone, and an empty object stays as a value.
pub fn flatten(data: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    flatten_into(&mut flat, None, data);
    flat
}

fn flatten_into(flat: &mut Map<String, Value>, prefix: Option<&str>, data: &Map<String, Value>) {
    for (key, value) in data {
        let name = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.clone(),
        };
        match value {
            Value::Object(nested) if !nested.is_empty() => flatten_into(flat, Some(&name), nested),
            other => {
                flat.insert(name, other.clone());
            }
        }
    }
}

/// Fill in defaults for optional, non-computed fields missing from `data`.
///
/// Expression defaults are evaluated with an empty context.
///
/// # Errors
///
/// Returns `EvalError::Field` naming the field whose default failed.
pub fn populate_defaults(
    resource: &ResourceSchema,
    data: &mut Map<String, Value>,
    evaluator: &Evaluator,
) -> Result<(), EvalError> {
    let empty = Map::new();

    for field in &resource.fields {
        if field.required || field.computed || data.contains_key(&field.name) {
            continue;
        }
        let value = match &field.default {
            None => continue,
            Some(DefaultValue::Literal(value)) => value.clone(),
            Some(DefaultValue::Expression(code)) => evaluator
                .evaluate(code, &empty)
                .map_err(|e| field_error(field, e))?,
        };
        debug!(field = %field.name, value = %value, "populated default");
        data.insert(field.name.clone(), value);
    }
    Ok(())
}

/// Whether a computed field must be recomputed for this write.
///
/// `"*"` always recomputes. Otherwise at least one reactive field must be
/// present in `new_data` with a value different from `old_data`'s.
pub fn needs_recomputation(
    field: &FieldDescriptor,
    new_data: &Map<String, Value>,
    old_data: &Map<String, Value>,
) -> bool {
    let Some(computation) = &field.computation else {
        return false;
    };
    match &computation.react {
        React::All => true,
        React::Fields(names) => names.iter().any(|name| match new_data.get(name) {
            Some(new) if old_data.get(name) != Some(new) => {
                debug!(field = %field.name, dependency = %name, "dependency changed");
                true
            }
            _ => false,
        }),
    }
}

/// Recompute every computed field whose dependencies changed, writing the
/// results into `new_data`.
///
/// Expressions see the old document, overlaid by the new data, overlaid by
/// `extra`. A field is only recomputed when all of its `when` guards hold.
/// Computed fields without a computation block are left alone.
///
/// # Errors
///
/// Returns `EvalError::Field` naming the field whose expression failed.
pub fn apply_computations(
    resource: &ResourceSchema,
    new_data: &mut Map<String, Value>,
    old_data: &Map<String, Value>,
    extra: &Map<String, Value>,
    evaluator: &Evaluator,
) -> Result<(), EvalError> {
    for field in resource.fields.iter().filter(|f| f.computed) {
        let Some(computation) = &field.computation else {
            continue;
        };
        if !needs_recomputation(field, new_data, old_data) {
            continue;
        }

        let context = merged_context(old_data, new_data, extra);
        if !guards_hold(field, &computation.when, &context, evaluator)? {
            continue;
        }

        let value = evaluator
            .evaluate(&computation.set, &context)
            .map_err(|e| field_error(field, e))?;
        debug!(field = %field.name, value = %value, "computed value");
        new_data.insert(field.name.clone(), value);
    }
    Ok(())
}

fn guards_hold(
    field: &FieldDescriptor,
    guards: &[String],
    context: &Map<String, Value>,
    evaluator: &Evaluator,
) -> Result<bool, EvalError> {
    for guard in guards {
        if !evaluator.check(guard, context).map_err(|e| field_error(field, e))? {
            debug!(field = %field.name, guard = %guard, "guard not met");
            return Ok(false);
        }
    }
    Ok(true)
}

fn merged_context(
    old_data: &Map<String, Value>,
    new_data: &Map<String, Value>,
    extra: &Map<String, Value>,
) -> Map<String, Value> {
    let mut context = old_data.clone();
    for (key, value) in new_data.iter().chain(extra) {
        context.insert(key.clone(), value.clone());
    }
    context
}

fn field_error(field: &FieldDescriptor, error: EvalError) -> EvalError {
    EvalError::Field {
        field: field.name.clone(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Computation, HttpMethod, NativeType};
    use serde_json::json;
    use time::macros::datetime;
    use time::OffsetDateTime;

    fn clock() -> OffsetDateTime {
        datetime!(2024-01-02 03:04:05 UTC)
    }

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn resource(fields: Vec<FieldDescriptor>) -> ResourceSchema {
        ResourceSchema {
            route: "/posts".into(),
            identifier: "posts".into(),
            canonical_name: "posts".into(),
            fields,
            allowed_methods: HttpMethod::DEFAULT_ALLOWED.to_vec(),
            inherits: None,
        }
    }

    fn slug_field(react: React, when: Vec<String>) -> FieldDescriptor {
        FieldDescriptor::native("slug", NativeType::Slug)
            .computed(true)
            .computation(Computation {
                set: "slugify(title)".into(),
                react,
                when,
            })
    }

    #[test]
    fn flatten_nested_objects() {
        let data = map(json!({
            "title": "x",
            "address": { "street": "Main", "geo": { "lat": 1.5 } },
            "tags": [{ "a": 1 }],
            "meta": {}
        }));
        let flat = flatten(&data);
        assert_eq!(flat["address.street"], json!("Main"));
        assert_eq!(flat["address.geo.lat"], json!(1.5));
        assert_eq!(flat["tags"], json!([{ "a": 1 }]));
        assert_eq!(flat["meta"], json!({}));
        assert!(!flat.contains_key("address"));
    }

    #[test]
    fn defaults_fill_missing_optional_fields() {
        let resource = resource(vec![
            FieldDescriptor::native("status", NativeType::String)
                .default_value(DefaultValue::Literal(json!("draft"))),
            FieldDescriptor::native("created_at", NativeType::Datetime)
                .default_value(DefaultValue::Expression("now()".into())),
            FieldDescriptor::native("title", NativeType::String)
                .required(true)
                .default_value(DefaultValue::Literal(json!("untitled"))),
            FieldDescriptor::native("views", NativeType::Integer)
                .default_value(DefaultValue::Literal(json!(0))),
        ]);
        let mut data = map(json!({ "views": 12 }));

        populate_defaults(&resource, &mut data, &Evaluator::with_clock(clock)).unwrap();

        assert_eq!(data["status"], json!("draft"));
        assert_eq!(data["created_at"], json!("2024-01-02T03:04:05Z"));
        assert_eq!(data["views"], json!(12));
        assert!(!data.contains_key("title"));
    }

    #[test]
    fn failing_default_names_the_field() {
        let resource = resource(vec![FieldDescriptor::native("n", NativeType::Integer)
            .default_value(DefaultValue::Expression("1 / 0".into()))]);
        let err = populate_defaults(&resource, &mut Map::new(), &Evaluator::new()).unwrap_err();
        assert!(matches!(err, EvalError::Field { field, .. } if field == "n"));
    }

    #[test]
    fn react_all_always_recomputes() {
        let field = slug_field(React::All, vec![]);
        assert!(needs_recomputation(&field, &Map::new(), &Map::new()));
    }

    #[test]
    fn react_on_changed_dependency() {
        let field = slug_field(React::Fields(vec!["title".into()]), vec![]);
        let old = map(json!({ "title": "Old" }));

        assert!(needs_recomputation(&field, &map(json!({ "title": "New" })), &old));
        assert!(!needs_recomputation(&field, &map(json!({ "title": "Old" })), &old));
        assert!(!needs_recomputation(&field, &map(json!({ "body": "x" })), &old));
    }

    #[test]
    fn field_without_computation_never_recomputes() {
        let field = FieldDescriptor::native("updated_at", NativeType::Datetime).computed(true);
        assert!(!needs_recomputation(&field, &Map::new(), &Map::new()));
    }

    #[test]
    fn computations_overwrite_new_data() {
        let resource = resource(vec![slug_field(React::Fields(vec!["title".into()]), vec![])]);
        let mut new = map(json!({ "title": "Hello World", "slug": "client-sent" }));

        apply_computations(&resource, &mut new, &Map::new(), &Map::new(), &Evaluator::new())
            .unwrap();
        assert_eq!(new["slug"], json!("hello-world"));
    }

    #[test]
    fn context_merges_old_new_and_extra() {
        let resource = resource(vec![FieldDescriptor::native("label", NativeType::String)
            .computed(true)
            .computation(Computation {
                set: "user + ': ' + title + ' (' + status + ')'".into(),
                react: React::All,
                when: vec![],
            })]);
        let old = map(json!({ "title": "Old", "status": "draft" }));
        let mut new = map(json!({ "title": "New" }));
        let extra = map(json!({ "user": "ada", "status": "published" }));

        apply_computations(&resource, &mut new, &old, &extra, &Evaluator::new()).unwrap();
        assert_eq!(new["label"], json!("ada: New (published)"));
    }

    #[test]
    fn guards_must_all_hold() {
        let guarded = slug_field(React::All, vec!["status == 'draft'".into(), "len(title) > 0".into()]);
        let resource = resource(vec![guarded]);

        let mut published = map(json!({ "title": "Hi", "status": "published" }));
        apply_computations(&resource, &mut published, &Map::new(), &Map::new(), &Evaluator::new())
            .unwrap();
        assert!(!published.contains_key("slug"));

        let mut draft = map(json!({ "title": "Hi", "status": "draft" }));
        apply_computations(&resource, &mut draft, &Map::new(), &Map::new(), &Evaluator::new())
            .unwrap();
        assert_eq!(draft["slug"], json!("hi"));
    }

    #[test]
    fn skipped_guard_does_not_stop_later_fields() {
        let resource = resource(vec![
            slug_field(React::All, vec!["false".into()]),
            FieldDescriptor::native("upper_title", NativeType::String)
                .computed(true)
                .computation(Computation {
                    set: "upper(title)".into(),
                    react: React::All,
                    when: vec![],
                }),
        ]);
        let mut new = map(json!({ "title": "hi" }));
        apply_computations(&resource, &mut new, &Map::new(), &Map::new(), &Evaluator::new())
            .unwrap();
        assert!(!new.contains_key("slug"));
        assert_eq!(new["upper_title"], json!("HI"));
    }
}
