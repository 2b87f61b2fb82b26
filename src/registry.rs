//! Custom type catalog.
//!
//! A catalog maps a type name to its sub-fields. A single sub-field named `_`
//! makes the type an alias (`email: { _: { is: string } }`); anything else is
//! a composite whose sub-fields expand into dotted fields. Sub-fields must be
//! native: custom types never nest.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::SchemaError;
use crate::fields::build_field;
use crate::loader::load_mapping;
use crate::types::{json_type_name, FieldDescriptor, FieldType};

/// Name of the anonymous sub-field that marks a type alias.
pub const ALIAS_FIELD: &str = "_";

/// How a registered type expands.
#[derive(Debug, Clone, Copy)]
pub enum TypeShape<'a> {
    Alias(&'a FieldDescriptor),
    Composite(&'a [FieldDescriptor]),
}

/// The resolved custom type catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeRegistry {
    types: HashMap<String, Vec<FieldDescriptor>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the catalog file. A missing file is an empty catalog.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the file cannot be read or parsed, or if any
    /// type definition is invalid. One bad type fails the whole catalog.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        match load_mapping(path)? {
            Some(catalog) => Self::from_value(&Value::Object(catalog)),
            None => {
                debug!(path = %path.display(), "no type catalog, using an empty one");
                Ok(Self::new())
            }
        }
    }

    /// Build a catalog from an already parsed mapping.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::NonNativeSubfield` for sub-fields whose type is
    /// not native, or other `SchemaError`s for malformed sub-field configs.
    pub fn from_value(catalog: &Value) -> Result<Self, SchemaError> {
        let Some(catalog) = catalog.as_object() else {
            return Err(SchemaError::InvalidFieldConfig {
                field: "<type catalog>".to_string(),
                message: format!("expected a mapping, got {}", json_type_name(catalog)),
            });
        };

        let mut types = HashMap::with_capacity(catalog.len());
        for (type_name, subfields) in catalog {
            let Some(subfields) = subfields.as_object() else {
                return Err(SchemaError::InvalidFieldConfig {
                    field: type_name.clone(),
                    message: format!(
                        "type definition must map sub-field names to configs, got {}",
                        json_type_name(subfields)
                    ),
                });
            };

            let mut resolved = Vec::with_capacity(subfields.len());
            for (subfield_name, config) in subfields {
                let field = build_field(subfield_name, config)?;
                if !matches!(field.field_type, FieldType::Native(_)) {
                    return Err(SchemaError::NonNativeSubfield {
                        type_name: type_name.clone(),
                        field: field.name,
                        field_type: field.field_type.to_string(),
                    });
                }
                resolved.push(field);
            }

            debug!(type_name = %type_name, subfields = resolved.len(), "registered custom type");
            types.insert(type_name.clone(), resolved);
        }

        Ok(Self { types })
    }

    /// The sub-fields of a registered type, in declaration order.
    pub fn get(&self, name: &str) -> Option<&[FieldDescriptor]> {
        self.types.get(name).map(Vec::as_slice)
    }

    pub fn shape(&self, name: &str) -> Option<TypeShape<'_>> {
        let subfields = self.get(name)?;
        match subfields {
            [only] if only.name == ALIAS_FIELD => Some(TypeShape::Alias(only)),
            _ => Some(TypeShape::Composite(subfields)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NativeType;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn alias_and_composite_shapes() {
        let registry = TypeRegistry::from_value(&json!({
            "email": { "_": { "is": "string" } },
            "period": { "start": { "is": "date" }, "end": { "is": "date" } }
        }))
        .unwrap();

        assert!(matches!(registry.shape("email"), Some(TypeShape::Alias(_))));
        match registry.shape("period") {
            Some(TypeShape::Composite(fields)) => {
                let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, vec!["start", "end"]);
            }
            other => panic!("expected composite, got {:?}", other),
        }
        assert!(registry.shape("missing").is_none());
    }

    #[test]
    fn subfields_are_normalized() {
        let registry = TypeRegistry::from_value(&json!({
            "money": { "_": { "is": "number", "min": 0 } }
        }))
        .unwrap();
        let field = &registry.get("money").unwrap()[0];
        assert_eq!(field.field_type, FieldType::Native(NativeType::Number));
        assert_eq!(field.minimum, Some(0.into()));
    }

    #[test]
    fn nested_custom_type_is_rejected() {
        let result = TypeRegistry::from_value(&json!({
            "email": { "_": { "is": "string" } },
            "person": { "contact": { "is": "email" } }
        }));
        assert!(matches!(
            result,
            Err(SchemaError::NonNativeSubfield { type_name, field, field_type })
                if type_name == "person" && field == "contact" && field_type == "email"
        ));
    }

    #[test]
    fn relational_subfield_is_rejected() {
        let result = TypeRegistry::from_value(&json!({
            "ownership": { "owner": { "is": "<users>" } }
        }));
        assert!(matches!(result, Err(SchemaError::NonNativeSubfield { .. })));
    }

    #[test]
    fn missing_file_is_empty_catalog() {
        let registry = TypeRegistry::load(Path::new("/nonexistent/types.yaml")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn load_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "color:\n  _:\n    is: string\n    max length: 7").unwrap();

        let registry = TypeRegistry::load(file.path()).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("color").unwrap()[0].max_length, Some(7));
    }
}
