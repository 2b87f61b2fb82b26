//! Integration tests for resource resolution and validation.

use std::fs;
use std::path::Path;

use serde_json::{json, Map, Value};
use rest_schema::{
    apply_computations, build_field, expand_custom_types, flatten, populate_defaults, validate,
    DefaultValue, Evaluator, FieldDescriptor, FieldType, HttpMethod, NativeType, Project,
    SchemaError,
};
use tempfile::TempDir;

/// Write `files` (relative path, content) into a fresh project directory.
fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (relative, content) in files {
        let path = dir.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    dir
}

fn open(dir: &TempDir) -> Project {
    Project::open(dir.path()).unwrap()
}

fn names(fields: &[FieldDescriptor]) -> Vec<&str> {
    fields.iter().map(|f| f.name.as_str()).collect()
}

// === Key Normalization ===

mod synonyms {
    use super::*;
    use proptest::prelude::*;

    fn spelled(pairs: &[(&str, Value)]) -> Value {
        let map: Map<String, Value> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        Value::Object(map)
    }

    #[test]
    fn synonyms_and_whitespace_resolve_like_canonical_keys() {
        let canonical = build_field(
            "age",
            &json!({
                "type": "integer",
                "minimum": 0,
                "maximum": 130,
                "defaults_to": 18
            }),
        )
        .unwrap();
        let synonyms = build_field(
            "age",
            &json!({
                "is": "integer",
                "min": 0,
                " max ": 130,
                "initial value": 18
            }),
        )
        .unwrap();
        assert_eq!(canonical, synonyms);
    }

    #[test]
    fn unknown_config_key_is_rejected() {
        let result = build_field("age", &json!({ "is": "integer", "colour": "red" }));
        assert!(matches!(result, Err(SchemaError::InvalidFieldConfig { .. })));
    }

    proptest! {
        #[test]
        fn any_synonym_spelling_resolves_identically(
            type_key in prop::sample::select(vec!["type", "is"]),
            whitelist_key in prop::sample::select(vec!["whitelist", "one_of", "one of"]),
            blacklist_key in prop::sample::select(vec!["blacklist", "prohibit"]),
            max_key in prop::sample::select(vec!["max_length", "maximum_length", "maximum length"]),
            min_key in prop::sample::select(vec!["min_length", "minimum_length", " minimum length"]),
            default_key in prop::sample::select(vec!["defaults_to", "default", "defaults", "initial_value", "initial value"]),
        ) {
            let canonical = build_field(
                "code*",
                &json!({
                    "type": "string",
                    "whitelist": ["ab", "cd", "ef"],
                    "blacklist": ["cd"],
                    "max_length": 2,
                    "min_length": 2,
                    "defaults_to": "ab"
                }),
            )
            .unwrap();
            let config = spelled(&[
                (type_key, json!("string")),
                (whitelist_key, json!(["ab", "cd", "ef"])),
                (blacklist_key, json!(["cd"])),
                (max_key, json!(2)),
                (min_key, json!(2)),
                (default_key, json!("ab")),
            ]);
            prop_assert_eq!(build_field("code*", &config).unwrap(), canonical);
        }
    }
}

// === Shorthand Markers ===

mod shorthand {
    use super::*;

    #[test]
    fn required_marker_with_inferred_type() {
        let field = build_field("name*", &json!({ "one_of": [4, 7, 8] })).unwrap();
        assert_eq!(
            field,
            FieldDescriptor::native("name", NativeType::Integer)
                .whitelist(vec![json!(4), json!(7), json!(8)])
                .required(true)
        );
    }

    #[test]
    fn computed_marker() {
        let field = build_field("updated_at()", &json!({ "is": "datetime" })).unwrap();
        assert_eq!(
            field,
            FieldDescriptor::native("updated_at", NativeType::Datetime).computed(true)
        );
        assert!(field.read_only);
    }

    #[test]
    fn both_markers_conflict() {
        let result = build_field("slug*()", &json!({ "is": "slug" }));
        assert!(matches!(result, Err(SchemaError::ConflictingMarkers { .. })));
    }
}

// === Type Inference ===

mod inference {
    use super::*;

    #[test]
    fn inference_order() {
        let from_lengths = build_field("code", &json!({ "max length": 3 })).unwrap();
        assert_eq!(from_lengths.field_type, FieldType::Native(NativeType::String));

        let from_bounds = build_field("ratio", &json!({ "min": 0 })).unwrap();
        assert_eq!(from_bounds.field_type, FieldType::Native(NativeType::Number));

        let from_default = build_field("draft", &json!({ "default": true })).unwrap();
        assert_eq!(from_default.field_type, FieldType::Native(NativeType::Boolean));
    }

    #[test]
    fn expression_default_does_not_infer() {
        let result = build_field("created_at", &json!({ "default": "= now()" }));
        assert!(matches!(result, Err(SchemaError::MissingType { field }) if field == "created_at"));
    }
}

// === Custom Types ===

mod custom_types {
    use super::*;
    use proptest::prelude::*;
    use rest_schema::TypeRegistry;

    const TYPES: &str = "
email:
  _:
    is: string
    max length: 120
address:
  street*:
    is: string
  city:
    is: string
";

    #[test]
    fn alias_merges_into_field() {
        let dir = project(&[
            ("types.yaml", TYPES),
            ("endpoints/users.yaml", "contact*:\n  is: email\n"),
        ]);
        let users = open(&dir).load_resource("users").unwrap();

        let contact = users.field("contact").unwrap();
        assert_eq!(contact.field_type, FieldType::Native(NativeType::String));
        assert_eq!(contact.max_length, Some(120));
        assert!(contact.required);
    }

    #[test]
    fn composite_expands_to_dotted_fields() {
        let dir = project(&[
            ("types.yaml", TYPES),
            ("endpoints/shops.yaml", "name:\n  is: string\nhome:\n  is: address\n"),
        ]);
        let shops = open(&dir).load_resource("/shops").unwrap();

        assert_eq!(names(&shops.fields), ["name", "home.street", "home.city"]);
        assert!(shops.field("home.street").unwrap().required);
    }

    #[test]
    fn explicit_declaration_wins_over_generated_field() {
        let dir = project(&[
            ("types.yaml", TYPES),
            (
                "endpoints/shops.yaml",
                "home:\n  is: address\nhome.street:\n  is: string\n  max length: 40\n",
            ),
        ]);
        let shops = open(&dir).load_resource("shops").unwrap();

        let street = shops.field("home.street").unwrap();
        assert_eq!(street.max_length, Some(40));
        assert!(!street.required);
        assert_eq!(shops.fields.iter().filter(|f| f.name == "home.street").count(), 1);
    }

    #[test]
    fn expansion_is_idempotent() {
        let dir = project(&[
            ("types.yaml", TYPES),
            ("endpoints/shops.yaml", "home:\n  is: address\ncontact:\n  is: email\n"),
        ]);
        let project = open(&dir);
        let shops = project.load_resource("shops").unwrap();
        let registry = project.type_registry().unwrap();

        let again = expand_custom_types(shops.fields.clone(), &registry).unwrap();
        assert_eq!(again, shops.fields);
    }

    #[test]
    fn unknown_type_names_the_field() {
        let dir = project(&[("endpoints/users.yaml", "home:\n  is: adress\n")]);
        let result = open(&dir).load_resource("users");
        assert!(matches!(
            result,
            Err(SchemaError::UnknownType { field, type_name }) if field == "home" && type_name == "adress"
        ));
    }

    #[test]
    fn nested_custom_types_are_rejected() {
        let dir = project(&[
            ("types.yaml", "email:\n  _:\n    is: string\nperson:\n  mail:\n    is: email\n"),
            ("endpoints/users.yaml", "name:\n  is: string\n"),
        ]);
        let result = open(&dir).load_resource("users");
        assert!(matches!(result, Err(SchemaError::NonNativeSubfield { .. })));
    }

    #[test]
    fn relations_are_kept_and_arrays_marked() {
        let dir = project(&[("endpoints/posts.yaml", "author:\n  is: <users>\ntags:\n  is: string[]\n")]);
        let posts = open(&dir).load_resource("posts").unwrap();

        assert_eq!(
            posts.field("author").unwrap().field_type,
            FieldType::Relation("users".into())
        );
        assert!(posts.field("tags").unwrap().multiple);
    }

    proptest! {
        #[test]
        fn expanding_native_fields_changes_nothing(
            specs in prop::collection::btree_map(
                "[a-z]{1,8}(\\.[a-z]{1,8})?",
                (prop::sample::select(NativeType::ALL.to_vec()), any::<bool>()),
                0..8,
            )
        ) {
            let fields: Vec<FieldDescriptor> = specs
                .into_iter()
                .map(|(name, (native, multiple))| FieldDescriptor::native(name, native).multiple(multiple))
                .collect();
            let expanded = expand_custom_types(fields.clone(), &TypeRegistry::new()).unwrap();
            prop_assert_eq!(expanded, fields);
        }
    }
}

// === Resource Files ===

mod resource_files {
    use super::*;

    #[test]
    fn directives_document_comes_first() {
        let dir = project(&[(
            "endpoints/posts.yaml",
            "methods: [get, post]\nextends: articles\n---\ntitle*:\n  is: string\n",
        )]);
        let posts = open(&dir).load_resource("posts").unwrap();

        assert_eq!(posts.allowed_methods, vec![HttpMethod::Get, HttpMethod::Post]);
        assert_eq!(posts.inherits.as_deref(), Some("articles"));
        assert_eq!(posts.allow_header(), "GET, POST");
    }

    #[test]
    fn default_methods() {
        let dir = project(&[("endpoints/posts.yaml", "title:\n  is: string\n")]);
        let posts = open(&dir).load_resource("posts").unwrap();
        assert_eq!(posts.allow_header(), "POST, GET, PATCH, DELETE");
    }

    #[test]
    fn three_documents_are_rejected() {
        let dir = project(&[("endpoints/posts.yaml", "a: 1\n---\nb: 2\n---\nc: 3\n")]);
        let result = open(&dir).load_resource("posts");
        assert!(matches!(result, Err(SchemaError::TooManyDocuments { count: 3, .. })));
    }

    #[test]
    fn unknown_directive() {
        let dir = project(&[("endpoints/posts.yaml", "cache: yes\n---\ntitle:\n  is: string\n")]);
        let result = open(&dir).load_resource("posts");
        assert!(matches!(result, Err(SchemaError::UnknownDirective { directive }) if directive == "cache"));
    }

    #[test]
    fn special_files_are_not_resources_and_subdirectories_nest_routes() {
        let dir = project(&[
            ("endpoints/__default__.yaml", "id:\n  is: string\n"),
            ("endpoints/users.yml", "name:\n  is: string\n"),
            ("endpoints/blog/blog_posts.yaml", "title:\n  is: string\n"),
            ("endpoints/notes.txt", "ignored"),
        ]);
        let resources = open(&dir).load_all().unwrap();

        let routes: Vec<&str> = resources.iter().map(|r| r.route.as_str()).collect();
        assert_eq!(routes, ["/blog/blog_posts", "/users"]);
        assert_eq!(resources[0].identifier, "blog-posts");
        assert_eq!(resources[0].canonical_name, "blog_posts");
    }

    #[test]
    fn computed_tag_becomes_expression_default() {
        let dir = project(&[(
            "endpoints/posts.yaml",
            "created_at:\n  is: datetime\n  default: !run now()\n",
        )]);
        let posts = open(&dir).load_resource("posts").unwrap();
        assert_eq!(
            posts.field("created_at").unwrap().default,
            Some(DefaultValue::Expression("now()".into()))
        );
    }

    #[test]
    fn config_can_move_directories() {
        let dir = project(&[
            ("config.yaml", "endpoints directory: api\ntypes: catalog.yaml\n"),
            ("catalog.yaml", "email:\n  _:\n    is: string\n"),
            ("api/users.yaml", "contact:\n  is: email\n"),
        ]);
        let users = open(&dir).load_resource("users").unwrap();
        assert_eq!(
            users.field("contact").unwrap().field_type,
            FieldType::Native(NativeType::String)
        );
    }
}

// === Default Endpoint ===

mod default_endpoint {
    use super::*;

    #[test]
    fn default_only_fields_come_first() {
        let dir = project(&[
            (
                "endpoints/__default__.yaml",
                "b:\n  is: integer\nc:\n  is: string\n",
            ),
            ("endpoints/things.yaml", "a:\n  is: string\nb:\n  is: string\n"),
        ]);
        let things = open(&dir).load_resource("things").unwrap();

        assert_eq!(names(&things.fields), ["c", "a", "b"]);
        assert_eq!(
            things.field("b").unwrap().field_type,
            FieldType::Native(NativeType::String)
        );
    }
}

// === Project ===

mod project_loading {
    use super::*;

    #[test]
    fn load_all_checks_relations() {
        let dir = project(&[
            ("endpoints/posts.yaml", "author:\n  is: <people>\n"),
            ("endpoints/users.yaml", "name:\n  is: string\n"),
        ]);
        let project = open(&dir);

        // Single resources resolve without the check.
        assert!(project.load_resource("posts").is_ok());
        assert!(matches!(
            project.load_all(),
            Err(SchemaError::UnknownRelation { target, .. }) if target == "people"
        ));
    }

    #[test]
    fn load_each_isolates_failures() {
        let dir = project(&[
            ("endpoints/bad.yaml", "x:\n  is: nothing\n"),
            ("endpoints/good.yaml", "name:\n  is: string\n"),
        ]);
        let entries = open(&dir).load_each().unwrap();

        assert_eq!(entries.len(), 2);
        assert!(entries[0].1.is_err());
        assert!(entries[1].1.is_ok());
    }

    #[test]
    fn duplicate_identifiers_are_rejected() {
        let dir = project(&[
            ("endpoints/posts.yaml", "title:\n  is: string\n"),
            ("endpoints/blog/posts.yaml", "body:\n  is: string\n"),
        ]);
        let project = open(&dir);

        assert!(matches!(
            project.load_resource("posts"),
            Err(SchemaError::DuplicateResource { identifier, .. }) if identifier == "posts"
        ));
        assert!(project.load_each().is_err());
        assert!(project.load_all().is_err());
    }

    #[test]
    fn unknown_resource() {
        let dir = project(&[("endpoints/users.yaml", "name:\n  is: string\n")]);
        assert!(matches!(
            open(&dir).load_resource("ghosts"),
            Err(SchemaError::UnknownResource { .. })
        ));
    }

    #[test]
    fn missing_endpoints_directory() {
        let dir = TempDir::new().unwrap();
        let result = Project::open(dir.path()).unwrap().load_all();
        assert!(matches!(result, Err(SchemaError::FileNotFound { .. })));
        assert_eq!(result.unwrap_err().exit_code(), 3);
    }

    #[test]
    fn resources_can_be_shared_across_threads() {
        let dir = project(&[("endpoints/users.yaml", "name*:\n  is: string\n")]);
        let users = std::sync::Arc::new(open(&dir).load_resource("users").unwrap());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let users = users.clone();
                std::thread::spawn(move || {
                    let body = format!(r#"{{"name": "user {}"}}"#, i);
                    validate(&users, HttpMethod::Post, body.as_bytes()).is_ok()
                })
            })
            .collect();
        assert!(handles.into_iter().all(|h| h.join().unwrap()));
    }
}

// === Validation ===

mod validation {
    use super::*;

    const PEOPLE: &str = "
name*:
  is: string
  min length: 1
age:
  min: 0
  max: 10
address.city:
  is: string
";

    fn people(dir: &Path) -> rest_schema::ResourceSchema {
        Project::open(dir).unwrap().load_resource("people").unwrap()
    }

    #[test]
    fn missing_required_on_post_but_not_get() {
        let dir = project(&[("endpoints/people.yaml", PEOPLE)]);
        let people = people(dir.path());

        let failure = validate(&people, HttpMethod::Post, br#"{"age": 3}"#).unwrap_err();
        assert_eq!(failure.message(), "missing required fields");
        assert_eq!(failure.details, json!({ "missing": ["name"] }));

        assert!(validate(&people, HttpMethod::Get, br#"{"age": 3}"#).is_ok());
    }

    #[test]
    fn bounds_report_actual_and_limits() {
        let dir = project(&[("endpoints/people.yaml", PEOPLE)]);
        let people = people(dir.path());

        assert!(validate(&people, HttpMethod::Patch, br#"{"age": 10}"#).is_ok());
        let failure = validate(&people, HttpMethod::Patch, br#"{"age": 11}"#).unwrap_err();
        assert_eq!(failure.message(), "out of bounds");
        assert_eq!(
            failure.details,
            json!({ "age": { "actual": 11, "minimum": 0, "maximum": 10 } })
        );
    }

    #[test]
    fn unknown_fields_before_wrong_type() {
        let dir = project(&[("endpoints/people.yaml", PEOPLE)]);
        let people = people(dir.path());

        let failure =
            validate(&people, HttpMethod::Patch, br#"{"nickname": "x", "age": "old"}"#).unwrap_err();
        assert_eq!(failure.message(), "unknown fields");
    }

    #[test]
    fn nested_payload_matches_dotted_fields() {
        let dir = project(&[("endpoints/people.yaml", PEOPLE)]);
        let people = people(dir.path());

        let body = br#"{"name": "Ada", "address": {"city": "London"}}"#;
        assert!(validate(&people, HttpMethod::Post, body).is_ok());
    }
}

// === Computed Values ===

mod computed {
    use super::*;

    const POSTS: &str = "
title*:
  is: string
status:
  one of: [draft, published]
  default: draft
slug():
  is: slug
  computation:
    set: slugify(title)
    react: title
";

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn create_then_update() {
        let dir = project(&[("endpoints/posts.yaml", POSTS)]);
        let posts = open(&dir).load_resource("posts").unwrap();
        let evaluator = Evaluator::new();

        let mut created = flatten(&as_map(json!({ "title": "Hello World" })));
        populate_defaults(&posts, &mut created, &evaluator).unwrap();
        apply_computations(&posts, &mut created, &Map::new(), &Map::new(), &evaluator).unwrap();
        assert_eq!(created["status"], json!("draft"));
        assert_eq!(created["slug"], json!("hello-world"));

        let mut unchanged = as_map(json!({ "status": "published" }));
        apply_computations(&posts, &mut unchanged, &created, &Map::new(), &evaluator).unwrap();
        assert!(!unchanged.contains_key("slug"));

        let mut renamed = as_map(json!({ "title": "Goodbye" }));
        apply_computations(&posts, &mut renamed, &created, &Map::new(), &evaluator).unwrap();
        assert_eq!(renamed["slug"], json!("goodbye"));
    }
}
