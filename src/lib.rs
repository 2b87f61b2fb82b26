//! REST Resource Schema Engine
//!
//! Resolution and validation of declarative YAML resource definitions.
//!
//! A project keeps one YAML file per resource under `endpoints/`, a catalog of
//! reusable custom types in `types.yaml`, and optionally a `__default__` endpoint
//! whose fields every resource inherits. This library turns those definitions
//! into fully resolved [`ResourceSchema`]s and validates request payloads
//! against them.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use rest_schema::{
//!     load_documents_str, validate, EndpointAssembler, HttpMethod, ResourceFile, TypeRegistry,
//! };
//!
//! let yaml = "
//! title*:
//!   is: string
//!   maximum length: 80
//! rating:
//!   one_of: [1, 2, 3, 4, 5]
//! ";
//!
//! let documents = load_documents_str(yaml, Path::new("posts.yaml")).unwrap();
//! let registry = TypeRegistry::new();
//! let posts = EndpointAssembler::new(&registry)
//!     .assemble(&ResourceFile::new("endpoints/posts.yaml"), documents)
//!     .unwrap();
//!
//! // `*` marks the field required, the rating type is inferred from its whitelist
//! assert!(posts.field("title").unwrap().required);
//! assert_eq!(posts.field("rating").unwrap().type_label(), "integer");
//!
//! let failure = validate(&posts, HttpMethod::Post, br#"{"rating": 3}"#).unwrap_err();
//! assert_eq!(failure.message(), "missing required fields");
//! ```
//!
//! # Field Shorthand
//!
//! | Declared name | Effect |
//! |---------------|--------|
//! | `name*` | `required: true` |
//! | `name()` | `computed: true`, `read_only: true` |
//! | `name` | neither |
//!
//! # Field Types
//!
//! Native types are `integer`, `number`, `string`, `boolean`, `date`, `time`,
//! `datetime` and `slug`. `<users>` relates to another resource, a trailing
//! `[]` makes the field an array, and any other name is looked up in the type
//! catalog.

mod compute;
mod config;
mod endpoint;
mod error;
mod export;
pub mod expr;
mod fields;
mod linter;
mod loader;
mod normalize;
mod project;
mod registry;
mod shorthand;
mod types;
mod validator;

pub use compute::{apply_computations, flatten, needs_recomputation, populate_defaults};
pub use config::{
    ContactInfo, ProjectConfig, ProjectLayout, CONFIG_FILE, DEFAULT_ENDPOINTS_DIR,
    DEFAULT_ENDPOINT_NAME, DEFAULT_TYPES_FILE,
};
pub use endpoint::{
    canonical_name, identifier, inherit_defaults, load_default_fields, split_documents,
    Directives, EndpointAssembler,
};
pub use error::{EvalError, SchemaError};
pub use export::{conforms, to_json_schema, ConformanceError, Violation};
pub use expr::Evaluator;
pub use fields::{build_field, expand_custom_types, FieldResolver};
pub use linter::{lint, Diagnostic, FileResult, FileStatus, LintResult, Severity};
pub use loader::{
    collect_resource_files, is_special, load_documents, load_documents_str, load_mapping,
    ResourceFile,
};
pub use normalize::{
    canonicalize, normalize_key, SynonymTable, CONFIG_SYNONYMS, DIRECTIVE_SYNONYMS,
    FIELD_KEY_SYNONYMS,
};
pub use project::{check_relations, Project};
pub use registry::{TypeRegistry, TypeShape, ALIAS_FIELD};
pub use shorthand::{expand as expand_shorthand, Shorthand};
pub use types::{
    json_type_name, Computation, DefaultValue, FieldDescriptor, FieldType, HttpMethod,
    NativeType, React, ResourceSchema, EXPRESSION_PREFIX,
};
pub use validator::{
    is_date, is_datetime, is_time, validate, validate_value, FailureKind, ValidationFailure,
    ValidationOutcome, SLUG_PATTERN,
};
