//! Error types for resource resolution and computed-value evaluation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning resource definitions into resolved schemas.
///
/// Every variant is fatal to the resource being resolved. Payload problems are
/// not errors here; see [`crate::ValidationFailure`].
#[derive(Debug, Error)]
pub enum SchemaError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid YAML in {path}: {message}")]
    InvalidYaml { path: PathBuf, message: String },

    #[error("{path}: defines {count} YAML documents, expected 1 (fields) or 2 (directives, fields)")]
    TooManyDocuments { path: PathBuf, count: usize },

    #[error("{path}: {what} must be a mapping, got {actual}")]
    NotAMapping {
        path: PathBuf,
        what: &'static str,
        actual: String,
    },

    // Definition errors (exit code 2)
    #[error("field '{field}': missing type and none could be inferred")]
    MissingType { field: String },

    #[error("field '{field}': declared type '{type_name}' is not known; define it in the type catalog")]
    UnknownType { field: String, type_name: String },

    #[error("in type '{type_name}': fields of custom types must be of native types only, field '{field}' has type '{field_type}'")]
    NonNativeSubfield {
        type_name: String,
        field: String,
        field_type: String,
    },

    #[error("field name '{name}' carries both the required (*) and computed (()) markers")]
    ConflictingMarkers { name: String },

    #[error("field '{field}' is declared more than once")]
    DuplicateField { field: String },

    #[error("field '{field}': {message}")]
    InvalidFieldConfig { field: String, message: String },

    #[error("unknown directive '{directive}'")]
    UnknownDirective { directive: String },

    #[error("directive '{directive}': {message}")]
    InvalidDirective { directive: String, message: String },

    #[error("unknown HTTP method '{method}'")]
    UnknownMethod { method: String },

    #[error("field '{field}' of resource '{resource}' relates to undefined endpoint '{target}'")]
    UnknownRelation {
        resource: String,
        field: String,
        target: String,
    },

    #[error("no resource with route or identifier '{name}'")]
    UnknownResource { name: String },

    #[error("{first} and {second} both define resource '{identifier}'")]
    DuplicateResource {
        identifier: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("invalid project config: {message}")]
    InvalidConfig { message: String },

    #[error("resource '{resource}' exports an invalid JSON Schema: {message}")]
    InvalidExport { resource: String, message: String },
}

impl SchemaError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            SchemaError::FileNotFound { .. } | SchemaError::ReadError { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors raised by the computed-value expression evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("expression is empty")]
    EmptyInput,

    #[error("expression exceeds size limit: {actual_bytes} bytes (max {max_bytes})")]
    InputTooLarge {
        max_bytes: usize,
        actual_bytes: usize,
    },

    #[error("expression nesting exceeds limit of {max_depth} at {position}")]
    NestingTooDeep { max_depth: usize, position: usize },

    #[error("unexpected token `{found}` at {position}, expected {expected}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
        position: usize,
    },

    #[error("unterminated string starting at {position}")]
    UnterminatedString { position: usize },

    #[error("invalid number `{raw}` at {position}")]
    InvalidNumber { raw: String, position: usize },

    #[error("unknown name `{name}`")]
    UnknownName { name: String },

    #[error("unknown function `{name}`")]
    UnknownFunction { name: String },

    #[error("`{function}` takes {expected} argument(s), got {actual}")]
    Arity {
        function: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("cannot apply `{operator}` to {left} and {right}")]
    TypeMismatch {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic result is not a finite number")]
    NotFinite,

    #[error("cannot format timestamp: {message}")]
    Clock { message: String },

    #[error("field '{field}': {message}")]
    Field { field: String, message: String },
}

impl EvalError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_exit_codes() {
        let err = SchemaError::FileNotFound {
            path: PathBuf::from("endpoints/users.yaml"),
        };
        assert_eq!(err.exit_code(), 3);

        let err = SchemaError::UnknownType {
            field: "email".into(),
            type_name: "mail".into(),
        };
        assert_eq!(err.exit_code(), 2);

        let err = SchemaError::TooManyDocuments {
            path: PathBuf::from("posts.yaml"),
            count: 3,
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn unknown_type_names_field_and_type() {
        let err = SchemaError::UnknownType {
            field: "home".into(),
            type_name: "adress".into(),
        };
        let message = err.to_string();
        assert!(message.contains("'home'"));
        assert!(message.contains("'adress'"));
    }

    #[test]
    fn eval_error_display() {
        let err = EvalError::Arity {
            function: "slugify",
            expected: 1,
            actual: 2,
        };
        assert_eq!(err.to_string(), "`slugify` takes 1 argument(s), got 2");
    }
}
