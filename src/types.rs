//! Core types for resolved resources.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Number, Value};

use crate::error::SchemaError;

/// Prefix marking a default value as a computed expression (`"= now()"`).
pub const EXPRESSION_PREFIX: &str = "= ";

static RELATION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<([^<>\[\]]+)>$").expect("relation pattern is valid"));

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The fixed set of primitive field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeType {
    Integer,
    Number,
    String,
    Boolean,
    Date,
    Time,
    Datetime,
    Slug,
}

impl NativeType {
    pub const ALL: [NativeType; 8] = [
        NativeType::Integer,
        NativeType::Number,
        NativeType::String,
        NativeType::Boolean,
        NativeType::Date,
        NativeType::Time,
        NativeType::Datetime,
        NativeType::Slug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NativeType::Integer => "integer",
            NativeType::Number => "number",
            NativeType::String => "string",
            NativeType::Boolean => "boolean",
            NativeType::Date => "date",
            NativeType::Time => "time",
            NativeType::Datetime => "datetime",
            NativeType::Slug => "slug",
        }
    }

    /// Parse a native type name. Returns `None` for anything else.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// The primitive kind of a literal, used for type inference.
    ///
    /// Only scalars have a kind; `null`, arrays and objects return `None`.
    pub fn of_literal(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(_) => Some(NativeType::Boolean),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(NativeType::Integer),
            Value::Number(_) => Some(NativeType::Number),
            Value::String(_) => Some(NativeType::String),
            _ => None,
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The type of a field.
///
/// `Custom` only exists between parsing a definition and custom type
/// expansion; a resolved [`ResourceSchema`] never contains it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Native(NativeType),
    /// Reference to another resource by identifier (`<users>`).
    Relation(String),
    Custom(String),
}

impl FieldType {
    /// Parse a declared type, returning the type and whether the `[]` array
    /// marker was present.
    pub fn parse(raw: &str) -> (Self, bool) {
        let raw = raw.trim();
        let (bare, multiple) = match raw.strip_suffix("[]") {
            Some(bare) => (bare.trim_end(), true),
            None => (raw, false),
        };

        let field_type = if let Some(native) = NativeType::parse(bare) {
            FieldType::Native(native)
        } else if let Some(captures) = RELATION_PATTERN.captures(bare) {
            FieldType::Relation(captures[1].trim().to_string())
        } else {
            FieldType::Custom(bare.to_string())
        };

        (field_type, multiple)
    }

    pub fn native(&self) -> Option<NativeType> {
        match self {
            FieldType::Native(native) => Some(*native),
            _ => None,
        }
    }

    pub fn relation_target(&self) -> Option<&str> {
        match self {
            FieldType::Relation(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, FieldType::Custom(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Native(native) => write!(f, "{}", native),
            FieldType::Relation(target) => write!(f, "<{}>", target),
            FieldType::Custom(name) => f.write_str(name),
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A field's default: a literal, or an expression evaluated at write time.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Literal(Value),
    Expression(String),
}

impl DefaultValue {
    /// Classify a raw default. Strings starting with `"= "` are expressions.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) if s.starts_with(EXPRESSION_PREFIX) => {
                DefaultValue::Expression(s[EXPRESSION_PREFIX.len()..].trim().to_string())
            }
            other => DefaultValue::Literal(other),
        }
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, DefaultValue::Expression(_))
    }
}

impl Serialize for DefaultValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DefaultValue::Literal(value) => value.serialize(serializer),
            DefaultValue::Expression(code) => {
                serializer.collect_str(&format_args!("{}{}", EXPRESSION_PREFIX, code))
            }
        }
    }
}

/// Which fields trigger recomputation of a computed field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawReact", into = "RawReact")]
pub enum React {
    /// `"*"`: recompute on every write.
    #[default]
    All,
    Fields(Vec<String>),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawReact {
    One(String),
    Many(Vec<String>),
}

impl From<RawReact> for React {
    fn from(raw: RawReact) -> Self {
        match raw {
            RawReact::One(s) if s == "*" => React::All,
            RawReact::One(s) => React::Fields(vec![s]),
            RawReact::Many(names) => React::Fields(names),
        }
    }
}

impl From<React> for RawReact {
    fn from(react: React) -> Self {
        match react {
            React::All => RawReact::One("*".to_string()),
            React::Fields(names) => RawReact::Many(names),
        }
    }
}

/// How a computed field gets its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Computation {
    /// Expression producing the value.
    pub set: String,
    #[serde(default)]
    pub react: React,
    /// Guard expressions; all must be truthy for the value to be recomputed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<String>,
}

/// One resolved field of a resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    /// Dotted path (`address.street`), unique within a resource.
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub multiple: bool,
    pub required: bool,
    pub computed: bool,
    pub read_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computation: Option<Computation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub whitelist: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blacklist: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_empty: Option<bool>,
}

impl FieldDescriptor {
    /// A field with no constraints.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            multiple: false,
            required: false,
            computed: false,
            read_only: false,
            default: None,
            computation: None,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
            allow_empty: None,
        }
    }

    pub fn native(name: impl Into<String>, native: NativeType) -> Self {
        Self::new(name, FieldType::Native(native))
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Mark as computed. Computed fields are always read-only.
    pub fn computed(mut self, computed: bool) -> Self {
        self.computed = computed;
        self.read_only = self.read_only || computed;
        self
    }

    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn whitelist(mut self, values: Vec<Value>) -> Self {
        self.whitelist = values;
        self
    }

    pub fn bounds(mut self, minimum: Option<Number>, maximum: Option<Number>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn lengths(mut self, min_length: Option<u64>, max_length: Option<u64>) -> Self {
        self.min_length = min_length;
        self.max_length = max_length;
        self
    }

    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn computation(mut self, computation: Computation) -> Self {
        self.computation = Some(computation);
        self
    }

    /// Same field under another name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Overlay this field's explicitly set attributes on top of `base`.
    ///
    /// Flags are OR-ed, optional attributes fall back to `base` when unset, and
    /// the resulting type is `base`'s. Used for single-field type aliases.
    pub fn overlay(&self, base: &FieldDescriptor) -> Self {
        fn pick<T: Clone>(own: &Option<T>, base: &Option<T>) -> Option<T> {
            own.clone().or_else(|| base.clone())
        }
        fn pick_list(own: &[Value], base: &[Value]) -> Vec<Value> {
            if own.is_empty() {
                base.to_vec()
            } else {
                own.to_vec()
            }
        }

        Self {
            name: self.name.clone(),
            field_type: base.field_type.clone(),
            multiple: self.multiple || base.multiple,
            required: self.required || base.required,
            computed: self.computed || base.computed,
            read_only: self.read_only || base.read_only,
            default: pick(&self.default, &base.default),
            computation: pick(&self.computation, &base.computation),
            whitelist: pick_list(&self.whitelist, &base.whitelist),
            blacklist: pick_list(&self.blacklist, &base.blacklist),
            min_length: pick(&self.min_length, &base.min_length),
            max_length: pick(&self.max_length, &base.max_length),
            minimum: pick(&self.minimum, &base.minimum),
            maximum: pick(&self.maximum, &base.maximum),
            allow_empty: pick(&self.allow_empty, &base.allow_empty),
        }
    }

    /// Expected type as shown to clients (`integer`, `string[]`, `<users>`).
    pub fn type_label(&self) -> String {
        if self.multiple {
            format!("{}[]", self.field_type)
        } else {
            self.field_type.to_string()
        }
    }
}

/// HTTP request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl HttpMethod {
    /// Methods a resource allows when it does not say otherwise.
    pub const DEFAULT_ALLOWED: [HttpMethod; 4] = [
        HttpMethod::Post,
        HttpMethod::Get,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Connect => "CONNECT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Trace => "TRACE",
        }
    }

    /// Case-insensitive parse.
    pub fn parse(s: &str) -> Result<Self, SchemaError> {
        let method = match s.trim().to_ascii_uppercase().as_str() {
            "CONNECT" => HttpMethod::Connect,
            "DELETE" => HttpMethod::Delete,
            "GET" => HttpMethod::Get,
            "HEAD" => HttpMethod::Head,
            "OPTIONS" => HttpMethod::Options,
            "PATCH" => HttpMethod::Patch,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "TRACE" => HttpMethod::Trace,
            _ => {
                return Err(SchemaError::UnknownMethod {
                    method: s.to_string(),
                })
            }
        };
        Ok(method)
    }

    /// Whether request bodies of this method are validated.
    pub fn has_body(&self) -> bool {
        !matches!(
            self,
            HttpMethod::Get | HttpMethod::Delete | HttpMethod::Head | HttpMethod::Options
        )
    }

    /// Whether this method writes a whole new document (required fields apply).
    pub fn creates(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved resource.
///
/// Immutable once built; share it behind an `Arc` to validate concurrently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSchema {
    pub route: String,
    /// URL-safe slug (`blog-posts`).
    pub identifier: String,
    /// Identifier usable in code (`blog_posts`).
    pub canonical_name: String,
    pub fields: Vec<FieldDescriptor>,
    pub allowed_methods: Vec<HttpMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherits: Option<String>,
}

impl ResourceSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn allows(&self, method: HttpMethod) -> bool {
        self.allowed_methods.contains(&method)
    }

    /// Value for the `Access-Control-Allow-Methods` header.
    pub fn allow_header(&self) -> String {
        self.allowed_methods
            .iter()
            .map(HttpMethod::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `(field name, target identifier)` for every relational field.
    pub fn relations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter_map(|f| f.field_type.relation_target().map(|t| (f.name.as_str(), t)))
    }

    /// Same resource with a different field list.
    pub fn with_fields(&self, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            fields,
            ..self.clone()
        }
    }
}
