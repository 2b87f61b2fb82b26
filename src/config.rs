//! Project layout and `config.yaml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;
use crate::loader::load_mapping;
use crate::normalize::{canonicalize, CONFIG_SYNONYMS};

pub const DEFAULT_ENDPOINTS_DIR: &str = "endpoints";
pub const DEFAULT_TYPES_FILE: &str = "types.yaml";
pub const DEFAULT_ENDPOINT_NAME: &str = "__default__";
pub const CONFIG_FILE: &str = "config.yaml";

/// Where a project keeps its definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    /// Relative to `root`.
    pub endpoints_dir: PathBuf,
    /// Relative to `root`.
    pub types_file: PathBuf,
    /// File title of the default endpoint inside the endpoints directory.
    pub default_endpoint: String,
}

impl ProjectLayout {
    /// Standard layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            endpoints_dir: PathBuf::from(DEFAULT_ENDPOINTS_DIR),
            types_file: PathBuf::from(DEFAULT_TYPES_FILE),
            default_endpoint: DEFAULT_ENDPOINT_NAME.to_string(),
        }
    }

    pub fn endpoints_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.endpoints_dir = dir.into();
        self
    }

    pub fn types_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.types_file = file.into();
        self
    }

    pub fn default_endpoint(mut self, name: impl Into<String>) -> Self {
        self.default_endpoint = name.into();
        self
    }

    pub fn endpoints_path(&self) -> PathBuf {
        self.root.join(&self.endpoints_dir)
    }

    pub fn types_path(&self) -> PathBuf {
        self.root.join(&self.types_file)
    }

    /// Path of the default endpoint; `.yaml` is preferred over `.yml`.
    pub fn default_endpoint_path(&self) -> PathBuf {
        let dir = self.endpoints_path();
        let yml = dir.join(format!("{}.yml", self.default_endpoint));
        if yml.exists() && !dir.join(format!("{}.yaml", self.default_endpoint)).exists() {
            yml
        } else {
            dir.join(format!("{}.yaml", self.default_endpoint))
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }
}

/// Who to contact about the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactInfo {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Contents of `config.yaml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProjectConfig {
    pub endpoints_dir: Option<PathBuf>,
    pub types_file: Option<PathBuf>,
    pub domain_name: String,
    pub documentation_url: String,
    pub https: bool,
    pub contact_info: ContactInfo,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            endpoints_dir: None,
            types_file: None,
            domain_name: "localhost".to_string(),
            documentation_url: "localhost/specs".to_string(),
            https: true,
            contact_info: ContactInfo::default(),
        }
    }
}

impl ProjectConfig {
    /// Read `config.yaml`. A missing file gives the defaults.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::InvalidConfig` for unknown keys or wrongly typed
    /// values, or a loading error if the file cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        match load_mapping(path)? {
            Some(map) => Self::from_value(Value::Object(map)),
            None => Ok(Self::default()),
        }
    }

    /// # Errors
    ///
    /// Returns `SchemaError::InvalidConfig` if the mapping does not describe a
    /// valid configuration.
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let value = match value {
            Value::Object(map) => Value::Object(canonicalize(&map, &CONFIG_SYNONYMS)),
            Value::Null => return Ok(Self::default()),
            other => other,
        };
        serde_json::from_value(value).map_err(|e| SchemaError::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Apply directory overrides to a layout.
    pub fn apply(&self, mut layout: ProjectLayout) -> ProjectLayout {
        if let Some(dir) = &self.endpoints_dir {
            layout = layout.endpoints_dir(dir.clone());
        }
        if let Some(file) = &self.types_file {
            layout = layout.types_file(file.clone());
        }
        layout
    }

    /// Contact line for error responses (`Jane <jane@example.com>`).
    pub fn contact_line(&self) -> Option<String> {
        match (&self.contact_info.name, &self.contact_info.email) {
            (Some(name), Some(email)) => Some(format!("{} <{}>", name, email)),
            (Some(name), None) => Some(name.clone()),
            (None, Some(email)) => Some(email.clone()),
            (None, None) => None,
        }
    }
}
