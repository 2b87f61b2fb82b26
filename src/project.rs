//! A project directory: endpoints, type catalog, default endpoint, config.
//!
//! Every call re-reads the definitions, so results always reflect the files
//! on disk. Callers that want caching can hold on to the returned schemas.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::{ProjectConfig, ProjectLayout};
use crate::endpoint::{canonical_name, identifier, load_default_fields, EndpointAssembler};
use crate::error::SchemaError;
use crate::loader::{collect_resource_files, ResourceFile};
use crate::registry::TypeRegistry;
use crate::types::{FieldDescriptor, ResourceSchema};

#[derive(Debug, Clone)]
pub struct Project {
    layout: ProjectLayout,
    config: ProjectConfig,
}

impl Project {
    /// Open the project at `root`, reading `config.yaml` if present.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if `config.yaml` exists but is invalid.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SchemaError> {
        let layout = ProjectLayout::new(root);
        let config = ProjectConfig::load(&layout.config_path())?;
        Ok(Self {
            layout: config.apply(layout),
            config,
        })
    }

    /// Use an explicit layout and ignore `config.yaml`.
    pub fn with_layout(layout: ProjectLayout) -> Self {
        Self {
            layout,
            config: ProjectConfig::default(),
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// # Errors
    ///
    /// Returns `SchemaError` if the type catalog is invalid.
    pub fn type_registry(&self) -> Result<TypeRegistry, SchemaError> {
        TypeRegistry::load(&self.layout.types_path())
    }

    /// # Errors
    ///
    /// Returns `SchemaError` if the default endpoint exists but is invalid.
    pub fn default_fields(
        &self,
        registry: &TypeRegistry,
    ) -> Result<Option<Vec<FieldDescriptor>>, SchemaError> {
        load_default_fields(&self.layout.default_endpoint_path(), registry)
    }

    /// Resource files, excluding reserved ones.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::FileNotFound` if the endpoints directory is missing,
    /// or `SchemaError::DuplicateResource` if two files share an identifier
    /// (`posts.yaml` and `blog/posts.yaml`).
    pub fn resource_files(&self) -> Result<Vec<ResourceFile>, SchemaError> {
        let files = collect_resource_files(&self.layout.endpoints_path())?;

        let mut seen: HashMap<String, &ResourceFile> = HashMap::new();
        for file in &files {
            let id = identifier(&file.title);
            if let Some(first) = seen.get(&id) {
                return Err(SchemaError::DuplicateResource {
                    identifier: id,
                    first: first.path.clone(),
                    second: file.path.clone(),
                });
            }
            seen.insert(id, file);
        }
        Ok(files)
    }

    /// Find a resource file by route (`/posts`), identifier, or file title.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::UnknownResource` if nothing matches.
    pub fn find_file(&self, name: &str) -> Result<ResourceFile, SchemaError> {
        self.resource_files()?
            .into_iter()
            .find(|file| {
                file.route == name
                    || file.title == name
                    || identifier(&file.title) == name
                    || canonical_name(&file.title) == name
            })
            .ok_or_else(|| SchemaError::UnknownResource {
                name: name.to_string(),
            })
    }

    /// Resolve one resource. Relation targets are not checked here.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the resource, the catalog, or the default
    /// endpoint is invalid.
    pub fn load_resource(&self, name: &str) -> Result<ResourceSchema, SchemaError> {
        let file = self.find_file(name)?;
        let registry = self.type_registry()?;
        let defaults = self.default_fields(&registry)?;
        assembler(&registry, defaults.as_deref()).load(&file)
    }

    /// Resolve every resource, then check that relations point at resources
    /// that exist.
    ///
    /// # Errors
    ///
    /// Returns the first `SchemaError` encountered, or
    /// `SchemaError::UnknownRelation` for a dangling relation.
    pub fn load_all(&self) -> Result<Vec<ResourceSchema>, SchemaError> {
        let resources = self
            .load_each()?
            .into_iter()
            .map(|(_, result)| result)
            .collect::<Result<Vec<_>, _>>()?;
        check_relations(&resources)?;
        info!(count = resources.len(), "resolved project resources");
        Ok(resources)
    }

    /// Resolve every resource independently, keeping per-file failures.
    ///
    /// # Errors
    ///
    /// Fails as a whole only when the shared inputs (endpoints directory,
    /// type catalog, default endpoint) are broken.
    pub fn load_each(
        &self,
    ) -> Result<Vec<(ResourceFile, Result<ResourceSchema, SchemaError>)>, SchemaError> {
        let files = self.resource_files()?;
        let registry = self.type_registry()?;
        let defaults = self.default_fields(&registry)?;
        let assembler = assembler(&registry, defaults.as_deref());

        Ok(files
            .into_iter()
            .map(|file| {
                let result = assembler.load(&file);
                if let Err(e) = &result {
                    debug!(path = %file.path.display(), error = %e, "resource failed to resolve");
                }
                (file, result)
            })
            .collect())
    }
}

fn assembler<'a>(
    registry: &'a TypeRegistry,
    defaults: Option<&'a [FieldDescriptor]>,
) -> EndpointAssembler<'a> {
    let assembler = EndpointAssembler::new(registry);
    match defaults {
        Some(defaults) => assembler.with_defaults(defaults),
        None => assembler,
    }
}

/// Check that every relational field targets a known resource identifier.
///
/// # Errors
///
/// Returns `SchemaError::UnknownRelation` for the first dangling relation.
pub fn check_relations(resources: &[ResourceSchema]) -> Result<(), SchemaError> {
    let known: HashSet<&str> = resources.iter().map(|r| r.identifier.as_str()).collect();

    for resource in resources {
        for (field, target) in resource.relations() {
            if !known.contains(target) {
                return Err(SchemaError::UnknownRelation {
                    resource: resource.identifier.clone(),
                    field: field.to_string(),
                    target: target.to_string(),
                });
            }
        }
    }
    Ok(())
}
