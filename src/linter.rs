//! Project linting - static analysis of resource definitions.
//!
//! Checks every resource file for:
//! - Definitions that fail to resolve (E001)
//! - Relational fields pointing at endpoints that do not exist (E002)
//! - Resources declaring no fields (W001)
//! - Computed fields without a `computation` block (W002)

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::endpoint::identifier;
use crate::project::Project;
use crate::types::ResourceSchema;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic message from linting.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub file: PathBuf,
    /// Location inside the resource (e.g., "/fields/author")
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn error(code: &str, file: &Path, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: code.to_string(),
            file: file.to_path_buf(),
            path: path.into(),
            message: message.into(),
        }
    }

    fn warning(code: &str, file: &Path, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, file, path, message)
        }
    }
}

/// Result of linting a single resource file.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub file: PathBuf,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl FileResult {
    fn new(file: PathBuf, diagnostics: Vec<Diagnostic>) -> Self {
        let status = if diagnostics.iter().any(|d| d.severity == Severity::Error) {
            FileStatus::Error
        } else if diagnostics.is_empty() {
            FileStatus::Ok
        } else {
            FileStatus::Warning
        };
        Self {
            file,
            status,
            diagnostics,
        }
    }
}

/// Status of a linted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Ok,
    Error,
    Warning,
}

/// Result of linting a project.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub path: PathBuf,
    pub files_checked: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub warnings: usize,
    pub results: Vec<FileResult>,
}

impl LintResult {
    /// Returns true if no errors were found.
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }

    fn from_results(path: PathBuf, results: Vec<FileResult>, strict: bool) -> Self {
        let count = |severity: Severity| {
            results
                .iter()
                .flat_map(|r| &r.diagnostics)
                .filter(|d| d.severity == severity)
                .count()
        };
        let failed = results
            .iter()
            .filter(|r| {
                if strict {
                    r.status != FileStatus::Ok
                } else {
                    r.status == FileStatus::Error
                }
            })
            .count();
        let errors = count(Severity::Error);
        let warnings = count(Severity::Warning);

        Self {
            path,
            files_checked: results.len(),
            passed: results.len() - failed,
            failed,
            errors,
            warnings,
            results,
        }
    }
}

/// Lint every resource of a project.
///
/// If the shared inputs (endpoints directory, type catalog, default endpoint)
/// are broken, the result holds a single error for the project root.
/// If `strict` is true, files with warnings count as failed.
pub fn lint(project: &Project, strict: bool) -> LintResult {
    let root = project.layout().root.clone();
    let endpoints = project.layout().endpoints_path();

    let entries = match project.load_each() {
        Ok(entries) => entries,
        Err(e) => {
            let diagnostic = Diagnostic::error("E001", &root, "/", e.to_string());
            return LintResult::from_results(
                root.clone(),
                vec![FileResult::new(root, vec![diagnostic])],
                strict,
            );
        }
    };

    // Failing files still define an endpoint others may relate to.
    let known: HashSet<String> = entries.iter().map(|(file, _)| identifier(&file.title)).collect();

    let results = entries
        .iter()
        .map(|(file, result)| {
            let relative = file.path.strip_prefix(&endpoints).unwrap_or(&file.path);
            let diagnostics = match result {
                Ok(resource) => check_resource(resource, relative, &known),
                Err(e) => vec![Diagnostic::error("E001", relative, "/", e.to_string())],
            };
            debug!(file = %relative.display(), count = diagnostics.len(), "linted resource");
            FileResult::new(relative.to_path_buf(), diagnostics)
        })
        .collect();

    LintResult::from_results(root, results, strict)
}

fn check_resource(resource: &ResourceSchema, file: &Path, known: &HashSet<String>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if resource.fields.is_empty() {
        diagnostics.push(Diagnostic::warning(
            "W001",
            file,
            "/fields",
            format!("resource '{}' declares no fields", resource.identifier),
        ));
    }

    for (field, target) in resource.relations() {
        if !known.contains(target) {
            diagnostics.push(Diagnostic::error(
                "E002",
                file,
                format!("/fields/{}", field),
                format!("relates to undefined endpoint '{}'", target),
            ));
        }
    }

    for field in resource.fields.iter().filter(|f| f.computed && f.computation.is_none()) {
        diagnostics.push(Diagnostic::warning(
            "W002",
            file,
            format!("/fields/{}", field.name),
            "computed field has no computation and will never be set",
        ));
    }

    diagnostics
}
