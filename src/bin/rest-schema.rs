//! REST Schema CLI
//!
//! Command-line interface for resolving, validating and linting resource
//! definitions.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use rest_schema::{
    apply_computations, conforms, flatten, lint, populate_defaults, to_json_schema, validate,
    ConformanceError, Evaluator, FileStatus, HttpMethod, Project, ResourceSchema, Severity,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rest-schema")]
#[command(about = "Resolve and validate declarative REST resource definitions")]
#[command(version)]
struct Cli {
    /// Log filter (e.g. `debug`, `rest_schema=trace`); RUST_LOG takes precedence
    #[arg(long, global = true, value_name = "FILTER")]
    log: Option<String>,

    /// Log decisions made while resolving (debug level)
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors, and only show failing files when linting
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print resolved resources as JSON
    Resolve {
        /// Project directory
        project: PathBuf,

        /// Only this resource (route, identifier or file title)
        #[arg(long, short)]
        resource: Option<String>,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a request body against a resource
    Validate {
        /// Project directory
        project: PathBuf,

        /// Resource route, identifier or file title
        resource: String,

        /// Request body file
        payload: PathBuf,

        /// HTTP method of the request
        #[arg(long, short, default_value = "POST")]
        method: String,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Populate defaults and computed fields of a document
    Apply {
        /// Project directory
        project: PathBuf,

        /// Resource route, identifier or file title
        resource: String,

        /// New data (JSON object)
        payload: PathBuf,

        /// Stored document being updated; without it the payload is a new document
        #[arg(long)]
        old: Option<PathBuf>,

        /// Extra expression context, as KEY=VALUE (VALUE parsed as JSON if possible)
        #[arg(long = "context", value_name = "KEY=VALUE", value_parser = parse_context)]
        context: Vec<(String, Value)>,

        /// Check the result against the resource's JSON Schema export
        #[arg(long)]
        check: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print the JSON Schema export of a resource
    Export {
        /// Project directory
        project: PathBuf,

        /// Resource route, identifier or file title
        resource: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Lint resource definitions (resolution errors, dangling relations)
    Lint {
        /// Project directory
        project: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref(), cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Resolve {
            project,
            resource,
            output,
            pretty,
        } => run_resolve(&project, resource.as_deref(), output, pretty),

        Commands::Validate {
            project,
            resource,
            payload,
            method,
            json,
        } => run_validate(&project, &resource, &payload, &method, json),

        Commands::Apply {
            project,
            resource,
            payload,
            old,
            context,
            check,
            pretty,
        } => run_apply(ApplyArgs {
            project,
            resource,
            payload,
            old,
            context,
            check,
            pretty,
        }),

        Commands::Export {
            project,
            resource,
            pretty,
        } => run_export(&project, &resource, pretty),

        Commands::Lint {
            project,
            format,
            strict,
        } => run_lint(&project, format, strict, cli.quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging(filter: Option<&str>, verbose: bool, quiet: bool) {
    let level = match (filter, verbose, quiet) {
        (Some(filter), _, _) => filter,
        (None, true, _) => "debug",
        (None, _, true) => "error",
        _ => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_context(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

fn open_project(path: &Path) -> Result<Project, u8> {
    Project::open(path).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

fn load_resource(project: &Project, name: &str) -> Result<ResourceSchema, u8> {
    project.load_resource(name).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

fn print_json<T: Serialize>(value: &T, pretty: bool, output: Option<&Path>) -> Result<(), u8> {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => std::fs::write(path, &text).map_err(|e| {
            eprintln!("Error writing to {}: {}", path.display(), e);
            3u8
        }),
        None => {
            println!("{}", text);
            Ok(())
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, u8> {
    std::fs::read(path).map_err(|e| {
        eprintln!("Error reading {}: {}", path.display(), e);
        3u8
    })
}

fn read_object(path: &Path) -> Result<Map<String, Value>, u8> {
    let bytes = read_file(path)?;
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => {
            eprintln!("Error: {} must contain a JSON object", path.display());
            Err(1)
        }
        Err(e) => {
            eprintln!("Error: {} is not valid JSON: {}", path.display(), e);
            Err(1)
        }
    }
}

fn run_resolve(
    project_dir: &Path,
    resource: Option<&str>,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let project = open_project(project_dir)?;

    match resource {
        Some(name) => {
            let resource = load_resource(&project, name)?;
            print_json(&resource, pretty, output.as_deref())
        }
        None => {
            let resources = project.load_all().map_err(|e| {
                eprintln!("Error: {}", e);
                e.exit_code() as u8
            })?;
            print_json(&resources, pretty, output.as_deref())
        }
    }
}

fn run_validate(
    project_dir: &Path,
    resource: &str,
    payload: &Path,
    method: &str,
    json_output: bool,
) -> Result<(), u8> {
    let method = HttpMethod::parse(method).map_err(|e| {
        report_error(json_output, &e.to_string());
        e.exit_code() as u8
    })?;
    let project = open_project(project_dir)?;
    let resource = load_resource(&project, resource)?;

    if !resource.allows(method) {
        report_error(
            json_output,
            &format!(
                "method {} not allowed on {} (allowed: {})",
                method,
                resource.route,
                resource.allow_header()
            ),
        );
        return Err(1);
    }

    let body = read_file(payload)?;
    match validate(&resource, method, &body) {
        Ok(()) => {
            if json_output {
                println!("{}", json!({ "valid": true }));
            } else {
                println!("Valid");
            }
            Ok(())
        }
        Err(failure) => {
            if json_output {
                println!(
                    "{}",
                    json!({
                        "valid": false,
                        "message": failure.message(),
                        "details": failure.details,
                    })
                );
            } else {
                eprintln!("Validation failed: {}", failure.message());
                eprintln!("  {}", failure.details);
            }
            Err(failure.exit_code() as u8)
        }
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}

struct ApplyArgs {
    project: PathBuf,
    resource: String,
    payload: PathBuf,
    old: Option<PathBuf>,
    context: Vec<(String, Value)>,
    check: bool,
    pretty: bool,
}

fn run_apply(args: ApplyArgs) -> Result<(), u8> {
    let project = open_project(&args.project)?;
    let resource = load_resource(&project, &args.resource)?;
    let evaluator = Evaluator::new();

    let mut new_data = flatten(&read_object(&args.payload)?);
    let old_data = match &args.old {
        Some(path) => flatten(&read_object(path)?),
        None => Map::new(),
    };
    let extra: Map<String, Value> = args.context.into_iter().collect();

    if args.old.is_none() {
        populate_defaults(&resource, &mut new_data, &evaluator).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?;
    }
    apply_computations(&resource, &mut new_data, &old_data, &extra, &evaluator).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let mut document = old_data;
    document.extend(new_data);
    let document = Value::Object(document);
    debug!(resource = %resource.identifier, "applied defaults and computations");

    if args.check {
        match conforms(&resource, &document) {
            Ok(()) => {}
            Err(ConformanceError::Invalid { violations }) => {
                eprintln!("Document does not conform to {}:", resource.route);
                for violation in &violations {
                    eprintln!("  {}: {}", violation.path, violation.message);
                }
                return Err(1);
            }
            Err(e) => {
                error!("{}", e);
                return Err(e.exit_code() as u8);
            }
        }
    }

    print_json(&document, args.pretty, None)
}

fn run_export(project_dir: &Path, resource: &str, pretty: bool) -> Result<(), u8> {
    let project = open_project(project_dir)?;
    let resource = load_resource(&project, resource)?;
    let schema = to_json_schema(&resource).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    print_json(&schema, pretty, None)
}

fn run_lint(project_dir: &Path, format: Format, strict: bool, quiet: bool) -> Result<(), u8> {
    if !project_dir.is_dir() {
        eprintln!("Error: project not found: {}", project_dir.display());
        return Err(2);
    }
    let project = open_project(project_dir)?;
    let result = lint(&project, strict);

    if format == Format::Json {
        print_json(&result, true, None)?;
    } else {
        if !quiet {
            println!("Linting {} ...\n", project_dir.display());
        }

        for file_result in &result.results {
            let status_icon = match file_result.status {
                FileStatus::Ok => "\x1b[32m✓\x1b[0m",
                FileStatus::Warning => "\x1b[33m⚠\x1b[0m",
                FileStatus::Error => "\x1b[31m✗\x1b[0m",
            };

            if !quiet || file_result.status != FileStatus::Ok {
                println!("  {} {}", status_icon, file_result.file.display());
            }

            for diag in &file_result.diagnostics {
                let (color, label) = match diag.severity {
                    Severity::Error => ("\x1b[31m", "error"),
                    Severity::Warning => ("\x1b[33m", "warning"),
                };
                if !quiet || diag.severity == Severity::Error {
                    println!(
                        "    {}{}[{}]\x1b[0m: {} - {}",
                        color, label, diag.code, diag.path, diag.message
                    );
                }
            }
        }

        println!();
        if result.is_ok() && (!strict || result.warnings == 0) {
            println!(
                "\x1b[32m✓ {} files checked, all passed\x1b[0m",
                result.files_checked
            );
        } else {
            println!(
                "\x1b[31m✗ {} files checked: {} passed, {} failed ({} errors, {} warnings)\x1b[0m",
                result.files_checked, result.passed, result.failed, result.errors, result.warnings
            );
        }
    }

    if result.is_ok() && (!strict || result.warnings == 0) {
        Ok(())
    } else {
        Err(1)
    }
}
