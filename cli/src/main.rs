use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use config_schema_core::{
    Object, Presence, RuleArg, Schema, SchemaDefinition, ValidationOptions, Value,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// CLI-specific output format enum with clap argument parsing support.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliOutputFormat {
    Json,
    Yaml,
}

/// Presence applied to schema nodes that declare none.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliPresence {
    Required,
    Optional,
}

impl From<CliPresence> for Presence {
    fn from(presence: CliPresence) -> Self {
        match presence {
            CliPresence::Required => Self::Required,
            CliPresence::Optional => Self::Optional,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "config-schema")]
#[command(about = "Validate configuration files against declarative schemas")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate an input document against a schema definition.
    Validate(ValidateArgs),
    /// Build a schema definition and print its structure.
    Check(CheckArgs),
}

#[derive(Debug, Args)]
struct ValidateArgs {
    /// Schema definition file (YAML or JSON).
    #[arg(long)]
    schema: PathBuf,
    /// Input document (YAML or JSON). Omitted means absent input.
    #[arg(long)]
    input: Option<PathBuf>,
    /// Override a value at a dotted path, e.g. `server.port=8080`. Repeatable.
    #[arg(long = "set", value_name = "PATH=VALUE", value_parser = parse_assignment)]
    overrides: Vec<(String, String)>,
    /// Disable numeric-string and JSON-string coercion.
    #[arg(long)]
    no_convert: bool,
    /// Presence for nodes that declare none.
    #[arg(long)]
    presence: Option<CliPresence>,
    /// Validation options file (YAML): convert, presence, context.
    #[arg(long)]
    options: Option<PathBuf>,
    /// Output format for the validated value.
    #[arg(long, default_value = "json")]
    format: CliOutputFormat,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Schema definition file (YAML or JSON).
    #[arg(long)]
    schema: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Validate(args) => run_validate(args),
        Command::Check(args) => run_check(args).map(|()| true),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    }
}

/// Returns whether the input passed validation.
fn run_validate(args: ValidateArgs) -> Result<bool, String> {
    let schema = load_schema(&args.schema)?;

    let mut options = match &args.options {
        Some(path) => ValidationOptions::load(path)
            .map_err(|err| format!("Failed to load options '{}': {err}", path.display()))?,
        None => ValidationOptions::default(),
    };
    if args.no_convert {
        options.convert = false;
    }
    if let Some(presence) = args.presence {
        options.presence = presence.into();
    }

    let mut input = match &args.input {
        Some(path) => Some(load_document(path)?),
        None => None,
    };
    for (path, raw) in args.overrides {
        let target = input.get_or_insert_with(|| Value::Object(Object::new()));
        set_path(target, &path, Value::String(raw))?;
    }

    debug!(
        convert = options.convert,
        presence = ?options.presence,
        "validating input"
    );

    match schema.validate_with(input, &options) {
        Ok(value) => {
            let rendered = match args.format {
                CliOutputFormat::Json => serde_json::to_string_pretty(&value)
                    .map_err(|err| format!("Failed to serialize output: {err}"))?,
                CliOutputFormat::Yaml => serde_yaml::to_string(&value)
                    .map_err(|err| format!("Failed to serialize output: {err}"))?,
            };
            println!("{}", rendered.trim_end());
            Ok(true)
        }
        Err(errors) => {
            for error in &errors {
                eprintln!("{error}");
            }
            Ok(false)
        }
    }
}

fn run_check(args: CheckArgs) -> Result<(), String> {
    let schema = load_schema(&args.schema)?;
    let mut out = String::new();
    render_tree(&schema, None, 0, &mut out);
    print!("{out}");
    Ok(())
}

fn load_schema(path: &Path) -> Result<Schema, String> {
    let definition = SchemaDefinition::load(path)
        .map_err(|err| format!("Failed to load schema '{}': {err}", path.display()))?;
    let schema = definition
        .build()
        .map_err(|err| format!("Invalid schema '{}': {err}", path.display()))?;
    debug!(schema = %path.display(), kind = %schema.kind(), "built schema");
    Ok(schema)
}

fn load_document(path: &Path) -> Result<Value, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read '{}': {err}", path.display()))?;
    serde_yaml::from_str(&raw)
        .map_err(|err| format!("Failed to parse '{}': {err}", path.display()))
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (path, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected PATH=VALUE, got '{raw}'"))?;
    let path = path.trim();
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(format!("invalid path in '{raw}'"));
    }
    Ok((path.to_string(), value.to_string()))
}

/// Writes `value` at a dotted path, creating intermediate objects.
fn set_path(target: &mut Value, path: &str, value: Value) -> Result<(), String> {
    let (last, parents) = match path.rsplit_once('.') {
        Some((parents, last)) => (last, Some(parents)),
        None => (path, None),
    };

    let mut current = target;
    for segment in parents.into_iter().flat_map(|p| p.split('.')) {
        current = match current {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Object::new())),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get_mut(index))
                .ok_or_else(|| format!("cannot set '{path}': no element '{segment}'"))?,
            _ => return Err(format!("cannot set '{path}': '{segment}' is not a container")),
        };
    }

    match current {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = last
                .parse::<usize>()
                .map_err(|_| format!("cannot set '{path}': '{last}' is not an index"))?;
            match index.cmp(&items.len()) {
                std::cmp::Ordering::Less => items[index] = value,
                std::cmp::Ordering::Equal => items.push(value),
                std::cmp::Ordering::Greater => {
                    return Err(format!("cannot set '{path}': index {index} out of bounds"));
                }
            }
            Ok(())
        }
        _ => Err(format!("cannot set '{path}': parent is not a container")),
    }
}

fn render_tree(schema: &Schema, name: Option<&str>, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let label = match name {
        Some(name) => format!("{name}: {}", schema.kind()),
        None => schema.kind().to_string(),
    };
    out.push_str(&format!("{indent}{label}"));

    let mut notes: Vec<String> = Vec::new();
    match schema.presence() {
        Some(Presence::Optional) => notes.push("optional".to_string()),
        Some(Presence::Forbidden) => notes.push("forbidden".to_string()),
        Some(Presence::Required) | None => {}
    }
    if schema.default_value().is_some() {
        notes.push("default".to_string());
    }
    if schema.allows_unknowns() {
        notes.push("allowUnknowns".to_string());
    }
    for rule in schema.rules() {
        if let [RuleArg::Value(limit)] = rule.args() {
            notes.push(format!("{}={limit}", rule.name()));
        } else if let [RuleArg::Ref(reference)] = rule.args() {
            notes.push(format!("{}={reference}", rule.name()));
        } else if rule.name() != "entries" {
            notes.push(rule.name().to_string());
        }
    }
    if !notes.is_empty() {
        out.push_str(&format!(" [{}]", notes.join(", ")));
    }
    if let Some(description) = schema.description() {
        out.push_str(&format!(" - {description}"));
    }
    out.push('\n');

    for (field, child) in schema.fields() {
        render_tree(child, Some(field), depth + 1, out);
    }
    if let Some(items) = schema.items() {
        render_tree(items, Some("[]"), depth + 1, out);
    }
    if let Some((key, value)) = schema.entries() {
        render_tree(key, Some("<key>"), depth + 1, out);
        render_tree(value, Some("<value>"), depth + 1, out);
    }
}
