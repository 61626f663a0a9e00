use std::fmt::Write as FmtWrite;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use color_eyre::eyre::{Report, Result, WrapErr, eyre};
use futures::executor::block_on;
use log::{LevelFilter, debug, info, warn};
use serde_json::Value;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use formwork::{
    DocumentFormat, FormDefinition, FormEngine, JsonSchemaAdapter, OutputDestination,
    OutputOptions, ResetOptions, SetValueOptions, SubmitOutcome,
    io::{emit, parse_document_any},
};

#[derive(Debug, Parser)]
#[command(
    name = "formwork",
    version,
    about = "Validate values against a form definition and print the form snapshot"
)]
struct Cli {
    /// Form definition spec: file path, inline payload, or "-" for stdin
    #[arg(short = 'F', long = "form", value_name = "SPEC")]
    form: String,

    /// JSON Schema spec replacing the definition's field rules
    #[arg(short = 's', long = "schema", value_name = "SPEC")]
    schema: Option<String>,

    /// Values spec merged over the definition defaults before validating
    #[arg(short = 'c', long = "values", alias = "data", value_name = "SPEC")]
    values: Option<String>,

    /// Set one field, e.g. `--set age=42` or `--set 'social.twitter="@bat"'`
    #[arg(long = "set", value_name = "PATH=JSON", action = ArgAction::Append)]
    sets: Vec<String>,

    /// Run the submit lifecycle instead of a plain validation pass
    #[arg(long = "submit")]
    submit: bool,

    /// Output destinations ("-" writes to stdout). Accepts multiple values per flag use.
    #[arg(short = 'o', long = "output", value_name = "DEST", num_args = 1.., action = ArgAction::Append)]
    outputs: Vec<String>,

    /// Emit compact JSON/TOML rather than pretty formatting
    #[arg(long = "no-pretty")]
    no_pretty: bool,

    /// Log more (repeat for more detail)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug)]
enum InputSource {
    File(PathBuf),
    Stdin,
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let mut diagnostics = DiagnosticCollector::default();

    let specs = [
        ("form", Some(cli.form.as_str())),
        ("schema", cli.schema.as_deref()),
        ("values", cli.values.as_deref()),
    ];
    if specs.iter().filter(|(_, spec)| *spec == Some("-")).count() > 1 {
        diagnostics.push_input(
            "stdin",
            "only one of --form/--schema/--values can be read from stdin",
        );
    }

    let form_value = load_optional_value(Some(&cli.form), "form", &mut diagnostics);
    let schema_value = load_optional_value(cli.schema.as_deref(), "schema", &mut diagnostics);
    let values = load_optional_value(cli.values.as_deref(), "values", &mut diagnostics);
    let assignments = parse_assignments(&cli.sets, &mut diagnostics);
    let output = build_output_options(&cli, &mut diagnostics);

    diagnostics.into_result()?;

    let mut definition: FormDefinition = match form_value {
        Some(value) => serde_json::from_value(value).wrap_err("invalid form definition")?,
        None => return Err(eyre!("--form is required")),
    };
    if let Some(schema) = schema_value {
        JsonSchemaAdapter::new(&schema).map_err(|err| eyre!("{err:#}"))?;
        definition.schema = Some(schema);
    }

    let form = definition.build().map_err(|err| eyre!("{err:#}"))?;
    debug!("built form: {form:?}");

    apply_values(&form, values, assignments)?;
    run_validation(&form, cli.submit);

    let snapshot = form.snapshot();
    emit(&snapshot, &output).map_err(|err| eyre!("{err:#}"))?;

    if snapshot.is_valid {
        Ok(ExitCode::SUCCESS)
    } else {
        for (path, error) in &snapshot.errors {
            eprintln!("{path}: {error}");
        }
        Ok(ExitCode::FAILURE)
    }
}

fn apply_values(form: &FormEngine, values: Option<Value>, assignments: Vec<(String, Value)>) -> Result<()> {
    if let Some(values) = values {
        let mut merged = form.values();
        merge_values(&mut merged, values);
        form.reset_with(Some(merged), ResetOptions::new().keep_default_values());
    }
    for (path, value) in assignments {
        let validation = form
            .set_value(&path, value, SetValueOptions::all())
            .wrap_err_with(|| format!("failed to set {path}"))?;
        if let Some(error) = block_on(validation) {
            info!("{path}: {error}");
        }
    }
    Ok(())
}

fn run_validation(form: &FormEngine, submit: bool) {
    if submit {
        let outcome = block_on(form.submit(
            |_| async { Ok(()) },
            |errors| warn!("submit rejected: {} invalid field(s)", errors.len()),
        ));
        report_submit(&outcome);
    } else {
        block_on(form.validate_all());
    }
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto)
        .wrap_err("failed to install logger")
}

fn report_submit(outcome: &SubmitOutcome) {
    match outcome {
        SubmitOutcome::Submitted => info!("submitted"),
        SubmitOutcome::Invalid(errors) => info!("submit rejected with {} error(s)", errors.len()),
        SubmitOutcome::HandlerFailed(err) => warn!("submit handler failed: {err:#}"),
        SubmitOutcome::Blocked => warn!("submit blocked by a submit already in progress"),
    }
}

/// Deep-merges `patch` into `base`; objects merge per key, everything else
/// replaces.
fn merge_values(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

fn parse_assignments(raw: &[String], diagnostics: &mut DiagnosticCollector) -> Vec<(String, Value)> {
    let mut assignments = Vec::new();
    for entry in raw {
        let Some((path, value)) = entry.split_once('=') else {
            diagnostics.push_input("set", format!("'{entry}' is not PATH=VALUE"));
            continue;
        };
        let path = path.trim();
        if path.is_empty() {
            diagnostics.push_input("set", format!("'{entry}' has an empty path"));
            continue;
        }
        // Bare words are taken as strings.
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        assignments.push((path.to_string(), value));
    }
    assignments
}

fn load_optional_value(
    spec: Option<&str>,
    label: &str,
    diagnostics: &mut DiagnosticCollector,
) -> Option<Value> {
    let raw = spec?;
    let format = resolve_format_hint(raw);
    match load_value(raw, format, label) {
        Ok(value) => Some(value),
        Err(err) => {
            diagnostics.push_input(label, err.to_string());
            None
        }
    }
}

fn resolve_format_hint(spec: &str) -> DocumentFormat {
    if spec == "-" {
        return DocumentFormat::default();
    }
    Path::new(spec)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(DocumentFormat::from_extension)
        .unwrap_or_default()
}

fn load_value(spec: &str, format: DocumentFormat, label: &str) -> Result<Value> {
    if spec == "-" {
        let contents = read_from_source(&InputSource::Stdin)?;
        return parse_contents(&contents, format, label);
    }

    let path = PathBuf::from(spec);
    match read_from_source(&InputSource::File(path.clone())) {
        Ok(contents) => parse_contents(&contents, format, label),
        Err(err) => {
            if is_not_found(&err) {
                let inline_label = format!("inline {label}");
                return parse_contents(spec, format, &inline_label);
            }
            Err(err.wrap_err(format!("failed to load {label} from {}", path.display())))
        }
    }
}

fn read_from_source(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .wrap_err("failed to read from stdin")?;
            Ok(buffer)
        }
        InputSource::File(path) => fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read file {}", path.display())),
    }
}

fn is_not_found(err: &Report) -> bool {
    err.downcast_ref::<io::Error>()
        .is_some_and(|io_err| io_err.kind() == io::ErrorKind::NotFound)
}

fn parse_contents(contents: &str, format: DocumentFormat, label: &str) -> Result<Value> {
    parse_document_any(contents, format).map_err(|primary| {
        eyre!(
            "failed to parse {label}: tried {} (first error: {primary})",
            format_list()
        )
    })
}

fn format_list() -> String {
    let items: Vec<String> = DocumentFormat::available_formats()
        .into_iter()
        .map(|fmt| fmt.to_string())
        .collect();
    items.join(", ")
}

#[derive(Default)]
struct DiagnosticCollector {
    messages: Vec<String>,
}

impl DiagnosticCollector {
    fn push_input(&mut self, label: &str, message: impl Into<String>) {
        self.messages
            .push(format!("input ({label}): {}", message.into()));
    }

    fn push_output(&mut self, message: impl Into<String>) {
        self.messages.push(format!("output: {}", message.into()));
    }

    fn into_result(self) -> Result<()> {
        if self.messages.is_empty() {
            return Ok(());
        }
        let mut body = String::from("encountered input/output issues:\n");
        for (idx, msg) in self.messages.iter().enumerate() {
            let _ = writeln!(body, "  {}. {}", idx + 1, msg);
        }
        Err(eyre!(body))
    }
}

fn build_output_options(cli: &Cli, diagnostics: &mut DiagnosticCollector) -> OutputOptions {
    let mut destinations = Vec::new();
    for raw in &cli.outputs {
        if raw.trim().is_empty() {
            diagnostics.push_output("output destination cannot be empty");
            continue;
        }
        destinations.push(OutputDestination::parse(raw));
    }
    if destinations.is_empty() {
        destinations.push(OutputDestination::Stdout);
    }

    let mut format: Option<DocumentFormat> = None;
    for dest in &destinations {
        let OutputDestination::File(path) = dest else {
            continue;
        };
        match (dest.format_hint(), format) {
            (None, _) => diagnostics.push_output(format!(
                "cannot infer format from output file {}; use one of {}",
                path.display(),
                format_list()
            )),
            (Some(detected), Some(existing)) if detected != existing => {
                diagnostics.push_output(format!(
                    "output file {} uses {detected} but other destinations use {existing}; align extensions",
                    path.display()
                ))
            }
            (Some(detected), _) => format = Some(detected),
        }
    }

    OutputOptions::new(format.unwrap_or_default())
        .with_pretty(!cli.no_pretty)
        .with_destinations(destinations)
}
