use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;

use super::DocumentFormat;

/// Where a rendered document goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDestination {
    Stdout,
    File(PathBuf),
}

impl OutputDestination {
    pub fn file(path: impl AsRef<Path>) -> Self {
        OutputDestination::File(path.as_ref().to_path_buf())
    }

    /// `-` is stdout, anything else a file path.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "-" => OutputDestination::Stdout,
            path => OutputDestination::file(path),
        }
    }

    /// Format implied by the file extension. `None` for stdout and unknown
    /// extensions.
    pub fn format_hint(&self) -> Option<DocumentFormat> {
        let OutputDestination::File(path) = self else {
            return None;
        };
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(DocumentFormat::from_extension)
    }

    fn open(&self) -> io::Result<Box<dyn Write>> {
        Ok(match self {
            OutputDestination::Stdout => Box::new(io::stdout().lock()),
            OutputDestination::File(path) => Box::new(BufWriter::new(File::create(path)?)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: DocumentFormat,
    pub pretty: bool,
    pub destinations: Vec<OutputDestination>,
}

impl OutputOptions {
    pub fn new(format: DocumentFormat) -> Self {
        Self {
            format,
            pretty: true,
            destinations: vec![OutputDestination::Stdout],
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn with_destinations(mut self, destinations: Vec<OutputDestination>) -> Self {
        self.destinations = destinations;
        self
    }
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self::new(DocumentFormat::Json)
    }
}

/// Renders `value` in `format`. TOML has no null, so null members are left
/// out of TOML documents.
pub fn render<T: Serialize>(value: &T, format: DocumentFormat, pretty: bool) -> Result<String> {
    let tree = serde_json::to_value(value).context("value is not representable as a document")?;
    let rendered = match format {
        DocumentFormat::Json if pretty => serde_json::to_string_pretty(&tree)?,
        DocumentFormat::Json => serde_json::to_string(&tree)?,
        #[cfg(feature = "yaml")]
        DocumentFormat::Yaml => serde_yaml::to_string(&tree)?,
        #[cfg(feature = "toml")]
        DocumentFormat::Toml if pretty => toml::to_string_pretty(&without_nulls(tree))?,
        #[cfg(feature = "toml")]
        DocumentFormat::Toml => toml::to_string(&without_nulls(tree))?,
    };
    Ok(rendered)
}

/// Renders `value` once and writes it to every configured destination.
pub fn emit<T: Serialize>(value: &T, options: &OutputOptions) -> Result<()> {
    if options.destinations.is_empty() {
        return Ok(());
    }
    let payload = render(value, options.format, options.pretty)
        .with_context(|| format!("failed to render {} output", options.format))?;
    for destination in &options.destinations {
        write_document(destination, &payload).with_context(|| match destination {
            OutputDestination::Stdout => "failed to write to stdout".to_string(),
            OutputDestination::File(path) => format!("failed to write {}", path.display()),
        })?;
    }
    Ok(())
}

fn write_document(destination: &OutputDestination, payload: &str) -> io::Result<()> {
    let mut sink = destination.open()?;
    sink.write_all(payload.as_bytes())?;
    if !payload.ends_with('\n') {
        sink.write_all(b"\n")?;
    }
    sink.flush()
}

#[cfg(feature = "toml")]
fn without_nulls(value: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Object(map) => map
            .into_iter()
            .filter(|(_, member)| !member.is_null())
            .map(|(key, member)| (key, without_nulls(member)))
            .collect::<serde_json::Map<_, _>>()
            .into(),
        Value::Array(items) => items
            .into_iter()
            .filter(|item| !item.is_null())
            .map(without_nulls)
            .collect(),
        other => other,
    }
}
